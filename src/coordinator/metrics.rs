use serde::Serialize;

/// Counters accumulated since startup. Nothing is persisted.
#[derive(Debug, Default)]
pub(crate) struct MetricsRecorder {
    total: u64,
    completed: u64,
    failed: u64,
    sla_violations: u64,
    processing_time_sum: f64,
    quality_sum: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CoordinationMetrics {
    pub total_requests: u64,
    pub completed_requests: u64,
    pub failed_requests: u64,
    pub sla_violations: u64,
    /// Share of completed requests that stayed within the SLA threshold.
    pub sla_compliance: f64,
    pub error_rate: f64,
    pub average_processing_time: f64,
    pub average_quality_score: f64,
    pub uptime_seconds: u64,
}

impl MetricsRecorder {
    pub(crate) fn record_submitted(&mut self) {
        self.total += 1;
    }

    pub(crate) fn record_completed(&mut self, processing_time: f64, quality_score: f64, sla_violated: bool) {
        self.completed += 1;
        self.processing_time_sum += processing_time;
        self.quality_sum += quality_score;
        if sla_violated {
            self.sla_violations += 1;
        }
    }

    pub(crate) fn record_failed(&mut self) {
        self.failed += 1;
    }

    pub(crate) fn snapshot(&self, uptime_seconds: u64) -> CoordinationMetrics {
        let per_completed = |sum: f64| {
            if self.completed == 0 {
                0.0
            } else {
                sum / self.completed as f64
            }
        };

        CoordinationMetrics {
            total_requests: self.total,
            completed_requests: self.completed,
            failed_requests: self.failed,
            sla_violations: self.sla_violations,
            sla_compliance: if self.completed == 0 {
                1.0
            } else {
                1.0 - self.sla_violations as f64 / self.completed as f64
            },
            error_rate: if self.total == 0 {
                0.0
            } else {
                self.failed as f64 / self.total as f64
            },
            average_processing_time: per_completed(self.processing_time_sum),
            average_quality_score: per_completed(self.quality_sum),
            uptime_seconds,
        }
    }
}
