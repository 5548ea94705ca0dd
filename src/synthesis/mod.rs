use serde::Serialize;

use crate::error::{CoordinationError, Result};
use crate::models::AgentResponse;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Synthesis {
    pub text: String,
    pub quality_score: f64,
}

/// Merges per-agent answers into one response. Sections keep the order the
/// responses were given in, which is the routing order.
#[derive(Debug, Clone, Default)]
pub struct ResponseSynthesizer;

impl ResponseSynthesizer {
    pub fn new() -> Self {
        Self
    }

    pub fn synthesize(&self, responses: &[AgentResponse]) -> Result<Synthesis> {
        if responses.is_empty() {
            return Err(CoordinationError::EmptyResponseSet);
        }

        let mut text = format!("Synthesized response from {} agent(s):\n", responses.len());
        for response in responses {
            text.push_str(&format!(
                "\n### {} ({})\n{}\n",
                response.agent_id, response.agent_type, response.response
            ));
        }

        Ok(Synthesis {
            text,
            quality_score: quality_score(responses),
        })
    }
}

/// Confidence averaged with weights proportional to 1 / processing_time.
/// Falls back to equal weights when any processing time is not positive.
pub fn quality_score(responses: &[AgentResponse]) -> f64 {
    if responses.is_empty() {
        return 0.0;
    }

    let weights: Vec<f64> = if responses.iter().all(|r| r.processing_time > 0.0) {
        responses.iter().map(|r| 1.0 / r.processing_time).collect()
    } else {
        vec![1.0; responses.len()]
    };
    let total: f64 = weights.iter().sum();

    let score: f64 = responses
        .iter()
        .zip(&weights)
        .map(|(response, weight)| response.confidence * (weight / total))
        .sum();
    score.clamp(0.0, 1.0)
}
