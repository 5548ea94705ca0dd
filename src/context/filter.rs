//! Per-agent-type projection of client context.
//!
//! What each agent type may see is a table lookup; supporting a new agent
//! type means adding a row to [`PROJECTION_TABLE`].

use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::agents::AgentType;
use crate::context::ClientContext;

pub type ContextMap = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextField {
    ClientId,
    /// The whole brand voice object.
    BrandVoice,
    /// Only the tone, exposed under the `brand_voice` key.
    BrandTone,
    TargetAudience,
    ComplianceNotes,
}

impl ContextField {
    pub fn key(&self) -> &'static str {
        match self {
            ContextField::ClientId => "client_id",
            ContextField::BrandVoice | ContextField::BrandTone => "brand_voice",
            ContextField::TargetAudience => "target_audience",
            ContextField::ComplianceNotes => "compliance_notes",
        }
    }

    fn extract(&self, context: &ClientContext) -> Option<Value> {
        match self {
            ContextField::ClientId => Some(Value::String(context.client_id.clone())),
            ContextField::BrandVoice => context
                .brand_voice
                .as_ref()
                .and_then(|voice| serde_json::to_value(voice).ok()),
            ContextField::BrandTone => context
                .brand_voice
                .as_ref()
                .and_then(|voice| voice.tone.clone())
                .map(Value::String),
            ContextField::TargetAudience => context
                .target_audience
                .as_ref()
                .and_then(|audience| serde_json::to_value(audience).ok()),
            ContextField::ComplianceNotes => context
                .compliance_notes
                .as_ref()
                .map(|notes| Value::Array(notes.iter().cloned().map(Value::String).collect())),
        }
    }
}

pub const PROJECTION_TABLE: &[(AgentType, &[ContextField])] = &[
    (
        AgentType::ContentResearch,
        &[
            ContextField::BrandVoice,
            ContextField::TargetAudience,
            ContextField::ComplianceNotes,
        ],
    ),
    (
        AgentType::TechnicalSeo,
        &[ContextField::BrandTone, ContextField::ComplianceNotes],
    ),
];

/// Agent types without a row only learn which client they are working for.
pub const DEFAULT_FIELDS: &[ContextField] = &[ContextField::ClientId];

#[derive(Debug, Clone)]
pub struct ContextFilter {
    rules: HashMap<AgentType, Vec<ContextField>>,
    default_fields: Vec<ContextField>,
}

impl Default for ContextFilter {
    fn default() -> Self {
        Self::new(
            PROJECTION_TABLE
                .iter()
                .map(|(agent_type, fields)| (*agent_type, fields.to_vec())),
            DEFAULT_FIELDS.to_vec(),
        )
    }
}

impl ContextFilter {
    pub fn new(
        rules: impl IntoIterator<Item = (AgentType, Vec<ContextField>)>,
        default_fields: Vec<ContextField>,
    ) -> Self {
        Self {
            rules: rules.into_iter().collect(),
            default_fields,
        }
    }

    pub fn fields_for(&self, agent_type: AgentType) -> &[ContextField] {
        self.rules
            .get(&agent_type)
            .map(Vec::as_slice)
            .unwrap_or(&self.default_fields)
    }

    /// Keys an agent of this type may ever receive.
    pub fn whitelist(&self, agent_type: AgentType) -> Vec<&'static str> {
        let mut keys: Vec<&'static str> = self.fields_for(agent_type).iter().map(ContextField::key).collect();
        keys.dedup();
        keys
    }

    pub fn project(&self, context: Option<&ClientContext>, agent_type: AgentType) -> ContextMap {
        let mut projected = ContextMap::new();
        let Some(context) = context else {
            return projected;
        };

        for field in self.fields_for(agent_type) {
            if let Some(value) = field.extract(context) {
                projected.insert(field.key().to_string(), value);
            }
        }
        projected
    }
}
