pub mod filter;
pub mod provider;
pub mod store;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use filter::{ContextField, ContextFilter, ContextMap};
pub use provider::{ClientContextPreview, ClientContextProvider};
pub use store::{ClientStore, InMemoryClientStore, JsonFileClientStore};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BrandVoice {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avoid_words: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub messaging_pillars: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TargetAudience {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_audience: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age_range: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interests: Option<Vec<String>>,
}

/// The slice of a client profile that may reach an agent prompt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientContext {
    pub client_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand_voice: Option<BrandVoice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_audience: Option<TargetAudience>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compliance_notes: Option<Vec<String>>,
}

impl ClientContext {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            brand_voice: None,
            target_audience: None,
            compliance_notes: None,
        }
    }

    /// Build a context from a raw store profile. Only the named fields below
    /// are read; everything else in the profile is dropped.
    pub fn from_profile(client_id: &str, profile: &Map<String, Value>) -> Self {
        let brand_voice = profile
            .get("brand_guidelines")
            .and_then(Value::as_object)
            .map(|guidelines| BrandVoice {
                tone: string_field(guidelines, "tone"),
                voice: string_field(guidelines, "voice"),
                avoid_words: string_list(guidelines, "avoid_words"),
                messaging_pillars: string_list(guidelines, "messaging_pillars"),
            })
            .filter(|voice| *voice != BrandVoice::default());

        let target_audience = profile
            .get("target_audience")
            .and_then(Value::as_object)
            .map(|audience| TargetAudience {
                primary_audience: string_field(audience, "primary")
                    .or_else(|| string_field(audience, "primary_audience")),
                age_range: string_field(audience, "age_range"),
                interests: string_list(audience, "interests"),
            })
            .filter(|audience| *audience != TargetAudience::default());

        Self {
            client_id: client_id.to_string(),
            brand_voice,
            target_audience,
            compliance_notes: string_list(profile, "compliance_requirements"),
        }
    }
}

fn string_field(object: &Map<String, Value>, key: &str) -> Option<String> {
    object.get(key).and_then(Value::as_str).map(str::to_string)
}

fn string_list(object: &Map<String, Value>, key: &str) -> Option<Vec<String>> {
    object.get(key).and_then(Value::as_array).map(|items| {
        items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect()
    })
}
