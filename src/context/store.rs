use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::ClientStoreConfig;
use crate::error::{CoordinationError, Result};

/// Access key granting client ids to every user.
pub const WILDCARD_USER: &str = "*";

/// Backend holding client profiles and the user -> client access list.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ClientStore: Send + Sync {
    async fn list_accessible_client_ids(&self, user_id: &str) -> Result<Vec<String>>;
    async fn get_profile(&self, client_id: &str) -> Result<Option<Map<String, Value>>>;
}

#[derive(Debug, Default, Clone)]
pub struct InMemoryClientStore {
    profiles: HashMap<String, Map<String, Value>>,
    access: HashMap<String, Vec<String>>,
}

impl InMemoryClientStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Non-object values are stored as an empty profile.
    pub fn with_profile(mut self, client_id: impl Into<String>, profile: Value) -> Self {
        let profile = match profile {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        self.profiles.insert(client_id.into(), profile);
        self
    }

    pub fn grant(mut self, user_id: impl Into<String>, client_id: impl Into<String>) -> Self {
        self.access.entry(user_id.into()).or_default().push(client_id.into());
        self
    }
}

#[async_trait]
impl ClientStore for InMemoryClientStore {
    async fn list_accessible_client_ids(&self, user_id: &str) -> Result<Vec<String>> {
        Ok(merge_access(&self.access, user_id))
    }

    async fn get_profile(&self, client_id: &str) -> Result<Option<Map<String, Value>>> {
        Ok(self.profiles.get(client_id).cloned())
    }
}

/// Profiles stored as one JSON document per client under a data directory,
/// with a JSON access file mapping user ids to client id lists.
pub struct JsonFileClientStore {
    data_directory: PathBuf,
    file_pattern: String,
    access_file: PathBuf,
}

impl JsonFileClientStore {
    pub fn new(config: &ClientStoreConfig) -> Self {
        info!(
            "Using JSON client store at {:?} (pattern {})",
            config.data_directory, config.file_pattern
        );
        Self {
            data_directory: config.data_directory.clone(),
            file_pattern: config.file_pattern.clone(),
            access_file: config.data_directory.join(&config.access_file),
        }
    }

    fn profile_path(&self, client_id: &str) -> Option<PathBuf> {
        if !is_safe_client_id(client_id) {
            return None;
        }
        Some(self.data_directory.join(self.file_pattern.replace("{client_id}", client_id)))
    }

    async fn read_json(path: &Path) -> Result<Option<Value>> {
        match tokio::fs::read_to_string(path).await {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CoordinationError::StorageError(format!(
                "Failed to read {:?}: {}",
                path, e
            ))),
        }
    }
}

#[async_trait]
impl ClientStore for JsonFileClientStore {
    async fn list_accessible_client_ids(&self, user_id: &str) -> Result<Vec<String>> {
        let Some(document) = Self::read_json(&self.access_file).await? else {
            warn!("Access file {:?} not found, no clients are accessible", self.access_file);
            return Ok(Vec::new());
        };

        let access: HashMap<String, Vec<String>> = serde_json::from_value(document)?;
        Ok(merge_access(&access, user_id))
    }

    async fn get_profile(&self, client_id: &str) -> Result<Option<Map<String, Value>>> {
        let Some(path) = self.profile_path(client_id) else {
            warn!("Rejected unsafe client id {:?}", client_id);
            return Ok(None);
        };

        debug!("Reading client profile from {:?}", path);
        match Self::read_json(&path).await? {
            Some(Value::Object(profile)) => Ok(Some(profile)),
            Some(_) => Err(CoordinationError::ParseError(format!(
                "Client profile {:?} is not a JSON object",
                path
            ))),
            None => Ok(None),
        }
    }
}

/// Ids granted to `user_id` followed by wildcard grants, without duplicates.
fn merge_access(access: &HashMap<String, Vec<String>>, user_id: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    access
        .get(user_id)
        .into_iter()
        .chain(access.get(WILDCARD_USER))
        .flatten()
        .filter(|id| seen.insert(id.to_string()))
        .cloned()
        .collect()
}

fn is_safe_client_id(client_id: &str) -> bool {
    !client_id.is_empty()
        && client_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
