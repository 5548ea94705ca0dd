use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::context::{ClientContext, ClientStore};
use crate::error::{CoordinationError, Result};
use crate::models::User;

/// Resolves client ids to [`ClientContext`] on behalf of a user. Authorization
/// fails closed; a missing profile simply yields no context.
pub struct ClientContextProvider {
    store: Arc<dyn ClientStore>,
}

/// Summary returned by the context preview endpoint.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ClientContextPreview {
    pub client_id: String,
    pub has_brand_voice: bool,
    pub has_target_audience: bool,
    pub compliance_requirements_count: usize,
    pub preview: PreviewDetails,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PreviewDetails {
    pub brand_tone: Option<String>,
    pub primary_audience: Option<String>,
    pub compliance_summary: Vec<String>,
}

impl From<&ClientContext> for ClientContextPreview {
    fn from(context: &ClientContext) -> Self {
        let compliance = context.compliance_notes.as_deref().unwrap_or_default();
        Self {
            client_id: context.client_id.clone(),
            has_brand_voice: context.brand_voice.is_some(),
            has_target_audience: context.target_audience.is_some(),
            compliance_requirements_count: compliance.len(),
            preview: PreviewDetails {
                brand_tone: context.brand_voice.as_ref().and_then(|v| v.tone.clone()),
                primary_audience: context
                    .target_audience
                    .as_ref()
                    .and_then(|a| a.primary_audience.clone()),
                compliance_summary: compliance.iter().take(3).cloned().collect(),
            },
        }
    }
}

impl ClientContextProvider {
    pub fn new(store: Arc<dyn ClientStore>) -> Self {
        Self { store }
    }

    pub async fn accessible_clients(&self, user: &User) -> Result<Vec<String>> {
        self.store.list_accessible_client_ids(&user.user_id).await
    }

    /// Context for `client_id`, or `None` when access is denied, the profile
    /// is missing, or the store fails. Every outcome is audited.
    pub async fn resolve(&self, client_id: &str, user: &User) -> Option<ClientContext> {
        match self.try_resolve(client_id, user).await {
            Ok(context) => Some(context),
            Err(CoordinationError::AccessDenied { .. }) | Err(CoordinationError::NotFound(_)) => None,
            Err(e) => {
                warn!(
                    target: "audit",
                    user_id = %user.user_id,
                    client_id,
                    error = e.kind(),
                    "client context unavailable: {}",
                    e
                );
                None
            }
        }
    }

    pub async fn try_resolve(&self, client_id: &str, user: &User) -> Result<ClientContext> {
        self.authorize(client_id, user).await?;

        let profile = self.store.get_profile(client_id).await?;
        let Some(profile) = profile else {
            info!(target: "audit", user_id = %user.user_id, client_id, result = "missing", "client profile fetch");
            return Err(CoordinationError::NotFound(format!("client {}", client_id)));
        };

        info!(target: "audit", user_id = %user.user_id, client_id, result = "found", "client profile fetch");
        Ok(ClientContext::from_profile(client_id, &profile))
    }

    async fn authorize(&self, client_id: &str, user: &User) -> Result<()> {
        let accessible = match self.store.list_accessible_client_ids(&user.user_id).await {
            Ok(ids) => ids,
            Err(e) => {
                warn!(
                    target: "audit",
                    user_id = %user.user_id,
                    client_id,
                    result = "denied",
                    "client access check failed: {}",
                    e
                );
                return Err(CoordinationError::AccessDenied {
                    user_id: user.user_id.clone(),
                    client_id: client_id.to_string(),
                });
            }
        };

        if accessible.iter().any(|id| id == client_id) {
            info!(target: "audit", user_id = %user.user_id, client_id, result = "granted", "client access check");
            Ok(())
        } else {
            warn!(target: "audit", user_id = %user.user_id, client_id, result = "denied", "client access check");
            Err(CoordinationError::AccessDenied {
                user_id: user.user_id.clone(),
                client_id: client_id.to_string(),
            })
        }
    }
}
