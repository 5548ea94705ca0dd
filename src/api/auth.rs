use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use headers::{authorization::Bearer, Authorization, HeaderMapExt};
use http::HeaderMap;
use tracing::warn;

use crate::api::{ApiError, AppState};
use crate::models::User;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLES_HEADER: &str = "x-user-roles";
pub const USER_ADMIN_HEADER: &str = "x-user-admin";

/// Checks the configured bearer token, then turns the identity headers set by
/// the upstream auth layer into a [`User`] request extension.
pub async fn identity_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Some(api_token) = &state.api_token {
        let token = req
            .headers()
            .typed_get::<Authorization<Bearer>>()
            .map(|auth| auth.token().to_string());

        if token.as_deref() != Some(api_token.as_str()) {
            warn!("Rejected request to {} with missing or invalid bearer token", req.uri().path());
            return Err(ApiError::Unauthorized);
        }
    }

    let user = user_from_headers(req.headers()).ok_or(ApiError::Unauthorized)?;
    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}

/// Must run after [`identity_middleware`].
pub async fn require_admin(req: Request, next: Next) -> Result<Response, ApiError> {
    let (user_id, is_admin) = match req.extensions().get::<User>() {
        Some(user) => (user.user_id.clone(), user.is_admin),
        None => return Err(ApiError::Unauthorized),
    };

    if !is_admin {
        warn!(target: "audit", user_id = %user_id, path = req.uri().path(), result = "denied", "admin route");
        return Err(ApiError::Forbidden);
    }
    Ok(next.run(req).await)
}

pub fn user_from_headers(headers: &HeaderMap) -> Option<User> {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok()).map(str::trim);

    let user_id = header(USER_ID_HEADER).filter(|id| !id.is_empty())?;
    let roles = header(USER_ROLES_HEADER)
        .map(|roles| {
            roles
                .split(',')
                .map(str::trim)
                .filter(|role| !role.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    let is_admin = header(USER_ADMIN_HEADER)
        .map(|flag| flag.eq_ignore_ascii_case("true") || flag == "1")
        .unwrap_or(false);

    Some(User {
        user_id: user_id.to_string(),
        roles,
        is_admin,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    #[test]
    fn test_user_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(USER_ID_HEADER, HeaderValue::from_static("test_user_123"));
        headers.insert(USER_ROLES_HEADER, HeaderValue::from_static("user, editor,,"));
        headers.insert(USER_ADMIN_HEADER, HeaderValue::from_static("TRUE"));

        let user = user_from_headers(&headers).unwrap();
        assert_eq!(user.user_id, "test_user_123");
        assert_eq!(user.roles, vec!["user", "editor"]);
        assert!(user.is_admin);
    }

    #[test]
    fn test_missing_or_blank_user_id() {
        assert!(user_from_headers(&HeaderMap::new()).is_none());

        let mut headers = HeaderMap::new();
        headers.insert(USER_ID_HEADER, HeaderValue::from_static("   "));
        assert!(user_from_headers(&headers).is_none());
    }

    #[test]
    fn test_admin_defaults_to_false() {
        let mut headers = HeaderMap::new();
        headers.insert(USER_ID_HEADER, HeaderValue::from_static("u1"));
        let user = user_from_headers(&headers).unwrap();
        assert!(!user.is_admin);
        assert!(user.roles.is_empty());
    }
}
