use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use super::*;
use crate::agents::{AgentRegistry, AgentType};
use crate::config::{AgentDefinition, Config};
use crate::context::fixtures::sample_profile;
use crate::context::InMemoryClientStore;
use crate::invoker::SimulatedAgentInvoker;

fn state(api_token: Option<&str>) -> AppState {
    let registry = Arc::new(AgentRegistry::new(vec![
        AgentDefinition::new("content_research_agent", AgentType::ContentResearch),
        AgentDefinition::new("technical_seo_agent", AgentType::TechnicalSeo),
    ]));
    let store = InMemoryClientStore::new()
        .with_profile("promise_money", Value::Object(sample_profile("promise_money")))
        .grant("test_user_123", "promise_money");
    let engine = CoordinationEngine::new(
        registry,
        Arc::new(store),
        Arc::new(SimulatedAgentInvoker::new()),
        Config::default().coordination,
    );

    AppState {
        engine: Arc::new(engine),
        api_token: api_token.map(str::to_string),
    }
}

fn request(method: Method, uri: &str, user: Option<(&str, bool)>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some((user_id, is_admin)) = user {
        builder = builder
            .header(auth::USER_ID_HEADER, user_id)
            .header(auth::USER_ROLES_HEADER, "user")
            .header(auth::USER_ADMIN_HEADER, if is_admin { "true" } else { "false" });
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(state: AppState, request: Request<Body>) -> (StatusCode, Value) {
    let response = router(state).oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

#[tokio::test]
async fn test_health_is_public() {
    let (status, body) = send(state(None), request(Method::GET, "/health", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["total_agents"], 2);
}

#[tokio::test]
async fn test_missing_identity_is_unauthorized() {
    let (status, body) = send(state(None), request(Method::GET, "/agents/status", None, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_responses_carry_process_time() {
    let seconds = |response: &Response| -> f64 {
        response
            .headers()
            .get(PROCESS_TIME_HEADER)
            .expect("process time header")
            .to_str()
            .unwrap()
            .parse()
            .unwrap()
    };

    let response = router(state(None))
        .oneshot(request(Method::GET, "/health", None, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(seconds(&response) >= 0.0);

    let rejected = router(state(None))
        .oneshot(request(Method::GET, "/agents/status", None, None))
        .await
        .unwrap();
    assert_eq!(rejected.status(), StatusCode::UNAUTHORIZED);
    assert!(seconds(&rejected) >= 0.0);
}

#[tokio::test]
async fn test_bearer_token_enforced_when_configured() {
    let (status, _) = send(
        state(Some("secret")),
        request(Method::GET, "/agents/status", Some(("u1", false)), None),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let mut authorized = request(Method::GET, "/agents/status", Some(("u1", false)), None);
    authorized
        .headers_mut()
        .insert(header::AUTHORIZATION, "Bearer secret".parse().unwrap());
    let (status, _) = send(state(Some("secret")), authorized).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_coordinate_returns_enveloped_response() {
    let (status, body) = send(
        state(None),
        request(
            Method::POST,
            "/coordinate",
            Some(("u1", false)),
            Some(json!({"query": "seo trends", "priority": "high"})),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    let data = &body["data"];
    assert_eq!(data["routing_decision"]["selected_agents"][0]["agent_id"], "content_research_agent");
    assert_eq!(data["client_context_used"], false);
    assert_eq!(data["agent_responses"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_coordinate_for_client_uses_context() {
    let (status, body) = send(
        state(None),
        request(
            Method::POST,
            "/coordinate/client",
            Some(("test_user_123", false)),
            Some(json!({"query": "blog ideas", "client_id": "promise_money"})),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["client_context_used"], true);
}

#[tokio::test]
async fn test_empty_query_is_bad_request() {
    let (status, _) = send(
        state(None),
        request(Method::POST, "/coordinate", Some(("u1", false)), Some(json!({"query": "  "}))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_routing_failure_hides_internal_detail() {
    let state = state(None);
    state.engine.enter_maintenance().await;

    let (status, body) = send(
        state,
        request(Method::POST, "/coordinate", Some(("u1", false)), Some(json!({"query": "q"}))),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Internal server error");
}

#[tokio::test]
async fn test_client_context_preview() {
    let (status, body) = send(
        state(None),
        request(Method::GET, "/clients/promise_money/context", Some(("test_user_123", false)), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["preview"]["brand_tone"], "professional");

    let (status, _) = send(
        state(None),
        request(Method::GET, "/clients/promise_money/context", Some(("intruder", false)), None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_list_clients() {
    let (status, body) = send(
        state(None),
        request(Method::GET, "/clients", Some(("test_user_123", false)), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!(["promise_money"]));
}

#[tokio::test]
async fn test_agent_status_routes() {
    let (status, body) = send(
        state(None),
        request(Method::GET, "/agents/technical_seo_agent/status", Some(("u1", false)), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["agent_type"], "technical_seo");
    assert_eq!(body["data"]["status"], "healthy");

    let (status, _) = send(
        state(None),
        request(Method::GET, "/agents/ghost/status", Some(("u1", false)), None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_admin_routes_require_admin() {
    let (status, _) = send(
        state(None),
        request(Method::POST, "/admin/system/maintenance", Some(("u1", false)), None),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let state = state(None);
    let (status, body) = send(
        state.clone(),
        request(Method::POST, "/admin/system/maintenance", Some(("root", true)), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(state.engine.system_health().await.status, HealthState::Maintenance);

    let (status, _) = send(
        state.clone(),
        request(Method::POST, "/admin/agents/technical_seo_agent/restart", Some(("root", true)), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let seo = state.engine.registry().get("technical_seo_agent").await.unwrap();
    assert_eq!(seo.status, HealthState::Healthy);
}

#[tokio::test]
async fn test_metrics_and_detailed_health() {
    let state = state(None);
    send(
        state.clone(),
        request(Method::POST, "/coordinate", Some(("u1", false)), Some(json!({"query": "q"}))),
    )
    .await;

    let (status, body) = send(state.clone(), request(Method::GET, "/metrics", Some(("u1", false)), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total_requests"], 1);
    assert_eq!(body["data"]["completed_requests"], 1);

    let (status, body) = send(state, request(Method::GET, "/health/detailed", Some(("u1", false)), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["agents"].as_array().unwrap().len(), 2);
}
