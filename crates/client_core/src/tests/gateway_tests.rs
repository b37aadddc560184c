use std::sync::{Arc, Mutex};

use anyhow::Result;
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post, put},
    Json, Router,
};
use serde_json::{json, Value};
use tokio::net::TcpListener;

use super::*;

#[derive(Clone, Default)]
struct ServerState {
    authorizations: Arc<Mutex<Vec<String>>>,
    graphql_operations: Arc<Mutex<Vec<String>>>,
    saved_preferences: Arc<Mutex<Vec<Value>>>,
}

async fn team_by_name(
    State(state): State<ServerState>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> (StatusCode, Json<Value>) {
    if let Some(auth) = headers.get("authorization").and_then(|v| v.to_str().ok()) {
        state
            .authorizations
            .lock()
            .expect("lock")
            .push(auth.to_string());
    }
    match name.as_str() {
        "core" => (
            StatusCode::OK,
            Json(json!({
                "id": "t1",
                "name": "core",
                "display_name": "Core",
                "delete_at": 0,
                "group_constrained": null
            })),
        ),
        "embargoed" => (
            StatusCode::UNAVAILABLE_FOR_LEGAL_REASONS,
            Json(json!({"id": "api.team.embargoed", "message": "unavailable", "status_code": 451})),
        ),
        _ => (
            StatusCode::NOT_FOUND,
            Json(json!({
                "id": "app.team.get_by_name.missing.app_error",
                "message": "Unable to find the existing team.",
                "status_code": 404
            })),
        ),
    }
}

async fn me() -> (StatusCode, Json<Value>) {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({
            "id": "api.context.session_expired.app_error",
            "message": "Invalid or expired session, please login again.",
            "status_code": 401
        })),
    )
}

async fn graphql(State(state): State<ServerState>, Json(body): Json<Value>) -> Json<Value> {
    let operation = body["operationName"].as_str().unwrap_or_default().to_string();
    state
        .graphql_operations
        .lock()
        .expect("lock")
        .push(operation.clone());

    if operation == "gqlWebChannelsAndMembersForAllTeams" {
        return Json(json!({"data": null, "errors": [{"message": "resolver failed"}]}));
    }
    Json(json!({
        "data": {
            "channels": [{"id": "c1", "team": {"id": "t1"}, "type": "O", "name": "town-square", "display_name": "Town Square"}],
            "channelMembers": [{"channel": {"id": "c1"}, "roles": [{"id": "r1", "name": "channel_user", "permissions": []}], "msg_count": 7}]
        }
    }))
}

async fn add_member(Path(channel_id): Path<String>, Json(body): Json<Value>) -> Json<Value> {
    Json(json!({
        "channel_id": channel_id,
        "user_id": body["user_id"],
        "roles": "channel_user"
    }))
}

async fn save_preferences(
    State(state): State<ServerState>,
    Json(body): Json<Vec<Value>>,
) -> StatusCode {
    state.saved_preferences.lock().expect("lock").extend(body);
    StatusCode::OK
}

async fn spawn_chat_server() -> Result<(String, ServerState)> {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let state = ServerState::default();
    let app = Router::new()
        .route("/api/v4/teams/name/:name", get(team_by_name))
        .route("/api/v4/users/me", get(me))
        .route("/api/v4/channels/:channel_id/members", post(add_member))
        .route("/api/v4/users/:user_id/preferences", put(save_preferences))
        .route("/api/v5/graphql", post(graphql))
        .with_state(state.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok((format!("http://{addr}"), state))
}

#[test]
fn rejects_server_urls_without_http_scheme() {
    assert!(matches!(
        HttpGateway::new("ftp://chat.example.com", None),
        Err(SyncError::InvalidServerUrl(_))
    ));
    assert!(matches!(
        HttpGateway::new("not a url", None),
        Err(SyncError::InvalidServerUrl(_))
    ));
    assert!(HttpGateway::new("https://chat.example.com/", None).is_ok());
}

#[test]
fn endpoints_keep_subpath_and_escape_segments() {
    let gateway = HttpGateway::new("https://chat.example.com/mm/", None).expect("gateway");
    let url = gateway.api_v4(&["teams", "name", "a b/c"]);
    assert_eq!(
        url.as_str(),
        "https://chat.example.com/mm/api/v4/teams/name/a%20b%2Fc"
    );
}

#[tokio::test]
async fn fetches_team_by_name_with_bearer_token() {
    let (server_url, state) = spawn_chat_server().await.expect("spawn server");
    let gateway = HttpGateway::new(&server_url, Some("tok-123".into())).expect("gateway");

    let team = gateway.get_team_by_name("core").await.expect("team");
    assert_eq!(team.id, TeamId::new("t1"));
    assert!(!team.group_constrained);
    assert!(!team.is_deleted());
    assert_eq!(
        *state.authorizations.lock().expect("lock"),
        vec!["Bearer tok-123".to_string()]
    );
}

#[tokio::test]
async fn missing_team_maps_server_error_body() {
    let (server_url, _) = spawn_chat_server().await.expect("spawn server");
    let gateway = HttpGateway::new(&server_url, None).expect("gateway");

    let err = gateway
        .get_team_by_name("nope")
        .await
        .expect_err("missing team");
    assert_eq!(err.code, ErrorCode::NotFound);
    assert_eq!(err.status_code, 404);
    assert_eq!(
        err.server_error_id.as_deref(),
        Some("app.team.get_by_name.missing.app_error")
    );
    assert!(err
        .url
        .as_deref()
        .is_some_and(|url| url.ends_with("/api/v4/teams/name/nope")));
    assert!(!err.is_session_invalid());
}

#[tokio::test]
async fn embargoed_team_is_flagged() {
    let (server_url, _) = spawn_chat_server().await.expect("spawn server");
    let gateway = HttpGateway::new(&server_url, None).expect("gateway");

    let err = gateway
        .get_team_by_name("embargoed")
        .await
        .expect_err("embargoed team");
    assert!(err.is_embargoed());
    assert_eq!(err.code, ErrorCode::UnavailableForLegalReasons);
}

#[tokio::test]
async fn expired_session_is_detected() {
    let (server_url, _) = spawn_chat_server().await.expect("spawn server");
    let gateway = HttpGateway::new(&server_url, Some("stale".into())).expect("gateway");

    let err = gateway.get_me().await.expect_err("expired session");
    assert_eq!(err.code, ErrorCode::Unauthorized);
    assert!(err.is_session_invalid());
}

#[tokio::test]
async fn graphql_returns_typed_payload_for_team_scope() {
    let (server_url, state) = spawn_chat_server().await.expect("spawn server");
    let gateway = HttpGateway::new(&server_url, None).expect("gateway");

    let payload = gateway
        .fetch_channels_and_members(&ChannelQueryScope::Team(TeamId::new("t1")))
        .await
        .expect("graphql")
        .expect("payload");
    assert_eq!(payload.channels.len(), 1);
    assert_eq!(payload.channel_members[0].msg_count, 7);
    assert_eq!(
        *state.graphql_operations.lock().expect("lock"),
        vec!["gqlWebChannelsAndMembersForTeam".to_string()]
    );
}

#[tokio::test]
async fn graphql_errors_become_api_errors() {
    let (server_url, _) = spawn_chat_server().await.expect("spawn server");
    let gateway = HttpGateway::new(&server_url, None).expect("gateway");

    let err = gateway
        .fetch_channels_and_members(&ChannelQueryScope::AllTeams)
        .await
        .expect_err("graphql error");
    assert_eq!(err.message, "resolver failed");
    assert_eq!(err.code, ErrorCode::Internal);
}

#[tokio::test]
async fn adds_channel_member_and_saves_preferences() {
    let (server_url, state) = spawn_chat_server().await.expect("spawn server");
    let gateway = HttpGateway::new(&server_url, None).expect("gateway");

    let member = gateway
        .add_channel_member(&ChannelId::new("c1"), &UserId::new("u2"))
        .await
        .expect("add member");
    assert_eq!(member.channel_id, ChannelId::new("c1"));
    assert_eq!(member.user_id, UserId::new("u2"));

    gateway
        .save_preferences(
            &UserId::new("u1"),
            &[Preference::new(
                UserId::new("u1"),
                "direct_channel_show",
                "u2",
                "true",
            )],
        )
        .await
        .expect("save preferences");
    let saved = state.saved_preferences.lock().expect("lock").clone();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0]["category"], "direct_channel_show");
    assert_eq!(saved[0]["user_id"], "u1");
}

#[tokio::test]
async fn unreachable_server_is_a_network_error() {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let gateway = HttpGateway::new(&format!("http://{addr}"), None).expect("gateway");
    let err = gateway.get_me().await.expect_err("nothing listening");
    assert_eq!(err.code, ErrorCode::Network);
    assert!(!err.is_session_invalid());
}
