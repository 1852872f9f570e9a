//! Local HTTP control API.
//!
//! Lets other local tools feed utterances, stop speech and browse or prune the
//! chat history. Binds to 127.0.0.1 only.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::assistant::{Assistant, StatusSnapshot, TurnOutcome};
use crate::history::HistoryView;

#[derive(Clone)]
pub struct ApiState {
    pub assistant: Arc<Assistant>,
}

// --- Request/Response types ---

#[derive(Deserialize)]
struct UtteranceRequest {
    text: String,
}

#[derive(Deserialize, Default)]
struct HistoryQuery {
    #[serde(default)]
    filter: String,
}

#[derive(Serialize)]
struct SimpleResponse {
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl SimpleResponse {
    fn ok(status: &str) -> Self {
        Self {
            status: status.into(),
            error: None,
        }
    }

    fn err(message: impl Into<String>) -> Self {
        Self {
            status: "error".into(),
            error: Some(message.into()),
        }
    }
}

type ApiResult = (StatusCode, Json<SimpleResponse>);

/// Build the axum router.
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/status", get(handle_status))
        .route("/utterance", post(handle_utterance))
        .route("/stop", post(handle_stop))
        .route("/reset", post(handle_reset))
        .route("/history", get(handle_history).delete(handle_clear_history))
        .route("/history/export", get(handle_export))
        .route("/history/{index}", delete(handle_delete_entry))
        .route("/history/pair/{index}", delete(handle_delete_pair))
        .with_state(state)
}

/// Start the API server as a background tokio task.
pub async fn start_api(state: ApiState, port: u16) {
    let app = router(state);
    let addr = format!("127.0.0.1:{port}");
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            warn!("Failed to bind control API on {addr}: {e}");
            return;
        }
    };
    info!("Control API listening on {addr}");

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            warn!("Control API server error: {e}");
        }
    });
}

// --- Handlers ---

async fn handle_status(State(state): State<ApiState>) -> Json<StatusSnapshot> {
    Json(state.assistant.status())
}

async fn handle_utterance(
    State(state): State<ApiState>,
    Json(req): Json<UtteranceRequest>,
) -> Result<Json<TurnOutcome>, ApiResult> {
    if req.text.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, Json(SimpleResponse::err("empty text"))));
    }
    info!("HTTP /utterance: \"{}\"", req.text);
    Ok(Json(state.assistant.handle_utterance(&req.text).await))
}

async fn handle_stop(State(state): State<ApiState>) -> Json<SimpleResponse> {
    state.assistant.stop();
    Json(SimpleResponse::ok("stopped"))
}

async fn handle_reset(State(state): State<ApiState>) -> ApiResult {
    match state.assistant.reset() {
        Ok(()) => (StatusCode::OK, Json(SimpleResponse::ok("reset"))),
        Err(e) => internal(e),
    }
}

async fn handle_history(
    State(state): State<ApiState>,
    Query(query): Query<HistoryQuery>,
) -> Json<HistoryView> {
    Json(state.assistant.history().query(&query.filter))
}

async fn handle_export(State(state): State<ApiState>) -> String {
    state.assistant.history().export()
}

async fn handle_delete_entry(State(state): State<ApiState>, Path(index): Path<usize>) -> ApiResult {
    deletion(state.assistant.history().delete_at(index))
}

async fn handle_delete_pair(State(state): State<ApiState>, Path(index): Path<usize>) -> ApiResult {
    deletion(state.assistant.history().delete_pair(index))
}

async fn handle_clear_history(State(state): State<ApiState>) -> ApiResult {
    match state.assistant.history().clear() {
        Ok(_) => (StatusCode::OK, Json(SimpleResponse::ok("cleared"))),
        Err(e) => internal(e),
    }
}

fn deletion(result: crate::error::Result<bool>) -> ApiResult {
    match result {
        Ok(true) => (StatusCode::OK, Json(SimpleResponse::ok("deleted"))),
        Ok(false) => (StatusCode::NOT_FOUND, Json(SimpleResponse::err("delete failed"))),
        Err(e) => internal(e),
    }
}

fn internal(e: crate::error::AssistantError) -> ApiResult {
    warn!("Control API request failed: {e}");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(SimpleResponse::err(e.to_string())),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app_state::AppState;
    use crate::clock::{Clock, FixedClock};
    use crate::config::RemoteConfig;
    use crate::history::{HistoryStore, Sender};
    use crate::platform::LoggingPlatform;
    use crate::remote::RemoteChatClient;
    use crate::speech::testing::RecordingEngine;
    use crate::speech::SpeechOutputQueue;
    use crate::storage::KeyValueStore;
    use axum::body::Body;
    use axum::http::Request;
    use chrono::NaiveDate;
    use serde_json::Value;
    use tokio::sync::Notify;
    use tower::ServiceExt;

    fn app() -> (Router, Arc<Assistant>) {
        let now = NaiveDate::from_ymd_opt(2026, 3, 14)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::at(now));
        let store = Arc::new(KeyValueStore::in_memory());
        let history = Arc::new(HistoryStore::load(store.clone(), clock.clone(), "Niko", 100));
        let idle = Arc::new(Notify::new());
        let queue = Arc::new(SpeechOutputQueue::new(
            Arc::new(RecordingEngine::new(idle.clone())),
            idle,
        ));
        let assistant = Arc::new(Assistant::new(
            "Niko",
            clock,
            Arc::new(AppState::load(store)),
            history,
            queue,
            RemoteChatClient::new(RemoteConfig::default()).unwrap(),
            Arc::new(LoggingPlatform),
        ));
        let router = router(ApiState {
            assistant: assistant.clone(),
        });
        (router, assistant)
    }

    async fn json_body(resp: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn utterance_runs_a_turn() {
        let (app, assistant) = app();
        let resp = app
            .oneshot(
                Request::post("/utterance")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"text": "saat kaç"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        let body = json_body(resp).await;
        assert_eq!(body["kind"], "local");
        assert_eq!(body["action"]["action"], "tell_time");
        assert_eq!(body["response"], "Saat şu an 10:00");
        assert_eq!(assistant.history().len(), 2);
    }

    #[tokio::test]
    async fn empty_utterance_is_rejected() {
        let (app, _) = app();
        let resp = app
            .oneshot(
                Request::post("/utterance")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"text": "  "}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn history_is_filtered_and_paired() {
        let (app, assistant) = app();
        let history = assistant.history();
        history.append(Sender::User, "hi").unwrap();
        history.append(Sender::Assistant, "hello").unwrap();
        history.append(Sender::User, "bye").unwrap();

        let resp = app
            .oneshot(Request::get("/history?filter=bye").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = json_body(resp).await;
        assert_eq!(body["items"].as_array().unwrap().len(), 1);
        assert_eq!(body["items"][0]["kind"], "single");
        assert_eq!(body["items"][0]["index"], 2);
        assert_eq!(body["stats"]["total"], 3);
    }

    #[tokio::test]
    async fn stale_delete_is_not_found() {
        let (app, assistant) = app();
        assistant.history().append(Sender::User, "selam").unwrap();

        let resp = app
            .clone()
            .oneshot(Request::delete("/history/pair/0").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = app
            .oneshot(Request::delete("/history/0").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(assistant.history().is_empty());
    }

    #[tokio::test]
    async fn export_is_plain_text() {
        let (app, assistant) = app();
        assistant.history().append(Sender::User, "selam").unwrap();

        let resp = app
            .oneshot(Request::get("/history/export").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("[10:00] Ben: selam"));
    }

    #[tokio::test]
    async fn reset_and_status() {
        let (app, assistant) = app();
        assistant.app_state().session().adopt("s-1").unwrap();
        assistant.history().append(Sender::User, "selam").unwrap();

        let resp = app
            .clone()
            .oneshot(Request::post("/reset").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = app
            .oneshot(Request::get("/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = json_body(resp).await;
        assert_eq!(body["state"], "idle");
        assert_eq!(body["session_id"], Value::Null);
        assert_eq!(body["history_count"], 0);
    }
}
