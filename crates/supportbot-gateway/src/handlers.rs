use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};

use super::server::AppState;

#[derive(serde::Deserialize)]
pub(crate) struct ChatRequest {
    pub message: String,
}

#[derive(serde::Serialize)]
struct ChatResponse {
    response: String,
}

#[derive(serde::Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(serde::Serialize)]
struct HealthResponse {
    status: &'static str,
    index: &'static str,
    uptime_secs: u64,
}

fn error_response(message: String) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse { error: message }),
    )
        .into_response()
}

/// Serves the home page, read from disk on every request.
pub(crate) async fn home_handler(State(state): State<AppState>) -> Response {
    match tokio::fs::read(state.home_page.as_path()).await {
        Ok(bytes) => (
            [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
            bytes,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("failed to read home page {}: {e}", state.home_page.display());
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("failed to read home page: {e}"),
            )
                .into_response()
        }
    }
}

pub(crate) async fn chat_handler(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(p) => p,
        Err(rejection) if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE => {
            return rejection.into_response();
        }
        Err(rejection) => return error_response(rejection.body_text()),
    };

    match state.service.chat(&request.message).await {
        Ok(response) => Json(ChatResponse { response }).into_response(),
        Err(e) => {
            tracing::error!("chat request failed: {e}");
            error_response(e.to_string())
        }
    }
}

pub(crate) async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        index: state.service.state().as_str(),
        uptime_secs: state.service.uptime().as_secs(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_response_serializes() {
        let resp = HealthResponse {
            status: "ok",
            index: "ready",
            uptime_secs: 42,
        };
        let json = serde_json::to_string(&resp).unwrap();
        assert_eq!(json, r#"{"status":"ok","index":"ready","uptime_secs":42}"#);
    }

    #[test]
    fn chat_request_ignores_extra_fields() {
        let json = r#"{"message":"What is Everdraft?","session":"abc"}"#;
        let payload: ChatRequest = serde_json::from_str(json).unwrap();
        assert_eq!(payload.message, "What is Everdraft?");
    }
}
