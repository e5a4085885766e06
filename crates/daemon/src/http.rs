use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use obpo_core::Pipeline;
use tower_http::trace::TraceLayer;

/// Body sent when a result cannot be serialized.
const BAD_GATEWAY_BODY: &str = r#"{"code": 502}"#;

#[derive(Clone)]
pub struct AppState {
    pipeline: Pipeline,
}

/// Routes:
/// - `POST /request` runs one task; the body is the raw task JSON.
/// - `GET /healthz`
pub fn router(pipeline: Pipeline, body_limit: usize) -> Router {
    let state = AppState { pipeline };
    Router::new()
        .route("/healthz", get(healthz))
        .route("/request", post(request))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

/// Task failures are reported in the body with a 200; only a result that
/// cannot be encoded maps to a transport-level error.
async fn request(State(st): State<AppState>, body: Bytes) -> Response {
    let result = st.pipeline.process(&body).await;
    match serde_json::to_vec(&result) {
        Ok(json) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            json,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, code = result.code, "failed to encode result");
            (
                StatusCode::BAD_GATEWAY,
                [(header::CONTENT_TYPE, "application/json")],
                BAD_GATEWAY_BODY,
            )
                .into_response()
        }
    }
}
