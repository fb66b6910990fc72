use crate::action_gate::{self, ActionVerdict};
use crate::engine::Engine;
use crate::resolver::Resolution;
use crate::trace_identity::{self, ENGINE_VERSION};
use crate::verdict::{FinalVerdict, PublicVerdict};
use axum::{
    body::Bytes,
    extract::Extension,
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::Instrument;

/// Router exposing the enforcement endpoints, versioned aliases and health check
pub fn build_router(engine: Arc<Engine>) -> Router {
    Router::new()
        .route("/enforce", post(enforce))
        .route("/action", post(action))
        // versioned aliases
        .route("/v1/enforce", post(enforce))
        .route("/v1/action", post(action))
        .route("/healthz", get(healthz))
        .layer(Extension(engine))
}

/// Unparseable bodies are carried forward as a JSON string so they still
/// fail the input contract and receive a reproducible trace id.
fn parse_body(body: &Bytes) -> Value {
    serde_json::from_slice(body)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(body).into_owned()))
}

async fn enforce(Extension(engine): Extension<Arc<Engine>>, body: Bytes) -> Json<PublicVerdict> {
    let request_id = uuid::Uuid::new_v4();
    let span = tracing::info_span!("request", %request_id, route = "enforce");

    async move {
        let request = parse_body(&body);
        let fallback_request = request.clone();
        let joined = tokio::task::spawn_blocking(move || engine.enforce_value(&request)).await;

        let verdict = match joined {
            Ok(verdict) => verdict,
            Err(err) => {
                tracing::error!(error = %err, "decision task failed, blocking");
                let resolution = Resolution::engine_failure();
                FinalVerdict::new(
                    resolution.decision,
                    resolution.scope,
                    trace_identity::compute_lossy(&fallback_request, resolution.decision.label()),
                    resolution.reason_code,
                )
            }
        };
        Json(verdict.public())
    }
    .instrument(span)
    .await
}

async fn action(body: Bytes) -> Json<ActionVerdict> {
    let request_id = uuid::Uuid::new_v4();
    let span = tracing::info_span!("request", %request_id, route = "action");
    Json(span.in_scope(|| action_gate::approve_value(&parse_body(&body))))
}

async fn healthz() -> Json<Value> {
    Json(serde_json::json!({ "status": "ok", "engine_version": ENGINE_VERSION }))
}
