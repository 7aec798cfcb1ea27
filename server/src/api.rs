// server/src/api.rs
//! HTTP surface: the WhatsApp webhook and the staff "send reminder now"
//! trigger. Everything else the clinic tool does (login, forms, templates)
//! lives outside this service.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use healthbot::inbound::{classify, Decision, InboundEvent};
use healthbot::services::gateway::{MessageGateway, SendOutcome};
use healthbot::RecordStore;
use log::{error, warn};
use models::errors::BotError;
use notification_service::Jobs;
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<RecordStore>,
    pub gateway: Arc<dyn MessageGateway>,
    pub jobs: Arc<Jobs>,
    pub webhook_token: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/webhook/whatsapp", post(whatsapp_webhook))
        .route("/appointments/{appointment_id}/send-reminder", post(send_reminder_now))
        .with_state(state)
}

/// Maps a classifier decision to the webhook response contract, plus the
/// reply owed to the sender (sent after the decision is final).
fn decision_response(decision: &Decision) -> (StatusCode, Value, Option<(String, &'static str)>) {
    match decision {
        Decision::Unauthorized => (
            StatusCode::UNAUTHORIZED,
            json!({ "status": "error", "reason": "unauthorized" }),
            None,
        ),
        Decision::MissingData => (
            StatusCode::BAD_REQUEST,
            json!({ "status": "error", "reason": "missing_data" }),
            None,
        ),
        Decision::UnknownSender => (
            StatusCode::OK,
            json!({ "status": "ignored", "reason": "unknown_patient" }),
            None,
        ),
        Decision::TooLong { sender, reply } => (
            StatusCode::OK,
            json!({ "status": "ignored", "reason": "message_too_long" }),
            Some((sender.clone(), reply)),
        ),
        Decision::WrongFormat { sender, reply } => (
            StatusCode::OK,
            json!({ "status": "ignored", "reason": "invalid_format" }),
            Some((sender.clone(), reply)),
        ),
        Decision::Saved { sender, reply } => (
            StatusCode::OK,
            json!({ "status": "success", "message": "diary_saved" }),
            Some((sender.clone(), reply)),
        ),
    }
}

async fn whatsapp_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Option<Json<Value>>,
) -> (StatusCode, Json<Value>) {
    let provided_token = headers
        .get("X-Webhook-Token")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let body = body.map(|Json(v)| v).unwrap_or(Value::Null);
    let event = InboundEvent {
        sender: body.get("sender").and_then(Value::as_str).map(str::to_string),
        message: body.get("message").and_then(Value::as_str).map(str::to_string),
    };

    let decision = match classify(&state.store, &event, provided_token, &state.webhook_token) {
        Ok(d) => d,
        Err(e) => {
            error!("Error processing webhook: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "status": "error", "error": e.to_string() })),
            );
        }
    };

    let (status, response, reply) = decision_response(&decision);
    if let Some((sender, text)) = reply {
        // The decision is already committed; a failed reply is only logged.
        let outcome = state.gateway.send(&sender, text).await;
        if !outcome.is_sent() {
            warn!("webhook reply not confirmed: {:?}", outcome);
        }
    }
    (status, Json(response))
}

async fn send_reminder_now(
    State(state): State<AppState>,
    Path(appointment_id): Path<Uuid>,
) -> (StatusCode, Json<Value>) {
    match state.jobs.send_reminder_now(appointment_id).await {
        Ok(SendOutcome::Sent) => (StatusCode::OK, Json(json!({ "status": "success" }))),
        Ok(outcome) => (
            StatusCode::BAD_GATEWAY,
            Json(json!({ "status": "error", "reason": format!("{:?}", outcome) })),
        ),
        Err(BotError::NotFound(id)) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "status": "error", "reason": format!("appointment {} not found", id) })),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "status": "error", "error": e.to_string() })),
        ),
    }
}
