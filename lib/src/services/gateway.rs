// lib/src/services/gateway.rs
//! Boundary adapter for the WhatsApp delivery service.
//!
//! The gateway never *errors* toward callers: every attempt resolves to one
//! of the three `SendOutcome` branches, and only `Sent` is grounds for
//! advancing dedup-guard state. One recipient's failure must never abort
//! the rest of a sweep, so this adapter catches everything.

use async_trait::async_trait;
use log::warn;
use models::errors::{BotError, BotResult};
use serde_json::json;
use std::time::Duration;

const SEND_TIMEOUT: Duration = Duration::from_secs(15);

/// Tri-state delivery result. `RejectedByGateway` and `TransportFailure`
/// are treated identically by the scheduler: not confirmed, retry on the
/// next scheduled tick.
#[derive(Clone, Debug, PartialEq)]
pub enum SendOutcome {
    Sent,
    RejectedByGateway { code: u16, reason: String },
    TransportFailure { reason: String },
}

impl SendOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, SendOutcome::Sent)
    }
}

#[async_trait]
pub trait MessageGateway: Send + Sync {
    /// Submits one rendered message to the canonical address.
    async fn send(&self, phone: &str, message: &str) -> SendOutcome;
}

/// HTTP client for the local Baileys-style bridge:
/// `POST {base_url}/send-message {phone, message}` with an API-key header.
pub struct WhatsAppGateway {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl WhatsAppGateway {
    pub fn new(base_url: &str, api_key: Option<String>) -> BotResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(SEND_TIMEOUT)
            .build()
            .map_err(|e| BotError::Configuration(format!("failed to build gateway client: {}", e)))?;
        Ok(WhatsAppGateway {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            client,
        })
    }
}

#[async_trait]
impl MessageGateway for WhatsAppGateway {
    async fn send(&self, phone: &str, message: &str) -> SendOutcome {
        let url = format!("{}/send-message", self.base_url);
        let mut request = self
            .client
            .post(&url)
            .json(&json!({ "phone": phone, "message": message }));
        if let Some(key) = &self.api_key {
            request = request.header("X-Api-Key", key);
        }

        let response = match request.send().await {
            Ok(r) => r,
            Err(e) => {
                warn!("Error sending message to {}: {}", phone, e);
                return SendOutcome::TransportFailure { reason: e.to_string() };
            }
        };

        let status = response.status();
        if status.is_success() {
            return SendOutcome::Sent;
        }

        let reason = match response.json::<serde_json::Value>().await {
            Ok(body) => body
                .get("error")
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| body.to_string()),
            Err(e) => e.to_string(),
        };
        warn!("Failed sending to {}: HTTP {} - {}", phone, status.as_u16(), reason);
        SendOutcome::RejectedByGateway { code: status.as_u16(), reason }
    }
}
