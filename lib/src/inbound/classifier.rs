// lib/src/inbound/classifier.rs
//! Webhook-facing state machine for inbound WhatsApp messages.
//!
//! Exactly one decision per event; only the final branch persists anything.
//! Replies are rendered here but sent by the caller, so a gateway failure
//! on the reply can never roll back an already-committed diary entry.

use chrono::Local;
use log::info;
use models::errors::{BotError, BotResult};
use subtle::ConstantTimeEq;

use crate::store::RecordStore;

/// Messages longer than this are rejected without persistence.
pub const MAX_MESSAGE_CHARS: usize = 500;

/// Accepted spellings of the diary marker (full-width and ASCII colon).
pub const DIARY_MARKERS: [&str; 2] = ["日記：", "日記:"];

pub const REPLY_TOO_LONG: &str =
    "唔好意思，你輸入嘅內容超過咗500字元。請縮短內容後再發送。如果你有更加多嘢想同醫生講，可以直接喺Whatsapp搵佢！";
pub const REPLY_WRONG_FORMAT: &str =
    "唔好意思，而家我只係能夠接收你嘅電子日記😔如果你想寫日記俾我哋的話，請喺訊息一開頭包括「日記：」呢個標示！";
pub const REPLY_SAVED: &str = "感謝！已收到您的電子日記內容。";

/// One inbound webhook event, already JSON-decoded.
#[derive(Clone, Debug)]
pub struct InboundEvent {
    pub sender: Option<String>,
    pub message: Option<String>,
}

/// Terminal outcome of classifying one event. `reply` is the text to send
/// back to the sender, when one is owed.
#[derive(Clone, Debug, PartialEq)]
pub enum Decision {
    Unauthorized,
    MissingData,
    /// Sender is not a registered patient: logged and ignored, no reply.
    UnknownSender,
    TooLong { sender: String, reply: &'static str },
    WrongFormat { sender: String, reply: &'static str },
    Saved { sender: String, reply: &'static str },
}

/// Constant-time webhook-secret check. An unset expected token disables
/// authentication (matching the original deployment toggle); any mismatch
/// rejects before the event is looked at.
fn token_ok(provided: &str, expected: &str) -> bool {
    if expected.is_empty() {
        return true;
    }
    provided.as_bytes().ct_eq(expected.as_bytes()).into()
}

pub fn classify(
    store: &RecordStore,
    event: &InboundEvent,
    provided_token: &str,
    expected_token: &str,
) -> BotResult<Decision> {
    if !token_ok(provided_token, expected_token) {
        return Ok(Decision::Unauthorized);
    }

    let (Some(sender), Some(message)) = (event.sender.as_deref(), event.message.as_deref()) else {
        return Ok(Decision::MissingData);
    };
    if sender.is_empty() || message.is_empty() {
        return Ok(Decision::MissingData);
    }

    // Blind-index lookup; a sender that does not even canonicalize is just
    // as unknown as one with no matching digest.
    let patient = match store.find_patient_by_phone(sender) {
        Ok(found) => found,
        Err(BotError::Validation(_)) => None,
        Err(e) => return Err(e),
    };
    let Some(patient) = patient else {
        info!("Received message from unknown number");
        return Ok(Decision::UnknownSender);
    };

    if message.chars().count() > MAX_MESSAGE_CHARS {
        return Ok(Decision::TooLong { sender: sender.to_string(), reply: REPLY_TOO_LONG });
    }

    let trimmed = message.trim_start();
    if !DIARY_MARKERS.iter().any(|m| trimmed.starts_with(m)) {
        return Ok(Decision::WrongFormat { sender: sender.to_string(), reply: REPLY_WRONG_FORMAT });
    }

    store.add_diary_entry(patient.id, message, Local::now().naive_local())?;
    info!("Diary entry saved for patient {}", patient.id);
    Ok(Decision::Saved { sender: sender.to_string(), reply: REPLY_SAVED })
}
