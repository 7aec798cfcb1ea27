// lib/src/config.rs
//! Process configuration, loaded from the environment.

use log::warn;
use models::errors::{BotError, BotResult};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::crypto::FieldCipher;

#[derive(Clone, Debug)]
pub struct Config {
    pub data_dir: PathBuf,
    pub port: u16,
    /// Base64-encoded 32-byte field-encryption key. Absence does not stop
    /// the process, but every encrypting write will fail hard.
    pub encryption_key: Option<String>,
    /// Shared webhook secret. Empty disables the check.
    pub webhook_token: String,
    pub wa_service_url: String,
    pub wa_service_api_key: Option<String>,
    pub openrouter_api_key: String,
    pub sweep_interval: Duration,
    /// Clinic-local send time for the daily diary nudge.
    pub diary_nudge_time: (u32, u32),
    /// Clinic-local send time for the daily birthday check.
    pub birthday_check_time: (u32, u32),
}

impl Config {
    pub fn from_env() -> BotResult<Self> {
        let sweep_minutes: u64 = match env::var("REMINDER_SWEEP_MINUTES") {
            Ok(v) => v
                .parse()
                .map_err(|_| BotError::Configuration("REMINDER_SWEEP_MINUTES must be an integer".to_string()))?,
            Err(_) => 60,
        };
        let port: u16 = match env::var("PORT") {
            Ok(v) => v
                .parse()
                .map_err(|_| BotError::Configuration("PORT must be a port number".to_string()))?,
            Err(_) => 5000,
        };

        Ok(Config {
            data_dir: env::var("DATA_DIR").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from("healthbot_data")),
            port,
            encryption_key: env::var("ENCRYPTION_KEY").ok().filter(|k| !k.trim().is_empty()),
            webhook_token: env::var("WHATSAPP_WEBHOOK_TOKEN").unwrap_or_default().trim().to_string(),
            wa_service_url: env::var("WA_SERVICE_URL").unwrap_or_else(|_| "http://127.0.0.1:3000".to_string()),
            wa_service_api_key: env::var("WA_SERVICE_API_KEY").ok().filter(|k| !k.trim().is_empty()),
            openrouter_api_key: env::var("OPENROUTER_API_KEY").unwrap_or_default(),
            sweep_interval: Duration::from_secs(sweep_minutes * 60),
            diary_nudge_time: (9, 0),
            birthday_check_time: (10, 0),
        })
    }

    /// A malformed key is a startup failure; a missing key yields a keyless
    /// cipher that rejects every encrypting write instead of silently
    /// storing plaintext.
    pub fn field_cipher(&self) -> BotResult<FieldCipher> {
        match &self.encryption_key {
            Some(encoded) => FieldCipher::from_base64(encoded),
            None => {
                warn!("ENCRYPTION_KEY is not set; all writes of sensitive fields will be rejected");
                Ok(FieldCipher::keyless())
            }
        }
    }
}
