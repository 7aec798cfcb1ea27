// lib/src/services/cards.rs
//! Birthday card text generation via the external text provider
//! (an OpenRouter-style chat completion API), with a deterministic
//! built-in fallback.

use async_trait::async_trait;
use log::debug;
use models::errors::{BotError, BotResult};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;
use std::time::Duration;

const OPENROUTER_API_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
const GENERATION_TIMEOUT: Duration = Duration::from_secs(30);
const MODEL: &str = "deepseek/deepseek-chat";

// Reasoning models may wrap output in <think>…</think> blocks.
static THINK_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<think>.*?</think>").expect("static regex"));

#[async_trait]
pub trait CardProvider: Send + Sync {
    /// Generates personalised Cantonese birthday card text for a patient.
    async fn birthday_card(&self, patient_name: &str, patient_description: &str) -> BotResult<String>;
}

pub struct OpenRouterCards {
    api_key: String,
    client: reqwest::Client,
}

impl OpenRouterCards {
    pub fn new(api_key: &str) -> BotResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(GENERATION_TIMEOUT)
            .build()
            .map_err(|e| BotError::Configuration(format!("failed to build provider client: {}", e)))?;
        Ok(OpenRouterCards { api_key: api_key.trim().to_string(), client })
    }

    fn prompt(patient_name: &str, patient_description: &str) -> String {
        let description_hint = if patient_description.is_empty() {
            String::new()
        } else {
            format!("\n病人資料：{}", patient_description)
        };
        format!(
            "你係一位親切嘅醫療診所職員，需要為病人「{}」用廣東話口語寫一張溫馨嘅WhatsApp生日卡。{}\n\n\
             要求：\n\
             1. 全程使用廣東話口語（唔係書面語）\n\
             2. 語氣溫暖、親切、真誠，對象為小朋友\n\
             3. 適當加入生日賀詞，可提及健康（小朋友有食物敏感）、開心等祝願\n\
             4. 長度適中，大約50字\n\
             5. 只輸出生日卡內容本身，唔需要任何解釋或標題\
             6. 包括生日快樂，並非生日大快樂",
            patient_name, description_hint
        )
    }
}

#[async_trait]
impl CardProvider for OpenRouterCards {
    async fn birthday_card(&self, patient_name: &str, patient_description: &str) -> BotResult<String> {
        if self.api_key.is_empty() {
            return Err(BotError::Configuration("OPENROUTER_API_KEY is not set".to_string()));
        }

        let response = self
            .client
            .post(OPENROUTER_API_URL)
            .bearer_auth(&self.api_key)
            .header("HTTP-Referer", "https://whatsapp-health-bot")
            .header("X-Title", "WhatsApp Health Bot")
            .json(&json!({
                "model": MODEL,
                "messages": [{ "role": "user", "content": Self::prompt(patient_name, patient_description) }],
                "max_tokens": 400,
                "temperature": 0.85,
            }))
            .send()
            .await
            .map_err(|e| BotError::Provider(format!("request failed: {}", e)))?;

        let status = response.status();
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| BotError::Provider(format!("invalid response body: {}", e)))?;
        if !status.is_success() {
            return Err(BotError::Provider(format!("HTTP {}: {}", status.as_u16(), body)));
        }

        let content = body["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| BotError::Provider("response carried no content".to_string()))?;
        let card = strip_reasoning(content);
        if card.is_empty() {
            return Err(BotError::Provider("response content was empty".to_string()));
        }
        debug!("Generated birthday card for {} ({} chars)", patient_name, card.chars().count());
        Ok(card)
    }
}

/// Removes reasoning-block wrappers from provider output.
pub fn strip_reasoning(content: &str) -> String {
    THINK_BLOCK.replace_all(content, "").trim().to_string()
}

/// Fallback card used whenever the text provider is unavailable.
pub fn default_birthday_card(patient_name: &str) -> String {
    format!(
        "🎂 {}，生日快樂！\n\n\
         今日係你嘅大日子，我哋診所全體同事祝你生日快樂、身體健康、萬事如意！\n\
         希望你今日笑口常開，開開心心慶祝呢個特別嘅日子！🎉🎊",
        patient_name
    )
}
