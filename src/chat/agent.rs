use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::config::LlmConfig;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

const SYSTEM_INSTRUCTION: &str = "\
You are the assistant of a college management system. You help staff look up \
and maintain student, teacher and administrator records: names, emails, phone \
numbers, class names, subjects and grades. Ask for any detail you need before \
describing a change, confirm every action briefly, answer politely, and decline \
requests unrelated to running the college.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub speaker: Speaker,
    pub content: String,
}

/// Conversational backend. Receives the history, oldest first.
#[async_trait]
pub trait Agent: Send + Sync {
    async fn respond(&self, history: &[ChatMessage]) -> anyhow::Result<String>;
}

pub struct GeminiAgent {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl GeminiAgent {
    pub fn new(cfg: &LlmConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .context("build gemini http client")?;
        Ok(Self {
            http,
            api_key: cfg.api_key.clone(),
            model: cfg.model.clone(),
        })
    }
}

/// `generateContent` request body for a conversation.
pub(crate) fn build_request(history: &[ChatMessage]) -> Value {
    let contents: Vec<Value> = history
        .iter()
        .map(|m| {
            let role = match m.speaker {
                Speaker::User => "user",
                Speaker::Assistant => "model",
            };
            json!({ "role": role, "parts": [{ "text": m.content }] })
        })
        .collect();

    json!({
        "systemInstruction": { "parts": [{ "text": SYSTEM_INSTRUCTION }] },
        "contents": contents,
    })
}

/// Concatenated text parts of the first candidate.
pub(crate) fn extract_text(response: &Value) -> Option<String> {
    let parts = response
        .get("candidates")?
        .get(0)?
        .get("content")?
        .get("parts")?
        .as_array()?;
    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(Value::as_str))
        .collect();
    (!text.trim().is_empty()).then_some(text)
}

#[async_trait]
impl Agent for GeminiAgent {
    async fn respond(&self, history: &[ChatMessage]) -> anyhow::Result<String> {
        let url = format!("{}/{}:generateContent", GEMINI_BASE_URL, self.model);
        let response: Value = self
            .http
            .post(url)
            .query(&[("key", &self.api_key)])
            .json(&build_request(history))
            .send()
            .await
            .context("gemini request")?
            .error_for_status()
            .context("gemini status")?
            .json()
            .await
            .context("gemini body")?;

        debug!(model = %self.model, "gemini responded");
        extract_text(&response).context("gemini returned no text")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_maps_speakers_to_gemini_roles() {
        let history = vec![
            ChatMessage {
                speaker: Speaker::User,
                content: "list students in 10A".into(),
            },
            ChatMessage {
                speaker: Speaker::Assistant,
                content: "There are none.".into(),
            },
        ];
        let body = build_request(&history);
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][1]["role"], "model");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "list students in 10A");
        assert!(body["systemInstruction"]["parts"][0]["text"]
            .as_str()
            .unwrap()
            .contains("college"));
    }

    #[test]
    fn extracts_first_candidate_text() {
        let response = json!({
            "candidates": [
                { "content": { "role": "model", "parts": [{ "text": "Hello" }, { "text": " there" }] } },
                { "content": { "parts": [{ "text": "ignored" }] } }
            ]
        });
        assert_eq!(extract_text(&response).as_deref(), Some("Hello there"));
        assert_eq!(extract_text(&json!({ "candidates": [] })), None);
    }
}
