//! Minimal Telegram Bot API client (long polling).
//!
//! Only what the signup bot needs: `getMe`, `getUpdates` and `sendMessage`.
//! Every response comes wrapped in `{"ok": ..., "result": ..., "description": ...}`.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

const API_BASE: &str = "https://api.telegram.org";

/// Extra time on top of the long-poll timeout before the HTTP call gives up.
const POLL_SLACK: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Error, Debug)]
pub enum TransportError {
    /// Network or HTTP-level failure. The message has the token redacted.
    #[error("HTTP error: {0}")]
    Http(String),

    /// Telegram answered with `ok: false`.
    #[error("Telegram API error {code}: {description}")]
    Api { code: i64, description: String },

    /// The response body wasn't what we expected.
    #[error("Failed to decode response: {0}")]
    Decode(String),
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    error_code: Option<i64>,
}

impl<T> ApiResponse<T> {
    fn into_result(self) -> Result<T, TransportError> {
        if !self.ok {
            return Err(TransportError::Api {
                code: self.error_code.unwrap_or_default(),
                description: self.description.unwrap_or_default(),
            });
        }
        self.result
            .ok_or_else(|| TransportError::Decode("missing result".to_string()))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    #[serde(default)]
    pub from: Option<User>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    #[serde(default)]
    pub username: Option<String>,
}

/// Blocking Bot API client.
pub struct TelegramClient {
    agent: ureq::Agent,
    base_url: String,
    token: String,
}

impl TelegramClient {
    pub fn new(token: &str) -> Self {
        Self::with_base_url(API_BASE, token)
    }

    /// Point the client at a different API server (e.g. a local Bot API server).
    pub fn with_base_url(base_url: &str, token: &str) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().build(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        }
    }

    pub fn get_me(&self) -> Result<User, TransportError> {
        self.call("getMe", json!({}), REQUEST_TIMEOUT)
    }

    /// Long-poll for updates after `offset`, waiting up to `timeout_secs`.
    pub fn get_updates(
        &self,
        offset: Option<i64>,
        timeout_secs: u64,
    ) -> Result<Vec<Update>, TransportError> {
        let mut body = json!({
            "timeout": timeout_secs,
            "allowed_updates": ["message"],
        });
        if let Some(offset) = offset {
            body["offset"] = json!(offset);
        }
        self.call(
            "getUpdates",
            body,
            Duration::from_secs(timeout_secs) + POLL_SLACK,
        )
    }

    pub fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        reply_to: Option<i64>,
    ) -> Result<(), TransportError> {
        let mut body = json!({
            "chat_id": chat_id,
            "text": text,
        });
        if let Some(message_id) = reply_to {
            body["reply_to_message_id"] = json!(message_id);
            body["allow_sending_without_reply"] = json!(true);
        }
        let _: serde_json::Value = self.call("sendMessage", body, REQUEST_TIMEOUT)?;
        Ok(())
    }

    fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: serde_json::Value,
        timeout: Duration,
    ) -> Result<T, TransportError> {
        let url = format!("{}/bot{}/{}", self.base_url, self.token, method);

        let response = match self.agent.post(&url).timeout(timeout).send_json(body) {
            Ok(response) => response,
            // Telegram reports API errors with a 4xx status and the usual envelope
            Err(ureq::Error::Status(_, response)) => response,
            Err(e) => return Err(TransportError::Http(self.redact(&e.to_string()))),
        };

        let envelope: ApiResponse<T> = response
            .into_json()
            .map_err(|e| TransportError::Decode(self.redact(&e.to_string())))?;
        envelope.into_result()
    }

    fn redact(&self, text: &str) -> String {
        if self.token.is_empty() {
            return text.to_string();
        }
        text.replace(&self.token, "<token>")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_text_message_update() {
        let raw = r#"{
            "ok": true,
            "result": [{
                "update_id": 1001,
                "message": {
                    "message_id": 7,
                    "date": 1691836800,
                    "chat": {"id": -762022584, "type": "group", "title": "Club"},
                    "from": {"id": 55, "is_bot": false, "first_name": "Bob", "username": "bob"},
                    "text": "/signup 12.8 2"
                }
            }]
        }"#;

        let response: ApiResponse<Vec<Update>> = serde_json::from_str(raw).unwrap();
        let updates = response.into_result().unwrap();

        assert_eq!(updates.len(), 1);
        let message = updates[0].message.as_ref().unwrap();
        assert_eq!(message.chat.id, -762022584);
        assert_eq!(message.text.as_deref(), Some("/signup 12.8 2"));
        assert_eq!(
            message.from.as_ref().and_then(|u| u.username.as_deref()),
            Some("bob")
        );
    }

    #[test]
    fn parses_update_without_message() {
        let raw = r#"{"ok": true, "result": [{"update_id": 5, "edited_message": {}}]}"#;
        let response: ApiResponse<Vec<Update>> = serde_json::from_str(raw).unwrap();
        let updates = response.into_result().unwrap();

        assert!(updates[0].message.is_none());
    }

    #[test]
    fn api_error_envelope_becomes_error() {
        let raw = r#"{"ok": false, "error_code": 401, "description": "Unauthorized"}"#;
        let response: ApiResponse<Vec<Update>> = serde_json::from_str(raw).unwrap();

        match response.into_result() {
            Err(TransportError::Api { code, description }) => {
                assert_eq!(code, 401);
                assert_eq!(description, "Unauthorized");
            }
            other => panic!("Expected API error, got {:?}", other),
        }
    }

    #[test]
    fn redact_hides_token() {
        let client = TelegramClient::with_base_url("http://localhost:8081/", "123:secret");

        assert_eq!(client.base_url, "http://localhost:8081");
        assert_eq!(
            client.redact("http://localhost:8081/bot123:secret/getMe: Connection refused"),
            "http://localhost:8081/bot<token>/getMe: Connection refused"
        );
    }
}
