//! Minimal Telegram Bot API client: long polling and text messages.

use std::time::Duration;

use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{instrument, warn};

use termbot_core::{OutboundMessage, TextFormat};

pub const DEFAULT_API_URL: &str = "https://api.telegram.org";

// ─── Wire types ───────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct TelegramResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    pub description: Option<String>,
    pub error_code: Option<i32>,
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
    pub from: Option<User>,
    pub chat: Chat,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    pub first_name: String,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Chat {
    pub id: i64,
    #[serde(rename = "type")]
    pub chat_type: String,
}

#[derive(Debug, Serialize)]
struct GetUpdatesRequest {
    offset: Option<i64>,
    timeout: u64,
    allowed_updates: Vec<&'static str>,
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: i64,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<&'static str>,
}

// ─── Errors ───────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum TelegramError {
    #[error("HTTP error: {0}")]
    Http(reqwest::Error),

    #[error("Telegram API error ({code}): {description}")]
    Api { code: i32, description: String },
}

// The request URL carries the bot token; keep it out of error messages.
impl From<reqwest::Error> for TelegramError {
    fn from(e: reqwest::Error) -> Self {
        TelegramError::Http(e.without_url())
    }
}

impl TelegramError {
    fn from_response<T>(response: TelegramResponse<T>) -> Self {
        TelegramError::Api {
            code: response.error_code.unwrap_or(0),
            description: response.description.unwrap_or_default(),
        }
    }

    /// Whether the entity parser rejected the message formatting.
    pub fn is_parse_error(&self) -> bool {
        match self {
            TelegramError::Api { description, .. } => {
                let desc = description.to_ascii_lowercase();
                desc.contains("can't parse entities") || desc.contains("can't find end of")
            }
            TelegramError::Http(_) => false,
        }
    }
}

// ─── Client ───────────────────────────────────────────────────

#[derive(Clone)]
pub struct TelegramClient {
    token: String,
    client: Client,
    base_url: String,
}

impl std::fmt::Debug for TelegramClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl TelegramClient {
    pub fn new(token: impl Into<String>) -> Result<Self, TelegramError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            token: token.into(),
            client,
            base_url: DEFAULT_API_URL.to_string(),
        })
    }

    /// Point the client at another API host, e.g. a self-hosted Bot API server.
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    fn api_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.base_url, self.token, method)
    }

    async fn call<B, T>(&self, method: &str, body: &B, timeout: Duration) -> Result<T, TelegramError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response: TelegramResponse<T> = self
            .client
            .post(self.api_url(method))
            .json(body)
            .timeout(timeout)
            .send()
            .await?
            .json()
            .await?;

        if response.ok {
            response.result.ok_or_else(|| TelegramError::Api {
                code: 0,
                description: "Empty result".into(),
            })
        } else {
            Err(TelegramError::from_response(response))
        }
    }

    /// Username of the bot behind the token. Used as a startup credential check.
    #[instrument(skip(self))]
    pub async fn get_me(&self) -> Result<User, TelegramError> {
        self.call("getMe", &serde_json::json!({}), Duration::from_secs(30))
            .await
    }

    /// Long-poll for updates after `offset`.
    #[instrument(skip(self))]
    pub async fn get_updates(
        &self,
        offset: Option<i64>,
        timeout_secs: u64,
    ) -> Result<Vec<Update>, TelegramError> {
        let request = GetUpdatesRequest {
            offset,
            timeout: timeout_secs,
            allowed_updates: vec!["message"],
        };
        self.call(
            "getUpdates",
            &request,
            Duration::from_secs(timeout_secs + 10),
        )
        .await
    }

    /// Send one message. HTML messages the API refuses to parse are resent
    /// as plain text.
    #[instrument(skip_all, fields(chat_id = chat_id))]
    pub async fn send_message(
        &self,
        chat_id: i64,
        message: &OutboundMessage,
    ) -> Result<Message, TelegramError> {
        let parse_mode = match message.format {
            TextFormat::Plain => None,
            TextFormat::Html => Some("HTML"),
        };
        let request = SendMessageRequest {
            chat_id,
            text: &message.text,
            parse_mode,
        };

        match self
            .call("sendMessage", &request, Duration::from_secs(30))
            .await
        {
            Err(e) if parse_mode.is_some() && e.is_parse_error() => {
                warn!(error = %e, "Parse mode error, retrying without formatting");
                let retry = SendMessageRequest {
                    parse_mode: None,
                    ..request
                };
                self.call("sendMessage", &retry, Duration::from_secs(30))
                    .await
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_deserialization() {
        let raw = r#"{
            "update_id": 10,
            "message": {
                "message_id": 5,
                "from": {"id": 42, "is_bot": false, "first_name": "Ana", "username": "ana"},
                "chat": {"id": 42, "type": "private"},
                "date": 1700000000,
                "text": "/status"
            }
        }"#;
        let update: Update = serde_json::from_str(raw).unwrap();
        let message = update.message.unwrap();

        assert_eq!(update.update_id, 10);
        assert_eq!(message.from.unwrap().id, 42);
        assert_eq!(message.text.as_deref(), Some("/status"));
    }

    #[test]
    fn test_update_without_message() {
        let raw = r#"{"update_id": 11, "callback_query": {"id": "x"}}"#;
        let update: Update = serde_json::from_str(raw).unwrap();
        assert!(update.message.is_none());
    }

    #[test]
    fn test_parse_error_detection() {
        let err = TelegramError::Api {
            code: 400,
            description: "Bad Request: can't parse entities: unexpected end tag".into(),
        };
        assert!(err.is_parse_error());

        let err = TelegramError::Api {
            code: 403,
            description: "Forbidden: bot was blocked by the user".into(),
        };
        assert!(!err.is_parse_error());
    }

    #[test]
    fn test_api_url_uses_base_url() {
        let client = TelegramClient::new("123:abc").unwrap();
        assert_eq!(
            client.api_url("getMe"),
            "https://api.telegram.org/bot123:abc/getMe"
        );

        let local = client.with_base_url("http://localhost:8081/");
        assert_eq!(
            local.api_url("getUpdates"),
            "http://localhost:8081/bot123:abc/getUpdates"
        );
    }

    #[test]
    fn test_debug_hides_token() {
        let client = TelegramClient::new("123:secret").unwrap();
        assert!(!format!("{client:?}").contains("secret"));
    }
}
