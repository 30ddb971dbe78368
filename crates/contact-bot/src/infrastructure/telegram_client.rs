//! Minimal Telegram Bot API client: long polling plus the three calls the
//! contact dialog needs.

use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::domain::contact_form::SKIP_LABEL;
use crate::domain::conversation::{Keyboard, ADD_COMPANY_CALLBACK};

const API_BASE: &str = "https://api.telegram.org";

#[derive(Error, Debug)]
pub enum TelegramError {
    #[error("bot api request failed: {0}")]
    Request(#[source] reqwest::Error),
    #[error("bot api error {code}: {description}")]
    Api { code: i64, description: String },
    #[error("invalid bot token")]
    InvalidToken,
}

impl From<reqwest::Error> for TelegramError {
    fn from(e: reqwest::Error) -> Self {
        // The request url embeds the bot token.
        TelegramError::Request(e.without_url())
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct User {
    pub id: i64,
    pub first_name: String,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct Chat {
    pub id: i64,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    #[serde(default)]
    pub from: Option<User>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub data: Option<String>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Deserialize, Debug)]
pub struct ApiResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    pub description: Option<String>,
    pub error_code: Option<i64>,
}

impl<T> ApiResponse<T> {
    pub fn into_result(self) -> Result<T, TelegramError> {
        match (self.ok, self.result) {
            (true, Some(result)) => Ok(result),
            _ => Err(TelegramError::Api {
                code: self.error_code.unwrap_or_default(),
                description: self
                    .description
                    .unwrap_or_else(|| "missing result".to_string()),
            }),
        }
    }
}

/// `reply_markup` payload for a keyboard, `None` when nothing is attached.
pub fn reply_markup(keyboard: &Keyboard) -> Option<Value> {
    match keyboard {
        Keyboard::None => None,
        Keyboard::Skip => Some(json!({
            "keyboard": [[SKIP_LABEL]],
            "one_time_keyboard": true,
            "resize_keyboard": true,
        })),
        Keyboard::StartForm { label } => Some(json!({
            "inline_keyboard": [[{ "text": label, "callback_data": ADD_COMPANY_CALLBACK }]],
        })),
        Keyboard::Remove => Some(json!({ "remove_keyboard": true })),
    }
}

pub fn send_message_body(chat_id: i64, text: &str, keyboard: &Keyboard) -> Value {
    let mut body = json!({
        "chat_id": chat_id,
        "text": text,
        "parse_mode": "Markdown",
    });
    if let Some(markup) = reply_markup(keyboard) {
        body["reply_markup"] = markup;
    }
    body
}

pub struct TelegramClient {
    client: Client,
    base: Url,
    poll_timeout: Duration,
}

impl TelegramClient {
    pub fn new(token: &str, poll_timeout: Duration) -> Result<Self, TelegramError> {
        Self::with_base(API_BASE, token, poll_timeout)
    }

    pub fn with_base(api_base: &str, token: &str, poll_timeout: Duration) -> Result<Self, TelegramError> {
        if token.is_empty() || token.contains('/') {
            return Err(TelegramError::InvalidToken);
        }
        let base = Url::parse(&format!("{}/bot{token}/", api_base.trim_end_matches('/')))
            .map_err(|_| TelegramError::InvalidToken)?;
        let client = Client::builder()
            .timeout(poll_timeout + Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            base,
            poll_timeout,
        })
    }

    fn call<T: DeserializeOwned>(&self, method: &str, body: &Value) -> Result<T, TelegramError> {
        let url = self
            .base
            .join(method)
            .map_err(|_| TelegramError::InvalidToken)?;
        let response: ApiResponse<T> = self.client.post(url).json(body).send()?.json()?;
        response.into_result()
    }

    /// Long-poll for updates with id >= `offset`.
    pub fn get_updates(&self, offset: i64) -> Result<Vec<Update>, TelegramError> {
        self.call(
            "getUpdates",
            &json!({
                "offset": offset,
                "timeout": self.poll_timeout.as_secs(),
                "allowed_updates": ["message", "callback_query"],
            }),
        )
    }

    pub fn send_message(&self, chat_id: i64, text: &str, keyboard: &Keyboard) -> Result<(), TelegramError> {
        let _: Value = self.call("sendMessage", &send_message_body(chat_id, text, keyboard))?;
        Ok(())
    }

    pub fn edit_message_text(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
        keyboard: &Keyboard,
    ) -> Result<(), TelegramError> {
        let mut body = send_message_body(chat_id, text, keyboard);
        body["message_id"] = json!(message_id);
        let _: Value = self.call("editMessageText", &body)?;
        Ok(())
    }

    pub fn answer_callback_query(&self, callback_id: &str) -> Result<(), TelegramError> {
        let _: bool = self.call("answerCallbackQuery", &json!({ "callback_query_id": callback_id }))?;
        Ok(())
    }
}
