use anyhow::bail;
use serde_json::{json, Value};

use crate::models::telegram::ApiResponse;

pub const SET_HANDLE_PROMPT: &str = "You need to set your username to use this bot.";
pub const GREETING: &str = "🎁 Open your boxes!";
const WEBAPP_BUTTON: &str = "LuckyBoxes";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    Start,
}

/// Recognise a bot command at the start of a message.
///
/// Accepts `/start`, `/start@SomeBot` and `/start <payload>`.
pub fn parse_command(text: &str) -> Option<Command> {
    let word = text.split_whitespace().next()?;
    let command = word.strip_prefix('/')?;
    let command = command.split('@').next().unwrap_or(command);

    match command {
        "start" => Some(Command::Start),
        _ => None,
    }
}

/// Minimal Bot API client: enough to register the webhook and reply.
#[derive(Clone)]
pub struct BotClient {
    http: reqwest::Client,
    base_url: String,
    webapp_url: String,
}

impl BotClient {
    pub fn new(api_url: &str, bot_token: &str, webapp_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: format!("{}/bot{}", api_url.trim_end_matches('/'), bot_token),
            webapp_url: webapp_url.to_string(),
        }
    }

    pub async fn set_webhook(&self, url: &str, secret: Option<&str>) -> Result<(), anyhow::Error> {
        let mut body = json!({
            "url": url,
            "allowed_updates": ["message"],
            "drop_pending_updates": true,
        });
        if let Some(secret) = secret {
            body["secret_token"] = json!(secret);
        }

        self.call("setWebhook", body).await?;
        log::info!("Webhook set to {}", url);

        Ok(())
    }

    pub async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), anyhow::Error> {
        self.call("sendMessage", json!({ "chat_id": chat_id, "text": text }))
            .await
    }

    /// Send `text` with a button that opens the web app.
    pub async fn send_webapp_invite(&self, chat_id: i64, text: &str) -> Result<(), anyhow::Error> {
        self.call(
            "sendMessage",
            json!({
                "chat_id": chat_id,
                "text": text,
                "parse_mode": "HTML",
                "reply_markup": {
                    "inline_keyboard": [[{
                        "text": WEBAPP_BUTTON,
                        "web_app": { "url": self.webapp_url },
                    }]],
                },
            }),
        )
        .await
    }

    async fn call(&self, method: &str, body: Value) -> Result<(), anyhow::Error> {
        let response: ApiResponse = self
            .http
            .post(format!("{}/{}", self.base_url, method))
            .json(&body)
            .send()
            .await?
            .json()
            .await?;

        if !response.ok {
            bail!(
                "Bot API {} failed: {}",
                method,
                response.description.unwrap_or_default()
            )
        }

        Ok(())
    }
}
