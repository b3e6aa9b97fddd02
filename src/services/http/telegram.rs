use axum::{body::Bytes, extract::State, http::HeaderMap, http::StatusCode};

use super::{AppState, HttpError};
use crate::models::{telegram::Update, users::UserIdentity};
use crate::services::{
    telegram::{parse_command, Command, GREETING, SET_HANDLE_PROMPT},
    users::UserRequest,
    ServiceError,
};

const SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";

pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, HttpError> {
    if let Some(secret) = &state.webhook_secret {
        let provided = headers
            .get(SECRET_HEADER)
            .and_then(|value| value.to_str().ok());
        if provided != Some(secret.as_ref()) {
            log::warn!("Webhook call with bad secret token.");
            return Err(HttpError::unauthorized());
        }
    }

    let update: Update = serde_json::from_slice(&body).map_err(|e| {
        log::warn!("Could not parse webhook update: {}", e);
        HttpError::bad_request()
    })?;

    // Errors are logged, not returned: Telegram would keep redelivering.
    if let Err(e) = handle_update(&state, update).await {
        log::error!("Failed to handle update: {}", e);
    }

    Ok(StatusCode::OK)
}

async fn handle_update(state: &AppState, update: Update) -> Result<(), anyhow::Error> {
    let Some(message) = update.message else {
        return Ok(());
    };
    let Some(sender) = message.from else {
        return Ok(());
    };
    let chat_id = message.chat.id;
    let identity = UserIdentity::new(sender.id, sender.username);

    let user = state
        .ask_user_service(|response| UserRequest::ResolveOrCreate { identity, response })
        .await;

    match user {
        Ok(_) => {}
        Err(ServiceError::IdentityIncomplete(_)) => {
            return state.bot.send_message(chat_id, SET_HANDLE_PROMPT).await;
        }
        Err(e) => return Err(e.into()),
    }

    if let Some(Command::Start) = message.text.as_deref().and_then(parse_command) {
        state.bot.send_webapp_invite(chat_id, GREETING).await?;
    }

    Ok(())
}
