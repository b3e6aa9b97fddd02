use std::sync::Arc;

use axum::{
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tokio::sync::{mpsc, oneshot};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::{telegram::BotClient, users::UserRequest, ServiceError};
use crate::auth::{AuthError, AuthenticatedIdentity, InitDataValidator};

mod telegram;
mod users;

#[derive(Clone)]
pub struct AppState {
    validator: Arc<InitDataValidator>,
    user_channel: mpsc::Sender<UserRequest>,
    bot: BotClient,
    webhook_secret: Option<Arc<str>>,
}

impl AppState {
    pub fn new(
        validator: InitDataValidator,
        user_channel: mpsc::Sender<UserRequest>,
        bot: BotClient,
        webhook_secret: Option<String>,
    ) -> Self {
        Self {
            validator: Arc::new(validator),
            user_channel,
            bot,
            webhook_secret: webhook_secret.map(Arc::from),
        }
    }

    /// Check the launch payload carried in the `Authorization` header.
    fn authenticate(&self, headers: &HeaderMap) -> Result<AuthenticatedIdentity, HttpError> {
        read_credential(headers)
            .and_then(|raw| self.validator.validate(raw))
            .map_err(|e| {
                log::debug!("Rejected launch payload: {}", e);
                HttpError::unauthorized()
            })
    }

    /// Send a request to the user service and wait for its answer.
    async fn ask_user_service<T>(
        &self,
        request: impl FnOnce(oneshot::Sender<Result<T, ServiceError>>) -> UserRequest,
    ) -> Result<T, ServiceError> {
        let (response_tx, response_rx) = oneshot::channel();

        self.user_channel
            .send(request(response_tx))
            .await
            .map_err(|e| ServiceError::Internal(format!("User service unavailable: {}", e)))?;

        response_rx
            .await
            .map_err(|e| ServiceError::Internal(format!("User service dropped request: {}", e)))?
    }
}

/// A header that is present but not visible ASCII cannot be a signed payload.
fn read_credential(headers: &HeaderMap) -> Result<Option<&str>, AuthError> {
    headers
        .get(AUTHORIZATION)
        .map(|value| value.to_str().map_err(|_| AuthError::InvalidSignature))
        .transpose()
}

#[derive(Debug)]
pub struct HttpError {
    status: StatusCode,
    message: &'static str,
}

impl HttpError {
    fn unauthorized() -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            message: "Unauthorized",
        }
    }

    fn bad_request() -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: "Bad request",
        }
    }
}

impl From<ServiceError> for HttpError {
    fn from(err: ServiceError) -> Self {
        let (status, message) = match err {
            ServiceError::IdentityIncomplete(_) => {
                (StatusCode::FORBIDDEN, super::telegram::SET_HANDLE_PROMPT)
            }
            ServiceError::NotFound(_) => (StatusCode::NOT_FOUND, "User not found"),
            ServiceError::NoBoxesAvailable(_) => (StatusCode::CONFLICT, "No boxes available"),
            ServiceError::Database(_) | ServiceError::Internal(_) => {
                log::error!("Request failed: {}", err);
                return Self {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    message: "Internal server error",
                };
            }
        };

        log::info!("Request refused: {}", err);
        Self { status, message }
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

pub fn router(app_state: AppState) -> Router {
    Router::new()
        .route("/api/user", get(users::get_user))
        .route("/api/open", post(users::open_box))
        .route("/webhook", post(telegram::webhook))
        .route("/health", get(|| async { "OK" }))
        .with_state(app_state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

pub async fn start_http_server(listen: &str, app_state: AppState) -> Result<(), anyhow::Error> {
    let app = router(app_state);

    let listener = tokio::net::TcpListener::bind(listen).await?;
    log::info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_read_credential() {
        let mut headers = HeaderMap::new();
        assert_eq!(read_credential(&headers), Ok(None));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("tma auth_date=1"));
        assert_eq!(read_credential(&headers), Ok(Some("tma auth_date=1")));

        headers.insert(AUTHORIZATION, HeaderValue::from_bytes(b"tma \xff\xfe").unwrap());
        assert_eq!(read_credential(&headers), Err(AuthError::InvalidSignature));
    }
}
