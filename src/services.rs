use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::{
    auth::InitDataValidator,
    models::users::UserDefaults,
    repositories::users::UserStore,
    settings::Settings,
};

pub mod http;
pub mod rewards;
pub mod telegram;
pub mod users;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("User {0} has no handle set")]
    IdentityIncomplete(i64),
    #[error("User {0} not found")]
    NotFound(i64),
    #[error("User {0} has no boxes left")]
    NoBoxesAvailable(i64),
    #[error("Database error: {0}")]
    Database(#[source] anyhow::Error),
    #[error("Internal error: {0}")]
    Internal(String),
}

#[async_trait]
pub trait RequestHandler<T>: Send + Sync + 'static
where
    T: Send + 'static,
{
    async fn handle_request(&self, request: T);
}

#[async_trait]
pub trait Service<T, H>: Send + Sync + 'static
where
    T: Send + 'static,
    H: RequestHandler<T> + Clone + Send,
{
    async fn run(&mut self, handler: H, receiver: &mut mpsc::Receiver<T>) {
        while let Some(request) = receiver.recv().await {
            let handler = handler.clone();

            tokio::spawn(async move {
                handler.handle_request(request).await;
            });
        }
    }
}

/// Start the user service on its own task and return the channel that
/// feeds it.
pub fn spawn_user_service(handler: users::UserRequestHandler) -> mpsc::Sender<users::UserRequest> {
    let (user_tx, mut user_rx) = mpsc::channel(512);
    let mut user_service = users::UserService::new();

    tokio::spawn(async move {
        user_service.run(handler, &mut user_rx).await;
        log::info!("User service stopped.");
    });

    user_tx
}

pub async fn start_services(
    store: Arc<dyn UserStore>,
    settings: Settings,
) -> Result<(), anyhow::Error> {
    let defaults = UserDefaults {
        remaining_boxes: settings.rewards.initial_boxes,
        ..UserDefaults::default()
    };
    let reward = rewards::UniformReward::new(settings.rewards.min_win, settings.rewards.max_win);
    let engine = rewards::RewardEngine::new(store.clone(), Arc::new(reward));

    log::info!("Starting user service.");
    let user_tx = spawn_user_service(users::UserRequestHandler::new(store, defaults, engine));

    let bot = telegram::BotClient::new(
        &settings.telegram.api_url,
        &settings.telegram.bot_token,
        &settings.telegram.webapp_url,
    );

    match &settings.telegram.webhook_url {
        Some(webhook_url) => {
            log::info!("Registering Telegram webhook.");
            bot.set_webhook(
                &format!("{}/webhook", webhook_url.trim_end_matches('/')),
                settings.telegram.webhook_secret.as_deref(),
            )
            .await?;
        }
        None => log::warn!("No webhook URL configured; chat updates will not be delivered."),
    }

    let mut validator = InitDataValidator::new(&settings.telegram.bot_token);
    if let Some(max_age) = settings.auth.max_age() {
        validator = validator.with_max_age(max_age);
    }

    let app_state = http::AppState::new(
        validator,
        user_tx,
        bot,
        settings.telegram.webhook_secret.clone(),
    );

    log::info!("Starting HTTP server.");
    http::start_http_server(&settings.server.listen, app_state).await
}
