use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::oneshot;

use super::{rewards::RewardEngine, RequestHandler, Service, ServiceError};
use crate::{
    models::{
        boxes::OpenBoxOutcome,
        users::{UserDefaults, UserIdentity, UserRecord},
    },
    repositories::users::UserStore,
};

pub enum UserRequest {
    ResolveOrCreate {
        identity: UserIdentity,
        response: oneshot::Sender<Result<UserRecord, ServiceError>>,
    },
    OpenBox {
        user_id: i64,
        response: oneshot::Sender<Result<OpenBoxOutcome, ServiceError>>,
    },
}

#[derive(Clone)]
pub struct UserRequestHandler {
    repository: Arc<dyn UserStore>,
    defaults: UserDefaults,
    engine: RewardEngine,
}

impl UserRequestHandler {
    pub fn new(repository: Arc<dyn UserStore>, defaults: UserDefaults, engine: RewardEngine) -> Self {
        UserRequestHandler {
            repository,
            defaults,
            engine,
        }
    }

    /// Return the record for `identity`, creating it on first contact.
    ///
    /// An existing record is returned as stored, even if the handle changed.
    pub async fn resolve_or_create_user(
        &self,
        identity: &UserIdentity,
    ) -> Result<UserRecord, ServiceError> {
        let handle = identity
            .required_handle()
            .ok_or(ServiceError::IdentityIncomplete(identity.id))?;

        if let Some(user) = self
            .repository
            .find(identity.id)
            .await
            .map_err(ServiceError::Database)?
        {
            return Ok(user);
        }

        let user = self
            .repository
            .create(identity.id, handle, self.defaults)
            .await
            .map_err(ServiceError::Database)?;
        log::info!("Registered user {} ({}).", user.id, handle);

        Ok(user)
    }

    pub async fn open_box(&self, user_id: i64) -> Result<OpenBoxOutcome, ServiceError> {
        self.engine.open_box(user_id).await
    }
}

#[async_trait]
impl RequestHandler<UserRequest> for UserRequestHandler {
    async fn handle_request(&self, request: UserRequest) {
        match request {
            UserRequest::ResolveOrCreate { identity, response } => {
                let user = self.resolve_or_create_user(&identity).await;
                let _ = response.send(user);
            }
            UserRequest::OpenBox { user_id, response } => {
                let outcome = self.open_box(user_id).await;
                let _ = response.send(outcome);
            }
        }
    }
}

pub struct UserService;

impl UserService {
    pub fn new() -> Self {
        UserService {}
    }
}

#[async_trait]
impl Service<UserRequest, UserRequestHandler> for UserService {}
