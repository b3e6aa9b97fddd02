use anyhow::bail;
use async_trait::async_trait;
use dashmap::DashMap;

use super::UserStore;
use crate::models::users::{UserDefaults, UserRecord};

/// Process-local user store, used for development runs and tests.
#[derive(Debug, Default)]
pub struct MemoryUserRepository {
    users: DashMap<i64, UserRecord>,
}

impl MemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[async_trait]
impl UserStore for MemoryUserRepository {
    async fn find(&self, user_id: i64) -> Result<Option<UserRecord>, anyhow::Error> {
        Ok(self.users.get(&user_id).map(|user| user.value().clone()))
    }

    async fn create(
        &self,
        user_id: i64,
        handle: &str,
        defaults: UserDefaults,
    ) -> Result<UserRecord, anyhow::Error> {
        let user = self
            .users
            .entry(user_id)
            .or_insert_with(|| UserRecord {
                id: user_id,
                handle: Some(handle.to_string()),
                remaining_boxes: defaults.remaining_boxes,
                balance: defaults.balance,
            })
            .value()
            .clone();

        Ok(user)
    }

    async fn save(&self, user: &UserRecord) -> Result<(), anyhow::Error> {
        match self.users.get_mut(&user.id) {
            Some(mut stored) => {
                *stored = user.clone();
                Ok(())
            }
            None => bail!("User not found"),
        }
    }
}
