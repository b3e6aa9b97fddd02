use std::sync::Arc;

use dashmap::DashMap;
use rand::Rng;
use tokio::sync::Mutex;

use super::ServiceError;
use crate::{models::boxes::OpenBoxOutcome, repositories::users::UserStore};

pub const DEFAULT_MIN_WIN: i64 = 1;
pub const DEFAULT_MAX_WIN: i64 = 1000;

/// Source of box rewards.
pub trait RewardDraw: Send + Sync + 'static {
    fn draw(&self) -> i64;
}

/// Uniform draw from an inclusive range.
#[derive(Clone, Copy, Debug)]
pub struct UniformReward {
    min_win: i64,
    max_win: i64,
}

impl UniformReward {
    pub fn new(min_win: i64, max_win: i64) -> Self {
        Self { min_win, max_win }
    }
}

impl Default for UniformReward {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_WIN, DEFAULT_MAX_WIN)
    }
}

impl RewardDraw for UniformReward {
    fn draw(&self) -> i64 {
        rand::thread_rng().gen_range(self.min_win..=self.max_win)
    }
}

/// Runs the "open box" transaction.
///
/// Load, check, mutate and save happen under a per-user lock, so two
/// requests from the same user never both spend the same box. Requests from
/// different users take different locks.
#[derive(Clone)]
pub struct RewardEngine {
    store: Arc<dyn UserStore>,
    reward: Arc<dyn RewardDraw>,
    locks: Arc<DashMap<i64, Arc<Mutex<()>>>>,
}

impl RewardEngine {
    pub fn new(store: Arc<dyn UserStore>, reward: Arc<dyn RewardDraw>) -> Self {
        Self {
            store,
            reward,
            locks: Arc::new(DashMap::new()),
        }
    }

    pub async fn open_box(&self, user_id: i64) -> Result<OpenBoxOutcome, ServiceError> {
        let lock = Arc::clone(&self.locks.entry(user_id).or_default());
        let guard = lock.lock_owned().await;

        let result = self.open_box_locked(user_id).await;

        drop(guard);
        self.locks
            .remove_if(&user_id, |_, lock| Arc::strong_count(lock) == 1);

        result
    }

    async fn open_box_locked(&self, user_id: i64) -> Result<OpenBoxOutcome, ServiceError> {
        let mut user = self
            .store
            .find(user_id)
            .await
            .map_err(ServiceError::Database)?
            .ok_or(ServiceError::NotFound(user_id))?;

        if user.remaining_boxes <= 0 {
            return Err(ServiceError::NoBoxesAvailable(user_id));
        }

        let win = self.reward.draw();
        user.remaining_boxes -= 1;
        user.balance = user.balance.checked_add(win).ok_or_else(|| {
            ServiceError::Internal(format!("Balance overflow for user {}.", user_id))
        })?;

        // `user` is a copy; the stored record only changes if this succeeds.
        self.store.save(&user).await.map_err(ServiceError::Database)?;

        log::info!(
            "User {} opened a box: win={}, remaining_boxes={}, balance={}",
            user_id,
            win,
            user.remaining_boxes,
            user.balance
        );

        Ok(OpenBoxOutcome {
            win,
            remaining_boxes: user.remaining_boxes,
            balance: user.balance,
        })
    }

    #[cfg(test)]
    fn tracked_locks(&self) -> usize {
        self.locks.len()
    }
}
