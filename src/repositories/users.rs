use crate::models::users::{UserDefaults, UserRecord};

use anyhow::bail;
use async_trait::async_trait;
use sqlx::PgPool;

mod memory;

pub use memory::MemoryUserRepository;

/// Persistence for user economy records.
///
/// `create` must never produce a second record for an id: when the id is
/// already taken it returns the stored record untouched.
#[async_trait]
pub trait UserStore: Send + Sync + 'static {
    async fn find(&self, user_id: i64) -> Result<Option<UserRecord>, anyhow::Error>;

    async fn create(
        &self,
        user_id: i64,
        handle: &str,
        defaults: UserDefaults,
    ) -> Result<UserRecord, anyhow::Error>;

    async fn save(&self, user: &UserRecord) -> Result<(), anyhow::Error>;
}

#[derive(Clone)]
pub struct PgUserRepository {
    conn: PgPool,
}

impl PgUserRepository {
    pub fn new(conn: PgPool) -> Self {
        Self { conn }
    }

    pub async fn migrate(&self) -> Result<(), anyhow::Error> {
        sqlx::migrate!("./migrations").run(&self.conn).await?;

        Ok(())
    }
}

#[async_trait]
impl UserStore for PgUserRepository {
    async fn find(&self, user_id: i64) -> Result<Option<UserRecord>, anyhow::Error> {
        let user = sqlx::query_as::<_, UserRecord>(
            "SELECT id, handle, remaining_boxes, balance FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.conn)
        .await?;

        Ok(user)
    }

    async fn create(
        &self,
        user_id: i64,
        handle: &str,
        defaults: UserDefaults,
    ) -> Result<UserRecord, anyhow::Error> {
        sqlx::query(
            r#"
                INSERT INTO users (id, handle, remaining_boxes, balance)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(handle)
        .bind(defaults.remaining_boxes)
        .bind(defaults.balance)
        .execute(&self.conn)
        .await?;

        match self.find(user_id).await? {
            Some(user) => Ok(user),
            None => bail!("User {} vanished right after creation", user_id),
        }
    }

    async fn save(&self, user: &UserRecord) -> Result<(), anyhow::Error> {
        let result = sqlx::query(
            r#"
                UPDATE users
                SET handle = $2, remaining_boxes = $3, balance = $4
                WHERE id = $1
            "#,
        )
        .bind(user.id)
        .bind(&user.handle)
        .bind(user.remaining_boxes)
        .bind(user.balance)
        .execute(&self.conn)
        .await?;

        if result.rows_affected() == 0 {
            bail!("User not found")
        }

        Ok(())
    }
}
