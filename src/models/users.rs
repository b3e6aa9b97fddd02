use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, sqlx::FromRow)]
pub struct UserRecord {
    pub id: i64,
    pub handle: Option<String>,
    pub remaining_boxes: i32,
    pub balance: i64,
}

/// Who is talking to us, as reported by the platform.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserIdentity {
    pub id: i64,
    pub handle: Option<String>,
}

impl UserIdentity {
    pub fn new(id: i64, handle: Option<String>) -> Self {
        Self { id, handle }
    }

    /// The handle, if it is present and not blank.
    pub fn required_handle(&self) -> Option<&str> {
        self.handle
            .as_deref()
            .map(str::trim)
            .filter(|handle| !handle.is_empty())
    }
}

/// Starting values for a freshly created record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UserDefaults {
    pub remaining_boxes: i32,
    pub balance: i64,
}

impl Default for UserDefaults {
    fn default() -> Self {
        Self {
            remaining_boxes: 1,
            balance: 0,
        }
    }
}
