use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct OpenBoxOutcome {
    pub win: i64,
    pub remaining_boxes: i32,
    pub balance: i64,
}
