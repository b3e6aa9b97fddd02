pub mod boxes;
pub mod telegram;
pub mod users;
