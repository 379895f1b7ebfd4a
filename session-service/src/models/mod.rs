pub mod exam;
pub mod identity;
pub mod leaderboard;
pub mod message;
pub mod notification;
pub mod presence;
pub mod room;
