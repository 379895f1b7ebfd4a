pub mod exam_service;
pub mod leaderboard_service;
pub mod message_service;
pub mod notification_service;
pub mod presence_service;
pub mod room_service;
pub mod sanitize;
pub mod typing_service;
