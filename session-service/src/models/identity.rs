use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserRole {
    #[serde(rename = "student")]
    Student,
    #[serde(rename = "instructor")]
    Instructor,
    #[serde(rename = "admin")]
    Admin,
}

impl UserRole {
    pub fn from_str(value: &str) -> Self {
        match value {
            "admin" => UserRole::Admin,
            "instructor" => UserRole::Instructor,
            _ => UserRole::Student,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Student => "student",
            UserRole::Instructor => "instructor",
            UserRole::Admin => "admin",
        }
    }

    /// Roles allowed to use moderator-only commands (cross-user
    /// notifications, manual leaderboard recompute, deleting others' rooms).
    pub fn is_elevated(&self) -> bool {
        matches!(self, UserRole::Instructor | UserRole::Admin)
    }
}

/// Resolved identity of an authenticated connection.
///
/// Built once during the handshake from the token subject plus the identity
/// store; every handler downstream can rely on it being present.
#[derive(Debug, Clone)]
pub struct Identity {
    pub user_id: Uuid,
    pub display_name: String,
    pub role: UserRole,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_role_defaults_to_student() {
        assert_eq!(UserRole::from_str("superuser"), UserRole::Student);
        assert!(!UserRole::from_str("superuser").is_elevated());
        assert!(UserRole::from_str("instructor").is_elevated());
        assert!(UserRole::from_str("admin").is_elevated());
    }
}
