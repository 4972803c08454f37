//! Authenticated identity and session record types.
//!
//! An [`Identity`] is what a validated bearer token resolves to. The
//! [`SessionRecord`] is the server-side half of a session: it is written to the
//! session store at issuance and deleted at logout, and its presence is what
//! makes an otherwise stateless signed token usable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use std::fmt;
use std::str::FromStr;

/// Role attached to a user account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    User,
    Curator,
    Admin,
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserRole::User => write!(f, "user"),
            UserRole::Curator => write!(f, "curator"),
            UserRole::Admin => write!(f, "admin"),
        }
    }
}

impl FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" | "0" => Ok(UserRole::User),
            "curator" | "1" => Ok(UserRole::Curator),
            "admin" | "2" => Ok(UserRole::Admin),
            other => Err(format!("invalid user role: '{other}'")),
        }
    }
}

impl Default for UserRole {
    fn default() -> Self {
        UserRole::User
    }
}

/// The account a token is issued for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: UserRole,
}

/// Who a validated token belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub subject_id: String,
    pub name: String,
    pub email: String,
    pub role: UserRole,
    pub expires_at: DateTime<Utc>,
}

/// Server-side record backing a bearer token, keyed by `session:{token}`.
///
/// Stored with a TTL equal to the token's validity window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub token: String,
    pub subject_id: String,
    pub name: String,
    pub email: String,
    pub role: UserRole,
    pub expires_at: DateTime<Utc>,
}

impl SessionRecord {
    pub fn identity(&self) -> Identity {
        Identity {
            subject_id: self.subject_id.clone(),
            name: self.name.clone(),
            email: self.email.clone(),
            role: self.role,
            expires_at: self.expires_at,
        }
    }
}

/// Claims carried inside the signed token.
///
/// `jti` makes two tokens issued for the same user in the same second distinct,
/// so each one gets its own session record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: String,
    pub name: String,
    pub email: String,
    pub role: UserRole,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_role_roundtrip() {
        for role in [UserRole::User, UserRole::Curator, UserRole::Admin] {
            let parsed: UserRole = role.to_string().parse().unwrap();
            assert_eq!(role, parsed);
        }
    }

    #[test]
    fn test_user_role_accepts_numeric_codes() {
        assert_eq!("2".parse::<UserRole>().unwrap(), UserRole::Admin);
        assert!("superuser".parse::<UserRole>().is_err());
    }

    #[test]
    fn test_session_record_identity() {
        let record = SessionRecord {
            token: "t".to_string(),
            subject_id: "7".to_string(),
            name: "Ana".to_string(),
            email: "ana@example.com".to_string(),
            role: UserRole::Curator,
            expires_at: Utc::now(),
        };
        let identity = record.identity();
        assert_eq!(identity.subject_id, "7");
        assert_eq!(identity.role, UserRole::Curator);
    }
}
