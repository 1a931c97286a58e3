use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::db::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    User,
    Guide,
    LeadGuide,
    Admin,
    Owner,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Guide => "guide",
            Role::LeadGuide => "lead-guide",
            Role::Admin => "admin",
            Role::Owner => "owner",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "guide" => Ok(Role::Guide),
            "lead-guide" => Ok(Role::LeadGuide),
            "admin" => Ok(Role::Admin),
            "owner" => Ok(Role::Owner),
            other => Err(StoreError::Corrupt(format!("unknown role {other}"))),
        }
    }
}

/// A principal. `password_hash` and the reset fields never leave the process.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub photo: String,
    pub role: Role,
    #[serde(skip_serializing)]
    pub password_hash: String,
    #[serde(skip_serializing)]
    pub password_changed_at: Option<OffsetDateTime>,
    #[serde(skip_serializing)]
    pub password_reset_hash: Option<String>,
    #[serde(skip_serializing)]
    pub password_reset_expires_at: Option<OffsetDateTime>,
    #[serde(skip_serializing)]
    pub active: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Row shape in the `users` table.
#[derive(Debug, FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub photo: String,
    pub role: String,
    pub password_hash: String,
    pub password_changed_at: Option<OffsetDateTime>,
    pub password_reset_hash: Option<String>,
    pub password_reset_expires_at: Option<OffsetDateTime>,
    pub active: bool,
    pub created_at: OffsetDateTime,
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(r: UserRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            name: r.name,
            email: r.email,
            photo: r.photo,
            role: r.role.parse()?,
            password_hash: r.password_hash,
            password_changed_at: r.password_changed_at,
            password_reset_hash: r.password_reset_hash,
            password_reset_expires_at: r.password_reset_expires_at,
            active: r.active,
            created_at: r.created_at,
        })
    }
}

/// Input for creating a principal. The password is already hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
}

pub const DEFAULT_PHOTO: &str = "default.png";

impl User {
    pub fn from_new(new: NewUser, now: OffsetDateTime) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: new.name,
            email: new.email,
            photo: DEFAULT_PHOTO.to_string(),
            role: new.role,
            password_hash: new.password_hash,
            password_changed_at: None,
            password_reset_hash: None,
            password_reset_expires_at: None,
            active: true,
            created_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialization_hides_credentials() {
        let user = User::from_new(
            NewUser {
                name: "Jonas".into(),
                email: "jonas@example.com".into(),
                password_hash: "$argon2id$secret".into(),
                role: Role::LeadGuide,
            },
            OffsetDateTime::now_utc(),
        );
        let json = serde_json::to_value(&user).unwrap();
        assert_eq!(json["role"], "lead-guide");
        assert_eq!(json["email"], "jonas@example.com");
        assert!(json.get("passwordHash").is_none());
        assert!(json.get("active").is_none());
        assert!(!json.to_string().contains("argon2"));
    }

    #[test]
    fn roles_round_trip_through_text() {
        for role in [Role::User, Role::Guide, Role::LeadGuide, Role::Admin, Role::Owner] {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
        assert!("root".parse::<Role>().is_err());
    }
}
