//! Denormalized user record
//!
//! The shape the auth path caches per Telegram id: the user document joined
//! with its profile and super-user record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A user with its optional profile and privileged record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSnapshot {
    /// Database id of the user
    pub id: String,
    pub telegram_id: String,
    pub is_accepted: bool,
    #[serde(default)]
    pub profile: Option<ProfileSnapshot>,
    #[serde(default)]
    pub super_user: Option<SuperUserRecord>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_login_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileSnapshot {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub avatar_path: Option<String>,
    /// Onboarding has not been completed yet
    pub is_new: bool,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuperUserRecord {
    #[serde(default)]
    pub granted_at: Option<DateTime<Utc>>,
}

impl UserSnapshot {
    /// Most recent of the user update, last login and profile update.
    pub fn last_activity(&self) -> Option<DateTime<Utc>> {
        [
            self.updated_at,
            self.last_login_at,
            self.profile.as_ref().and_then(|p| p.updated_at),
        ]
        .into_iter()
        .flatten()
        .max()
    }

    pub fn is_super_user(&self) -> bool {
        self.super_user.is_some()
    }

    pub fn has_new_profile(&self) -> bool {
        self.profile.as_ref().is_some_and(|p| p.is_new)
    }
}
