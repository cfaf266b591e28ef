//! Tag Deriver
//!
//! Classifies a user record into the tags attached on write. Every rule has
//! an "else" branch, so missing optional fields never fail derivation.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};

use crate::models::UserSnapshot;

// == Tag Names ==
pub const USER_DATA: &str = "user_data";
pub const ACCEPTED_USERS: &str = "accepted_users";
pub const PENDING_USERS: &str = "pending_users";
pub const USERS_WITH_PROFILE: &str = "users_with_profile";
pub const USERS_WITHOUT_PROFILE: &str = "users_without_profile";
pub const NEW_PROFILES: &str = "new_profiles";
pub const COMPLETED_PROFILES: &str = "completed_profiles";
pub const SUPER_USERS: &str = "super_users";
pub const REGULAR_USERS: &str = "regular_users";
pub const ACTIVE_USERS: &str = "active_users";
pub const RECENT_USERS: &str = "recent_users";
pub const INACTIVE_USERS: &str = "inactive_users";
pub const NEW_USERS: &str = "new_users";
pub const RECENT_REGISTRATIONS: &str = "recent_registrations";
pub const ONBOARDING_COMPLETED: &str = "onboarding_completed";

/// `user:<id>` tag addressing everything cached for one user.
pub fn user_tag(id: &str) -> String {
    format!("user:{}", id)
}

// == Thresholds ==
/// Day thresholds for the activity and registration buckets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagThresholds {
    /// Logged in within this many days: `active_users`
    pub active_days: i64,
    /// Logged in within this many days: `recent_users`
    pub recent_days: i64,
    /// Created within this many days: `recent_registrations`
    pub new_registration_days: i64,
}

impl Default for TagThresholds {
    fn default() -> Self {
        Self {
            active_days: 1,
            recent_days: 7,
            new_registration_days: 1,
        }
    }
}

// == Derive Tags ==
/// Returns the full tag set for a user record as of `now`.
pub fn derive_tags(
    user: &UserSnapshot,
    now: DateTime<Utc>,
    thresholds: &TagThresholds,
) -> BTreeSet<String> {
    let mut tags = BTreeSet::new();

    tags.insert(user_tag(&user.id));
    tags.insert(USER_DATA.to_string());

    tags.insert(pick(user.is_accepted, ACCEPTED_USERS, PENDING_USERS));

    match &user.profile {
        Some(profile) => {
            tags.insert(USERS_WITH_PROFILE.to_string());
            tags.insert(pick(profile.is_new, NEW_PROFILES, COMPLETED_PROFILES));
        }
        None => {
            tags.insert(USERS_WITHOUT_PROFILE.to_string());
        }
    }

    tags.insert(pick(user.is_super_user(), SUPER_USERS, REGULAR_USERS));

    // Never logged in reads as "long ago".
    let activity = match user.last_login_at {
        Some(login) if now - login < days(thresholds.active_days) => ACTIVE_USERS,
        Some(login) if now - login < days(thresholds.recent_days) => RECENT_USERS,
        _ => INACTIVE_USERS,
    };
    tags.insert(activity.to_string());

    if user.has_new_profile() {
        tags.insert(NEW_USERS.to_string());
    }

    if let Some(created) = user.created_at {
        if now - created < days(thresholds.new_registration_days) {
            tags.insert(RECENT_REGISTRATIONS.to_string());
        }
    }

    tags
}

/// Day count as a duration, saturating for thresholds chrono cannot represent.
fn days(n: i64) -> Duration {
    Duration::try_days(n).unwrap_or(if n < 0 { Duration::MIN } else { Duration::MAX })
}

fn pick(flag: bool, yes: &str, no: &str) -> String {
    let tag = if flag { yes } else { no };
    tag.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ProfileSnapshot, SuperUserRecord};

    fn bare(id: &str) -> UserSnapshot {
        UserSnapshot {
            id: id.to_string(),
            telegram_id: "7".to_string(),
            is_accepted: false,
            profile: None,
            super_user: None,
            created_at: None,
            updated_at: None,
            last_login_at: None,
        }
    }

    fn has(tags: &BTreeSet<String>, tag: &str) -> bool {
        tags.contains(tag)
    }

    #[test]
    fn test_bare_user_degrades_to_else_branches() {
        let tags = derive_tags(&bare("42"), Utc::now(), &TagThresholds::default());

        let expected: BTreeSet<String> = [
            "user:42",
            USER_DATA,
            PENDING_USERS,
            USERS_WITHOUT_PROFILE,
            REGULAR_USERS,
            INACTIVE_USERS,
        ]
        .into_iter()
        .map(String::from)
        .collect();
        assert_eq!(tags, expected);
    }

    #[test]
    fn test_full_user_with_new_profile() {
        let now = Utc::now();
        let mut user = bare("9");
        user.is_accepted = true;
        user.super_user = Some(SuperUserRecord { granted_at: None });
        user.profile = Some(ProfileSnapshot {
            name: None,
            avatar_path: None,
            is_new: true,
            updated_at: None,
        });
        user.last_login_at = Some(now - Duration::hours(2));
        user.created_at = Some(now - Duration::hours(3));

        let tags = derive_tags(&user, now, &TagThresholds::default());

        for tag in [
            ACCEPTED_USERS,
            USERS_WITH_PROFILE,
            NEW_PROFILES,
            SUPER_USERS,
            ACTIVE_USERS,
            NEW_USERS,
            RECENT_REGISTRATIONS,
        ] {
            assert!(has(&tags, tag), "missing {}", tag);
        }
        assert!(!has(&tags, COMPLETED_PROFILES));
        assert!(!has(&tags, REGULAR_USERS));
    }

    #[test]
    fn test_activity_buckets() {
        let now = Utc::now();
        let thresholds = TagThresholds::default();
        let mut user = bare("1");

        user.last_login_at = Some(now - Duration::days(3));
        assert!(has(&derive_tags(&user, now, &thresholds), RECENT_USERS));

        user.last_login_at = Some(now - Duration::days(30));
        assert!(has(&derive_tags(&user, now, &thresholds), INACTIVE_USERS));

        user.last_login_at = Some(now - Duration::minutes(5));
        let tags = derive_tags(&user, now, &thresholds);
        assert!(has(&tags, ACTIVE_USERS));
        assert!(!has(&tags, RECENT_USERS));
        assert!(!has(&tags, INACTIVE_USERS));
    }

    #[test]
    fn test_custom_thresholds() {
        let now = Utc::now();
        let thresholds = TagThresholds {
            active_days: 5,
            recent_days: 10,
            new_registration_days: 30,
        };
        let mut user = bare("1");
        user.last_login_at = Some(now - Duration::days(3));
        user.created_at = Some(now - Duration::days(20));

        let tags = derive_tags(&user, now, &thresholds);
        assert!(has(&tags, ACTIVE_USERS));
        assert!(has(&tags, RECENT_REGISTRATIONS));
    }

    #[test]
    fn test_completed_profile_has_no_new_users_tag() {
        let mut user = bare("1");
        user.profile = Some(ProfileSnapshot {
            name: Some("Bo".to_string()),
            avatar_path: None,
            is_new: false,
            updated_at: None,
        });
        let tags = derive_tags(&user, Utc::now(), &TagThresholds::default());
        assert!(has(&tags, COMPLETED_PROFILES));
        assert!(!has(&tags, NEW_USERS));
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let now = Utc::now();
        let mut user = bare("5");
        user.created_at = Some(now - Duration::days(4));
        let a = derive_tags(&user, now, &TagThresholds::default());
        let b = derive_tags(&user, now, &TagThresholds::default());
        assert_eq!(a, b);
        assert!(!has(&a, RECENT_REGISTRATIONS));
    }

    #[test]
    fn test_out_of_range_thresholds_saturate() {
        let now = Utc::now();
        let thresholds = TagThresholds {
            active_days: 200_000_000_000_000,
            recent_days: i64::MAX,
            new_registration_days: i64::MIN,
        };
        let mut user = bare("1");
        user.last_login_at = Some(now - Duration::days(400));
        user.created_at = Some(now - Duration::hours(1));

        let tags = derive_tags(&user, now, &thresholds);
        assert!(has(&tags, ACTIVE_USERS));
        assert!(!has(&tags, RECENT_REGISTRATIONS));
    }
}
