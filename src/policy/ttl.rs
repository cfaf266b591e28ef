//! TTL Policy
//!
//! Maps a user's activity and status to a cache lifetime. Records that
//! changed recently are trusted briefly; records untouched for a long time
//! are trusted longer. Privileged accounts get the lowest ceilings at every
//! tier since authorization decisions read them.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::models::UserSnapshot;

const MINUTE: Duration = Duration::from_secs(60);
const HOUR: Duration = Duration::from_secs(60 * 60);

// == Account Status ==
/// Coarse classification driving the TTL tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountStatus {
    /// Has a super-user record
    Privileged,
    /// Profile exists but onboarding is not finished
    Onboarding,
    /// Accepted, onboarding finished (or no profile yet)
    Accepted,
    /// Neither accepted nor privileged
    Pending,
}

impl AccountStatus {
    pub fn of(user: &UserSnapshot) -> Self {
        if user.is_super_user() {
            Self::Privileged
        } else if user.has_new_profile() {
            Self::Onboarding
        } else if user.is_accepted {
            Self::Accepted
        } else {
            Self::Pending
        }
    }
}

// == TTL Table ==
/// Lifetimes per tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TtlTable {
    /// Below this age an update counts as "recent"
    pub recent_window: Duration,
    pub privileged_recent: Duration,
    pub privileged_hour: Duration,
    pub privileged_old: Duration,
    pub onboarding: Duration,
    pub accepted_recent: Duration,
    pub accepted_hour: Duration,
    pub accepted_old: Duration,
    /// No activity known, or pending account
    pub default: Duration,
}

impl Default for TtlTable {
    fn default() -> Self {
        Self {
            recent_window: 10 * MINUTE,
            privileged_recent: MINUTE,
            privileged_hour: 3 * MINUTE,
            privileged_old: 10 * MINUTE,
            onboarding: MINUTE,
            accepted_recent: 2 * MINUTE,
            accepted_hour: 5 * MINUTE,
            accepted_old: 15 * MINUTE,
            default: 2 * MINUTE,
        }
    }
}

// == Cache TTL ==
/// Returns the cache lifetime for an account.
///
/// `since_update` is the time elapsed since the last known activity, or
/// `None` when the record carries no activity timestamp at all.
pub fn cache_ttl(
    status: AccountStatus,
    since_update: Option<Duration>,
    table: &TtlTable,
) -> Duration {
    let Some(elapsed) = since_update else {
        return table.default;
    };

    match status {
        AccountStatus::Privileged => tiered(
            elapsed,
            table.recent_window,
            [table.privileged_recent, table.privileged_hour, table.privileged_old],
        ),
        AccountStatus::Onboarding => table.onboarding,
        AccountStatus::Accepted => tiered(
            elapsed,
            table.recent_window,
            [table.accepted_recent, table.accepted_hour, table.accepted_old],
        ),
        AccountStatus::Pending => table.default,
    }
}

fn tiered(elapsed: Duration, recent_window: Duration, tiers: [Duration; 3]) -> Duration {
    if elapsed < recent_window {
        tiers[0]
    } else if elapsed < HOUR {
        tiers[1]
    } else {
        tiers[2]
    }
}

/// Convenience wrapper: derives status and elapsed time from a snapshot.
///
/// Activity stamped in the future counts as "just now".
pub fn ttl_for_user(user: &UserSnapshot, now: DateTime<Utc>, table: &TtlTable) -> Duration {
    let since_update = user
        .last_activity()
        .map(|last| (now - last).to_std().unwrap_or(Duration::ZERO));
    cache_ttl(AccountStatus::of(user), since_update, table)
}
