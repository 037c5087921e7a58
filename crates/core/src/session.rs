use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::user::UserId;

/// Process-scoped idle-session context. The original system kept a
/// module-level inactivity timer; here the lifecycle is explicit and
/// the clock is passed in, so expiry is testable without sleeping.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionContext {
    pub user_id: UserId,
    pub started_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    idle_timeout_secs: i64,
}

impl SessionContext {
    pub fn start(user_id: UserId, idle_timeout_secs: u64, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            started_at: now,
            last_activity: now,
            idle_timeout_secs: idle_timeout_secs.min(i64::MAX as u64) as i64,
        }
    }

    /// Any user activity resets the idle window.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_activity = now;
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.last_activity + Duration::seconds(self.idle_timeout_secs)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use crate::domain::user::UserId;
    use crate::session::SessionContext;

    const TWO_HOURS_SECS: u64 = 7200;

    #[test]
    fn session_expires_after_the_idle_window() {
        let start = Utc::now();
        let session = SessionContext::start(UserId("u-1".to_string()), TWO_HOURS_SECS, start);

        assert!(!session.is_expired(start + Duration::minutes(119)));
        assert!(session.is_expired(start + Duration::hours(2)));
    }

    #[test]
    fn activity_resets_the_idle_window() {
        let start = Utc::now();
        let mut session = SessionContext::start(UserId("u-1".to_string()), TWO_HOURS_SECS, start);

        session.touch(start + Duration::minutes(90));
        assert!(!session.is_expired(start + Duration::hours(2)));
        assert!(session.is_expired(start + Duration::minutes(90) + Duration::hours(2)));
    }

    #[test]
    fn expiry_boundary_is_inclusive() {
        let start = Utc::now();
        let session = SessionContext::start(UserId("u-1".to_string()), 60, start);

        assert!(session.is_expired(start + Duration::seconds(60)));
        assert!(!session.is_expired(start + Duration::seconds(59)));
    }
}
