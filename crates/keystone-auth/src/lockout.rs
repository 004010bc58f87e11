//! Brute-force lockout policy.
//!
//! Pure function from a failed-attempt count to a lock duration. The
//! store applies it in the same transaction as the failure-counter
//! increment, and the credential flow checks `locked_until` *before*
//! invoking the password hasher, so a locked account fails fast and
//! does not leak timing differences between "locked" and "wrong
//! password".

use chrono::Duration;
use keystone_core::models::user::LockoutSchedule;

/// Failures below this threshold cause no lock.
pub const FREE_ATTEMPTS: u32 = 5;
/// From this count on, the lock is a flat 24 hours.
pub const HARD_LOCK_ATTEMPTS: u32 = 10;

/// Lock duration after `failed_attempts` consecutive failures.
///
/// - `< 5`: no lock.
/// - `5..=9`: `2^(n-5)` minutes (1, 2, 4, 8, 16).
/// - `>= 10`: 24 hours.
pub fn lock_duration(failed_attempts: u32) -> Duration {
    if failed_attempts < FREE_ATTEMPTS {
        Duration::zero()
    } else if failed_attempts < HARD_LOCK_ATTEMPTS {
        Duration::minutes(1i64 << (failed_attempts - FREE_ATTEMPTS))
    } else {
        Duration::hours(24)
    }
}

/// The same policy as data, handed to the store so the lock is written
/// in the same transaction as the counter increment.
pub fn schedule() -> LockoutSchedule {
    LockoutSchedule {
        free_attempts: FREE_ATTEMPTS,
        hard_attempts: HARD_LOCK_ATTEMPTS,
        step_lock_secs: (FREE_ATTEMPTS..HARD_LOCK_ATTEMPTS)
            .map(|n| lock_duration(n).num_seconds() as u64)
            .collect(),
        hard_lock_secs: lock_duration(HARD_LOCK_ATTEMPTS).num_seconds() as u64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_lock_below_threshold() {
        for n in 0..FREE_ATTEMPTS {
            assert_eq!(lock_duration(n), Duration::zero(), "attempts = {n}");
        }
    }

    #[test]
    fn exponential_window() {
        assert_eq!(lock_duration(5), Duration::minutes(1));
        assert_eq!(lock_duration(6), Duration::minutes(2));
        assert_eq!(lock_duration(7), Duration::minutes(4));
        assert_eq!(lock_duration(8), Duration::minutes(8));
        assert_eq!(lock_duration(9), Duration::minutes(16));
    }

    #[test]
    fn hard_lock_at_ten_and_beyond() {
        assert_eq!(lock_duration(10), Duration::hours(24));
        assert_eq!(lock_duration(11), Duration::hours(24));
        assert_eq!(lock_duration(1000), Duration::hours(24));
    }

    #[test]
    fn schedule_mirrors_lock_duration() {
        let schedule = schedule();
        assert_eq!(schedule.free_attempts, FREE_ATTEMPTS);
        assert_eq!(schedule.hard_attempts, HARD_LOCK_ATTEMPTS);
        assert_eq!(schedule.step_lock_secs, vec![60, 120, 240, 480, 960]);
        assert_eq!(schedule.hard_lock_secs, 86_400);
    }
}
