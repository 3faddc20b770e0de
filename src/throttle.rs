//! Brute-force protection through lockout windows
//!
//! A policy counts failed passcode attempts. Once the count reaches the
//! configured maximum, every further failure opens a fresh lockout window
//! measured from that failure. While the window is open the lock rejects
//! attempts without comparing them against the stored passcode.

use crate::constants::{
    LOCKOUT_DEFAULT_SECONDS, MAX_ATTEMPTS_DEFAULT, THROTTLE_BODY_DEFAULT, THROTTLE_TITLE_DEFAULT,
};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Human-readable message shown when the lock throttles
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThrottleMessage {
    pub title: String,
    pub body: String,
}

impl Default for ThrottleMessage {
    fn default() -> Self {
        Self {
            title: THROTTLE_TITLE_DEFAULT.to_string(),
            body: THROTTLE_BODY_DEFAULT.to_string(),
        }
    }
}

/// Persistable view of a policy's counters
///
/// Stored next to the passcode so a lockout survives a restart.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThrottleSnapshot {
    pub failed_attempts: u32,
    /// Wall-clock time of the last failure (Unix epoch milliseconds)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_failure_unix_ms: Option<u64>,
}

/// Decides whether passcode attempts are currently blocked
///
/// Implementations only touch their own counters and timestamps.
pub trait ThrottlePolicy: Send {
    /// Whether an attempt should be rejected right now
    fn is_throttled(&self) -> bool;

    /// Reset the failure counter and clear any lockout
    fn mark_success(&mut self);

    /// Record one failed attempt
    fn mark_failure(&mut self);

    /// Number of consecutive failures since the last success
    fn failed_attempts(&self) -> u32;

    /// Time left in the current lockout window
    fn remaining_lockout(&self) -> Option<Duration>;

    /// Failures left before the first lockout, `None` if the policy never locks
    fn attempts_remaining(&self) -> Option<u32>;

    fn message(&self) -> &ThrottleMessage;

    /// Counters to persist between runs
    fn snapshot(&self) -> ThrottleSnapshot;

    /// Continue from counters persisted by an earlier run
    fn restore(&mut self, snapshot: &ThrottleSnapshot);
}

/// Lockout durations keyed by failure count
///
/// Format: (min_failures, lockout_duration). The highest threshold reached by
/// the failure count applies.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LockoutSchedule {
    thresholds: Vec<(u32, Duration)>,
}

impl Default for LockoutSchedule {
    fn default() -> Self {
        Self::fixed(
            MAX_ATTEMPTS_DEFAULT,
            Duration::from_secs(LOCKOUT_DEFAULT_SECONDS),
        )
    }
}

impl LockoutSchedule {
    /// Same lockout window for every failure at or beyond `max_attempts`
    pub fn fixed(max_attempts: u32, lockout: Duration) -> Self {
        Self {
            thresholds: vec![(max_attempts.max(1), lockout)],
        }
    }

    /// Create a custom schedule; thresholds are sorted by failure count
    pub fn custom(mut thresholds: Vec<(u32, Duration)>) -> Self {
        thresholds.retain(|(min, _)| *min > 0);
        thresholds.sort_by_key(|(min, _)| *min);
        Self { thresholds }
    }

    /// Lockout window for a given number of failures, if any applies
    pub fn duration_for(&self, failed_attempts: u32) -> Option<Duration> {
        self.thresholds
            .iter()
            .rev()
            .find(|(min, _)| failed_attempts >= *min)
            .map(|(_, duration)| *duration)
    }

    /// Failures needed before the first lockout
    pub fn max_attempts(&self) -> Option<u32> {
        self.thresholds.first().map(|(min, _)| *min)
    }
}

/// End of an active lockout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lockout {
    Until(Instant),
    /// The window does not fit in an `Instant`; only a success lifts it
    UntilSuccess,
}

impl Lockout {
    fn starting_now(duration: Duration) -> Self {
        Instant::now()
            .checked_add(duration)
            .map_or(Lockout::UntilSuccess, Lockout::Until)
    }
}

/// Throttle policy that locks out after too many failures
#[derive(Debug, Clone)]
pub struct LockoutThrottlePolicy {
    schedule: LockoutSchedule,
    message: ThrottleMessage,
    failed_attempts: u32,
    last_failure: Option<SystemTime>,
    lockout: Option<Lockout>,
}

impl LockoutThrottlePolicy {
    pub fn new(schedule: LockoutSchedule, message: ThrottleMessage) -> Self {
        Self {
            schedule,
            message,
            failed_attempts: 0,
            last_failure: None,
            lockout: None,
        }
    }

    pub fn schedule(&self) -> &LockoutSchedule {
        &self.schedule
    }
}

impl Default for LockoutThrottlePolicy {
    fn default() -> Self {
        Self::new(LockoutSchedule::default(), ThrottleMessage::default())
    }
}

impl ThrottlePolicy for LockoutThrottlePolicy {
    fn is_throttled(&self) -> bool {
        match self.lockout {
            None => false,
            Some(Lockout::UntilSuccess) => true,
            Some(Lockout::Until(until)) => Instant::now() < until,
        }
    }

    fn mark_success(&mut self) {
        if self.failed_attempts > 0 {
            debug!(
                "Clearing {} failed passcode attempts after success",
                self.failed_attempts
            );
        }
        self.failed_attempts = 0;
        self.last_failure = None;
        self.lockout = None;
    }

    fn mark_failure(&mut self) {
        self.failed_attempts = self.failed_attempts.saturating_add(1);
        self.last_failure = Some(SystemTime::now());

        match self.schedule.duration_for(self.failed_attempts) {
            Some(duration) => {
                warn!(
                    "Passcode lock throttled for {} seconds after {} failed attempts",
                    duration.as_secs(),
                    self.failed_attempts
                );
                self.lockout = Some(Lockout::starting_now(duration));
            }
            None => debug!("Failed passcode attempt #{}", self.failed_attempts),
        }
    }

    fn failed_attempts(&self) -> u32 {
        self.failed_attempts
    }

    fn remaining_lockout(&self) -> Option<Duration> {
        match self.lockout? {
            Lockout::UntilSuccess => Some(Duration::MAX),
            Lockout::Until(until) => until
                .checked_duration_since(Instant::now())
                .filter(|left| !left.is_zero()),
        }
    }

    fn attempts_remaining(&self) -> Option<u32> {
        self.schedule
            .max_attempts()
            .map(|max| max.saturating_sub(self.failed_attempts))
    }

    fn message(&self) -> &ThrottleMessage {
        &self.message
    }

    fn snapshot(&self) -> ThrottleSnapshot {
        ThrottleSnapshot {
            failed_attempts: self.failed_attempts,
            last_failure_unix_ms: self
                .last_failure
                .and_then(|at| at.duration_since(UNIX_EPOCH).ok())
                .and_then(|since| u64::try_from(since.as_millis()).ok()),
        }
    }

    fn restore(&mut self, snapshot: &ThrottleSnapshot) {
        self.failed_attempts = snapshot.failed_attempts;
        self.last_failure = snapshot
            .last_failure_unix_ms
            .and_then(|ms| UNIX_EPOCH.checked_add(Duration::from_millis(ms)));

        let window = self.schedule.duration_for(self.failed_attempts);
        self.lockout = match (window, self.last_failure) {
            (Some(duration), Some(at)) => {
                // A failure stamped in the future (clock moved back) counts as just now
                let elapsed = SystemTime::now().duration_since(at).unwrap_or_default();
                duration
                    .checked_sub(elapsed)
                    .filter(|left| !left.is_zero())
                    .map(Lockout::starting_now)
            }
            // Locked out but the time is unknown: start a fresh window
            (Some(duration), None) => Some(Lockout::starting_now(duration)),
            (None, _) => None,
        };

        if self.lockout.is_some() {
            warn!(
                "Restored passcode lockout after {} failed attempts",
                self.failed_attempts
            );
        }
    }
}

/// Policy that never throttles (tests and configurations that opt out)
#[derive(Debug, Clone, Default)]
pub struct NoThrottlePolicy {
    message: ThrottleMessage,
}

impl NoThrottlePolicy {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ThrottlePolicy for NoThrottlePolicy {
    fn is_throttled(&self) -> bool {
        false
    }

    fn mark_success(&mut self) {}

    fn mark_failure(&mut self) {}

    fn failed_attempts(&self) -> u32 {
        0
    }

    fn remaining_lockout(&self) -> Option<Duration> {
        None
    }

    fn attempts_remaining(&self) -> Option<u32> {
        None
    }

    fn message(&self) -> &ThrottleMessage {
        &self.message
    }

    fn snapshot(&self) -> ThrottleSnapshot {
        ThrottleSnapshot::default()
    }

    fn restore(&mut self, _snapshot: &ThrottleSnapshot) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn policy(max_attempts: u32, lockout: Duration) -> LockoutThrottlePolicy {
        LockoutThrottlePolicy::new(
            LockoutSchedule::fixed(max_attempts, lockout),
            ThrottleMessage::default(),
        )
    }

    #[test]
    fn test_not_throttled_below_limit() {
        let mut policy = policy(3, Duration::from_secs(60));
        policy.mark_failure();
        policy.mark_failure();
        assert!(!policy.is_throttled());
        assert_eq!(policy.failed_attempts(), 2);
        assert_eq!(policy.attempts_remaining(), Some(1));
    }

    #[test]
    fn test_throttled_at_limit() {
        let mut policy = policy(3, Duration::from_secs(60));
        for _ in 0..3 {
            policy.mark_failure();
        }
        assert!(policy.is_throttled());
        assert_eq!(policy.attempts_remaining(), Some(0));
        let remaining = policy.remaining_lockout().expect("Should be locked out");
        assert!(remaining <= Duration::from_secs(60));
        assert!(remaining > Duration::from_secs(55));
    }

    #[test]
    fn test_success_clears_lockout() {
        let mut policy = policy(2, Duration::from_secs(60));
        policy.mark_failure();
        policy.mark_failure();
        assert!(policy.is_throttled());

        policy.mark_success();
        assert!(!policy.is_throttled());
        assert_eq!(policy.failed_attempts(), 0);
        assert!(policy.remaining_lockout().is_none());
    }

    #[test]
    fn test_lockout_window_elapses() {
        let mut policy = policy(1, Duration::from_millis(200));
        policy.mark_failure();
        assert!(policy.is_throttled());

        thread::sleep(Duration::from_millis(300));
        assert!(!policy.is_throttled(), "Window should have elapsed");
        // Counter is kept until a success
        assert_eq!(policy.failed_attempts(), 1);
    }

    #[test]
    fn test_failure_after_window_rethrottles() {
        let mut policy = policy(1, Duration::from_millis(200));
        policy.mark_failure();
        thread::sleep(Duration::from_millis(300));
        assert!(!policy.is_throttled());

        policy.mark_failure();
        assert!(policy.is_throttled(), "Next failure opens a fresh window");
    }

    #[test]
    fn test_progressive_schedule() {
        let schedule = LockoutSchedule::custom(vec![
            (6, Duration::from_secs(300)),
            (4, Duration::from_secs(30)),
            (0, Duration::from_secs(1)),
        ]);

        assert_eq!(schedule.max_attempts(), Some(4));
        assert!(schedule.duration_for(3).is_none());
        assert_eq!(schedule.duration_for(4), Some(Duration::from_secs(30)));
        assert_eq!(schedule.duration_for(5), Some(Duration::from_secs(30)));
        assert_eq!(schedule.duration_for(6), Some(Duration::from_secs(300)));
        assert_eq!(schedule.duration_for(100), Some(Duration::from_secs(300)));
    }

    #[test]
    fn test_unbounded_window_holds_until_success() {
        let mut policy = LockoutThrottlePolicy::new(
            LockoutSchedule::custom(vec![(1, Duration::MAX)]),
            ThrottleMessage::default(),
        );
        policy.mark_failure();
        assert!(policy.is_throttled());
        assert_eq!(policy.remaining_lockout(), Some(Duration::MAX));

        policy.mark_failure();
        assert!(policy.is_throttled());

        policy.mark_success();
        assert!(!policy.is_throttled());
        assert!(policy.remaining_lockout().is_none());
    }

    #[test]
    fn test_snapshot_restores_active_lockout() {
        let mut first = policy(2, Duration::from_secs(60));
        first.mark_failure();
        first.mark_failure();
        let snapshot = first.snapshot();
        assert_eq!(snapshot.failed_attempts, 2);
        assert!(snapshot.last_failure_unix_ms.is_some());

        let mut second = policy(2, Duration::from_secs(60));
        second.restore(&snapshot);
        assert!(second.is_throttled());
        assert_eq!(second.failed_attempts(), 2);
        let remaining = second.remaining_lockout().expect("Lockout should carry over");
        assert!(remaining <= Duration::from_secs(60));
        assert!(remaining > Duration::from_secs(55));
    }

    #[test]
    fn test_restore_after_window_elapsed() {
        let two_minutes_ago = SystemTime::now() - Duration::from_secs(120);
        let snapshot = ThrottleSnapshot {
            failed_attempts: 3,
            last_failure_unix_ms: Some(
                two_minutes_ago.duration_since(UNIX_EPOCH).unwrap().as_millis() as u64,
            ),
        };

        let mut policy = policy(3, Duration::from_secs(60));
        policy.restore(&snapshot);
        assert!(!policy.is_throttled());
        // Counter is kept, so the next failure locks again
        assert_eq!(policy.failed_attempts(), 3);
        policy.mark_failure();
        assert!(policy.is_throttled());
    }

    #[test]
    fn test_restore_with_future_timestamp_locks_full_window() {
        let later = SystemTime::now() + Duration::from_secs(3600);
        let snapshot = ThrottleSnapshot {
            failed_attempts: 3,
            last_failure_unix_ms: Some(later.duration_since(UNIX_EPOCH).unwrap().as_millis() as u64),
        };

        let mut policy = policy(3, Duration::from_secs(60));
        policy.restore(&snapshot);
        assert!(policy.is_throttled());
        assert!(policy.remaining_lockout().unwrap() > Duration::from_secs(55));
    }

    #[test]
    fn test_empty_snapshot_after_success() {
        let mut policy = policy(3, Duration::from_secs(60));
        policy.mark_failure();
        policy.mark_success();
        assert_eq!(policy.snapshot(), ThrottleSnapshot::default());
    }

    #[test]
    fn test_no_throttle_policy_never_throttles() {
        let mut policy = NoThrottlePolicy::new();
        for _ in 0..50 {
            policy.mark_failure();
        }
        assert!(!policy.is_throttled());
        assert_eq!(policy.failed_attempts(), 0);
        assert!(policy.attempts_remaining().is_none());
    }
}
