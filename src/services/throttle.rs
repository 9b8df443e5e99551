use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::config::SharingConfig;

const PRUNE_THRESHOLD: usize = 10_000;

#[derive(Debug, Clone, Copy)]
struct AttemptState {
    failures: u32,
    last_failure: Instant,
    locked_until: Option<Instant>,
}

/// Per-token limiter for incorrect share PINs.
///
/// An attempt is counted as a failure the moment it is admitted and only cleared once the
/// PIN proves correct, so concurrent guesses cannot slip past the allowance. After
/// `max_attempts` counted failures the token is locked for
/// `base * 2^(failures - max_attempts)`, capped at `max_lockout`. State is in-process only.
pub struct PinAttemptLimiter {
    max_attempts: u32,
    base: Duration,
    max_lockout: Duration,
    entries: Mutex<HashMap<String, AttemptState>>,
}

/// An admitted PIN attempt. Dropping it leaves the attempt counted as a failure.
#[must_use = "call `succeed` when the PIN is correct"]
pub struct PinAttempt<'a> {
    limiter: &'a PinAttemptLimiter,
    key: String,
}

impl PinAttempt<'_> {
    /// The PIN was correct: forget every counted failure for this token
    pub fn succeed(self) {
        self.limiter.entries().remove(&self.key);
    }
}

impl PinAttemptLimiter {
    pub fn new(max_attempts: u32, base: Duration, max_lockout: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base,
            max_lockout: max_lockout.max(base),
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &SharingConfig) -> Self {
        Self::new(
            config.pin_max_attempts,
            Duration::from_secs(config.pin_lockout_base_secs),
            Duration::from_secs(config.pin_lockout_max_secs),
        )
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, AttemptState>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Admit and count one PIN attempt, or `Err(retry_after)` while the token is locked.
    ///
    /// The lockout check and the count happen under a single lock acquisition.
    pub fn try_attempt(&self, key: &str, now: Instant) -> Result<PinAttempt<'_>, Duration> {
        let mut entries = self.entries();

        if let Some(until) = entries.get(key).and_then(|s| s.locked_until) {
            if until > now {
                return Err(until - now);
            }
        }

        if entries.len() >= PRUNE_THRESHOLD {
            let horizon = self.max_lockout;
            entries.retain(|_, s| now.saturating_duration_since(s.last_failure) < horizon);
        }

        let state = entries.entry(key.to_string()).or_insert(AttemptState {
            failures: 0,
            last_failure: now,
            locked_until: None,
        });

        // A quiet period as long as the longest lockout starts the count over.
        if now.saturating_duration_since(state.last_failure) >= self.max_lockout {
            state.failures = 0;
        }
        state.failures += 1;
        state.last_failure = now;

        if state.failures >= self.max_attempts {
            let lockout = self.lockout_for(state.failures);
            state.locked_until = Some(now + lockout);
            tracing::warn!(
                "Share PIN attempts exhausted; locking for {}s after {} attempts",
                lockout.as_secs(),
                state.failures
            );
        }

        Ok(PinAttempt {
            limiter: self,
            key: key.to_string(),
        })
    }

    fn lockout_for(&self, failures: u32) -> Duration {
        let exponent = (failures - self.max_attempts).min(20);
        self.base
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_lockout)
            .min(self.max_lockout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter() -> PinAttemptLimiter {
        PinAttemptLimiter::new(3, Duration::from_secs(10), Duration::from_secs(60))
    }

    fn fail(limiter: &PinAttemptLimiter, key: &str, now: Instant) {
        drop(limiter.try_attempt(key, now).unwrap());
    }

    #[test]
    fn test_locks_after_max_attempts() {
        let limiter = limiter();
        let t0 = Instant::now();

        fail(&limiter, "tok", t0);
        fail(&limiter, "tok", t0);
        fail(&limiter, "tok", t0);
        assert_eq!(
            limiter.try_attempt("tok", t0).err(),
            Some(Duration::from_secs(10))
        );
        assert!(limiter.try_attempt("other", t0).is_ok());

        // Refused attempts are not counted, so the lock still ends on time.
        let t1 = t0 + Duration::from_secs(10);
        assert!(limiter.try_attempt("tok", t1).is_ok());
    }

    #[test]
    fn test_concurrent_attempts_cannot_exceed_allowance() {
        let limiter = limiter();
        let t0 = Instant::now();

        // Every attempt is admitted before any of them resolves.
        let admitted: Vec<_> = (0..10).map(|_| limiter.try_attempt("tok", t0)).collect();
        let granted = admitted.iter().filter(|a| a.is_ok()).count();
        assert_eq!(granted, 3);
        assert!(admitted[3..].iter().all(|a| a.is_err()));
    }

    #[test]
    fn test_lockout_grows_exponentially_and_caps() {
        let limiter = limiter();
        let t0 = Instant::now();
        for _ in 0..3 {
            fail(&limiter, "tok", t0);
        }
        let t1 = t0 + Duration::from_secs(10);
        fail(&limiter, "tok", t1);
        assert_eq!(limiter.try_attempt("tok", t1).err(), Some(Duration::from_secs(20)));

        let t2 = t1 + Duration::from_secs(20);
        fail(&limiter, "tok", t2);
        assert_eq!(limiter.try_attempt("tok", t2).err(), Some(Duration::from_secs(40)));

        let t3 = t2 + Duration::from_secs(40);
        fail(&limiter, "tok", t3);
        assert_eq!(limiter.try_attempt("tok", t3).err(), Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_success_clears_state() {
        let limiter = limiter();
        let t0 = Instant::now();
        fail(&limiter, "tok", t0);
        fail(&limiter, "tok", t0);

        // The threshold attempt turns out correct.
        limiter.try_attempt("tok", t0).unwrap().succeed();
        assert!(limiter.try_attempt("tok", t0).is_ok());
    }

    #[test]
    fn test_quiet_period_resets_count() {
        let limiter = limiter();
        let t0 = Instant::now();
        fail(&limiter, "tok", t0);
        fail(&limiter, "tok", t0);

        let later = t0 + Duration::from_secs(61);
        fail(&limiter, "tok", later);
        assert!(limiter.try_attempt("tok", later).is_ok());
    }
}
