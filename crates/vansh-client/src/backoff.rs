//! Exponential reconnect delays with jitter.

use std::time::Duration;

/// Delay schedule for consecutive failures: `base * 2^n` plus up to half of
/// `base` of random jitter, capped, for at most `max_attempts` tries.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    cap: Duration,
    max_attempts: u32,
    attempt: u32,
}

impl Backoff {
    pub fn new(base: Duration, cap: Duration, max_attempts: u32) -> Self {
        Self {
            base,
            cap,
            max_attempts,
            attempt: 0,
        }
    }

    /// Failures recorded since the last reset.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Delay before the next attempt, or `None` once attempts are exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempt >= self.max_attempts {
            return None;
        }
        let factor = 1u32 << self.attempt.min(16);
        self.attempt += 1;

        let base_ms = self.base.as_millis() as u64;
        let jitter_ms = if base_ms > 1 {
            fastrand::u64(0..base_ms / 2)
        } else {
            0
        };
        let delay = self
            .base
            .saturating_mul(factor)
            .saturating_add(Duration::from_millis(jitter_ms));
        Some(delay.min(self.cap))
    }

    /// A connection succeeded.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

/// Parse a `Retry-After` header value (seconds or HTTP-date).
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    if let Ok(secs) = value.trim().parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    // HTTP-date: not worth a date parser, wait a conservative interval.
    if value.contains(',') || value.contains("GMT") {
        return Some(Duration::from_secs(5));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grows_and_caps() {
        let mut b = Backoff::new(Duration::from_millis(100), Duration::from_millis(450), 5);
        let delays: Vec<_> = std::iter::from_fn(|| b.next_delay()).collect();
        assert_eq!(delays.len(), 5);
        assert!(delays[0] >= Duration::from_millis(100) && delays[0] < Duration::from_millis(150));
        assert!(delays[1] >= Duration::from_millis(200) && delays[1] < Duration::from_millis(250));
        assert!(delays[2] >= Duration::from_millis(400));
        assert!(delays.iter().all(|d| *d <= Duration::from_millis(450)));
        assert_eq!(b.next_delay(), None);

        b.reset();
        assert_eq!(b.attempt(), 0);
        assert!(b.next_delay().is_some());
    }

    #[test]
    fn zero_attempts_never_retries() {
        let mut b = Backoff::new(Duration::from_millis(10), Duration::from_secs(1), 0);
        assert_eq!(b.next_delay(), None);
    }

    #[test]
    fn retry_after_forms() {
        assert_eq!(parse_retry_after(" 7 "), Some(Duration::from_secs(7)));
        assert_eq!(
            parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"),
            Some(Duration::from_secs(5))
        );
        assert_eq!(parse_retry_after("later"), None);
    }
}
