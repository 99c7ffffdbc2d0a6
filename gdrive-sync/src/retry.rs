use rand::Rng;
use std::time::Duration;

/// A bounded number of attempts separated by capped, doubling delays.
///
/// Jittered delays land in the upper half of the current window.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    jitter: bool,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
            jitter: true,
        }
    }

    /// No sleeping between attempts. Handy for tests and dry runs.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO, Duration::ZERO).without_jitter()
    }

    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Whether another attempt is allowed after `attempt` (zero-based) failed.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt.saturating_add(1) < self.max_attempts
    }

    pub fn delay_for<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let window = self
            .base_delay
            .saturating_mul(1u32 << attempt.min(16))
            .min(self.max_delay);
        if !self.jitter || window.is_zero() {
            return window;
        }
        let window_ms = u64::try_from(window.as_millis()).unwrap_or(u64::MAX);
        Duration::from_millis(rng.gen_range(window_ms / 2..=window_ms))
    }

    pub async fn wait(&self, attempt: u32) {
        let delay = self.delay_for(attempt, &mut rand::thread_rng());
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5, Duration::from_millis(250), Duration::from_secs(10))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn unjittered_delay_doubles_until_capped() {
        let policy = RetryPolicy::new(6, Duration::from_millis(100), Duration::from_millis(800))
            .without_jitter();
        let mut rng = StdRng::seed_from_u64(1);
        let delays: Vec<_> = (0..5)
            .map(|attempt| policy.delay_for(attempt, &mut rng).as_millis())
            .collect();
        assert_eq!(delays, vec![100, 200, 400, 800, 800]);
    }

    #[test]
    fn jittered_delay_stays_in_upper_half() {
        let policy = RetryPolicy::new(6, Duration::from_millis(100), Duration::from_millis(800));
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..32 {
            let delay = policy.delay_for(2, &mut rng);
            assert!(delay >= Duration::from_millis(200));
            assert!(delay <= Duration::from_millis(400));
        }
    }

    #[test]
    fn policy_bounds_attempts() {
        let policy = RetryPolicy::immediate(3);
        assert!(policy.should_retry(0));
        assert!(policy.should_retry(1));
        assert!(!policy.should_retry(2));
        assert_eq!(RetryPolicy::immediate(0).max_attempts(), 1);
        assert!(policy.delay_for(4, &mut rand::thread_rng()).is_zero());
    }
}
