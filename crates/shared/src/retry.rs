use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Exponential backoff policy wrapped around a whole operation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total tries including the first one.
    pub max_tries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Fraction (0.0..=1.0) of each delay that may be randomly shaved off.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_tries: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
            jitter: 0.25,
        }
    }
}

/// Final error of a retried operation and how many tries it consumed.
#[derive(Debug)]
pub struct Exhausted<E> {
    pub tries: u32,
    pub last_error: E,
}

impl RetryPolicy {
    /// No waiting between tries. Used by tests and dry runs.
    pub fn immediate(max_tries: u32) -> Self {
        Self {
            max_tries,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter: 0.0,
        }
    }

    /// Upper bound of the pause before try `try_index` (0-based), before jitter.
    pub fn nominal_delay(&self, try_index: u32) -> Duration {
        if try_index == 0 {
            return Duration::ZERO;
        }
        let factor = 1u32.checked_shl(try_index - 1).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Pause before try `try_index`: `base * 2^(n-1)`, capped, minus jitter.
    pub fn delay_before(&self, try_index: u32) -> Duration {
        let nominal = self.nominal_delay(try_index);
        let jitter = self.jitter.clamp(0.0, 1.0);
        if nominal.is_zero() || jitter == 0.0 {
            return nominal;
        }
        let shave = rand::rng().random_range(0.0..=jitter);
        nominal.mul_f64(1.0 - shave)
    }

    /// Runs `op` until it succeeds or `max_tries` is reached.
    pub async fn run<T, E, F, Fut>(&self, mut op: F) -> Result<(T, u32), Exhausted<E>>
    where
        E: std::fmt::Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let max_tries = self.max_tries.max(1);
        let mut try_index = 0;

        loop {
            let delay = self.delay_before(try_index);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            match op(try_index).await {
                Ok(value) => return Ok((value, try_index + 1)),
                Err(e) => {
                    try_index += 1;
                    if try_index >= max_tries {
                        return Err(Exhausted {
                            tries: try_index,
                            last_error: e,
                        });
                    }
                    warn!(
                        attempt = try_index,
                        max_tries,
                        next_delay_ms = self.nominal_delay(try_index).as_millis() as u64,
                        error = %e,
                        "try failed, backing off"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};

    #[test]
    fn first_try_has_no_delay() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_before(0), Duration::ZERO);
    }

    #[test]
    fn delay_doubles_each_retry() {
        let policy = RetryPolicy {
            max_tries: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            jitter: 0.0,
        };

        assert_eq!(policy.delay_before(1), Duration::from_millis(100));
        assert_eq!(policy.delay_before(2), Duration::from_millis(200));
        assert_eq!(policy.delay_before(3), Duration::from_millis(400));
    }

    #[test]
    fn delay_is_capped() {
        let policy = RetryPolicy {
            max_tries: 50,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
            jitter: 0.0,
        };

        assert_eq!(policy.delay_before(10), Duration::from_millis(500));
        assert_eq!(policy.delay_before(40), Duration::from_millis(500));
    }

    #[test]
    fn jitter_never_exceeds_nominal_delay() {
        let policy = RetryPolicy {
            max_tries: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            jitter: 0.5,
        };

        for _ in 0..20 {
            let delay = policy.delay_before(2);
            assert!(delay <= Duration::from_millis(200));
            assert!(delay >= Duration::from_millis(100));
        }
    }

    #[tokio::test]
    async fn stops_at_first_success() {
        let calls = Cell::new(0);
        let result = RetryPolicy::immediate(3)
            .run(|n| {
                calls.set(calls.get() + 1);
                async move {
                    if n < 1 {
                        Err("boom")
                    } else {
                        Ok("done")
                    }
                }
            })
            .await;

        let (value, tries) = result.unwrap();
        assert_eq!(value, "done");
        assert_eq!(tries, 2);
        assert_eq!(calls.get(), 2);
    }

    #[tokio::test]
    async fn gives_up_after_max_tries() {
        let calls = Cell::new(0);
        let result: Result<((), u32), _> = RetryPolicy::immediate(3)
            .run(|_| {
                calls.set(calls.get() + 1);
                async { Err("still broken") }
            })
            .await;

        let exhausted = result.unwrap_err();
        assert_eq!(exhausted.tries, 3);
        assert_eq!(exhausted.last_error, "still broken");
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn waits_base_then_double_between_tries() {
        let policy = RetryPolicy {
            max_tries: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            jitter: 0.0,
        };
        let start = tokio::time::Instant::now();
        let started_at = RefCell::new(Vec::new());

        let result: Result<((), u32), _> = policy
            .run(|_| {
                started_at.borrow_mut().push(start.elapsed());
                async { Err("down") }
            })
            .await;

        assert_eq!(result.unwrap_err().tries, 3);
        assert_eq!(
            started_at.into_inner(),
            [
                Duration::ZERO,
                Duration::from_millis(100),
                Duration::from_millis(300),
            ]
        );
    }
}
