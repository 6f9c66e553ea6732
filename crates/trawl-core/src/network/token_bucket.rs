//! Minimal token-bucket limiter for the crawler's outbound API calls.
//! Hand-rolled rather than pulled from a limiter crate — narrow enough
//! that a dependency isn't worth it.

use std::time::{Duration, Instant};

use tokio::sync::Mutex;

pub struct TokenBucket {
    capacity: f64,
    tokens: Mutex<(f64, Instant)>,
    refill_per_sec: f64,
}

impl TokenBucket {
    #[must_use]
    pub fn new(rate_per_sec: u32) -> Self {
        let rate = f64::from(rate_per_sec.max(1));
        Self {
            capacity: rate,
            tokens: Mutex::new((rate, Instant::now())),
            refill_per_sec: rate,
        }
    }

    /// Block until a single token is available, then consume it.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut guard = self.tokens.lock().await;
                let (tokens, last) = &mut *guard;
                let now = Instant::now();
                let elapsed = now.duration_since(*last).as_secs_f64();
                *tokens = (*tokens + elapsed * self.refill_per_sec).min(self.capacity);
                *last = now;

                if *tokens >= 1.0 {
                    *tokens -= 1.0;
                    None
                } else {
                    let deficit = 1.0 - *tokens;
                    Some(Duration::from_secs_f64(deficit / self.refill_per_sec))
                }
            };
            match wait {
                None => return,
                Some(d) => tokio::time::sleep(d).await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn allows_burst_up_to_capacity_then_throttles() {
        let bucket = TokenBucket::new(5);
        let start = Instant::now();
        for _ in 0..5 {
            bucket.acquire().await;
        }
        // First 5 tokens should be near-instant (full bucket).
        assert!(start.elapsed() < Duration::from_millis(200));

        let before_sixth = Instant::now();
        bucket.acquire().await;
        // The 6th acquire must wait for a partial refill.
        assert!(before_sixth.elapsed() >= Duration::from_millis(100));
    }
}
