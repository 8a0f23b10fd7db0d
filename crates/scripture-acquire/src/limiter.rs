use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore, SemaphorePermit};
use tokio::time::Instant;

/// Request gate shared by every fetch in a run: caps requests in flight and
/// spaces request starts at least `min_interval` apart.
///
/// Built once per run and handed to the client explicitly, so two runs in
/// one process never share pacing state.
#[derive(Debug)]
pub struct RateLimiter {
    in_flight: Semaphore,
    min_interval: Duration,
    next_slot: Mutex<Option<Instant>>,
    issued: AtomicUsize,
}

impl RateLimiter {
    pub fn new(max_in_flight: usize, min_interval: Duration) -> Self {
        Self {
            in_flight: Semaphore::new(max_in_flight.max(1)),
            min_interval,
            next_slot: Mutex::new(None),
            issued: AtomicUsize::new(0),
        }
    }

    /// Wait for a request slot. The returned permit must be held for the
    /// duration of the request.
    pub async fn acquire(&self) -> Result<SemaphorePermit<'_>, tokio::sync::AcquireError> {
        let permit = self.in_flight.acquire().await?;

        let slot = {
            let mut next = self.next_slot.lock().await;
            let now = Instant::now();
            let slot = match *next {
                Some(at) if at > now => at,
                _ => now,
            };
            *next = Some(slot + self.min_interval);
            slot
        };
        tokio::time::sleep_until(slot).await;

        self.issued.fetch_add(1, Ordering::Relaxed);
        Ok(permit)
    }

    /// Number of requests let through so far.
    pub fn issued(&self) -> usize {
        self.issued.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_spacing_between_requests() {
        let limiter = RateLimiter::new(4, Duration::from_millis(30));
        let start = Instant::now();
        for _ in 0..3 {
            let _permit = limiter.acquire().await.unwrap();
        }
        // Three slots: t=0, t=30ms, t=60ms.
        assert!(start.elapsed() >= Duration::from_millis(60));
        assert_eq!(limiter.issued(), 3);
    }

    #[tokio::test]
    async fn test_caps_in_flight() {
        let limiter = Arc::new(RateLimiter::new(1, Duration::ZERO));
        let first = limiter.acquire().await.unwrap();

        let contender = {
            let limiter = limiter.clone();
            tokio::spawn(async move {
                let _p = limiter.acquire().await.unwrap();
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(first);
        contender.await.unwrap();
        assert_eq!(limiter.issued(), 2);
    }
}
