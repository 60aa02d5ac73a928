//! Sliding-window admission control per provider.
//!
//! Each provider owns a window of request timestamps behind its own mutex,
//! so acquisition is atomic per provider while different providers never
//! contend. Acquisition never waits: a request is admitted or rejected
//! immediately.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use metrics::counter;
use tracing::debug;
use uuid::Uuid;

use crate::providers::config::ProviderConfig;

/// Length of the trailing window.
pub const WINDOW: Duration = Duration::from_secs(60);

type Window = Arc<Mutex<VecDeque<Instant>>>;

#[derive(Debug, Default)]
pub struct RateLimiter {
    windows: Mutex<HashMap<Uuid, Window>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    fn window(&self, provider_id: Uuid) -> Window {
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(windows.entry(provider_id).or_default())
    }

    /// Admit one request for `provider` if its per-minute capacity allows.
    pub fn try_acquire(&self, provider: &ProviderConfig) -> bool {
        let admitted =
            self.try_acquire_at(provider.id, provider.rate_limit_per_minute, Instant::now());
        if !admitted {
            counter!("rate_limiter_denied_total", "provider" => provider.code.clone())
                .increment(1);
            debug!(
                provider_code = %provider.code,
                limit_per_minute = provider.rate_limit_per_minute,
                "Rate limit reached; request not sent"
            );
        }
        admitted
    }

    /// Admission check against an explicit clock reading.
    ///
    /// A capacity of zero admits nothing.
    pub fn try_acquire_at(&self, provider_id: Uuid, capacity: u32, now: Instant) -> bool {
        let window = self.window(provider_id);
        let mut stamps = window.lock().unwrap_or_else(PoisonError::into_inner);
        prune(&mut stamps, now);
        if stamps.len() >= capacity as usize {
            return false;
        }
        stamps.push_back(now);
        true
    }

    /// Requests still admissible within the current window.
    pub fn remaining(&self, provider: &ProviderConfig) -> u32 {
        self.remaining_at(provider.id, provider.rate_limit_per_minute, Instant::now())
    }

    pub fn remaining_at(&self, provider_id: Uuid, capacity: u32, now: Instant) -> u32 {
        let window = self.window(provider_id);
        let mut stamps = window.lock().unwrap_or_else(PoisonError::into_inner);
        prune(&mut stamps, now);
        capacity.saturating_sub(stamps.len() as u32)
    }
}

fn prune(stamps: &mut VecDeque<Instant>, now: Instant) {
    while let Some(oldest) = stamps.front() {
        if now.saturating_duration_since(*oldest) >= WINDOW {
            stamps.pop_front();
        } else {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn nth_plus_one_request_in_window_is_rejected() {
        let limiter = RateLimiter::new();
        let id = Uuid::new_v4();
        let start = Instant::now();

        for i in 0..5 {
            assert!(limiter.try_acquire_at(id, 5, start + Duration::from_millis(i * 10)));
        }
        assert!(!limiter.try_acquire_at(id, 5, start + Duration::from_secs(30)));
        assert_eq!(limiter.remaining_at(id, 5, start + Duration::from_secs(30)), 0);
    }

    #[test]
    fn window_slides_after_sixty_seconds() {
        let limiter = RateLimiter::new();
        let id = Uuid::new_v4();
        let start = Instant::now();

        assert!(limiter.try_acquire_at(id, 2, start));
        assert!(limiter.try_acquire_at(id, 2, start + Duration::from_secs(20)));
        assert!(!limiter.try_acquire_at(id, 2, start + Duration::from_secs(59)));
        // The first stamp has aged out; the second has not.
        assert!(limiter.try_acquire_at(id, 2, start + Duration::from_secs(60)));
        assert!(!limiter.try_acquire_at(id, 2, start + Duration::from_secs(61)));
        assert_eq!(limiter.remaining_at(id, 2, start + Duration::from_secs(200)), 2);
    }

    #[test]
    fn providers_have_independent_windows() {
        let limiter = RateLimiter::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let now = Instant::now();
        assert!(limiter.try_acquire_at(a, 1, now));
        assert!(!limiter.try_acquire_at(a, 1, now));
        assert!(limiter.try_acquire_at(b, 1, now));
    }

    #[test]
    fn zero_capacity_admits_nothing() {
        let limiter = RateLimiter::new();
        assert!(!limiter.try_acquire_at(Uuid::new_v4(), 0, Instant::now()));
    }

    #[test]
    fn concurrent_acquisition_never_exceeds_capacity() {
        let limiter = Arc::new(RateLimiter::new());
        let id = Uuid::new_v4();
        let now = Instant::now();

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                thread::spawn(move || (0..10).filter(|_| limiter.try_acquire_at(id, 25, now)).count())
            })
            .collect();
        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(admitted, 25);
    }
}
