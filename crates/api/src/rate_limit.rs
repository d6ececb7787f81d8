use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

#[derive(Debug)]
struct Windows {
    hits: HashMap<String, VecDeque<Instant>>,
    last_sweep: Instant,
}

/// Sliding-window request counter keyed by client address.
///
/// Addresses idle for a full window are dropped on the next sweep, which
/// runs at most once per window from inside `allow`.
#[derive(Debug, Clone)]
pub struct IpRateLimiter {
    inner: Arc<Mutex<Windows>>,
    window: Duration,
    max_requests: usize,
}

impl IpRateLimiter {
    pub fn new(window: Duration, max_requests: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Windows {
                hits: HashMap::new(),
                last_sweep: Instant::now(),
            })),
            window,
            max_requests,
        }
    }

    pub fn allow(&self, key: &str) -> bool {
        self.allow_at(key, Instant::now())
    }

    /// Number of addresses currently holding a window.
    pub fn tracked_keys(&self) -> usize {
        self.inner.lock().hits.len()
    }

    /// Drops every address with no request inside the window.
    pub fn prune(&self) -> usize {
        self.prune_at(Instant::now())
    }

    fn prune_at(&self, now: Instant) -> usize {
        let mut guard = self.inner.lock();
        sweep(&mut guard, now, self.window)
    }

    fn allow_at(&self, key: &str, now: Instant) -> bool {
        let mut guard = self.inner.lock();
        if now.saturating_duration_since(guard.last_sweep) > self.window {
            sweep(&mut guard, now, self.window);
        }

        let queue = guard.hits.entry(key.to_string()).or_default();
        expire(queue, now, self.window);

        if queue.len() >= self.max_requests {
            return false;
        }

        queue.push_back(now);
        true
    }
}

fn expire(queue: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(front) = queue.front() {
        if now.saturating_duration_since(*front) > window {
            queue.pop_front();
        } else {
            break;
        }
    }
}

fn sweep(windows: &mut Windows, now: Instant, window: Duration) -> usize {
    let before = windows.hits.len();
    windows.hits.retain(|_, queue| {
        expire(queue, now, window);
        !queue.is_empty()
    });
    windows.last_sweep = now;
    before - windows.hits.len()
}
