use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use tokio::task::JoinHandle;

use crate::{
    config::RateLimitPreset,
    utils::{error_codes, error_to_api_response},
};

/// How often the background sweep drops entries whose window has passed.
const SWEEP_INTERVAL: Duration = Duration::from_secs(300);

/// One throttling decision. `reset_in` is how long until the key's window
/// opens again; on rejection the caller turns this into a 429.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: u32,
    pub reset_in: Duration,
}

struct WindowEntry {
    count: u32,
    reset_at: Instant,
}

/// Fixed-window request counter keyed by an opaque client identity.
///
/// Deliberately not a sliding window or token bucket: a client can fit up to
/// twice the limit into a short burst straddling a window boundary. That is
/// the accepted cost of O(1) state per key and a trivial check.
pub struct RateLimiter {
    entries: DashMap<String, WindowEntry>,
    sweep_task: Mutex<Option<JoinHandle<()>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            sweep_task: Mutex::new(None),
        }
    }

    /// Counts one request against `key` and reports whether it is allowed.
    pub fn check(&self, key: &str, preset: &RateLimitPreset) -> RateLimitDecision {
        self.check_at(key, preset, Instant::now())
    }

    fn check_at(&self, key: &str, preset: &RateLimitPreset, now: Instant) -> RateLimitDecision {
        let window = preset.window();
        let mut entry = self.entries.entry(key.to_string()).or_insert(WindowEntry {
            count: 0,
            reset_at: now,
        });

        if now >= entry.reset_at {
            // Fresh key or expired window: this request opens a new one.
            entry.count = 1;
            entry.reset_at = now + window;
            return RateLimitDecision {
                allowed: true,
                remaining: preset.max_requests.saturating_sub(1),
                reset_in: window,
            };
        }

        if entry.count >= preset.max_requests {
            // Rejected requests do not consume quota beyond the limit.
            return RateLimitDecision {
                allowed: false,
                remaining: 0,
                reset_in: entry.reset_at - now,
            };
        }

        entry.count += 1;
        RateLimitDecision {
            allowed: true,
            remaining: preset.max_requests - entry.count,
            reset_in: entry.reset_at - now,
        }
    }

    /// Drops entries whose window has already passed, bounding memory growth
    /// from abandoned keys between requests.
    pub fn sweep(&self) {
        self.sweep_at(Instant::now());
    }

    fn sweep_at(&self, now: Instant) {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.reset_at > now);
        let dropped = before - self.entries.len();
        if dropped > 0 {
            tracing::debug!("rate limiter sweep dropped {} expired entries", dropped);
        }
    }

    /// Starts the periodic sweep. Runs until [`shutdown`](Self::shutdown).
    pub fn start_sweep(self: &Arc<Self>) {
        let limiter = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
            ticker.tick().await; // the first tick fires immediately
            loop {
                ticker.tick().await;
                limiter.sweep();
            }
        });
        *self.sweep_task.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
    }

    /// Stops the sweep task so an orderly shutdown is not kept alive by it.
    pub fn shutdown(&self) {
        if let Some(handle) = self.sweep_task.lock().unwrap_or_else(|e| e.into_inner()).take() {
            handle.abort();
        }
    }

    #[cfg(test)]
    fn entry_count(&self) -> usize {
        self.entries.len()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for RateLimiter {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Best-effort client identity for rate-limit keys: first entry of
/// `x-forwarded-for`, then `x-real-ip`, then `"unknown"`. An empty first
/// `x-forwarded-for` entry falls through to `x-real-ip` rather than keying
/// every such client under the empty string. The value is not validated as
/// an IP; it is trusted from the reverse proxy in front of the service.
pub fn client_ip(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .or_else(|| headers.get("x-real-ip").and_then(|h| h.to_str().ok()))
        .unwrap_or("unknown")
        .trim()
        .to_string()
}

/// Per-route-group middleware state: the shared limiter plus the preset the
/// group is throttled under.
#[derive(Clone)]
pub struct RateLimitLayer {
    pub limiter: Arc<RateLimiter>,
    pub scope: &'static str,
    pub preset: RateLimitPreset,
}

impl RateLimitLayer {
    pub fn new(limiter: Arc<RateLimiter>, scope: &'static str, preset: RateLimitPreset) -> Self {
        Self {
            limiter,
            scope,
            preset,
        }
    }
}

pub async fn rate_limit(
    State(layer): State<RateLimitLayer>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let ip = client_ip(req.headers());
    let key = format!("{}:{}", layer.scope, ip);

    let decision = layer.limiter.check(&key, &layer.preset);
    if !decision.allowed {
        let retry_secs = decision.reset_in.as_secs().max(1);
        tracing::info!("rate limit hit for {} (retry in {}s)", key, retry_secs);
        return (
            StatusCode::TOO_MANY_REQUESTS,
            error_to_api_response::<()>(
                error_codes::RATE_LIMIT,
                format!("Too many requests, retry in {} seconds", retry_secs),
            ),
        )
            .into_response();
    }

    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn preset(max_requests: u32, window_secs: u64) -> RateLimitPreset {
        RateLimitPreset {
            max_requests,
            window_secs,
        }
    }

    #[test]
    fn counts_down_then_rejects() {
        let limiter = RateLimiter::new();
        let preset = preset(3, 1);
        let now = Instant::now();

        for expected_remaining in [2, 1, 0] {
            let decision = limiter.check_at("auth:1.2.3.4", &preset, now);
            assert!(decision.allowed);
            assert_eq!(decision.remaining, expected_remaining);
        }

        let rejected = limiter.check_at("auth:1.2.3.4", &preset, now);
        assert!(!rejected.allowed);
        assert_eq!(rejected.remaining, 0);
        assert_eq!(rejected.reset_in, Duration::from_secs(1));
    }

    #[test]
    fn rejections_do_not_consume_quota() {
        let limiter = RateLimiter::new();
        let preset = preset(2, 60);
        let now = Instant::now();

        limiter.check_at("k", &preset, now);
        limiter.check_at("k", &preset, now);
        // Hammering a rejected key must not push the count past the limit,
        // so the next window still starts clean.
        for _ in 0..10 {
            assert!(!limiter.check_at("k", &preset, now).allowed);
        }

        let next_window = limiter.check_at("k", &preset, now + Duration::from_secs(61));
        assert!(next_window.allowed);
        assert_eq!(next_window.remaining, 1);
    }

    #[test]
    fn keys_are_independent() {
        let limiter = RateLimiter::new();
        let preset = preset(2, 60);
        let now = Instant::now();

        limiter.check_at("auth:1.2.3.4", &preset, now);
        limiter.check_at("auth:1.2.3.4", &preset, now);
        assert!(!limiter.check_at("auth:1.2.3.4", &preset, now).allowed);

        let other = limiter.check_at("auth:5.6.7.8", &preset, now);
        assert!(other.allowed);
        assert_eq!(other.remaining, 1);
    }

    #[test]
    fn window_expiry_resets_the_counter() {
        let limiter = RateLimiter::new();
        let preset = preset(1, 1);
        let now = Instant::now();

        assert!(limiter.check_at("k", &preset, now).allowed);
        assert!(!limiter.check_at("k", &preset, now).allowed);

        let after = limiter.check_at("k", &preset, now + Duration::from_secs(1));
        assert!(after.allowed);
        assert_eq!(after.remaining, 0);
        assert_eq!(after.reset_in, Duration::from_secs(1));
    }

    #[test]
    fn boundary_burst_allows_double_the_limit() {
        // Fixed window by design: max_requests at the tail of one window and
        // max_requests again right after the boundary all succeed.
        let limiter = RateLimiter::new();
        let preset = preset(3, 10);
        let start = Instant::now();

        for _ in 0..3 {
            assert!(limiter.check_at("k", &preset, start + Duration::from_secs(9)).allowed);
        }
        for _ in 0..3 {
            assert!(limiter.check_at("k", &preset, start + Duration::from_secs(19)).allowed);
        }
        assert!(!limiter.check_at("k", &preset, start + Duration::from_secs(19)).allowed);
    }

    #[test]
    fn sweep_drops_only_expired_entries() {
        let limiter = RateLimiter::new();
        let now = Instant::now();
        limiter.check_at("short", &preset(5, 1), now);
        limiter.check_at("long", &preset(5, 600), now);
        assert_eq!(limiter.entry_count(), 2);

        limiter.sweep_at(now + Duration::from_secs(2));
        assert_eq!(limiter.entry_count(), 1);

        // A swept key behaves exactly like a brand new one.
        let revived = limiter.check_at("short", &preset(5, 1), now + Duration::from_secs(2));
        assert!(revived.allowed);
        assert_eq!(revived.remaining, 4);
    }

    #[tokio::test]
    async fn sweep_lifecycle_stops_cleanly() {
        let limiter = Arc::new(RateLimiter::new());
        limiter.start_sweep();
        limiter.shutdown();
        // Repeat shutdowns are a no-op.
        limiter.shutdown();
    }

    #[test]
    fn client_ip_prefers_forwarded_for_first_hop() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("1.2.3.4, 5.6.7.8"));
        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.1"));
        assert_eq!(client_ip(&headers), "1.2.3.4");
    }

    #[test]
    fn client_ip_falls_back_to_real_ip_then_unknown() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.1"));
        assert_eq!(client_ip(&headers), "10.0.0.1");

        assert_eq!(client_ip(&HeaderMap::new()), "unknown");
    }

    #[test]
    fn client_ip_skips_empty_forwarded_entry() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static(" , 5.6.7.8"));
        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.1"));
        assert_eq!(client_ip(&headers), "10.0.0.1");
    }

    #[test]
    fn client_ip_trims_whitespace() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("  9.9.9.9 ,5.6.7.8"));
        assert_eq!(client_ip(&headers), "9.9.9.9");
    }
}
