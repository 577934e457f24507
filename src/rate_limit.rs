//! Rate limiting for the registration endpoint.
//!
//! Flow Overview:
//! 1) Callers pass an opaque key (the registration handler uses the client IP).
//! 2) The first hit opens a fixed window; later hits inside it bump the counter.
//! 3) A hit past `max` inside the window is `Limited`. Once the window has
//!    elapsed the next hit opens a fresh one.
//!
//! `FixedWindowRateLimiter` is process local. `PgRateLimiter` shares windows
//! across instances through the `rate_limit_windows` table.

use sqlx::{PgPool, Row};
use std::{
    collections::HashMap,
    sync::{Mutex, PoisonError},
    time::{Duration, Instant},
};
use tracing::{Instrument, error};

use crate::auth::BoxFuture;

pub const DEFAULT_MAX_REQUESTS: u32 = 10;
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

// Stale windows are swept once the map grows past this.
const PRUNE_THRESHOLD: usize = 10_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    Limited,
}

pub trait RateLimiter: Send + Sync {
    fn check<'a>(&'a self, key: &'a str) -> BoxFuture<'a, RateLimitDecision>;
}

#[derive(Clone, Debug)]
pub struct NoopRateLimiter;

impl RateLimiter for NoopRateLimiter {
    fn check<'a>(&'a self, _key: &'a str) -> BoxFuture<'a, RateLimitDecision> {
        Box::pin(async { RateLimitDecision::Allowed })
    }
}

#[derive(Clone, Copy, Debug)]
struct Window {
    started: Instant,
    hits: u32,
}

#[derive(Debug)]
pub struct FixedWindowRateLimiter {
    max: u32,
    window: Duration,
    windows: Mutex<HashMap<String, Window>>,
}

impl Default for FixedWindowRateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_REQUESTS, DEFAULT_WINDOW)
    }
}

impl FixedWindowRateLimiter {
    #[must_use]
    pub fn new(max: u32, window: Duration) -> Self {
        Self {
            max,
            window,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Register a hit for `key` at `now`.
    pub fn hit_at(&self, key: &str, now: Instant) -> RateLimitDecision {
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);

        if windows.len() > PRUNE_THRESHOLD {
            let window = self.window;
            windows.retain(|_, entry| now.saturating_duration_since(entry.started) <= window);
        }

        let entry = windows.entry(key.to_string()).or_insert(Window {
            started: now,
            hits: 0,
        });
        if now.saturating_duration_since(entry.started) > self.window {
            *entry = Window {
                started: now,
                hits: 0,
            };
        }
        entry.hits = entry.hits.saturating_add(1);

        if entry.hits > self.max {
            RateLimitDecision::Limited
        } else {
            RateLimitDecision::Allowed
        }
    }
}

impl RateLimiter for FixedWindowRateLimiter {
    fn check<'a>(&'a self, key: &'a str) -> BoxFuture<'a, RateLimitDecision> {
        Box::pin(async move { self.hit_at(key, Instant::now()) })
    }
}

/// Fixed windows kept in Postgres.
#[derive(Debug, Clone)]
pub struct PgRateLimiter {
    pool: PgPool,
    max: u32,
    window: Duration,
}

impl PgRateLimiter {
    #[must_use]
    pub fn new(pool: PgPool, max: u32, window: Duration) -> Self {
        Self { pool, max, window }
    }

    async fn hit(&self, key: &str) -> RateLimitDecision {
        let query = r"
            INSERT INTO rate_limit_windows (key, window_start, hits)
            VALUES ($1, NOW(), 1)
            ON CONFLICT (key) DO UPDATE SET
                window_start = CASE
                    WHEN rate_limit_windows.window_start < NOW() - make_interval(secs => $2)
                    THEN NOW()
                    ELSE rate_limit_windows.window_start
                END,
                hits = CASE
                    WHEN rate_limit_windows.window_start < NOW() - make_interval(secs => $2)
                    THEN 1
                    ELSE rate_limit_windows.hits + 1
                END
            RETURNING hits
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPSERT"
        );
        let row = sqlx::query(query)
            .bind(key)
            .bind(self.window.as_secs_f64())
            .fetch_one(&self.pool)
            .instrument(span)
            .await;

        let hits = match row.and_then(|row| row.try_get::<i32, _>(0)) {
            Ok(hits) => hits,
            Err(err) => {
                error!("Failed to record rate limit hit: {err}");
                // Fail closed
                return RateLimitDecision::Limited;
            }
        };

        if i64::from(hits) > i64::from(self.max) {
            RateLimitDecision::Limited
        } else {
            RateLimitDecision::Allowed
        }
    }
}

impl RateLimiter for PgRateLimiter {
    fn check<'a>(&'a self, key: &'a str) -> BoxFuture<'a, RateLimitDecision> {
        Box::pin(self.hit(key))
    }
}
