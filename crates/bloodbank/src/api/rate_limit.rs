//! Fixed-window rate limiting keyed by client address.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::Response;
use tracing::debug;

use super::{ApiError, AppState};
use crate::error::Error;

/// Entries kept before stale windows are swept.
const SWEEP_THRESHOLD: usize = 4096;

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    hits: u32,
}

/// Counts hits per client within fixed windows.
#[derive(Debug)]
pub struct RateLimiter {
    limit: u32,
    window: Duration,
    clients: Mutex<HashMap<IpAddr, Window>>,
}

impl RateLimiter {
    /// Allow `limit` hits per client per `window`. A zero limit disables
    /// limiting.
    #[must_use]
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// `limit` hits per minute.
    #[must_use]
    pub fn per_minute(limit: u32) -> Self {
        Self::new(limit, Duration::from_secs(60))
    }

    /// Record a hit from `client` at `now`; false once the client is over
    /// its limit for the current window.
    pub fn check(&self, client: IpAddr, now: Instant) -> bool {
        if self.limit == 0 {
            return true;
        }
        let Ok(mut clients) = self.clients.lock() else {
            return true;
        };

        if clients.len() >= SWEEP_THRESHOLD {
            let window = self.window;
            clients.retain(|_, w| now.duration_since(w.started) < window);
        }

        let entry = clients.entry(client).or_insert(Window {
            started: now,
            hits: 0,
        });
        if now.duration_since(entry.started) >= self.window {
            *entry = Window {
                started: now,
                hits: 0,
            };
        }
        entry.hits += 1;
        entry.hits <= self.limit
    }
}

/// Middleware rejecting clients over the auth rate limit.
pub async fn limit_auth(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let client = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED), |ConnectInfo(addr)| addr.ip());

    if !state.limiter.check(client, Instant::now()) {
        debug!(%client, "Rate limit hit");
        return Err(Error::RateLimited.into());
    }
    Ok(next.run(request).await)
}
