//! Request rate limiting.
//!
//! A fixed-window counter per client is kept in Redis for every route and for the client as
//! a whole:
//!
//! - `ratelimit:<route>:<method>:<client>` counts calls to one route template
//! - `ratelimit:global:<client>` counts every call
//!
//! The first hit in a window sets the key's expiry, so the window starts with the client's
//! first request rather than on a wall-clock boundary. The route counter is checked first; a
//! request rejected by its route window does not count against the global window.
//!
//! The limiter fails open: when Redis cannot be reached the request proceeds and the error is
//! logged.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{ConnectInfo, MatchedPath, Request, State},
    http::{HeaderMap, HeaderName, HeaderValue, Method},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::{SecondsFormat, TimeDelta, Utc};

use crate::AppState;
use crate::cache::{CacheError, CacheStore};
use crate::config::RateLimiterConfig;
use crate::errors::Error;

/// Parse a window written as `"<count>-<unit>"`, unit being `S`, `M`, `H` or `D`.
pub fn parse_window(command: &str) -> Result<Duration, String> {
    let (count, unit) = command
        .split_once('-')
        .ok_or_else(|| "expected '<count>-<unit>', e.g. '10-M'".to_string())?;

    let count: u64 = count
        .trim()
        .parse()
        .map_err(|_| format!("'{count}' is not a whole number"))?;
    if count == 0 {
        return Err("window count must be greater than zero".to_string());
    }

    let unit_secs = match unit.trim().to_ascii_uppercase().as_str() {
        "S" => 1,
        "M" => 60,
        "H" => 60 * 60,
        "D" => 24 * 60 * 60,
        other => return Err(format!("unknown unit '{other}', expected S, M, H or D")),
    };

    Ok(Duration::from_secs(count * unit_secs))
}

/// A fixed window and the number of requests it allows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub period: Duration,
    pub limit: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Route,
    Global,
}

impl Scope {
    fn as_str(self) -> &'static str {
        match self {
            Scope::Route => "route",
            Scope::Global => "global",
        }
    }
}

/// Counter state after one hit.
#[derive(Debug, Clone)]
struct Usage {
    scope: Scope,
    count: i64,
    limit: i64,
    /// RFC 3339 time at which the window resets
    reset: String,
}

impl Usage {
    fn exceeded(&self) -> bool {
        self.count > self.limit
    }

    fn write_headers(&self, headers: &mut HeaderMap) {
        let scope = self.scope.as_str();
        let remaining = (self.limit - self.count).max(0);
        for (name, value) in [
            (format!("x-ratelimit-limit-{scope}"), self.limit.to_string()),
            (format!("x-ratelimit-remaining-{scope}"), remaining.to_string()),
            (format!("x-ratelimit-reset-{scope}"), self.reset.clone()),
        ] {
            if let (Ok(name), Ok(value)) = (HeaderName::try_from(name), HeaderValue::try_from(value)) {
                headers.insert(name, value);
            }
        }
    }
}

/// Outcome of checking a request against both windows.
#[derive(Debug)]
pub enum Verdict {
    Allowed(HeaderMap),
    Limited { scope: Scope, headers: HeaderMap },
}

#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn CacheStore>,
    route: Window,
    global: Window,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn CacheStore>, route: Window, global: Window) -> Self {
        Self { store, route, global }
    }

    pub fn from_config(config: &RateLimiterConfig, store: Arc<dyn CacheStore>) -> Result<Self, String> {
        let route = Window {
            period: parse_window(&config.command)?,
            limit: config.limit,
        };
        let global = Window {
            period: parse_window(&config.global_command)?,
            limit: config.global_limit,
        };
        Ok(Self::new(store, route, global))
    }

    async fn hit(&self, key: &str, scope: Scope, window: Window) -> Result<Usage, CacheError> {
        let count = self.store.incr(key).await?;

        // A new counter has no expiry; neither does one whose first EXPIRE failed
        let mut ttl = if count == 1 { -1 } else { self.store.ttl(key).await? };
        if ttl < 0 {
            self.store.expire(key, window.period).await?;
            ttl = window.period.as_secs() as i64;
        }
        let reset = (Utc::now() + TimeDelta::seconds(ttl)).to_rfc3339_opts(SecondsFormat::Secs, true);

        Ok(Usage {
            scope,
            count,
            limit: window.limit,
            reset,
        })
    }

    /// Count one request from `client` to `route` against both windows.
    pub async fn check(&self, route: &str, method: &Method, client: &str) -> Result<Verdict, CacheError> {
        let route_key = format!("ratelimit:{route}:{method}:{client}");
        let route_usage = self.hit(&route_key, Scope::Route, self.route).await?;

        let mut headers = HeaderMap::new();
        route_usage.write_headers(&mut headers);
        if route_usage.exceeded() {
            return Ok(Verdict::Limited {
                scope: Scope::Route,
                headers,
            });
        }

        let global_key = format!("ratelimit:global:{client}");
        let global_usage = self.hit(&global_key, Scope::Global, self.global).await?;
        global_usage.write_headers(&mut headers);
        if global_usage.exceeded() {
            return Ok(Verdict::Limited {
                scope: Scope::Global,
                headers,
            });
        }

        Ok(Verdict::Allowed(headers))
    }
}

/// First `x-forwarded-for` entry, else the peer address, else `"unknown"`.
pub fn client_identity(request: &Request) -> String {
    let forwarded = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    if let Some(ip) = forwarded {
        return ip.to_string();
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Axum middleware applying [`RateLimiter`] to every matched route.
pub async fn rate_limit(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let Some(limiter) = state.limiter.as_ref() else {
        return next.run(request).await;
    };

    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());
    let client = client_identity(&request);
    let method = request.method().clone();

    match limiter.check(&route, &method, &client).await {
        Ok(Verdict::Allowed(headers)) => {
            let mut response = next.run(request).await;
            response.headers_mut().extend(headers);
            response
        }
        Ok(Verdict::Limited { scope, headers }) => {
            tracing::info!(%client, %route, scope = scope.as_str(), "Rate limit exceeded");
            let mut response = Error::TooManyRequests {
                message: format!("{} rate limit exceeded", scope.as_str()),
            }
            .into_response();
            response.headers_mut().extend(headers);
            response
        }
        Err(e) => {
            tracing::warn!(error = %e, %client, %route, "Rate limiter unavailable, allowing request");
            next.run(request).await
        }
    }
}
