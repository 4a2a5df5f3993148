//! Outbound call admission control
//!
//! - `RateLimiter`: token bucket with continuous refill, cancellable waits
//! - `CircuitBreaker`: single cooldown deadline tripped by overload responses
//! - `ThrottledClient`: reqwest client behind both, used by every HTTP caller
//!   (JSON-RPC endpoints, explorer, price service)

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_ENCODING, USER_AGENT};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::models::config::HttpClientConfig;
use crate::models::errors::{AppError, AppResult, ErrorCode};
use crate::utils::constants::{MAX_ACQUIRE_ITERATIONS, USER_AGENT as USER_AGENT_CONST};

// ============================================
// TOKEN BUCKET
// ============================================

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket: `capacity` tokens, refilled continuously over `window`
#[derive(Debug)]
pub struct RateLimiter {
    capacity: f64,
    refill_per_ms: f64,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    pub fn new(capacity: u32, window: Duration) -> Self {
        let capacity = f64::from(capacity.max(1));
        let window_ms = (window.as_secs_f64() * 1000.0).max(1.0);
        Self {
            capacity,
            refill_per_ms: capacity / window_ms,
            bucket: Mutex::new(Bucket {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    pub fn from_config(config: &HttpClientConfig) -> Self {
        Self::new(config.requests_per_window, Duration::from_millis(config.window_ms))
    }

    /// Take a token now, or report how long until one is available
    fn try_take(&self) -> Result<(), Duration> {
        let mut bucket = self.bucket.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let now = Instant::now();
        let elapsed_ms = now.duration_since(bucket.last_refill).as_secs_f64() * 1000.0;
        bucket.tokens = (bucket.tokens + elapsed_ms * self.refill_per_ms).min(self.capacity);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            return Ok(());
        }

        let missing = 1.0 - bucket.tokens;
        let wait_ms = (missing / self.refill_per_ms).ceil().max(1.0);
        Err(Duration::from_millis(wait_ms as u64))
    }

    /// Wait cooperatively until a token is available or `cancel` fires
    pub async fn acquire(&self, cancel: &CancellationToken) -> AppResult<()> {
        for _ in 0..MAX_ACQUIRE_ITERATIONS {
            if cancel.is_cancelled() {
                return Err(AppError::cancelled());
            }

            let wait = match self.try_take() {
                Ok(()) => return Ok(()),
                Err(wait) => wait,
            };

            tokio::select! {
                _ = cancel.cancelled() => return Err(AppError::cancelled()),
                _ = tokio::time::sleep(wait) => {}
            }
        }

        Err(AppError::new(
            ErrorCode::RateLimiterExhausted,
            format!("No token after {} waits", MAX_ACQUIRE_ITERATIONS),
        ))
    }
}

// ============================================
// CIRCUIT BREAKER
// ============================================

/// Stops all calls until a cooldown deadline once overload is observed
#[derive(Debug)]
pub struct CircuitBreaker {
    cooldown: Duration,
    open_until: Mutex<Option<Instant>>,
}

impl CircuitBreaker {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            open_until: Mutex::new(None),
        }
    }

    /// Remaining cooldown if the circuit is open
    pub fn remaining(&self) -> Option<Duration> {
        let mut open_until = self.open_until.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        match *open_until {
            Some(deadline) => {
                let now = Instant::now();
                if now < deadline {
                    Some(deadline - now)
                } else {
                    *open_until = None;
                    None
                }
            }
            None => None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.remaining().is_some()
    }

    /// Start (or extend) the cooldown
    pub fn trip(&self) {
        let mut open_until = self.open_until.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *open_until = Some(Instant::now() + self.cooldown);
    }
}

// ============================================
// THROTTLED HTTP CLIENT
// ============================================

/// reqwest client with gzip, User-Agent and per-request timeout
pub fn build_http_client(config: &HttpClientConfig) -> AppResult<reqwest::Client> {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_CONST));
    headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("gzip"));

    reqwest::Client::builder()
        .default_headers(headers)
        .timeout(Duration::from_secs(config.timeout_secs))
        .gzip(true)
        .build()
        .map_err(|e| AppError::with_source(ErrorCode::ConfigInvalidValue, "Failed to build HTTP client", e))
}

/// reqwest client gated by a token bucket and a circuit breaker
#[derive(Debug)]
pub struct ThrottledClient {
    name: String,
    http: reqwest::Client,
    limiter: RateLimiter,
    breaker: CircuitBreaker,
}

impl ThrottledClient {
    /// Build with its own connection pool
    pub fn new(name: impl Into<String>, config: &HttpClientConfig) -> AppResult<Self> {
        let http = build_http_client(config)?;
        Ok(Self::with_http(name, http, config))
    }

    /// Reuse an existing reqwest client (connection pool shared across endpoints)
    pub fn with_http(name: impl Into<String>, http: reqwest::Client, config: &HttpClientConfig) -> Self {
        Self {
            name: name.into(),
            http,
            limiter: RateLimiter::from_config(config),
            breaker: CircuitBreaker::new(Duration::from_millis(config.overload_cooldown_ms)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Overload seen at a higher layer (e.g. JSON-RPC -32005 inside a 200)
    pub fn trip_circuit(&self) {
        warn!("⏳ {} overloaded, circuit open", self.name);
        self.breaker.trip();
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
        cancel: &CancellationToken,
    ) -> AppResult<T> {
        let request = self.http.get(url).query(query);
        self.execute(request, cancel).await
    }

    pub async fn post_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &B,
        cancel: &CancellationToken,
    ) -> AppResult<T> {
        let request = self.http.post(url).json(body);
        self.execute(request, cancel).await
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        cancel: &CancellationToken,
    ) -> AppResult<T> {
        if let Some(remaining) = self.breaker.remaining() {
            debug!("⛔ {} short-circuited ({}ms left)", self.name, remaining.as_millis());
            return Err(AppError::circuit_open(remaining.as_millis()));
        }

        self.limiter.acquire(cancel).await?;

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(AppError::cancelled()),
            response = request.send() => response?,
        };

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            self.trip_circuit();
            return Err(AppError::rpc_rate_limited());
        }
        if !status.is_success() {
            return Err(AppError::new(ErrorCode::HttpStatus, format!("HTTP error: {}", status)));
        }

        tokio::select! {
            _ = cancel.cancelled() => Err(AppError::cancelled()),
            body = response.json::<T>() => body.map_err(AppError::from),
        }
    }
}
