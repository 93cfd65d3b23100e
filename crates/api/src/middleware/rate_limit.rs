//! Per-source-IP throttle for `POST /wallets` (`spec.md` §6: 15/hour hard
//! cap, slow-down after 8/hour).

use std::{
    collections::HashMap,
    net::{IpAddr, SocketAddr},
    sync::Arc,
    time::{Duration, Instant},
};

use axum::{
    extract::{ConnectInfo, Request},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tokio::sync::Mutex;
use tower::{Layer, Service};

#[derive(Debug, Clone)]
pub struct WalletCreationRateLimitConfig {
    pub window: Duration,
    pub slow_down_after: usize,
    pub max_requests: usize,
    pub slow_down_delay: Duration,
}

impl Default for WalletCreationRateLimitConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(3600),
            slow_down_after: 8,
            max_requests: 15,
            slow_down_delay: Duration::from_secs(2),
        }
    }
}

#[derive(Default)]
struct RateLimiterState {
    requests: HashMap<IpAddr, Vec<Instant>>,
}

impl RateLimiterState {
    /// Prunes the window and returns the request count observed this
    /// window, after recording the current one.
    fn record(&mut self, ip: IpAddr, window: Duration) -> usize {
        let now = Instant::now();
        let cutoff = now - window;
        let entries = self.requests.entry(ip).or_default();
        entries.retain(|&t| t > cutoff);
        entries.push(now);
        entries.len()
    }
}

#[derive(Clone)]
pub struct WalletCreationRateLimitLayer {
    state: Arc<Mutex<RateLimiterState>>,
    config: WalletCreationRateLimitConfig,
}

impl WalletCreationRateLimitLayer {
    pub fn new(config: WalletCreationRateLimitConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(RateLimiterState::default())),
            config,
        }
    }
}

impl Default for WalletCreationRateLimitLayer {
    fn default() -> Self {
        Self::new(WalletCreationRateLimitConfig::default())
    }
}

impl<S> Layer<S> for WalletCreationRateLimitLayer {
    type Service = WalletCreationRateLimitService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        WalletCreationRateLimitService {
            inner,
            state: self.state.clone(),
            config: self.config.clone(),
        }
    }
}

#[derive(Clone)]
pub struct WalletCreationRateLimitService<S> {
    inner: S,
    state: Arc<Mutex<RateLimiterState>>,
    config: WalletCreationRateLimitConfig,
}

impl<S> Service<Request> for WalletCreationRateLimitService<S>
where
    S: Service<Request, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future =
        std::pin::Pin<Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut std::task::Context<'_>) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let mut inner = self.inner.clone();
        let state = self.state.clone();
        let config = self.config.clone();
        let ip = source_ip(&req);

        Box::pin(async move {
            let count = state.lock().await.record(ip, config.window);

            if count > config.max_requests {
                return Ok((
                    StatusCode::TOO_MANY_REQUESTS,
                    "too many wallet-creation requests from this source; try again later",
                )
                    .into_response());
            }

            if count > config.slow_down_after {
                tokio::time::sleep(config.slow_down_delay).await;
            }

            inner.call(req).await
        })
    }
}

/// Prefers `x-forwarded-for` (set by the reverse proxy this service sits
/// behind in production) and falls back to the TCP peer address the
/// listener itself observed, via `ConnectInfo` (wired in by
/// `Server::start`'s `into_make_service_with_connect_info`).
fn source_ip(req: &Request) -> IpAddr {
    let forwarded = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|ip| ip.trim().parse::<IpAddr>().ok());
    if let Some(ip) = forwarded {
        return ip;
    }

    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or_else(|| IpAddr::from([127, 0, 0, 1]))
}
