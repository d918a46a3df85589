//! Per-client request quota.
//!
//! Each client IP gets a token bucket of `requests` tokens refilled evenly
//! over `window_secs`. The check runs before authentication so unauthenticated
//! floods are shed without computing a single MAC.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use metapay::RelayError;

use crate::config::{ConfigError, RateLimitConfig};
use crate::error::RelayerError;

/// Keyed token-bucket limiter over client addresses.
pub struct ClientRateLimiter {
    limiter: DefaultKeyedRateLimiter<IpAddr>,
}

impl std::fmt::Debug for ClientRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientRateLimiter")
            .field("tracked_clients", &self.limiter.len())
            .finish()
    }
}

impl ClientRateLimiter {
    /// Creates a limiter allowing `config.requests` per `config.window_secs`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if either value is zero.
    pub fn new(config: RateLimitConfig) -> Result<Self, ConfigError> {
        let invalid = || ConfigError::Invalid {
            field: "rate_limit",
            reason: "requests and window_secs must be positive".to_owned(),
        };
        let burst = NonZeroU32::new(config.requests).ok_or_else(invalid)?;
        let period = Duration::from_secs(config.window_secs) / config.requests;
        let quota = Quota::with_period(period)
            .ok_or_else(invalid)?
            .allow_burst(burst);
        Ok(Self {
            limiter: RateLimiter::keyed(quota),
        })
    }

    /// Takes one token from `client`'s bucket; `false` if it is empty.
    #[must_use]
    pub fn check(&self, client: IpAddr) -> bool {
        self.limiter.check_key(&client).is_ok()
    }

    /// Forgets clients whose buckets have fully refilled.
    pub fn prune(&self) {
        self.limiter.retain_recent();
        self.limiter.shrink_to_fit();
    }

    /// Number of clients currently tracked.
    #[must_use]
    pub fn tracked_clients(&self) -> usize {
        self.limiter.len()
    }
}

/// Axum middleware rejecting clients over their quota with `429`.
///
/// The client is identified by the peer address from [`ConnectInfo`]; when
/// the server was not started with connect info every request shares the
/// unspecified address.
pub async fn limit_by_client(
    State(limiter): State<Arc<ClientRateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    let client = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED), |info| info.0.ip());
    if limiter.check(client) {
        return next.run(request).await;
    }
    tracing::debug!(client = %client, "Rate limited");
    RelayerError(RelayError::RateLimited).into_response()
}
