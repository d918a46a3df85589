//! HTTP client for a remote relay.
//!
//! [`RelayClient`] is what a scanner or payee application uses to hand a
//! scanned envelope to the relay: it encodes the envelope, tags the exact body
//! bytes with the shared-secret MAC and posts them to `/relay`.
//!
//! ## Error Handling
//!
//! Custom error types capture detailed failure contexts, including
//! - URL construction
//! - HTTP transport failures
//! - JSON deserialization errors
//! - Relay rejections, decoded into their [`ErrorBody`]

use std::time::Duration;

use http::StatusCode;
use http::header::CONTENT_TYPE;
use metapay::codec::{self, CodecError};
use metapay::{AuthError, ErrorBody, RELAY_AUTH_HEADER, RelayAuth, RelayPayload, RelayReceipt};
use reqwest::Client;
use tracing::instrument;
use url::Url;

use crate::handlers::HealthResponse;

/// Errors that can occur while talking to a remote relay.
#[derive(Debug, thiserror::Error)]
pub enum RelayClientError {
    /// URL parse error.
    #[error("URL parse error: {context}: {source}")]
    UrlParse {
        /// Human-readable context.
        context: &'static str,
        /// The underlying parse error.
        #[source]
        source: url::ParseError,
    },
    /// The shared secret is unusable.
    #[error(transparent)]
    Auth(#[from] AuthError),
    /// The envelope could not be encoded.
    #[error(transparent)]
    Encode(#[from] CodecError),
    /// HTTP transport error.
    #[error("HTTP error: {context}: {source}")]
    Http {
        /// Human-readable context.
        context: &'static str,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },
    /// JSON deserialization error.
    #[error("Failed to deserialize JSON: {context}: {source}")]
    JsonDeserialization {
        /// Human-readable context.
        context: &'static str,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },
    /// The relay answered with a structured error.
    #[error("Relay rejected request with {status}: {}", body.error)]
    Rejected {
        /// The HTTP status code.
        status: StatusCode,
        /// The decoded error body.
        body: ErrorBody,
    },
    /// Unexpected HTTP status code with an unstructured body.
    #[error("Unexpected HTTP status {status}: {context}: {body}")]
    HttpStatus {
        /// Human-readable context.
        context: &'static str,
        /// The HTTP status code.
        status: StatusCode,
        /// The response body.
        body: String,
    },
    /// Failed to read response body.
    #[error("Failed to read response body as text: {context}: {source}")]
    ResponseBodyRead {
        /// Human-readable context.
        context: &'static str,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },
}

/// A client for submitting envelopes to a remote relay.
#[derive(Clone, Debug)]
pub struct RelayClient {
    /// Base URL of the relay (e.g. `https://relay.example/`)
    base_url: Url,
    /// Full URL to `POST /relay` requests
    relay_url: Url,
    /// Full URL to `GET /health` requests
    health_url: Url,
    /// Shared Reqwest HTTP client
    client: Client,
    /// Tags request bodies
    auth: RelayAuth,
    /// Optional request timeout
    timeout: Option<Duration>,
}

impl RelayClient {
    /// Constructs a client for the relay at `base_url`, authenticating with
    /// `secret`.
    ///
    /// A missing trailing slash is added so `./relay` resolves under the
    /// given path.
    ///
    /// # Errors
    ///
    /// Returns [`RelayClientError`] if URL construction fails or the secret
    /// is empty.
    pub fn try_new(mut base_url: Url, secret: impl AsRef<[u8]>) -> Result<Self, RelayClientError> {
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let relay_url = base_url
            .join("./relay")
            .map_err(|e| RelayClientError::UrlParse {
                context: "Failed to construct ./relay URL",
                source: e,
            })?;
        let health_url = base_url
            .join("./health")
            .map_err(|e| RelayClientError::UrlParse {
                context: "Failed to construct ./health URL",
                source: e,
            })?;
        Ok(Self {
            base_url,
            relay_url,
            health_url,
            client: Client::new(),
            auth: RelayAuth::new(secret)?,
            timeout: None,
        })
    }

    /// Returns the base URL used by this client.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Returns the computed `./relay` URL.
    #[must_use]
    pub const fn relay_url(&self) -> &Url {
        &self.relay_url
    }

    /// Sets a timeout for all future requests.
    ///
    /// Relaying waits for on-chain confirmation, so this should exceed the
    /// relay's own execution timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Submits `payload` to `POST /relay`.
    ///
    /// # Errors
    ///
    /// Returns [`RelayClientError::Rejected`] when the relay refuses or fails
    /// the envelope, and other variants for transport problems.
    #[instrument(name = "metapay.relay_client.submit", skip_all, err, fields(signer = %payload.signer()))]
    pub async fn submit(&self, payload: &RelayPayload) -> Result<RelayReceipt, RelayClientError> {
        const CONTEXT: &str = "POST /relay";
        let body = codec::encode(payload)?;
        let tag = self.auth.tag(body.as_bytes());

        let mut req = self
            .client
            .post(self.relay_url.clone())
            .header(CONTENT_TYPE, "application/json")
            .header(RELAY_AUTH_HEADER, tag)
            .body(body);
        if let Some(timeout) = self.timeout {
            req = req.timeout(timeout);
        }
        let response = req.send().await.map_err(|e| RelayClientError::Http {
            context: CONTEXT,
            source: e,
        })?;
        read_json(response, CONTEXT).await
    }

    /// Fetches `GET /health`.
    ///
    /// # Errors
    ///
    /// Returns [`RelayClientError`] if the request fails.
    #[instrument(name = "metapay.relay_client.health", skip_all, err)]
    pub async fn health(&self) -> Result<HealthResponse, RelayClientError> {
        const CONTEXT: &str = "GET /health";
        let mut req = self.client.get(self.health_url.clone());
        if let Some(timeout) = self.timeout {
            req = req.timeout(timeout);
        }
        let response = req.send().await.map_err(|e| RelayClientError::Http {
            context: CONTEXT,
            source: e,
        })?;
        read_json(response, CONTEXT).await
    }
}

async fn read_json<R>(
    response: reqwest::Response,
    context: &'static str,
) -> Result<R, RelayClientError>
where
    R: serde::de::DeserializeOwned,
{
    let status = response.status();
    if status == StatusCode::OK {
        return response
            .json::<R>()
            .await
            .map_err(|e| RelayClientError::JsonDeserialization { context, source: e });
    }
    let body = response
        .text()
        .await
        .map_err(|e| RelayClientError::ResponseBodyRead { context, source: e })?;
    match serde_json::from_str::<ErrorBody>(&body) {
        Ok(body) => Err(RelayClientError::Rejected { status, body }),
        Err(_) => Err(RelayClientError::HttpStatus {
            context,
            status,
            body,
        }),
    }
}
