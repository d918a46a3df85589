//! Relayer configuration.
//!
//! Loads configuration from a TOML file with support for environment variable
//! expansion in string values. Variables use `$VAR` or `${VAR}` syntax, which
//! keeps the relayer key and the HMAC secret out of the file itself.
//!
//! # Example Configuration
//!
//! ```toml
//! host = "0.0.0.0"
//! port = 3001
//! rpc_url = "https://rpc-amoy.polygon.technology"
//! chain_id = 80002
//! relayer_private_key = "$RELAYER_PK"
//! hmac_secret = "$RELAY_HMAC_SECRET"
//! forwarder = "0x5FbDB2315678afecb367f032d93F642f64180aa3"
//! recipient = "0xe7f1725E7734CE288F8367e1Bb143E90bb3F0512"
//! cors_origins = ["http://localhost:5173"]
//!
//! [rate_limit]
//! requests = 100
//! window_secs = 900
//! ```
//!
//! # Environment Variables
//!
//! - `CONFIG` - Path to configuration file (default: `config.toml`)
//! - `HOST` - Override server bind address
//! - `PORT` - Override server port
//! - Secrets referenced by `$VAR` in the config file

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use alloy_primitives::Address;
use alloy_signer_local::PrivateKeySigner;
use metapay_evm::ForwarderDomain;
use metapay_evm::domain::{DEFAULT_DOMAIN_NAME, DEFAULT_DOMAIN_VERSION};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::pipeline::SignatureCheck;

/// Errors from loading or validating the configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        /// Path that was read.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The configuration is not valid TOML for [`RelayerConfig`].
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    /// A secret still references an environment variable that is not set.
    #[error("{0} is not set (missing environment variable?)")]
    Unresolved(&'static str),
    /// A value is present but unusable.
    #[error("invalid {field}: {reason}")]
    Invalid {
        /// Offending key.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

/// Top-level relayer configuration.
///
/// Loaded once at startup and treated as immutable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayerConfig {
    /// Server bind address (default: `0.0.0.0`).
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Server port (default: `3001`).
    #[serde(default = "default_port")]
    pub port: u16,

    /// HTTP RPC endpoint URL.
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,

    /// Private key paying gas for relayed executions (hex, with or without
    /// `0x` prefix).
    #[serde(default)]
    pub relayer_private_key: String,

    /// EIP-155 chain id envelopes must be signed for (default: `80002`).
    #[serde(default = "default_chain_id")]
    pub chain_id: u64,

    /// Shared secret for the `x-relay-auth` MAC.
    #[serde(default)]
    pub hmac_secret: String,

    /// Origins allowed by CORS.
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,

    /// Deployed forwarder contract; envelopes must name exactly this address.
    #[serde(default)]
    pub forwarder: Address,

    /// Deployed payment recipient, reported by `/health`.
    #[serde(default)]
    pub recipient: Address,

    /// EIP-712 domain name of the forwarder.
    #[serde(default = "default_domain_name")]
    pub domain_name: String,

    /// EIP-712 domain version of the forwarder.
    #[serde(default = "default_domain_version")]
    pub domain_version: String,

    /// Where signatures are checked before execution (default: `chain`).
    #[serde(default)]
    pub signature_verification: SignatureCheck,

    /// Seconds the chain adapter waits for a receipt (default: `30`).
    #[serde(default = "default_receipt_timeout_secs")]
    pub receipt_timeout_secs: u64,

    /// Upper bound in seconds on the whole execution step (default: `60`).
    #[serde(default = "default_execution_timeout_secs")]
    pub execution_timeout_secs: u64,

    /// Block confirmations required before a receipt counts (default: `1`).
    #[serde(default = "default_confirmations")]
    pub confirmations: u64,

    /// Largest accepted request body in bytes (default: 64 KiB).
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// Per-client request quota.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

/// Per-client request quota: `requests` per `window_secs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Requests allowed per window (default: `100`).
    #[serde(default = "default_rate_limit_requests")]
    pub requests: u32,
    /// Window length in seconds (default: `900`).
    #[serde(default = "default_rate_limit_window_secs")]
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests: default_rate_limit_requests(),
            window_secs: default_rate_limit_window_secs(),
        }
    }
}

const fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

const fn default_port() -> u16 {
    3001
}

fn default_rpc_url() -> String {
    "https://rpc-amoy.polygon.technology".to_owned()
}

const fn default_chain_id() -> u64 {
    80002
}

fn default_cors_origins() -> Vec<String> {
    vec!["http://localhost:5173".to_owned()]
}

fn default_domain_name() -> String {
    DEFAULT_DOMAIN_NAME.to_owned()
}

fn default_domain_version() -> String {
    DEFAULT_DOMAIN_VERSION.to_owned()
}

const fn default_receipt_timeout_secs() -> u64 {
    30
}

const fn default_execution_timeout_secs() -> u64 {
    60
}

const fn default_confirmations() -> u64 {
    1
}

const fn default_max_body_bytes() -> usize {
    64 * 1024
}

const fn default_rate_limit_requests() -> u32 {
    100
}

const fn default_rate_limit_window_secs() -> u64 {
    900
}

impl RelayerConfig {
    /// Loads configuration from `path`, falling back to defaults when the
    /// file does not exist.
    ///
    /// After loading, all `$VAR` / `${VAR}` references are expanded from the
    /// process environment. `HOST` and `PORT` env vars override the file
    /// values.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = if path.exists() {
            std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.display().to_string(),
                source,
            })?
        } else {
            String::new()
        };

        let mut config = Self::from_toml(&content)?;

        if let Ok(host) = std::env::var("HOST")
            && let Ok(addr) = host.parse()
        {
            config.host = addr;
        }
        if let Ok(port) = std::env::var("PORT")
            && let Ok(p) = port.parse()
        {
            config.port = p;
        }

        Ok(config)
    }

    /// Parses configuration from TOML text, expanding environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if the text is not a valid configuration.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(content);
        Ok(toml::from_str(&expanded)?)
    }

    /// Checks that the relayer can start with this configuration.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure_resolved("relayer_private_key", &self.relayer_private_key)?;
        ensure_resolved("hmac_secret", &self.hmac_secret)?;
        if self.chain_id == 0 {
            return Err(invalid("chain_id", "must be positive"));
        }
        if self.forwarder == Address::ZERO {
            return Err(invalid("forwarder", "must be a deployed contract address"));
        }
        if self.rate_limit.requests == 0 || self.rate_limit.window_secs == 0 {
            return Err(invalid("rate_limit", "requests and window_secs must be positive"));
        }
        if self.execution_timeout_secs == 0 {
            return Err(invalid("execution_timeout_secs", "must be positive"));
        }
        if self.receipt_timeout_secs == 0 {
            return Err(invalid("receipt_timeout_secs", "must be positive"));
        }
        self.rpc_url()?;
        self.relayer_signer()?;
        Ok(())
    }

    /// Parses the RPC endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if it is not a URL.
    pub fn rpc_url(&self) -> Result<Url, ConfigError> {
        self.rpc_url
            .parse()
            .map_err(|e: url::ParseError| invalid("rpc_url", e.to_string()))
    }

    /// Parses the relayer key.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if it is not a secp256k1 private key.
    pub fn relayer_signer(&self) -> Result<PrivateKeySigner, ConfigError> {
        self.relayer_private_key
            .trim()
            .parse()
            .map_err(|_| invalid("relayer_private_key", "not a hex secp256k1 key"))
    }

    /// The signing domain envelopes are pinned to.
    #[must_use]
    pub fn domain(&self) -> ForwarderDomain {
        ForwarderDomain::new(self.chain_id, self.forwarder)
            .with_name_and_version(self.domain_name.clone(), self.domain_version.clone())
    }

    /// Address to bind the HTTP listener to.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Upper bound on the execution step.
    #[must_use]
    pub const fn execution_timeout(&self) -> Duration {
        Duration::from_secs(self.execution_timeout_secs)
    }
}

fn ensure_resolved(field: &'static str, value: &str) -> Result<(), ConfigError> {
    let value = value.trim();
    if value.is_empty() || value.starts_with('$') {
        return Err(ConfigError::Unresolved(field));
    }
    Ok(())
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

/// Expands `$VAR` and `${VAR}` patterns in a string from environment variables.
///
/// Unresolved variables and an unterminated `${` are left as-is.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '$' {
            result.push(ch);
            continue;
        }

        let braced = chars.peek() == Some(&'{');
        if braced {
            chars.next();
        }

        let mut name = String::new();
        let mut closed = false;
        while let Some(&c) = chars.peek() {
            if braced {
                if c == '}' {
                    chars.next();
                    closed = true;
                    break;
                }
            } else if !c.is_ascii_alphanumeric() && c != '_' {
                break;
            }
            name.push(c);
            chars.next();
        }

        match std::env::var(&name) {
            Ok(value) if !name.is_empty() && braced == closed => result.push_str(&value),
            _ => {
                result.push('$');
                if braced {
                    result.push('{');
                }
                result.push_str(&name);
                if closed {
                    result.push('}');
                }
            }
        }
    }

    result
}
