//! Client configuration
//!
//! ## Authors
//!
//! The Veracruz Development Team.
//!
//! ## Licensing and copyright notice
//!
//! See the `LICENSE.md` file in the Veracruz root directory for
//! information on licensing and copyright.

use crate::{error::ConfigError, state_machine::PollPolicy};
use attestation_verifier::AttestationPolicy;
use log::info;
use serde::{Deserialize, Serialize};
use std::{path::Path, time::Duration};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// JSON-RPC listener endpoint.
    pub json_rpc_uri: String,
    pub requester_id: String,
    /// Refuse workers without verifiable proof data.
    pub require_attestation: bool,
    pub poll_interval_ms: u64,
    pub max_wait_ms: u64,
    /// Carried in each request as `responseTimeoutMSecs`.
    pub response_timeout_msecs: u64,
    /// Retries of connection failures and timeouts inside the HTTP channel.
    pub transport_retries: u32,
    /// Bound on each HTTP exchange with the listener.
    pub transport_timeout_ms: u64,
    pub attestation: AttestationPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            json_rpc_uri: "http://localhost:1947".to_string(),
            requester_id: String::new(),
            require_attestation: true,
            poll_interval_ms: 2000,
            max_wait_ms: 60000,
            response_timeout_msecs: 6000,
            transport_retries: 3,
            transport_timeout_ms: 10_000,
            attestation: AttestationPolicy::default(),
        }
    }
}

impl ClientConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json).map_err(ConfigError::SerdeJsonError)?;
        config.assert_valid()?;
        info!(
            "ClientConfig: listener {}, acceptable quote statuses {}",
            config.json_rpc_uri, config.attestation.acceptable_quote_statuses
        );
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path).map_err(ConfigError::IOError)?;
        Self::from_json(&json)
    }

    pub fn assert_valid(&self) -> Result<(), ConfigError> {
        if self.json_rpc_uri.is_empty() {
            return Err(ConfigError::InvalidValue("json_rpc_uri", "must not be empty".to_string()));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::InvalidValue("poll_interval_ms", "must be positive".to_string()));
        }
        if self.transport_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "transport_timeout_ms",
                "must be positive".to_string(),
            ));
        }
        if self.max_wait_ms < self.poll_interval_ms {
            return Err(ConfigError::InvalidValue(
                "max_wait_ms",
                format!("{} is shorter than poll_interval_ms {}", self.max_wait_ms, self.poll_interval_ms),
            ));
        }
        if self.attestation.acceptable_quote_statuses.is_empty() && self.require_attestation {
            return Err(ConfigError::InvalidValue(
                "attestation.acceptable_quote_statuses",
                "no quote status is acceptable, yet attestation is required".to_string(),
            ));
        }
        if let Some(mr_enclave) = &self.attestation.expected_mr_enclave {
            match hex::decode(mr_enclave) {
                Ok(bytes) if bytes.len() == 32 => (),
                _ => {
                    return Err(ConfigError::InvalidValue(
                        "attestation.expected_mr_enclave",
                        format!("{:?} is not 32 hex-encoded bytes", mr_enclave),
                    ))
                }
            }
        }
        Ok(())
    }

    #[inline]
    pub fn transport_timeout(&self) -> Duration {
        Duration::from_millis(self.transport_timeout_ms)
    }

    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            max_wait: Duration::from_millis(self.max_wait_ms),
        }
    }
}
