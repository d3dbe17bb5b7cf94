// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Server endpoint configuration.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use uasc_core::comms::tcp_types::MIN_CHUNK_SIZE;
use uasc_core::comms::url::is_valid_opc_ua_url;
use uasc_core::config::Config;
use uasc_crypto::SecurityPolicy;
use uasc_types::MessageSecurityMode;

/// A security policy / mode pair the endpoint will accept during
/// `OpenSecureChannel`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityPolicyConfig {
    /// Name of the security policy, e.g. "None" or "Basic256Sha256".
    pub security_policy: String,
    /// Name of the security mode, e.g. "None", "Sign" or "SignAndEncrypt".
    pub security_mode: String,
}

impl SecurityPolicyConfig {
    /// A policy pair accepting unsecured connections.
    pub fn none() -> Self {
        SecurityPolicyConfig {
            security_policy: SecurityPolicy::None.name().to_string(),
            security_mode: "None".to_string(),
        }
    }

    /// A policy pair for the given policy and mode.
    pub fn new(policy: SecurityPolicy, mode: MessageSecurityMode) -> Self {
        SecurityPolicyConfig {
            security_policy: policy.name().to_string(),
            security_mode: <&str>::from(mode).to_string(),
        }
    }

    /// Resolve to the typed policy and mode. `None` if either name is not
    /// recognized or the pair is inconsistent.
    pub fn resolve(&self) -> Option<(SecurityPolicy, MessageSecurityMode)> {
        let policy = SecurityPolicy::from_str(&self.security_policy).ok()?;
        let mode = MessageSecurityMode::from(self.security_mode.as_str());
        match (policy, mode) {
            (SecurityPolicy::Unknown, _) | (_, MessageSecurityMode::Invalid) => None,
            // An unsecured policy cannot sign or encrypt and vice versa
            (SecurityPolicy::None, MessageSecurityMode::None) => Some((policy, mode)),
            (SecurityPolicy::None, _) | (_, MessageSecurityMode::None) => None,
            _ => Some((policy, mode)),
        }
    }
}

/// Sizes and limits of the transport, subject to HELLO/ACK negotiation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportLimits {
    /// Size of the buffer used for sending chunks.
    pub send_buffer_size: usize,
    /// Size of the buffer used for receiving chunks.
    pub receive_buffer_size: usize,
    /// Maximum size of a complete message, 0 for no limit.
    pub max_message_size: usize,
    /// Maximum number of chunks in a message, 0 for no limit.
    pub max_chunk_count: usize,
}

impl Default for TransportLimits {
    fn default() -> Self {
        Self {
            send_buffer_size: 65536,
            receive_buffer_size: 65536,
            max_message_size: uasc_types::constants::MAX_MESSAGE_SIZE,
            max_chunk_count: uasc_types::constants::MAX_CHUNK_COUNT,
        }
    }
}

/// Configuration of a server endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// The `opc.tcp` URL the endpoint listens on.
    pub endpoint_url: String,
    /// The security policy / mode pairs this endpoint accepts.
    pub security_policies: Vec<SecurityPolicyConfig>,
    /// Transport sizes and limits.
    #[serde(default)]
    pub limits: TransportLimits,
    /// Maximum number of live connections on the endpoint.
    #[serde(default = "defaults::max_connections")]
    pub max_connections: usize,
    /// How long a freshly accepted socket may take to send its HELLO, in milliseconds.
    #[serde(default = "defaults::hello_timeout_ms")]
    pub hello_timeout_ms: u64,
}

mod defaults {
    pub(super) fn max_connections() -> usize {
        64
    }

    pub(super) fn hello_timeout_ms() -> u64 {
        5_000
    }
}

impl EndpointConfig {
    /// Create a config for an endpoint accepting unsecured connections only.
    pub fn new_none(endpoint_url: &str) -> EndpointConfig {
        EndpointConfig {
            endpoint_url: endpoint_url.to_string(),
            security_policies: vec![SecurityPolicyConfig::none()],
            limits: TransportLimits::default(),
            max_connections: defaults::max_connections(),
            hello_timeout_ms: defaults::hello_timeout_ms(),
        }
    }

    /// Test if the endpoint is configured to accept the supplied policy and mode.
    pub fn supports(&self, policy: SecurityPolicy, mode: MessageSecurityMode) -> bool {
        self.security_policies
            .iter()
            .filter_map(|p| p.resolve())
            .any(|(p, m)| p == policy && m == mode)
    }
}

impl Config for EndpointConfig {
    fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        if !is_valid_opc_ua_url(&self.endpoint_url) {
            errors.push(format!(
                "Endpoint url {} is not a valid opc.tcp url",
                self.endpoint_url
            ));
        }
        if self.security_policies.is_empty() {
            errors.push("Endpoint has no security policies".to_string());
        }
        for p in &self.security_policies {
            if p.resolve().is_none() {
                errors.push(format!(
                    "Endpoint security policy {} / {} is not valid",
                    p.security_policy, p.security_mode
                ));
            }
        }
        if self.limits.send_buffer_size < MIN_CHUNK_SIZE
            || self.limits.receive_buffer_size < MIN_CHUNK_SIZE
        {
            errors.push(format!(
                "Endpoint buffer sizes must be at least {} bytes",
                MIN_CHUNK_SIZE
            ));
        }
        if self.max_connections == 0 {
            errors.push("Endpoint must allow at least one connection".to_string());
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_catches_bad_config() {
        let mut config = EndpointConfig::new_none("opc.tcp://localhost:4840/uasc");
        assert!(config.validate().is_ok());

        config.endpoint_url = "http://localhost".to_string();
        assert!(config.validate().is_err());

        let mut config = EndpointConfig::new_none("opc.tcp://localhost:4840/uasc");
        config.security_policies.clear();
        assert!(config.validate().is_err());

        let mut config = EndpointConfig::new_none("opc.tcp://localhost:4840/uasc");
        config.limits.receive_buffer_size = 100;
        assert!(config.validate().is_err());
    }

    #[test]
    fn policy_pairs_resolve() {
        assert_eq!(
            SecurityPolicyConfig::none().resolve(),
            Some((SecurityPolicy::None, MessageSecurityMode::None))
        );
        let pair = SecurityPolicyConfig::new(
            SecurityPolicy::Basic256Sha256,
            MessageSecurityMode::SignAndEncrypt,
        );
        assert_eq!(
            pair.resolve(),
            Some((
                SecurityPolicy::Basic256Sha256,
                MessageSecurityMode::SignAndEncrypt
            ))
        );

        // Inconsistent pairs do not resolve
        let pair = SecurityPolicyConfig {
            security_policy: "None".to_string(),
            security_mode: "Sign".to_string(),
        };
        assert!(pair.resolve().is_none());
        let pair = SecurityPolicyConfig {
            security_policy: "Basic256".to_string(),
            security_mode: "None".to_string(),
        };
        assert!(pair.resolve().is_none());
    }

    #[test]
    fn yaml_round_trip() {
        let mut config = EndpointConfig::new_none("opc.tcp://localhost:4840/uasc");
        config.security_policies.push(SecurityPolicyConfig::new(
            SecurityPolicy::Basic256Sha256,
            MessageSecurityMode::SignAndEncrypt,
        ));
        let s = serde_yaml::to_string(&config).unwrap();
        let parsed: EndpointConfig = serde_yaml::from_str(&s).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn config_supports() {
        let mut config = EndpointConfig::new_none("opc.tcp://localhost:4840/uasc");
        config.security_policies.push(SecurityPolicyConfig::new(
            SecurityPolicy::Basic256Sha256,
            MessageSecurityMode::SignAndEncrypt,
        ));
        assert!(config.supports(SecurityPolicy::None, MessageSecurityMode::None));
        assert!(config.supports(
            SecurityPolicy::Basic256Sha256,
            MessageSecurityMode::SignAndEncrypt
        ));
        assert!(!config.supports(SecurityPolicy::Basic256, MessageSecurityMode::Sign));
    }
}
