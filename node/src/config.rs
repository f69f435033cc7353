//! Node configuration with TOML file support.

use serde::{Deserialize, Serialize};

use fedvote_consensus::adapter::DEFAULT_MAX_DEFERRED;
use fedvote_consensus::active_elections::DEFAULT_MAX_ELECTIONS;
use fedvote_consensus::pending::{DEFAULT_MAX_KEYS, DEFAULT_TTL_MS};
use fedvote_consensus::round_timer::DEFAULT_ROUND_TIMEOUT_MS;
use fedvote_consensus::AdapterConfig;
use fedvote_messages::KeyPairSigner;

use crate::logging::LogFormat;
use crate::NodeError;

/// Configuration for a fedvote node.
///
/// Can be loaded from a TOML file via [`NodeConfig::from_toml_file`] or
/// built programmatically (e.g. for tests).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Hex-encoded 32-byte Ed25519 seed. A fresh key is generated when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_seed: Option<String>,

    /// How long a round may stall before this node faults it.
    #[serde(default = "default_round_timeout_ms")]
    pub round_timeout_ms: u64,

    /// Upper bound on concurrently running elections.
    #[serde(default = "default_max_elections")]
    pub max_elections: usize,

    /// Messages held per election for a future round.
    #[serde(default = "default_max_deferred")]
    pub max_deferred: usize,

    /// Elections with messages buffered before they started locally.
    #[serde(default = "default_max_buffered")]
    pub max_buffered: usize,

    /// Lifetime of a buffered message, in milliseconds.
    #[serde(default = "default_buffer_ttl_ms")]
    pub buffer_ttl_ms: u64,

    /// Log format: "human" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Log level filter: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Whether to keep a Prometheus registry for the election service.
    #[serde(default)]
    pub enable_metrics: bool,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_round_timeout_ms() -> u64 {
    DEFAULT_ROUND_TIMEOUT_MS
}

fn default_max_elections() -> usize {
    DEFAULT_MAX_ELECTIONS
}

fn default_max_deferred() -> usize {
    DEFAULT_MAX_DEFERRED
}

fn default_max_buffered() -> usize {
    DEFAULT_MAX_KEYS
}

fn default_buffer_ttl_ms() -> u64 {
    DEFAULT_TTL_MS
}

fn default_log_format() -> String {
    "human".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

// ── Impl ───────────────────────────────────────────────────────────────

impl NodeConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: &str) -> Result<Self, NodeError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| NodeError::Config(e.to_string()))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, NodeError> {
        let config: Self = toml::from_str(s).map_err(|e| NodeError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml_string(&self) -> Result<String, NodeError> {
        toml::to_string_pretty(self).map_err(|e| NodeError::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), NodeError> {
        if self.round_timeout_ms == 0 {
            return Err(NodeError::Config("round_timeout_ms must be positive".into()));
        }
        if self.max_elections == 0 {
            return Err(NodeError::Config("max_elections must be positive".into()));
        }
        self.parsed_log_format()?;
        if let Some(seed) = &self.identity_seed {
            parse_seed(seed)?;
        }
        Ok(())
    }

    pub fn parsed_log_format(&self) -> Result<LogFormat, NodeError> {
        self.log_format.parse()
    }

    /// The signer for this node's identity.
    pub fn signer(&self) -> Result<KeyPairSigner, NodeError> {
        match &self.identity_seed {
            Some(seed) => Ok(KeyPairSigner::from_seed(&parse_seed(seed)?)),
            None => Ok(KeyPairSigner::new(fedvote_crypto::generate_keypair())),
        }
    }

    pub fn adapter_config(&self) -> AdapterConfig {
        AdapterConfig {
            max_deferred: self.max_deferred,
        }
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            identity_seed: None,
            round_timeout_ms: default_round_timeout_ms(),
            max_elections: default_max_elections(),
            max_deferred: default_max_deferred(),
            max_buffered: default_max_buffered(),
            buffer_ttl_ms: default_buffer_ttl_ms(),
            log_format: default_log_format(),
            log_level: default_log_level(),
            enable_metrics: false,
        }
    }
}

fn parse_seed(seed: &str) -> Result<[u8; 32], NodeError> {
    let bytes = hex::decode(seed.trim())
        .map_err(|e| NodeError::Config(format!("identity_seed: {e}")))?;
    <[u8; 32]>::try_from(bytes.as_slice()).map_err(|_| {
        NodeError::Config(format!(
            "identity_seed: expected 32 bytes, got {}",
            bytes.len()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use fedvote_messages::MessageSigner;

    #[test]
    fn default_config_round_trips_through_toml() {
        let config = NodeConfig::default();
        let toml_str = config.to_toml_string().unwrap();
        let parsed = NodeConfig::from_toml_str(&toml_str).expect("should parse");
        assert_eq!(parsed, config);
    }

    #[test]
    fn minimal_toml_uses_defaults() {
        let config = NodeConfig::from_toml_str("").expect("empty toml should use defaults");
        assert_eq!(config.round_timeout_ms, 5_000);
        assert_eq!(config.max_elections, 64);
        assert_eq!(config.log_format, "human");
        assert!(config.identity_seed.is_none());
    }

    #[test]
    fn partial_toml_overrides() {
        let toml = r#"
            round_timeout_ms = 750
            max_deferred = 8
        "#;
        let config = NodeConfig::from_toml_str(toml).expect("should parse");
        assert_eq!(config.round_timeout_ms, 750);
        assert_eq!(config.adapter_config().max_deferred, 8);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn seed_gives_stable_identity() {
        let seed = "07".repeat(32);
        let config = NodeConfig::from_toml_str(&format!("identity_seed = \"{seed}\"")).unwrap();
        let a = config.signer().unwrap().identity();
        let b = config.signer().unwrap().identity();
        assert_eq!(a, b);
        assert_eq!(a, KeyPairSigner::from_seed(&[7; 32]).identity());
    }

    #[test]
    fn bad_values_are_config_errors() {
        for toml in [
            "identity_seed = \"abcd\"",
            "identity_seed = \"zz\"",
            "round_timeout_ms = 0",
            "log_format = \"xml\"",
        ] {
            let err = NodeConfig::from_toml_str(toml).unwrap_err();
            assert!(matches!(err, NodeError::Config(_)), "{toml}");
        }
    }

    #[test]
    fn missing_file_returns_config_error() {
        let result = NodeConfig::from_toml_file("/nonexistent/fedvote.toml");
        assert!(matches!(result, Err(NodeError::Config(_))));
    }
}
