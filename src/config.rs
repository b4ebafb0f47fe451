//! Runtime configuration.
//!
//! Every field has a default, so a config file only needs to name what it
//! overrides:
//!
//! ```json
//! { "abi": "v0", "chain_id": "pulsar-3", "max_dispatch_depth": 8 }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::MocknetError;
use crate::runtime::AbiAdapter;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MocknetConfig {
    /// Calling convention used for every contract on this mocknet.
    pub abi: AbiAdapter,
    pub chain_id: String,
    /// Human-readable part of generated and validated addresses.
    pub address_prefix: String,
    /// Block height reported to the first call.
    pub block_height: u64,
    /// Block time in seconds since the unix epoch.
    pub block_time: u64,
    /// Seconds added to the block time by each `advance_block`.
    pub block_interval: u64,
    /// How many levels of sub-messages may be dispatched below a top-level call.
    pub max_dispatch_depth: usize,
}

impl Default for MocknetConfig {
    fn default() -> Self {
        Self {
            abi: AbiAdapter::default(),
            chain_id: "mocknet".to_string(),
            address_prefix: "secret".to_string(),
            block_height: 1,
            block_time: 1_700_000_000,
            block_interval: 5,
            max_dispatch_depth: 32,
        }
    }
}

impl MocknetConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self, MocknetError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| MocknetError::Config(format!("invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, MocknetError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| MocknetError::Config(format!("failed to read {}: {e}", path.display())))?;
        Self::from_json(&text)
    }

    pub fn with_abi(mut self, abi: AbiAdapter) -> Self {
        self.abi = abi;
        self
    }

    pub fn with_chain_id(mut self, chain_id: impl Into<String>) -> Self {
        self.chain_id = chain_id.into();
        self
    }

    pub fn with_address_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.address_prefix = prefix.into();
        self
    }

    pub fn with_block(mut self, height: u64, time: u64) -> Self {
        self.block_height = height;
        self.block_time = time;
        self
    }

    pub fn with_max_dispatch_depth(mut self, depth: usize) -> Self {
        self.max_dispatch_depth = depth;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), MocknetError> {
        if self.address_prefix.is_empty()
            || !self
                .address_prefix
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        {
            return Err(MocknetError::Config(format!(
                "address prefix `{}` must be non-empty lowercase ascii",
                self.address_prefix
            )));
        }
        if self.chain_id.is_empty() {
            return Err(MocknetError::Config("chain id must not be empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_keeps_defaults() {
        let config = MocknetConfig::from_json(r#"{"abi": "v0", "max_dispatch_depth": 4}"#).unwrap();
        assert_eq!(config.abi, AbiAdapter::V0);
        assert_eq!(config.max_dispatch_depth, 4);
        assert_eq!(config.address_prefix, "secret");
        assert_eq!(config.chain_id, "mocknet");
    }

    #[test]
    fn rejects_bad_prefix() {
        let err = MocknetConfig::from_json(r#"{"address_prefix": "Secret"}"#).unwrap_err();
        assert!(matches!(err, MocknetError::Config(_)));
    }

    #[test]
    fn rejects_unknown_abi() {
        assert!(MocknetConfig::from_json(r#"{"abi": "v2"}"#).is_err());
    }

    #[test]
    fn reads_from_file() {
        let path = std::env::temp_dir().join(format!("mocknet-config-{}.json", std::process::id()));
        std::fs::write(&path, r#"{"chain_id": "pulsar-3", "block_height": 100}"#).unwrap();
        let config = MocknetConfig::from_json_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.chain_id, "pulsar-3");
        assert_eq!(config.block_height, 100);
        assert_eq!(config.block_interval, 5);
    }

    #[test]
    fn builder_setters() {
        let config = MocknetConfig::new()
            .with_abi(AbiAdapter::V0)
            .with_chain_id("local")
            .with_address_prefix("cosmos")
            .with_block(10, 20)
            .with_max_dispatch_depth(2);
        assert_eq!(config.chain_id, "local");
        assert_eq!(config.address_prefix, "cosmos");
        assert_eq!((config.block_height, config.block_time), (10, 20));
        assert!(config.validate().is_ok());
    }
}
