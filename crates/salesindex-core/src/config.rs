//! Indexer configuration, loaded from a TOML file.
//!
//! ```toml
//! [contracts]
//! naming   = "0x06ac597f8116f886fa1c97a23fa4e08299975ecaf6b598873ca6792b9bbfb678"
//! eth      = "0x049d36570d4e46f48e99674bd3fcc84644ddd6b96f7c741b1562b82f9e004dc7"
//! renewal  = "0x…"
//! referral = "0x…"
//!
//! [apibara]
//! indexer_id        = "sales"
//! reset_state       = false
//! starting_block    = 0
//! connection_string = "sqlite:./sales.db"
//! apibara_stream    = "./blocks.jsonl"
//! token             = ""
//!
//! [watchtower]
//! endpoint = "https://…"
//! app_id   = "…"
//! token    = "…"
//!
//! [watchtower.types]
//! info    = "…"
//! warning = "…"
//! severe  = "…"
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::IndexerError;
use crate::types::Felt;

/// Addresses of the four contracts whose events are indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractAddresses {
    /// Naming registry; emits `starknet_id_update` and receives payments.
    pub naming: Felt,
    /// Payment token; emits `Transfer`.
    pub eth: Felt,
    /// Auto-renewal contract; emits `domain_renewed`.
    pub renewal: Felt,
    /// Referral contract; emits `on_commission`.
    pub referral: Felt,
}

/// Stream and storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamSettings {
    /// Unique name for this indexer (checkpoint key).
    pub indexer_id: String,
    /// Discard stored state and checkpoint before the first run.
    #[serde(default)]
    pub reset_state: bool,
    /// First block to index.
    #[serde(default)]
    pub starting_block: u64,
    /// Document store location, e.g. `sqlite:./sales.db` or `memory`.
    pub connection_string: String,
    /// Block stream location.
    pub apibara_stream: String,
    /// Stream authentication token.
    #[serde(default)]
    pub token: String,
    /// Network slug used in checkpoint keys.
    #[serde(default = "default_network")]
    pub network: String,
    /// Save a checkpoint every N blocks.
    #[serde(default = "default_checkpoint_interval")]
    pub checkpoint_interval: u64,
}

fn default_network() -> String {
    "starknet-mainnet".into()
}

fn default_checkpoint_interval() -> u64 {
    1
}

/// Watchtower message type ids, one per severity.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WatchtowerTypes {
    pub info: String,
    pub warning: String,
    pub severe: String,
}

/// Remote alerting endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WatchtowerSettings {
    pub endpoint: String,
    pub app_id: String,
    pub token: String,
    #[serde(default)]
    pub types: WatchtowerTypes,
}

/// Log level per component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Global default level: "trace" | "debug" | "info" | "warn" | "error"
    #[serde(default = "default_level")]
    pub level: String,
    /// Override per component: component_name → level
    #[serde(default)]
    pub components: HashMap<String, String>,
    /// Emit JSON structured logs
    #[serde(default)]
    pub json: bool,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            components: HashMap::new(),
            json: false,
        }
    }
}

/// Full indexer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerConfig {
    pub contracts: ContractAddresses,
    pub apibara: StreamSettings,
    /// Absent section disables remote alerting.
    #[serde(default)]
    pub watchtower: Option<WatchtowerSettings>,
    #[serde(default)]
    pub log: LogConfig,
}

impl IndexerConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, IndexerError> {
        toml::from_str(content).map_err(|e| IndexerError::Config(e.to_string()))
    }

    /// Load `path`, first copying `template` into place if `path` does not exist.
    pub fn load(path: &Path, template: &Path) -> Result<Self, IndexerError> {
        if !path.is_file() {
            tracing::warn!(
                config = %path.display(),
                template = %template.display(),
                "config file missing, copying template"
            );
            fs::copy(template, path).map_err(|e| {
                IndexerError::Config(format!("cannot copy {}: {e}", template.display()))
            })?;
        }
        let content = fs::read_to_string(path)
            .map_err(|e| IndexerError::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [contracts]
        naming = "0x6ac597f8116f886fa1c97a23fa4e08299975ecaf6b598873ca6792b9bbfb678"
        eth = "0x49d36570d4e46f48e99674bd3fcc84644ddd6b96f7c741b1562b82f9e004dc7"
        renewal = "0x3"
        referral = "0x4"

        [apibara]
        indexer_id = "sales"
        reset_state = true
        starting_block = 12000
        connection_string = "memory"
        apibara_stream = "./blocks.jsonl"
        token = "secret"

        [watchtower]
        endpoint = "https://watchtower.example/api/service/add_message"
        app_id = "app"
        token = "wt"

        [watchtower.types]
        info = "i"
        warning = "w"
        severe = "s"
    "#;

    #[test]
    fn parse_full_config() {
        let cfg = IndexerConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(cfg.contracts.renewal, Felt::from(3u64));
        assert_eq!(cfg.apibara.starting_block, 12_000);
        assert!(cfg.apibara.reset_state);
        assert_eq!(cfg.apibara.network, "starknet-mainnet");
        assert_eq!(cfg.apibara.checkpoint_interval, 1);
        assert_eq!(cfg.watchtower.unwrap().types.warning, "w");
        assert_eq!(cfg.log.level, "info");
    }

    #[test]
    fn missing_section_is_a_config_error() {
        let err = IndexerConfig::from_toml_str("[contracts]\nnaming = \"0x1\"").unwrap_err();
        assert_eq!(err.kind(), "Config");
    }

    #[test]
    fn load_copies_template_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("config.template.toml");
        let path = dir.path().join("config.toml");
        fs::write(&template, SAMPLE).unwrap();

        let cfg = IndexerConfig::load(&path, &template).unwrap();
        assert_eq!(cfg.apibara.indexer_id, "sales");
        assert!(path.is_file());
    }

    #[test]
    fn load_without_template_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = IndexerConfig::load(&dir.path().join("a.toml"), &dir.path().join("b.toml"))
            .unwrap_err();
        assert_eq!(err.kind(), "Config");
    }
}
