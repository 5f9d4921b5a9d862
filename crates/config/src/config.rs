//! Main configuration module
//!
//! Engine parameters are grouped the way the engine consumes them: chain-wide
//! values (`ChainConfig`), the engine's own knobs (`DposConfig`), and
//! hard-fork activation (`ForkConfig`).

use crate::error::{ConfigError, ConfigResult};
use dposcore_types::H256;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Main configuration struct.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Chain identity, engine parameters and forks
    #[serde(default)]
    pub chain: ChainConfig,

    /// Snapshot store configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load and validate configuration from a TOML file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        info!(path = %path.display(), "Loading configuration");

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config = Self::from_toml_str(&content)?;

        info!(
            chain_id = config.chain.chain_id,
            epoch = config.chain.dpos.epoch,
            period = config.chain.dpos.period,
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Parse and validate configuration from a TOML string.
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let config: Config = toml::from_str(content)?;
        debug!("Configuration parsed, validating");
        config.validate()?;
        Ok(config)
    }

    /// Validate every section.
    pub fn validate(&self) -> ConfigResult<()> {
        self.chain.validate()?;
        self.storage.validate()?;
        self.logging.validate()?;
        Ok(())
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| ConfigError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

// =============================================================================
// Chain Configuration
// =============================================================================

/// Chain-wide parameters handed to the engine through the chain reader.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Unique chain identifier
    pub chain_id: u64,

    /// Engine parameters
    #[serde(default)]
    pub dpos: DposConfig,

    /// Hard-fork activation
    #[serde(default)]
    pub forks: ForkConfig,
}

impl ChainConfig {
    /// Validate the chain section.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.chain_id == 0 {
            return Err(ConfigError::InvalidChainId);
        }
        self.dpos.validate()
    }

    /// Whether `number` is a checkpoint height.
    pub fn is_checkpoint(&self, number: u64) -> bool {
        self.dpos.is_checkpoint(number)
    }

    /// Whether the header/candidate penalty hook replaces the epoch hook at `number`.
    pub fn is_tip_signing(&self, number: u64) -> bool {
        self.forks.tip_signing_block.is_some_and(|fork| number >= fork)
    }

    /// Whether the M2 rotation offset applies at `number`.
    pub fn is_tip_randomize(&self, number: u64) -> bool {
        self.forks.tip_randomize_block.is_some_and(|fork| number >= fork)
    }
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            chain_id: 50,
            dpos: DposConfig::default(),
            forks: ForkConfig::default(),
        }
    }
}

// =============================================================================
// Engine Configuration
// =============================================================================

/// Engine parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DposConfig {
    /// Minimum seconds between consecutive blocks
    pub period: u64,

    /// Blocks per epoch; checkpoints sit at multiples of it
    pub epoch: u64,

    /// Snapshots are persisted at heights where `(number + gap) % epoch == 0`
    pub gap: u64,

    /// Reward hook cadence in blocks
    pub reward_checkpoint: u64,

    /// Disables all consensus validation (test harnesses only)
    pub skip_validation: bool,

    /// Testnet bypass: never request full verification
    pub testnet: bool,

    /// Checkpoint alignment required to build the M1/M2 table
    pub randomize_interval: u64,

    /// Number of past epochs whose penalties still exclude a masternode
    pub penalty_lookback_epochs: u64,

    /// Folder for per-block reward breakdown files; disabled when unset
    pub store_reward_folder: Option<PathBuf>,

    /// Historical checkpoint heights whose signer reconciliation is skipped
    pub skip_signer_check_blocks: BTreeSet<u64>,
}

impl DposConfig {
    /// Validate engine parameters.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.epoch == 0 {
            return Err(ConfigError::InvalidEpoch);
        }
        if self.gap >= self.epoch {
            return Err(ConfigError::InvalidGap {
                epoch: self.epoch,
                gap: self.gap,
            });
        }
        if self.randomize_interval == 0 {
            return Err(ConfigError::ZeroParameter("randomize_interval"));
        }
        if self.reward_checkpoint == 0 {
            return Err(ConfigError::ZeroParameter("reward_checkpoint"));
        }
        Ok(())
    }

    /// Whether `number` is a checkpoint height.
    pub fn is_checkpoint(&self, number: u64) -> bool {
        number % self.epoch == 0
    }

    /// Whether a snapshot anchored at `number` is persisted.
    pub fn is_snapshot_persist_height(&self, number: u64) -> bool {
        (number + self.gap) % self.epoch == 0
    }

    /// The checkpoint at or below `number`.
    pub fn checkpoint_of(&self, number: u64) -> u64 {
        number - number % self.epoch
    }
}

impl Default for DposConfig {
    fn default() -> Self {
        Self {
            period: 2,
            epoch: 900,
            gap: 450,
            reward_checkpoint: 900,
            skip_validation: false,
            testnet: false,
            randomize_interval: 900,
            penalty_lookback_epochs: 4,
            store_reward_folder: None,
            skip_signer_check_blocks: BTreeSet::new(),
        }
    }
}

// =============================================================================
// Fork Configuration
// =============================================================================

/// A block hash every node must agree on at a given height.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinnedHash {
    /// Block height
    pub number: u64,
    /// Required hash at that height
    pub hash: H256,
}

/// Hard-fork activation heights.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ForkConfig {
    /// Switches checkpoint penalties to the header/candidate hook
    pub tip_signing_block: Option<u64>,

    /// Enables the epoch-dependent M2 rotation offset
    pub tip_randomize_block: Option<u64>,

    /// Heights whose hash is fixed by a fork
    pub pinned_hashes: Vec<PinnedHash>,
}

impl ForkConfig {
    /// The pinned hash for `number`, if any.
    pub fn pinned_hash(&self, number: u64) -> Option<H256> {
        self.pinned_hashes
            .iter()
            .find(|p| p.number == number)
            .map(|p| p.hash)
    }
}

// =============================================================================
// Storage Configuration
// =============================================================================

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Snapshot database directory
    pub data_dir: String,
}

impl StorageConfig {
    /// Validate the storage section.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.data_dir.is_empty() {
            return Err(ConfigError::MissingField("storage.data_dir"));
        }
        Ok(())
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: "./data/dposcore".to_string(),
        }
    }
}

// =============================================================================
// Logging Configuration
// =============================================================================

/// Output format of the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Multi-line human readable output
    Pretty,
    /// Single-line human readable output
    Compact,
    /// One JSON object per event
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (json, pretty, compact)
    pub format: String,
}

impl LoggingConfig {
    /// Validate level and format.
    pub fn validate(&self) -> ConfigResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.level.to_lowercase().as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.level.clone()));
        }
        self.log_format().map(|_| ())
    }

    /// Parsed output format.
    pub fn log_format(&self) -> ConfigResult<LogFormat> {
        match self.format.to_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "compact" => Ok(LogFormat::Compact),
            "json" => Ok(LogFormat::Json),
            _ => Err(ConfigError::InvalidLogFormat(self.format.clone())),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}
