//! # dposcore Configuration
//!
//! Configuration parsing for the dposcore consensus engine. All settings live
//! in one TOML file:
//!
//! ```rust
//! use dposcore_config::Config;
//!
//! let config = Config::from_toml_str(r#"
//!     [chain]
//!     chain_id = 50
//!
//!     [chain.dpos]
//!     period = 2
//!     epoch = 900
//!     gap = 450
//! "#).unwrap();
//! assert!(config.chain.is_checkpoint(1800));
//! ```
//!
//! ## Configuration Sections
//!
//! - `[chain]` - Chain identity
//! - `[chain.dpos]` - Engine parameters (period, epoch, gap, rewards, bypass flags)
//! - `[chain.forks]` - Hard-fork activation heights and pinned block hashes
//! - `[storage]` - Snapshot store location
//! - `[logging]` - Log level and format

#![warn(missing_docs)]
#![deny(unsafe_code)]

mod config;
mod error;
mod logging;

pub use config::*;
pub use error::*;
pub use logging::init_tracing;
