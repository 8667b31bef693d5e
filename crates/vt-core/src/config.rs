//! Configuration parsing for the simulation terminal.
//!
//! Everything is read from a single JSON file: logging metadata, the account,
//! the instruments to simulate, replay parameters and engine tuning.
//!
//! # Example config
//!
//! ```json
//! {
//!   "Terminal": { "module_name": "vt_sim", "log_path": "/tmp/log" },
//!   "account": { "name": "demo", "balance": 10000.0 },
//!   "instruments": [
//!     { "name": "SPY", "kind": "spot", "time_frame_ms": 60000 },
//!     { "name": "ESZ4", "kind": "future", "contract_multiplier": 50 }
//!   ],
//!   "replay": { "source_dir": "./ticks", "interval_ms": 100, "seed_ticks": 1 },
//!   "engine": { "cpu_core": 2, "queue_capacity": 8192 }
//! }
//! ```

use std::collections::HashSet;

use serde::Deserialize;

use crate::error::VtError;
use crate::time_util::US_PER_MS;
use crate::types::{Instrument, InstrumentKind};

/// Top-level application config, deserialized from a JSON file.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Module metadata (name, log path).
    #[serde(rename = "Terminal")]
    pub terminal: Option<ModuleMeta>,

    /// The single simulated account.
    pub account: AccountConfig,

    /// Instruments the simulation knows about.
    pub instruments: Vec<InstrumentConfig>,

    #[serde(default)]
    pub replay: ReplayConfig,

    #[serde(default)]
    pub engine: EngineConfig,
}

impl AppConfig {
    /// Returns the module name, defaulting to `"vt_sim"`.
    pub fn module_name(&self) -> String {
        self.terminal.as_ref().and_then(|m| m.module_name.clone()).unwrap_or_else(|| "vt_sim".into())
    }

    /// Returns the log path.
    pub fn log_path(&self) -> Option<String> {
        self.terminal.as_ref().and_then(|m| m.log_path.clone())
    }

    /// Instrument definitions in config order.
    pub fn instruments(&self) -> Vec<Instrument> {
        self.instruments.iter().map(InstrumentConfig::to_instrument).collect()
    }

    /// Reject configs the engine cannot run with.
    pub fn validate(&self) -> Result<(), VtError> {
        if !self.account.balance.is_finite() {
            return Err(VtError::Config("account.balance must be finite".into()));
        }
        let mut seen = HashSet::new();
        for inst in &self.instruments {
            if inst.name.trim().is_empty() {
                return Err(VtError::Config("instrument name must not be empty".into()));
            }
            if !seen.insert(inst.name.as_str()) {
                return Err(VtError::Config(format!("duplicate instrument: {}", inst.name)));
            }
            if inst.time_frame_ms.is_some_and(|ms| ms.checked_mul(US_PER_MS).is_none()) {
                return Err(VtError::Config(format!("{}: time_frame_ms out of range", inst.name)));
            }
            if inst.contract_multiplier.is_some_and(|m| !m.is_finite() || m <= 0.0) {
                return Err(VtError::Config(format!("{}: contract_multiplier must be positive", inst.name)));
            }
        }
        Ok(())
    }
}

/// Module metadata block.
#[derive(Debug, Clone, Deserialize)]
pub struct ModuleMeta {
    pub module_name: Option<String>,
    pub log_path: Option<String>,
}

/// Account settings.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountConfig {
    /// Display name of the account.
    pub name: Option<String>,
    /// Starting balance.
    pub balance: f64,
}

impl AccountConfig {
    pub fn effective_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| "simulation".into())
    }
}

/// One instrument entry.
#[derive(Debug, Clone, Deserialize)]
pub struct InstrumentConfig {
    pub name: String,
    #[serde(default)]
    pub kind: InstrumentKind,
    /// Bar width in milliseconds. Omit for one bar per tick timestamp.
    pub time_frame_ms: Option<u64>,
    /// Contract multiplier for futures / options.
    pub contract_multiplier: Option<f64>,
}

impl InstrumentConfig {
    pub fn to_instrument(&self) -> Instrument {
        Instrument {
            name: self.name.clone(),
            kind: self.kind,
            time_frame_us: self.time_frame_ms.and_then(|ms| ms.checked_mul(US_PER_MS)),
            contract_multiplier: self.contract_multiplier,
        }
    }
}

/// Tick replay settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReplayConfig {
    /// Directory holding `<instrument>.jsonl` tick files.
    pub source_dir: Option<String>,
    /// Delay between two delivered ticks, per instrument (default: 100 ms).
    pub interval_ms: Option<u64>,
    /// Ticks delivered on connect, before any subscription (default: 1).
    pub seed_ticks: Option<usize>,
}

impl ReplayConfig {
    pub fn effective_interval_ms(&self) -> u64 {
        self.interval_ms.unwrap_or(100)
    }

    pub fn effective_seed_ticks(&self) -> usize {
        self.seed_ticks.unwrap_or(1)
    }
}

/// Engine worker settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EngineConfig {
    /// CPU core for the engine worker thread.
    pub cpu_core: Option<usize>,
    /// Capacity of the engine command queue (default: 8192).
    pub queue_capacity: Option<usize>,
}

impl EngineConfig {
    pub fn effective_queue_capacity(&self) -> usize {
        self.queue_capacity.unwrap_or(8192).max(1)
    }
}

/// Parse a config from a JSON string and validate it.
pub fn parse_config(content: &str) -> anyhow::Result<AppConfig> {
    let config: AppConfig = serde_json::from_str(content)?;
    config.validate()?;
    Ok(config)
}

/// Load, parse and validate a JSON config file.
pub fn load_config(path: &std::path::Path) -> anyhow::Result<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}
