//! # Run-time configuration
//!
//! Every field has a default so an empty JSON object (or no file at all) is a
//! valid configuration. The command line overrides individual fields after
//! loading.
//!
//! ```json
//! {
//!     "copro": 0,
//!     "pdp11": { "slot": 0, "allow_unaligned": false, "rom": "client.rom" },
//!     "probe": { "enabled": true, "breakpoints": [63488], "history": 64 },
//!     "max_instructions": 1000000,
//!     "log_filter": "emu=debug"
//! }
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Co-processor slot selected at boot.
    pub copro: usize,
    pub pdp11: Pdp11Config,
    pub probe: ProbeConfig,
    /// Stop after this many polls of the Tube run predicate.
    pub max_instructions: Option<u64>,
    /// `tracing` filter directive used when `RUST_LOG` is unset.
    pub log_filter: String,
    /// Write logs to this file instead of stderr.
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            copro: 0,
            pdp11: Pdp11Config::default(),
            probe: ProbeConfig::default(),
            max_instructions: None,
            log_filter: String::from("info"),
            log_file: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Pdp11Config {
    pub slot: usize,
    /// Mask the low address bit of odd word accesses instead of raising a
    /// bus error trap.
    pub allow_unaligned: bool,
    /// Client ROM image copied to 0xF800 on every soft reset. The built-in
    /// boot stub is used when unset.
    pub rom: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProbeConfig {
    pub enabled: bool,
    pub breakpoints: Vec<u32>,
    /// Number of executed addresses remembered by the probe.
    pub history: usize,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            breakpoints: Vec::new(),
            history: 32,
        }
    }
}

impl Config {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        Self::from_json(&text)
    }
}

impl Pdp11Config {
    /// Reads the configured ROM image, if any.
    pub fn load_rom(&self) -> Result<Option<Vec<u8>>> {
        self.rom
            .as_deref()
            .map(|path| fs::read(path).map_err(|e| Error::io(path, e)))
            .transpose()
    }
}
