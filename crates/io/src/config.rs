use std::path::Path;

use analysis::{TimingConfig, DEFAULT_GATE_WIDTH_M};
use anyhow::{ensure, Context, Result};
use seek::SeekConfig;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq)]
#[serde(default)]
pub struct TrackConfig {
    /// Width of newly created gates and sectors.
    pub gate_width_m: f64,
}

impl Default for TrackConfig {
    fn default() -> Self {
        Self { gate_width_m: DEFAULT_GATE_WIDTH_M }
    }
}

/// Everything tunable, read from an optional TOML file. Missing sections
/// and keys keep their defaults.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub track: TrackConfig,
    pub timing: TimingConfig,
    pub seek: SeekConfig,
}

impl Config {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let cfg: Config = toml::from_str(s).context("TOML parse error")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_toml_str(&s).with_context(|| format!("loading config {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        let w = self.track.gate_width_m;
        ensure!(w.is_finite() && w > 0.0, "track.gate_width_m must be > 0, got {w}");
        ensure!(self.timing.search_forward > 0, "timing.search_forward must be > 0");
        let q = self.seek.time_quanta_s;
        ensure!(q.is_finite() && q > 0.0, "seek.time_quanta_s must be > 0, got {q}");
        Ok(())
    }
}
