use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use crate::deadline::{DEFAULT_MAX_DEADLINE_SECS, DEFAULT_MIN_DEADLINE_SECS, DeadlineBounds};
use crate::schedule::cadence::{
    CadenceBand, CadenceConfig, CadenceTable, DEFAULT_BANDS, DEFAULT_MIN_SNAP_MS,
    DEFAULT_SNAP_THRESHOLD_SECS,
};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settings {
    pub bounds: DeadlineBounds,
    pub cadence: CadenceConfig,
}

impl Settings {
    pub fn with_overrides(
        mut self,
        min_deadline_secs: Option<i64>,
        max_deadline_secs: Option<i64>,
    ) -> Result<Self> {
        if let Some(min) = min_deadline_secs {
            self.bounds.min_secs = min;
        }
        if let Some(max) = max_deadline_secs {
            self.bounds.max_secs = max;
        }
        validate_bounds(&self.bounds)?;
        Ok(self)
    }
}

pub fn load_settings(path: &Path) -> Result<Settings> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("unable to read settings file {}", path.display()))?;
    parse_settings_text(&content)
}

pub fn parse_settings_text(content: &str) -> Result<Settings> {
    let raw = serde_json::from_str::<SettingsFile>(content).map_err(|err| {
        let line = err.line();
        let column = err.column();
        anyhow::anyhow!("invalid JSON at line {line}, column {column}: {err}")
    })?;

    if raw.version != 1 {
        bail!(
            "unsupported settings version {}; expected version 1",
            raw.version
        );
    }

    let bounds = DeadlineBounds {
        min_secs: raw.bounds.min_deadline_secs,
        max_secs: raw.bounds.max_deadline_secs,
    };
    validate_bounds(&bounds)?;

    if raw.cadence.snap_threshold_secs < 0 {
        bail!(
            "snap_threshold_secs must be >= 0, got {}",
            raw.cadence.snap_threshold_secs
        );
    }
    let bands = raw
        .cadence
        .bands
        .into_iter()
        .map(|band| CadenceBand::new(band.threshold_secs, band.interval_ms))
        .collect();
    let table = CadenceTable::new(bands).context("invalid cadence table")?;

    Ok(Settings {
        bounds,
        cadence: CadenceConfig {
            table,
            snap_threshold_secs: raw.cadence.snap_threshold_secs,
            min_snap_ms: raw.cadence.min_snap_ms,
        },
    })
}

fn validate_bounds(bounds: &DeadlineBounds) -> Result<()> {
    if bounds.min_secs < 0 {
        bail!("min_deadline_secs must be >= 0, got {}", bounds.min_secs);
    }
    if bounds.max_secs < bounds.min_secs {
        bail!(
            "max_deadline_secs ({}) must not be below min_deadline_secs ({})",
            bounds.max_secs,
            bounds.min_secs
        );
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
struct SettingsFile {
    version: u32,
    #[serde(default)]
    bounds: BoundsFile,
    #[serde(default)]
    cadence: CadenceFile,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct BoundsFile {
    #[serde(default = "default_min_deadline_secs")]
    min_deadline_secs: i64,
    #[serde(default = "default_max_deadline_secs")]
    max_deadline_secs: i64,
}

impl Default for BoundsFile {
    fn default() -> Self {
        Self {
            min_deadline_secs: default_min_deadline_secs(),
            max_deadline_secs: default_max_deadline_secs(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CadenceFile {
    #[serde(default = "default_bands")]
    bands: Vec<BandFile>,
    #[serde(default = "default_snap_threshold_secs")]
    snap_threshold_secs: i64,
    #[serde(default = "default_min_snap_ms")]
    min_snap_ms: u64,
}

impl Default for CadenceFile {
    fn default() -> Self {
        Self {
            bands: default_bands(),
            snap_threshold_secs: default_snap_threshold_secs(),
            min_snap_ms: default_min_snap_ms(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct BandFile {
    threshold_secs: i64,
    interval_ms: u64,
}

fn default_min_deadline_secs() -> i64 {
    DEFAULT_MIN_DEADLINE_SECS
}

fn default_max_deadline_secs() -> i64 {
    DEFAULT_MAX_DEADLINE_SECS
}

fn default_bands() -> Vec<BandFile> {
    DEFAULT_BANDS
        .iter()
        .map(|band| BandFile {
            threshold_secs: band.threshold_secs,
            interval_ms: band.interval_ms,
        })
        .collect()
}

fn default_snap_threshold_secs() -> i64 {
    DEFAULT_SNAP_THRESHOLD_SECS
}

fn default_min_snap_ms() -> u64 {
    DEFAULT_MIN_SNAP_MS
}
