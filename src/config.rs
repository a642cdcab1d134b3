//! Configuration module.
//!
//! Handles loading, validating, and merging `clipshrink.toml`. Stock defaults
//! are overridden by whatever keys the user file sets; everything else keeps
//! its default.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [reduction]
//! default = 50              # Percent used when --reduce is not given
//! min = 10                  # Requests are clamped into [min, max]
//! max = 90
//! step = 5                  # Tick size of the estimate table
//!
//! [estimate]
//! compression_efficiency = 0.8
//!
//! [export]
//! preset = "medium"         # low | medium | high
//! alignment = 2             # Encoder pixel grid (2 = even dimensions)
//! suffix = "pct"            # clip.mov at 50% → clip-50pct.mp4
//!
//! [processing]
//! max_processes = 4         # Max parallel transcodes (omit for auto = CPU cores)
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::planner::{DEFAULT_COMPRESSION_EFFICIENCY, ExportPreset, PlanSettings};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Tool configuration loaded from `clipshrink.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ShrinkConfig {
    /// Accepted reduction range and default.
    pub reduction: ReductionConfig,
    /// Size estimation constants.
    pub estimate: EstimateConfig,
    /// Encoder settings.
    pub export: ExportConfig,
    /// Parallel processing settings.
    pub processing: ProcessingConfig,
}

impl ShrinkConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let r = &self.reduction;
        if !(0.0..100.0).contains(&r.min) || !(0.0..100.0).contains(&r.max) {
            return Err(ConfigError::Validation(
                "reduction.min and reduction.max must be within [0, 100)".into(),
            ));
        }
        if r.min >= r.max {
            return Err(ConfigError::Validation(
                "reduction.min must be smaller than reduction.max".into(),
            ));
        }
        if !(r.step > 0.0) {
            return Err(ConfigError::Validation(
                "reduction.step must be positive".into(),
            ));
        }
        if !(r.min..=r.max).contains(&r.default) {
            return Err(ConfigError::Validation(
                "reduction.default must lie between reduction.min and reduction.max".into(),
            ));
        }
        let e = self.estimate.compression_efficiency;
        if !(e > 0.0 && e <= 1.0) {
            return Err(ConfigError::Validation(
                "estimate.compression_efficiency must be in (0, 1]".into(),
            ));
        }
        if self.export.alignment == 0 {
            return Err(ConfigError::Validation(
                "export.alignment must be at least 1".into(),
            ));
        }
        if self.export.suffix.contains(['/', '\\']) {
            return Err(ConfigError::Validation(
                "export.suffix must not contain path separators".into(),
            ));
        }
        Ok(())
    }

    /// Planner settings derived from this config.
    pub fn plan_settings(&self) -> PlanSettings {
        PlanSettings {
            compression_efficiency: self.estimate.compression_efficiency,
            alignment: self.export.alignment,
        }
    }
}

/// Reduction slider bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReductionConfig {
    /// Percent used when no reduction is requested explicitly.
    pub default: f64,
    /// Smallest accepted reduction.
    pub min: f64,
    /// Largest accepted reduction.
    pub max: f64,
    /// Tick size of the estimate table.
    pub step: f64,
}

impl Default for ReductionConfig {
    fn default() -> Self {
        Self {
            default: 50.0,
            min: 10.0,
            max: 90.0,
            step: 5.0,
        }
    }
}

impl ReductionConfig {
    /// Resolve a requested reduction: `None` → default, otherwise clamped
    /// into `[min, max]`.
    pub fn resolve(&self, requested: Option<f64>) -> f64 {
        let Some(p) = requested else {
            return self.default;
        };
        if p.is_nan() {
            warn!(requested = p, fallback = self.default, "reduction is not a number");
            return self.default;
        }
        let clamped = p.clamp(self.min, self.max);
        if clamped != p {
            warn!(
                requested = p,
                clamped,
                min = self.min,
                max = self.max,
                "reduction outside configured range"
            );
        }
        clamped
    }

    /// Every tick from `min` to `max`.
    pub fn steps(&self) -> Vec<f64> {
        crate::planner::reduction_steps(self.min, self.max, self.step)
    }
}

/// Size estimation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EstimateConfig {
    /// Share of the pixel-count savings a re-encode is expected to keep.
    pub compression_efficiency: f64,
}

impl Default for EstimateConfig {
    fn default() -> Self {
        Self {
            compression_efficiency: DEFAULT_COMPRESSION_EFFICIENCY,
        }
    }
}

/// Encoder settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExportConfig {
    /// Quality tier.
    pub preset: ExportPreset,
    /// Pixel grid for the output canvas.
    pub alignment: u32,
    /// Appended to output names after the percentage.
    pub suffix: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            preset: ExportPreset::Medium,
            alignment: 2,
            suffix: "pct".to_string(),
        }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel transcodes.
    /// When absent or null, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config
        .max_processes
        .map(|n| n.clamp(1, cores))
        .unwrap_or(cores)
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the base layer user overrides are merged onto.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    toml::Value::try_from(ShrinkConfig::default())
        .map_err(|e| ConfigError::Validation(format!("cannot serialize defaults: {e}")))
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load a config file as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<ShrinkConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: ShrinkConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from the given file, falling back to stock defaults when it
/// does not exist.
pub fn load_config(path: &Path) -> Result<ShrinkConfig, ConfigError> {
    let base = stock_defaults_value()?;
    let overlay = load_raw_config(path)?;
    resolve_config(base, overlay)
}

/// Returns a fully-commented stock `clipshrink.toml`.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# clipshrink configuration
# ========================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults. Unknown keys cause an error.

# ---------------------------------------------------------------------------
# Reduction range
# ---------------------------------------------------------------------------
[reduction]
# Percent of pixel area to remove when --reduce is not given.
default = 50.0

# Requested reductions are clamped into [min, max].
min = 10.0
max = 90.0

# Tick size of the `estimate` table.
step = 5.0

# ---------------------------------------------------------------------------
# Size estimation
# ---------------------------------------------------------------------------
[estimate]
# Share of the pixel-count savings a re-encode is assumed to keep.
# predicted = original_bytes * pixel_ratio * compression_efficiency
compression_efficiency = 0.8

# ---------------------------------------------------------------------------
# Export
# ---------------------------------------------------------------------------
[export]
# Encoder quality tier: "low", "medium" or "high".
preset = "medium"

# Output width and height are snapped to multiples of this value.
# 2 keeps dimensions even, which H.264 with 4:2:0 chroma requires.
alignment = 2

# Output names look like <stem>-<percent><suffix>.mp4
suffix = "pct"

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel transcodes.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4
"##
}
