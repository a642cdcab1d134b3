//! Parameter types for transcode operations.
//!
//! These structs describe *what* to do, not *how* to do it. They are the
//! interface between the [`operations`](super::operations) module (which
//! decides what each output should look like) and the
//! [`backend`](super::backend) (which does the actual decoding and encoding).
//! This separation allows swapping backends (e.g. for testing with a mock)
//! without changing planning logic.
//!
//! ## Types
//!
//! - [`ExportPreset`]: Encoder quality tier (low / medium / high, default medium).
//! - [`FrameDuration`]: Duration of one output frame as a rational `value / timescale` seconds.
//! - [`TimeRange`]: Portion of the source to export, in seconds.
//! - [`TranscodeParams`]: Everything the transcoder needs for one output file.

use super::calculations::Placement;
use super::geometry::AffineTransform;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Encoder quality tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportPreset {
    Low,
    #[default]
    Medium,
    High,
}

impl ExportPreset {
    /// x264 speed preset.
    pub fn encoder_preset(self) -> &'static str {
        match self {
            Self::Low => "veryfast",
            Self::Medium => "medium",
            Self::High => "slow",
        }
    }

    /// Constant rate factor (lower is better quality, bigger files).
    pub fn crf(self) -> u32 {
        match self {
            Self::Low => 28,
            Self::Medium => 23,
            Self::High => 18,
        }
    }
}

impl fmt::Display for ExportPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        };
        f.write_str(name)
    }
}

/// Frame rate assumed when the source does not report a usable one.
pub const FALLBACK_FRAME_RATE: u32 = 30;

/// One frame lasts `value / timescale` seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameDuration {
    pub value: u32,
    pub timescale: u32,
}

impl FrameDuration {
    /// Duration of one source frame as a rational.
    ///
    /// Whole rates give `1 / fps`. NTSC rates (29.97, 23.976, 59.94) keep
    /// their exact `1001 / (n * 1000)` form so no frame-rate conversion is
    /// forced. Other fractional rates are kept to millisecond precision.
    /// Rates below one frame per second or non-finite rates fall back to
    /// [`FALLBACK_FRAME_RATE`].
    pub fn from_frame_rate(frame_rate: f64) -> Self {
        if !(frame_rate.is_finite() && frame_rate >= 1.0) {
            return Self {
                value: 1,
                timescale: FALLBACK_FRAME_RATE,
            };
        }

        let whole = frame_rate.round();
        if (frame_rate - whole).abs() < 1e-3 {
            return Self {
                value: 1,
                timescale: whole as u32,
            };
        }

        let ntsc = frame_rate * 1.001;
        if (ntsc - ntsc.round()).abs() < 1e-2 {
            return Self {
                value: 1001,
                timescale: ntsc.round() as u32 * 1000,
            };
        }

        Self {
            value: 1000,
            timescale: (frame_rate * 1000.0).round() as u32,
        }
    }

    /// Frames per second implied by this duration.
    pub fn frames_per_second(self) -> f64 {
        self.timescale as f64 / self.value as f64
    }
}

/// Export window within the source, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: f64,
    pub end: f64,
}

impl TimeRange {
    /// `[0, duration]`.
    pub fn whole(duration_secs: f64) -> Self {
        Self {
            start: 0.0,
            end: duration_secs.max(0.0),
        }
    }

    pub fn duration(self) -> f64 {
        (self.end - self.start).max(0.0)
    }
}

/// Everything the transcoder needs for one output file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranscodeParams {
    pub source: PathBuf,
    pub output: PathBuf,
    /// Target canvas.
    pub width: u32,
    pub height: u32,
    /// Orientation + scale + centering, in source pixel coordinates.
    pub transform: AffineTransform,
    /// Pixel placement of the display-oriented frame on the canvas.
    pub placement: Placement,
    pub frame_duration: FrameDuration,
    pub time_range: TimeRange,
    pub preset: ExportPreset,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_duration_keeps_ntsc_rates_exact() {
        let expected = FrameDuration {
            value: 1001,
            timescale: 30000,
        };
        assert_eq!(FrameDuration::from_frame_rate(30000.0 / 1001.0), expected);
        assert_eq!(FrameDuration::from_frame_rate(29.97), expected);
        assert_eq!(FrameDuration::from_frame_rate(23.976).timescale, 24000);
        assert_eq!(FrameDuration::from_frame_rate(59.94).timescale, 60000);
    }

    #[test]
    fn frame_duration_whole_rates() {
        assert_eq!(
            FrameDuration::from_frame_rate(30.0),
            FrameDuration {
                value: 1,
                timescale: 30
            }
        );
        assert_eq!(FrameDuration::from_frame_rate(24.0).timescale, 24);
    }

    #[test]
    fn frame_duration_other_fractional_rates_use_milliseconds() {
        assert_eq!(
            FrameDuration::from_frame_rate(12.5),
            FrameDuration {
                value: 1000,
                timescale: 12500
            }
        );
    }

    #[test]
    fn frame_duration_falls_back_for_missing_rate() {
        assert_eq!(FrameDuration::from_frame_rate(0.0).timescale, 30);
        assert_eq!(FrameDuration::from_frame_rate(f64::NAN).timescale, 30);
    }

    #[test]
    fn frame_duration_frames_per_second() {
        assert_eq!(FrameDuration::from_frame_rate(25.0).frames_per_second(), 25.0);
        let ntsc = FrameDuration::from_frame_rate(29.97).frames_per_second();
        assert!((ntsc - 30000.0 / 1001.0).abs() < 1e-9);
    }

    #[test]
    fn time_range_whole_starts_at_zero() {
        let range = TimeRange::whole(12.5);
        assert_eq!(range.start, 0.0);
        assert_eq!(range.duration(), 12.5);
        assert_eq!(TimeRange::whole(-1.0).duration(), 0.0);
    }

    #[test]
    fn preset_default_is_medium() {
        assert_eq!(ExportPreset::default(), ExportPreset::Medium);
        assert_eq!(ExportPreset::Medium.encoder_preset(), "medium");
        assert_eq!(ExportPreset::Medium.crf(), 23);
    }

    #[test]
    fn preset_parses_lowercase() {
        let preset: ExportPreset = serde_json::from_str("\"high\"").unwrap();
        assert_eq!(preset, ExportPreset::High);
        assert_eq!(preset.to_string(), "high");
    }
}
