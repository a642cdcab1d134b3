//! Shared test utilities for the clipshrink test suite.
//!
//! Builders for the records the backend produces (`VideoInfo`,
//! `TranscodeParams`) and small filesystem fixtures for the scan, cache and
//! batch tests.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let info = rotated_video_info(1920.0, 1080.0, 90.0, 10_000_000);
//! let plan = plan_video(&info, 50.0, &PlanSettings::default()).unwrap();
//! assert_eq!(plan.display, Size::new(1080.0, 1920.0));
//! ```

use std::path::{Path, PathBuf};

use crate::planner::{
    AffineTransform, ExportPreset, FrameDuration, Placement, Size, TimeRange, TranscodeParams,
    VideoGeometry, VideoInfo,
};

// =========================================================================
// Probe records
// =========================================================================

/// Upright 10 second, 30 fps video.
pub fn video_info(width: f64, height: f64, bytes: u64) -> VideoInfo {
    VideoInfo {
        geometry: VideoGeometry::upright(width, height),
        duration_secs: 10.0,
        file_size: bytes,
        frame_rate: 30.0,
    }
}

/// Like [`video_info`] but carrying a clockwise rotation, the way a phone
/// records portrait clips.
pub fn rotated_video_info(width: f64, height: f64, degrees: f64, bytes: u64) -> VideoInfo {
    let natural = Size::new(width, height);
    VideoInfo {
        geometry: VideoGeometry::new(
            natural,
            AffineTransform::rotation_degrees(degrees).anchored(natural),
        ),
        ..video_info(width, height, bytes)
    }
}

// =========================================================================
// Transcode parameters
// =========================================================================

/// Minimal 640x360 transcode of `/in/source.mov` into `output`.
pub fn transcode_params(output: PathBuf) -> TranscodeParams {
    TranscodeParams {
        source: PathBuf::from("/in/source.mov"),
        output,
        width: 640,
        height: 360,
        transform: AffineTransform::scale(0.5, 0.5),
        placement: Placement {
            width: 640,
            height: 360,
            x: 0,
            y: 0,
        },
        frame_duration: FrameDuration::from_frame_rate(30.0),
        time_range: TimeRange::whole(10.0),
        preset: ExportPreset::Medium,
    }
}

// =========================================================================
// Filesystem fixtures
// =========================================================================

/// Write a small placeholder source file. Content includes the name so each
/// file hashes differently.
pub fn write_dummy_source(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, format!("fake video data for {name}")).unwrap();
    path
}
