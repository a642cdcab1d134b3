//! # clipshrink
//!
//! Shrinks video files by a chosen percentage of their pixel area and tells
//! you, before anything is encoded, how large the results will be.
//!
//! # Architecture: Plan, Then Transcode
//!
//! ```text
//! 1. Scan       inputs    →  source list       (files + walked directories)
//! 2. Plan       probe     →  VideoPlan          (pure math, no I/O)
//! 3. Shrink     plans     →  <out>/*.mp4        (ffmpeg, cached, parallel)
//! ```
//!
//! The planner is a set of pure functions: display orientation, scale
//! factor, target size, predicted bytes and the render transform. Everything
//! that touches media sits behind the [`planner::VideoBackend`] trait, so
//! the batch logic is tested against a recording mock while production
//! shells out to `ffprobe`/`ffmpeg`.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`planner`] | Reduction math, transcode parameters, the backend trait and its ffmpeg implementation |
//! | [`scan`] | Expands command-line inputs into an ordered list of source videos |
//! | [`batch`] | Runs probe → plan → transcode for many videos in parallel, isolating failures |
//! | [`cache`] | Content-addressed record of earlier outputs so unchanged clips are not re-encoded |
//! | [`config`] | `clipshrink.toml` loading, validation and merging over stock defaults |
//! | [`output`] | CLI output formatting for every command |
//!
//! # Design Decisions
//!
//! ## Reduction Is Measured in Area
//!
//! "Shrink by 50%" halves the number of pixels, not each side. Both sides are
//! scaled by `sqrt((100 - p) / 100)`, so the aspect ratio is kept and the
//! requested share of the frame area is removed.
//!
//! ## Display Orientation First
//!
//! Phones store portrait clips as landscape frames plus a rotation. Every
//! size the planner reports is in display orientation, after the rotation is
//! applied, because that is what the viewer sees and what the output is
//! encoded as.
//!
//! ## Estimates, Not Promises
//!
//! The predicted size is `original × pixel_ratio × compression_efficiency`.
//! The efficiency (0.8 by default) is a configuration value; the encoder
//! decides the real size, and the shrink summary shows both.

pub mod batch;
pub mod cache;
pub mod config;
pub mod output;
pub mod planner;
pub mod scan;

#[cfg(test)]
pub(crate) mod test_helpers;
