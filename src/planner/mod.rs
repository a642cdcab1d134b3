//! Size-reduction planning.
//!
//! | Step | Function |
//! |---|---|
//! | **Orientation** | [`display_size`]: `abs(transform · natural size)` |
//! | **Scale** | [`scale_factor`]: `sqrt((100 - p) / 100)` so area shrinks by `p` |
//! | **Target** | [`target_size`] + [`align_to_grid`] for the encoder canvas |
//! | **Estimate** | [`predicted_bytes`] / [`batch_total`] |
//! | **Render transform** | [`render_plan`]: orientation, uniform scale, centering |
//!
//! The module is split into:
//! - **Geometry**: sizes and affine transforms
//! - **Calculations**: Pure functions for the reduction math (unit testable)
//! - **Parameters**: Data structures describing a transcode
//! - **Backend**: [`VideoBackend`] trait + [`FfmpegBackend`]
//! - **Operations**: High-level functions combining calculations + backend

pub mod backend;
mod calculations;
pub mod ffmpeg_backend;
mod geometry;
pub mod operations;
mod params;

pub use backend::{BackendError, CancelFlag, VideoBackend, VideoInfo};
pub use calculations::{
    DEFAULT_COMPRESSION_EFFICIENCY, PlanError, Placement, RenderPlan, align_to_grid, batch_total,
    estimate_bytes, pixel_placement, pixel_ratio, predicted_bytes, reduction_steps, render_plan,
    scale_factor, target_size,
};
pub use ffmpeg_backend::FfmpegBackend;
pub use geometry::{AffineTransform, Dimensions, GeometryError, Size, VideoGeometry, display_size};
pub use operations::{
    PlanSettings, VideoPlan, plan_transcode, plan_video, probe_video, transcode_video,
};
pub use params::{ExportPreset, FrameDuration, TimeRange, TranscodeParams};
