//! High-level planning operations.
//!
//! These functions combine calculations with backend execution. They take
//! settings, compute parameters, and call the backend.

use super::backend::{BackendError, CancelFlag, VideoBackend, VideoInfo};
use super::calculations::{
    DEFAULT_COMPRESSION_EFFICIENCY, PlanError, RenderPlan, align_to_grid, pixel_placement,
    predicted_bytes, render_plan, scale_factor, target_size,
};
use super::geometry::{Dimensions, Size};
use super::params::{ExportPreset, FrameDuration, TimeRange, TranscodeParams};
use serde::Serialize;
use std::path::Path;
use tracing::debug;

/// Numeric knobs of the planner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlanSettings {
    pub compression_efficiency: f64,
    /// Pixel grid the encoder canvas is snapped to.
    pub alignment: u32,
}

impl Default for PlanSettings {
    fn default() -> Self {
        Self {
            compression_efficiency: DEFAULT_COMPRESSION_EFFICIENCY,
            alignment: 2,
        }
    }
}

/// Complete plan for shrinking one video.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoPlan {
    pub reduction_percent: f64,
    pub natural: Size,
    pub display: Size,
    pub scale: f64,
    /// Real-valued target before grid snapping.
    pub target: Size,
    /// Target snapped to the encoder grid.
    pub canvas: Dimensions,
    pub render: RenderPlan,
    pub frame_duration: FrameDuration,
    pub duration_secs: f64,
    pub original_bytes: u64,
    /// Estimate only; the encoder decides the real size.
    pub predicted_bytes: u64,
}

/// Plan a size reduction without touching any file.
///
/// The reduction is validated before anything else is computed. The
/// prediction uses the snapped canvas, since that is what gets encoded.
pub fn plan_video(
    info: &VideoInfo,
    reduction_percent: f64,
    settings: &PlanSettings,
) -> Result<VideoPlan, PlanError> {
    let scale = scale_factor(reduction_percent)?;
    let display_size = info.geometry.display_size()?;
    let target = target_size(display_size, scale);
    let canvas = align_to_grid(target, settings.alignment)?;
    let render = render_plan(&info.geometry.transform, display_size, canvas.into())?;
    let predicted = predicted_bytes(
        info.file_size,
        display_size,
        canvas.into(),
        settings.compression_efficiency,
    );

    debug!(
        reduction = reduction_percent,
        scale,
        display_width = display_size.width,
        display_height = display_size.height,
        canvas_width = canvas.width,
        canvas_height = canvas.height,
        predicted,
        "planned reduction"
    );

    Ok(VideoPlan {
        reduction_percent,
        natural: info.geometry.natural,
        display: display_size,
        scale,
        target,
        canvas,
        render,
        frame_duration: FrameDuration::from_frame_rate(info.frame_rate),
        duration_secs: info.duration_secs,
        original_bytes: info.file_size,
        predicted_bytes: predicted,
    })
}

/// Build the transcoder input for a plan without executing it.
pub fn plan_transcode(
    plan: &VideoPlan,
    source: &Path,
    output: &Path,
    preset: ExportPreset,
    alignment: u32,
) -> TranscodeParams {
    TranscodeParams {
        source: source.to_path_buf(),
        output: output.to_path_buf(),
        width: plan.canvas.width,
        height: plan.canvas.height,
        transform: plan.render.transform,
        placement: pixel_placement(&plan.render, plan.canvas, alignment),
        frame_duration: plan.frame_duration,
        time_range: TimeRange::whole(plan.duration_secs),
        preset,
    }
}

/// Read video metadata using the backend.
pub fn probe_video(backend: &impl VideoBackend, path: &Path) -> Result<VideoInfo, BackendError> {
    backend.probe(path)
}

/// Run one transcode through the backend.
pub fn transcode_video(
    backend: &impl VideoBackend,
    params: &TranscodeParams,
    progress: &dyn Fn(f32),
    cancel: &CancelFlag,
) -> Result<(), BackendError> {
    backend.transcode(params, progress, cancel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::backend::tests::{MockBackend, RecordedOp};
    use crate::planner::geometry::GeometryError;
    use crate::test_helpers::{rotated_video_info, video_info};

    #[test]
    fn plan_full_hd_half_reduction() {
        let info = video_info(1920.0, 1080.0, 100_000_000);
        let plan = plan_video(&info, 50.0, &PlanSettings::default()).unwrap();

        assert!((plan.scale - 0.7071).abs() < 1e-4);
        assert!((plan.target.width - 1357.6).abs() < 0.1);
        assert!((plan.target.height - 763.7).abs() < 0.1);
        assert_eq!(
            plan.canvas,
            Dimensions {
                width: 1358,
                height: 764
            }
        );
        // ≈ 40 MB; snapping adds a fraction of a percent
        let drift = (plan.predicted_bytes as f64 - 40_000_000.0).abs() / 40_000_000.0;
        assert!(drift < 0.001, "predicted {}", plan.predicted_bytes);
    }

    #[test]
    fn plan_uses_display_orientation() {
        let info = rotated_video_info(1920.0, 1080.0, 90.0, 10_000_000);
        let plan = plan_video(&info, 75.0, &PlanSettings::default()).unwrap();

        assert_eq!(plan.display, Size::new(1080.0, 1920.0));
        assert_eq!(
            plan.canvas,
            Dimensions {
                width: 540,
                height: 960
            }
        );
    }

    #[test]
    fn plan_rejects_invalid_reduction_first() {
        // Degenerate geometry is not even looked at
        let mut info = video_info(1920.0, 1080.0, 1);
        info.geometry.transform.a = 0.0;
        info.geometry.transform.d = 0.0;

        let result = plan_video(&info, 100.0, &PlanSettings::default());
        assert_eq!(result, Err(PlanError::InvalidReduction(100.0)));
    }

    #[test]
    fn plan_surfaces_geometry_errors() {
        let mut info = video_info(1920.0, 1080.0, 1);
        info.geometry.transform.a = 0.0;

        let result = plan_video(&info, 50.0, &PlanSettings::default());
        assert!(matches!(
            result,
            Err(PlanError::Geometry(GeometryError::Degenerate(_)))
        ));
    }

    #[test]
    fn plan_tiny_source_is_degenerate() {
        let info = video_info(2.0, 2.0, 100);
        let result = plan_video(&info, 90.0, &PlanSettings::default());
        assert!(matches!(
            result,
            Err(PlanError::DegenerateTargetSize { .. })
        ));
    }

    #[test]
    fn plan_honours_efficiency_setting() {
        let info = video_info(1000.0, 1000.0, 1_000_000);
        let settings = PlanSettings {
            compression_efficiency: 1.0,
            alignment: 2,
        };
        let plan = plan_video(&info, 75.0, &settings).unwrap();
        assert_eq!(plan.predicted_bytes, 250_000);
    }

    #[test]
    fn plan_transcode_letterboxes_when_canvas_differs() {
        let info = video_info(1000.0, 500.0, 1_000);
        let mut plan = plan_video(&info, 0.0, &PlanSettings::default()).unwrap();
        // Force a square canvas to exercise centering
        plan.canvas = Dimensions {
            width: 400,
            height: 400,
        };
        plan.render = render_plan(&info.geometry.transform, plan.display, plan.canvas.into()).unwrap();

        let params = plan_transcode(
            &plan,
            Path::new("/in.mov"),
            Path::new("/out.mp4"),
            ExportPreset::Medium,
            2,
        );
        assert_eq!(params.placement.y, 100);
        assert_eq!(params.placement.height, 200);
        assert_eq!(params.time_range.end, info.duration_secs);
    }

    #[test]
    fn probe_video_calls_backend() {
        let backend =
            MockBackend::with_videos(vec![("a.mp4", video_info(1280.0, 720.0, 5_000))]);
        let info = probe_video(&backend, Path::new("/v/a.mp4")).unwrap();
        assert_eq!(info.file_size, 5_000);
        assert!(matches!(&backend.get_operations()[0], RecordedOp::Probe(_)));
    }

    #[test]
    fn transcode_video_passes_canvas_to_backend() {
        let tmp = tempfile::TempDir::new().unwrap();
        let backend = MockBackend::new();
        let info = video_info(1920.0, 1080.0, 100_000_000);
        let plan = plan_video(&info, 50.0, &PlanSettings::default()).unwrap();
        let params = plan_transcode(
            &plan,
            Path::new("/in/clip.mov"),
            &tmp.path().join("clip-50pct.mp4"),
            ExportPreset::High,
            2,
        );

        transcode_video(&backend, &params, &|_| {}, &CancelFlag::new()).unwrap();

        let ops = backend.get_operations();
        assert!(matches!(
            &ops[0],
            RecordedOp::Transcode {
                width: 1358,
                height: 764,
                preset: ExportPreset::High,
                ..
            }
        ));
    }
}
