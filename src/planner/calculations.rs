//! Pure calculation functions for size reduction.
//!
//! All functions here are pure and testable without any I/O or video files.
//! Identical inputs always give identical outputs, so callers are free to
//! recompute on every slider tick or memoize.

use super::geometry::{AffineTransform, Dimensions, GeometryError, Size};
use serde::Serialize;
use thiserror::Error;

/// Share of the theoretical pixel-count savings a re-encode is assumed to keep.
pub const DEFAULT_COMPRESSION_EFFICIENCY: f64 = 0.8;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlanError {
    #[error("Geometry error: {0}")]
    Geometry(#[from] GeometryError),
    #[error("Reduction must be within [0, 100) percent, got {0}")]
    InvalidReduction(f64),
    #[error("Target size {width:.1}x{height:.1} rounds to zero pixels")]
    DegenerateTargetSize { width: f64, height: f64 },
}

/// Linear scale that reduces pixel *area* by `reduction_percent`.
///
/// Scaling both axes by `sqrt(1 - p)` keeps the aspect ratio and removes
/// exactly `p` of the area.
///
/// # Examples
/// ```
/// # use clipshrink::planner::scale_factor;
/// assert_eq!(scale_factor(0.0).unwrap(), 1.0);
/// assert_eq!(scale_factor(75.0).unwrap(), 0.5);
/// assert!(scale_factor(100.0).is_err());
/// ```
pub fn scale_factor(reduction_percent: f64) -> Result<f64, PlanError> {
    // NaN fails `contains` as well
    if !(0.0..100.0).contains(&reduction_percent) {
        return Err(PlanError::InvalidReduction(reduction_percent));
    }
    Ok(((100.0 - reduction_percent) / 100.0).sqrt())
}

/// Scale a display size by a single factor. Not snapped to any pixel grid.
pub fn target_size(display: Size, scale: f64) -> Size {
    display.scaled(scale)
}

/// Snap a real-valued size to the nearest multiple of `alignment` per axis.
///
/// `alignment = 2` gives the "nearest even" grid most H.264 encoders need;
/// codecs with macroblock constraints pass 8 or 16. An alignment of 0 is
/// treated as 1.
pub fn align_to_grid(size: Size, alignment: u32) -> Result<Dimensions, PlanError> {
    let step = alignment.max(1) as f64;
    let snap = |v: f64| (v / step).round() * step;
    let (width, height) = (snap(size.width), snap(size.height));

    // Negated comparison so NaN lands here too
    if !(width >= step && height >= step) || !width.is_finite() || !height.is_finite() {
        return Err(PlanError::DegenerateTargetSize {
            width: size.width,
            height: size.height,
        });
    }

    Ok(Dimensions {
        width: width as u32,
        height: height as u32,
    })
}

/// Ratio of target pixel count to original pixel count.
pub fn pixel_ratio(original: Size, target: Size) -> f64 {
    target.area() / original.area()
}

/// Estimated output size for a given pixel ratio.
///
/// Monotonic non-decreasing in `pixel_ratio` for fixed `original_bytes` and a
/// non-negative `efficiency`. This is an estimate only: real encoders do not
/// scale linearly with pixel count.
pub fn estimate_bytes(original_bytes: u64, pixel_ratio: f64, efficiency: f64) -> u64 {
    let ratio = if pixel_ratio.is_nan() {
        0.0
    } else {
        pixel_ratio.max(0.0)
    };
    // `as` saturates, which keeps the mapping monotonic at the top end
    (original_bytes as f64 * ratio * efficiency.max(0.0)).round() as u64
}

/// Predicted output byte count for a video re-rendered at `target`.
pub fn predicted_bytes(original_bytes: u64, original: Size, target: Size, efficiency: f64) -> u64 {
    estimate_bytes(original_bytes, pixel_ratio(original, target), efficiency)
}

/// Aggregate prediction for a batch: the plain sum of the per-item values.
pub fn batch_total(predictions: impl IntoIterator<Item = u64>) -> u64 {
    predictions
        .into_iter()
        .fold(0u64, |total, bytes| total.saturating_add(bytes))
}

/// Placement of a display-oriented frame on the target canvas.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RenderPlan {
    /// Target canvas handed to the encoder.
    pub canvas: Size,
    /// Uniform scale applied after orientation correction.
    pub scale: f64,
    /// Display size after scaling.
    pub scaled: Size,
    /// Top-left corner of the scaled frame on the canvas.
    pub offset_x: f64,
    pub offset_y: f64,
    /// Orientation, then scale, then centering translation.
    pub transform: AffineTransform,
}

/// Compose the render transform for the transcoder.
///
/// The scale is uniform (`min` of both axis ratios) so the aspect ratio
/// survives even when `target` was rounded independently per axis; any
/// leftover space is split evenly on both sides.
pub fn render_plan(
    orientation: &AffineTransform,
    display: Size,
    target: Size,
) -> Result<RenderPlan, PlanError> {
    if !display.is_positive() {
        return Err(GeometryError::CollapsedDisplay {
            width: display.width,
            height: display.height,
        }
        .into());
    }
    if !target.is_positive() {
        return Err(PlanError::DegenerateTargetSize {
            width: target.width,
            height: target.height,
        });
    }

    let scale = (target.width / display.width).min(target.height / display.height);
    let scaled = display.scaled(scale);
    let offset_x = (target.width - scaled.width) / 2.0;
    let offset_y = (target.height - scaled.height) / 2.0;

    let transform = orientation
        .then(&AffineTransform::scale(scale, scale))
        .then(&AffineTransform::translation(offset_x, offset_y));

    Ok(RenderPlan {
        canvas: target,
        scale,
        scaled,
        offset_x,
        offset_y,
        transform,
    })
}

/// Integral placement of the scaled frame inside the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Placement {
    pub width: u32,
    pub height: u32,
    pub x: u32,
    pub y: u32,
}

/// Snap a [`RenderPlan`] to whole pixels on the given canvas.
///
/// The scaled frame is snapped to `alignment` (never larger than the canvas),
/// and the remaining margin is split with the extra pixel going right/bottom.
pub fn pixel_placement(plan: &RenderPlan, canvas: Dimensions, alignment: u32) -> Placement {
    let step = alignment.max(1);
    let snap = |v: f64, limit: u32| {
        let snapped = ((v / step as f64).round() as u32).saturating_mul(step);
        snapped.clamp(step.min(limit), limit)
    };
    let width = snap(plan.scaled.width, canvas.width);
    let height = snap(plan.scaled.height, canvas.height);

    Placement {
        width,
        height,
        x: (canvas.width - width) / 2,
        y: (canvas.height - height) / 2,
    }
}

/// Reduction percentages offered between `min` and `max` (inclusive) every `step`.
pub fn reduction_steps(min: f64, max: f64, step: f64) -> Vec<f64> {
    if !(step > 0.0) || min > max {
        return Vec::new();
    }
    let count = ((max - min) / step + 1e-9).floor() as usize;
    (0..=count).map(|i| min + step * i as f64).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    // =========================================================================
    // scale_factor tests
    // =========================================================================

    #[test]
    fn scale_zero_reduction_is_one() {
        assert_eq!(scale_factor(0.0).unwrap(), 1.0);
    }

    #[test]
    fn scale_half_reduction_is_sqrt_half() {
        assert!(approx(scale_factor(50.0).unwrap(), 0.5f64.sqrt()));
    }

    #[test]
    fn scale_squared_matches_area_reduction() {
        let area = 1920.0 * 1080.0;
        let mut p = 0.0;
        while p < 100.0 {
            let s = scale_factor(p).unwrap();
            assert!(
                ((s * s * area) - area * (100.0 - p) / 100.0).abs() < 1e-6,
                "p = {p}"
            );
            p += 2.5;
        }
    }

    #[test]
    fn scale_accepts_non_step_values() {
        assert!(scale_factor(12.34).is_ok());
        assert!(scale_factor(99.999).unwrap() > 0.0);
    }

    #[test]
    fn scale_rejects_out_of_range() {
        assert_eq!(scale_factor(100.0), Err(PlanError::InvalidReduction(100.0)));
        assert_eq!(scale_factor(-1.0), Err(PlanError::InvalidReduction(-1.0)));
        assert!(scale_factor(150.0).is_err());
        assert!(scale_factor(f64::NAN).is_err());
    }

    // =========================================================================
    // align_to_grid tests
    // =========================================================================

    #[test]
    fn align_rounds_to_nearest_even() {
        let dims = align_to_grid(Size::new(1357.6, 763.7), 2).unwrap();
        assert_eq!(
            dims,
            Dimensions {
                width: 1358,
                height: 764
            }
        );
    }

    #[test]
    fn align_to_macroblock() {
        let dims = align_to_grid(Size::new(1000.0, 530.0), 16).unwrap();
        assert_eq!(
            dims,
            Dimensions {
                width: 1008,
                height: 528
            }
        );
    }

    #[test]
    fn align_zero_alignment_rounds_to_integer() {
        let dims = align_to_grid(Size::new(10.4, 10.6), 0).unwrap();
        assert_eq!(
            dims,
            Dimensions {
                width: 10,
                height: 11
            }
        );
    }

    #[test]
    fn align_collapsing_dimension_is_degenerate() {
        let result = align_to_grid(Size::new(400.0, 0.9), 2);
        assert!(matches!(
            result,
            Err(PlanError::DegenerateTargetSize { .. })
        ));
    }

    // =========================================================================
    // Estimation tests
    // =========================================================================

    #[test]
    fn predicted_bytes_for_half_area() {
        let original = Size::new(1920.0, 1080.0);
        let target = target_size(original, scale_factor(50.0).unwrap());
        assert_eq!(
            predicted_bytes(100_000_000, original, target, DEFAULT_COMPRESSION_EFFICIENCY),
            40_000_000
        );
    }

    #[test]
    fn estimate_is_monotonic_in_pixel_ratio() {
        let mut previous = 0;
        for i in 0..=1000 {
            let ratio = i as f64 / 1000.0;
            let bytes = estimate_bytes(123_456_789, ratio, DEFAULT_COMPRESSION_EFFICIENCY);
            assert!(bytes >= previous, "ratio {ratio}");
            previous = bytes;
        }
    }

    #[test]
    fn estimate_clamps_negative_and_nan_ratio() {
        assert_eq!(estimate_bytes(1000, -0.5, 0.8), 0);
        assert_eq!(estimate_bytes(1000, f64::NAN, 0.8), 0);
    }

    #[test]
    fn batch_total_is_plain_sum() {
        assert_eq!(batch_total([40_000_000, 1_234_567]), 41_234_567);
        assert_eq!(batch_total(Vec::<u64>::new()), 0);
    }

    // =========================================================================
    // render_plan tests
    // =========================================================================

    #[test]
    fn render_plan_letterboxes_vertically() {
        let plan = render_plan(
            &AffineTransform::IDENTITY,
            Size::new(1000.0, 500.0),
            Size::new(400.0, 400.0),
        )
        .unwrap();

        assert!(approx(plan.scale, 0.4));
        assert!(approx(plan.scaled.width, 400.0));
        assert!(approx(plan.scaled.height, 200.0));
        assert!(approx(plan.offset_x, 0.0));
        assert!(approx(plan.offset_y, 100.0));
    }

    #[test]
    fn render_plan_transform_maps_frame_into_canvas() {
        let plan = render_plan(
            &AffineTransform::IDENTITY,
            Size::new(1000.0, 500.0),
            Size::new(400.0, 400.0),
        )
        .unwrap();

        let (x0, y0) = plan.transform.apply_to_point(0.0, 0.0);
        let (x1, y1) = plan.transform.apply_to_point(1000.0, 500.0);
        assert!(approx(x0, 0.0) && approx(y0, 100.0));
        assert!(approx(x1, 400.0) && approx(y1, 300.0));
    }

    #[test]
    fn render_plan_starts_from_orientation() {
        // Portrait capture stored as 1920x1080 + anchored 90° rotation
        let natural = Size::new(1920.0, 1080.0);
        let orientation = AffineTransform::rotation_degrees(90.0).anchored(natural);
        let display = Size::new(1080.0, 1920.0);
        let plan = render_plan(&orientation, display, Size::new(540.0, 960.0)).unwrap();

        assert!(approx(plan.scale, 0.5));
        // Natural top-left corner ends up at the canvas top-right
        let (x, y) = plan.transform.apply_to_point(0.0, 0.0);
        assert!(approx(x, 540.0) && approx(y, 0.0));
        let (x, y) = plan.transform.apply_to_point(1920.0, 1080.0);
        assert!(approx(x, 0.0) && approx(y, 960.0));
    }

    #[test]
    fn render_plan_rejects_empty_target() {
        let result = render_plan(
            &AffineTransform::IDENTITY,
            Size::new(100.0, 100.0),
            Size::new(0.0, 50.0),
        );
        assert!(matches!(
            result,
            Err(PlanError::DegenerateTargetSize { .. })
        ));
    }

    // =========================================================================
    // pixel_placement tests
    // =========================================================================

    #[test]
    fn placement_fills_matching_canvas() {
        let canvas = Dimensions {
            width: 1358,
            height: 764,
        };
        let plan = render_plan(
            &AffineTransform::IDENTITY,
            Size::new(1920.0, 1080.0),
            canvas.into(),
        )
        .unwrap();
        let placement = pixel_placement(&plan, canvas, 2);
        // Uniform scale is bound by width; height ends up one grid step short at most
        assert_eq!(placement.width, 1358);
        assert!(placement.height == 764 || placement.height == 762);
        assert_eq!(placement.x, 0);
    }

    #[test]
    fn placement_centers_letterbox() {
        let canvas = Dimensions {
            width: 400,
            height: 400,
        };
        let plan = render_plan(
            &AffineTransform::IDENTITY,
            Size::new(1000.0, 500.0),
            canvas.into(),
        )
        .unwrap();
        assert_eq!(
            pixel_placement(&plan, canvas, 2),
            Placement {
                width: 400,
                height: 200,
                x: 0,
                y: 100
            }
        );
    }

    // =========================================================================
    // reduction_steps tests
    // =========================================================================

    #[test]
    fn reduction_steps_cover_slider_range() {
        let steps = reduction_steps(10.0, 90.0, 5.0);
        assert_eq!(steps.len(), 17);
        assert_eq!(steps[0], 10.0);
        assert_eq!(steps[16], 90.0);
    }

    #[test]
    fn reduction_steps_invalid_step_is_empty() {
        assert!(reduction_steps(10.0, 90.0, 0.0).is_empty());
        assert!(reduction_steps(90.0, 10.0, 5.0).is_empty());
    }
}
