//! Frame geometry: sizes, pixel dimensions and 2-D affine transforms.
//!
//! Video containers store frames in their capture orientation and carry a
//! display matrix next to them (a phone held upright records landscape
//! buffers plus a 90° rotation). Everything downstream of the probe works in
//! *display* orientation, so the first step of every plan is
//! [`display_size`].
//!
//! Transforms follow the row-vector convention used by video display
//! matrices:
//!
//! ```text
//! x' = a·x + c·y + tx
//! y' = b·x + d·y + ty
//! ```
//!
//! Applying a transform to a [`Size`] ignores the translation part, exactly
//! like applying it to a vector.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Determinants smaller than this are treated as a collapsed (non-invertible) map.
const DEGENERATE_EPSILON: f64 = 1e-9;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    #[error("natural frame size must be positive, got {width}x{height}")]
    EmptyFrame { width: f64, height: f64 },
    #[error("orientation transform is not invertible (determinant {0})")]
    Degenerate(f64),
    #[error("orientation transform collapses the frame to {width}x{height}")]
    CollapsedDisplay { width: f64, height: f64 },
}

/// Real-valued width and height.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    pub fn area(self) -> f64 {
        self.width * self.height
    }

    /// Multiply both axes by the same factor.
    pub fn scaled(self, factor: f64) -> Self {
        Self::new(self.width * factor, self.height * factor)
    }

    /// Both dimensions finite and strictly positive.
    pub fn is_positive(self) -> bool {
        self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0
    }
}

/// Integral pixel dimensions, as handed to an encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl From<Dimensions> for Size {
    fn from(dims: Dimensions) -> Self {
        Size::new(dims.width as f64, dims.height as f64)
    }
}

/// A 2-D affine transform `[a b c d tx ty]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AffineTransform {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub tx: f64,
    pub ty: f64,
}

impl Default for AffineTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl AffineTransform {
    pub const IDENTITY: Self = Self::new(1.0, 0.0, 0.0, 1.0, 0.0, 0.0);

    pub const fn new(a: f64, b: f64, c: f64, d: f64, tx: f64, ty: f64) -> Self {
        Self { a, b, c, d, tx, ty }
    }

    pub const fn scale(sx: f64, sy: f64) -> Self {
        Self::new(sx, 0.0, 0.0, sy, 0.0, 0.0)
    }

    pub const fn translation(tx: f64, ty: f64) -> Self {
        Self::new(1.0, 0.0, 0.0, 1.0, tx, ty)
    }

    /// Clockwise rotation (on a y-down screen) by `degrees`.
    ///
    /// Quarter turns produce exact `0`/`±1` entries so that rotated sizes
    /// come out as exact integers.
    pub fn rotation_degrees(degrees: f64) -> Self {
        let normalized = degrees.rem_euclid(360.0);
        let (cos, sin) = if normalized == 0.0 {
            (1.0, 0.0)
        } else if normalized == 90.0 {
            (0.0, 1.0)
        } else if normalized == 180.0 {
            (-1.0, 0.0)
        } else if normalized == 270.0 {
            (0.0, -1.0)
        } else {
            let radians = normalized.to_radians();
            (radians.cos(), radians.sin())
        };
        Self::new(cos, sin, -sin, cos, 0.0, 0.0)
    }

    pub fn determinant(&self) -> f64 {
        self.a * self.d - self.b * self.c
    }

    pub fn is_finite(&self) -> bool {
        [self.a, self.b, self.c, self.d, self.tx, self.ty]
            .iter()
            .all(|v| v.is_finite())
    }

    pub fn is_invertible(&self) -> bool {
        self.is_finite() && self.determinant().abs() > DEGENERATE_EPSILON
    }

    /// Compose: apply `self` first, then `next`.
    pub fn then(&self, next: &AffineTransform) -> AffineTransform {
        AffineTransform {
            a: self.a * next.a + self.b * next.c,
            b: self.a * next.b + self.b * next.d,
            c: self.c * next.a + self.d * next.c,
            d: self.c * next.b + self.d * next.d,
            tx: self.tx * next.a + self.ty * next.c + next.tx,
            ty: self.tx * next.b + self.ty * next.d + next.ty,
        }
    }

    pub fn apply_to_point(&self, x: f64, y: f64) -> (f64, f64) {
        (
            self.a * x + self.c * y + self.tx,
            self.b * x + self.d * y + self.ty,
        )
    }

    /// Linear part only; the result may have negative components.
    pub fn apply_to_size(&self, size: Size) -> Size {
        Size::new(
            self.a * size.width + self.c * size.height,
            self.b * size.width + self.d * size.height,
        )
    }

    /// Shift the transform so the transformed frame starts at the origin.
    ///
    /// Rotating a `w×h` frame by 90° lands it at `x ∈ [-h, 0]`; anchoring
    /// adds the translation that brings it back to `[0, h]`, which is the
    /// form container display matrices are stored in.
    pub fn anchored(&self, natural: Size) -> AffineTransform {
        let corners = [
            (0.0, 0.0),
            (natural.width, 0.0),
            (0.0, natural.height),
            (natural.width, natural.height),
        ];
        let (min_x, min_y) = corners
            .iter()
            .map(|&(x, y)| self.apply_to_point(x, y))
            .fold((f64::INFINITY, f64::INFINITY), |(mx, my), (x, y)| {
                (mx.min(x), my.min(y))
            });
        self.then(&AffineTransform::translation(-min_x, -min_y))
    }
}

/// Natural frame size plus the stored orientation transform.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VideoGeometry {
    pub natural: Size,
    pub transform: AffineTransform,
}

impl VideoGeometry {
    pub fn new(natural: Size, transform: AffineTransform) -> Self {
        Self { natural, transform }
    }

    /// Frame without orientation metadata.
    pub fn upright(width: f64, height: f64) -> Self {
        Self::new(Size::new(width, height), AffineTransform::IDENTITY)
    }

    pub fn display_size(&self) -> Result<Size, GeometryError> {
        display_size(self.natural, &self.transform)
    }
}

/// Size as perceived by a viewer: `abs(transform · natural)` per component.
///
/// # Examples
/// ```
/// # use clipshrink::planner::{AffineTransform, Size, display_size};
/// let portrait = display_size(
///     Size::new(1920.0, 1080.0),
///     &AffineTransform::rotation_degrees(90.0),
/// )
/// .unwrap();
/// assert_eq!(portrait, Size::new(1080.0, 1920.0));
/// ```
pub fn display_size(natural: Size, transform: &AffineTransform) -> Result<Size, GeometryError> {
    if !natural.is_positive() {
        return Err(GeometryError::EmptyFrame {
            width: natural.width,
            height: natural.height,
        });
    }
    if !transform.is_invertible() {
        return Err(GeometryError::Degenerate(transform.determinant()));
    }

    let applied = transform.apply_to_size(natural);
    let display = Size::new(applied.width.abs(), applied.height.abs());

    // Shears can be invertible and still zero out one axis for a given frame.
    if !display.is_positive() {
        return Err(GeometryError::CollapsedDisplay {
            width: display.width,
            height: display.height,
        });
    }
    Ok(display)
}
