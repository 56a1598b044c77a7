//! World-to-screen projection
//!
//! [`project`] is a pure function of its inputs and is safe to call from any
//! number of threads against the same [`ViewSnapshot`]. The [`Projector`] wrapper
//! pairs it with a viewport and the camera resolver's live view.

use crate::camera::LiveView;
use crate::math::{Vec2, Vec3};
use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Camera view-projection matrix, stored row-major
///
/// Row `i` is `(basis_i, term_i)`: row 0 produces screen X, row 1 screen Y,
/// row 2 depth and row 3 the homogeneous `w`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct ViewTransform {
    /// Rows of the matrix
    pub rows: [[f32; 4]; 4],
}

impl ViewTransform {
    /// All-zero transform; projects nothing
    pub const ZERO: Self = Self { rows: [[0.0; 4]; 4] };

    /// Build from the column-major layout the engine keeps in memory
    pub fn from_column_major(raw: [f32; 16]) -> Self {
        let mut rows = [[0.0f32; 4]; 4];
        for (c, column) in raw.chunks_exact(4).enumerate() {
            for (r, value) in column.iter().enumerate() {
                rows[r][c] = *value;
            }
        }
        Self { rows }
    }

    /// Flatten back into the in-memory column-major layout
    pub fn to_column_major(&self) -> [f32; 16] {
        let mut raw = [0.0f32; 16];
        for (r, row) in self.rows.iter().enumerate() {
            for (c, value) in row.iter().enumerate() {
                raw[c * 4 + r] = *value;
            }
        }
        raw
    }

    #[inline]
    fn basis(&self, row: usize) -> Vec3 {
        let r = self.rows[row];
        Vec3::new(r[0], r[1], r[2])
    }

    /// Basis producing screen X
    #[inline]
    pub fn right(&self) -> Vec3 {
        self.basis(0)
    }

    /// Basis producing screen Y
    #[inline]
    pub fn up(&self) -> Vec3 {
        self.basis(1)
    }

    /// Basis producing depth
    #[inline]
    pub fn forward(&self) -> Vec3 {
        self.basis(2)
    }

    /// Basis producing the homogeneous depth term
    #[inline]
    pub fn translation(&self) -> Vec3 {
        self.basis(3)
    }

    /// Constant term of screen X
    #[inline]
    pub fn x_term(&self) -> f32 {
        self.rows[0][3]
    }

    /// Constant term of screen Y
    #[inline]
    pub fn y_term(&self) -> f32 {
        self.rows[1][3]
    }

    /// Constant term of `w`
    #[inline]
    pub fn w_term(&self) -> f32 {
        self.rows[3][3]
    }

    /// Every element is zero
    pub fn is_zero(&self) -> bool {
        self.rows.iter().flatten().all(|v| *v == 0.0)
    }
}

/// Everything [`project`] needs from the camera for one frame
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ViewSnapshot {
    /// This frame's matrix
    pub transform: ViewTransform,
    /// Looking through an optic whose matrix is being sampled
    pub scoped: bool,
    /// Vertical field of view of the main camera, in degrees
    pub fov: f32,
    /// Aspect ratio of the main camera
    pub aspect: f32,
}

/// Output surface in pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    /// Width in pixels
    pub width: f32,
    /// Height in pixels
    pub height: f32,
}

impl Viewport {
    /// Viewport of the given size
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    /// Screen center
    #[inline]
    pub fn center(&self) -> Vec2 {
        Vec2::new(self.width * 0.5, self.height * 0.5)
    }

    /// Whether `point` lies inside the viewport grown by `tolerance` on every side
    pub fn contains(&self, point: Vec2, tolerance: f32) -> bool {
        point.x >= -tolerance
            && point.x <= self.width + tolerance
            && point.y >= -tolerance
            && point.y <= self.height + tolerance
    }
}

/// Projection tunables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectionConfig {
    /// Anything with `w` below this is behind the camera
    pub epsilon: f32,
    /// Depth at which the scale factor is exactly 1.0
    pub reference_distance: f32,
    /// Lower bound of the scale factor
    pub min_scale: f32,
    /// Upper bound of the scale factor
    pub max_scale: f32,
}

impl ProjectionConfig {
    /// Reject settings that cannot produce a usable projection
    pub fn validate(&self) -> std::result::Result<(), String> {
        let values = [
            ("epsilon", self.epsilon),
            ("reference_distance", self.reference_distance),
            ("min_scale", self.min_scale),
            ("max_scale", self.max_scale),
        ];
        if let Some((name, _)) = values.iter().find(|(_, v)| !v.is_finite()) {
            return Err(format!("projection.{} must be finite", name));
        }
        if self.min_scale > self.max_scale {
            return Err(format!(
                "projection.min_scale ({}) exceeds max_scale ({})",
                self.min_scale, self.max_scale
            ));
        }
        Ok(())
    }
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self {
            epsilon: 0.098,
            reference_distance: 50.0,
            min_scale: 0.25,
            max_scale: 2.0,
        }
    }
}

/// Result of projecting one world point
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectionResult {
    /// Screen position in pixels
    pub screen: Vec2,
    /// Depth-based size multiplier for markers
    pub scale: f32,
    /// Whether the point is usable
    pub valid: bool,
}

impl ProjectionResult {
    /// The failed projection
    pub const INVALID: Self = Self {
        screen: Vec2::ZERO,
        scale: 0.0,
        valid: false,
    };

    /// `Some((screen, scale))` when the projection is usable
    pub fn ok(self) -> Option<(Vec2, f32)> {
        self.valid.then_some((self.screen, self.scale))
    }
}

/// Project a world point onto the screen
///
/// `on_screen` is an optional tolerance margin in pixels; when set, points
/// outside the grown viewport are rejected. NaN or infinity anywhere in the
/// computation yields [`ProjectionResult::INVALID`].
pub fn project(
    world: Vec3,
    view: &ViewSnapshot,
    viewport: &Viewport,
    config: &ProjectionConfig,
    on_screen: Option<f32>,
) -> ProjectionResult {
    if !world.is_finite() {
        return ProjectionResult::INVALID;
    }

    let transform = &view.transform;

    let w = transform.translation().dot(world) + transform.w_term();
    if !w.is_finite() || w < config.epsilon {
        return ProjectionResult::INVALID;
    }

    // Not `clamp`: bounds come from user config and may be inverted or NaN
    let scale = (config.reference_distance / w)
        .max(config.min_scale)
        .min(config.max_scale);

    let mut x = transform.right().dot(world) + transform.x_term();
    let mut y = transform.up().dot(world) + transform.y_term();

    if view.scoped {
        let cot = 1.0 / (view.fov.to_radians() * 0.5).tan();
        let x_factor = cot * view.aspect * 0.5;
        let y_factor = cot * 0.5;

        if !x_factor.is_finite() || !y_factor.is_finite() || x_factor == 0.0 || y_factor == 0.0 {
            return ProjectionResult::INVALID;
        }

        x /= x_factor;
        y /= y_factor;
    }

    let center = viewport.center();
    let screen = Vec2::new(center.x * (1.0 + x / w), center.y * (1.0 - y / w));

    if !screen.is_finite() || !scale.is_finite() {
        return ProjectionResult::INVALID;
    }

    if let Some(tolerance) = on_screen {
        if !viewport.contains(screen, tolerance) {
            return ProjectionResult::INVALID;
        }
    }

    ProjectionResult {
        screen,
        scale,
        valid: true,
    }
}

/// Projects against the camera resolver's live view
///
/// Cheap to clone; every clone shares the same [`LiveView`].
#[derive(Debug, Clone)]
pub struct Projector {
    view: Arc<LiveView>,
    viewport: Viewport,
    config: ProjectionConfig,
}

impl Projector {
    /// Projector over `view`
    pub fn new(view: Arc<LiveView>, viewport: Viewport, config: ProjectionConfig) -> Self {
        Self {
            view,
            viewport,
            config,
        }
    }

    /// Follow a resized output surface
    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    /// Current output surface
    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    /// Project `world` with this frame's view
    ///
    /// When `on_screen_check` is set, points further than `tolerance` pixels
    /// outside the viewport are invalid.
    pub fn project(&self, world: Vec3, on_screen_check: bool, tolerance: f32) -> ProjectionResult {
        let snapshot = self.view.snapshot();
        let bounds = on_screen_check.then_some(tolerance);
        project(world, &snapshot, &self.viewport, &self.config, bounds)
    }
}
