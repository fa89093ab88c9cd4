/// Distance tolerance (meters) below which a vector is treated as zero-length.
pub const DIST_EPS: f32 = 1.0e-6;

/// Below this `|direction ⋅ normal|`, a line is treated as parallel to a plane.
pub const PARALLEL_EPS: f32 = 1.0e-4;

/// Below this delta time (seconds), spring interpolation holds its current value.
pub const MIN_SPRING_DT: f32 = 1.0e-6;

/// Tolerance used for "nearly zero" tests on curve weights and alphas.
pub const NEARLY_ZERO: f32 = 1.0e-8;

/// Capsule moves shorter than this (meters) are not compensated.
pub const MIN_COMPENSATED_MOVE: f32 = 1.0e-4;

/// Default bias (meters) subtracted from the lowest desired pelvis offset before blending.
///
/// Nudges the solve toward compression so crouch-like poses keep the other leg's shape.
pub const DEFAULT_DESIRED_OFFSET_EPSILON: f32 = 0.0005;

/// Default walkable slope limit expressed as `cos(max_slope_angle)` (≈ 45°).
///
/// A ground normal `n` is walkable when `n ⋅ up >= MAX_SLOPE_COS`.
pub const MAX_SLOPE_COS: f32 = 0.707_106_77;
