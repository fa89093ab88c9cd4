//! Geometric helpers shared by the plant, alignment, pelvis and finalize stages.
//!
//! Every helper degrades gracefully on degenerate input (parallel lines, zero-length vectors)
//! instead of dividing by ~0.

use nalgebra as na;

use super::types::{Plane, Quat, Vec3};
use crate::constants::{DIST_EPS, PARALLEL_EPS};

/// Intersection of the line `point + t * direction` with `plane`.
///
/// Returns `point` unchanged when the direction is (nearly) parallel to the plane.
pub fn point_direction_plane_intersection(point: &Vec3, direction: &Vec3, plane: &Plane) -> Vec3 {
    let denom = direction.dot(&plane.normal);
    if denom.abs() <= PARALLEL_EPS {
        return *point;
    }
    point + direction * ((plane.dist - point.dot(&plane.normal)) / denom)
}

/// Height of `point` above `plane`, measured along `-approach_dir`.
///
/// Positive when the point is on the far side of the plane from the approach direction
/// (i.e. above the ground for a downward approach).
pub fn distance_to_plane_along_direction(point: &Vec3, plane: &Plane, approach_dir: &Vec3) -> f32 {
    let up = -approach_dir;
    let intersection = point_direction_plane_intersection(point, &up, plane);
    (point - intersection).dot(&up)
}

/// Closest intersection of a line with a sphere.
///
/// Returns the intersection point nearest the line origin and `true` when the line crosses the
/// sphere. Otherwise returns the point on the sphere closest to the line and `false`.
pub fn sphere_dist_to_line(
    sphere_center: &Vec3,
    sphere_radius: f32,
    line_origin: &Vec3,
    line_dir: &Vec3,
) -> (Vec3, bool) {
    let a = line_dir.dot(line_dir);
    let b = 2.0 * line_dir.dot(&(line_origin - sphere_center));
    let c = sphere_center.dot(sphere_center) + line_origin.dot(line_origin)
        - 2.0 * sphere_center.dot(line_origin)
        - sphere_radius * sphere_radius;
    let d = b * b - 4.0 * a * c;

    if d <= 1.0e-4 || a <= DIST_EPS {
        // Miss (or tangent): the point on the sphere nearest the line.
        let t = if a > DIST_EPS { -b / (2.0 * a) } else { 0.0 };
        let on_line = line_origin + line_dir * t;
        let to_line = safe_normal(&(on_line - sphere_center));
        return (sphere_center + to_line * sphere_radius, false);
    }

    let e = d.sqrt();
    let t1 = (-b + e) / (2.0 * a);
    let t2 = (-b - e) / (2.0 * a);
    let t = if t1.abs() < t2.abs() { t1 } else { t2 };
    (line_origin + line_dir * t, true)
}

/// Normalized vector or zero when the input is too short.
#[inline]
pub fn safe_normal(v: &Vec3) -> Vec3 {
    v.try_normalize(DIST_EPS).unwrap_or_else(Vec3::zeros)
}

/// Remove the component along `axis` (unit) from `v`.
#[inline]
pub fn reject_axis(v: &Vec3, axis: &Vec3) -> Vec3 {
    v - axis * axis.dot(v)
}

/// Scale `v` down so its length never exceeds `max_size`.
pub fn clamp_to_max_size(v: &Vec3, max_size: f32) -> Vec3 {
    if max_size < DIST_EPS {
        return Vec3::zeros();
    }
    let len_sq = v.norm_squared();
    if len_sq > max_size * max_size {
        v * (max_size / len_sq.sqrt())
    } else {
        *v
    }
}

/// Rotation taking unit vector `from` onto unit vector `to`.
///
/// Antiparallel inputs rotate half a turn around an arbitrary orthogonal axis.
pub fn find_between_normals(from: &Vec3, to: &Vec3) -> Quat {
    if let Some(q) = Quat::rotation_between(from, to) {
        return q;
    }
    // Antiparallel (or degenerate).
    let ortho = if from.x.abs() < 0.9 { Vec3::x() } else { Vec3::z() };
    match na::Unit::try_new(from.cross(&ortho), DIST_EPS) {
        Some(axis) => Quat::from_axis_angle(&axis, std::f32::consts::PI),
        None => Quat::identity(),
    }
}

/// Same as [`find_between_normals`] for vectors of any non-zero length.
pub fn find_between_vectors(from: &Vec3, to: &Vec3) -> Quat {
    let (f, t) = (safe_normal(from), safe_normal(to));
    if f == Vec3::zeros() || t == Vec3::zeros() {
        return Quat::identity();
    }
    find_between_normals(&f, &t)
}

/// Decompose `q` into `(swing, twist)` with `q = swing * twist` and `twist` a rotation about
/// `twist_axis` (unit).
pub fn swing_twist(q: &Quat, twist_axis: &Vec3) -> (Quat, Quat) {
    let raw = q.quaternion();
    let projection = twist_axis * twist_axis.dot(&raw.imag());
    let twist_raw = na::Quaternion::new(raw.w, projection.x, projection.y, projection.z);
    let twist = Quat::try_new(twist_raw, DIST_EPS).unwrap_or_else(Quat::identity);
    let swing = q * twist.inverse();
    (swing, twist)
}

/// Fraction of a rotation along its shortest arc, `alpha ∈ [0, 1]`.
#[inline]
pub fn scale_rotation(q: &Quat, alpha: f32) -> Quat {
    Quat::from_scaled_axis(q.scaled_axis() * alpha)
}

/// Clamp that never panics on an inverted range. With `min > max`, values below `min` give
/// `min` and everything else gives `max`.
#[inline]
pub fn clamp_lenient(x: f32, min: f32, max: f32) -> f32 {
    if x < min {
        min
    } else if x < max {
        x
    } else {
        max
    }
}

/// Fraction of `value` across `[from, to]`, unclamped. Zero for an empty range.
#[inline]
pub fn range_pct(from: f32, to: f32, value: f32) -> f32 {
    let divisor = to - from;
    if divisor.abs() <= f32::EPSILON {
        if value >= to { 1.0 } else { 0.0 }
    } else {
        (value - from) / divisor
    }
}
