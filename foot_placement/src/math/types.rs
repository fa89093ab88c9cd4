use nalgebra as na;

pub type Vec3 = na::Vector3<f32>;
pub type Quat = na::UnitQuaternion<f32>;
pub type Iso = na::Isometry3<f32>;

/// Rigid transform (rotation + translation) used for every bone and foot pose.
///
/// Composition follows nalgebra: `a * b` applies `b` first, then `a`. A child transform expressed
/// in a parent's space is lifted into the grandparent's space with `parent * child`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    pub translation: Vec3,
    pub rotation: Quat,
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

impl Transform {
    #[inline]
    pub fn new(translation: Vec3, rotation: Quat) -> Self {
        Self {
            translation,
            rotation,
        }
    }

    #[inline]
    pub fn identity() -> Self {
        Self::new(Vec3::zeros(), Quat::identity())
    }

    #[inline]
    pub fn from_translation(translation: Vec3) -> Self {
        Self::new(translation, Quat::identity())
    }

    #[inline]
    pub fn from_iso(iso: &Iso) -> Self {
        Self::new(iso.translation.vector, iso.rotation)
    }

    #[inline]
    pub fn iso(&self) -> Iso {
        Iso::from_parts(na::Translation3::from(self.translation), self.rotation)
    }

    #[inline]
    pub fn inverse(&self) -> Self {
        Self::from_iso(&self.iso().inverse())
    }

    /// Express `self` relative to `parent`: `parent⁻¹ * self`.
    #[inline]
    pub fn relative_to(&self, parent: &Transform) -> Self {
        parent.inverse() * *self
    }

    /// Offset that maps `self` onto `other` when applied in the parent space: `other * self⁻¹`.
    #[inline]
    pub fn delta_to(&self, other: &Transform) -> Self {
        *other * self.inverse()
    }

    #[inline]
    pub fn transform_point(&self, p: &Vec3) -> Vec3 {
        self.rotation * p + self.translation
    }

    #[inline]
    pub fn transform_vector(&self, v: &Vec3) -> Vec3 {
        self.rotation * v
    }

    #[inline]
    pub fn inverse_transform_point(&self, p: &Vec3) -> Vec3 {
        self.rotation.inverse_transform_vector(&(p - self.translation))
    }

    #[inline]
    pub fn inverse_transform_vector(&self, v: &Vec3) -> Vec3 {
        self.rotation.inverse_transform_vector(v)
    }

    /// Up axis of this transform's local frame (`rotation * +Y`).
    #[inline]
    pub fn up(&self) -> Vec3 {
        self.rotation * Vec3::y()
    }

    /// Linear blend of translation and shortest-path normalized blend of rotation.
    pub fn blend(a: &Transform, b: &Transform, alpha: f32) -> Self {
        if alpha <= 0.0 {
            return *a;
        }
        if alpha >= 1.0 {
            return *b;
        }

        let translation = a.translation.lerp(&b.translation, alpha);

        let qa = a.rotation.into_inner();
        let mut qb = b.rotation.into_inner();
        if qa.dot(&qb) < 0.0 {
            qb = -qb;
        }
        let blended = qa * (1.0 - alpha) + qb * alpha;
        let rotation = Quat::try_new(blended, f32::EPSILON).unwrap_or(a.rotation);

        Self::new(translation, rotation)
    }

    #[inline]
    pub fn is_finite(&self) -> bool {
        self.translation.iter().all(|c| c.is_finite())
            && self.rotation.coords.iter().all(|c| c.is_finite())
    }
}

impl std::ops::Mul for Transform {
    type Output = Transform;

    #[inline]
    fn mul(self, rhs: Transform) -> Transform {
        Transform::new(
            self.rotation * rhs.translation + self.translation,
            self.rotation * rhs.rotation,
        )
    }
}

/// Plane in Hessian form: `normal ⋅ x = dist`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Plane {
    pub normal: Vec3,
    pub dist: f32,
}

impl Plane {
    /// Build from a point on the plane and a normal. The normal is normalized; a zero normal
    /// falls back to `+Y`.
    pub fn from_point_normal(point: Vec3, normal: Vec3) -> Self {
        let n = normal.try_normalize(f32::EPSILON).unwrap_or_else(Vec3::y);
        Self {
            normal: n,
            dist: n.dot(&point),
        }
    }

    /// Closest point on the plane to the origin.
    #[inline]
    pub fn origin(&self) -> Vec3 {
        self.normal * self.dist
    }

    /// Positive on the side the normal points to.
    #[inline]
    pub fn signed_distance(&self, p: &Vec3) -> f32 {
        self.normal.dot(p) - self.dist
    }

    /// Orthogonal projection of `p` onto the plane.
    #[inline]
    pub fn project(&self, p: &Vec3) -> Vec3 {
        p - self.normal * self.signed_distance(p)
    }

    /// Map the plane through a rigid transform.
    pub fn transform_by(&self, t: &Transform) -> Self {
        Self::from_point_normal(t.transform_point(&self.origin()), t.transform_vector(&self.normal))
    }

    /// Shift the plane by a world offset.
    #[inline]
    pub fn translate_by(&self, offset: &Vec3) -> Self {
        Self {
            normal: self.normal,
            dist: self.dist + self.normal.dot(offset),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_v(a: Vec3, b: Vec3) -> bool {
        (a - b).norm() < 1.0e-5
    }

    #[test]
    fn mul_applies_right_operand_first() {
        let parent = Transform::new(
            Vec3::new(1.0, 0.0, 0.0),
            Quat::from_axis_angle(&Vec3::y_axis(), std::f32::consts::FRAC_PI_2),
        );
        let child = Transform::from_translation(Vec3::new(0.0, 0.0, 1.0));
        let p = (parent * child).translation;
        assert!(approx_v(p, Vec3::new(2.0, 0.0, 0.0)));
    }

    #[test]
    fn relative_to_round_trips_through_parent() {
        let parent = Transform::new(
            Vec3::new(0.3, 1.0, -2.0),
            Quat::from_euler_angles(0.1, 0.7, -0.2),
        );
        let child = Transform::new(Vec3::new(1.0, 2.0, 3.0), Quat::from_euler_angles(0.4, 0.0, 0.2));
        let local = child.relative_to(&parent);
        let back = parent * local;
        assert!(approx_v(back.translation, child.translation));
        assert!(back.rotation.angle_to(&child.rotation) < 1.0e-5);
    }

    #[test]
    fn delta_to_maps_source_onto_target() {
        let a = Transform::new(Vec3::new(0.0, 1.0, 0.0), Quat::from_euler_angles(0.0, 0.5, 0.0));
        let b = Transform::new(Vec3::new(2.0, 1.0, 0.5), Quat::from_euler_angles(0.0, -0.3, 0.1));
        let delta = a.delta_to(&b);
        let mapped = delta * a;
        assert!(approx_v(mapped.translation, b.translation));
        assert!(mapped.rotation.angle_to(&b.rotation) < 1.0e-5);
    }

    #[test]
    fn blend_endpoints_and_midpoint() {
        let a = Transform::from_translation(Vec3::zeros());
        let b = Transform::new(
            Vec3::new(2.0, 0.0, 0.0),
            Quat::from_axis_angle(&Vec3::y_axis(), 1.0),
        );
        assert_eq!(Transform::blend(&a, &b, 0.0), a);
        assert_eq!(Transform::blend(&a, &b, 1.0), b);
        let mid = Transform::blend(&a, &b, 0.5);
        assert!(approx_v(mid.translation, Vec3::new(1.0, 0.0, 0.0)));
        assert!((mid.rotation.angle() - 0.5).abs() < 1.0e-3);
    }

    #[test]
    fn plane_signed_distance_and_projection() {
        let plane = Plane::from_point_normal(Vec3::new(0.0, 2.0, 0.0), Vec3::new(0.0, 3.0, 0.0));
        assert!((plane.signed_distance(&Vec3::new(5.0, 3.0, 1.0)) - 1.0).abs() < 1.0e-6);
        assert!(approx_v(plane.project(&Vec3::new(5.0, 3.0, 1.0)), Vec3::new(5.0, 2.0, 1.0)));
    }

    #[test]
    fn plane_transform_and_translate() {
        let plane = Plane::from_point_normal(Vec3::zeros(), Vec3::y());
        let moved = plane.transform_by(&Transform::from_translation(Vec3::new(0.0, 1.5, 0.0)));
        assert!((moved.dist - 1.5).abs() < 1.0e-6);
        let shifted = moved.translate_by(&Vec3::new(3.0, -0.5, 0.0));
        assert!((shifted.dist - 1.0).abs() < 1.0e-6);
    }
}
