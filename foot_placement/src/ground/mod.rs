//! Ground sensing: the character/world interface the solver consumes, plus a flat-ground
//! implementation and a Rapier-backed one.

pub mod channels;
pub mod rapier_world;

pub use channels::{BitmaskFlags, ChannelMask, FlagBitmask, TraceChannel};
pub use rapier_world::{ColliderShapeDef, GroundWorld, RapierCharacter, WorldStaticDef};

use crate::constants::MAX_SLOPE_COS;
use crate::math::{Plane, Transform, Vec3};

/// A sphere sweep from `start` to `end` in world space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SweepRequest {
    pub start: Vec3,
    pub end: Vec3,
    pub radius: f32,
    pub channel: TraceChannel,
    /// Skip the owning character's own colliders.
    pub ignore_self: bool,
}

/// World-space impact of a ground query.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GroundHit {
    pub point: Vec3,
    pub normal: Vec3,
}

/// Everything the solver needs from the owning character and its world.
///
/// Queries are synchronous; at most one sweep is issued per leg per evaluation.
pub trait CharacterEnvironment {
    fn sweep(&self, request: &SweepRequest) -> Option<GroundHit>;

    fn is_walkable(&self, hit: &GroundHit) -> bool;

    /// The floor the character's movement currently stands on, if any.
    fn current_floor(&self) -> Option<GroundHit>;

    /// Walking on a blocking floor.
    fn is_on_ground(&self) -> bool;

    /// World-space velocity (m/s).
    fn velocity(&self) -> Vec3;

    fn component_to_world(&self) -> Transform;

    /// World translation applied by a moving base this frame.
    fn base_translation_delta(&self) -> Vec3 {
        Vec3::zeros()
    }
}

/// Sphere sweep against a single plane. Returns the contact point on the plane.
pub fn sweep_sphere_plane(plane: &Plane, start: &Vec3, end: &Vec3, radius: f32) -> Option<GroundHit> {
    let delta = end - start;
    let gap = plane.signed_distance(start) - radius;
    if gap < 0.0 {
        // Starts in contact.
        if plane.signed_distance(start) < -radius {
            return None;
        }
        return Some(GroundHit {
            point: plane.project(start),
            normal: plane.normal,
        });
    }

    let approach = plane.normal.dot(&delta);
    if approach >= 0.0 {
        return None;
    }
    let toi = -gap / approach;
    if toi > 1.0 {
        return None;
    }
    Some(GroundHit {
        point: plane.project(&(start + delta * toi)),
        normal: plane.normal,
    })
}

/// Infinite flat (or uniformly sloped) ground. Useful as a stand-in when no physics world is
/// available.
#[derive(Clone, Debug)]
pub struct FlatGround {
    pub plane: Plane,
    pub component_to_world: Transform,
    pub velocity: Vec3,
    pub on_ground: bool,
    /// When false, every sweep misses.
    pub traces_hit: bool,
    pub max_slope_cos: f32,
    pub base_translation_delta: Vec3,
}

impl FlatGround {
    pub fn new(height: f32) -> Self {
        Self {
            plane: Plane::from_point_normal(Vec3::new(0.0, height, 0.0), Vec3::y()),
            component_to_world: Transform::identity(),
            velocity: Vec3::zeros(),
            on_ground: true,
            traces_hit: true,
            max_slope_cos: MAX_SLOPE_COS,
            base_translation_delta: Vec3::zeros(),
        }
    }

    pub fn with_plane(plane: Plane) -> Self {
        Self {
            plane,
            ..Self::new(0.0)
        }
    }
}

impl CharacterEnvironment for FlatGround {
    fn sweep(&self, request: &SweepRequest) -> Option<GroundHit> {
        if !self.traces_hit {
            return None;
        }
        sweep_sphere_plane(&self.plane, &request.start, &request.end, request.radius)
    }

    fn is_walkable(&self, hit: &GroundHit) -> bool {
        hit.normal.dot(&Vec3::y()) >= self.max_slope_cos
    }

    fn current_floor(&self) -> Option<GroundHit> {
        if !self.on_ground {
            return None;
        }
        let location = self.component_to_world.translation;
        Some(GroundHit {
            point: self.plane.project(&location),
            normal: self.plane.normal,
        })
    }

    fn is_on_ground(&self) -> bool {
        self.on_ground
    }

    fn velocity(&self) -> Vec3 {
        self.velocity
    }

    fn component_to_world(&self) -> Transform {
        self.component_to_world
    }

    fn base_translation_delta(&self) -> Vec3 {
        self.base_translation_delta
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sweep_hits_plane_from_above() {
        let plane = Plane::from_point_normal(Vec3::new(0.0, 0.2, 0.0), Vec3::y());
        let hit = sweep_sphere_plane(&plane, &Vec3::new(1.0, 1.0, 0.0), &Vec3::new(1.0, -1.0, 0.0), 0.05)
            .unwrap();
        assert!((hit.point - Vec3::new(1.0, 0.2, 0.0)).norm() < 1.0e-5);
        assert_eq!(hit.normal, Vec3::y());
    }

    #[test]
    fn sweep_stops_short_of_plane() {
        let plane = Plane::from_point_normal(Vec3::zeros(), Vec3::y());
        assert!(sweep_sphere_plane(&plane, &Vec3::new(0.0, 2.0, 0.0), &Vec3::new(0.0, 1.0, 0.0), 0.1).is_none());
    }

    #[test]
    fn flat_ground_misses_when_disabled() {
        let mut ground = FlatGround::new(0.0);
        ground.traces_hit = false;
        let req = SweepRequest {
            start: Vec3::new(0.0, 1.0, 0.0),
            end: Vec3::new(0.0, -1.0, 0.0),
            radius: 0.05,
            channel: TraceChannel::FootComplex,
            ignore_self: true,
        };
        assert!(ground.sweep(&req).is_none());
    }

    #[test]
    fn steep_plane_is_not_walkable() {
        let steep = Plane::from_point_normal(Vec3::zeros(), Vec3::new(1.0, 0.5, 0.0));
        let ground = FlatGround::with_plane(steep);
        let hit = GroundHit {
            point: Vec3::zeros(),
            normal: steep.normal,
        };
        assert!(!ground.is_walkable(&hit));
    }
}
