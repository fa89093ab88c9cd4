//! Runtime state owned by the solver: one record per leg, one for the pelvis, one for the
//! character. Everything here persists across evaluations.

use crate::math::{Plane, Quat, Transform, Vec3};
use crate::plant::PlantType;
use crate::pose::BoneIndex;
use crate::spring::{FloatSpringState, QuatSpringState, VectorSpringState};

/// Bones of one leg, resolved at bind time.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LegBones {
    pub fk_index: BoneIndex,
    pub ik_index: BoneIndex,
    pub ball_index: BoneIndex,
    pub hip_index: BoneIndex,
    /// Reference-pose length from the hip to the foot.
    pub limb_length: f32,
    /// Reference-pose length from the foot to the ball.
    pub foot_length: f32,
}

/// This frame's input pose for one leg, in component space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LegInputPose {
    pub foot_fk_cs: Transform,
    /// IK foot bone.
    pub foot_cs: Transform,
    pub hip_cs: Transform,
    /// Ball placed relative to the IK foot.
    pub ball_cs: Transform,
    /// Ball relative to the FK foot.
    pub foot_to_ball: Transform,
    /// FK foot relative to the ball.
    pub ball_to_foot: Transform,
    pub speed: f32,
    /// Height of the foot (or ball, whichever is lower) above the ik-root plane.
    pub distance_to_plant: f32,
    pub alignment_alpha: f32,
    pub lock_alpha: f32,
    pub disable_leg: f32,
}

impl Default for LegInputPose {
    fn default() -> Self {
        Self {
            foot_fk_cs: Transform::identity(),
            foot_cs: Transform::identity(),
            hip_cs: Transform::identity(),
            ball_cs: Transform::identity(),
            foot_to_ball: Transform::identity(),
            ball_to_foot: Transform::identity(),
            speed: 0.0,
            distance_to_plant: 0.0,
            alignment_alpha: 0.0,
            lock_alpha: 1.0,
            disable_leg: 0.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlantState {
    pub plant_type: PlantType,
    pub last_plant_type: PlantType,
    pub wants_to_plant: bool,
    /// Smoothed ground plane under the foot, in root space.
    pub plant_plane_rs: Plane,
    /// Twist about the plane normal extracted by the last ground alignment.
    pub twist_correction: Quat,
    pub can_reach_target: bool,
    pub time_since_fully_unaligned: f32,
}

impl Default for PlantState {
    fn default() -> Self {
        Self {
            plant_type: PlantType::Unplanted,
            last_plant_type: PlantType::Unplanted,
            wants_to_plant: false,
            plant_plane_rs: Plane::from_point_normal(Vec3::zeros(), Vec3::y()),
            twist_correction: Quat::identity(),
            can_reach_target: false,
            time_since_fully_unaligned: 0.0,
        }
    }
}

impl PlantState {
    #[inline]
    pub fn is_planted(&self) -> bool {
        self.plant_type != PlantType::Unplanted
    }

    pub fn plant_plane_cs(&self, root_cs: &Transform) -> Plane {
        self.plant_plane_rs.transform_by(root_cs)
    }

    pub fn plant_plane_ws(&self, root_cs: &Transform, component_to_world: &Transform) -> Plane {
        self.plant_plane_rs.transform_by(&(*component_to_world * *root_cs))
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LegInterpolation {
    /// Offset from the input foot to the locked foot, in root space.
    pub unaligned_foot_offset: Transform,
    pub plant_offset_translation_spring: VectorSpringState,
    pub plant_offset_rotation_spring: QuatSpringState,
    pub ground_height_spring: FloatSpringState,
    pub ground_rotation_spring: QuatSpringState,
    pub separating_plane_offset: Vec3,
    pub separating_plane_offset_spring: VectorSpringState,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct LegRuntimeState {
    pub bones: Option<LegBones>,
    pub input_pose: LegInputPose,
    pub plant: PlantState,
    pub interpolation: LegInterpolation,
    pub aligned_foot_rs: Transform,
    pub aligned_foot_ws: Transform,
    pub unaligned_foot_rs: Transform,
    pub unaligned_foot_ws: Transform,
}

impl LegRuntimeState {
    /// Drop everything but the bone bindings.
    pub fn reset(&mut self) {
        *self = Self {
            bones: self.bones,
            ..Self::default()
        };
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PelvisBones {
    pub fk_index: BoneIndex,
    pub ik_root_index: BoneIndex,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PelvisInputPose {
    pub fk_cs: Transform,
    pub ik_root_cs: Transform,
    pub root_cs: Transform,
    pub foot_midpoint_cs: Vec3,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PelvisInterpolation {
    /// Root-space offset from the input pelvis to the smoothed pelvis.
    pub translation_offset: Vec3,
    pub translation_spring: VectorSpringState,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct PelvisRuntimeState {
    pub bones: Option<PelvisBones>,
    pub input_pose: PelvisInputPose,
    pub interpolation: PelvisInterpolation,
    pub max_offset_sqrd: f32,
    pub disable_pelvis: f32,
}

impl PelvisRuntimeState {
    pub fn reset(&mut self) {
        self.interpolation = PelvisInterpolation::default();
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CharacterRuntimeState {
    pub component_transform_ws: Transform,
    /// This frame's component move, minus any compensated vertical jump.
    pub component_move_delta_ws: Vec3,
    pub velocity_ws: Vec3,
    pub smooth_capsule_ground_normal_ws: Vec3,
    pub smooth_capsule_ground_normal_spring: QuatSpringState,
    pub is_on_ground: bool,
}

impl Default for CharacterRuntimeState {
    fn default() -> Self {
        Self {
            component_transform_ws: Transform::identity(),
            component_move_delta_ws: Vec3::zeros(),
            velocity_ws: Vec3::zeros(),
            smooth_capsule_ground_normal_ws: Vec3::y(),
            smooth_capsule_ground_normal_spring: QuatSpringState::default(),
            is_on_ground: false,
        }
    }
}
