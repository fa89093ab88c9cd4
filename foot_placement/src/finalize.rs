//! Last pass over each IK foot once the pelvis is known.

use log::warn;

use crate::constants::DIST_EPS;
use crate::error::{FootPlacementError, Result};
use crate::math::{
    Plane, Transform, Vec3, distance_to_plane_along_direction, find_between_vectors, safe_normal,
    sphere_dist_to_line,
};
use crate::pelvis::{max_limb_extension, min_limb_extension};
use crate::pose::BoneTransform;
use crate::settings::PlantSettings;
use crate::state::{LegBones, LegRuntimeState, PelvisRuntimeState};

/// Fix over-extension, ground penetration and over-compression of one leg against the solved
/// pelvis, then blend toward the input pose by the leg's disable weight.
///
/// Returns the component-space transform of the leg's IK foot bone.
pub fn finalize_foot_alignment(
    plant_settings: &PlantSettings,
    approach_dir_cs: &Vec3,
    bones: &LegBones,
    leg: &mut LegRuntimeState,
    pelvis: &PelvisRuntimeState,
    pelvis_cs: &Transform,
) -> Result<BoneTransform> {
    let input = leg.input_pose;
    let root_cs = pelvis.input_pose.root_cs;

    let pelvis_to_hip = input.hip_cs.relative_to(&pelvis.input_pose.fk_cs);
    let hip = (*pelvis_cs * pelvis_to_hip).translation;

    let mut foot = root_cs * leg.aligned_foot_rs;
    let ball = (foot * input.foot_to_ball).translation;

    let input_hip_to_foot = input.foot_cs.translation - input.hip_cs.translation;
    let hip_to_foot_dir = safe_normal(&(foot.translation - hip));

    if input_hip_to_foot.norm() > DIST_EPS && hip_to_foot_dir != Vec3::zeros() {
        let desired_extension = input_hip_to_foot.norm();
        let max_extension = max_limb_extension(
            desired_extension,
            bones.limb_length,
            plant_settings.max_extension_ratio,
        );
        let current_extension = (foot.translation - hip).norm();

        if current_extension > max_extension {
            let mut remaining = current_extension - max_extension;
            let is_planted = leg.plant.is_planted();

            if !is_planted {
                // Unreachable: wait for replant range before planting again.
                leg.plant.can_reach_target = false;
            }

            let recently_unplanted = !is_planted && leg.plant.time_since_fully_unaligned == 0.0;
            let can_lift_heel = recently_unplanted
                || (is_planted && leg.plant.can_reach_target)
                || plant_settings.adjust_heel_before_planting;

            if can_lift_heel {
                let pull = bones.foot_length.min(remaining) * input.alignment_alpha;
                remaining -= pull;

                // Pull the ankle toward the hip and roll the foot so the ball stays put.
                let pulled = foot.translation - hip_to_foot_dir * pull;
                let roll = find_between_vectors(&(ball - foot.translation), &(ball - pulled));
                foot.rotation = roll * foot.rotation;
                foot.translation = pulled;
            }

            if remaining > 0.0 {
                let (reachable, _) =
                    sphere_dist_to_line(&hip, max_extension, &foot.translation, &hip_to_foot_dir);
                foot.translation = reachable;
            }
        } else {
            leg.plant.can_reach_target = true;
        }
    }

    // Ground penetration, allowing as much as the input pose already had.
    let plant_plane_cs = leg.plant.plant_plane_cs(&root_cs);
    let foot_distance =
        distance_to_plane_along_direction(&foot.translation, &plant_plane_cs, approach_dir_cs);
    let ball_distance = distance_to_plane_along_direction(&ball, &plant_plane_cs, approach_dir_cs);
    let min_distance = foot_distance.min(ball_distance) - input.distance_to_plant.min(0.0);
    if min_distance < 0.0 {
        foot.translation += approach_dir_cs * min_distance;
    }

    // Over-compression: clip into the ground rather than fold the leg.
    let min_extension = min_limb_extension(
        input_hip_to_foot.dot(approach_dir_cs).abs(),
        bones.limb_length,
        plant_settings.min_extension_ratio,
    );
    let hip_plane = Plane::from_point_normal(hip + approach_dir_cs * min_extension, *approach_dir_cs);
    let distance_to_hip_plane = hip_plane.signed_distance(&foot.translation);
    if distance_to_hip_plane < 0.0 {
        foot.translation -= approach_dir_cs * distance_to_hip_plane;
    }

    if input.disable_leg > 0.0 {
        let mut disabled = input.foot_fk_cs;
        disabled.translation +=
            pelvis.interpolation.translation_offset * (1.0 - pelvis.disable_pelvis);
        foot = Transform::blend(&foot, &disabled, input.disable_leg);
    }

    if !foot.is_finite() {
        warn!("non-finite foot transform for bone {}", bones.ik_index);
        return Err(FootPlacementError::non_finite_transform(bones.ik_index));
    }

    Ok(BoneTransform::new(bones.ik_index, foot))
}
