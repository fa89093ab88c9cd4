//! Pelvis offset solve.
//!
//! Each leg reports how far the pelvis may move along the up axis before that leg over-extends
//! ([`PelvisOffsetRange::max`]), how far it would move to keep the input pose's hip-to-foot
//! distance ([`PelvisOffsetRange::desired`]) and the compression floor
//! ([`PelvisOffsetRange::min`]). The ranges are then folded into a single vertical offset.

use log::trace;

use crate::math::{
    Plane, Transform, Vec3, clamp_lenient, clamp_to_max_size, reject_axis, safe_normal,
    sphere_dist_to_line,
};
use crate::settings::{FootPlacementSettings, PelvisSettings};
use crate::spring::spring_interp;
use crate::state::{LegBones, LegInputPose, LegRuntimeState, PelvisInputPose, PelvisRuntimeState};

/// Longest hip-to-foot distance allowed for a leg whose input pose is `desired` long.
pub fn max_limb_extension(desired: f32, limb_length: f32, max_extension_ratio: f32) -> f32 {
    if desired > limb_length {
        return desired;
    }
    desired + (limb_length - desired) * max_extension_ratio
}

/// Shortest hip-to-foot distance allowed.
pub fn min_limb_extension(desired: f32, limb_length: f32, min_extension_ratio: f32) -> f32 {
    desired.min(limb_length * min_extension_ratio)
}

/// Pelvis offsets along the up axis, relative to the current hip.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PelvisOffsetRange {
    pub min: f32,
    pub desired: f32,
    pub max: f32,
}

/// Offset range a single leg allows, given its ground-corrected foot target.
///
/// `fk_pelvis_cs` is the input pelvis, `pelvis_cs` the (possibly rebalanced) pelvis the range is
/// measured from. Everything is in component space.
#[allow(clippy::too_many_arguments)]
pub fn find_pelvis_offset_range_for_limb(
    settings: &FootPlacementSettings,
    approach_dir_cs: &Vec3,
    bones: &LegBones,
    input: &LegInputPose,
    fk_pelvis_cs: &Transform,
    pelvis_cs: &Transform,
    plant_target_cs: &Vec3,
) -> PelvisOffsetRange {
    let up = -approach_dir_cs;
    let hip_to_pelvis = input.hip_cs.relative_to(fk_pelvis_cs);
    let hip = (*pelvis_cs * hip_to_pelvis).translation;

    let desired_extension = (input.foot_cs.translation - input.hip_cs.translation).norm();
    let max_extension = max_limb_extension(
        desired_extension,
        bones.limb_length,
        settings.plant.max_extension_ratio,
    );

    let mut target = *plant_target_cs;
    let foot_plane = Plane::from_point_normal(target, up);
    let hip_height = foot_plane.signed_distance(&hip);

    let mut desired_target = target;
    let mut max_target = target;

    // Horizontal adjustments only make sense while the foot is below the hip.
    if hip_height > 0.0 {
        let fk_projected = foot_plane.project(&input.foot_cs.translation);
        let hip_projected = foot_plane.project(&hip);
        let initial_foot_offset = (hip_projected - fk_projected).norm();

        // Slide toward the input foot by up to a foot length so the heel lifts before the hip
        // drops.
        let to_fk = fk_projected - target;
        target += safe_normal(&to_fk) * to_fk.norm().min(bones.foot_length) * settings.pelvis.heel_lift_ratio;

        let target_to_hip = hip_projected - target;
        let target_foot_offset = target_to_hip.norm();
        let max_hip_offset = settings.pelvis.max_offset_horizontal;

        let adjust_by_orthogonal_limit = |leg_length: f32| {
            let min_height = hip_height - max_hip_offset;
            let max_foot_offset = (leg_length * leg_length - min_height * min_height).max(0.0).sqrt();
            // Never pull in closer than the input pose already is.
            let limit = initial_foot_offset.max(max_foot_offset);
            if target_foot_offset > limit {
                target + safe_normal(&target_to_hip) * (target_foot_offset - limit)
            } else {
                target
            }
        };

        max_target = adjust_by_orthogonal_limit(max_extension);
        desired_target = adjust_by_orthogonal_limit(desired_extension);
    }

    // Vertical line through the hip, started above it so the upper intersection is nearest.
    let line_origin = hip - approach_dir_cs * settings.trace.end_offset;
    let (max_location, _) = sphere_dist_to_line(&max_target, max_extension, &line_origin, approach_dir_cs);
    let (desired_location, _) =
        sphere_dist_to_line(&desired_target, desired_extension, &line_origin, approach_dir_cs);

    let min_extension = min_limb_extension(
        desired_extension,
        bones.limb_length,
        settings.plant.min_extension_ratio,
    );
    let min_location = desired_target + up * min_extension;

    PelvisOffsetRange {
        min: (min_location - hip).dot(&up) - input.distance_to_plant,
        desired: (desired_location - hip).dot(&up),
        max: (max_location - hip).dot(&up),
    }
}

/// Result of folding every leg's range into one offset.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct VerticalOffsetSolution {
    pub offset: f32,
    /// Highest per-leg compression floor.
    pub floor: f32,
    /// Lowest per-leg extension ceiling.
    pub ceiling: f32,
}

/// Blend the per-leg ranges into a single vertical pelvis offset.
///
/// Starts from the lowest desired offset (minus `epsilon`) and moves toward the average by the
/// harmonic blend of how far the average and the tightest ceiling are. The result is clamped to
/// `[floor, ceiling]`; when those cross, the ceiling wins unless the offset is below the floor.
pub fn solve_vertical_offset(ranges: &[PelvisOffsetRange], epsilon: f32) -> VerticalOffsetSolution {
    if ranges.is_empty() {
        return VerticalOffsetSolution::default();
    }

    let count = ranges.len() as f32;
    let mut desired_avg = 0.0;
    let mut desired_min = f32::MAX;
    let mut ceiling = f32::MAX;
    let mut floor = f32::MIN;
    for range in ranges {
        desired_avg += range.desired / count;
        desired_min = desired_min.min(range.desired);
        ceiling = ceiling.min(range.max);
        floor = floor.max(range.min);
    }

    let min_to_avg = desired_avg - desired_min;
    let min_to_max = ceiling - desired_min;
    desired_min -= epsilon;

    let divisor = min_to_avg + min_to_max;
    let offset = if divisor.abs() <= f32::EPSILON {
        desired_min
    } else {
        desired_min + (min_to_avg * min_to_max) / divisor
    };

    VerticalOffsetSolution {
        offset: clamp_lenient(offset, floor, ceiling),
        floor,
        ceiling,
    }
}

/// Target pelvis transform in component space for this frame's aligned feet.
pub fn solve_pelvis(
    settings: &FootPlacementSettings,
    approach_dir_cs: &Vec3,
    pelvis_input: &PelvisInputPose,
    legs: &[LegRuntimeState],
) -> Transform {
    let root_cs = &pelvis_input.root_cs;
    let mut rebalanced = pelvis_input.fk_cs;
    let mut offset_delta = Vec3::zeros();

    let bound_legs = legs.iter().filter(|leg| leg.bones.is_some());
    let count = bound_legs.clone().count();

    let weight = settings.pelvis.horizontal_rebalancing_weight;
    if weight != 0.0 && count > 0 {
        let average = bound_legs.clone().fold(Vec3::zeros(), |acc, leg| {
            let aligned_cs = root_cs.transform_point(&leg.aligned_foot_rs.translation);
            acc + (aligned_cs - leg.input_pose.foot_cs.translation) / count as f32
        });
        offset_delta = reject_axis(&average, approach_dir_cs) * weight;
        rebalanced.translation += offset_delta;
    }

    let ranges: Vec<PelvisOffsetRange> = bound_legs
        .filter_map(|leg| {
            let bones = leg.bones.as_ref()?;
            let target = root_cs.transform_point(&leg.aligned_foot_rs.translation);
            Some(find_pelvis_offset_range_for_limb(
                settings,
                approach_dir_cs,
                bones,
                &leg.input_pose,
                &pelvis_input.fk_cs,
                &rebalanced,
                &target,
            ))
        })
        .collect();

    let solution = solve_vertical_offset(&ranges, settings.pelvis.desired_offset_epsilon);
    trace!(
        "pelvis offset {:.4} in [{:.4}, {:.4}]",
        solution.offset, solution.floor, solution.ceiling
    );

    offset_delta -= approach_dir_cs * solution.offset;

    let mut pelvis_cs = pelvis_input.fk_cs;
    pelvis_cs.translation += offset_delta;
    pelvis_cs
}

/// Spring the root-space pelvis offset toward `target_rs`, clamped to the max offset first.
///
/// Clamping the target rather than the result means interpolation may briefly exceed the limit;
/// finalize handles any resulting leg over-extension.
pub fn update_pelvis_interpolation(
    settings: &PelvisSettings,
    pelvis: &mut PelvisRuntimeState,
    target_rs: &Transform,
    dt: f32,
) -> Transform {
    let input = &pelvis.input_pose;
    let pelvis_location_rs = input.root_cs.inverse_transform_point(&input.fk_cs.translation);

    let mut desired_offset = target_rs.translation - pelvis_location_rs;
    if desired_offset.norm_squared() > pelvis.max_offset_sqrd {
        desired_offset = clamp_to_max_size(&desired_offset, settings.max_offset);
    }

    let interp = &mut pelvis.interpolation;
    interp.translation_offset = spring_interp(
        interp.translation_offset,
        desired_offset,
        &mut interp.translation_spring,
        &settings.spring(),
        dt,
    );

    Transform::new(pelvis_location_rs + interp.translation_offset, target_rs.rotation)
}
