//! Per-leg ground alignment.
//!
//! Runs after the plant state machine: applies the lock, decays the unplant offset, keeps feet
//! apart, traces and smooths the ground plane, and finally aligns the foot to it.

use crate::constants::NEARLY_ZERO;
use crate::context::{EvaluationContext, SolveFrame};
use crate::ground::SweepRequest;
use crate::math::{
    Plane, Quat, Transform, Vec3, clamp_to_max_size, distance_to_plane_along_direction,
    find_between_normals, point_direction_plane_intersection, reject_axis, safe_normal,
    scale_rotation, swing_twist,
};
use crate::plant::determine_plant_type;
use crate::settings::{InterpolationSettings, PlantSettings, TraceSettings};
use crate::spring::{quat_spring_interp, spring_interp};
use crate::state::{LegInputPose, LegInterpolation, LegRuntimeState};

/// Result of a ground trace under one foot.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlantPlaneQuery {
    pub plane: Plane,
    pub impact_ws: Vec3,
    /// A walkable surface was hit; otherwise the plane is a fallback.
    pub found: bool,
}

/// Trace for the ground under `start_ws`.
///
/// A walkable hit yields its impact plane. A miss (or a non-walkable hit) falls back to a
/// horizontal plane at the character's floor location, directly under `start_ws`. With tracing
/// disabled the component's own location and up axis are used.
pub fn find_plant_plane(
    ctx: &EvaluationContext<'_>,
    trace: &TraceSettings,
    start_ws: &Vec3,
) -> PlantPlaneQuery {
    if !trace.enabled {
        let location = ctx.component_to_world.translation;
        return PlantPlaneQuery {
            plane: Plane::from_point_normal(location, ctx.component_to_world.up()),
            impact_ws: location,
            found: false,
        };
    }

    let approach = ctx.approach_dir_ws;
    let request = SweepRequest {
        start: start_ws + approach * trace.start_offset,
        end: start_ws + approach * trace.end_offset,
        radius: trace.sweep_radius,
        channel: trace.channel(),
        ignore_self: true,
    };

    match ctx.env.sweep(&request) {
        Some(hit) if ctx.env.is_walkable(&hit) => PlantPlaneQuery {
            plane: Plane::from_point_normal(hit.point, hit.normal),
            impact_ws: hit.point,
            found: true,
        },
        _ => {
            let floor = Plane::from_point_normal(ctx.floor_location(), -approach);
            let impact = point_direction_plane_intersection(start_ws, &approach, &floor);
            PlantPlaneQuery {
                plane: Plane::from_point_normal(impact, -approach),
                impact_ws: impact,
                found: false,
            }
        }
    }
}

/// Replace `plane_ws` (last frame's plant plane) with this frame's, smoothed.
///
/// While airborne the plane snaps to the input pose's ik-root instead of tracing.
pub fn update_planting_plane_interpolation(
    ctx: &EvaluationContext<'_>,
    frame: &SolveFrame<'_>,
    foot_ws: &Transform,
    last_aligned_foot_ws: &Transform,
    plane_ws: &mut Plane,
    interp: &mut LegInterpolation,
) {
    let settings = frame.settings;
    let trace = &settings.trace;
    let approach = ctx.approach_dir_ws;
    let up = ctx.up_ws();
    let last_plane = *plane_ws;

    let (found_ground, impact_ws) = if frame.character.is_on_ground {
        let query = find_plant_plane(ctx, trace, &foot_ws.translation);
        *plane_ws = query.plane;
        (query.found, query.impact_ws)
    } else {
        let source_ground = ctx
            .component_to_world
            .transform_point(&frame.pelvis_input.ik_root_cs.translation);
        *plane_ws = Plane::from_point_normal(source_ground, up);
        (false, source_ground)
    };

    if !settings.interpolation.enable_floor_interpolation || frame.is_first_update {
        return;
    }

    let foot = foot_ws.translation;
    let mut current = point_direction_plane_intersection(&foot, &approach, plane_ws);
    let last = point_direction_plane_intersection(&last_aligned_foot_ws.translation, &approach, &last_plane);
    let prev = point_direction_plane_intersection(&foot, &approach, &last_plane);

    let current_h = current.dot(&up);
    let last_h = last.dot(&up);
    let prev_h = prev.dot(&up);
    let mut adjusted_prev_h = if (last_h - current_h).abs() < (prev_h - current_h).abs() {
        last_h
    } else {
        prev_h
    };

    if frame.character.is_on_ground {
        // Follow the component's own vertical motion when it moves toward the new ground.
        let component_move = frame.character.component_move_delta_ws.dot(&up).abs();
        let ground_delta = current_h - adjusted_prev_h;
        if ground_delta > 0.0 {
            adjusted_prev_h += component_move.min(ground_delta);
        } else {
            adjusted_prev_h += (-component_move).max(ground_delta);
        }
    }

    let smoothed_h = spring_interp(
        adjusted_prev_h,
        current_h,
        &mut interp.ground_height_spring,
        &settings.interpolation.floor_linear(),
        ctx.delta_time,
    );
    current += up * (smoothed_h - current_h);

    if trace.max_ground_penetration >= 0.0 && found_ground {
        let ground = Plane::from_point_normal(impact_ws, plane_ws.normal);
        let distance = distance_to_plane_along_direction(&current, &ground, &approach);
        let penetration = -distance - trace.max_ground_penetration;
        if penetration > 0.0 {
            current -= approach * penetration;
        }
    }

    let normal_rotation = find_between_normals(&last_plane.normal, &plane_ws.normal);
    let smoothed_rotation = quat_spring_interp(
        Quat::identity(),
        normal_rotation,
        &mut interp.ground_rotation_spring,
        &settings.interpolation.floor_angular(),
        ctx.delta_time,
    );

    *plane_ws = Plane::from_point_normal(current, smoothed_rotation * last_plane.normal);
}

/// Move `foot_ws` onto `plane_ws` and align its rotation to the plane.
///
/// The input pose's height above the ik-root plane is preserved, as is its orientation relative
/// to that plane. Returns the twist about the plane normal separating the aligned input pose
/// from `foot_ws`.
pub fn align_plant_to_ground(
    ctx: &EvaluationContext<'_>,
    plane_ws: &Plane,
    input: &LegInputPose,
    ik_root_cs: &Transform,
    ankle_twist_reduction: f32,
    foot_ws: &mut Transform,
) -> Quat {
    let approach = ctx.approach_dir_ws;
    let input_foot_ws = ctx.component_to_world * input.foot_cs;

    let ik_root_ws = ctx.component_to_world * *ik_root_cs;
    let ik_root_plane = Plane::from_point_normal(ik_root_ws.translation, ik_root_ws.up());
    let height_above_root =
        distance_to_plane_along_direction(&input_foot_ws.translation, &ik_root_plane, &approach);

    let on_plane = point_direction_plane_intersection(&foot_ws.translation, &approach, plane_ws);
    let location = on_plane - approach * height_above_root;

    let plane_delta = find_between_normals(&ik_root_plane.normal, &plane_ws.normal);
    let input_aligned = plane_delta * input_foot_ws.rotation;

    // Twist around the plane normal, measured in the aligned foot's frame.
    let unaligned_delta = input_aligned.inverse() * foot_ws.rotation;
    let normal_foot_space = input_aligned.inverse_transform_vector(&plane_ws.normal);
    let (_, twist_correction) = swing_twist(&unaligned_delta, &normal_foot_space);
    let aligned = input_aligned * twist_correction;

    // Keep part of the ankle roll about the foot-to-ball axis.
    let aligned_to_unaligned = aligned.inverse() * foot_ws.rotation;
    let foot_to_ball_dir = safe_normal(&input.foot_to_ball.translation);
    let (_, ankle_twist) = swing_twist(&aligned_to_unaligned, &foot_to_ball_dir);
    let rotation = aligned * scale_rotation(&ankle_twist, ankle_twist_reduction);

    *foot_ws = Transform::new(location, rotation);
    twist_correction
}

/// Decay the unplant offset toward identity.
pub fn update_plant_offset_interpolation(
    interpolation: &InterpolationSettings,
    dt: f32,
    interp: &mut LegInterpolation,
) -> Transform {
    let translation = spring_interp(
        interp.unaligned_foot_offset.translation,
        Vec3::zeros(),
        &mut interp.plant_offset_translation_spring,
        &interpolation.unplant_linear(),
        dt,
    );
    let rotation = quat_spring_interp(
        interp.unaligned_foot_offset.rotation,
        Quat::identity(),
        &mut interp.plant_offset_rotation_spring,
        &interpolation.unplant_angular(),
        dt,
    );
    Transform::new(translation, rotation)
}

/// With equal unplant/replant limits, clamp the offset to the unplant limits so the foot slides.
pub fn clamp_unaligned_offset(plant: &PlantSettings, offset: &mut Transform) {
    if plant.replant_radius_ratio >= 1.0 {
        offset.translation = clamp_to_max_size(&offset.translation, plant.unplant_radius);
    }

    if plant.replant_angle_ratio >= 1.0 {
        let max_angle = plant.unplant_angle.to_radians();
        if let Some((axis, angle)) = offset.rotation.axis_angle() {
            if angle > max_angle {
                offset.rotation = Quat::from_axis_angle(&axis, max_angle);
            }
        }
    }
}

/// Full per-leg alignment for one evaluation.
pub fn process_foot_alignment(
    ctx: &EvaluationContext<'_>,
    frame: &SolveFrame<'_>,
    leg: &mut LegRuntimeState,
) {
    let settings = frame.settings;
    let plant_settings = &settings.plant;
    let root_cs = *frame.root_cs();
    let c2w = ctx.component_to_world;
    let dt = ctx.delta_time;
    let input = leg.input_pose;

    // Carry last frame's result into this frame's world space.
    if plant_settings.reconstruct_world_plant_from_velocity {
        let velocity_step = frame.character.velocity_ws * dt;
        leg.aligned_foot_ws = c2w * root_cs * leg.aligned_foot_rs;
        leg.aligned_foot_ws.translation -= velocity_step;
        leg.unaligned_foot_ws = c2w * root_cs * leg.unaligned_foot_rs;
        leg.unaligned_foot_ws.translation -= velocity_step;
    } else {
        leg.aligned_foot_ws.translation -= ctx.base_translation_delta;
        leg.unaligned_foot_ws.translation -= ctx.base_translation_delta;
    }

    let input_foot_ws = c2w * input.foot_cs;
    let last_aligned_ws = leg.aligned_foot_ws;
    let last_unaligned_ws = leg.unaligned_foot_ws;
    let input_foot_rs = input.foot_cs.relative_to(&root_cs);

    leg.plant.last_plant_type = leg.plant.plant_type;
    determine_plant_type(
        plant_settings,
        &frame.plant_runtime,
        &input_foot_ws,
        &last_aligned_ws,
        &ctx.approach_dir_ws,
        &input,
        &mut leg.plant,
    );

    let interp = &mut leg.interpolation;
    if leg.plant.is_planted() {
        let input_ball_ws = c2w * input.ball_cs;
        if let Some(planted_ws) = plant_settings.lock_type.planted_transform(
            &input,
            &input_foot_ws,
            &input_ball_ws,
            &last_unaligned_ws,
        ) {
            let planted_cs = c2w.inverse() * planted_ws;
            let mut planted_rs = planted_cs.relative_to(&root_cs);

            // The lock is ground aligned; keep the input pose's own height instead.
            let input_height_plane =
                Plane::from_point_normal(input_foot_rs.translation, frame.approach_dir_rs(ctx));
            planted_rs.translation = input_height_plane.project(&planted_rs.translation);

            interp.unaligned_foot_offset = input_foot_rs.delta_to(&planted_rs);
        }
        interp.plant_offset_translation_spring.reset();
        interp.plant_offset_rotation_spring.reset();
        leg.plant.time_since_fully_unaligned = 0.0;
    } else {
        interp.unaligned_foot_offset =
            update_plant_offset_interpolation(&settings.interpolation, dt, interp);
        if leg.plant.time_since_fully_unaligned > 0.0 || input.alignment_alpha.abs() <= NEARLY_ZERO {
            leg.plant.time_since_fully_unaligned += dt;
        }
    }

    clamp_unaligned_offset(plant_settings, &mut interp.unaligned_foot_offset);

    let mut foot_unaligned_rs = interp.unaligned_foot_offset * input_foot_rs;

    if plant_settings.separating_distance > 0.0 {
        apply_foot_separation(ctx, frame, leg.plant.is_planted(), &input_foot_rs, interp, &mut foot_unaligned_rs);
    }

    // Lock alpha 0 hands the foot back to the input pose.
    let blended_rs = Transform::blend(&input_foot_rs, &foot_unaligned_rs, input.lock_alpha);
    leg.unaligned_foot_rs = blended_rs;
    leg.unaligned_foot_ws = c2w * root_cs * blended_rs;

    let mut plane_ws = leg.plant.plant_plane_ws(&root_cs, &c2w);
    update_planting_plane_interpolation(
        ctx,
        frame,
        &leg.unaligned_foot_ws,
        &last_aligned_ws,
        &mut plane_ws,
        &mut leg.interpolation,
    );
    leg.plant.plant_plane_rs = plane_ws.transform_by(&(c2w * root_cs).inverse());

    let mut aligned_ws = leg.unaligned_foot_ws;
    leg.plant.twist_correction = align_plant_to_ground(
        ctx,
        &plane_ws,
        &input,
        &frame.pelvis_input.ik_root_cs,
        plant_settings.ankle_twist_reduction,
        &mut aligned_ws,
    );

    let aligned_cs = c2w.inverse() * aligned_ws;
    leg.aligned_foot_rs = aligned_cs.relative_to(&root_cs);
    leg.aligned_foot_ws = c2w * aligned_cs;
}

/// Push an unplanted foot out of a plane offset from the feet midpoint, in root space.
fn apply_foot_separation(
    ctx: &EvaluationContext<'_>,
    frame: &SolveFrame<'_>,
    is_planted: bool,
    input_foot_rs: &Transform,
    interp: &mut LegInterpolation,
    foot_unaligned_rs: &mut Transform,
) {
    if is_planted {
        interp.separating_plane_offset = Vec3::zeros();
        interp.separating_plane_offset_spring.reset();
        return;
    }

    let settings = frame.settings;
    let approach_rs = frame.approach_dir_rs(ctx);
    let midpoint_rs = frame
        .root_cs()
        .inverse_transform_point(&frame.pelvis_input.foot_midpoint_cs);
    let normal = safe_normal(&reject_axis(&(input_foot_rs.translation - midpoint_rs), &approach_rs));
    if normal == Vec3::zeros() {
        return;
    }

    let center = midpoint_rs + normal * settings.plant.separating_distance;
    let separating_plane = Plane::from_point_normal(center, normal);
    let distance = distance_to_plane_along_direction(
        &foot_unaligned_rs.translation,
        &separating_plane,
        &-normal,
    );

    let target = if distance < 0.0 {
        -normal * distance
    } else {
        Vec3::zeros()
    };

    interp.separating_plane_offset = if settings.interpolation.enable_separation_interpolation {
        spring_interp(
            interp.separating_plane_offset,
            target,
            &mut interp.separating_plane_offset_spring,
            &settings.interpolation.floor_linear(),
            ctx.delta_time,
        )
    } else {
        target
    };
    foot_unaligned_rs.translation += interp.separating_plane_offset;
}
