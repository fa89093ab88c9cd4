//! The foot placement solver.
//!
//! [`FootPlacementSolver`] owns every piece of per-character runtime state and drives one solve per
//! evaluation:
//!
//! 1. teleport check and input gather (pelvis, then each leg),
//! 2. character state and capsule movement compensation,
//! 3. per-leg plant state machine and ground alignment,
//! 4. pelvis solve, interpolation and disable blend,
//! 5. per-leg finalize.
//!
//! Output is one component-space transform for the pelvis, one per IK foot and optionally the root,
//! sorted by bone index.

use log::{debug, warn};

use crate::alignment::process_foot_alignment;
use crate::constants::{MIN_COMPENSATED_MOVE, MIN_SPRING_DT, PARALLEL_EPS};
use crate::context::{EvaluationContext, SolveFrame};
use crate::error::{FootPlacementError, Result};
use crate::finalize::finalize_foot_alignment;
use crate::ground::CharacterEnvironment;
use crate::math::{
    Plane, Quat, Transform, Vec3, distance_to_plane_along_direction, find_between_normals,
    point_direction_plane_intersection,
};
use crate::pelvis::{solve_pelvis, update_pelvis_interpolation};
use crate::plant::{PlantType, alignment_alpha};
use crate::pose::{BoneIndex, BoneTransform, PoseSource, ROOT_BONE, Skeleton};
use crate::settings::{
    ActorMovementCompensationMode, FootPlacementSettings, LegDefinition, PlantRuntimeSettings,
    PlantSpeedMode,
};
use crate::spring::{SpringSettings, quat_spring_interp};
use crate::state::{
    CharacterRuntimeState, LegBones, LegRuntimeState, PelvisBones, PelvisInputPose,
    PelvisRuntimeState,
};

pub struct FootPlacementSolver {
    settings: FootPlacementSettings,
    legs: Vec<LegRuntimeState>,
    pelvis: PelvisRuntimeState,
    character: CharacterRuntimeState,
    /// Unit "down" in component space.
    approach_dir_cs: Vec3,
    is_first_update: bool,
    is_bound: bool,
    /// Time accumulated by `update` since the last evaluation.
    cached_delta_time: f32,
    last_update_counter: Option<u64>,
}

impl FootPlacementSolver {
    pub fn new(settings: FootPlacementSettings) -> Result<Self> {
        settings.validate()?;
        let legs = vec![LegRuntimeState::default(); settings.legs.len()];
        Ok(Self {
            settings,
            legs,
            pelvis: PelvisRuntimeState::default(),
            character: CharacterRuntimeState::default(),
            approach_dir_cs: -Vec3::y(),
            is_first_update: true,
            is_bound: false,
            cached_delta_time: 0.0,
            last_update_counter: None,
        })
    }

    /// Resolve every configured bone against `skeleton`.
    ///
    /// On failure the solver stays unbound and evaluates to an empty output until a later bind
    /// succeeds.
    pub fn bind(&mut self, skeleton: &Skeleton) -> Result<()> {
        self.is_bound = false;
        self.pelvis.bones = None;
        for leg in &mut self.legs {
            leg.bones = None;
        }

        for (leg, definition) in self.legs.iter_mut().zip(&self.settings.legs) {
            leg.bones = Some(resolve_leg_bones(skeleton, definition)?);
        }

        let fk_index = resolve_logged(skeleton, &self.settings.pelvis_bone)?;
        let ik_root_index = resolve_logged(skeleton, &self.settings.ik_foot_root_bone)?;
        self.pelvis.bones = Some(PelvisBones {
            fk_index,
            ik_root_index,
        });

        self.is_bound = true;
        self.reset();
        Ok(())
    }

    /// Drop all interpolation state; the next evaluation starts from the input pose.
    pub fn reset(&mut self) {
        debug!("foot placement reset");
        for leg in &mut self.legs {
            leg.reset();
        }
        self.pelvis.reset();
        self.is_first_update = true;
    }

    /// Accumulate `delta_time` ahead of the next evaluation.
    ///
    /// `update_counter` is the caller's frame counter. Skipping a frame means this solver was not
    /// updated continuously, so its interpolation state is stale and is reset.
    pub fn update(&mut self, update_counter: u64, delta_time: f32) {
        if let Some(last) = self.last_update_counter {
            let in_sync = update_counter == last || update_counter == last.wrapping_add(1);
            if !in_sync && !self.is_first_update {
                debug!("update counter jumped from {last} to {update_counter}");
                self.reset();
            }
        }
        self.last_update_counter = Some(update_counter);
        self.cached_delta_time += delta_time;
    }

    #[inline]
    pub fn is_valid_to_evaluate(&self) -> bool {
        self.is_bound
            && self.pelvis.bones.is_some()
            && self.legs.iter().all(|leg| leg.bones.is_some())
    }

    pub fn settings(&self) -> &FootPlacementSettings {
        &self.settings
    }

    pub fn legs(&self) -> &[LegRuntimeState] {
        &self.legs
    }

    pub fn pelvis(&self) -> &PelvisRuntimeState {
        &self.pelvis
    }

    pub fn character(&self) -> &CharacterRuntimeState {
        &self.character
    }

    pub fn is_first_update(&self) -> bool {
        self.is_first_update
    }

    /// Solve one frame.
    ///
    /// Returns component-space transforms for the pelvis, each IK foot and (with root smoothing)
    /// the root bone, sorted by bone index. An unbound solver returns nothing.
    pub fn evaluate(
        &mut self,
        pose: &dyn PoseSource,
        env: &dyn CharacterEnvironment,
    ) -> Result<Vec<BoneTransform>> {
        if !self.is_valid_to_evaluate() {
            return Ok(Vec::new());
        }
        let Some(pelvis_bones) = self.pelvis.bones else {
            return Ok(Vec::new());
        };
        // A pose missing a bound bone is rejected before any state changes.
        self.check_pose(pose, &pelvis_bones)?;

        let ctx = EvaluationContext::new(pose, env, self.approach_dir_cs, self.cached_delta_time);
        match self.solve(&ctx, &pelvis_bones) {
            Ok(output) => {
                self.cached_delta_time = 0.0;
                self.is_first_update = false;
                Ok(output)
            }
            Err(err) => {
                // Springs may hold non-finite state; start over from the next input pose.
                self.reset();
                Err(err)
            }
        }
    }

    fn check_pose(&self, pose: &dyn PoseSource, pelvis_bones: &PelvisBones) -> Result<()> {
        let leg_bones = self
            .legs
            .iter()
            .filter_map(|leg| leg.bones)
            .flat_map(|b| [b.fk_index, b.ik_index, b.ball_index, b.hip_index]);
        [ROOT_BONE, pelvis_bones.fk_index, pelvis_bones.ik_root_index]
            .into_iter()
            .chain(leg_bones)
            .try_for_each(|bone| bone_transform(pose, bone).map(|_| ()))
    }

    fn solve(
        &mut self,
        ctx: &EvaluationContext<'_>,
        pelvis_bones: &PelvisBones,
    ) -> Result<Vec<BoneTransform>> {
        let pose = ctx.pose;
        self.check_teleport(ctx)?;
        self.gather_pelvis(ctx, pelvis_bones)?;

        let plant_runtime = PlantRuntimeSettings::from_settings(&self.settings.plant);
        for (leg, definition) in self.legs.iter_mut().zip(&self.settings.legs) {
            gather_leg(
                ctx,
                &self.settings,
                definition,
                &self.pelvis.input_pose,
                self.is_first_update,
                leg,
            )?;
        }

        self.process_character_state(ctx);
        self.pelvis.input_pose.foot_midpoint_cs = foot_midpoint(&self.legs);

        let frame = SolveFrame {
            settings: &self.settings,
            plant_runtime,
            pelvis_input: &self.pelvis.input_pose,
            character: &self.character,
            is_first_update: self.is_first_update,
        };
        for leg in self.legs.iter_mut() {
            process_foot_alignment(ctx, &frame, leg);
        }

        let mut pelvis_cs = solve_pelvis(
            &self.settings,
            &self.approach_dir_cs,
            &self.pelvis.input_pose,
            &self.legs,
        );

        let root_cs = self.pelvis.input_pose.root_cs;
        if self.settings.pelvis.enable_interpolation {
            let target_rs = pelvis_cs.relative_to(&root_cs);
            let pelvis_rs = update_pelvis_interpolation(
                &self.settings.pelvis,
                &mut self.pelvis,
                &target_rs,
                ctx.delta_time,
            );
            pelvis_cs = root_cs * pelvis_rs;
        }

        let fk_pelvis_cs = self.pelvis.input_pose.fk_cs;
        self.pelvis.disable_pelvis = pose.curve_or(&self.settings.pelvis.disable_pelvis_curve_name, 0.0);
        pelvis_cs = Transform::blend(&pelvis_cs, &fk_pelvis_cs, self.pelvis.disable_pelvis);

        if !pelvis_cs.is_finite() {
            warn!("non-finite pelvis transform for bone {}", pelvis_bones.fk_index);
            return Err(FootPlacementError::non_finite_transform(pelvis_bones.fk_index));
        }

        let mut output = Vec::with_capacity(self.legs.len() + 2);
        output.push(BoneTransform::new(pelvis_bones.fk_index, pelvis_cs));

        if self.settings.interpolation.smooth_root_bone {
            let mut root = root_cs;
            root.translation += pelvis_cs.translation - fk_pelvis_cs.translation;
            output.push(BoneTransform::new(ROOT_BONE, root));
        }

        for leg in self.legs.iter_mut() {
            let Some(bones) = leg.bones else {
                continue;
            };
            output.push(finalize_foot_alignment(
                &self.settings.plant,
                &self.approach_dir_cs,
                &bones,
                leg,
                &self.pelvis,
                &pelvis_cs,
            )?);
        }

        output.sort_by_key(|t| t.bone);
        Ok(output)
    }

    /// Reset when the root moved further than the teleport threshold since the last evaluation.
    fn check_teleport(&mut self, ctx: &EvaluationContext<'_>) -> Result<()> {
        if self.is_first_update {
            return Ok(());
        }

        let root_cs = bone_transform(ctx.pose, ROOT_BONE)?;
        let root_ws = ctx.component_to_world * root_cs;
        let last_root_ws = self.character.component_transform_ws * self.pelvis.input_pose.root_cs;

        let threshold = self.settings.teleport_distance_threshold;
        if threshold <= 0.0 {
            return Ok(());
        }
        let moved_sqrd = (root_ws.translation - last_root_ws.translation).norm_squared();
        if moved_sqrd > threshold * threshold {
            debug!("teleport detected: root moved {:.3}m", moved_sqrd.sqrt());
            self.reset();
        }
        Ok(())
    }

    fn gather_pelvis(&mut self, ctx: &EvaluationContext<'_>, bones: &PelvisBones) -> Result<()> {
        self.pelvis.input_pose = PelvisInputPose {
            fk_cs: bone_transform(ctx.pose, bones.fk_index)?,
            ik_root_cs: bone_transform(ctx.pose, bones.ik_root_index)?,
            root_cs: bone_transform(ctx.pose, ROOT_BONE)?,
            foot_midpoint_cs: self.pelvis.input_pose.foot_midpoint_cs,
        };
        let max_offset = self.settings.pelvis.max_offset;
        self.pelvis.max_offset_sqrd = max_offset * max_offset;
        Ok(())
    }

    /// Track the component's motion and absorb sudden vertical capsule moves.
    ///
    /// A compensated move is subtracted from the pelvis interpolator and every plant plane so the
    /// springs ease out of it rather than snapping with the capsule.
    fn process_character_state(&mut self, ctx: &EvaluationContext<'_>) {
        let up_ws = ctx.up_ws();
        let location_ws = ctx.component_to_world.translation;
        let character = &mut self.character;

        let last_location_ws = if self.is_first_update {
            character.smooth_capsule_ground_normal_ws = up_ws;
            character.smooth_capsule_ground_normal_spring.reset();
            location_ws
        } else {
            character.component_transform_ws.translation
        };
        character.component_transform_ws = ctx.component_to_world;

        let was_on_ground = character.is_on_ground;
        character.is_on_ground = ctx.env.is_on_ground();
        character.component_move_delta_ws = Vec3::zeros();

        let pelvis_settings = &self.settings.pelvis;
        let on_ground = !pelvis_settings.disable_pelvis_offset_in_air
            || (character.is_on_ground && was_on_ground);

        let adjusted_last_location_ws = if on_ground {
            match pelvis_settings.actor_movement_compensation_mode {
                ActorMovementCompensationMode::None => None,
                ActorMovementCompensationMode::SuddenMotionOnly => {
                    let slope_delta = find_between_normals(
                        &character.smooth_capsule_ground_normal_ws,
                        &ctx.floor_normal(),
                    );
                    let slope_delta = quat_spring_interp(
                        Quat::identity(),
                        slope_delta,
                        &mut character.smooth_capsule_ground_normal_spring,
                        &SpringSettings::new(
                            self.settings.interpolation.floor_angular_stiffness,
                            1.0,
                        ),
                        ctx.delta_time,
                    );
                    let smooth_normal = slope_delta * character.smooth_capsule_ground_normal_ws;
                    character.smooth_capsule_ground_normal_ws = smooth_normal;

                    if ctx.approach_dir_ws.dot(&smooth_normal).abs() > PARALLEL_EPS {
                        Some(point_direction_plane_intersection(
                            &location_ws,
                            &ctx.approach_dir_ws,
                            &Plane::from_point_normal(last_location_ws, smooth_normal),
                        ))
                    } else {
                        Some(location_ws)
                    }
                }
                ActorMovementCompensationMode::WorldSpace => Some(last_location_ws),
            }
        } else {
            None
        };

        if let Some(adjusted_last_location_ws) = adjusted_last_location_ws {
            // Vertical motion only.
            let move_ws = location_ws - adjusted_last_location_ws - ctx.base_translation_delta;
            let move_ws = up_ws * move_ws.dot(&up_ws);
            character.component_move_delta_ws -= move_ws;

            if move_ws.norm() > MIN_COMPENSATED_MOVE {
                let move_cs = ctx.component_to_world.inverse_transform_vector(&move_ws);
                self.pelvis.interpolation.translation_offset -= move_cs;
                for leg in &mut self.legs {
                    leg.plant.plant_plane_rs = leg.plant.plant_plane_rs.translate_by(&-move_cs);
                }
            }
        }

        character.velocity_ws = ctx.env.velocity();
        character.component_move_delta_ws += location_ws - last_location_ws;
    }
}

fn resolve_logged(skeleton: &Skeleton, name: &str) -> Result<BoneIndex> {
    skeleton.resolve(name).inspect_err(|_| {
        warn!("foot placement bone '{name}' not found in skeleton");
    })
}

fn resolve_leg_bones(skeleton: &Skeleton, definition: &LegDefinition) -> Result<LegBones> {
    let fk_index = resolve_logged(skeleton, &definition.fk_foot_bone)?;
    let ik_index = resolve_logged(skeleton, &definition.ik_foot_bone)?;
    let ball_index = resolve_logged(skeleton, &definition.ball_bone)?;

    let (hip_index, limb_length) = skeleton.chain_root(fk_index, definition.num_bones_in_limb.max(1));
    let foot_length = skeleton
        .ref_pose_local(ball_index)
        .map_or(0.0, |local| local.translation.norm());

    Ok(LegBones {
        fk_index,
        ik_index,
        ball_index,
        hip_index,
        limb_length,
        foot_length,
    })
}

fn bone_transform(pose: &dyn PoseSource, bone: BoneIndex) -> Result<Transform> {
    pose.component_transform(bone)
        .ok_or(FootPlacementError::missing_bone_transform(bone))
}

/// Read one leg's input pose and derived per-frame values.
fn gather_leg(
    ctx: &EvaluationContext<'_>,
    settings: &FootPlacementSettings,
    definition: &LegDefinition,
    pelvis_input: &PelvisInputPose,
    is_first_update: bool,
    leg: &mut LegRuntimeState,
) -> Result<()> {
    let Some(bones) = leg.bones else {
        return Ok(());
    };
    let mut last_ball_cs = leg.input_pose.ball_cs.translation;

    let input = &mut leg.input_pose;
    input.foot_fk_cs = bone_transform(ctx.pose, bones.fk_index)?;
    let fk_ball_cs = bone_transform(ctx.pose, bones.ball_index)?;
    input.foot_cs = bone_transform(ctx.pose, bones.ik_index)?;
    input.hip_cs = bone_transform(ctx.pose, bones.hip_index)?;

    input.ball_to_foot = input.foot_fk_cs.relative_to(&fk_ball_cs);
    input.foot_to_ball = fk_ball_cs.relative_to(&input.foot_fk_cs);
    // The IK foot need not sit on the FK foot; keep the ball at the same offset from it.
    input.ball_cs = input.foot_cs * input.foot_to_ball;

    let root_cs = &pelvis_input.root_cs;
    if is_first_update {
        leg.aligned_foot_rs = input.foot_cs.relative_to(root_cs);
        leg.aligned_foot_ws = ctx.component_to_world * input.foot_cs;
        leg.unaligned_foot_rs = leg.aligned_foot_rs;
        leg.unaligned_foot_ws = leg.aligned_foot_ws;

        let ik_root_rs = root_cs.inverse_transform_point(&pelvis_input.ik_root_cs.translation);
        let up_rs = root_cs.inverse_transform_vector(&ctx.up_cs());
        leg.plant.plant_plane_rs = Plane::from_point_normal(ik_root_rs, up_rs);
        leg.plant.plant_type = PlantType::Unplanted;
        leg.plant.last_plant_type = PlantType::Unplanted;
        last_ball_cs = input.ball_cs.translation;
    }

    let plant_settings = &settings.plant;
    input.speed = match settings.plant_speed_mode {
        PlantSpeedMode::Graph => {
            if ctx.delta_time > MIN_SPRING_DT {
                let root_motion = root_cs.rotation * ctx.root_motion_delta.translation;
                let ball_delta = input.ball_cs.translation - last_ball_cs + root_motion;
                ball_delta.norm() / ctx.delta_time
            } else {
                input.speed
            }
        }
        // A missing curve reads as moving, so the foot stays unplanted.
        PlantSpeedMode::Manual => ctx
            .pose
            .curve_or(&definition.speed_curve_name, plant_settings.speed_threshold),
    };

    input.disable_leg = ctx.pose.curve_or(&definition.disable_leg_curve_name, 0.0);
    input.lock_alpha = 1.0 - ctx.pose.curve_or(&definition.disable_lock_curve_name, 0.0);

    let ik_ground_cs = Plane::from_point_normal(
        pelvis_input.ik_root_cs.translation,
        pelvis_input.ik_root_cs.up(),
    );
    let foot_distance = distance_to_plane_along_direction(
        &input.foot_cs.translation,
        &ik_ground_cs,
        &ctx.approach_dir_cs,
    );
    let ball_distance = distance_to_plane_along_direction(
        &input.ball_cs.translation,
        &ik_ground_cs,
        &ctx.approach_dir_cs,
    );
    input.distance_to_plant = foot_distance.min(ball_distance);
    input.alignment_alpha = alignment_alpha(plant_settings, input.speed);

    Ok(())
}

/// Average input IK foot location.
fn foot_midpoint(legs: &[LegRuntimeState]) -> Vec3 {
    if legs.is_empty() {
        return Vec3::zeros();
    }
    let count = legs.len() as f32;
    legs.iter().fold(Vec3::zeros(), |acc, leg| {
        acc + leg.input_pose.foot_cs.translation / count
    })
}
