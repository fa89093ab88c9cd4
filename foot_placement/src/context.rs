use crate::ground::CharacterEnvironment;
use crate::math::{Transform, Vec3};
use crate::pose::PoseSource;
use crate::settings::{FootPlacementSettings, PlantRuntimeSettings};
use crate::state::{CharacterRuntimeState, PelvisInputPose};

/// Per-evaluation inputs, borrowed for the duration of one solve.
pub struct EvaluationContext<'a> {
    pub pose: &'a dyn PoseSource,
    pub env: &'a dyn CharacterEnvironment,
    pub component_to_world: Transform,
    pub root_motion_delta: Transform,
    pub base_translation_delta: Vec3,
    pub delta_time: f32,
    /// Unit "down" in component space.
    pub approach_dir_cs: Vec3,
    /// Unit "down" in world space.
    pub approach_dir_ws: Vec3,
}

impl<'a> EvaluationContext<'a> {
    pub fn new(
        pose: &'a dyn PoseSource,
        env: &'a dyn CharacterEnvironment,
        approach_dir_cs: Vec3,
        delta_time: f32,
    ) -> Self {
        let component_to_world = env.component_to_world();
        let approach_dir_ws = component_to_world.transform_vector(&approach_dir_cs);
        Self {
            pose,
            env,
            component_to_world,
            root_motion_delta: pose.root_motion_delta(),
            base_translation_delta: env.base_translation_delta(),
            delta_time,
            approach_dir_cs,
            approach_dir_ws,
        }
    }

    /// Floor normal under the character, or world up when there is no floor.
    pub fn floor_normal(&self) -> Vec3 {
        self.env
            .current_floor()
            .map(|hit| hit.normal)
            .unwrap_or(-self.approach_dir_ws)
    }

    /// Floor contact under the character, or the component location when there is no floor.
    pub fn floor_location(&self) -> Vec3 {
        self.env
            .current_floor()
            .map(|hit| hit.point)
            .unwrap_or(self.component_to_world.translation)
    }

    #[inline]
    pub fn up_ws(&self) -> Vec3 {
        -self.approach_dir_ws
    }

    #[inline]
    pub fn up_cs(&self) -> Vec3 {
        -self.approach_dir_cs
    }
}

/// Solver-owned values every leg reads during one evaluation.
pub struct SolveFrame<'a> {
    pub settings: &'a FootPlacementSettings,
    pub plant_runtime: PlantRuntimeSettings,
    pub pelvis_input: &'a PelvisInputPose,
    pub character: &'a CharacterRuntimeState,
    pub is_first_update: bool,
}

impl SolveFrame<'_> {
    /// Root bone in component space.
    #[inline]
    pub fn root_cs(&self) -> &Transform {
        &self.pelvis_input.root_cs
    }

    /// Approach direction expressed in root space.
    #[inline]
    pub fn approach_dir_rs(&self, ctx: &EvaluationContext<'_>) -> Vec3 {
        self.root_cs().inverse_transform_vector(&ctx.approach_dir_cs)
    }
}
