//! Solver configuration.
//!
//! Units are meters, seconds and degrees. Defaults are tuned for a human-sized character.

use crate::constants::DEFAULT_DESIRED_OFFSET_EPSILON;
use crate::error::{FootPlacementError, Result};
use crate::ground::TraceChannel;
use crate::spring::SpringSettings;

/// How a planted foot is held in place.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LockType {
    /// Feet are never planted; ground alignment still runs.
    Unlocked,
    /// Keep the ball of the foot pinned, let the heel rotate with the input pose.
    #[default]
    PivotAroundBall,
    /// Keep the ankle pinned, rotation follows the input pose.
    PivotAroundAnkle,
    /// Keep both location and rotation of the last plant.
    LockRotation,
}

/// How sudden capsule motion is absorbed by the pelvis and plant planes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ActorMovementCompensationMode {
    /// Follow the component; no compensation.
    None,
    /// Compensate vertical moves not explained by the smoothed floor slope (steps, ledges).
    #[default]
    SuddenMotionOnly,
    /// Compensate every vertical component move.
    WorldSpace,
}

/// Where per-leg speed comes from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PlantSpeedMode {
    /// Read the leg's speed curve.
    #[default]
    Manual,
    /// Derive speed from the ball bone's motion plus root motion.
    Graph,
}

/// Bones and curves that make up one leg.
#[derive(Clone, Debug, PartialEq)]
pub struct LegDefinition {
    pub fk_foot_bone: String,
    pub ik_foot_bone: String,
    pub ball_bone: String,
    /// Bones between the foot and the hip (thigh + calf = 2).
    pub num_bones_in_limb: usize,
    pub speed_curve_name: String,
    pub disable_lock_curve_name: String,
    pub disable_leg_curve_name: String,
}

impl LegDefinition {
    pub fn new(
        fk_foot_bone: impl Into<String>,
        ik_foot_bone: impl Into<String>,
        ball_bone: impl Into<String>,
    ) -> Self {
        Self {
            fk_foot_bone: fk_foot_bone.into(),
            ik_foot_bone: ik_foot_bone.into(),
            ball_bone: ball_bone.into(),
            num_bones_in_limb: 2,
            speed_curve_name: String::new(),
            disable_lock_curve_name: String::new(),
            disable_leg_curve_name: String::new(),
        }
    }

    pub fn with_curves(
        mut self,
        speed: impl Into<String>,
        disable_lock: impl Into<String>,
        disable_leg: impl Into<String>,
    ) -> Self {
        self.speed_curve_name = speed.into();
        self.disable_lock_curve_name = disable_lock.into();
        self.disable_leg_curve_name = disable_leg.into();
        self
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PlantSettings {
    pub lock_type: LockType,
    /// Max height of the input foot above the ik-root plane for it to plant.
    pub distance_to_ground: f32,
    /// Below this speed (m/s) a foot wants to plant.
    pub speed_threshold: f32,
    /// Above this speed the foot is fully unaligned from its plant.
    pub unalignment_speed_threshold: f32,
    /// Horizontal drift allowed before a planted foot unplants.
    pub unplant_radius: f32,
    /// Replant radius as a fraction of the unplant radius. `>= 1` clamps and slides instead.
    pub replant_radius_ratio: f32,
    /// Twist (degrees) allowed before a planted foot unplants.
    pub unplant_angle: f32,
    /// Replant angle as a fraction of the unplant angle. `>= 1` clamps and slides instead.
    pub replant_angle_ratio: f32,
    pub max_extension_ratio: f32,
    pub min_extension_ratio: f32,
    /// Minimum horizontal distance kept between a foot and the feet midpoint. 0 disables.
    pub separating_distance: f32,
    pub ankle_twist_reduction: f32,
    pub adjust_heel_before_planting: bool,
    /// Carry last frame's plant into world space using character velocity instead of the
    /// base translation delta.
    pub reconstruct_world_plant_from_velocity: bool,
}

impl Default for PlantSettings {
    fn default() -> Self {
        Self {
            lock_type: LockType::PivotAroundBall,
            distance_to_ground: 0.10,
            speed_threshold: 0.9,
            unalignment_speed_threshold: 2.0,
            unplant_radius: 0.03,
            replant_radius_ratio: 0.9,
            unplant_angle: 15.0,
            replant_angle_ratio: 0.9,
            max_extension_ratio: 0.5,
            min_extension_ratio: 0.2,
            separating_distance: 0.0,
            ankle_twist_reduction: 0.75,
            adjust_heel_before_planting: false,
            reconstruct_world_plant_from_velocity: true,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PelvisSettings {
    pub linear_stiffness: f32,
    pub linear_damping: f32,
    /// Weight of the horizontal pull toward where the feet ended up. 0 disables.
    pub horizontal_rebalancing_weight: f32,
    /// Max horizontal hip-to-foot offset the pelvis solve may exploit.
    pub max_offset_horizontal: f32,
    /// Fraction of the foot length the heel may lift before the hip drops.
    pub heel_lift_ratio: f32,
    /// Max pelvis translation offset from the input pose.
    pub max_offset: f32,
    pub actor_movement_compensation_mode: ActorMovementCompensationMode,
    pub enable_interpolation: bool,
    pub disable_pelvis_offset_in_air: bool,
    pub disable_pelvis_curve_name: String,
    /// Bias subtracted from the lowest desired offset; tuned, not derived.
    pub desired_offset_epsilon: f32,
}

impl Default for PelvisSettings {
    fn default() -> Self {
        Self {
            linear_stiffness: 350.0,
            linear_damping: 1.0,
            horizontal_rebalancing_weight: 0.3,
            max_offset_horizontal: 0.10,
            heel_lift_ratio: 0.5,
            max_offset: 0.50,
            actor_movement_compensation_mode: ActorMovementCompensationMode::SuddenMotionOnly,
            enable_interpolation: true,
            disable_pelvis_offset_in_air: false,
            disable_pelvis_curve_name: String::new(),
            desired_offset_epsilon: DEFAULT_DESIRED_OFFSET_EPSILON,
        }
    }
}

impl PelvisSettings {
    pub fn spring(&self) -> SpringSettings {
        SpringSettings::new(self.linear_stiffness, self.linear_damping)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TraceSettings {
    pub enabled: bool,
    pub sweep_radius: f32,
    /// Offset along the approach direction where the sweep starts (negative = above).
    pub start_offset: f32,
    /// Offset along the approach direction where the sweep ends.
    pub end_offset: f32,
    pub simple_trace_channel: TraceChannel,
    pub complex_trace_channel: TraceChannel,
    /// Max depth the smoothed plane may sink below the traced ground. Negative disables.
    pub max_ground_penetration: f32,
    pub disable_complex_trace: bool,
}

impl Default for TraceSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            sweep_radius: 0.05,
            start_offset: -0.75,
            end_offset: 0.75,
            simple_trace_channel: TraceChannel::FootSimple,
            complex_trace_channel: TraceChannel::FootComplex,
            max_ground_penetration: 0.05,
            disable_complex_trace: false,
        }
    }
}

impl TraceSettings {
    #[inline]
    pub fn channel(&self) -> TraceChannel {
        if self.disable_complex_trace {
            self.simple_trace_channel
        } else {
            self.complex_trace_channel
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct InterpolationSettings {
    pub unplant_linear_stiffness: f32,
    pub unplant_linear_damping: f32,
    pub unplant_angular_stiffness: f32,
    pub unplant_angular_damping: f32,
    pub floor_linear_stiffness: f32,
    pub floor_linear_damping: f32,
    pub floor_angular_stiffness: f32,
    pub floor_angular_damping: f32,
    pub enable_floor_interpolation: bool,
    pub enable_separation_interpolation: bool,
    /// Also shift the root bone by the pelvis translation delta.
    pub smooth_root_bone: bool,
}

impl Default for InterpolationSettings {
    fn default() -> Self {
        Self {
            unplant_linear_stiffness: 250.0,
            unplant_linear_damping: 1.0,
            unplant_angular_stiffness: 450.0,
            unplant_angular_damping: 1.0,
            floor_linear_stiffness: 1000.0,
            floor_linear_damping: 1.0,
            floor_angular_stiffness: 450.0,
            floor_angular_damping: 1.0,
            enable_floor_interpolation: true,
            enable_separation_interpolation: true,
            smooth_root_bone: false,
        }
    }
}

impl InterpolationSettings {
    pub fn unplant_linear(&self) -> SpringSettings {
        SpringSettings::new(self.unplant_linear_stiffness, self.unplant_linear_damping)
    }

    pub fn unplant_angular(&self) -> SpringSettings {
        SpringSettings::new(self.unplant_angular_stiffness, self.unplant_angular_damping)
    }

    pub fn floor_linear(&self) -> SpringSettings {
        SpringSettings::new(self.floor_linear_stiffness, self.floor_linear_damping)
    }

    pub fn floor_angular(&self) -> SpringSettings {
        SpringSettings::new(self.floor_angular_stiffness, self.floor_angular_damping)
    }
}

/// Everything the solver needs besides the skeleton and the per-frame inputs.
#[derive(Clone, Debug, PartialEq)]
pub struct FootPlacementSettings {
    pub legs: Vec<LegDefinition>,
    pub pelvis_bone: String,
    pub ik_foot_root_bone: String,
    pub plant: PlantSettings,
    pub pelvis: PelvisSettings,
    pub trace: TraceSettings,
    pub interpolation: InterpolationSettings,
    pub plant_speed_mode: PlantSpeedMode,
    /// Root moves farther than this in one frame reset all state. 0 disables.
    pub teleport_distance_threshold: f32,
}

impl FootPlacementSettings {
    pub fn new(
        legs: Vec<LegDefinition>,
        pelvis_bone: impl Into<String>,
        ik_foot_root_bone: impl Into<String>,
    ) -> Self {
        Self {
            legs,
            pelvis_bone: pelvis_bone.into(),
            ik_foot_root_bone: ik_foot_root_bone.into(),
            plant: PlantSettings::default(),
            pelvis: PelvisSettings::default(),
            trace: TraceSettings::default(),
            interpolation: InterpolationSettings::default(),
            plant_speed_mode: PlantSpeedMode::Manual,
            teleport_distance_threshold: 3.0,
        }
    }

    /// Reject settings the solver cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.legs.is_empty() {
            return Err(FootPlacementError::invalid_config("at least one leg is required"));
        }
        if self.pelvis_bone.is_empty() || self.ik_foot_root_bone.is_empty() {
            return Err(FootPlacementError::invalid_config(
                "pelvis and ik foot root bones must be named",
            ));
        }
        for (i, leg) in self.legs.iter().enumerate() {
            if leg.fk_foot_bone.is_empty() || leg.ik_foot_bone.is_empty() || leg.ball_bone.is_empty()
            {
                return Err(FootPlacementError::invalid_config(format!(
                    "leg {i} has an unnamed bone"
                )));
            }
        }

        let p = &self.plant;
        let non_negative = [
            ("distance_to_ground", p.distance_to_ground),
            ("unplant_radius", p.unplant_radius),
            ("unplant_angle", p.unplant_angle),
            ("replant_radius_ratio", p.replant_radius_ratio),
            ("replant_angle_ratio", p.replant_angle_ratio),
            ("max_extension_ratio", p.max_extension_ratio),
            ("min_extension_ratio", p.min_extension_ratio),
            ("separating_distance", p.separating_distance),
            ("sweep_radius", self.trace.sweep_radius),
            ("pelvis max_offset", self.pelvis.max_offset),
            ("max_offset_horizontal", self.pelvis.max_offset_horizontal),
            ("teleport_distance_threshold", self.teleport_distance_threshold),
        ];
        for (name, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(FootPlacementError::invalid_config(format!(
                    "{name} must be finite and non-negative, got {value}"
                )));
            }
        }

        if !(0.0..=1.0).contains(&p.ankle_twist_reduction) {
            return Err(FootPlacementError::invalid_config(
                "ankle_twist_reduction must be in [0, 1]",
            ));
        }
        if self.trace.end_offset < self.trace.start_offset {
            return Err(FootPlacementError::invalid_config(
                "trace end_offset must not precede start_offset",
            ));
        }

        Ok(())
    }
}

/// Values derived from [`PlantSettings`] once per evaluation.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PlantRuntimeSettings {
    pub unplant_radius_sqrd: f32,
    pub replant_radius_sqrd: f32,
    pub cos_half_unplant_angle: f32,
    pub cos_half_replant_angle: f32,
}

impl PlantRuntimeSettings {
    pub fn from_settings(plant: &PlantSettings) -> Self {
        let unplant_radius_sqrd = plant.unplant_radius * plant.unplant_radius;
        Self {
            unplant_radius_sqrd,
            replant_radius_sqrd: unplant_radius_sqrd
                * plant.replant_radius_ratio
                * plant.replant_radius_ratio,
            cos_half_unplant_angle: (plant.unplant_angle.to_radians() * 0.5).cos(),
            cos_half_replant_angle: ((plant.unplant_angle * plant.replant_angle_ratio)
                .to_radians()
                * 0.5)
                .cos(),
        }
    }
}
