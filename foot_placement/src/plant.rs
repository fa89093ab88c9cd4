//! Plant state machine.
//!
//! Each leg is in exactly one [`PlantType`] per frame. Separate unplant and replant thresholds
//! give the machine hysteresis so feet do not chatter at the boundary.

use log::debug;

use crate::constants::NEARLY_ZERO;
use crate::math::{Transform, Vec3, range_pct, reject_axis};
use crate::settings::{LockType, PlantRuntimeSettings, PlantSettings};
use crate::state::{LegInputPose, PlantState};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PlantType {
    /// Following the animated trajectory.
    #[default]
    Unplanted,
    /// Planted fresh this plant cycle.
    Planted,
    /// Planted again within replant range of the previous plant.
    Replanted,
}

/// Lock enabled, lock weight non-zero, foot close to the ground and slow enough.
pub fn wants_to_plant(settings: &PlantSettings, input: &LegInputPose) -> bool {
    if settings.lock_type == LockType::Unlocked || input.lock_alpha.abs() <= NEARLY_ZERO {
        return false;
    }

    let passes_distance = input.distance_to_plant < settings.distance_to_ground;
    let passes_speed = input.speed < settings.speed_threshold;
    passes_distance && passes_speed
}

/// How much the foot should follow its plant (1) vs. the animation (0), from foot speed.
pub fn alignment_alpha(settings: &PlantSettings, speed: f32) -> f32 {
    range_pct(settings.unalignment_speed_threshold, settings.speed_threshold, speed).clamp(0.0, 1.0)
}

/// Advance `plant` one frame.
///
/// `fk_ws` is this frame's input foot, `last_aligned_ws` last frame's solved foot, both in
/// world space. Distances are measured perpendicular to `approach_dir_ws`.
pub fn determine_plant_type(
    settings: &PlantSettings,
    runtime: &PlantRuntimeSettings,
    fk_ws: &Transform,
    last_aligned_ws: &Transform,
    approach_dir_ws: &Vec3,
    input: &LegInputPose,
    plant: &mut PlantState,
) {
    let was_planted = plant.is_planted();
    let wanted_to_plant = plant.wants_to_plant;

    plant.wants_to_plant = wants_to_plant(settings, input);
    plant.plant_type = PlantType::Unplanted;

    if !plant.wants_to_plant {
        if was_planted {
            debug!("foot unplanted: lock released");
        }
        return;
    }

    let horizontal_delta = reject_axis(
        &(last_aligned_ws.translation - fk_ws.translation),
        approach_dir_ws,
    );
    let delta_sqrd = horizontal_delta.norm_squared();
    let twist_w = plant.twist_correction.w.abs();

    if was_planted {
        // Equal unplant/replant limits clamp and slide instead of unplanting.
        let translation_exceeded =
            settings.replant_radius_ratio < 1.0 && delta_sqrd > runtime.unplant_radius_sqrd;
        let rotation_exceeded =
            settings.replant_angle_ratio < 1.0 && twist_w < runtime.cos_half_unplant_angle;

        if !translation_exceeded && !rotation_exceeded {
            plant.plant_type = plant.last_plant_type;
        } else {
            debug!(
                "foot unplanted: drift {:.4} m, twist cos {:.4}",
                delta_sqrd.sqrt(),
                twist_w
            );
        }
    } else if !wanted_to_plant {
        plant.plant_type = PlantType::Planted;
    } else {
        let location_within = delta_sqrd <= runtime.replant_radius_sqrd;
        let twist_within = twist_w >= runtime.cos_half_replant_angle;
        if location_within && twist_within {
            plant.plant_type = PlantType::Replanted;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Quat;

    fn planting_input() -> LegInputPose {
        LegInputPose {
            speed: 0.0,
            distance_to_plant: 0.0,
            lock_alpha: 1.0,
            ..LegInputPose::default()
        }
    }

    fn step(
        settings: &PlantSettings,
        plant: &mut PlantState,
        input: &LegInputPose,
        drift: f32,
    ) -> PlantType {
        let runtime = PlantRuntimeSettings::from_settings(settings);
        plant.last_plant_type = plant.plant_type;
        let fk = Transform::identity();
        let last = Transform::from_translation(Vec3::new(drift, 0.0, 0.0));
        determine_plant_type(settings, &runtime, &fk, &last, &-Vec3::y(), input, plant);
        plant.plant_type
    }

    #[test]
    fn not_wanting_to_plant_is_always_unplanted() {
        let settings = PlantSettings::default();
        let mut plant = PlantState {
            plant_type: PlantType::Replanted,
            wants_to_plant: true,
            ..PlantState::default()
        };
        let fast = LegInputPose {
            speed: 10.0,
            ..planting_input()
        };
        assert_eq!(step(&settings, &mut plant, &fast, 0.0), PlantType::Unplanted);
    }

    #[test]
    fn unlocked_never_wants_to_plant() {
        let settings = PlantSettings {
            lock_type: LockType::Unlocked,
            ..PlantSettings::default()
        };
        assert!(!wants_to_plant(&settings, &planting_input()));
    }

    #[test]
    fn zero_lock_alpha_never_wants_to_plant() {
        let input = LegInputPose {
            lock_alpha: 0.0,
            ..planting_input()
        };
        assert!(!wants_to_plant(&PlantSettings::default(), &input));
    }

    #[test]
    fn first_plant_is_planted_and_sticky_inside_unplant_radius() {
        let settings = PlantSettings::default();
        let mut plant = PlantState::default();
        let input = planting_input();
        assert_eq!(step(&settings, &mut plant, &input, 0.0), PlantType::Planted);
        // r·R = 0.027 < 0.028 < R = 0.03
        assert_eq!(step(&settings, &mut plant, &input, 0.028), PlantType::Planted);
        assert_eq!(step(&settings, &mut plant, &input, 0.035), PlantType::Unplanted);
    }

    #[test]
    fn replant_requires_smaller_radius() {
        let settings = PlantSettings::default();
        let input = planting_input();
        let mut plant = PlantState::default();
        step(&settings, &mut plant, &input, 0.0);
        assert_eq!(step(&settings, &mut plant, &input, 0.035), PlantType::Unplanted);
        // Still wanting to plant, but outside replant radius (0.027).
        assert_eq!(step(&settings, &mut plant, &input, 0.028), PlantType::Unplanted);
        assert_eq!(step(&settings, &mut plant, &input, 0.02), PlantType::Replanted);
        // Replanted carries over while inside the unplant radius.
        assert_eq!(step(&settings, &mut plant, &input, 0.029), PlantType::Replanted);
    }

    #[test]
    fn twist_beyond_unplant_angle_unplants() {
        let settings = PlantSettings::default();
        let input = planting_input();
        let mut plant = PlantState::default();
        step(&settings, &mut plant, &input, 0.0);
        plant.twist_correction = Quat::from_axis_angle(&Vec3::y_axis(), 20.0_f32.to_radians());
        assert_eq!(step(&settings, &mut plant, &input, 0.0), PlantType::Unplanted);
    }

    #[test]
    fn full_replant_ratio_never_unplants_on_drift() {
        let settings = PlantSettings {
            replant_radius_ratio: 1.0,
            ..PlantSettings::default()
        };
        let input = planting_input();
        let mut plant = PlantState::default();
        step(&settings, &mut plant, &input, 0.0);
        assert_eq!(step(&settings, &mut plant, &input, 1.0), PlantType::Planted);
    }

    #[test]
    fn vertical_drift_is_ignored() {
        let settings = PlantSettings::default();
        let input = planting_input();
        let mut plant = PlantState::default();
        step(&settings, &mut plant, &input, 0.0);
        let runtime = PlantRuntimeSettings::from_settings(&settings);
        plant.last_plant_type = plant.plant_type;
        let last = Transform::from_translation(Vec3::new(0.0, 0.5, 0.0));
        determine_plant_type(
            &settings,
            &runtime,
            &Transform::identity(),
            &last,
            &-Vec3::y(),
            &input,
            &mut plant,
        );
        assert_eq!(plant.plant_type, PlantType::Planted);
    }

    #[test]
    fn alignment_alpha_ramps_between_thresholds() {
        let settings = PlantSettings::default();
        assert_eq!(alignment_alpha(&settings, 5.0), 0.0);
        assert_eq!(alignment_alpha(&settings, 0.1), 1.0);
        let mid = (settings.unalignment_speed_threshold + settings.speed_threshold) * 0.5;
        assert!((alignment_alpha(&settings, mid) - 0.5).abs() < 1.0e-5);
    }
}
