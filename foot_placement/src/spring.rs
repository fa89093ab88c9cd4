//! Damped spring interpolation.
//!
//! One primitive smooths every value the solver must not pop: plant plane height and normal,
//! pelvis offset, unplant offset decay, foot separation and the capsule floor normal. Each
//! interpolated quantity owns a spring state (velocity accumulator + previous target) that persists
//! across frames and is reset whenever its target is redefined discontinuously.
//!
//! Integration is implicit Euler, which is unconditionally stable for any stiffness and delta time.
//! A `critical_damping` of 1.0 is critically damped; larger values are over-damped.

use std::ops::{Add, Mul, Sub};

use num_traits::Zero;

use crate::constants::MIN_SPRING_DT;
use crate::math::{Quat, Vec3};

/// Values that can be spring-interpolated component-wise (scalars and vectors).
pub trait SpringValue:
    Copy + Zero + Add<Output = Self> + Sub<Output = Self> + Mul<f32, Output = Self>
{
}

impl<T> SpringValue for T where
    T: Copy + Zero + Add<Output = T> + Sub<Output = T> + Mul<f32, Output = T>
{
}

/// Stiffness/damping pair plus the less common knobs.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpringSettings {
    pub stiffness: f32,
    /// 1.0 = critically damped.
    pub critical_damping: f32,
    pub mass: f32,
    /// How much of the target's own velocity the spring tracks (0 = none).
    pub target_velocity_amount: f32,
}

impl SpringSettings {
    pub fn new(stiffness: f32, critical_damping: f32) -> Self {
        Self {
            stiffness,
            critical_damping,
            mass: 1.0,
            target_velocity_amount: 0.0,
        }
    }

    /// `(k/m, c/m)` for the integrator.
    fn coefficients(&self) -> (f32, f32) {
        let mass = self.mass.max(MIN_SPRING_DT);
        let k = self.stiffness.max(0.0) / mass;
        let omega = k.sqrt();
        let c = 2.0 * self.critical_damping.max(0.0) * omega;
        (k, c)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpringState<T> {
    pub velocity: T,
    pub prev_target: T,
    pub prev_target_valid: bool,
}

impl<T: SpringValue> Default for SpringState<T> {
    fn default() -> Self {
        Self {
            velocity: T::zero(),
            prev_target: T::zero(),
            prev_target_valid: false,
        }
    }
}

impl<T: SpringValue> SpringState<T> {
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

pub type FloatSpringState = SpringState<f32>;
pub type VectorSpringState = SpringState<Vec3>;

/// Advance `current` toward `target` by one step of `dt` seconds.
pub fn spring_interp<T: SpringValue>(
    current: T,
    target: T,
    state: &mut SpringState<T>,
    settings: &SpringSettings,
    dt: f32,
) -> T {
    if dt <= MIN_SPRING_DT {
        return current;
    }

    if !state.prev_target_valid {
        state.prev_target = target;
        state.prev_target_valid = true;
    }
    let target_velocity = (target - state.prev_target) * (settings.target_velocity_amount / dt);
    state.prev_target = target;

    let (k, c) = settings.coefficients();
    let denom = 1.0 + c * dt + k * dt * dt;
    state.velocity =
        (state.velocity + (target - current) * (k * dt) + target_velocity * (c * dt)) * (1.0 / denom);

    current + state.velocity * dt
}

/// Angular spring state: an angular velocity (axis * rad/s) and the previous target.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct QuatSpringState {
    pub angular_velocity: Vec3,
    pub prev_target: Quat,
    pub prev_target_valid: bool,
}

impl Default for QuatSpringState {
    fn default() -> Self {
        Self {
            angular_velocity: Vec3::zeros(),
            prev_target: Quat::identity(),
            prev_target_valid: false,
        }
    }
}

impl QuatSpringState {
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Quaternion variant of [`spring_interp`]; springs along the shortest arc.
pub fn quat_spring_interp(
    current: Quat,
    target: Quat,
    state: &mut QuatSpringState,
    settings: &SpringSettings,
    dt: f32,
) -> Quat {
    if dt <= MIN_SPRING_DT {
        return current;
    }

    if !state.prev_target_valid {
        state.prev_target = target;
        state.prev_target_valid = true;
    }
    let target_velocity =
        (target * state.prev_target.inverse()).scaled_axis() * (settings.target_velocity_amount / dt);
    state.prev_target = target;

    let error = (target * current.inverse()).scaled_axis();

    let (k, c) = settings.coefficients();
    let denom = 1.0 + c * dt + k * dt * dt;
    state.angular_velocity =
        (state.angular_velocity + error * (k * dt) + target_velocity * (c * dt)) / denom;

    Quat::from_scaled_axis(state.angular_velocity * dt) * current
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f32 = 1.0 / 60.0;

    #[test]
    fn float_spring_converges_without_large_overshoot() {
        let settings = SpringSettings::new(100.0, 1.0);
        let mut state = FloatSpringState::default();
        let mut x = 0.0_f32;
        let mut max_x = x;
        for _ in 0..200 {
            x = spring_interp(x, 1.0, &mut state, &settings, DT);
            max_x = max_x.max(x);
        }
        assert!((x - 1.0).abs() < 1.0e-3, "x = {x}");
        assert!(max_x <= 1.0 + 1.0e-3, "overshoot {max_x}");
    }

    #[test]
    fn over_damped_spring_also_converges() {
        let settings = SpringSettings::new(250.0, 2.0);
        let mut state = FloatSpringState::default();
        let mut x = 5.0_f32;
        for _ in 0..400 {
            x = spring_interp(x, -1.0, &mut state, &settings, DT);
        }
        assert!((x + 1.0).abs() < 1.0e-3);
    }

    #[test]
    fn zero_dt_holds_value() {
        let settings = SpringSettings::new(100.0, 1.0);
        let mut state = VectorSpringState::default();
        let v = Vec3::new(1.0, 2.0, 3.0);
        let out = spring_interp(v, Vec3::zeros(), &mut state, &settings, 0.0);
        assert_eq!(out, v);
        assert_eq!(state, VectorSpringState::default());
    }

    #[test]
    fn vector_spring_moves_toward_target() {
        let settings = SpringSettings::new(450.0, 1.0);
        let mut state = VectorSpringState::default();
        let target = Vec3::new(0.0, 0.0, 1.0);
        let mut v = Vec3::zeros();
        let first = spring_interp(v, target, &mut state, &settings, DT);
        assert!(first.z > 0.0 && first.z < 1.0);
        for _ in 0..300 {
            v = spring_interp(v, target, &mut state, &settings, DT);
        }
        assert!((v - target).norm() < 1.0e-3);
    }

    #[test]
    fn reset_clears_velocity() {
        let settings = SpringSettings::new(100.0, 1.0);
        let mut state = FloatSpringState::default();
        spring_interp(0.0, 10.0, &mut state, &settings, DT);
        assert!(state.velocity > 0.0);
        state.reset();
        assert_eq!(state.velocity, 0.0);
        assert!(!state.prev_target_valid);
    }

    #[test]
    fn quat_spring_converges_to_target() {
        let settings = SpringSettings::new(450.0, 1.0);
        let mut state = QuatSpringState::default();
        let target = Quat::from_axis_angle(&Vec3::x_axis(), 0.8);
        let mut q = Quat::identity();
        for _ in 0..300 {
            q = quat_spring_interp(q, target, &mut state, &settings, DT);
        }
        assert!(q.angle_to(&target) < 1.0e-3);
    }
}
