//! Where a planted foot is held, per [`LockType`].

use crate::math::Transform;
use crate::settings::LockType;
use crate::state::LegInputPose;

impl LockType {
    /// World-space transform a planted foot should keep this frame.
    ///
    /// `input_foot_ws` / `input_ball_ws` are this frame's input pose; `last_unaligned_ws` is
    /// last frame's unaligned (pre ground alignment) foot. Returns `None` for
    /// [`LockType::Unlocked`], which never overrides the input.
    pub fn planted_transform(
        self,
        input: &LegInputPose,
        input_foot_ws: &Transform,
        input_ball_ws: &Transform,
        last_unaligned_ws: &Transform,
    ) -> Option<Transform> {
        match self {
            LockType::Unlocked => None,
            LockType::PivotAroundBall => {
                // Keep last frame's ball location, take this frame's ball rotation, then hang
                // the foot off the pinned ball.
                let last_ball = *last_unaligned_ws * input.foot_to_ball;
                let pinned_ball = Transform::new(last_ball.translation, input_ball_ws.rotation);
                Some(pinned_ball * input.ball_to_foot)
            }
            LockType::PivotAroundAnkle => Some(Transform::new(
                last_unaligned_ws.translation,
                input_foot_ws.rotation,
            )),
            LockType::LockRotation => Some(*last_unaligned_ws),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::{Quat, Vec3};

    fn input() -> LegInputPose {
        let foot_to_ball = Transform::from_translation(Vec3::new(0.0, -0.05, 0.12));
        LegInputPose {
            foot_to_ball,
            ball_to_foot: foot_to_ball.inverse(),
            ..LegInputPose::default()
        }
    }

    #[test]
    fn unlocked_has_no_override() {
        let t = Transform::identity();
        assert!(LockType::Unlocked.planted_transform(&input(), &t, &t, &t).is_none());
    }

    #[test]
    fn ankle_pivot_keeps_location_takes_rotation() {
        let rot = Quat::from_axis_angle(&Vec3::y_axis(), 0.3);
        let input_foot = Transform::new(Vec3::new(1.0, 0.1, 0.0), rot);
        let last = Transform::from_translation(Vec3::new(0.5, 0.1, 0.0));
        let out = LockType::PivotAroundAnkle
            .planted_transform(&input(), &input_foot, &input_foot, &last)
            .unwrap();
        assert_eq!(out.translation, last.translation);
        assert_eq!(out.rotation, rot);
    }

    #[test]
    fn lock_rotation_keeps_last_transform() {
        let last = Transform::new(
            Vec3::new(0.2, 0.0, 0.3),
            Quat::from_axis_angle(&Vec3::y_axis(), 1.0),
        );
        let t = Transform::identity();
        assert_eq!(
            LockType::LockRotation.planted_transform(&input(), &t, &t, &last),
            Some(last)
        );
    }

    #[test]
    fn ball_pivot_keeps_ball_fixed() {
        let inp = input();
        let last = Transform::from_translation(Vec3::new(0.3, 0.1, 0.0));
        let last_ball = (last * inp.foot_to_ball).translation;

        // This frame the foot has rolled about X.
        let roll = Quat::from_axis_angle(&Vec3::x_axis(), 0.4);
        let input_foot = Transform::new(Vec3::new(0.0, 0.1, 0.0), roll);
        let input_ball = input_foot * inp.foot_to_ball;

        let out = LockType::PivotAroundBall
            .planted_transform(&inp, &input_foot, &input_ball, &last)
            .unwrap();
        let out_ball = (out * inp.foot_to_ball).translation;
        assert!((out_ball - last_ball).norm() < 1.0e-5);
        assert!(out.rotation.angle_to(&roll) < 1.0e-5);
    }
}
