use foot_placement::constants::DIST_EPS;
use foot_placement::pelvis::max_limb_extension;
use foot_placement::{
    BoneDef, BoneTransform, ColliderShapeDef, ComponentPose, FlatGround, FootPlacementError,
    FootPlacementSettings, FootPlacementSolver, GroundWorld, LegDefinition, LockType, PlantType,
    Quat, RapierCharacter, Skeleton, Transform, Vec3, WorldStaticDef,
};

const DT: f32 = 1.0 / 60.0;

const PELVIS: usize = 1;
const FOOT_L: usize = 4;
const IK_FOOT_L: usize = 7;
const IK_FOOT_R: usize = 12;

/// Two straight legs under a pelvis at 1m; ankles 0.1m above the ground, balls 0.02m.
fn biped() -> Skeleton {
    let leg = |side: &str, x: f32, thigh: usize| {
        [
            BoneDef::new(format!("thigh_{side}"), Some(PELVIS), Vec3::new(x, -0.02, 0.0)),
            BoneDef::new(format!("calf_{side}"), Some(thigh), Vec3::new(0.0, -0.44, 0.03)),
            BoneDef::new(format!("foot_{side}"), Some(thigh + 1), Vec3::new(0.0, -0.44, -0.03)),
            BoneDef::new(format!("ball_{side}"), Some(thigh + 2), Vec3::new(0.0, -0.08, 0.12)),
        ]
    };

    let mut bones = vec![
        BoneDef::new("root", None, Vec3::zeros()),
        BoneDef::new("pelvis", Some(0), Vec3::new(0.0, 1.0, 0.0)),
    ];
    bones.extend(leg("l", 0.1, 2));
    bones.push(BoneDef::new("ik_foot_root", Some(0), Vec3::zeros()));
    bones.push(BoneDef::new("ik_foot_l", Some(6), Vec3::new(0.1, 0.1, 0.0)));
    bones.extend(leg("r", -0.1, 8));
    bones.push(BoneDef::new("ik_foot_r", Some(6), Vec3::new(-0.1, 0.1, 0.0)));
    Skeleton::new(bones).unwrap()
}

fn settings() -> FootPlacementSettings {
    let leg = |side: &str| {
        LegDefinition::new(
            format!("foot_{side}"),
            format!("ik_foot_{side}"),
            format!("ball_{side}"),
        )
        .with_curves("foot_speed", "", "")
    };
    FootPlacementSettings::new(vec![leg("l"), leg("r")], "pelvis", "ik_foot_root")
}

fn solver_with(settings: FootPlacementSettings) -> (FootPlacementSolver, ComponentPose) {
    let skeleton = biped();
    let mut solver = FootPlacementSolver::new(settings).unwrap();
    solver.bind(&skeleton).unwrap();
    (solver, ComponentPose::from_ref_pose(&skeleton))
}

fn find(out: &[BoneTransform], bone: usize) -> Transform {
    out.iter()
        .find(|t| t.bone == bone)
        .map(|t| t.transform)
        .unwrap()
}

fn run(
    solver: &mut FootPlacementSolver,
    pose: &ComponentPose,
    env: &dyn foot_placement::CharacterEnvironment,
    frames: u64,
    counter: &mut u64,
) -> Vec<BoneTransform> {
    let mut out = Vec::new();
    for _ in 0..frames {
        solver.update(*counter, DT);
        *counter += 1;
        out = solver.evaluate(pose, env).unwrap();
    }
    out
}

#[test]
fn skeleton_layout() {
    let s = biped();
    assert_eq!(s.find("foot_l"), Some(FOOT_L));
    assert_eq!(s.find("ik_foot_l"), Some(IK_FOOT_L));
    assert_eq!(s.find("ik_foot_r"), Some(IK_FOOT_R));
    let cs = s.ref_pose_component();
    assert!((cs[FOOT_L].translation - cs[IK_FOOT_L].translation).norm() < 1.0e-6);
}

#[test]
fn flat_ground_keeps_input_pose() {
    let (mut solver, pose) = solver_with(settings());
    let ground = FlatGround::new(0.0);
    let mut counter = 0;
    let out = run(&mut solver, &pose, &ground, 30, &mut counter);

    let bones: Vec<_> = out.iter().map(|t| t.bone).collect();
    assert_eq!(bones, vec![PELVIS, IK_FOOT_L, IK_FOOT_R]);

    assert!((find(&out, PELVIS).translation - Vec3::new(0.0, 1.0, 0.0)).norm() < 0.01);
    for (bone, x) in [(IK_FOOT_L, 0.1), (IK_FOOT_R, -0.1)] {
        let foot = find(&out, bone);
        assert!((foot.translation - Vec3::new(x, 0.1, 0.0)).norm() < 1.0e-3);
        assert!(foot.rotation.angle() < 1.0e-3);
    }
}

#[test]
fn raised_ground_under_one_foot() {
    let world = GroundWorld::build(vec![
        WorldStaticDef::new(0, Vec3::zeros(), ColliderShapeDef::Plane {
            offset_along_normal: 0.0,
        }),
        WorldStaticDef::new(1, Vec3::new(0.26, 0.05, 0.0), ColliderShapeDef::Cuboid {
            half_extents: Vec3::new(0.24, 0.05, 0.5),
        }),
    ]);
    let mut character = RapierCharacter::new(&world, Transform::identity());
    character.floor_probe_radius = 0.0;
    character.refresh_floor();

    let (mut solver, pose) = solver_with(settings());
    let mut counter = 0;
    let out = run(&mut solver, &pose, &character, 60, &mut counter);

    let left = find(&out, IK_FOOT_L).translation;
    let right = find(&out, IK_FOOT_R).translation;
    assert!((left.y - 0.2).abs() < 2.0e-3, "{left:?}");
    assert!((right.y - 0.1).abs() < 2.0e-3, "{right:?}");

    let pelvis = find(&out, PELVIS);
    let fk_pelvis = Transform::from_translation(Vec3::new(0.0, 1.0, 0.0));
    for (foot, hip_cs) in [
        (left, Vec3::new(0.1, 0.98, 0.0)),
        (right, Vec3::new(-0.1, 0.98, 0.0)),
    ] {
        let hip = (pelvis * Transform::from_translation(hip_cs).relative_to(&fk_pelvis)).translation;
        let limb = solver.legs()[0].bones.unwrap().limb_length;
        let max = max_limb_extension(0.88, limb, solver.settings().plant.max_extension_ratio);
        assert!((foot - hip).norm() <= max + 1.0e-3);
    }
}

#[test]
fn slope_aligns_foot_to_normal() {
    let slope = Quat::from_axis_angle(&Vec3::x_axis(), 10f32.to_radians());
    let world = GroundWorld::build(vec![
        WorldStaticDef::new(0, Vec3::zeros(), ColliderShapeDef::Plane {
            offset_along_normal: 0.0,
        })
        .with_rotation(slope),
    ]);
    let character = RapierCharacter::new(&world, Transform::identity());

    let (mut solver, pose) = solver_with(settings());
    let mut counter = 0;
    let out = run(&mut solver, &pose, &character, 30, &mut counter);

    let normal = slope * Vec3::y();
    for bone in [IK_FOOT_L, IK_FOOT_R] {
        let up = find(&out, bone).up();
        assert!(up.dot(&normal) > 0.999, "{up:?}");
    }
}

#[test]
fn airborne_uses_ik_root_plane() {
    let (mut solver, pose) = solver_with(settings());
    let mut ground = FlatGround::new(-0.5);
    ground.on_ground = false;
    ground.traces_hit = false;

    let mut counter = 0;
    let out = run(&mut solver, &pose, &ground, 10, &mut counter);

    for leg in solver.legs() {
        let plane = leg.plant.plant_plane_rs;
        assert!(plane.dist.abs() < 1.0e-4);
        assert!((plane.normal - Vec3::y()).norm() < 1.0e-4);
    }
    assert!((find(&out, IK_FOOT_L).translation.y - 0.1).abs() < 1.0e-3);
    assert!(!solver.character().is_on_ground);
}

#[test]
fn unlocked_never_plants_but_aligns() {
    let mut s = settings();
    s.plant.lock_type = LockType::Unlocked;
    let (mut solver, mut pose) = solver_with(s);
    pose.set_curve("foot_speed", 0.0);
    let ground = FlatGround::new(0.05);

    let mut out = Vec::new();
    for counter in 0..60 {
        solver.update(counter, DT);
        out = solver.evaluate(&pose, &ground).unwrap();
        assert!(solver.legs().iter().all(|leg| !leg.plant.is_planted()));
    }
    assert!((find(&out, IK_FOOT_L).translation.y - 0.15).abs() < 2.0e-3);
    assert!((find(&out, PELVIS).translation.y - 1.05).abs() < 0.01);
}

#[test]
fn planted_foot_holds_then_unplants() {
    let (mut solver, mut pose) = solver_with(settings());
    pose.set_curve("foot_speed", 0.0);
    let ground = FlatGround::new(0.0);

    let mut counter = 0;
    run(&mut solver, &pose, &ground, 1, &mut counter);
    assert_eq!(solver.legs()[0].plant.plant_type, PlantType::Planted);

    // Input slides forward but stays inside the unplant radius.
    for _ in 0..4 {
        pose.translate(IK_FOOT_L, Vec3::new(0.0, 0.0, 0.005));
        let out = run(&mut solver, &pose, &ground, 1, &mut counter);
        assert!(solver.legs()[0].plant.is_planted());
        assert!(find(&out, IK_FOOT_L).translation.z.abs() < 2.0e-3);
    }

    // Beyond the radius the foot lets go and heads back toward the input.
    pose.translate(IK_FOOT_L, Vec3::new(0.0, 0.0, 0.03));
    let out = run(&mut solver, &pose, &ground, 1, &mut counter);
    assert_eq!(solver.legs()[0].plant.plant_type, PlantType::Unplanted);
    assert!(find(&out, IK_FOOT_L).translation.z > 1.0e-3);
}

#[test]
fn static_input_converges_to_fixed_point() {
    let mut s = settings();
    s.interpolation.enable_floor_interpolation = false;
    let (mut solver, mut pose) = solver_with(s);
    pose.set_curve("foot_speed", 0.0);
    let ground = FlatGround::new(0.05);

    let mut counter = 0;
    let first = run(&mut solver, &pose, &ground, 300, &mut counter);
    let second = run(&mut solver, &pose, &ground, 1, &mut counter);

    assert_eq!(first.len(), second.len());
    for (a, b) in first.iter().zip(&second) {
        assert_eq!(a.bone, b.bone);
        let moved = (a.transform.translation - b.transform.translation).norm();
        assert!(moved < DIST_EPS, "bone {} moved {moved}", a.bone);
        assert!(a.transform.rotation.angle_to(&b.transform.rotation) < DIST_EPS);
    }
}

#[test]
fn teleport_drops_plant_offsets() {
    let (mut solver, mut pose) = solver_with(settings());
    pose.set_curve("foot_speed", 0.0);
    let mut ground = FlatGround::new(0.0);

    let mut counter = 0;
    run(&mut solver, &pose, &ground, 1, &mut counter);
    pose.translate(IK_FOOT_L, Vec3::new(0.0, 0.0, 0.02));
    let held = run(&mut solver, &pose, &ground, 1, &mut counter);
    assert!(find(&held, IK_FOOT_L).translation.z.abs() < 2.0e-3);

    ground.component_to_world = Transform::from_translation(Vec3::new(10.0, 0.0, 0.0));
    let out = run(&mut solver, &pose, &ground, 1, &mut counter);
    assert!((find(&out, IK_FOOT_L).translation.z - 0.02).abs() < 1.0e-3);
}

#[test]
fn unresolved_bone_passes_through() {
    let mut s = settings();
    s.legs[1].fk_foot_bone = "foot_x".into();
    let skeleton = biped();
    let mut solver = FootPlacementSolver::new(s).unwrap();
    assert!(matches!(
        solver.bind(&skeleton),
        Err(FootPlacementError::UnresolvedBone { ref name }) if name == "foot_x"
    ));

    let pose = ComponentPose::from_ref_pose(&skeleton);
    solver.update(0, DT);
    assert!(solver.evaluate(&pose, &FlatGround::new(0.0)).unwrap().is_empty());
}
