pub mod alignment;
pub mod constants;
pub mod context;
pub mod error;
pub mod finalize;
pub mod ground;
pub mod lock;
pub mod math;
pub mod pelvis;
pub mod plant;
pub mod pose;
pub mod settings;
pub mod solver;
pub mod spring;
pub mod state;

pub use error::{FootPlacementError, Result};
pub use ground::{
    CharacterEnvironment, ColliderShapeDef, FlatGround, GroundHit, GroundWorld, RapierCharacter,
    SweepRequest, TraceChannel, WorldStaticDef,
};
pub use math::{Plane, Quat, Transform, Vec3};
pub use plant::PlantType;
pub use pose::{BoneDef, BoneIndex, BoneTransform, ComponentPose, PoseSource, ROOT_BONE, Skeleton};
pub use settings::{
    ActorMovementCompensationMode, FootPlacementSettings, InterpolationSettings, LegDefinition,
    LockType, PelvisSettings, PlantSettings, PlantSpeedMode, TraceSettings,
};
pub use solver::FootPlacementSolver;
pub use spring::{SpringSettings, spring_interp};
