//! Rapier-based ground world for foot traces against immutable/static geometry.
//!
//! Design goals
//! - Deterministic: given the same inputs (sorted by `id`), build identical in-memory sets.
//! - Query-focused: sphere sweeps and rays filtered by [`TraceChannel`].
//! - Immutable world: statics do not move after construction.

use std::collections::HashMap;

use rapier3d::parry::query::ShapeCastOptions;
use rapier3d::prelude::*;

use super::channels::{ChannelMask, TraceChannel};
use super::{CharacterEnvironment, GroundHit, SweepRequest};
use crate::constants::{DIST_EPS, MAX_SLOPE_COS};
use crate::math::{Quat, Transform, Vec3};

/// Canonical definition of an immutable world collider.
///
/// Conventions
/// - Units are meters.
/// - For planes, the normal is derived from the pose: `normal = rotation * +Y`,
///   and `dist = dot(normal, translation) + offset_along_normal`.
#[derive(Clone, Debug)]
pub struct WorldStaticDef {
    /// Stable unique identifier used to ensure deterministic insertion order.
    pub id: u32,
    pub translation: Vec3,
    pub rotation: Quat,
    pub shape: ColliderShapeDef,
    /// Trace channels this collider blocks.
    pub channels: ChannelMask,
}

impl WorldStaticDef {
    pub fn new(id: u32, translation: Vec3, shape: ColliderShapeDef) -> Self {
        Self {
            id,
            translation,
            rotation: Quat::identity(),
            shape,
            channels: ChannelMask::all(),
        }
    }

    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_channels(mut self, channels: ChannelMask) -> Self {
        self.channels = channels;
        self
    }
}

/// Supported static collider shapes.
#[derive(Clone, Debug)]
pub enum ColliderShapeDef {
    /// Infinite plane (half-space), offset along its pose-derived normal.
    Plane { offset_along_normal: f32 },

    /// Oriented cuboid with given half-extents (meters).
    Cuboid { half_extents: Vec3 },

    Sphere { radius: f32 },

    /// Y-aligned capsule (meters).
    CapsuleY { radius: f32, half_height: f32 },
}

/// Static ground geometry plus the Rapier structures needed for scene queries.
pub struct GroundWorld {
    bodies: RigidBodySet,
    colliders: ColliderSet,
    broad_phase: BroadPhaseBvh,
    narrow_phase: NarrowPhase,
    handles: HashMap<u32, ColliderHandle>,
}

impl GroundWorld {
    /// Build a ground world from static collider definitions.
    ///
    /// The input is sorted by `id` before insertion.
    pub fn build(mut defs: Vec<WorldStaticDef>) -> Self {
        defs.sort_by_key(|d| d.id);

        let mut bodies = RigidBodySet::new();
        let mut colliders = ColliderSet::new();
        let mut handles = HashMap::with_capacity(defs.len());

        for def in defs.into_iter() {
            let iso = Transform::new(def.translation, def.rotation).iso();
            let rb = RigidBodyBuilder::fixed().pose(iso).build();
            let rb_handle = bodies.insert(rb);

            let mut collider = collider_from_def(&def);
            collider.user_data = def.channels.bits as u128;
            let handle = colliders.insert_with_parent(collider, rb_handle, &mut bodies);
            handles.insert(def.id, handle);
        }

        // Collision-detection only (no dynamics): updates the broad-phase BVH and narrow phase.
        let mut broad_phase = BroadPhaseBvh::new();
        let mut narrow_phase = NarrowPhase::new();
        let mut collision_pipeline = CollisionPipeline::new();
        collision_pipeline.step(
            0.0,
            &mut broad_phase,
            &mut narrow_phase,
            &mut bodies,
            &mut colliders,
            &(),
            &(),
        );

        Self {
            bodies,
            colliders,
            broad_phase,
            narrow_phase,
            handles,
        }
    }

    /// Borrowed `QueryPipeline` view for scene queries.
    pub fn query_pipeline<'a>(&'a self, filter: QueryFilter<'a>) -> QueryPipeline<'a> {
        self.broad_phase.as_query_pipeline(
            self.narrow_phase.query_dispatcher(),
            &self.bodies,
            &self.colliders,
            filter,
        )
    }

    pub fn collider_handle(&self, id: u32) -> Option<ColliderHandle> {
        self.handles.get(&id).copied()
    }

    /// Sweep a sphere (or cast a ray when the radius is ~0) along the request.
    ///
    /// Colliders that do not block `request.channel` are skipped, as is `exclude` when set.
    /// The returned normal always opposes the sweep direction.
    pub fn sweep(&self, request: &SweepRequest, exclude: Option<ColliderHandle>) -> Option<GroundHit> {
        let delta = request.end - request.start;
        let length = delta.norm();
        if length <= DIST_EPS {
            return None;
        }
        let dir = delta / length;

        let channel_bit = ChannelMask::from_flags(&[request.channel]).bits as u128;
        let blocks_channel = move |_: ColliderHandle, c: &Collider| c.user_data & channel_bit != 0;
        let mut filter = QueryFilter::default().predicate(&blocks_channel);
        if let Some(handle) = exclude {
            filter = filter.exclude_collider(handle);
        }
        let pipeline = self.query_pipeline(filter);

        let (point, mut normal) = if request.radius <= DIST_EPS {
            let ray = Ray::new(request.start.into(), dir);
            let (_, hit) = pipeline.cast_ray_and_get_normal(&ray, length, true)?;
            (request.start + dir * hit.time_of_impact, hit.normal)
        } else {
            let ball = Ball::new(request.radius);
            let pos = Transform::from_translation(request.start).iso();
            let mut opts = ShapeCastOptions::with_max_time_of_impact(1.0);
            opts.stop_at_penetration = true;
            let (_, hit) = pipeline.cast_shape(&pos, &delta, &ball, opts)?;
            let mut n = hit.normal1.into_inner();
            if n.dot(&delta) > 0.0 {
                n = -n;
            }
            let center = request.start + delta * hit.time_of_impact;
            (center - n * request.radius, n)
        };

        if normal.dot(&delta) > 0.0 {
            normal = -normal;
        }
        Some(GroundHit { point, normal })
    }
}

/// Build a Rapier collider from a `WorldStaticDef`.
///
/// The pose lives on the parent rigid-body, so the collider has an identity local transform.
fn collider_from_def(def: &WorldStaticDef) -> Collider {
    match &def.shape {
        ColliderShapeDef::Plane {
            offset_along_normal,
        } => {
            // The body pose already places the plane through `translation`; only the extra
            // offset along the local normal remains.
            let halfspace = HalfSpace::new(Vector::y_axis());
            ColliderBuilder::new(SharedShape::new(halfspace))
                .translation(Vector::y() * *offset_along_normal)
                .build()
        }

        ColliderShapeDef::Cuboid { half_extents } => {
            ColliderBuilder::cuboid(half_extents.x, half_extents.y, half_extents.z).build()
        }

        ColliderShapeDef::Sphere { radius } => ColliderBuilder::ball(*radius).build(),

        ColliderShapeDef::CapsuleY {
            radius,
            half_height,
        } => ColliderBuilder::capsule_y(*half_height, *radius).build(),
    }
}

/// A character standing in a [`GroundWorld`].
///
/// Holds the movement state the solver reads (transform, velocity, floor) and answers sweeps
/// against the world, ignoring the character's own collider when one is registered.
pub struct RapierCharacter<'w> {
    world: &'w GroundWorld,
    component_to_world: Transform,
    pub velocity: Vec3,
    pub base_translation_delta: Vec3,
    /// Static id of the character's own collider, skipped by `ignore_self` sweeps.
    pub self_id: Option<u32>,
    pub floor_channel: TraceChannel,
    pub max_slope_cos: f32,
    /// How far below the component the floor probe reaches.
    pub floor_probe_distance: f32,
    pub floor_probe_radius: f32,
    floor: Option<GroundHit>,
}

impl<'w> RapierCharacter<'w> {
    pub fn new(world: &'w GroundWorld, component_to_world: Transform) -> Self {
        let mut character = Self {
            world,
            component_to_world,
            velocity: Vec3::zeros(),
            base_translation_delta: Vec3::zeros(),
            self_id: None,
            floor_channel: TraceChannel::WorldStatic,
            max_slope_cos: MAX_SLOPE_COS,
            floor_probe_distance: 0.1,
            floor_probe_radius: 0.1,
            floor: None,
        };
        character.refresh_floor();
        character
    }

    pub fn with_self_id(mut self, id: u32) -> Self {
        self.self_id = Some(id);
        self.refresh_floor();
        self
    }

    /// Move the character and re-probe the floor.
    pub fn set_component_to_world(&mut self, transform: Transform) {
        self.component_to_world = transform;
        self.refresh_floor();
    }

    /// Probe straight down from slightly above the component origin.
    pub fn refresh_floor(&mut self) {
        let up = self.component_to_world.up();
        let origin = self.component_to_world.translation;
        let request = SweepRequest {
            start: origin + up * (self.floor_probe_radius + self.floor_probe_distance),
            end: origin - up * self.floor_probe_distance,
            radius: self.floor_probe_radius,
            channel: self.floor_channel,
            ignore_self: true,
        };
        self.floor = self.sweep(&request).filter(|hit| self.is_walkable(hit));
    }

    fn self_handle(&self) -> Option<ColliderHandle> {
        self.self_id.and_then(|id| self.world.collider_handle(id))
    }
}

impl CharacterEnvironment for RapierCharacter<'_> {
    fn sweep(&self, request: &SweepRequest) -> Option<GroundHit> {
        let exclude = if request.ignore_self {
            self.self_handle()
        } else {
            None
        };
        self.world.sweep(request, exclude)
    }

    fn is_walkable(&self, hit: &GroundHit) -> bool {
        hit.normal.dot(&self.component_to_world.up()) >= self.max_slope_cos
    }

    fn current_floor(&self) -> Option<GroundHit> {
        self.floor
    }

    fn is_on_ground(&self) -> bool {
        self.floor.is_some()
    }

    fn velocity(&self) -> Vec3 {
        self.velocity
    }

    fn component_to_world(&self) -> Transform {
        self.component_to_world
    }

    fn base_translation_delta(&self) -> Vec3 {
        self.base_translation_delta
    }
}
