//! Skeleton hierarchy and per-frame pose access.

use std::collections::HashMap;

use crate::error::{FootPlacementError, Result};
use crate::math::{Transform, Vec3};

pub type BoneIndex = usize;

/// The root bone is always index 0.
pub const ROOT_BONE: BoneIndex = 0;

/// One bone of a [`Skeleton`].
#[derive(Clone, Debug, PartialEq)]
pub struct BoneDef {
    pub name: String,
    /// `None` only for the root.
    pub parent: Option<BoneIndex>,
    /// Reference pose, relative to the parent.
    pub ref_pose_local: Transform,
}

impl BoneDef {
    pub fn new(name: impl Into<String>, parent: Option<BoneIndex>, local_translation: Vec3) -> Self {
        Self {
            name: name.into(),
            parent,
            ref_pose_local: Transform::from_translation(local_translation),
        }
    }
}

/// Bind-time bone hierarchy. Parents always precede their children.
#[derive(Clone, Debug)]
pub struct Skeleton {
    bones: Vec<BoneDef>,
    by_name: HashMap<String, BoneIndex>,
}

impl Skeleton {
    pub fn new(bones: Vec<BoneDef>) -> Result<Self> {
        if bones.is_empty() {
            return Err(FootPlacementError::invalid_skeleton("skeleton has no bones"));
        }

        let mut by_name = HashMap::with_capacity(bones.len());
        for (i, bone) in bones.iter().enumerate() {
            match (i, bone.parent) {
                (ROOT_BONE, None) => {}
                (ROOT_BONE, Some(_)) => {
                    return Err(FootPlacementError::invalid_skeleton("root bone has a parent"));
                }
                (_, None) => {
                    return Err(FootPlacementError::invalid_skeleton(format!(
                        "bone '{}' has no parent",
                        bone.name
                    )));
                }
                (_, Some(parent)) if parent >= i => {
                    return Err(FootPlacementError::invalid_skeleton(format!(
                        "bone '{}' is listed before its parent",
                        bone.name
                    )));
                }
                _ => {}
            }
            if by_name.insert(bone.name.clone(), i).is_some() {
                return Err(FootPlacementError::invalid_skeleton(format!(
                    "duplicate bone name '{}'",
                    bone.name
                )));
            }
        }

        Ok(Self { bones, by_name })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bones.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bones.is_empty()
    }

    pub fn find(&self, name: &str) -> Option<BoneIndex> {
        self.by_name.get(name).copied()
    }

    pub fn resolve(&self, name: &str) -> Result<BoneIndex> {
        self.find(name)
            .ok_or_else(|| FootPlacementError::unresolved_bone(name))
    }

    pub fn parent(&self, index: BoneIndex) -> Option<BoneIndex> {
        self.bones.get(index).and_then(|b| b.parent)
    }

    pub fn bone(&self, index: BoneIndex) -> Option<&BoneDef> {
        self.bones.get(index)
    }

    pub fn ref_pose_local(&self, index: BoneIndex) -> Option<&Transform> {
        self.bones.get(index).map(|b| &b.ref_pose_local)
    }

    /// Reference pose in component space.
    pub fn ref_pose_component(&self) -> Vec<Transform> {
        let mut out: Vec<Transform> = Vec::with_capacity(self.bones.len());
        for bone in &self.bones {
            let cs = match bone.parent {
                Some(p) => out[p] * bone.ref_pose_local,
                None => bone.ref_pose_local,
            };
            out.push(cs);
        }
        out
    }

    /// Walk `num_bones` parents up from `start`, summing reference-pose bone lengths.
    ///
    /// Stops early at the root. Returns the reached bone and the accumulated length.
    pub fn chain_root(&self, start: BoneIndex, num_bones: usize) -> (BoneIndex, f32) {
        let mut bone = start;
        let mut length = 0.0;
        for _ in 0..num_bones {
            let Some(parent) = self.parent(bone) else {
                break;
            };
            if let Some(local) = self.ref_pose_local(bone) {
                length += local.translation.norm();
            }
            bone = parent;
        }
        (bone, length)
    }
}

/// A solved component-space transform for one bone.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoneTransform {
    pub bone: BoneIndex,
    pub transform: Transform,
}

impl BoneTransform {
    #[inline]
    pub fn new(bone: BoneIndex, transform: Transform) -> Self {
        Self { bone, transform }
    }
}

/// Read access to the animated input pose for one evaluation.
pub trait PoseSource {
    /// Component-space transform of `bone`.
    fn component_transform(&self, bone: BoneIndex) -> Option<Transform>;

    /// Root motion extracted this frame, in root space.
    fn root_motion_delta(&self) -> Transform {
        Transform::identity()
    }

    /// Current value of a named curve, if present in the stream.
    fn curve(&self, name: &str) -> Option<f32>;

    fn curve_or(&self, name: &str, default: f32) -> f32 {
        if name.is_empty() {
            return default;
        }
        self.curve(name).unwrap_or(default)
    }
}

/// Plain in-memory pose: component-space transforms indexed by bone, plus curves.
#[derive(Clone, Debug, Default)]
pub struct ComponentPose {
    pub transforms: Vec<Transform>,
    pub curves: HashMap<String, f32>,
    pub root_motion: Transform,
}

impl ComponentPose {
    pub fn new(transforms: Vec<Transform>) -> Self {
        Self {
            transforms,
            curves: HashMap::new(),
            root_motion: Transform::identity(),
        }
    }

    /// Reference pose of `skeleton` in component space.
    pub fn from_ref_pose(skeleton: &Skeleton) -> Self {
        Self::new(skeleton.ref_pose_component())
    }

    pub fn set_curve(&mut self, name: impl Into<String>, value: f32) {
        self.curves.insert(name.into(), value);
    }

    pub fn set(&mut self, bone: BoneIndex, transform: Transform) {
        if let Some(slot) = self.transforms.get_mut(bone) {
            *slot = transform;
        }
    }

    pub fn translate(&mut self, bone: BoneIndex, offset: Vec3) {
        if let Some(slot) = self.transforms.get_mut(bone) {
            slot.translation += offset;
        }
    }
}

impl PoseSource for ComponentPose {
    fn component_transform(&self, bone: BoneIndex) -> Option<Transform> {
        self.transforms.get(bone).copied()
    }

    fn root_motion_delta(&self) -> Transform {
        self.root_motion
    }

    fn curve(&self, name: &str) -> Option<f32> {
        self.curves.get(name).copied()
    }
}
