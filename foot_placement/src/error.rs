//! Error types for the foot placement solver.

use thiserror::Error;

use crate::pose::BoneIndex;

/// Errors surfaced by configuration, skeleton binding and evaluation.
#[derive(Debug, Error)]
pub enum FootPlacementError {
    /// Settings failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A bone named in the settings is not part of the bound skeleton.
    #[error("unresolved bone '{name}'")]
    UnresolvedBone {
        /// The bone name that failed to resolve.
        name: String,
    },

    /// The skeleton hierarchy itself is malformed.
    #[error("invalid skeleton: {0}")]
    InvalidSkeleton(String),

    /// The pose source did not provide a transform for a bound bone.
    #[error("pose has no transform for bone {index}")]
    MissingBoneTransform {
        /// The missing bone index.
        index: BoneIndex,
    },

    /// A solved transform contains NaN or infinity.
    #[error("non-finite transform produced for bone {bone}")]
    NonFiniteTransform {
        /// The bone whose transform was rejected.
        bone: BoneIndex,
    },
}

impl FootPlacementError {
    #[must_use]
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig(reason.into())
    }

    #[must_use]
    pub fn unresolved_bone(name: impl Into<String>) -> Self {
        Self::UnresolvedBone { name: name.into() }
    }

    #[must_use]
    pub fn invalid_skeleton(reason: impl Into<String>) -> Self {
        Self::InvalidSkeleton(reason.into())
    }

    #[must_use]
    pub const fn missing_bone_transform(index: BoneIndex) -> Self {
        Self::MissingBoneTransform { index }
    }

    #[must_use]
    pub const fn non_finite_transform(bone: BoneIndex) -> Self {
        Self::NonFiniteTransform { bone }
    }
}

/// Result type for foot placement operations.
pub type Result<T> = std::result::Result<T, FootPlacementError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_invalid_config() {
        let err = FootPlacementError::invalid_config("no legs");
        assert!(err.to_string().contains("invalid configuration"));
        assert!(err.to_string().contains("no legs"));
    }

    #[test]
    fn error_unresolved_bone() {
        let err = FootPlacementError::unresolved_bone("foot_l");
        assert!(err.to_string().contains("foot_l"));
    }

    #[test]
    fn error_missing_bone_transform() {
        let err = FootPlacementError::missing_bone_transform(7);
        assert!(err.to_string().contains('7'));
    }

    #[test]
    fn error_non_finite_transform() {
        let err = FootPlacementError::non_finite_transform(3);
        assert!(err.to_string().contains("non-finite"));
    }
}
