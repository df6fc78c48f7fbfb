// src/formation/error.rs

use super::follower::FollowerId;
use super::shape::ShapeKind;

/// Configuration errors. The operation that returns one has not touched any
/// formation state.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum FormationError {
    #[error("grid spacing must be positive and finite, got {0}")]
    NonPositiveSpacing(f32),
    #[error("{shape:?} angle cannot be zero")]
    ZeroAngle { shape: ShapeKind },
    #[error("{shape:?} shape parameter cannot be zero")]
    ZeroParameter { shape: ShapeKind },
    #[error("unsupported formation shape {0:?}")]
    UnsupportedShape(ShapeKind),
    #[error("slot {slot} would place a follower ahead of the leader (offset y = {y})")]
    PositiveOffset { slot: usize, y: f32 },
    #[error("formation already has grid points; clear it before building")]
    FormationNotEmpty,
    #[error("follower {0:?} does not exist")]
    UnknownFollower(FollowerId),
    #[error("follower {0:?} appears more than once in the roster")]
    DuplicateFollower(FollowerId),
}
