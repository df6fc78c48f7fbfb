// src/formation/components.rs

use bevy::prelude::*;

use super::follower::FollowerId;
use super::locomotion::LocomotionCue;

/// The entity whose transform mirrors the simulated leader.
#[derive(Component)]
pub struct LeaderBody;

/// Mirrors one simulated follower.
#[derive(Component, Deref)]
pub struct FollowerBody(pub FollowerId);

/// Latest locomotion cue for whatever animates the body.
#[derive(Component, Default, Deref, DerefMut)]
pub struct Locomotion(pub LocomotionCue);
