// src/formation/events.rs

use bevy::prelude::*;

use super::follower::FollowerId;
use super::history::LeaderSample;
use super::shape::ShapeSpec;

/// Everything observable that happened during a tick. Drained by the caller.
#[derive(Event, Clone, Debug, PartialEq)]
pub enum FormationEvent {
    /// The leader's motion source reported its destination reached.
    TargetReached,
    /// A sample fell off the head of the leader history.
    SampleEvicted(LeaderSample),
    /// The follower hit an obstacle or left the terrain and was pulled back.
    FollowerStuck(FollowerId),
    EvasionStarted { follower: FollowerId, target: Vec3 },
    EvasionEnded(FollowerId),
    /// Grid points were rebuilt for `followers` slots.
    FormationRebuilt { shape: ShapeSpec, followers: usize },
    /// Index into the simulation's trigger list.
    TriggerFired(usize),
}
