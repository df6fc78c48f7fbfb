// src/formation/leader.rs
//! The leader side: where its motion comes from, and the per-tick kinematics
//! the followers read.

use std::collections::VecDeque;

use bevy::prelude::*;

use super::history::LeaderHistory;
use super::locomotion::LocomotionCue;
use crate::geometry::yaw_towards;

/// Ticks shorter than this produce zero velocity instead of a spike.
pub const MIN_TICK_SECONDS: f32 = 1e-4;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LeaderPose {
    pub position: Vec3,
    /// Yaw (radians) around +Y; 0 faces +Z.
    pub heading: f32,
}

// ---------- Motion source ----------

/// Whatever actually steers the leader (a path follower, a nav agent, a
/// scripted route). Must produce collision-free motion on its own.
pub trait LeaderMotionSource: Send + Sync + 'static {
    /// Moves the leader by one tick and returns the new pose.
    fn advance(&mut self, dt: f32) -> LeaderPose;
    fn pose(&self) -> LeaderPose;
    /// True once the current destination has been reached.
    fn target_reached(&self) -> bool;
    /// Issues a new destination and clears the reached signal.
    fn set_route(&mut self, waypoints: Vec<Vec3>);
}

/// Constant-speed traversal of a supplied polyline.
#[derive(Clone, Debug)]
pub struct WaypointRoute {
    pose: LeaderPose,
    waypoints: VecDeque<Vec3>,
    /// World units per second.
    pub speed: f32,
    has_route: bool,
    arrived: bool,
}

impl WaypointRoute {
    /// Leader standing at `start` with no destination yet.
    pub fn new(start: Vec3, heading: f32, speed: f32) -> Self {
        Self {
            pose: LeaderPose { position: start, heading },
            waypoints: VecDeque::new(),
            speed,
            has_route: false,
            arrived: false,
        }
    }

    pub fn with_route(start: Vec3, speed: f32, waypoints: impl IntoIterator<Item = Vec3>) -> Self {
        let mut route = Self::new(start, 0.0, speed);
        route.set_route(waypoints.into_iter().collect());
        if let Some(h) = route.waypoints.front().and_then(|w| yaw_towards(start, *w)) {
            route.pose.heading = h;
        }
        route
    }

    pub fn remaining(&self) -> impl Iterator<Item = &Vec3> {
        self.waypoints.iter()
    }
}

impl LeaderMotionSource for WaypointRoute {
    fn advance(&mut self, dt: f32) -> LeaderPose {
        let mut budget = self.speed * dt;
        while budget > 0.0 {
            let Some(next) = self.waypoints.front().copied() else { break };
            let to = next - self.pose.position;
            let dist = to.length();
            if let Some(h) = yaw_towards(self.pose.position, next) {
                self.pose.heading = h;
            }
            if dist <= budget {
                self.pose.position = next;
                budget -= dist;
                self.waypoints.pop_front();
            } else {
                self.pose.position += to / dist * budget;
                budget = 0.0;
            }
        }
        if self.has_route && self.waypoints.is_empty() {
            self.arrived = true;
        }
        self.pose
    }

    fn pose(&self) -> LeaderPose {
        self.pose
    }

    fn target_reached(&self) -> bool {
        self.arrived
    }

    fn set_route(&mut self, waypoints: Vec<Vec3>) {
        self.waypoints = waypoints.into();
        self.has_route = !self.waypoints.is_empty();
        self.arrived = false;
    }
}

// ---------- Tracker ----------

/// Leader kinematics as the formation sees them.
#[derive(Clone, Debug, Default)]
pub struct LeaderTracker {
    pub pose: LeaderPose,
    previous: Vec3,
    velocity: Vec3,
    average_speed: f32,
    pub cue: LocomotionCue,
    halted: bool,
}

impl LeaderTracker {
    pub fn new(pose: LeaderPose) -> Self {
        Self { pose, previous: pose.position, ..Default::default() }
    }

    /// Folds in this tick's pose. Average speed is measured against the oldest
    /// retained history sample, so call this before recording `pose`.
    pub fn update(&mut self, pose: LeaderPose, dt: f32, now: f32, history: &LeaderHistory) {
        self.pose = pose;

        self.velocity = if dt > MIN_TICK_SECONDS {
            (pose.position - self.previous) / dt
        } else {
            Vec3::ZERO
        };

        self.average_speed = match history.oldest() {
            Some(oldest) if history.len() > 1 && dt > MIN_TICK_SECONDS => {
                let elapsed = now - oldest.timestamp;
                if elapsed > 0.0 {
                    pose.position.distance(oldest.position) / elapsed
                } else {
                    0.0
                }
            }
            _ => 0.0,
        };

        self.cue.update(pose.position - self.previous, pose.heading, dt);
        self.previous = pose.position;
    }

    /// Destination reached: the leader reads as stationary until `resume`.
    pub fn halt(&mut self) {
        self.halted = true;
        self.velocity = Vec3::ZERO;
        self.average_speed = 0.0;
        self.previous = self.pose.position;
        self.cue.idle();
    }

    pub fn resume(&mut self) {
        self.halted = false;
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn velocity(&self) -> Vec3 {
        self.velocity
    }

    pub fn speed(&self) -> f32 {
        self.velocity.length()
    }

    pub fn average_speed(&self) -> f32 {
        self.average_speed
    }
}
