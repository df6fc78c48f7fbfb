// src/formation/locomotion.rs
//! Smoothed local-frame velocity for whatever drives walk/idle animation and
//! footstep audio. Nothing here plays anything.

use bevy::prelude::*;

use crate::geometry::{heading_forward, rotate_90_cw};

/// Low-pass time constant for the displacement filter (seconds).
pub const CUE_SMOOTHING_SECONDS: f32 = 0.15;
/// Local speed above which the agent counts as moving.
pub const CUE_MOVE_THRESHOLD: f32 = 0.5;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LocomotionCue {
    pub moving: bool,
    /// x = strafe (right positive), y = forward.
    pub local_velocity: Vec2,
    smooth_delta: Vec2,
}

impl LocomotionCue {
    /// Feeds one tick's world-space displacement for an agent facing `heading`.
    pub fn update(&mut self, displacement: Vec3, heading: f32, dt: f32) {
        let forward = heading_forward(heading);
        let right = rotate_90_cw(forward);
        let local = Vec2::new(right.dot(displacement), forward.dot(displacement));

        let smooth = (dt / CUE_SMOOTHING_SECONDS).min(1.0);
        self.smooth_delta = self.smooth_delta.lerp(local, smooth);

        if dt > 1e-5 {
            self.local_velocity = self.smooth_delta / dt;
        }
        self.moving = self.local_velocity.length() > CUE_MOVE_THRESHOLD;
    }

    /// Drop straight to idle.
    pub fn idle(&mut self) {
        *self = Self::default();
    }
}
