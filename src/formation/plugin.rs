// src/formation/plugin.rs

use bevy::prelude::*;

use super::events::FormationEvent;
use super::sim::FormationSim;
use super::systems::{forward_events, spawn_new_followers, step_simulation, sync_transforms};

/// Steps a `FormationSim` resource (inserted by the app) on the fixed clock.
pub struct FormationPlugin {
    /// Fixed step in seconds; should match the sim's `tick_seconds`.
    pub tick_seconds: f32,
}

impl Default for FormationPlugin {
    fn default() -> Self {
        Self { tick_seconds: 0.02 }
    }
}

impl Plugin for FormationPlugin {
    fn build(&self, app: &mut App) {
        app.insert_resource(Time::<Fixed>::from_seconds(self.tick_seconds as f64))
            .add_event::<FormationEvent>()
            .add_systems(
                FixedUpdate,
                (step_simulation, spawn_new_followers, sync_transforms, forward_events)
                    .chain()
                    .run_if(resource_exists::<FormationSim>),
            );
    }
}
