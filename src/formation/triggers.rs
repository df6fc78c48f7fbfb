// src/formation/triggers.rs
//! One-shot areas that reshape or grow the formation when the leader walks in.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use super::shape::ShapeSpec;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum TriggerAction {
    /// Rebuild the live formation with a new shape; roster unchanged.
    ChangeShape(ShapeSpec),
    /// Spawn a follower at `spawn_at`, add it and rebuild with `shape`.
    AddFollower { spawn_at: Vec3, shape: ShapeSpec },
}

/// Vertical cylinder around `center` (XZ distance only).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FormationTrigger {
    pub center: Vec3,
    pub radius: f32,
    pub action: TriggerAction,
}

impl FormationTrigger {
    pub fn contains(&self, point: Vec3) -> bool {
        let d = Vec2::new(point.x - self.center.x, point.z - self.center.z);
        d.length_squared() <= self.radius * self.radius
    }
}

/// Triggers plus which of them already went off.
#[derive(Clone, Debug, Default)]
pub struct TriggerSet {
    triggers: Vec<FormationTrigger>,
    fired: Vec<bool>,
}

impl TriggerSet {
    pub fn push(&mut self, trigger: FormationTrigger) -> usize {
        self.triggers.push(trigger);
        self.fired.push(false);
        self.triggers.len() - 1
    }

    pub fn get(&self, index: usize) -> Option<&FormationTrigger> {
        self.triggers.get(index)
    }

    pub fn len(&self) -> usize {
        self.triggers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triggers.is_empty()
    }

    pub fn has_fired(&self, index: usize) -> bool {
        self.fired.get(index).copied().unwrap_or(false)
    }

    /// Indices of triggers that `leader` is inside for the first time. Each
    /// index is returned at most once over the set's lifetime.
    pub fn poll(&mut self, leader: Vec3) -> Vec<usize> {
        let mut hits = Vec::new();
        for (i, (trigger, fired)) in self.triggers.iter().zip(self.fired.iter_mut()).enumerate() {
            if !*fired && trigger.contains(leader) {
                *fired = true;
                hits.push(i);
            }
        }
        hits
    }
}

impl FromIterator<FormationTrigger> for TriggerSet {
    fn from_iter<I: IntoIterator<Item = FormationTrigger>>(iter: I) -> Self {
        let mut set = TriggerSet::default();
        for trigger in iter {
            set.push(trigger);
        }
        set
    }
}
