// src/formation/history.rs
//! Bounded, time-ordered record of where the leader has been.

use std::collections::VecDeque;

use bevy::prelude::*;

/// Smallest capacity handed out by `capacity_for`; average leader speed needs
/// at least two retained samples.
pub const MIN_HISTORY_CAPACITY: usize = 2;

/// One recorded leader pose.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LeaderSample {
    pub position: Vec3,
    /// Simulation time (seconds) the pose was recorded at.
    pub timestamp: f32,
    /// Yaw (radians) around +Y.
    pub heading: f32,
}

/// Oldest-first ring of leader samples, trimmed at the head on every `record`.
#[derive(Clone, Debug)]
pub struct LeaderHistory {
    samples: VecDeque<LeaderSample>,
    capacity: usize,
}

impl LeaderHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { samples: VecDeque::with_capacity(capacity + 1), capacity }
    }

    /// Samples needed to cover the deepest slot, times `safety` to leave room for
    /// stuck followers that drop further back.
    pub fn capacity_for(deepest_offset_y: f32, tick_seconds: f32, safety: f32) -> usize {
        if tick_seconds <= 0.0 {
            return MIN_HISTORY_CAPACITY;
        }
        let needed = (safety * deepest_offset_y.abs() / tick_seconds) as usize;
        needed.max(MIN_HISTORY_CAPACITY)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// New bound; applied by the next `record`.
    pub fn recapacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
    }

    /// Appends `sample`, then evicts from the head until the bound holds.
    /// Every evicted sample is handed to `on_evict`. A sample older than the
    /// newest one is dropped and `false` is returned.
    pub fn record(&mut self, sample: LeaderSample, mut on_evict: impl FnMut(LeaderSample)) -> bool {
        if let Some(newest) = self.samples.back() {
            if sample.timestamp < newest.timestamp {
                warn!(
                    "LeaderHistory: dropping sample at t={} older than newest t={}",
                    sample.timestamp, newest.timestamp
                );
                return false;
            }
        }
        self.samples.push_back(sample);
        while self.samples.len() > self.capacity {
            if let Some(evicted) = self.samples.pop_front() {
                on_evict(evicted);
            }
        }
        true
    }

    /// Most recent sample recorded at or before `now - lag`.
    /// `None` while the history does not reach back that far.
    pub fn sample_at_lag(&self, now: f32, lag: f32) -> Option<LeaderSample> {
        let cutoff = now - lag;
        self.samples.iter().rev().find(|s| s.timestamp <= cutoff).copied()
    }

    /// Sample closest to `point` (Euclidean). Linear in the history length, so
    /// keep it off the per-tick path. Ties go to the newer sample.
    pub fn sample_nearest(&self, point: Vec3) -> Option<LeaderSample> {
        let mut best: Option<(f32, LeaderSample)> = None;
        for s in self.samples.iter().rev() {
            let d = s.position.distance_squared(point);
            if best.map_or(true, |(bd, _)| d < bd) {
                best = Some((d, *s));
            }
        }
        best.map(|(_, s)| s)
    }

    pub fn oldest(&self) -> Option<&LeaderSample> {
        self.samples.front()
    }

    pub fn newest(&self) -> Option<&LeaderSample> {
        self.samples.back()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LeaderSample> {
        self.samples.iter()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}
