// src/formation/sim.rs
//! The explicit simulation loop: one leader, a follower arena, one formation.
//!
//! Tick order: leader advances, history records and evicts, triggers fire,
//! grid points recompute, followers advance.

use bevy::prelude::*;

use super::coordinator::{Formation, Reposition};
use super::error::FormationError;
use super::events::FormationEvent;
use super::follower::{Follower, FollowerId, FollowerStatus, FollowerTick};
use super::history::{LeaderHistory, LeaderSample};
use super::leader::{LeaderMotionSource, LeaderTracker};
use super::shape::{build_offsets, ShapeSpec};
use super::triggers::{FormationTrigger, TriggerAction, TriggerSet};
use crate::config::FormationSettings;
use crate::terrain::surface::SurfaceQuery;

/// Follower speeds below this count as at rest.
const REST_SPEED: f32 = 1e-3;

#[derive(Resource)]
pub struct FormationSim {
    settings: FormationSettings,
    leader_source: Box<dyn LeaderMotionSource>,
    leader: LeaderTracker,
    history: LeaderHistory,
    formation: Formation,
    /// Indexed by `FollowerId.0`.
    followers: Vec<Follower>,
    surface: Box<dyn SurfaceQuery>,
    triggers: TriggerSet,
    events: Vec<FormationEvent>,
    elapsed: f32,
    ticks: u64,
    target_reached: bool,
}

impl FormationSim {
    pub fn new(
        settings: FormationSettings,
        leader_source: impl LeaderMotionSource,
        surface: impl SurfaceQuery,
    ) -> Self {
        let leader = LeaderTracker::new(leader_source.pose());
        let capacity = LeaderHistory::capacity_for(0.0, settings.tick_seconds, settings.history_safety_factor);
        let formation = Formation::new(settings.jitter, settings.seed);
        Self {
            settings,
            leader_source: Box::new(leader_source),
            leader,
            history: LeaderHistory::new(capacity),
            formation,
            followers: Vec::new(),
            surface: Box::new(surface),
            triggers: TriggerSet::default(),
            events: Vec::new(),
            elapsed: 0.0,
            ticks: 0,
            target_reached: false,
        }
    }

    // ---------- Accessors ----------

    pub fn settings(&self) -> &FormationSettings {
        &self.settings
    }

    pub fn leader(&self) -> &LeaderTracker {
        &self.leader
    }

    pub fn history(&self) -> &LeaderHistory {
        &self.history
    }

    pub fn formation(&self) -> &Formation {
        &self.formation
    }

    pub fn followers(&self) -> &[Follower] {
        &self.followers
    }

    pub fn follower(&self, id: FollowerId) -> Option<&Follower> {
        self.followers.get(id.0 as usize).filter(|f| f.id == id)
    }

    /// Resolved target of `id`'s grid point, if it has one.
    pub fn follower_target(&self, id: FollowerId) -> Option<Vec3> {
        let gp = self.follower(id)?.grid_point?;
        self.formation.grid_point(gp)?.position()
    }

    pub fn surface(&self) -> &dyn SurfaceQuery {
        self.surface.as_ref()
    }

    pub fn elapsed(&self) -> f32 {
        self.elapsed
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn target_reached(&self) -> bool {
        self.target_reached
    }

    /// Leader has arrived and every follower has come to rest.
    pub fn is_settled(&self) -> bool {
        self.target_reached
            && self.followers.iter().all(|f| {
                f.status == FollowerStatus::Standing || f.velocity.length() < REST_SPEED
            })
    }

    /// Takes every event raised since the last drain.
    pub fn drain_events(&mut self) -> Vec<FormationEvent> {
        std::mem::take(&mut self.events)
    }

    // ---------- Roster & shape ----------

    /// New follower at `position`, not yet in the formation.
    pub fn spawn_follower(&mut self, position: Vec3) -> FollowerId {
        let id = FollowerId(self.followers.len() as u32);
        self.followers.push(Follower::new(id, position, self.settings.seed));
        id
    }

    pub fn add_trigger(&mut self, trigger: FormationTrigger) -> usize {
        self.triggers.push(trigger)
    }

    pub fn triggers(&self) -> &TriggerSet {
        &self.triggers
    }

    /// Builds the configured shape over `roster`. With `reposition`, followers
    /// are first placed into their slots around the leader.
    pub fn build_formation(&mut self, roster: &[FollowerId], reposition: bool) -> Result<(), FormationError> {
        let spec = self.settings.shape;
        let place = reposition.then(|| Reposition { leader: self.leader.pose, surface: self.surface.as_ref() });
        self.formation.build(spec, roster, &mut self.followers, place)?;
        self.after_rebuild(spec);
        Ok(())
    }

    /// Swaps the live shape, optionally with a new roster.
    pub fn change_shape(
        &mut self,
        spec: ShapeSpec,
        roster: Option<Vec<FollowerId>>,
    ) -> Result<(), FormationError> {
        self.formation.change_shape(spec, roster, &mut self.followers)?;
        self.after_rebuild(spec);
        Ok(())
    }

    /// Spawns a follower at `position`, adds it to the roster and rebuilds
    /// with `spec`. Nothing is spawned when `spec` is invalid.
    pub fn add_follower(&mut self, position: Vec3, spec: ShapeSpec) -> Result<FollowerId, FormationError> {
        build_offsets(&spec, self.formation.roster().len() + 1)?;
        let id = self.spawn_follower(position);
        self.formation.add_follower(id, spec, &mut self.followers, None)?;
        self.after_rebuild(spec);
        Ok(id)
    }

    pub fn clear_formation(&mut self) {
        self.formation.clear(&mut self.followers);
    }

    fn after_rebuild(&mut self, spec: ShapeSpec) {
        let capacity = LeaderHistory::capacity_for(
            self.formation.deepest_offset(),
            self.settings.tick_seconds,
            self.settings.history_safety_factor,
        );
        self.history.recapacity(capacity);
        debug!("FormationSim: history capacity now {}", capacity);
        self.events.push(FormationEvent::FormationRebuilt {
            shape: spec,
            followers: self.formation.grid_points().len(),
        });
    }

    /// Sends the leader somewhere new and re-arms the reached signal.
    pub fn set_route(&mut self, waypoints: Vec<Vec3>) {
        info!("FormationSim: new route with {} waypoints", waypoints.len());
        self.leader_source.set_route(waypoints);
        self.target_reached = false;
        self.formation.clear_arrived();
        self.leader.resume();
    }

    // ---------- Tick ----------

    pub fn step(&mut self, dt: f32) {
        let now = self.elapsed + dt;

        let pose = self.leader_source.advance(dt);
        if self.leader.is_halted() {
            self.leader.pose = pose;
        } else {
            self.leader.update(pose, dt, now, &self.history);
            let sample = LeaderSample { position: pose.position, timestamp: now, heading: pose.heading };
            let mut evicted = 0usize;
            let events = &mut self.events;
            self.history.record(sample, |s| {
                evicted += 1;
                events.push(FormationEvent::SampleEvicted(s));
            });
            if evicted > 1 {
                debug!("FormationSim: evicted {} leader samples", evicted);
            }
        }

        if self.leader_source.target_reached() && !self.target_reached {
            self.target_reached = true;
            self.leader.halt();
            self.formation.notify_target_reached(&mut self.followers);
            info!("FormationSim: target reached at t={:.2}", now);
            self.events.push(FormationEvent::TargetReached);
        }

        for index in self.triggers.poll(pose.position) {
            self.fire_trigger(index);
        }

        self.formation
            .recompute_all(&self.leader.pose, &self.history, now, self.leader.average_speed());

        let leader_speed = self.leader.speed();
        let formation = &self.formation;
        let events = &mut self.events;
        for follower in &mut self.followers {
            let grid_target = follower
                .grid_point
                .and_then(|id| formation.grid_point(id))
                .and_then(|gp| gp.position());
            let tick = FollowerTick {
                grid_target,
                leader_speed,
                history: &self.history,
                surface: self.surface.as_ref(),
                settings: &self.settings.follower,
                dt,
                now,
            };
            follower.advance(&tick, |e| events.push(e));
        }

        self.elapsed = now;
        self.ticks += 1;
    }

    fn fire_trigger(&mut self, index: usize) {
        let Some(trigger) = self.triggers.get(index).cloned() else { return };
        info!("FormationSim: trigger {} fired", index);
        self.events.push(FormationEvent::TriggerFired(index));

        let result = match trigger.action {
            TriggerAction::ChangeShape(spec) => self.change_shape(spec, None),
            TriggerAction::AddFollower { spawn_at, shape } => self.add_follower(spawn_at, shape).map(|_| ()),
        };
        if let Err(e) = result {
            warn!("FormationSim: trigger {} left the formation unchanged: {}", index, e);
        }
    }
}
