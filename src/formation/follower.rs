// src/formation/follower.rs
//! Follower motion: steer towards the assigned grid point at a pace tied to the
//! leader's, classify the ground under every step, and recover when stuck.

use std::f32::consts::TAU;

use bevy::prelude::*;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use super::events::FormationEvent;
use super::grid_point::GridPointId;
use super::history::LeaderHistory;
use super::locomotion::LocomotionCue;
use crate::geometry::{rotate_about_y_deg, yaw_towards, LayerMask};
use crate::terrain::surface::{probe_surface, SurfaceQuery};

/// Leader speeds below this count as stopped.
pub const LEADER_STOPPED_SPEED: f32 = 1e-4;
/// Closer than this to the target there is nothing left to do.
pub const ARRIVAL_DISTANCE: f32 = 0.01;
/// Evasion ends once the evasion target is this close. Also the minimum
/// distance at which the follower turns to face its target.
pub const EVASION_REACHED_DISTANCE: f32 = 0.1;

/// Stable handle into the simulation's follower arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FollowerId(pub u32);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum FollowerStatus {
    #[default]
    Standing,
    Moving,
    Stuck,
    Evading,
}

/// Recovery policy, evaluated only while `Stuck`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StuckMode {
    /// Stay put until something else changes.
    #[default]
    DoNothing,
    /// Head for a random point around the follower.
    RandomWalk,
    /// Head back towards the leader's recorded (obstacle-free) path.
    MoveToLeaderPath,
}

/// Tunables shared by every follower in a formation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FollowerSettings {
    #[serde(default)]
    pub stuck_mode: StuckMode,
    /// Pace multiplier used while the follower is further from its target than
    /// the leader moves in one tick.
    #[serde(default = "default_catch_up_multiplier")]
    pub catch_up_multiplier: f32,
    /// Max deviation (degrees) from the direction to the leader path.
    #[serde(default = "default_angle_towards_leader_path")]
    pub angle_towards_leader_path: f32,
    /// Seconds before an evasion is abandoned.
    #[serde(default = "default_max_evasion_duration")]
    pub max_evasion_duration: f32,
}

fn default_catch_up_multiplier() -> f32 {
    2.0
}
fn default_angle_towards_leader_path() -> f32 {
    45.0
}
fn default_max_evasion_duration() -> f32 {
    2.0
}

impl Default for FollowerSettings {
    fn default() -> Self {
        Self {
            stuck_mode: StuckMode::default(),
            catch_up_multiplier: default_catch_up_multiplier(),
            angle_towards_leader_path: default_angle_towards_leader_path(),
            max_evasion_duration: default_max_evasion_duration(),
        }
    }
}

/// Read-only inputs for one follower tick.
pub struct FollowerTick<'a> {
    /// Resolved grid point position, if the follower has one.
    pub grid_target: Option<Vec3>,
    /// Instantaneous leader speed this tick.
    pub leader_speed: f32,
    pub history: &'a LeaderHistory,
    pub surface: &'a dyn SurfaceQuery,
    pub settings: &'a FollowerSettings,
    pub dt: f32,
    /// Simulation time at the end of this tick.
    pub now: f32,
}

// ---------- Follower ----------

#[derive(Clone, Debug)]
pub struct Follower {
    pub id: FollowerId,
    pub position: Vec3,
    /// Yaw (radians) about +Y.
    pub heading: f32,
    pub velocity: Vec3,
    pub status: FollowerStatus,
    /// Weak link into the formation's grid points; the formation owns them.
    pub grid_point: Option<GridPointId>,
    pub cue: LocomotionCue,
    evasion_target: Option<Vec3>,
    evasion_started: f32,
    last_good: Vec3,
    rng: ChaCha8Rng,
}

impl Follower {
    /// A standing follower at `position`, which is also its first known-good
    /// ground position.
    pub fn new(id: FollowerId, position: Vec3, seed: u64) -> Self {
        Self {
            id,
            position,
            heading: 0.0,
            velocity: Vec3::ZERO,
            status: FollowerStatus::Standing,
            grid_point: None,
            cue: LocomotionCue::default(),
            evasion_target: None,
            evasion_started: 0.0,
            last_good: position,
            rng: rng_for_follower(seed, id),
        }
    }

    pub fn evasion_target(&self) -> Option<Vec3> {
        self.evasion_target
    }

    pub fn last_known_good(&self) -> Vec3 {
        self.last_good
    }

    /// Moves the follower outright (placement, not locomotion).
    pub fn teleport(&mut self, position: Vec3) {
        self.position = position;
        self.last_good = position;
        self.velocity = Vec3::ZERO;
    }

    /// Drops the grid point link, e.g. while the formation is rebuilt.
    pub fn unlink(&mut self) {
        self.grid_point = None;
    }

    /// One step of the motion state machine.
    pub fn advance(&mut self, tick: &FollowerTick, mut emit: impl FnMut(FormationEvent)) {
        let before = self.position;
        self.step(tick, &mut emit);

        self.velocity = if tick.dt > 1e-4 { (self.position - before) / tick.dt } else { Vec3::ZERO };
        self.cue.update(self.position - before, self.heading, tick.dt);
    }

    fn step(&mut self, tick: &FollowerTick, emit: &mut impl FnMut(FormationEvent)) {
        if self.grid_point.is_none() {
            return;
        }
        let Some(grid_target) = tick.grid_target else { return };
        let settings = tick.settings;

        // arrival: leader stopped and we're on the point
        if tick.leader_speed < LEADER_STOPPED_SPEED
            && self.position.distance(grid_target) < ARRIVAL_DISTANCE
        {
            self.status = FollowerStatus::Standing;
            return;
        }

        if self.status == FollowerStatus::Stuck && !self.recover(tick, emit) {
            return;
        }

        let mut target = grid_target;
        if self.status == FollowerStatus::Evading {
            if let Some(evasion) = self.evasion_target {
                let timed_out = tick.now - self.evasion_started >= settings.max_evasion_duration;
                if timed_out || self.position.distance(evasion) < EVASION_REACHED_DISTANCE {
                    self.end_evasion(emit);
                } else {
                    target = evasion;
                }
            } else {
                self.status = FollowerStatus::Moving;
            }
        }

        let distance = self.position.distance(target);
        if distance < ARRIVAL_DISTANCE {
            self.status = FollowerStatus::Standing;
            return;
        }

        let reach = tick.leader_speed * tick.dt;
        let fraction = if distance > reach {
            reach * settings.catch_up_multiplier / distance
        } else {
            reach / distance
        };
        let stepped = self.position.lerp(target, fraction.clamp(0.0, 1.0));

        self.classify_ground(stepped, tick.surface, emit);

        if distance > EVASION_REACHED_DISTANCE {
            if let Some(h) = yaw_towards(self.position, target) {
                self.heading = h;
            }
        }
    }

    /// Applies the stuck policy. Returns false when the follower stays put
    /// this tick.
    fn recover(&mut self, tick: &FollowerTick, emit: &mut impl FnMut(FormationEvent)) -> bool {
        let settings = tick.settings;
        let target = match settings.stuck_mode {
            StuckMode::DoNothing => return false,
            StuckMode::RandomWalk => {
                // how far the follower can get at catch-up pace within one evasion window
                let radius =
                    tick.leader_speed * settings.catch_up_multiplier * settings.max_evasion_duration;
                let angle = self.rng.random::<f32>() * TAU;
                let candidate = self.position + Vec3::new(angle.cos(), 0.0, angle.sin()) * radius;
                snap_to_terrain(tick.surface, candidate)
            }
            StuckMode::MoveToLeaderPath => {
                let Some(nearest) = tick.history.sample_nearest(self.position) else {
                    debug!("Follower {:?}: stuck with no leader path to return to", self.id);
                    return false;
                };
                let a = settings.angle_towards_leader_path.abs();
                let deviation = if a > 0.0 { self.rng.random_range(-a..=a) } else { 0.0 };
                let direction = rotate_about_y_deg(nearest.position - self.position, deviation);
                snap_to_terrain(tick.surface, self.position + direction)
            }
        };

        self.status = FollowerStatus::Evading;
        self.evasion_target = Some(target);
        self.evasion_started = tick.now;
        debug!("Follower {:?}: evading towards {:?}", self.id, target);
        emit(FormationEvent::EvasionStarted { follower: self.id, target });
        true
    }

    fn end_evasion(&mut self, emit: &mut impl FnMut(FormationEvent)) {
        self.status = FollowerStatus::Moving;
        self.evasion_target = None;
        self.evasion_started = 0.0;
        debug!("Follower {:?}: evasion over", self.id);
        emit(FormationEvent::EvasionEnded(self.id));
    }

    /// Terrain under `stepped` accepts the step; an obstacle or nothing at all
    /// sends the follower back to the last terrain it stood on.
    fn classify_ground(
        &mut self,
        stepped: Vec3,
        surface: &dyn SurfaceQuery,
        emit: &mut impl FnMut(FormationEvent),
    ) {
        match probe_surface(surface, stepped, LayerMask::TERRAIN_AND_OBSTACLES) {
            Some(hit) if hit.is_terrain() => {
                self.position = hit.point;
                self.last_good = hit.point;
                if self.status != FollowerStatus::Evading {
                    self.status = FollowerStatus::Moving;
                }
            }
            other => {
                if other.is_none() {
                    debug!("Follower {:?}: no surface under {:?}", self.id, stepped);
                }
                self.position = self.last_good;
                if self.status != FollowerStatus::Stuck {
                    debug!("Follower {:?}: stuck at {:?}", self.id, self.position);
                    emit(FormationEvent::FollowerStuck(self.id));
                }
                self.status = FollowerStatus::Stuck;
            }
        }
    }
}

/// Snaps onto terrain when there is terrain below, else keeps the point as is.
fn snap_to_terrain(surface: &dyn SurfaceQuery, point: Vec3) -> Vec3 {
    probe_surface(surface, point, LayerMask::TERRAIN).map_or(point, |hit| hit.point)
}

#[inline]
fn rng_for_follower(seed: u64, id: FollowerId) -> ChaCha8Rng {
    let mix = seed ^ ((id.0 as u64) << 32) ^ 0xF011_0E2D_EC0D_E5A1u64;
    ChaCha8Rng::seed_from_u64(mix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formation::history::LeaderSample;
    use crate::terrain::heightfield::{Footprint, HeightfieldTerrain, Obstacle};
    use crate::terrain::surface::FlatSurface;

    const DT: f32 = 0.02;

    fn linked(position: Vec3) -> Follower {
        let mut f = Follower::new(FollowerId(1), position, 7);
        f.grid_point = Some(GridPointId(0));
        f
    }

    /// Flat 200 x 200 field with a wall across z in [4, 6].
    fn walled() -> HeightfieldTerrain {
        HeightfieldTerrain::flat(Vec2::splat(-100.0), Vec2::splat(200.0), 0.0).with_obstacles([
            Obstacle {
                footprint: Footprint::Rect { center: Vec2::new(0.0, 5.0), half: Vec2::new(3.0, 1.0) },
                top: 3.0,
            },
        ])
    }

    fn tick<'a>(
        target: Vec3,
        history: &'a LeaderHistory,
        surface: &'a dyn SurfaceQuery,
        settings: &'a FollowerSettings,
        now: f32,
    ) -> FollowerTick<'a> {
        FollowerTick {
            grid_target: Some(target),
            leader_speed: 1.0,
            history,
            surface,
            settings,
            dt: DT,
            now,
        }
    }

    #[test]
    fn starts_moving_over_terrain() {
        let history = LeaderHistory::new(4);
        let settings = FollowerSettings::default();
        let surface = FlatSurface::default();
        let mut f = linked(Vec3::ZERO);
        assert_eq!(f.status, FollowerStatus::Standing);

        f.advance(&tick(Vec3::new(0.0, 0.0, 5.0), &history, &surface, &settings, DT), |_| {});
        assert_eq!(f.status, FollowerStatus::Moving);
        // far from the target: catch-up pace = speed * dt * multiplier
        assert!((f.position.z - 1.0 * DT * 2.0).abs() < 1e-5);
        assert_eq!(f.heading, 0.0);
    }

    #[test]
    fn never_overshoots_a_near_target() {
        let history = LeaderHistory::new(4);
        let settings = FollowerSettings { catch_up_multiplier: 50.0, ..Default::default() };
        let surface = FlatSurface::default();
        let mut f = linked(Vec3::ZERO);
        let target = Vec3::new(0.05, 0.0, 0.0);
        f.advance(&tick(target, &history, &surface, &settings, DT), |_| {});
        assert!(f.position.distance(target) < 1e-5);
    }

    #[test]
    fn stepping_onto_an_obstacle_reverts_and_sticks() {
        let history = LeaderHistory::new(4);
        let settings = FollowerSettings::default();
        let terrain = walled();
        // one step from z = 3.99 lands inside the wall
        let mut f = linked(Vec3::new(0.0, 0.0, 3.99));
        let mut events = Vec::new();
        f.advance(&tick(Vec3::new(0.0, 0.0, 10.0), &history, &terrain, &settings, DT), |e| {
            events.push(e)
        });
        assert_eq!(f.status, FollowerStatus::Stuck);
        assert_eq!(f.position, Vec3::new(0.0, 0.0, 3.99));
        assert_eq!(events, vec![FormationEvent::FollowerStuck(FollowerId(1))]);
    }

    #[test]
    fn walking_off_the_terrain_reverts_to_last_good_ground() {
        let history = LeaderHistory::new(4);
        let settings = FollowerSettings::default();
        let terrain = HeightfieldTerrain::flat(Vec2::ZERO, Vec2::splat(10.0), 0.0);
        let target = Vec3::new(5.0, 0.0, 20.0);
        let mut f = linked(Vec3::new(5.0, 0.0, 9.95));

        f.advance(&tick(target, &history, &terrain, &settings, DT), |_| {});
        assert_eq!(f.status, FollowerStatus::Moving);
        let edge = f.last_known_good();
        assert!((edge.z - 9.99).abs() < 1e-4);

        // next catch-up step lands at z = 10.03, past the edge
        let mut events = Vec::new();
        f.advance(&tick(target, &history, &terrain, &settings, 2.0 * DT), |e| events.push(e));
        assert_eq!(f.status, FollowerStatus::Stuck);
        assert_eq!(f.position, edge);
        assert_eq!(f.last_known_good(), edge);
        assert_eq!(events, vec![FormationEvent::FollowerStuck(FollowerId(1))]);
    }

    #[test]
    fn move_to_leader_path_without_history_stays_stuck() {
        let history = LeaderHistory::new(4);
        let settings = FollowerSettings { stuck_mode: StuckMode::MoveToLeaderPath, ..Default::default() };
        let surface = FlatSurface::default();
        let start = Vec3::new(0.0, 0.0, 4.0);
        let mut f = linked(start);
        f.status = FollowerStatus::Stuck;

        let mut events = Vec::new();
        for k in 1..10 {
            f.advance(&tick(Vec3::new(0.0, 0.0, 20.0), &history, &surface, &settings, k as f32 * DT), |e| {
                events.push(e)
            });
            assert_eq!(f.status, FollowerStatus::Stuck);
            assert_eq!(f.position, start);
            assert_eq!(f.evasion_target(), None);
        }
        assert!(events.is_empty());
    }

    #[test]
    fn do_nothing_stays_stuck_in_place() {
        let history = LeaderHistory::new(4);
        let settings = FollowerSettings::default();
        let terrain = walled();
        let mut f = linked(Vec3::new(0.0, 0.0, 3.99));
        let target = Vec3::new(0.0, 0.0, 10.0);
        f.advance(&tick(target, &history, &terrain, &settings, DT), |_| {});
        assert_eq!(f.status, FollowerStatus::Stuck);

        for k in 2..50 {
            f.advance(&tick(target, &history, &terrain, &settings, k as f32 * DT), |_| {});
            assert_eq!(f.status, FollowerStatus::Stuck);
            assert_eq!(f.position, Vec3::new(0.0, 0.0, 3.99));
        }
    }

    #[test]
    fn random_walk_evasion_ends_within_the_window() {
        let history = LeaderHistory::new(4);
        let settings = FollowerSettings { stuck_mode: StuckMode::RandomWalk, ..Default::default() };
        let terrain = walled();
        let mut f = linked(Vec3::new(0.0, 0.0, 3.99));
        let target = Vec3::new(0.0, 0.0, 10.0);
        let mut events = Vec::new();

        f.advance(&tick(target, &history, &terrain, &settings, DT), |e| events.push(e));
        assert_eq!(f.status, FollowerStatus::Stuck);

        f.advance(&tick(target, &history, &terrain, &settings, 2.0 * DT), |e| events.push(e));
        assert!(matches!(f.status, FollowerStatus::Evading | FollowerStatus::Stuck));
        assert!(events
            .iter()
            .any(|e| matches!(e, FormationEvent::EvasionStarted { follower: FollowerId(1), .. })));

        // a fresh evasion restarts whenever the random heading runs back into
        // the wall; whichever one sticks must end inside the window
        let window = (settings.max_evasion_duration / DT) as usize;
        let mut started_at = 2usize;
        let mut ended_at = None;
        for k in 3..(3 + 20 * window) {
            f.advance(&tick(target, &history, &terrain, &settings, k as f32 * DT), |e| match e {
                FormationEvent::EvasionStarted { .. } => started_at = k,
                FormationEvent::EvasionEnded(_) => ended_at = Some(k),
                _ => {}
            });
            if ended_at.is_some() {
                break;
            }
        }
        let ended_at = ended_at.expect("evasion never ended");
        assert!(ended_at - started_at <= window + 2);
        assert_eq!(f.status, FollowerStatus::Moving);
    }

    #[test]
    fn move_to_leader_path_aims_at_nearest_sample() {
        let mut history = LeaderHistory::new(16);
        for k in 0..10 {
            let t = k as f32;
            history.record(
                LeaderSample { position: Vec3::new(10.0, 0.0, t), timestamp: t, heading: 0.0 },
                |_| {},
            );
        }
        let settings = FollowerSettings {
            stuck_mode: StuckMode::MoveToLeaderPath,
            angle_towards_leader_path: 0.0,
            ..Default::default()
        };
        let surface = FlatSurface::default();
        let mut f = linked(Vec3::new(0.0, 0.0, 4.0));
        f.status = FollowerStatus::Stuck;

        let mut events = Vec::new();
        f.advance(&tick(Vec3::new(0.0, 0.0, 20.0), &history, &surface, &settings, DT), |e| {
            events.push(e)
        });
        let expected = Vec3::new(10.0, 0.0, 4.0);
        assert_eq!(
            events.first(),
            Some(&FormationEvent::EvasionStarted { follower: FollowerId(1), target: expected })
        );
        assert_eq!(f.status, FollowerStatus::Evading);
        assert!(f.position.x > 0.0);
    }

    #[test]
    fn stands_when_leader_stopped_on_the_point() {
        let history = LeaderHistory::new(4);
        let settings = FollowerSettings::default();
        let surface = FlatSurface::default();
        let mut f = linked(Vec3::ZERO);
        f.status = FollowerStatus::Moving;
        let mut t = tick(Vec3::new(0.0, 0.0, 0.005), &history, &surface, &settings, DT);
        t.leader_speed = 0.0;
        f.advance(&t, |_| {});
        assert_eq!(f.status, FollowerStatus::Standing);
        assert_eq!(f.position, Vec3::ZERO);
    }

    #[test]
    fn unlinked_follower_does_nothing() {
        let history = LeaderHistory::new(4);
        let settings = FollowerSettings::default();
        let surface = FlatSurface::default();
        let mut f = Follower::new(FollowerId(3), Vec3::ONE, 1);
        f.advance(&tick(Vec3::ZERO, &history, &surface, &settings, DT), |_| {});
        assert_eq!(f.position, Vec3::ONE);
        assert_eq!(f.status, FollowerStatus::Standing);
    }
}
