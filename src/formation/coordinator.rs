// src/formation/coordinator.rs
//! Owns the grid points of one formation and the follower roster they were
//! built for. Builds, clears and swaps shapes; never half-rebuilt.

use std::collections::HashSet;

use bevy::prelude::*;

use super::error::FormationError;
use super::follower::{Follower, FollowerId};
use super::grid_point::{GridPoint, GridPointId};
use super::history::LeaderHistory;
use super::leader::LeaderPose;
use super::shape::{apply_jitter, build_offsets, deepest_offset, JitterSettings, ShapeSpec};
use crate::geometry::{offset_position_on_surface, LayerMask};
use crate::terrain::surface::SurfaceQuery;

/// Leader pose plus surface to place followers on when building with
/// repositioning.
pub struct Reposition<'a> {
    pub leader: LeaderPose,
    pub surface: &'a dyn SurfaceQuery,
}

#[derive(Clone, Debug, Default)]
pub struct Formation {
    shape: Option<ShapeSpec>,
    jitter: JitterSettings,
    seed: u64,
    /// Followers in slot order. May be longer than `grid_points` when a square
    /// clipped the roster.
    roster: Vec<FollowerId>,
    grid_points: Vec<GridPoint>,
    deepest: f32,
    arrived: bool,
}

impl Formation {
    /// Empty formation; `jitter` and `seed` apply to every later build.
    pub fn new(jitter: JitterSettings, seed: u64) -> Self {
        Self { jitter, seed, ..Default::default() }
    }

    pub fn shape(&self) -> Option<&ShapeSpec> {
        self.shape.as_ref()
    }

    pub fn roster(&self) -> &[FollowerId] {
        &self.roster
    }

    pub fn grid_points(&self) -> &[GridPoint] {
        &self.grid_points
    }

    pub fn grid_point(&self, id: GridPointId) -> Option<&GridPoint> {
        self.grid_points.get(id.0 as usize)
    }

    pub fn is_empty(&self) -> bool {
        self.grid_points.is_empty()
    }

    /// Most negative slot `y` of the current shape; 0 when empty.
    pub fn deepest_offset(&self) -> f32 {
        self.deepest
    }

    pub fn is_arrived(&self) -> bool {
        self.arrived
    }

    // ---------- Building ----------

    /// Builds grid points for `roster` (slot order). Fails on a formation that
    /// still has grid points; `clear` first.
    pub fn build(
        &mut self,
        spec: ShapeSpec,
        roster: &[FollowerId],
        followers: &mut [Follower],
        reposition: Option<Reposition>,
    ) -> Result<(), FormationError> {
        if !self.grid_points.is_empty() {
            return Err(FormationError::FormationNotEmpty);
        }
        let offsets = self.plan(&spec, roster, followers)?;
        self.install(spec, roster, offsets, followers, reposition);
        Ok(())
    }

    /// Unlinks every follower and drops all grid points. The roster is kept.
    pub fn clear(&mut self, followers: &mut [Follower]) {
        for gp in &self.grid_points {
            if let Some(f) = member(followers, gp.follower) {
                f.unlink();
            }
        }
        self.grid_points.clear();
        self.deepest = 0.0;
    }

    /// Swaps to `spec`, keeping the roster unless `roster` is given. Validates
    /// before touching anything, so an error leaves the old shape in place.
    pub fn change_shape(
        &mut self,
        spec: ShapeSpec,
        roster: Option<Vec<FollowerId>>,
        followers: &mut [Follower],
    ) -> Result<(), FormationError> {
        let roster = roster.unwrap_or_else(|| self.roster.clone());
        self.rebuild(spec, &roster, followers, None)
    }

    /// Appends `id` to the roster and rebuilds with `spec`. Without
    /// `reposition` the newcomer walks to its slot and nobody is teleported.
    pub fn add_follower(
        &mut self,
        id: FollowerId,
        spec: ShapeSpec,
        followers: &mut [Follower],
        reposition: Option<Reposition>,
    ) -> Result<(), FormationError> {
        let mut roster = self.roster.clone();
        if !roster.contains(&id) {
            roster.push(id);
        }
        self.rebuild(spec, &roster, followers, reposition)
    }

    fn rebuild(
        &mut self,
        spec: ShapeSpec,
        roster: &[FollowerId],
        followers: &mut [Follower],
        reposition: Option<Reposition>,
    ) -> Result<(), FormationError> {
        let offsets = self.plan(&spec, roster, followers)?;
        self.clear(followers);
        self.install(spec, roster, offsets, followers, reposition);
        Ok(())
    }

    fn plan(
        &self,
        spec: &ShapeSpec,
        roster: &[FollowerId],
        followers: &[Follower],
    ) -> Result<Vec<Vec2>, FormationError> {
        let known = |id: &FollowerId| followers.get(id.0 as usize).is_some_and(|f| f.id == *id);
        if let Some(missing) = roster.iter().find(|id| !known(*id)) {
            return Err(FormationError::UnknownFollower(*missing));
        }
        let mut seen = HashSet::with_capacity(roster.len());
        if let Some(repeated) = roster.iter().find(|id| !seen.insert(**id)) {
            return Err(FormationError::DuplicateFollower(*repeated));
        }
        let mut offsets = build_offsets(spec, roster.len())?;
        apply_jitter(&mut offsets, &self.jitter, self.seed);
        Ok(offsets)
    }

    fn install(
        &mut self,
        spec: ShapeSpec,
        roster: &[FollowerId],
        offsets: Vec<Vec2>,
        followers: &mut [Follower],
        reposition: Option<Reposition>,
    ) {
        self.grid_points = offsets
            .iter()
            .zip(roster)
            .enumerate()
            .map(|(slot, (offset, id))| GridPoint::new(GridPointId(slot as u32), *offset, *id))
            .collect();

        for (slot, id) in roster.iter().enumerate() {
            let Some(f) = member(followers, *id) else { continue };
            let Some(gp) = self.grid_points.get(slot) else {
                // clipped out of the shape
                f.unlink();
                continue;
            };
            f.grid_point = Some(gp.id);

            if let Some(place) = &reposition {
                let placed = offset_position_on_surface(
                    place.leader.position,
                    place.leader.heading,
                    gp.offset,
                    place.surface,
                    LayerMask::TERRAIN,
                );
                match placed {
                    Some(p) => {
                        f.teleport(p);
                        f.heading = place.leader.heading;
                    }
                    None => warn!("Formation: no terrain under slot {} for follower {:?}", slot, id),
                }
            }
        }

        self.deepest = deepest_offset(offsets);
        self.roster = roster.to_vec();
        self.shape = Some(spec);
        info!(
            "Formation: built {:?} (spacing {}, parameter {}) with {} slots",
            spec.kind,
            spec.spacing,
            spec.parameter,
            self.grid_points.len()
        );
    }

    // ---------- Per tick ----------

    pub fn recompute_all(
        &mut self,
        leader: &LeaderPose,
        history: &LeaderHistory,
        now: f32,
        leader_average_speed: f32,
    ) {
        for gp in &mut self.grid_points {
            gp.recompute(leader, history, now, leader_average_speed);
        }
    }

    /// Destination reached: every member drops to idle.
    pub fn notify_target_reached(&mut self, followers: &mut [Follower]) {
        self.arrived = true;
        for id in &self.roster {
            if let Some(f) = member(followers, *id) {
                f.cue.idle();
            }
        }
    }

    /// A new destination was issued.
    pub fn clear_arrived(&mut self) {
        self.arrived = false;
    }
}

/// Followers are stored at the index of their id.
fn member(followers: &mut [Follower], id: FollowerId) -> Option<&mut Follower> {
    followers.get_mut(id.0 as usize).filter(|f| f.id == id)
}
