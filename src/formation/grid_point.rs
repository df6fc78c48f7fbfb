// src/formation/grid_point.rs
//! Per-slot target resolver. A grid point trails the leader through its
//! recorded path instead of sitting at a rigid offset from the leader's
//! current pose.

use bevy::prelude::*;

use super::follower::FollowerId;
use super::history::LeaderHistory;
use super::leader::LeaderPose;
use crate::geometry::{heading_forward, rigid_offset_position, rotate_90_cw};

/// Average leader speed below which grid points hold still.
pub const MIN_AVERAGE_SPEED: f32 = 1e-4;
/// Lateral offsets smaller than this are treated as zero.
pub const MIN_LATERAL_OFFSET: f32 = 1e-3;

/// Stable handle into the formation's grid point arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GridPointId(pub u32);

#[derive(Clone, Debug, PartialEq)]
pub struct GridPoint {
    pub id: GridPointId,
    /// Slot offset (x = lateral, y <= 0 = behind). Fixed for the point's lifetime.
    pub offset: Vec2,
    /// Follower steering towards this point.
    pub follower: FollowerId,
    resolved: Option<Vec3>,
}

impl GridPoint {
    pub fn new(id: GridPointId, offset: Vec2, follower: FollowerId) -> Self {
        Self { id, offset, follower, resolved: None }
    }

    /// World position the follower steers towards; `None` until the leader
    /// has moved for the first time.
    pub fn position(&self) -> Option<Vec3> {
        self.resolved
    }

    /// Re-resolves the world position for this tick. Only reads its inputs, so
    /// calling it twice with the same inputs is a no-op the second time.
    pub fn recompute(
        &mut self,
        leader: &LeaderPose,
        history: &LeaderHistory,
        now: f32,
        leader_average_speed: f32,
    ) {
        if leader_average_speed <= MIN_AVERAGE_SPEED {
            return;
        }

        let lag = -self.offset.y / leader_average_speed;
        let position = match history.sample_at_lag(now, lag) {
            Some(sample) => {
                let mut p = sample.position;
                if self.offset.x.abs() > MIN_LATERAL_OFFSET {
                    let mut travel = leader.position - sample.position;
                    travel.y = 0.0;
                    if travel.length_squared() < f32::EPSILON {
                        travel = heading_forward(sample.heading);
                    }
                    p += rotate_90_cw(travel).normalize_or_zero() * self.offset.x;
                }
                p
            }
            // not enough history yet
            None => rigid_offset_position(leader.position, leader.heading, self.offset),
        };
        self.resolved = Some(position);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formation::history::LeaderSample;

    fn walk(history: &mut LeaderHistory, until: f32, dt: f32, speed: f32) -> LeaderPose {
        let mut t = 0.0;
        let mut pose = LeaderPose::default();
        while t <= until + 1e-6 {
            pose = LeaderPose { position: Vec3::new(0.0, 0.0, t * speed), heading: 0.0 };
            history.record(LeaderSample { position: pose.position, timestamp: t, heading: 0.0 }, |_| {});
            t += dt;
        }
        pose
    }

    #[test]
    fn stationary_leader_leaves_point_unresolved() {
        let mut gp = GridPoint::new(GridPointId(0), Vec2::new(0.0, -2.0), FollowerId(0));
        gp.recompute(&LeaderPose::default(), &LeaderHistory::new(10), 0.0, 0.0);
        assert_eq!(gp.position(), None);
    }

    #[test]
    fn cold_start_uses_rigid_offset() {
        let mut history = LeaderHistory::new(100);
        let leader = walk(&mut history, 0.5, 0.1, 1.0);
        let mut gp = GridPoint::new(GridPointId(0), Vec2::new(1.0, -2.0), FollowerId(0));
        gp.recompute(&leader, &history, 0.5, 1.0);
        let expected = leader.position + Vec3::new(1.0, 0.0, -2.0);
        assert!(gp.position().unwrap().distance(expected) < 1e-4);
    }

    #[test]
    fn trails_through_the_leader_path() {
        // 1 u/s along +Z, sampled every 0.02 s for 3 s
        let mut history = LeaderHistory::new(1000);
        let dt = 0.02;
        let leader = walk(&mut history, 3.0, dt, 1.0);
        let now = history.newest().unwrap().timestamp;

        let mut gp = GridPoint::new(GridPointId(0), Vec2::new(0.0, -2.0), FollowerId(0));
        gp.recompute(&leader, &history, now, 1.0);
        let expected = history.sample_at_lag(now, 2.0).unwrap().position;
        let resolved = gp.position().unwrap();
        assert!(resolved.distance(expected) < 1e-5);
        assert!((resolved.z - (now - 2.0)).abs() < dt + 1e-4);

        gp.recompute(&leader, &history, now, 1.0);
        assert_eq!(gp.position(), Some(resolved));
    }

    #[test]
    fn lateral_offset_is_perpendicular_to_travel() {
        let mut history = LeaderHistory::new(1000);
        let leader = walk(&mut history, 3.0, 0.1, 1.0);
        let now = history.newest().unwrap().timestamp;

        let mut right = GridPoint::new(GridPointId(0), Vec2::new(1.5, -1.0), FollowerId(0));
        right.recompute(&leader, &history, now, 1.0);
        let base = history.sample_at_lag(now, 1.0).unwrap().position;
        let p = right.position().unwrap();
        assert!((p.x - 1.5).abs() < 1e-4);
        assert!((p.z - base.z).abs() < 1e-4);
    }

    #[test]
    fn holds_position_when_leader_stops() {
        let mut history = LeaderHistory::new(1000);
        let leader = walk(&mut history, 3.0, 0.1, 1.0);
        let now = history.newest().unwrap().timestamp;
        let mut gp = GridPoint::new(GridPointId(0), Vec2::new(0.0, -1.0), FollowerId(0));
        gp.recompute(&leader, &history, now, 1.0);
        let held = gp.position();

        let moved = LeaderPose { position: Vec3::new(10.0, 0.0, 10.0), heading: 0.0 };
        gp.recompute(&moved, &history, now + 1.0, 0.0);
        assert_eq!(gp.position(), held);
    }
}
