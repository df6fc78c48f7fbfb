// src/formation/systems.rs

use bevy::prelude::*;

use super::components::{FollowerBody, LeaderBody, Locomotion};
use super::events::FormationEvent;
use super::follower::FollowerId;
use super::sim::FormationSim;

/// Advances the simulation by one fixed step.
pub fn step_simulation(time: Res<Time>, mut sim: ResMut<FormationSim>) {
    sim.step(time.delta_secs());
}

/// Copies simulated poses onto the leader/follower entities.
pub fn sync_transforms(
    sim: Res<FormationSim>,
    mut leaders: Query<(&mut Transform, Option<&mut Locomotion>), (With<LeaderBody>, Without<FollowerBody>)>,
    mut followers: Query<(&FollowerBody, &mut Transform, Option<&mut Locomotion>), Without<LeaderBody>>,
) {
    let leader = sim.leader();
    for (mut tf, cue) in leaders.iter_mut() {
        tf.translation = leader.pose.position;
        tf.rotation = Quat::from_rotation_y(leader.pose.heading);
        if let Some(mut cue) = cue {
            **cue = leader.cue;
        }
    }

    for (body, mut tf, cue) in followers.iter_mut() {
        let Some(follower) = sim.follower(**body) else { continue };
        tf.translation = follower.position;
        tf.rotation = Quat::from_rotation_y(follower.heading);
        if let Some(mut cue) = cue {
            **cue = follower.cue;
        }
    }
}

/// Gives followers added mid-run (triggers) a body of their own.
pub fn spawn_new_followers(mut commands: Commands, sim: Res<FormationSim>, bodies: Query<&FollowerBody>) {
    let known: Vec<FollowerId> = bodies.iter().map(|b| **b).collect();
    for follower in sim.followers() {
        if known.contains(&follower.id) {
            continue;
        }
        debug!("Formation: spawning body for follower {:?}", follower.id);
        commands.spawn((
            Name::new(format!("Follower {}", follower.id.0)),
            FollowerBody(follower.id),
            Transform::from_translation(follower.position).with_rotation(Quat::from_rotation_y(follower.heading)),
            Locomotion(follower.cue),
        ));
    }
}

/// Republishes the tick's events. The sim and followers already log them.
pub fn forward_events(mut sim: ResMut<FormationSim>, mut writer: EventWriter<FormationEvent>) {
    let events = sim.drain_events();
    if !events.is_empty() {
        trace!("Formation: forwarding {} events", events.len());
    }
    writer.write_batch(events);
}
