// src/setup.rs
//! Turns a loaded scenario into a running simulation plus the entities that
//! mirror it.

use bevy::prelude::*;

use crate::config::{ConfigError, ScenarioConfig};
use crate::formation::{
    FollowerBody, FollowerId, FormationError, FormationSim, LeaderBody, Locomotion, WaypointRoute,
};

#[derive(thiserror::Error, Debug)]
pub enum SetupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Formation(#[from] FormationError),
}

/// Simulation for `config` with its followers spawned at the leader's start
/// and the configured shape built over them.
pub fn build_sim(config: &ScenarioConfig) -> Result<(FormationSim, Vec<FollowerId>), SetupError> {
    let terrain = config.terrain.build()?;
    let route = WaypointRoute::with_route(
        config.leader.start,
        config.leader.speed,
        config.leader.route.iter().copied(),
    );
    let mut sim = FormationSim::new(config.settings.clone(), route, terrain);

    let ids: Vec<FollowerId> =
        (0..config.followers).map(|_| sim.spawn_follower(config.leader.start)).collect();
    sim.build_formation(&ids, config.reposition)?;

    for trigger in &config.triggers {
        sim.add_trigger(trigger.clone());
    }
    Ok((sim, ids))
}

pub fn setup_scenario(
    mut commands: Commands,
    config: Res<ScenarioConfig>,
    mut exit: EventWriter<AppExit>,
) {
    let (sim, ids) = match build_sim(&config) {
        Ok(built) => built,
        Err(e) => {
            error!("Setup: scenario rejected: {}", e);
            exit.write(AppExit::error());
            return;
        }
    };

    let leader = sim.leader().pose;
    commands.spawn((
        Name::new("Leader"),
        LeaderBody,
        Transform::from_translation(leader.position).with_rotation(Quat::from_rotation_y(leader.heading)),
        Locomotion::default(),
    ));

    for id in &ids {
        let Some(follower) = sim.follower(*id) else { continue };
        commands.spawn((
            Name::new(format!("Follower {}", id.0)),
            FollowerBody(*id),
            Transform::from_translation(follower.position),
            Locomotion::default(),
        ));
    }

    info!(
        "Setup: {} followers, {} triggers, route of {} waypoints",
        ids.len(),
        sim.triggers().len(),
        config.leader.route.len()
    );
    commands.insert_resource(sim);
}

/// Ends the run once everyone is at rest, or at the tick limit.
pub fn exit_when_settled(
    sim: Res<FormationSim>,
    config: Res<ScenarioConfig>,
    mut exit: EventWriter<AppExit>,
) {
    let out_of_time = sim.ticks() >= config.max_ticks as u64;
    if !sim.is_settled() && !out_of_time {
        return;
    }

    if out_of_time && !sim.is_settled() {
        warn!("Demo: stopping after {} ticks without settling", sim.ticks());
    } else {
        info!("Demo: settled after {:.2}s ({} ticks)", sim.elapsed(), sim.ticks());
    }
    for f in sim.followers() {
        info!("  follower {:?}: {:?} at {:.2?}", f.id, f.status, f.position);
    }
    exit.write(AppExit::Success);
}
