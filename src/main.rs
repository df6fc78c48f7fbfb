use std::time::Duration;

use bevy::log::LogPlugin;
use bevy::prelude::*;
use bevy::time::TimeUpdateStrategy;

use cohort::config::ScenarioConfig;
use cohort::formation::{FormationPlugin, FormationSim};
use cohort::setup::{exit_when_settled, setup_scenario};

const DEFAULT_SCENARIO: &str = "assets/formation/demo.formation.ron";

fn main() -> AppExit {
    let path = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_SCENARIO.to_string());
    // the log plugin isn't up yet
    let config = match ScenarioConfig::load(&path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("cohort: cannot load {}: {}", path, e);
            return AppExit::error();
        }
    };
    let tick = config.settings.tick_seconds;

    App::new()
        // headless: no window, no renderer
        .add_plugins((MinimalPlugins, LogPlugin::default()))
        .add_plugins(FormationPlugin { tick_seconds: tick })
        // one fixed step per frame, as fast as the CPU allows
        .insert_resource(TimeUpdateStrategy::ManualDuration(Duration::from_secs_f32(tick)))
        .insert_resource(config)
        .add_systems(Startup, setup_scenario)
        .add_systems(Update, exit_when_settled.run_if(resource_exists::<FormationSim>))
        .run()
}
