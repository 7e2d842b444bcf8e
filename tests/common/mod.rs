//! Shared test fixtures for integration tests.
#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use station_sim::config::{ConfigurationConfig, GeneratorConfig, OutputConfig, StationConfig};
use station_sim::devices::generation::{GenConfiguration, GenerationManager};
use station_sim::devices::generator::GeneratorKind;
use station_sim::devices::types::Actor;
use station_sim::sim::bus::SharedBus;

/// Writes `body` to `dir/name` and returns the path.
pub fn write_file(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, body).expect("write fixture");
    path
}

/// A configuration holding exactly the listed units.
pub fn configuration(name: &str, units: &[usize]) -> ConfigurationConfig {
    ConfigurationConfig {
        name: name.to_string(),
        units: units.to_vec(),
        ..ConfigurationConfig::default()
    }
}

/// Station of `count` identical units with one configuration per prefix
/// (`"1"`, `"2"`, ...), constant raw load, and no battery or solar.
pub fn diesel_station(count: usize, max_p: f64, load_p: f64, iterations: u64) -> StationConfig {
    let mut cfg = StationConfig::default();
    cfg.simulation.iterations = iterations;
    cfg.generators = (0..count)
        .map(|_| GeneratorConfig {
            max_p,
            ..GeneratorConfig::default()
        })
        .collect();
    cfg.configurations = (1..=count)
        .map(|n| configuration(&n.to_string(), &(1..=n).collect::<Vec<_>>()))
        .collect();
    cfg.load.initial_p = load_p;
    cfg
}

/// Output of every tick for the given variables.
pub fn per_tick_output(path: PathBuf, variables: &[&str]) -> OutputConfig {
    OutputConfig::new(path, 1, variables.iter().map(|v| v.to_string()).collect())
}

/// Manager over simulated units of the given ratings, already initialised.
pub fn manager(
    bus: &mut SharedBus,
    ratings: &[f64],
    configs: Vec<GenConfiguration>,
) -> GenerationManager {
    let kinds = vec![GeneratorKind::Simulated; ratings.len()];
    for (i, p) in ratings.iter().enumerate() {
        let n = i + 1;
        bus.set_by_name(&format!("Gen{n}MaxP"), *p);
        bus.set_by_name(&format!("Gen{n}Avail"), 1.0);
        bus.set_by_name(&format!("Gen{n}FuelLf1"), 0.0);
        bus.set_by_name(&format!("Gen{n}FuelL1"), 0.3);
        bus.set_by_name(&format!("Gen{n}FuelLf2"), 1.0);
        bus.set_by_name(&format!("Gen{n}FuelL2"), 0.25);
    }
    bus.set_by_name("GenStartStopDelay", 5.0);
    let mut m = GenerationManager::new(bus, &kinds, configs, None);
    m.init(bus).expect("init manager");
    m
}
