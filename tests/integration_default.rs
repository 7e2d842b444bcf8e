//! Integration tests for the baseline station preset.

use std::fs;

use station_sim::config::StationConfig;
use station_sim::sim::engine::Engine;
use station_sim::sim::kpi::RunSummary;
use tempfile::TempDir;

fn run_baseline(iterations: u64) -> (Engine, RunSummary) {
    let mut cfg = StationConfig::baseline();
    cfg.simulation.iterations = iterations;
    let mut engine = Engine::from_config(&cfg).expect("engine");
    let summary = engine.run().expect("run");
    (engine, summary)
}

#[test]
fn baseline_settles_on_two_units() {
    let (engine, summary) = run_baseline(3600);
    let bus = engine.bus();

    // 600 kW load plus 150 kW spinning reserve needs two 500 kW units
    assert_eq!(bus.value_of("GenCfg"), Some(2.0));
    assert_eq!(bus.value_of("GenOnlineCfg"), Some(3.0));
    assert_eq!(bus.value_of("Gen1P"), Some(300.0));
    assert_eq!(bus.value_of("Gen2P"), Some(300.0));
    assert_eq!(bus.value_of("Gen3P"), Some(0.0));
    assert_eq!(bus.value_of("GenSpinP"), Some(400.0));
    assert_eq!(bus.value_of("GenCapP"), Some(1500.0));
    assert_eq!(bus.value_of("LoadCapAl"), Some(0.0));

    assert_eq!(summary.blackouts, 0);
    assert_eq!(summary.starts, 2);
    assert_eq!(summary.trips, 0);
}

#[test]
fn baseline_fuel_matches_part_load_curve() {
    let (_engine, summary) = run_baseline(3600);
    // load factor 0.6 sits between the 0.5 and 0.75 curve points
    assert!(
        (summary.specific_fuel - 0.282).abs() < 1e-6,
        "specific fuel {}",
        summary.specific_fuel
    );
    assert!(summary.gen_kwh > 0.0);
    assert!(summary.load_kwh >= summary.gen_kwh);
}

#[test]
fn summary_renders_headline_figures() {
    let (_engine, summary) = run_baseline(600);
    let text = summary.to_string();
    assert!(text.contains("--- Run Summary (600 s) ---"));
    assert!(text.contains("L/kWh"));
}

#[test]
fn baseline_writes_requested_outputs() {
    let dir = TempDir::new().expect("tempdir");
    let out = dir.path().join("gen.csv");
    let mut cfg = StationConfig::baseline();
    cfg.simulation.iterations = 3600;
    cfg.outputs = vec![station_sim::config::OutputConfig::new(
        out.clone(),
        1800,
        vec!["GenP".into(), "Gen?P{Act}".into()],
    )];
    Engine::from_config(&cfg).expect("engine").run().expect("run");

    let text = fs::read_to_string(out).expect("read output");
    let mut lines = text.lines();
    let header = lines.next().expect("header");
    assert!(header.starts_with("t,GenP.Min,GenP.MinT,GenP.Max,GenP.MaxT,GenP.Ave,GenP.Act,"));
    assert!(header.ends_with("Gen1P,Gen2P,Gen3P,Gen4P"));
    let rows: Vec<&str> = lines.collect();
    assert_eq!(rows.len(), 2);
    assert!(rows[1].starts_with("1800,"));
    assert!(rows[1].ends_with(",600,300,300,0,0"));
}

#[test]
fn validation_rejects_broken_preset_edit() {
    let mut cfg = StationConfig::baseline();
    cfg.generation.black_start = Some("missing".into());
    let errors = cfg.validate();
    assert!(errors.iter().any(|e| e.field.contains("black_start")));
}
