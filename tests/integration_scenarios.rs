//! End-to-end station scenarios driven through the engine.

mod common;

use std::fs;

use station_sim::config::{BatteryConfig, InputConfig, OutputConfig, StationConfig};
use station_sim::sim::engine::Engine;
use station_sim::sim::types::PowerMode;
use tempfile::TempDir;

#[test]
fn recycled_input_repeats_while_plain_input_holds() {
    let dir = TempDir::new().expect("tempdir");
    let recycled = common::write_file(dir.path(), "recycle.csv", "t,RecycleCnt\n0,10\n600,20\n");
    let plain = common::write_file(dir.path(), "plain.csv", "t,NoRecycleCnt\n0,10\n600,20\n");
    let out = dir.path().join("out.csv");

    let mut cfg = StationConfig::default();
    cfg.simulation.iterations = 3601;
    cfg.inputs = vec![
        InputConfig::new(recycled, true),
        InputConfig::new(plain, false),
    ];
    cfg.outputs = vec![OutputConfig::new(
        out.clone(),
        600,
        vec!["RecycleCnt".into(), "NoRecycleCnt".into()],
    )];

    Engine::from_config(&cfg).expect("engine").run().expect("run");

    let text = fs::read_to_string(out).expect("read output");
    assert_eq!(
        text,
        "t,RecycleCnt,NoRecycleCnt\n\
         0,10,10\n\
         600,20,20\n\
         1200,10,20\n\
         1800,20,20\n\
         2400,10,20\n\
         3000,20,20\n\
         3600,10,20\n"
    );
}

#[test]
fn fuel_is_linear_in_energy_at_constant_load() {
    let mut cfg = common::diesel_station(1, 100.0, 50.0, 100_000);
    cfg.generators[0].fuel_curve = vec![[0.0, 0.33], [1.0, 0.33]];

    let mut engine = Engine::from_config(&cfg).expect("engine");
    let summary = engine.run().expect("run");

    let expected_energy = (100_000.0 - 61.0) * 50.0 / 3600.0;
    assert!(
        (summary.gen_kwh - expected_energy).abs() < 1e-6,
        "energy {} vs {expected_energy}",
        summary.gen_kwh
    );
    assert!(
        (summary.fuel_l - 0.33 * summary.gen_kwh).abs() < 1e-6,
        "fuel {} vs {}",
        summary.fuel_l,
        0.33 * summary.gen_kwh
    );
    assert_eq!(summary.starts, 1);
    assert_eq!(summary.blackouts, 0);
}

#[test]
fn load_capacity_alarm_latches_over_the_whole_run() {
    let dir = TempDir::new().expect("tempdir");
    let load = common::write_file(
        dir.path(),
        "load.csv",
        "t,LoadRawP\n0,1000\n100,1900\n200,2100\n300,1500\n",
    );
    let mut cfg = common::diesel_station(4, 500.0, 0.0, 400);
    cfg.configurations = vec![common::configuration("all", &[1, 2, 3, 4])];
    cfg.load.peak_t = 0.0;
    cfg.load.cap_margin = 1.0;
    cfg.inputs = vec![InputConfig::new(load, false)];

    let mut engine = Engine::from_config(&cfg).expect("engine");
    engine.init().expect("init");
    for tick in 0..400 {
        engine.step(tick).expect("step");
        let alarm = engine.bus().value_of("LoadCapAl");
        let expected = if tick < 200 { 0.0 } else { 1.0 };
        assert_eq!(alarm, Some(expected), "alarm at tick {tick}");
    }
    engine.finish().expect("finish");
    assert_eq!(engine.bus().value_of("GenOnlineCapP"), Some(2000.0));
    assert_eq!(engine.bus().value_of("LoadMaxP"), Some(2100.0));
}

#[test]
fn service_counter_follows_run_hours() {
    // service every 2 running hours, 1 hour outage; the third one falls
    // due on the last tick
    let mut cfg = common::diesel_station(1, 100.0, 50.0, 8 * 3600);
    cfg.generators[0].service_t = 2.0;
    cfg.generators[0].service_outages_h = vec![0.75, 0.25];

    let mut engine = Engine::from_config(&cfg).expect("engine");
    let summary = engine.run().expect("run");
    assert_eq!(engine.bus().value_of("Gen1ServiceCnt"), Some(2.0));
    assert_eq!(summary.services, 2);
}

#[test]
fn identical_runs_write_identical_files() {
    let dir = TempDir::new().expect("tempdir");
    let input = common::write_file(
        dir.path(),
        "trace.csv",
        "t,LoadRawP,SolarAvailP\n\
         0,320,0\n\
         900,410,120\n\
         1800,380,520\n\
         2700,450,640\n\
         3600,300,200\n\
         4500,520,0\n",
    );

    let run_once = |name: &str| {
        let out = dir.path().join(name);
        let mut cfg = StationConfig::solar_hybrid();
        cfg.simulation.iterations = 5400;
        cfg.inputs = vec![InputConfig::new(input.clone(), true)];
        cfg.outputs = vec![OutputConfig::new(out.clone(), 60, vec!["*".into()])];
        Engine::from_config(&cfg).expect("engine").run().expect("run");
        fs::read(out).expect("read output")
    };

    let first = run_once("a.csv");
    let second = run_once("b.csv");
    assert!(!first.is_empty());
    assert_eq!(first, second);
}

#[test]
fn scaled_input_applies_to_later_samples() {
    let dir = TempDir::new().expect("tempdir");
    let input = common::write_file(
        dir.path(),
        "scaled.csv",
        "t,LoadRawP,>LoadRawP\n0,100,\n10,,*2+5\n20,100,\n",
    );
    let mut cfg = common::diesel_station(1, 500.0, 0.0, 30);
    cfg.inputs = vec![InputConfig::new(input, false)];
    cfg.outputs = vec![common::per_tick_output(
        dir.path().join("out.csv"),
        &["LoadRawP"],
    )];

    let mut engine = Engine::from_config(&cfg).expect("engine");
    engine.run().expect("run");
    assert_eq!(engine.bus().value_of("LoadRawP"), Some(205.0));
}

#[test]
fn solar_mode_releases_every_generator() {
    let dir = TempDir::new().expect("tempdir");
    let input = common::write_file(dir.path(), "sun.csv", "t,SolarAvailP\n0,900\n");
    let mut cfg = StationConfig::solar_hybrid();
    cfg.simulation.iterations = 20_000;
    cfg.inputs = vec![InputConfig::new(input, false)];

    let mut engine = Engine::from_config(&cfg).expect("engine");
    let summary = engine.run().expect("run");
    let bus = engine.bus();
    assert_eq!(bus.value_of("StatMode"), Some(PowerMode::SolarBattery.as_f64()));
    assert_eq!(bus.value_of("GenOnlineCfg"), Some(0.0));
    assert_eq!(bus.value_of("GenP"), Some(0.0));
    // the battery is full, so solar carries the whole load and the rest spills
    let load = bus.value_of("LoadP").unwrap_or(0.0);
    let solar = bus.value_of("SolarP").unwrap_or(0.0);
    assert!(load >= 350.0);
    assert!((solar - load).abs() < 1e-9, "solar {solar} load {load}");
    assert!((bus.value_of("SolarSpillP").unwrap_or(0.0) - (900.0 - load)).abs() < 1e-9);
    assert!(bus.value_of("GenCfgSetP").unwrap_or(f64::MAX) <= 20.0);
    assert_eq!(summary.blackouts, 0);
}

#[test]
fn station_cycles_through_solar_depletion_and_diesel() {
    let dir = TempDir::new().expect("tempdir");
    let input = common::write_file(
        dir.path(),
        "day.csv",
        "t,SolarAvailP\n0,0\n1000,900\n4000,0\n",
    );
    let mut cfg = StationConfig::solar_hybrid();
    cfg.simulation.iterations = 6000;
    cfg.battery = BatteryConfig {
        max_e: 100.0,
        initial_e: 80.0,
        max_p: 500.0,
        efficiency: 1.0,
        high_e: 90.0,
        low_e: 20.0,
        recharge_p: 100.0,
        ..BatteryConfig::default()
    };
    cfg.inputs = vec![InputConfig::new(input, false)];

    let mut engine = Engine::from_config(&cfg).expect("engine");
    engine.init().expect("init");
    let mut modes: Vec<f64> = Vec::new();
    for tick in 0..6000 {
        engine.step(tick).expect("step");
        let bus = engine.bus();
        let mode = bus.value_of("StatMode").unwrap_or(-1.0);
        if modes.last() != Some(&mode) {
            modes.push(mode);
        }
        match tick {
            999 => {
                assert_eq!(mode, PowerMode::DieselPlus.as_f64());
                assert_ne!(bus.value_of("GenOnlineCfg"), Some(0.0));
            }
            3999 => {
                assert_eq!(mode, PowerMode::SolarBattery.as_f64());
                assert_eq!(bus.value_of("GenOnlineCfg"), Some(0.0));
            }
            _ => {}
        }
    }
    engine.finish().expect("finish");

    assert_eq!(
        modes,
        vec![
            PowerMode::DieselPlus.as_f64(),
            PowerMode::SolarBattery.as_f64(),
            PowerMode::BatteryDepleted.as_f64(),
            PowerMode::DieselPlus.as_f64(),
        ]
    );
    let bus = engine.bus();
    assert_ne!(bus.value_of("GenOnlineCfg"), Some(0.0));
    assert_eq!(bus.value_of("StatBlack"), Some(0.0));
    assert_eq!(bus.value_of("StatBlackCnt"), Some(0.0));
}
