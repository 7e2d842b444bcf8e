//! Property-based tests for configuration selection and input replay.

mod common;

use std::io::Write;

use proptest::prelude::*;
use station_sim::devices::generation::GenConfiguration;
use station_sim::devices::types::Actor;
use station_sim::io::reader::StartTime;
use station_sim::io::TimeSeriesReader;
use station_sim::sim::bus::SharedBus;
use tempfile::NamedTempFile;

// ===========================================================================
// Generators
// ===========================================================================

fn arb_configs() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(0u8..8, 1..=6)
}

/// One tick of input: availability of each of three units and a setpoint.
fn arb_tick() -> impl Strategy<Value = ([bool; 3], f64)> {
    (prop::array::uniform3(prop::bool::weighted(0.8)), 0.0f64..1500.0)
}

fn arb_timestamps() -> impl Strategy<Value = Vec<u64>> {
    prop::collection::vec(1u64..1000, 1..8).prop_map(|steps| {
        steps
            .iter()
            .scan(0u64, |t, step| {
                let now = *t;
                *t += step;
                Some(now)
            })
            .collect()
    })
}

fn demand(bus: &mut SharedBus, p: f64) {
    bus.set_by_name("GenCfgSetP", p);
    bus.set_by_name("GenSetP", p);
}

// ===========================================================================
// Properties
// ===========================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    /// The targeted configuration only ever names available units.
    #[test]
    fn target_is_within_available_units(
        masks in arb_configs(),
        ticks in prop::collection::vec(arb_tick(), 1..60),
    ) {
        let mut bus = SharedBus::new();
        let configs = masks
            .iter()
            .enumerate()
            .map(|(i, m)| GenConfiguration::new(format!("c{i}"), *m))
            .collect();
        let mut m = common::manager(&mut bus, &[500.0, 500.0, 250.0], configs);

        for (tick, (avail, setpoint)) in ticks.iter().enumerate() {
            for (n, up) in avail.iter().enumerate() {
                bus.set_by_name(&format!("Gen{}Avail", n + 1), if *up { 1.0 } else { 0.0 });
            }
            demand(&mut bus, *setpoint);
            m.run(&mut bus, tick as u64).expect("run");

            let avail_mask = bus.value_of("GenAvailCfg").unwrap_or(0.0) as u8;
            let target = m.current().map_or(0, |i| m.configurations()[i].mask);
            prop_assert_eq!(target & !avail_mask, 0, "tick {}", tick);
        }
    }

    /// A drop to a smaller configuration needs the setpoint below its
    /// rating by more than the hysteresis.
    #[test]
    fn hysteresis_band_holds_larger_configuration(
        hyst in 1u32..400,
        frac in 0.0f64..1.0,
        below in any::<bool>(),
    ) {
        let hyst = f64::from(hyst);
        let mut bus = SharedBus::new();
        bus.set_by_name("GenCfgHystP", hyst);
        let configs = vec![
            GenConfiguration::new("one", 0b01),
            GenConfiguration::new("two", 0b11),
        ];
        let mut m = common::manager(&mut bus, &[500.0, 500.0], configs);

        demand(&mut bus, 800.0);
        for tick in 0..10 {
            m.run(&mut bus, tick).expect("run");
        }
        prop_assert_eq!(m.current(), Some(1));

        let setpoint = if below {
            frac * (500.0 - hyst)
        } else {
            500.0 - hyst + frac * hyst
        };
        demand(&mut bus, setpoint);
        m.run(&mut bus, 10).expect("run");
        let expected = if below { Some(0) } else { Some(1) };
        prop_assert_eq!(m.current(), expected, "setpoint {}", setpoint);
    }

    /// Recycled input keeps producing strictly increasing timestamps.
    #[test]
    fn recycled_timestamps_strictly_increase(stamps in arb_timestamps()) {
        let mut file = NamedTempFile::new().expect("temp file");
        writeln!(file, "t,X").expect("write");
        for (i, t) in stamps.iter().enumerate() {
            writeln!(file, "{t},{i}").expect("write");
        }
        file.flush().expect("flush");

        let mut bus = SharedBus::new();
        let mut reader = TimeSeriesReader::new(file.path(), true, StartTime::default());
        reader.init(&mut bus).expect("init");

        let mut last = f64::NEG_INFINITY;
        for _ in 0..stamps.len() * 4 {
            let row = reader.next_row().expect("row");
            prop_assert!(row.is_some());
            let t = row.map_or(0.0, |r| r.t);
            prop_assert!(t > last, "{} after {}", t, last);
            last = t;
        }
    }
}
