//! Solar inverter actor and the pluggable setpoint interface.

use crate::devices::types::Actor;
use crate::error::SimResult;
use crate::sim::bus::{SharedBus, ValueId};
use crate::sim::types::{DT_HOURS, PowerMode};

/// Inputs visible to a solar setpoint algorithm, sampled after the
/// station and generators have run for the tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolarInputs {
    pub tick: u64,
    /// Station load (kW).
    pub load_p: f64,
    /// Battery output, positive discharging (kW).
    pub bat_p: f64,
    /// Solar power the array could deliver (kW).
    pub solar_avail_p: f64,
    /// Rated power of the online generators (kW).
    pub gen_online_cap_p: f64,
    /// Minimum generator loading as a fraction of online capacity.
    pub gen_min_load_pct: f64,
    /// Station mode register value.
    pub mode: f64,
}

/// Computes the requested solar output each tick.
///
/// The result is clamped to `[0, SolarAvailP]` by the [`Solar`] actor.
pub trait SolarSetpoint {
    fn setpoint(&mut self, inputs: &SolarInputs) -> f64;
}

/// Built-in setpoint: take everything the load leaves after the battery,
/// keeping the online generators above their minimum loading.
///
/// In solar mode nothing is held back for the generators, so any unit
/// still online runs down to zero and is released.
#[derive(Debug, Default, Clone, Copy)]
pub struct MinimumLoadSetpoint;

impl SolarSetpoint for MinimumLoadSetpoint {
    fn setpoint(&mut self, i: &SolarInputs) -> f64 {
        let min_load = if i.mode == PowerMode::SolarBattery.as_f64() {
            0.0
        } else {
            i.gen_min_load_pct * i.gen_online_cap_p
        };
        (i.load_p - i.bat_p - min_load).max(0.0)
    }
}

impl<F> SolarSetpoint for F
where
    F: FnMut(&SolarInputs) -> f64,
{
    fn setpoint(&mut self, inputs: &SolarInputs) -> f64 {
        self(inputs)
    }
}

/// Solar inverter: follows the setpoint up to the available power and
/// accounts produced and spilled energy.
pub struct Solar {
    avail_p: ValueId,
    load_p: ValueId,
    bat_p: ValueId,
    gen_online_cap_p: ValueId,
    gen_min_load_pct: ValueId,
    stat_mode: ValueId,
    set_p: ValueId,
    p: ValueId,
    spill_p: ValueId,
    e: ValueId,
    spill_e: ValueId,
    algorithm: Box<dyn SolarSetpoint>,
}

impl Solar {
    /// Binds the `Solar*` registers and uses the built-in setpoint.
    pub fn new(bus: &mut SharedBus) -> Self {
        Self {
            avail_p: bus.get_or_new("SolarAvailP"),
            load_p: bus.get_or_new("LoadP"),
            bat_p: bus.get_or_new("BatP"),
            gen_online_cap_p: bus.get_or_new("GenOnlineCapP"),
            gen_min_load_pct: bus.get_or_new("GenMinLoadPct"),
            stat_mode: bus.get_or_new("StatMode"),
            set_p: bus.get_or_new("SolarSetP"),
            p: bus.get_or_new("SolarP"),
            spill_p: bus.get_or_new("SolarSpillP"),
            e: bus.get_or_new("SolarE"),
            spill_e: bus.get_or_new("SolarSpillE"),
            algorithm: Box::new(MinimumLoadSetpoint),
        }
    }

    /// Replaces the setpoint algorithm.
    pub fn set_algorithm(&mut self, algorithm: Box<dyn SolarSetpoint>) {
        self.algorithm = algorithm;
    }
}

impl Actor for Solar {
    fn name(&self) -> &str {
        "solar"
    }

    fn init(&mut self, _bus: &mut SharedBus) -> SimResult<()> {
        Ok(())
    }

    fn run(&mut self, bus: &mut SharedBus, tick: u64) -> SimResult<()> {
        let avail = bus.get(self.avail_p).max(0.0);
        let inputs = SolarInputs {
            tick,
            load_p: bus.get(self.load_p),
            bat_p: bus.get(self.bat_p),
            solar_avail_p: avail,
            gen_online_cap_p: bus.get(self.gen_online_cap_p),
            gen_min_load_pct: bus.get(self.gen_min_load_pct),
            mode: bus.get(self.stat_mode),
        };
        let set_p = self.algorithm.setpoint(&inputs);
        let p = set_p.clamp(0.0, avail);
        let spill = avail - p;
        bus.set(self.set_p, set_p);
        bus.set(self.p, p);
        bus.set(self.spill_p, spill);
        bus.add(self.e, p * DT_HOURS);
        bus.add(self.spill_e, spill * DT_HOURS);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_setpoint_keeps_generators_loaded() {
        let mut bus = SharedBus::new();
        let mut s = Solar::new(&mut bus);
        bus.set_by_name("SolarAvailP", 200.0);
        bus.set_by_name("LoadP", 300.0);
        bus.set_by_name("GenOnlineCapP", 500.0);
        bus.set_by_name("GenMinLoadPct", 0.3);
        s.run(&mut bus, 0).expect("run");
        assert_eq!(bus.value_of("SolarSetP"), Some(150.0));
        assert_eq!(bus.value_of("SolarP"), Some(150.0));
        assert_eq!(bus.value_of("SolarSpillP"), Some(50.0));
    }

    #[test]
    fn solar_mode_reserves_nothing_for_generators() {
        let mut bus = SharedBus::new();
        let mut s = Solar::new(&mut bus);
        bus.set_by_name("SolarAvailP", 900.0);
        bus.set_by_name("LoadP", 350.0);
        bus.set_by_name("GenOnlineCapP", 250.0);
        bus.set_by_name("GenMinLoadPct", 0.3);
        bus.set_by_name("StatMode", PowerMode::SolarBattery.as_f64());
        s.run(&mut bus, 0).expect("run");
        assert_eq!(bus.value_of("SolarP"), Some(350.0));
        assert_eq!(bus.value_of("SolarSpillP"), Some(550.0));
    }

    #[test]
    fn output_is_clamped_to_available() {
        let mut bus = SharedBus::new();
        let mut s = Solar::new(&mut bus);
        bus.set_by_name("SolarAvailP", 40.0);
        bus.set_by_name("LoadP", 300.0);
        s.run(&mut bus, 0).expect("run");
        assert_eq!(bus.value_of("SolarP"), Some(40.0));
        assert_eq!(bus.value_of("SolarSpillP"), Some(0.0));
    }

    #[test]
    fn custom_algorithm_replaces_default() {
        let mut bus = SharedBus::new();
        let mut s = Solar::new(&mut bus);
        s.set_algorithm(Box::new(|i: &SolarInputs| i.solar_avail_p * 0.5));
        bus.set_by_name("SolarAvailP", 80.0);
        s.run(&mut bus, 0).expect("run");
        assert_eq!(bus.value_of("SolarP"), Some(40.0));
        assert_eq!(bus.value_of("SolarSpillP"), Some(40.0));
    }
}
