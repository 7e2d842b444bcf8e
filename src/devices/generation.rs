//! Generator configuration selection, start/stop commanding, and
//! proportional load sharing.

use std::sync::mpsc::Receiver;

use tracing::{debug, info};

use crate::devices::generator::{GenAction, Generator, GeneratorKind};
use crate::devices::types::Actor;
use crate::error::SimResult;
use crate::sim::bus::{SharedBus, ValueChange, ValueId};
use crate::sim::schedule::Scheduler;
use crate::sim::types::PowerMode;

/// A named set of units intended to be online together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenConfiguration {
    pub name: String,
    /// Bit `n - 1` set means unit `n` is wanted online.
    pub mask: u8,
}

impl GenConfiguration {
    pub fn new(name: impl Into<String>, mask: u8) -> Self {
        Self {
            name: name.into(),
            mask,
        }
    }
}

fn is_subset(mask: u8, of: u8) -> bool {
    mask & !of == 0
}

#[derive(Debug)]
struct ManagerRegs {
    start_stop_delay: ValueId,
    min_run_t: ValueId,
    hyst_p: ValueId,
    sw_up_delay: ValueId,
    sw_dn_delay: ValueId,
    insignificant_p: ValueId,
    cfg_set_p: ValueId,
    set_p: ValueId,
    stat_mode: ValueId,
    stat_black: ValueId,
    stat_black_init: ValueId,
    cfg: ValueId,
    cfg_p: ValueId,
    online_cfg: ValueId,
    avail_cfg: ValueId,
    online_cap_p: ValueId,
    avail_cap_p: ValueId,
    cap_p: ValueId,
    spin_p: ValueId,
    p: ValueId,
    e: ValueId,
    fuel_cnt: ValueId,
    min_run_cnt: ValueId,
    sw_up_cnt: ValueId,
    sw_dn_cnt: ValueId,
}

impl ManagerRegs {
    fn bind(bus: &mut SharedBus) -> Self {
        let mut reg = |name: &str| bus.get_or_new(name);
        Self {
            start_stop_delay: reg("GenStartStopDelay"),
            min_run_t: reg("GenMinRunT"),
            hyst_p: reg("GenCfgHystP"),
            sw_up_delay: reg("GenSwUpDelay"),
            sw_dn_delay: reg("GenSwDnDelay"),
            insignificant_p: reg("GenInsignificantP"),
            cfg_set_p: reg("GenCfgSetP"),
            set_p: reg("GenSetP"),
            stat_mode: reg("StatMode"),
            stat_black: reg("StatBlack"),
            stat_black_init: reg("StatBlackInit"),
            cfg: reg("GenCfg"),
            cfg_p: reg("GenCfgP"),
            online_cfg: reg("GenOnlineCfg"),
            avail_cfg: reg("GenAvailCfg"),
            online_cap_p: reg("GenOnlineCapP"),
            avail_cap_p: reg("GenAvailCapP"),
            cap_p: reg("GenCapP"),
            spin_p: reg("GenSpinP"),
            p: reg("GenP"),
            e: reg("GenE"),
            fuel_cnt: reg("GenFuelCnt"),
            min_run_cnt: reg("GenMinRunCnt"),
            sw_up_cnt: reg("GenSwUpCnt"),
            sw_dn_cnt: reg("GenSwDnCnt"),
        }
    }
}

/// Selects the online configuration every tick and drives the units.
#[derive(Debug)]
pub struct GenerationManager {
    regs: ManagerRegs,
    gens: Vec<Generator>,
    configs: Vec<GenConfiguration>,
    black_start: Option<usize>,
    sched: Scheduler<GenAction>,
    /// Index of the target configuration, `None` before the first pick.
    current: Option<usize>,
    min_run: u64,
    sw_up_cnt: u64,
    sw_dn_cnt: u64,
    power_cache: Vec<Option<f64>>,
    avail_changes: Vec<Receiver<ValueChange>>,
}

impl GenerationManager {
    /// Creates the manager and its units, binding all registers.
    ///
    /// # Arguments
    ///
    /// * `bus` - Register bus
    /// * `kinds` - One entry per unit, unit 1 first (at most 8)
    /// * `configs` - Declared configurations in priority order
    /// * `black_start` - Index into `configs` used to recover from a blackout
    pub fn new(
        bus: &mut SharedBus,
        kinds: &[GeneratorKind],
        configs: Vec<GenConfiguration>,
        black_start: Option<usize>,
    ) -> Self {
        let regs = ManagerRegs::bind(bus);
        let gens: Vec<Generator> = kinds
            .iter()
            .take(8)
            .enumerate()
            .map(|(i, kind)| Generator::new(i, *kind, bus))
            .collect();
        let avail_changes = gens.iter().map(|g| bus.subscribe(g.avail_id())).collect();
        let power_cache = vec![None; configs.len()];
        Self {
            regs,
            gens,
            configs,
            black_start,
            sched: Scheduler::new(),
            current: None,
            min_run: 0,
            sw_up_cnt: 0,
            sw_dn_cnt: 0,
            power_cache,
            avail_changes,
        }
    }

    pub fn generators(&self) -> &[Generator] {
        &self.gens
    }

    pub fn configurations(&self) -> &[GenConfiguration] {
        &self.configs
    }

    /// Index of the configuration currently targeted.
    pub fn current(&self) -> Option<usize> {
        self.current
    }

    fn delay(&self, bus: &SharedBus) -> u64 {
        bus.get(self.regs.start_stop_delay).max(0.0).round() as u64
    }

    /// Rated power of a configuration, cached for the rest of the tick.
    fn config_power(&mut self, bus: &SharedBus, idx: usize) -> f64 {
        if let Some(p) = self.power_cache[idx] {
            return p;
        }
        let mask = self.configs[idx].mask;
        let p = self
            .gens
            .iter()
            .filter(|g| mask & g.bit() != 0)
            .map(|g| g.max_p(bus))
            .sum();
        self.power_cache[idx] = Some(p);
        p
    }

    fn power_of(&mut self, bus: &SharedBus, idx: Option<usize>) -> f64 {
        idx.map_or(0.0, |i| self.config_power(bus, i))
    }

    fn mask_of(&self, idx: Option<usize>) -> u8 {
        idx.map_or(0, |i| self.configs[i].mask)
    }

    fn mask_where(&self, pred: impl Fn(&Generator) -> bool) -> u8 {
        self.gens
            .iter()
            .filter(|g| pred(g))
            .fold(0, |m, g| m | g.bit())
    }

    fn available_mask(&self) -> u8 {
        self.mask_where(|g| g.state().is_available())
    }

    fn online_mask(&self) -> u8 {
        self.mask_where(|g| g.state().is_online())
    }

    /// Lowest-power available configuration covering `setpoint`, falling back
    /// to the most powerful available one.
    ///
    /// Configurations of insignificant power never cover a setpoint in
    /// diesel modes; in solar mode they cover any insignificant setpoint.
    fn find_config(&mut self, bus: &SharedBus, setpoint: f64, mode: f64, avail: u8) -> Option<usize> {
        let insignificant = bus.get(self.regs.insignificant_p);
        let solar_mode = mode == PowerMode::SolarBattery.as_f64();
        let mut found: Option<(usize, f64)> = None;
        let mut largest: Option<(usize, f64)> = None;
        for i in 0..self.configs.len() {
            if !is_subset(self.configs[i].mask, avail) {
                continue;
            }
            let p = self.config_power(bus, i);
            if largest.is_none_or(|(_, lp)| p > lp) {
                largest = Some((i, p));
            }
            let negligible = p <= insignificant;
            let covers = p >= setpoint || (solar_mode && negligible && setpoint <= insignificant);
            if !covers || (negligible && !solar_mode) {
                continue;
            }
            if found.is_none_or(|(_, fp)| p < fp) {
                found = Some((i, p));
            }
        }
        found.or(largest).map(|(i, _)| i)
    }

    /// Picks the target configuration for this tick.
    ///
    /// # Returns
    ///
    /// The chosen configuration and whether the choice bypasses debounce.
    fn select(&mut self, bus: &SharedBus, avail: u8, online: u8) -> (Option<usize>, bool) {
        let setpoint = bus.get(self.regs.cfg_set_p);
        let mode = bus.get(self.regs.stat_mode);

        if online == 0 && mode != PowerMode::SolarBattery.as_f64() {
            if let Some(b) = self.black_start {
                if is_subset(self.configs[b].mask, avail) && self.config_power(bus, b) > setpoint {
                    return (Some(b), true);
                }
            }
        }

        let found = self.find_config(bus, setpoint, mode, avail);
        let cur = self.current;
        if !is_subset(self.mask_of(cur), avail) {
            return (found, true);
        }
        if found == cur {
            return (cur, false);
        }
        let found_p = self.power_of(bus, found);
        let cur_p = self.power_of(bus, cur);
        if found_p > cur_p {
            return (found, false);
        }
        if self.min_run > 0 {
            return (cur, false);
        }
        let hyst = bus.get(self.regs.hyst_p);
        let insignificant = bus.get(self.regs.insignificant_p);
        if setpoint < found_p - hyst || (setpoint <= insignificant && self.mask_of(found) == 0) {
            return (found, false);
        }
        (cur, false)
    }

    /// Holds a switch for the configured number of ticks before letting it
    /// through.
    fn debounce(&mut self, bus: &SharedBus, best: Option<usize>) -> Option<usize> {
        let up_delay = bus.get(self.regs.sw_up_delay).max(0.0).round() as u64;
        let dn_delay = bus.get(self.regs.sw_dn_delay).max(0.0).round() as u64;
        let cur = self.current;
        let switching = best != cur;
        let down = switching && self.power_of(bus, best) <= self.power_of(bus, cur);
        let up = switching && !down;

        let mut out = best;
        if up {
            if self.sw_up_cnt > 0 {
                self.sw_up_cnt -= 1;
                out = cur;
            } else {
                self.sw_up_cnt = up_delay;
            }
        } else {
            self.sw_up_cnt = up_delay;
        }
        if down {
            if self.sw_dn_cnt > 0 {
                self.sw_dn_cnt -= 1;
                out = cur;
            } else {
                self.sw_dn_cnt = dn_delay;
            }
        } else {
            self.sw_dn_cnt = dn_delay;
        }
        out
    }

    fn reset_available(&mut self, bus: &mut SharedBus) {
        for g in self.gens.iter_mut() {
            if g.state().is_available() {
                g.reset(bus, &mut self.sched);
            }
        }
    }

    fn switch_to(&mut self, bus: &mut SharedBus, next: Option<usize>) {
        let mask = self.mask_of(next);
        let unit_min = self
            .gens
            .iter()
            .filter(|g| mask & g.bit() != 0)
            .map(|g| g.min_run_t(bus))
            .fold(0.0, f64::max);
        self.min_run = unit_min.max(bus.get(self.regs.min_run_t)).max(0.0).round() as u64;

        info!(
            from = self.current.map(|i| self.configs[i].name.as_str()).unwrap_or("none"),
            to = next.map(|i| self.configs[i].name.as_str()).unwrap_or("none"),
            min_run = self.min_run,
            "generator configuration switched"
        );
        self.current = next;

        if bus.get(self.regs.stat_black) == 1.0 {
            self.reset_available(bus);
        }
    }

    fn command_units(&mut self, bus: &mut SharedBus, online: u8) {
        let delay = self.delay(bus);
        let mask = self.mask_of(self.current);
        for g in self.gens.iter_mut() {
            if mask & g.bit() != 0 && !g.state().is_online() {
                g.start(bus, &mut self.sched, delay);
            }
        }
        if is_subset(mask, online) {
            for g in self.gens.iter_mut() {
                if mask & g.bit() == 0 && g.state().is_online() {
                    g.stop(bus, &mut self.sched, delay);
                }
            }
        }
    }

    /// Shares `GenSetP`, less measured output, among online simulated units
    /// in proportion to their rating.
    fn load_share(&mut self, bus: &mut SharedBus) {
        let mut setpoint = bus.get(self.regs.set_p);
        let mut capacity = 0.0;
        for g in &self.gens {
            if !g.state().is_online() {
                continue;
            }
            match g.kind() {
                GeneratorKind::Measured => setpoint -= g.measured_p(bus),
                GeneratorKind::Simulated => capacity += g.max_p(bus),
            }
        }
        for g in &self.gens {
            let p = match (g.kind(), g.state().is_online()) {
                (_, false) => 0.0,
                (GeneratorKind::Measured, true) => g.measured_p(bus),
                (GeneratorKind::Simulated, true) if capacity > 0.0 => {
                    g.max_p(bus) / capacity * setpoint
                }
                (GeneratorKind::Simulated, true) => 0.0,
            };
            g.set_p(bus, p);
        }
    }

    fn drain_availability_changes(&self, bus: &SharedBus) {
        for (g, rx) in self.gens.iter().zip(&self.avail_changes) {
            for change in rx.try_iter() {
                info!(
                    unit = g.unit(),
                    register = bus.name(change.id),
                    available = change.new != 0.0,
                    "generator availability changed"
                );
            }
        }
    }

    fn publish(&mut self, bus: &mut SharedBus) {
        let cur_p = self.power_of(bus, self.current);
        let online = self.online_mask();
        let avail = self.available_mask();
        let (mut online_cap, mut avail_cap, mut largest) = (0.0, 0.0, 0.0_f64);
        let (mut spin, mut p, mut e, mut fuel) = (0.0, 0.0, 0.0, 0.0);
        for g in &self.gens {
            let max_p = g.max_p(bus);
            if g.state().is_online() {
                online_cap += max_p;
                spin += (max_p - g.p(bus)).max(0.0);
            }
            if g.state().is_available() {
                avail_cap += max_p;
                largest = largest.max(max_p);
            }
            p += g.p(bus);
            e += g.energy(bus);
            fuel += g.fuel(bus);
        }
        let r = &self.regs;
        bus.set(r.cfg, self.current.map_or(-1.0, |i| i as f64));
        bus.set(r.cfg_p, cur_p);
        bus.set(r.online_cfg, f64::from(online));
        bus.set(r.avail_cfg, f64::from(avail));
        bus.set(r.online_cap_p, online_cap);
        bus.set(r.avail_cap_p, avail_cap);
        bus.set(r.cap_p, if avail == 0 { 0.0 } else { avail_cap - largest });
        bus.set(r.spin_p, spin);
        bus.set(r.p, p);
        bus.set(r.e, e);
        bus.set(r.fuel_cnt, fuel);
        bus.set(r.min_run_cnt, self.min_run as f64);
        bus.set(r.sw_up_cnt, self.sw_up_cnt as f64);
        bus.set(r.sw_dn_cnt, self.sw_dn_cnt as f64);
    }
}

impl Actor for GenerationManager {
    fn name(&self) -> &str {
        "generation"
    }

    fn init(&mut self, bus: &mut SharedBus) -> SimResult<()> {
        for g in self.gens.iter_mut() {
            g.refresh(bus);
        }
        self.sw_up_cnt = bus.get(self.regs.sw_up_delay).max(0.0).round() as u64;
        self.sw_dn_cnt = bus.get(self.regs.sw_dn_delay).max(0.0).round() as u64;
        self.publish(bus);
        debug!(
            units = self.gens.len(),
            configurations = self.configs.len(),
            "generation manager ready"
        );
        Ok(())
    }

    fn run(&mut self, bus: &mut SharedBus, tick: u64) -> SimResult<()> {
        self.sched.begin_tick(tick);
        self.power_cache.iter_mut().for_each(|p| *p = None);

        self.drain_availability_changes(bus);
        for g in self.gens.iter_mut() {
            g.refresh(bus);
        }
        if bus.get(self.regs.stat_black_init) == 1.0 {
            self.reset_available(bus);
        }

        if self.min_run > 0 {
            self.min_run -= 1;
        }

        let avail = self.available_mask();
        let online = self.online_mask();
        let (best, immediate) = self.select(bus, avail, online);
        let next = if immediate {
            self.sw_up_cnt = bus.get(self.regs.sw_up_delay).max(0.0).round() as u64;
            self.sw_dn_cnt = bus.get(self.regs.sw_dn_delay).max(0.0).round() as u64;
            best
        } else {
            self.debounce(bus, best)
        };
        if next != self.current {
            self.switch_to(bus, next);
        }

        self.command_units(bus, online);
        self.load_share(bus);

        let delay = self.delay(bus);
        for g in self.gens.iter_mut() {
            g.run(bus, &mut self.sched, delay)?;
        }
        for action in self.sched.run_actions(tick) {
            if let Some(g) = self.gens.get_mut(action.unit) {
                g.apply(action.kind, bus, &mut self.sched);
            }
        }

        self.publish(bus);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::types::GeneratorState;

    /// Four-unit station: units 1-2 rated 500 kW, unit 3 rated 250 kW,
    /// unit 4 measured.
    fn station(bus: &mut SharedBus, hyst: f64) -> GenerationManager {
        for (n, max_p) in [(1, 500.0), (2, 500.0), (3, 250.0)] {
            bus.set_by_name(&format!("Gen{n}MaxP"), max_p);
            bus.set_by_name(&format!("Gen{n}Avail"), 1.0);
            bus.set_by_name(&format!("Gen{n}FuelLf1"), 0.0);
            bus.set_by_name(&format!("Gen{n}FuelL1"), 0.3);
            bus.set_by_name(&format!("Gen{n}FuelLf2"), 1.0);
            bus.set_by_name(&format!("Gen{n}FuelL2"), 0.3);
        }
        bus.set_by_name("GenStartStopDelay", 5.0);
        bus.set_by_name("GenCfgHystP", hyst);
        bus.set_by_name("GenInsignificantP", 1.0);
        let configs = vec![
            GenConfiguration::new("none", 0b000),
            GenConfiguration::new("small", 0b100),
            GenConfiguration::new("one", 0b001),
            GenConfiguration::new("two", 0b011),
            GenConfiguration::new("all", 0b111),
        ];
        let kinds = [GeneratorKind::Simulated; 3];
        let mut m = GenerationManager::new(bus, &kinds, configs, Some(2));
        m.init(bus).expect("init");
        m
    }

    fn run_until(m: &mut GenerationManager, bus: &mut SharedBus, from: u64, to: u64) {
        for t in from..to {
            m.run(bus, t).expect("run");
        }
    }

    fn demand(bus: &mut SharedBus, p: f64) {
        bus.set_by_name("GenCfgSetP", p);
        bus.set_by_name("GenSetP", p);
    }

    #[test]
    fn black_start_brings_units_online_after_delay() {
        let mut bus = SharedBus::new();
        let mut m = station(&mut bus, 0.0);
        demand(&mut bus, 300.0);
        bus.set_by_name("StatBlack", 1.0);
        run_until(&mut m, &mut bus, 0, 1);
        assert_eq!(m.current(), Some(2));
        assert_eq!(bus.value_of("GenOnlineCfg"), Some(0.0));
        run_until(&mut m, &mut bus, 1, 6);
        assert_eq!(bus.value_of("GenOnlineCfg"), Some(1.0));
        assert_eq!(bus.value_of("GenOnlineCapP"), Some(500.0));
    }

    #[test]
    fn picks_lowest_covering_configuration() {
        let mut bus = SharedBus::new();
        let mut m = station(&mut bus, 0.0);
        demand(&mut bus, 800.0);
        run_until(&mut m, &mut bus, 0, 10);
        assert_eq!(m.current(), Some(3));
        assert_eq!(bus.value_of("GenOnlineCfg"), Some(3.0));
        // shared in proportion to rating
        assert_eq!(bus.value_of("Gen1P"), Some(400.0));
        assert_eq!(bus.value_of("Gen2P"), Some(400.0));
        assert_eq!(bus.value_of("GenP"), Some(800.0));
    }

    #[test]
    fn hysteresis_blocks_small_drops() {
        let mut bus = SharedBus::new();
        let mut m = station(&mut bus, 100.0);
        demand(&mut bus, 800.0);
        run_until(&mut m, &mut bus, 0, 10);
        assert_eq!(m.current(), Some(3));

        // "one" covers 450 but 450 is not below 500 - 100
        demand(&mut bus, 450.0);
        run_until(&mut m, &mut bus, 10, 20);
        assert_eq!(m.current(), Some(3));

        demand(&mut bus, 350.0);
        run_until(&mut m, &mut bus, 20, 21);
        assert_eq!(m.current(), Some(2));
        // unit 2 stops after the delay
        run_until(&mut m, &mut bus, 21, 30);
        assert_eq!(bus.value_of("GenOnlineCfg"), Some(1.0));
    }

    #[test]
    fn min_run_holds_downward_switch() {
        let mut bus = SharedBus::new();
        bus.set_by_name("GenMinRunT", 50.0);
        let mut m = station(&mut bus, 0.0);
        demand(&mut bus, 800.0);
        run_until(&mut m, &mut bus, 0, 10);
        demand(&mut bus, 100.0);
        run_until(&mut m, &mut bus, 10, 40);
        assert_eq!(m.current(), Some(3));
        run_until(&mut m, &mut bus, 40, 60);
        assert_eq!(m.current(), Some(1));
    }

    #[test]
    fn switch_down_is_debounced() {
        let mut bus = SharedBus::new();
        bus.set_by_name("GenSwDnDelay", 3.0);
        let mut m = station(&mut bus, 0.0);
        demand(&mut bus, 800.0);
        run_until(&mut m, &mut bus, 0, 10);
        demand(&mut bus, 400.0);
        run_until(&mut m, &mut bus, 10, 13);
        assert_eq!(m.current(), Some(3));
        run_until(&mut m, &mut bus, 13, 14);
        assert_eq!(m.current(), Some(2));
    }

    #[test]
    fn unavailable_unit_forces_immediate_switch() {
        let mut bus = SharedBus::new();
        bus.set_by_name("GenMinRunT", 1000.0);
        let mut m = station(&mut bus, 0.0);
        demand(&mut bus, 400.0);
        run_until(&mut m, &mut bus, 0, 10);
        assert_eq!(m.current(), Some(2));

        bus.set_by_name("Gen1Avail", 0.0);
        run_until(&mut m, &mut bus, 10, 11);
        assert_eq!(m.current(), Some(1), "falls back to the 250 kW unit");
        assert!(
            m.generators()[0]
                .state()
                .contains(GeneratorState::UNAVAILABLE)
        );
    }

    #[test]
    fn reserve_capacity_excludes_largest_unit() {
        let mut bus = SharedBus::new();
        let _m = station(&mut bus, 0.0);
        assert_eq!(bus.value_of("GenAvailCapP"), Some(1250.0));
        assert_eq!(bus.value_of("GenCapP"), Some(750.0));
    }

    #[test]
    fn reserve_capacity_is_zero_with_nothing_available() {
        let mut bus = SharedBus::new();
        let mut m = station(&mut bus, 0.0);
        for n in 1..=3 {
            bus.set_by_name(&format!("Gen{n}Avail"), 0.0);
        }
        run_until(&mut m, &mut bus, 0, 1);
        assert_eq!(bus.value_of("GenAvailCapP"), Some(0.0));
        assert_eq!(bus.value_of("GenCapP"), Some(0.0));
    }

    #[test]
    fn zero_configuration_only_in_solar_mode() {
        let mut bus = SharedBus::new();
        let mut m = station(&mut bus, 0.0);
        demand(&mut bus, 0.0);
        run_until(&mut m, &mut bus, 0, 1);
        // diesel mode: "none" is insignificant, black start takes "one"
        assert_eq!(m.current(), Some(2));

        bus.set_by_name("StatMode", PowerMode::SolarBattery.as_f64());
        run_until(&mut m, &mut bus, 1, 2);
        assert_eq!(m.current(), Some(0));
    }

    #[test]
    fn solar_mode_drops_to_zero_configuration_on_small_setpoint() {
        let mut bus = SharedBus::new();
        let mut m = station(&mut bus, 0.0);
        bus.set_by_name("StatMode", PowerMode::SolarBattery.as_f64());
        demand(&mut bus, 300.0);
        run_until(&mut m, &mut bus, 0, 10);
        assert_eq!(m.current(), Some(2));

        // a residual setpoint below GenInsignificantP no longer needs a unit
        demand(&mut bus, 0.5);
        run_until(&mut m, &mut bus, 10, 11);
        assert_eq!(m.current(), Some(0));
        run_until(&mut m, &mut bus, 11, 20);
        assert_eq!(bus.value_of("GenOnlineCfg"), Some(0.0));
    }
}
