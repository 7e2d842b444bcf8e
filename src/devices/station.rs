//! Station power balance: operating mode, blackout detection, spinning
//! reserve, and the generator setpoints.

use tracing::{info, warn};

use crate::devices::battery::BatteryController;
use crate::devices::types::Actor;
use crate::error::SimResult;
use crate::sim::bus::{SharedBus, ValueId};
use crate::sim::types::{BatteryState, PowerMode};

/// Bounds applied to the setpoint smoothing factor `GenCfgSetK`.
const MIN_SET_K: f64 = 1e-6;

#[derive(Debug)]
struct StationRegs {
    spin_set_p: ValueId,
    solar_cov_pct: ValueId,
    maintain_spin: ValueId,
    set_k: ValueId,
    load_p: ValueId,
    solar_avail_p: ValueId,
    solar_p: ValueId,
    bat_state: ValueId,
    bat_p: ValueId,
    bat_set_p: ValueId,
    bat_recharge_p: ValueId,
    gen_online_cfg: ValueId,
    gen_spin_p: ValueId,
    shed_spin_p: ValueId,
    shed_off_p: ValueId,
    mode: ValueId,
    reserve_p: ValueId,
    cover_p: ValueId,
    gen_cfg_set_p: ValueId,
    gen_set_p: ValueId,
    spin_p: ValueId,
    black: ValueId,
    black_cnt: ValueId,
    black_init: ValueId,
}

/// Station controller. Owns the battery, which it drives with the setpoint
/// it computes each tick.
#[derive(Debug)]
pub struct StationController {
    regs: StationRegs,
    battery: BatteryController,
    mode: PowerMode,
    /// Blackout flag of the previous tick; starts set so the cold start at
    /// tick 0 is not counted.
    was_black: bool,
}

impl StationController {
    pub fn new(bus: &mut SharedBus) -> Self {
        let mut reg = |name: &str| bus.get_or_new(name);
        let regs = StationRegs {
            spin_set_p: reg("StatSpinSetP"),
            solar_cov_pct: reg("StatSolarCovPct"),
            maintain_spin: reg("StatMaintainSpin"),
            set_k: reg("GenCfgSetK"),
            load_p: reg("LoadP"),
            solar_avail_p: reg("SolarAvailP"),
            solar_p: reg("SolarP"),
            bat_state: reg("BatState"),
            bat_p: reg("BatP"),
            bat_set_p: reg("BatSetP"),
            bat_recharge_p: reg("BatRechargeP"),
            gen_online_cfg: reg("GenOnlineCfg"),
            gen_spin_p: reg("GenSpinP"),
            shed_spin_p: reg("ShedSpinP"),
            shed_off_p: reg("ShedOffP"),
            mode: reg("StatMode"),
            reserve_p: reg("StatReserveP"),
            cover_p: reg("StatCoverP"),
            gen_cfg_set_p: reg("GenCfgSetP"),
            gen_set_p: reg("GenSetP"),
            spin_p: reg("StatSpinP"),
            black: reg("StatBlack"),
            black_cnt: reg("StatBlackCnt"),
            black_init: reg("StatBlackInit"),
        };
        Self {
            regs,
            battery: BatteryController::new(bus),
            mode: PowerMode::DieselPlus,
            was_black: true,
        }
    }

    pub fn mode(&self) -> PowerMode {
        self.mode
    }

    pub fn battery(&self) -> &BatteryController {
        &self.battery
    }

    fn next_mode(&self, bus: &SharedBus) -> PowerMode {
        let r = &self.regs;
        let can_discharge = BatteryState::from_f64(bus.get(r.bat_state)) == BatteryState::CanDischarge;
        match self.mode {
            PowerMode::DieselPlus
                if can_discharge
                    && bus.get(r.solar_avail_p) > bus.get(r.load_p) + bus.get(r.spin_set_p) =>
            {
                PowerMode::SolarBattery
            }
            PowerMode::SolarBattery if !can_discharge => PowerMode::BatteryDepleted,
            PowerMode::BatteryDepleted if bus.get(r.gen_online_cfg) != 0.0 => PowerMode::DieselPlus,
            mode => mode,
        }
    }

    fn reserve(&self, bus: &SharedBus, solar_prev: f64) -> f64 {
        if self.mode == PowerMode::SolarBattery {
            return 0.0;
        }
        let r = &self.regs;
        let spin = bus
            .get(r.spin_set_p)
            .max(solar_prev * bus.get(r.solar_cov_pct));
        let reserve = spin - bus.get(r.shed_spin_p) + bus.get(r.shed_off_p);
        if bus.get(r.maintain_spin) != 0.0 {
            reserve
        } else {
            reserve.max(0.0)
        }
    }
}

impl Actor for StationController {
    fn name(&self) -> &str {
        "station"
    }

    fn init(&mut self, bus: &mut SharedBus) -> SimResult<()> {
        self.battery.init(bus)?;
        if bus.get(self.regs.set_k) <= 0.0 {
            warn!("GenCfgSetK is not positive; setpoint smoothing clamped");
        }
        bus.set(self.regs.mode, self.mode.as_f64());
        Ok(())
    }

    fn run(&mut self, bus: &mut SharedBus, tick: u64) -> SimResult<()> {
        let next = self.next_mode(bus);
        if next != self.mode {
            info!(tick, from = %self.mode, to = %next, "station mode changed");
            self.mode = next;
        }
        bus.set(self.regs.mode, self.mode.as_f64());

        let r = &self.regs;
        let black = self.mode == PowerMode::DieselPlus && bus.get(r.gen_online_cfg) == 0.0;
        let rising = black && !self.was_black;
        bus.set(r.black, if black { 1.0 } else { 0.0 });
        bus.set(r.black_init, if rising { 1.0 } else { 0.0 });
        if rising {
            bus.add(r.black_cnt, 1.0);
            warn!(tick, "station blackout");
        }
        self.was_black = black;

        let load = bus.get(r.load_p);
        let solar_avail = bus.get(r.solar_avail_p);
        let solar_prev = bus.get(r.solar_p);
        let bat_set = match self.mode {
            PowerMode::DieselPlus => {
                -(solar_avail - solar_prev).max(bus.get(r.bat_recharge_p))
            }
            PowerMode::SolarBattery | PowerMode::BatteryDepleted => load - solar_avail,
        };
        bus.set(r.bat_set_p, bat_set);
        self.battery.run(bus, tick)?;

        let r = &self.regs;
        let bat_p = bus.get(r.bat_p);
        let reserve = self.reserve(bus, solar_prev);
        let battery_share = if self.mode == PowerMode::BatteryDepleted {
            0.0
        } else {
            bat_p
        };
        let coverage = load - solar_prev - battery_share + reserve;
        let k = bus.get(r.set_k).clamp(MIN_SET_K, 1.0);
        let cfg_set = bus.get(r.gen_cfg_set_p) * (1.0 - k) + k * coverage;

        bus.set(r.reserve_p, reserve);
        bus.set(r.cover_p, coverage);
        bus.set(r.gen_cfg_set_p, cfg_set);
        bus.set(r.gen_set_p, load - bat_p - solar_prev);
        let spin = bus.get(r.gen_spin_p) + bus.get(r.shed_spin_p) + self.battery.discharge_headroom(bus);
        bus.set(r.spin_p, spin);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn station(bus: &mut SharedBus) -> StationController {
        bus.set_by_name("GenCfgSetK", 1.0);
        bus.set_by_name("StatSpinSetP", 50.0);
        let mut s = StationController::new(bus);
        s.init(bus).expect("init");
        s
    }

    #[test]
    fn cold_start_is_not_a_blackout_event() {
        let mut bus = SharedBus::new();
        let mut s = station(&mut bus);
        s.run(&mut bus, 0).expect("run");
        assert_eq!(bus.value_of("StatBlack"), Some(1.0));
        assert_eq!(bus.value_of("StatBlackCnt"), Some(0.0));
        assert_eq!(bus.value_of("StatBlackInit"), Some(0.0));
    }

    #[test]
    fn losing_all_generators_counts_one_blackout() {
        let mut bus = SharedBus::new();
        let mut s = station(&mut bus);
        bus.set_by_name("GenOnlineCfg", 1.0);
        s.run(&mut bus, 0).expect("run");
        bus.set_by_name("GenOnlineCfg", 0.0);
        s.run(&mut bus, 1).expect("run");
        assert_eq!(bus.value_of("StatBlackInit"), Some(1.0));
        s.run(&mut bus, 2).expect("run");
        assert_eq!(bus.value_of("StatBlackInit"), Some(0.0));
        assert_eq!(bus.value_of("StatBlackCnt"), Some(1.0));
    }

    #[test]
    fn coverage_includes_spinning_reserve() {
        let mut bus = SharedBus::new();
        let mut s = station(&mut bus);
        bus.set_by_name("LoadP", 300.0);
        s.run(&mut bus, 0).expect("run");
        assert_eq!(bus.value_of("StatReserveP"), Some(50.0));
        assert_eq!(bus.value_of("GenCfgSetP"), Some(350.0));
        assert_eq!(bus.value_of("GenSetP"), Some(300.0));
    }

    #[test]
    fn setpoint_is_smoothed() {
        let mut bus = SharedBus::new();
        let mut s = station(&mut bus);
        bus.set_by_name("GenCfgSetK", 0.5);
        bus.set_by_name("StatSpinSetP", 0.0);
        bus.set_by_name("LoadP", 100.0);
        s.run(&mut bus, 0).expect("run");
        assert_eq!(bus.value_of("GenCfgSetP"), Some(50.0));
        s.run(&mut bus, 1).expect("run");
        assert_eq!(bus.value_of("GenCfgSetP"), Some(75.0));
    }

    #[test]
    fn sheddable_capacity_reduces_reserve() {
        let mut bus = SharedBus::new();
        let mut s = station(&mut bus);
        bus.set_by_name("ShedSpinP", 80.0);
        s.run(&mut bus, 0).expect("run");
        assert_eq!(bus.value_of("StatReserveP"), Some(0.0));
        bus.set_by_name("StatMaintainSpin", 1.0);
        s.run(&mut bus, 1).expect("run");
        assert_eq!(bus.value_of("StatReserveP"), Some(-30.0));
    }

    #[test]
    fn mode_cycle_through_solar_and_depletion() {
        let mut bus = SharedBus::new();
        bus.set_by_name("BatMaxE", 10.0);
        bus.set_by_name("BatE", 0.02);
        bus.set_by_name("BatHighE", 8.0);
        bus.set_by_name("BatLowE", 0.01);
        bus.set_by_name("BatEff", 1.0);
        let mut s = station(&mut bus);
        bus.set_by_name("LoadP", 100.0);
        bus.set_by_name("SolarAvailP", 200.0);
        bus.set_by_name("GenOnlineCfg", 1.0);

        s.run(&mut bus, 0).expect("run");
        assert_eq!(s.mode(), PowerMode::SolarBattery);
        assert_eq!(bus.value_of("StatReserveP"), Some(0.0));

        // solar collapses: the battery carries the load and runs down
        bus.set_by_name("SolarAvailP", 0.0);
        let mut t = 1;
        while s.mode() == PowerMode::SolarBattery && t < 10 {
            s.run(&mut bus, t).expect("run");
            t += 1;
        }
        assert_eq!(s.mode(), PowerMode::BatteryDepleted);

        s.run(&mut bus, t).expect("run");
        assert_eq!(s.mode(), PowerMode::DieselPlus);
    }
}
