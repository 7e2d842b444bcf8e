use tracing::info;

use crate::devices::types::Actor;
use crate::error::SimResult;
use crate::sim::bus::{SharedBus, ValueId};
use crate::sim::types::{BatteryState, DT_HOURS};

/// Battery storage following the setpoint written by the station.
///
/// # Power Convention
/// - Positive `BatP`: discharging (supplying the station bus)
/// - Negative `BatP`: charging
///
/// Efficiency losses are applied on the charging side only. The
/// charge-management state flips to `CanDischarge` once the stored energy
/// reaches `BatHighE` and back to `Charging` at `BatLowE`.
#[derive(Debug)]
pub struct BatteryController {
    max_e: ValueId,
    max_p: ValueId,
    eff: ValueId,
    high_e: ValueId,
    low_e: ValueId,
    set_p: ValueId,
    p: ValueId,
    e: ValueId,
    state_reg: ValueId,
    imp_e: ValueId,
    exp_e: ValueId,
    state: BatteryState,
}

impl BatteryController {
    /// Binds the `Bat*` registers.
    pub fn new(bus: &mut SharedBus) -> Self {
        Self {
            max_e: bus.get_or_new("BatMaxE"),
            max_p: bus.get_or_new("BatMaxP"),
            eff: bus.get_or_new("BatEff"),
            high_e: bus.get_or_new("BatHighE"),
            low_e: bus.get_or_new("BatLowE"),
            set_p: bus.get_or_new("BatSetP"),
            p: bus.get_or_new("BatP"),
            e: bus.get_or_new("BatE"),
            state_reg: bus.get_or_new("BatState"),
            imp_e: bus.get_or_new("BatImpE"),
            exp_e: bus.get_or_new("BatExpE"),
            state: BatteryState::Charging,
        }
    }

    pub fn state(&self) -> BatteryState {
        self.state
    }

    fn efficiency(&self, bus: &SharedBus) -> f64 {
        let eff = bus.get(self.eff);
        if eff > 0.0 { eff.min(1.0) } else { 1.0 }
    }

    /// Largest discharge the battery could add on top of its current output.
    ///
    /// # Returns
    ///
    /// Zero when there is no battery or it may not discharge.
    pub fn discharge_headroom(&self, bus: &SharedBus) -> f64 {
        if bus.get(self.max_e) <= 0.0 || self.state != BatteryState::CanDischarge {
            return 0.0;
        }
        let from_energy = bus.get(self.e) / DT_HOURS;
        let max_p = bus.get(self.max_p);
        let limit = if max_p > 0.0 {
            max_p.min(from_energy)
        } else {
            from_energy
        };
        (limit - bus.get(self.p)).max(0.0)
    }

    /// Clamps `setpoint` to what the battery can deliver or absorb this tick.
    fn limit(&self, bus: &SharedBus, setpoint: f64) -> f64 {
        let max_e = bus.get(self.max_e);
        let e = bus.get(self.e);
        let max_p = bus.get(self.max_p);
        let p = if max_p > 0.0 {
            setpoint.clamp(-max_p, max_p)
        } else {
            setpoint
        };
        if p > 0.0 {
            p.min(e.max(0.0) / DT_HOURS)
        } else if p < 0.0 {
            let room = (max_e - e).max(0.0);
            p.max(-room / (self.efficiency(bus) * DT_HOURS))
        } else {
            0.0
        }
    }
}

impl Actor for BatteryController {
    fn name(&self) -> &str {
        "battery"
    }

    fn init(&mut self, bus: &mut SharedBus) -> SimResult<()> {
        let has_battery = bus.get(self.max_e) > 0.0;
        self.state = if has_battery && bus.get(self.e) > bus.get(self.low_e) {
            BatteryState::CanDischarge
        } else {
            BatteryState::Charging
        };
        bus.set(self.state_reg, self.state.as_f64());
        Ok(())
    }

    fn run(&mut self, bus: &mut SharedBus, _tick: u64) -> SimResult<()> {
        let max_e = bus.get(self.max_e);
        if max_e <= 0.0 {
            bus.set(self.p, 0.0);
            self.state = BatteryState::Charging;
            bus.set(self.state_reg, self.state.as_f64());
            return Ok(());
        }

        let p = self.limit(bus, bus.get(self.set_p));
        let e = bus.get(self.e);
        let loss = if p < 0.0 { self.efficiency(bus) } else { 1.0 };
        let new_e = (e - p * loss * DT_HOURS).clamp(0.0, max_e);
        bus.set(self.p, p);
        bus.set(self.e, new_e);
        if p > 0.0 {
            bus.add(self.exp_e, p * DT_HOURS);
        } else if p < 0.0 {
            bus.add(self.imp_e, -p * DT_HOURS);
        }

        let next = match self.state {
            BatteryState::Charging if new_e >= bus.get(self.high_e) => BatteryState::CanDischarge,
            BatteryState::CanDischarge if new_e <= bus.get(self.low_e) => BatteryState::Charging,
            s => s,
        };
        if next != self.state {
            info!(energy_kwh = new_e, state = ?next, "battery state changed");
            self.state = next;
        }
        bus.set(self.state_reg, self.state.as_f64());
        Ok(())
    }
}
