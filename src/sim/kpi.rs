//! End-of-run summary read back from the register bus.

use std::fmt;

use super::bus::SharedBus;

/// Station totals for a completed run.
///
/// Read from the accumulating registers after `finish`, so the figures
/// always agree with what the output files recorded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    /// Ticks simulated.
    pub ticks: u64,
    /// Energy delivered to the load (kWh).
    pub load_kwh: f64,
    /// Generator energy (kWh).
    pub gen_kwh: f64,
    /// Generator fuel (litres).
    pub fuel_l: f64,
    /// Fuel per generated kWh (L/kWh), 0 when nothing was generated.
    pub specific_fuel: f64,
    pub starts: u64,
    pub stops: u64,
    pub trips: u64,
    pub services: u64,
    /// Generator running hours, all units.
    pub run_hours: f64,
    pub blackouts: u64,
    pub solar_kwh: f64,
    pub solar_spill_kwh: f64,
    pub shed_kwh: f64,
    pub dispatched_kwh: f64,
    /// Energy into the battery (kWh).
    pub battery_import_kwh: f64,
    /// Energy out of the battery (kWh).
    pub battery_export_kwh: f64,
}

impl RunSummary {
    /// Collects the totals of a run.
    ///
    /// # Arguments
    ///
    /// * `bus` - Register bus after the run finished
    /// * `units` - Number of generator units
    /// * `ticks` - Number of ticks simulated
    pub fn from_bus(bus: &SharedBus, units: usize, ticks: u64) -> Self {
        let get = |name: &str| bus.value_of(name).unwrap_or(0.0);
        let count = |name: &str| get(name).max(0.0).round() as u64;
        let per_unit = |suffix: &str| -> f64 {
            (1..=units).map(|n| get(&format!("Gen{n}{suffix}"))).sum()
        };

        let gen_kwh = get("GenE");
        let fuel_l = get("GenFuelCnt");
        let specific_fuel = if gen_kwh > 0.0 { fuel_l / gen_kwh } else { 0.0 };

        Self {
            ticks,
            load_kwh: get("LoadE"),
            gen_kwh,
            fuel_l,
            specific_fuel,
            starts: per_unit("StartCnt").round() as u64,
            stops: per_unit("StopCnt").round() as u64,
            trips: per_unit("TripCnt").round() as u64,
            services: per_unit("ServiceCnt").round() as u64,
            run_hours: per_unit("RunCnt"),
            blackouts: count("StatBlackCnt"),
            solar_kwh: get("SolarE"),
            solar_spill_kwh: get("SolarSpillE"),
            shed_kwh: get("ShedE"),
            dispatched_kwh: get("DispE"),
            battery_import_kwh: get("BatImpE"),
            battery_export_kwh: get("BatExpE"),
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- Run Summary ({} s) ---", self.ticks)?;
        writeln!(f, "Load energy:           {:.2} kWh", self.load_kwh)?;
        writeln!(f, "Generator energy:      {:.2} kWh", self.gen_kwh)?;
        writeln!(
            f,
            "Fuel:                  {:.2} L ({:.4} L/kWh)",
            self.fuel_l, self.specific_fuel
        )?;
        writeln!(
            f,
            "Starts/stops/trips:    {}/{}/{}",
            self.starts, self.stops, self.trips
        )?;
        writeln!(f, "Services:              {}", self.services)?;
        writeln!(f, "Run hours:             {:.2} h", self.run_hours)?;
        writeln!(f, "Blackouts:             {}", self.blackouts)?;
        writeln!(
            f,
            "Solar:                 {:.2} kWh ({:.2} kWh spilled)",
            self.solar_kwh, self.solar_spill_kwh
        )?;
        writeln!(f, "Shed load:             {:.2} kWh", self.shed_kwh)?;
        writeln!(f, "Dispatched load:       {:.2} kWh", self.dispatched_kwh)?;
        write!(
            f,
            "Battery in/out:        {:.2}/{:.2} kWh",
            self.battery_import_kwh, self.battery_export_kwh
        )
    }
}
