//! Per-unit generator life cycle: start/stop with a delay, service outages,
//! overload/underload tripping, and fuel accounting.
//!
//! Transitions that take time are queued on the generation manager's
//! [`Scheduler`] as [`GenAction`] values and applied back through
//! [`Generator::apply`] when they fire.

use tracing::{debug, info, warn};

use crate::error::{ConfigError, SimResult};
use crate::sim::bus::{SharedBus, ValueId};
use crate::sim::schedule::{ActionHandle, Scheduled, Scheduler};
use crate::sim::types::{DT_HOURS, GeneratorState};

/// Maximum number of fuel-curve points per unit.
pub const FUEL_POINTS: usize = 5;

/// How a unit's running state is decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GeneratorKind {
    /// Started and stopped by the generation manager.
    #[default]
    Simulated,
    /// Follows a measured power trace (`Gen{n}MeasP`); ignores commands.
    Measured,
}

/// Delayed transition of one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenAction {
    /// Zero-based index of the unit in the manager's list.
    pub unit: usize,
    pub kind: GenActionKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenActionKind {
    /// Start delay elapsed: close the breaker.
    Started,
    /// Stop delay elapsed: the unit is stopped.
    Stopped,
    /// A unit going to service has come off line; the outage begins.
    ServiceStopped,
    /// Service outage is over.
    ServiceFinished,
}

/// Piecewise-linear fuel curve: litres per kWh against load factor.
#[derive(Debug, Clone, PartialEq)]
pub struct FuelCurve {
    points: Vec<(f64, f64)>,
}

impl FuelCurve {
    /// Builds a curve from `(load_factor, litres_per_kwh)` points.
    ///
    /// Trailing `(0, 0)` points are unused slots and are dropped.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] on `field` if fewer than two points remain.
    pub fn new(field: &str, points: &[(f64, f64)]) -> Result<Self, ConfigError> {
        let mut points = points.to_vec();
        while points.last().is_some_and(|&(lf, l)| lf == 0.0 && l == 0.0) {
            points.pop();
        }
        if points.len() < 2 {
            return Err(ConfigError::new(
                field,
                format!("fuel curve needs at least 2 points, found {}", points.len()),
            ));
        }
        Ok(Self { points })
    }

    /// Fuel consumption in L/kWh at `load_factor`.
    ///
    /// Interpolates between the bracketing pair of points; outside the
    /// curve the first or last pair is extended.
    pub fn litres_per_kwh(&self, load_factor: f64) -> f64 {
        let pts = &self.points;
        let mut i = 0;
        while i + 2 < pts.len() && load_factor > pts[i + 1].0 {
            i += 1;
        }
        let (x0, y0) = pts[i];
        let (x1, y1) = pts[i + 1];
        if x1 == x0 {
            y0
        } else {
            y0 + (load_factor - x0) * (y1 - y0) / (x1 - x0)
        }
    }
}

/// Registers bound by one generator unit.
#[derive(Debug)]
struct GenRegs {
    p: ValueId,
    max_p: ValueId,
    avail: ValueId,
    ideal_pct: ValueId,
    min_run_t: ValueId,
    service_t: ValueId,
    outage_t: ValueId,
    overload_pct: ValueId,
    overload_t: ValueId,
    underload_pct: ValueId,
    underload_t: ValueId,
    fuel_lf: [ValueId; FUEL_POINTS],
    fuel_l: [ValueId; FUEL_POINTS],
    meas_p: ValueId,
    state: ValueId,
    start_cnt: ValueId,
    stop_cnt: ValueId,
    trip_cnt: ValueId,
    service_cnt: ValueId,
    run_cnt: ValueId,
    e: ValueId,
    fuel_cnt: ValueId,
    load_fact: ValueId,
    spin_p: ValueId,
    ideal_p: ValueId,
}

impl GenRegs {
    fn bind(bus: &mut SharedBus, unit: usize) -> Self {
        let mut reg = |suffix: &str| bus.get_or_new(&format!("Gen{unit}{suffix}"));
        let fuel_lf = std::array::from_fn(|i| reg(&format!("FuelLf{}", i + 1)));
        let fuel_l = std::array::from_fn(|i| reg(&format!("FuelL{}", i + 1)));
        Self {
            p: reg("P"),
            max_p: reg("MaxP"),
            avail: reg("Avail"),
            ideal_pct: reg("IdealPct"),
            min_run_t: reg("MinRunT"),
            service_t: reg("ServiceT"),
            outage_t: reg("OutageT"),
            overload_pct: reg("OverloadPct"),
            overload_t: reg("OverloadT"),
            underload_pct: reg("UnderloadPct"),
            underload_t: reg("UnderloadT"),
            fuel_lf,
            fuel_l,
            meas_p: reg("MeasP"),
            state: reg("State"),
            start_cnt: reg("StartCnt"),
            stop_cnt: reg("StopCnt"),
            trip_cnt: reg("TripCnt"),
            service_cnt: reg("ServiceCnt"),
            run_cnt: reg("RunCnt"),
            e: reg("E"),
            fuel_cnt: reg("FuelCnt"),
            load_fact: reg("LoadFact"),
            spin_p: reg("SpinP"),
            ideal_p: reg("IdealP"),
        }
    }
}

/// One generator unit.
#[derive(Debug)]
pub struct Generator {
    /// Zero-based position in the manager's list.
    index: usize,
    kind: GeneratorKind,
    regs: GenRegs,
    state: GeneratorState,
    /// A delayed transition is in flight; new commands are ignored.
    busy: bool,
    pending: Option<ActionHandle>,
    stop_pending: bool,
    run_secs: u64,
    overload_secs: u64,
    underload_secs: u64,
}

impl Generator {
    /// Creates unit `index + 1` and binds its `Gen{n}*` registers.
    pub fn new(index: usize, kind: GeneratorKind, bus: &mut SharedBus) -> Self {
        Self {
            index,
            kind,
            regs: GenRegs::bind(bus, index + 1),
            state: GeneratorState::STOPPED,
            busy: false,
            pending: None,
            stop_pending: false,
            run_secs: 0,
            overload_secs: 0,
            underload_secs: 0,
        }
    }

    /// One-based unit number.
    pub fn unit(&self) -> usize {
        self.index + 1
    }

    /// Bit of this unit in configuration masks.
    pub fn bit(&self) -> u8 {
        1 << self.index
    }

    pub fn kind(&self) -> GeneratorKind {
        self.kind
    }

    pub fn state(&self) -> GeneratorState {
        self.state
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn max_p(&self, bus: &SharedBus) -> f64 {
        bus.get(self.regs.max_p)
    }

    pub fn p(&self, bus: &SharedBus) -> f64 {
        bus.get(self.regs.p)
    }

    /// Per-unit minimum run time in seconds.
    pub fn min_run_t(&self, bus: &SharedBus) -> f64 {
        bus.get(self.regs.min_run_t)
    }

    pub fn energy(&self, bus: &SharedBus) -> f64 {
        bus.get(self.regs.e)
    }

    pub fn fuel(&self, bus: &SharedBus) -> f64 {
        bus.get(self.regs.fuel_cnt)
    }

    /// Measured output, meaningful for [`GeneratorKind::Measured`] units.
    pub fn measured_p(&self, bus: &SharedBus) -> f64 {
        bus.get(self.regs.meas_p)
    }

    /// Sets the load-share output of the unit.
    pub fn set_p(&self, bus: &mut SharedBus, p: f64) {
        bus.set(self.regs.p, p);
    }

    /// Availability register handle, for change subscriptions.
    pub fn avail_id(&self) -> ValueId {
        self.regs.avail
    }

    /// Updates the `Unavailable` flag and, for measured units, the running
    /// state from the measured output.
    pub fn refresh(&mut self, bus: &mut SharedBus) {
        if bus.get(self.regs.avail) == 0.0 || self.state.contains(GeneratorState::IN_SERVICE) {
            self.state.insert(GeneratorState::UNAVAILABLE);
        } else {
            self.state.remove(GeneratorState::UNAVAILABLE);
        }

        if self.kind == GeneratorKind::Measured {
            let online = bus.get(self.regs.meas_p) > 0.0;
            if online && !self.state.is_online() {
                self.state.set_running(GeneratorState::RUNNING_CLOSED);
                bus.add(self.regs.start_cnt, 1.0);
            } else if !online && self.state.is_online() {
                self.state.set_running(GeneratorState::STOPPED);
                bus.add(self.regs.stop_cnt, 1.0);
            }
        }
        bus.set(self.regs.state, f64::from(self.state.bits()));
    }

    /// Starts the unit: breaker closes `delay` ticks from now.
    ///
    /// Cancels a pending stop instead if one is in flight. Ignored while
    /// busy, when already running, or when unavailable.
    pub fn start(&mut self, bus: &mut SharedBus, sched: &mut Scheduler<GenAction>, delay: u64) {
        if self.kind == GeneratorKind::Measured {
            return;
        }
        if self.stop_pending {
            if let Some(handle) = self.pending.take() {
                sched.cancel(handle);
            }
            self.stop_pending = false;
            self.busy = false;
            self.state.set_running(GeneratorState::RUNNING_CLOSED);
            debug!(unit = self.unit(), "pending stop cancelled by start");
            return;
        }
        if self.busy || !self.state.is_stopped() || !self.state.is_available() {
            return;
        }
        self.state.set_running(GeneratorState::RUNNING_OPEN);
        debug!(unit = self.unit(), delay, "starting");
        self.schedule(bus, sched, delay, GenActionKind::Started);
    }

    /// Takes the unit off line and stops it `delay` ticks from now.
    ///
    /// Ignored while busy or when not online.
    pub fn stop(&mut self, bus: &mut SharedBus, sched: &mut Scheduler<GenAction>, delay: u64) {
        if self.kind == GeneratorKind::Measured || self.busy || !self.state.is_online() {
            return;
        }
        self.state.set_running(GeneratorState::RUNNING_OPEN);
        self.stop_pending = true;
        debug!(unit = self.unit(), delay, "stopping");
        self.schedule(bus, sched, delay, GenActionKind::Stopped);
    }

    /// Stops the unit at once, dropping any pending transition.
    pub fn critical_stop(&mut self, bus: &mut SharedBus, sched: &mut Scheduler<GenAction>) {
        if self.state.is_running() {
            bus.add(self.regs.stop_cnt, 1.0);
        }
        self.reset(bus, sched);
    }

    /// Forces the unit to `Stopped` and cancels pending start/stop actions.
    ///
    /// A unit in service keeps its outage timer; if it was still running
    /// down to service, the outage starts now.
    pub fn reset(&mut self, bus: &mut SharedBus, sched: &mut Scheduler<GenAction>) {
        let was_running = self.state.is_running();
        bus.set(self.regs.p, 0.0);
        if self.state.contains(GeneratorState::IN_SERVICE) {
            if was_running {
                self.cancel_pending(sched);
                self.state.set_running(GeneratorState::STOPPED);
                self.begin_outage(bus, sched);
            }
            return;
        }
        self.cancel_pending(sched);
        self.busy = false;
        self.stop_pending = false;
        self.state.set_running(GeneratorState::STOPPED);
    }

    /// Sends the unit to service.
    ///
    /// A running unit is marked unavailable at once and keeps carrying load
    /// until the start/stop delay has elapsed; a stopped unit begins its
    /// outage immediately.
    pub fn service(&mut self, bus: &mut SharedBus, sched: &mut Scheduler<GenAction>, delay: u64) {
        if self.state.contains(GeneratorState::IN_SERVICE) {
            return;
        }
        info!(unit = self.unit(), "generator due for service");
        self.cancel_pending(sched);
        self.stop_pending = false;
        self.state
            .insert(GeneratorState::IN_SERVICE | GeneratorState::UNAVAILABLE);
        if self.state.is_running() {
            self.schedule(bus, sched, delay, GenActionKind::ServiceStopped);
        } else {
            self.busy = true;
            self.begin_outage(bus, sched);
        }
    }

    /// Applies a delayed transition that has fired.
    pub fn apply(
        &mut self,
        kind: GenActionKind,
        bus: &mut SharedBus,
        sched: &mut Scheduler<GenAction>,
    ) {
        self.pending = None;
        match kind {
            GenActionKind::Started => {
                self.busy = false;
                self.state.set_running(GeneratorState::RUNNING_CLOSED);
                bus.add(self.regs.start_cnt, 1.0);
                info!(unit = self.unit(), "generator online");
            }
            GenActionKind::Stopped => {
                self.busy = false;
                self.stop_pending = false;
                self.state.set_running(GeneratorState::STOPPED);
                bus.set(self.regs.p, 0.0);
                bus.add(self.regs.stop_cnt, 1.0);
                info!(unit = self.unit(), "generator stopped");
            }
            GenActionKind::ServiceStopped => {
                self.state.set_running(GeneratorState::STOPPED);
                bus.set(self.regs.p, 0.0);
                bus.add(self.regs.stop_cnt, 1.0);
                self.begin_outage(bus, sched);
            }
            GenActionKind::ServiceFinished => {
                self.busy = false;
                self.state.remove(GeneratorState::IN_SERVICE);
                if bus.get(self.regs.avail) != 0.0 {
                    self.state.remove(GeneratorState::UNAVAILABLE);
                }
                bus.set(self.regs.start_cnt, 0.0);
                bus.set(self.regs.stop_cnt, 0.0);
                bus.add(self.regs.service_cnt, 1.0);
                info!(unit = self.unit(), "generator service finished");
            }
        }
        bus.set(self.regs.state, f64::from(self.state.bits()));
    }

    /// Per-tick accounting: run time, trips, energy, fuel, and service.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the unit is loaded and its fuel curve
    /// has fewer than two points.
    pub fn run(
        &mut self,
        bus: &mut SharedBus,
        sched: &mut Scheduler<GenAction>,
        delay: u64,
    ) -> SimResult<()> {
        if self.state.is_running() {
            self.run_secs += 1;
            bus.set(self.regs.run_cnt, self.run_secs as f64 / 3600.0);
        }

        if self.state.is_online() && self.kind == GeneratorKind::Simulated {
            self.check_trip(bus, sched);
        }

        if self.state.is_online() {
            let p = bus.get(self.regs.p);
            let max_p = bus.get(self.regs.max_p);
            let load_fact = if max_p > 0.0 { p / max_p } else { 0.0 };
            bus.add(self.regs.e, p * DT_HOURS);
            bus.set(self.regs.load_fact, load_fact);
            let curve = self.fuel_curve(bus)?;
            bus.add(
                self.regs.fuel_cnt,
                curve.litres_per_kwh(load_fact) * p * DT_HOURS,
            );
            bus.set(self.regs.spin_p, (max_p - p).max(0.0));
            bus.set(self.regs.ideal_p, max_p * bus.get(self.regs.ideal_pct));
        } else {
            bus.set(self.regs.load_fact, 0.0);
            bus.set(self.regs.spin_p, 0.0);
            bus.set(self.regs.ideal_p, 0.0);
        }

        let interval = (bus.get(self.regs.service_t) * 3600.0).round();
        if self.kind == GeneratorKind::Simulated
            && interval >= 1.0
            && self.state.is_running()
            && self.run_secs % (interval as u64) == 0
        {
            self.service(bus, sched, delay);
        }

        bus.set(self.regs.state, f64::from(self.state.bits()));
        Ok(())
    }

    /// Reads the unit's fuel curve from its registers.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if fewer than two points are set.
    pub fn fuel_curve(&self, bus: &SharedBus) -> Result<FuelCurve, ConfigError> {
        let points: Vec<(f64, f64)> = (0..FUEL_POINTS)
            .map(|i| (bus.get(self.regs.fuel_lf[i]), bus.get(self.regs.fuel_l[i])))
            .collect();
        FuelCurve::new(&format!("Gen{}Fuel", self.unit()), &points)
    }

    fn check_trip(&mut self, bus: &mut SharedBus, sched: &mut Scheduler<GenAction>) {
        let p = bus.get(self.regs.p);
        let max_p = bus.get(self.regs.max_p);
        if p > max_p {
            self.overload_secs += 1;
            self.underload_secs = 0;
        } else if p < 0.0 {
            self.underload_secs += 1;
            self.overload_secs = 0;
        } else {
            self.overload_secs = 0;
            self.underload_secs = 0;
        }

        let over_t = bus.get(self.regs.overload_t);
        let over_pct = bus.get(self.regs.overload_pct);
        let under_t = bus.get(self.regs.underload_t);
        let under_pct = bus.get(self.regs.underload_pct);
        let overload = (over_t > 0.0 && self.overload_secs as f64 > over_t)
            || (over_pct > 0.0 && p > max_p * (1.0 + over_pct));
        let underload = (under_t > 0.0 && self.underload_secs as f64 > under_t)
            || (under_pct > 0.0 && p < -max_p * under_pct);

        if overload || underload {
            warn!(
                unit = self.unit(),
                p,
                max_p,
                cause = if overload { "overload" } else { "underload" },
                "generator tripped"
            );
            bus.add(self.regs.trip_cnt, 1.0);
            self.overload_secs = 0;
            self.underload_secs = 0;
            self.critical_stop(bus, sched);
        }
    }

    fn schedule(
        &mut self,
        bus: &mut SharedBus,
        sched: &mut Scheduler<GenAction>,
        delay: u64,
        kind: GenActionKind,
    ) {
        self.busy = true;
        let action = GenAction {
            unit: self.index,
            kind,
        };
        match sched.after(delay, action) {
            Scheduled::Now(action) => self.apply(action.kind, bus, sched),
            Scheduled::Later(handle) => self.pending = Some(handle),
        }
    }

    fn begin_outage(&mut self, bus: &mut SharedBus, sched: &mut Scheduler<GenAction>) {
        let outage = (bus.get(self.regs.outage_t) * 3600.0).round().max(0.0) as u64;
        self.schedule(bus, sched, outage, GenActionKind::ServiceFinished);
    }

    fn cancel_pending(&mut self, sched: &mut Scheduler<GenAction>) {
        if let Some(handle) = self.pending.take() {
            sched.cancel(handle);
        }
    }
}
