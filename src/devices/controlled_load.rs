//! Sheddable and dispatchable load controllers.
//!
//! Both run the same switching policy on top of a latency line: an
//! increased request applies at once, a decrease waits until every request
//! of the last `latency` ticks has fallen and the load has been on for its
//! minimum on-time.

use std::collections::VecDeque;
use std::sync::mpsc::Receiver;

use tracing::debug;

use crate::devices::types::Actor;
use crate::error::SimResult;
use crate::sim::bus::{SharedBus, ValueChange, ValueId};
use crate::sim::types::DT_HOURS;

/// Longest latency a line remembers, in ticks.
pub const LATENCY_SLOTS: usize = 3600;

/// Sliding maximum over past requests.
///
/// Holds `(tick, request)` pairs with ticks increasing and requests strictly
/// decreasing from front to back. A request shadowed by a later one that is
/// at least as large can never be a window maximum again and is dropped. A
/// latency change only moves the window start, so requests already queued
/// are kept.
#[derive(Debug, Clone, Default)]
pub struct LatencyLine {
    peaks: VecDeque<(u64, f64)>,
}

impl LatencyLine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the request made at `tick`.
    pub fn push(&mut self, tick: u64, value: f64) {
        while self.peaks.back().is_some_and(|&(_, v)| v <= value) {
            self.peaks.pop_back();
        }
        self.peaks.push_back((tick, value));
        let horizon = tick.saturating_sub(LATENCY_SLOTS as u64 - 1);
        while self.peaks.front().is_some_and(|&(t, _)| t < horizon) {
            self.peaks.pop_front();
        }
    }

    /// Largest request made in the `latency` ticks up to and including `tick`,
    /// or 0 when none was made.
    pub fn window_max(&self, tick: u64, latency: u64) -> f64 {
        let latency = latency.min(LATENCY_SLOTS as u64 - 1);
        let from = tick.saturating_sub(latency);
        let first = self.peaks.partition_point(|&(t, _)| t < from);
        self.peaks
            .get(first)
            .filter(|&&(t, _)| t <= tick)
            .map_or(0.0, |&(_, v)| v.max(0.0))
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.peaks.len()
    }
}

/// Switching state shared by both controllers.
#[derive(Debug, Default)]
struct LoadSwitch {
    line: LatencyLine,
    on_secs: u64,
}

impl LoadSwitch {
    /// Returns the new output and whether the load was switched on.
    fn step(
        &mut self,
        tick: u64,
        request: f64,
        latency: u64,
        min_on: u64,
        current: f64,
    ) -> (f64, bool) {
        self.line.push(tick, request);
        let target = self.line.window_max(tick, latency);
        let next = if target >= current || self.on_secs >= min_on {
            target
        } else {
            current
        };
        let started = next > 0.0 && current <= 0.0;
        if next > 0.0 {
            self.on_secs = if started { 1 } else { self.on_secs + 1 };
        } else {
            self.on_secs = 0;
        }
        (next, started)
    }
}

fn ticks(bus: &SharedBus, id: ValueId) -> u64 {
    bus.get(id).max(0.0).round() as u64
}

fn log_latency_changes(rx: &Receiver<ValueChange>, bus: &SharedBus) {
    for change in rx.try_iter() {
        debug!(
            register = bus.name(change.id),
            old = change.old,
            new = change.new,
            "latency changed"
        );
    }
}

/// Sheds load when the generator setpoint exceeds online capacity.
#[derive(Debug)]
pub struct SheddableLoadController {
    load_p: ValueId,
    latency: ValueId,
    min_on_t: ValueId,
    gen_set_p: ValueId,
    gen_online_cap_p: ValueId,
    req_p: ValueId,
    p: ValueId,
    spin_p: ValueId,
    off_p: ValueId,
    e: ValueId,
    cnt: ValueId,
    switch: LoadSwitch,
    latency_changes: Receiver<ValueChange>,
}

impl SheddableLoadController {
    pub fn new(bus: &mut SharedBus) -> Self {
        let latency = bus.get_or_new("ShedLatency");
        Self {
            load_p: bus.get_or_new("ShedLoadP"),
            latency,
            min_on_t: bus.get_or_new("ShedMinOnT"),
            gen_set_p: bus.get_or_new("GenSetP"),
            gen_online_cap_p: bus.get_or_new("GenOnlineCapP"),
            req_p: bus.get_or_new("ShedReqP"),
            p: bus.get_or_new("ShedP"),
            spin_p: bus.get_or_new("ShedSpinP"),
            off_p: bus.get_or_new("ShedOffP"),
            e: bus.get_or_new("ShedE"),
            cnt: bus.get_or_new("ShedCnt"),
            switch: LoadSwitch::default(),
            latency_changes: bus.subscribe(latency),
        }
    }
}

impl Actor for SheddableLoadController {
    fn name(&self) -> &str {
        "shed"
    }

    fn init(&mut self, bus: &mut SharedBus) -> SimResult<()> {
        bus.set(self.spin_p, bus.get(self.load_p));
        Ok(())
    }

    fn run(&mut self, bus: &mut SharedBus, tick: u64) -> SimResult<()> {
        log_latency_changes(&self.latency_changes, bus);
        let available = bus.get(self.load_p).max(0.0);
        let current = bus.get(self.p);
        let shortfall = bus.get(self.gen_set_p) + current - bus.get(self.gen_online_cap_p);
        let request = available.min(shortfall.max(0.0));

        let (next, started) = self.switch.step(
            tick,
            request,
            ticks(bus, self.latency),
            ticks(bus, self.min_on_t),
            current,
        );
        let next = next.min(available);
        if started {
            bus.add(self.cnt, 1.0);
            debug!(tick, shed_kw = next, "load shed");
        }
        bus.set(self.req_p, request);
        bus.set(self.p, next);
        bus.set(self.spin_p, available - next);
        bus.set(self.off_p, next);
        bus.add(self.e, next * DT_HOURS);
        Ok(())
    }
}

/// Switches on optional load to absorb spilled solar.
#[derive(Debug)]
pub struct DispatchableLoadController {
    load_p: ValueId,
    latency: ValueId,
    min_on_t: ValueId,
    solar_spill_p: ValueId,
    req_p: ValueId,
    p: ValueId,
    e: ValueId,
    cnt: ValueId,
    switch: LoadSwitch,
    latency_changes: Receiver<ValueChange>,
}

impl DispatchableLoadController {
    pub fn new(bus: &mut SharedBus) -> Self {
        let latency = bus.get_or_new("DispLatency");
        Self {
            load_p: bus.get_or_new("DispLoadP"),
            latency,
            min_on_t: bus.get_or_new("DispMinOnT"),
            solar_spill_p: bus.get_or_new("SolarSpillP"),
            req_p: bus.get_or_new("DispReqP"),
            p: bus.get_or_new("DispP"),
            e: bus.get_or_new("DispE"),
            cnt: bus.get_or_new("DispCnt"),
            switch: LoadSwitch::default(),
            latency_changes: bus.subscribe(latency),
        }
    }
}

impl Actor for DispatchableLoadController {
    fn name(&self) -> &str {
        "dispatch"
    }

    fn init(&mut self, _bus: &mut SharedBus) -> SimResult<()> {
        Ok(())
    }

    fn run(&mut self, bus: &mut SharedBus, tick: u64) -> SimResult<()> {
        log_latency_changes(&self.latency_changes, bus);
        let available = bus.get(self.load_p).max(0.0);
        let current = bus.get(self.p);
        let request = available.min((bus.get(self.solar_spill_p) + current).max(0.0));

        let (next, started) = self.switch.step(
            tick,
            request,
            ticks(bus, self.latency),
            ticks(bus, self.min_on_t),
            current,
        );
        let next = next.min(available);
        if started {
            bus.add(self.cnt, 1.0);
            debug!(tick, dispatch_kw = next, "load dispatched");
        }
        bus.set(self.req_p, request);
        bus.set(self.p, next);
        bus.add(self.e, next * DT_HOURS);
        Ok(())
    }
}
