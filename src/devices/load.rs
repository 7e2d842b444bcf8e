use std::collections::VecDeque;

use tracing::warn;

use crate::devices::types::Actor;
use crate::error::SimResult;
use crate::sim::bus::{SharedBus, ValueId};
use crate::sim::types::DT_HOURS;

/// Station load after controlled-load adjustments.
///
/// `LoadP = LoadRawP - ShedP + DispP`, using the controller outputs of the
/// previous tick. Tracks the rolling peak over `LoadPeakT` seconds (the
/// whole run when zero) and raises `LoadCapAl` while that peak exceeds the
/// available generating capacity scaled by `LoadCapMargin`.
#[derive(Debug)]
pub struct Load {
    raw_p: ValueId,
    shed_p: ValueId,
    disp_p: ValueId,
    peak_t: ValueId,
    cap_margin: ValueId,
    gen_avail_cap_p: ValueId,
    p: ValueId,
    e: ValueId,
    max_p: ValueId,
    cap_al: ValueId,
    /// Monotonic decreasing `(tick, load)` candidates for the window peak.
    window: VecDeque<(u64, f64)>,
    alarm: bool,
}

impl Load {
    pub fn new(bus: &mut SharedBus) -> Self {
        Self {
            raw_p: bus.get_or_new("LoadRawP"),
            shed_p: bus.get_or_new("ShedP"),
            disp_p: bus.get_or_new("DispP"),
            peak_t: bus.get_or_new("LoadPeakT"),
            cap_margin: bus.get_or_new("LoadCapMargin"),
            gen_avail_cap_p: bus.get_or_new("GenAvailCapP"),
            p: bus.get_or_new("LoadP"),
            e: bus.get_or_new("LoadE"),
            max_p: bus.get_or_new("LoadMaxP"),
            cap_al: bus.get_or_new("LoadCapAl"),
            window: VecDeque::new(),
            alarm: false,
        }
    }

    fn rolling_peak(&mut self, tick: u64, load: f64, span: u64) -> f64 {
        if span == 0 {
            // whole-run peak: only the running maximum can ever be reported
            let peak = match self.window.front() {
                Some(&(t, v)) if v > load => (t, v),
                _ => (tick, load),
            };
            self.window.clear();
            self.window.push_back(peak);
            return peak.1;
        }
        while self.window.back().is_some_and(|&(_, v)| v <= load) {
            self.window.pop_back();
        }
        self.window.push_back((tick, load));
        while self.window.front().is_some_and(|&(t, _)| t + span <= tick) {
            self.window.pop_front();
        }
        self.window.front().map_or(load, |&(_, v)| v)
    }
}

impl Actor for Load {
    fn name(&self) -> &str {
        "load"
    }

    fn init(&mut self, _bus: &mut SharedBus) -> SimResult<()> {
        self.window.clear();
        self.alarm = false;
        Ok(())
    }

    fn run(&mut self, bus: &mut SharedBus, tick: u64) -> SimResult<()> {
        let load = bus.get(self.raw_p) - bus.get(self.shed_p) + bus.get(self.disp_p);
        bus.set(self.p, load);
        bus.add(self.e, load * DT_HOURS);

        let span = bus.get(self.peak_t).max(0.0).round() as u64;
        let peak = self.rolling_peak(tick, load, span);
        bus.set(self.max_p, peak);

        let alarm = peak > bus.get(self.gen_avail_cap_p) * bus.get(self.cap_margin);
        if alarm && !self.alarm {
            warn!(tick, peak_kw = peak, "load exceeds available generating capacity");
        }
        self.alarm = alarm;
        bus.set(self.cap_al, if alarm { 1.0 } else { 0.0 });
        Ok(())
    }
}
