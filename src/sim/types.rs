//! Core simulation types: run configuration, generator state flags, and
//! the station and battery operating modes.

use std::fmt;

use chrono::NaiveDateTime;

/// Duration of one tick in hours (one tick is one simulated second).
pub const DT_HOURS: f64 = 1.0 / 3600.0;

/// Run-level configuration handed to the simulation loop.
///
/// # Examples
///
/// ```
/// use station_sim::sim::types::SimConfig;
///
/// let cfg = SimConfig::new(3600);
/// assert_eq!(cfg.iterations, 3600);
/// assert!(cfg.start_time.is_none());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct SimConfig {
    /// Number of ticks (seconds) to simulate.
    pub iterations: u64,
    /// Wall-clock time of tick 0, used to place absolute timestamps of
    /// input files. `None` lets the first absolute timestamp seen decide.
    pub start_time: Option<NaiveDateTime>,
}

impl SimConfig {
    /// Creates a configuration with no fixed start time.
    ///
    /// # Arguments
    ///
    /// * `iterations` - Number of ticks to run
    pub fn new(iterations: u64) -> Self {
        Self {
            iterations,
            start_time: None,
        }
    }

    /// Sets the start time of tick 0.
    pub fn with_start_time(mut self, start_time: NaiveDateTime) -> Self {
        self.start_time = Some(start_time);
        self
    }
}

/// Generator life-cycle flags.
///
/// `RUNNING_OPEN` and `RUNNING_CLOSED` never coexist with `STOPPED`;
/// `IN_SERVICE` and `UNAVAILABLE` combine with any of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GeneratorState(u8);

impl GeneratorState {
    pub const STOPPED: Self = Self(1);
    /// Running with the breaker open: counted as running, not loaded.
    pub const RUNNING_OPEN: Self = Self(2);
    /// Online and carrying load.
    pub const RUNNING_CLOSED: Self = Self(4);
    pub const IN_SERVICE: Self = Self(8);
    /// Excluded from configuration selection.
    pub const UNAVAILABLE: Self = Self(16);

    const RUN_MASK: u8 = 1 | 2 | 4;

    /// Raw flag bits.
    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }

    /// Replaces the running part of the state, keeping the service and
    /// availability flags.
    pub fn set_running(&mut self, run: Self) {
        self.0 = (self.0 & !Self::RUN_MASK) | (run.0 & Self::RUN_MASK);
    }

    /// Breaker open or closed.
    pub fn is_running(self) -> bool {
        self.0 & (Self::RUNNING_OPEN.0 | Self::RUNNING_CLOSED.0) != 0
    }

    pub fn is_online(self) -> bool {
        self.contains(Self::RUNNING_CLOSED)
    }

    pub fn is_stopped(self) -> bool {
        self.contains(Self::STOPPED)
    }

    pub fn is_available(self) -> bool {
        !self.contains(Self::UNAVAILABLE)
    }
}

impl std::ops::BitOr for GeneratorState {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Display for GeneratorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (Self::STOPPED, "Stopped"),
            (Self::RUNNING_OPEN, "RunningOpen"),
            (Self::RUNNING_CLOSED, "RunningClosed"),
            (Self::IN_SERVICE, "InService"),
            (Self::UNAVAILABLE, "Unavailable"),
        ];
        let mut first = true;
        for (flag, name) in names {
            if self.contains(flag) {
                if !first {
                    f.write_str("|")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        Ok(())
    }
}

/// Station power-source mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PowerMode {
    /// Generators carry the load, solar and battery assist.
    #[default]
    DieselPlus,
    /// Solar and battery carry the load with no generator online.
    SolarBattery,
    /// The battery ran out in solar mode; waiting for generators.
    BatteryDepleted,
}

impl PowerMode {
    /// Register encoding: 0, 1, 2.
    pub fn as_f64(self) -> f64 {
        match self {
            Self::DieselPlus => 0.0,
            Self::SolarBattery => 1.0,
            Self::BatteryDepleted => 2.0,
        }
    }
}

impl fmt::Display for PowerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::DieselPlus => "diesel-plus",
            Self::SolarBattery => "solar-battery",
            Self::BatteryDepleted => "battery-depleted",
        };
        f.write_str(s)
    }
}

/// Battery charge-management state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BatteryState {
    #[default]
    Charging,
    CanDischarge,
}

impl BatteryState {
    /// Register encoding: 0 charging, 1 can discharge.
    pub fn as_f64(self) -> f64 {
        match self {
            Self::Charging => 0.0,
            Self::CanDischarge => 1.0,
        }
    }

    /// Decodes the register value written by [`BatteryState::as_f64`].
    pub fn from_f64(v: f64) -> Self {
        if v >= 0.5 {
            Self::CanDischarge
        } else {
            Self::Charging
        }
    }
}
