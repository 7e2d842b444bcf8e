//! TOML-based station configuration and preset definitions.
//!
//! A station file describes the generators, their configurations, the
//! battery, loads, and the time-series files of a run. Every numeric
//! parameter ends up in a bus register during init, so an input file can
//! override any of them mid-run.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::warn;

use crate::devices::generation::GenConfiguration;
use crate::devices::generator::{FUEL_POINTS, GeneratorKind};
use crate::error::ConfigError;
use crate::io::reader::parse_date_time;
use crate::io::writer::{OutputSpec, VariableSpec};
use crate::sim::bus::SharedBus;
use crate::sim::types::SimConfig;

/// Most generator units a station can hold (one bit each in a mask).
pub const MAX_GENERATORS: usize = 8;
/// Most declared configurations.
pub const MAX_CONFIGURATIONS: usize = 256;

/// Keys present in a section but not understood by it.
type Extra = BTreeMap<String, toml::Value>;

/// Top-level station configuration parsed from TOML.
///
/// All sections have defaults. Load from TOML with
/// [`StationConfig::from_toml_file`] or use a built-in preset through
/// [`StationConfig::from_preset`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StationConfig {
    /// Run length and start time.
    #[serde(default)]
    pub simulation: SimulationConfig,
    /// Parameters shared by the generation manager.
    #[serde(default)]
    pub generation: GenerationConfig,
    /// Generator units, unit 1 first.
    #[serde(default, rename = "generator")]
    pub generators: Vec<GeneratorConfig>,
    /// Declared generator configurations in priority order.
    #[serde(default, rename = "configuration")]
    pub configurations: Vec<ConfigurationConfig>,
    /// Spinning reserve and setpoint smoothing.
    #[serde(default)]
    pub station: StationSection,
    #[serde(default)]
    pub battery: BatteryConfig,
    #[serde(default)]
    pub load: LoadConfig,
    #[serde(default)]
    pub shed: ControlledLoadConfig,
    #[serde(default)]
    pub dispatch: ControlledLoadConfig,
    /// Initial register values, applied after every other section.
    #[serde(default)]
    pub values: BTreeMap<String, f64>,
    #[serde(default, rename = "input")]
    pub inputs: Vec<InputConfig>,
    #[serde(default, rename = "output")]
    pub outputs: Vec<OutputConfig>,
    #[serde(flatten)]
    pub extra: Extra,
}

/// Run length and start time.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Number of one-second ticks (must be > 0).
    pub iterations: u64,
    /// Wall-clock time of tick 0; absolute input timestamps are taken
    /// against it.
    pub start_time: Option<String>,
    /// Working directory for relative input and output paths.
    pub directory: Option<PathBuf>,
    #[serde(flatten)]
    pub extra: Extra,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            iterations: 86_400,
            start_time: None,
            directory: None,
            extra: Extra::new(),
        }
    }
}

/// Parameters of the generation manager (`Gen*` registers).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Seconds between a start/stop command and its completion.
    pub start_stop_delay: f64,
    /// Station-wide minimum run time after a switch (s).
    pub min_run_t: f64,
    /// Hysteresis before switching to a smaller configuration (kW).
    pub cfg_hyst_p: f64,
    /// Debounce before switching up (s).
    pub sw_up_delay: f64,
    /// Debounce before switching down (s).
    pub sw_dn_delay: f64,
    /// Setpoints at or below this may run no generator (kW).
    pub insignificant_p: f64,
    /// Minimum generator loading kept by the solar setpoint (fraction).
    pub min_load_pct: f64,
    /// Name of the configuration used to recover from a blackout.
    pub black_start: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            start_stop_delay: 60.0,
            min_run_t: 0.0,
            cfg_hyst_p: 0.0,
            sw_up_delay: 0.0,
            sw_dn_delay: 0.0,
            insignificant_p: 0.0,
            min_load_pct: 0.3,
            black_start: None,
            extra: Extra::new(),
        }
    }
}

/// One generator unit (`Gen{n}*` registers).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub kind: GeneratorKind,
    /// Rated power (kW).
    pub max_p: f64,
    pub available: bool,
    /// Preferred loading (fraction of rated power).
    pub ideal_pct: f64,
    /// Minimum run time of this unit (s).
    pub min_run_t: f64,
    /// Running hours between services, 0 disables servicing.
    pub service_t: f64,
    /// Outage lengths of the service schedule (hours); they add up to the
    /// outage of each service.
    pub service_outages_h: Vec<f64>,
    pub overload_pct: f64,
    pub overload_t: f64,
    pub underload_pct: f64,
    pub underload_t: f64,
    /// `[load_factor, litres_per_kwh]` points, at most five.
    pub fuel_curve: Vec<[f64; 2]>,
    #[serde(flatten)]
    pub extra: Extra,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            kind: GeneratorKind::Simulated,
            max_p: 500.0,
            available: true,
            ideal_pct: 0.75,
            min_run_t: 0.0,
            service_t: 0.0,
            service_outages_h: Vec::new(),
            overload_pct: 0.0,
            overload_t: 0.0,
            underload_pct: 0.0,
            underload_t: 0.0,
            fuel_curve: vec![[0.25, 0.35], [0.5, 0.29], [0.75, 0.27], [1.0, 0.26]],
            extra: Extra::new(),
        }
    }
}

impl GeneratorConfig {
    fn sized(max_p: f64) -> Self {
        Self {
            max_p,
            ..Self::default()
        }
    }
}

/// A named set of units that may run together.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ConfigurationConfig {
    pub name: String,
    /// 1-based unit numbers.
    pub units: Vec<usize>,
    #[serde(flatten)]
    pub extra: Extra,
}

impl ConfigurationConfig {
    fn new(name: &str, units: &[usize]) -> Self {
        Self {
            name: name.to_string(),
            units: units.to_vec(),
            extra: Extra::new(),
        }
    }

    /// Unit bit mask; out-of-range unit numbers are ignored.
    pub fn mask(&self) -> u8 {
        self.units
            .iter()
            .filter(|u| (1..=MAX_GENERATORS).contains(*u))
            .fold(0, |m, u| m | (1 << (u - 1)))
    }
}

/// Spinning reserve and setpoint smoothing (`Stat*` registers).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StationSection {
    /// Minimum spinning reserve (kW).
    pub spin_set_p: f64,
    /// Share of solar output covered by reserve (fraction).
    pub solar_cov_pct: f64,
    /// Keep a negative reserve instead of flooring it at zero.
    pub maintain_spin: bool,
    /// Smoothing factor of the configuration setpoint, 1 disables it.
    pub cfg_set_k: f64,
    #[serde(flatten)]
    pub extra: Extra,
}

impl Default for StationSection {
    fn default() -> Self {
        Self {
            spin_set_p: 0.0,
            solar_cov_pct: 0.0,
            maintain_spin: false,
            cfg_set_k: 1.0,
            extra: Extra::new(),
        }
    }
}

/// Battery storage parameters (`Bat*` registers).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BatteryConfig {
    /// Capacity (kWh), 0 means no battery.
    pub max_e: f64,
    /// Stored energy at tick 0 (kWh).
    pub initial_e: f64,
    /// Power limit (kW), 0 means unlimited.
    pub max_p: f64,
    /// Charging efficiency (0.0-1.0).
    pub efficiency: f64,
    /// Charging stops at this energy (kWh).
    pub high_e: f64,
    /// Discharging stops at this energy (kWh).
    pub low_e: f64,
    /// Charging power drawn from the generators in diesel mode (kW).
    pub recharge_p: f64,
    #[serde(flatten)]
    pub extra: Extra,
}

impl Default for BatteryConfig {
    fn default() -> Self {
        Self {
            max_e: 0.0,
            initial_e: 0.0,
            max_p: 0.0,
            efficiency: 1.0,
            high_e: 0.0,
            low_e: 0.0,
            recharge_p: 0.0,
            extra: Extra::new(),
        }
    }
}

/// Station load parameters (`Load*` registers).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoadConfig {
    /// Raw load before any input file overrides it (kW).
    pub initial_p: f64,
    /// Rolling peak window (s), 0 means the whole run.
    pub peak_t: f64,
    /// Share of available capacity the peak may use before alarming.
    pub cap_margin: f64,
    #[serde(flatten)]
    pub extra: Extra,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            initial_p: 0.0,
            peak_t: 0.0,
            cap_margin: 1.0,
            extra: Extra::new(),
        }
    }
}

/// Sheddable or dispatchable load parameters.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ControlledLoadConfig {
    /// Controllable load available (kW).
    pub load_p: f64,
    /// Ticks a lower request must persist before it applies.
    pub latency: f64,
    /// Minimum on time (s).
    pub min_on_t: f64,
    #[serde(flatten)]
    pub extra: Extra,
}

/// An input time-series file.
#[derive(Debug, Clone, Deserialize)]
pub struct InputConfig {
    pub path: PathBuf,
    #[serde(default)]
    pub recycle: bool,
    #[serde(flatten)]
    pub extra: Extra,
}

impl InputConfig {
    pub fn new(path: impl Into<PathBuf>, recycle: bool) -> Self {
        Self {
            path: path.into(),
            recycle,
            extra: Extra::new(),
        }
    }
}

/// An output time-series file.
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    pub path: PathBuf,
    #[serde(default = "default_period")]
    pub period: u64,
    pub variables: Vec<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

fn default_period() -> u64 {
    1
}

impl OutputConfig {
    pub fn new(path: impl Into<PathBuf>, period: u64, variables: Vec<String>) -> Self {
        Self {
            path: path.into(),
            period,
            variables,
            extra: Extra::new(),
        }
    }

    pub fn to_spec(&self) -> OutputSpec {
        OutputSpec {
            path: self.path.clone(),
            period: self.period,
            variables: self.variables.clone(),
        }
    }
}

impl StationConfig {
    /// Returns the baseline station: four 500 kW units, no battery or solar,
    /// constant 600 kW load.
    pub fn baseline() -> Self {
        let configurations = vec![
            ConfigurationConfig::new("none", &[]),
            ConfigurationConfig::new("one", &[1]),
            ConfigurationConfig::new("two", &[1, 2]),
            ConfigurationConfig::new("three", &[1, 2, 3]),
            ConfigurationConfig::new("all", &[1, 2, 3, 4]),
        ];
        Self {
            generation: GenerationConfig {
                min_run_t: 900.0,
                cfg_hyst_p: 50.0,
                sw_dn_delay: 300.0,
                insignificant_p: 10.0,
                black_start: Some("one".to_string()),
                ..GenerationConfig::default()
            },
            generators: (0..4).map(|_| GeneratorConfig::sized(500.0)).collect(),
            configurations,
            station: StationSection {
                spin_set_p: 150.0,
                ..StationSection::default()
            },
            load: LoadConfig {
                initial_p: 600.0,
                peak_t: 3600.0,
                ..LoadConfig::default()
            },
            ..Self::default()
        }
    }

    /// Returns the solar hybrid preset: three units, a 300 kW array, and a
    /// battery large enough to carry the load on its own.
    pub fn solar_hybrid() -> Self {
        let configurations = vec![
            ConfigurationConfig::new("none", &[]),
            ConfigurationConfig::new("small", &[3]),
            ConfigurationConfig::new("one", &[1]),
            ConfigurationConfig::new("one_small", &[1, 3]),
            ConfigurationConfig::new("two", &[1, 2]),
            ConfigurationConfig::new("all", &[1, 2, 3]),
        ];
        let mut values = BTreeMap::new();
        values.insert("SolarAvailP".to_string(), 300.0);
        Self {
            generation: GenerationConfig {
                min_run_t: 600.0,
                cfg_hyst_p: 30.0,
                sw_up_delay: 30.0,
                sw_dn_delay: 300.0,
                insignificant_p: 20.0,
                black_start: Some("small".to_string()),
                ..GenerationConfig::default()
            },
            generators: vec![
                GeneratorConfig::sized(500.0),
                GeneratorConfig::sized(500.0),
                GeneratorConfig::sized(250.0),
            ],
            configurations,
            station: StationSection {
                spin_set_p: 100.0,
                solar_cov_pct: 0.5,
                cfg_set_k: 0.05,
                ..StationSection::default()
            },
            battery: BatteryConfig {
                max_e: 500.0,
                initial_e: 400.0,
                max_p: 250.0,
                efficiency: 0.92,
                high_e: 450.0,
                low_e: 100.0,
                recharge_p: 100.0,
                ..BatteryConfig::default()
            },
            load: LoadConfig {
                initial_p: 350.0,
                peak_t: 3600.0,
                ..LoadConfig::default()
            },
            shed: ControlledLoadConfig {
                load_p: 50.0,
                latency: 60.0,
                min_on_t: 300.0,
                ..ControlledLoadConfig::default()
            },
            dispatch: ControlledLoadConfig {
                load_p: 40.0,
                latency: 60.0,
                min_on_t: 300.0,
                ..ControlledLoadConfig::default()
            },
            values,
            ..Self::default()
        }
    }

    /// Available preset names.
    pub const PRESETS: &[&str] = &["baseline", "solar_hybrid"];

    /// Loads a station from a named preset.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the preset name is unknown.
    pub fn from_preset(name: &str) -> Result<Self, ConfigError> {
        match name {
            "baseline" => Ok(Self::baseline()),
            "solar_hybrid" => Ok(Self::solar_hybrid()),
            _ => Err(ConfigError::new(
                "preset",
                format!(
                    "unknown preset \"{name}\", available: {}",
                    Self::PRESETS.join(", ")
                ),
            )),
        }
    }

    /// Parses a station from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file cannot be read or the TOML is invalid.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| {
            ConfigError::new("config", format!("cannot read \"{}\": {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses a station from a TOML string. Unknown keys are logged and
    /// otherwise ignored.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the TOML is invalid.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let cfg: Self = toml::from_str(s).map_err(|e| ConfigError::new("toml", e.to_string()))?;
        for key in cfg.unknown_keys() {
            warn!(key = %key, "unknown configuration option ignored");
        }
        Ok(cfg)
    }

    /// Dotted paths of every key no section understood.
    pub fn unknown_keys(&self) -> Vec<String> {
        fn collect(out: &mut Vec<String>, prefix: &str, extra: &Extra) {
            out.extend(extra.keys().map(|k| format!("{prefix}{k}")));
        }
        let mut out = Vec::new();
        collect(&mut out, "", &self.extra);
        collect(&mut out, "simulation.", &self.simulation.extra);
        collect(&mut out, "generation.", &self.generation.extra);
        for (i, g) in self.generators.iter().enumerate() {
            collect(&mut out, &format!("generator[{i}]."), &g.extra);
        }
        for (i, c) in self.configurations.iter().enumerate() {
            collect(&mut out, &format!("configuration[{i}]."), &c.extra);
        }
        collect(&mut out, "station.", &self.station.extra);
        collect(&mut out, "battery.", &self.battery.extra);
        collect(&mut out, "load.", &self.load.extra);
        collect(&mut out, "shed.", &self.shed.extra);
        collect(&mut out, "dispatch.", &self.dispatch.extra);
        for (i, input) in self.inputs.iter().enumerate() {
            collect(&mut out, &format!("input[{i}]."), &input.extra);
        }
        for (i, output) in self.outputs.iter().enumerate() {
            collect(&mut out, &format!("output[{i}]."), &output.extra);
        }
        out
    }

    /// Validates all fields and returns a list of errors.
    ///
    /// Returns an empty vector if configuration is valid. Fuel curves with
    /// too few points are left to the first generator that needs one.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.simulation.iterations == 0 {
            errors.push(ConfigError::new("simulation.iterations", "must be > 0"));
        }
        if let Some(text) = &self.simulation.start_time {
            if parse_date_time(text).is_none() {
                errors.push(ConfigError::new(
                    "simulation.start_time",
                    format!("cannot parse \"{text}\" as a date/time"),
                ));
            }
        }

        if self.generators.len() > MAX_GENERATORS {
            errors.push(ConfigError::new(
                "generator",
                format!("at most {MAX_GENERATORS} units, got {}", self.generators.len()),
            ));
        }
        for (i, g) in self.generators.iter().enumerate() {
            let field = |name: &str| format!("generator[{i}].{name}");
            if g.max_p < 0.0 {
                errors.push(ConfigError::new(field("max_p"), "must be >= 0"));
            }
            if g.service_t < 0.0 {
                errors.push(ConfigError::new(field("service_t"), "must be >= 0"));
            }
            if g.service_outages_h.iter().any(|h| *h < 0.0) {
                errors.push(ConfigError::new(field("service_outages_h"), "must be >= 0"));
            }
            if g.fuel_curve.len() > FUEL_POINTS {
                errors.push(ConfigError::new(
                    field("fuel_curve"),
                    format!("at most {FUEL_POINTS} points"),
                ));
            }
        }

        if self.configurations.len() > MAX_CONFIGURATIONS {
            errors.push(ConfigError::new(
                "configuration",
                format!("at most {MAX_CONFIGURATIONS} configurations"),
            ));
        }
        let units = self.generators.len().min(MAX_GENERATORS);
        for (i, c) in self.configurations.iter().enumerate() {
            if let Some(u) = c.units.iter().find(|u| !(1..=units).contains(*u)) {
                errors.push(ConfigError::new(
                    format!("configuration[{i}].units"),
                    format!("unit {u} does not exist (1..={units})"),
                ));
            }
        }
        if let Some(name) = &self.generation.black_start {
            if !self.configurations.iter().any(|c| &c.name == name) {
                errors.push(ConfigError::new(
                    "generation.black_start",
                    format!("no configuration named \"{name}\""),
                ));
            }
        }

        let bat = &self.battery;
        if bat.max_e < 0.0 {
            errors.push(ConfigError::new("battery.max_e", "must be >= 0"));
        }
        if bat.max_e > 0.0 {
            if !(0.0..=bat.max_e).contains(&bat.initial_e) {
                errors.push(ConfigError::new("battery.initial_e", "must be in [0, battery.max_e]"));
            }
            if bat.low_e > bat.high_e {
                errors.push(ConfigError::new("battery.low_e", "must be <= battery.high_e"));
            }
            if bat.high_e > bat.max_e {
                errors.push(ConfigError::new("battery.high_e", "must be <= battery.max_e"));
            }
        }
        if !(bat.efficiency > 0.0 && bat.efficiency <= 1.0) {
            errors.push(ConfigError::new("battery.efficiency", "must be in (0.0, 1.0]"));
        }

        if !(self.station.cfg_set_k > 0.0 && self.station.cfg_set_k <= 1.0) {
            errors.push(ConfigError::new("station.cfg_set_k", "must be in (0.0, 1.0]"));
        }

        for (i, o) in self.outputs.iter().enumerate() {
            if o.period == 0 {
                errors.push(ConfigError::new(format!("output[{i}].period"), "must be > 0"));
            }
            if let Some(v) = o.variables.iter().find(|v| VariableSpec::parse(v).is_none()) {
                errors.push(ConfigError::new(
                    format!("output[{i}].variables"),
                    format!("bad variable \"{v}\""),
                ));
            }
        }

        errors
    }

    /// Run length and start time.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the start time cannot be parsed.
    pub fn sim_config(&self) -> Result<SimConfig, ConfigError> {
        let cfg = SimConfig::new(self.simulation.iterations);
        match &self.simulation.start_time {
            None => Ok(cfg),
            Some(text) => parse_date_time(text)
                .map(|t| cfg.with_start_time(t))
                .ok_or_else(|| {
                    ConfigError::new("simulation.start_time", format!("cannot parse \"{text}\""))
                }),
        }
    }

    pub fn generator_kinds(&self) -> Vec<GeneratorKind> {
        self.generators.iter().map(|g| g.kind).collect()
    }

    pub fn gen_configurations(&self) -> Vec<GenConfiguration> {
        self.configurations
            .iter()
            .map(|c| GenConfiguration::new(c.name.clone(), c.mask()))
            .collect()
    }

    /// Index of the black-start configuration, if one is named and exists.
    pub fn black_start_index(&self) -> Option<usize> {
        let name = self.generation.black_start.as_ref()?;
        self.configurations.iter().position(|c| &c.name == name)
    }

    /// Writes every parameter to its register; `[values]` goes last.
    pub fn apply(&self, bus: &mut SharedBus) {
        let g = &self.generation;
        bus.set_by_name("GenStartStopDelay", g.start_stop_delay);
        bus.set_by_name("GenMinRunT", g.min_run_t);
        bus.set_by_name("GenCfgHystP", g.cfg_hyst_p);
        bus.set_by_name("GenSwUpDelay", g.sw_up_delay);
        bus.set_by_name("GenSwDnDelay", g.sw_dn_delay);
        bus.set_by_name("GenInsignificantP", g.insignificant_p);
        bus.set_by_name("GenMinLoadPct", g.min_load_pct);

        for (i, gen_cfg) in self.generators.iter().take(MAX_GENERATORS).enumerate() {
            let unit = i + 1;
            let mut set = |suffix: &str, v: f64| bus.set_by_name(&format!("Gen{unit}{suffix}"), v);
            set("MaxP", gen_cfg.max_p);
            set("Avail", if gen_cfg.available { 1.0 } else { 0.0 });
            set("IdealPct", gen_cfg.ideal_pct);
            set("MinRunT", gen_cfg.min_run_t);
            set("ServiceT", gen_cfg.service_t);
            set("OutageT", gen_cfg.service_outages_h.iter().sum());
            set("OverloadPct", gen_cfg.overload_pct);
            set("OverloadT", gen_cfg.overload_t);
            set("UnderloadPct", gen_cfg.underload_pct);
            set("UnderloadT", gen_cfg.underload_t);
            for n in 0..FUEL_POINTS {
                let [lf, l] = gen_cfg.fuel_curve.get(n).copied().unwrap_or([0.0, 0.0]);
                set(&format!("FuelLf{}", n + 1), lf);
                set(&format!("FuelL{}", n + 1), l);
            }
        }

        let s = &self.station;
        bus.set_by_name("StatSpinSetP", s.spin_set_p);
        bus.set_by_name("StatSolarCovPct", s.solar_cov_pct);
        bus.set_by_name("StatMaintainSpin", if s.maintain_spin { 1.0 } else { 0.0 });
        bus.set_by_name("GenCfgSetK", s.cfg_set_k);

        let b = &self.battery;
        bus.set_by_name("BatMaxE", b.max_e);
        bus.set_by_name("BatE", b.initial_e);
        bus.set_by_name("BatMaxP", b.max_p);
        bus.set_by_name("BatEff", b.efficiency);
        bus.set_by_name("BatHighE", b.high_e);
        bus.set_by_name("BatLowE", b.low_e);
        bus.set_by_name("BatRechargeP", b.recharge_p);

        bus.set_by_name("LoadRawP", self.load.initial_p);
        bus.set_by_name("LoadPeakT", self.load.peak_t);
        bus.set_by_name("LoadCapMargin", self.load.cap_margin);

        bus.set_by_name("ShedLoadP", self.shed.load_p);
        bus.set_by_name("ShedLatency", self.shed.latency);
        bus.set_by_name("ShedMinOnT", self.shed.min_on_t);
        bus.set_by_name("DispLoadP", self.dispatch.load_p);
        bus.set_by_name("DispLatency", self.dispatch.latency);
        bus.set_by_name("DispMinOnT", self.dispatch.min_on_t);

        for (name, v) in &self.values {
            bus.set_by_name(name, *v);
        }
    }
}
