//! Command line surface.

use std::ffi::OsString;
use std::path::PathBuf;

use clap::{ArgAction, ArgMatches, CommandFactory, FromArgMatches, Parser};

use crate::config::{InputConfig, OutputConfig, StationConfig};
use crate::error::ConfigError;

/// Hybrid station control simulator
#[derive(Parser, Debug)]
#[command(name = "station-sim")]
#[command(version)]
#[command(about = "Second-by-second control simulator for hybrid diesel/solar/battery stations")]
pub struct CliOptions {
    /// Station configuration file (TOML)
    #[arg(short, long, value_name = "PATH", conflicts_with = "preset")]
    pub config: Option<PathBuf>,

    /// Built-in station preset (baseline, solar_hybrid)
    #[arg(short, long, value_name = "NAME")]
    pub preset: Option<String>,

    /// Number of one-second ticks to simulate
    #[arg(short = 'n', long, value_name = "N")]
    pub iterations: Option<u64>,

    /// Input time series, optionally followed by `recycle`
    #[arg(
        long = "input",
        value_names = ["FILE", "recycle"],
        num_args = 1..=2,
        action = ArgAction::Append
    )]
    pub inputs: Vec<String>,

    /// Output time series: file, optional period, then variable patterns
    #[arg(
        long = "output",
        value_names = ["FILE", "PERIOD", "VAR"],
        num_args = 1..,
        action = ArgAction::Append
    )]
    pub outputs: Vec<String>,

    /// Values of each `--input`, one entry per occurrence.
    #[arg(skip)]
    input_groups: Vec<Vec<String>>,

    /// Values of each `--output`, one entry per occurrence.
    #[arg(skip)]
    output_groups: Vec<Vec<String>>,

    /// Working directory for input and output files
    #[arg(short = 'C', long, value_name = "PATH")]
    pub directory: Option<PathBuf>,

    /// Wall-clock time of the first tick
    #[arg(long, value_name = "TIME")]
    pub starttime: Option<String>,

    /// Accepted for compatibility; the simulator never pauses
    #[arg(long)]
    pub nopause: bool,

    /// Print the run summary when the simulation ends
    #[arg(short, long)]
    pub summary: bool,

    /// Enable debug logging
    #[arg(short, long)]
    pub debug: bool,
}

/// Values of every occurrence of a multi-value option, grouped per occurrence.
fn occurrences(matches: &ArgMatches, id: &str) -> Vec<Vec<String>> {
    matches
        .get_occurrences::<String>(id)
        .map(|occ| occ.map(|values| values.cloned().collect()).collect())
        .unwrap_or_default()
}

impl CliOptions {
    /// Parses the command line, keeping the values of each `--input` and
    /// `--output` together.
    ///
    /// # Errors
    ///
    /// Returns the clap error for bad arguments, `--help` or `--version`.
    pub fn try_parse_args<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let matches = Self::command().try_get_matches_from(args)?;
        let mut opts = Self::from_arg_matches(&matches)?;
        opts.input_groups = occurrences(&matches, "inputs");
        opts.output_groups = occurrences(&matches, "outputs");
        Ok(opts)
    }

    /// Input files given on the command line.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the word after a file is not `recycle`.
    pub fn input_configs(&self) -> Result<Vec<InputConfig>, ConfigError> {
        self.input_groups
            .iter()
            .filter_map(|values| values.split_first())
            .map(|(path, rest)| match rest.first().map(String::as_str) {
                None => Ok(InputConfig::new(path, false)),
                Some("recycle") => Ok(InputConfig::new(path, true)),
                Some(other) => Err(ConfigError::new(
                    "--input",
                    format!("expected \"recycle\" after {path}, got \"{other}\""),
                )),
            })
            .collect()
    }

    /// Output files given on the command line. A number right after the
    /// file is the period; everything else is a variable pattern.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` for an output without variables.
    pub fn output_configs(&self) -> Result<Vec<OutputConfig>, ConfigError> {
        let mut outputs = Vec::with_capacity(self.output_groups.len());
        for values in &self.output_groups {
            let Some((path, mut rest)) = values.split_first() else {
                continue;
            };
            let mut period = 1;
            if let Some(p) = rest.first().and_then(|s| s.parse::<u64>().ok()) {
                period = p;
                rest = &rest[1..];
            }
            if rest.is_empty() {
                return Err(ConfigError::new(
                    "--output",
                    format!("no variables given for {path}"),
                ));
            }
            outputs.push(OutputConfig::new(path, period, rest.to_vec()));
        }
        Ok(outputs)
    }

    /// Loads the station and applies the command line on top of it.
    ///
    /// `--config` takes priority, then `--preset`, then the baseline preset.
    /// Inputs and outputs are appended to those of the station file.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` for an unreadable file, an unknown preset, or
    /// a malformed `--input`/`--output`.
    pub fn station_config(&self) -> Result<StationConfig, ConfigError> {
        let mut cfg = match (&self.config, &self.preset) {
            (Some(path), _) => StationConfig::from_toml_file(path)?,
            (None, Some(name)) => StationConfig::from_preset(name)?,
            (None, None) => StationConfig::baseline(),
        };
        if let Some(n) = self.iterations {
            cfg.simulation.iterations = n;
        }
        if let Some(t) = &self.starttime {
            cfg.simulation.start_time = Some(t.clone());
        }
        if let Some(dir) = &self.directory {
            cfg.simulation.directory = Some(dir.clone());
        }
        cfg.inputs.extend(self.input_configs()?);
        cfg.outputs.extend(self.output_configs()?);
        Ok(cfg)
    }
}
