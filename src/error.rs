//! Error taxonomy for the simulator.
//!
//! Every failure is fatal to the run. Parse errors carry the file and line,
//! configuration errors the dotted field path, and anything escaping an
//! actor during the loop is wrapped with the tick it happened on.

use std::io;
use std::path::PathBuf;

/// Configuration error with field path and constraint description.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("config error: {field}: {message}")]
pub struct ConfigError {
    /// Dotted field path (e.g., `"generator[1].max_p"`).
    pub field: String,
    /// Human-readable constraint description.
    pub message: String,
}

impl ConfigError {
    /// Builds a configuration error for `field`.
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Top-level error type for the simulation kernel.
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    /// Malformed time-series content.
    #[error("{}:{line}: {message}", file.display())]
    Parse {
        file: PathBuf,
        line: u64,
        message: String,
    },

    /// Invalid or insufficient configuration, raised at first use.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// `get_existing` was asked for a name the bus has never seen.
    #[error("register \"{0}\" does not exist")]
    UnknownRegister(String),

    /// An error escaped an actor while the loop was running.
    #[error("simulation failed at tick {tick}: {source}")]
    Tick {
        tick: u64,
        #[source]
        source: Box<SimError>,
    },

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

impl SimError {
    /// Builds a parse error for `file` at `line`.
    pub fn parse(file: impl Into<PathBuf>, line: u64, message: impl Into<String>) -> Self {
        Self::Parse {
            file: file.into(),
            line,
            message: message.into(),
        }
    }

    /// Wraps this error with the tick index it occurred on.
    ///
    /// Errors that already carry a tick are returned unchanged.
    pub fn at_tick(self, tick: u64) -> Self {
        match self {
            Self::Tick { .. } => self,
            other => Self::Tick {
                tick,
                source: Box::new(other),
            },
        }
    }
}

/// Convenience alias for `Result<T, SimError>`.
pub type SimResult<T> = Result<T, SimError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_names_file_and_line() {
        let e = SimError::parse("load.csv", 12, "bad number \"x\"");
        assert_eq!(e.to_string(), "load.csv:12: bad number \"x\"");
    }

    #[test]
    fn tick_wrapping_is_not_nested() {
        let e = SimError::UnknownRegister("Foo".into()).at_tick(7).at_tick(9);
        match e {
            SimError::Tick { tick, .. } => assert_eq!(tick, 7),
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn config_error_display() {
        let e = ConfigError::new("generator[2].fuel_curve", "needs at least 2 points");
        assert_eq!(
            e.to_string(),
            "config error: generator[2].fuel_curve: needs at least 2 points"
        );
    }
}
