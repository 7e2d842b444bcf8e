//! Station simulator entry point: CLI wiring, logging, and exit codes.

use std::process::ExitCode;

use tracing::{Level, error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use station_sim::cli::CliOptions;
use station_sim::error::{ConfigError, SimError, SimResult};
use station_sim::sim::engine::Engine;

fn init_logging(debug: bool) {
    let level = if debug { Level::DEBUG } else { Level::INFO };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_file(debug)
        .with_line_number(debug)
        .with_writer(std::io::stderr)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("warning: logging not initialised: {e}");
    }
}

fn run(cli: &CliOptions) -> SimResult<()> {
    let cfg = cli.station_config()?;

    let errors = cfg.validate();
    if let Some(first) = errors.first() {
        for e in &errors[1..] {
            error!("{e}");
        }
        return Err(SimError::Config(first.clone()));
    }

    if let Some(dir) = &cfg.simulation.directory {
        std::env::set_current_dir(dir).map_err(|e| {
            ConfigError::new(
                "directory",
                format!("cannot change to \"{}\": {e}", dir.display()),
            )
        })?;
        info!(directory = %dir.display(), "working directory set");
    }

    let mut engine = Engine::from_config(&cfg)?;
    let summary = engine.run()?;
    if cli.summary {
        println!("{summary}");
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = match CliOptions::try_parse_args(std::env::args_os()) {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };
    init_logging(cli.debug);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
