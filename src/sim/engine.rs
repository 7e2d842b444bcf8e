//! Simulation loop that runs every actor once per tick in a fixed order.

use std::cell::Cell;
use std::rc::Rc;

use tracing::info;

use crate::config::StationConfig;
use crate::devices::controlled_load::{DispatchableLoadController, SheddableLoadController};
use crate::devices::generation::GenerationManager;
use crate::devices::load::Load;
use crate::devices::solar::{Solar, SolarSetpoint};
use crate::devices::station::StationController;
use crate::devices::types::Actor;
use crate::error::SimResult;
use crate::io::reader::{StartTime, TimeSeriesReader};
use crate::io::writer::TimeSeriesWriter;

use super::bus::SharedBus;
use super::clock::Clock;
use super::kpi::RunSummary;
use super::types::SimConfig;

/// Simulation engine owning the bus and every actor.
///
/// Holds typed actor fields rather than one list of trait objects since
/// the actor set and its order are fixed: readers, load, station, shed,
/// dispatch, generation, solar, writers.
pub struct Engine {
    config: SimConfig,
    bus: SharedBus,
    readers: Vec<TimeSeriesReader>,
    load: Load,
    station: StationController,
    shed: SheddableLoadController,
    dispatch: DispatchableLoadController,
    generation: GenerationManager,
    solar: Solar,
    writers: Vec<TimeSeriesWriter>,
}

impl Engine {
    /// Builds a station from its configuration.
    ///
    /// Actors bind their registers first; the configuration values are then
    /// written over them. Nothing is opened until [`Engine::init`].
    ///
    /// # Errors
    ///
    /// Returns a config error if the start time cannot be parsed.
    pub fn from_config(cfg: &StationConfig) -> SimResult<Self> {
        let config = cfg.sim_config()?;
        let mut bus = SharedBus::new();
        let start: StartTime = Rc::new(Cell::new(config.start_time));

        let readers = cfg
            .inputs
            .iter()
            .map(|i| TimeSeriesReader::new(&i.path, i.recycle, Rc::clone(&start)))
            .collect();
        let load = Load::new(&mut bus);
        let station = StationController::new(&mut bus);
        let shed = SheddableLoadController::new(&mut bus);
        let dispatch = DispatchableLoadController::new(&mut bus);
        let generation = GenerationManager::new(
            &mut bus,
            &cfg.generator_kinds(),
            cfg.gen_configurations(),
            cfg.black_start_index(),
        );
        let solar = Solar::new(&mut bus);
        let writers = cfg
            .outputs
            .iter()
            .map(|o| TimeSeriesWriter::new(o.to_spec()))
            .collect();

        cfg.apply(&mut bus);

        Ok(Self {
            config,
            bus,
            readers,
            load,
            station,
            shed,
            dispatch,
            generation,
            solar,
            writers,
        })
    }

    /// Replaces the built-in solar setpoint.
    pub fn with_solar_setpoint(mut self, algorithm: Box<dyn SolarSetpoint>) -> Self {
        self.solar.set_algorithm(algorithm);
        self
    }

    fn for_each_actor(
        &mut self,
        mut f: impl FnMut(&mut dyn Actor, &mut SharedBus) -> SimResult<()>,
    ) -> SimResult<()> {
        let bus = &mut self.bus;
        for r in self.readers.iter_mut() {
            f(r, bus)?;
        }
        f(&mut self.load, bus)?;
        f(&mut self.station, bus)?;
        f(&mut self.shed, bus)?;
        f(&mut self.dispatch, bus)?;
        f(&mut self.generation, bus)?;
        f(&mut self.solar, bus)?;
        for w in self.writers.iter_mut() {
            f(w, bus)?;
        }
        Ok(())
    }

    /// Initialises every actor; writers go last so their glob patterns see
    /// every register.
    ///
    /// # Errors
    ///
    /// Returns the first actor error (missing `t` header, unreadable file,
    /// bad output variable).
    pub fn init(&mut self) -> SimResult<()> {
        self.for_each_actor(|a, bus| a.init(bus))?;
        info!(
            iterations = self.config.iterations,
            registers = self.bus.len(),
            inputs = self.readers.len(),
            outputs = self.writers.len(),
            "simulation initialised"
        );
        Ok(())
    }

    /// Runs one tick.
    ///
    /// # Errors
    ///
    /// Any actor error, wrapped with the tick index.
    pub fn step(&mut self, tick: u64) -> SimResult<()> {
        self.for_each_actor(|a, bus| a.run(bus, tick))
            .map_err(|e| e.at_tick(tick))
    }

    /// Finishes every actor, flushing the output files.
    ///
    /// # Errors
    ///
    /// Any actor error, wrapped with the final tick count.
    pub fn finish(&mut self) -> SimResult<()> {
        let tick = self.config.iterations;
        self.for_each_actor(|a, bus| a.finish(bus))
            .map_err(|e| e.at_tick(tick))
    }

    /// Runs init, every tick, and finish.
    ///
    /// # Errors
    ///
    /// The first error; the run is not resumed.
    pub fn run(&mut self) -> SimResult<RunSummary> {
        self.init()?;
        let mut clock = Clock::new(self.config.iterations);
        clock.run(|tick| self.step(tick))?;
        self.finish()?;
        let summary = self.summary();
        info!(
            ticks = summary.ticks,
            gen_kwh = summary.gen_kwh,
            fuel_l = summary.fuel_l,
            "simulation finished"
        );
        Ok(summary)
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary::from_bus(
            &self.bus,
            self.generation.generators().len(),
            self.config.iterations,
        )
    }

    pub fn bus(&self) -> &SharedBus {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut SharedBus {
        &mut self.bus
    }

    /// Returns a reference to the simulation configuration.
    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn generation(&self) -> &GenerationManager {
        &self.generation
    }

    pub fn station(&self) -> &StationController {
        &self.station
    }
}
