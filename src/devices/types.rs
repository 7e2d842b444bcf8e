//! Common trait for the components driven by the simulation loop.

use crate::error::SimResult;
use crate::sim::bus::SharedBus;

/// A component stepped once per tick by the simulation loop.
///
/// Actors communicate only through the [`SharedBus`]: they bind their
/// registers in [`Actor::init`], read and write them in [`Actor::run`],
/// and flush any outstanding state in [`Actor::finish`].
pub trait Actor {
    /// Short human-readable name used in logs.
    fn name(&self) -> &str;

    /// Binds registers and reads initial parameters.
    ///
    /// # Errors
    ///
    /// Returns an error if the actor cannot be set up (missing file,
    /// malformed configuration).
    fn init(&mut self, bus: &mut SharedBus) -> SimResult<()>;

    /// Advances the actor by one tick.
    ///
    /// # Arguments
    ///
    /// * `bus` - The shared register bus
    /// * `tick` - Current tick (seconds since the start of the run)
    ///
    /// # Errors
    ///
    /// Any error aborts the run; the loop attaches the tick number.
    fn run(&mut self, bus: &mut SharedBus, tick: u64) -> SimResult<()>;

    /// Called once after the last tick.
    fn finish(&mut self, _bus: &mut SharedBus) -> SimResult<()> {
        Ok(())
    }
}
