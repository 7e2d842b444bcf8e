/// Shared register bus.
pub mod bus;
/// Simulation clock for tick management.
pub mod clock;
pub mod engine;
pub mod kpi;
/// Delayed-action scheduling.
pub mod schedule;
pub mod types;
