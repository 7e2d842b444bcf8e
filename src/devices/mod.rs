//! Station actors: generators, battery, loads, and solar.

/// Battery storage controller.
pub mod battery;
/// Sheddable and dispatchable loads.
pub mod controlled_load;
pub mod generation;
/// Generator unit state machine.
pub mod generator;
pub mod load;
/// Solar inverter model.
pub mod solar;
pub mod station;
pub mod types;

// Re-export the main types for convenience
pub use battery::BatteryController;
pub use controlled_load::{DispatchableLoadController, SheddableLoadController};
pub use generation::{GenConfiguration, GenerationManager};
pub use generator::{Generator, GeneratorKind};
pub use load::Load;
pub use solar::{Solar, SolarSetpoint};
pub use station::StationController;
pub use types::Actor;
