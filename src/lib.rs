//! Second-by-second control simulator for hybrid diesel/solar/battery
//! power stations.

pub mod cli;
pub mod config;
pub mod devices;
pub mod error;
pub mod io;
/// Register bus, scheduler, engine, and run summary.
pub mod sim;
