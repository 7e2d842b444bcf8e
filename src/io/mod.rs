//! CSV time-series input and output actors.

pub mod reader;
pub mod writer;

pub use reader::TimeSeriesReader;
pub use writer::{OutputSpec, TimeSeriesWriter};
