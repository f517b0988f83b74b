//! Extraction of the refractive index, extinction coefficient and absorption coefficient of a
//! sample from a THz time-domain reference/sample measurement.
//!
//! The pipeline runs [`signal::SignalConditioner`] → [`transfer_function`] → [`extraction`], with
//! [`data_thread::main_thread`] driving it from a command channel.

pub mod config;
pub mod data_container;
pub mod data_thread;
pub mod error;
pub mod extraction;
pub mod io;
pub mod math_tools;
pub mod optimize;
pub mod signal;
pub mod transfer_function;

pub use error::{ExtractionError, ExtractionResult};
