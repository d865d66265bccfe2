pub mod barrier;
pub mod checkpoint;
pub mod comm;
pub mod config;
pub mod error;
pub mod generation;
pub mod grid;
pub mod implementations;
pub mod partition;

pub use config::{SimConfig, Variant};
pub use error::{BarrierError, CommError, ConfigError, SimError};
pub use implementations::{run, SimOutcome};
