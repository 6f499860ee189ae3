use anyhow::Result;
use std::path::Path;

pub use shuttle_instances::{
    BusId,
    ConfigError,
    IdRange,
    InitialPlacement,
    Passenger,
    PassengerId,
    ShuttleInstance,
    Terminal,
    Time,
};

/// Read a configuration file from disk and normalise it.
pub fn load_instance(path: impl AsRef<Path>) -> Result<ShuttleInstance> {
    shuttle_instances::load_instance(path)
}
