use shuttle_instances::ConfigError;
use crate::data::{PassengerId, Terminal, Time};
use crate::decode::DecodeError;

/// Failures that stop the pipeline without producing a schedule.
///
/// Backend outcomes (infeasible, unbounded, time limit, backend failure) are not listed here,
/// they travel as a [`SolveStatus`](crate::SolveStatus) on the schedule instead.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("{terminal} passenger {passenger} arrives at {arrival}, after the last feasible departure {last_departure}")]
    InfeasibleWindow {
        terminal: Terminal,
        passenger: PassengerId,
        arrival: Time,
        last_departure: Time,
    },
    #[error("failed to decode solution: {0}")]
    Decode(#[from] DecodeError),
}
