use std::path::Path;
use fnv::{FnvHashMap, FnvHashSet};
use tracing::*;

pub mod data;
pub mod decode;
pub mod model;
pub mod output;
pub mod solver;
pub mod summary;
pub mod verify;
pub mod window;
mod error;

pub use error::Error;
pub use decode::{Boarding, Departure, Schedule};
pub use model::{ModelOptions, Model};
pub use solver::{GoodLpBackend, MilpBackend, SolveOutcome, SolveStatus, SolverTuning};

pub type Map<K, V> = FnvHashMap<K, V>;
pub type Set<T> = FnvHashSet<T>;

/// Build the model for `instance`, hand it to `backend` once and decode the answer.
///
/// Configuration problems and empty boarding windows are reported before the backend is
/// touched.  Infeasible, unbounded, time-limited and failed solves are *not* errors: they come
/// back as a [`Schedule`] whose status says what happened.  Decoder invariant violations are
/// errors and no schedule is produced.
#[instrument(level="info", skip_all, fields(instance=%instance.id, backend=backend.name()))]
pub fn solve_instance<B: MilpBackend + ?Sized>(
    instance: &data::ShuttleInstance,
    options: &ModelOptions,
    tuning: &SolverTuning,
    backend: &B,
) -> Result<Schedule, Error> {
    let windows = window::compute_windows(instance)?;
    let model = model::build(instance, &windows, options)?;
    let outcome = backend.solve(&model, tuning);
    info!(status=%outcome.status, objective=?outcome.objective, runtime=?outcome.runtime, "solve finished");
    let schedule = decode::decode(instance, &model, &outcome)?;
    Ok(schedule)
}

mod logging_setup {
    use super::*;
    use tracing_subscriber::{EnvFilter, fmt, registry, prelude::*};
    use tracing_appender::{non_blocking, non_blocking::WorkerGuard};
    use std::fs::OpenOptions;

    fn build_and_set_global_subscriber<P>(logfile: Option<P>, is_test : bool) -> anyhow::Result<Option<WorkerGuard>> where
        P : AsRef<Path>
    {
        let stderr_log = fmt::layer().with_writer(std::io::stderr);
        let env_filter = EnvFilter::from_default_env();
        let r = registry().with(stderr_log).with(env_filter);

        let flush_guard = match logfile {
            Some(p) => {
                let logfile = OpenOptions::new()
                    .create(true)
                    .write(true)
                    .truncate(true)
                    .open(p)?;
                let (writer, _guard) = non_blocking::NonBlockingBuilder::default()
                    .lossy(false)
                    .finish(logfile);
                let json = fmt::layer()
                    .json()
                    .with_span_list(true)
                    .with_current_span(false)
                    .with_writer(writer);

                let r = r.with(json);
                if is_test { r.try_init().ok(); }
                else { r.try_init()?; }
                Some(_guard)
            },
            None => {
                if is_test { r.try_init().ok(); }
                else { r.try_init()?; }
                None
            }
        };
        return Ok(flush_guard)
    }

    /// Install the global subscriber: human-readable events on stderr, filtered by `RUST_LOG`,
    /// plus newline-delimited JSON in `logfile` if one is given.  Keep the guard alive until exit.
    pub fn init_logging(logfile: Option<impl AsRef<Path>>) -> anyhow::Result<Option<WorkerGuard>> {
        return build_and_set_global_subscriber(logfile, false);
    }

    #[allow(dead_code)]
    pub(crate) fn init_test_logging(logfile: Option<impl AsRef<Path>>) -> Option<WorkerGuard> {
        return build_and_set_global_subscriber(logfile, true).ok().flatten();
    }
}
pub use logging_setup::*;
