use std::path::PathBuf;
use std::time::Duration;
use anyhow::{bail, Context, Result};
use tracing::*;

use shuttle_sched::*;
use shuttle_sched::data::load_instance;
use shuttle_sched::model::{
    AssignmentStrategy, HeadwayMode, LinkingStrategy, WaitPenalty,
    ASSIGNMENT_STRINGS, HEADWAY_STRINGS, LINKING_STRINGS, PENALTY_STRINGS,
};
use shuttle_sched::verify::check_schedule;

mod common;
use common::*;

use structopt::StructOpt;

/// Assign airport passengers to shuttle departures between CEI and T2.
#[derive(Debug, StructOpt)]
struct ClArgs {
    #[structopt(parse(from_os_str), default_value="config.json")]
    config: PathBuf,
    #[structopt(parse(from_os_str), default_value="result.json")]
    output: PathBuf,
    #[structopt(long, parse(try_from_str), possible_values=&PENALTY_STRINGS, default_value="linear")]
    penalty: WaitPenalty,
    #[structopt(long, parse(try_from_str), possible_values=&HEADWAY_STRINGS, default_value="pooled")]
    headway: HeadwayMode,
    /// Minimum separation between departures from one terminal, in slots.
    #[structopt(long, default_value="3", validator=clap_range_validator(Some(1), None))]
    min_headway: i64,
    #[structopt(long, parse(try_from_str), possible_values=&ASSIGNMENT_STRINGS, default_value="pooled")]
    assignment: AssignmentStrategy,
    #[structopt(long, parse(try_from_str), possible_values=&LINKING_STRINGS, default_value="window")]
    linking: LinkingStrategy,
    /// Relative MIP gap at which the search stops.
    #[structopt(long, default_value="0.0001", validator=clap_range_validator(Some(0.0), Some(1.0)))]
    gap: f64,
    /// Wall-clock limit in seconds.
    #[structopt(long, validator=clap_range_validator(Some(0.0), None))]
    time_limit: Option<f64>,
    #[structopt(long, short="c", validator=clap_range_validator(Some(1), None))]
    threads: Option<usize>,
    #[structopt(long)]
    feasibility_first: bool,
    /// Start this many buses at CEI and the rest at T2, overriding the config.
    #[structopt(long, validator=clap_range_validator(Some(0), None))]
    initial_at_cei: Option<i64>,
    /// Re-validate the schedule and fail if it breaks any rule.
    #[structopt(long)]
    check: bool,
    #[structopt(flatten)]
    output_opts: OutputOptions,
}

impl ClArgs {
    fn model_options(&self) -> ModelOptions {
        ModelOptions {
            assignment: self.assignment,
            linking: self.linking,
            penalty: self.penalty,
            headway: self.headway,
            min_headway: self.min_headway,
        }
    }

    fn tuning(&self) -> SolverTuning {
        SolverTuning {
            mip_rel_gap: self.gap,
            time_limit: self.time_limit.map(Duration::from_secs_f64),
            threads: self.threads,
            feasibility_first: self.feasibility_first,
        }
    }
}

fn main() -> Result<()> {
    let args: ClArgs = StructOpt::from_args();
    let _g = init_logging(args.output_opts.log.as_ref())?;
    debug!(?args);

    let mut instance = load_instance(&args.config)?;
    if let Some(count) = args.initial_at_cei {
        instance.start_at_cei(count)?;
    }
    info!(
        instance=%instance.id,
        buses=instance.buses.len(),
        passengers=instance.passengers.len(),
        horizon=?instance.horizon(),
        "loaded instance"
    );

    let options = args.model_options();
    let schedule = solve_instance(&instance, &options, &args.tuning(), &GoodLpBackend)
        .with_context(|| format!("failed to schedule {:?}", &args.config))?;

    output_report(&args.output_opts, &args.output, Report { instance: &instance, schedule: &schedule })
        .with_context(|| format!("failed to write {:?}", &args.output))?;

    if let SolveStatus::Error(reason) = &schedule.status {
        bail!("backend failed: {}", reason);
    }

    if args.check {
        let violations = check_schedule(&instance, &schedule, &options);
        for v in &violations {
            error!(%v, "schedule check");
        }
        if !violations.is_empty() {
            bail!("schedule breaks {} rules", violations.len());
        }
        info!("schedule check passed");
    }
    Ok(())
}
