use std::fmt;
use std::time::{Duration, Instant};

use good_lp::{constraint, variable, variables, Expression, ProblemVariables, ResolutionError, Solution, SolverModel, Variable};
use good_lp::solvers::{SolutionStatus, WithMipGap, WithTimeLimit};
use tracing::*;

use crate::model::{Constraint, LinExpr, Model, Sense, VarDomain};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SolveStatus {
    Optimal,
    FeasibleNonOptimal,
    TimeLimitReached,
    Infeasible,
    Unbounded,
    Error(String),
}

impl SolveStatus {
    /// Whether the backend returns a point satisfying every constraint.
    pub fn has_solution(&self) -> bool {
        matches!(self, SolveStatus::Optimal | SolveStatus::FeasibleNonOptimal | SolveStatus::TimeLimitReached)
    }

    pub fn is_error(&self) -> bool { matches!(self, SolveStatus::Error(_)) }

    pub fn as_str(&self) -> &'static str {
        match self {
            SolveStatus::Optimal => "OPTIMAL",
            SolveStatus::FeasibleNonOptimal => "FEASIBLE_NON_OPTIMAL",
            SolveStatus::TimeLimitReached => "TIME_LIMIT_REACHED",
            SolveStatus::Infeasible => "INFEASIBLE",
            SolveStatus::Unbounded => "UNBOUNDED",
            SolveStatus::Error(_) => "ERROR",
        }
    }
}

impl fmt::Display for SolveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolveStatus::Error(reason) => write!(f, "ERROR ({})", reason),
            s => f.write_str(s.as_str()),
        }
    }
}

/// Hints passed through to the backend.  Backends ignore what they cannot honour.
#[derive(Debug, Clone, PartialEq)]
pub struct SolverTuning {
    pub mip_rel_gap: f64,
    pub time_limit: Option<Duration>,
    pub threads: Option<usize>,
    /// Favour finding any feasible point over proving optimality.
    pub feasibility_first: bool,
}

impl Default for SolverTuning {
    fn default() -> Self {
        SolverTuning {
            mip_rel_gap: 1e-4,
            time_limit: None,
            threads: None,
            feasibility_first: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SolveOutcome {
    pub status: SolveStatus,
    /// One entry per model variable, present iff the status carries a solution.
    pub values: Option<Vec<f64>>,
    pub objective: Option<f64>,
    pub runtime: Duration,
}

impl SolveOutcome {
    pub fn without_solution(status: SolveStatus, runtime: Duration) -> Self {
        SolveOutcome { status, values: None, objective: None, runtime }
    }

    /// Attach a point, computing the objective from the model.
    pub fn with_solution(status: SolveStatus, model: &Model, values: Vec<f64>, runtime: Duration) -> Self {
        let objective = model.objective_value(&values);
        SolveOutcome { status, values: Some(values), objective: Some(objective), runtime }
    }
}

/// Anything that can solve a [`Model`].  Called exactly once per pipeline run.
pub trait MilpBackend {
    fn name(&self) -> &str;

    fn solve(&self, model: &Model, tuning: &SolverTuning) -> SolveOutcome;
}

/// Drives `good_lp`: the bundled `microlp` branch and bound, or HiGHS with the `highs` feature.
#[derive(Debug, Copy, Clone, Default)]
pub struct GoodLpBackend;

fn lp_expression(expr: &LinExpr, vars: &[Variable]) -> Expression {
    let mut e = Expression::from(expr.constant);
    for &(v, coef) in &expr.terms {
        e += coef * vars[v.index()];
    }
    e
}

fn lp_constraint(c: &Constraint, vars: &[Variable]) -> good_lp::Constraint {
    let lhs = lp_expression(&c.expr, vars);
    let rhs = c.rhs;
    match c.sense {
        Sense::Le => constraint!(lhs <= rhs),
        Sense::Eq => constraint!(lhs == rhs),
        Sense::Ge => constraint!(lhs >= rhs),
    }
}

fn classify(err: ResolutionError) -> SolveStatus {
    match err {
        ResolutionError::Infeasible => SolveStatus::Infeasible,
        ResolutionError::Unbounded => SolveStatus::Unbounded,
        other => SolveStatus::Error(other.to_string()),
    }
}

/// How far the search got when the backend handed back a point.
fn solution_status(status: SolutionStatus) -> SolveStatus {
    match status {
        SolutionStatus::Optimal => SolveStatus::Optimal,
        SolutionStatus::GapLimit => SolveStatus::FeasibleNonOptimal,
        SolutionStatus::TimeLimit => SolveStatus::TimeLimitReached,
    }
}

fn run<P>(mut problem: P, model: &Model, vars: &[Variable], started: Instant) -> SolveOutcome
    where
        P: SolverModel<Error=ResolutionError>
{
    for c in &model.constraints {
        problem.add_constraint(lp_constraint(c, vars));
    }
    trace!("constraints loaded");

    match problem.solve() {
        Ok(solution) => {
            let status = solution_status(solution.status());
            let values = vars.iter().map(|&v| solution.value(v)).collect();
            SolveOutcome::with_solution(status, model, values, started.elapsed())
        }
        Err(e) => {
            let status = classify(e);
            debug!(%status, "no solution");
            SolveOutcome::without_solution(status, started.elapsed())
        }
    }
}

/// Hand the gap and the wall-clock limit, less what model loading already used, to the backend.
fn with_limits<P: WithMipGap + WithTimeLimit>(lp: P, tuning: &SolverTuning, started: Instant) -> Result<P, String> {
    let mut lp = lp.with_mip_gap(tuning.mip_rel_gap as f32).map_err(|e| e.to_string())?;
    if let Some(limit) = tuning.time_limit {
        lp = lp.with_time_limit(limit.saturating_sub(started.elapsed()).as_secs_f64());
    }
    Ok(lp)
}

#[cfg(feature = "highs")]
fn solve_with(problem: ProblemVariables, objective: Expression, model: &Model, vars: &[Variable], started: Instant, tuning: &SolverTuning) -> SolveOutcome {
    let mut lp = match with_limits(problem.minimise(objective).using(good_lp::highs), tuning, started) {
        Ok(lp) => lp,
        Err(reason) => return SolveOutcome::without_solution(SolveStatus::Error(reason), started.elapsed()),
    };
    if let Some(threads) = tuning.threads {
        lp = lp.set_option("threads", threads as i32);
    }
    if tuning.feasibility_first {
        lp = lp.set_option("mip_heuristic_effort", 0.3);
    }
    run(lp, model, vars, started)
}

#[cfg(not(feature = "highs"))]
fn solve_with(problem: ProblemVariables, objective: Expression, model: &Model, vars: &[Variable], started: Instant, tuning: &SolverTuning) -> SolveOutcome {
    if tuning.threads.is_some() || tuning.feasibility_first {
        warn!(threads=?tuning.threads, feasibility_first=tuning.feasibility_first, "microlp is single-threaded and has no search emphasis");
    }
    match with_limits(problem.minimise(objective).using(good_lp::microlp), tuning, started) {
        Ok(lp) => run(lp, model, vars, started),
        Err(reason) => SolveOutcome::without_solution(SolveStatus::Error(reason), started.elapsed()),
    }
}

impl MilpBackend for GoodLpBackend {
    fn name(&self) -> &str {
        if cfg!(feature = "highs") { "highs" } else { "microlp" }
    }

    #[instrument(level="info", skip_all, fields(backend=self.name(), vars=model.num_vars(), rows=model.num_constraints()))]
    fn solve(&self, model: &Model, tuning: &SolverTuning) -> SolveOutcome {
        let started = Instant::now();
        let mut problem = variables!();
        let vars: Vec<Variable> = model.vars.iter()
            .map(|v| match v.domain {
                VarDomain::Binary => problem.add(variable().binary()),
                VarDomain::Continuous { lb, ub } => problem.add(variable().min(lb).max(ub)),
            })
            .collect();
        let objective = lp_expression(&model.objective, &vars);
        solve_with(problem, objective, model, &vars, started, tuning)
    }
}
