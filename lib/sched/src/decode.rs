use std::time::Duration;

use itertools::Itertools;
use tracing::*;

use crate::data::{BusId, PassengerId, ShuttleInstance, Terminal, Time};
use crate::model::{AssignmentStrategy, Model, WaitPenalty};
use crate::solver::{SolveOutcome, SolveStatus};
use crate::Map;

/// Indicators at or above this value count as set.
pub const SET_THRESHOLD: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("expected {expected} variable values, backend returned {found}")]
    MissingValues { expected: usize, found: usize },
    #[error("{terminal} passenger {passenger} has {count} board times")]
    AssignmentCount { terminal: Terminal, passenger: PassengerId, count: usize },
    #[error("{terminal} passenger {passenger} boards at {t} before arriving at {arrival}")]
    NegativeWait { terminal: Terminal, passenger: PassengerId, t: Time, arrival: Time },
    #[error("{boarded} passengers board at {terminal} at {t} but only {seats} seats depart")]
    CapacityOverrun { terminal: Terminal, t: Time, boarded: usize, seats: usize },
    #[error("{terminal} passenger {passenger} boards bus {bus} at {t}, which does not depart")]
    NotDeparting { terminal: Terminal, passenger: PassengerId, bus: BusId, t: Time },
    #[error("{terminal} passenger {passenger} boards at {t} without a bus")]
    MissingBus { terminal: Terminal, passenger: PassengerId, t: Time },
    #[error("bus {0} is at neither terminal at the start of the day")]
    NoStartingTerminal(BusId),
}

/// Field order gives the output order: slot, then terminal, then bus.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct Departure {
    pub t: Time,
    pub terminal: Terminal,
    pub bus: BusId,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct Boarding {
    pub t: Time,
    pub terminal: Terminal,
    pub bus: BusId,
    pub passenger: PassengerId,
    pub wait: Time,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Schedule {
    pub status: SolveStatus,
    pub objective: Option<f64>,
    pub runtime: Duration,
    /// Ascending bus id.
    pub initial_positions: Vec<(BusId, Terminal)>,
    pub departures: Vec<Departure>,
    pub assignments: Vec<Boarding>,
}

impl Schedule {
    pub fn status_only(status: SolveStatus, runtime: Duration) -> Self {
        Schedule {
            status,
            objective: None,
            runtime,
            initial_positions: Vec::new(),
            departures: Vec::new(),
            assignments: Vec::new(),
        }
    }

    pub fn objective_from_waits(&self, penalty: WaitPenalty) -> f64 {
        self.assignments.iter().map(|b| penalty.cost(b.wait)).sum()
    }
}

#[inline]
fn is_set(values: &[f64], var: crate::model::VarId) -> bool {
    values[var.index()] >= SET_THRESHOLD
}

struct BoardTime {
    terminal: Terminal,
    passenger: PassengerId,
    arrival: Time,
    t: Time,
    bus: Option<BusId>,
}

/// Turn a backend outcome into a schedule.  Pure: the same outcome always gives the same
/// schedule, and no invariant violation is repaired silently.
#[instrument(level="debug", skip_all, fields(status=%outcome.status))]
pub fn decode(instance: &ShuttleInstance, model: &Model, outcome: &SolveOutcome) -> Result<Schedule, DecodeError> {
    let values = match (&outcome.values, outcome.status.has_solution()) {
        (Some(values), true) => values,
        _ => return Ok(Schedule::status_only(outcome.status.clone(), outcome.runtime)),
    };
    if values.len() != model.num_vars() {
        return Err(DecodeError::MissingValues { expected: model.num_vars(), found: values.len() });
    }

    let departures = model.depart_vars()
        .filter(|&(_, var)| is_set(values, var))
        .map(|((terminal, t, bus), _)| Departure { t, terminal, bus })
        .sorted()
        .collect_vec();
    // buses ascending within each (terminal, slot)
    let mut departing: Map<(Terminal, Time), Vec<BusId>> = Map::default();
    for d in &departures {
        departing.entry((d.terminal, d.t)).or_default().push(d.bus);
    }
    trace!(departures=departures.len());

    let mut board_times = Vec::with_capacity(model.windows.len());
    for pw in &model.windows {
        let p = pw.passenger;
        let chosen = model.assign_vars(p.terminal, p.id).iter()
            .filter(|a| is_set(values, a.var))
            .collect_vec();
        if chosen.len() != 1 {
            return Err(DecodeError::AssignmentCount { terminal: p.terminal, passenger: p.id, count: chosen.len() });
        }
        let a = chosen[0];
        if a.t < p.arrival {
            return Err(DecodeError::NegativeWait { terminal: p.terminal, passenger: p.id, t: a.t, arrival: p.arrival });
        }
        board_times.push(BoardTime { terminal: p.terminal, passenger: p.id, arrival: p.arrival, t: a.t, bus: a.bus });
    }

    let capacity = instance.capacity as usize;
    let mut assignments = Vec::with_capacity(board_times.len());
    match model.options.assignment {
        AssignmentStrategy::Pooled => {
            let groups = board_times.iter()
                .map(|b| ((b.terminal, b.t), b))
                .into_group_map();
            for ((terminal, t), mut group) in groups.into_iter().sorted_by_key(|(k, _)| *k) {
                group.sort_by_key(|b| b.passenger);
                let buses = departing.get(&(terminal, t)).map(|v| v.as_slice()).unwrap_or(&[]);
                if group.len() > buses.len() * capacity {
                    return Err(DecodeError::CapacityOverrun { terminal, t, boarded: group.len(), seats: buses.len() * capacity });
                }
                for (load, &bus) in group.chunks(capacity).zip(buses) {
                    assignments.extend(load.iter().map(|b| Boarding {
                        t, terminal, bus, passenger: b.passenger, wait: b.t - b.arrival,
                    }));
                }
            }
        }
        AssignmentStrategy::PerBus => {
            let mut load: Map<(Terminal, Time, BusId), usize> = Map::default();
            for b in &board_times {
                let bus = b.bus
                    .ok_or(DecodeError::MissingBus { terminal: b.terminal, passenger: b.passenger, t: b.t })?;
                let departs = departing.get(&(b.terminal, b.t)).map_or(false, |v| v.contains(&bus));
                if !departs {
                    return Err(DecodeError::NotDeparting { terminal: b.terminal, passenger: b.passenger, bus, t: b.t });
                }
                let n = load.entry((b.terminal, b.t, bus)).or_default();
                *n += 1;
                if *n > capacity {
                    return Err(DecodeError::CapacityOverrun { terminal: b.terminal, t: b.t, boarded: *n, seats: capacity });
                }
                assignments.push(Boarding { t: b.t, terminal: b.terminal, bus, passenger: b.passenger, wait: b.t - b.arrival });
            }
        }
    }
    assignments.sort();

    let mut initial_positions = Vec::with_capacity(instance.buses.len());
    for &bus in &instance.buses {
        let terminal = Terminal::ALL.into_iter()
            .find(|&term| model.avail_var(term, instance.t_start, bus).map_or(false, |v| is_set(values, v)))
            .ok_or(DecodeError::NoStartingTerminal(bus))?;
        initial_positions.push((bus, terminal));
    }

    debug!(departures=departures.len(), assignments=assignments.len(), "decoded schedule");
    Ok(Schedule {
        status: outcome.status.clone(),
        objective: outcome.objective,
        runtime: outcome.runtime,
        initial_positions,
        departures,
        assignments,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{build, ModelOptions, VarId};
    use crate::test_support::scenario;
    use crate::window::compute_windows;

    fn model_for(instance: &ShuttleInstance, options: ModelOptions) -> Model {
        build(instance, &compute_windows(instance).unwrap(), &options).unwrap()
    }

    fn outcome(model: &Model, set: &[VarId]) -> SolveOutcome {
        let mut values = vec![0.0; model.num_vars()];
        for v in set {
            values[v.index()] = 1.0;
        }
        SolveOutcome::with_solution(SolveStatus::Optimal, model, values, Duration::from_millis(5))
    }

    fn x(model: &Model, terminal: Terminal, p: PassengerId, t: Time) -> VarId {
        model.assign_vars(terminal, p).iter().find(|a| a.t == t).unwrap().var
    }

    /// Two buses leave CEI together at slot 1 with three passengers on board.
    fn shared_departure() -> (ShuttleInstance, Model, Vec<VarId>) {
        let text = r#"{"T": "0:10", "B": 2, "tau": 2, "c_max": 2, "w_max": 5,
                       "arrivals": {"CEI": {"3": 1, "1": 0, "2": 1}}}"#;
        let inst = ShuttleInstance::from_json_str(text, "shared").unwrap();
        let model = model_for(&inst, ModelOptions::default());
        let mut set = vec![
            model.avail_var(Terminal::Cei, 0, 1).unwrap(),
            model.avail_var(Terminal::Cei, 0, 2).unwrap(),
            model.depart_var(Terminal::Cei, 1, 2).unwrap(),
            model.depart_var(Terminal::Cei, 1, 1).unwrap(),
        ];
        set.extend([1, 2, 3].map(|p| x(&model, Terminal::Cei, p, 1)));
        (inst, model, set)
    }

    #[test]
    fn pooled_loading_fills_lowest_bus_first() {
        let (inst, model, set) = shared_departure();
        let schedule = decode(&inst, &model, &outcome(&model, &set)).unwrap();
        assert_eq!(schedule.departures, vec![
            Departure { t: 1, terminal: Terminal::Cei, bus: 1 },
            Departure { t: 1, terminal: Terminal::Cei, bus: 2 },
        ]);
        let loads = schedule.assignments.iter().map(|b| (b.passenger, b.bus, b.wait)).collect_vec();
        assert_eq!(loads, vec![(1, 1, 1), (2, 1, 0), (3, 2, 0)]);
        assert_eq!(schedule.initial_positions, vec![(1, Terminal::Cei), (2, Terminal::Cei)]);
        assert_eq!(schedule.objective, Some(1.0));
    }

    #[test]
    fn threshold() {
        assert!(is_set(&[0.5], VarId(0)) && is_set(&[0.9999], VarId(0)));
        assert!(!is_set(&[0.4999], VarId(0)) && !is_set(&[1e-9], VarId(0)));
    }

    #[test]
    fn decoding_is_idempotent() {
        let (inst, model, set) = shared_departure();
        let out = outcome(&model, &set);
        assert_eq!(decode(&inst, &model, &out).unwrap(), decode(&inst, &model, &out).unwrap());
    }

    #[test]
    fn too_few_seats() {
        let (inst, model, mut set) = shared_departure();
        set.retain(|&v| Some(v) != model.depart_var(Terminal::Cei, 1, 2));
        let err = decode(&inst, &model, &outcome(&model, &set)).unwrap_err();
        assert_eq!(err, DecodeError::CapacityOverrun { terminal: Terminal::Cei, t: 1, boarded: 3, seats: 2 });
    }

    #[test]
    fn missing_and_double_assignment() {
        let (inst, model, mut set) = shared_departure();
        let dropped = set.pop().unwrap();
        let err = decode(&inst, &model, &outcome(&model, &set)).unwrap_err();
        assert_eq!(err, DecodeError::AssignmentCount { terminal: Terminal::Cei, passenger: 3, count: 0 });

        set.push(dropped);
        set.push(x(&model, Terminal::Cei, 3, 2));
        let err = decode(&inst, &model, &outcome(&model, &set)).unwrap_err();
        assert_eq!(err, DecodeError::AssignmentCount { terminal: Terminal::Cei, passenger: 3, count: 2 });
    }

    #[test]
    fn per_bus_board_on_idle_bus() {
        let inst = scenario();
        let model = model_for(&inst, ModelOptions { assignment: AssignmentStrategy::PerBus, ..ModelOptions::default() });
        let mut set = vec![model.avail_var(Terminal::Cei, 0, 1).unwrap()];
        for (terminal, p, t) in [(Terminal::Cei, 1, 0), (Terminal::T2, 1, 2), (Terminal::Cei, 2, 4)] {
            set.push(x(&model, terminal, p, t));
        }
        let err = decode(&inst, &model, &outcome(&model, &set)).unwrap_err();
        assert_eq!(err, DecodeError::NotDeparting { terminal: Terminal::Cei, passenger: 1, bus: 1, t: 0 });
    }

    #[test]
    fn pooled_indicators_under_per_bus_decoding() {
        let (inst, mut model, set) = shared_departure();
        let out = outcome(&model, &set);
        model.options.assignment = AssignmentStrategy::PerBus;
        let err = decode(&inst, &model, &out).unwrap_err();
        assert_eq!(err, DecodeError::MissingBus { terminal: Terminal::Cei, passenger: 1, t: 1 });
    }

    #[test]
    fn incumbents_keep_their_status() {
        let (inst, model, set) = shared_departure();
        for status in [SolveStatus::TimeLimitReached, SolveStatus::FeasibleNonOptimal] {
            let values = outcome(&model, &set).values.unwrap();
            let out = SolveOutcome::with_solution(status.clone(), &model, values, Duration::from_secs(2));
            let schedule = decode(&inst, &model, &out).unwrap();
            assert_eq!(schedule.status, status);
            assert_eq!(schedule.objective, Some(1.0));
            assert_eq!(schedule.departures.len(), 2);
            assert_eq!(schedule.assignments.len(), 3);
            assert_eq!(schedule.runtime, Duration::from_secs(2));
        }
    }

    #[test]
    fn no_solution_gives_status_only_record() {
        let inst = scenario();
        let model = model_for(&inst, ModelOptions::default());
        for status in [SolveStatus::Infeasible, SolveStatus::Unbounded, SolveStatus::Error("lost".into())] {
            let out = SolveOutcome::without_solution(status.clone(), Duration::from_secs(1));
            let schedule = decode(&inst, &model, &out).unwrap();
            assert_eq!(schedule, Schedule::status_only(status, Duration::from_secs(1)));
        }
    }

    #[test]
    fn short_valuation() {
        let inst = scenario();
        let model = model_for(&inst, ModelOptions::default());
        let out = SolveOutcome {
            status: SolveStatus::Optimal,
            values: Some(vec![0.0; 3]),
            objective: Some(0.0),
            runtime: Duration::ZERO,
        };
        assert!(matches!(decode(&inst, &model, &out), Err(DecodeError::MissingValues { found: 3, .. })));
    }
}
