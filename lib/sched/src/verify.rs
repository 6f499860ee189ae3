//! Independent re-validation of a decoded schedule against its instance.  Shares nothing with the
//! model beyond the instance itself, so it also catches modelling mistakes.
use itertools::Itertools;
use tracing::*;

use crate::data::{BusId, InitialPlacement, PassengerId, ShuttleInstance, Terminal, Time};
use crate::decode::Schedule;
use crate::model::{HeadwayMode, ModelOptions};
use crate::{Map, Set};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScheduleViolation {
    #[error("{status} schedule carries departures or assignments")]
    DataWithoutSolution { status: String },
    #[error("{terminal} passenger {passenger} is boarded {count} times")]
    AssignmentCount { terminal: Terminal, passenger: PassengerId, count: usize },
    #[error("{terminal} passenger {passenger} is not part of the instance")]
    UnknownPassenger { terminal: Terminal, passenger: PassengerId },
    #[error("bus {bus} is not part of the instance")]
    UnknownBus { bus: BusId },
    #[error("{terminal} passenger {passenger} boards bus {bus} at {t}, which does not depart")]
    BoardsIdleBus { terminal: Terminal, passenger: PassengerId, bus: BusId, t: Time },
    #[error("bus {bus} leaves {terminal} at {t} with {load} passengers")]
    OverCapacity { terminal: Terminal, bus: BusId, t: Time, load: usize },
    #[error("{terminal} passenger {passenger} records wait {recorded}, expected {expected}")]
    WaitMismatch { terminal: Terminal, passenger: PassengerId, recorded: Time, expected: Time },
    #[error("{terminal} passenger {passenger} waits {wait} slots")]
    WaitOutOfRange { terminal: Terminal, passenger: PassengerId, wait: Time },
    #[error("bus {bus} leaves {terminal} at {t} and cannot arrive before the horizon ends")]
    LateDeparture { terminal: Terminal, bus: BusId, t: Time },
    #[error("bus {bus} leaves {terminal} at {t} but is elsewhere")]
    WrongTerminal { terminal: Terminal, bus: BusId, t: Time },
    #[error("bus {bus} leaves at {t} while still travelling until {free_at}")]
    InTransit { bus: BusId, t: Time, free_at: Time },
    #[error("bus {bus} starts at {found}, expected {expected}")]
    InitialPosition { bus: BusId, found: String, expected: Terminal },
    #[error("{found} buses start at CEI, expected {expected}")]
    InitialCount { found: usize, expected: u32 },
    #[error("departures from {terminal} at {first} and {second} are closer than {min_headway} slots")]
    Headway { terminal: Terminal, first: Time, second: Time, min_headway: Time },
    #[error("objective {reported} differs from the recomputed {recomputed}")]
    Objective { reported: f64, recomputed: f64 },
}

const OBJECTIVE_TOL: f64 = 1e-6;

/// Every rule of the problem broken by `schedule`.  Empty means the schedule is valid.
#[instrument(level="debug", skip_all, fields(instance=%instance.id))]
pub fn check_schedule(instance: &ShuttleInstance, schedule: &Schedule, options: &ModelOptions) -> Vec<ScheduleViolation> {
    use ScheduleViolation::*;
    let mut bad = Vec::new();

    if !schedule.status.has_solution() {
        if !schedule.departures.is_empty() || !schedule.assignments.is_empty() {
            bad.push(DataWithoutSolution { status: schedule.status.as_str().to_string() });
        }
        return bad;
    }

    let departs: Set<(Terminal, BusId, Time)> = schedule.departures.iter()
        .map(|d| (d.terminal, d.bus, d.t))
        .collect();

    // passengers
    let boarded = schedule.assignments.iter().counts_by(|b| (b.terminal, b.passenger));
    for p in &instance.passengers {
        let count = boarded.get(&(p.terminal, p.id)).copied().unwrap_or(0);
        if count != 1 {
            bad.push(AssignmentCount { terminal: p.terminal, passenger: p.id, count });
        }
    }
    let mut load: Map<(Terminal, BusId, Time), usize> = Map::default();
    for b in &schedule.assignments {
        let p = match instance.passenger(b.terminal, b.passenger) {
            Some(p) => p,
            None => {
                bad.push(UnknownPassenger { terminal: b.terminal, passenger: b.passenger });
                continue;
            }
        };
        if !departs.contains(&(b.terminal, b.bus, b.t)) {
            bad.push(BoardsIdleBus { terminal: b.terminal, passenger: b.passenger, bus: b.bus, t: b.t });
        }
        *load.entry((b.terminal, b.bus, b.t)).or_default() += 1;
        let expected = b.t - p.arrival;
        if b.wait != expected {
            bad.push(WaitMismatch { terminal: b.terminal, passenger: b.passenger, recorded: b.wait, expected });
        }
        if expected < 0 || expected > instance.w_max {
            bad.push(WaitOutOfRange { terminal: b.terminal, passenger: b.passenger, wait: expected });
        }
    }
    for ((terminal, bus, t), n) in load.into_iter().sorted() {
        if n > instance.capacity as usize {
            bad.push(OverCapacity { terminal, bus, t, load: n });
        }
    }

    // buses
    let known_buses: Set<BusId> = instance.buses.iter().copied().collect();
    let start: Map<BusId, Terminal> = schedule.initial_positions.iter().copied().collect();
    for &bus in &instance.buses {
        let expected = instance.initial_placement.fixed(bus);
        match (start.get(&bus), expected) {
            (None, Some(expected)) => bad.push(InitialPosition { bus, found: "nowhere".into(), expected }),
            (Some(&found), Some(expected)) if found != expected =>
                bad.push(InitialPosition { bus, found: found.to_string(), expected }),
            _ => {}
        }
    }

    if let InitialPlacement::AtCei(expected) = instance.initial_placement {
        let found = instance.buses.iter().filter(|b| start.get(b) == Some(&Terminal::Cei)).count();
        if found != expected as usize {
            bad.push(InitialCount { found, expected });
        }
    }

    let by_bus = schedule.departures.iter().map(|d| (d.bus, d)).into_group_map();
    for (bus, mut trips) in by_bus.into_iter().sorted_by_key(|(b, _)| *b) {
        if !known_buses.contains(&bus) {
            bad.push(UnknownBus { bus });
            continue;
        }
        trips.sort_by_key(|d| d.t);
        let mut at = start.get(&bus).copied();
        let mut free_at = instance.t_start;
        for d in trips {
            if d.t > instance.last_departure() {
                bad.push(LateDeparture { terminal: d.terminal, bus, t: d.t });
            }
            if d.t < free_at {
                bad.push(InTransit { bus, t: d.t, free_at });
            }
            // the first trip fixes the position of a bus the schedule did not place
            if at.map_or(false, |x| x != d.terminal) {
                bad.push(WrongTerminal { terminal: d.terminal, bus, t: d.t });
            }
            at = Some(d.terminal.other());
            free_at = d.t + instance.tau;
        }
    }

    // headway
    let per_bus = match options.headway {
        HeadwayMode::Disabled => None,
        HeadwayMode::Pooled => Some(false),
        HeadwayMode::PerBus => Some(true),
    };
    if let Some(per_bus) = per_bus {
        let groups = schedule.departures.iter()
            .map(|d| ((d.terminal, if per_bus { Some(d.bus) } else { None }), d.t))
            .into_group_map();
        for ((terminal, _), times) in groups.into_iter().sorted_by_key(|(k, _)| *k) {
            for (first, second) in times.into_iter().sorted().tuple_windows() {
                if second - first < options.min_headway {
                    bad.push(Headway { terminal, first, second, min_headway: options.min_headway });
                }
            }
        }
    }

    if let Some(reported) = schedule.objective {
        let recomputed = schedule.objective_from_waits(options.penalty);
        if (reported - recomputed).abs() > OBJECTIVE_TOL * (1.0 + recomputed.abs()) {
            bad.push(Objective { reported, recomputed });
        }
    }

    for v in &bad {
        debug!(%v);
    }
    bad
}
