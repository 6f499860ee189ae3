use std::io::Write;

use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use json::{object, JsonValue};

use crate::data::{ShuttleInstance, Terminal};
use crate::decode::Schedule;

pub const SCHEMA_VERSION: u32 = 1;

fn arrivals(instance: &ShuttleInstance, terminal: Terminal) -> JsonValue {
    instance.passengers_at(terminal)
        .map(|p| object! { p: p.id, arr: p.arrival })
        .collect::<Vec<_>>()
        .into()
}

fn passenger_ids(instance: &ShuttleInstance, terminal: Terminal) -> JsonValue {
    instance.passengers_at(terminal).map(|p| p.id).collect::<Vec<_>>().into()
}

/// The result record.  Without a solution the schedule arrays are empty and `objective` is null.
pub fn schedule_json(instance: &ShuttleInstance, schedule: &Schedule, generated_at: DateTime<Utc>) -> JsonValue {
    let objective = match schedule.objective {
        Some(x) => JsonValue::from(x),
        None => JsonValue::Null,
    };

    let initial_positions: JsonValue = schedule.initial_positions.iter()
        .map(|&(bus, terminal)| object! { bus: bus, terminal: terminal.as_str() })
        .collect::<Vec<_>>()
        .into();
    let departures: JsonValue = schedule.departures.iter()
        .map(|d| object! { terminal: d.terminal.as_str(), bus: d.bus, t: d.t })
        .collect::<Vec<_>>()
        .into();
    let assignments: JsonValue = schedule.assignments.iter()
        .map(|b| object! { terminal: b.terminal.as_str(), p: b.passenger, bus: b.bus, t: b.t, wait: b.wait })
        .collect::<Vec<_>>()
        .into();

    object! {
        schema_version: SCHEMA_VERSION,
        meta: object! {
            T_start: instance.t_start,
            T_end: instance.t_end,
            L: instance.granularity,
            tau: instance.tau,
            capacity: instance.capacity,
            w_max: instance.w_max,
        },
        generated_at: generated_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        status: schedule.status.as_str(),
        objective: objective,
        runtime: schedule.runtime.as_secs_f64(),
        sets: object! {
            buses: JsonValue::from(instance.buses.clone()),
            P_CEI: passenger_ids(instance, Terminal::Cei),
            P_T2: passenger_ids(instance, Terminal::T2),
        },
        arrivals: object! {
            "CEI": arrivals(instance, Terminal::Cei),
            "T2": arrivals(instance, Terminal::T2),
        },
        initial_positions: initial_positions,
        departures: departures,
        assignments: assignments,
    }
}

pub fn write_schedule(instance: &ShuttleInstance, schedule: &Schedule, mut buf: impl Write) -> Result<()> {
    let root = schedule_json(instance, schedule, Utc::now());
    root.write_pretty(&mut buf, 2)?;
    writeln!(buf)?;
    Ok(())
}
