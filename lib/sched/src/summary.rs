use itertools::Itertools;
use json::{object, JsonValue};

use crate::data::{BusId, ShuttleInstance, Terminal, Time};
use crate::decode::Schedule;
use crate::{Map, Set};

#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct WaitStats {
    pub passengers: usize,
    pub mean: f64,
    pub max: Time,
}

impl WaitStats {
    fn of(waits: impl IntoIterator<Item=Time>) -> Self {
        let mut stats = WaitStats::default();
        let mut total = 0;
        for w in waits {
            stats.passengers += 1;
            stats.max = stats.max.max(w);
            total += w;
        }
        if stats.passengers > 0 {
            stats.mean = total as f64 / stats.passengers as f64;
        }
        stats
    }

    fn to_json(&self) -> JsonValue {
        object! { passengers: self.passengers, mean: self.mean, max: self.max }
    }
}

fn mean(xs: impl IntoIterator<Item=f64>) -> Option<f64> {
    let (n, total) = xs.into_iter().fold((0usize, 0.0), |(n, s), x| (n + 1, s + x));
    if n == 0 { None } else { Some(total / n as f64) }
}

/// Headline figures of a schedule.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleSummary {
    pub trips: usize,
    /// Trips nobody boards.
    pub deadhead_trips: usize,
    /// Trips leaving before the bus carries its last passenger of the day.
    pub service_trips: usize,
    /// Empty trips among `service_trips`.
    pub service_deadheads: usize,
    pub overall: WaitStats,
    pub by_terminal: Vec<(Terminal, WaitStats)>,
    /// Keyed by hour index since slot 0; the boarding slot decides the hour.
    pub hourly: Vec<(Time, WaitStats)>,
    /// Mean over busy hours of the hourly mean wait.
    pub hourly_mean_wait: f64,
    /// Mean over busy hours of the hourly maximum wait.
    pub hourly_mean_max_wait: f64,
    /// Mean slack, in slots, between consecutive service trips of a bus beyond the round trip
    /// itself.  `None` if no bus makes two service trips.
    pub mean_idle: Option<f64>,
}

pub fn summarize(instance: &ShuttleInstance, schedule: &Schedule) -> ScheduleSummary {
    let used: Set<_> = schedule.assignments.iter().map(|b| (b.terminal, b.bus, b.t)).collect();
    let is_deadhead = |terminal, bus, t| !used.contains(&(terminal, bus, t));
    let deadhead_trips = schedule.departures.iter()
        .filter(|d| is_deadhead(d.terminal, d.bus, d.t))
        .count();

    let mut last_boarding: Map<BusId, Time> = Map::default();
    for b in &schedule.assignments {
        let t = last_boarding.entry(b.bus).or_insert(b.t);
        *t = (*t).max(b.t);
    }
    let service = schedule.departures.iter()
        .filter(|d| last_boarding.get(&d.bus).map_or(false, |&last| d.t < last))
        .collect_vec();
    let service_deadheads = service.iter().filter(|d| is_deadhead(d.terminal, d.bus, d.t)).count();
    let round_trip = (2 * instance.tau) as f64;
    let mean_idle = mean(
        service.iter()
            .map(|d| (d.bus, d.t))
            .into_group_map()
            .into_iter()
            .sorted_by_key(|(bus, _)| *bus)
            .filter_map(|(_, times)| {
                let gaps = times.into_iter().sorted().tuple_windows().map(|(a, b)| (b - a) as f64);
                mean(gaps)
            })
    ).map(|gap| gap - round_trip);

    let by_terminal = Terminal::ALL.iter()
        .map(|&terminal| {
            let waits = schedule.assignments.iter().filter(|b| b.terminal == terminal).map(|b| b.wait);
            (terminal, WaitStats::of(waits))
        })
        .collect();

    let granularity = instance.granularity.max(1);
    let hourly: Vec<(Time, WaitStats)> = schedule.assignments.iter()
        .map(|b| ((b.t * granularity).div_euclid(60), b.wait))
        .into_group_map()
        .into_iter()
        .map(|(hour, waits)| (hour, WaitStats::of(waits)))
        .sorted_by_key(|(hour, _)| *hour)
        .collect();

    ScheduleSummary {
        trips: schedule.departures.len(),
        deadhead_trips,
        service_trips: service.len(),
        service_deadheads,
        overall: WaitStats::of(schedule.assignments.iter().map(|b| b.wait)),
        by_terminal,
        hourly_mean_wait: mean(hourly.iter().map(|(_, s)| s.mean)).unwrap_or(0.0),
        hourly_mean_max_wait: mean(hourly.iter().map(|(_, s)| s.max as f64)).unwrap_or(0.0),
        hourly,
        mean_idle,
    }
}

impl ScheduleSummary {
    pub fn to_json(&self) -> JsonValue {
        let mut by_terminal = JsonValue::new_object();
        for (terminal, stats) in &self.by_terminal {
            by_terminal[terminal.as_str()] = stats.to_json();
        }
        let hourly: JsonValue = self.hourly.iter()
            .map(|(hour, stats)| {
                let mut rec = stats.to_json();
                rec["hour"] = (*hour).into();
                rec
            })
            .collect::<Vec<_>>()
            .into();
        object! {
            trips: self.trips,
            deadhead_trips: self.deadhead_trips,
            service_trips: self.service_trips,
            service_deadheads: self.service_deadheads,
            wait: self.overall.to_json(),
            hourly_mean_wait: self.hourly_mean_wait,
            hourly_mean_max_wait: self.hourly_mean_max_wait,
            mean_idle: self.mean_idle,
            by_terminal: by_terminal,
            hourly: hourly,
        }
    }
}
