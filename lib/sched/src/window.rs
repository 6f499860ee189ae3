use std::ops::RangeInclusive;
use tracing::*;

use crate::Error;
use crate::data::{ConfigError, Passenger, PassengerId, ShuttleInstance, Terminal, Time};
use crate::Map;

/// Inclusive range of slots in which a passenger may board.  Never empty.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct BoardingWindow {
    pub lo: Time,
    pub hi: Time,
}

impl BoardingWindow {
    #[inline]
    pub fn iter(&self) -> RangeInclusive<Time> { self.lo..=self.hi }

    #[inline]
    pub fn contains(&self, t: Time) -> bool { self.lo <= t && t <= self.hi }

    #[inline]
    pub fn len(&self) -> usize { (self.hi - self.lo + 1) as usize }
}

/// `[a, min(a + w_max, t_end - tau)]`, or `None` if the passenger arrives after the last slot
/// from which a bus can still complete its trip.
#[inline]
pub fn boarding_window(arrival: Time, w_max: Time, t_end: Time, tau: Time) -> Option<BoardingWindow> {
    let last = t_end - tau;
    if arrival > last {
        return None;
    }
    Some(BoardingWindow { lo: arrival, hi: (arrival + w_max).min(last) })
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct PassengerWindow {
    pub passenger: Passenger,
    pub window: BoardingWindow,
}

/// Boarding windows of every passenger of an instance, in instance order (CEI then T2, ascending
/// id).
#[derive(Debug, Clone)]
pub struct Windows {
    entries: Vec<PassengerWindow>,
    index: Map<(Terminal, PassengerId), usize>,
}

impl Windows {
    pub fn iter(&self) -> std::slice::Iter<'_, PassengerWindow> { self.entries.iter() }

    pub fn len(&self) -> usize { self.entries.len() }

    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    pub fn get(&self, terminal: Terminal, passenger: PassengerId) -> Option<&PassengerWindow> {
        self.index.get(&(terminal, passenger)).map(|&k| &self.entries[k])
    }

    /// Number of (passenger, slot) pairs, i.e. pooled assignment variables.
    pub fn total_slots(&self) -> usize {
        self.entries.iter().map(|pw| pw.window.len()).sum()
    }
}

impl<'a> IntoIterator for &'a Windows {
    type Item = &'a PassengerWindow;
    type IntoIter = std::slice::Iter<'a, PassengerWindow>;

    fn into_iter(self) -> Self::IntoIter { self.entries.iter() }
}

/// Compute every passenger's window.  The first passenger with an empty window is reported as
/// [`Error::InfeasibleWindow`]; no window is clipped or dropped.
#[instrument(level="debug", skip_all, fields(instance=%instance.id))]
pub fn compute_windows(instance: &ShuttleInstance) -> Result<Windows, Error> {
    if instance.t_end < instance.tau {
        return Err(ConfigError::HorizonTooShort { t_end: instance.t_end, tau: instance.tau }.into());
    }

    let mut entries = Vec::with_capacity(instance.passengers.len());
    let mut index = Map::default();
    for &passenger in &instance.passengers {
        let window = boarding_window(passenger.arrival, instance.w_max, instance.t_end, instance.tau)
            .ok_or(Error::InfeasibleWindow {
                terminal: passenger.terminal,
                passenger: passenger.id,
                arrival: passenger.arrival,
                last_departure: instance.last_departure(),
            })?;
        trace!(terminal=%passenger.terminal, passenger=passenger.id, lo=window.lo, hi=window.hi);
        index.insert((passenger.terminal, passenger.id), entries.len());
        entries.push(PassengerWindow { passenger, window });
    }

    let windows = Windows { entries, index };
    debug!(passengers=windows.len(), slots=windows.total_slots(), "computed boarding windows");
    Ok(windows)
}
