use std::borrow::Cow;
use std::fmt;
use std::ops::RangeInclusive;
use std::path::Path;
use std::str::FromStr;

use itertools::Itertools;

use crate::{ConfigError, Map};
use crate::parsers::{JsonFmt, JsonText, ParseInstance};
use crate::raw::{CountRule, FromRaw, RangeSpec, RawConfig};

pub type Time = i64;
pub type BusId = u32;
pub type PassengerId = u32;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum Terminal {
  Cei,
  T2,
}

impl Terminal {
  pub const ALL: [Terminal; 2] = [Terminal::Cei, Terminal::T2];

  #[inline]
  pub fn other(self) -> Terminal {
    match self {
      Terminal::Cei => Terminal::T2,
      Terminal::T2 => Terminal::Cei,
    }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      Terminal::Cei => "CEI",
      Terminal::T2 => "T2",
    }
  }
}

impl fmt::Display for Terminal {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for Terminal {
  type Err = ConfigError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "CEI" => Ok(Terminal::Cei),
      "T2" => Ok(Terminal::T2),
      other => Err(ConfigError::invalid("terminal", format!("`{}` is not one of CEI, T2", other))),
    }
  }
}

/// Canonical inclusive integer range.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct IdRange {
  pub lo: i64,
  pub hi: i64,
}

impl IdRange {
  #[inline]
  pub fn iter(&self) -> RangeInclusive<i64> { self.lo..=self.hi }

  #[inline]
  pub fn contains(&self, x: i64) -> bool { self.lo <= x && x <= self.hi }

  pub fn len(&self) -> usize { (self.hi - self.lo + 1).max(0) as usize }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct Passenger {
  pub terminal: Terminal,
  pub id: PassengerId,
  pub arrival: Time,
}

/// Where buses are at the start of the day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitialPlacement {
  /// Each bus starts at whichever terminal the solver picks.
  Free,
  /// Covers every bus exactly once.
  Fixed(Map<BusId, Terminal>),
  /// This many buses start at CEI and the rest at T2.  The solver picks which.
  AtCei(u32),
}

impl Default for InitialPlacement {
  fn default() -> Self { InitialPlacement::Free }
}

impl InitialPlacement {
  /// The terminal `bus` is pinned to, if any.
  pub fn fixed(&self, bus: BusId) -> Option<Terminal> {
    match self {
      InitialPlacement::Fixed(pos) => pos.get(&bus).copied(),
      _ => None,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShuttleInstance {
  pub id: String,
  pub t_start: Time,
  pub t_end: Time,
  /// Minutes per slot.  Informational only, every other time is already in slots.
  pub granularity: Time,
  pub tau: Time,
  pub capacity: u32,
  pub w_max: Time,
  /// Ascending.
  pub buses: Vec<BusId>,
  /// Sorted by terminal, then id.
  pub passengers: Vec<Passenger>,
  pub initial_placement: InitialPlacement,
}

impl ShuttleInstance {
  #[inline]
  pub fn horizon(&self) -> RangeInclusive<Time> { self.t_start..=self.t_end }

  /// The last slot a bus may leave and still arrive within the horizon.
  #[inline]
  pub fn last_departure(&self) -> Time { self.t_end - self.tau }

  pub fn passengers_at(&self, terminal: Terminal) -> impl Iterator<Item=&Passenger> + '_ {
    self.passengers.iter().filter(move |p| p.terminal == terminal)
  }

  pub fn passenger(&self, terminal: Terminal, id: PassengerId) -> Option<&Passenger> {
    self.passengers.iter().find(|p| p.terminal == terminal && p.id == id)
  }

  /// Start `count` buses at CEI and the rest at T2, replacing any other placement.
  pub fn start_at_cei(&mut self, count: i64) -> Result<(), ConfigError> {
    if count < 0 || count > self.buses.len() as i64 {
      return Err(ConfigError::invalid("initial_at_cei",
        format!("{} buses cannot start at CEI out of {}", count, self.buses.len())));
    }
    self.initial_placement = InitialPlacement::AtCei(count as u32);
    Ok(())
  }

  pub fn from_json_str(text: &str, id: &str) -> Result<Self, ConfigError> {
    ShuttleInstance::from_raw(JsonText(text).to_raw()?, Cow::Borrowed(id))
  }
}

fn non_negative_id(field: &str, x: i64) -> Result<u32, ConfigError> {
  u32::try_from(x).map_err(|_| ConfigError::invalid(field, format!("id {} is out of range", x)))
}

fn normalize_passengers(raw: &RawConfig, terminal: Terminal, horizon: IdRange) -> Result<Vec<Passenger>, ConfigError> {
  let field = format!("arrivals.{}", terminal);
  let mut passengers = Vec::with_capacity(raw.arrivals(terminal).len());
  for &(id, arrival) in raw.arrivals(terminal) {
    let id = non_negative_id(&field, id)?;
    if !horizon.contains(arrival) {
      return Err(ConfigError::invalid(&field,
        format!("passenger {} arrives at {}, outside the horizon {}:{}", id, arrival, horizon.lo, horizon.hi)));
    }
    passengers.push(Passenger { terminal, id, arrival });
  }
  passengers.sort_by_key(|p| p.id);
  if let Some((a, _)) = passengers.iter().tuple_windows().find(|(a, b)| a.id == b.id) {
    return Err(ConfigError::invalid(&field, format!("passenger {} listed twice", a.id)));
  }

  let range_field = match terminal {
    Terminal::Cei => "P",
    Terminal::T2 => "P_r",
  };
  if let Some(spec) = raw.passenger_range(terminal) {
    let ids = spec.normalize(range_field, CountRule::OneTo)?;
    if let Some(p) = passengers.iter().find(|p| !ids.contains(p.id as i64)) {
      return Err(ConfigError::invalid(range_field, format!("passenger {} is outside {}:{}", p.id, ids.lo, ids.hi)));
    }
    if passengers.len() != ids.len() {
      let missing = ids.iter()
        .find(|&i| passengers.binary_search_by_key(&i, |p| p.id as i64).is_err())
        .unwrap_or(ids.lo);
      return Err(ConfigError::invalid(range_field, format!("passenger {} has no arrival", missing)));
    }
  }
  Ok(passengers)
}

impl FromRaw<RawConfig> for ShuttleInstance {
  fn from_raw(raw: RawConfig, id: Cow<str>) -> Result<ShuttleInstance, ConfigError> {
    let horizon = raw.horizon.normalize("T", CountRule::ZeroTo)?;

    if raw.tau < 1 {
      return Err(ConfigError::invalid("tau", "transit time must be at least one slot"));
    }
    if raw.c_max < 1 || raw.c_max > u32::MAX as i64 {
      return Err(ConfigError::invalid("c_max", format!("capacity {} is out of range", raw.c_max)));
    }
    if raw.w_max < 0 {
      return Err(ConfigError::invalid("w_max", "maximum wait must be non-negative"));
    }
    let granularity = raw.granularity.unwrap_or(1);
    if granularity < 1 {
      return Err(ConfigError::invalid("L", "granularity must be positive"));
    }

    let bus_range = raw.buses.normalize("B", CountRule::OneTo)?;
    let buses = bus_range.iter()
      .map(|b| non_negative_id("B", b))
      .collect::<Result<Vec<_>, _>>()?;

    let mut passengers = normalize_passengers(&raw, Terminal::Cei, horizon)?;
    passengers.extend(normalize_passengers(&raw, Terminal::T2, horizon)?);

    let initial_placement = match raw.initial_positions {
      None => InitialPlacement::Free,
      Some(_) if raw.initial_at_cei.is_some() =>
        return Err(ConfigError::invalid("initial_at_cei", "cannot be combined with `initial_positions`")),
      Some(positions) => {
        let mut map = Map::default();
        for (bus, terminal) in positions {
          if !bus_range.contains(bus) {
            return Err(ConfigError::invalid("initial_positions", format!("unknown bus {}", bus)));
          }
          if map.insert(bus as BusId, terminal).is_some() {
            return Err(ConfigError::invalid("initial_positions", format!("bus {} placed twice", bus)));
          }
        }
        if let Some(b) = buses.iter().find(|b| !map.contains_key(b)) {
          return Err(ConfigError::invalid("initial_positions", format!("bus {} has no initial position", b)));
        }
        InitialPlacement::Fixed(map)
      }
    };

    let mut instance = ShuttleInstance {
      id: id.into_owned(),
      t_start: horizon.lo,
      t_end: horizon.hi,
      granularity,
      tau: raw.tau,
      capacity: raw.c_max as u32,
      w_max: raw.w_max,
      buses,
      passengers,
      initial_placement,
    };
    if let Some(count) = raw.initial_at_cei {
      instance.start_at_cei(count)?;
    }
    Ok(instance)
  }
}

/// Load and normalise a configuration file.  The instance id is the file stem.
pub fn load_instance(path: impl AsRef<Path>) -> crate::Result<ShuttleInstance> {
  let path = path.as_ref();
  let raw = RawConfig::parse(JsonFmt(path))?;
  let id = path.file_stem().map(|s| s.to_string_lossy()).unwrap_or(Cow::Borrowed("instance"));
  Ok(ShuttleInstance::from_raw(raw, id)?)
}

#[cfg(test)]
mod tests {
  use super::*;

  const SCENARIO: &str = r#"{
    "T": "0:8", "B": 1, "L": 1, "tau": 2, "c_max": 1, "w_max": 60,
    "arrivals": {"CEI": {"1": 0, "2": 0}, "T2": {"1": 2}}
  }"#;

  #[test]
  fn scenario() {
    let inst = ShuttleInstance::from_json_str(SCENARIO, "scenario").unwrap();
    assert_eq!((inst.t_start, inst.t_end), (0, 8));
    assert_eq!(inst.buses, vec![1]);
    assert_eq!(inst.last_departure(), 6);
    assert_eq!(inst.passengers_at(Terminal::Cei).count(), 2);
    assert_eq!(inst.passenger(Terminal::T2, 1).map(|p| p.arrival), Some(2));
    assert_eq!(inst.initial_placement, InitialPlacement::Free);
  }

  #[test]
  fn explicit_passenger_range() {
    let ok = r#"{"T": 8, "B": [1, 2], "tau": 2, "c_max": 1, "w_max": 6,
                 "arrivals": {"CEI": {"3": 0, "4": 1}}, "P": "3:4"}"#;
    assert!(ShuttleInstance::from_json_str(ok, "ok").is_ok());

    let gap = r#"{"T": 8, "B": 1, "tau": 2, "c_max": 1, "w_max": 6,
                  "arrivals": {"CEI": {"3": 0, "5": 1}}, "P": "3:5"}"#;
    assert!(ShuttleInstance::from_json_str(gap, "gap").is_err());

    let outside = r#"{"T": 8, "B": 1, "tau": 2, "c_max": 1, "w_max": 6,
                      "arrivals": {"T2": {"9": 0}}, "P_r": 3}"#;
    assert!(ShuttleInstance::from_json_str(outside, "outside").is_err());

    // inferred ranges tolerate gaps
    let inferred = r#"{"T": 8, "B": 1, "tau": 2, "c_max": 1, "w_max": 6,
                       "arrivals": {"CEI": {"3": 0, "5": 1}}}"#;
    assert!(ShuttleInstance::from_json_str(inferred, "inferred").is_ok());
  }

  #[test]
  fn arrival_outside_horizon() {
    let text = r#"{"T": "10:20", "B": 1, "tau": 2, "c_max": 1, "w_max": 6, "arrivals": {"CEI": {"1": 5}}}"#;
    assert!(matches!(ShuttleInstance::from_json_str(text, "x"), Err(ConfigError::InvalidValue { .. })));
  }

  #[test]
  fn initial_positions() {
    let full = r#"{"T": 8, "B": 2, "tau": 2, "c_max": 1, "w_max": 6, "arrivals": {},
                   "initial_positions": [{"bus": 2, "terminal": "T2"}, {"bus": 1, "terminal": "CEI"}]}"#;
    let inst = ShuttleInstance::from_json_str(full, "full").unwrap();
    assert_eq!(inst.initial_placement.fixed(1), Some(Terminal::Cei));
    assert_eq!(inst.initial_placement.fixed(2), Some(Terminal::T2));

    let partial = r#"{"T": 8, "B": 2, "tau": 2, "c_max": 1, "w_max": 6, "arrivals": {},
                      "initial_positions": [{"bus": 1, "terminal": "CEI"}]}"#;
    assert!(ShuttleInstance::from_json_str(partial, "partial").is_err());

    let twice = r#"{"T": 8, "B": 1, "tau": 2, "c_max": 1, "w_max": 6, "arrivals": {},
                    "initial_positions": [{"bus": 1, "terminal": "CEI"}, {"bus": 1, "terminal": "T2"}]}"#;
    assert!(ShuttleInstance::from_json_str(twice, "twice").is_err());
  }

  #[test]
  fn count_at_cei() {
    let two = r#"{"T": 8, "B": 3, "tau": 2, "c_max": 1, "w_max": 6, "arrivals": {}, "initial_at_cei": 2}"#;
    let mut inst = ShuttleInstance::from_json_str(two, "two").unwrap();
    assert_eq!(inst.initial_placement, InitialPlacement::AtCei(2));
    assert_eq!(inst.initial_placement.fixed(1), None);

    assert!(inst.start_at_cei(4).is_err());
    assert!(inst.start_at_cei(-1).is_err());
    inst.start_at_cei(0).unwrap();
    assert_eq!(inst.initial_placement, InitialPlacement::AtCei(0));

    let too_many = r#"{"T": 8, "B": 1, "tau": 2, "c_max": 1, "w_max": 6, "arrivals": {}, "initial_at_cei": 2}"#;
    assert!(ShuttleInstance::from_json_str(too_many, "x").is_err());

    let both = r#"{"T": 8, "B": 1, "tau": 2, "c_max": 1, "w_max": 6, "arrivals": {}, "initial_at_cei": 1,
                   "initial_positions": [{"bus": 1, "terminal": "CEI"}]}"#;
    assert!(ShuttleInstance::from_json_str(both, "x").is_err());
  }

  #[test]
  fn scalar_checks() {
    let zero_tau = r#"{"T": 8, "B": 1, "tau": 0, "c_max": 1, "w_max": 6, "arrivals": {}}"#;
    assert!(ShuttleInstance::from_json_str(zero_tau, "x").is_err());
    let no_seats = r#"{"T": 8, "B": 1, "tau": 1, "c_max": 0, "w_max": 6, "arrivals": {}}"#;
    assert!(ShuttleInstance::from_json_str(no_seats, "x").is_err());
    let dup = r#"{"T": 8, "B": 1, "tau": 1, "c_max": 1, "w_max": 6, "arrivals": {"CEI": {"1": 0, "01": 2}}}"#;
    assert!(ShuttleInstance::from_json_str(dup, "x").is_err());
  }
}
