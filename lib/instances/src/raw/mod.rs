use std::borrow::Cow;
use crate::{ConfigError, Terminal};
use crate::instance::{IdRange, Time};

pub trait FromRaw<T> where Self: Sized {
  fn from_raw(raw: T, id: Cow<str>) -> Result<Self, ConfigError>;
}

/// How a range is written in the config file, before normalisation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RangeSpec {
  /// `[lo, hi]`, inclusive.
  Pair(i64, i64),
  /// `"lo:hi"`, inclusive.
  Text(String),
  /// A bare integer.  What it counts depends on the field, see [`CountRule`].
  Count(i64),
  /// An explicit list of ids.  Must be contiguous and ascending.
  List(Vec<i64>),
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum CountRule {
  /// `n` means `0..=n` (a horizon end).
  ZeroTo,
  /// `n` means `1..=n` (a number of ids).
  OneTo,
}

impl RangeSpec {
  pub fn normalize(&self, field: &str, count: CountRule) -> Result<IdRange, ConfigError> {
    let (lo, hi) = match self {
      RangeSpec::Pair(lo, hi) => (*lo, *hi),
      RangeSpec::Text(s) => crate::parsers::parse_range(s)
        .ok_or_else(|| ConfigError::MalformedRange { field: field.to_string(), input: s.clone() })?,
      RangeSpec::Count(n) => match count {
        CountRule::ZeroTo => (0, *n),
        CountRule::OneTo => (1, *n),
      },
      RangeSpec::List(ids) => {
        if ids.is_empty() {
          return Err(ConfigError::invalid(field, "empty id list"));
        }
        if ids.windows(2).any(|w| w[1] != w[0] + 1) {
          return Err(ConfigError::invalid(field, "id list must be contiguous and ascending"));
        }
        (ids[0], ids[ids.len() - 1])
      }
    };

    if lo > hi {
      return Err(ConfigError::invalid(field, format!("empty range {}:{}", lo, hi)));
    }
    Ok(IdRange { lo, hi })
  }
}

/// The configuration file after shape validation but before any cross-field checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawConfig {
  pub horizon: RangeSpec,
  pub buses: RangeSpec,
  pub granularity: Option<i64>,
  pub tau: Time,
  pub c_max: i64,
  pub w_max: Time,
  /// `(passenger id, arrival minute)`, in file order.
  pub arrivals_cei: Vec<(i64, Time)>,
  pub arrivals_t2: Vec<(i64, Time)>,
  pub passengers_cei: Option<RangeSpec>,
  pub passengers_t2: Option<RangeSpec>,
  pub initial_positions: Option<Vec<(i64, Terminal)>>,
  pub initial_at_cei: Option<i64>,
}

impl RawConfig {
  pub fn arrivals(&self, terminal: Terminal) -> &[(i64, Time)] {
    match terminal {
      Terminal::Cei => &self.arrivals_cei,
      Terminal::T2 => &self.arrivals_t2,
    }
  }

  pub fn passenger_range(&self, terminal: Terminal) -> Option<&RangeSpec> {
    match terminal {
      Terminal::Cei => self.passengers_cei.as_ref(),
      Terminal::T2 => self.passengers_t2.as_ref(),
    }
  }
}
