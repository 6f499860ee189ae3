use std::str::FromStr;
use json::JsonValue;

use crate::{ConfigError, Terminal};
use crate::raw::{RangeSpec, RawConfig};

const KNOWN_FIELDS: [&str; 11] = [
  "T", "B", "L", "tau", "c_max", "w_max", "arrivals", "P", "P_r", "initial_positions", "initial_at_cei",
];

/// Largest integer a JSON number (an `f64`) represents exactly.
const MAX_EXACT: f64 = 9_007_199_254_740_992.0;

fn integer(field: &str, value: &JsonValue) -> Result<i64, ConfigError> {
  match value.as_f64() {
    Some(x) if x.fract() == 0.0 && x.abs() <= MAX_EXACT => Ok(x as i64),
    Some(x) => Err(ConfigError::invalid(field, format!("expected an integer, found {}", x))),
    None => Err(ConfigError::invalid(field, format!("expected an integer, found `{}`", value.dump()))),
  }
}

fn required<'a>(root: &'a JsonValue, field: &'static str) -> Result<&'a JsonValue, ConfigError> {
  let value = &root[field];
  if value.is_null() {
    return Err(ConfigError::MissingField(field));
  }
  Ok(value)
}

fn optional<'a>(root: &'a JsonValue, field: &str) -> Option<&'a JsonValue> {
  let value = &root[field];
  if value.is_null() { None } else { Some(value) }
}

fn range_spec(field: &str, value: &JsonValue) -> Result<RangeSpec, ConfigError> {
  if value.is_number() {
    return Ok(RangeSpec::Count(integer(field, value)?));
  }
  if let Some(s) = value.as_str() {
    return Ok(RangeSpec::Text(s.to_string()));
  }
  if value.is_array() {
    let ids = value.members()
      .map(|v| integer(field, v))
      .collect::<Result<Vec<_>, _>>()?;
    return Ok(match ids.as_slice() {
      &[lo, hi] => RangeSpec::Pair(lo, hi),
      _ => RangeSpec::List(ids),
    });
  }
  Err(ConfigError::MalformedRange { field: field.to_string(), input: value.dump() })
}

fn arrivals_table(field: &str, value: &JsonValue) -> Result<Vec<(i64, i64)>, ConfigError> {
  if !value.is_object() {
    return Err(ConfigError::invalid(field, "expected an object of passenger id -> arrival minute"));
  }
  value.entries()
    .map(|(key, minute)| {
      let id = i64::from_str(key.trim())
        .map_err(|_| ConfigError::invalid(field, format!("passenger id `{}` is not an integer", key)))?;
      Ok((id, integer(&format!("{}.{}", field, key), minute)?))
    })
    .collect()
}

fn initial_positions(value: &JsonValue) -> Result<Vec<(i64, Terminal)>, ConfigError> {
  const FIELD: &str = "initial_positions";
  if !value.is_array() {
    return Err(ConfigError::invalid(FIELD, "expected a list of {bus, terminal} records"));
  }
  value.members()
    .map(|rec| {
      if !rec.is_object() {
        return Err(ConfigError::invalid(FIELD, format!("expected a {{bus, terminal}} record, found `{}`", rec.dump())));
      }
      if let Some((key, _)) = rec.entries().find(|(k, _)| *k != "bus" && *k != "terminal") {
        return Err(ConfigError::UnknownField(format!("{}.{}", FIELD, key)));
      }
      let bus = match optional(rec, "bus") {
        Some(v) => integer(FIELD, v)?,
        None => return Err(ConfigError::invalid(FIELD, "record without `bus`")),
      };
      let terminal = optional(rec, "terminal")
        .and_then(|v| v.as_str())
        .ok_or_else(|| ConfigError::invalid(FIELD, format!("bus {} has no terminal", bus)))?;
      let terminal = Terminal::from_str(terminal)?;
      Ok((bus, terminal))
    })
    .collect()
}

/// Validate the shape of every field and build the tagged raw representation.
/// Cross-field checks happen during normalisation.
pub fn raw_config(root: &JsonValue) -> Result<RawConfig, ConfigError> {
  if !root.is_object() {
    return Err(ConfigError::invalid("<root>", "expected a JSON object"));
  }
  if let Some((key, _)) = root.entries().find(|(k, _)| !KNOWN_FIELDS.contains(k)) {
    return Err(ConfigError::UnknownField(key.to_string()));
  }

  let arrivals = required(root, "arrivals")?;
  if !arrivals.is_object() {
    return Err(ConfigError::invalid("arrivals", "expected an object keyed by terminal"));
  }
  let mut arrivals_cei = Vec::new();
  let mut arrivals_t2 = Vec::new();
  for (key, table) in arrivals.entries() {
    let field = format!("arrivals.{}", key);
    match Terminal::from_str(key)? {
      Terminal::Cei => arrivals_cei = arrivals_table(&field, table)?,
      Terminal::T2 => arrivals_t2 = arrivals_table(&field, table)?,
    }
  }

  Ok(RawConfig {
    horizon: range_spec("T", required(root, "T")?)?,
    buses: range_spec("B", required(root, "B")?)?,
    granularity: optional(root, "L").map(|v| integer("L", v)).transpose()?,
    tau: integer("tau", required(root, "tau")?)?,
    c_max: integer("c_max", required(root, "c_max")?)?,
    w_max: integer("w_max", required(root, "w_max")?)?,
    arrivals_cei,
    arrivals_t2,
    passengers_cei: optional(root, "P").map(|v| range_spec("P", v)).transpose()?,
    passengers_t2: optional(root, "P_r").map(|v| range_spec("P_r", v)).transpose()?,
    initial_positions: optional(root, "initial_positions").map(initial_positions).transpose()?,
    initial_at_cei: optional(root, "initial_at_cei").map(|v| integer("initial_at_cei", v)).transpose()?,
  })
}
