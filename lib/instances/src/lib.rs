pub use anyhow::Result;

use fnv::FnvHashMap as Map;

pub mod instance;
pub mod parsers;
pub mod raw;

pub use instance::{
  BusId,
  IdRange,
  InitialPlacement,
  Passenger,
  PassengerId,
  ShuttleInstance,
  Terminal,
  Time,
  load_instance,
};

/// Everything that can go wrong turning a configuration file into a [`ShuttleInstance`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
  #[error("invalid json: {0}")]
  Json(String),
  #[error("missing required field `{0}`")]
  MissingField(&'static str),
  #[error("unrecognised field `{0}`")]
  UnknownField(String),
  #[error("field `{field}`: {reason}")]
  InvalidValue { field: String, reason: String },
  #[error("field `{field}`: malformed range `{input}`")]
  MalformedRange { field: String, input: String },
  #[error("horizon ends at {t_end} but one transit leg takes {tau}")]
  HorizonTooShort { t_end: Time, tau: Time },
}

impl ConfigError {
  pub(crate) fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
    ConfigError::InvalidValue { field: field.into(), reason: reason.into() }
  }
}
