use std::path::Path;
use anyhow::Context;

use crate::ConfigError;
use crate::raw::RawConfig;

mod common;
pub(crate) use common::parse_range;

mod json_config;

mod nom_prelude {
  pub use nom::{
    IResult,
    error::{
      self,
      ParseError,
    },
    sequence::*,
    combinator::*,
    character::complete::*,
    Finish,
  };
  pub use std::str::FromStr;
  pub use std::num::ParseIntError;
}

pub trait ParseInstance<Fmt>: Sized {
  fn parse(inputs: Fmt) -> crate::Result<Self>;
}

/// A configuration file on disk.
#[derive(Debug, Copy, Clone)]
pub struct JsonFmt<P>(pub P);

/// A configuration held in memory.
#[derive(Debug, Copy, Clone)]
pub struct JsonText<'a>(pub &'a str);

impl<'a> JsonText<'a> {
  pub fn to_raw(self) -> Result<RawConfig, ConfigError> {
    let root = json::parse(self.0).map_err(|e| ConfigError::Json(e.to_string()))?;
    json_config::raw_config(&root)
  }
}

impl<'a> ParseInstance<JsonText<'a>> for RawConfig {
  fn parse(text: JsonText<'a>) -> crate::Result<RawConfig> {
    Ok(text.to_raw()?)
  }
}

impl<P: AsRef<Path>> ParseInstance<JsonFmt<P>> for RawConfig {
  fn parse(path: JsonFmt<P>) -> crate::Result<RawConfig> {
    let path = path.0.as_ref();
    let data = std::fs::read_to_string(path).with_context(|| format!("failed to read {:?}", path))?;
    let raw = JsonText(&data).to_raw().with_context(|| format!("failed to load {:?}", path))?;
    Ok(raw)
  }
}
