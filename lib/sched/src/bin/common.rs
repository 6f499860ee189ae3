use std::fmt::Display;
use std::str::FromStr;
use std::path::PathBuf;
use std::io;
use anyhow::Result;
use structopt::StructOpt;

use shuttle_sched::data::ShuttleInstance;
use shuttle_sched::output::write_schedule;
use shuttle_sched::summary::summarize;
use shuttle_sched::Schedule;

#[derive(Clone, Debug, StructOpt)]
pub struct OutputOptions {
  #[structopt(long="format", short="f", parse(try_from_str), default_value="json", possible_values=&OUTPUT_FORMAT_STRINGS)]
  pub fmt: OutputFormat,
  /// Write the schedule to stdout instead of OUTPUT.
  #[structopt(long)]
  pub stdout: bool,
  /// Also write newline-delimited JSON logs here.
  #[structopt(long)]
  pub log: Option<PathBuf>,
}

pub fn clap_range_validator<T>(minval: Option<T>, maxval: Option<T>) -> impl Fn(String) -> Result<(), String>
    where
        T: FromStr + PartialOrd + Display + Copy,
        T::Err: Display
{
    return move |val| {
        let x: T = val.parse().map_err(|e: T::Err| e.to_string())?;
        if let Some(y) = minval {
            if x < y { return Err(format!("must be at least {}", y)); }
        }
        if let Some(y) = maxval {
            if x > y { return Err(format!("must be at most {}", y)); }
        }
        return Ok(());
    };
}

pub const OUTPUT_FORMAT_STRINGS: [&str; 2] = ["json", "json-summ"];

#[derive(Debug, Copy, Clone)]
pub enum OutputFormat {
    Json,
    JsonSummary,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        return match s {
            "json" => Ok(Self::Json),
            "json-summ" => Ok(Self::JsonSummary),
            _ => Err(format!("invalid string: {}", s))
        };
    }
}

impl Default for OutputFormat {
  fn default() -> Self { OutputFormat::Json }
}

pub trait ScheduleOutput {
    fn write_json(&self, buf : impl io::Write) -> Result<()>;
    fn write_json_summary(&self, buf : impl io::Write) -> Result<()>;

    fn write(&self, buf : impl io::Write, output : OutputFormat) -> Result<()> {
        match output {
            OutputFormat::JsonSummary => self.write_json_summary(buf)?,
            OutputFormat::Json => self.write_json(buf)?,
        };
        Ok(())
    }
}

/// A solved instance, ready to be written out.
pub struct Report<'a> {
    pub instance: &'a ShuttleInstance,
    pub schedule: &'a Schedule,
}

impl<'a> ScheduleOutput for Report<'a> {
    fn write_json(&self, buf: impl io::Write) -> Result<()> {
        write_schedule(self.instance, self.schedule, buf)
    }

    fn write_json_summary(&self, mut buf: impl io::Write) -> Result<()> {
        let mut root = summarize(self.instance, self.schedule).to_json();
        root["status"] = self.schedule.status.as_str().into();
        root["objective"] = match self.schedule.objective {
            Some(x) => x.into(),
            None => json::JsonValue::Null,
        };
        root.write_pretty(&mut buf, 2)?;
        writeln!(buf)?;
        Ok(())
    }
}

pub fn output_report(options: &OutputOptions, path: &PathBuf, report: impl ScheduleOutput) -> Result<()> {
  if options.stdout {
    report.write(std::io::stdout(), options.fmt)?;
  } else {
    let writer = std::io::BufWriter::new(std::fs::File::create(path)?);
    report.write(writer, options.fmt)?;
  }
  Ok(())
}
