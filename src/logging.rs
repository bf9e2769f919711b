//! Structured log handlers.
//!
//! Two sinks behind the `log` facade: a machine readable JSON handler for
//! production and a human readable, colored handler for development. On top
//! of them sits the error path: [log_error] unwraps error chains and
//! multi-reason [ErrorReport]s into one record each.
//!
//! Logging never cascades: sink write failures are swallowed.

use crate::util::unwrap_poison;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::io::Write;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// Internal error type carrying a message, a list of typed reasons and an
/// optional stack trace. Each reason produces its own log record.
pub struct ErrorReport {
  message: String,
  reasons: Vec<serde_json::Value>,
  trace: Option<String>,
}

impl ErrorReport {
  pub fn new(message: impl ToString) -> ErrorReport {
    ErrorReport { message: message.to_string(), reasons: Vec::new(), trace: None }
  }

  /// Captures the current stack trace into the report. Without the
  /// `backtrace` feature this records nothing.
  pub fn capture(message: impl ToString) -> ErrorReport {
    let report = ErrorReport::new(message);
    #[cfg(feature = "backtrace")]
    {
      let mut report = report;
      report.trace = Some(format!("{:?}", backtrace::Backtrace::new()));
      report
    }
    #[cfg(not(feature = "backtrace"))]
    report
  }

  /// Adds a typed reason. Reasons log as individual records.
  pub fn with_reason(mut self, reason: serde_json::Value) -> ErrorReport {
    self.reasons.push(reason);
    self
  }

  pub fn message(&self) -> &str {
    self.message.as_str()
  }

  pub fn reasons(&self) -> &[serde_json::Value] {
    self.reasons.as_slice()
  }

  pub fn trace(&self) -> Option<&str> {
    self.trace.as_deref()
  }
}

impl Display for ErrorReport {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.message.as_str())
  }
}

impl Debug for ErrorReport {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.write_fmt(format_args!("ErrorReport({}, {} reasons)", self.message, self.reasons.len()))
  }
}

impl Error for ErrorReport {}

/// Logs an error. Chained errors (via [Error::source]) produce one record
/// per link. An [ErrorReport] produces one record per reason, each carrying
/// the report's trace as a structured `trace` attribute; outside of debug
/// mode a `reason` attribute with the reason's typed value is attached as
/// well, so production logs keep the machine readable form.
pub fn log_error(err: &crate::petrel_error::PetrelError, debug: bool) {
  use crate::petrel_error::PetrelError;

  if let PetrelError::Report(report) = err {
    if report.reasons.is_empty() {
      emit_error_record(report.message(), report.trace());
      return;
    }

    for reason in report.reasons() {
      let text = match reason.as_str() {
        Some(text) => text.to_string(),
        None => reason.to_string(),
      };

      match (report.trace(), debug) {
        (Some(trace), false) => {
          log::error!(trace = trace, reason:serde = reason; "{}", text)
        }
        (Some(trace), true) => log::error!(trace = trace; "{}", text),
        (None, false) => log::error!(reason:serde = reason; "{}", text),
        (None, true) => log::error!("{}", text),
      }
    }
    return;
  }

  emit_error_record(&err.to_string(), None);

  let source: Option<&(dyn Error + 'static)> = match err {
    PetrelError::IO(inner) => inner.source(),
    PetrelError::Other(inner) => inner.source(),
    _ => None,
  };

  let mut current = source;
  while let Some(cause) = current {
    emit_error_record(&cause.to_string(), None);
    current = cause.source();
  }
}

fn emit_error_record(message: &str, trace: Option<&str>) {
  match trace {
    Some(trace) => log::error!(trace = trace; "{}", message),
    None => log::error!("{}", message),
  }
}

// Civil from days algorithm, Howard Hinnant's date paper.
fn civil_from_days(z: i64) -> (i64, u32, u32) {
  let z = z + 719_468;
  let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
  let doe = z - era * 146_097;
  let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
  let y = yoe + era * 400;
  let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
  let mp = (5 * doy + 2) / 153;
  let d = (doy - (153 * mp + 2) / 5 + 1) as u32;
  let m = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
  (if m <= 2 { y + 1 } else { y }, m, d)
}

/// UTC wall-clock timestamp, RFC 3339 with millisecond precision.
fn format_timestamp(now: SystemTime) -> String {
  let since_epoch = now.duration_since(UNIX_EPOCH).unwrap_or_default();
  let secs = since_epoch.as_secs() as i64;
  let millis = since_epoch.subsec_millis();

  let days = secs.div_euclid(86_400);
  let in_day = secs.rem_euclid(86_400);
  let (year, month, day) = civil_from_days(days);

  format!(
    "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}.{:03}Z",
    year,
    month,
    day,
    in_day / 3600,
    (in_day / 60) % 60,
    in_day % 60,
    millis
  )
}

/// Machine readable JSON records, one object per line.
pub struct JsonLogHandler {
  sink: Mutex<Box<dyn Write + Send>>,
  level: log::LevelFilter,
}

impl JsonLogHandler {
  pub fn new(sink: Box<dyn Write + Send>, level: log::LevelFilter) -> JsonLogHandler {
    JsonLogHandler { sink: Mutex::new(sink), level }
  }

  pub fn stderr(level: log::LevelFilter) -> JsonLogHandler {
    JsonLogHandler::new(Box::new(std::io::stderr()), level)
  }
}

impl log::Log for JsonLogHandler {
  fn enabled(&self, metadata: &log::Metadata<'_>) -> bool {
    metadata.level() <= self.level
  }

  fn log(&self, record: &log::Record<'_>) {
    if !self.enabled(record.metadata()) {
      return;
    }

    let mut entry = serde_json::Map::new();
    entry.insert("time".to_string(), serde_json::json!(format_timestamp(SystemTime::now())));
    entry.insert("level".to_string(), serde_json::json!(record.level().to_string()));
    entry.insert("msg".to_string(), serde_json::json!(record.args().to_string()));
    entry.insert(
      "source".to_string(),
      serde_json::json!({
        "file": record.file(),
        "line": record.line(),
        "module": record.module_path(),
      }),
    );
    // Structured attributes (trace, reason, ...) become top level keys.
    record.key_values().visit(&mut JsonFields(&mut entry)).ok();

    if let Ok(mut sink) = unwrap_poison(self.sink.lock()) {
      writeln!(sink, "{}", serde_json::Value::Object(entry)).ok();
    }
  }

  fn flush(&self) {
    if let Ok(mut sink) = unwrap_poison(self.sink.lock()) {
      sink.flush().ok();
    }
  }
}

/// Collects a record's key/value pairs into a JSON object, keeping the
/// typed form where the value serialises.
struct JsonFields<'a>(&'a mut serde_json::Map<String, serde_json::Value>);

impl<'kvs> log::kv::VisitSource<'kvs> for JsonFields<'_> {
  fn visit_pair(
    &mut self,
    key: log::kv::Key<'kvs>,
    value: log::kv::Value<'kvs>,
  ) -> Result<(), log::kv::Error> {
    let json = serde_json::to_value(&value)
      .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
    self.0.insert(key.to_string(), json);
    Ok(())
  }
}

/// Renders a record's key/value pairs as ` key=value` suffixes.
struct PrettyFields(String);

impl<'kvs> log::kv::VisitSource<'kvs> for PrettyFields {
  fn visit_pair(
    &mut self,
    key: log::kv::Key<'kvs>,
    value: log::kv::Value<'kvs>,
  ) -> Result<(), log::kv::Error> {
    self.0.push_str(&format!(" {}={}", key, value));
    Ok(())
  }
}

/// Human readable, level-colored records for development.
pub struct PrettyLogHandler {
  sink: Mutex<Box<dyn Write + Send>>,
  level: log::LevelFilter,
  color: bool,
}

impl PrettyLogHandler {
  pub fn new(sink: Box<dyn Write + Send>, level: log::LevelFilter, color: bool) -> PrettyLogHandler {
    PrettyLogHandler { sink: Mutex::new(sink), level, color }
  }

  pub fn stderr(level: log::LevelFilter) -> PrettyLogHandler {
    PrettyLogHandler::new(Box::new(std::io::stderr()), level, true)
  }

  fn level_tag(&self, level: log::Level) -> String {
    if !self.color {
      return format!("{:5}", level);
    }

    let color = match level {
      log::Level::Error => "31",
      log::Level::Warn => "33",
      log::Level::Info => "32",
      log::Level::Debug => "36",
      log::Level::Trace => "35",
    };
    format!("\x1b[{}m{:5}\x1b[0m", color, level)
  }
}

impl log::Log for PrettyLogHandler {
  fn enabled(&self, metadata: &log::Metadata<'_>) -> bool {
    metadata.level() <= self.level
  }

  fn log(&self, record: &log::Record<'_>) {
    if !self.enabled(record.metadata()) {
      return;
    }

    let source = match (record.file(), record.line()) {
      (Some(file), Some(line)) => format!("{}:{}", file, line),
      _ => record.module_path().unwrap_or("?").to_string(),
    };

    let message = record.args().to_string();
    let mut lines = message.lines();
    let first = lines.next().unwrap_or("");

    let mut fields = PrettyFields(String::new());
    record.key_values().visit(&mut fields).ok();

    if let Ok(mut sink) = unwrap_poison(self.sink.lock()) {
      writeln!(
        sink,
        "{} {} {} | {}{}",
        format_timestamp(SystemTime::now()),
        self.level_tag(record.level()),
        source,
        first,
        fields.0
      )
      .ok();
      for continuation in lines {
        writeln!(sink, "    {}", continuation).ok();
      }
    }
  }

  fn flush(&self) {
    if let Ok(mut sink) = unwrap_poison(self.sink.lock()) {
      sink.flush().ok();
    }
  }
}

/// Installs the JSON handler as the process-wide logger.
pub fn init_json(level: log::LevelFilter) -> Result<(), log::SetLoggerError> {
  log::set_boxed_logger(Box::new(JsonLogHandler::stderr(level)))?;
  log::set_max_level(level);
  Ok(())
}

/// Installs the pretty handler as the process-wide logger.
pub fn init_pretty(level: log::LevelFilter) -> Result<(), log::SetLoggerError> {
  log::set_boxed_logger(Box::new(PrettyLogHandler::stderr(level)))?;
  log::set_max_level(level);
  Ok(())
}
