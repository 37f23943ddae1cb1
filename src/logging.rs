//! Log lines as `[YYYY-MM-DD HH:MM:SS] message {fields}` on stdout and in
//! an append-only file under the log directory.

use chrono::Local;
use serde_json::{Map, Number, Value};
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields, MakeWriter};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const LOG_FILE: &str = "vrbo_scout.log";

/// Render one log line; fields are omitted when there are none.
pub fn render_line(timestamp: &str, message: &str, fields: &Map<String, Value>) -> String {
    if fields.is_empty() {
        return format!("[{timestamp}] {message}");
    }
    let json = serde_json::to_string(fields).unwrap_or_default();
    format!("[{timestamp}] {message} {json}")
}

#[derive(Default)]
struct FieldCollector {
    message: String,
    fields: Map<String, Value>,
}

impl FieldCollector {
    fn insert(&mut self, field: &Field, value: Value) {
        self.fields.insert(field.name().to_string(), value);
    }
}

impl Visit for FieldCollector {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.insert(field, Value::String(value.to_string()));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        let number = Number::from_f64(value).map_or(Value::Null, Value::Number);
        self.insert(field, number);
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, Value::Bool(value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        let text = format!("{value:?}");
        if field.name() == "message" {
            self.message = text;
        } else {
            self.insert(field, Value::String(text));
        }
    }
}

/// Event formatter producing the line layout above, in local time
pub struct LineFormat;

impl<S, N> FormatEvent<S, N> for LineFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let mut collector = FieldCollector::default();
        event.record(&mut collector);
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        writeln!(
            writer,
            "{}",
            render_line(&timestamp, &collector.message, &collector.fields)
        )
    }
}

/// Appends to a file, dropping anything that cannot be written
pub struct AppendOnlyLog {
    path: PathBuf,
}

impl AppendOnlyLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

pub struct LogFileWriter(Option<File>);

impl Write for LogFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Some(file) = self.0.as_mut() {
            let _ = file.write_all(buf);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if let Some(file) = self.0.as_mut() {
            let _ = file.flush();
        }
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for AppendOnlyLog {
    type Writer = LogFileWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LogFileWriter(
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .ok(),
        )
    }
}

/// Install the global subscriber. `RUST_LOG` overrides the `info` default.
pub fn init(log_dir: &Path) {
    let _ = std::fs::create_dir_all(log_dir);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .event_format(LineFormat)
                .with_writer(io::stdout),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .event_format(LineFormat)
                .with_ansi(false)
                .with_writer(AppendOnlyLog::new(log_dir.join(LOG_FILE))),
        )
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn line_without_fields() {
        assert_eq!(
            render_line("2030-01-01 10:00:00", "Processing details", &Map::new()),
            "[2030-01-01 10:00:00] Processing details"
        );
    }

    #[test]
    fn line_with_fields_keeps_unicode() {
        let Value::Object(fields) = json!({"city": "Medellín", "pending": 3}) else {
            unreachable!()
        };
        assert_eq!(
            render_line("2030-01-01 10:00:00", "Processing city", &fields),
            r#"[2030-01-01 10:00:00] Processing city {"city":"Medellín","pending":3}"#
        );
    }

    #[test]
    fn unwritable_log_file_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        // A directory cannot be opened for appending.
        let log = AppendOnlyLog::new(dir.path());
        let mut writer = log.make_writer();
        assert_eq!(writer.write(b"line\n").unwrap(), 5);
        writer.flush().unwrap();
    }

    #[test]
    fn appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(LOG_FILE);
        let log = AppendOnlyLog::new(&path);
        log.make_writer().write_all(b"one\n").unwrap();
        log.make_writer().write_all(b"two\n").unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "one\ntwo\n");
    }
}
