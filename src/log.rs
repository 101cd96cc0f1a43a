//! The logging pipeline.
//!
//! One rendering path for every diagnostic the daemon emits: positional
//! argument substitution, `{placeholder}` expansion (done by the caller
//! against its option store), a timestamped line format, and a sink that
//! is either the built-in append-only file, a custom handler, or an
//! external backend supplied by the embedding application.

use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Local;

use crate::error::{DaemonError, DaemonResult};

/// Syslog-style severities. Lower numbers are more severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Emerg = 0,
    Alert = 1,
    Crit = 2,
    Err = 3,
    Warning = 4,
    Notice = 5,
    Info = 6,
    Debug = 7,
}

impl LogLevel {
    pub fn name(self) -> &'static str {
        match self {
            LogLevel::Emerg => "emerg",
            LogLevel::Alert => "alert",
            LogLevel::Crit => "crit",
            LogLevel::Err => "err",
            LogLevel::Warning => "warning",
            LogLevel::Notice => "notice",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        }
    }

    pub fn from_number(n: i64) -> Option<LogLevel> {
        match n {
            0 => Some(LogLevel::Emerg),
            1 => Some(LogLevel::Alert),
            2 => Some(LogLevel::Crit),
            3 => Some(LogLevel::Err),
            4 => Some(LogLevel::Warning),
            5 => Some(LogLevel::Notice),
            6 => Some(LogLevel::Info),
            7 => Some(LogLevel::Debug),
            _ => None,
        }
    }

    pub fn from_name(name: &str) -> Option<LogLevel> {
        match name.trim() {
            "emerg" => Some(LogLevel::Emerg),
            "alert" => Some(LogLevel::Alert),
            "crit" => Some(LogLevel::Crit),
            "err" => Some(LogLevel::Err),
            "warning" => Some(LogLevel::Warning),
            "notice" => Some(LogLevel::Notice),
            "info" => Some(LogLevel::Info),
            "debug" => Some(LogLevel::Debug),
            _ => None,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A positional argument for the level shortcuts, rendered through the
/// semantify rules before substitution into the format string.
#[derive(Debug, Clone)]
pub enum LogArg {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    /// Key/value pairs, rendered comma-joined with abbreviated values.
    List(Vec<(String, String)>),
    /// An opaque object, rendered as its type name.
    Object(&'static str),
}

impl LogArg {
    pub fn object(type_name: &'static str) -> Self {
        LogArg::Object(type_name)
    }
}

impl From<&str> for LogArg {
    fn from(s: &str) -> Self {
        LogArg::Str(s.to_owned())
    }
}

impl From<String> for LogArg {
    fn from(s: String) -> Self {
        LogArg::Str(s)
    }
}

impl From<i64> for LogArg {
    fn from(i: i64) -> Self {
        LogArg::Int(i)
    }
}

impl From<i32> for LogArg {
    fn from(i: i32) -> Self {
        LogArg::Int(i as i64)
    }
}

impl From<u32> for LogArg {
    fn from(i: u32) -> Self {
        LogArg::Int(i as i64)
    }
}

impl From<f64> for LogArg {
    fn from(f: f64) -> Self {
        LogArg::Float(f)
    }
}

impl From<bool> for LogArg {
    fn from(b: bool) -> Self {
        LogArg::Bool(b)
    }
}

impl From<Vec<(String, String)>> for LogArg {
    fn from(pairs: Vec<(String, String)>) -> Self {
        LogArg::List(pairs)
    }
}

const ABBR_LIMIT: usize = 30;

/// Abbreviates a long value, e.g. "Kevin van zonneveld" stays but a
/// longer string becomes "Kevin van zonneveld was h...".
pub(crate) fn abbr(s: &str) -> String {
    if s.chars().count() <= ABBR_LIMIT {
        return s.to_owned();
    }
    let keep: String = s.chars().take(ABBR_LIMIT - 3).collect();
    format!("{}...", keep)
}

fn numeric_like(s: &str) -> bool {
    s.parse::<f64>().is_ok()
}

fn bool_like(s: &str) -> bool {
    matches!(s, "true" | "false")
}

/// Renders the most significant information for any argument: objects
/// as their type name, lists as abbreviated `key: value` pairs, other
/// non-numeric, non-boolean values single-quoted.
pub(crate) fn semantify(arg: &LogArg) -> String {
    match arg {
        LogArg::Object(name) => (*name).to_owned(),
        LogArg::Int(i) => i.to_string(),
        LogArg::Float(f) => f.to_string(),
        LogArg::Bool(b) => b.to_string(),
        LogArg::Str(s) => format!("'{}'", s),
        LogArg::List(pairs) => {
            let rendered: Vec<String> = pairs
                .iter()
                .map(|(key, value)| {
                    let value = if numeric_like(value) || bool_like(value) {
                        value.clone()
                    } else {
                        format!("'{}'", value)
                    };
                    format!("{}: {}", key, abbr(&value))
                })
                .collect();
            rendered.join(", ")
        }
    }
}

/// Substitutes semantified arguments for successive `%s` markers.
/// Markers beyond the argument list are left in place.
pub(crate) fn interpolate(format: &str, args: &[LogArg]) -> String {
    let mut out = String::with_capacity(format.len());
    let mut args = args.iter();
    let mut rest = format;
    while let Some(pos) = rest.find("%s") {
        out.push_str(&rest[..pos]);
        match args.next() {
            Some(arg) => out.push_str(&semantify(arg)),
            None => out.push_str("%s"),
        }
        rest = &rest[pos + 2..];
    }
    out.push_str(rest);
    out
}

/// An external structured-log instance that replaces the built-in file
/// sink entirely. Receives the message with its source-location tail but
/// without the timestamp/level prefix.
pub trait LogBackend: Send + Sync {
    fn log(&self, message: &str, level: LogLevel);
}

/// A fully custom log callable, same contract as [`LogBackend`].
pub type LogHandler = Arc<dyn Fn(&str, LogLevel) + Send + Sync>;

#[derive(Clone)]
pub(crate) enum LogSink {
    Unconfigured,
    File(PathBuf),
    Handler(LogHandler),
    Backend(Arc<dyn LogBackend>),
}

/// A snapshot of everything one log write needs. Built by the daemon
/// from its live option store, and frozen into the signal-router
/// context so handlers can log without touching daemon state.
#[derive(Clone)]
pub(crate) struct Logger {
    pub(crate) verbosity: LogLevel,
    pub(crate) app_name: String,
    pub(crate) app_dir: Option<String>,
    pub(crate) show_file: bool,
    pub(crate) show_line: bool,
    pub(crate) trim_app_dir: bool,
    pub(crate) sink: LogSink,
}

impl Logger {
    /// Renders and delivers one record. Returns Ok(true) when the record
    /// was handled (including the nothing-to-do case of an over-threshold
    /// level), Ok(false) when the file write failed, and Err only when no
    /// destination is configured at all.
    pub(crate) fn write(
        &self,
        level: LogLevel,
        message: &str,
        file: Option<&str>,
        line: Option<u32>,
        echo_allowed: bool,
    ) -> DaemonResult<bool> {
        if self.app_name.is_empty() {
            // Not logging for anything without a name.
            return Ok(false);
        }
        if level > self.verbosity {
            return Ok(true);
        }

        let mut tail = String::new();
        if level < LogLevel::Notice {
            if self.show_file {
                if let Some(file) = file {
                    let file = match (&self.app_dir, self.trim_app_dir) {
                        (Some(dir), true) => file.strip_prefix(dir.as_str()).unwrap_or(file),
                        _ => file,
                    };
                    tail.push_str(&format!(" [f:{}]", file));
                }
            }
            if self.show_line {
                if let Some(line) = line {
                    tail.push_str(&format!(" [l:{}]", line));
                }
            }
        }

        match &self.sink {
            LogSink::Backend(backend) => {
                backend.log(&format!("{}{}", message, tail), level);
                return Ok(true);
            }
            LogSink::Handler(handler) => {
                (**handler)(&format!("{}{}", message, tail), level);
                return Ok(true);
            }
            _ => {}
        }

        let rendered = format!(
            "[{}] {:>8}: {}{}",
            Local::now().format("%b %d %H:%M:%S"),
            level.name(),
            message,
            tail
        );

        let non_debug = level < LogLevel::Debug;
        let mut echoed = false;
        if echo_allowed && non_debug {
            // Fine to echo while still attached to a terminal; the file
            // write below still happens for future reference.
            println!("{}", rendered);
            echoed = true;
        }

        let LogSink::File(path) = &self.sink else {
            return Err(DaemonError::Config(
                "no log destination configured: set logLocation or install a log handler".into(),
            ));
        };

        let existed = path.exists();
        let mut succeeded = true;
        match OpenOptions::new().append(true).create(true).open(path) {
            Ok(mut f) => {
                if !existed {
                    use std::os::unix::fs::PermissionsExt;
                    let _ = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o644));
                }
                if writeln!(f, "{}", rendered).is_err() {
                    succeeded = false;
                }
            }
            Err(_) => {
                succeeded = false;
                // Last resort when the logfile is out of reach.
                if non_debug && !echoed {
                    println!("{}", rendered);
                }
            }
        }
        Ok(succeeded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn file_logger(path: PathBuf, verbosity: LogLevel) -> Logger {
        Logger {
            verbosity,
            app_name: "testd".into(),
            app_dir: None,
            show_file: false,
            show_line: true,
            trim_app_dir: true,
            sink: LogSink::File(path),
        }
    }

    #[test]
    fn abbreviation_keeps_short_values() {
        assert_eq!(abbr("short"), "short");
        let long = "a".repeat(40);
        let cut = abbr(&long);
        assert_eq!(cut.len(), 30);
        assert!(cut.ends_with("..."));
    }

    #[test]
    fn semantify_quotes_plain_strings() {
        assert_eq!(semantify(&LogArg::from("hello")), "'hello'");
        assert_eq!(semantify(&LogArg::from(42)), "42");
        assert_eq!(semantify(&LogArg::from(true)), "true");
        assert_eq!(semantify(&LogArg::object("PidFile")), "PidFile");
    }

    #[test]
    fn semantify_joins_list_pairs() {
        let arg = LogArg::from(vec![
            ("count".to_string(), "3".to_string()),
            ("name".to_string(), "worker".to_string()),
        ]);
        assert_eq!(semantify(&arg), "count: 3, name: 'worker'");
    }

    #[test]
    fn interpolation_is_positional() {
        let out = interpolate(
            "pid %s for %s",
            &[LogArg::from(42u32), LogArg::from("testd")],
        );
        assert_eq!(out, "pid 42 for 'testd'");
        assert_eq!(interpolate("kept %s", &[]), "kept %s");
    }

    #[test]
    fn over_threshold_records_are_discarded_silently() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quiet.log");
        let logger = file_logger(path.clone(), LogLevel::Err);
        let out = logger
            .write(LogLevel::Info, "nothing to see", None, None, false)
            .unwrap();
        assert!(out);
        assert!(!path.exists());
    }

    #[test]
    fn file_sink_appends_formatted_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("testd.log");
        let logger = file_logger(path.clone(), LogLevel::Debug);
        assert!(logger
            .write(LogLevel::Info, "Starting testd daemon", None, None, false)
            .unwrap());
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with('['));
        assert!(contents.contains("    info: Starting testd daemon"));

        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o644);
    }

    #[test]
    fn source_location_tail_only_for_severe_levels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tail.log");
        let mut logger = file_logger(path.clone(), LogLevel::Debug);
        logger.show_file = true;
        logger.app_dir = Some("/srv/testd".into());

        logger
            .write(LogLevel::Err, "broken", Some("/srv/testd/src/main.rs"), Some(12), false)
            .unwrap();
        logger
            .write(LogLevel::Info, "fine", Some("/srv/testd/src/main.rs"), Some(13), false)
            .unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let mut lines = contents.lines();
        let severe = lines.next().unwrap();
        let mild = lines.next().unwrap();
        assert!(severe.contains(" [f:/src/main.rs] [l:12]"));
        assert!(!mild.contains("[f:"));
        assert!(!mild.contains("[l:"));
    }

    struct Capture(Mutex<Vec<(String, LogLevel)>>);

    impl LogBackend for Capture {
        fn log(&self, message: &str, level: LogLevel) {
            self.0.lock().unwrap().push((message.to_owned(), level));
        }
    }

    #[test]
    fn backend_sink_takes_over_before_rendering() {
        let capture = Arc::new(Capture(Mutex::new(Vec::new())));
        let logger = Logger {
            verbosity: LogLevel::Debug,
            app_name: "testd".into(),
            app_dir: None,
            show_file: false,
            show_line: false,
            trim_app_dir: false,
            sink: LogSink::Backend(capture.clone()),
        };
        assert!(logger
            .write(LogLevel::Warning, "delegated", None, None, false)
            .unwrap());
        let seen = capture.0.lock().unwrap();
        assert_eq!(seen.as_slice(), &[("delegated".to_owned(), LogLevel::Warning)]);
    }

    #[test]
    fn missing_destination_is_a_configuration_error() {
        let logger = Logger {
            verbosity: LogLevel::Debug,
            app_name: "testd".into(),
            app_dir: None,
            show_file: false,
            show_line: false,
            trim_app_dir: false,
            sink: LogSink::Unconfigured,
        };
        let err = logger.write(LogLevel::Info, "nowhere", None, None, false);
        assert!(matches!(err, Err(DaemonError::Config(_))));
    }
}
