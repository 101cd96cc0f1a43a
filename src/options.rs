//! Option schema and per-daemon option storage.
//!
//! The registry is an immutable, process-wide description of every
//! recognized configuration key. Each daemon owns one [`OptionStore`]
//! holding the resolved values for its instance. Defaults may reference
//! other options or the server environment through `{OPTIONS.key}` and
//! `{SERVER.key}` placeholders, resolved during the full init pass.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use crate::log::LogLevel;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OptionKind {
    Bool,
    Int,
    Str,
    /// A log level, accepted as a number 0..=7 or a level name.
    Level,
}

/// A resolved configuration value.
#[derive(Debug, Clone, PartialEq)]
pub enum OptionValue {
    Bool(bool),
    Int(i64),
    Str(String),
}

impl OptionValue {
    pub fn as_bool(&self) -> bool {
        match self {
            OptionValue::Bool(b) => *b,
            OptionValue::Int(i) => *i != 0,
            OptionValue::Str(s) => matches!(s.as_str(), "1" | "true" | "yes" | "on"),
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            OptionValue::Int(i) => Some(*i),
            OptionValue::Bool(b) => Some(*b as i64),
            OptionValue::Str(s) => s.trim().parse().ok(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            OptionValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionValue::Bool(b) => write!(f, "{}", b),
            OptionValue::Int(i) => write!(f, "{}", i),
            OptionValue::Str(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for OptionValue {
    fn from(s: &str) -> Self {
        OptionValue::Str(s.to_owned())
    }
}

impl From<String> for OptionValue {
    fn from(s: String) -> Self {
        OptionValue::Str(s)
    }
}

impl From<bool> for OptionValue {
    fn from(b: bool) -> Self {
        OptionValue::Bool(b)
    }
}

impl From<i64> for OptionValue {
    fn from(i: i64) -> Self {
        OptionValue::Int(i)
    }
}

impl From<i32> for OptionValue {
    fn from(i: i32) -> Self {
        OptionValue::Int(i as i64)
    }
}

impl From<u32> for OptionValue {
    fn from(i: u32) -> Self {
        OptionValue::Int(i as i64)
    }
}

/// Schema default for one option. Templated defaults are resolved
/// during the full init pass only.
#[derive(Debug, Clone, Copy)]
pub(crate) enum OptionDefault {
    None,
    Bool(bool),
    Int(i64),
    Str(&'static str),
    Template(&'static str),
    /// Directory of the invoking executable.
    ScriptDir,
    /// File name of the invoking executable.
    ScriptName,
}

pub(crate) struct OptionDefinition {
    pub key: &'static str,
    pub kind: OptionKind,
    pub default: OptionDefault,
    pub required: bool,
    #[allow(dead_code)]
    pub summary: &'static str,
}

/// The process-wide option schema. Defined once, never mutated.
pub(crate) static REGISTRY: &[OptionDefinition] = &[
    OptionDefinition {
        key: "appName",
        kind: OptionKind::Str,
        default: OptionDefault::None,
        required: true,
        summary: "The application name, lowercase and at most 16 characters",
    },
    OptionDefinition {
        key: "appDescription",
        kind: OptionKind::Str,
        default: OptionDefault::None,
        required: false,
        summary: "Daemon description",
    },
    OptionDefinition {
        key: "appDir",
        kind: OptionKind::Str,
        default: OptionDefault::ScriptDir,
        required: true,
        summary: "The home directory of the daemon",
    },
    OptionDefinition {
        key: "appExecutable",
        kind: OptionKind::Str,
        default: OptionDefault::ScriptName,
        required: true,
        summary: "The executable daemon file",
    },
    OptionDefinition {
        key: "logVerbosity",
        kind: OptionKind::Level,
        default: OptionDefault::Int(LogLevel::Err as i64),
        required: true,
        summary: "Messages below this log level are ignored",
    },
    OptionDefinition {
        key: "logLocation",
        kind: OptionKind::Str,
        default: OptionDefault::Template("/var/log/{OPTIONS.appName}.log"),
        required: false,
        summary: "The log filepath",
    },
    OptionDefinition {
        key: "logFilePosition",
        kind: OptionKind::Bool,
        default: OptionDefault::Bool(false),
        required: true,
        summary: "Show the file in which the log message was generated",
    },
    OptionDefinition {
        key: "logTrimAppDir",
        kind: OptionKind::Bool,
        default: OptionDefault::Bool(true),
        required: true,
        summary: "Strip the application dir from file positions in log messages",
    },
    OptionDefinition {
        key: "logLinePosition",
        kind: OptionKind::Bool,
        default: OptionDefault::Bool(true),
        required: true,
        summary: "Show the line number in which the log message was generated",
    },
    OptionDefinition {
        key: "appUser",
        kind: OptionKind::Str,
        default: OptionDefault::Str("root"),
        required: false,
        summary: "The user name under which to run the process",
    },
    OptionDefinition {
        key: "appGroup",
        kind: OptionKind::Str,
        default: OptionDefault::Str("root"),
        required: false,
        summary: "The group name under which to run the process",
    },
    OptionDefinition {
        key: "appRunAsUID",
        kind: OptionKind::Int,
        default: OptionDefault::Int(0),
        required: true,
        summary: "The user id under which to run the process",
    },
    OptionDefinition {
        key: "appRunAsGID",
        kind: OptionKind::Int,
        default: OptionDefault::Int(0),
        required: true,
        summary: "The group id under which to run the process",
    },
    OptionDefinition {
        key: "appPidLocation",
        kind: OptionKind::Str,
        default: OptionDefault::Template("/var/run/{OPTIONS.appName}/{OPTIONS.appName}.pid"),
        required: true,
        summary: "The pid filepath, in its own per-app subdirectory",
    },
    OptionDefinition {
        key: "appDieOnIdentityCrisis",
        kind: OptionKind::Bool,
        default: OptionDefault::Bool(true),
        required: true,
        summary: "Kill the daemon if it cannot assume the configured identity",
    },
];

/// Replaces `{token}` placeholders via `lookup`. Unresolvable tokens are
/// kept verbatim and reported back to the caller.
fn substitute<F>(text: &str, mut lookup: F) -> (String, Vec<String>)
where
    F: FnMut(&str) -> Option<String>,
{
    let mut out = String::with_capacity(text.len());
    let mut missing = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        match after.find(['{', '}']) {
            Some(end) if after.as_bytes()[end] == b'}' && end > 0 => {
                let token = &after[..end];
                match lookup(token) {
                    Some(value) => out.push_str(&value),
                    None => {
                        missing.push(token.to_string());
                        out.push('{');
                        out.push_str(token);
                        out.push('}');
                    }
                }
                rest = &after[end + 1..];
            }
            _ => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    (out, missing)
}

/// `{SERVER.*}` lookup against the process environment. `SCRIPT_NAME`
/// maps to the invoking executable, everything else to an env var.
fn server_var(name: &str) -> Option<String> {
    if name == "SCRIPT_NAME" {
        return script_path().map(|p| p.display().to_string());
    }
    std::env::var(name).ok()
}

fn script_path() -> Option<PathBuf> {
    std::env::current_exe()
        .ok()
        .or_else(|| std::env::args().next().map(PathBuf::from))
}

fn script_dir() -> Option<String> {
    script_path()
        .as_deref()
        .and_then(|p| p.parent())
        .map(|p| p.display().to_string())
}

fn script_name() -> Option<String> {
    script_path()
        .as_deref()
        .and_then(|p| p.file_name())
        .map(|n| n.to_string_lossy().into_owned())
}

/// Resolved option values for one daemon instance.
pub(crate) struct OptionStore {
    definitions: &'static [OptionDefinition],
    values: HashMap<String, OptionValue>,
    errors: Vec<String>,
}

impl OptionStore {
    pub(crate) fn new(definitions: &'static [OptionDefinition]) -> Self {
        OptionStore {
            definitions,
            values: HashMap::new(),
            errors: Vec::new(),
        }
    }

    /// Initializes unset options from their schema defaults.
    ///
    /// The premature pass populates only directly-defaulted options so
    /// that logging works before full validation. The full pass resolves
    /// templated defaults and accumulates an error for every required
    /// option left without a resolvable value.
    pub(crate) fn init(&mut self, premature: bool) -> bool {
        if premature {
            for def in self.definitions {
                if self.values.contains_key(def.key) {
                    continue;
                }
                let value = match def.default {
                    OptionDefault::Bool(b) => OptionValue::Bool(b),
                    OptionDefault::Int(i) => OptionValue::Int(i),
                    OptionDefault::Str(s) => OptionValue::Str(s.to_owned()),
                    _ => continue,
                };
                self.values.insert(def.key.to_owned(), value);
            }
            return true;
        }

        self.errors.clear();
        for def in self.definitions {
            if self.values.contains_key(def.key) {
                continue;
            }
            let mut visiting = Vec::new();
            if let Err(err) = self.resolve_key(def.key, &mut visiting) {
                if def.required {
                    self.errors.push(err);
                }
            }
        }
        self.errors.is_empty()
    }

    pub(crate) fn errors(&self) -> &[String] {
        &self.errors
    }

    /// Sets a single option, validating the key against the schema and
    /// coercing the value to the declared kind.
    pub(crate) fn set(&mut self, name: &str, value: OptionValue) -> bool {
        let Some(def) = self.definitions.iter().find(|d| d.key == name) else {
            return false;
        };
        match coerce(&value, def.kind) {
            Some(value) => {
                self.values.insert(name.to_owned(), value);
                true
            }
            None => false,
        }
    }

    pub(crate) fn set_many(&mut self, values: HashMap<String, OptionValue>) -> bool {
        let mut ok = true;
        for (name, value) in values {
            ok &= self.set(&name, value);
        }
        ok
    }

    /// `None` is the defined not-found signal for unknown keys.
    pub(crate) fn get(&self, name: &str) -> Option<&OptionValue> {
        self.values.get(name)
    }

    pub(crate) fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(|v| v.as_str())
    }

    pub(crate) fn get_bool(&self, name: &str) -> bool {
        self.get(name).map(|v| v.as_bool()).unwrap_or(false)
    }

    pub(crate) fn get_int(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(|v| v.as_int())
    }

    /// Expands `{placeholder}` tokens against the live store and the
    /// server environment. Unknown tokens are left intact; this runs in
    /// the logging path where failing is not an option.
    pub(crate) fn expand(&self, text: &str) -> String {
        let (out, _) = substitute(text, |token| {
            if let Some(name) = token.strip_prefix("SERVER.") {
                return server_var(name);
            }
            let key = token.strip_prefix("OPTIONS.").unwrap_or(token);
            self.get(key).map(|v| v.to_string())
        });
        out
    }

    /// Resolves one option from its default, recursing into referenced
    /// options. The visiting stack turns placeholder cycles into errors
    /// instead of unbounded recursion.
    fn resolve_key(&mut self, key: &str, visiting: &mut Vec<String>) -> Result<OptionValue, String> {
        if let Some(value) = self.values.get(key) {
            return Ok(value.clone());
        }
        let def = self
            .definitions
            .iter()
            .find(|d| d.key == key)
            .ok_or_else(|| format!("unknown option '{}' referenced from a placeholder", key))?;
        if visiting.iter().any(|k| k == key) {
            return Err(format!(
                "circular placeholder reference involving option '{}'",
                key
            ));
        }
        visiting.push(key.to_owned());
        let resolved = match def.default {
            OptionDefault::Bool(b) => Ok(OptionValue::Bool(b)),
            OptionDefault::Int(i) => Ok(OptionValue::Int(i)),
            OptionDefault::Str(s) => Ok(OptionValue::Str(s.to_owned())),
            OptionDefault::Template(template) => {
                self.resolve_template(template, visiting).map(OptionValue::Str)
            }
            OptionDefault::ScriptDir => script_dir()
                .map(OptionValue::Str)
                .ok_or_else(|| format!("cannot determine a default for option '{}'", key)),
            OptionDefault::ScriptName => script_name()
                .map(OptionValue::Str)
                .ok_or_else(|| format!("cannot determine a default for option '{}'", key)),
            OptionDefault::None => Err(format!("option '{}' is not set and has no default", key)),
        };
        visiting.pop();
        let value = resolved?;
        self.values.insert(key.to_owned(), value.clone());
        Ok(value)
    }

    fn resolve_template(
        &mut self,
        template: &str,
        visiting: &mut Vec<String>,
    ) -> Result<String, String> {
        let mut failure: Option<String> = None;
        let (out, _) = substitute(template, |token| {
            if failure.is_some() {
                return None;
            }
            let result = if let Some(name) = token.strip_prefix("SERVER.") {
                server_var(name)
                    .ok_or_else(|| format!("cannot resolve placeholder {{SERVER.{}}}", name))
            } else {
                let key = token.strip_prefix("OPTIONS.").unwrap_or(token);
                self.resolve_key(key, visiting).map(|v| v.to_string())
            };
            match result {
                Ok(value) => Some(value),
                Err(err) => {
                    failure = Some(err);
                    None
                }
            }
        });
        match failure {
            Some(err) => Err(err),
            None => Ok(out),
        }
    }
}

fn coerce(value: &OptionValue, kind: OptionKind) -> Option<OptionValue> {
    match (kind, value) {
        (OptionKind::Bool, OptionValue::Bool(_)) => Some(value.clone()),
        (OptionKind::Bool, OptionValue::Int(i)) => Some(OptionValue::Bool(*i != 0)),
        (OptionKind::Bool, OptionValue::Str(s)) => match s.as_str() {
            "1" | "true" | "yes" | "on" => Some(OptionValue::Bool(true)),
            "0" | "false" | "no" | "off" | "" => Some(OptionValue::Bool(false)),
            _ => None,
        },
        (OptionKind::Int, OptionValue::Int(_)) => Some(value.clone()),
        (OptionKind::Int, OptionValue::Str(s)) => {
            s.trim().parse().ok().map(OptionValue::Int)
        }
        (OptionKind::Str, OptionValue::Str(_)) => Some(value.clone()),
        (OptionKind::Str, OptionValue::Int(i)) => Some(OptionValue::Str(i.to_string())),
        (OptionKind::Level, OptionValue::Int(i)) => {
            LogLevel::from_number(*i).map(|_| OptionValue::Int(*i))
        }
        (OptionKind::Level, OptionValue::Str(s)) => match s.trim().parse::<i64>() {
            Ok(n) => LogLevel::from_number(n).map(|_| OptionValue::Int(n)),
            Err(_) => LogLevel::from_name(s).map(|l| OptionValue::Int(l as i64)),
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_app_name(name: &str) -> OptionStore {
        let mut store = OptionStore::new(REGISTRY);
        store.init(true);
        store.set("appName", OptionValue::from(name));
        store
    }

    #[test]
    fn premature_init_skips_templated_defaults() {
        let mut store = OptionStore::new(REGISTRY);
        store.init(true);
        assert!(store.get("logLocation").is_none());
        assert!(store.get("appPidLocation").is_none());
        assert!(store.get("appDir").is_none());
        assert_eq!(store.get_int("logVerbosity"), Some(LogLevel::Err as i64));
        assert!(store.get_bool("logTrimAppDir"));
    }

    #[test]
    fn full_init_resolves_every_placeholder() {
        let mut store = store_with_app_name("testd");
        assert!(store.init(false));
        assert_eq!(store.get_str("logLocation"), Some("/var/log/testd.log"));
        assert_eq!(
            store.get_str("appPidLocation"),
            Some("/var/run/testd/testd.pid")
        );
        for def in REGISTRY {
            if let Some(OptionValue::Str(s)) = store.get(def.key) {
                assert!(
                    !s.contains('{') && !s.contains('}'),
                    "option '{}' kept a placeholder: {}",
                    def.key,
                    s
                );
            }
        }
    }

    #[test]
    fn missing_required_options_accumulate_errors() {
        let mut store = OptionStore::new(REGISTRY);
        store.init(true);
        assert!(!store.init(false));
        assert!(store
            .errors()
            .iter()
            .any(|e| e.contains("appName")));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let mut store = store_with_app_name("testd");
        assert!(!store.set("noSuchOption", OptionValue::from(1)));
        assert!(store.get("noSuchOption").is_none());
    }

    #[test]
    fn verbosity_accepts_level_names() {
        let mut store = store_with_app_name("testd");
        assert!(store.set("logVerbosity", OptionValue::from("info")));
        assert_eq!(store.get_int("logVerbosity"), Some(6));
        assert!(!store.set("logVerbosity", OptionValue::from("loud")));
        assert!(!store.set("logVerbosity", OptionValue::from(9)));
    }

    #[test]
    fn placeholder_cycles_become_errors() {
        static CYCLIC: &[OptionDefinition] = &[
            OptionDefinition {
                key: "alpha",
                kind: OptionKind::Str,
                default: OptionDefault::Template("{OPTIONS.beta}"),
                required: true,
                summary: "",
            },
            OptionDefinition {
                key: "beta",
                kind: OptionKind::Str,
                default: OptionDefault::Template("{OPTIONS.alpha}"),
                required: true,
                summary: "",
            },
        ];
        let mut store = OptionStore::new(CYCLIC);
        assert!(!store.init(false));
        assert!(store.errors().iter().any(|e| e.contains("circular")));
    }

    #[test]
    fn expand_keeps_unknown_tokens() {
        let mut store = store_with_app_name("testd");
        store.init(false);
        assert_eq!(store.expand("starting {appName} now"), "starting testd now");
        assert_eq!(store.expand("left {unknownToken} alone"), "left {unknownToken} alone");
        assert_eq!(
            store.expand("pid at {appPidLocation}"),
            "pid at /var/run/testd/testd.pid"
        );
    }
}
