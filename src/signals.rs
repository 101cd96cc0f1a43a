//! POSIX signal routing.
//!
//! A static schema of routable signals is built once per process, with
//! platform-conditional entries dropped at build time. Each daemon keeps
//! an override map on top of that schema; at start every entry is
//! installed with the OS. The default handler implements graceful
//! shutdown on termination and child reaping, and logs everything else.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use libc::c_int;

use crate::error::{DaemonError, DaemonResult};
use crate::log::{interpolate, LogArg, LogLevel, Logger};
use crate::pidfile::PidFile;
use crate::sys;

pub(crate) struct SignalDef {
    pub name: &'static str,
    pub number: c_int,
}

// SIGKILL, SIGSTOP, SIGILL, SIGFPE and SIGSEGV are not routable through
// handler registration and are deliberately absent.
fn candidates() -> Vec<(&'static str, c_int)> {
    let mut signals = vec![
        ("SIGHUP", libc::SIGHUP),
        ("SIGINT", libc::SIGINT),
        ("SIGQUIT", libc::SIGQUIT),
        ("SIGTRAP", libc::SIGTRAP),
        ("SIGABRT", libc::SIGABRT),
        ("SIGBUS", libc::SIGBUS),
        ("SIGUSR1", libc::SIGUSR1),
        ("SIGUSR2", libc::SIGUSR2),
        ("SIGPIPE", libc::SIGPIPE),
        ("SIGALRM", libc::SIGALRM),
        ("SIGTERM", libc::SIGTERM),
        ("SIGCHLD", libc::SIGCHLD),
        ("SIGCONT", libc::SIGCONT),
        ("SIGTSTP", libc::SIGTSTP),
        ("SIGTTIN", libc::SIGTTIN),
        ("SIGTTOU", libc::SIGTTOU),
        ("SIGURG", libc::SIGURG),
        ("SIGXCPU", libc::SIGXCPU),
        ("SIGXFSZ", libc::SIGXFSZ),
        ("SIGVTALRM", libc::SIGVTALRM),
        ("SIGPROF", libc::SIGPROF),
        ("SIGWINCH", libc::SIGWINCH),
        ("SIGIO", libc::SIGIO),
        ("SIGSYS", libc::SIGSYS),
    ];
    #[cfg(any(target_os = "linux", target_os = "android"))]
    {
        signals.push(("SIGSTKFLT", libc::SIGSTKFLT));
        signals.push(("SIGPWR", libc::SIGPWR));
    }
    signals
}

/// The routable-signal schema for this platform. Built once, immutable.
pub(crate) fn signal_table() -> &'static [SignalDef] {
    static TABLE: OnceLock<Vec<SignalDef>> = OnceLock::new();
    TABLE.get_or_init(|| {
        candidates()
            .into_iter()
            .map(|(name, number)| SignalDef { name, number })
            .collect()
    })
}

pub(crate) fn allowed_names() -> String {
    let names: Vec<&str> = signal_table().iter().map(|def| def.name).collect();
    names.join(", ")
}

/// A signal given by name (`"SIGTERM"`) or by number.
#[derive(Debug, Clone)]
pub enum SignalRef {
    Name(String),
    Number(c_int),
}

impl From<&str> for SignalRef {
    fn from(name: &str) -> Self {
        SignalRef::Name(name.to_owned())
    }
}

impl From<c_int> for SignalRef {
    fn from(number: c_int) -> Self {
        SignalRef::Number(number)
    }
}

pub(crate) fn resolve(signal: &SignalRef) -> Option<&'static SignalDef> {
    signal_table().iter().find(|def| match signal {
        SignalRef::Name(name) => def.name == name,
        SignalRef::Number(number) => def.number == *number,
    })
}

/// What to do when a signal arrives.
#[derive(Clone)]
pub enum SigAction {
    /// Route to the built-in handler (shutdown, reap, or log).
    Default,
    /// Ignore the signal entirely.
    Ignore,
    /// Restore the OS disposition.
    OsDefault,
    /// A caller-supplied handler, invoked with the signal number.
    Handler(Arc<dyn Fn(c_int) + Send + Sync>),
}

/// Per-daemon signal dispositions, seeded from the static schema.
pub(crate) struct SignalTable {
    actions: BTreeMap<c_int, SigAction>,
}

impl SignalTable {
    pub(crate) fn new() -> Self {
        let mut actions = BTreeMap::new();
        for def in signal_table() {
            let action = if def.number == libc::SIGPIPE {
                SigAction::Ignore
            } else {
                SigAction::Default
            };
            actions.insert(def.number, action);
        }
        SignalTable { actions }
    }

    /// Overrules the disposition for one signal. Only signals present in
    /// the static schema may be overruled.
    pub(crate) fn set(&mut self, signal: &SignalRef, action: SigAction) -> Result<(), String> {
        match resolve(signal) {
            Some(def) => {
                self.actions.insert(def.number, action);
                Ok(())
            }
            None => Err(format!(
                "can only overrule one of these signal handlers: {}",
                allowed_names()
            )),
        }
    }

    #[cfg(test)]
    pub(crate) fn action(&self, number: c_int) -> Option<&SigAction> {
        self.actions.get(&number)
    }

    /// Installs every disposition with the OS signal facility.
    pub(crate) fn install(&self, ctx: Arc<RouterContext>) -> DaemonResult<()> {
        for (&signal, action) in &self.actions {
            match action {
                SigAction::Ignore => disposition(signal, libc::SIG_IGN)?,
                SigAction::OsDefault => disposition(signal, libc::SIG_DFL)?,
                SigAction::Handler(handler) => {
                    let handler = handler.clone();
                    register(signal, move || (*handler)(signal))?;
                }
                SigAction::Default => {
                    let ctx = ctx.clone();
                    register(signal, move || ctx.dispatch(signal))?;
                }
            }
        }
        Ok(())
    }
}

fn disposition(signal: c_int, disposition: libc::sighandler_t) -> DaemonResult<()> {
    if unsafe { libc::signal(signal, disposition) } == libc::SIG_ERR {
        return Err(DaemonError::Signal(format!(
            "unable to set disposition for signal {}",
            signal
        )));
    }
    Ok(())
}

fn register<F>(signal: c_int, action: F) -> DaemonResult<()>
where
    F: Fn() + Sync + Send + 'static,
{
    // SAFETY: installed handlers restrict themselves to flag stores,
    // unlink, kill, waitpid, nanosleep and _exit.
    unsafe { signal_hook::low_level::register(signal, action) }
        .map(|_| ())
        .map_err(|e| {
            DaemonError::Signal(format!("unable to reroute signal handler {}: {}", signal, e))
        })
}

/// Everything the default handler may touch from signal context: the
/// shared dying flag, the pid file, and a frozen logging snapshot.
pub(crate) struct RouterContext {
    pub(crate) dying: Arc<AtomicBool>,
    pub(crate) pid_file: PidFile,
    pub(crate) logger: Logger,
}

impl RouterContext {
    fn in_background(&self) -> bool {
        self.pid_file
            .read()
            .map(sys::process_alive)
            .unwrap_or(false)
    }

    fn log(&self, level: LogLevel, format: &str, args: &[LogArg]) {
        let message = interpolate(format, args);
        let _ = self
            .logger
            .write(level, &message, None, None, !self.in_background());
    }

    /// The built-in signal handler.
    pub(crate) fn dispatch(&self, signal: c_int) {
        self.log(
            LogLevel::Debug,
            "Received signal: %s",
            &[LogArg::from(signal)],
        );
        match signal {
            libc::SIGTERM => {
                if self.in_background() {
                    self.shutdown();
                } else {
                    signal_hook::low_level::exit(0);
                }
            }
            libc::SIGHUP => {
                // Hook point for configuration reload.
                self.log(LogLevel::Debug, "Received signal: restart", &[]);
            }
            libc::SIGCHLD => {
                // Reap every terminated child so zombies cannot pile up.
                while sys::wait_any_nohang() > 0 {
                    std::thread::sleep(Duration::from_millis(1));
                }
            }
            _ => {}
        }
    }

    fn shutdown(&self) {
        if self.dying.swap(true, Ordering::SeqCst) {
            return;
        }
        let pid = self.pid_file.read();
        let _ = self.pid_file.remove();
        if let Some(pid) = pid {
            let _ = sys::kill(pid, libc::SIGKILL);
        }
        signal_hook::low_level::exit(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_resolves_names_and_numbers_consistently() {
        let by_name = resolve(&SignalRef::from("SIGTERM")).unwrap();
        let by_number = resolve(&SignalRef::from(libc::SIGTERM)).unwrap();
        assert_eq!(by_name.number, libc::SIGTERM);
        assert_eq!(by_number.name, "SIGTERM");
    }

    #[test]
    fn unknown_signals_are_rejected_with_the_allowed_set() {
        let mut table = SignalTable::new();
        let err = table
            .set(&SignalRef::from("SIGNOPE"), SigAction::Ignore)
            .unwrap_err();
        assert!(err.contains("SIGTERM"));
        assert!(err.contains("SIGHUP"));
    }

    #[test]
    fn sigpipe_defaults_to_ignore() {
        let table = SignalTable::new();
        assert!(matches!(
            table.action(libc::SIGPIPE),
            Some(SigAction::Ignore)
        ));
        assert!(matches!(
            table.action(libc::SIGTERM),
            Some(SigAction::Default)
        ));
    }

    #[test]
    fn overruling_a_known_signal_sticks() {
        let mut table = SignalTable::new();
        table
            .set(&SignalRef::from("SIGUSR1"), SigAction::Ignore)
            .unwrap();
        assert!(matches!(
            table.action(libc::SIGUSR1),
            Some(SigAction::Ignore)
        ));
    }
}
