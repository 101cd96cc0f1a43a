//! The process supervisor.
//!
//! [`WardenDaemon`] owns the fork, the pid file, the identity change and
//! the start/stop/restart state machine. It is constructed from a flat
//! configuration map (validated through the option store) and drives the
//! logging pipeline for all of its diagnostics.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::{Command, Stdio as ProcessStdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::error::{DaemonError, DaemonResult};
use crate::log::{interpolate, LogArg, LogBackend, LogHandler, LogLevel, LogSink, Logger};
use crate::options::{OptionStore, OptionValue, REGISTRY};
use crate::pidfile::PidFile;
use crate::signals::{RouterContext, SigAction, SignalRef, SignalTable};
use crate::stdio::Stdio;
use crate::sys;
use crate::types::{Group, User};

/// Lifecycle state of one supervised daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonState {
    NotStarted,
    Running,
    Dying,
    Stopped,
}

/// A supervised UNIX daemon.
///
/// Exactly one live instance may exist per configuration; the pid file
/// acts as the cross-process mutex. The existence-plus-liveness check is
/// a non-atomic check-then-act with an accepted race under concurrent
/// manual starts.
pub struct WardenDaemon {
    options: OptionStore,
    state: DaemonState,
    process_id: u32,
    dying: Arc<AtomicBool>,
    signals: SignalTable,
    log_handler: Option<LogHandler>,
    log_backend: Option<Arc<dyn LogBackend>>,
    stdin: Stdio,
    stdout: Stdio,
    stderr: Stdio,
    argv: Vec<String>,
}

impl std::fmt::Debug for WardenDaemon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WardenDaemon")
            .field("state", &self.state)
            .field("process_id", &self.process_id)
            .finish_non_exhaustive()
    }
}

impl WardenDaemon {
    /// Builds a daemon from a flat configuration map.
    ///
    /// Runs the premature option pass first so early diagnostics can be
    /// logged, then the full validation pass. Validation failures are
    /// collected, logged, and returned as one error.
    pub fn new(configs: HashMap<String, OptionValue>) -> DaemonResult<Self> {
        let mut options = OptionStore::new(REGISTRY);
        options.init(true);

        let mut daemon = WardenDaemon {
            options,
            state: DaemonState::NotStarted,
            process_id: 0,
            dying: Arc::new(AtomicBool::new(false)),
            signals: SignalTable::new(),
            log_handler: None,
            log_backend: None,
            stdin: Stdio::devnull(),
            stdout: Stdio::devnull(),
            stderr: Stdio::devnull(),
            argv: std::env::args().collect(),
        };
        daemon.set_options(configs);

        if !daemon.options.init(false) {
            let errors = daemon.options.errors().to_vec();
            for error in &errors {
                daemon.notice(error, &[]);
            }
            return Err(DaemonError::InvalidOptions(errors));
        }

        let app_name = daemon.options.get_str("appName").unwrap_or("").to_owned();
        if app_name != app_name.to_lowercase() {
            daemon.crit("Option: appName should be lowercase", &[]);
            return Err(DaemonError::Config("appName should be lowercase".into()));
        }
        if app_name.len() > 16 {
            daemon.crit("Option: appName should be no longer than 16 characters", &[]);
            return Err(DaemonError::Config(
                "appName should be no longer than 16 characters".into(),
            ));
        }

        Ok(daemon)
    }

    // --- Options ---

    /// Sets one option, validated against the schema.
    pub fn set_option(&mut self, name: &str, value: impl Into<OptionValue>) -> bool {
        self.options.set(name, value.into())
    }

    pub fn set_options(&mut self, configs: HashMap<String, OptionValue>) -> bool {
        self.options.set_many(configs)
    }

    /// `None` is the not-found signal for unknown keys.
    pub fn get_option(&self, name: &str) -> Option<OptionValue> {
        self.options.get(name).cloned()
    }

    // --- Collaborator hooks ---

    /// Replaces the built-in log sink with a custom callable.
    pub fn set_log_handler<F>(&mut self, handler: F)
    where
        F: Fn(&str, LogLevel) + Send + Sync + 'static,
    {
        self.log_handler = Some(Arc::new(handler));
    }

    /// Replaces the built-in log sink with an external log instance.
    pub fn set_log_backend(&mut self, backend: Arc<dyn LogBackend>) {
        self.log_backend = Some(backend);
    }

    pub fn set_stdin(&mut self, stdio: Stdio) {
        self.stdin = stdio;
    }

    pub fn set_stdout(&mut self, stdio: Stdio) {
        self.stdout = stdio;
    }

    pub fn set_stderr(&mut self, stdio: Stdio) {
        self.stderr = stdio;
    }

    /// Overrules the handler for one signal. Unknown signals are
    /// rejected and the allowed set is logged.
    pub fn set_sig_handler(&mut self, signal: impl Into<SignalRef>, action: SigAction) -> bool {
        let signal = signal.into();
        match self.signals.set(&signal, action) {
            Ok(()) => true,
            Err(message) => {
                self.notice(&message, &[]);
                false
            }
        }
    }

    // --- State ---

    pub fn state(&self) -> DaemonState {
        self.state
    }

    /// Whether the shutdown sequence has begun.
    pub fn is_dying(&self) -> bool {
        self.dying.load(Ordering::SeqCst)
    }

    /// Returns the live pid recorded in the pid file, after a zero-signal
    /// liveness probe. An orphaned pid file is removed as a side effect
    /// and a warning is logged.
    pub fn is_running(&mut self) -> Option<u32> {
        let pid_file = self.pid_file();
        if !pid_file.exists() {
            return None;
        }
        let pid = pid_file.read()?;
        if !sys::process_alive(pid) {
            let _ = pid_file.remove();
            self.warning(
                "Orphaned pidfile found and removed: {appPidLocation}. Previous process crashed?",
                &[],
            );
            return None;
        }
        Some(pid)
    }

    // --- Process control ---

    /// Spawns the daemon process.
    ///
    /// The parent branch of the fork exits without side effects. The
    /// child records its pid, writes the pid file, assumes the target
    /// identity, installs the signal handlers and moves to the app
    /// directory. Returns true only once all of that succeeded.
    pub fn start(&mut self) -> bool {
        self.summon()
    }

    /// Stops a running daemon, or notifies when there is nothing to do.
    pub fn stop(&mut self) {
        match self.is_running() {
            Some(pid) if !self.is_dying() => {
                self.info("Stopping {appName} [%s]", &[LogArg::from(pid)]);
                self.ddie(false, Some(pid));
            }
            Some(_) => {}
            None => {
                self.notice("{appName} daemon is not running", &[]);
            }
        }
    }

    /// Restarts the daemon by handing off to a freshly spawned detached
    /// process running the original invocation with `restart` rewritten
    /// to `start`.
    pub fn restart(&mut self) {
        let pid = self.pid_file().read();
        match pid {
            Some(pid) => self.info("Restarting {appName} [%s]", &[LogArg::from(pid)]),
            None => self.info("Restarting {appName}", &[]),
        };
        self.ddie(true, pid);
    }

    /// Cooperative tick for the caller's main loop. Optionally sleeps,
    /// then yields so pending signals get delivered and processed.
    pub fn iterate(&mut self, sleep_seconds: f64) -> bool {
        if sleep_seconds > 0.0 {
            thread::sleep(Duration::from_secs_f64(sleep_seconds));
        } else {
            thread::yield_now();
        }
        true
    }

    // --- Logging surface ---

    /// The single entry point of the logging pipeline.
    ///
    /// Over-threshold records are accepted and discarded. A record at
    /// the emergency level kills the current process after being logged.
    /// Err is returned only when no log destination is configured.
    pub fn log(
        &mut self,
        level: LogLevel,
        message: &str,
        file: Option<&str>,
        line: Option<u32>,
    ) -> DaemonResult<bool> {
        if self.options.get("logVerbosity").is_none() {
            // Somebody is logging before the daemon is fully set up.
            self.options.init(true);
        }
        let logger = self.logger();
        let echo_allowed = !self.is_in_background();
        let result = logger.write(level, message, file, line, echo_allowed);
        if level == LogLevel::Emerg {
            self.ddie(false, None);
        }
        result
    }

    #[track_caller]
    pub fn emerg(&mut self, format: &str, args: &[LogArg]) -> bool {
        self.ilog(LogLevel::Emerg, format, args);
        false
    }

    #[track_caller]
    pub fn alert(&mut self, format: &str, args: &[LogArg]) -> bool {
        self.ilog(LogLevel::Alert, format, args);
        false
    }

    #[track_caller]
    pub fn crit(&mut self, format: &str, args: &[LogArg]) -> bool {
        self.ilog(LogLevel::Crit, format, args);
        false
    }

    #[track_caller]
    pub fn err(&mut self, format: &str, args: &[LogArg]) -> bool {
        self.ilog(LogLevel::Err, format, args);
        false
    }

    #[track_caller]
    pub fn warning(&mut self, format: &str, args: &[LogArg]) -> bool {
        self.ilog(LogLevel::Warning, format, args);
        false
    }

    #[track_caller]
    pub fn notice(&mut self, format: &str, args: &[LogArg]) -> bool {
        self.ilog(LogLevel::Notice, format, args);
        true
    }

    #[track_caller]
    pub fn info(&mut self, format: &str, args: &[LogArg]) -> bool {
        self.ilog(LogLevel::Info, format, args);
        true
    }

    #[track_caller]
    pub fn debug(&mut self, format: &str, args: &[LogArg]) -> bool {
        self.ilog(LogLevel::Debug, format, args);
        true
    }

    /// Bridge between the level shortcuts and [`WardenDaemon::log`]:
    /// positional substitution, then placeholder expansion against the
    /// live option store, with the call site captured for the log tail.
    #[track_caller]
    fn ilog(&mut self, level: LogLevel, format: &str, args: &[LogArg]) -> bool {
        let location = std::panic::Location::caller();
        let message = interpolate(format, args);
        let message = self.options.expand(&message);
        match self.log(level, &message, Some(location.file()), Some(location.line())) {
            Ok(ok) => ok,
            Err(error) => {
                eprintln!("{}", error);
                false
            }
        }
    }

    // --- Internals ---

    fn pid_file(&self) -> PidFile {
        PidFile::new(self.options.get_str("appPidLocation").unwrap_or(""))
    }

    /// Side-effect-free variant of the liveness check, usable from the
    /// logging path without recursing into it.
    fn is_in_background(&self) -> bool {
        self.pid_file()
            .read()
            .map(sys::process_alive)
            .unwrap_or(false)
    }

    /// A frozen snapshot of the live log configuration.
    fn logger(&self) -> Logger {
        let sink = if let Some(backend) = &self.log_backend {
            LogSink::Backend(backend.clone())
        } else if let Some(handler) = &self.log_handler {
            LogSink::Handler(handler.clone())
        } else {
            match self.options.get_str("logLocation") {
                Some(path) if !path.is_empty() => LogSink::File(PathBuf::from(path)),
                _ => LogSink::Unconfigured,
            }
        };
        Logger {
            verbosity: self
                .options
                .get_int("logVerbosity")
                .and_then(LogLevel::from_number)
                .unwrap_or(LogLevel::Err),
            app_name: self.options.get_str("appName").unwrap_or("").to_owned(),
            app_dir: self.options.get_str("appDir").map(str::to_owned),
            show_file: self.options.get_bool("logFilePosition"),
            show_line: self.options.get_bool("logLinePosition"),
            trim_app_dir: self.options.get_bool("logTrimAppDir"),
            sink,
        }
    }

    /// Puts the running program into the background.
    fn summon(&mut self) -> bool {
        let destination = if self.log_backend.is_some() {
            "(log backend)".to_owned()
        } else if self.log_handler.is_some() {
            "(custom log handler)".to_owned()
        } else {
            self.options.get_str("logLocation").unwrap_or("").to_owned()
        };
        self.notice(
            "Starting {appName} daemon, output in: %s",
            &[LogArg::from(destination)],
        );

        if self.is_running().is_some() {
            self.crit("{appName} daemon is still running. Exiting", &[]);
            return false;
        }

        // The pid location must prove valid before any fork happens.
        let app_name = self.options.get_str("appName").unwrap_or("").to_owned();
        if let Err(error) = self.pid_file().validate_location(&app_name) {
            self.err("%s", &[LogArg::from(error.to_string())]);
            return false;
        }

        self.process_id = 0;
        self.dying.store(false, Ordering::SeqCst);

        // Under systemd the service stays in the foreground and reports
        // readiness instead of double-detaching.
        let managed = systemd_managed();
        if !managed {
            match sys::fork() {
                Err(_) => {
                    self.crit("Unable to fork", &[]);
                    return false;
                }
                Ok(sys::Fork::Parent(_)) => {
                    // Die without attracting attention.
                    std::process::exit(0);
                }
                Ok(sys::Fork::Child) => {}
            }
            if sys::setsid().is_err() {
                self.crit("Unable to detach from the controlling terminal", &[]);
                return false;
            }
            if self.redirect_stdio().is_err() {
                self.crit("Unable to redirect standard streams", &[]);
                return false;
            }
        }

        self.dying.store(false, Ordering::SeqCst);
        self.process_id = std::process::id();

        sys::umask(0);

        if let Err(error) = self.pid_file().write(self.process_id, &app_name) {
            self.crit(
                "Unable to write pidfile {appPidLocation}: %s",
                &[LogArg::from(error.to_string())],
            );
            return false;
        }

        if !self.change_identity() {
            self.crit("Unable to change identity", &[]);
            if self.options.get_bool("appDieOnIdentityCrisis") {
                self.emerg("Cannot continue after this", &[]);
                return false;
            }
        }

        let ctx = Arc::new(RouterContext {
            dying: self.dying.clone(),
            pid_file: self.pid_file(),
            logger: self.logger(),
        });
        if let Err(error) = self.signals.install(ctx) {
            self.crit("%s", &[LogArg::from(error.to_string())]);
            return false;
        }

        if let Some(dir) = self.options.get_str("appDir") {
            let _ = sys::chdir(std::path::Path::new(dir));
        }

        #[cfg(target_os = "linux")]
        {
            if managed {
                let _ = sd_notify::notify(true, &[sd_notify::NotifyState::Ready]);
            }
        }

        self.state = DaemonState::Running;
        true
    }

    fn redirect_stdio(&self) -> DaemonResult<()> {
        sys::redirect_stream(&self.stdin, libc::STDIN_FILENO)?;
        sys::redirect_stream(&self.stdout, libc::STDOUT_FILENO)?;
        sys::redirect_stream(&self.stderr, libc::STDERR_FILENO)?;
        Ok(())
    }

    /// Re-owns the pid file, its directory and the log file for the
    /// target identity, then changes the process group before the user.
    /// Reversing that order would leave the process unable to change its
    /// group after dropping user privileges.
    fn change_identity(&mut self) -> bool {
        let (gid, uid) = match self.target_identity() {
            Ok(ids) => ids,
            Err(error) => {
                self.err("%s", &[LogArg::from(error.to_string())]);
                return false;
            }
        };

        let mut chown_targets: Vec<PathBuf> = Vec::new();
        let pid_file = self.pid_file();
        let app_name = self.options.get_str("appName").unwrap_or("").to_owned();
        if pid_file.validate_location(&app_name).is_ok() {
            if let Some(dir) = pid_file.path().parent() {
                chown_targets.push(dir.to_path_buf());
            }
        }
        chown_targets.push(pid_file.path().to_path_buf());
        if self.log_backend.is_none() && self.log_handler.is_none() {
            if let Some(location) = self.options.get_str("logLocation") {
                chown_targets.push(PathBuf::from(location));
            }
        }

        // Re-own first so the files stay writable once root is gone.
        for path in &chown_targets {
            if !path.exists() {
                continue;
            }
            let Ok((owner_uid, owner_gid)) = sys::file_owner(path) else {
                continue;
            };
            if owner_gid != gid && sys::chown(path, None, Some(gid)).is_err() {
                self.err(
                    "Unable to change group of file %s to %s",
                    &[
                        LogArg::from(path.display().to_string()),
                        LogArg::from(gid),
                    ],
                );
                return false;
            }
            if owner_uid != uid && sys::chown(path, Some(uid), None).is_err() {
                self.err(
                    "Unable to change user of file %s to %s",
                    &[
                        LogArg::from(path.display().to_string()),
                        LogArg::from(uid),
                    ],
                );
                return false;
            }
        }

        if sys::getgid() != gid && sys::setgid(gid).is_err() {
            self.err("Unable to change group of process to %s", &[LogArg::from(gid)]);
            return false;
        }
        if sys::getuid() != uid && sys::setuid(uid).is_err() {
            self.err("Unable to change user of process to %s", &[LogArg::from(uid)]);
            return false;
        }

        if let Some(home) = sys::home_of(uid) {
            std::env::set_var("HOME", home);
        }

        let group = sys::group_name(gid).unwrap_or_else(|| gid.to_string());
        let user = sys::user_name(uid).unwrap_or_else(|| uid.to_string());
        self.info(
            "Changed identity to %s:%s",
            &[LogArg::from(group), LogArg::from(user)],
        );
        true
    }

    /// The target (gid, uid) from the numeric options, falling back to a
    /// name lookup when only appGroup/appUser were customized.
    fn target_identity(&self) -> DaemonResult<(u32, u32)> {
        let mut gid = self.options.get_int("appRunAsGID").unwrap_or(0) as u32;
        let mut uid = self.options.get_int("appRunAsUID").unwrap_or(0) as u32;
        if gid == 0 {
            if let Some(name) = self.options.get_str("appGroup") {
                if name != "root" {
                    gid = Group::from(name).gid()?;
                }
            }
        }
        if uid == 0 {
            if let Some(name) = self.options.get_str("appUser") {
                if name != "root" {
                    uid = User::from(name).uid()?;
                }
            }
        }
        Ok((gid, uid))
    }

    /// The shutdown sequence. Kept as independent from complex logic as
    /// possible. A second attempt to enter it is a no-op.
    fn ddie(&mut self, restart: bool, pid: Option<u32>) {
        if self.dying.swap(true, Ordering::SeqCst) {
            return;
        }
        self.state = DaemonState::Dying;

        if !self.is_in_background() {
            self.info(
                "Process was not daemonized yet, just halting current process",
                &[],
            );
            self.state = DaemonState::Stopped;
            std::process::exit(0);
        }

        let pid_file = self.pid_file();
        let pid = pid.or_else(|| pid_file.read());
        let _ = pid_file.remove();

        if restart {
            let argv: Vec<String> = self
                .argv
                .iter()
                .map(|arg| {
                    if arg == "restart" {
                        "start".to_owned()
                    } else {
                        arg.clone()
                    }
                })
                .collect();
            if let Some((program, args)) = argv.split_first() {
                let _ = Command::new(program)
                    .args(args)
                    .stdin(ProcessStdio::null())
                    .stdout(ProcessStdio::null())
                    .stderr(ProcessStdio::null())
                    .spawn();
            }
            self.state = DaemonState::Stopped;
            std::process::exit(0);
        }

        if let Some(pid) = pid {
            let _ = sys::kill(pid, libc::SIGKILL);
        }
        self.state = DaemonState::Stopped;
        std::process::exit(0);
    }
}

#[cfg(target_os = "linux")]
fn systemd_managed() -> bool {
    std::env::var_os("NOTIFY_SOCKET").is_some()
}

#[cfg(not(target_os = "linux"))]
fn systemd_managed() -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;
    use std::sync::Mutex;

    fn base_config(dir: &Path) -> HashMap<String, OptionValue> {
        let mut configs = HashMap::new();
        configs.insert("appName".to_owned(), OptionValue::from("testd"));
        configs.insert(
            "logLocation".to_owned(),
            OptionValue::from(dir.join("testd.log").display().to_string()),
        );
        configs.insert(
            "appPidLocation".to_owned(),
            OptionValue::from(dir.join("testd").join("testd.pid").display().to_string()),
        );
        configs.insert("logVerbosity".to_owned(), OptionValue::from(6));
        configs
    }

    fn record_pid(dir: &Path, pid: u32) -> PathBuf {
        let path = dir.join("testd").join("testd.pid");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, pid.to_string()).unwrap();
        path
    }

    fn dead_pid() -> u32 {
        let mut child = Command::new("true").spawn().expect("spawn true");
        let pid = child.id();
        child.wait().expect("wait");
        pid
    }

    #[test]
    fn construction_resolves_options() {
        let dir = tempfile::tempdir().unwrap();
        let mut daemon = WardenDaemon::new(base_config(dir.path())).unwrap();
        assert_eq!(daemon.state(), DaemonState::NotStarted);
        assert!(!daemon.is_dying());
        assert_eq!(
            daemon.get_option("appName"),
            Some(OptionValue::from("testd"))
        );
        assert!(daemon.get_option("noSuchOption").is_none());
        assert!(daemon.is_running().is_none());
    }

    #[test]
    fn mixed_case_app_name_is_rejected_at_construction() {
        let dir = tempfile::tempdir().unwrap();
        let mut configs = base_config(dir.path());
        configs.insert("appName".to_owned(), OptionValue::from("TestD"));
        let err = WardenDaemon::new(configs).unwrap_err();
        assert!(matches!(err, DaemonError::Config(_)));
    }

    #[test]
    fn overlong_app_name_is_rejected_at_construction() {
        let dir = tempfile::tempdir().unwrap();
        let mut configs = base_config(dir.path());
        configs.insert(
            "appName".to_owned(),
            OptionValue::from("averyverylongappname"),
        );
        assert!(WardenDaemon::new(configs).is_err());
    }

    #[test]
    fn missing_required_options_fail_with_the_full_list() {
        match WardenDaemon::new(HashMap::new()) {
            Err(DaemonError::InvalidOptions(errors)) => {
                assert!(errors.iter().any(|e| e.contains("appName")));
            }
            other => panic!("expected InvalidOptions, got {:?}", other.err()),
        }
    }

    #[test]
    fn orphaned_pid_file_is_removed_exactly_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut daemon = WardenDaemon::new(base_config(dir.path())).unwrap();
        let path = record_pid(dir.path(), dead_pid());

        assert!(daemon.is_running().is_none());
        assert!(!path.exists());
        // Second call sees no pid file and has nothing left to clean up.
        assert!(daemon.is_running().is_none());
    }

    #[test]
    fn live_recorded_pid_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let mut daemon = WardenDaemon::new(base_config(dir.path())).unwrap();
        record_pid(dir.path(), std::process::id());
        assert_eq!(daemon.is_running(), Some(std::process::id()));
    }

    #[test]
    fn start_refuses_while_a_live_process_holds_the_pid_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut daemon = WardenDaemon::new(base_config(dir.path())).unwrap();
        let path = record_pid(dir.path(), std::process::id());
        let before = fs::read_to_string(&path).unwrap();

        assert!(!daemon.start());
        assert_eq!(fs::read_to_string(&path).unwrap(), before);
        assert_eq!(daemon.state(), DaemonState::NotStarted);
    }

    #[test]
    fn shared_run_directory_fails_before_any_fork() {
        let dir = tempfile::tempdir().unwrap();
        let mut configs = base_config(dir.path());
        configs.insert(
            "appPidLocation".to_owned(),
            OptionValue::from(dir.path().join("testd.pid").display().to_string()),
        );
        let mut daemon = WardenDaemon::new(configs).unwrap();

        assert!(!daemon.start());
        assert!(!dir.path().join("testd.pid").exists());
        assert_eq!(daemon.state(), DaemonState::NotStarted);
    }

    #[test]
    fn stop_without_a_running_daemon_only_notifies() {
        let dir = tempfile::tempdir().unwrap();
        let mut daemon = WardenDaemon::new(base_config(dir.path())).unwrap();
        daemon.stop();
        assert_eq!(daemon.state(), DaemonState::NotStarted);
        assert!(!daemon.is_dying());
        let log = fs::read_to_string(dir.path().join("testd.log")).unwrap();
        assert!(log.contains("testd daemon is not running"));
    }

    #[test]
    fn sig_handler_registration_validates_the_signal() {
        let dir = tempfile::tempdir().unwrap();
        let mut daemon = WardenDaemon::new(base_config(dir.path())).unwrap();
        assert!(daemon.set_sig_handler("SIGUSR2", SigAction::Ignore));
        assert!(daemon.set_sig_handler(libc::SIGTERM, SigAction::Handler(Arc::new(|_| {}))));
        assert!(!daemon.set_sig_handler("SIGBOGUS", SigAction::Ignore));
    }

    #[test]
    fn shortcuts_expand_placeholders_and_respect_verbosity() {
        let dir = tempfile::tempdir().unwrap();
        let mut daemon = WardenDaemon::new(base_config(dir.path())).unwrap();

        assert!(daemon.info("Starting {appName} daemon", &[]));
        assert!(daemon.debug("hidden at verbosity %s", &[LogArg::from(6)]));
        assert!(!daemon.err("trouble with %s", &[LogArg::from("disk")]));

        let log = fs::read_to_string(dir.path().join("testd.log")).unwrap();
        assert!(log.contains("Starting testd daemon"));
        assert!(!log.contains("hidden at verbosity"));
        assert!(log.contains("trouble with 'disk'"));
    }

    #[test]
    fn custom_log_handler_takes_over_the_sink() {
        let dir = tempfile::tempdir().unwrap();
        let mut daemon = WardenDaemon::new(base_config(dir.path())).unwrap();
        let seen: Arc<Mutex<Vec<(String, LogLevel)>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        daemon.set_log_handler(move |message, level| {
            sink.lock().unwrap().push((message.to_owned(), level));
        });

        daemon.info("handled elsewhere", &[]);
        assert_eq!(
            seen.lock().unwrap().as_slice(),
            &[("handled elsewhere".to_owned(), LogLevel::Info)]
        );
        assert!(!dir.path().join("testd.log").exists());
    }

    #[test]
    fn iterate_sleeps_and_returns_true() {
        let dir = tempfile::tempdir().unwrap();
        let mut daemon = WardenDaemon::new(base_config(dir.path())).unwrap();
        assert!(daemon.iterate(0.0));
        assert!(daemon.iterate(0.01));
    }
}
