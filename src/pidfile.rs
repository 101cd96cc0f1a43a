//! Pid file lifecycle.
//!
//! The pid file doubles as the cross-process mutex: its existence plus a
//! liveness probe of the recorded pid decides whether a daemon instance
//! is already running. Pid files must live in their own per-app
//! subdirectory, never directly in a shared run directory.

use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::error::{DaemonError, DaemonResult};

pub(crate) struct PidFile {
    path: PathBuf,
}

impl PidFile {
    pub(crate) fn new(path: impl Into<PathBuf>) -> Self {
        PidFile { path: path.into() }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Enforces the per-app subdirectory convention, e.g.
    /// `/var/run/<appName>/<appName>.pid`.
    pub(crate) fn validate_location(&self, app_name: &str) -> DaemonResult<()> {
        if self.path.as_os_str().is_empty() {
            return Err(DaemonError::Config(
                "encountered an empty appPidLocation".into(),
            ));
        }
        let dir = self.path.parent().unwrap_or_else(|| Path::new(""));
        let components: Vec<Component> = dir.components().collect();
        let own_dir = components
            .last()
            .map(|c| c.as_os_str() == app_name)
            .unwrap_or(false);
        if components.len() <= 3 || !own_dir {
            // like: /var/run/x.pid
            return Err(DaemonError::Config(format!(
                "the pid file needs to be in its own subdirectory like: \
                 /var/run/{name}/{name}.pid",
                name = app_name
            )));
        }
        Ok(())
    }

    /// Reads the recorded pid back, if the file exists and holds one.
    pub(crate) fn read(&self) -> Option<u32> {
        let contents = fs::read_to_string(&self.path).ok()?;
        contents.trim().parse().ok()
    }

    /// Creates the per-app directory (0755) and records the pid (0644).
    pub(crate) fn write(&self, pid: u32, app_name: &str) -> DaemonResult<()> {
        use std::os::unix::fs::PermissionsExt;

        if pid == 0 {
            return Err(DaemonError::Config("encountered an empty pid".into()));
        }
        self.validate_location(app_name)?;

        if let Some(dir) = self.path.parent() {
            if !dir.is_dir() {
                use std::os::unix::fs::DirBuilderExt;
                fs::DirBuilder::new()
                    .recursive(true)
                    .mode(0o755)
                    .create(dir)?;
            }
        }

        fs::write(&self.path, pid.to_string())?;
        fs::set_permissions(&self.path, fs::Permissions::from_mode(0o644))?;
        Ok(())
    }

    pub(crate) fn remove(&self) -> std::io::Result<()> {
        fs::remove_file(&self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pid_round_trips_through_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let pidfile = PidFile::new(dir.path().join("testd").join("testd.pid"));
        pidfile.write(4242, "testd").unwrap();
        assert_eq!(pidfile.read(), Some(4242));
    }

    #[test]
    fn shared_run_directory_is_rejected() {
        let pidfile = PidFile::new("/var/run/testd.pid");
        let err = pidfile.validate_location("testd").unwrap_err();
        assert!(err.to_string().contains("own subdirectory"));
    }

    #[test]
    fn foreign_subdirectory_is_rejected() {
        let pidfile = PidFile::new("/var/run/other/testd.pid");
        assert!(pidfile.validate_location("testd").is_err());
    }

    #[test]
    fn modes_match_the_run_directory_convention() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let pidfile = PidFile::new(dir.path().join("testd").join("testd.pid"));
        pidfile.write(7, "testd").unwrap();

        let dir_mode = fs::metadata(dir.path().join("testd"))
            .unwrap()
            .permissions()
            .mode();
        let file_mode = fs::metadata(pidfile.path()).unwrap().permissions().mode();
        assert_eq!(dir_mode & 0o777, 0o755);
        assert_eq!(file_mode & 0o777, 0o644);
    }

    #[test]
    fn unreadable_contents_yield_no_pid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("testd").join("testd.pid");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "not-a-pid").unwrap();
        assert_eq!(PidFile::new(&path).read(), None);
    }
}
