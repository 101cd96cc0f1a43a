use std::ffi::{CStr, CString};
use std::io;
use std::path::{Path, PathBuf};

use libc::{c_int, gid_t, mode_t, pid_t, uid_t};

use crate::error::{DaemonError, DaemonResult};
use crate::stdio::Stdio;

fn syscall_err(call: &'static str) -> DaemonError {
    DaemonError::Syscall {
        call,
        errno: io::Error::last_os_error().raw_os_error().unwrap_or(0),
    }
}

fn path_cstring(path: &Path) -> DaemonResult<CString> {
    use std::os::unix::ffi::OsStrExt;
    CString::new(path.as_os_str().as_bytes()).map_err(|_| {
        DaemonError::Io(io::Error::new(
            io::ErrorKind::InvalidInput,
            "path contains an interior NUL byte",
        ))
    })
}

/// Outcome of a fork, seen from each side.
pub(crate) enum Fork {
    Parent(pid_t),
    Child,
}

pub(crate) fn fork() -> DaemonResult<Fork> {
    // SAFETY: no other threads are running at daemonization time.
    let pid = unsafe { libc::fork() };
    match pid {
        -1 => Err(syscall_err("fork")),
        0 => Ok(Fork::Child),
        pid => Ok(Fork::Parent(pid)),
    }
}

pub(crate) fn setsid() -> DaemonResult<()> {
    if unsafe { libc::setsid() } < 0 {
        return Err(syscall_err("setsid"));
    }
    Ok(())
}

pub(crate) fn umask(mask: mode_t) -> mode_t {
    unsafe { libc::umask(mask) }
}

pub(crate) fn chdir(path: &Path) -> DaemonResult<()> {
    let cwd = path_cstring(path)?;
    if unsafe { libc::chdir(cwd.as_ptr()) } < 0 {
        return Err(syscall_err("chdir"));
    }
    Ok(())
}

/// Zero-signal liveness probe. True when the pid exists and accepts signals.
pub(crate) fn process_alive(pid: u32) -> bool {
    unsafe { libc::kill(pid as pid_t, 0) == 0 }
}

pub(crate) fn kill(pid: u32, signal: c_int) -> DaemonResult<()> {
    if unsafe { libc::kill(pid as pid_t, signal) } < 0 {
        return Err(syscall_err("kill"));
    }
    Ok(())
}

/// Reaps one terminated child without blocking. Returns the reaped pid,
/// or 0 when no child is ready, or a negative value when there are none.
pub(crate) fn wait_any_nohang() -> pid_t {
    unsafe { libc::waitpid(-1, std::ptr::null_mut(), libc::WNOHANG | libc::WUNTRACED) }
}

pub(crate) fn getuid() -> u32 {
    unsafe { libc::getuid() as u32 }
}

pub(crate) fn getgid() -> u32 {
    unsafe { libc::getgid() as u32 }
}

pub(crate) fn setuid(uid: u32) -> DaemonResult<()> {
    if unsafe { libc::setuid(uid as uid_t) } < 0 {
        return Err(syscall_err("setuid"));
    }
    Ok(())
}

pub(crate) fn setgid(gid: u32) -> DaemonResult<()> {
    if unsafe { libc::setgid(gid as gid_t) } < 0 {
        return Err(syscall_err("setgid"));
    }
    Ok(())
}

/// Changes file ownership. `None` leaves the corresponding id untouched.
pub(crate) fn chown(path: &Path, uid: Option<u32>, gid: Option<u32>) -> DaemonResult<()> {
    let cpath = path_cstring(path)?;
    let uid = uid.map(|u| u as uid_t).unwrap_or(uid_t::MAX);
    let gid = gid.map(|g| g as gid_t).unwrap_or(gid_t::MAX);
    if unsafe { libc::chown(cpath.as_ptr(), uid, gid) } < 0 {
        return Err(syscall_err("chown"));
    }
    Ok(())
}

/// Current owner (uid, gid) of a file.
pub(crate) fn file_owner(path: &Path) -> io::Result<(u32, u32)> {
    use std::os::unix::fs::MetadataExt;
    let meta = std::fs::metadata(path)?;
    Ok((meta.uid(), meta.gid()))
}

pub(crate) fn uid_of_name(name: &str) -> DaemonResult<u32> {
    let cname = CString::new(name)
        .map_err(|_| DaemonError::Privilege(format!("invalid user name '{}'", name)))?;
    let pwd = unsafe { libc::getpwnam(cname.as_ptr()) };
    if pwd.is_null() {
        return Err(DaemonError::Privilege(format!("user '{}' not found", name)));
    }
    Ok(unsafe { (*pwd).pw_uid as u32 })
}

pub(crate) fn gid_of_name(name: &str) -> DaemonResult<u32> {
    let cname = CString::new(name)
        .map_err(|_| DaemonError::Privilege(format!("invalid group name '{}'", name)))?;
    let grp = unsafe { libc::getgrnam(cname.as_ptr()) };
    if grp.is_null() {
        return Err(DaemonError::Privilege(format!("group '{}' not found", name)));
    }
    Ok(unsafe { (*grp).gr_gid as u32 })
}

pub(crate) fn user_name(uid: u32) -> Option<String> {
    let pwd = unsafe { libc::getpwuid(uid as uid_t) };
    if pwd.is_null() {
        return None;
    }
    Some(unsafe { CStr::from_ptr((*pwd).pw_name) }.to_string_lossy().into_owned())
}

pub(crate) fn group_name(gid: u32) -> Option<String> {
    let grp = unsafe { libc::getgrgid(gid as gid_t) };
    if grp.is_null() {
        return None;
    }
    Some(unsafe { CStr::from_ptr((*grp).gr_name) }.to_string_lossy().into_owned())
}

/// Home directory of a uid, for fixing up $HOME after an identity change.
pub(crate) fn home_of(uid: u32) -> Option<PathBuf> {
    let pwd = unsafe { libc::getpwuid(uid as uid_t) };
    if pwd.is_null() {
        return None;
    }
    let dir = unsafe { CStr::from_ptr((*pwd).pw_dir) }.to_string_lossy().into_owned();
    let dir = PathBuf::from(dir);
    dir.is_dir().then_some(dir)
}

pub(crate) fn redirect_stream(stdio: &Stdio, target_fd: c_int) -> DaemonResult<()> {
    use std::os::unix::io::AsRawFd;

    match stdio {
        Stdio::RedirectToFile(f) => {
            if unsafe { libc::dup2(f.as_raw_fd(), target_fd) } < 0 {
                return Err(syscall_err("dup2"));
            }
        }
        Stdio::Devnull => {
            let path = CString::new("/dev/null").expect("static string");
            let fd = unsafe { libc::open(path.as_ptr(), libc::O_RDWR) };
            if fd < 0 {
                return Err(syscall_err("open"));
            }
            if unsafe { libc::dup2(fd, target_fd) } < 0 {
                return Err(syscall_err("dup2"));
            }
            unsafe { libc::close(fd) };
        }
        Stdio::Keep => {}
    }
    Ok(())
}
