use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;

/// Defines what happens to a standard stream once the process is
/// detached from its terminal.
#[derive(Debug)]
pub enum Stdio {
    /// Redirects the stream to `/dev/null`. Default.
    Devnull,
    /// Redirects the stream to the specified file.
    RedirectToFile(File),
    /// Keeps the original stream.
    Keep,
}

impl Stdio {
    /// Creates a configuration that discards all output.
    pub fn devnull() -> Self {
        Stdio::Devnull
    }

    /// Opens `path` in append mode, creating it if needed. Useful for
    /// capturing panics and stray writes from the detached process.
    pub fn append<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Stdio::RedirectToFile(file))
    }
}

impl From<File> for Stdio {
    fn from(f: File) -> Self {
        Stdio::RedirectToFile(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_creates_the_target_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stray.err");
        let stdio = Stdio::append(&path).unwrap();
        assert!(matches!(stdio, Stdio::RedirectToFile(_)));
        assert!(path.exists());
    }
}
