//! PID file management for filesystem-socket deployments.
//!
//! The PID file lives next to the socket as `runme.pid` and holds the
//! server's process id as decimal text:
//! ```text
//! 12345
//! ```

use std::fs;
use std::io::{self, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use crate::net::ServerAddress;

#[derive(Debug, Clone)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The PID file of `address`, if it is a filesystem socket.
    pub fn for_address(address: &ServerAddress) -> Option<Self> {
        address.pid_file_path().map(Self::new)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `pid` with mode 0600, replacing any previous contents.
    pub fn write(&self, pid: u32) -> io::Result<()> {
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(&self.path)?;
        file.write_all(pid.to_string().as_bytes())?;
        file.sync_all()?;
        Ok(())
    }

    /// `Ok(None)` when the file does not exist.
    pub fn read(&self) -> io::Result<Option<u32>> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => contents.trim().parse().map(Some).map_err(|_| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("invalid PID in {}", self.path.display()),
                )
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Delete the file if it still holds `pid`. Returns whether it was removed.
    pub fn remove_if_owned(&self, pid: u32) -> io::Result<bool> {
        match self.read() {
            Ok(Some(current)) if current == pid => {}
            Ok(_) => return Ok(false),
            Err(e) if e.kind() == io::ErrorKind::InvalidData => return Ok(false),
            Err(e) => return Err(e),
        }
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }
}
