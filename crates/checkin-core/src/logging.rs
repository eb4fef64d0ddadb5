//! Run log handle
//!
//! Components log through the `log` facade. [`RunLog`] owns the sinks: it
//! installs an `env_logger` whose pipe target copies every line to stderr and
//! to `<dir>/<YYYY-MM-DD>.log`, and flushes the file when the run ends.

use crate::errors::CheckinError;
use chrono::Local;
use log::LevelFilter;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Mutex};

/// Writes to stderr and a shared log file.
struct TeeWriter {
    file: Arc<Mutex<File>>,
}

impl Write for TeeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stderr().write_all(buf)?;
        let mut file = self
            .file
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "log file lock poisoned"))?;
        file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()?;
        match self.file.lock() {
            Ok(mut file) => file.flush(),
            Err(_) => Ok(()),
        }
    }
}

pub struct RunLog {
    path: PathBuf,
    file: Arc<Mutex<File>>,
}

impl RunLog {
    /// Open today's log file under `dir` and install the global logger.
    ///
    /// If a logger is already installed (tests, embedding), the existing one
    /// is kept and the handle only owns the file.
    pub fn open(dir: &Path, level: &str) -> Result<Self, CheckinError> {
        let filter = parse_level(level)?;
        std::fs::create_dir_all(dir).map_err(|e| {
            CheckinError::Config(format!("Failed to create log directory {}: {}", dir.display(), e))
        })?;

        let path = dir.join(format!("{}.log", Local::now().format("%Y-%m-%d")));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| CheckinError::Config(format!("Failed to open log file {}: {}", path.display(), e)))?;
        let file = Arc::new(Mutex::new(file));

        let installed = env_logger::Builder::new()
            .filter_level(filter)
            .format(|buf, record| {
                writeln!(
                    buf,
                    "{} [{}] {}",
                    Local::now().format("%Y-%m-%d %H:%M:%S"),
                    record.level(),
                    record.args()
                )
            })
            .target(env_logger::Target::Pipe(Box::new(TeeWriter { file: file.clone() })))
            .try_init()
            .is_ok();

        if installed {
            log::debug!("Logging to {}", path.display());
        }
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush buffered log output. Call once at the end of a run.
    pub fn close(self) {
        log::logger().flush();
        if let Ok(mut file) = self.file.lock() {
            let _ = file.flush();
        }
    }
}

fn parse_level(level: &str) -> Result<LevelFilter, CheckinError> {
    LevelFilter::from_str(level.trim())
        .map_err(|_| CheckinError::Config(format!("Unknown log level '{}'", level)))
}
