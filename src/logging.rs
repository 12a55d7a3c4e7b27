use crate::config::LogConfig;
use crate::error::Result;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Logfile writer that can be reopened in place, so external rotation
/// (rename the file, then signal the process) works without a restart.
#[derive(Clone)]
pub struct ReopenableWriter {
    path: PathBuf,
    file: Arc<Mutex<File>>,
}

impl ReopenableWriter {
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = Self::open_file(&path)?;
        Ok(Self {
            path,
            file: Arc::new(Mutex::new(file)),
        })
    }

    /// Swap in a fresh handle at the configured path. Writers blocked on
    /// the lock pick up the new file on their next write.
    pub fn reopen(&self) -> io::Result<()> {
        let file = Self::open_file(&self.path)?;
        *self.file.lock() = file;
        Ok(())
    }

    fn open_file(path: &Path) -> io::Result<File> {
        OpenOptions::new().create(true).append(true).open(path)
    }
}

impl Write for ReopenableWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.lock().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.lock().flush()
    }
}

/// Keeps the non-blocking log worker and the reopen handle alive for the
/// process lifetime.
pub struct LogGuard {
    _worker: Option<tracing_appender::non_blocking::WorkerGuard>,
    writer: Option<ReopenableWriter>,
}

/// Initialize the global subscriber from the log configuration: stderr
/// when no path is configured, otherwise a non-blocking reopenable
/// logfile. A logfile that cannot be opened is startup-fatal.
pub fn init(config: &LogConfig) -> Result<LogGuard> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("mistral=info"));

    if config.path.is_empty() {
        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
            .with(env_filter)
            .init();

        return Ok(LogGuard {
            _worker: None,
            writer: None,
        });
    }

    let logfile = Path::new(&config.path).join(&config.file);
    let writer = ReopenableWriter::open(&logfile)?;
    let (non_blocking, worker) = tracing_appender::non_blocking(writer.clone());

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(non_blocking),
        )
        .with(env_filter)
        .init();

    Ok(LogGuard {
        _worker: Some(worker),
        writer: Some(writer),
    })
}

/// Reopen the logfile on SIGUSR2. Lives outside the shutdown state
/// machine; the task simply ends when the process does.
#[cfg(unix)]
pub fn spawn_rotation_task(guard: &LogGuard) {
    use tokio::signal::unix::{signal, SignalKind};
    use tracing::{error, info};

    let Some(writer) = guard.writer.clone() else {
        return;
    };

    tokio::spawn(async move {
        let mut usr2 = match signal(SignalKind::user_defined2()) {
            Ok(stream) => stream,
            Err(e) => {
                error!("Failed to register SIGUSR2 handler: {}", e);
                return;
            }
        };

        while usr2.recv().await.is_some() {
            match writer.reopen() {
                Ok(()) => info!("Logfile reopened on SIGUSR2"),
                Err(e) => error!("Logfile reopen failed: {}", e),
            }
        }
    });
}

#[cfg(not(unix))]
pub fn spawn_rotation_task(_guard: &LogGuard) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_and_survives_rotation() {
        let dir = tempfile::tempdir().unwrap();
        let logfile = dir.path().join("mistral.log");

        let mut writer = ReopenableWriter::open(&logfile).unwrap();
        writer.write_all(b"before rotation\n").unwrap();
        writer.flush().unwrap();

        // External rotation: rename the active file, then reopen.
        let rotated = dir.path().join("mistral.log.1");
        std::fs::rename(&logfile, &rotated).unwrap();
        writer.reopen().unwrap();

        writer.write_all(b"after rotation\n").unwrap();
        writer.flush().unwrap();

        let old = std::fs::read_to_string(&rotated).unwrap();
        let new = std::fs::read_to_string(&logfile).unwrap();
        assert_eq!(old, "before rotation\n");
        assert_eq!(new, "after rotation\n");
    }

    #[test]
    fn clones_share_the_underlying_file() {
        let dir = tempfile::tempdir().unwrap();
        let logfile = dir.path().join("mistral.log");

        let mut writer = ReopenableWriter::open(&logfile).unwrap();
        let mut clone = writer.clone();

        writer.write_all(b"one\n").unwrap();
        clone.write_all(b"two\n").unwrap();
        writer.flush().unwrap();

        let contents = std::fs::read_to_string(&logfile).unwrap();
        assert_eq!(contents, "one\ntwo\n");
    }

    #[test]
    fn unwritable_logfile_is_an_error() {
        assert!(ReopenableWriter::open("/nonexistent/dir/mistral.log").is_err());
    }
}
