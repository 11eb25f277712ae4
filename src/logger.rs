/*============================================================
  Synavera Project: UCW
  Module: ucw_core::logger
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Provide structured, append-only logging for the consent
    engine: registrations, CMP signals, activations, faults.

  Security / Safety Notes:
    Only service identifiers and event names are logged; raw
    consent payloads never reach the log stream.

  Dependencies:
    std::fs::File behind a RefCell, sha2 for integrity hashing.

  Operational Scope:
    Shared by the bridge, registry, and coordinator as an
    `Rc<Logger>`; the binary finalizes it with a digest file.

  Revision History:
    2025-11-12 COD  Adapted Synavera logger for UCW engine.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Append-only logging with UTC timestamps
    - Debug chatter gated behind an explicit switch
    - Graceful error propagation on I/O failures
============================================================*/

use std::cell::RefCell;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use sha2::{Digest, Sha256};

use crate::error::{Result, UcwError};

/// Structured log level for UCW events.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
    Debug,
}

impl LogLevel {
    fn as_str(self) -> &'static str {
        match self {
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Debug => "DEBUG",
        }
    }
}

/// Shared logger that emits append-only entries in Synavera format.
pub struct Logger {
    file: Option<RefCell<BufWriter<File>>>,
    /// Lines raised while the writer was borrowed; written on the next call.
    backlog: RefCell<Vec<String>>,
    path: Option<PathBuf>,
    verbose: bool,
}

impl Logger {
    /// Build a logger that writes to stderr and optionally to a file.
    pub fn new(path: Option<PathBuf>, verbose: bool) -> Result<Self> {
        let file = if let Some(ref file_path) = path {
            if let Some(parent) = file_path.parent() {
                std::fs::create_dir_all(parent).map_err(|err| {
                    UcwError::Filesystem(format!(
                        "Failed to create log directory {}: {err}",
                        parent.display()
                    ))
                })?;
            }

            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(file_path)
                .map_err(|err| {
                    UcwError::Filesystem(format!(
                        "Failed to open log file {}: {err}",
                        file_path.display()
                    ))
                })?;
            Some(RefCell::new(BufWriter::new(file)))
        } else {
            None
        };

        Ok(Self {
            file,
            backlog: RefCell::new(Vec::new()),
            path,
            verbose,
        })
    }

    /// Stderr-only logger; never fails.
    pub fn stderr(verbose: bool) -> Self {
        Self {
            file: None,
            backlog: RefCell::new(Vec::new()),
            path: None,
            verbose,
        }
    }

    /// Emit a log entry with the given level, code, and message.
    pub fn log<S: AsRef<str>>(&self, level: LogLevel, code: &str, message: S) {
        let line = format_line(level, code, message.as_ref());
        if self.verbose || matches!(level, LogLevel::Error | LogLevel::Warn) {
            eprintln!("{line}");
        }
        if level == LogLevel::Debug && !self.verbose {
            return;
        }
        let Some(file) = &self.file else {
            return;
        };
        let Ok(mut writer) = file.try_borrow_mut() else {
            self.backlog.borrow_mut().push(line);
            return;
        };
        let written = write_backlog(&mut writer, &self.backlog)
            .and_then(|_| writeln!(writer, "{line}"))
            .and_then(|_| writer.flush());
        if written.is_err() {
            eprintln!(
                "{}",
                format_line(LogLevel::Error, "LOGGER", "Failed to write to log file")
            );
        }
    }

    /// Convenience wrapper for `INFO` level events.
    pub fn info<S: AsRef<str>>(&self, code: &str, message: S) {
        self.log(LogLevel::Info, code, message);
    }

    /// Convenience wrapper for `WARN` level events.
    pub fn warn<S: AsRef<str>>(&self, code: &str, message: S) {
        self.log(LogLevel::Warn, code, message);
    }

    /// Convenience wrapper for `ERROR` level events.
    pub fn error<S: AsRef<str>>(&self, code: &str, message: S) {
        self.log(LogLevel::Error, code, message);
    }

    /// Convenience wrapper for `DEBUG` level events.
    pub fn debug<S: AsRef<str>>(&self, code: &str, message: S) {
        self.log(LogLevel::Debug, code, message);
    }

    /// Return the path backing this logger, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Compute and persist SHA-256 digest of the log file.
    pub fn finalize(&self) -> Result<()> {
        if let Some(file) = &self.file {
            let mut writer = file.borrow_mut();
            write_backlog(&mut writer, &self.backlog)?;
            writer.flush()?;
        }
        if let Some(path) = self.path() {
            let data = std::fs::read(path).map_err(|err| {
                UcwError::Filesystem(format!(
                    "Failed to read log for hashing {}: {err}",
                    path.display()
                ))
            })?;
            let mut hasher = Sha256::new();
            hasher.update(&data);
            let digest = hasher.finalize();
            let mut hash_os = path.as_os_str().to_os_string();
            hash_os.push(".hash");
            let hash_path = PathBuf::from(hash_os);
            let mut file = File::create(&hash_path).map_err(|err| {
                UcwError::Filesystem(format!(
                    "Failed to create hash file {}: {err}",
                    hash_path.display()
                ))
            })?;
            writeln!(
                file,
                "{:x}  {}",
                digest,
                path.file_name().unwrap_or_default().to_string_lossy()
            )
            .map_err(|err| {
                UcwError::Filesystem(format!(
                    "Failed to write hash file {}: {err}",
                    hash_path.display()
                ))
            })?;
        }
        Ok(())
    }
}

fn write_backlog(writer: &mut BufWriter<File>, backlog: &RefCell<Vec<String>>) -> std::io::Result<()> {
    for line in backlog.take() {
        writeln!(writer, "{line}")?;
    }
    Ok(())
}

fn format_line(level: LogLevel, code: &str, message: &str) -> String {
    let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
    format!("{timestamp} [UCW] [{}] [{code}] {message}", level.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_lines_only_land_in_file_when_verbose() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs/ucw.log");

        let quiet = Logger::new(Some(path.clone()), false).unwrap();
        quiet.debug("REGISTER", "hidden");
        quiet.info("INIT", "visible");
        quiet.finalize().unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("[INFO] [INIT] visible"));
        assert!(!contents.contains("hidden"));
    }

    #[test]
    fn finalize_writes_digest_next_to_log() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ucw.log");
        let logger = Logger::new(Some(path.clone()), true).unwrap();
        logger.info("ACTIVATE", "svc-a activated");
        logger.finalize().unwrap();

        let digest = std::fs::read_to_string(dir.path().join("ucw.log.hash")).unwrap();
        assert!(digest.trim_end().ends_with("  ucw.log"));
        assert_eq!(digest.split_whitespace().next().unwrap().len(), 64);
    }

    #[test]
    fn lines_raised_while_writer_is_busy_are_written_later() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ucw.log");
        let logger = Logger::new(Some(path.clone()), false).unwrap();

        let held = logger.file.as_ref().unwrap().borrow_mut();
        logger.info("ACTIVATE", "raised while busy");
        drop(held);
        logger.info("ACTIVATE", "after release");
        logger.finalize().unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let busy = contents.find("raised while busy").unwrap();
        let after = contents.find("after release").unwrap();
        assert!(busy < after);
    }
}
