/*
 * Kiln - Confined Tool-Calling Agent
 * File Path: src/audit.rs
 * Responsibility: Append-only record of every dispatch attempt.
 */

use chrono::Local;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

/// One dispatch attempt, as written to the audit log.
#[derive(Debug, Clone)]
pub struct AuditRecord<'a> {
    pub function: &'a str,
    pub arguments: &'a str,
    pub working_directory: &'a Path,
    pub allow_unsafe: bool,
}

impl AuditRecord<'_> {
    fn to_line(&self, timestamp: &str) -> String {
        format!(
            "{} - INFO - Function called: {} | Arguments: {} | Working Directory: {} | Allow Unsafe Functions: {}",
            timestamp,
            self.function,
            // Keep one record per line no matter what the model sent.
            self.arguments.replace('\n', "\\n"),
            self.working_directory.display(),
            if self.allow_unsafe { "True" } else { "False" }
        )
    }
}

#[derive(Debug, Clone)]
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one line. Failing to write is logged, never surfaced.
    pub fn record(&self, record: &AuditRecord<'_>) {
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S,%3f").to_string();
        let line = record.to_line(&timestamp);

        let written = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| writeln!(file, "{}", line));

        if let Err(e) = written {
            tracing::warn!(path = %self.path.display(), "could not append to audit log: {}", e);
        }
    }
}
