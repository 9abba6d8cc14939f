//! Streaming per-session transcript for the agent tools.
//!
//! Every line is timestamped (`[HH:MM:SS.mmm] message`) and flushed as soon
//! as it is written, so a transcript survives a killed or timed-out tool.
//!
//! Layout under the log root:
//!
//! ```text
//! <root>/<tool>/20260101T120000-4242.log    new run
//! <root>/<tool>/session-<id>.log            symlink to the run, or the
//!                                           appended log of continuations
//! ```

use anyhow::{bail, Context, Result};
use chrono::{Local, SecondsFormat};
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug)]
pub struct SessionLog {
    file: Mutex<Option<File>>,
    path: PathBuf,
    tool: String,
}

fn timestamp() -> String {
    Local::now().format("%H:%M:%S%.3f").to_string()
}

fn rfc3339_now() -> String {
    Local::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Reject ids that would leave the tool's log directory once joined.
pub fn check_session_id(session_id: &str) -> Result<()> {
    if session_id.is_empty()
        || session_id.contains('/')
        || session_id.contains('\\')
        || session_id.contains("..")
    {
        bail!("invalid session id '{}'", session_id);
    }
    Ok(())
}

fn session_file_name(session_id: &str) -> String {
    format!("session-{}.log", session_id)
}

fn open_append(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file {}", path.display()))
}

fn tool_dir(root: &Path, tool: &str) -> Result<PathBuf> {
    let dir = root.join(tool);
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create log dir {}", dir.display()))?;
    Ok(dir)
}

impl SessionLog {
    /// Start a log for a new run of `tool`.
    pub fn create(root: &Path, tool: &str) -> Result<Self> {
        let dir = tool_dir(root, tool)?;
        let stamp = Local::now().format("%Y%m%dT%H%M%S");
        let path = dir.join(format!("{}-{}.log", stamp, std::process::id()));

        let log = Self {
            file: Mutex::new(Some(open_append(&path)?)),
            path,
            tool: tool.to_string(),
        };
        log.log(format!("=== {} started at {} ===", tool, rfc3339_now()));
        log.log(format!("PID: {}", std::process::id()));
        log.log(format!("Log file: {}", log.path.display()));
        Ok(log)
    }

    /// Append to the log of an existing session.
    pub fn for_session(root: &Path, tool: &str, session_id: &str) -> Result<Self> {
        check_session_id(session_id)?;
        let dir = tool_dir(root, tool)?;
        let path = dir.join(session_file_name(session_id));

        let log = Self {
            file: Mutex::new(Some(open_append(&path)?)),
            path,
            tool: tool.to_string(),
        };
        log.log("");
        log.log(format!("=== {} CONTINUED at {} ===", tool, rfc3339_now()));
        log.log(format!("PID: {}", std::process::id()));
        log.log(format!("Session: {}", session_id));
        Ok(log)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Point `session-<id>.log` at this run's file so continuations append
    /// to the same transcript. Failure is recorded in the log only.
    pub fn link_session(&self, session_id: &str) {
        if let Err(e) = check_session_id(session_id) {
            self.log(format!("Note: session link skipped: {}", e));
            return;
        }
        let Some(dir) = self.path.parent() else {
            return;
        };
        let link = dir.join(session_file_name(session_id));
        let _ = std::fs::remove_file(&link);

        if let Err(e) = make_symlink(&self.path, &link) {
            self.log(format!("Note: session link failed: {}", e));
        }
    }

    /// Write one timestamped line and flush it.
    pub fn log(&self, message: impl AsRef<str>) {
        let Ok(mut guard) = self.file.lock() else {
            return;
        };
        if let Some(file) = guard.as_mut() {
            let line = format!("[{}] {}\n", timestamp(), message.as_ref());
            let _ = file.write_all(line.as_bytes());
            let _ = file.sync_data();
        }
    }

    /// Pretty-printed JSON under a label.
    pub fn log_json<T: Serialize>(&self, label: &str, value: &T) {
        match serde_json::to_string_pretty(value) {
            Ok(json) => self.log(format!("{}:\n{}", label, json)),
            Err(e) => self.log(format!("{}: [JSON marshal error: {}]", label, e)),
        }
    }

    pub fn separator(&self, label: &str) {
        self.log(format!("─────────────── {} ───────────────", label));
    }

    /// Write the footer and close the file. Later writes are dropped.
    pub fn close(&self) {
        let Ok(mut guard) = self.file.lock() else {
            return;
        };
        if let Some(mut file) = guard.take() {
            let line = format!(
                "[{}] === {} ended at {} ===\n",
                timestamp(),
                self.tool,
                rfc3339_now()
            );
            let _ = file.write_all(line.as_bytes());
            let _ = file.sync_data();
        }
    }
}

impl Drop for SessionLog {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(unix)]
fn make_symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(not(unix))]
fn make_symlink(_target: &Path, _link: &Path) -> std::io::Result<()> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "symlinks are not supported on this platform",
    ))
}

/// Shorten `text` to `limit` chars, marking the cut with `...`.
pub fn truncate_for_log(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
