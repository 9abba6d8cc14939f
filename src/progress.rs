//! Export progress reporting.
//!
//! Reports what `ah export` is doing so users see files being scanned and
//! bundles being written. Progress goes to **stderr** so stdout stays
//! parseable for scripts.

use std::io::Write;

use agent_harness_core::scan::Block;

/// A single progress event emitted by the exporter.
#[derive(Clone, Debug)]
pub enum ExportProgressEvent {
    /// Walk finished; `files` candidates will be inspected.
    Discovered { files: u64 },
    /// Blocks were extracted from one file.
    Blocks { file: String, blocks: Vec<Block> },
    /// `n` of `total` files inspected.
    Scanning { n: u64, total: u64 },
    /// An output bundle was written.
    Wrote { output: String, entries: u64 },
}

/// Receives exporter progress. Implementations write to stderr.
pub trait ExportProgressReporter: Send + Sync {
    fn report(&self, event: ExportProgressEvent);
}

/// Human-friendly progress: "export  scanning  1,200 / 5,000 files".
pub struct StderrProgress;

/// Emit a human scanning line every this many files.
const SCAN_REPORT_EVERY: u64 = 250;

impl ExportProgressReporter for StderrProgress {
    fn report(&self, event: ExportProgressEvent) {
        let line = match &event {
            ExportProgressEvent::Discovered { files } => {
                format!("export  discovered  {} files\n", format_number(*files))
            }
            ExportProgressEvent::Blocks { .. } => return,
            ExportProgressEvent::Scanning { n, total } => {
                if n % SCAN_REPORT_EVERY != 0 && n != total {
                    return;
                }
                format!(
                    "export  scanning  {} / {} files\n",
                    format_number(*n),
                    format_number(*total)
                )
            }
            ExportProgressEvent::Wrote { output, entries } => {
                format!("export  wrote  {}  ({} entries)\n", output, entries)
            }
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ExportProgressReporter for JsonProgress {
    fn report(&self, event: ExportProgressEvent) {
        let obj = match &event {
            ExportProgressEvent::Discovered { files } => serde_json::json!({
                "event": "discovered",
                "files": files,
            }),
            ExportProgressEvent::Blocks { file, blocks } => serde_json::json!({
                "event": "blocks",
                "file": file,
                "blocks": blocks,
            }),
            ExportProgressEvent::Scanning { n, total } => serde_json::json!({
                "event": "scanning",
                "n": n,
                "total": total,
            }),
            ExportProgressEvent::Wrote { output, entries } => serde_json::json!({
                "event": "wrote",
                "output": output,
                "entries": entries,
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ExportProgressReporter for NoProgress {
    fn report(&self, _event: ExportProgressEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn ExportProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
