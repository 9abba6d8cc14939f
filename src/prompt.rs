//! Prompt input and decoration for the agent tools.
//!
//! Prompts come from piped stdin when present, otherwise from the
//! positional arguments. Some tools prepend fixed context before sending.

use anyhow::{bail, Context, Result};
use std::io::BufRead;
use std::path::Path;

/// Read-only advisory role prepended to every big-brain prompt.
pub const ORACLE_INSTRUCTION: &str = "You are a read-only advisory oracle consulted for complex analysis, planning, and reviews.
Do not perform implementation work yourself - focus strictly on researching, analyzing, and providing expert guidance.
Review the situation thoroughly and respond with actionable advice that adheres to the query's requirements.

USER QUERY:
";

/// Whether stdin is a pipe or redirect rather than a terminal.
pub fn stdin_is_piped() -> bool {
    atty::isnt(atty::Stream::Stdin)
}

/// Prompt from piped stdin, falling back to `args` joined by spaces.
pub fn read_stdin_or_args(args: &[String]) -> Result<String> {
    if stdin_is_piped() {
        let stdin = std::io::stdin();
        prompt_from(Some(stdin.lock()), args)
    } else {
        prompt_from(None::<std::io::Empty>, args)
    }
}

/// Prompt from piped stdin only.
pub fn read_required_stdin() -> Result<String> {
    if !stdin_is_piped() {
        bail!("Prompt must be provided via stdin (pipe or redirect)");
    }
    let stdin = std::io::stdin();
    prompt_from(Some(stdin.lock()), &[])
}

/// Resolve a prompt from an optional stdin reader and positional args.
///
/// Stdin lines are joined with `\n` (line terminators dropped). Non-empty
/// stdin wins over `args`; empty stdin (e.g. `/dev/null`) falls back to
/// `args` when there are any.
pub fn prompt_from<R: BufRead>(stdin: Option<R>, args: &[String]) -> Result<String> {
    if let Some(reader) = stdin {
        let mut lines = Vec::new();
        for line in reader.lines() {
            let line = line.context("error reading stdin")?;
            lines.push(line.trim_end_matches('\r').to_string());
        }
        let prompt = lines.join("\n");
        if !prompt.is_empty() {
            return Ok(prompt);
        }
        if args.is_empty() {
            bail!("no prompt provided via stdin");
        }
    }

    if args.is_empty() {
        bail!("no prompt provided");
    }
    Ok(args.join(" "))
}

pub fn oracle_prompt(prompt: &str) -> String {
    format!("{}{}", ORACLE_INSTRUCTION, prompt)
}

/// Tell the librarian where it was invoked from, since it runs from `$HOME`.
pub fn with_invoked_dir(invoked_dir: &Path, prompt: &str) -> String {
    format!(
        "Invoked Dir (CWD): {}\n(use as fallback if no dir specified to search)\n\n{}",
        invoked_dir.display(),
        prompt
    )
}

/// List referenced directories ahead of the prompt. No-op without dirs.
pub fn with_referenced_dirs(dirs: &[String], prompt: &str) -> String {
    if dirs.is_empty() {
        return prompt.to_string();
    }
    let mut out = String::from("Referenced Project/Repositories directories:\n");
    for dir in dirs {
        out.push_str(&format!("- {}\n", dir));
    }
    out.push('\n');
    out.push_str(prompt);
    out
}

/// Base name of the current directory, used in usage hints.
pub fn current_dir_name() -> String {
    std::env::current_dir()
        .ok()
        .and_then(|d| d.file_name().map(|n| n.to_string_lossy().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}
