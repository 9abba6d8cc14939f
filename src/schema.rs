//! Graph database schema export.
//!
//! Runs `cypher-shell` inside the database pod through `kubectl exec`, then
//! normalizes the plain-format output into pretty-printed JSON with sorted
//! keys.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::config::SchemaConfig;

/// Characters of raw output quoted in a decode error.
const ERROR_SNIPPET_CHARS: usize = 200;

/// Normalize and validate a target name against the configured targets.
pub fn resolve_target(config: &SchemaConfig, target: &str) -> Result<String> {
    let normalized = target.trim().to_lowercase();
    if !config.targets.iter().any(|t| *t == normalized) {
        bail!("target must be one of [{}]", config.targets.join(", "));
    }
    Ok(normalized)
}

/// Schema file name for a target.
pub fn schema_file_name(target: &str) -> String {
    format!("neo4j_database_schema_{}.txt", target)
}

/// Export the schema of `target` into `output_dir`, returning the absolute
/// path of the written file.
pub fn export_schema(config: &SchemaConfig, target: &str, output_dir: &Path) -> Result<PathBuf> {
    let target = resolve_target(config, target)?;

    let password = std::env::var(&config.password_env).with_context(|| {
        format!(
            "Database password not set: export it as {}",
            config.password_env
        )
    })?;

    let pod = format!("{}-neo4j-1-0", target);
    tracing::debug!(pod = %pod, namespace = %config.namespace, "running schema query");

    let output = Command::new(&config.kubectl)
        .args(["exec", "-n", &config.namespace, &pod, "-c", &config.container, "--"])
        .args(["cypher-shell", "--format", "plain", "-u", &config.user, "-p"])
        .arg(&password)
        .arg(&config.query)
        .output()
        .with_context(|| format!("Failed to run {}", config.kubectl))?;

    if !output.status.success() {
        let mut combined = String::from_utf8_lossy(&output.stdout).to_string();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        bail!(
            ":: Schema export skipped due to error, other files have been exported: {}",
            combined.trim()
        );
    }

    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;
    let path = std::path::absolute(output_dir.join(schema_file_name(&target)))?;
    postprocess_schema_output(&String::from_utf8_lossy(&output.stdout), &path)?;
    Ok(path)
}

/// Write the normalized form of raw `cypher-shell` output to `path`.
///
/// Empty output produces an empty file.
pub fn postprocess_schema_output(raw: &str, path: &Path) -> Result<()> {
    let content = match extract_schema_json(raw)? {
        Some(json) => json,
        None => String::new(),
    };
    std::fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))
}

/// Strip the header line and blank lines, unwrap a quoted JSON string, and
/// pretty-print the result. Returns `None` when nothing is left.
pub fn extract_schema_json(raw: &str) -> Result<Option<String>> {
    let body = raw
        .lines()
        .skip(1)
        .filter(|line| !line.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    let body = body.trim();
    if body.is_empty() {
        return Ok(None);
    }

    let text = if body.starts_with('"') {
        serde_json::from_str::<String>(body).unwrap_or_else(|_| body.to_string())
    } else {
        body.to_string()
    };

    let value: serde_json::Value = match serde_json::from_str(&text) {
        Ok(value) => value,
        Err(_) => {
            let snippet: String = text
                .chars()
                .take(ERROR_SNIPPET_CHARS)
                .map(|c| if c == '\n' { ' ' } else { c })
                .collect();
            bail!("Unexpected schema output format, cannot decode JSON: {}", snippet);
        }
    };

    let mut pretty = serde_json::to_string_pretty(&value)?;
    if !pretty.ends_with('\n') {
        pretty.push('\n');
    }
    Ok(Some(pretty))
}
