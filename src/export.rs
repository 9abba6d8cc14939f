//! Database-usage export.
//!
//! Walks a source tree and writes plain-text bundles for AI assistants and
//! documentation:
//!
//! | Output | Content |
//! |--------|---------|
//! | `<folder>_impl.txt` | usage blocks from `internal/<folder>/…` |
//! | `<a>_<b>.txt` | usage blocks grouped by the first two folders |
//! | `all_edges.txt` | every `edges.go` file and every file under an `edges/` dir |
//! | `all_entities.txt` | every `entity.go` file |
//! | `<dir>_api.txt` | full contents of each API subdirectory |
//!
//! Each usage block is introduced by a `// <path>:<start>-<end>` header
//! (1-based, inclusive) so it can be traced back to the source.

use agent_harness_core::scan::{collect_blocks, Block};
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::config::ExportConfig;
use crate::models::SourceFile;
use crate::progress::{ExportProgressEvent, ExportProgressReporter};
use crate::walk::{relative_slash_path, walk_source_tree};

pub const EDGES_OUTPUT: &str = "all_edges.txt";
pub const ENTITIES_OUTPUT: &str = "all_entities.txt";

/// Counts reported after an export run.
#[derive(Debug, Default)]
pub struct ExportSummary {
    pub files_scanned: u64,
    pub blocks: u64,
    pub outputs: Vec<PathBuf>,
}

/// Where a walked file's content ends up.
enum FileRole {
    Edges,
    Entity,
    Usage,
}

fn classify(file: &SourceFile) -> FileRole {
    let base = file.path.file_name().and_then(|n| n.to_str());
    let parent = file
        .path
        .parent()
        .and_then(|p| p.file_name())
        .and_then(|n| n.to_str());

    match (base, parent) {
        (Some("edges.go"), _) | (_, Some("edges")) => FileRole::Edges,
        (Some("entity.go"), _) => FileRole::Entity,
        _ => FileRole::Usage,
    }
}

pub struct UsageExporter<'a> {
    config: &'a ExportConfig,
    root: PathBuf,
    output_folder: PathBuf,
    api_root: PathBuf,
    reporter: Box<dyn ExportProgressReporter>,
}

impl<'a> UsageExporter<'a> {
    /// Resolve paths against `config.root` and create the output folder.
    pub fn new(config: &'a ExportConfig, reporter: Box<dyn ExportProgressReporter>) -> Result<Self> {
        let root = std::path::absolute(&config.root)
            .with_context(|| format!("Failed to resolve export root: {}", config.root.display()))?;
        let output_folder = resolve_under(&root, &config.output);
        let api_root = resolve_under(&root, &config.api_root);

        std::fs::create_dir_all(&output_folder).with_context(|| {
            format!(
                "Failed to create output folder: {}",
                output_folder.display()
            )
        })?;

        Ok(Self {
            config,
            root,
            output_folder,
            api_root,
            reporter,
        })
    }

    pub fn output_folder(&self) -> &Path {
        &self.output_folder
    }

    /// Export usage blocks, edge/entity bundles, and API folders.
    pub fn run(&self) -> Result<ExportSummary> {
        let mut summary = ExportSummary::default();
        self.export_usage(&mut summary)?;
        self.export_api_subfolders(&mut summary)?;
        Ok(summary)
    }

    fn export_usage(&self, summary: &mut ExportSummary) -> Result<()> {
        let mut ignored = self.config.ignored_dirs.clone();
        if let Some(name) = self.output_folder.file_name() {
            ignored.push(name.to_string_lossy().to_string());
        }

        let files = walk_source_tree(&self.root, &ignored, &self.config.exclude_globs)?;
        let total = files.len() as u64;
        self.reporter
            .report(ExportProgressEvent::Discovered { files: total });

        let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut edges = Vec::new();
        let mut entities = Vec::new();

        for (i, file) in files.iter().enumerate() {
            summary.files_scanned += 1;
            self.reporter.report(ExportProgressEvent::Scanning {
                n: i as u64 + 1,
                total,
            });

            match classify(file) {
                FileRole::Edges => edges.extend(read_full_file(file)),
                FileRole::Entity => entities.extend(read_full_file(file)),
                FileRole::Usage => {
                    let blocks = self.collect_file_blocks(file);
                    if !blocks.is_empty() {
                        summary.blocks += blocks.len() as u64;
                        grouped
                            .entry(two_folder_key(&file.relative))
                            .or_default()
                            .extend(blocks);
                    }
                }
            }
        }

        // Distinct keys can share an output name; concatenate in key order.
        let mut outputs: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (key, blocks) in grouped {
            outputs.entry(output_name(&key)).or_default().extend(blocks);
        }

        for (name, blocks) in &outputs {
            self.write_output(name, blocks, summary)?;
        }
        if !edges.is_empty() {
            self.write_output(EDGES_OUTPUT, &edges, summary)?;
        }
        if !entities.is_empty() {
            self.write_output(ENTITIES_OUTPUT, &entities, summary)?;
        }

        Ok(())
    }

    /// Rendered usage blocks for one file; empty when the file is
    /// unreadable, irrelevant, or has no trigger lines.
    fn collect_file_blocks(&self, file: &SourceFile) -> Vec<String> {
        let Ok(bytes) = std::fs::read(&file.path) else {
            return Vec::new();
        };
        let content = String::from_utf8_lossy(&bytes);
        let ext = file.path.extension().and_then(|e| e.to_str());

        let markers = &self.config.markers;
        if !markers.file_is_relevant(ext, &content) {
            return Vec::new();
        }

        let lines: Vec<&str> = content.split('\n').collect();
        let triggers = markers.find_triggers(&lines);
        if triggers.is_empty() {
            return Vec::new();
        }

        let blocks = collect_blocks(&lines, &triggers, self.config.max_block_length);
        if !blocks.is_empty() {
            self.reporter.report(ExportProgressEvent::Blocks {
                file: file.relative.clone(),
                blocks: blocks.clone(),
            });
        }

        blocks
            .iter()
            .map(|block| render_block(&file.relative, &lines, *block))
            .collect()
    }

    fn export_api_subfolders(&self, summary: &mut ExportSummary) -> Result<()> {
        if !self.api_root.is_dir() {
            return Ok(());
        }

        let Ok(entries) = std::fs::read_dir(&self.api_root) else {
            return Ok(());
        };

        let mut dir_names: Vec<String> = entries
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect();
        dir_names.sort();

        for dir_name in dir_names {
            let contents = self.gather_api_contents(&self.api_root.join(&dir_name))?;
            if contents.is_empty() {
                continue;
            }
            self.write_output(&format!("{}_api.txt", dir_name), &contents, summary)?;
        }

        Ok(())
    }

    fn gather_api_contents(&self, subdir: &Path) -> Result<Vec<String>> {
        let mut files = walk_source_tree(subdir, &[], &[])?;
        files.sort_by(|a, b| a.path.cmp(&b.path));

        let mut chunks = Vec::new();
        for file in files {
            let Ok(bytes) = std::fs::read(&file.path) else {
                continue;
            };
            let rel = relative_slash_path(&self.root, &file.path);
            chunks.push(format!("// {}\n{}\n", rel, String::from_utf8_lossy(&bytes)));
        }
        Ok(chunks)
    }

    fn write_output(&self, name: &str, parts: &[String], summary: &mut ExportSummary) -> Result<()> {
        let path = self.output_folder.join(name);
        std::fs::write(&path, parts.concat())
            .with_context(|| format!("Failed to write {}", path.display()))?;

        self.reporter.report(ExportProgressEvent::Wrote {
            output: name.to_string(),
            entries: parts.len() as u64,
        });
        summary.outputs.push(path);
        Ok(())
    }
}

fn resolve_under(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

/// Whole-file bundle entry: `// <rel>\n<content>\n\n`.
fn read_full_file(file: &SourceFile) -> Option<String> {
    let bytes = std::fs::read(&file.path).ok()?;
    Some(format!(
        "// {}\n{}\n\n",
        file.relative,
        String::from_utf8_lossy(&bytes)
    ))
}

/// Render one block with its `// <rel>:<start>-<end>` header (1-based).
pub fn render_block(relative: &str, lines: &[&str], block: Block) -> String {
    format!(
        "// {}:{}-{}\n{}\n",
        relative,
        block.start + 1,
        block.end + 1,
        lines[block.start..=block.end].join("\n")
    )
}

/// Grouping key: first two folders for deep paths, the folder for files
/// one level down, `root` for top-level files.
pub fn two_folder_key(relative: &str) -> String {
    let parts: Vec<&str> = relative.split('/').collect();
    match parts.len() {
        n if n > 2 => format!("{}/{}", parts[0], parts[1]),
        2 => parts[0].to_string(),
        _ => "root".to_string(),
    }
}

/// Output file name for a grouping key.
pub fn output_name(key: &str) -> String {
    match key.strip_prefix("internal/") {
        Some(rest) => {
            let folder = rest.split('/').next().filter(|f| !f.is_empty());
            format!("{}_impl.txt", folder.unwrap_or("internal"))
        }
        None => format!("{}.txt", key.replace('/', "_")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoProgress;
    use std::fs;
    use tempfile::TempDir;

    const REPO_GO: &str = r#"package users

import "github.com/rlch/neogo"

func (r *Repo) Find(ctx context.Context, id string) error {
	return r.db.Exec(ctx, func(tx Tx) error {
		return tx.Run(ctx, `MATCH (u:User {id: $id}) RETURN u`)
	})
}

func helper() int {
	return 1
}
"#;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn fixture() -> TempDir {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        write(root, "internal/users/repo.go", REPO_GO);
        write(root, "internal/users/edges.go", "package users\n\ntype Follows struct{}\n");
        write(root, "internal/graph/edges/owns.go", "package edges\n");
        write(root, "internal/courses/entity.go", "package courses\n\ntype Course struct{}\n");
        write(root, "cmd/main.go", "package main\n\nfunc main() {}\n");
        write(root, "vendor/lib/db.go", "db.Exec(ctx, \"MATCH (n) RETURN n\")\n");
        write(root, "scripts/seed.cypher", "// seed\nMERGE (n:Seed)\nRETURN n\n");
        write(root, "tools/gen.py", "q = 'MATCH (n) RETURN n'\n");
        write(root, "api/users/handler.go", "package users\n");
        write(root, "api/users/v1/routes.go", "package v1\n");
        write(root, "api/courses/schema.graphql", "type Course { id: ID }\n");
        tmp
    }

    fn config_for(root: &Path) -> ExportConfig {
        ExportConfig {
            root: root.to_path_buf(),
            ..ExportConfig::default()
        }
    }

    #[test]
    fn grouping_keys() {
        assert_eq!(two_folder_key("internal/users/repo.go"), "internal/users");
        assert_eq!(two_folder_key("a/b/c/d.go"), "a/b");
        assert_eq!(two_folder_key("cmd/main.go"), "cmd");
        assert_eq!(two_folder_key("main.go"), "root");
    }

    #[test]
    fn output_names() {
        assert_eq!(output_name("internal/users"), "users_impl.txt");
        assert_eq!(output_name("internal"), "internal.txt");
        assert_eq!(output_name("pkg/store"), "pkg_store.txt");
        assert_eq!(output_name("root"), "root.txt");
    }

    #[test]
    fn render_block_uses_one_based_range() {
        let lines = ["a", "b", "c"];
        let text = render_block("x/y.go", &lines, Block { start: 1, end: 2 });
        assert_eq!(text, "// x/y.go:2-3\nb\nc\n");
    }

    #[test]
    fn exports_usage_blocks_per_folder() {
        let tmp = fixture();
        let config = config_for(tmp.path());
        let exporter = UsageExporter::new(&config, Box::new(NoProgress)).unwrap();
        let summary = exporter.run().unwrap();
        let out = exporter.output_folder();

        let users = fs::read_to_string(out.join("users_impl.txt")).unwrap();
        assert!(users.starts_with("// internal/users/repo.go:5-9\n"));
        assert!(users.contains("return r.db.Exec(ctx, func(tx Tx) error {"));
        assert!(users.contains("\t})\n}\n"));
        assert!(!users.contains("helper"));

        let scripts = fs::read_to_string(out.join("scripts.txt")).unwrap();
        assert!(scripts.contains("MERGE (n:Seed)"));

        assert!(!out.join("cmd.txt").exists());
        assert!(!out.join("vendor_lib.txt").exists());
        assert!(!out.join("tools.txt").exists());
        assert!(summary.blocks >= 2);
    }

    #[test]
    fn bundles_edges_and_entities() {
        let tmp = fixture();
        let config = config_for(tmp.path());
        let exporter = UsageExporter::new(&config, Box::new(NoProgress)).unwrap();
        exporter.run().unwrap();
        let out = exporter.output_folder();

        let edges = fs::read_to_string(out.join(EDGES_OUTPUT)).unwrap();
        assert!(edges.contains("// internal/graph/edges/owns.go\npackage edges\n\n\n"));
        assert!(edges.contains("// internal/users/edges.go\n"));

        let entities = fs::read_to_string(out.join(ENTITIES_OUTPUT)).unwrap();
        assert!(entities.starts_with("// internal/courses/entity.go\npackage courses"));
    }

    #[test]
    fn exports_api_subfolders() {
        let tmp = fixture();
        let config = config_for(tmp.path());
        let exporter = UsageExporter::new(&config, Box::new(NoProgress)).unwrap();
        exporter.run().unwrap();
        let out = exporter.output_folder();

        let users = fs::read_to_string(out.join("users_api.txt")).unwrap();
        assert_eq!(
            users,
            "// api/users/handler.go\npackage users\n\n// api/users/v1/routes.go\npackage v1\n\n"
        );
        assert!(out.join("courses_api.txt").exists());
    }

    #[test]
    fn missing_api_root_is_not_an_error() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "main.go", "package main\n");
        let config = config_for(tmp.path());
        let exporter = UsageExporter::new(&config, Box::new(NoProgress)).unwrap();
        let summary = exporter.run().unwrap();
        assert!(summary.outputs.is_empty());
    }

    #[test]
    fn previous_exports_are_not_rescanned() {
        let tmp = fixture();
        let config = config_for(tmp.path());
        UsageExporter::new(&config, Box::new(NoProgress))
            .unwrap()
            .run()
            .unwrap();

        let exporter = UsageExporter::new(&config, Box::new(NoProgress)).unwrap();
        exporter.run().unwrap();
        assert!(!exporter.output_folder().join("exports.txt").exists());
    }

    #[test]
    fn absolute_output_folder_is_kept() {
        let tmp = fixture();
        let elsewhere = TempDir::new().unwrap();
        let config = ExportConfig {
            output: elsewhere.path().join("out"),
            ..config_for(tmp.path())
        };
        let exporter = UsageExporter::new(&config, Box::new(NoProgress)).unwrap();
        exporter.run().unwrap();
        assert!(elsewhere.path().join("out").join("users_impl.txt").exists());
    }
}
