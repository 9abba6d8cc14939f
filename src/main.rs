//! # Agent Harness CLI (`ah`)
//!
//! ## Usage
//!
//! ```bash
//! ah --config ./config/ah.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ah export [TARGET]` | Export database usage blocks, bundles, and optionally the schema |
//! | `ah schema <TARGET>` | Export only the database schema |
//! | `ah big-brain` | Ask the read-only advisory agent |
//! | `ah session-hunter` | Search past agent sessions |
//! | `ah local-librarian` | Search local repositories (stdin prompt) |
//! | `ah db-oracle --db <DB>` | Ask the database agent (stdin prompt) |
//! | `ah web-search` | Search the web through a free model |
//! | `ah branch-namer` | Turn a PR title into a branch name |
//!
//! ## Examples
//!
//! ```bash
//! ah export learning --export ./exports
//! echo "How should we split the auth module?" | ah big-brain
//! ah big-brain -s ses_abc123 "go deeper on the migration plan"
//! cat prompt.txt | ah db-oracle --db resources --dirs backend/app frontend/src
//! ah branch-namer "Fix token refresh race"
//! ```

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use agent_harness::config;
use agent_harness::export::UsageExporter;
use agent_harness::progress::ProgressMode;
use agent_harness::schema;
use agent_harness::tools::{run_tool, Database, ToolKind, ToolRequest};

/// Agent Harness: database usage export and agent-backed helper tools.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. A missing file means built-in defaults.
#[derive(Parser)]
#[command(name = "ah", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/ah.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Flags shared by the session-based tools.
#[derive(Args, Debug)]
struct SessionArgs {
    /// Continue an existing session.
    #[arg(short = 's', long = "session", value_name = "SESSION_ID")]
    session: Option<String>,

    /// Print where the session log was written.
    #[arg(short = 'v', long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Export database usage blocks and bundles.
    ///
    /// Walks the source tree, extracts every block that talks to the graph
    /// database, and writes grouped text files. With a TARGET, the live
    /// schema of that database is exported too.
    Export {
        /// Database target whose schema to export (e.g. `learning`).
        target: Option<String>,

        /// Output folder, overriding `export.output`.
        #[arg(long, value_name = "DIR")]
        export: Option<PathBuf>,

        /// Source root, overriding `export.root`.
        #[arg(long, value_name = "DIR")]
        root: Option<PathBuf>,

        /// Progress on stderr. Defaults to `human` on a terminal.
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,
    },

    /// Export the live database schema as sorted, pretty-printed JSON.
    Schema {
        /// Database target (e.g. `learning`).
        target: String,

        /// Output folder, overriding `export.output`.
        #[arg(long, value_name = "DIR")]
        export: Option<PathBuf>,
    },

    /// Ask the read-only advisory agent for analysis, plans, or reviews.
    BigBrain {
        #[command(flatten)]
        session: SessionArgs,
        /// Prompt text, used when nothing is piped on stdin.
        prompt: Vec<String>,
    },

    /// Search past agent sessions.
    SessionHunter {
        #[command(flatten)]
        session: SessionArgs,
        /// Prompt text, used when nothing is piped on stdin.
        prompt: Vec<String>,
    },

    /// Search local repositories. The prompt must be piped on stdin and
    /// should name the directory to search.
    LocalLibrarian {
        #[command(flatten)]
        session: SessionArgs,
    },

    /// Ask the database agent. The prompt must be piped on stdin.
    DbOracle {
        #[command(flatten)]
        session: SessionArgs,

        /// Database to query.
        #[arg(long, value_enum)]
        db: Option<Database>,

        /// Project or repository directories to reference in the prompt.
        #[arg(long, num_args = 1.., value_name = "DIR")]
        dirs: Vec<String>,
    },

    /// Search the web through a free model with the websearch tool.
    WebSearch {
        #[command(flatten)]
        session: SessionArgs,
        /// Prompt text, used when nothing is piped on stdin.
        prompt: Vec<String>,
    },

    /// Turn a PR title or description into a kebab-case branch name.
    ///
    /// The session is deleted afterwards and only the agent's reply is
    /// printed.
    BranchNamer {
        /// PR title, used when nothing is piped on stdin.
        prompt: Vec<String>,
    },
}

fn tool_request(kind: ToolKind, session: SessionArgs, prompt: Vec<String>) -> ToolRequest {
    ToolRequest {
        args: prompt,
        session: session.session,
        verbose: session.verbose,
        ..ToolRequest::new(kind)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Export {
            target,
            export,
            root,
            progress,
        } => {
            let mut export_cfg = cfg.export.clone();
            if let Some(root) = root {
                export_cfg.root = root;
            }
            if let Some(dir) = export {
                export_cfg.output = dir;
            }
            let target = target
                .map(|t| schema::resolve_target(&cfg.schema, &t))
                .transpose()?;

            let mode = progress.unwrap_or_else(ProgressMode::default_for_tty);
            let exporter = UsageExporter::new(&export_cfg, mode.reporter())?;
            let summary = exporter.run()?;
            tracing::info!(
                files = summary.files_scanned,
                blocks = summary.blocks,
                outputs = summary.outputs.len(),
                "usage export finished"
            );

            let schema_path = match target {
                Some(target) => Some(schema::export_schema(
                    &cfg.schema,
                    &target,
                    exporter.output_folder(),
                )?),
                None => None,
            };

            println!(
                "All extracted blocks and files saved to '{}'",
                exporter.output_folder().display()
            );
            if let Some(path) = schema_path {
                println!("Schema export saved to '{}'", path.display());
            }
        }
        Commands::Schema { target, export } => {
            let output = match export {
                Some(dir) => dir,
                None => cfg.export.root.join(&cfg.export.output),
            };
            let path = schema::export_schema(&cfg.schema, &target, &output)?;
            println!("Schema export saved to '{}'", path.display());
        }
        Commands::BigBrain { session, prompt } => {
            run_tool(&cfg, tool_request(ToolKind::BigBrain, session, prompt)).await?;
        }
        Commands::SessionHunter { session, prompt } => {
            run_tool(&cfg, tool_request(ToolKind::SessionHunter, session, prompt)).await?;
        }
        Commands::LocalLibrarian { session } => {
            run_tool(
                &cfg,
                tool_request(ToolKind::LocalLibrarian, session, Vec::new()),
            )
            .await?;
        }
        Commands::DbOracle { session, db, dirs } => {
            let request = ToolRequest {
                db,
                dirs,
                ..tool_request(ToolKind::DbOracle, session, Vec::new())
            };
            run_tool(&cfg, request).await?;
        }
        Commands::WebSearch { session, prompt } => {
            run_tool(&cfg, tool_request(ToolKind::WebSearch, session, prompt)).await?;
        }
        Commands::BranchNamer { prompt } => {
            let request = ToolRequest {
                args: prompt,
                ..ToolRequest::new(ToolKind::BranchNamer)
            };
            run_tool(&cfg, request).await?;
        }
    }

    Ok(())
}
