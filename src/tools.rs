//! Agent-backed command-line tools.
//!
//! Each tool sends one prompt to a named agent on the local agent server
//! and prints the reply. They differ in where the prompt comes from, which
//! directory the agent works in, how long the call may take, and whether
//! sessions live in the isolated data dir:
//!
//! | Tool | Input | Work dir | Timeout | Isolated |
//! |------|-------|----------|---------|----------|
//! | `big-brain` | stdin or args | cwd | 10 min | yes |
//! | `session-hunter` | stdin or args | cwd | 10 min | yes |
//! | `local-librarian` | stdin | `$HOME` | 15 min | yes |
//! | `db-oracle` | stdin | metarepo | 30 min | yes |
//! | `web-search` | stdin or args | cwd | 10 min | yes |
//! | `branch-namer` | stdin or args | temp dir | 2 min | no |

use anyhow::{anyhow, bail, Result};
use std::collections::BTreeMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::agent::client::{print_follow_up, with_retries, AgentClient, ConnectOptions};
use crate::config::{home_dir, Config};
use crate::models::{AgentOptions, AgentResult, ModelRef};
use crate::prompt;
use crate::session_log::{check_session_id, SessionLog};

/// Set in a spawned server's environment so a web-search agent cannot call
/// back into web-search.
pub const WEB_SEARCH_GUARD_ENV: &str = "_WEB_SEARCH_RUNNING";

const WEB_SEARCH_ATTEMPTS: u32 = 2;
const WEB_SEARCH_RETRY_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    BigBrain,
    SessionHunter,
    LocalLibrarian,
    DbOracle,
    WebSearch,
    BranchNamer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkDir {
    Current,
    Home,
    Metarepo,
    Temp,
}

/// Static behavior of a tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolProfile {
    pub timeout: Duration,
    pub isolated: bool,
    pub autostart: bool,
    pub stdin_only: bool,
    pub work_dir: WorkDir,
    /// Whether the run gets a session transcript, banners, and a follow-up
    /// hint.
    pub interactive: bool,
}

impl ToolKind {
    /// Agent name, log directory name, and subcommand name.
    pub fn name(&self) -> &'static str {
        match self {
            ToolKind::BigBrain => "big-brain",
            ToolKind::SessionHunter => "session-hunter",
            ToolKind::LocalLibrarian => "local-librarian",
            ToolKind::DbOracle => "db-oracle",
            ToolKind::WebSearch => "web-search",
            ToolKind::BranchNamer => "branch-namer",
        }
    }

    pub fn profile(&self) -> ToolProfile {
        let minutes = |m: u64| Duration::from_secs(m * 60);
        let standard = ToolProfile {
            timeout: minutes(10),
            isolated: true,
            autostart: true,
            stdin_only: false,
            work_dir: WorkDir::Current,
            interactive: true,
        };

        match self {
            ToolKind::BigBrain | ToolKind::SessionHunter | ToolKind::WebSearch => standard,
            ToolKind::LocalLibrarian => ToolProfile {
                timeout: minutes(15),
                stdin_only: true,
                work_dir: WorkDir::Home,
                ..standard
            },
            ToolKind::DbOracle => ToolProfile {
                timeout: minutes(30),
                stdin_only: true,
                work_dir: WorkDir::Metarepo,
                ..standard
            },
            ToolKind::BranchNamer => ToolProfile {
                timeout: minutes(2),
                isolated: false,
                autostart: false,
                work_dir: WorkDir::Temp,
                interactive: false,
                ..standard
            },
        }
    }
}

/// Databases the db-oracle agent knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Database {
    Resources,
    Learning,
    Teaching,
}

impl Database {
    pub fn as_str(&self) -> &'static str {
        match self {
            Database::Resources => "resources",
            Database::Learning => "learning",
            Database::Teaching => "teaching",
        }
    }
}

/// One tool invocation as parsed from the command line.
#[derive(Debug, Clone)]
pub struct ToolRequest {
    pub kind: ToolKind,
    pub args: Vec<String>,
    pub session: Option<String>,
    pub verbose: bool,
    pub db: Option<Database>,
    pub dirs: Vec<String>,
}

impl ToolRequest {
    pub fn new(kind: ToolKind) -> Self {
        Self {
            kind,
            args: Vec::new(),
            session: None,
            verbose: false,
            db: None,
            dirs: Vec::new(),
        }
    }
}

fn resolve_work_dir(work_dir: WorkDir, config: &Config) -> Result<PathBuf> {
    Ok(match work_dir {
        WorkDir::Current => std::env::current_dir()?,
        WorkDir::Home => home_dir(),
        WorkDir::Metarepo => config.agent.metarepo_dir.clone(),
        WorkDir::Temp => std::env::temp_dir(),
    })
}

/// Check preconditions that do not need the prompt.
fn preflight(request: &ToolRequest) -> Result<()> {
    if let Some(id) = &request.session {
        check_session_id(id)?;
    }
    match request.kind {
        ToolKind::WebSearch => {
            if std::env::var(WEB_SEARCH_GUARD_ENV).as_deref() == Ok("1") {
                bail!("web-search cannot be called recursively");
            }
        }
        ToolKind::DbOracle => {
            if request.db.is_none() {
                bail!(
                    "--db argument is required\n\
                     Usage: echo \"prompt\" | ah db-oracle --db <resources|learning|teaching> [-s SESSION_ID] [-v] [--dirs <dir1> <dir2> ...]\n\
                     Hint: You're currently in repo: '{}'",
                    prompt::current_dir_name()
                );
            }
        }
        _ => {}
    }
    Ok(())
}

/// Apply the tool's fixed context to the raw prompt.
pub fn decorate_prompt(request: &ToolRequest, raw: &str, invoked_dir: &std::path::Path) -> String {
    match request.kind {
        ToolKind::BigBrain => prompt::oracle_prompt(raw),
        ToolKind::LocalLibrarian => prompt::with_invoked_dir(invoked_dir, raw),
        ToolKind::DbOracle => prompt::with_referenced_dirs(&request.dirs, raw),
        _ => raw.to_string(),
    }
}

fn open_log(config: &Config, request: &ToolRequest) -> Option<Arc<SessionLog>> {
    if !request.kind.profile().interactive {
        return None;
    }
    let root = &config.logging.dir;
    let tool = request.kind.name();
    let opened = match &request.session {
        Some(id) => SessionLog::for_session(root, tool, id),
        None => SessionLog::create(root, tool),
    };
    match opened {
        Ok(log) => Some(Arc::new(log)),
        Err(e) => {
            eprintln!("Warning: could not setup logging: {:#}", e);
            None
        }
    }
}

/// Model and tool overrides for web-search: the newest free model with the
/// websearch tool on, else a fixed fallback with it off.
async fn web_search_options(client: &AgentClient) -> AgentOptions {
    let free = match client.find_best_free_model().await {
        Ok(model) => model,
        Err(e) => {
            eprintln!("Warning: could not query models: {:#}", e);
            None
        }
    };

    match free {
        Some(model) => {
            eprintln!("[web-search] Using free model: {}", model.model_ref());
            AgentOptions {
                tools: Some(BTreeMap::from([("websearch".to_string(), true)])),
                model: Some(model.model_ref()),
                ..AgentOptions::default()
            }
        }
        None => {
            let fallback = ModelRef::new("anthropic", "claude-haiku-4-5");
            eprintln!(
                "[web-search] No free opencode models, falling back to {} (websearch tool disabled)",
                fallback
            );
            AgentOptions {
                tools: Some(BTreeMap::from([("websearch".to_string(), false)])),
                model: Some(fallback),
                ..AgentOptions::default()
            }
        }
    }
}

async fn call_agent(
    client: &AgentClient,
    request: &ToolRequest,
    prompt: &str,
    work_dir: &str,
    opts: &AgentOptions,
) -> Result<AgentResult> {
    let agent = request.kind.name();
    let once = move || async move {
        match &request.session {
            Some(id) => client.continue_session(id, agent, prompt, work_dir, opts).await,
            None => client.run_agent(agent, prompt, work_dir, opts).await,
        }
    };

    if request.kind == ToolKind::WebSearch {
        with_retries(WEB_SEARCH_ATTEMPTS, WEB_SEARCH_RETRY_DELAY, once).await
    } else {
        once().await
    }
}

/// Run one tool end to end: read and decorate the prompt, reach the
/// server, call the agent, and print the reply on stdout.
pub async fn run_tool(config: &Config, request: ToolRequest) -> Result<()> {
    let profile = request.kind.profile();
    let tool = request.kind.name();

    preflight(&request)?;

    let log = open_log(config, &request);
    if let Some(log) = &log {
        log.log(format!(
            "Arguments: session={:?}, verbose={}, db={:?}, dirs={:?}",
            request.session,
            request.verbose,
            request.db.map(|d| d.as_str()),
            request.dirs
        ));
    }

    let outcome = run_logged(config, &request, profile, log.clone()).await;

    match (&outcome, &log) {
        (Ok(result), Some(log)) => {
            if request.session.is_none() {
                log.link_session(&result.session_id);
            }
            log.separator("RESULT");
            log.log(format!("Session ID: {}", result.session_id));
            log.log(format!("Output length: {} chars", result.output.chars().count()));
        }
        (Err(e), Some(log)) => log.log(format!("ERROR: {:#}", e)),
        _ => {}
    }
    if let Some(log) = &log {
        log.close();
        if request.verbose {
            eprintln!("[debug] Logs saved to: {}", log.path().display());
        }
    }

    let result = outcome?;
    println!("{}", result.output);
    if profile.interactive {
        print_follow_up(tool, &result.session_id);
    }
    Ok(())
}

async fn run_logged(
    config: &Config,
    request: &ToolRequest,
    profile: ToolProfile,
    log: Option<Arc<SessionLog>>,
) -> Result<AgentResult> {
    let raw = if profile.stdin_only {
        prompt::read_required_stdin()?
    } else {
        prompt::read_stdin_or_args(&request.args)?
    };

    let invoked_dir = std::env::current_dir()?;
    let prompt = decorate_prompt(request, &raw, &invoked_dir);
    let work_dir = resolve_work_dir(profile.work_dir, config)?;
    let work_dir = work_dir.to_string_lossy().to_string();

    if let Some(log) = &log {
        log.separator("INPUT");
        if let Some(db) = request.db {
            log.log(format!("Database: {}", db.as_str()));
        }
        log.log(format!("Raw prompt:\n{}", raw));
        log.log(format!("Final prompt:\n{}", prompt));
        log.separator("SDK SETUP");
        log.log(format!("Work directory: {}", work_dir));
    }
    tracing::info!(tool = request.kind.name(), work_dir = %work_dir, "running agent tool");

    let server_env = if request.kind == ToolKind::WebSearch {
        vec![(WEB_SEARCH_GUARD_ENV.to_string(), "1".to_string())]
    } else {
        Vec::new()
    };
    let connect = ConnectOptions {
        isolated: profile.isolated,
        autostart: profile.autostart,
        server_env,
    };

    let deadline = Instant::now() + profile.timeout;
    let client = bounded(
        request.kind.name(),
        profile.timeout,
        deadline,
        AgentClient::connect(&config.agent, connect, log.clone(), !profile.interactive),
    )
    .await?;

    let call = agent_call(&client, request, &prompt, &work_dir, log.as_deref());
    let outcome = bounded(request.kind.name(), profile.timeout, deadline, call).await;

    client.close().await;
    outcome
}

/// Await `fut` until `deadline`, failing early on Ctrl-C.
async fn bounded<T>(
    tool: &str,
    timeout: Duration,
    deadline: Instant,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        res = tokio::time::timeout_at(deadline, fut) => match res {
            Ok(result) => result,
            Err(_) => Err(anyhow!("{} timed out after {:?}", tool, timeout)),
        },
        _ = tokio::signal::ctrl_c() => Err(anyhow!("interrupted")),
    }
}

/// Pick the tool's agent options, then send the prompt.
async fn agent_call(
    client: &AgentClient,
    request: &ToolRequest,
    prompt: &str,
    work_dir: &str,
    log: Option<&SessionLog>,
) -> Result<AgentResult> {
    let opts = match request.kind {
        ToolKind::WebSearch => web_search_options(client).await,
        ToolKind::BranchNamer => AgentOptions {
            auto_cleanup: true,
            title: Some("branch-namer-tmp".to_string()),
            ..AgentOptions::default()
        },
        _ => AgentOptions::default(),
    };

    if let Some(log) = log {
        log.separator("AGENT CALL");
        match &request.session {
            Some(id) => log.log(format!("Continuing existing session: {}", id)),
            None => log.log("Starting new session"),
        }
    }

    call_agent(client, request, prompt, work_dir, &opts).await
}
