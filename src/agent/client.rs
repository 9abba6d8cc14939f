//! Session-level agent client.
//!
//! Wraps an [`AgentBackend`] with the behavior every tool shares: locating
//! or starting the server, creating and continuing sessions, printing
//! session banners on stderr, and recording each step in the tool's
//! [`SessionLog`].

use anyhow::{anyhow, Context, Result};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::http::HttpBackend;
use super::server::{launch, ManagedServer, ServerLaunch, ServerState};
use super::{AgentBackend, Part, PromptRequest, ProvidersResponse};
use crate::config::AgentConfig;
use crate::models::{AgentOptions, AgentResult, FreeModel};
use crate::session_log::{truncate_for_log, SessionLog};

/// Provider whose zero-cost models qualify as free.
pub const FREE_PROVIDER: &str = "opencode";

const RULE: &str = "────────────────────────────────────────────────────────────────";
const PROMPT_LOG_LIMIT: usize = 2000;
const OUTPUT_LOG_LIMIT: usize = 5000;
const CLEANUP_TIMEOUT: Duration = Duration::from_secs(10);

/// How a tool reaches its server.
#[derive(Debug, Clone, Default)]
pub struct ConnectOptions {
    /// Use the isolated port and data dir.
    pub isolated: bool,
    /// Spawn a server when none answers.
    pub autostart: bool,
    /// Extra environment for a spawned server.
    pub server_env: Vec<(String, String)>,
}

pub struct AgentClient {
    backend: Box<dyn AgentBackend>,
    log: Option<Arc<SessionLog>>,
    server: Option<ManagedServer>,
    quiet: bool,
}

/// Resolves on Ctrl-C; never resolves if the handler cannot be installed.
async fn ctrl_c() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}

impl AgentClient {
    pub fn new(backend: Box<dyn AgentBackend>, log: Option<Arc<SessionLog>>, quiet: bool) -> Self {
        Self {
            backend,
            log,
            server: None,
            quiet,
        }
    }

    /// Connect to the configured server, starting one when allowed.
    ///
    /// A failed start is reported on stderr and the client carries on
    /// with the configured URL.
    pub async fn connect(
        config: &AgentConfig,
        opts: ConnectOptions,
        log: Option<Arc<SessionLog>>,
        quiet: bool,
    ) -> Result<Self> {
        let probe_timeout = Duration::from_secs(config.probe_timeout_secs);
        let base_url = config.base_url(opts.isolated);
        let backend = HttpBackend::new(&base_url, probe_timeout)?;

        let mut client = Self::new(Box::new(backend), log, quiet);
        client.note(format!("Creating client with baseURL: {}", base_url));
        client.note(format!("Isolated mode: {}", opts.isolated));

        if client.backend.health().await.is_ok() {
            client.note(format!("Server already running at: {}", base_url));
            return Ok(client);
        }
        if !opts.autostart {
            client.note("Server not running, autostart disabled");
            return Ok(client);
        }

        client.note("Server not running, starting...");
        let data_dir = if opts.isolated {
            std::fs::create_dir_all(&config.isolated_data_dir).with_context(|| {
                format!(
                    "Failed to create {}",
                    config.isolated_data_dir.display()
                )
            })?;
            Some(config.isolated_data_dir.clone())
        } else {
            None
        };
        let spec = ServerLaunch {
            binary: config.binary.clone(),
            hostname: config.hostname.clone(),
            port: config.port_for(opts.isolated),
            data_dir,
            env: opts.server_env,
            startup_timeout: Duration::from_secs(config.startup_timeout_secs),
        };

        match launch(&spec, ctrl_c()).await {
            (ServerState::Ready(url), server) => {
                client.note(format!("Server started at: {}", url));
                client.backend = Box::new(HttpBackend::new(&url, probe_timeout)?);
                client.server = server;
            }
            (state, _) => {
                let reason = match state {
                    ServerState::TimedOut => "server startup timeout".to_string(),
                    ServerState::Failed(reason) => reason,
                    ServerState::Starting | ServerState::Ready(_) => {
                        "server did not report a URL".to_string()
                    }
                };
                client.note(format!("ERROR: could not start server: {}", reason));
                tracing::warn!(reason = %reason, "agent server did not start");
                eprintln!("[agent] Warning: could not start server: {}", reason);
                eprintln!(
                    "[agent] Ensure '{}' is installed and in PATH",
                    config.binary
                );
            }
        }

        Ok(client)
    }

    fn note(&self, message: impl AsRef<str>) {
        if let Some(log) = &self.log {
            log.log(format!("[agent] {}", message.as_ref()));
        }
    }

    fn banner(&self, lines: &[String]) {
        if self.quiet {
            return;
        }
        eprintln!("\n{}", RULE);
        for line in lines {
            eprintln!("{}", line);
        }
        eprintln!("{}\n", RULE);
    }

    fn note_prompt(&self, prompt: &str, opts: &AgentOptions) {
        self.note(format!("Prompt length: {} chars", prompt.chars().count()));
        self.note(format!(
            "Prompt content:\n{}",
            truncate_for_log(prompt, PROMPT_LOG_LIMIT)
        ));
        self.note(format!(
            "Options: Tools={:?}, NoAgent={}, AutoCleanup={}",
            opts.tools, opts.no_agent, opts.auto_cleanup
        ));
        if let Some(model) = &opts.model {
            self.note(format!("Model override: {}", model));
        }
        if let Some(system) = &opts.system {
            self.note(format!("System prompt length: {}", system.len()));
        }
    }

    /// Start a new session with `agent` and send `prompt`.
    pub async fn run_agent(
        &self,
        agent: &str,
        prompt: &str,
        work_dir: &str,
        opts: &AgentOptions,
    ) -> Result<AgentResult> {
        self.note(format!("RunAgent called: agent={}, workDir={}", agent, work_dir));
        self.note_prompt(prompt, opts);

        let title = opts
            .title
            .clone()
            .unwrap_or_else(|| format!("{}-{}", agent, chrono::Utc::now().timestamp()));

        self.note("Creating new session...");
        let session = self
            .backend
            .create_session(work_dir, &title)
            .await
            .map_err(|e| {
                self.note(format!("ERROR: failed to create session: {:#}", e));
                anyhow!("failed to create session: {:#}", e)
            })?;
        self.note(format!("Session created: {}", session.id));

        self.banner(&[
            format!("Session started: {}", session.id),
            format!("If timeout occurs, continue with: -s {}", session.id),
        ]);

        let result = self.send(&session.id, agent, prompt, work_dir, opts).await;

        if opts.auto_cleanup {
            self.cleanup(&session.id, work_dir).await;
        }
        result
    }

    /// Send a follow-up prompt to an existing session.
    pub async fn continue_session(
        &self,
        session_id: &str,
        agent: &str,
        prompt: &str,
        work_dir: &str,
        opts: &AgentOptions,
    ) -> Result<AgentResult> {
        self.note(format!(
            "ContinueSession called: sessionID={}, agent={}, workDir={}",
            session_id, agent, work_dir
        ));
        self.note_prompt(prompt, opts);

        self.note("Verifying session exists...");
        self.backend.get_session(session_id).await.map_err(|e| {
            self.note(format!("ERROR: session not found: {:#}", e));
            anyhow!("session not found: {:#}", e)
        })?;
        self.note("Session verified");

        self.banner(&[format!("Continuing session: {}", session_id)]);

        self.send(session_id, agent, prompt, work_dir, opts).await
    }

    async fn send(
        &self,
        session_id: &str,
        agent: &str,
        prompt: &str,
        work_dir: &str,
        opts: &AgentOptions,
    ) -> Result<AgentResult> {
        let request = PromptRequest::build(agent, prompt, opts);

        self.note("Sending prompt to session (this may take a while)...");
        let started = Instant::now();
        let reply = self.backend.prompt(session_id, work_dir, &request).await;
        let elapsed = started.elapsed();

        let reply = reply.map_err(|e| {
            self.note(format!("ERROR: prompt failed after {:?}: {:#}", elapsed, e));
            anyhow!("failed to send prompt: {:#}", e)
        })?;

        self.note(format!("Prompt completed in {:?}", elapsed));
        self.note(format!("Response parts count: {}", reply.parts.len()));

        let output = extract_text(&reply.parts);
        self.note(format!("Extracted text length: {} chars", output.chars().count()));
        self.note(format!(
            "Response output:\n{}",
            truncate_for_log(&output, OUTPUT_LOG_LIMIT)
        ));

        Ok(AgentResult {
            output,
            session_id: session_id.to_string(),
        })
    }

    /// Best-effort session delete, bounded so a hung server cannot stall exit.
    async fn cleanup(&self, session_id: &str, work_dir: &str) {
        let delete = self.backend.delete_session(session_id, work_dir);
        match tokio::time::timeout(CLEANUP_TIMEOUT, delete).await {
            Ok(Ok(())) => self.note(format!("Session deleted: {}", session_id)),
            Ok(Err(e)) => self.note(format!("Session delete failed: {:#}", e)),
            Err(_) => self.note("Session delete timed out"),
        }
    }

    /// The newest zero-cost model of the free provider, if any.
    pub async fn find_best_free_model(&self) -> Result<Option<FreeModel>> {
        let providers = self
            .backend
            .providers()
            .await
            .context("failed to get providers")?;
        Ok(best_free_model(&providers))
    }

    /// Stop a server this client started.
    pub async fn close(mut self) {
        if let Some(server) = self.server.take() {
            self.note(format!("Stopping server at {}", server.url()));
            server.shutdown().await;
        }
    }
}

/// Join the non-empty text parts of a reply with newlines.
pub fn extract_text(parts: &[Part]) -> String {
    parts
        .iter()
        .filter(|p| p.kind == "text")
        .filter_map(|p| p.text.as_deref())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Pick the latest-released free model.
///
/// Free means provider [`FREE_PROVIDER`] with zero input and output cost.
/// Models that explicitly report `tool_call: false` are skipped; a missing
/// flag counts as supported.
pub fn best_free_model(providers: &ProvidersResponse) -> Option<FreeModel> {
    let mut best: Option<FreeModel> = None;

    for provider in providers.providers.iter().filter(|p| p.id == FREE_PROVIDER) {
        for (model_id, model) in &provider.models {
            if model.cost.input != 0.0 || model.cost.output != 0.0 {
                continue;
            }
            if model.tool_call == Some(false) {
                continue;
            }

            let newer = best
                .as_ref()
                .map_or(true, |b| model.release_date > b.release_date);
            if newer {
                best = Some(FreeModel {
                    provider_id: provider.id.clone(),
                    model_id: model_id.clone(),
                    name: model.name.clone(),
                    release_date: model.release_date.clone(),
                    tool_call: model.tool_call,
                });
            }
        }
    }

    best
}

/// Run `op` up to `attempts` times with a flat `delay` between tries,
/// printing `[retry n/N after error: e]` on stderr before each retry.
pub async fn with_retries<T, F, Fut>(attempts: u32, delay: Duration, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = attempts.max(1);
    let mut last_err = None;

    for attempt in 1..=attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                if attempt < attempts {
                    eprintln!("[retry {}/{} after error: {:#}]", attempt, attempts, e);
                    tokio::time::sleep(delay).await;
                }
                last_err = Some(e);
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow!("no attempts made")))
}

/// Stderr hint printed after a successful tool run.
pub fn print_follow_up(tool: &str, session_id: &str) {
    eprintln!("\n{}", RULE);
    eprintln!("Session completed: {}", session_id);
    eprintln!("To follow up: ah {} -s {}", tool, session_id);
    eprintln!("{}", RULE);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{ModelCost, PromptResponse, Provider, ProviderModel, Session};
    use crate::models::ModelRef;
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct MockState {
        calls: Vec<String>,
        requests: Vec<PromptRequest>,
    }

    #[derive(Clone, Default)]
    struct MockBackend {
        state: Arc<Mutex<MockState>>,
        known_sessions: Vec<String>,
        fail_prompt: bool,
    }

    impl MockBackend {
        fn calls(&self) -> Vec<String> {
            self.state.lock().unwrap().calls.clone()
        }
        fn record(&self, call: String) {
            self.state.lock().unwrap().calls.push(call);
        }
    }

    #[async_trait]
    impl AgentBackend for MockBackend {
        async fn health(&self) -> Result<()> {
            Ok(())
        }

        async fn create_session(&self, directory: &str, title: &str) -> Result<Session> {
            self.record(format!("create {} {}", directory, title));
            Ok(Session {
                id: "ses_new".to_string(),
                title: title.to_string(),
                directory: directory.to_string(),
            })
        }

        async fn get_session(&self, id: &str) -> Result<Session> {
            self.record(format!("get {}", id));
            if self.known_sessions.iter().any(|s| s == id) {
                Ok(Session {
                    id: id.to_string(),
                    title: String::new(),
                    directory: String::new(),
                })
            } else {
                Err(anyhow!("agent server error 404 Not Found"))
            }
        }

        async fn prompt(
            &self,
            id: &str,
            _directory: &str,
            request: &PromptRequest,
        ) -> Result<PromptResponse> {
            self.record(format!("prompt {}", id));
            self.state.lock().unwrap().requests.push(request.clone());
            if self.fail_prompt {
                return Err(anyhow!("agent server error 500"));
            }
            Ok(PromptResponse {
                info: serde_json::Value::Null,
                parts: vec![
                    Part::text("first"),
                    Part {
                        kind: "tool".to_string(),
                        text: None,
                    },
                    Part::text(""),
                    Part::text("second"),
                ],
            })
        }

        async fn delete_session(&self, id: &str, _directory: &str) -> Result<()> {
            self.record(format!("delete {}", id));
            Ok(())
        }

        async fn providers(&self) -> Result<ProvidersResponse> {
            Ok(ProvidersResponse::default())
        }
    }

    fn client_with(mock: &MockBackend) -> AgentClient {
        AgentClient::new(Box::new(mock.clone()), None, true)
    }

    #[tokio::test]
    async fn run_agent_creates_titled_session() {
        let mock = MockBackend::default();
        let client = client_with(&mock);

        let result = client
            .run_agent("big-brain", "why?", "/work", &AgentOptions::default())
            .await
            .unwrap();

        assert_eq!(result.session_id, "ses_new");
        assert_eq!(result.output, "first\nsecond");

        let calls = mock.calls();
        assert!(calls[0].starts_with("create /work big-brain-"));
        assert_eq!(calls[1], "prompt ses_new");
        assert_eq!(calls.len(), 2);

        let state = mock.state.lock().unwrap();
        let requests = &state.requests;
        assert_eq!(requests[0].agent.as_deref(), Some("big-brain"));
        assert_eq!(requests[0].parts[0].text, "why?");
    }

    #[tokio::test]
    async fn auto_cleanup_deletes_even_after_failure() {
        let mock = MockBackend {
            fail_prompt: true,
            ..MockBackend::default()
        };
        let client = client_with(&mock);
        let opts = AgentOptions {
            auto_cleanup: true,
            title: Some("branch-namer-tmp".to_string()),
            ..AgentOptions::default()
        };

        let err = client
            .run_agent("branch-namer", "Fix auth bug", "/tmp", &opts)
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("failed to send prompt"));

        let calls = mock.calls();
        assert_eq!(calls[0], "create /tmp branch-namer-tmp");
        assert_eq!(calls.last().unwrap(), "delete ses_new");
    }

    #[tokio::test]
    async fn continue_requires_existing_session() {
        let mock = MockBackend {
            known_sessions: vec!["ses_old".to_string()],
            ..MockBackend::default()
        };
        let client = client_with(&mock);

        let err = client
            .continue_session("ses_missing", "db-oracle", "q", "/w", &AgentOptions::default())
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("session not found"));

        let result = client
            .continue_session("ses_old", "db-oracle", "q", "/w", &AgentOptions::default())
            .await
            .unwrap();
        assert_eq!(result.session_id, "ses_old");
        assert_eq!(mock.calls().last().unwrap(), "prompt ses_old");
    }

    #[tokio::test]
    async fn options_reach_the_request() {
        let mock = MockBackend::default();
        let client = client_with(&mock);
        let opts = AgentOptions {
            tools: Some(BTreeMap::from([("websearch".to_string(), false)])),
            model: Some(ModelRef::new("anthropic", "claude-haiku-4-5")),
            ..AgentOptions::default()
        };
        client.run_agent("web-search", "q", "/w", &opts).await.unwrap();

        let state = mock.state.lock().unwrap();
        let requests = &state.requests;
        let model = requests[0].model.as_ref().unwrap();
        assert_eq!(model.provider_id, "anthropic");
        assert_eq!(requests[0].tools.as_ref().unwrap()["websearch"], false);
    }

    #[tokio::test]
    async fn session_log_records_prompt_and_output() {
        let tmp = tempfile::TempDir::new().unwrap();
        let log = Arc::new(SessionLog::create(tmp.path(), "big-brain").unwrap());
        let mock = MockBackend::default();
        let client = AgentClient::new(Box::new(mock), Some(log.clone()), true);

        let long_prompt = "p".repeat(2500);
        client
            .run_agent("big-brain", &long_prompt, "/w", &AgentOptions::default())
            .await
            .unwrap();
        log.close();

        let content = std::fs::read_to_string(log.path()).unwrap();
        assert!(content.contains("[agent] Session created: ses_new"));
        assert!(content.contains(&format!("{}...", "p".repeat(2000))));
        assert!(!content.contains(&"p".repeat(2001)));
        assert!(content.contains("Response output:\nfirst\nsecond"));
    }

    fn model(release: &str, input: f64, tool_call: Option<bool>) -> ProviderModel {
        ProviderModel {
            name: format!("model {}", release),
            release_date: release.to_string(),
            cost: ModelCost { input, output: 0.0 },
            tool_call,
        }
    }

    #[test]
    fn free_model_selection() {
        let providers = ProvidersResponse {
            providers: vec![
                Provider {
                    id: "anthropic".to_string(),
                    models: BTreeMap::from([("paid".to_string(), model("2030-01-01", 0.0, None))]),
                },
                Provider {
                    id: FREE_PROVIDER.to_string(),
                    models: BTreeMap::from([
                        ("old".to_string(), model("2024-01-01", 0.0, Some(true))),
                        ("costly".to_string(), model("2026-01-01", 1.5, None)),
                        ("no-tools".to_string(), model("2026-02-01", 0.0, Some(false))),
                        ("newest".to_string(), model("2025-06-01", 0.0, None)),
                    ]),
                },
            ],
        };

        let best = best_free_model(&providers).unwrap();
        assert_eq!(best.model_id, "newest");
        assert_eq!(best.model_ref(), ModelRef::new("opencode", "newest"));
        assert_eq!(best_free_model(&ProvidersResponse::default()), None);
    }

    #[tokio::test]
    async fn retries_until_success() {
        let count = AtomicU32::new(0);
        let value = with_retries(3, Duration::from_millis(1), || async {
            if count.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(anyhow!("transient"))
            } else {
                Ok(7)
            }
        })
        .await
        .unwrap();
        assert_eq!(value, 7);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn retries_return_last_error() {
        let count = AtomicU32::new(0);
        let err = with_retries(2, Duration::from_millis(1), || async {
            let n = count.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(anyhow!("failure {}", n))
        })
        .await
        .unwrap_err();
        assert_eq!(err.to_string(), "failure 1");
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn extract_text_skips_empty_and_non_text() {
        let parts = vec![
            Part::text("a"),
            Part {
                kind: "reasoning".to_string(),
                text: Some("hidden".to_string()),
            },
            Part::text(""),
            Part::text("b"),
        ];
        assert_eq!(extract_text(&parts), "a\nb");
        assert_eq!(extract_text(&[]), "");
    }
}
