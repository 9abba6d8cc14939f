//! Agent server startup.
//!
//! When no server answers at the configured address, a tool may spawn
//! `<binary> serve --hostname=<host> --port=<port>` and wait for it to
//! print its `listening on <url>` line. Startup is an explicit state
//! machine:
//!
//! ```text
//! Starting ──ready line──▶ Ready(url)
//!    │ ├────exit/cancel───▶ Failed(reason)
//!    │ └────timer─────────▶ TimedOut
//! ```
//!
//! Every non-ready outcome kills and reaps the child and aborts the stdout
//! reader before returning. A ready server is handed back as a
//! [`ManagedServer`] that owns both until [`ManagedServer::shutdown`].

use regex::Regex;
use std::future::Future;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerState {
    Starting,
    Ready(String),
    Failed(String),
    TimedOut,
}

/// How to spawn the server.
#[derive(Debug, Clone)]
pub struct ServerLaunch {
    pub binary: String,
    pub hostname: String,
    pub port: u16,
    /// Passed to the child as `XDG_DATA_HOME` so its sessions stay apart
    /// from the user's interactive ones.
    pub data_dir: Option<PathBuf>,
    /// Extra environment for the child only.
    pub env: Vec<(String, String)>,
    pub startup_timeout: Duration,
}

/// A server spawned by this process.
pub struct ManagedServer {
    child: Child,
    reader: JoinHandle<()>,
    url: String,
}

impl ManagedServer {
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Kill and reap the server, then stop the stdout reader.
    pub async fn shutdown(mut self) {
        if let Err(e) = self.child.kill().await {
            tracing::debug!(error = %e, "server already exited");
        }
        self.reader.abort();
    }
}

/// Server URL from a `listening on <url>` stdout line.
pub fn parse_ready_line(line: &str) -> Option<String> {
    static READY: OnceLock<Regex> = OnceLock::new();
    let re = READY
        .get_or_init(|| Regex::new(r"listening on\s+(https?://\S+)").expect("Invalid ready regex"));
    re.captures(line).map(|caps| caps[1].to_string())
}

/// Spawn the server and wait until it is ready, the startup timer fires,
/// or `cancel` resolves.
pub async fn launch<F>(spec: &ServerLaunch, cancel: F) -> (ServerState, Option<ManagedServer>)
where
    F: Future<Output = ()>,
{
    let mut state = ServerState::Starting;
    tracing::debug!(binary = %spec.binary, port = spec.port, state = ?state, "starting agent server");

    let mut cmd = Command::new(&spec.binary);
    cmd.arg("serve")
        .arg(format!("--hostname={}", spec.hostname))
        .arg(format!("--port={}", spec.port))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true);
    if let Some(dir) = &spec.data_dir {
        cmd.env("XDG_DATA_HOME", dir);
    }
    for (key, value) in &spec.env {
        cmd.env(key, value);
    }

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            let reason = format!("failed to spawn {}: {}", spec.binary, e);
            return (ServerState::Failed(reason), None);
        }
    };

    let Some(stdout) = child.stdout.take() else {
        let _ = child.kill().await;
        return (
            ServerState::Failed("server stdout unavailable".to_string()),
            None,
        );
    };

    let (ready_tx, ready_rx) = oneshot::channel::<String>();
    let reader = tokio::spawn(async move {
        let mut lines = BufReader::new(stdout).lines();
        let mut ready_tx = Some(ready_tx);
        // Keep draining after the ready line so the child never blocks on
        // a full pipe.
        while let Ok(Some(line)) = lines.next_line().await {
            if let Some(url) = parse_ready_line(&line) {
                if let Some(tx) = ready_tx.take() {
                    let _ = tx.send(url);
                }
            }
        }
    });

    state = tokio::select! {
        ready = ready_rx => match ready {
            Ok(url) => ServerState::Ready(url),
            Err(_) => ServerState::Failed("server exited before it was ready".to_string()),
        },
        _ = tokio::time::sleep(spec.startup_timeout) => ServerState::TimedOut,
        _ = cancel => ServerState::Failed("cancelled".to_string()),
    };
    tracing::debug!(state = ?state, "agent server startup finished");

    match state {
        ServerState::Ready(url) => {
            let server = ManagedServer {
                child,
                reader,
                url: url.clone(),
            };
            (ServerState::Ready(url), Some(server))
        }
        other => {
            let _ = child.kill().await;
            reader.abort();
            (other, None)
        }
    }
}
