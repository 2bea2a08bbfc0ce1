//! Owned handle to the tool registry child process.
//!
//! The registry runs as a child process speaking MCP over its stdin/stdout.
//! A [`RegistrySession`] starts it on first use and keeps it for the rest of
//! the session. When the channel fails the session is marked closed and every
//! later call fails with a transport error until [`RegistrySession::restart`].

use std::ffi::OsString;
use std::path::PathBuf;

use async_trait::async_trait;
use rmcp::model::{CallToolRequestParam, CallToolResult, Tool};
use rmcp::service::{Peer, RoleClient, RunningService, ServiceExt};
use rmcp::transport::TokioChildProcess;
use serde_json::Value;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::dispatcher::{ToolCall, ToolInvoker};
use crate::error::{Error, Result};

pub type RegistryService = RunningService<RoleClient, ()>;

/// How to launch the registry process.
#[derive(Debug, Clone)]
pub struct ServerCommand {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    /// Extra environment for the child, on top of the inherited one.
    pub envs: Vec<(OsString, OsString)>,
}

impl ServerCommand {
    pub fn new(program: impl Into<PathBuf>, args: impl IntoIterator<Item = impl Into<OsString>>) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            envs: Vec::new(),
        }
    }

    pub fn with_env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// This executable, run with the `serve` subcommand.
    pub fn current_exe() -> Result<Self> {
        let program = std::env::current_exe()
            .map_err(|e| Error::Transport(format!("cannot locate current executable: {}", e)))?;
        Ok(Self::new(program, ["serve"]))
    }

    fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd.envs(self.envs.iter().map(|(k, v)| (k, v)));
        cmd
    }
}

enum SessionState {
    Idle,
    Running(RegistryService),
    Closed,
}

pub struct RegistrySession {
    launcher: Option<ServerCommand>,
    state: Mutex<SessionState>,
}

impl RegistrySession {
    /// A session that launches the registry on first use.
    pub fn new(launcher: ServerCommand) -> Self {
        Self {
            launcher: Some(launcher),
            state: Mutex::new(SessionState::Idle),
        }
    }

    /// A session over an already connected registry service.
    pub fn from_service(service: RegistryService) -> Self {
        Self {
            launcher: None,
            state: Mutex::new(SessionState::Running(service)),
        }
    }

    async fn start(&self) -> Result<RegistryService> {
        let launcher = self
            .launcher
            .as_ref()
            .ok_or_else(|| Error::Transport("no registry launcher configured".to_string()))?;

        info!(program = %launcher.program.display(), "starting tool registry process");
        let transport = TokioChildProcess::new(launcher.to_command())
            .map_err(|e| Error::Transport(format!("failed to spawn registry process: {}", e)))?;

        ().serve(transport)
            .await
            .map_err(|e| Error::Transport(format!("registry handshake failed: {}", e)))
    }

    /// Returns a peer for the running registry, starting it if needed.
    async fn acquire(&self) -> Result<Peer<RoleClient>> {
        let mut state = self.state.lock().await;
        if matches!(*state, SessionState::Idle) {
            *state = SessionState::Running(self.start().await?);
        }

        match &*state {
            SessionState::Running(service) => Ok(service.peer().clone()),
            _ => Err(Error::Transport(
                "tool registry session is closed".to_string(),
            )),
        }
    }

    async fn mark_closed(&self) {
        let mut state = self.state.lock().await;
        if let SessionState::Running(service) = std::mem::replace(&mut *state, SessionState::Closed) {
            warn!("tool registry channel failed, closing session");
            if let Err(e) = service.cancel().await {
                warn!(error = %e, "registry service did not stop cleanly");
            }
        }
    }

    pub async fn call(&self, call: &ToolCall) -> Result<Value> {
        let peer = self.acquire().await?;

        let result = peer
            .call_tool(CallToolRequestParam {
                name: call.tool.as_str().into(),
                arguments: Some(call.arguments.clone()),
            })
            .await
            .map_err(Error::from);

        match result {
            Ok(result) => result_payload(call, result),
            Err(e) => {
                if e.is_transport() {
                    self.mark_closed().await;
                }
                Err(e)
            }
        }
    }

    /// Tool definitions advertised by the registry.
    pub async fn list_tools(&self) -> Result<Vec<Tool>> {
        let peer = self.acquire().await?;
        match peer.list_all_tools().await {
            Ok(tools) => Ok(tools),
            Err(e) => {
                self.mark_closed().await;
                Err(Error::Transport(format!("tools/list failed: {}", e)))
            }
        }
    }

    /// Stops the registry process. Later calls fail until [`restart`](Self::restart).
    pub async fn shutdown(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        match std::mem::replace(&mut *state, SessionState::Closed) {
            SessionState::Running(service) => {
                info!("shutting down tool registry process");
                service
                    .cancel()
                    .await
                    .map(|_| ())
                    .map_err(|e| Error::Transport(format!("registry shutdown failed: {}", e)))
            }
            _ => Ok(()),
        }
    }

    /// Drops any existing process; the next call starts a fresh one.
    pub async fn restart(&self) -> Result<()> {
        self.shutdown().await?;
        *self.state.lock().await = SessionState::Idle;
        Ok(())
    }

    pub async fn is_closed(&self) -> bool {
        matches!(*self.state.lock().await, SessionState::Closed)
    }
}

#[async_trait]
impl ToolInvoker for RegistrySession {
    async fn invoke(&self, call: &ToolCall) -> Result<Value> {
        self.call(call).await
    }
}

/// Extracts the JSON payload from a tool result without altering it.
fn result_payload(call: &ToolCall, result: CallToolResult) -> Result<Value> {
    let text: String = result
        .content
        .iter()
        .filter_map(|c| c.as_text())
        .map(|t| t.text.as_str())
        .collect();

    if result.is_error == Some(true) {
        return Err(Error::Upstream(text));
    }
    if let Some(structured) = result.structured_content {
        return Ok(structured);
    }

    serde_json::from_str(&text).map_err(|e| {
        Error::Transport(format!("{} returned a non-JSON result: {}", call.tool, e))
    })
}
