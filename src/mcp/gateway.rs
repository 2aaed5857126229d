// Copyright 2026 BadCompany
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Gateway lifecycle.
//!
//! `Starting -> Running -> Draining -> Stopped`. The gateway spawns the
//! server, runs one pump per direction, and when either side finishes it
//! lets the other drain before stopping the child and reporting its exit
//! code.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::GatewayConfig;
use crate::engine::policy::ActionPolicy;
use crate::engine_core::audit::{JsonlAuditSink, TracingAuditSink};
use crate::engine_core::constants::limits;
use crate::engine_core::errors::GatewayError;
use crate::engine_core::models::Direction;
use crate::engine_core::traits::AuditSink;
use crate::mcp::pipeline::{drain_stderr, InspectionOptions, Inspector, Pump, PumpEnd};
use crate::mcp::process::ProcessSupervisor;
use crate::mcp::transport::OutputHandle;
use crate::utils::alerts::notifier_from_config;
use crate::utils::metrics::GatewayMetrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayState {
    Starting,
    Running,
    Draining,
    Stopped,
}

#[derive(Debug, Clone)]
pub struct GatewaySettings {
    pub command: String,
    pub args: Vec<String>,
    pub max_buffer_bytes: usize,
    /// How long the child gets at each shutdown step
    pub exit_grace: Duration,
    pub log_metrics: bool,
}

impl GatewaySettings {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            max_buffer_bytes: limits::MAX_MESSAGE_SIZE_BYTES,
            exit_grace: Duration::from_millis(limits::CHILD_EXIT_GRACE_MS),
            log_metrics: false,
        }
    }
}

pub struct Gateway {
    settings: GatewaySettings,
    inspector: Arc<Inspector>,
    state: GatewayState,
}

type PumpResult = Result<PumpEnd, GatewayError>;
type PumpJoin = Result<PumpResult, JoinError>;

impl Gateway {
    pub fn new(settings: GatewaySettings, inspector: Inspector) -> Self {
        Self {
            settings,
            inspector: Arc::new(inspector),
            state: GatewayState::Starting,
        }
    }

    /// Assemble a gateway and its sinks from configuration.
    ///
    /// Rules that fail to compile are reported here and left out.
    pub fn from_config(
        config: &GatewayConfig,
        command: &str,
        args: Vec<String>,
        server: Option<String>,
    ) -> Result<Self, GatewayError> {
        let rules = config.build_rules();
        for rejected in rules.rejected() {
            warn!(rule = %rejected.rule, pattern = %rejected.pattern, "{}", rejected);
        }
        info!(
            rules = rules.len(),
            enabled = rules.enabled_count(),
            rejected = rules.rejected().len(),
            "Rule set compiled"
        );

        let audit: Arc<dyn AuditSink> = if config.auditing.enabled {
            Arc::new(JsonlAuditSink::open(&config.auditing.audit_log)?)
        } else {
            Arc::new(TracingAuditSink)
        };

        let server = server.unwrap_or_else(|| server_label(command));
        let inspector = Inspector {
            server,
            session_id: uuid::Uuid::new_v4().to_string(),
            rules: Arc::new(rules),
            policy: ActionPolicy::new(config.scanning.blocking_enabled),
            options: InspectionOptions {
                scanning_enabled: config.scanning.enabled,
                scan_client_to_server: config.scanning.scan_request,
                scan_server_to_client: config.scanning.scan_response,
                include_message_content: config.auditing.include_message_content,
                include_matches: config.auditing.include_matches,
            },
            audit,
            alerts: notifier_from_config(&config.alerting)?,
            metrics: Arc::new(GatewayMetrics::new()),
        };

        let mut settings = GatewaySettings::new(command, args);
        settings.max_buffer_bytes = config.scanning.max_buffer_bytes;
        settings.log_metrics = config.metrics.enabled;
        Ok(Self::new(settings, inspector))
    }

    pub fn state(&self) -> GatewayState {
        self.state
    }

    pub fn session_id(&self) -> &str {
        &self.inspector.session_id
    }

    pub fn metrics(&self) -> Arc<GatewayMetrics> {
        self.inspector.metrics.clone()
    }

    fn set_state(&mut self, state: GatewayState) {
        debug!(from = ?self.state, to = ?state, "Gateway state change");
        self.state = state;
    }

    /// Run between this process's stdin/stdout and the server.
    pub async fn run(&mut self) -> Result<i32, GatewayError> {
        self.run_with_io(tokio::io::stdin(), tokio::io::stdout()).await
    }

    /// Run with explicit client streams. Returns the server's exit code.
    pub async fn run_with_io<R, W>(
        &mut self,
        client_in: R,
        client_out: W,
    ) -> Result<i32, GatewayError>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        self.set_state(GatewayState::Starting);
        let (mut supervisor, child) =
            match ProcessSupervisor::spawn(&self.settings.command, &self.settings.args) {
                Ok(spawned) => spawned,
                Err(e) => {
                    self.set_state(GatewayState::Stopped);
                    return Err(e);
                }
            };
        info!(
            session = %self.inspector.session_id,
            server = %self.inspector.server,
            pid = supervisor.id().unwrap_or(0),
            "Gateway started"
        );

        let cancel = CancellationToken::new();
        let client_output = OutputHandle::new("client", Box::new(client_out));
        let server_input = OutputHandle::new("server", child.stdin);

        if let Some(stderr) = child.stderr {
            tokio::spawn(drain_stderr(stderr, self.inspector.server.clone()));
        }
        let signals = tokio::spawn(watch_shutdown_signals(cancel.clone()));

        let max = self.settings.max_buffer_bytes;
        let c2s = Pump::new(
            Direction::ClientToServer,
            self.inspector.clone(),
            server_input.clone(),
            client_output.clone(),
            max,
        );
        let s2c = Pump::new(
            Direction::ServerToClient,
            self.inspector.clone(),
            client_output.clone(),
            server_input.clone(),
            max,
        );
        let mut c2s_task = tokio::spawn(c2s.run(client_in, cancel.clone()));
        let mut s2c_task = tokio::spawn(s2c.run(child.stdout, cancel.clone()));
        self.set_state(GatewayState::Running);

        let grace = self.settings.exit_grace;
        tokio::select! {
            res = &mut c2s_task => {
                log_pump_end(Direction::ClientToServer, res);
                self.set_state(GatewayState::Draining);
                // The server sees end-of-input and gets a chance to finish.
                close_output(&server_input, grace).await;
                match tokio::time::timeout(grace, &mut s2c_task).await {
                    Ok(res) => log_pump_end(Direction::ServerToClient, res),
                    Err(_) => {
                        cancel.cancel();
                        join_pump(Direction::ServerToClient, &mut s2c_task, grace).await;
                    }
                }
            }
            res = &mut s2c_task => {
                log_pump_end(Direction::ServerToClient, res);
                self.set_state(GatewayState::Draining);
                cancel.cancel();
                join_pump(Direction::ClientToServer, &mut c2s_task, grace).await;
            }
            _ = cancel.cancelled() => {
                self.set_state(GatewayState::Draining);
                join_pump(Direction::ClientToServer, &mut c2s_task, grace).await;
                join_pump(Direction::ServerToClient, &mut s2c_task, grace).await;
            }
        }
        cancel.cancel();
        signals.abort();

        close_output(&server_input, grace).await;
        close_output(&client_output, grace).await;
        let code = supervisor.shutdown(grace).await;
        self.set_state(GatewayState::Stopped);

        if self.settings.log_metrics {
            info!("Gateway metrics\n{}", self.inspector.metrics.summary());
        }
        info!(exit_code = code, "Gateway stopped");
        Ok(code)
    }
}

/// Wait for a pump that has been told to stop; abort it after `limit`.
async fn join_pump(direction: Direction, task: &mut JoinHandle<PumpResult>, limit: Duration) {
    match tokio::time::timeout(limit, &mut *task).await {
        Ok(res) => log_pump_end(direction, res),
        Err(_) => {
            warn!(%direction, "Pump did not stop in time, aborting it");
            task.abort();
        }
    }
}

/// Close an output, giving up after `limit` if its writer cannot flush.
async fn close_output(output: &OutputHandle, limit: Duration) {
    if tokio::time::timeout(limit, output.close()).await.is_err() {
        warn!(output = output.label(), "Output did not close in time");
    }
}

fn log_pump_end(direction: Direction, res: PumpJoin) {
    match res {
        Ok(Ok(end)) => debug!(%direction, ?end, "Pump finished"),
        Ok(Err(e)) => warn!(%direction, "Pump stopped: {}", e),
        Err(e) => warn!(%direction, "Pump task failed: {}", e),
    }
}

async fn watch_shutdown_signals(cancel: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    res = tokio::signal::ctrl_c() => {
                        if res.is_err() {
                            return;
                        }
                    }
                    _ = term.recv() => {}
                }
            }
            Err(_) => {
                if tokio::signal::ctrl_c().await.is_err() {
                    return;
                }
            }
        }
    }
    #[cfg(not(unix))]
    {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
    }
    info!("Shutdown signal received");
    cancel.cancel();
}

/// Label used for a server in logs and audit records: the command's file stem.
pub fn server_label(command: &str) -> String {
    Path::new(command)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or(command)
        .to_string()
}
