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

//! Pump loops.
//!
//! Each direction runs one pump: read a chunk, extract frames, inspect
//! every message, then write what the decision allows. The `Inspector` holds
//! everything both pumps share and does the synchronous part of that work.

use std::io;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::engine::policy::ActionPolicy;
use crate::engine::rules::RuleSet;
use crate::engine::scanner::Scanner;
use crate::engine_core::audit::{message_digest, AuditEntry, AuditViolation, BatchPosition};
use crate::engine_core::constants::limits;
use crate::engine_core::errors::{FrameError, GatewayError};
use crate::engine_core::models::{
    mask_match, Alert, AlertViolation, BlockResponse, Decision, Direction, MessageKind,
    ScanResult,
};
use crate::engine_core::traits::{AlertNotifier, AuditSink};
use crate::mcp::codec::FrameExtractor;
use crate::mcp::message::{Frame, Message};
use crate::mcp::transport::OutputHandle;
use crate::utils::metrics::GatewayMetrics;
use crate::utils::time::now_rfc3339;

/// Inspection switches derived from configuration
#[derive(Debug, Clone)]
pub struct InspectionOptions {
    pub scanning_enabled: bool,
    pub scan_client_to_server: bool,
    pub scan_server_to_client: bool,
    pub include_message_content: bool,
    pub include_matches: bool,
}

impl Default for InspectionOptions {
    fn default() -> Self {
        Self {
            scanning_enabled: true,
            scan_client_to_server: true,
            scan_server_to_client: true,
            include_message_content: false,
            include_matches: false,
        }
    }
}

impl InspectionOptions {
    pub fn scans(&self, direction: Direction) -> bool {
        self.scanning_enabled
            && match direction {
                Direction::ClientToServer => self.scan_client_to_server,
                Direction::ServerToClient => self.scan_server_to_client,
            }
    }
}

/// What a frame turns into on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Outcome {
    /// Line for the destination side
    pub forward: Option<String>,
    /// Line for the side that sent the frame
    pub reply: Option<String>,
}

/// State shared by both pump loops.
pub struct Inspector {
    pub server: String,
    pub session_id: String,
    pub rules: Arc<RuleSet>,
    pub policy: ActionPolicy,
    pub options: InspectionOptions,
    pub audit: Arc<dyn AuditSink>,
    pub alerts: Arc<dyn AlertNotifier>,
    pub metrics: Arc<GatewayMetrics>,
}

impl Inspector {
    /// Inspect one frame and return what must be written where.
    ///
    /// `batch` is the per-direction batch number, used only for batches.
    pub fn handle_frame(&self, direction: Direction, frame: Frame, batch: u64) -> Outcome {
        match frame {
            Frame::Single(msg) => {
                let decision = self.inspect(direction, &msg, None);
                match decision {
                    Decision::Pass => Outcome {
                        forward: Some(msg.text),
                        reply: None,
                    },
                    Decision::PassRedacted { text } => Outcome {
                        forward: Some(text),
                        reply: None,
                    },
                    Decision::BlockWithResponse { response } => Outcome {
                        forward: None,
                        reply: self.encode_response(&response),
                    },
                    Decision::BlockSilent { .. } => Outcome::default(),
                }
            }
            Frame::Batch(items) if items.is_empty() => Outcome {
                forward: Some("[]".to_string()),
                reply: None,
            },
            Frame::Batch(items) => {
                let mut passed = Vec::new();
                let mut replies = Vec::new();
                for (index, msg) in items.iter().enumerate() {
                    let position = BatchPosition { batch, index };
                    match self.inspect(direction, msg, Some(position)) {
                        Decision::Pass => passed.push(msg.text.clone()),
                        Decision::PassRedacted { text } => passed.push(text),
                        Decision::BlockWithResponse { response } => {
                            if let Some(line) = self.encode_response(&response) {
                                replies.push(line);
                            }
                        }
                        Decision::BlockSilent { .. } => {}
                    }
                }
                debug!(
                    %direction,
                    batch,
                    size = items.len(),
                    forwarded = passed.len(),
                    answered = replies.len(),
                    "Batch inspected"
                );
                Outcome {
                    forward: join_array(&passed),
                    reply: join_array(&replies),
                }
            }
        }
    }

    fn encode_response(&self, response: &BlockResponse) -> Option<String> {
        match response.to_json() {
            Ok(s) => Some(s),
            Err(e) => {
                warn!("Failed to encode block response: {}", e);
                None
            }
        }
    }

    /// Scan and decide one message, dispatching audit, log, alert and
    /// metrics side effects.
    pub fn inspect(
        &self,
        direction: Direction,
        msg: &Message,
        batch: Option<BatchPosition>,
    ) -> Decision {
        let started = Instant::now();
        let tool = msg.tool_name();
        self.metrics.record_message(direction, msg.kind, tool);

        let scan = if msg.kind != MessageKind::Malformed && self.options.scans(direction) {
            Scanner::scan(&msg.text, &self.rules)
        } else {
            ScanResult::default()
        };
        let decision = self.policy.decide(msg.kind, msg.id.as_ref(), &scan);

        for v in &scan.violations {
            self.metrics.record_violation(&v.rule);
            let preview: String = v.matched.chars().take(limits::LOG_MATCH_PREVIEW_CHARS).collect();
            warn!(
                %direction,
                rule = %v.rule,
                severity = %v.severity,
                action = %v.action,
                method = msg.method.as_deref().unwrap_or("-"),
                matched = %preview,
                "Security violation"
            );
        }

        for v in scan.alerts() {
            self.alerts.notify(Alert {
                timestamp: now_rfc3339(),
                server: self.server.clone(),
                direction,
                message_type: msg.kind,
                method: msg.method.clone(),
                violation: AlertViolation {
                    rule: v.rule.clone(),
                    severity: v.severity,
                    description: self.description(v.rule_index),
                    matched: mask_match(&v.matched),
                },
            });
        }

        match &decision {
            Decision::BlockWithResponse { .. } | Decision::BlockSilent { .. } => {
                self.metrics.record_blocked();
                warn!(
                    %direction,
                    kind = %msg.kind,
                    id = %msg.id.as_ref().map(|id| id.to_string()).unwrap_or_default(),
                    decision = decision.label(),
                    "Message blocked"
                );
            }
            Decision::PassRedacted { .. } => {
                self.metrics.record_redacted();
                info!(%direction, kind = %msg.kind, "Message redacted");
            }
            Decision::Pass => {
                debug!(
                    %direction,
                    kind = %msg.kind,
                    method = msg.method.as_deref().unwrap_or("-"),
                    "Message forwarded"
                );
            }
        }

        self.audit
            .append(&self.audit_entry(direction, msg, batch, &scan, &decision));
        self.metrics.record_latency(started.elapsed());
        decision
    }

    fn description(&self, rule_index: usize) -> String {
        self.rules
            .get(rule_index)
            .map(|r| r.description.clone())
            .unwrap_or_default()
    }

    fn audit_entry(
        &self,
        direction: Direction,
        msg: &Message,
        batch: Option<BatchPosition>,
        scan: &ScanResult,
        decision: &Decision,
    ) -> AuditEntry {
        let content = |key: &str| {
            if self.options.include_message_content {
                msg.value.get(key).cloned()
            } else {
                None
            }
        };
        AuditEntry {
            timestamp: now_rfc3339(),
            session_id: self.session_id.clone(),
            direction,
            server: self.server.clone(),
            message_type: msg.kind,
            message_id: msg.id.clone(),
            method: msg.method.clone(),
            tool: msg.tool_name().map(str::to_string),
            resource_uri: msg.resource_uri().map(str::to_string),
            blocked: decision.is_blocked(),
            redacted: matches!(decision, Decision::PassRedacted { .. }),
            batch,
            message_sha256: message_digest(&msg.text),
            params: content("params"),
            result: content("result"),
            error: content("error"),
            violations: scan
                .violations
                .iter()
                .map(|v| {
                    AuditViolation::from_violation(
                        v,
                        &self.description(v.rule_index),
                        self.options.include_matches,
                    )
                })
                .collect(),
        }
    }
}

fn join_array(items: &[String]) -> Option<String> {
    if items.is_empty() {
        None
    } else {
        Some(format!("[{}]", items.join(",")))
    }
}

/// How a pump loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpEnd {
    /// Input reached end-of-stream
    Eof,
    /// The shared stop signal was observed
    Cancelled,
}

/// One direction's read -> extract -> inspect -> write loop.
pub struct Pump {
    pub direction: Direction,
    pub inspector: Arc<Inspector>,
    /// Destination side
    pub forward: OutputHandle,
    /// Sender side, for synthesized block responses
    pub reply: OutputHandle,
    extractor: FrameExtractor,
    batches: u64,
}

impl Pump {
    pub fn new(
        direction: Direction,
        inspector: Arc<Inspector>,
        forward: OutputHandle,
        reply: OutputHandle,
        max_buffer_bytes: usize,
    ) -> Self {
        Self {
            direction,
            inspector,
            forward,
            reply,
            extractor: FrameExtractor::new(max_buffer_bytes),
            batches: 0,
        }
    }

    /// Run until end-of-stream, the stop signal, or a transport error.
    ///
    /// Reads are bounded by a short timeout so the stop signal is observed
    /// even when the input is idle. Writes race the stop signal, so a
    /// destination that stops reading cannot hold the pump.
    pub async fn run<R>(
        mut self,
        mut reader: R,
        cancel: CancellationToken,
    ) -> Result<PumpEnd, GatewayError>
    where
        R: AsyncRead + Unpin,
    {
        let timeout = Duration::from_millis(limits::READ_TIMEOUT_MS);
        let mut buf = vec![0u8; limits::READ_CHUNK_BYTES];

        loop {
            if cancel.is_cancelled() {
                debug!(direction = %self.direction, "Pump stopping on shutdown signal");
                return Ok(PumpEnd::Cancelled);
            }
            let n = match tokio::time::timeout(timeout, reader.read(&mut buf)).await {
                Err(_) => continue,
                Ok(Ok(0)) => {
                    if self.extractor.pending_bytes() > 0 {
                        warn!(
                            direction = %self.direction,
                            bytes = self.extractor.pending_bytes(),
                            "Input closed with an incomplete message, dropping it"
                        );
                    }
                    debug!(direction = %self.direction, "Pump input reached end of stream");
                    return Ok(PumpEnd::Eof);
                }
                Ok(Ok(n)) => n,
                Ok(Err(e)) => return Err(GatewayError::transport(self.direction, e)),
            };

            for item in self.extractor.feed(&buf[..n]) {
                if let ControlFlow::Break(end) = self.process(item, &cancel).await? {
                    return Ok(end);
                }
            }
        }
    }

    async fn process(
        &mut self,
        item: Result<String, FrameError>,
        cancel: &CancellationToken,
    ) -> Result<ControlFlow<PumpEnd>, GatewayError> {
        let frame = match item.and_then(Frame::parse) {
            Ok(frame) => frame,
            Err(e) => {
                self.inspector.metrics.record_frame_error();
                warn!(direction = %self.direction, "Dropping frame: {}", e);
                return Ok(ControlFlow::Continue(()));
            }
        };

        if matches!(frame, Frame::Batch(_)) {
            self.batches += 1;
        }
        let outcome = self
            .inspector
            .handle_frame(self.direction, frame, self.batches);

        if let Some(reply) = outcome.reply {
            match write_or_cancel(&self.reply, &reply, cancel).await {
                None => return Ok(self.stopped_mid_write(self.reply.label())),
                Some(Err(e)) => warn!(
                    direction = %self.direction,
                    output = self.reply.label(),
                    "Could not deliver block response: {}",
                    e
                ),
                Some(Ok(())) => {}
            }
        }
        if let Some(line) = outcome.forward {
            match write_or_cancel(&self.forward, &line, cancel).await {
                None => return Ok(self.stopped_mid_write(self.forward.label())),
                Some(Err(e)) => return Err(GatewayError::transport(self.direction, e)),
                Some(Ok(())) => {}
            }
        }
        Ok(ControlFlow::Continue(()))
    }

    fn stopped_mid_write(&self, output: &str) -> ControlFlow<PumpEnd> {
        debug!(
            direction = %self.direction,
            output,
            "Pump stopping on shutdown signal while writing"
        );
        ControlFlow::Break(PumpEnd::Cancelled)
    }
}

/// Write one line unless the stop signal fires first. `None` means stopped.
async fn write_or_cancel(
    output: &OutputHandle,
    line: &str,
    cancel: &CancellationToken,
) -> Option<io::Result<()>> {
    tokio::select! {
        res = output.write_line(line) => Some(res),
        _ = cancel.cancelled() => None,
    }
}

/// Drain the child's stderr line by line, echoing it to our own stderr.
pub async fn drain_stderr<R>(stream: R, server: String)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stream).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim_end();
                if line.is_empty() {
                    continue;
                }
                debug!(server = %server, "[server stderr] {}", line);
                eprintln!("[{}] {}", server, line);
            }
            Ok(None) => break,
            Err(e) => {
                debug!("Server stderr closed: {}", e);
                break;
            }
        }
    }
}
