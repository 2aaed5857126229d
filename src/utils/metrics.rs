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

//! In-process gateway metrics.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::engine_core::constants::limits;
use crate::engine_core::models::{Direction, MessageKind};

/// Bucket for tool names seen after the tracking cap is reached
pub const OTHER_TOOLS: &str = "(other)";

#[derive(Debug, Default)]
pub struct GatewayMetrics {
    messages: AtomicU64,
    client_to_server: AtomicU64,
    server_to_client: AtomicU64,
    blocked: AtomicU64,
    redacted: AtomicU64,
    frame_errors: AtomicU64,
    latency_micros: AtomicU64,
    by_kind: Mutex<HashMap<MessageKind, u64>>,
    tool_calls: Mutex<HashMap<String, u64>>,
    violations: Mutex<HashMap<String, u64>>,
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub messages: u64,
    pub client_to_server: u64,
    pub server_to_client: u64,
    pub blocked: u64,
    pub redacted: u64,
    pub frame_errors: u64,
    pub avg_latency_ms: f64,
    pub by_kind: HashMap<MessageKind, u64>,
    pub tool_calls: HashMap<String, u64>,
    pub violations: HashMap<String, u64>,
}

fn bump(map: &Mutex<HashMap<String, u64>>, key: &str) {
    if let Ok(mut m) = map.lock() {
        *m.entry(key.to_string()).or_insert(0) += 1;
    }
}

impl GatewayMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_message(&self, direction: Direction, kind: MessageKind, tool: Option<&str>) {
        self.messages.fetch_add(1, Ordering::Relaxed);
        match direction {
            Direction::ClientToServer => self.client_to_server.fetch_add(1, Ordering::Relaxed),
            Direction::ServerToClient => self.server_to_client.fetch_add(1, Ordering::Relaxed),
        };
        if let Ok(mut m) = self.by_kind.lock() {
            *m.entry(kind).or_insert(0) += 1;
        }
        if let Some(tool) = tool {
            self.record_tool(tool);
        }
    }

    /// Count a tool call. Tool names come from the client, so only the first
    /// `MAX_TRACKED_TOOLS` distinct names get their own counter.
    fn record_tool(&self, tool: &str) {
        let Ok(mut m) = self.tool_calls.lock() else {
            return;
        };
        let key = if m.contains_key(tool) || m.len() < limits::MAX_TRACKED_TOOLS {
            tool
        } else {
            OTHER_TOOLS
        };
        *m.entry(key.to_string()).or_insert(0) += 1;
    }

    pub fn record_violation(&self, rule: &str) {
        bump(&self.violations, rule);
    }

    pub fn record_blocked(&self) {
        self.blocked.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_redacted(&self) {
        self.redacted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_frame_error(&self) {
        self.frame_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_latency(&self, elapsed: Duration) {
        self.latency_micros
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let messages = self.messages.load(Ordering::Relaxed);
        let latency = self.latency_micros.load(Ordering::Relaxed);
        let clone =
            |m: &Mutex<HashMap<String, u64>>| m.lock().map(|g| g.clone()).unwrap_or_default();
        MetricsSnapshot {
            messages,
            client_to_server: self.client_to_server.load(Ordering::Relaxed),
            server_to_client: self.server_to_client.load(Ordering::Relaxed),
            blocked: self.blocked.load(Ordering::Relaxed),
            redacted: self.redacted.load(Ordering::Relaxed),
            frame_errors: self.frame_errors.load(Ordering::Relaxed),
            avg_latency_ms: if messages == 0 {
                0.0
            } else {
                latency as f64 / messages as f64 / 1000.0
            },
            by_kind: self.by_kind.lock().map(|g| g.clone()).unwrap_or_default(),
            tool_calls: clone(&self.tool_calls),
            violations: clone(&self.violations),
        }
    }

    /// Human-readable summary for the shutdown log.
    pub fn summary(&self) -> String {
        let snap = self.snapshot();
        let mut lines = vec![
            format!(
                "messages: {} (client->server {}, server->client {})",
                snap.messages, snap.client_to_server, snap.server_to_client
            ),
            format!(
                "blocked: {}, redacted: {}, frame errors: {}",
                snap.blocked, snap.redacted, snap.frame_errors
            ),
            format!("avg latency: {:.3} ms", snap.avg_latency_ms),
        ];

        let mut tools: Vec<_> = snap.tool_calls.into_iter().collect();
        tools.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        if !tools.is_empty() {
            lines.push("top tools:".to_string());
            for (name, count) in tools.into_iter().take(5) {
                lines.push(format!("  {}: {}", name, count));
            }
        }

        let mut violations: Vec<_> = snap.violations.into_iter().collect();
        violations.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        if !violations.is_empty() {
            lines.push("violations by rule:".to_string());
            for (rule, count) in violations {
                lines.push(format!("  {}: {}", rule, count));
            }
        }

        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_per_direction_and_kind() {
        let m = GatewayMetrics::new();
        m.record_message(Direction::ClientToServer, MessageKind::Request, Some("read_file"));
        m.record_message(Direction::ClientToServer, MessageKind::Request, Some("read_file"));
        m.record_message(Direction::ServerToClient, MessageKind::Response, None);
        m.record_violation("ssn");
        m.record_blocked();

        let snap = m.snapshot();
        assert_eq!(snap.messages, 3);
        assert_eq!(snap.client_to_server, 2);
        assert_eq!(snap.server_to_client, 1);
        assert_eq!(snap.by_kind.get(&MessageKind::Request), Some(&2));
        assert_eq!(snap.tool_calls.get("read_file"), Some(&2));
        assert_eq!(snap.violations.get("ssn"), Some(&1));
        assert_eq!(snap.blocked, 1);
    }

    #[test]
    fn test_summary_lists_top_tools() {
        let m = GatewayMetrics::new();
        for i in 0..7 {
            for _ in 0..=i {
                let tool = format!("t{}", i);
                m.record_message(Direction::ClientToServer, MessageKind::Request, Some(&tool));
            }
        }
        let summary = m.summary();
        assert!(summary.contains("t6: 7"));
        assert!(summary.contains("t2: 3"));
        assert!(!summary.contains("t1: 2"));
    }

    #[test]
    fn test_tool_names_past_the_cap_share_one_bucket() {
        let m = GatewayMetrics::new();
        for i in 0..limits::MAX_TRACKED_TOOLS + 50 {
            let tool = format!("tool-{}", i);
            m.record_message(Direction::ClientToServer, MessageKind::Request, Some(&tool));
        }
        m.record_message(Direction::ClientToServer, MessageKind::Request, Some("tool-0"));

        let tools = m.snapshot().tool_calls;
        assert_eq!(tools.len(), limits::MAX_TRACKED_TOOLS + 1);
        assert_eq!(tools.get(OTHER_TOOLS), Some(&50));
        assert_eq!(tools.get("tool-0"), Some(&2));
        assert!(!tools.contains_key("tool-300"));
    }

    #[test]
    fn test_average_latency() {
        let m = GatewayMetrics::new();
        m.record_message(Direction::ClientToServer, MessageKind::Notification, None);
        m.record_message(Direction::ClientToServer, MessageKind::Notification, None);
        m.record_latency(Duration::from_millis(3));
        m.record_latency(Duration::from_millis(1));
        assert!((m.snapshot().avg_latency_ms - 2.0).abs() < 1e-9);
    }
}
