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

//! Audit records and sinks.
//!
//! One `AuditEntry` is produced per processed message. Entries are written
//! either to an append-only JSON Lines file or to the `audit` tracing target.

use fs2::FileExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{info, warn};

use crate::engine_core::constants::limits;
use crate::engine_core::errors::GatewayError;
use crate::engine_core::models::{
    mask_match, Direction, MessageKind, RuleAction, Severity, Violation,
};
use crate::engine_core::traits::AuditSink;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: String,
    pub session_id: String,
    pub direction: Direction,
    pub server: String,
    pub message_type: MessageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_uri: Option<String>,
    pub blocked: bool,
    #[serde(default)]
    pub redacted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch: Option<BatchPosition>,
    pub message_sha256: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
    #[serde(default)]
    pub violations: Vec<AuditViolation>,
}

/// Position of a message inside a batch; `batch` counts per direction from 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchPosition {
    pub batch: u64,
    pub index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditViolation {
    pub rule: String,
    pub severity: Severity,
    pub action: RuleAction,
    #[serde(default)]
    pub description: String,
    pub span: Range<usize>,
    #[serde(rename = "match")]
    pub matched: String,
}

impl AuditViolation {
    pub fn from_violation(v: &Violation, description: &str, include_matches: bool) -> Self {
        Self {
            rule: v.rule.clone(),
            severity: v.severity,
            action: v.action,
            description: description.to_string(),
            span: v.span.clone(),
            matched: if include_matches {
                v.matched.clone()
            } else {
                mask_match(&v.matched)
            },
        }
    }
}

/// Hex-encoded SHA-256 of the exact message text.
pub fn message_digest(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

/// JSON Lines audit file.
///
/// Each entry is one `write` followed by a flush, made under the in-process
/// mutex and an advisory exclusive lock so separate gateway processes can
/// share a file. Appends run on the pump tasks, so the file lock is only
/// tried for a bounded time; a holder that never lets go costs interleaving
/// protection, not a stalled pump.
pub struct JsonlAuditSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonlAuditSink {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, GatewayError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_line(&self, line: &str) -> std::io::Result<()> {
        let mut file = self
            .file
            .lock()
            .map_err(|_| std::io::Error::other("audit file mutex poisoned"))?;
        let locked = try_lock_bounded(&file)?;
        if !locked {
            warn!(path = %self.path.display(), "Audit file lock busy, writing without it");
        }
        let written = file
            .write_all(line.as_bytes())
            .and_then(|_| file.flush());
        if locked {
            written.and(FileExt::unlock(&*file))
        } else {
            written
        }
    }
}

/// Returns `Ok(false)` when another holder kept the lock through every attempt.
fn try_lock_bounded(file: &File) -> std::io::Result<bool> {
    let contended = fs2::lock_contended_error();
    for attempt in 0..limits::AUDIT_LOCK_ATTEMPTS {
        match file.try_lock_exclusive() {
            Ok(()) => return Ok(true),
            Err(e) if e.kind() == contended.kind() => {
                if attempt + 1 < limits::AUDIT_LOCK_ATTEMPTS {
                    std::thread::sleep(Duration::from_millis(limits::AUDIT_LOCK_RETRY_MS));
                }
            }
            Err(e) => return Err(e),
        }
    }
    Ok(false)
}

impl AuditSink for JsonlAuditSink {
    fn append(&self, entry: &AuditEntry) {
        let mut line = match serde_json::to_string(entry) {
            Ok(s) => s,
            Err(e) => {
                warn!("Failed to serialize audit entry: {}", e);
                return;
            }
        };
        line.push('\n');
        if let Err(e) = self.write_line(&line) {
            warn!(path = %self.path.display(), "Failed to write audit entry: {}", e);
        }
    }
}

/// Emits entries as structured events on the `audit` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn append(&self, entry: &AuditEntry) {
        let payload = serde_json::to_string(entry).unwrap_or_default();
        info!(
            target: "audit",
            direction = %entry.direction,
            blocked = entry.blocked,
            violations = entry.violations.len(),
            payload = %payload,
            "AUDIT_ENTRY"
        );
    }
}

/// Read every parseable entry from a JSON Lines audit file, in file order.
///
/// Lines that are not valid entries are skipped.
pub fn read_entries(path: &Path) -> Result<Vec<AuditEntry>, GatewayError> {
    let file = File::open(path)?;
    let mut entries = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        if let Ok(entry) = serde_json::from_str::<AuditEntry>(&line) {
            entries.push(entry);
        }
    }
    Ok(entries)
}
