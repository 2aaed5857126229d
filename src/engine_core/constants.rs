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

//! mcp-gateway Constants - Single source of truth for all configuration values.
//!
//! This module centralizes magic numbers, error codes, and environment
//! variable names so the gateway, the CLI and the tests agree on them.

/// JSON-RPC 2.0 Error Codes
pub mod jsonrpc {
    /// Protocol version string written into synthesized responses
    pub const VERSION: &str = "2.0";
    /// Message blocked by the gateway's security policy (server error range)
    pub const ERROR_SECURITY_BLOCK: i32 = -32000;
    /// Human-readable message carried by every block response
    pub const BLOCK_MESSAGE: &str = "Blocked by security policy";
}

/// MCP Protocol Methods
pub mod methods {
    pub const TOOLS_CALL: &str = "tools/call";
    pub const RESOURCES_READ: &str = "resources/read";
}

/// Redaction token format: `[REDACTED:<rule-name>]`
pub mod redaction {
    pub const TOKEN_PREFIX: &str = "[REDACTED:";
    pub const TOKEN_SUFFIX: &str = "]";
}

/// Transport Limits (DoS Protection)
pub mod limits {
    /// Default upper bound for a single in-flight message (10 MB)
    pub const MAX_MESSAGE_SIZE_BYTES: usize = 10 * 1024 * 1024;
    /// Size of one read from either side of the pipe
    pub const READ_CHUNK_BYTES: usize = 64 * 1024;
    /// Bounded read timeout so pump loops can observe the stop signal
    pub const READ_TIMEOUT_MS: u64 = 250;
    /// Grace period after closing the child's stdin, and again after SIGTERM
    pub const CHILD_EXIT_GRACE_MS: u64 = 2_000;
    /// Violation matches are truncated to this many characters in log records
    pub const LOG_MATCH_PREVIEW_CHARS: usize = 50;
    /// Attempts at the audit file lock before writing without it
    pub const AUDIT_LOCK_ATTEMPTS: u32 = 50;
    /// Pause between audit file lock attempts
    pub const AUDIT_LOCK_RETRY_MS: u64 = 2;
    /// Distinct tool names counted individually; the rest share one bucket
    pub const MAX_TRACKED_TOOLS: usize = 256;
    /// Compiled regex size cap per rule
    pub const REGEX_SIZE_LIMIT_BYTES: usize = 1024 * 1024;
}

/// Alert delivery
pub mod alerting {
    pub const DEFAULT_WEBHOOK_TIMEOUT_SECS: u64 = 5;
}

/// Configuration Environment Variables
pub mod config {
    pub const ENV_CONFIG_PATH: &str = "MCP_GATEWAY_CONFIG";
    pub const ENV_LOG_LEVEL: &str = "MCP_GATEWAY_LOG_LEVEL";
    pub const ENV_LOG_FORMAT: &str = "MCP_GATEWAY_LOG_FORMAT";
    /// Directory under `$HOME` holding config, logs and the audit trail
    pub const HOME_DIR_NAME: &str = ".mcp-gateway";
    pub const CONFIG_FILE_NAME: &str = "config.json";
    pub const AUDIT_FILE_NAME: &str = "audit.jsonl";
}
