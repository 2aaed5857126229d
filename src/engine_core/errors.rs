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

// Domain error types for the gateway core

use crate::engine_core::models::Direction;
use thiserror::Error;

/// Main error type for the gateway
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Configuration could not be loaded or is structurally invalid
    #[error("Configuration error: {0}")]
    Config(String),

    /// A single rule failed to compile (surfaced at startup, never fatal)
    #[error(transparent)]
    RuleCompile(#[from] RuleCompileError),

    /// The wrapped server process could not be started (fatal)
    #[error("Failed to spawn server process '{command}': {reason}")]
    ChildProcessSpawn { command: String, reason: String },

    /// Broken pipe or unexpected close on one side of a pump
    #[error("Transport error ({direction}): {source}")]
    Transport {
        direction: Direction,
        #[source]
        source: std::io::Error,
    },

    /// I/O Error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding failure for a synthesized response or audit record
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Framing errors raised by the frame extractor and message classifier.
///
/// Neither variant is fatal: the pump logs the error and keeps running.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// A message grew past the configured limit without completing
    #[error("Message exceeded buffer limit of {limit} bytes")]
    BufferOverflow { limit: usize },

    /// Extracted text is not valid JSON (or not valid UTF-8)
    #[error("Malformed message: {0}")]
    Malformed(String),
}

/// A rule rejected while building the rule set
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Rule '{rule}' rejected: {reason}")]
pub struct RuleCompileError {
    pub rule: String,
    pub pattern: String,
    pub reason: String,
}

impl GatewayError {
    pub fn transport(direction: Direction, source: std::io::Error) -> Self {
        GatewayError::Transport { direction, source }
    }

    /// True when the error ends a pump loop but not the gateway itself.
    pub fn is_transport(&self) -> bool {
        matches!(self, GatewayError::Transport { .. })
    }
}
