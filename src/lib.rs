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

//! mcp-gateway: a transparent inspecting gateway for stdio MCP servers.
//!
//! The gateway sits between an MCP client and the server process it
//! launches, reassembles JSON-RPC messages from both byte streams, scans
//! them against a rule set and forwards, redacts or blocks each one.

pub mod config;
pub mod engine;
pub mod engine_core;
pub mod mcp;
pub mod utils;

pub use config::GatewayConfig;
pub use engine::policy::ActionPolicy;
pub use engine::rules::{RuleSet, RuleSpec};
pub use engine::scanner::Scanner;
pub use engine_core::errors::{FrameError, GatewayError};
pub use mcp::codec::FrameExtractor;
pub use mcp::gateway::{Gateway, GatewaySettings, GatewayState};
