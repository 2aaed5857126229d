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

//! Action policy: turns a scan result into a forwarding decision.

use serde_json::Value;

use crate::engine_core::models::{BlockResponse, Decision, MessageKind, RuleAction, ScanResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionPolicy {
    /// When false, `Block` findings are recorded but never stop a message.
    pub blocking_enabled: bool,
}

impl Default for ActionPolicy {
    fn default() -> Self {
        Self {
            blocking_enabled: true,
        }
    }
}

impl ActionPolicy {
    pub fn new(blocking_enabled: bool) -> Self {
        Self { blocking_enabled }
    }

    /// Decide what happens to one message.
    ///
    /// Only a `Request` can be answered: responses and notifications that
    /// hit a `Block` rule are dropped without a reply.
    pub fn decide(&self, kind: MessageKind, id: Option<&Value>, scan: &ScanResult) -> Decision {
        if self.blocking_enabled {
            if let Some(v) = scan.most_severe(RuleAction::Block) {
                return match (kind, id) {
                    (MessageKind::Request, Some(id)) => Decision::BlockWithResponse {
                        response: BlockResponse::new(id.clone(), v.rule.clone(), v.severity),
                    },
                    _ => Decision::BlockSilent {
                        rule: v.rule.clone(),
                    },
                };
            }
        }

        match &scan.redacted_text {
            Some(text) => Decision::PassRedacted { text: text.clone() },
            None => Decision::Pass,
        }
    }
}
