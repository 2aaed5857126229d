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

//! Sink traits shared by both pump loops.
//!
//! Implementations must serialize their own writes: both directions call
//! them concurrently and one call must never interleave with another.

use crate::engine_core::audit::AuditEntry;
use crate::engine_core::models::Alert;

/// Append-only destination for audit records.
pub trait AuditSink: Send + Sync {
    /// Append one entry. Failures are handled (logged) by the sink itself.
    fn append(&self, entry: &AuditEntry);
}

/// Best-effort alert delivery. Must return without waiting on the network.
pub trait AlertNotifier: Send + Sync {
    fn notify(&self, alert: Alert);
}
