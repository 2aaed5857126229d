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

//! Alert notifiers.
//!
//! Delivery is best-effort. A notifier never blocks the pump that raised
//! the alert and never reports failure back to it.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::AlertingConfig;
use crate::engine_core::errors::GatewayError;
use crate::engine_core::models::Alert;
use crate::engine_core::traits::AlertNotifier;

/// Posts each alert as JSON to a webhook on a background task.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Config(format!("webhook client: {}", e)))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl AlertNotifier for WebhookNotifier {
    fn notify(&self, alert: Alert) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(
                rule = %alert.violation.rule,
                "NotifierError: no async runtime for webhook delivery"
            );
            return;
        };
        let client = self.client.clone();
        let url = self.url.clone();
        handle.spawn(async move {
            let result = client
                .post(&url)
                .json(&alert)
                .send()
                .await
                .and_then(|r| r.error_for_status());
            match result {
                Ok(_) => debug!(rule = %alert.violation.rule, "Alert delivered"),
                Err(e) => warn!(
                    rule = %alert.violation.rule,
                    "NotifierError: webhook delivery failed: {}",
                    e
                ),
            }
        });
    }
}

/// Logs alerts on the `alert` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl AlertNotifier for LogNotifier {
    fn notify(&self, alert: Alert) {
        warn!(
            target: "alert",
            server = %alert.server,
            direction = %alert.direction,
            rule = %alert.violation.rule,
            severity = %alert.violation.severity,
            method = alert.method.as_deref().unwrap_or("-"),
            "Security alert"
        );
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl AlertNotifier for NoopNotifier {
    fn notify(&self, _alert: Alert) {}
}

/// Pick the notifier matching the alerting configuration.
pub fn notifier_from_config(
    config: &AlertingConfig,
) -> Result<Arc<dyn AlertNotifier>, GatewayError> {
    if !config.enabled {
        return Ok(Arc::new(NoopNotifier));
    }
    match config.webhook_url.as_deref() {
        Some(url) if !url.trim().is_empty() => Ok(Arc::new(WebhookNotifier::new(
            url,
            Duration::from_secs(config.timeout_secs),
        )?)),
        _ => Ok(Arc::new(LogNotifier)),
    }
}
