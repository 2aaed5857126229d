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

//! Rule set construction.
//!
//! A `RuleSet` is an immutable arena of compiled rules with stable indices.
//! Each rule is validated and compiled once; a rule that fails is left out
//! and recorded as a diagnostic instead of failing the whole set.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::engine_core::constants::limits;
use crate::engine_core::errors::RuleCompileError;
use crate::engine_core::models::{RuleAction, Severity};

/// A scanning rule as written in configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Regular expression pattern
    pub pattern: String,
    #[serde(default)]
    pub action: RuleAction,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Patterns match case-insensitively unless this is set
    #[serde(default)]
    pub case_sensitive: bool,
}

fn default_true() -> bool {
    true
}

impl RuleSpec {
    pub fn new(
        name: &str,
        description: &str,
        pattern: &str,
        action: RuleAction,
        severity: Severity,
    ) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            pattern: pattern.to_string(),
            action,
            severity,
            enabled: true,
            case_sensitive: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub name: String,
    pub description: String,
    pub regex: Regex,
    pub action: RuleAction,
    pub severity: Severity,
    pub enabled: bool,
}

/// Immutable compiled rule set, safe to share between both pump loops
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<CompiledRule>,
    rejected: Vec<RuleCompileError>,
}

impl RuleSet {
    /// Compile every spec; invalid ones are excluded and reported via [`RuleSet::rejected`].
    pub fn build(specs: &[RuleSpec]) -> Self {
        let mut rules = Vec::with_capacity(specs.len());
        let mut rejected = Vec::new();
        let mut seen = HashSet::new();

        for spec in specs {
            match Self::compile(spec, &seen) {
                Ok(rule) => {
                    seen.insert(rule.name.clone());
                    rules.push(rule);
                }
                Err(e) => rejected.push(e),
            }
        }

        Self { rules, rejected }
    }

    fn compile(spec: &RuleSpec, seen: &HashSet<String>) -> Result<CompiledRule, RuleCompileError> {
        let reject = |reason: String| RuleCompileError {
            rule: spec.name.clone(),
            pattern: spec.pattern.clone(),
            reason,
        };

        if spec.name.trim().is_empty() {
            return Err(reject("rule name cannot be empty".to_string()));
        }
        if seen.contains(&spec.name) {
            return Err(reject("duplicate rule name".to_string()));
        }
        if spec.pattern.is_empty() {
            return Err(reject("pattern cannot be empty".to_string()));
        }

        let regex = RegexBuilder::new(&spec.pattern)
            .case_insensitive(!spec.case_sensitive)
            .size_limit(limits::REGEX_SIZE_LIMIT_BYTES)
            .build()
            .map_err(|e| reject(e.to_string()))?;

        Ok(CompiledRule {
            name: spec.name.clone(),
            description: spec.description.clone(),
            regex,
            action: spec.action,
            severity: spec.severity,
            enabled: spec.enabled,
        })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn rules(&self) -> &[CompiledRule] {
        &self.rules
    }

    pub fn get(&self, index: usize) -> Option<&CompiledRule> {
        self.rules.get(index)
    }

    pub fn rejected(&self) -> &[RuleCompileError] {
        &self.rejected
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn enabled_count(&self) -> usize {
        self.rules.iter().filter(|r| r.enabled).count()
    }
}

/// Built-in rule catalogue used when configuration does not provide rules
pub fn default_rules() -> Vec<RuleSpec> {
    use RuleAction::*;
    use Severity::*;

    vec![
        RuleSpec::new(
            "openai-api-key",
            "OpenAI API key",
            r"sk-[a-zA-Z0-9]{32,}",
            Alert,
            Critical,
        ),
        RuleSpec::new(
            "aws-access-key",
            "AWS Access Key ID",
            r"AKIA[0-9A-Z]{16}",
            Block,
            Critical,
        ),
        RuleSpec::new(
            "aws-secret-key",
            "AWS Secret Access Key",
            r#"aws_secret_access_key\s*=\s*['"]?([a-zA-Z0-9/+=]{40})['"]?"#,
            Block,
            Critical,
        ),
        RuleSpec::new(
            "private-key",
            "Private key (RSA, EC, OpenSSH)",
            r"-----BEGIN (RSA |EC |OPENSSH )?PRIVATE KEY-----",
            Block,
            Critical,
        ),
        RuleSpec::new(
            "github-token",
            "GitHub personal access token",
            r"gh[ps]_[a-zA-Z0-9]{36,}",
            Alert,
            High,
        ),
        RuleSpec::new(
            "jwt-token",
            "JWT token",
            r"eyJ[a-zA-Z0-9_-]+\.eyJ[a-zA-Z0-9_-]+\.[a-zA-Z0-9_-]+",
            Alert,
            Medium,
        ),
        RuleSpec::new(
            "context7-api-key",
            "Context7 API key",
            r"ctx7sk-[a-zA-Z0-9-]{32,}",
            Alert,
            High,
        ),
        RuleSpec::new(
            "generic-api-key",
            "Generic API key pattern",
            r#"api[_-]?key['"]?\s*[:=]\s*['"]?([a-zA-Z0-9_-]{16,})"#,
            Log,
            Medium,
        ),
        RuleSpec::new(
            "email-address",
            "Email address",
            r"\b[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}\b",
            Log,
            Low,
        ),
        RuleSpec::new(
            "credit-card",
            "Credit card number",
            r"\b(?:\d{4}[-\s]?){3}\d{4}\b",
            Block,
            Critical,
        ),
        RuleSpec::new(
            "ssn",
            "Social Security Number",
            r"\b\d{3}-\d{2}-\d{4}\b",
            Block,
            Critical,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rules_all_compile() {
        let specs = default_rules();
        let set = RuleSet::build(&specs);
        assert!(set.rejected().is_empty(), "{:?}", set.rejected());
        assert_eq!(set.len(), specs.len());
    }

    #[test]
    fn test_invalid_pattern_is_excluded_individually() {
        let specs = vec![
            RuleSpec::new("good", "", r"secret", RuleAction::Log, Severity::Low),
            RuleSpec::new("bad", "", r"(unclosed", RuleAction::Block, Severity::High),
            RuleSpec::new("also-good", "", r"token", RuleAction::Alert, Severity::High),
        ];
        let set = RuleSet::build(&specs);

        assert_eq!(set.len(), 2);
        assert_eq!(set.rules()[0].name, "good");
        assert_eq!(set.rules()[1].name, "also-good");
        assert_eq!(set.rejected().len(), 1);
        assert_eq!(set.rejected()[0].rule, "bad");
    }

    #[test]
    fn test_duplicate_name_keeps_first() {
        let specs = vec![
            RuleSpec::new("dup", "first", r"a", RuleAction::Log, Severity::Low),
            RuleSpec::new("dup", "second", r"b", RuleAction::Block, Severity::High),
        ];
        let set = RuleSet::build(&specs);
        assert_eq!(set.len(), 1);
        assert_eq!(set.rules()[0].description, "first");
        assert!(set.rejected()[0].reason.contains("duplicate"));
    }

    #[test]
    fn test_empty_pattern_rejected() {
        let specs = vec![RuleSpec::new("empty", "", "", RuleAction::Log, Severity::Low)];
        let set = RuleSet::build(&specs);
        assert!(set.is_empty());
        assert_eq!(set.rejected().len(), 1);
    }

    #[test]
    fn test_case_sensitivity_flag() {
        let mut strict = RuleSpec::new("strict", "", r"AKIA", RuleAction::Log, Severity::Low);
        strict.case_sensitive = true;
        let loose = RuleSpec::new("loose", "", r"AKIA", RuleAction::Log, Severity::Low);
        let set = RuleSet::build(&[strict, loose]);

        assert!(!set.rules()[0].regex.is_match("akia"));
        assert!(set.rules()[1].regex.is_match("akia"));
    }

    #[test]
    fn test_disabled_rules_keep_their_index() {
        let mut off = RuleSpec::new("off", "", r"x", RuleAction::Log, Severity::Low);
        off.enabled = false;
        let on = RuleSpec::new("on", "", r"y", RuleAction::Log, Severity::Low);
        let set = RuleSet::build(&[off, on]);
        assert_eq!(set.len(), 2);
        assert_eq!(set.enabled_count(), 1);
        assert_eq!(set.get(1).map(|r| r.name.as_str()), Some("on"));
    }

    #[test]
    fn test_rule_spec_defaults_from_json() {
        let spec: RuleSpec =
            serde_json::from_str(r#"{"name":"n","pattern":"p"}"#).unwrap();
        assert_eq!(spec.action, RuleAction::Log);
        assert_eq!(spec.severity, Severity::Medium);
        assert!(spec.enabled);
        assert!(!spec.case_sensitive);
        assert!(spec.description.is_empty());
    }
}
