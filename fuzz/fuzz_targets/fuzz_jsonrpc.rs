// Copyright 2026 BadCompany
// Licensed under the Apache License, Version 2.0

#![no_main]

use libfuzzer_sys::fuzz_target;
use mcp_gateway::engine::rules::{default_rules, RuleSet};
use mcp_gateway::engine::scanner::Scanner;
use mcp_gateway::mcp::message::Frame;
use std::sync::OnceLock;

static RULES: OnceLock<RuleSet> = OnceLock::new();

fuzz_target!(|data: &[u8]| {
    // Classification and scanning must cope with any JSON shape.
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let rules = RULES.get_or_init(|| RuleSet::build(&default_rules()));

    if let Ok(frame) = Frame::parse(text.to_string()) {
        let messages = match frame {
            Frame::Single(m) => vec![m],
            Frame::Batch(items) => items,
        };
        for msg in messages {
            let _ = msg.tool_name();
            let _ = Scanner::scan(&msg.text, rules);
        }
    }
});
