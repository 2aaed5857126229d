// Copyright 2026 BadCompany
// Licensed under the Apache License, Version 2.0

#![no_main]

use libfuzzer_sys::fuzz_target;
use mcp_gateway::mcp::codec::FrameExtractor;

fuzz_target!(|data: &[u8]| {
    // No byte sequence may panic the extractor or let it hold more than
    // one in-flight message worth of bytes.
    let mut fx = FrameExtractor::new(4096);

    // Feed the input twice: once whole, once in uneven chunks.
    let _ = fx.feed(data);
    for chunk in data.chunks(7) {
        let _ = fx.feed(chunk);
        assert!(fx.pending_bytes() <= fx.max_bytes());
    }
});
