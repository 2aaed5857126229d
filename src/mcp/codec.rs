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

//! Streaming frame extraction.
//!
//! Turns an unbounded byte stream into complete top-level JSON texts using
//! balanced-delimiter framing. Brackets inside string literals are ignored,
//! and a backslash inside a string consumes the following byte. No header or
//! length-prefix framing is recognised.
//!
//! Extraction is resumable: bytes already scanned are not rescanned when the
//! next chunk arrives.

use bytes::{Buf, BytesMut};

use crate::engine_core::errors::FrameError;

#[derive(Debug, Default, Clone, Copy)]
struct ScanState {
    /// A message has started at offset 0 of the buffer
    started: bool,
    depth: usize,
    in_string: bool,
    escape: bool,
    /// Offset of the first byte not yet scanned
    scan_pos: usize,
}

/// Per-direction frame extractor.
#[derive(Debug)]
pub struct FrameExtractor {
    buffer: BytesMut,
    max_bytes: usize,
    state: ScanState,
    /// Skipping input until the next newline after an error
    resyncing: bool,
}

impl FrameExtractor {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(8 * 1024),
            max_bytes: max_bytes.max(1),
            state: ScanState::default(),
            resyncing: false,
        }
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Bytes held for a message that has not completed yet.
    pub fn pending_bytes(&self) -> usize {
        self.buffer.len()
    }

    /// Append `chunk` and return every message it completes, in stream order.
    ///
    /// Errors do not stop extraction: after an overflow or stray bytes the
    /// extractor skips to the next newline and carries on.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Result<String, FrameError>> {
        self.buffer.extend_from_slice(chunk);
        let mut out = Vec::new();
        while let Some(item) = self.next_frame() {
            out.push(item);
        }
        out
    }

    fn next_frame(&mut self) -> Option<Result<String, FrameError>> {
        if self.resyncing {
            match self.buffer.iter().position(|&b| b == b'\n') {
                Some(pos) => {
                    self.buffer.advance(pos + 1);
                    self.resyncing = false;
                }
                None => {
                    self.buffer.clear();
                    return None;
                }
            }
        }

        if !self.state.started {
            let skip = self
                .buffer
                .iter()
                .position(|b| !b.is_ascii_whitespace())
                .unwrap_or(self.buffer.len());
            self.buffer.advance(skip);

            let first = *self.buffer.first()?;
            if first != b'{' && first != b'[' {
                self.resyncing = true;
                return Some(Err(FrameError::Malformed(format!(
                    "unexpected byte 0x{:02x} outside of a message",
                    first
                ))));
            }
            self.state = ScanState {
                started: true,
                ..ScanState::default()
            };
        }

        self.scan()
    }

    fn scan(&mut self) -> Option<Result<String, FrameError>> {
        let mut st = self.state;

        for i in st.scan_pos..self.buffer.len() {
            let b = self.buffer[i];
            if st.in_string {
                if st.escape {
                    st.escape = false;
                } else if b == b'\\' {
                    st.escape = true;
                } else if b == b'"' {
                    st.in_string = false;
                }
            } else {
                match b {
                    b'"' => st.in_string = true,
                    b'{' | b'[' => st.depth += 1,
                    b'}' | b']' => st.depth = st.depth.saturating_sub(1),
                    _ => {}
                }
            }

            if i + 1 > self.max_bytes {
                self.buffer.advance(i + 1);
                self.state = ScanState::default();
                self.resyncing = true;
                return Some(Err(FrameError::BufferOverflow {
                    limit: self.max_bytes,
                }));
            }

            if st.depth == 0 {
                let frame = self.buffer.split_to(i + 1);
                self.state = ScanState::default();
                return Some(
                    String::from_utf8(frame.to_vec())
                        .map_err(|e| FrameError::Malformed(format!("invalid UTF-8: {}", e))),
                );
            }
        }

        st.scan_pos = self.buffer.len();
        self.state = st;
        None
    }
}
