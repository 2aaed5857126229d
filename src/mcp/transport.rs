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

//! Shared output handles.
//!
//! Each side's output can be written by both pump loops (forwarded traffic
//! from one, synthesized block responses from the other), so writes go
//! through a mutex and each line is written in a single call.

use std::io;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::trace;

pub type BoxedWriter = Box<dyn AsyncWrite + Unpin + Send>;
pub type BoxedReader = Box<dyn AsyncRead + Unpin + Send>;

#[derive(Clone)]
pub struct OutputHandle {
    label: &'static str,
    inner: Arc<Mutex<Option<BoxedWriter>>>,
}

impl OutputHandle {
    pub fn new(label: &'static str, writer: BoxedWriter) -> Self {
        Self {
            label,
            inner: Arc::new(Mutex::new(Some(writer))),
        }
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    /// Write `text` followed by a newline, then flush.
    pub async fn write_line(&self, text: &str) -> io::Result<()> {
        let mut line = Vec::with_capacity(text.len() + 1);
        line.extend_from_slice(text.as_bytes());
        line.push(b'\n');

        let mut guard = self.inner.lock().await;
        let writer = guard.as_mut().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::BrokenPipe,
                format!("{} output already closed", self.label),
            )
        })?;
        trace!(output = self.label, bytes = line.len(), "write");
        writer.write_all(&line).await?;
        writer.flush().await
    }

    /// Flush and drop the writer. The underlying pipe closes, so the reader
    /// on the other end sees end-of-stream. Idempotent.
    pub async fn close(&self) {
        let writer = self.inner.lock().await.take();
        if let Some(mut w) = writer {
            let _ = w.flush().await;
            let _ = w.shutdown().await;
        }
    }

    pub async fn is_closed(&self) -> bool {
        self.inner.lock().await.is_none()
    }
}
