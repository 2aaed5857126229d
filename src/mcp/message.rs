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

//! JSON-RPC message classification.
//!
//! Classification looks only at which envelope fields are present; the
//! exact text of every message is kept alongside the parsed value so that
//! scanning and forwarding operate on the original bytes.

use serde_json::value::RawValue;
use serde_json::Value;

use crate::engine_core::constants::methods;
use crate::engine_core::errors::FrameError;
use crate::engine_core::models::MessageKind;

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Exact text of this message as it appeared on the wire
    pub text: String,
    pub value: Value,
    /// `Some` when the `id` member is present, including `"id": null`
    pub id: Option<Value>,
    pub method: Option<String>,
    pub kind: MessageKind,
}

/// One extracted unit: a single message or a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Single(Message),
    Batch(Vec<Message>),
}

impl Frame {
    /// Parse one extracted frame. A top-level array is a batch whose
    /// elements keep their own exact texts.
    pub fn parse(text: String) -> Result<Frame, FrameError> {
        if text.trim_start().starts_with('[') {
            let elements: Vec<&RawValue> = serde_json::from_str(&text)
                .map_err(|e| FrameError::Malformed(e.to_string()))?;
            let messages = elements
                .into_iter()
                .map(|raw| Message::parse(raw.get().to_string()))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Frame::Batch(messages))
        } else {
            Message::parse(text).map(Frame::Single)
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Frame::Single(_) => 1,
            Frame::Batch(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Message {
    pub fn parse(text: String) -> Result<Message, FrameError> {
        let value: Value =
            serde_json::from_str(&text).map_err(|e| FrameError::Malformed(e.to_string()))?;
        Ok(Self::from_parts(text, value))
    }

    pub fn from_parts(text: String, value: Value) -> Message {
        let kind = classify(&value);
        let id = value.get("id").cloned();
        let method = value
            .get("method")
            .and_then(Value::as_str)
            .map(str::to_string);
        Message {
            text,
            value,
            id,
            method,
            kind,
        }
    }

    pub fn params(&self) -> Option<&Value> {
        self.value.get("params")
    }

    /// Tool name of a `tools/call` request.
    pub fn tool_name(&self) -> Option<&str> {
        if self.method.as_deref() != Some(methods::TOOLS_CALL) {
            return None;
        }
        self.params()?.get("name")?.as_str()
    }

    /// Target of a `resources/read` request.
    pub fn resource_uri(&self) -> Option<&str> {
        if self.method.as_deref() != Some(methods::RESOURCES_READ) {
            return None;
        }
        self.params()?.get("uri")?.as_str()
    }
}

/// Derive the message kind from envelope field presence.
pub fn classify(value: &Value) -> MessageKind {
    let Some(obj) = value.as_object() else {
        return MessageKind::Malformed;
    };
    let has_id = obj.contains_key("id");
    let has_method = obj.get("method").map(Value::is_string).unwrap_or(false);

    match (has_id, has_method) {
        (true, true) => MessageKind::Request,
        (false, true) => MessageKind::Notification,
        (true, false) if obj.contains_key("error") => MessageKind::ErrorResponse,
        (true, false) if obj.contains_key("result") => MessageKind::Response,
        _ => MessageKind::Malformed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn single(text: &str) -> Message {
        match Frame::parse(text.to_string()).unwrap() {
            Frame::Single(m) => m,
            other => panic!("expected single, got {:?}", other),
        }
    }

    #[test]
    fn test_classification() {
        assert_eq!(
            single(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#).kind,
            MessageKind::Request
        );
        assert_eq!(
            single(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#).kind,
            MessageKind::Notification
        );
        assert_eq!(
            single(r#"{"jsonrpc":"2.0","id":1,"result":{}}"#).kind,
            MessageKind::Response
        );
        assert_eq!(
            single(r#"{"jsonrpc":"2.0","id":1,"error":{"code":1}}"#).kind,
            MessageKind::ErrorResponse
        );
        assert_eq!(single(r#"{"jsonrpc":"2.0"}"#).kind, MessageKind::Malformed);
        assert_eq!(single(r#"{"result":1}"#).kind, MessageKind::Malformed);
    }

    #[test]
    fn test_null_id_is_still_a_request() {
        let m = single(r#"{"id":null,"method":"x"}"#);
        assert_eq!(m.kind, MessageKind::Request);
        assert_eq!(m.id, Some(Value::Null));
    }

    #[test]
    fn test_string_id_kept_as_is() {
        let m = single(r#"{"id":"abc","method":"x"}"#);
        assert_eq!(m.id, Some(json!("abc")));
    }

    #[test]
    fn test_invalid_json_is_malformed_error() {
        assert!(matches!(
            Frame::parse("{\"a\":}".to_string()),
            Err(FrameError::Malformed(_))
        ));
    }

    #[test]
    fn test_batch_elements_keep_exact_text() {
        let text = r#"[ {"id":1, "method":"a"} ,{"method":"b"},{"id":2,"result":[]} ]"#;
        match Frame::parse(text.to_string()).unwrap() {
            Frame::Batch(items) => {
                assert_eq!(items.len(), 3);
                assert_eq!(items[0].text, r#"{"id":1, "method":"a"}"#);
                assert_eq!(items[1].kind, MessageKind::Notification);
                assert_eq!(items[2].kind, MessageKind::Response);
            }
            other => panic!("expected batch, got {:?}", other),
        }
    }

    #[test]
    fn test_batch_non_object_element_is_malformed_kind() {
        match Frame::parse("[1,{\"method\":\"x\"}]".to_string()).unwrap() {
            Frame::Batch(items) => assert_eq!(items[0].kind, MessageKind::Malformed),
            other => panic!("expected batch, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_batch() {
        let frame = Frame::parse("[]".to_string()).unwrap();
        assert!(frame.is_empty());
    }

    #[test]
    fn test_tool_and_resource_extraction() {
        let call = single(r#"{"id":1,"method":"tools/call","params":{"name":"read_file"}}"#);
        assert_eq!(call.tool_name(), Some("read_file"));
        assert_eq!(call.resource_uri(), None);

        let read = single(r#"{"id":2,"method":"resources/read","params":{"uri":"file:///etc"}}"#);
        assert_eq!(read.resource_uri(), Some("file:///etc"));
        assert_eq!(read.tool_name(), None);
    }
}
