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

//! MCP Message Codec.
//!
//! Handles the low-level framing of JSON-RPC messages. Every frame is one
//! JSON document terminated by `\n`; a frame may never contain an embedded
//! newline. Also provides envelope encode/decode and classification of
//! incoming frames.

use bytes::{BufMut, Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;

use crate::core::constants::{jsonrpc, limits};
use crate::core::errors::CodecError;
use crate::core::models::{JsonRpcError, JsonRpcNotification, JsonRpcResponse};
use crate::core::value::AnyValue;

/// Serialize a message into a single frame (no trailing newline).
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Bytes, CodecError> {
    let body = serde_json::to_vec(value).map_err(|e| CodecError::Encode(e.to_string()))?;
    if body.contains(&b'\n') {
        return Err(CodecError::EmbeddedNewline);
    }
    Ok(Bytes::from(body))
}

/// Deserialize a single frame.
pub fn decode<T: DeserializeOwned>(frame: &[u8]) -> Result<T, CodecError> {
    serde_json::from_slice(frame).map_err(|e| CodecError::Decode(e.to_string()))
}

/// A frame received from the server, sorted by envelope shape.
#[derive(Debug, Clone, PartialEq)]
pub enum IncomingMessage {
    Response(JsonRpcResponse),
    Notification(JsonRpcNotification),
    /// Server-initiated request; this client does not serve any methods
    Request { id: AnyValue, method: String },
}

pub fn classify(frame: &[u8]) -> Result<IncomingMessage, CodecError> {
    let value: AnyValue = decode(frame)?;
    let AnyValue::Object(map) = &value else {
        return Err(CodecError::Decode(format!(
            "expected a JSON-RPC object, got {}",
            value.kind()
        )));
    };

    let id = map.get("id").filter(|id| !id.is_null());
    if let Some(method) = map.get("method") {
        let method = method
            .as_str()
            .ok_or_else(|| CodecError::Decode("method must be a string".to_string()))?
            .to_string();
        return Ok(match id {
            None => IncomingMessage::Notification(JsonRpcNotification {
                jsonrpc: jsonrpc::VERSION.to_string(),
                method,
                params: map.get("params").cloned(),
            }),
            Some(id) => IncomingMessage::Request {
                id: id.clone(),
                method,
            },
        });
    }

    if id.is_none() && !map.contains_key("result") && !map.contains_key("error") {
        return Err(CodecError::Decode(
            "frame is neither a response nor a notification".to_string(),
        ));
    }

    let error = match map.get("error") {
        Some(err) if !err.is_null() => Some(err.decode_into::<JsonRpcError>()?),
        _ => None,
    };
    Ok(IncomingMessage::Response(JsonRpcResponse {
        jsonrpc: map
            .get("jsonrpc")
            .and_then(AnyValue::as_str)
            .unwrap_or(jsonrpc::VERSION)
            .to_string(),
        id: id.and_then(AnyValue::as_i64),
        result: map.get("result").filter(|r| !r.is_null()).cloned(),
        error,
    }))
}

/// Newline-delimited framing for byte streams.
#[derive(Debug, Clone)]
pub struct LineCodec {
    max_length: usize,
    // Bytes already scanned without finding a newline
    next_index: usize,
}

impl LineCodec {
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_length(limits::MAX_MESSAGE_SIZE_BYTES)
    }

    #[must_use]
    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            max_length,
            next_index: 0,
        }
    }

    fn check_length(&self, size: usize) -> Result<(), CodecError> {
        if size > self.max_length {
            return Err(CodecError::FrameTooLarge {
                size,
                limit: self.max_length,
            });
        }
        Ok(())
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

fn strip_carriage_return(line: &mut BytesMut) {
    if line.last() == Some(&b'\r') {
        line.truncate(line.len() - 1);
    }
}

impl Decoder for LineCodec {
    type Item = Bytes;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>, CodecError> {
        loop {
            let Some(offset) = src[self.next_index..].iter().position(|b| *b == b'\n') else {
                self.check_length(src.len())?;
                self.next_index = src.len();
                return Ok(None);
            };

            let newline = self.next_index + offset;
            self.next_index = 0;
            let mut line = src.split_to(newline + 1);
            line.truncate(newline);
            strip_carriage_return(&mut line);
            self.check_length(line.len())?;

            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            trace!(bytes = line.len(), "Decoded frame");
            return Ok(Some(line.freeze()));
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>, CodecError> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }
        self.next_index = 0;
        if src.iter().all(u8::is_ascii_whitespace) {
            src.clear();
            return Ok(None);
        }
        // Unterminated trailing line at EOF
        let mut line = src.split();
        strip_carriage_return(&mut line);
        Ok(Some(line.freeze()))
    }
}

impl Encoder<Bytes> for LineCodec {
    type Error = CodecError;

    fn encode(&mut self, frame: Bytes, dst: &mut BytesMut) -> Result<(), CodecError> {
        if frame.contains(&b'\n') {
            return Err(CodecError::EmbeddedNewline);
        }
        self.check_length(frame.len())?;
        dst.reserve(frame.len() + 1);
        dst.put_slice(&frame);
        dst.put_u8(b'\n');
        Ok(())
    }
}
