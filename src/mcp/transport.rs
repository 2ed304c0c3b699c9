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

//! Transport abstraction for MCP.
//!
//! A transport is an ordered, bidirectional channel of JSON-RPC frames. It
//! does not interpret frames: correlation of responses to requests belongs to
//! the protocol client.

use async_trait::async_trait;
use bytes::Bytes;

use crate::core::errors::TransportError;

#[async_trait]
pub trait Transport: Send + Sync {
    /// Establish the underlying channel.
    async fn start(&self) -> Result<(), TransportError>;

    /// Release resources. Every caller suspended in `receive()` fails with
    /// `ConnectionClosed`. Calling it more than once is harmless.
    async fn stop(&self) -> Result<(), TransportError>;

    /// Send one frame. The frame must not contain a newline.
    async fn send(&self, frame: Bytes) -> Result<(), TransportError>;

    /// Wait for the next complete frame.
    async fn receive(&self) -> Result<Bytes, TransportError>;

    fn is_connected(&self) -> bool;

    /// True once after the server discarded a session this transport held.
    /// The client answers by repeating the handshake.
    fn take_session_reset(&self) -> bool {
        false
    }
}

/// Builds a fresh transport for each server start.
pub trait TransportFactory: Send + Sync {
    fn create(&self) -> Result<Box<dyn Transport>, TransportError>;
}

impl<F> TransportFactory for F
where
    F: Fn() -> Result<Box<dyn Transport>, TransportError> + Send + Sync,
{
    fn create(&self) -> Result<Box<dyn Transport>, TransportError> {
        self()
    }
}
