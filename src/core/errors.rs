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

//! Error taxonomy, one enum per layer.
//!
//! Each layer wraps the error of the layer beneath it as its `source()`, so the
//! original cause survives all the way up to the façade.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::core::value::AnyValue;
use crate::mcp::connection::ConnectionState;
use crate::mcp::server_manager::ServerState;

/// Encoding, decoding, and framing errors
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Failed to encode message: {0}")]
    Encode(String),

    #[error("Failed to decode message: {0}")]
    Decode(String),

    /// Framing depends on line delimiting, so a frame may never span lines
    #[error("Encoded frame contains an embedded newline")]
    EmbeddedNewline,

    #[error("Frame of {size} bytes exceeds limit of {limit} bytes")]
    FrameTooLarge { size: usize, limit: usize },

    #[error("I/O error while framing: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by a `Transport` implementation
#[derive(Error, Debug)]
pub enum TransportError {
    /// The server executable could not be located
    #[error("Server executable not found: {0}")]
    ServerNotFound(String),

    #[error("Failed to start transport: {0}")]
    FailedToStart(String),

    #[error("Transport is not connected")]
    NotConnected,

    #[error("Connection closed")]
    ConnectionClosed,

    /// The frame could not be delivered; `status` is set for HTTP failures
    #[error("Write failed (status {status:?}): {detail}")]
    WriteFailed { status: Option<u16>, detail: String },

    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Errors surfaced by the protocol client
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Client is not initialized")]
    NotInitialized,

    #[error("Client stopped")]
    ClientStopped,

    #[error("Handshake already in progress")]
    HandshakeInProgress,

    /// JSON-RPC error payload returned by the server
    #[error("Server error {code}: {message}")]
    Server {
        code: i64,
        message: String,
        data: Option<AnyValue>,
    },

    /// The response carried neither a result nor an error
    #[error("Response carried no result")]
    NoResult,

    #[error("Failed to decode result: {0}")]
    Decoding(#[source] CodecError),

    /// The tool ran but reported `isError`
    #[error("Tool '{tool}' failed: {message}")]
    ToolFailed { tool: String, message: String },

    #[error("Request '{method}' timed out after {after:?}")]
    Timeout { method: String, after: Duration },

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
}

impl ClientError {
    /// True when the failure means the underlying channel is gone.
    pub fn is_connection_loss(&self) -> bool {
        matches!(
            self,
            ClientError::ClientStopped
                | ClientError::Transport(TransportError::ConnectionClosed)
                | ClientError::Transport(TransportError::NotConnected)
        )
    }
}

/// Errors surfaced by the server manager
#[derive(Error, Debug)]
pub enum ServerManagerError {
    #[error("Cannot {action} while server is {state}")]
    InvalidState {
        action: &'static str,
        state: ServerState,
    },

    #[error("Failed to start server: {0}")]
    StartFailed(#[source] ClientError),

    #[error("Failed to stop server: {0}")]
    StopFailed(#[source] ClientError),

    #[error("Server is not running")]
    ServerNotRunning,
}

/// Errors surfaced by the connection façade
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("Cannot change connection while {0}")]
    InvalidState(ConnectionState),

    #[error("Connection failed: {0}")]
    ConnectionFailed(#[source] ServerManagerError),

    #[error("Reconnection failed: {0}")]
    ReconnectionFailed(#[source] ServerManagerError),
}

/// Errors loading client configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml_ng::Error,
    },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}
