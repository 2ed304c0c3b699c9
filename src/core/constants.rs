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

//! protokoll-mcp Constants - Single source of truth for protocol and runtime values.
//!
//! This module centralizes wire-level names, error codes, and configuration
//! keys so the transports, client, and supervisors agree on them.

use std::time::Duration;

/// JSON-RPC 2.0 protocol constants
pub mod jsonrpc {
    /// Protocol version tag carried by every envelope
    pub const VERSION: &str = "2.0";
    /// Parse error (standard JSON-RPC)
    pub const ERROR_PARSE: i64 = -32700;
    /// Invalid request (standard JSON-RPC)
    pub const ERROR_INVALID_REQUEST: i64 = -32600;
    /// Method not found (standard JSON-RPC)
    pub const ERROR_METHOD_NOT_FOUND: i64 = -32601;
    /// Invalid params (standard JSON-RPC)
    pub const ERROR_INVALID_PARAMS: i64 = -32602;
    /// Internal error (standard JSON-RPC)
    pub const ERROR_INTERNAL: i64 = -32603;
    /// Resource not found (MCP application code)
    pub const ERROR_RESOURCE_NOT_FOUND: i64 = -32002;
}

/// MCP Protocol Methods
pub mod methods {
    pub const INITIALIZE: &str = "initialize";
    pub const INITIALIZED: &str = "notifications/initialized";
    pub const PING: &str = "ping";
    pub const TOOLS_LIST: &str = "tools/list";
    pub const TOOLS_CALL: &str = "tools/call";
    pub const RESOURCES_LIST: &str = "resources/list";
    pub const RESOURCES_READ: &str = "resources/read";
}

/// MCP handshake defaults
pub mod protocol {
    /// Protocol revision announced in `initialize`
    pub const VERSION: &str = "2025-06-18";
    /// Client name announced in `initialize`
    pub const CLIENT_NAME: &str = "protokoll-mcp";
    /// Client version announced in `initialize`
    pub const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");
}

/// Streamable-HTTP header names and values
pub mod http {
    pub const SESSION_HEADER: &str = "mcp-session-id";
    pub const PROTOCOL_VERSION_HEADER: &str = "mcp-protocol-version";
    pub const ACCEPT_VALUE: &str = "application/json, text/event-stream";
    pub const CONTENT_TYPE_JSON: &str = "application/json";
    pub const CONTENT_TYPE_SSE: &str = "text/event-stream";
    /// Characters of an error body kept in `WriteFailed`
    pub const ERROR_BODY_EXCERPT: usize = 256;
}

/// Resource URI grammar exposed by the protokoll server
pub mod uri {
    pub const SCHEME: &str = "protokoll://";
    pub const TRANSCRIPTS: &str = "transcripts";
    pub const TRANSCRIPT: &str = "transcript";
    pub const ENTITIES: &str = "entities";
    pub const ENTITY: &str = "entity";
    pub const CONFIG: &str = "config";
}

/// Configuration Environment Variables
pub mod config {
    pub const ENV_COMMAND: &str = "PROTOKOLL_MCP_COMMAND";
    pub const ENV_ARGS: &str = "PROTOKOLL_MCP_ARGS";
    pub const ENV_URL: &str = "PROTOKOLL_MCP_URL";
    pub const ENV_CWD: &str = "PROTOKOLL_MCP_CWD";
    pub const ENV_REQUEST_TIMEOUT_SECS: &str = "PROTOKOLL_MCP_REQUEST_TIMEOUT_SECS";
    pub const ENV_HEALTH_INTERVAL_SECS: &str = "PROTOKOLL_MCP_HEALTH_INTERVAL_SECS";
    pub const ENV_MAX_RESTARTS: &str = "PROTOKOLL_MCP_MAX_RESTARTS";
    pub const ENV_LOG_LEVEL: &str = "LOG_LEVEL";
    pub const ENV_LOG_FORMAT: &str = "LOG_FORMAT";

    /// Server launched when nothing else is configured
    pub const DEFAULT_COMMAND: &str = "protokoll-mcp-server";
}

/// Supervision defaults
pub mod supervision {
    use super::Duration;

    pub const DEFAULT_MAX_RESTART_ATTEMPTS: u32 = 3;
    pub const DEFAULT_RESTART_DELAY: Duration = Duration::from_millis(500);
    pub const DEFAULT_HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(30);
    pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
    pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);
    /// Uptime after which a recovered server's restart budget is refilled
    pub const DEFAULT_STABILITY_WINDOW: Duration = Duration::from_secs(60);
    /// How long an exited server's stdout may keep delivering buffered frames
    pub const STDOUT_DRAIN_GRACE: Duration = Duration::from_millis(200);
}

/// Transport Limits (DoS Protection)
pub mod limits {
    /// Maximum allowed JSON-RPC frame size (10 MB)
    pub const MAX_MESSAGE_SIZE_BYTES: usize = 10 * 1024 * 1024;
    /// Capacity of internal event channels
    pub const EVENT_CHANNEL_CAPACITY: usize = 64;
    /// Capacity of the notification broadcast channel
    pub const NOTIFICATION_CHANNEL_CAPACITY: usize = 128;
}
