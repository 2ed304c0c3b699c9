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


//! MCP client runtime: framing, transports, protocol client and supervision.

pub mod client;
pub mod codec;
pub mod connection;
pub mod http;
pub mod pipeline;
pub mod process;
pub mod queue;
pub mod server_manager;
pub mod sse;
pub mod subprocess;
pub mod transport;

pub use client::{ClientOptions, McpClient};
pub use connection::{ConnectionManager, ConnectionState};
pub use http::{HttpTransport, HttpTransportOptions};
pub use process::ProcessSpec;
pub use server_manager::{ServerManager, ServerManagerConfig, ServerState};
pub use subprocess::SubprocessTransport;
pub use transport::{Transport, TransportFactory};
