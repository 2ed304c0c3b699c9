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

//! Connection façade over a [`ServerManager`].
//!
//! Tracks a coarse connect/disconnect/reconnect lifecycle for callers that
//! should not care about process details. State changes are published on a
//! `watch` channel.

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, warn};

use crate::core::errors::{ConnectionError, ServerManagerError};
use crate::mcp::client::McpClient;
use crate::mcp::server_manager::ServerManager;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Failed(String),
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => f.write_str("disconnected"),
            ConnectionState::Connecting => f.write_str("connecting"),
            ConnectionState::Connected => f.write_str("connected"),
            ConnectionState::Reconnecting => f.write_str("reconnecting"),
            ConnectionState::Failed(reason) => write!(f, "failed ({reason})"),
        }
    }
}

pub struct ConnectionManager {
    server: ServerManager,
    state: watch::Sender<ConnectionState>,
}

impl ConnectionManager {
    pub fn new(server: ServerManager) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self { server, state }
    }

    pub fn state(&self) -> ConnectionState {
        self.state.borrow().clone()
    }

    /// Observe state transitions.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn server(&self) -> &ServerManager {
        &self.server
    }

    /// The live client, if connected and the server is running.
    pub async fn client(&self) -> Option<Arc<McpClient>> {
        if self.state() != ConnectionState::Connected {
            return None;
        }
        self.server.get_client().await
    }

    fn set_state(&self, next: ConnectionState) {
        info!(state = %next, "Connection state changed");
        self.state.send_replace(next);
    }

    /// Claim a state change atomically; on refusal return the current state.
    fn transition(
        &self,
        allowed: impl Fn(&ConnectionState) -> bool,
        to: ConnectionState,
    ) -> Result<(), ConnectionState> {
        let mut current = None;
        let changed = self.state.send_if_modified(|state| {
            if allowed(state) {
                *state = to.clone();
                true
            } else {
                current = Some(state.clone());
                false
            }
        });
        if changed {
            info!(state = %to, "Connection state changed");
            Ok(())
        } else {
            Err(current.unwrap_or(to))
        }
    }

    /// Connect from `Disconnected`. When already connected, returns the
    /// existing client.
    pub async fn connect(&self) -> Result<Arc<McpClient>, ConnectionError> {
        if let Err(current) = self.transition(
            |s| *s == ConnectionState::Disconnected,
            ConnectionState::Connecting,
        ) {
            if current != ConnectionState::Connected {
                return Err(ConnectionError::InvalidState(current));
            }
            return match self.server.get_client().await {
                Some(client) => Ok(client),
                None => {
                    let err = ServerManagerError::ServerNotRunning;
                    self.set_state(ConnectionState::Failed(err.to_string()));
                    Err(ConnectionError::ConnectionFailed(err))
                }
            };
        }

        match self.server.start().await {
            Ok(client) => {
                self.set_state(ConnectionState::Connected);
                Ok(client)
            }
            Err(e) => {
                self.set_state(ConnectionState::Failed(e.to_string()));
                Err(ConnectionError::ConnectionFailed(e))
            }
        }
    }

    /// Stop the server and end `Disconnected`, whatever the outcome.
    pub async fn disconnect(&self) {
        if let Err(e) = self.server.stop().await {
            warn!(error = %e, "Server stop failed during disconnect");
        }
        self.set_state(ConnectionState::Disconnected);
    }

    /// Restart the server underneath the connection.
    pub async fn reconnect(&self) -> Result<Arc<McpClient>, ConnectionError> {
        self.transition(
            |s| !matches!(s, ConnectionState::Connecting | ConnectionState::Reconnecting),
            ConnectionState::Reconnecting,
        )
        .map_err(ConnectionError::InvalidState)?;

        match self.server.restart().await {
            Ok(client) => {
                self.set_state(ConnectionState::Connected);
                Ok(client)
            }
            Err(e) => {
                self.set_state(ConnectionState::Failed(e.to_string()));
                Err(ConnectionError::ReconnectionFailed(e))
            }
        }
    }
}
