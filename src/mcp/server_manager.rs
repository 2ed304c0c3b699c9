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

//! Server lifecycle and crash supervision.
//!
//! A `ServerManager` owns exactly one transport and client pair. While the
//! server runs, a supervisor task watches for the transport closing and, if
//! configured, checks the server with `ping`. A failure marks the server
//! crashed and triggers bounded automatic restarts. The restart budget is
//! refilled once a recovered server passes a health check or stays up for the
//! stability window.
//!
//! ```text
//! Stopped --start--> Starting --ok--> Running --stop--> ShuttingDown --> Stopped
//!                       |                |
//!                       +--err--> Crashed <--ping failure / exit
//!                                    |
//!                                    +--restart (attempts < max)--> Starting
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::constants::supervision;
use crate::core::errors::{ClientError, ServerManagerError};
use crate::mcp::client::{ClientOptions, McpClient};
use crate::mcp::transport::TransportFactory;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServerState {
    Stopped,
    Starting,
    Running,
    ShuttingDown,
    Crashed,
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ServerState::Stopped => "stopped",
            ServerState::Starting => "starting",
            ServerState::Running => "running",
            ServerState::ShuttingDown => "shutting down",
            ServerState::Crashed => "crashed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct ServerManagerConfig {
    /// Interval between `ping` health checks; `None` disables them
    pub health_check_interval: Option<Duration>,
    pub max_restart_attempts: u32,
    /// Pause between stopping and starting during a restart
    pub restart_delay: Duration,
    /// Uptime after which a recovered server counts as stable again
    pub stability_window: Option<Duration>,
    pub client: ClientOptions,
}

impl Default for ServerManagerConfig {
    fn default() -> Self {
        Self {
            health_check_interval: Some(supervision::DEFAULT_HEALTH_CHECK_INTERVAL),
            max_restart_attempts: supervision::DEFAULT_MAX_RESTART_ATTEMPTS,
            restart_delay: supervision::DEFAULT_RESTART_DELAY,
            stability_window: Some(supervision::DEFAULT_STABILITY_WINDOW),
            client: ClientOptions::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StartMode {
    /// Explicit call; resets the restart budget
    Operator,
    /// Automatic crash recovery; only proceeds from `Crashed`
    Recovery,
}

struct Inner {
    state: ServerState,
    client: Option<Arc<McpClient>>,
    supervisor: Option<CancellationToken>,
}

struct Shared {
    config: ServerManagerConfig,
    factory: Box<dyn TransportFactory>,
    inner: Mutex<Inner>,
    restart_attempts: AtomicU32,
}

impl Shared {
    /// Refill the restart budget once a recovered server proves healthy.
    fn mark_stable(&self) {
        let spent = self.restart_attempts.swap(0, Ordering::SeqCst);
        if spent > 0 {
            info!(attempts = spent, "Server stable again; restart budget reset");
        }
    }
}

/// Cloneable handle; clones drive the same server.
#[derive(Clone)]
pub struct ServerManager {
    shared: Arc<Shared>,
}

impl ServerManager {
    pub fn new(factory: impl TransportFactory + 'static, config: ServerManagerConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                factory: Box::new(factory),
                inner: Mutex::new(Inner {
                    state: ServerState::Stopped,
                    client: None,
                    supervisor: None,
                }),
                restart_attempts: AtomicU32::new(0),
            }),
        }
    }

    pub fn config(&self) -> &ServerManagerConfig {
        &self.shared.config
    }

    /// Start the server, or return the running client unchanged.
    pub async fn start(&self) -> Result<Arc<McpClient>, ServerManagerError> {
        self.start_with(StartMode::Operator).await
    }

    async fn start_with(&self, mode: StartMode) -> Result<Arc<McpClient>, ServerManagerError> {
        {
            let mut inner = self.shared.inner.lock().await;
            match (inner.state, mode) {
                (ServerState::Running, StartMode::Operator) => {
                    if let Some(client) = &inner.client {
                        return Ok(client.clone());
                    }
                }
                (ServerState::Stopped | ServerState::Crashed, StartMode::Operator)
                | (ServerState::Crashed, StartMode::Recovery) => {}
                (state, _) => {
                    return Err(ServerManagerError::InvalidState {
                        action: "start",
                        state,
                    })
                }
            }
            inner.state = ServerState::Starting;
        }

        info!(mode = ?mode, "Starting MCP server");
        let client = match self.launch().await {
            Ok(client) => client,
            Err(e) => {
                let mut inner = self.shared.inner.lock().await;
                if inner.state == ServerState::Starting {
                    inner.state = ServerState::Crashed;
                }
                warn!(error = %e, "MCP server failed to start");
                return Err(ServerManagerError::StartFailed(e));
            }
        };

        let mut inner = self.shared.inner.lock().await;
        if inner.state != ServerState::Starting {
            // stop() ran while the handshake was in flight
            let state = inner.state;
            drop(inner);
            if let Err(e) = client.stop().await {
                debug!(error = %e, "Discarding client started during shutdown");
            }
            return Err(ServerManagerError::InvalidState {
                action: "start",
                state,
            });
        }

        let token = CancellationToken::new();
        inner.state = ServerState::Running;
        inner.client = Some(client.clone());
        inner.supervisor = Some(token.clone());
        if mode == StartMode::Operator {
            self.shared.restart_attempts.store(0, Ordering::SeqCst);
        }
        drop(inner);

        self.spawn_supervisor(client.clone(), token);
        info!("MCP server running");
        Ok(client)
    }

    async fn launch(&self) -> Result<Arc<McpClient>, ClientError> {
        let transport = self.shared.factory.create()?;
        let client = Arc::new(McpClient::new(transport, self.shared.config.client.clone()));
        client.start().await?;
        Ok(client)
    }

    /// Stop the server. The state ends `Stopped` even if the client fails to
    /// stop cleanly; that failure is still reported.
    pub async fn stop(&self) -> Result<(), ServerManagerError> {
        let (client, supervisor) = {
            let mut inner = self.shared.inner.lock().await;
            if inner.state == ServerState::Stopped && inner.client.is_none() {
                return Ok(());
            }
            inner.state = ServerState::ShuttingDown;
            (inner.client.take(), inner.supervisor.take())
        };

        info!("Stopping MCP server");
        if let Some(token) = supervisor {
            token.cancel();
        }
        let result = match client {
            Some(client) => client.stop().await,
            None => Ok(()),
        };

        self.shared.inner.lock().await.state = ServerState::Stopped;
        result.map_err(|e| {
            warn!(error = %e, "MCP server did not stop cleanly");
            ServerManagerError::StopFailed(e)
        })
    }

    /// Stop, wait `restart_delay`, then start. A failed stop is logged and
    /// does not prevent the start.
    pub async fn restart(&self) -> Result<Arc<McpClient>, ServerManagerError> {
        if let Err(e) = self.stop().await {
            warn!(error = %e, "Stop failed during restart; starting anyway");
        }
        tokio::time::sleep(self.shared.config.restart_delay).await;
        self.start().await
    }

    /// The client, only while the server is running.
    pub async fn get_client(&self) -> Option<Arc<McpClient>> {
        let inner = self.shared.inner.lock().await;
        match inner.state {
            ServerState::Running => inner.client.clone(),
            _ => None,
        }
    }

    pub async fn client(&self) -> Result<Arc<McpClient>, ServerManagerError> {
        self.get_client()
            .await
            .ok_or(ServerManagerError::ServerNotRunning)
    }

    pub async fn state(&self) -> ServerState {
        self.shared.inner.lock().await.state
    }

    pub async fn restart_attempts(&self) -> u32 {
        self.shared.restart_attempts.load(Ordering::SeqCst)
    }

    fn spawn_supervisor(&self, client: Arc<McpClient>, token: CancellationToken) {
        let manager: Weak<Shared> = Arc::downgrade(&self.shared);
        let interval = self.shared.config.health_check_interval;
        let stability_window = self.shared.config.stability_window;

        tokio::spawn(async move {
            let on_stable = {
                let manager = manager.clone();
                move || {
                    if let Some(shared) = manager.upgrade() {
                        shared.mark_stable();
                    }
                }
            };
            let failure = watch(&client, interval, stability_window, &token, on_stable).await;
            drop(client);
            let Some(reason) = failure else {
                return;
            };
            if let Some(shared) = manager.upgrade() {
                ServerManager { shared }.recover(&token, reason).await;
            }
        });
    }

    async fn recover(&self, token: &CancellationToken, reason: String) {
        let crashed = {
            let mut inner = self.shared.inner.lock().await;
            if token.is_cancelled() || inner.state != ServerState::Running {
                return;
            }
            warn!(reason = %reason, "MCP server crashed");
            inner.state = ServerState::Crashed;
            inner.supervisor = None;
            inner.client.take()
        };
        if let Some(client) = crashed {
            if let Err(e) = client.stop().await {
                debug!(error = %e, "Crashed client did not stop cleanly");
            }
        }

        let max = self.shared.config.max_restart_attempts;
        loop {
            let attempt = {
                let mut inner = self.shared.inner.lock().await;
                if inner.state != ServerState::Crashed {
                    return;
                }
                let spent = self.shared.restart_attempts.load(Ordering::SeqCst);
                if spent >= max {
                    warn!(attempts = spent, "Restart limit reached; server stays crashed");
                    return;
                }
                self.shared.restart_attempts.fetch_add(1, Ordering::SeqCst) + 1
            };

            info!(attempt, max, "Restarting MCP server");
            tokio::time::sleep(self.shared.config.restart_delay).await;
            match self.start_with(StartMode::Recovery).await {
                Ok(_) => return,
                Err(e) => warn!(attempt, error = %e, "Restart attempt failed"),
            }
        }
    }
}

/// Returns `None` when cancelled, otherwise the reason the server is
/// considered dead. `on_stable` runs once, at the first passing health check
/// or when the stability window elapses.
async fn watch<F: FnOnce()>(
    client: &McpClient,
    interval: Option<Duration>,
    stability_window: Option<Duration>,
    token: &CancellationToken,
    on_stable: F,
) -> Option<String> {
    let mut ticker = interval.map(|period| {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    });
    let mut on_stable = Some(on_stable);
    let stable_at = stability_window.map(|window| Instant::now() + window);

    loop {
        tokio::select! {
            _ = token.cancelled() => return None,
            _ = client.connection_lost() => return Some("connection lost".to_string()),
            _ = sleep_until(stable_at), if on_stable.is_some() => {
                if let Some(stable) = on_stable.take() {
                    stable();
                }
            }
            _ = next_tick(&mut ticker) => {
                tokio::select! {
                    _ = token.cancelled() => return None,
                    result = client.ping() => match result {
                        Ok(()) => {
                            debug!("Health check passed");
                            if let Some(stable) = on_stable.take() {
                                stable();
                            }
                        }
                        Err(e) => return Some(format!("health check failed: {e}")),
                    },
                }
            }
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
