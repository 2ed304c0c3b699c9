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

//! MCP protocol client.
//!
//! Drives the `initialize` handshake and correlates responses to requests by
//! id. A background dispatch loop owns the receive side of the transport;
//! callers suspend on a per-request oneshot until their response arrives, the
//! transport closes, or the client stops.
//!
//! When the transport reports that the server discarded its session, the
//! handshake is repeated once and the failed request is retried once.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicI64, AtomicU8, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::de::DeserializeOwned;
use tokio::sync::{broadcast, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::constants::{limits, methods, protocol, supervision};
use crate::core::errors::{ClientError, TransportError};
use crate::core::models::{
    CallToolParams, CallToolResult, EntitiesListResponse, Implementation, InitializeParams,
    InitializeResult, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, ListResourcesResult,
    ListToolsResult, ReadResourceResult, Resource, ServerCapabilities, Tool,
    TranscriptsListResponse,
};
use crate::core::uri::{ResourceUri, TranscriptQuery};
use crate::core::value::AnyValue;
use crate::mcp::codec::{self, classify, IncomingMessage};
use crate::mcp::transport::Transport;

const PHASE_IDLE: u8 = 0;
const PHASE_STARTING: u8 = 1;
const PHASE_READY: u8 = 2;
const PHASE_STOPPED: u8 = 3;

type Waiter = oneshot::Sender<Result<JsonRpcResponse, ClientError>>;
type PendingRequests = Arc<Mutex<HashMap<i64, Waiter>>>;

#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Name and version announced in `initialize`
    pub client_info: Implementation,
    /// Protocol revision requested in `initialize`
    pub protocol_version: String,
    /// Upper bound on waiting for any single response
    pub request_timeout: Option<Duration>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            client_info: Implementation {
                name: protocol::CLIENT_NAME.to_string(),
                version: protocol::CLIENT_VERSION.to_string(),
            },
            protocol_version: protocol::VERSION.to_string(),
            request_timeout: Some(supervision::DEFAULT_REQUEST_TIMEOUT),
        }
    }
}

pub struct McpClient {
    transport: Arc<dyn Transport>,
    options: ClientOptions,
    phase: AtomicU8,
    pending: PendingRequests,
    next_id: AtomicI64,
    server: RwLock<Option<InitializeResult>>,
    renewal: Mutex<()>,
    dispatch: Mutex<Option<JoinHandle<()>>>,
    lost: Mutex<CancellationToken>,
    notifications: broadcast::Sender<JsonRpcNotification>,
}

impl McpClient {
    pub fn new(transport: Box<dyn Transport>, options: ClientOptions) -> Self {
        let (notifications, _) = broadcast::channel(limits::NOTIFICATION_CHANNEL_CAPACITY);
        Self {
            transport: Arc::from(transport),
            options,
            phase: AtomicU8::new(PHASE_IDLE),
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicI64::new(1),
            server: RwLock::new(None),
            renewal: Mutex::new(()),
            dispatch: Mutex::new(None),
            lost: Mutex::new(CancellationToken::new()),
            notifications,
        }
    }

    /// Perform the handshake. Returns the server's `initialize` result.
    ///
    /// On failure the transport is stopped and the client stays not ready;
    /// `start()` may be attempted again.
    pub async fn start(&self) -> Result<InitializeResult, ClientError> {
        match self.phase.compare_exchange(
            PHASE_IDLE,
            PHASE_STARTING,
            Ordering::SeqCst,
            Ordering::SeqCst,
        ) {
            Ok(_) => {}
            Err(PHASE_READY) => {
                return self.negotiated().ok_or(ClientError::NotInitialized);
            }
            Err(PHASE_STARTING) => return Err(ClientError::HandshakeInProgress),
            Err(_) => return Err(ClientError::ClientStopped),
        }

        match self.handshake().await {
            Ok(result) => {
                if self
                    .phase
                    .compare_exchange(PHASE_STARTING, PHASE_READY, Ordering::SeqCst, Ordering::SeqCst)
                    .is_err()
                {
                    // stop() won the race
                    return Err(ClientError::ClientStopped);
                }
                info!(
                    server = %result.server_info.name,
                    version = %result.server_info.version,
                    protocol = %result.protocol_version,
                    "MCP client ready"
                );
                Ok(result)
            }
            Err(e) => {
                warn!(error = %e, "MCP handshake failed");
                self.abort_dispatch().await;
                fail_all(&self.pending, || {
                    ClientError::Transport(TransportError::ConnectionClosed)
                })
                .await;
                if let Err(stop_err) = self.transport.stop().await {
                    debug!(error = %stop_err, "Transport stop after failed handshake");
                }
                let _ = self.phase.compare_exchange(
                    PHASE_STARTING,
                    PHASE_IDLE,
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                );
                Err(e)
            }
        }
    }

    async fn handshake(&self) -> Result<InitializeResult, ClientError> {
        self.transport.start().await?;

        let lost = CancellationToken::new();
        *self.lost.lock().await = lost.clone();
        let handle = tokio::spawn(dispatch_loop(
            self.transport.clone(),
            self.pending.clone(),
            self.notifications.clone(),
            lost,
        ));
        if let Some(stale) = self.dispatch.lock().await.replace(handle) {
            stale.abort();
        }

        self.initialize_session().await
    }

    /// `initialize` followed by `notifications/initialized`. The negotiated
    /// result is recorded only once both went through.
    async fn initialize_session(&self) -> Result<InitializeResult, ClientError> {
        let params = AnyValue::from_serializable(&InitializeParams::new(
            self.options.protocol_version.clone(),
            self.options.client_info.clone(),
        ))?;
        let result: InitializeResult = self.request(methods::INITIALIZE, Some(params)).await?;
        self.notify(methods::INITIALIZED, None).await?;

        if let Ok(mut server) = self.server.write() {
            *server = Some(result.clone());
        }
        Ok(result)
    }

    /// Repeat the handshake after the server discarded the session.
    async fn renew_session(&self) -> Result<(), ClientError> {
        let _renewal = self.renewal.lock().await;
        info!("Server discarded the session; repeating handshake");
        self.initialize_session().await.map(|_| ())
    }

    /// Stop the client. Every outstanding call fails with `ClientStopped`.
    /// Safe before `start()` and when called repeatedly.
    pub async fn stop(&self) -> Result<(), ClientError> {
        let previous = self.phase.swap(PHASE_STOPPED, Ordering::SeqCst);
        fail_all(&self.pending, || ClientError::ClientStopped).await;
        self.abort_dispatch().await;
        self.lost.lock().await.cancel();

        if previous == PHASE_STOPPED {
            return Ok(());
        }
        self.transport.stop().await?;
        info!("MCP client stopped");
        Ok(())
    }

    async fn abort_dispatch(&self) {
        if let Some(handle) = self.dispatch.lock().await.take() {
            handle.abort();
        }
    }

    fn ensure_ready(&self) -> Result<(), ClientError> {
        match self.phase.load(Ordering::SeqCst) {
            PHASE_READY => Ok(()),
            PHASE_STOPPED => Err(ClientError::ClientStopped),
            _ => Err(ClientError::NotInitialized),
        }
    }

    /// Send a request and decode its result into `R`.
    pub async fn send_request<R: DeserializeOwned>(
        &self,
        method: &str,
        params: Option<AnyValue>,
    ) -> Result<R, ClientError> {
        self.ensure_ready()?;
        if self.transport.take_session_reset() {
            self.renew_session().await?;
        }
        match self.request(method, params.clone()).await {
            Err(e) if self.transport.take_session_reset() => {
                debug!(method = %method, error = %e, "Request lost its session; retrying once");
                self.renew_session().await?;
                self.request(method, params).await
            }
            outcome => outcome,
        }
    }

    async fn request<R: DeserializeOwned>(
        &self,
        method: &str,
        params: Option<AnyValue>,
    ) -> Result<R, ClientError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let frame = codec::encode(&JsonRpcRequest::new(id, method, params))?;

        let (tx, rx) = oneshot::channel();
        // Register before sending: the response may arrive before send() returns
        self.pending.lock().await.insert(id, tx);

        debug!(method = %method, id, "Sending request");
        if let Err(e) = self.transport.send(frame).await {
            self.pending.lock().await.remove(&id);
            return Err(e.into());
        }

        let outcome = match self.options.request_timeout {
            Some(after) => match tokio::time::timeout(after, rx).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    self.pending.lock().await.remove(&id);
                    warn!(method = %method, id, "Request timed out");
                    return Err(ClientError::Timeout {
                        method: method.to_string(),
                        after,
                    });
                }
            },
            None => rx.await,
        };

        // A dropped waiter means the pending table was torn down
        let response = outcome.map_err(|_| ClientError::ClientStopped)??;
        debug!(method = %method, id, "Received response");
        decode_response(response)
    }

    /// Send a notification. No response is expected.
    pub async fn send_notification(
        &self,
        method: &str,
        params: Option<AnyValue>,
    ) -> Result<(), ClientError> {
        self.ensure_ready()?;
        if self.transport.take_session_reset() {
            self.renew_session().await?;
        }
        self.notify(method, params).await
    }

    async fn notify(&self, method: &str, params: Option<AnyValue>) -> Result<(), ClientError> {
        let frame = codec::encode(&JsonRpcNotification::new(method, params))?;
        debug!(method = %method, "Sending notification");
        self.transport.send(frame).await?;
        Ok(())
    }

    /// Liveness check. An empty result counts as success.
    pub async fn ping(&self) -> Result<(), ClientError> {
        match self.send_request::<AnyValue>(methods::PING, None).await {
            Ok(_) | Err(ClientError::NoResult) => Ok(()),
            Err(e) => Err(e),
        }
    }

    pub async fn list_tools(&self) -> Result<Vec<Tool>, ClientError> {
        let result: ListToolsResult = self.send_request(methods::TOOLS_LIST, None).await?;
        Ok(result.tools)
    }

    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Option<AnyValue>,
    ) -> Result<CallToolResult, ClientError> {
        let params = AnyValue::from_serializable(&CallToolParams {
            name: name.to_string(),
            arguments,
        })?;
        self.send_request(methods::TOOLS_CALL, Some(params)).await
    }

    /// Call a tool whose first text content item holds JSON, and decode it.
    pub async fn call_tool_with_text_result<T: DeserializeOwned>(
        &self,
        name: &str,
        arguments: Option<AnyValue>,
    ) -> Result<T, ClientError> {
        let result = self.call_tool(name, arguments).await?;
        let text = result.first_text();
        if result.is_error {
            return Err(ClientError::ToolFailed {
                tool: name.to_string(),
                message: text.unwrap_or("tool reported an error").to_string(),
            });
        }
        let text = text.ok_or(ClientError::NoResult)?;
        codec::decode(text.as_bytes()).map_err(ClientError::Decoding)
    }

    pub async fn list_resources(&self) -> Result<Vec<Resource>, ClientError> {
        let result: ListResourcesResult = self.send_request(methods::RESOURCES_LIST, None).await?;
        Ok(result.resources)
    }

    pub async fn read_resource(&self, uri: &str) -> Result<ReadResourceResult, ClientError> {
        let params = AnyValue::object([("uri", uri)]);
        self.send_request(methods::RESOURCES_READ, Some(params)).await
    }

    /// Read a resource whose text content is JSON, and decode it.
    pub async fn read_resource_json<T: DeserializeOwned>(&self, uri: &str) -> Result<T, ClientError> {
        let result = self.read_resource(uri).await?;
        let text = result.first_text().ok_or(ClientError::NoResult)?;
        codec::decode(text.as_bytes()).map_err(ClientError::Decoding)
    }

    pub async fn list_transcripts(
        &self,
        query: &TranscriptQuery,
    ) -> Result<TranscriptsListResponse, ClientError> {
        let uri = ResourceUri::Transcripts(query.clone());
        self.read_resource_json(&uri.to_string()).await
    }

    pub async fn read_transcript(&self, path: &str) -> Result<ReadResourceResult, ClientError> {
        let uri = ResourceUri::Transcript {
            path: path.to_string(),
        };
        self.read_resource(&uri.to_string()).await
    }

    pub async fn list_entities(&self, entity_type: &str) -> Result<EntitiesListResponse, ClientError> {
        let uri = ResourceUri::Entities {
            entity_type: entity_type.to_string(),
        };
        self.read_resource_json(&uri.to_string()).await
    }

    pub async fn get_entity(&self, entity_type: &str, id: &str) -> Result<AnyValue, ClientError> {
        let uri = ResourceUri::Entity {
            entity_type: entity_type.to_string(),
            id: id.to_string(),
        };
        self.read_resource_json(&uri.to_string()).await
    }

    pub async fn get_config(&self) -> Result<AnyValue, ClientError> {
        self.read_resource_json(&ResourceUri::Config.to_string())
            .await
    }

    pub fn is_ready(&self) -> bool {
        self.phase.load(Ordering::SeqCst) == PHASE_READY
    }

    /// Negotiated server capabilities; `None` unless ready.
    pub fn capabilities(&self) -> Option<ServerCapabilities> {
        self.negotiated().map(|r| r.capabilities)
    }

    pub fn server_info(&self) -> Option<Implementation> {
        self.negotiated().map(|r| r.server_info)
    }

    /// Evaluate `predicate` over the server capabilities; `false` unless ready.
    pub fn has_capability<F>(&self, predicate: F) -> bool
    where
        F: FnOnce(&ServerCapabilities) -> bool,
    {
        self.capabilities().is_some_and(|c| predicate(&c))
    }

    fn negotiated(&self) -> Option<InitializeResult> {
        if !self.is_ready() {
            return None;
        }
        self.server.read().ok().and_then(|server| server.clone())
    }

    /// Resolves once the transport closes underneath the client or the
    /// client is stopped.
    pub async fn connection_lost(&self) {
        let token = self.lost.lock().await.clone();
        token.cancelled().await;
    }

    pub fn subscribe_notifications(&self) -> broadcast::Receiver<JsonRpcNotification> {
        self.notifications.subscribe()
    }
}

impl fmt::Debug for McpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("McpClient")
            .field("phase", &self.phase.load(Ordering::SeqCst))
            .field("next_id", &self.next_id.load(Ordering::SeqCst))
            .field("server", &self.server_info())
            .finish_non_exhaustive()
    }
}

impl Drop for McpClient {
    fn drop(&mut self) {
        if let Some(handle) = self.dispatch.get_mut().take() {
            handle.abort();
        }
    }
}

fn decode_response<R: DeserializeOwned>(response: JsonRpcResponse) -> Result<R, ClientError> {
    if let Some(error) = response.error {
        return Err(ClientError::Server {
            code: error.code,
            message: error.message,
            data: error.data,
        });
    }
    let result = response.result.ok_or(ClientError::NoResult)?;
    result.decode_into().map_err(ClientError::Decoding)
}

async fn fail_all<F>(pending: &PendingRequests, make_error: F)
where
    F: Fn() -> ClientError,
{
    let waiters: Vec<Waiter> = pending.lock().await.drain().map(|(_, w)| w).collect();
    if !waiters.is_empty() {
        debug!(count = waiters.len(), "Failing outstanding requests");
    }
    for waiter in waiters {
        let _ = waiter.send(Err(make_error()));
    }
}

async fn dispatch_loop(
    transport: Arc<dyn Transport>,
    pending: PendingRequests,
    notifications: broadcast::Sender<JsonRpcNotification>,
    lost: CancellationToken,
) {
    loop {
        let frame = match transport.receive().await {
            Ok(frame) => frame,
            Err(e) => {
                debug!(error = %e, "Transport closed; dispatch loop exiting");
                break;
            }
        };

        match classify(&frame) {
            Ok(IncomingMessage::Response(response)) => {
                let Some(id) = response.id else {
                    warn!(error = ?response.error, "Discarding response without id");
                    continue;
                };
                let waiter = pending.lock().await.remove(&id);
                match waiter {
                    Some(waiter) => {
                        let _ = waiter.send(Ok(response));
                    }
                    None => debug!(id, "Discarding response with no waiter"),
                }
            }
            Ok(IncomingMessage::Notification(notification)) => {
                debug!(method = %notification.method, "Received notification");
                let _ = notifications.send(notification);
            }
            Ok(IncomingMessage::Request { id, method }) => {
                debug!(id = ?id, method = %method, "Ignoring server-initiated request");
            }
            Err(e) => warn!(error = %e, "Discarding malformed frame"),
        }
    }

    fail_all(&pending, || {
        ClientError::Transport(TransportError::ConnectionClosed)
    })
    .await;
    lost.cancel();
}
