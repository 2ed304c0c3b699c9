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

//! Remote server over MCP Streamable HTTP.
//!
//! Every `send()` is one POST. The response body (plain JSON or an SSE
//! stream) is queued for `receive()`. A session id learned from the
//! `Mcp-Session-Id` header is attached to every later exchange until the
//! server signals that the session is gone; the client then learns of the
//! reset through `take_session_reset()` and re-initializes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, StatusCode, Url};
use tracing::{debug, info, warn};

use crate::core::constants::{http, protocol, supervision};
use crate::core::errors::{CodecError, TransportError};
use crate::mcp::codec::{classify, IncomingMessage};
use crate::mcp::queue::FrameQueue;
use crate::mcp::sse::decode_events;
use crate::mcp::transport::Transport;

#[derive(Debug, Clone)]
pub struct HttpTransportOptions {
    pub endpoint: Url,
    pub timeout: Duration,
    /// Sent as `MCP-Protocol-Version` when set
    pub protocol_version: Option<String>,
}

impl HttpTransportOptions {
    pub fn new(endpoint: Url) -> Self {
        Self {
            endpoint,
            timeout: supervision::DEFAULT_HTTP_TIMEOUT,
            protocol_version: Some(protocol::VERSION.to_string()),
        }
    }
}

pub struct HttpTransport {
    http: Client,
    options: HttpTransportOptions,
    session: Mutex<Option<String>>,
    queue: Arc<FrameQueue>,
    connected: AtomicBool,
    session_reset: AtomicBool,
}

impl HttpTransport {
    pub fn new(options: HttpTransportOptions) -> Result<Self, TransportError> {
        let http = Client::builder()
            .timeout(options.timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| {
                TransportError::FailedToStart(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            http,
            options,
            session: Mutex::new(None),
            queue: Arc::new(FrameQueue::new()),
            connected: AtomicBool::new(false),
            session_reset: AtomicBool::new(false),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.options.endpoint
    }

    /// Session id currently attached to requests.
    pub fn session_id(&self) -> Option<String> {
        self.session.lock().ok().and_then(|s| s.clone())
    }

    /// Forget the session so the next exchange starts a new one.
    pub fn clear_session(&self) -> bool {
        let cleared = self
            .session
            .lock()
            .map(|mut session| session.take().is_some())
            .unwrap_or(false);
        if cleared {
            debug!("Cleared MCP session id");
        }
        cleared
    }

    /// The server rejected the session; flag it for re-initialization.
    fn reset_session(&self) {
        if self.clear_session() {
            self.session_reset.store(true, Ordering::SeqCst);
        }
    }

    fn remember_session(&self, response: &reqwest::Response) {
        let Some(id) = response
            .headers()
            .get(http::SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
        else {
            return;
        };
        if let Ok(mut session) = self.session.lock() {
            if session.is_none() {
                debug!(session_id = %id, "Captured MCP session id");
                *session = Some(id.to_string());
            }
        }
    }

    async fn handle_success(&self, content_type: &str, body: Bytes) {
        if body.iter().all(u8::is_ascii_whitespace) {
            return;
        }

        let frames: Vec<Bytes> = if content_type.starts_with(http::CONTENT_TYPE_SSE) {
            decode_events(&String::from_utf8_lossy(&body))
                .into_iter()
                .map(Bytes::from)
                .collect()
        } else {
            vec![body]
        };

        for frame in frames {
            if is_session_error(&frame) {
                self.reset_session();
            }
            self.queue.push(frame).await;
        }
    }
}

/// A JSON-RPC error response whose message blames the session.
fn is_session_error(frame: &[u8]) -> bool {
    match classify(frame) {
        Ok(IncomingMessage::Response(response)) => response
            .error
            .is_some_and(|e| mentions_session(&e.message)),
        _ => false,
    }
}

fn mentions_session(text: &str) -> bool {
    text.to_ascii_lowercase().contains("session")
}

fn excerpt(body: &str) -> String {
    body.chars().take(http::ERROR_BODY_EXCERPT).collect()
}

#[async_trait]
impl Transport for HttpTransport {
    async fn start(&self) -> Result<(), TransportError> {
        self.queue.reopen().await;
        self.session_reset.store(false, Ordering::SeqCst);
        self.connected.store(true, Ordering::SeqCst);
        info!(endpoint = %self.options.endpoint, "HTTP transport started");
        Ok(())
    }

    async fn stop(&self) -> Result<(), TransportError> {
        let was_connected = self.connected.swap(false, Ordering::SeqCst);
        self.queue.shutdown().await;

        if let Some(session) = self.session_id() {
            // Best effort: the server may not support explicit termination
            let result = self
                .http
                .delete(self.options.endpoint.clone())
                .header(http::SESSION_HEADER, &session)
                .send()
                .await;
            if let Err(e) = result {
                debug!(error = %e, "Session termination request failed");
            }
            self.clear_session();
        }
        if was_connected {
            info!(endpoint = %self.options.endpoint, "HTTP transport stopped");
        }
        Ok(())
    }

    async fn send(&self, frame: Bytes) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        if frame.contains(&b'\n') {
            return Err(CodecError::EmbeddedNewline.into());
        }

        let mut request = self
            .http
            .post(self.options.endpoint.clone())
            .header(CONTENT_TYPE, http::CONTENT_TYPE_JSON)
            .header(ACCEPT, http::ACCEPT_VALUE);
        if let Some(version) = &self.options.protocol_version {
            request = request.header(http::PROTOCOL_VERSION_HEADER, version);
        }
        if let Some(session) = self.session_id() {
            request = request.header(http::SESSION_HEADER, session);
        }

        debug!(endpoint = %self.options.endpoint, bytes = frame.len(), "POST frame");
        let response = request
            .body(frame)
            .send()
            .await
            .map_err(|e| TransportError::WriteFailed {
                status: None,
                detail: if e.is_timeout() {
                    format!("Request timeout after {:?}", self.options.timeout)
                } else {
                    format!("HTTP request failed: {}", e)
                },
            })?;

        let status = response.status();
        if status.is_success() {
            self.remember_session(&response);
        }
        if status == StatusCode::ACCEPTED {
            return Ok(());
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_ascii_lowercase();
        let body = response.bytes().await.map_err(|e| TransportError::WriteFailed {
            status: Some(status.as_u16()),
            detail: format!("Failed to read response body: {}", e),
        })?;

        if status.is_success() {
            self.handle_success(&content_type, body).await;
            return Ok(());
        }

        let text = String::from_utf8_lossy(&body);
        if matches!(status, StatusCode::BAD_REQUEST | StatusCode::NOT_FOUND) || mentions_session(&text)
        {
            warn!(status = %status, "Server rejected session; next exchange starts a new one");
            self.reset_session();
        }
        Err(TransportError::WriteFailed {
            status: Some(status.as_u16()),
            detail: excerpt(&text),
        })
    }

    async fn receive(&self) -> Result<Bytes, TransportError> {
        self.queue.pop().await
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn take_session_reset(&self) -> bool {
        self.session_reset.swap(false, Ordering::SeqCst)
    }
}
