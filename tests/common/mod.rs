//! Scripted in-memory MCP server shared by the integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::{json, Value};

use protokoll_mcp::core::errors::TransportError;
use protokoll_mcp::mcp::queue::FrameQueue;
use protokoll_mcp::mcp::{ServerManagerConfig, Transport, TransportFactory};

#[derive(Debug, Clone)]
pub enum Reply {
    Result(Value),
    Error { code: i64, message: String },
    /// Response with neither result nor error
    Empty,
    /// Echo the request params back as the result
    Echo,
    /// Never answer
    Silent,
}

#[derive(Default)]
struct FakeState {
    queue: FrameQueue,
    connected: AtomicBool,
    starts: AtomicUsize,
    fail_start: AtomicBool,
    start_delay: Mutex<Option<Duration>>,
    replies: Mutex<HashMap<String, Reply>>,
    sent: Mutex<Vec<Value>>,
    held: Mutex<Option<Vec<Bytes>>>,
    rejected: Mutex<Option<String>>,
}

/// A transport whose peer answers from a table of canned replies.
#[derive(Clone, Default)]
pub struct FakeServer {
    state: Arc<FakeState>,
}

impl FakeServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// A server that completes the handshake as protokoll 0.1.0.
    pub fn protokoll() -> Self {
        let server = Self::new();
        server.reply(
            "initialize",
            json!({
                "protocolVersion": "2025-06-18",
                "capabilities": {
                    "tools": { "listChanged": false },
                    "resources": { "subscribe": false, "listChanged": true }
                },
                "serverInfo": { "name": "protokoll", "version": "0.1.0" }
            }),
        );
        server.reply("ping", json!({}));
        server
    }

    pub fn boxed(&self) -> Box<dyn Transport> {
        Box::new(self.clone())
    }

    pub fn reply(&self, method: &str, result: Value) {
        self.script(method, Reply::Result(result));
    }

    pub fn reply_error(&self, method: &str, code: i64, message: &str) {
        self.script(
            method,
            Reply::Error {
                code,
                message: message.to_string(),
            },
        );
    }

    pub fn script(&self, method: &str, reply: Reply) {
        self.state
            .replies
            .lock()
            .unwrap()
            .insert(method.to_string(), reply);
    }

    /// Fail the write of any frame carrying `method`; `None` accepts all.
    pub fn reject_sends(&self, method: Option<&str>) {
        *self.state.rejected.lock().unwrap() = method.map(str::to_string);
    }

    pub fn fail_start(&self, fail: bool) {
        self.state.fail_start.store(fail, Ordering::SeqCst);
    }

    pub fn set_start_delay(&self, delay: Duration) {
        *self.state.start_delay.lock().unwrap() = Some(delay);
    }

    /// Hold responses instead of delivering them.
    pub fn hold(&self) {
        *self.state.held.lock().unwrap() = Some(Vec::new());
    }

    pub fn held_count(&self) -> usize {
        self.state.held.lock().unwrap().as_ref().map_or(0, Vec::len)
    }

    /// Deliver held responses newest first.
    pub async fn release_reversed(&self) {
        let held = self.state.held.lock().unwrap().take().unwrap_or_default();
        for frame in held.into_iter().rev() {
            self.state.queue.push(frame).await;
        }
    }

    /// Push a raw frame as if the server had written it.
    pub async fn inject(&self, message: Value) {
        self.state
            .queue
            .push(Bytes::from(message.to_string()))
            .await;
    }

    /// Simulate the server dying underneath the transport.
    pub async fn crash(&self) {
        self.state.connected.store(false, Ordering::SeqCst);
        self.state.queue.close().await;
    }

    pub fn starts(&self) -> usize {
        self.state.starts.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<Value> {
        self.state.sent.lock().unwrap().clone()
    }

    pub fn sent_methods(&self) -> Vec<String> {
        self.sent()
            .iter()
            .filter_map(|m| m["method"].as_str().map(str::to_string))
            .collect()
    }

    pub fn last_request(&self, method: &str) -> Option<Value> {
        self.sent()
            .into_iter()
            .rev()
            .find(|m| m["method"] == method)
    }

    fn answer(&self, request: &Value) -> Option<Bytes> {
        let id = request.get("id")?.clone();
        let method = request["method"].as_str().unwrap_or_default();
        let reply = self
            .state
            .replies
            .lock()
            .unwrap()
            .get(method)
            .cloned()
            .unwrap_or(Reply::Error {
                code: -32601,
                message: format!("Method not found: {method}"),
            });

        let response = match reply {
            Reply::Result(result) => json!({ "jsonrpc": "2.0", "id": id, "result": result }),
            Reply::Error { code, message } => json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": { "code": code, "message": message }
            }),
            Reply::Empty => json!({ "jsonrpc": "2.0", "id": id }),
            Reply::Echo => json!({
                "jsonrpc": "2.0",
                "id": id,
                "result": request.get("params").cloned().unwrap_or(Value::Null)
            }),
            Reply::Silent => return None,
        };
        Some(Bytes::from(response.to_string()))
    }
}

#[async_trait]
impl Transport for FakeServer {
    async fn start(&self) -> Result<(), TransportError> {
        let delay = *self.state.start_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.state.fail_start.load(Ordering::SeqCst) {
            return Err(TransportError::FailedToStart("scripted failure".into()));
        }
        self.state.starts.fetch_add(1, Ordering::SeqCst);
        self.state.queue.reopen().await;
        self.state.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> Result<(), TransportError> {
        self.state.connected.store(false, Ordering::SeqCst);
        self.state.queue.shutdown().await;
        Ok(())
    }

    async fn send(&self, frame: Bytes) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        let message: Value = serde_json::from_slice(&frame).expect("client sent invalid JSON");
        let rejected = self.state.rejected.lock().unwrap().clone();
        if rejected.is_some_and(|m| message["method"] == m.as_str()) {
            return Err(TransportError::WriteFailed {
                status: None,
                detail: "scripted write failure".into(),
            });
        }
        self.state.sent.lock().unwrap().push(message.clone());

        let Some(response) = self.answer(&message) else {
            return Ok(());
        };
        let held = {
            let mut held = self.state.held.lock().unwrap();
            match held.as_mut() {
                Some(frames) => {
                    frames.push(response.clone());
                    true
                }
                None => false,
            }
        };
        if !held {
            self.state.queue.push(response).await;
        }
        Ok(())
    }

    async fn receive(&self) -> Result<Bytes, TransportError> {
        self.state.queue.pop().await
    }

    fn is_connected(&self) -> bool {
        self.state.connected.load(Ordering::SeqCst)
    }
}

/// Hands out a fresh `FakeServer::protokoll()` per start and records them.
#[derive(Clone, Default)]
pub struct FakeFactory {
    created: Arc<Mutex<Vec<FakeServer>>>,
    failing: Arc<AtomicBool>,
    start_delay: Arc<Mutex<Option<Duration>>>,
}

impl FakeFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Servers created from now on fail to start.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_start_delay(&self, delay: Duration) {
        *self.start_delay.lock().unwrap() = Some(delay);
    }

    pub fn created(&self) -> usize {
        self.created.lock().unwrap().len()
    }

    pub fn latest(&self) -> FakeServer {
        self.created
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no server created yet")
    }
}

impl TransportFactory for FakeFactory {
    fn create(&self) -> Result<Box<dyn Transport>, TransportError> {
        let server = FakeServer::protokoll();
        server.fail_start(self.failing.load(Ordering::SeqCst));
        if let Some(delay) = *self.start_delay.lock().unwrap() {
            server.set_start_delay(delay);
        }
        self.created.lock().unwrap().push(server.clone());
        Ok(server.boxed())
    }
}

/// Supervision settings fast enough for tests; probing disabled.
pub fn fast_config(max_restart_attempts: u32) -> ServerManagerConfig {
    ServerManagerConfig {
        health_check_interval: None,
        max_restart_attempts,
        restart_delay: Duration::from_millis(10),
        ..ServerManagerConfig::default()
    }
}

/// Poll `condition` until it holds or two seconds pass.
pub async fn eventually<F, Fut>(mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..200 {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
