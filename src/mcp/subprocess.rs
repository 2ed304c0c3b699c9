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

//! Local server over stdio.
//!
//! Frames are newline-delimited JSON on the child's stdin/stdout. Stderr is
//! drained for diagnostics only and never produces frames.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tokio::process::ChildStdin;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::core::constants::{limits, supervision};
use crate::core::errors::{CodecError, TransportError};
use crate::mcp::pipeline::{spawn_stderr_drain, spawn_stdout_reader, ProcessEvent};
use crate::mcp::process::{ProcessSpec, ProcessSupervisor};
use crate::mcp::queue::FrameQueue;
use crate::mcp::transport::Transport;

/// Everything that exists only while the process runs.
struct Running {
    supervisor: ProcessSupervisor,
    stdin: Arc<Mutex<ChildStdin>>,
    tasks: Vec<JoinHandle<()>>,
}

pub struct SubprocessTransport {
    spec: ProcessSpec,
    queue: Arc<FrameQueue>,
    connected: Arc<AtomicBool>,
    running: Mutex<Option<Running>>,
}

impl SubprocessTransport {
    pub fn new(spec: ProcessSpec) -> Self {
        Self {
            spec,
            queue: Arc::new(FrameQueue::new()),
            connected: Arc::new(AtomicBool::new(false)),
            running: Mutex::new(None),
        }
    }

    pub fn spec(&self) -> &ProcessSpec {
        &self.spec
    }

    /// PID of the running server, if any.
    pub async fn pid(&self) -> Option<u32> {
        self.running
            .lock()
            .await
            .as_ref()
            .and_then(|r| r.supervisor.pid())
    }

    async fn stdin(&self) -> Result<Arc<Mutex<ChildStdin>>, TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        self.running
            .lock()
            .await
            .as_ref()
            .map(|r| r.stdin.clone())
            .ok_or(TransportError::NotConnected)
    }
}

fn spawn_event_pump(
    mut rx: mpsc::Receiver<ProcessEvent>,
    mut stdout_reader: JoinHandle<()>,
    queue: Arc<FrameQueue>,
    connected: Arc<AtomicBool>,
    command: String,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                ProcessEvent::Log(line) => {
                    debug!(target: "protokoll_mcp::server_stderr", "{}", line);
                }
                ProcessEvent::Terminated(code) => {
                    warn!(command = %command, exit_code = ?code, "Server process exited");
                    connected.store(false, Ordering::SeqCst);
                    // Let frames already written to the pipe reach the queue
                    if tokio::time::timeout(supervision::STDOUT_DRAIN_GRACE, &mut stdout_reader)
                        .await
                        .is_err()
                    {
                        stdout_reader.abort();
                    }
                    queue.close().await;
                    break;
                }
            }
        }
    })
}

#[async_trait]
impl Transport for SubprocessTransport {
    async fn start(&self) -> Result<(), TransportError> {
        let mut running = self.running.lock().await;
        if running.is_some() && self.is_connected() {
            return Ok(());
        }
        if let Some(mut stale) = running.take() {
            stale.supervisor.kill();
            stale.tasks.iter().for_each(JoinHandle::abort);
        }

        self.queue.reopen().await;
        let (tx_events, rx_events) = mpsc::channel(limits::EVENT_CHANNEL_CAPACITY);
        let (supervisor, handles) = ProcessSupervisor::spawn(&self.spec, tx_events.clone())?;

        let stdout_reader = spawn_stdout_reader(handles.stdout, self.queue.clone());
        let tasks = vec![
            spawn_stderr_drain(handles.stderr, tx_events),
            spawn_event_pump(
                rx_events,
                stdout_reader,
                self.queue.clone(),
                self.connected.clone(),
                self.spec.command.clone(),
            ),
        ];

        self.connected.store(true, Ordering::SeqCst);
        *running = Some(Running {
            supervisor,
            stdin: Arc::new(Mutex::new(handles.stdin)),
            tasks,
        });
        info!(command = %self.spec.command, "Subprocess transport started");
        Ok(())
    }

    async fn stop(&self) -> Result<(), TransportError> {
        self.connected.store(false, Ordering::SeqCst);
        // Fail waiters first so nobody hangs on a dying process
        self.queue.shutdown().await;

        let Some(mut running) = self.running.lock().await.take() else {
            return Ok(());
        };
        running.supervisor.kill();
        for task in &running.tasks {
            task.abort();
        }
        info!(command = %self.spec.command, "Subprocess transport stopped");
        Ok(())
    }

    async fn send(&self, frame: Bytes) -> Result<(), TransportError> {
        if frame.contains(&b'\n') {
            return Err(CodecError::EmbeddedNewline.into());
        }
        let stdin = self.stdin().await?;
        let mut stdin = stdin.lock().await;

        let write_failed = |e: std::io::Error| TransportError::WriteFailed {
            status: None,
            detail: e.to_string(),
        };
        stdin.write_all(&frame).await.map_err(write_failed)?;
        stdin.write_all(b"\n").await.map_err(write_failed)?;
        stdin.flush().await.map_err(write_failed)?;
        debug!(bytes = frame.len(), "Sent frame to server");
        Ok(())
    }

    async fn receive(&self) -> Result<Bytes, TransportError> {
        self.queue.pop().await
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}
