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

//! Background pumps for the server's stdio pipes.

use std::sync::Arc;

use futures_util::StreamExt;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::FramedRead;
use tracing::{debug, error};

use crate::mcp::codec::LineCodec;
use crate::mcp::queue::FrameQueue;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    /// Unstructured log line from stderr
    Log(String),
    /// Process terminated with optional exit code
    Terminated(Option<i32>),
}

/// Read newline-delimited frames from the server's stdout into `queue`.
pub fn spawn_stdout_reader<R>(stream: R, queue: Arc<FrameQueue>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut framed = FramedRead::new(stream, LineCodec::new());

        while let Some(result) = framed.next().await {
            match result {
                Ok(frame) => {
                    debug!(bytes = frame.len(), "Received frame from server");
                    if !queue.push(frame).await {
                        break;
                    }
                }
                Err(e) => {
                    error!("Server framing error: {}", e);
                    break;
                }
            }
        }
        debug!("Server stdout closed");
    })
}

/// Drain the server's stderr until EOF, forwarding each non-empty line as a
/// log event. Invalid UTF-8 is replaced; the pipe must stay open or the
/// server dies of SIGPIPE on its next write.
pub fn spawn_stderr_drain<R>(stream: R, tx: mpsc::Sender<ProcessEvent>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(stream);
        let mut line = Vec::new();
        let mut forwarding = true;

        loop {
            line.clear();
            match reader.read_until(b'\n', &mut line).await {
                Ok(0) => break, // Pipe closed
                Ok(_) if forwarding => {
                    let text = String::from_utf8_lossy(&line);
                    let log_msg = text.trim();
                    if !log_msg.is_empty()
                        && tx.send(ProcessEvent::Log(log_msg.to_string())).await.is_err()
                    {
                        // Nobody listens; keep the pipe drained anyway
                        forwarding = false;
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    error!("Server stderr read failed: {}", e);
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stdout_reader_queues_frames_in_order() {
        let input: &[u8] = b"{\"id\":1}\n\n{\"id\":2}\r\n";
        let queue = Arc::new(FrameQueue::new());
        spawn_stdout_reader(input, queue.clone()).await.unwrap();

        assert_eq!(queue.pop().await.unwrap(), &b"{\"id\":1}"[..]);
        assert_eq!(queue.pop().await.unwrap(), &b"{\"id\":2}"[..]);
    }

    #[tokio::test]
    async fn stderr_drain_skips_blank_lines() {
        let input: &[u8] = b"starting\n\n  ready  \n";
        let (tx, mut rx) = mpsc::channel(8);
        spawn_stderr_drain(input, tx).await.unwrap();

        assert_eq!(rx.recv().await, Some(ProcessEvent::Log("starting".into())));
        assert_eq!(rx.recv().await, Some(ProcessEvent::Log("ready".into())));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn stderr_drain_survives_invalid_utf8() {
        let input: &[u8] = b"\xff\xfe broken\nstill here\n";
        let (tx, mut rx) = mpsc::channel(8);
        spawn_stderr_drain(input, tx).await.unwrap();

        assert_eq!(
            rx.recv().await,
            Some(ProcessEvent::Log("\u{FFFD}\u{FFFD} broken".into()))
        );
        assert_eq!(rx.recv().await, Some(ProcessEvent::Log("still here".into())));
        assert_eq!(rx.recv().await, None);
    }
}
