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

//! Frame hand-off between background I/O and `Transport::receive`.
//!
//! I/O tasks push complete frames; receivers pop them. A frame goes to the
//! longest-waiting receiver if one is suspended, otherwise it is buffered.
//! The queue knows nothing about request ids: it is an ordered byte channel.

use std::collections::VecDeque;

use bytes::Bytes;
use tokio::sync::{oneshot, Mutex};

use crate::core::errors::TransportError;

#[derive(Debug, Default)]
struct QueueState {
    frames: VecDeque<Bytes>,
    waiters: VecDeque<oneshot::Sender<Bytes>>,
    closed: bool,
}

#[derive(Debug, Default)]
pub struct FrameQueue {
    state: Mutex<QueueState>,
}

impl FrameQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver a frame. Returns `false` if the queue is closed.
    pub async fn push(&self, frame: Bytes) -> bool {
        let mut state = self.state.lock().await;
        if state.closed {
            return false;
        }
        let mut frame = frame;
        while let Some(waiter) = state.waiters.pop_front() {
            match waiter.send(frame) {
                Ok(()) => return true,
                // Receiver gave up (cancelled); try the next one
                Err(returned) => frame = returned,
            }
        }
        state.frames.push_back(frame);
        true
    }

    /// Wait for the next frame. Buffered frames are still returned after
    /// `close()`; once they are drained the queue reports `ConnectionClosed`.
    pub async fn pop(&self) -> Result<Bytes, TransportError> {
        let rx = {
            let mut state = self.state.lock().await;
            if let Some(frame) = state.frames.pop_front() {
                return Ok(frame);
            }
            if state.closed {
                return Err(TransportError::ConnectionClosed);
            }
            let (tx, rx) = oneshot::channel();
            state.waiters.push_back(tx);
            rx
        };
        rx.await.map_err(|_| TransportError::ConnectionClosed)
    }

    /// Mark closed and fail every suspended receiver.
    pub async fn close(&self) {
        let mut state = self.state.lock().await;
        state.closed = true;
        // Dropping the senders wakes each receiver with an error
        state.waiters.clear();
    }

    /// Close and discard buffered frames.
    pub async fn shutdown(&self) {
        let mut state = self.state.lock().await;
        state.closed = true;
        state.waiters.clear();
        state.frames.clear();
    }

    /// Make the queue usable again after a close.
    pub async fn reopen(&self) {
        let mut state = self.state.lock().await;
        state.closed = false;
        state.frames.clear();
    }

    pub async fn is_closed(&self) -> bool {
        self.state.lock().await.closed
    }

    pub async fn buffered(&self) -> usize {
        self.state.lock().await.frames.len()
    }
}
