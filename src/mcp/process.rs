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

//! Server process management with orphan protection.
//!
//! The child is bound to the host: it is killed when the supervisor drops,
//! and on Linux the kernel delivers SIGKILL to it if the host dies first.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::{ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::core::errors::TransportError;
use crate::mcp::pipeline::ProcessEvent;

/// How to launch the server executable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessSpec {
    pub command: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub cwd: Option<PathBuf>,
}

impl ProcessSpec {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }
}

pub struct ProcessSupervisor {
    pid: Option<u32>,
    // Channel to trigger manual kill
    kill_tx: Option<oneshot::Sender<()>>,
}

pub struct ProcessHandles {
    pub stdin: ChildStdin,
    pub stdout: ChildStdout,
    pub stderr: ChildStderr,
}

impl ProcessSupervisor {
    pub fn spawn(
        spec: &ProcessSpec,
        tx_events: mpsc::Sender<ProcessEvent>,
    ) -> Result<(Self, ProcessHandles), TransportError> {
        debug!(command = %spec.command, args = ?spec.args, "Spawning server process");

        let mut command = Command::new(&spec.command);
        command
            .args(&spec.args)
            .envs(&spec.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &spec.cwd {
            command.current_dir(cwd);
        }

        #[cfg(target_os = "linux")]
        // SAFETY: prctl(PR_SET_PDEATHSIG) is async-signal-safe and touches no
        // memory shared with the parent. The constants come from libc.
        unsafe {
            command.pre_exec(|| {
                // Send SIGKILL to the server if the host dies
                let ret = libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGKILL);
                if ret != 0 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }

        let mut child = command.spawn().map_err(|e| match e.kind() {
            ErrorKind::NotFound => TransportError::ServerNotFound(spec.command.clone()),
            _ => TransportError::FailedToStart(format!("{}: {}", spec.command, e)),
        })?;
        let pid = child.id();
        info!(pid = ?pid, command = %spec.command, "Server process started");

        let missing = |pipe: &str| TransportError::FailedToStart(format!("{pipe} pipe unavailable"));
        let handles = ProcessHandles {
            stdin: child.stdin.take().ok_or_else(|| missing("stdin"))?,
            stdout: child.stdout.take().ok_or_else(|| missing("stdout"))?,
            stderr: child.stderr.take().ok_or_else(|| missing("stderr"))?,
        };

        let (kill_tx, kill_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            tokio::select! {
                _ = kill_rx => {
                    let _ = child.kill().await;
                    debug!(pid = ?pid, "Server process killed");
                }
                status = child.wait() => {
                    let code = status.ok().and_then(|s| s.code());
                    let _ = tx_events.send(ProcessEvent::Terminated(code)).await;
                }
            }
        });

        Ok((
            Self {
                pid,
                kill_tx: Some(kill_tx),
            },
            handles,
        ))
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn kill(&mut self) {
        if let Some(tx) = self.kill_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for ProcessSupervisor {
    fn drop(&mut self) {
        self.kill();
    }
}
