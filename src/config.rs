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

use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::core::constants::{config, protocol, supervision};
use crate::core::errors::{ConfigError, TransportError};
use crate::mcp::client::ClientOptions;
use crate::mcp::http::{HttpTransport, HttpTransportOptions};
use crate::mcp::process::ProcessSpec;
use crate::mcp::server_manager::ServerManagerConfig;
use crate::mcp::subprocess::SubprocessTransport;
use crate::mcp::transport::{Transport, TransportFactory};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Server executable for the stdio transport
    pub command: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub cwd: Option<PathBuf>,
    /// Streamable-HTTP endpoint; when set it takes precedence over `command`
    pub url: Option<String>,
    /// 0 disables the per-request timeout
    pub request_timeout_secs: u64,
    pub http_timeout_secs: u64,
    /// 0 disables `ping` health checks
    pub health_check_interval_secs: u64,
    pub max_restart_attempts: u32,
    pub restart_delay_ms: u64,
    pub protocol_version: String,
    pub log_level: String,
    pub log_format: String, // "json" or "text"
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            command: config::DEFAULT_COMMAND.to_string(),
            args: Vec::new(),
            env: BTreeMap::new(),
            cwd: None,
            url: None,
            request_timeout_secs: supervision::DEFAULT_REQUEST_TIMEOUT.as_secs(),
            http_timeout_secs: supervision::DEFAULT_HTTP_TIMEOUT.as_secs(),
            health_check_interval_secs: supervision::DEFAULT_HEALTH_CHECK_INTERVAL.as_secs(),
            max_restart_attempts: supervision::DEFAULT_MAX_RESTART_ATTEMPTS,
            restart_delay_ms: supervision::DEFAULT_RESTART_DELAY.as_millis() as u64,
            protocol_version: protocol::VERSION.to_string(),
            log_level: "info".to_string(),
            log_format: "text".to_string(),
        }
    }
}

fn parse_env<T: FromStr>(key: &str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value,
        })
}

fn secs(value: u64) -> Option<Duration> {
    (value > 0).then(|| Duration::from_secs(value))
}

impl ClientConfig {
    /// Defaults overlaid with the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().apply_env_from(|key| env::var(key).ok())
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml_ng::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn apply_env(self) -> Result<Self, ConfigError> {
        self.apply_env_from(|key| env::var(key).ok())
    }

    /// Overlay values found through `lookup`, keyed by the
    /// `PROTOKOLL_MCP_*` variable names.
    pub fn apply_env_from<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(command) = lookup(config::ENV_COMMAND) {
            self.command = command;
        }
        if let Some(args) = lookup(config::ENV_ARGS) {
            self.args = args.split_whitespace().map(str::to_string).collect();
        }
        if let Some(url) = lookup(config::ENV_URL).filter(|u| !u.trim().is_empty()) {
            self.url = Some(url);
        }
        if let Some(cwd) = lookup(config::ENV_CWD) {
            self.cwd = Some(PathBuf::from(cwd));
        }
        if let Some(v) = lookup(config::ENV_REQUEST_TIMEOUT_SECS) {
            self.request_timeout_secs = parse_env(config::ENV_REQUEST_TIMEOUT_SECS, v)?;
        }
        if let Some(v) = lookup(config::ENV_HEALTH_INTERVAL_SECS) {
            self.health_check_interval_secs = parse_env(config::ENV_HEALTH_INTERVAL_SECS, v)?;
        }
        if let Some(v) = lookup(config::ENV_MAX_RESTARTS) {
            self.max_restart_attempts = parse_env(config::ENV_MAX_RESTARTS, v)?;
        }
        if let Some(level) = lookup(config::ENV_LOG_LEVEL) {
            self.log_level = level;
        }
        if let Some(format) = lookup(config::ENV_LOG_FORMAT) {
            self.log_format = format;
        }
        Ok(self)
    }

    pub fn process_spec(&self) -> ProcessSpec {
        ProcessSpec {
            command: self.command.clone(),
            args: self.args.clone(),
            env: self.env.clone(),
            cwd: self.cwd.clone(),
        }
    }

    /// HTTP options when a URL is configured.
    pub fn http_options(&self) -> Result<Option<HttpTransportOptions>, ConfigError> {
        let Some(url) = &self.url else {
            return Ok(None);
        };
        let endpoint = Url::parse(url).map_err(|_| ConfigError::InvalidValue {
            key: "url".to_string(),
            value: url.clone(),
        })?;
        let mut options = HttpTransportOptions::new(endpoint);
        options.timeout = Duration::from_secs(self.http_timeout_secs.max(1));
        options.protocol_version =
            Some(self.protocol_version.clone()).filter(|v| !v.is_empty());
        Ok(Some(options))
    }

    pub fn client_options(&self) -> ClientOptions {
        let defaults = ClientOptions::default();
        ClientOptions {
            request_timeout: secs(self.request_timeout_secs),
            protocol_version: Some(self.protocol_version.clone())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| defaults.protocol_version.clone()),
            ..defaults
        }
    }

    pub fn server_manager_config(&self) -> ServerManagerConfig {
        ServerManagerConfig {
            health_check_interval: secs(self.health_check_interval_secs),
            max_restart_attempts: self.max_restart_attempts,
            restart_delay: Duration::from_millis(self.restart_delay_ms),
            client: self.client_options(),
            ..ServerManagerConfig::default()
        }
    }

    /// Transport selection: HTTP when a URL is configured, stdio otherwise.
    pub fn transport_factory(&self) -> Result<TransportSpec, ConfigError> {
        Ok(match self.http_options()? {
            Some(options) => TransportSpec::Http(options),
            None => TransportSpec::Subprocess(self.process_spec()),
        })
    }
}

/// A configured transport, built fresh for every server start.
#[derive(Debug, Clone)]
pub enum TransportSpec {
    Subprocess(ProcessSpec),
    Http(HttpTransportOptions),
}

impl TransportFactory for TransportSpec {
    fn create(&self) -> Result<Box<dyn Transport>, TransportError> {
        Ok(match self {
            TransportSpec::Subprocess(spec) => Box::new(SubprocessTransport::new(spec.clone())),
            TransportSpec::Http(options) => Box::new(HttpTransport::new(options.clone())?),
        })
    }
}
