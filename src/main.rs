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

// Command-line driver for the protokoll MCP client
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::info;

use protokoll_mcp::config::ClientConfig;
use protokoll_mcp::core::uri::TranscriptQuery;
use protokoll_mcp::core::value::AnyValue;
use protokoll_mcp::mcp::codec;
use protokoll_mcp::mcp::{ConnectionManager, McpClient, ServerManager};

#[derive(Parser, Debug)]
#[command(version, about = "Talk to a protokoll MCP server", long_about = None)]
struct Cli {
    /// Path to a YAML client configuration
    #[arg(long)]
    config: Option<PathBuf>,

    /// Streamable-HTTP endpoint (e.g. "http://localhost:3001/mcp")
    #[arg(long, conflicts_with = "server_cmd")]
    url: Option<String>,

    /// Server executable launched over stdio
    #[arg(short = 'c', long = "server-cmd")]
    server_cmd: Option<String>,

    /// Argument passed to the server executable (repeatable)
    #[arg(long = "server-arg", allow_hyphen_values = true)]
    server_args: Vec<String>,

    /// Log output format: "text" or "json"
    #[arg(long)]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check that the server answers
    Ping,
    /// List the server's tools
    Tools,
    /// Call a tool with JSON arguments
    Call {
        name: String,
        /// Arguments as a JSON object
        #[arg(long)]
        args: Option<String>,
    },
    /// List the server's resources
    Resources,
    /// Read a resource by URI
    Read { uri: String },
    /// List transcripts in a directory
    Transcripts {
        #[arg(long)]
        directory: String,
        #[arg(long)]
        limit: Option<u32>,
        #[arg(long)]
        offset: Option<u32>,
    },
    /// Read one transcript
    Transcript { path: String },
    /// List entities of a type (person, project, term, company)
    Entities { entity_type: String },
    /// Show one entity
    Entity { entity_type: String, id: String },
    /// Show the server configuration
    ServerConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    install_panic_hook();

    let base = match &cli.config {
        Some(path) => ClientConfig::from_yaml_file(path)?,
        None => ClientConfig::default(),
    };
    let mut config = base.apply_env().context("Failed to load configuration")?;

    // Command-line flags win over file and environment
    if let Some(url) = cli.url {
        config.url = Some(url);
    }
    if let Some(cmd) = cli.server_cmd {
        config.command = cmd;
        config.url = None;
    }
    if !cli.server_args.is_empty() {
        config.args = cli.server_args;
    }
    if let Some(format) = cli.log_format {
        config.log_format = format;
    }

    init_tracing(&config);

    let factory = config
        .transport_factory()
        .context("Invalid transport configuration")?;
    let connection = ConnectionManager::new(ServerManager::new(
        factory,
        config.server_manager_config(),
    ));

    let client = connection
        .connect()
        .await
        .context("Failed to connect to protokoll server")?;
    info!("Connected");

    let outcome = run(&client, cli.command).await;
    connection.disconnect().await;

    let output = outcome?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn run(client: &McpClient, command: Command) -> anyhow::Result<Value> {
    let value = match command {
        Command::Ping => {
            client.ping().await?;
            serde_json::json!({ "ok": true })
        }
        Command::Tools => serde_json::to_value(client.list_tools().await?)?,
        Command::Call { name, args } => {
            let arguments = args
                .map(|raw| codec::decode::<AnyValue>(raw.as_bytes()))
                .transpose()
                .context("--args must be valid JSON")?;
            serde_json::to_value(client.call_tool(&name, arguments).await?)?
        }
        Command::Resources => serde_json::to_value(client.list_resources().await?)?,
        Command::Read { uri } => serde_json::to_value(client.read_resource(&uri).await?)?,
        Command::Transcripts {
            directory,
            limit,
            offset,
        } => {
            let query = TranscriptQuery {
                directory: Some(directory),
                limit,
                offset,
            };
            serde_json::to_value(client.list_transcripts(&query).await?)?
        }
        Command::Transcript { path } => {
            serde_json::to_value(client.read_transcript(&path).await?)?
        }
        Command::Entities { entity_type } => {
            serde_json::to_value(client.list_entities(&entity_type).await?)?
        }
        Command::Entity { entity_type, id } => {
            serde_json::to_value(client.get_entity(&entity_type, &id).await?)?
        }
        Command::ServerConfig => serde_json::to_value(client.get_config().await?)?,
    };
    Ok(value)
}

fn install_panic_hook() {
    std::panic::set_hook(Box::new(|panic_info| {
        let location = panic_info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown".to_string());

        let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };

        eprintln!("PANIC: {} at {}", message, location);
    }));
}

fn init_tracing(config: &ClientConfig) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("protokoll_mcp=info,warn"));

    // Logs go to stderr; stdout carries command output only
    let subscriber = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if config.log_format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
