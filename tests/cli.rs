use assert_cmd::Command;
use predicates::prelude::*;

fn protokoll_mcp() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_protokoll-mcp"));
    // Keep the caller's environment from steering the binary
    for var in [
        "PROTOKOLL_MCP_COMMAND",
        "PROTOKOLL_MCP_ARGS",
        "PROTOKOLL_MCP_URL",
        "RUST_LOG",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

#[test]
fn test_help_lists_subcommands() {
    protokoll_mcp()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage"))
        .stdout(predicate::str::contains("transcripts"))
        .stdout(predicate::str::contains("server-config"));
}

#[test]
fn test_missing_server_fails_cleanly() {
    protokoll_mcp()
        .args(["--server-cmd", "/nonexistent/protokoll-mcp-server", "tools"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to connect to protokoll server"))
        .stderr(predicate::str::contains("Server executable not found"));
}

#[test]
fn test_url_conflicts_with_server_cmd() {
    protokoll_mcp()
        .args([
            "--url",
            "http://localhost:3001/mcp",
            "--server-cmd",
            "protokoll",
            "ping",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot be used with"));
}

#[cfg(unix)]
#[test]
fn test_tools_against_scripted_server() {
    let script = r#"
read _init
printf '%s\n' '{"jsonrpc":"2.0","id":1,"result":{"protocolVersion":"2025-06-18","capabilities":{"tools":{}},"serverInfo":{"name":"protokoll","version":"0.1.0"}}}'
read _initialized
read _list
printf '%s\n' '{"jsonrpc":"2.0","id":2,"result":{"tools":[{"name":"protokoll_list_transcripts"}]}}'
read _eof
"#;
    protokoll_mcp()
        .args(["--server-cmd", "sh", "--server-arg", "-c", "--server-arg", script, "tools"])
        .timeout(std::time::Duration::from_secs(20))
        .assert()
        .success()
        .stdout(predicate::str::contains("\"name\": \"protokoll_list_transcripts\""));
}
