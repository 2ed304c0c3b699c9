#![cfg(unix)]

use std::time::Duration;

use bytes::Bytes;

use protokoll_mcp::core::errors::{ClientError, TransportError};
use protokoll_mcp::mcp::{ClientOptions, McpClient, ProcessSpec, SubprocessTransport, Transport};

const WAIT: Duration = Duration::from_secs(5);

fn shell(script: &str) -> SubprocessTransport {
    SubprocessTransport::new(ProcessSpec::new("sh").args(["-c", script]))
}

async fn receive(transport: &SubprocessTransport) -> Result<Bytes, TransportError> {
    tokio::time::timeout(WAIT, transport.receive())
        .await
        .expect("receive timed out")
}

#[tokio::test]
async fn test_frames_round_trip_through_cat() {
    let transport = SubprocessTransport::new(ProcessSpec::new("cat"));
    transport.start().await.unwrap();
    assert!(transport.is_connected());
    assert!(transport.pid().await.is_some());

    transport
        .send(Bytes::from_static(br#"{"jsonrpc":"2.0","method":"a"}"#))
        .await
        .unwrap();
    transport
        .send(Bytes::from_static(br#"{"jsonrpc":"2.0","method":"b"}"#))
        .await
        .unwrap();

    assert_eq!(
        receive(&transport).await.unwrap(),
        Bytes::from_static(br#"{"jsonrpc":"2.0","method":"a"}"#)
    );
    assert_eq!(
        receive(&transport).await.unwrap(),
        Bytes::from_static(br#"{"jsonrpc":"2.0","method":"b"}"#)
    );

    transport.stop().await.unwrap();
    assert!(!transport.is_connected());
}

#[tokio::test]
async fn test_embedded_newline_is_rejected() {
    let transport = SubprocessTransport::new(ProcessSpec::new("cat"));
    transport.start().await.unwrap();

    let err = transport
        .send(Bytes::from_static(b"{\"a\":\n1}"))
        .await
        .unwrap_err();
    assert!(matches!(err, TransportError::Codec(_)), "got {err:?}");
    transport.stop().await.unwrap();
}

#[tokio::test]
async fn test_client_handshake_against_scripted_server() {
    // ids are deterministic: initialize is 1, tools/list is 2
    let script = r#"
read _init
printf '%s\n' '{"jsonrpc":"2.0","id":1,"result":{"protocolVersion":"2025-06-18","capabilities":{"tools":{}},"serverInfo":{"name":"protokoll","version":"0.1.0"}}}'
read _initialized
read _list
printf '%s\n' '{"jsonrpc":"2.0","id":2,"result":{"tools":[{"name":"protokoll_get_entity","inputSchema":{"type":"object"}}]}}'
read _eof
"#;
    let client = McpClient::new(Box::new(shell(script)), ClientOptions::default());

    let init = client.start().await.unwrap();
    assert_eq!(init.server_info.name, "protokoll");

    let tools = client.list_tools().await.unwrap();
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0].name, "protokoll_get_entity");

    client.stop().await.unwrap();
}

#[tokio::test]
async fn test_frames_written_before_exit_are_delivered() {
    let transport = shell(r#"printf '%s\n' '{"jsonrpc":"2.0","method":"bye"}'; exit 3"#);
    transport.start().await.unwrap();

    let frame = receive(&transport).await.unwrap();
    assert_eq!(frame, Bytes::from_static(br#"{"jsonrpc":"2.0","method":"bye"}"#));

    let err = receive(&transport).await.unwrap_err();
    assert!(matches!(err, TransportError::ConnectionClosed), "got {err:?}");
    assert!(!transport.is_connected());
}

#[tokio::test]
async fn test_server_exit_fails_pending_requests() {
    // Exits as soon as the handshake request arrives
    let client = McpClient::new(Box::new(shell("read _init; exit 1")), ClientOptions::default());

    let err = tokio::time::timeout(WAIT, client.start())
        .await
        .expect("start should not hang")
        .unwrap_err();
    assert!(err.is_connection_loss(), "got {err:?}");
    assert!(!client.is_ready());
}

#[tokio::test]
async fn test_stderr_is_not_framed() {
    let transport = shell(
        r#"echo 'starting up' >&2; printf '%s\n' '{"jsonrpc":"2.0","method":"ready"}'; sleep 5"#,
    );
    transport.start().await.unwrap();

    let frame = receive(&transport).await.unwrap();
    assert_eq!(frame, Bytes::from_static(br#"{"jsonrpc":"2.0","method":"ready"}"#));
    transport.stop().await.unwrap();
}

#[tokio::test]
async fn test_invalid_utf8_on_stderr_keeps_server_alive() {
    let transport = shell(
        r#"printf '\377\n' >&2; sleep 0.3; echo 'second log line' >&2; echo '{"jsonrpc":"2.0","method":"late"}'; read _eof"#,
    );
    transport.start().await.unwrap();

    let frame = receive(&transport).await.unwrap();
    assert_eq!(frame, Bytes::from_static(br#"{"jsonrpc":"2.0","method":"late"}"#));
    assert!(transport.is_connected());
    transport.stop().await.unwrap();
}

#[tokio::test]
async fn test_missing_executable() {
    let transport = SubprocessTransport::new(ProcessSpec::new("/nonexistent/protokoll-mcp-server"));
    let err = transport.start().await.unwrap_err();
    assert!(
        matches!(err, TransportError::ServerNotFound(ref cmd) if cmd.contains("protokoll-mcp-server")),
        "got {err:?}"
    );
    assert!(!transport.is_connected());

    let client = McpClient::new(
        Box::new(SubprocessTransport::new(ProcessSpec::new(
            "/nonexistent/protokoll-mcp-server",
        ))),
        ClientOptions::default(),
    );
    assert!(matches!(
        client.start().await,
        Err(ClientError::Transport(TransportError::ServerNotFound(_)))
    ));
}

#[tokio::test]
async fn test_send_requires_running_process() {
    let transport = SubprocessTransport::new(ProcessSpec::new("cat"));
    let frame = Bytes::from_static(br#"{"jsonrpc":"2.0","method":"x"}"#);

    assert!(matches!(
        transport.send(frame.clone()).await,
        Err(TransportError::NotConnected)
    ));

    transport.start().await.unwrap();
    transport.stop().await.unwrap();
    assert!(matches!(
        transport.send(frame).await,
        Err(TransportError::NotConnected)
    ));
    assert!(matches!(
        receive(&transport).await,
        Err(TransportError::ConnectionClosed)
    ));
    // Stopping twice is fine
    transport.stop().await.unwrap();
}

#[tokio::test]
async fn test_environment_and_working_directory() {
    let dir = tempfile::tempdir().unwrap();
    let spec = ProcessSpec::new("sh")
        .args([
            "-c",
            r#"printf '{"jsonrpc":"2.0","method":"%s","params":{"cwd":"%s"}}\n' "$PROTOKOLL_TEST_METHOD" "$(pwd)""#,
        ])
        .env("PROTOKOLL_TEST_METHOD", "hello")
        .cwd(dir.path());
    let transport = SubprocessTransport::new(spec);
    transport.start().await.unwrap();

    let frame = receive(&transport).await.unwrap();
    let message: serde_json::Value = serde_json::from_slice(&frame).unwrap();
    assert_eq!(message["method"], "hello");
    let cwd = std::path::PathBuf::from(message["params"]["cwd"].as_str().unwrap());
    assert_eq!(
        cwd.canonicalize().unwrap(),
        dir.path().canonicalize().unwrap()
    );
}
