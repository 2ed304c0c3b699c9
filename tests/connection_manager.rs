mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{eventually, fast_config, FakeFactory};
use protokoll_mcp::core::errors::{ConnectionError, ServerManagerError};
use protokoll_mcp::mcp::{ConnectionManager, ConnectionState, ServerManager, ServerState};

fn connection(factory: &FakeFactory, max_restarts: u32) -> ConnectionManager {
    ConnectionManager::new(ServerManager::new(
        factory.clone(),
        fast_config(max_restarts),
    ))
}

#[tokio::test]
async fn test_connect_passes_through_connecting() {
    let factory = FakeFactory::new();
    factory.set_start_delay(Duration::from_millis(50));
    let connection = Arc::new(connection(&factory, 3));
    let mut states = connection.subscribe();

    assert_eq!(connection.state(), ConnectionState::Disconnected);
    let connecting = {
        let connection = connection.clone();
        tokio::spawn(async move { connection.connect().await })
    };

    states.changed().await.unwrap();
    assert_eq!(*states.borrow_and_update(), ConnectionState::Connecting);
    assert!(connection.client().await.is_none());

    let client = connecting.await.unwrap().unwrap();
    assert_eq!(connection.state(), ConnectionState::Connected);
    assert!(client.is_ready());
    let current = connection.client().await.unwrap();
    assert!(Arc::ptr_eq(&client, &current));
}

#[tokio::test]
async fn test_connect_is_idempotent() {
    let factory = FakeFactory::new();
    let connection = connection(&factory, 3);

    let first = connection.connect().await.unwrap();
    let second = connection.connect().await.unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(factory.created(), 1);
}

#[tokio::test]
async fn test_connect_failure_is_reported() {
    let factory = FakeFactory::new();
    factory.set_failing(true);
    let connection = connection(&factory, 3);

    let err = connection.connect().await.unwrap_err();
    assert!(
        matches!(err, ConnectionError::ConnectionFailed(ServerManagerError::StartFailed(_))),
        "got {err:?}"
    );
    match connection.state() {
        ConnectionState::Failed(reason) => assert!(reason.contains("scripted failure"), "{reason}"),
        other => panic!("expected failed state, got {other}"),
    }

    // connect() only leaves Disconnected
    assert!(matches!(
        connection.connect().await,
        Err(ConnectionError::InvalidState(ConnectionState::Failed(_)))
    ));

    // reconnect() recovers from Failed
    factory.set_failing(false);
    let client = connection.reconnect().await.unwrap();
    assert!(client.is_ready());
    assert_eq!(connection.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn test_reconnect_passes_through_reconnecting() {
    let factory = FakeFactory::new();
    let connection = connection(&factory, 3);
    let first = connection.connect().await.unwrap();

    let mut states = connection.subscribe();
    states.borrow_and_update();
    let second = connection.reconnect().await.unwrap();

    assert!(!Arc::ptr_eq(&first, &second));
    assert!(!first.is_ready());
    assert_eq!(factory.created(), 2);
    assert_eq!(connection.state(), ConnectionState::Connected);
    assert!(states.has_changed().unwrap());
}

#[tokio::test]
async fn test_reconnect_failure() {
    let factory = FakeFactory::new();
    let connection = connection(&factory, 3);
    connection.connect().await.unwrap();

    factory.set_failing(true);
    let err = connection.reconnect().await.unwrap_err();
    assert!(
        matches!(err, ConnectionError::ReconnectionFailed(_)),
        "got {err:?}"
    );
    assert!(matches!(connection.state(), ConnectionState::Failed(_)));
    assert!(connection.client().await.is_none());
}

#[tokio::test]
async fn test_reconnect_rejected_while_connecting() {
    let factory = FakeFactory::new();
    factory.set_start_delay(Duration::from_millis(100));
    let connection = Arc::new(connection(&factory, 3));

    let connecting = {
        let connection = connection.clone();
        tokio::spawn(async move { connection.connect().await })
    };
    let mut states = connection.subscribe();
    states
        .wait_for(|s| *s == ConnectionState::Connecting)
        .await
        .unwrap();

    assert!(matches!(
        connection.reconnect().await,
        Err(ConnectionError::InvalidState(ConnectionState::Connecting))
    ));
    connecting.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_disconnect_stops_server() {
    let factory = FakeFactory::new();
    let connection = connection(&factory, 3);
    let client = connection.connect().await.unwrap();

    connection.disconnect().await;

    assert_eq!(connection.state(), ConnectionState::Disconnected);
    assert_eq!(connection.server().state().await, ServerState::Stopped);
    assert!(!client.is_ready());
    assert!(connection.client().await.is_none());

    // Disconnected again, so connect() starts a fresh server
    connection.connect().await.unwrap();
    assert_eq!(factory.created(), 2);
}

#[tokio::test]
async fn test_connect_after_unrecovered_crash() {
    let factory = FakeFactory::new();
    let connection = connection(&factory, 0);
    connection.connect().await.unwrap();

    factory.latest().crash().await;
    let server = connection.server().clone();
    assert!(
        eventually(|| {
            let server = server.clone();
            async move { server.state().await == ServerState::Crashed }
        })
        .await
    );

    // Still nominally connected, but there is no client behind it
    assert!(connection.client().await.is_none());
    assert!(matches!(
        connection.connect().await,
        Err(ConnectionError::ConnectionFailed(
            ServerManagerError::ServerNotRunning
        ))
    ));
    assert!(matches!(connection.state(), ConnectionState::Failed(_)));
}
