//! End-to-end tests over real TCP sockets.

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use common::{RecordingDelivery, TestClient, TestServer, DEFAULT_TIMEOUT};
use mclistener_ws_server::config::FeatureConfig;
use mclistener_ws_server::{
    BridgeError, EventPublisher, GroupRelay, MessageTemplate, Result, WebSocketServer,
};

const GROUP_MESSAGE: &str = r#"{"type":"group_to_server","group_id":"1","group_name":"G","nickname":"Bob","message":"hi"}"#;

#[tokio::test]
async fn test_handshake_response() {
    let server = TestServer::start().await;
    let client = TestClient::connect(server.addr).await.unwrap();

    assert!(client
        .response
        .starts_with("HTTP/1.1 101 Switching Protocols\r\n"));
    assert!(client
        .response
        .contains("Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n"));

    server.wait_for_clients(1).await;
    server.stop().await;
}

#[tokio::test]
async fn test_broadcast_and_inbound_message() {
    let server = TestServer::start().await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    server.server.set_message_sink(move |payload: &[u8]| -> Result<()> {
        tx.send(payload.to_vec())
            .map_err(|e| BridgeError::Delivery(e.to_string()))
    });

    let mut client = TestClient::connect(server.addr).await.unwrap();
    server.wait_for_clients(1).await;

    let event = r#"{"type":"player_join","player_name":"Alice"}"#;
    assert_eq!(server.server.broadcast(event).await, 1);
    assert_eq!(client.recv_text().await.as_deref(), Some(event));

    client.send_text(GROUP_MESSAGE).await.unwrap();
    let received = tokio::time::timeout(DEFAULT_TIMEOUT, rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(received, GROUP_MESSAGE.as_bytes());

    client.send_close().await.unwrap();
    server.wait_for_clients(0).await;
    server.stop().await;
}

#[tokio::test]
async fn test_broadcast_reaches_every_client() {
    let server = TestServer::start().await;

    let mut clients = Vec::new();
    for _ in 0..3 {
        clients.push(TestClient::connect(server.addr).await.unwrap());
    }
    server.wait_for_clients(3).await;

    assert_eq!(server.server.broadcast("first").await, 3);
    assert_eq!(server.server.broadcast("second").await, 3);

    for client in &mut clients {
        assert_eq!(client.recv_text().await.as_deref(), Some("first"));
        assert_eq!(client.recv_text().await.as_deref(), Some("second"));
    }

    server.stop().await;
}

#[tokio::test]
async fn test_disconnected_client_leaves_registry() {
    let server = TestServer::start().await;

    let staying = TestClient::connect(server.addr).await.unwrap();
    let leaving = TestClient::connect(server.addr).await.unwrap();
    server.wait_for_clients(2).await;

    drop(leaving);
    server.wait_for_clients(1).await;

    drop(staying);
    server.wait_for_clients(0).await;
    assert_eq!(server.server.broadcast("nobody").await, 0);

    server.stop().await;
}

#[tokio::test]
async fn test_stop_closes_clients() {
    let server = TestServer::start().await;
    let mut client = TestClient::connect(server.addr).await.unwrap();
    server.wait_for_clients(1).await;

    server.server.stop().await;
    assert!(client.expect_closed().await);
    assert_eq!(server.server.connection_count().await, 0);
}

#[tokio::test]
async fn test_group_relay_end_to_end() {
    let server = TestServer::start().await;
    let delivery = RecordingDelivery::default();
    server.server.set_message_sink(GroupRelay::new(
        MessageTemplate::new("[{group_name}] {nickname}: {message}"),
        delivery.clone(),
    ));

    let mut client = TestClient::connect(server.addr).await.unwrap();
    client
        .send_text(r#"{"type":"server_to_group","message":"ignored"}"#)
        .await
        .unwrap();
    client.send_text("not json").await.unwrap();
    client.send_text(GROUP_MESSAGE).await.unwrap();
    client
        .send_text(r#"{"type":"group_to_server","group_name":"G","message":"anon"}"#)
        .await
        .unwrap();

    let lines = delivery.wait_for(2).await;
    assert_eq!(lines, vec!["[G] Bob: hi", "[G] unknown: anon"]);

    // Bad payloads do not cost the client its connection.
    assert_eq!(server.server.connection_count().await, 1);
    server.stop().await;
}

#[tokio::test]
async fn test_event_publisher_end_to_end() {
    let server = TestServer::start().await;
    let features = FeatureConfig {
        player_leave_broadcast: false,
        ..FeatureConfig::default()
    };
    let publisher = EventPublisher::new(server.server.broadcaster(), &features);

    let mut client = TestClient::connect(server.addr).await.unwrap();
    server.wait_for_clients(1).await;

    assert_eq!(publisher.player_joined("Alice").await.unwrap(), Some(1));
    assert_eq!(publisher.player_left("Alice").await.unwrap(), None);
    assert_eq!(publisher.player_chat("Alice", "gg").await.unwrap(), Some(1));

    assert_eq!(
        client.recv_text().await.as_deref(),
        Some(r#"{"type":"player_join","player_name":"Alice"}"#)
    );
    assert_eq!(
        client.recv_text().await.as_deref(),
        Some(r#"{"type":"player_msg","player_name":"Alice","content":"gg"}"#)
    );

    server.stop().await;
}

#[tokio::test]
async fn test_concurrent_clients_and_broadcasts() {
    let server = Arc::new(WebSocketServer::new());
    let addr = server.start("127.0.0.1", 0).await.unwrap();

    let mut tasks = Vec::new();
    for _ in 0..10 {
        tasks.push(tokio::spawn(async move {
            let client = TestClient::connect(addr).await.unwrap();
            tokio::time::sleep(Duration::from_millis(50)).await;
            drop(client);
        }));
    }
    let broadcaster = server.broadcaster();
    let pump = tokio::spawn(async move {
        for _ in 0..50 {
            broadcaster.broadcast("tick").await;
            tokio::task::yield_now().await;
        }
    });

    for task in tasks {
        task.await.unwrap();
    }
    pump.await.unwrap();

    let deadline = tokio::time::Instant::now() + DEFAULT_TIMEOUT;
    while server.connection_count().await != 0 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(server.connection_count().await, 0);
    server.stop().await;
}
