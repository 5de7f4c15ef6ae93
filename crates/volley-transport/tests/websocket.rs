//! Integration tests for the WebSocket transport: a real server socket
//! and a real tokio-tungstenite client.

#![cfg(feature = "websocket")]

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;
use volley_transport::{Connection, Transport, WebSocketTransport};

async fn connect_client(
    addr: std::net::SocketAddr,
) -> tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
> {
    let url = format!("ws://{addr}");
    let (ws, _) = tokio_tungstenite::connect_async(&url)
        .await
        .expect("client should connect");
    ws
}

#[tokio::test]
async fn test_accept_send_receive_round_trip() {
    let mut transport = WebSocketTransport::bind("127.0.0.1:0")
        .await
        .expect("should bind");
    let addr = transport.local_addr().expect("bound address");

    let server = tokio::spawn(async move {
        transport.accept().await.expect("should accept")
    });
    let mut client = connect_client(addr).await;
    let server_conn = server.await.expect("accept task");

    assert!(server_conn.id().0 > 0);
    assert!(server_conn.peer_addr().is_some());

    // Server → client: frames arrive as text.
    server_conn
        .send(br#"{"event":"heartbeat","data":{"t":1}}"#)
        .await
        .expect("send should succeed");
    let msg = client.next().await.unwrap().unwrap();
    assert_eq!(
        msg.into_text().unwrap().as_str(),
        r#"{"event":"heartbeat","data":{"t":1}}"#
    );

    // Client → server: both text and binary frames surface as bytes.
    client
        .send(Message::Text(r#"{"event":"pong"}"#.into()))
        .await
        .unwrap();
    let received = server_conn.recv().await.unwrap().unwrap();
    assert_eq!(received, br#"{"event":"pong"}"#);

    client
        .send(Message::Binary(b"raw-bytes".to_vec().into()))
        .await
        .unwrap();
    let received = server_conn.recv().await.unwrap().unwrap();
    assert_eq!(received, b"raw-bytes");

    server_conn.close().await.expect("close should succeed");
}

#[tokio::test]
async fn test_recv_returns_none_on_client_close() {
    let mut transport = WebSocketTransport::bind("127.0.0.1:0")
        .await
        .expect("should bind");
    let addr = transport.local_addr().unwrap();

    let server = tokio::spawn(async move {
        transport.accept().await.expect("should accept")
    });
    let mut client = connect_client(addr).await;
    let server_conn = server.await.unwrap();

    client.send(Message::Close(None)).await.unwrap();

    let result = server_conn.recv().await.expect("recv should not error");
    assert!(result.is_none(), "clean close surfaces as None");
}

#[tokio::test]
async fn test_connection_ids_are_unique() {
    let mut transport = WebSocketTransport::bind("127.0.0.1:0")
        .await
        .expect("should bind");
    let addr = transport.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let a = transport.accept().await.expect("first accept");
        let b = transport.accept().await.expect("second accept");
        (a, b)
    });
    let _c1 = connect_client(addr).await;
    let _c2 = connect_client(addr).await;
    let (a, b) = server.await.unwrap();
    assert_ne!(a.id(), b.id());
}
