//! Exercises `Connection::connect`/`execute`/`pipeline` against an
//! in-process mock server instead of a real Valkey instance, following
//! the handshake and FIFO-ordering properties of spec §8 scenario 5.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use vkconnect_core::conn::{Connection, ConnectionConfig};
use vkconnect_core::resp::CommandEncoder;

/// Starts a mock server on an ephemeral port that replies `+OK` to `HELLO`
/// with a minimal aggregate the handshake accepts, then serves whatever
/// scripted byte replies the test hands it, one per request line read.
async fn mock_server(replies: Vec<&'static [u8]>) -> std::net::SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = vec![0u8; 4096];

        // HELLO handshake: read one request frame, always answer with a
        // minimal RESP3 map the handshake's validator accepts.
        let _ = socket.read(&mut buf).await.unwrap();
        socket
            .write_all(
                b"%7\r\n\
                $6\r\nserver\r\n$5\r\nvalkey\r\n\
                $7\r\nversion\r\n$5\r\n7.2.0\r\n\
                $5\r\nproto\r\n:3\r\n\
                $2\r\nid\r\n:1\r\n\
                $4\r\nmode\r\n$10\r\nstandalone\r\n\
                $4\r\nrole\r\n$6\r\nmaster\r\n\
                $7\r\nmodules\r\n*0\r\n",
            )
            .await
            .unwrap();

        for reply in replies {
            let _ = socket.read(&mut buf).await.unwrap();
            socket.write_all(reply).await.unwrap();
        }

        // Keep the socket open until the test finishes with it.
        loop {
            match socket.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
        }
    });

    addr
}

#[tokio::test]
async fn connects_and_executes_one_command() {
    let addr = mock_server(vec![b"$5\r\nhello\r\n"]).await;

    let conn = Connection::connect(
        format!("valkey://{}:{}", addr.ip(), addr.port()),
        ConnectionConfig::new(),
    )
    .await
    .unwrap();

    let mut encoder = CommandEncoder::new();
    encoder.arg("GET").arg("k");
    let token = conn.execute(&encoder).await.unwrap();
    let value = vkconnect_core::resp::Value::from_token(&token).unwrap();
    assert_eq!(vkconnect_core::resp::as_string(value).unwrap(), "hello");
}

#[tokio::test]
async fn pipeline_preserves_request_order() {
    let addr = mock_server(vec![b"+OK\r\n$1\r\nv\r\n"]).await;

    let conn = Connection::connect(
        format!("valkey://{}:{}", addr.ip(), addr.port()),
        ConnectionConfig::new(),
    )
    .await
    .unwrap();

    let mut set = CommandEncoder::new();
    set.arg("SET").arg("k").arg("v");
    let mut get = CommandEncoder::new();
    get.arg("GET").arg("k");

    let results = conn.pipeline(&[&set, &get]).await.unwrap();
    assert_eq!(results.len(), 2);

    let set_value = vkconnect_core::resp::Value::from_token(results[0].as_ref().unwrap()).unwrap();
    assert_eq!(vkconnect_core::resp::as_string(set_value).unwrap(), "OK");

    let get_value = vkconnect_core::resp::Value::from_token(results[1].as_ref().unwrap()).unwrap();
    assert_eq!(vkconnect_core::resp::as_string(get_value).unwrap(), "v");
}

#[tokio::test]
async fn command_timeout_closes_the_connection() {
    // The mock server never answers the command after the handshake.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = vec![0u8; 4096];
        let _ = socket.read(&mut buf).await.unwrap();
        socket
            .write_all(
                b"%7\r\n\
                $6\r\nserver\r\n$5\r\nvalkey\r\n\
                $7\r\nversion\r\n$5\r\n7.2.0\r\n\
                $5\r\nproto\r\n:3\r\n\
                $2\r\nid\r\n:1\r\n\
                $4\r\nmode\r\n$10\r\nstandalone\r\n\
                $4\r\nrole\r\n$6\r\nmaster\r\n\
                $7\r\nmodules\r\n*0\r\n",
            )
            .await
            .unwrap();
        loop {
            match socket.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
        }
    });

    let config = ConnectionConfig::new().with_command_timeout(Duration::from_millis(50));
    let conn = Connection::connect(format!("valkey://{}:{}", addr.ip(), addr.port()), config)
        .await
        .unwrap();

    let mut encoder = CommandEncoder::new();
    encoder.arg("GET").arg("k");
    let err = conn.execute(&encoder).await.unwrap_err();
    assert!(matches!(err, vkconnect_core::VkError::Timeout));
}
