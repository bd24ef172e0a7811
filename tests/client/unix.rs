use redial::{BoxError, Client, Config, Network, RedialError};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixListener;

#[tokio::test]
async fn echoes_over_unix_socket() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("echo.sock");
    let listener = UnixListener::bind(&path).unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 64];
        let n = socket.read(&mut buf).await.unwrap();
        socket.write_all(&buf[..n]).await.unwrap();
    });

    let config = Config::builder(format!("unix:{}", path.display()))
        .on_session(|client: Client| async move {
            assert_eq!(client.remote().network(), Network::Unix);
            client.write(b"over unix").await?;
            client.flush().await?;

            let mut buf = [0u8; 64];
            let n = client.read(&mut buf).await?;
            assert_eq!(&buf[..n], b"over unix");
            Ok::<(), BoxError>(())
        })
        .build();

    let client = Client::new(Arc::new(config)).unwrap();
    client.connect().unwrap();
    client.wait().await.unwrap();
    assert_eq!(client.connections(), 1);
}

#[tokio::test]
async fn missing_socket_is_retried_until_it_appears() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("late.sock");
    let failures = Arc::new(AtomicU32::new(0));
    let counted = Arc::clone(&failures);

    let config = Config::builder(path.display().to_string())
        .reconnect_delay(Duration::from_millis(10))
        .on_reconnect(move |_attempt| {
            counted.fetch_add(1, Ordering::SeqCst);
        })
        .on_session(|_client: Client| async { Err::<(), BoxError>(RedialError::DoNotReconnect.boxed()) })
        .build();

    let client = Client::new(Arc::new(config)).unwrap();
    client.connect().unwrap();

    while failures.load(Ordering::SeqCst) < 2 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let listener = UnixListener::bind(&path).unwrap();
    tokio::spawn(async move {
        let _socket = listener.accept().await;
        tokio::time::sleep(Duration::from_secs(3600)).await;
    });

    client.wait().await.unwrap();
    assert_eq!(client.connections(), 1);
    assert!(client.err().is_none());
}
