use redial::client::{BoxConnector, DelayWaiter, FnWaiter, Stream, Waiter};
use redial::core::RedialEvent;
use redial::{BoxError, Client, ClientEvent, Config, RedialError, ResolvedAddr, TaskGroup};
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// Connector that refuses every dial without touching the network.
fn refusing_connector(dials: Arc<AtomicUsize>) -> BoxConnector {
    BoxConnector::new(tower::service_fn(move |_addr: ResolvedAddr| {
        dials.fetch_add(1, Ordering::SeqCst);
        async { Err::<Stream, _>(io::Error::from(io::ErrorKind::ConnectionRefused)) }
    }))
}

/// Waiter recording every call and the time it slept.
#[derive(Clone, Default)]
struct RecordingWaiter {
    calls: Arc<Mutex<Vec<(u32, Duration)>>>,
}

impl Waiter for RecordingWaiter {
    fn wait<'a>(
        &'a self,
        attempt: u32,
        cancel: &'a CancellationToken,
    ) -> futures::future::BoxFuture<'a, Result<(), BoxError>> {
        Box::pin(async move {
            if attempt > 1 {
                return Err(RedialError::DoNotReconnect.boxed());
            }
            let start = Instant::now();
            DelayWaiter::new(Duration::from_millis(25))
                .wait(attempt, cancel)
                .await?;
            self.calls.lock().unwrap().push((attempt, start.elapsed()));
            Ok(())
        })
    }
}

#[tokio::test]
async fn refused_dial_consults_waiter_once_before_next_attempt() {
    super::init_tracing();

    let dials = Arc::new(AtomicUsize::new(0));
    let waiter = RecordingWaiter::default();
    let calls = Arc::clone(&waiter.calls);

    let config = Config::builder("example.com:8080")
        .connector(refusing_connector(Arc::clone(&dials)))
        .waiter(waiter)
        .build();
    let client = Client::new(Arc::new(config)).unwrap();
    client.connect().unwrap();
    client.wait().await.unwrap();

    let calls = calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, 1);
    assert!(calls[0].1 >= Duration::from_millis(25));
    assert_eq!(dials.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn second_connect_does_not_disturb_loop() {
    let dials = Arc::new(AtomicUsize::new(0));
    let config = Config::builder("example.com:8080")
        .connector(refusing_connector(Arc::clone(&dials)))
        .reconnect_delay(Duration::from_millis(5))
        .build();
    let client = Client::new(Arc::new(config)).unwrap();

    client.connect().unwrap();
    for _ in 0..3 {
        assert_eq!(client.connect(), Err(RedialError::Running));
    }
    while dials.load(Ordering::SeqCst) < 3 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    client.shutdown(Duration::from_secs(2)).await.unwrap();
    client.wait().await.unwrap();
    assert!(client.err().is_none());
}

#[tokio::test]
async fn events_follow_the_connection_lifecycle() {
    super::init_tracing();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    tokio::spawn(async move {
        let (_socket, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(3600)).await;
    });

    let events = Arc::new(Mutex::new(Vec::new()));
    let record = Arc::clone(&events);
    let config = Config::builder(addr)
        .name("lifecycle")
        .on_event(move |event: &ClientEvent| {
            if event.event_type() != "StateTransition" {
                record.lock().unwrap().push(event.event_type());
            }
            assert_eq!(event.source_name(), "lifecycle");
        })
        .on_session(|_client: Client| async { Ok::<(), BoxError>(()) })
        .build();

    let client = Client::new(Arc::new(config)).unwrap();
    client.connect().unwrap();
    client.wait().await.unwrap();

    assert_eq!(
        *events.lock().unwrap(),
        vec!["Dialing", "Connected", "Disconnected", "Terminated"]
    );
}

#[tokio::test]
async fn on_disconnect_sees_connection_info() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    tokio::spawn(async move {
        let (_socket, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(3600)).await;
    });

    let peers = Arc::new(Mutex::new(Vec::new()));
    let record = Arc::clone(&peers);
    let config = Config::builder(addr.clone())
        .on_session(|client: Client| async move {
            assert!(client.is_connected());
            assert_eq!(client.peer_addr()?, client.conn_info().unwrap().peer_addr());
            Ok::<(), BoxError>(())
        })
        .on_disconnect(move |client, info| {
            assert!(client.is_connected());
            record.lock().unwrap().push(info.peer_addr().to_string());
        })
        .build();

    let client = Client::new(Arc::new(config)).unwrap();
    client.connect().unwrap();
    client.wait().await.unwrap();

    assert_eq!(*peers.lock().unwrap(), vec![addr]);
    assert!(client.conn_info().is_none());
}

#[tokio::test]
async fn shutdown_waits_for_all_tracked_tasks() {
    let group = TaskGroup::new();
    let finished = Arc::new(AtomicUsize::new(0));

    for i in 0..8u64 {
        let token = group.token().clone();
        let finished = Arc::clone(&finished);
        group.go(async move {
            token.cancelled().await;
            tokio::time::sleep(Duration::from_millis(5 * i)).await;
            finished.fetch_add(1, Ordering::SeqCst);
            Ok::<(), BoxError>(())
        });
    }
    assert_eq!(group.len(), 8);

    group.shutdown(Duration::from_secs(5)).await.unwrap();
    group.wait().await.unwrap();
    assert_eq!(finished.load(Ordering::SeqCst), 8);
    assert!(group.is_empty());
}

#[tokio::test]
async fn expired_shutdown_returns_without_hanging() {
    let group = TaskGroup::new();
    group.go(async {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok::<(), BoxError>(())
    });

    let start = Instant::now();
    assert_eq!(
        group.shutdown(Duration::ZERO).await,
        Err(RedialError::ShutdownTimedOut)
    );
    assert!(start.elapsed() < Duration::from_secs(1));
}

#[tokio::test]
async fn waiter_sees_cancellation_during_shutdown() {
    let waits = Arc::new(AtomicUsize::new(0));
    let counted = Arc::clone(&waits);
    let config = Config::builder("example.com:8080")
        .connector(refusing_connector(Arc::new(AtomicUsize::new(0))))
        .waiter(FnWaiter::new(move |_attempt| {
            counted.fetch_add(1, Ordering::SeqCst);
            std::future::pending::<Result<(), BoxError>>()
        }))
        .build();
    let client = Client::new(Arc::new(config)).unwrap();
    client.connect().unwrap();

    while waits.load(Ordering::SeqCst) == 0 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    client.shutdown(Duration::from_secs(2)).await.unwrap();
    assert!(client.err().is_none());
    assert_eq!(waits.load(Ordering::SeqCst), 1);
}
