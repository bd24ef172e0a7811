//! Client metrics regression tests

use super::helpers::*;
use redial::{BoxError, Client, Config};
use serial_test::serial;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

#[tokio::test]
#[serial]
async fn connection_metrics_exist() {
    init_recorder();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    tokio::spawn(async move {
        let _socket = listener.accept().await;
        tokio::time::sleep(Duration::from_secs(3600)).await;
    });

    let config = Config::builder(addr)
        .name("metrics_client")
        .on_session(|_client: Client| async { Ok::<(), BoxError>(()) })
        .build();
    let client = Client::new(Arc::new(config)).unwrap();
    client.connect().unwrap();
    client.wait().await.unwrap();

    // Verify counter metrics
    assert_counter_exists("redial_dial_attempts_total");
    assert_metric_has_label("redial_dial_attempts_total", "client", "metrics_client");

    assert_counter_exists("redial_connections_total");
    assert_metric_has_label("redial_connections_total", "client", "metrics_client");

    assert_counter_exists("redial_disconnects_total");
    assert_metric_has_label("redial_disconnects_total", "client", "metrics_client");

    assert_counter_exists("redial_terminations_total");
    assert_metric_has_label("redial_terminations_total", "client", "metrics_client");

    // Verify gauge metric
    assert_gauge_exists("redial_connected");
    assert_metric_has_label("redial_connected", "client", "metrics_client");

    // Verify histogram metric
    assert_histogram_exists("redial_session_duration_seconds");
    assert_metric_has_label("redial_session_duration_seconds", "client", "metrics_client");
}

#[tokio::test]
#[serial]
async fn dial_failure_metrics() {
    init_recorder();

    // Bind then drop to get a port nobody listens on.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    drop(listener);

    let config = Config::builder(addr)
        .name("refused_client")
        .reconnect_delay(Duration::from_millis(5))
        .build();
    let client = Client::new(Arc::new(config)).unwrap();
    client.connect().unwrap();

    while client.attempts() < 2 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    client.shutdown(Duration::from_secs(2)).await.unwrap();

    assert_counter_exists("redial_dial_failures_total");
    assert_metric_has_label("redial_dial_failures_total", "client", "refused_client");
}
