use redial::client::{DEFAULT_RECONNECT_DELAY, DEFAULT_TIMEOUT, Settings};
use redial::core::UnknownErrorPolicy;
use redial::{Client, Config, RedialError};
use std::sync::Arc;
use std::time::Duration;

#[test]
fn config_builder_default_values() {
    let config = Config::builder("localhost:7000").build();

    assert_eq!(config.name(), "<unnamed>");
    assert_eq!(config.remote(), "localhost:7000");
    assert_eq!(config.keep_alive(), DEFAULT_TIMEOUT);
    assert_eq!(config.dial_timeout(), Duration::from_secs(2));
    assert_eq!(config.read_timeout(), Duration::from_secs(2));
    assert_eq!(config.write_timeout(), Duration::from_secs(2));
    assert_eq!(config.reconnect_delay(), DEFAULT_RECONNECT_DELAY);
    assert_eq!(config.unknown_errors(), UnknownErrorPolicy::Fatal);
}

#[test]
fn config_builder_custom_values() {
    let config = Config::builder("@collector")
        .name("collector")
        .keep_alive(Duration::ZERO)
        .dial_timeout(Duration::from_millis(300))
        .write_timeout(Duration::from_secs(10))
        .reconnect_delay(Duration::from_millis(50))
        .unknown_errors(UnknownErrorPolicy::Retry)
        .build();

    assert_eq!(config.name(), "collector");
    assert_eq!(config.keep_alive(), Duration::ZERO);
    assert_eq!(config.dial_timeout(), Duration::from_millis(300));
    assert_eq!(config.write_timeout(), Duration::from_secs(10));
    assert_eq!(config.reconnect_delay(), Duration::from_millis(50));
    assert_eq!(config.unknown_errors(), UnknownErrorPolicy::Retry);
    assert!(config.resolved().unwrap().is_abstract());
}

#[test]
fn config_debug_hides_callbacks() {
    let config = Config::builder("localhost:7000")
        .on_error(|_info, err| Some(err))
        .build();

    let debug = format!("{config:?}");
    assert!(debug.contains("on_error: true"));
    assert!(debug.contains("on_session: false"));
}

#[tokio::test]
async fn config_binds_to_one_live_client() {
    let config = Arc::new(Config::builder("localhost:7000").build());
    let client = Client::new(Arc::clone(&config)).unwrap();

    assert_eq!(
        Client::new(Arc::clone(&config)).unwrap_err(),
        RedialError::ConfigBusy
    );
    assert!(Arc::ptr_eq(client.config(), &config));
}

#[test]
fn settings_load_from_json() {
    let settings: Settings = serde_json::from_str(
        r#"{
            "name": "ingest",
            "remote": "unix:/run/ingest.sock",
            "reconnect_delay_ms": 250,
            "retry_unknown_errors": true
        }"#,
    )
    .unwrap();

    let config = settings.into_builder().build();
    assert_eq!(config.name(), "ingest");
    assert_eq!(config.reconnect_delay(), Duration::from_millis(250));
    assert_eq!(config.dial_timeout(), DEFAULT_TIMEOUT);
    assert_eq!(config.unknown_errors(), UnknownErrorPolicy::Retry);
    assert_eq!(config.resolved().unwrap().address(), "/run/ingest.sock");
}

#[test]
fn settings_reject_wrong_types() {
    let result: Result<Settings, _> = serde_json::from_str(r#"{ "dial_timeout_ms": "fast" }"#);
    assert!(result.is_err());
}
