use redial::core::{Classifier, UnknownErrorPolicy, Verdict, is_fatal, is_non_error};
use redial::{Client, Config, RedialError};
use std::io;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug)]
struct Opaque;

impl std::fmt::Display for Opaque {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("opaque failure")
    }
}

impl std::error::Error for Opaque {}

#[test]
fn unknown_policy_decides_opaque_errors() {
    let strict = Classifier::new(UnknownErrorPolicy::Fatal);
    let lenient = Classifier::new(UnknownErrorPolicy::Retry);

    assert_eq!(strict.classify(Some(&Opaque)), Verdict::Fatal);
    assert_eq!(lenient.classify(Some(&Opaque)), Verdict::Retry);

    // Sentinels ignore the policy.
    assert_eq!(
        lenient.classify(Some(&RedialError::DoNotReconnect)),
        Verdict::NonError
    );
    assert_eq!(
        lenient.classify(Some(&RedialError::Panicked("boom".into()))),
        Verdict::Fatal
    );
    assert_eq!(strict.classify(None), Verdict::NonError);
}

#[tokio::test]
async fn elapsed_deadline_is_retryable() {
    let elapsed = tokio::time::timeout(Duration::from_millis(1), std::future::pending::<()>())
        .await
        .unwrap_err();
    assert!(!is_fatal(&elapsed));
    assert!(!is_non_error(Some(&elapsed)));
}

#[tokio::test]
async fn client_io_errors_are_retryable() {
    let client = Client::new(Arc::new(Config::builder("localhost:7000").build())).unwrap();

    let mut buf = [0u8; 8];
    let err = client.read(&mut buf).await.unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::NotConnected);
    assert!(!is_fatal(&err));
}

#[test]
fn wrapped_do_not_reconnect_is_still_a_stop() {
    let wrapped = io::Error::other(RedialError::DoNotReconnect);
    assert!(is_fatal(&wrapped));
    assert!(is_non_error(Some(&wrapped)));
}
