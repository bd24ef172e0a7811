use redial::{Network, RedialError, resolve};

#[test]
fn accepted_forms_resolve_to_documented_pairs() {
    let cases = [
        ("example.com:8080", Network::Tcp, "example.com:8080"),
        ("127.0.0.1:1", Network::Tcp, "127.0.0.1:1"),
        ("[::1]:9000", Network::Tcp, "[::1]:9000"),
        ("[fe80::1%eth0]:22", Network::Tcp, "[fe80::1%eth0]:22"),
        ("unix:/run/app.sock", Network::Unix, "/run/app.sock"),
        ("unix:relative/app", Network::Unix, "relative/app"),
        ("unix:host:80", Network::Unix, "host:80"),
        ("@redial", Network::Unix, "@redial"),
        ("/tmp/test.sock", Network::Unix, "/tmp/test.sock"),
        ("/var/run/socket", Network::Unix, "/var/run/socket"),
        ("app.sock", Network::Unix, "app.sock"),
    ];

    for (remote, network, address) in cases {
        let resolved = resolve(remote).unwrap_or_else(|e| panic!("{remote:?}: {e}"));
        assert_eq!(resolved.network(), network, "{remote:?}");
        assert_eq!(resolved.address(), address, "{remote:?}");
    }
}

#[test]
fn malformed_inputs_fail_with_distinct_errors() {
    let long_path = format!("/{}", "a".repeat(200));
    let cases: Vec<(&str, RedialError)> = vec![
        ("", RedialError::EmptyAddress),
        ("localhost", RedialError::MissingPort("localhost".into())),
        ("localhost:", RedialError::MissingPort("localhost:".into())),
        ("::1", RedialError::MissingPort("::1".into())),
        (":8080", RedialError::InvalidHost(":8080".into())),
        ("0.0.0.0:80", RedialError::InvalidHost("0.0.0.0:80".into())),
        ("[::]:80", RedialError::InvalidHost("[::]:80".into())),
        ("0:80", RedialError::InvalidHost("0:80".into())),
        ("host:0", RedialError::InvalidPort("host:0".into())),
        ("host:http", RedialError::InvalidPort("host:http".into())),
        ("host:70000", RedialError::InvalidPort("host:70000".into())),
        ("unix:", RedialError::NameEmpty),
        ("@", RedialError::NameEmpty),
        ("@a\0b", RedialError::NameContainsNul),
        (
            long_path.as_str(),
            RedialError::NameTooLong { len: 201, max: 107 },
        ),
    ];

    for (remote, expected) in cases {
        assert_eq!(resolve(remote).unwrap_err(), expected, "{remote:?}");
    }
}

#[test]
fn address_errors_are_classified_as_configuration() {
    for remote in ["", "localhost", "host:0", "@"] {
        let err = resolve(remote).unwrap_err();
        assert!(err.is_address_error(), "{remote:?} -> {err}");
    }
    assert!(!RedialError::Running.is_address_error());
}
