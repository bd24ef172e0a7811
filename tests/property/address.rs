//! Property tests for remote address resolution.
//!
//! Invariants tested:
//! - Resolution never panics, whatever the input
//! - Every valid `host:port` resolves to TCP with the address unchanged
//! - Ports outside 1..=65535 are rejected
//! - Unix paths resolve to themselves

use proptest::prelude::*;
use redial::client::address::validate_unix_name;
use redial::{resolve, Network, RedialError};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    /// Property: resolve is total
    #[test]
    fn resolve_never_panics(remote in ".{0,128}") {
        let _ = resolve(&remote);
    }

    /// Property: TCP host:port is kept verbatim
    #[test]
    fn tcp_host_port_is_kept(
        host in "[a-z][a-z0-9-]{0,20}(\\.[a-z][a-z0-9-]{0,10}){0,3}",
        port in 1u16..=u16::MAX,
    ) {
        let remote = format!("{host}:{port}");
        let addr = resolve(&remote).unwrap();
        prop_assert_eq!(addr.network(), Network::Tcp);
        prop_assert_eq!(addr.address(), remote.as_str());
    }

    /// Property: ports that do not fit a u16, or zero, are invalid
    #[test]
    fn out_of_range_ports_rejected(port in prop_oneof![Just(0u32), 65536u32..1_000_000]) {
        let remote = format!("localhost:{port}");
        prop_assert!(matches!(resolve(&remote), Err(RedialError::InvalidPort(_))));
    }

    /// Property: absolute paths resolve to Unix sockets at the same path
    #[test]
    fn absolute_paths_are_unix(path in "(/[a-zA-Z0-9_.-]{1,16}){1,6}") {
        let addr = resolve(&path).unwrap();
        prop_assert_eq!(addr.network(), Network::Unix);
        prop_assert_eq!(addr.address(), path.as_str());
        prop_assert!(!addr.is_abstract());
    }

    /// Property: a name resolves only when it passes validation
    #[test]
    fn unix_prefix_agrees_with_validation(name in "[a-z/\\x00]{0,120}") {
        let resolved = resolve(&format!("unix:{name}"));
        prop_assert_eq!(resolved.is_ok(), validate_unix_name(&name).is_ok());
    }
}
