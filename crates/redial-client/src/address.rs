//! Remote address resolution.
//!
//! A single `remote` string selects both the transport and the endpoint. Rules
//! are tried in order and the first match wins:
//!
//! | form            | network | example                  |
//! |-----------------|---------|--------------------------|
//! | `unix:<path>`   | unix    | `unix:/run/app.sock`     |
//! | `@<name>`       | unix    | `@app` (abstract socket) |
//! | `/<path>`       | unix    | `/run/app`               |
//! | `<path>.sock`   | unix    | `app.sock`               |
//! | `<host>:<port>` | tcp     | `example.com:8080`       |
//!
//! ```
//! use redial_client::address::{resolve, Network};
//!
//! let addr = resolve("example.com:8080").unwrap();
//! assert_eq!(addr.network(), Network::Tcp);
//! assert_eq!(addr.address(), "example.com:8080");
//!
//! let addr = resolve("/tmp/test.sock").unwrap();
//! assert_eq!(addr.network(), Network::Unix);
//! ```

use redial_core::RedialError;
use std::fmt;

/// Longest accepted Unix socket path or abstract name, in bytes.
///
/// `sun_path` holds 108 bytes on Linux; one is reserved for the terminator.
pub const MAX_UNIX_NAME_LEN: usize = 107;

const UNIX_PREFIX: &str = "unix:";
const ABSTRACT_PREFIX: char = '@';
const SOCK_SUFFIX: &str = ".sock";

/// Transport selected by the remote address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Network {
    /// TCP over IPv4 or IPv6.
    Tcp,
    /// Unix-domain stream socket (filesystem path or abstract name).
    Unix,
}

impl Network {
    /// Returns the conventional lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Tcp => "tcp",
            Network::Unix => "unix",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A `(network, address)` pair produced by [`resolve`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResolvedAddr {
    network: Network,
    address: String,
}

impl ResolvedAddr {
    /// Returns the transport.
    pub fn network(&self) -> Network {
        self.network
    }

    /// Returns the concrete address: `host:port` for TCP, a path or `@name` for Unix.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Returns `true` for abstract Unix socket names.
    pub fn is_abstract(&self) -> bool {
        self.network == Network::Unix && self.address.starts_with(ABSTRACT_PREFIX)
    }
}

impl fmt::Display for ResolvedAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.network, self.address)
    }
}

/// Parses a remote address string.
pub fn resolve(remote: &str) -> Result<ResolvedAddr, RedialError> {
    if remote.is_empty() {
        return Err(RedialError::EmptyAddress);
    }

    if let Some(path) = remote.strip_prefix(UNIX_PREFIX) {
        validate_unix_name(path)?;
        return Ok(unix(path));
    }

    if let Some(name) = remote.strip_prefix(ABSTRACT_PREFIX) {
        validate_unix_name(name)?;
        return Ok(unix(remote));
    }

    if remote.starts_with('/') || remote.ends_with(SOCK_SUFFIX) {
        validate_unix_name(remote)?;
        return Ok(unix(remote));
    }

    let (host, port) = split_host_port(remote)?;
    if matches!(host, "" | "::" | "0.0.0.0" | "0") {
        return Err(RedialError::InvalidHost(remote.to_string()));
    }
    if port.is_empty() {
        return Err(RedialError::MissingPort(remote.to_string()));
    }
    match port.parse::<u16>() {
        Ok(0) | Err(_) => return Err(RedialError::InvalidPort(remote.to_string())),
        Ok(_) => {}
    }

    Ok(ResolvedAddr {
        network: Network::Tcp,
        address: remote.to_string(),
    })
}

/// Checks a Unix socket path or abstract name.
pub fn validate_unix_name(name: &str) -> Result<(), RedialError> {
    if name.is_empty() {
        return Err(RedialError::NameEmpty);
    }
    if name.len() > MAX_UNIX_NAME_LEN {
        return Err(RedialError::NameTooLong {
            len: name.len(),
            max: MAX_UNIX_NAME_LEN,
        });
    }
    if name.as_bytes().contains(&0) {
        return Err(RedialError::NameContainsNul);
    }
    Ok(())
}

fn unix(address: &str) -> ResolvedAddr {
    ResolvedAddr {
        network: Network::Unix,
        address: address.to_string(),
    }
}

/// Splits `host:port`, accepting `[v6]:port`.
fn split_host_port(remote: &str) -> Result<(&str, &str), RedialError> {
    if let Some(rest) = remote.strip_prefix('[') {
        let (host, after) = rest
            .split_once(']')
            .ok_or_else(|| RedialError::InvalidHost(remote.to_string()))?;
        let port = after
            .strip_prefix(':')
            .ok_or_else(|| RedialError::MissingPort(remote.to_string()))?;
        return Ok((host, port));
    }

    let (host, port) = remote
        .rsplit_once(':')
        .ok_or_else(|| RedialError::MissingPort(remote.to_string()))?;
    if host.contains(':') {
        // Bare IPv6 literal without brackets; the port cannot be told apart.
        return Err(RedialError::MissingPort(remote.to_string()));
    }
    Ok((host, port))
}
