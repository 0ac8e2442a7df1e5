use std::io;
use std::net::{SocketAddr, ToSocketAddrs};

/// Resolves `host` and `port` to the first matching socket address.
///
/// Name resolution may block; it runs on the caller's thread, never on an
/// event loop.
pub(crate) fn resolve(host: &str, port: u16) -> io::Result<SocketAddr> {
    (host, port).to_socket_addrs()?.next().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            format!("no address found for {host}"),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::resolve;

    use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};

    #[test]
    fn test_resolve_literal_addresses() {
        assert_eq!(
            resolve("127.0.0.1", 37).unwrap(),
            SocketAddr::from((Ipv4Addr::LOCALHOST, 37))
        );
        assert_eq!(
            resolve("::1", 37).unwrap(),
            SocketAddr::from((Ipv6Addr::LOCALHOST, 37))
        );
    }

    #[test]
    fn test_resolve_rejects_malformed_host() {
        assert!(resolve("not a host name", 37).is_err());
    }
}
