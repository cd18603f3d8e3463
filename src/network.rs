// Network address reported by /api/status

use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};

use tracing::debug;

/// Address the rover is reachable at, if it is connected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NetworkInfo {
    address: Option<IpAddr>,
}

impl NetworkInfo {
    pub fn connected(address: IpAddr) -> Self {
        Self {
            address: Some(address),
        }
    }

    pub fn offline() -> Self {
        Self::default()
    }

    /// Use `advertised` when given, otherwise ask the OS which local address
    /// routes outward
    pub fn resolve(advertised: Option<IpAddr>) -> Self {
        match advertised {
            Some(ip) => Self::connected(ip),
            None => Self {
                address: detect_local_ip(),
            },
        }
    }

    pub fn address(&self) -> Option<IpAddr> {
        self.address
    }

    /// Dotted address, or an empty string when offline
    pub fn display_address(&self) -> String {
        self.address.map(|ip| ip.to_string()).unwrap_or_default()
    }
}

// Connecting a UDP socket sends nothing; it only selects a route and source address
fn detect_local_ip() -> Option<IpAddr> {
    let probe = SocketAddr::from((Ipv4Addr::new(192, 0, 2, 1), 9));
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).ok()?;
    socket.connect(probe).ok()?;
    let ip = socket.local_addr().ok()?.ip();
    debug!("Detected local address {}", ip);
    if ip.is_unspecified() || ip.is_loopback() {
        None
    } else {
        Some(ip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advertised_address_wins() {
        let ip: IpAddr = "10.0.0.5".parse().unwrap();
        let net = NetworkInfo::resolve(Some(ip));
        assert_eq!(net.address(), Some(ip));
        assert_eq!(net.display_address(), "10.0.0.5");
    }

    #[test]
    fn offline_is_empty() {
        assert_eq!(NetworkInfo::offline().display_address(), "");
    }
}
