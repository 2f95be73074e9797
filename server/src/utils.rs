use std::net::{IpAddr, UdpSocket};

/// Best-effort local IPv4 address for showing players where to connect.
///
/// Connecting a UDP socket picks the outbound interface without sending
/// anything. Falls back to `"localhost"`.
pub fn local_ip() -> String {
    outbound_ip()
        .filter(|ip| ip.is_ipv4() && !ip.is_loopback() && !ip.is_unspecified())
        .map(|ip| ip.to_string())
        .unwrap_or_else(|| "localhost".to_string())
}

fn outbound_ip() -> Option<IpAddr> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("192.0.2.1:80").ok()?;
    socket.local_addr().ok().map(|addr| addr.ip())
}
