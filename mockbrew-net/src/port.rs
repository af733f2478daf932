// mockbrew-net/src/port.rs
use std::net::{Ipv4Addr, SocketAddrV4, TcpListener};

use mockbrew_common::error::Result;
use tracing::debug;

/// Asks the OS for a free TCP port on loopback and releases it immediately.
///
/// The port is only known to be free at the moment of the probe; another
/// process may claim it before the caller binds it again.
pub fn reserve_ephemeral_port() -> Result<u16> {
    let listener = TcpListener::bind(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0))?;
    let port = listener.local_addr()?.port();
    drop(listener);
    debug!("Reserved ephemeral port {}", port);
    Ok(port)
}
