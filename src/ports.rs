// Ephemeral port allocation for session startup.
//
// The launcher asks the OS for a batch of free ports, releases them, and
// hands them to the registry; the window between release and re-bind is
// accepted for a loopback-only session.

use crate::error::{Error, Result};
use std::net::{TcpListener, UdpSocket};

/// Find `n` currently-free ports on `host`, in allocation order.
///
/// All listeners are held open until the full batch is allocated so the
/// returned ports are distinct.
pub fn find_free_ports(host: &str, n: usize) -> Result<Vec<u16>> {
    let mut listeners = Vec::with_capacity(n);
    for _ in 0..n {
        let listener = TcpListener::bind((host, 0))
            .map_err(|e| Error::Resource(format!("cannot allocate free port on {host}: {e}")))?;
        listeners.push(listener);
    }
    listeners
        .iter()
        .map(|l| {
            l.local_addr()
                .map(|a| a.port())
                .map_err(|e| Error::Resource(format!("cannot read allocated port: {e}")))
        })
        .collect()
}

/// Non-blocking probe: can `port` currently be bound on `host`?
///
/// Checks TCP and UDP both, so the answer holds whichever protocol the
/// caller binds (the registry is UDP, stream servers are TCP).
pub fn is_port_free(host: &str, port: u16) -> bool {
    TcpListener::bind((host, port)).is_ok() && UdpSocket::bind((host, port)).is_ok()
}
