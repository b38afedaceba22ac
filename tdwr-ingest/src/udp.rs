//! Live UDP transport.
//!
//! One non-blocking IPv4 datagram socket. `read_datagram` waits in short
//! sleeps until a datagram arrives, calling the liveness hook on every wait.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::time::Duration;

use log::{debug, warn};
use socket2::{Domain, Protocol, SockAddr, Socket, Type};

use tdwr_core::frame::MAX_DATAGRAM_SIZE;

/// Sleep between receive attempts while the socket is empty.
pub const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Kernel receive buffer requested at bind time.
const RECV_BUFFER_SIZE: usize = 4 * 1024 * 1024;

pub struct UdpSource {
    socket: UdpSocket,
    buf: Vec<u8>,
    pub datagrams: u64,
    pub receive_errors: u64,
}

impl UdpSource {
    /// Open and bind the socket on all interfaces. Any failure here is fatal
    /// to the caller.
    pub fn bind(port: u16) -> io::Result<Self> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_nonblocking(true)?;
        socket.set_reuse_address(true)?;
        if let Err(e) = socket.set_recv_buffer_size(RECV_BUFFER_SIZE) {
            warn!("Could not enlarge UDP receive buffer: {e}");
        }

        let addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port));
        socket.bind(&SockAddr::from(addr))?;

        Ok(UdpSource {
            socket: socket.into(),
            buf: vec![0u8; MAX_DATAGRAM_SIZE],
            datagrams: 0,
            receive_errors: 0,
        })
    }

    pub fn local_port(&self) -> io::Result<u16> {
        Ok(self.socket.local_addr()?.port())
    }

    /// Block until one datagram arrives and return its bytes.
    ///
    /// Receive errors other than an empty socket are counted and retried.
    pub fn read_datagram(&mut self, liveness: &mut dyn FnMut()) -> &[u8] {
        loop {
            match self.socket.recv(&mut self.buf) {
                Ok(n) => {
                    self.datagrams += 1;
                    return &self.buf[..n];
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    liveness();
                    std::thread::sleep(POLL_INTERVAL);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    self.receive_errors += 1;
                    debug!("UDP receive error, retrying: {e}");
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
