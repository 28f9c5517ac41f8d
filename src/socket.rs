//! One bound UDP endpoint per configured input port, plus a designated send
//! endpoint, all on the loopback interface.

use crate::error::EngineError;
use std::net::{Ipv4Addr, SocketAddrV4};
use tokio::net::UdpSocket;

/// The maximum datagram size this daemon will ever read or write (§6).
pub const MAX_DATAGRAM: usize = 4096;

/// The set of bound input sockets plus the send socket, all on `127.0.0.1`.
pub struct SocketBank {
    inputs: Vec<(u16, UdpSocket)>,
    send_port: u16,
}

impl SocketBank {
    /// Binds one socket per port in `input_ports`. The first port in the
    /// slice is the designated send endpoint.
    pub async fn bind(input_ports: &[u16]) -> Result<Self, EngineError> {
        let mut inputs = Vec::with_capacity(input_ports.len());
        for &port in input_ports {
            let addr = SocketAddrV4::new(Ipv4Addr::LOCALHOST, port);
            let socket = UdpSocket::bind(addr)
                .await
                .map_err(|source| EngineError::Bind { port, source })?;
            inputs.push((port, socket));
        }
        let send_port = input_ports[0];
        Ok(Self { inputs, send_port })
    }

    /// The socket used for every outbound send, conventionally the first
    /// configured input port.
    pub fn send_socket(&self) -> &UdpSocket {
        &self.inputs[0].1
    }

    pub fn send_port(&self) -> u16 {
        self.send_port
    }

    /// Every bound `(port, socket)` pair, in configuration order.
    pub fn sockets(&self) -> &[(u16, UdpSocket)] {
        &self.inputs
    }
}
