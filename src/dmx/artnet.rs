// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

use std::io;
use std::net::{SocketAddr, UdpSocket};

use tracing::{debug, info};

use super::universe::{Universe, UNIVERSE_SIZE};

/// The UDP port Art-Net nodes listen on.
pub const ARTNET_PORT: u16 = 6454;

/// Port-addresses are 15 bits: net (7), sub-net (4), universe (4).
pub const MAX_PORT_ADDRESS: u16 = 0x7fff;

const HEADER: &[u8; 8] = b"Art-Net\0";
const OP_OUTPUT: u16 = 0x5000;
const PROTOCOL_VERSION: u16 = 14;
const ARTDMX_HEADER_LEN: usize = 18;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("unable to bind Art-Net socket to {addr}: {source}")]
    Bind { addr: SocketAddr, source: io::Error },
    #[error("unable to configure Art-Net socket: {0}")]
    Configure(io::Error),
    #[error("Art-Net port-address {0} is outside of 0-32767")]
    PortAddress(u16),
    #[error("unable to send Art-Net packet to {target}: {source}")]
    Send { target: SocketAddr, source: io::Error },
}

/// What happened to a frame handed to a sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    /// The socket was not ready. The frame is gone, the next tick sends a fresh one.
    Dropped,
}

/// Something that can put a universe on the wire.
pub trait DmxSender: Send {
    fn send(&mut self, universe: &Universe) -> Result<SendOutcome, TransportError>;
}

/// Builds an ArtDmx packet carrying a full universe.
pub fn artdmx_packet(sequence: u8, port_address: u16, universe: &Universe) -> Vec<u8> {
    let mut packet = Vec::with_capacity(ARTDMX_HEADER_LEN + UNIVERSE_SIZE);
    packet.extend_from_slice(HEADER);
    // Op codes are little endian, everything else is big endian.
    packet.extend_from_slice(&OP_OUTPUT.to_le_bytes());
    packet.extend_from_slice(&PROTOCOL_VERSION.to_be_bytes());
    packet.push(sequence);
    packet.push(0); // physical
    packet.push((port_address & 0xff) as u8);
    packet.push(((port_address >> 8) & 0x7f) as u8);
    packet.extend_from_slice(&(UNIVERSE_SIZE as u16).to_be_bytes());
    packet.extend_from_slice(universe.as_slice());
    packet
}

/// Sends ArtDmx over a non-blocking UDP socket.
pub struct ArtNetSender {
    socket: UdpSocket,
    target: SocketAddr,
    port_address: u16,
    sequence: u8,
}

impl ArtNetSender {
    pub fn new(
        bind: SocketAddr,
        target: SocketAddr,
        port_address: u16,
    ) -> Result<ArtNetSender, TransportError> {
        if port_address > MAX_PORT_ADDRESS {
            return Err(TransportError::PortAddress(port_address));
        }
        let socket =
            UdpSocket::bind(bind).map_err(|source| TransportError::Bind { addr: bind, source })?;
        socket
            .set_broadcast(true)
            .map_err(TransportError::Configure)?;
        socket
            .set_nonblocking(true)
            .map_err(TransportError::Configure)?;
        info!(
            bind = %bind,
            target = %target,
            port_address,
            "Art-Net output ready."
        );
        Ok(ArtNetSender {
            socket,
            target,
            port_address,
            sequence: 0,
        })
    }

    /// Advances the sequence counter. Zero disables sequencing, so it wraps 255 -> 1.
    fn next_sequence(&mut self) -> u8 {
        self.sequence = if self.sequence == u8::MAX {
            1
        } else {
            self.sequence + 1
        };
        self.sequence
    }
}

impl DmxSender for ArtNetSender {
    fn send(&mut self, universe: &Universe) -> Result<SendOutcome, TransportError> {
        let sequence = self.next_sequence();
        let packet = artdmx_packet(sequence, self.port_address, universe);
        match self.socket.send_to(&packet, self.target) {
            Ok(_) => Ok(SendOutcome::Sent),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                debug!(sequence, "Art-Net socket busy, frame dropped.");
                Ok(SendOutcome::Dropped)
            }
            Err(source) => Err(TransportError::Send {
                target: self.target,
                source,
            }),
        }
    }
}

#[cfg(test)]
/// Records every universe instead of sending it.
#[derive(Clone, Default)]
pub struct MockSender {
    pub sent: std::sync::Arc<parking_lot::Mutex<Vec<Universe>>>,
    pub should_fail: bool,
}

#[cfg(test)]
impl MockSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }

    pub fn count(&self) -> usize {
        self.sent.lock().len()
    }

    pub fn last(&self) -> Option<Universe> {
        self.sent.lock().last().copied()
    }
}

#[cfg(test)]
impl DmxSender for MockSender {
    fn send(&mut self, universe: &Universe) -> Result<SendOutcome, TransportError> {
        if self.should_fail {
            return Err(TransportError::Send {
                target: SocketAddr::from(([127, 0, 0, 1], ARTNET_PORT)),
                source: io::Error::new(io::ErrorKind::ConnectionRefused, "mock failure"),
            });
        }
        self.sent.lock().push(*universe);
        Ok(SendOutcome::Sent)
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error;
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_artdmx_layout() {
        let mut universe = Universe::blackout();
        universe.set_channel(1, 0xaa).unwrap();
        universe.set_channel(512, 0xbb).unwrap();

        let packet = artdmx_packet(7, 0x0123, &universe);
        assert_eq!(packet.len(), 530);
        assert_eq!(&packet[0..8], b"Art-Net\0");
        assert_eq!(&packet[8..10], &[0x00, 0x50]);
        assert_eq!(&packet[10..12], &[0x00, 0x0e]);
        assert_eq!(packet[12], 7);
        assert_eq!(packet[13], 0);
        assert_eq!(packet[14], 0x23);
        assert_eq!(packet[15], 0x01);
        assert_eq!(&packet[16..18], &[0x02, 0x00]);
        assert_eq!(packet[18], 0xaa);
        assert_eq!(packet[529], 0xbb);
    }

    #[test]
    fn test_rejects_wide_port_address() {
        let any = SocketAddr::from(([127, 0, 0, 1], 0));
        assert!(matches!(
            ArtNetSender::new(any, any, 0x8000),
            Err(TransportError::PortAddress(0x8000))
        ));
    }

    #[test]
    fn test_sequence_wraps_past_zero() -> Result<(), Box<dyn Error>> {
        let any = SocketAddr::from(([127, 0, 0, 1], 0));
        let mut sender = ArtNetSender::new(any, any, 0)?;
        assert_eq!(sender.next_sequence(), 1);
        sender.sequence = 254;
        assert_eq!(sender.next_sequence(), 255);
        assert_eq!(sender.next_sequence(), 1);
        Ok(())
    }

    #[test]
    fn test_send_over_loopback() -> Result<(), Box<dyn Error>> {
        let receiver = UdpSocket::bind("127.0.0.1:0")?;
        receiver.set_read_timeout(Some(Duration::from_secs(2)))?;
        let target = receiver.local_addr()?;

        let mut sender = ArtNetSender::new(SocketAddr::from(([127, 0, 0, 1], 0)), target, 3)?;
        let mut universe = Universe::blackout();
        universe.set_channel(10, 99)?;
        assert_eq!(sender.send(&universe)?, SendOutcome::Sent);

        let mut buf = [0u8; 1024];
        let (len, _) = receiver.recv_from(&mut buf)?;
        assert_eq!(len, 530);
        assert_eq!(buf[12], 1);
        assert_eq!(buf[14], 3);
        assert_eq!(buf[18 + 9], 99);
        Ok(())
    }

    #[test]
    fn test_mock_sender_records() {
        let mut mock = MockSender::new();
        let universe = Universe::blackout();
        mock.send(&universe).unwrap();
        mock.send(&universe).unwrap();
        assert_eq!(mock.count(), 2);
        assert_eq!(mock.last(), Some(universe));

        let mut failing = MockSender::failing();
        assert!(failing.send(&universe).is_err());
        assert_eq!(failing.count(), 0);
    }
}
