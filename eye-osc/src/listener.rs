//! Binds a UDP server and maps exactly three OSC addresses to commands.

use rosc::{OscMessage, OscPacket};
use tokio::net::UdpSocket;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Recalibrate,
    Recenter,
    SyncBlink,
}

fn parse_command(endpoints: &eye_config::OscEndpoints, msg: &OscMessage) -> Option<Command> {
    if msg.addr == endpoints.recalibrate {
        Some(Command::Recalibrate)
    } else if msg.addr == endpoints.recenter {
        Some(Command::Recenter)
    } else if msg.addr == endpoints.sync_blink {
        Some(Command::SyncBlink)
    } else {
        None
    }
}

pub struct CommandListener {
    socket: UdpSocket,
}

impl CommandListener {
    pub async fn bind(address: &str, port: u16) -> Result<Self> {
        let socket = UdpSocket::bind((address, port)).await?;
        Ok(Self { socket })
    }

    /// Waits for the next datagram and decodes it into a [`Command`].
    /// Unrecognized addresses and non-message packets are logged and
    /// skipped; the caller should call this again in a loop.
    pub async fn recv_command(&self, endpoints: &eye_config::OscEndpoints) -> Result<Option<Command>> {
        let mut buf = [0u8; 1024];
        let (len, _addr) = self.socket.recv_from(&mut buf).await?;
        let (_, packet) = rosc::decoder::decode_udp(&buf[..len]).map_err(Error::Osc)?;
        match packet {
            OscPacket::Message(msg) => Ok(parse_command(endpoints, &msg)),
            OscPacket::Bundle(_) => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eye_config::OscEndpoints;

    #[test]
    fn recognizes_exactly_the_three_registered_addresses() {
        let endpoints = OscEndpoints::default();
        let recal = OscMessage {
            addr: endpoints.recalibrate.clone(),
            args: vec![],
        };
        let recenter = OscMessage {
            addr: endpoints.recenter.clone(),
            args: vec![],
        };
        let sync = OscMessage {
            addr: endpoints.sync_blink.clone(),
            args: vec![],
        };
        let other = OscMessage {
            addr: "/avatar/parameters/something_else".into(),
            args: vec![],
        };
        assert_eq!(parse_command(&endpoints, &recal), Some(Command::Recalibrate));
        assert_eq!(parse_command(&endpoints, &recenter), Some(Command::Recenter));
        assert_eq!(parse_command(&endpoints, &sync), Some(Command::SyncBlink));
        assert_eq!(parse_command(&endpoints, &other), None);
    }
}
