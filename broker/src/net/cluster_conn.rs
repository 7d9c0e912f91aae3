// Cluster peer wire framing (spec §4.6). Two logical channels share one
// TCP stream: subscription interest gossip and forwarded publishes,
// distinguished by a 1-byte frame-kind prefix followed by a 4-byte
// length and the frame body.

use std::io::{self, Read, Write};
use std::net::SocketAddr;

use mio::Token;

use mossmq_codec::bytes::{encode_u32, ByteReader};
use mossmq_codec::{Properties, QoS};

use crate::error::{Error, ErrorKind};
use crate::net::Transport;
use crate::types::NodeId;

const FRAME_INTEREST_ADD: u8 = 0;
const FRAME_INTEREST_REMOVE: u8 = 1;
const FRAME_PUBLISH: u8 = 2;

#[derive(Clone, Debug, PartialEq)]
pub enum PeerFrame {
    InterestAdd(String),
    InterestRemove(String),
    Publish {
        origin_node: NodeId,
        topic: String,
        payload: Vec<u8>,
        qos: QoS,
        retain: bool,
        properties: Properties,
    },
}

impl PeerFrame {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<(), Error> {
        let mut body = Vec::new();
        let kind = match self {
            PeerFrame::InterestAdd(filter) => {
                mossmq_codec::bytes::encode_string(&mut body, filter)
                    .map_err(|err| Error::new(ErrorKind::Internal, err.to_string()))?;
                FRAME_INTEREST_ADD
            }
            PeerFrame::InterestRemove(filter) => {
                mossmq_codec::bytes::encode_string(&mut body, filter)
                    .map_err(|err| Error::new(ErrorKind::Internal, err.to_string()))?;
                FRAME_INTEREST_REMOVE
            }
            PeerFrame::Publish {
                origin_node,
                topic,
                payload,
                qos,
                retain,
                properties,
            } => {
                encode_u32(&mut body, *origin_node);
                mossmq_codec::bytes::encode_string(&mut body, topic)
                    .map_err(|err| Error::new(ErrorKind::Internal, err.to_string()))?;
                body.push(*qos as u8);
                body.push(u8::from(*retain));
                properties
                    .encode(&mut body)
                    .map_err(|err| Error::new(ErrorKind::Internal, err.to_string()))?;
                mossmq_codec::bytes::encode_binary(&mut body, payload)
                    .map_err(|err| Error::new(ErrorKind::Internal, err.to_string()))?;
                FRAME_PUBLISH
            }
        };
        buf.push(kind);
        encode_u32(buf, body.len() as u32);
        buf.extend_from_slice(&body);
        Ok(())
    }

    fn decode(kind: u8, body: &[u8]) -> Result<Self, Error> {
        let mut reader = ByteReader::new(body);
        let frame = match kind {
            FRAME_INTEREST_ADD => PeerFrame::InterestAdd(reader.read_string()?),
            FRAME_INTEREST_REMOVE => PeerFrame::InterestRemove(reader.read_string()?),
            FRAME_PUBLISH => {
                let origin_node = reader.read_u32()?;
                let topic = reader.read_string()?;
                let qos = QoS::try_from(reader.read_u8()?)?;
                let retain = reader.read_bool()?;
                let properties = Properties::decode(&mut reader)?;
                let payload = reader.read_binary()?;
                PeerFrame::Publish {
                    origin_node,
                    topic,
                    payload,
                    qos,
                    retain,
                    properties,
                }
            }
            _ => return Err(Error::new(ErrorKind::Protocol, "unknown cluster frame kind")),
        };
        Ok(frame)
    }
}

/// The minimal surface the broker core needs to push gossip/forwarded
/// publishes at a cluster peer, mirroring `ConnectionSink` for clients.
pub trait PeerSink {
    fn send_frame(&mut self, frame: PeerFrame) -> Result<(), Error>;
}

pub struct ClusterConnection {
    pub token: Token,
    pub node_id: Option<NodeId>,
    transport: Transport,
    peer_addr: Option<SocketAddr>,
    read_buf: Vec<u8>,
    write_buf: Vec<u8>,
    write_pos: usize,
}

impl ClusterConnection {
    #[must_use]
    pub fn new(token: Token, transport: Transport) -> Self {
        let peer_addr = transport.peer_addr();
        ClusterConnection {
            token,
            node_id: None,
            transport,
            peer_addr,
            read_buf: Vec::with_capacity(4096),
            write_buf: Vec::new(),
            write_pos: 0,
        }
    }

    #[must_use]
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    pub fn raw_mut(&mut self) -> &mut mio::net::TcpStream {
        self.transport.raw_mut()
    }

    /// # Errors
    /// Returns an error on socket failure, clean EOF, or a malformed frame.
    pub fn poll_read(&mut self) -> Result<Vec<PeerFrame>, Error> {
        let mut chunk = [0u8; 4096];
        loop {
            match self.transport.read(&mut chunk) {
                Ok(0) => return Err(Error::new(ErrorKind::Transport, "peer closed connection")),
                Ok(n) => self.read_buf.extend_from_slice(&chunk[..n]),
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) => return Err(err.into()),
            }
        }
        self.drain_frames()
    }

    fn drain_frames(&mut self) -> Result<Vec<PeerFrame>, Error> {
        let mut frames = Vec::new();
        loop {
            if self.read_buf.len() < 5 {
                break;
            }
            let kind = self.read_buf[0];
            let len = u32::from_be_bytes([
                self.read_buf[1],
                self.read_buf[2],
                self.read_buf[3],
                self.read_buf[4],
            ]) as usize;
            let total = 5 + len;
            if self.read_buf.len() < total {
                break;
            }
            let frame = PeerFrame::decode(kind, &self.read_buf[5..total])?;
            self.read_buf.drain(..total);
            frames.push(frame);
        }
        Ok(frames)
    }

    /// # Errors
    /// Returns an error on socket failure other than `WouldBlock`.
    pub fn flush_writes(&mut self) -> Result<(), Error> {
        while self.write_pos < self.write_buf.len() {
            match self.transport.write(&self.write_buf[self.write_pos..]) {
                Ok(0) => break,
                Ok(n) => self.write_pos += n,
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) => return Err(err.into()),
            }
        }
        if self.write_pos == self.write_buf.len() {
            self.write_buf.clear();
            self.write_pos = 0;
        }
        Ok(())
    }

    #[must_use]
    pub fn has_pending_writes(&self) -> bool {
        self.write_pos < self.write_buf.len()
    }
}

impl PeerSink for ClusterConnection {
    fn send_frame(&mut self, frame: PeerFrame) -> Result<(), Error> {
        frame.encode(&mut self.write_buf)?;
        self.flush_writes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interest_add_frame_round_trips_through_encode_decode() {
        let frame = PeerFrame::InterestAdd("room/+".to_string());
        let mut buf = Vec::new();
        frame.encode(&mut buf).unwrap();
        let len = u32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]) as usize;
        let decoded = PeerFrame::decode(buf[0], &buf[5..5 + len]).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn publish_frame_round_trips_through_encode_decode() {
        let frame = PeerFrame::Publish {
            origin_node: 7,
            topic: "a/b".to_string(),
            payload: b"hi".to_vec(),
            qos: QoS::AtLeastOnce,
            retain: true,
            properties: Properties::new(),
        };
        let mut buf = Vec::new();
        frame.encode(&mut buf).unwrap();
        let len = u32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]) as usize;
        let decoded = PeerFrame::decode(buf[0], &buf[5..5 + len]).unwrap();
        assert_eq!(decoded, frame);
    }
}
