pub mod ack;
pub mod auth;
pub mod connack;
pub mod connect;
pub mod disconnect;
pub mod publish;
pub mod suback;
pub mod subscribe;
pub mod unsubscribe;

pub use ack::{AckPacket, PUBACK_REASONS, PUBCOMP_REASONS, PUBREC_REASONS, PUBREL_REASONS};
pub use auth::AuthPacket;
pub use connack::ConnAckPacket;
pub use connect::{ConnectPacket, Will};
pub use disconnect::DisconnectPacket;
pub use publish::PublishPacket;
pub use suback::SubAckPacket;
pub use subscribe::{RetainHandling, SubscribeFilter, SubscribeOptions, SubscribePacket};
pub use unsubscribe::{UnsubAckPacket, UnsubscribePacket};

use crate::bytes::ByteReader;
use crate::error::{DecodeError, EncodeError};
use crate::header::{FixedHeader, PacketType};

/// One fully decoded MQTT 5 control packet of any type.
///
/// Dispatch on `packet_type()` to route a freshly read packet to the right
/// session handler; `decode`/`encode` take care of the fixed header so
/// callers only ever see a `ControlPacket`.
#[derive(Clone, Debug, PartialEq)]
pub enum ControlPacket {
    Connect(ConnectPacket),
    ConnAck(ConnAckPacket),
    Publish(PublishPacket),
    PubAck(AckPacket),
    PubRec(AckPacket),
    PubRel(AckPacket),
    PubComp(AckPacket),
    Subscribe(SubscribePacket),
    SubAck(SubAckPacket),
    Unsubscribe(UnsubscribePacket),
    UnsubAck(UnsubAckPacket),
    PingReq,
    PingResp,
    Disconnect(DisconnectPacket),
    Auth(AuthPacket),
}

impl ControlPacket {
    #[must_use]
    pub fn packet_type(&self) -> PacketType {
        match self {
            ControlPacket::Connect(_) => PacketType::Connect,
            ControlPacket::ConnAck(_) => PacketType::ConnAck,
            ControlPacket::Publish(_) => PacketType::Publish,
            ControlPacket::PubAck(_) => PacketType::PubAck,
            ControlPacket::PubRec(_) => PacketType::PubRec,
            ControlPacket::PubRel(_) => PacketType::PubRel,
            ControlPacket::PubComp(_) => PacketType::PubComp,
            ControlPacket::Subscribe(_) => PacketType::Subscribe,
            ControlPacket::SubAck(_) => PacketType::SubAck,
            ControlPacket::Unsubscribe(_) => PacketType::Unsubscribe,
            ControlPacket::UnsubAck(_) => PacketType::UnsubAck,
            ControlPacket::PingReq => PacketType::PingReq,
            ControlPacket::PingResp => PacketType::PingResp,
            ControlPacket::Disconnect(_) => PacketType::Disconnect,
            ControlPacket::Auth(_) => PacketType::Auth,
        }
    }

    /// Decode one complete packet (fixed header + body) from the front of
    /// `reader`. Callers reading from a socket buffer first peek the
    /// remaining-length varint to know how many bytes to wait for; this
    /// function assumes the whole packet is already available.
    pub fn decode(reader: &mut ByteReader) -> Result<Self, DecodeError> {
        let header = FixedHeader::decode(reader)?;
        let body = reader.read_bytes(header.remaining_length as usize)?;
        let mut body_reader = ByteReader::new(body);
        let packet = Self::decode_body(header, &mut body_reader)?;
        if body_reader.offset() != body.len() {
            return Err(DecodeError::InvalidRemainingLength);
        }
        Ok(packet)
    }

    fn decode_body(header: FixedHeader, reader: &mut ByteReader) -> Result<Self, DecodeError> {
        let len = header.remaining_length;
        Ok(match header.packet_type {
            PacketType::Connect => {
                header.require_flags(0)?;
                ControlPacket::Connect(ConnectPacket::decode(reader)?)
            }
            PacketType::ConnAck => {
                header.require_flags(0)?;
                ControlPacket::ConnAck(ConnAckPacket::decode(reader)?)
            }
            PacketType::Publish => ControlPacket::Publish(PublishPacket::decode(
                header.flags,
                len,
                reader,
            )?),
            PacketType::PubAck => {
                header.require_flags(0)?;
                ControlPacket::PubAck(AckPacket::decode(len, reader, PUBACK_REASONS)?)
            }
            PacketType::PubRec => {
                header.require_flags(0)?;
                ControlPacket::PubRec(AckPacket::decode(len, reader, PUBREC_REASONS)?)
            }
            PacketType::PubRel => {
                header.require_flags(0b0010)?;
                ControlPacket::PubRel(AckPacket::decode(len, reader, PUBREL_REASONS)?)
            }
            PacketType::PubComp => {
                header.require_flags(0)?;
                ControlPacket::PubComp(AckPacket::decode(len, reader, PUBCOMP_REASONS)?)
            }
            PacketType::Subscribe => {
                header.require_flags(0b0010)?;
                ControlPacket::Subscribe(SubscribePacket::decode(len, reader)?)
            }
            PacketType::SubAck => {
                header.require_flags(0)?;
                ControlPacket::SubAck(SubAckPacket::decode(len, reader)?)
            }
            PacketType::Unsubscribe => {
                header.require_flags(0b0010)?;
                ControlPacket::Unsubscribe(UnsubscribePacket::decode(len, reader)?)
            }
            PacketType::UnsubAck => {
                header.require_flags(0)?;
                ControlPacket::UnsubAck(UnsubAckPacket::decode(len, reader)?)
            }
            PacketType::PingReq => {
                header.require_flags(0)?;
                if len != 0 {
                    return Err(DecodeError::InvalidRemainingLength);
                }
                ControlPacket::PingReq
            }
            PacketType::PingResp => {
                header.require_flags(0)?;
                if len != 0 {
                    return Err(DecodeError::InvalidRemainingLength);
                }
                ControlPacket::PingResp
            }
            PacketType::Disconnect => {
                header.require_flags(0)?;
                ControlPacket::Disconnect(DisconnectPacket::decode(len, reader)?)
            }
            PacketType::Auth => {
                header.require_flags(0)?;
                ControlPacket::Auth(AuthPacket::decode(len, reader)?)
            }
        })
    }

    pub fn encode(&self, buf: &mut Vec<u8>) -> Result<(), EncodeError> {
        let mut body = Vec::new();
        let flags = match self {
            ControlPacket::Connect(p) => {
                p.encode(&mut body)?;
                0
            }
            ControlPacket::ConnAck(p) => {
                p.encode(&mut body)?;
                0
            }
            ControlPacket::Publish(p) => {
                p.encode(&mut body)?;
                p.flags()
            }
            ControlPacket::PubAck(p) | ControlPacket::PubRec(p) | ControlPacket::PubComp(p) => {
                p.encode(&mut body)?;
                0
            }
            ControlPacket::PubRel(p) => {
                p.encode(&mut body)?;
                0b0010
            }
            ControlPacket::Subscribe(p) => {
                p.encode(&mut body)?;
                0b0010
            }
            ControlPacket::SubAck(p) => {
                p.encode(&mut body)?;
                0
            }
            ControlPacket::Unsubscribe(p) => {
                p.encode(&mut body)?;
                0b0010
            }
            ControlPacket::UnsubAck(p) => {
                p.encode(&mut body)?;
                0
            }
            ControlPacket::PingReq | ControlPacket::PingResp => 0,
            ControlPacket::Disconnect(p) => {
                p.encode(&mut body)?;
                0
            }
            ControlPacket::Auth(p) => {
                p.encode(&mut body)?;
                0
            }
        };
        let remaining_length =
            u32::try_from(body.len()).map_err(|_| EncodeError::PacketTooLarge)?;
        let header = FixedHeader::new(self.packet_type(), flags, remaining_length);
        header.encode(buf)?;
        buf.extend_from_slice(&body);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::Properties;

    #[test]
    fn round_trip_pingreq() {
        let packet = ControlPacket::PingReq;
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        assert_eq!(buf, vec![0xc0, 0x00]);
        let mut reader = ByteReader::new(&buf);
        assert_eq!(ControlPacket::decode(&mut reader).unwrap(), packet);
    }

    #[test]
    fn round_trip_connect_minimal() {
        let packet = ControlPacket::Connect(ConnectPacket {
            clean_start: true,
            keep_alive: 30,
            client_id: "test-client".to_string(),
            will: None,
            username: None,
            password: None,
            properties: Properties::new(),
        });
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        let mut reader = ByteReader::new(&buf);
        assert_eq!(ControlPacket::decode(&mut reader).unwrap(), packet);
    }

    #[test]
    fn trailing_bytes_in_body_are_rejected() {
        let packet = ControlPacket::PingReq;
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        buf[1] = 1; // claim one body byte that isn't actually consumed
        buf.push(0);
        let mut reader = ByteReader::new(&buf);
        assert_eq!(
            ControlPacket::decode(&mut reader),
            Err(DecodeError::InvalidRemainingLength)
        );
    }
}
