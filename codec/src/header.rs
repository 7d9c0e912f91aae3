// Fixed header: one control byte (packet type in the high nibble, flags in
// the low nibble) followed by the variable byte integer remaining length.

use crate::bytes::{encode_var_int, var_int_len, ByteReader};
use crate::error::{DecodeError, EncodeError};

#[repr(u8)]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum PacketType {
    Connect = 1,
    ConnAck = 2,
    Publish = 3,
    PubAck = 4,
    PubRec = 5,
    PubRel = 6,
    PubComp = 7,
    Subscribe = 8,
    SubAck = 9,
    Unsubscribe = 10,
    UnsubAck = 11,
    PingReq = 12,
    PingResp = 13,
    Disconnect = 14,
    Auth = 15,
}

impl TryFrom<u8> for PacketType {
    type Error = DecodeError;

    fn try_from(nibble: u8) -> Result<Self, Self::Error> {
        match nibble {
            1 => Ok(PacketType::Connect),
            2 => Ok(PacketType::ConnAck),
            3 => Ok(PacketType::Publish),
            4 => Ok(PacketType::PubAck),
            5 => Ok(PacketType::PubRec),
            6 => Ok(PacketType::PubRel),
            7 => Ok(PacketType::PubComp),
            8 => Ok(PacketType::Subscribe),
            9 => Ok(PacketType::SubAck),
            10 => Ok(PacketType::Unsubscribe),
            11 => Ok(PacketType::UnsubAck),
            12 => Ok(PacketType::PingReq),
            13 => Ok(PacketType::PingResp),
            14 => Ok(PacketType::Disconnect),
            15 => Ok(PacketType::Auth),
            _ => Err(DecodeError::InvalidPacketType),
        }
    }
}

/// Control byte + remaining length, decoded ahead of the packet body.
///
/// `flags` is the raw low nibble; individual packet decoders validate it
/// against the fixed value the spec requires for their type (0 for most
/// packet types, DUP/QoS/RETAIN for PUBLISH, `0b0010` for PUBREL/SUBSCRIBE/
/// UNSUBSCRIBE).
#[derive(Clone, Copy, Debug)]
pub struct FixedHeader {
    pub packet_type: PacketType,
    pub flags: u8,
    pub remaining_length: u32,
}

impl FixedHeader {
    pub fn new(packet_type: PacketType, flags: u8, remaining_length: u32) -> Self {
        FixedHeader {
            packet_type,
            flags,
            remaining_length,
        }
    }

    pub fn decode(reader: &mut ByteReader) -> Result<Self, DecodeError> {
        let control_byte = reader.read_u8()?;
        let packet_type = PacketType::try_from((control_byte & 0xf0) >> 4)?;
        let flags = control_byte & 0x0f;
        let remaining_length = reader.read_var_int()?;
        Ok(FixedHeader {
            packet_type,
            flags,
            remaining_length,
        })
    }

    /// Require the low nibble to equal `expected`, as most non-PUBLISH
    /// packet types do.
    pub fn require_flags(self, expected: u8) -> Result<Self, DecodeError> {
        if self.flags != expected {
            return Err(DecodeError::InvalidPacketFlags);
        }
        Ok(self)
    }

    pub fn encode(self, buf: &mut Vec<u8>) -> Result<(), EncodeError> {
        let control_byte = ((self.packet_type as u8) << 4) | (self.flags & 0x0f);
        buf.push(control_byte);
        encode_var_int(buf, self.remaining_length)
    }

    /// Total on-wire size: control byte + remaining-length varint + body.
    #[must_use]
    pub fn total_len(self) -> usize {
        1 + var_int_len(self.remaining_length) + self.remaining_length as usize
    }
}
