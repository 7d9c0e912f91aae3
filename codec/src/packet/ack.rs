// PUBACK / PUBREC / PUBREL / PUBCOMP share one wire shape: packet id,
// optional reason code, optional properties. MQTT 5 allows the reason
// code and properties to be omitted entirely when the reason is Success
// and there are no properties, so decode must branch on remaining length.

use crate::bytes::ByteReader;
use crate::error::{DecodeError, EncodeError};
use crate::property::{Properties, PropertyType};
use crate::reason_code::ReasonCode;

const ACK_PROPERTIES: &[PropertyType] = &[PropertyType::ReasonString, PropertyType::UserProperty];

#[derive(Clone, Debug, PartialEq)]
pub struct AckPacket {
    pub packet_id: u16,
    pub reason_code: ReasonCode,
    pub properties: Properties,
}

impl AckPacket {
    pub fn decode(
        body_len: u32,
        reader: &mut ByteReader,
        valid_reasons: &[ReasonCode],
    ) -> Result<Self, DecodeError> {
        let packet_id = reader.read_u16()?;
        if packet_id == 0 {
            return Err(DecodeError::InvalidPacketId);
        }
        if body_len == 2 {
            return Ok(AckPacket {
                packet_id,
                reason_code: ReasonCode::Success,
                properties: Properties::new(),
            });
        }
        let reason_code = ReasonCode::decode(reader)?;
        if !valid_reasons.contains(&reason_code) {
            return Err(DecodeError::InvalidReasonCode);
        }
        let properties = if body_len == 3 {
            Properties::new()
        } else {
            let properties = Properties::decode(reader)?;
            properties.validate(ACK_PROPERTIES)?;
            properties
        };
        Ok(AckPacket {
            packet_id,
            reason_code,
            properties,
        })
    }

    pub fn encode(&self, buf: &mut Vec<u8>) -> Result<(), EncodeError> {
        crate::bytes::encode_u16(buf, self.packet_id);
        if self.reason_code == ReasonCode::Success && self.properties.wire_len() == 1 {
            return Ok(());
        }
        self.reason_code.encode(buf)?;
        if self.properties.wire_len() > 1 {
            self.properties.encode(buf)?;
        }
        Ok(())
    }

    #[must_use]
    pub fn wire_len(&self) -> usize {
        if self.reason_code == ReasonCode::Success && self.properties.wire_len() == 1 {
            return 2;
        }
        if self.properties.wire_len() == 1 {
            return 3;
        }
        2 + 1 + self.properties.wire_len()
    }
}

pub const PUBACK_REASONS: &[ReasonCode] = &[
    ReasonCode::Success,
    ReasonCode::NoMatchingSubscribers,
    ReasonCode::UnspecifiedError,
    ReasonCode::ImplementationSpecificError,
    ReasonCode::NotAuthorized,
    ReasonCode::TopicNameInvalid,
    ReasonCode::PacketIdentifierInUse,
    ReasonCode::QuotaExceeded,
    ReasonCode::PayloadFormatInvalid,
];

pub const PUBREC_REASONS: &[ReasonCode] = PUBACK_REASONS;

pub const PUBREL_REASONS: &[ReasonCode] =
    &[ReasonCode::Success, ReasonCode::PacketIdentifierNotFound];

pub const PUBCOMP_REASONS: &[ReasonCode] =
    &[ReasonCode::Success, ReasonCode::PacketIdentifierNotFound];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_success_is_minimal() {
        let packet = AckPacket {
            packet_id: 42,
            reason_code: ReasonCode::Success,
            properties: Properties::new(),
        };
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        assert_eq!(buf.len(), 2);
        assert_eq!(buf.len(), packet.wire_len());
        let mut reader = ByteReader::new(&buf);
        let decoded = AckPacket::decode(buf.len() as u32, &mut reader, PUBACK_REASONS).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn round_trip_with_reason() {
        let packet = AckPacket {
            packet_id: 42,
            reason_code: ReasonCode::NoMatchingSubscribers,
            properties: Properties::new(),
        };
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        assert_eq!(buf.len(), 3);
        let mut reader = ByteReader::new(&buf);
        let decoded = AckPacket::decode(buf.len() as u32, &mut reader, PUBACK_REASONS).unwrap();
        assert_eq!(decoded, packet);
    }
}
