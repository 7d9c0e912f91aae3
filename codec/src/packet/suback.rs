use crate::bytes::ByteReader;
use crate::error::{DecodeError, EncodeError};
use crate::property::{Properties, PropertyType};
use crate::reason_code::ReasonCode;

const SUBACK_PROPERTIES: &[PropertyType] = &[PropertyType::ReasonString, PropertyType::UserProperty];

pub const SUBACK_REASONS: &[ReasonCode] = &[
    ReasonCode::Success,
    ReasonCode::GrantedQoS1,
    ReasonCode::GrantedQoS2,
    ReasonCode::UnspecifiedError,
    ReasonCode::ImplementationSpecificError,
    ReasonCode::NotAuthorized,
    ReasonCode::TopicFilterInvalid,
    ReasonCode::PacketIdentifierInUse,
    ReasonCode::QuotaExceeded,
    ReasonCode::SharedSubscriptionsNotSupported,
    ReasonCode::SubscriptionIdentifiersNotSupported,
    ReasonCode::WildcardSubscriptionsNotSupported,
];

#[derive(Clone, Debug, PartialEq)]
pub struct SubAckPacket {
    pub packet_id: u16,
    pub properties: Properties,
    pub reason_codes: Vec<ReasonCode>,
}

impl SubAckPacket {
    pub fn decode(body_len: u32, reader: &mut ByteReader) -> Result<Self, DecodeError> {
        let packet_id = reader.read_u16()?;
        let properties = Properties::decode(reader)?;
        properties.validate(SUBACK_PROPERTIES)?;

        let body_end = body_len as usize;
        let mut reason_codes = Vec::new();
        while reader.offset() < body_end {
            let reason_code = ReasonCode::decode(reader)?;
            if !SUBACK_REASONS.contains(&reason_code) {
                return Err(DecodeError::InvalidReasonCode);
            }
            reason_codes.push(reason_code);
        }
        if reason_codes.is_empty() {
            return Err(DecodeError::InvalidRemainingLength);
        }
        Ok(SubAckPacket {
            packet_id,
            properties,
            reason_codes,
        })
    }

    pub fn encode(&self, buf: &mut Vec<u8>) -> Result<(), EncodeError> {
        crate::bytes::encode_u16(buf, self.packet_id);
        self.properties.encode(buf)?;
        for reason_code in &self.reason_codes {
            reason_code.encode(buf)?;
        }
        Ok(())
    }

    #[must_use]
    pub fn wire_len(&self) -> usize {
        2 + self.properties.wire_len() + self.reason_codes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let packet = SubAckPacket {
            packet_id: 10,
            properties: Properties::new(),
            reason_codes: vec![ReasonCode::GrantedQoS1, ReasonCode::NotAuthorized],
        };
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        assert_eq!(buf.len(), packet.wire_len());
        let mut reader = ByteReader::new(&buf);
        let decoded = SubAckPacket::decode(buf.len() as u32, &mut reader).unwrap();
        assert_eq!(decoded, packet);
    }
}
