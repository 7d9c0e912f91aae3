use crate::bytes::ByteReader;
use crate::error::{DecodeError, EncodeError};
use crate::property::{Properties, PropertyType};
use crate::reason_code::ReasonCode;
use crate::topic::validate_topic_filter;

const UNSUBSCRIBE_PROPERTIES: &[PropertyType] = &[PropertyType::UserProperty];
const UNSUBACK_PROPERTIES: &[PropertyType] =
    &[PropertyType::ReasonString, PropertyType::UserProperty];

pub const UNSUBACK_REASONS: &[ReasonCode] = &[
    ReasonCode::Success,
    ReasonCode::NoSubscriptionExisted,
    ReasonCode::UnspecifiedError,
    ReasonCode::ImplementationSpecificError,
    ReasonCode::NotAuthorized,
    ReasonCode::TopicFilterInvalid,
    ReasonCode::PacketIdentifierInUse,
];

#[derive(Clone, Debug, PartialEq)]
pub struct UnsubscribePacket {
    pub packet_id: u16,
    pub properties: Properties,
    pub filters: Vec<String>,
}

impl UnsubscribePacket {
    pub fn decode(body_len: u32, reader: &mut ByteReader) -> Result<Self, DecodeError> {
        let packet_id = reader.read_u16()?;
        if packet_id == 0 {
            return Err(DecodeError::InvalidPacketId);
        }
        let properties = Properties::decode(reader)?;
        properties.validate(UNSUBSCRIBE_PROPERTIES)?;

        let body_end = body_len as usize;
        let mut filters = Vec::new();
        while reader.offset() < body_end {
            let filter = reader.read_string()?;
            validate_topic_filter(&filter).map_err(|_| DecodeError::InvalidTopicFilter)?;
            filters.push(filter);
        }
        if filters.is_empty() {
            return Err(DecodeError::InvalidRemainingLength);
        }
        Ok(UnsubscribePacket {
            packet_id,
            properties,
            filters,
        })
    }

    pub fn encode(&self, buf: &mut Vec<u8>) -> Result<(), EncodeError> {
        crate::bytes::encode_u16(buf, self.packet_id);
        self.properties.encode(buf)?;
        for filter in &self.filters {
            crate::bytes::encode_string(buf, filter)?;
        }
        Ok(())
    }

    #[must_use]
    pub fn wire_len(&self) -> usize {
        let mut len = 2 + self.properties.wire_len();
        for filter in &self.filters {
            len += crate::bytes::string_bytes(filter);
        }
        len
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct UnsubAckPacket {
    pub packet_id: u16,
    pub properties: Properties,
    pub reason_codes: Vec<ReasonCode>,
}

impl UnsubAckPacket {
    pub fn decode(body_len: u32, reader: &mut ByteReader) -> Result<Self, DecodeError> {
        let packet_id = reader.read_u16()?;
        let properties = Properties::decode(reader)?;
        properties.validate(UNSUBACK_PROPERTIES)?;

        let body_end = body_len as usize;
        let mut reason_codes = Vec::new();
        while reader.offset() < body_end {
            let reason_code = ReasonCode::decode(reader)?;
            if !UNSUBACK_REASONS.contains(&reason_code) {
                return Err(DecodeError::InvalidReasonCode);
            }
            reason_codes.push(reason_code);
        }
        if reason_codes.is_empty() {
            return Err(DecodeError::InvalidRemainingLength);
        }
        Ok(UnsubAckPacket {
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
    fn unsubscribe_round_trip() {
        let packet = UnsubscribePacket {
            packet_id: 5,
            properties: Properties::new(),
            filters: vec!["a/b".to_string(), "c/+".to_string()],
        };
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        assert_eq!(buf.len(), packet.wire_len());
        let mut reader = ByteReader::new(&buf);
        assert_eq!(
            UnsubscribePacket::decode(buf.len() as u32, &mut reader).unwrap(),
            packet
        );
    }

    #[test]
    fn unsuback_round_trip() {
        let packet = UnsubAckPacket {
            packet_id: 5,
            properties: Properties::new(),
            reason_codes: vec![ReasonCode::Success, ReasonCode::NoSubscriptionExisted],
        };
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        assert_eq!(buf.len(), packet.wire_len());
        let mut reader = ByteReader::new(&buf);
        assert_eq!(
            UnsubAckPacket::decode(buf.len() as u32, &mut reader).unwrap(),
            packet
        );
    }
}
