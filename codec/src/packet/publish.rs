use crate::bytes::{string_bytes, ByteReader};
use crate::error::{DecodeError, EncodeError};
use crate::property::{Properties, Property, PropertyType};
use crate::qos::QoS;
use crate::topic::validate_topic_name;

const PUBLISH_PROPERTIES: &[PropertyType] = &[
    PropertyType::PayloadFormatIndicator,
    PropertyType::MessageExpiryInterval,
    PropertyType::ContentType,
    PropertyType::ResponseTopic,
    PropertyType::CorrelationData,
    PropertyType::SubscriptionIdentifier,
    PropertyType::TopicAlias,
    PropertyType::UserProperty,
];

#[derive(Clone, Debug, PartialEq)]
pub struct PublishPacket {
    pub dup: bool,
    pub qos: QoS,
    pub retain: bool,
    /// Empty when the publisher relies entirely on a topic alias; the
    /// session layer is responsible for resolving aliases before this
    /// packet is routed past the receiving connection.
    pub topic_name: String,
    /// Present for QoS 1/2; absent (and meaningless) for QoS 0.
    pub packet_id: Option<u16>,
    pub properties: Properties,
    pub payload: Vec<u8>,
}

impl PublishPacket {
    #[must_use]
    pub fn topic_alias(&self) -> Option<u16> {
        match self.properties.find(PropertyType::TopicAlias) {
            Some(Property::TopicAlias(v)) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn subscription_identifiers(&self) -> Vec<u32> {
        self.properties
            .iter()
            .filter_map(|p| match p {
                Property::SubscriptionIdentifier(v) => Some(*v),
                _ => None,
            })
            .collect()
    }

    pub fn decode(flags: u8, body_len: u32, reader: &mut ByteReader) -> Result<Self, DecodeError> {
        let dup = flags & 0x08 != 0;
        let qos = QoS::try_from((flags & 0x06) >> 1)?;
        let retain = flags & 0x01 != 0;
        if qos == QoS::AtMostOnce && dup {
            return Err(DecodeError::InvalidPacketFlags);
        }

        let start = reader.offset();
        let topic_name = reader.read_string()?;
        if !topic_name.is_empty() {
            validate_topic_name(&topic_name).map_err(|_| DecodeError::InvalidTopic)?;
        }

        let packet_id = if qos == QoS::AtMostOnce {
            None
        } else {
            let id = reader.read_u16()?;
            if id == 0 {
                return Err(DecodeError::InvalidPacketId);
            }
            Some(id)
        };

        let properties = Properties::decode(reader)?;
        properties.validate(PUBLISH_PROPERTIES)?;
        if topic_name.is_empty() && properties.find(PropertyType::TopicAlias).is_none() {
            return Err(DecodeError::InvalidTopic);
        }

        let consumed = reader.offset() - start;
        let payload_len = (body_len as usize)
            .checked_sub(consumed)
            .ok_or(DecodeError::InvalidRemainingLength)?;
        let payload = reader.read_bytes(payload_len)?.to_vec();

        Ok(PublishPacket {
            dup,
            qos,
            retain,
            topic_name,
            packet_id,
            properties,
            payload,
        })
    }

    #[must_use]
    pub fn flags(&self) -> u8 {
        let mut flags = (self.qos as u8) << 1;
        if self.dup {
            flags |= 0x08;
        }
        if self.retain {
            flags |= 0x01;
        }
        flags
    }

    pub fn encode(&self, buf: &mut Vec<u8>) -> Result<(), EncodeError> {
        crate::bytes::encode_string(buf, &self.topic_name)?;
        if self.qos != QoS::AtMostOnce {
            let id = self.packet_id.ok_or(EncodeError::InvalidVarInt)?;
            crate::bytes::encode_u16(buf, id);
        }
        self.properties.encode(buf)?;
        buf.extend_from_slice(&self.payload);
        Ok(())
    }

    #[must_use]
    pub fn wire_len(&self) -> usize {
        let mut len = string_bytes(&self.topic_name);
        if self.qos != QoS::AtMostOnce {
            len += 2;
        }
        len += self.properties.wire_len();
        len += self.payload.len();
        len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_qos1() {
        let packet = PublishPacket {
            dup: false,
            qos: QoS::AtLeastOnce,
            retain: false,
            topic_name: "a/b".to_string(),
            packet_id: Some(7),
            properties: Properties::new(),
            payload: b"hello".to_vec(),
        };
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        assert_eq!(buf.len(), packet.wire_len());
        let mut reader = ByteReader::new(&buf);
        let decoded = PublishPacket::decode(packet.flags(), buf.len() as u32, &mut reader).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn qos0_with_dup_is_rejected() {
        let mut reader = ByteReader::new(&[]);
        assert_eq!(
            PublishPacket::decode(0x08, 0, &mut reader),
            Err(DecodeError::InvalidPacketFlags)
        );
    }
}
