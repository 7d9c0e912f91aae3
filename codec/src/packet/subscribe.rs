use crate::bytes::ByteReader;
use crate::error::{DecodeError, EncodeError};
use crate::property::{Properties, Property, PropertyType};
use crate::qos::QoS;
use crate::topic::validate_topic_filter;

const SUBSCRIBE_PROPERTIES: &[PropertyType] =
    &[PropertyType::SubscriptionIdentifier, PropertyType::UserProperty];

/// How the broker should treat already-retained messages matching a new
/// subscription: always send, send only if the subscription is new, or
/// never send.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RetainHandling {
    SendAtSubscribe,
    SendIfNewSubscription,
    DoNotSend,
}

impl TryFrom<u8> for RetainHandling {
    type Error = DecodeError;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(RetainHandling::SendAtSubscribe),
            1 => Ok(RetainHandling::SendIfNewSubscription),
            2 => Ok(RetainHandling::DoNotSend),
            _ => Err(DecodeError::InvalidPacketFlags),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SubscribeOptions {
    pub qos: QoS,
    pub no_local: bool,
    pub retain_as_published: bool,
    pub retain_handling: RetainHandling,
}

impl SubscribeOptions {
    fn decode(byte: u8) -> Result<Self, DecodeError> {
        if byte & 0xc0 != 0 {
            return Err(DecodeError::InvalidPacketFlags);
        }
        let qos = QoS::try_from(byte & 0x03)?;
        let no_local = byte & 0x04 != 0;
        let retain_as_published = byte & 0x08 != 0;
        let retain_handling = RetainHandling::try_from((byte & 0x30) >> 4)?;
        Ok(SubscribeOptions {
            qos,
            no_local,
            retain_as_published,
            retain_handling,
        })
    }

    fn encode(&self) -> u8 {
        let mut byte = self.qos as u8;
        if self.no_local {
            byte |= 0x04;
        }
        if self.retain_as_published {
            byte |= 0x08;
        }
        byte |= match self.retain_handling {
            RetainHandling::SendAtSubscribe => 0,
            RetainHandling::SendIfNewSubscription => 1,
            RetainHandling::DoNotSend => 2,
        } << 4;
        byte
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SubscribeFilter {
    pub filter: String,
    pub options: SubscribeOptions,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SubscribePacket {
    pub packet_id: u16,
    pub properties: Properties,
    pub filters: Vec<SubscribeFilter>,
}

impl SubscribePacket {
    #[must_use]
    pub fn subscription_identifier(&self) -> Option<u32> {
        match self.properties.find(PropertyType::SubscriptionIdentifier) {
            Some(Property::SubscriptionIdentifier(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn decode(body_len: u32, reader: &mut ByteReader) -> Result<Self, DecodeError> {
        let packet_id = reader.read_u16()?;
        if packet_id == 0 {
            return Err(DecodeError::InvalidPacketId);
        }
        let properties = Properties::decode(reader)?;
        properties.validate(SUBSCRIBE_PROPERTIES)?;

        let body_end = body_len as usize;
        let mut filters = Vec::new();
        while reader.offset() < body_end {
            let filter = reader.read_string()?;
            validate_topic_filter(&filter).map_err(|_| DecodeError::InvalidTopicFilter)?;
            let options = SubscribeOptions::decode(reader.read_u8()?)?;
            filters.push(SubscribeFilter { filter, options });
        }
        if filters.is_empty() {
            return Err(DecodeError::InvalidRemainingLength);
        }
        Ok(SubscribePacket {
            packet_id,
            properties,
            filters,
        })
    }

    pub fn encode(&self, buf: &mut Vec<u8>) -> Result<(), EncodeError> {
        crate::bytes::encode_u16(buf, self.packet_id);
        self.properties.encode(buf)?;
        for filter in &self.filters {
            crate::bytes::encode_string(buf, &filter.filter)?;
            buf.push(filter.options.encode());
        }
        Ok(())
    }

    #[must_use]
    pub fn wire_len(&self) -> usize {
        let mut len = 2 + self.properties.wire_len();
        for filter in &self.filters {
            len += crate::bytes::string_bytes(&filter.filter) + 1;
        }
        len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_multiple_filters() {
        let packet = SubscribePacket {
            packet_id: 10,
            properties: Properties::new(),
            filters: vec![
                SubscribeFilter {
                    filter: "sport/+/score".to_string(),
                    options: SubscribeOptions {
                        qos: QoS::AtLeastOnce,
                        no_local: true,
                        retain_as_published: false,
                        retain_handling: RetainHandling::SendIfNewSubscription,
                    },
                },
                SubscribeFilter {
                    filter: "a/#".to_string(),
                    options: SubscribeOptions {
                        qos: QoS::ExactlyOnce,
                        no_local: false,
                        retain_as_published: true,
                        retain_handling: RetainHandling::DoNotSend,
                    },
                },
            ],
        };
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        assert_eq!(buf.len(), packet.wire_len());
        let mut reader = ByteReader::new(&buf);
        let decoded = SubscribePacket::decode(buf.len() as u32, &mut reader).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn rejects_reserved_option_bits() {
        assert_eq!(
            SubscribeOptions::decode(0xc0),
            Err(DecodeError::InvalidPacketFlags)
        );
    }
}
