use crate::bytes::{
    encode_binary, encode_string, encode_u16, string_bytes, ByteReader,
};
use crate::error::{DecodeError, EncodeError};
use crate::property::{Properties, Property, PropertyType};
use crate::qos::QoS;

const PROTOCOL_NAME: &str = "MQTT";
const PROTOCOL_LEVEL: u8 = 5;

const CONNECT_PROPERTIES: &[PropertyType] = &[
    PropertyType::SessionExpiryInterval,
    PropertyType::AuthenticationMethod,
    PropertyType::AuthenticationData,
    PropertyType::RequestProblemInformation,
    PropertyType::RequestResponseInformation,
    PropertyType::ReceiveMaximum,
    PropertyType::TopicAliasMaximum,
    PropertyType::MaximumPacketSize,
    PropertyType::UserProperty,
];

const WILL_PROPERTIES: &[PropertyType] = &[
    PropertyType::PayloadFormatIndicator,
    PropertyType::MessageExpiryInterval,
    PropertyType::ContentType,
    PropertyType::ResponseTopic,
    PropertyType::CorrelationData,
    PropertyType::WillDelayInterval,
    PropertyType::UserProperty,
];

/// The will message carried in a CONNECT packet, published by the broker
/// when the session ends without a preceding DISCONNECT (or, for a zero
/// will-delay, immediately on network loss).
#[derive(Clone, Debug, PartialEq)]
pub struct Will {
    pub qos: QoS,
    pub retain: bool,
    pub topic: String,
    pub payload: Vec<u8>,
    pub properties: Properties,
}

impl Will {
    #[must_use]
    pub fn delay_interval(&self) -> u32 {
        match self.properties.find(PropertyType::WillDelayInterval) {
            Some(Property::WillDelayInterval(v)) => *v,
            _ => 0,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ConnectPacket {
    pub clean_start: bool,
    pub keep_alive: u16,
    pub client_id: String,
    pub will: Option<Will>,
    pub username: Option<String>,
    pub password: Option<Vec<u8>>,
    pub properties: Properties,
}

impl ConnectPacket {
    #[must_use]
    pub fn session_expiry_interval(&self) -> u32 {
        match self.properties.find(PropertyType::SessionExpiryInterval) {
            Some(Property::SessionExpiryInterval(v)) => *v,
            _ => 0,
        }
    }

    #[must_use]
    pub fn receive_maximum(&self) -> u16 {
        match self.properties.find(PropertyType::ReceiveMaximum) {
            Some(Property::ReceiveMaximum(v)) => *v,
            _ => 65535,
        }
    }

    pub fn decode(reader: &mut ByteReader) -> Result<Self, DecodeError> {
        let protocol_name = reader.read_string()?;
        if protocol_name != PROTOCOL_NAME {
            return Err(DecodeError::InvalidProtocolName);
        }
        let protocol_level = reader.read_u8()?;
        if protocol_level != PROTOCOL_LEVEL {
            return Err(DecodeError::UnsupportedProtocolVersion);
        }

        let connect_flags = reader.read_u8()?;
        if connect_flags & 0x01 != 0 {
            return Err(DecodeError::InvalidConnectFlags);
        }
        let clean_start = connect_flags & 0x02 != 0;
        let has_will = connect_flags & 0x04 != 0;
        let will_qos = QoS::try_from((connect_flags & 0x18) >> 3)?;
        let will_retain = connect_flags & 0x20 != 0;
        let has_password = connect_flags & 0x40 != 0;
        let has_username = connect_flags & 0x80 != 0;
        if !has_will && (will_qos != QoS::AtMostOnce || will_retain) {
            return Err(DecodeError::InvalidConnectFlags);
        }

        let keep_alive = reader.read_u16()?;

        let properties = Properties::decode(reader)?;
        properties.validate(CONNECT_PROPERTIES)?;
        if properties.find(PropertyType::AuthenticationData).is_some()
            && properties.find(PropertyType::AuthenticationMethod).is_none()
        {
            return Err(DecodeError::AuthDataWithoutMethod);
        }

        let client_id = reader.read_string()?;
        if !crate::topic::is_well_formed_client_id(&client_id) {
            return Err(DecodeError::InvalidClientId);
        }

        let will = if has_will {
            let will_properties = Properties::decode(reader)?;
            will_properties.validate(WILL_PROPERTIES)?;
            let topic = reader.read_string()?;
            crate::topic::validate_topic_name(&topic)
                .map_err(|_| DecodeError::InvalidTopic)?;
            let payload = reader.read_binary()?;
            Some(Will {
                qos: will_qos,
                retain: will_retain,
                topic,
                payload,
                properties: will_properties,
            })
        } else {
            None
        };

        let username = if has_username {
            Some(reader.read_string()?)
        } else {
            None
        };
        let password = if has_password {
            Some(reader.read_binary()?)
        } else {
            None
        };

        Ok(ConnectPacket {
            clean_start,
            keep_alive,
            client_id,
            will,
            username,
            password,
            properties,
        })
    }

    pub fn encode(&self, buf: &mut Vec<u8>) -> Result<(), EncodeError> {
        encode_string(buf, PROTOCOL_NAME)?;
        buf.push(PROTOCOL_LEVEL);

        let mut flags = 0u8;
        if self.clean_start {
            flags |= 0x02;
        }
        if let Some(will) = &self.will {
            flags |= 0x04;
            flags |= (will.qos as u8) << 3;
            if will.retain {
                flags |= 0x20;
            }
        }
        if self.password.is_some() {
            flags |= 0x40;
        }
        if self.username.is_some() {
            flags |= 0x80;
        }
        buf.push(flags);

        encode_u16(buf, self.keep_alive);
        self.properties.encode(buf)?;
        encode_string(buf, &self.client_id)?;

        if let Some(will) = &self.will {
            will.properties.encode(buf)?;
            encode_string(buf, &will.topic)?;
            encode_binary(buf, &will.payload)?;
        }
        if let Some(username) = &self.username {
            encode_string(buf, username)?;
        }
        if let Some(password) = &self.password {
            encode_binary(buf, password)?;
        }
        Ok(())
    }

    #[must_use]
    pub fn wire_len(&self) -> usize {
        let mut len = string_bytes(PROTOCOL_NAME) + 1 + 1 + 2;
        len += self.properties.wire_len();
        len += string_bytes(&self.client_id);
        if let Some(will) = &self.will {
            len += will.properties.wire_len();
            len += string_bytes(&will.topic);
            len += 2 + will.payload.len();
        }
        if let Some(username) = &self.username {
            len += string_bytes(username);
        }
        if let Some(password) = &self.password {
            len += 2 + password.len();
        }
        len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_connect() -> ConnectPacket {
        ConnectPacket {
            clean_start: true,
            keep_alive: 60,
            client_id: "client-1".to_string(),
            will: None,
            username: None,
            password: None,
            properties: Properties::new(),
        }
    }

    #[test]
    fn round_trip_minimal() {
        let packet = minimal_connect();
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        assert_eq!(buf.len(), packet.wire_len());
        let mut reader = ByteReader::new(&buf);
        let decoded = ConnectPacket::decode(&mut reader).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn rejects_non_mqtt5_protocol_level() {
        let mut buf = Vec::new();
        encode_string(&mut buf, "MQTT").unwrap();
        buf.push(4);
        buf.push(0x02);
        encode_u16(&mut buf, 60);
        buf.push(0); // empty properties
        encode_string(&mut buf, "c").unwrap();
        let mut reader = ByteReader::new(&buf);
        assert_eq!(
            ConnectPacket::decode(&mut reader),
            Err(DecodeError::UnsupportedProtocolVersion)
        );
    }

    #[test]
    fn round_trip_with_will_and_credentials() {
        let mut packet = minimal_connect();
        packet.will = Some(Will {
            qos: QoS::AtLeastOnce,
            retain: true,
            topic: "last/will".to_string(),
            payload: b"bye".to_vec(),
            properties: Properties::new(),
        });
        packet.username = Some("alice".to_string());
        packet.password = Some(b"secret".to_vec());

        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        let mut reader = ByteReader::new(&buf);
        let decoded = ConnectPacket::decode(&mut reader).unwrap();
        assert_eq!(decoded, packet);
    }
}
