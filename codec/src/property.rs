// MQTT 5 properties: a property set is a variable-byte-length-prefixed
// sequence of (identifier byte, typed value) pairs. The set of identifiers
// legal on a given packet type is fixed; duplicates of any identifier other
// than `UserProperty` are a malformed packet.

use crate::bytes::{
    binary_bytes, encode_binary, encode_string, encode_u16, encode_u32, encode_var_int,
    string_bytes, var_int_len, ByteReader,
};
use crate::error::{DecodeError, EncodeError};

#[repr(u8)]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum PropertyType {
    PayloadFormatIndicator = 0x01,
    MessageExpiryInterval = 0x02,
    ContentType = 0x03,
    ResponseTopic = 0x08,
    CorrelationData = 0x09,
    SubscriptionIdentifier = 0x0b,
    SessionExpiryInterval = 0x11,
    AssignedClientIdentifier = 0x12,
    ServerKeepAlive = 0x13,
    AuthenticationMethod = 0x15,
    AuthenticationData = 0x16,
    RequestProblemInformation = 0x17,
    WillDelayInterval = 0x18,
    RequestResponseInformation = 0x19,
    ResponseInformation = 0x1a,
    ServerReference = 0x1c,
    ReasonString = 0x1f,
    ReceiveMaximum = 0x21,
    TopicAliasMaximum = 0x22,
    TopicAlias = 0x23,
    MaximumQoS = 0x24,
    RetainAvailable = 0x25,
    UserProperty = 0x26,
    MaximumPacketSize = 0x27,
    WildcardSubscriptionAvailable = 0x28,
    SubscriptionIdentifierAvailable = 0x29,
    SharedSubscriptionAvailable = 0x2a,
}

impl TryFrom<u8> for PropertyType {
    type Error = DecodeError;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        use PropertyType::*;
        Ok(match v {
            0x01 => PayloadFormatIndicator,
            0x02 => MessageExpiryInterval,
            0x03 => ContentType,
            0x08 => ResponseTopic,
            0x09 => CorrelationData,
            0x0b => SubscriptionIdentifier,
            0x11 => SessionExpiryInterval,
            0x12 => AssignedClientIdentifier,
            0x13 => ServerKeepAlive,
            0x15 => AuthenticationMethod,
            0x16 => AuthenticationData,
            0x17 => RequestProblemInformation,
            0x18 => WillDelayInterval,
            0x19 => RequestResponseInformation,
            0x1a => ResponseInformation,
            0x1c => ServerReference,
            0x1f => ReasonString,
            0x21 => ReceiveMaximum,
            0x22 => TopicAliasMaximum,
            0x23 => TopicAlias,
            0x24 => MaximumQoS,
            0x25 => RetainAvailable,
            0x26 => UserProperty,
            0x27 => MaximumPacketSize,
            0x28 => WildcardSubscriptionAvailable,
            0x29 => SubscriptionIdentifierAvailable,
            0x2a => SharedSubscriptionAvailable,
            _ => return Err(DecodeError::InvalidPropertyType),
        })
    }
}

/// One decoded property. The identifier is recoverable via
/// [`Property::property_type`]; callers interested in a specific property
/// filter a `Properties` list by type.
#[derive(Clone, Debug, PartialEq)]
pub enum Property {
    PayloadFormatIndicator(u8),
    MessageExpiryInterval(u32),
    ContentType(String),
    ResponseTopic(String),
    CorrelationData(Vec<u8>),
    SubscriptionIdentifier(u32),
    SessionExpiryInterval(u32),
    AssignedClientIdentifier(String),
    ServerKeepAlive(u16),
    AuthenticationMethod(String),
    AuthenticationData(Vec<u8>),
    RequestProblemInformation(u8),
    WillDelayInterval(u32),
    RequestResponseInformation(u8),
    ResponseInformation(String),
    ServerReference(String),
    ReasonString(String),
    ReceiveMaximum(u16),
    TopicAliasMaximum(u16),
    TopicAlias(u16),
    MaximumQoS(u8),
    RetainAvailable(bool),
    UserProperty(String, String),
    MaximumPacketSize(u32),
    WildcardSubscriptionAvailable(bool),
    SubscriptionIdentifierAvailable(bool),
    SharedSubscriptionAvailable(bool),
}

impl Property {
    #[must_use]
    pub const fn property_type(&self) -> PropertyType {
        use Property::*;
        match self {
            PayloadFormatIndicator(_) => PropertyType::PayloadFormatIndicator,
            MessageExpiryInterval(_) => PropertyType::MessageExpiryInterval,
            ContentType(_) => PropertyType::ContentType,
            ResponseTopic(_) => PropertyType::ResponseTopic,
            CorrelationData(_) => PropertyType::CorrelationData,
            SubscriptionIdentifier(_) => PropertyType::SubscriptionIdentifier,
            SessionExpiryInterval(_) => PropertyType::SessionExpiryInterval,
            AssignedClientIdentifier(_) => PropertyType::AssignedClientIdentifier,
            ServerKeepAlive(_) => PropertyType::ServerKeepAlive,
            AuthenticationMethod(_) => PropertyType::AuthenticationMethod,
            AuthenticationData(_) => PropertyType::AuthenticationData,
            RequestProblemInformation(_) => PropertyType::RequestProblemInformation,
            WillDelayInterval(_) => PropertyType::WillDelayInterval,
            RequestResponseInformation(_) => PropertyType::RequestResponseInformation,
            ResponseInformation(_) => PropertyType::ResponseInformation,
            ServerReference(_) => PropertyType::ServerReference,
            ReasonString(_) => PropertyType::ReasonString,
            ReceiveMaximum(_) => PropertyType::ReceiveMaximum,
            TopicAliasMaximum(_) => PropertyType::TopicAliasMaximum,
            TopicAlias(_) => PropertyType::TopicAlias,
            MaximumQoS(_) => PropertyType::MaximumQoS,
            RetainAvailable(_) => PropertyType::RetainAvailable,
            UserProperty(_, _) => PropertyType::UserProperty,
            MaximumPacketSize(_) => PropertyType::MaximumPacketSize,
            WildcardSubscriptionAvailable(_) => PropertyType::WildcardSubscriptionAvailable,
            SubscriptionIdentifierAvailable(_) => PropertyType::SubscriptionIdentifierAvailable,
            SharedSubscriptionAvailable(_) => PropertyType::SharedSubscriptionAvailable,
        }
    }

    fn decode_one(reader: &mut ByteReader) -> Result<Self, DecodeError> {
        let property_type = PropertyType::try_from(reader.read_u8()?)?;
        use Property::*;
        Ok(match property_type {
            PropertyType::PayloadFormatIndicator => PayloadFormatIndicator(reader.read_u8()?),
            PropertyType::MessageExpiryInterval => MessageExpiryInterval(reader.read_u32()?),
            PropertyType::ContentType => ContentType(reader.read_string()?),
            PropertyType::ResponseTopic => ResponseTopic(reader.read_string()?),
            PropertyType::CorrelationData => CorrelationData(reader.read_binary()?),
            PropertyType::SubscriptionIdentifier => {
                let v = reader.read_var_int()?;
                if v == 0 {
                    return Err(DecodeError::InvalidPropertyType);
                }
                SubscriptionIdentifier(v)
            }
            PropertyType::SessionExpiryInterval => SessionExpiryInterval(reader.read_u32()?),
            PropertyType::AssignedClientIdentifier => {
                AssignedClientIdentifier(reader.read_string()?)
            }
            PropertyType::ServerKeepAlive => ServerKeepAlive(reader.read_u16()?),
            PropertyType::AuthenticationMethod => AuthenticationMethod(reader.read_string()?),
            PropertyType::AuthenticationData => AuthenticationData(reader.read_binary()?),
            PropertyType::RequestProblemInformation => {
                RequestProblemInformation(reader.read_u8()?)
            }
            PropertyType::WillDelayInterval => WillDelayInterval(reader.read_u32()?),
            PropertyType::RequestResponseInformation => {
                RequestResponseInformation(reader.read_u8()?)
            }
            PropertyType::ResponseInformation => ResponseInformation(reader.read_string()?),
            PropertyType::ServerReference => ServerReference(reader.read_string()?),
            PropertyType::ReasonString => ReasonString(reader.read_string()?),
            PropertyType::ReceiveMaximum => {
                let v = reader.read_u16()?;
                if v == 0 {
                    return Err(DecodeError::InvalidPropertyType);
                }
                ReceiveMaximum(v)
            }
            PropertyType::TopicAliasMaximum => TopicAliasMaximum(reader.read_u16()?),
            PropertyType::TopicAlias => {
                let v = reader.read_u16()?;
                if v == 0 {
                    // A Topic Alias value of 0 is illegal.
                    return Err(DecodeError::TopicAliasInvalid);
                }
                TopicAlias(v)
            }
            PropertyType::MaximumQoS => {
                let v = reader.read_u8()?;
                if v > 1 {
                    return Err(DecodeError::InvalidPropertyType);
                }
                MaximumQoS(v)
            }
            PropertyType::RetainAvailable => RetainAvailable(reader.read_bool()?),
            PropertyType::UserProperty => {
                let name = reader.read_string()?;
                let value = reader.read_string()?;
                UserProperty(name, value)
            }
            PropertyType::MaximumPacketSize => {
                let v = reader.read_u32()?;
                if v == 0 {
                    return Err(DecodeError::InvalidPropertyType);
                }
                MaximumPacketSize(v)
            }
            PropertyType::WildcardSubscriptionAvailable => {
                WildcardSubscriptionAvailable(reader.read_bool()?)
            }
            PropertyType::SubscriptionIdentifierAvailable => {
                SubscriptionIdentifierAvailable(reader.read_bool()?)
            }
            PropertyType::SharedSubscriptionAvailable => {
                SharedSubscriptionAvailable(reader.read_bool()?)
            }
        })
    }

    fn encode_one(&self, buf: &mut Vec<u8>) -> Result<(), EncodeError> {
        use Property::*;
        buf.push(self.property_type() as u8);
        match self {
            PayloadFormatIndicator(v) | RequestProblemInformation(v)
            | RequestResponseInformation(v) | MaximumQoS(v) => buf.push(*v),
            MessageExpiryInterval(v) | SessionExpiryInterval(v) | WillDelayInterval(v)
            | MaximumPacketSize(v) => encode_u32(buf, *v),
            ContentType(v) | ResponseTopic(v) | AssignedClientIdentifier(v)
            | AuthenticationMethod(v) | ResponseInformation(v) | ServerReference(v)
            | ReasonString(v) => encode_string(buf, v)?,
            CorrelationData(v) | AuthenticationData(v) => encode_binary(buf, v)?,
            SubscriptionIdentifier(v) => encode_var_int(buf, *v)?,
            ServerKeepAlive(v) | ReceiveMaximum(v) | TopicAliasMaximum(v) | TopicAlias(v) => {
                encode_u16(buf, *v);
            }
            RetainAvailable(v) | WildcardSubscriptionAvailable(v)
            | SubscriptionIdentifierAvailable(v) | SharedSubscriptionAvailable(v) => {
                buf.push(u8::from(*v));
            }
            UserProperty(name, value) => {
                encode_string(buf, name)?;
                encode_string(buf, value)?;
            }
        }
        Ok(())
    }

    fn wire_len(&self) -> usize {
        use Property::*;
        1 + match self {
            PayloadFormatIndicator(_) | RequestProblemInformation(_)
            | RequestResponseInformation(_) | MaximumQoS(_) => 1,
            MessageExpiryInterval(_) | SessionExpiryInterval(_) | WillDelayInterval(_)
            | MaximumPacketSize(_) => 4,
            ContentType(v) | ResponseTopic(v) | AssignedClientIdentifier(v)
            | AuthenticationMethod(v) | ResponseInformation(v) | ServerReference(v)
            | ReasonString(v) => string_bytes(v),
            CorrelationData(v) | AuthenticationData(v) => binary_bytes(v),
            SubscriptionIdentifier(v) => var_int_len(*v),
            ServerKeepAlive(_) | ReceiveMaximum(_) | TopicAliasMaximum(_) | TopicAlias(_) => 2,
            RetainAvailable(_) | WildcardSubscriptionAvailable(_)
            | SubscriptionIdentifierAvailable(_) | SharedSubscriptionAvailable(_) => 1,
            UserProperty(name, value) => string_bytes(name) + string_bytes(value),
        }
    }
}

/// Ordered list of properties attached to one packet. Encoding order is
/// preserved as decoded; user properties keep their insertion order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Properties(Vec<Property>);

impl Properties {
    #[must_use]
    pub const fn new() -> Self {
        Properties(Vec::new())
    }

    pub fn push(&mut self, property: Property) {
        self.0.push(property);
    }

    #[must_use]
    pub fn iter(&self) -> std::slice::Iter<'_, Property> {
        self.0.iter()
    }

    #[must_use]
    pub fn find(&self, property_type: PropertyType) -> Option<&Property> {
        self.0.iter().find(|p| p.property_type() == property_type)
    }

    #[must_use]
    pub fn user_properties(&self) -> Vec<(&str, &str)> {
        self.0
            .iter()
            .filter_map(|p| match p {
                Property::UserProperty(k, v) => Some((k.as_str(), v.as_str())),
                _ => None,
            })
            .collect()
    }

    fn body_len(&self) -> usize {
        self.0.iter().map(Property::wire_len).sum()
    }

    /// Total wire length including the length-prefix varint itself.
    #[must_use]
    pub fn wire_len(&self) -> usize {
        let body = self.body_len();
        var_int_len(body as u32) + body
    }

    pub fn decode(reader: &mut ByteReader) -> Result<Self, DecodeError> {
        let len = reader.read_var_int()? as usize;
        if len > reader.remaining() {
            return Err(DecodeError::InvalidRemainingLength);
        }
        let end_offset = reader.offset() + len;
        let mut properties = Vec::new();
        while reader.offset() < end_offset {
            properties.push(Property::decode_one(reader)?);
        }
        if reader.offset() != end_offset {
            return Err(DecodeError::InvalidRemainingLength);
        }
        Ok(Properties(properties))
    }

    pub fn encode(&self, buf: &mut Vec<u8>) -> Result<(), EncodeError> {
        encode_var_int(buf, self.body_len() as u32)?;
        for property in &self.0 {
            property.encode_one(buf)?;
        }
        Ok(())
    }

    /// Validate that every property belongs to `allowed`, and that no
    /// property outside `UserProperty`/`SubscriptionIdentifier` repeats.
    pub fn validate(&self, allowed: &[PropertyType]) -> Result<(), DecodeError> {
        for property in &self.0 {
            let property_type = property.property_type();
            if !allowed.contains(&property_type) {
                return Err(DecodeError::InvalidPropertyType);
            }
            if !matches!(
                property_type,
                PropertyType::UserProperty | PropertyType::SubscriptionIdentifier
            ) {
                let count = self
                    .0
                    .iter()
                    .filter(|p| p.property_type() == property_type)
                    .count();
                if count > 1 {
                    return Err(DecodeError::DuplicateProperty);
                }
            }
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a Properties {
    type Item = &'a Property;
    type IntoIter = std::slice::Iter<'a, Property>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_mixed_properties() {
        let mut props = Properties::new();
        props.push(Property::SessionExpiryInterval(60));
        props.push(Property::UserProperty("a".into(), "1".into()));
        props.push(Property::UserProperty("b".into(), "2".into()));

        let mut buf = Vec::new();
        props.encode(&mut buf).unwrap();
        assert_eq!(buf.len(), props.wire_len());

        let mut reader = ByteReader::new(&buf);
        let decoded = Properties::decode(&mut reader).unwrap();
        assert_eq!(decoded, props);
        assert_eq!(
            decoded.user_properties(),
            vec![("a", "1"), ("b", "2")]
        );
    }

    #[test]
    fn duplicate_non_user_property_rejected() {
        let mut props = Properties::new();
        props.push(Property::SessionExpiryInterval(1));
        props.push(Property::SessionExpiryInterval(2));
        assert_eq!(
            props.validate(&[PropertyType::SessionExpiryInterval]),
            Err(DecodeError::DuplicateProperty)
        );
    }

    #[test]
    fn topic_alias_zero_is_invalid() {
        let mut buf = Vec::new();
        buf.push(PropertyType::TopicAlias as u8);
        encode_u16(&mut buf, 0);
        let mut wrapper = Vec::new();
        encode_var_int(&mut wrapper, buf.len() as u32).unwrap();
        wrapper.extend_from_slice(&buf);
        let mut reader = ByteReader::new(&wrapper);
        assert_eq!(
            Properties::decode(&mut reader),
            Err(DecodeError::TopicAliasInvalid)
        );
    }
}
