use crate::bytes::ByteReader;
use crate::error::{DecodeError, EncodeError};
use crate::property::{Properties, PropertyType};
use crate::reason_code::ReasonCode;

const AUTH_PROPERTIES: &[PropertyType] = &[
    PropertyType::AuthenticationMethod,
    PropertyType::AuthenticationData,
    PropertyType::ReasonString,
    PropertyType::UserProperty,
];

pub const AUTH_REASONS: &[ReasonCode] = &[
    ReasonCode::Success,
    ReasonCode::ContinueAuthentication,
    ReasonCode::ReAuthenticate,
];

#[derive(Clone, Debug, PartialEq)]
pub struct AuthPacket {
    pub reason_code: ReasonCode,
    pub properties: Properties,
}

impl AuthPacket {
    pub fn decode(body_len: u32, reader: &mut ByteReader) -> Result<Self, DecodeError> {
        if body_len == 0 {
            return Ok(AuthPacket {
                reason_code: ReasonCode::Success,
                properties: Properties::new(),
            });
        }
        let reason_code = ReasonCode::decode(reader)?;
        if !AUTH_REASONS.contains(&reason_code) {
            return Err(DecodeError::InvalidReasonCode);
        }
        let properties = if body_len == 1 {
            Properties::new()
        } else {
            let properties = Properties::decode(reader)?;
            properties.validate(AUTH_PROPERTIES)?;
            properties
        };
        if reason_code != ReasonCode::Success
            && properties.find(PropertyType::AuthenticationMethod).is_none()
        {
            return Err(DecodeError::AuthDataWithoutMethod);
        }
        Ok(AuthPacket {
            reason_code,
            properties,
        })
    }

    pub fn encode(&self, buf: &mut Vec<u8>) -> Result<(), EncodeError> {
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
            return 0;
        }
        if self.properties.wire_len() == 1 {
            return 1;
        }
        1 + self.properties.wire_len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::Property;

    #[test]
    fn round_trip_continue_authentication() {
        let mut properties = Properties::new();
        properties.push(Property::AuthenticationMethod("SCRAM-SHA-1".to_string()));
        properties.push(Property::AuthenticationData(vec![1, 2, 3]));
        let packet = AuthPacket {
            reason_code: ReasonCode::ContinueAuthentication,
            properties,
        };
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        assert_eq!(buf.len(), packet.wire_len());
        let mut reader = ByteReader::new(&buf);
        assert_eq!(
            AuthPacket::decode(buf.len() as u32, &mut reader).unwrap(),
            packet
        );
    }
}
