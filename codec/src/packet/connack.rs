use crate::bytes::{encode_bool, ByteReader};
use crate::error::{DecodeError, EncodeError};
use crate::property::{Properties, PropertyType};
use crate::reason_code::ReasonCode;

const CONNACK_PROPERTIES: &[PropertyType] = &[
    PropertyType::SessionExpiryInterval,
    PropertyType::AssignedClientIdentifier,
    PropertyType::ServerKeepAlive,
    PropertyType::AuthenticationMethod,
    PropertyType::AuthenticationData,
    PropertyType::ResponseInformation,
    PropertyType::ServerReference,
    PropertyType::ReasonString,
    PropertyType::ReceiveMaximum,
    PropertyType::TopicAliasMaximum,
    PropertyType::MaximumQoS,
    PropertyType::RetainAvailable,
    PropertyType::UserProperty,
    PropertyType::MaximumPacketSize,
    PropertyType::WildcardSubscriptionAvailable,
    PropertyType::SubscriptionIdentifierAvailable,
    PropertyType::SharedSubscriptionAvailable,
];

pub const CONNACK_REASONS: &[ReasonCode] = &[
    ReasonCode::Success,
    ReasonCode::UnspecifiedError,
    ReasonCode::MalformedPacket,
    ReasonCode::ProtocolError,
    ReasonCode::ImplementationSpecificError,
    ReasonCode::UnsupportedProtocolVersion,
    ReasonCode::ClientIdentifierNotValid,
    ReasonCode::BadUserNameOrPassword,
    ReasonCode::NotAuthorized,
    ReasonCode::ServerUnavailable,
    ReasonCode::ServerBusy,
    ReasonCode::Banned,
    ReasonCode::BadAuthenticationMethod,
    ReasonCode::TopicNameInvalid,
    ReasonCode::PacketTooLarge,
    ReasonCode::QuotaExceeded,
    ReasonCode::PayloadFormatInvalid,
    ReasonCode::RetainNotSupported,
    ReasonCode::QoSNotSupported,
    ReasonCode::UseAnotherServer,
    ReasonCode::ServerMoved,
    ReasonCode::ConnectionRateExceeded,
];

#[derive(Clone, Debug, PartialEq)]
pub struct ConnAckPacket {
    pub session_present: bool,
    pub reason_code: ReasonCode,
    pub properties: Properties,
}

impl ConnAckPacket {
    pub fn decode(reader: &mut ByteReader) -> Result<Self, DecodeError> {
        let flags = reader.read_u8()?;
        if flags & 0xfe != 0 {
            return Err(DecodeError::InvalidConnectFlags);
        }
        let session_present = flags & 0x01 != 0;
        let reason_code = ReasonCode::decode(reader)?;
        if !CONNACK_REASONS.contains(&reason_code) {
            return Err(DecodeError::InvalidReasonCode);
        }
        if session_present && reason_code != ReasonCode::Success {
            return Err(DecodeError::InvalidConnectFlags);
        }
        let properties = Properties::decode(reader)?;
        properties.validate(CONNACK_PROPERTIES)?;
        Ok(ConnAckPacket {
            session_present,
            reason_code,
            properties,
        })
    }

    pub fn encode(&self, buf: &mut Vec<u8>) -> Result<(), EncodeError> {
        encode_bool(buf, self.session_present);
        self.reason_code.encode(buf)?;
        self.properties.encode(buf)
    }

    #[must_use]
    pub fn wire_len(&self) -> usize {
        1 + 1 + self.properties.wire_len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let packet = ConnAckPacket {
            session_present: true,
            reason_code: ReasonCode::Success,
            properties: Properties::new(),
        };
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        assert_eq!(buf.len(), packet.wire_len());
        let mut reader = ByteReader::new(&buf);
        assert_eq!(ConnAckPacket::decode(&mut reader).unwrap(), packet);
    }

    #[test]
    fn session_present_requires_success() {
        let packet = ConnAckPacket {
            session_present: true,
            reason_code: ReasonCode::NotAuthorized,
            properties: Properties::new(),
        };
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        let mut reader = ByteReader::new(&buf);
        assert_eq!(
            ConnAckPacket::decode(&mut reader),
            Err(DecodeError::InvalidConnectFlags)
        );
    }
}
