use crate::bytes::ByteReader;
use crate::error::{DecodeError, EncodeError};
use crate::property::{Properties, PropertyType};
use crate::reason_code::ReasonCode;

const DISCONNECT_PROPERTIES: &[PropertyType] = &[
    PropertyType::SessionExpiryInterval,
    PropertyType::ServerReference,
    PropertyType::ReasonString,
    PropertyType::UserProperty,
];

pub const DISCONNECT_REASONS: &[ReasonCode] = &[
    ReasonCode::Success,
    ReasonCode::DisconnectWithWillMessage,
    ReasonCode::UnspecifiedError,
    ReasonCode::MalformedPacket,
    ReasonCode::ProtocolError,
    ReasonCode::ImplementationSpecificError,
    ReasonCode::NotAuthorized,
    ReasonCode::ServerBusy,
    ReasonCode::ServerShuttingDown,
    ReasonCode::KeepAliveTimeout,
    ReasonCode::SessionTakenOver,
    ReasonCode::TopicFilterInvalid,
    ReasonCode::TopicNameInvalid,
    ReasonCode::ReceiveMaximumExceeded,
    ReasonCode::TopicAliasInvalid,
    ReasonCode::PacketTooLarge,
    ReasonCode::MessageRateTooHigh,
    ReasonCode::QuotaExceeded,
    ReasonCode::AdministrativeAction,
    ReasonCode::PayloadFormatInvalid,
    ReasonCode::RetainNotSupported,
    ReasonCode::QoSNotSupported,
    ReasonCode::UseAnotherServer,
    ReasonCode::ServerMoved,
    ReasonCode::SharedSubscriptionsNotSupported,
    ReasonCode::ConnectionRateExceeded,
    ReasonCode::MaximumConnectTime,
    ReasonCode::SubscriptionIdentifiersNotSupported,
    ReasonCode::WildcardSubscriptionsNotSupported,
];

#[derive(Clone, Debug, PartialEq)]
pub struct DisconnectPacket {
    pub reason_code: ReasonCode,
    pub properties: Properties,
}

impl DisconnectPacket {
    pub fn decode(body_len: u32, reader: &mut ByteReader) -> Result<Self, DecodeError> {
        if body_len == 0 {
            return Ok(DisconnectPacket {
                reason_code: ReasonCode::Success,
                properties: Properties::new(),
            });
        }
        let reason_code = ReasonCode::decode(reader)?;
        if !DISCONNECT_REASONS.contains(&reason_code) {
            return Err(DecodeError::InvalidReasonCode);
        }
        let properties = if body_len == 1 {
            Properties::new()
        } else {
            let properties = Properties::decode(reader)?;
            properties.validate(DISCONNECT_PROPERTIES)?;
            properties
        };
        Ok(DisconnectPacket {
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

    #[test]
    fn empty_body_means_normal_disconnection() {
        let mut reader = ByteReader::new(&[]);
        let decoded = DisconnectPacket::decode(0, &mut reader).unwrap();
        assert_eq!(decoded.reason_code, ReasonCode::Success);
        assert_eq!(decoded.wire_len(), 0);
    }

    #[test]
    fn round_trip_with_reason() {
        let packet = DisconnectPacket {
            reason_code: ReasonCode::ServerShuttingDown,
            properties: Properties::new(),
        };
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        assert_eq!(buf.len(), packet.wire_len());
        let mut reader = ByteReader::new(&buf);
        assert_eq!(
            DisconnectPacket::decode(buf.len() as u32, &mut reader).unwrap(),
            packet
        );
    }
}
