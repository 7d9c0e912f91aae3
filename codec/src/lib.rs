//! Wire codec for MQTT version 5 control packets: no networking, no
//! session state, just bytes in, typed packets out and back.

pub mod bytes;
pub mod error;
pub mod header;
pub mod packet;
pub mod property;
pub mod qos;
pub mod reason_code;
pub mod topic;

pub use error::{DecodeError, EncodeError};
pub use header::{FixedHeader, PacketType};
pub use packet::ControlPacket;
pub use property::{Properties, Property, PropertyType};
pub use qos::QoS;
pub use reason_code::ReasonCode;
