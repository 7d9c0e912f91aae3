//! `mossmq-broker`: the selector-driven event loop, TCP event handler,
//! broker core, session/subscription state and cluster plane for a
//! single-process MQTT 5 broker. Wire framing lives in `mossmq-codec`;
//! this crate owns everything above the byte stream.

pub mod auth;
pub mod broker;
pub mod config;
pub mod error;
pub mod net;
pub mod persistence;
pub mod session;
pub mod types;

pub use broker::BrokerCore;
pub use error::{Error, ErrorKind};
pub use net::Selector;
