use serde::Deserialize;
use std::net::ToSocketAddrs;
use std::path::PathBuf;

use crate::error::{Error, ErrorKind};

/// Transport a listener accepts connections over. Spec §4.4 calls TLS "a
/// replacement socket wrapper offering the same readiness interface";
/// `Tls` selects that wrapper at accept time.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    #[serde(alias = "mqtt")]
    Mqtt,
    #[serde(alias = "mqtts")]
    Mqtts,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Listener {
    #[serde(default = "Listener::default_address")]
    address: String,

    #[serde(default = "Listener::default_protocol")]
    protocol: Protocol,

    #[serde(default = "Listener::default_cert_file")]
    cert_file: Option<PathBuf>,

    #[serde(default = "Listener::default_key_file")]
    key_file: Option<PathBuf>,

    #[serde(default = "Listener::default_maximum_connections")]
    maximum_connections: usize,

    #[serde(default = "Listener::default_connect_timeout_ms")]
    connect_timeout_ms: u64,

    /// MAY allow a Client to supply a ClientID that has a length of zero
    /// bytes; the broker assigns a generated id when set.
    #[serde(default = "Listener::default_allow_empty_client_id")]
    allow_empty_client_id: bool,
}

impl Listener {
    #[must_use]
    pub fn default_listeners() -> Vec<Self> {
        vec![Self::default()]
    }

    #[must_use]
    pub fn default_address() -> String {
        "0.0.0.0:1883".to_string()
    }

    #[must_use]
    pub const fn default_protocol() -> Protocol {
        Protocol::Mqtt
    }

    #[must_use]
    pub const fn default_cert_file() -> Option<PathBuf> {
        None
    }

    #[must_use]
    pub const fn default_key_file() -> Option<PathBuf> {
        None
    }

    #[must_use]
    pub const fn default_maximum_connections() -> usize {
        0
    }

    #[must_use]
    pub const fn default_connect_timeout_ms() -> u64 {
        30_000
    }

    #[must_use]
    pub const fn default_allow_empty_client_id() -> bool {
        false
    }

    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Overrides the listener's bind address, e.g. from a `--bind-address`
    /// CLI flag.
    pub fn set_address(&mut self, address: String) {
        self.address = address;
    }

    #[must_use]
    pub const fn protocol(&self) -> Protocol {
        self.protocol
    }

    #[must_use]
    pub fn cert_file(&self) -> Option<&PathBuf> {
        self.cert_file.as_ref()
    }

    #[must_use]
    pub fn key_file(&self) -> Option<&PathBuf> {
        self.key_file.as_ref()
    }

    #[must_use]
    pub const fn maximum_connections(&self) -> usize {
        self.maximum_connections
    }

    #[must_use]
    pub const fn connect_timeout_ms(&self) -> u64 {
        self.connect_timeout_ms
    }

    #[must_use]
    pub const fn allow_empty_client_id(&self) -> bool {
        self.allow_empty_client_id
    }

    /// # Errors
    /// Returns an error if the listener address doesn't parse, or if a
    /// TLS listener is missing its cert/key pair.
    pub fn validate(&self, bind_address: bool) -> Result<(), Error> {
        if bind_address {
            let _socket = std::net::TcpListener::bind(&self.address).map_err(|err| {
                Error::new(
                    ErrorKind::Config,
                    format!("failed to bind {}: {err}", self.address),
                )
            })?;
        } else {
            self.address.to_socket_addrs().map_err(|err| {
                Error::new(
                    ErrorKind::Config,
                    format!("invalid socket address {}: {err}", self.address),
                )
            })?;
        }
        if self.protocol == Protocol::Mqtts && (self.cert_file.is_none() || self.key_file.is_none())
        {
            return Err(Error::new(
                ErrorKind::Config,
                "mqtts listener requires cert_file and key_file",
            ));
        }
        Ok(())
    }
}

impl Default for Listener {
    fn default() -> Self {
        Self {
            address: Self::default_address(),
            protocol: Self::default_protocol(),
            cert_file: Self::default_cert_file(),
            key_file: Self::default_key_file(),
            maximum_connections: Self::default_maximum_connections(),
            connect_timeout_ms: Self::default_connect_timeout_ms(),
            allow_empty_client_id: Self::default_allow_empty_client_id(),
        }
    }
}
