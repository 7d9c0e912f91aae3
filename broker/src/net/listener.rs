// Listener acceptor: wraps one `mio::net::TcpListener` per configured
// listener, handing accepted sockets to the selector as either a plain
// or TLS `Transport` (spec §4.2, §4.4).

use std::fs::File;
use std::io::BufReader;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use mio::net::TcpListener as MioTcpListener;
use mio::Token;

use crate::config::{Listener as ListenerConfig, Protocol};
use crate::error::{Error, ErrorKind};
use crate::net::transport::Transport;

/// A listening socket plus whatever it needs to hand off an accepted
/// connection: TLS server config when the listener is `mqtts`.
pub struct Acceptor {
    pub token: Token,
    pub listener: MioTcpListener,
    pub connect_timeout: Duration,
    pub allow_empty_client_id: bool,
    pub maximum_connections: usize,
    tls_config: Option<Arc<rustls::ServerConfig>>,
}

impl Acceptor {
    /// # Errors
    /// Returns an error if the address can't be bound, or (for an
    /// `mqtts` listener) if the certificate/key pair can't be loaded.
    pub fn bind(token: Token, config: &ListenerConfig) -> Result<Self, Error> {
        let addr: SocketAddr = config.address().parse().map_err(|err| {
            Error::new(
                ErrorKind::Config,
                format!("invalid listener address {}: {err}", config.address()),
            )
        })?;
        let listener = MioTcpListener::bind(addr)
            .map_err(|err| Error::new(ErrorKind::Transport, format!("bind failed: {err}")))?;

        let tls_config = match config.protocol() {
            Protocol::Mqtt => None,
            Protocol::Mqtts => Some(Arc::new(build_tls_config(config)?)),
        };

        Ok(Acceptor {
            token,
            listener,
            connect_timeout: Duration::from_millis(config.connect_timeout_ms()),
            allow_empty_client_id: config.allow_empty_client_id(),
            maximum_connections: config.maximum_connections(),
            tls_config,
        })
    }

    /// Accepts one pending connection and wraps it in the transport this
    /// listener's protocol requires.
    ///
    /// # Errors
    /// Returns an error on accept failure or TLS handshake setup failure.
    pub fn accept(&self) -> Result<(Transport, SocketAddr), Error> {
        let (stream, addr) = self.listener.accept()?;
        let transport = match &self.tls_config {
            None => Transport::plain(stream),
            Some(tls_config) => Transport::tls(stream, Arc::clone(tls_config))?,
        };
        Ok((transport, addr))
    }
}

fn build_tls_config(config: &ListenerConfig) -> Result<rustls::ServerConfig, Error> {
    let cert_path = config
        .cert_file()
        .ok_or_else(|| Error::new(ErrorKind::Config, "mqtts listener missing cert_file"))?;
    let key_path = config
        .key_file()
        .ok_or_else(|| Error::new(ErrorKind::Config, "mqtts listener missing key_file"))?;

    let cert_file = File::open(cert_path)
        .map_err(|err| Error::new(ErrorKind::Config, format!("opening {cert_path:?}: {err}")))?;
    let certs = rustls_pemfile::certs(&mut BufReader::new(cert_file))
        .map_err(|err| Error::new(ErrorKind::Config, format!("parsing {cert_path:?}: {err}")))?
        .into_iter()
        .map(rustls::Certificate)
        .collect::<Vec<_>>();

    let key_file = File::open(key_path)
        .map_err(|err| Error::new(ErrorKind::Config, format!("opening {key_path:?}: {err}")))?;
    let mut keys = rustls_pemfile::pkcs8_private_keys(&mut BufReader::new(key_file))
        .map_err(|err| Error::new(ErrorKind::Config, format!("parsing {key_path:?}: {err}")))?;
    let key = keys
        .pop()
        .ok_or_else(|| Error::new(ErrorKind::Config, format!("no private key in {key_path:?}")))?;

    rustls::ServerConfig::builder()
        .with_safe_defaults()
        .with_no_client_auth()
        .with_single_cert(certs, rustls::PrivateKey(key))
        .map_err(|err| Error::new(ErrorKind::Config, format!("invalid TLS cert/key pair: {err}")))
}
