// TLS variant of the raw socket wrapper (spec §4.4): "performs handshake
// transparently; once complete, it exposes the same readiness contract."
// `rustls::StreamOwned` layers record handling over the same
// `mio::net::TcpStream` that the plain variant drives directly, so one
// `mio::Token` registration (against the raw stream) serves either case.

use std::io::{self, Read, Write};
use std::net::SocketAddr;
use std::sync::Arc;

use mio::net::TcpStream;

/// Either a raw TCP stream or one wrapped in a TLS session. Both
/// implement `Read`/`Write` with the same non-blocking, partial-I/O
/// contract the selector loop expects.
pub enum Transport {
    Plain(TcpStream),
    Tls(Box<rustls::StreamOwned<rustls::ServerConnection, TcpStream>>),
}

impl Transport {
    #[must_use]
    pub fn plain(stream: TcpStream) -> Self {
        Transport::Plain(stream)
    }

    /// # Errors
    /// Returns an error if the rustls server connection can't be created
    /// from `config` (e.g. malformed cert chain).
    pub fn tls(stream: TcpStream, config: Arc<rustls::ServerConfig>) -> io::Result<Self> {
        let conn = rustls::ServerConnection::new(config)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
        Ok(Transport::Tls(Box::new(rustls::StreamOwned::new(
            conn, stream,
        ))))
    }

    #[must_use]
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        match self {
            Transport::Plain(stream) => stream.peer_addr().ok(),
            Transport::Tls(stream) => stream.sock.peer_addr().ok(),
        }
    }

    /// The raw socket mio registers readiness on; for the TLS variant
    /// record-layer reads/writes still ultimately go through this socket.
    pub fn raw_mut(&mut self) -> &mut TcpStream {
        match self {
            Transport::Plain(stream) => stream,
            Transport::Tls(stream) => &mut stream.sock,
        }
    }
}

impl Read for Transport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Transport::Plain(stream) => stream.read(buf),
            Transport::Tls(stream) => stream.read(buf),
        }
    }
}

impl Write for Transport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Transport::Plain(stream) => stream.write(buf),
            Transport::Tls(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Transport::Plain(stream) => stream.flush(),
            Transport::Tls(stream) => stream.flush(),
        }
    }
}
