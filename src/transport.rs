// Copyright (c) 2022 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Affero General Public License that can be found
// in the LICENSE file.

//! Byte-stream capability the session core talks to the broker through.
//!
//! Connecting yields an independent read half and write half rather than
//! one duplex handle: the reader thread owns its half outright and never
//! shares it with the facade, so a blocking poll on it can never be held
//! up behind (or hold up) a `publish`/`subscribe` call serialized on the
//! client's state lock.

use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::connect_options::ConnectOptions;
use crate::error::Error;

/// Outbound half of a byte stream to the broker: write and teardown only.
pub trait TransportWriter: Send {
    fn send(&mut self, buf: &[u8]) -> io::Result<usize>;

    fn close(&mut self);
}

/// Inbound half of a byte stream to the broker. Owned exclusively by the
/// reader thread; implementations do not interpret MQTT framing, they only
/// move bytes and enforce the read timeout.
pub trait TransportReader: Send {
    /// Read whatever is available within `timeout`. A timeout with nothing
    /// read is reported as `io::ErrorKind::WouldBlock` or `TimedOut`, which
    /// the caller treats as "nothing arrived this poll", not an error.
    fn recv(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize>;
}

/// Plain, unencrypted TCP transport. The two halves are independent
/// `TcpStream` handles obtained from `try_clone`, which duplicates the
/// underlying socket descriptor rather than sharing a lock: reads on one
/// handle and writes on the other proceed concurrently at the OS level,
/// and closing either handle (via `shutdown`) tears down the whole socket.
pub struct TcpWriter {
    socket: TcpStream,
}

pub struct TcpReader {
    socket: TcpStream,
}

impl TcpWriter {
    pub fn connect(
        addr: std::net::SocketAddr,
        connect_timeout: Duration,
    ) -> io::Result<(Self, TcpReader)> {
        let socket = TcpStream::connect_timeout(&addr, connect_timeout)?;
        socket.set_nodelay(true)?;
        let reader_socket = socket.try_clone()?;
        Ok((TcpWriter { socket }, TcpReader { socket: reader_socket }))
    }
}

impl TransportWriter for TcpWriter {
    fn send(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.socket.write_all(buf)?;
        Ok(buf.len())
    }

    fn close(&mut self) {
        let _ = self.socket.shutdown(std::net::Shutdown::Both);
    }
}

impl TransportReader for TcpReader {
    fn recv(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        self.socket.set_read_timeout(Some(timeout))?;
        self.socket.read(buf)
    }
}

/// TLS-wrapped TCP transport, backed by a blocking `rustls::StreamOwned`.
/// The session core is thread-based, so this uses plain `rustls` rather
/// than `tokio-rustls`; `rustls-pemfile` and `webpki-roots` supply the
/// trust anchors the handshake validates against.
///
/// Unlike the plain TCP transport, the two halves here share one
/// `rustls::ClientConnection` behind a private mutex: TLS record
/// encryption/decryption is stateful and is not splittable the way a raw
/// socket is. That mutex belongs to this transport alone, never to the
/// client's state lock, so a blocking `recv` on a TLS connection cannot
/// stall an unrelated `phase`/`keepalive` read; it can only stall a
/// concurrent `send` on the same TLS session, which is an inherent cost
/// of sharing one TLS record layer rather than a defect in the split.
#[cfg(feature = "tls")]
struct TlsInner {
    stream: rustls::StreamOwned<rustls::ClientConnection, TcpStream>,
}

#[cfg(feature = "tls")]
pub struct TlsWriter {
    inner: Arc<Mutex<TlsInner>>,
}

#[cfg(feature = "tls")]
pub struct TlsReader {
    inner: Arc<Mutex<TlsInner>>,
}

#[cfg(feature = "tls")]
impl TlsWriter {
    pub fn connect(
        addr: std::net::SocketAddr,
        connect_timeout: Duration,
        tls_config: &crate::connect_options::TlsConfig,
    ) -> Result<(Self, TlsReader), Error> {
        let mut root_store = rustls::RootCertStore::empty();
        root_store.add_trust_anchors(webpki_roots::TLS_SERVER_ROOTS.iter().map(|ta| {
            rustls::OwnedTrustAnchor::from_subject_spki_name_constraints(
                ta.subject,
                ta.spki,
                ta.name_constraints,
            )
        }));
        if let Some(extra_pem) = &tls_config.extra_root_certs_pem {
            let mut reader = io::BufReader::new(extra_pem.as_slice());
            for cert in rustls_pemfile::certs(&mut reader)
                .map_err(|err| Error::from(io::Error::from(err)))?
            {
                root_store
                    .add(&rustls::Certificate(cert))
                    .map_err(Error::from)?;
            }
        }

        let config = rustls::ClientConfig::builder()
            .with_safe_defaults()
            .with_root_certificates(root_store)
            .with_no_client_auth();

        let server_name: rustls::ServerName = tls_config
            .domain
            .as_str()
            .try_into()
            .map_err(|_| Error::from(rustls::Error::General("invalid server name".into())))?;

        let connection = rustls::ClientConnection::new(std::sync::Arc::new(config), server_name)
            .map_err(Error::from)?;
        let socket = TcpStream::connect_timeout(&addr, connect_timeout)
            .map_err(Error::from)?;
        socket.set_nodelay(true).map_err(Error::from)?;

        let inner = Arc::new(Mutex::new(TlsInner {
            stream: rustls::StreamOwned::new(connection, socket),
        }));
        Ok((
            TlsWriter { inner: Arc::clone(&inner) },
            TlsReader { inner },
        ))
    }
}

#[cfg(feature = "tls")]
impl TransportWriter for TlsWriter {
    fn send(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut inner = self.inner.lock().unwrap();
        inner.stream.write_all(buf)?;
        Ok(buf.len())
    }

    fn close(&mut self) {
        let inner = self.inner.lock().unwrap();
        let _ = inner.stream.sock.shutdown(std::net::Shutdown::Both);
    }
}

#[cfg(feature = "tls")]
impl TransportReader for TlsReader {
    fn recv(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        let mut inner = self.inner.lock().unwrap();
        inner.stream.sock.set_read_timeout(Some(timeout))?;
        inner.stream.read(buf)
    }
}

/// Build the transport halves implied by `options`: plain TCP, or TLS when
/// both the `tls` feature is enabled and the options carry a `TlsConfig`.
pub fn connect(
    options: &ConnectOptions,
    connect_timeout: Duration,
) -> Result<(Box<dyn TransportWriter>, Box<dyn TransportReader>), Error> {
    #[cfg(feature = "tls")]
    if let Some(tls_config) = options.tls() {
        let (writer, reader) = TlsWriter::connect(options.address(), connect_timeout, tls_config)?;
        return Ok((Box::new(writer), Box::new(reader)));
    }
    let (writer, reader) = TcpWriter::connect(options.address(), connect_timeout)?;
    Ok((Box::new(writer), Box::new(reader)))
}
