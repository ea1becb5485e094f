// Copyright (c) 2020 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Affero General Public License that can be found
// in the LICENSE file.

use std::fmt::{self, Display};
use std::io;

/// Represent the types of errors.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Error occurred while performing I/O on the transport.
    IoError,

    /// Packet encode error.
    EncodeError,

    /// Packet decode error.
    DecodeError,

    /// The broker closed the connection or sent an unexpected reply.
    HandshakeError,

    /// Socket stream error, e.g. connect/recv timeout.
    SocketError,

    /// TLS configuration or handshake error.
    TlsError,

    /// Invalid client-supplied argument, e.g. an empty client id.
    InvalidArgument,

    /// Operation requires a connected client but the client is disconnected.
    NotConnected,
}

#[derive(Clone, Debug)]
pub struct Error {
    /// Type of current error.
    kind: ErrorKind,

    /// Detail message about this error.
    message: String,
}

impl Error {
    pub fn new(kind: ErrorKind, message: &str) -> Self {
        Error {
            kind,
            message: message.to_owned(),
        }
    }

    pub fn from_string(kind: ErrorKind, message: String) -> Self {
        Error { kind, message }
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => {
                Error::from_string(ErrorKind::SocketError, format!("recv timed out: {err}"))
            }
            _ => Error::from_string(ErrorKind::IoError, format!("{err}")),
        }
    }
}

#[cfg(feature = "tls")]
impl From<rustls::Error> for Error {
    fn from(err: rustls::Error) -> Self {
        Error::from_string(ErrorKind::TlsError, format!("{err}"))
    }
}
