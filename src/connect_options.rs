// Copyright (c) 2020 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Affero General Public License that can be found
// in the LICENSE file.

use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;

use crate::error::{Error, ErrorKind};

/// Username/password credentials sent in the CONNECT packet.
#[derive(Clone, Debug)]
pub struct UsernameAuth {
    pub username: String,
    pub password: String,
}

/// TLS settings used to build the secure transport. Certificate material is
/// passed through to the TLS capability unopened; this type does not parse it.
#[cfg(feature = "tls")]
#[derive(Clone, Debug, Default)]
pub struct TlsConfig {
    /// Server name used for SNI and certificate validation.
    pub domain: String,

    /// PEM-encoded additional root CA certificates, appended to the
    /// platform trust store loaded from `webpki-roots`.
    pub extra_root_certs_pem: Option<Vec<u8>>,
}

/// Message callback invoked on the reader thread for every PUBLISH the
/// broker delivers. Called with the topic and payload of the message.
pub type MessageCallback = Arc<dyn Fn(&str, &[u8]) + Send + Sync>;

/// Immutable connection configuration, built once before a client is
/// created. There is no global mutable state and no environment-variable
/// reading inside this crate; callers that want configuration from the
/// environment must read it themselves and pass it in here.
#[derive(Clone)]
pub struct ConnectOptions {
    address: SocketAddr,
    client_id: String,
    keepalive_secs: u16,
    clean_session: bool,
    auth: Option<UsernameAuth>,
    #[cfg(feature = "tls")]
    tls: Option<TlsConfig>,
    msg_cb: Option<MessageCallback>,
}

impl ConnectOptions {
    /// Start building options for a connection to `address`. The client
    /// identifier defaults to empty, which most brokers reject; callers
    /// should call [`ConnectOptionsBuilder::client_id`] before connecting.
    pub fn builder<A: ToSocketAddrs>(address: A) -> Result<ConnectOptionsBuilder, Error> {
        let mut addrs = address.to_socket_addrs().map_err(|err| {
            Error::from_string(
                ErrorKind::InvalidArgument,
                format!("failed to resolve broker address: {err}"),
            )
        })?;
        let address = addrs.next().ok_or_else(|| {
            Error::new(ErrorKind::InvalidArgument, "broker address resolved to no addresses")
        })?;
        Ok(ConnectOptionsBuilder {
            address,
            client_id: String::new(),
            keepalive_secs: 60,
            clean_session: true,
            auth: None,
            #[cfg(feature = "tls")]
            tls: None,
            msg_cb: None,
        })
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn keepalive_secs(&self) -> u16 {
        self.keepalive_secs
    }

    pub fn clean_session(&self) -> bool {
        self.clean_session
    }

    pub fn auth(&self) -> Option<&UsernameAuth> {
        self.auth.as_ref()
    }

    #[cfg(feature = "tls")]
    pub fn tls(&self) -> Option<&TlsConfig> {
        self.tls.as_ref()
    }

    pub fn msg_cb(&self) -> Option<&MessageCallback> {
        self.msg_cb.as_ref()
    }
}

/// Builder for [`ConnectOptions`]. Consumed by [`ConnectOptionsBuilder::build`],
/// which validates the accumulated fields and freezes them into an
/// immutable `ConnectOptions`.
pub struct ConnectOptionsBuilder {
    address: SocketAddr,
    client_id: String,
    keepalive_secs: u16,
    clean_session: bool,
    auth: Option<UsernameAuth>,
    #[cfg(feature = "tls")]
    tls: Option<TlsConfig>,
    msg_cb: Option<MessageCallback>,
}

impl ConnectOptionsBuilder {
    pub fn client_id(mut self, client_id: &str) -> Self {
        self.client_id = client_id.to_owned();
        self
    }

    pub fn keepalive_secs(mut self, keepalive_secs: u16) -> Self {
        self.keepalive_secs = keepalive_secs;
        self
    }

    pub fn clean_session(mut self, clean_session: bool) -> Self {
        self.clean_session = clean_session;
        self
    }

    pub fn credentials(mut self, username: &str, password: &str) -> Self {
        self.auth = Some(UsernameAuth {
            username: username.to_owned(),
            password: password.to_owned(),
        });
        self
    }

    #[cfg(feature = "tls")]
    pub fn tls(mut self, tls: TlsConfig) -> Self {
        self.tls = Some(tls);
        self
    }

    pub fn on_message<F>(mut self, cb: F) -> Self
    where
        F: Fn(&str, &[u8]) + Send + Sync + 'static,
    {
        self.msg_cb = Some(Arc::new(cb));
        self
    }

    pub fn build(self) -> Result<ConnectOptions, Error> {
        if self.client_id.is_empty() {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                "client_id must not be empty",
            ));
        }
        Ok(ConnectOptions {
            address: self.address,
            client_id: self.client_id,
            keepalive_secs: self.keepalive_secs,
            clean_session: self.clean_session,
            auth: self.auth,
            #[cfg(feature = "tls")]
            tls: self.tls,
            msg_cb: self.msg_cb,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_requires_client_id() {
        let err = ConnectOptions::builder(("127.0.0.1", 1883))
            .unwrap()
            .build()
            .unwrap_err();
        assert_eq!(*err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn build_succeeds_with_client_id() {
        let opts = ConnectOptions::builder(("127.0.0.1", 1883))
            .unwrap()
            .client_id("probe-1")
            .keepalive_secs(30)
            .build()
            .unwrap();
        assert_eq!(opts.client_id(), "probe-1");
        assert_eq!(opts.keepalive_secs(), 30);
        assert!(opts.clean_session());
    }
}
