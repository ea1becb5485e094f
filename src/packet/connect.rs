// Copyright (c) 2020 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use byteorder::{BigEndian, ByteOrder};

use crate::connect_options::ConnectOptions;
use crate::error::{Error, ErrorKind};
use crate::fixed_header::{decode_string, encode_string, FixedHeader, PacketType};

use super::{DecodePacket, EncodePacket};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
struct ConnectFlags {
    username: bool,
    password: bool,
    clean_session: bool,
}

impl ConnectFlags {
    fn encode(self) -> u8 {
        let username = u8::from(self.username) << 7;
        let password = u8::from(self.password) << 6;
        // Will, retain and will-QoS are always zero: this client never sends a will message.
        let clean_session = u8::from(self.clean_session) << 1;
        username | password | clean_session
    }
}

/// CONNECT packet. Always sent with an empty will, matching the Non-goal
/// that this client never publishes a will message.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ConnectPacket {
    pub client_id: String,
    pub keepalive: u16,
    pub clean_session: bool,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl ConnectPacket {
    pub fn from_options(options: &ConnectOptions) -> Self {
        let (username, password) = match options.auth() {
            Some(auth) => (Some(auth.username.clone()), Some(auth.password.clone())),
            None => (None, None),
        };
        ConnectPacket {
            client_id: options.client_id().to_owned(),
            keepalive: options.keepalive_secs(),
            clean_session: options.clean_session(),
            username,
            password,
        }
    }
}

impl EncodePacket for ConnectPacket {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, Error> {
        let old_len = buf.len();

        let flags = ConnectFlags {
            username: self.username.is_some(),
            password: self.password.is_some(),
            clean_session: self.clean_session,
        };

        let mut remaining = Vec::new();
        encode_string("MQTT", &mut remaining);
        remaining.push(4); // protocol level 4 == MQTT 3.1.1
        remaining.push(flags.encode());
        let mut keepalive_bytes = [0u8; 2];
        BigEndian::write_u16(&mut keepalive_bytes, self.keepalive);
        remaining.extend_from_slice(&keepalive_bytes);
        encode_string(&self.client_id, &mut remaining);
        if let Some(username) = &self.username {
            encode_string(username, &mut remaining);
        }
        if let Some(password) = &self.password {
            encode_string(password, &mut remaining);
        }

        let header = FixedHeader::new(PacketType::Connect, remaining.len())?;
        header.encode(buf);
        buf.extend_from_slice(&remaining);

        Ok(buf.len() - old_len)
    }
}

impl DecodePacket for ConnectPacket {
    fn decode(buf: &[u8]) -> Result<Self, Error> {
        let (header, mut offset) = FixedHeader::decode(buf)?;
        if header.packet_type != PacketType::Connect {
            return Err(Error::new(ErrorKind::DecodeError, "expected CONNECT packet"));
        }

        let (protocol_name, next) = decode_string(buf, offset)?;
        if protocol_name != "MQTT" {
            return Err(Error::new(ErrorKind::DecodeError, "unexpected protocol name"));
        }
        offset = next;

        let protocol_level = buf[offset];
        offset += 1;
        if protocol_level != 4 {
            return Err(Error::new(ErrorKind::DecodeError, "unsupported protocol level"));
        }

        let flags = buf[offset];
        offset += 1;
        let clean_session = flags & 0b0000_0010 != 0;
        let has_username = flags & 0b1000_0000 != 0;
        let has_password = flags & 0b0100_0000 != 0;

        let keepalive = BigEndian::read_u16(&buf[offset..offset + 2]);
        offset += 2;

        let (client_id, next) = decode_string(buf, offset)?;
        let client_id = client_id.to_owned();
        offset = next;

        let username = if has_username {
            let (s, next) = decode_string(buf, offset)?;
            offset = next;
            Some(s.to_owned())
        } else {
            None
        };
        let password = if has_password {
            let (s, _next) = decode_string(buf, offset)?;
            Some(s.to_owned())
        } else {
            None
        };

        Ok(ConnectPacket {
            client_id,
            keepalive,
            clean_session,
            username,
            password,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_with_credentials() {
        let packet = ConnectPacket {
            client_id: "probe-1".to_owned(),
            keepalive: 60,
            clean_session: true,
            username: Some("alice".to_owned()),
            password: Some("s3cr3t".to_owned()),
        };
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        let decoded = ConnectPacket::decode(&buf).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn round_trip_without_credentials() {
        let packet = ConnectPacket {
            client_id: "probe-2".to_owned(),
            keepalive: 30,
            clean_session: false,
            username: None,
            password: None,
        };
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        let decoded = ConnectPacket::decode(&buf).unwrap();
        assert_eq!(decoded, packet);
    }
}
