// Copyright (c) 2020 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use crate::error::{Error, ErrorKind};
use crate::fixed_header::{FixedHeader, PacketType};

use super::DecodePacket;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ConnectReturnCode {
    Accepted,
    UnacceptableProtocolVersion,
    IdentifierRejected,
    ServerUnavailable,
    BadUsernameOrPassword,
    NotAuthorized,
    Reserved(u8),
}

impl From<u8> for ConnectReturnCode {
    fn from(v: u8) -> Self {
        match v {
            0 => ConnectReturnCode::Accepted,
            1 => ConnectReturnCode::UnacceptableProtocolVersion,
            2 => ConnectReturnCode::IdentifierRejected,
            3 => ConnectReturnCode::ServerUnavailable,
            4 => ConnectReturnCode::BadUsernameOrPassword,
            5 => ConnectReturnCode::NotAuthorized,
            other => ConnectReturnCode::Reserved(other),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ConnectAckPacket {
    pub session_present: bool,
    pub return_code: ConnectReturnCode,
}

impl DecodePacket for ConnectAckPacket {
    fn decode(buf: &[u8]) -> Result<Self, Error> {
        let (header, mut offset) = FixedHeader::decode(buf)?;
        if header.packet_type != PacketType::ConnectAck {
            return Err(Error::new(ErrorKind::DecodeError, "expected CONNACK packet"));
        }
        if header.remaining_length != 2 {
            return Err(Error::new(ErrorKind::DecodeError, "CONNACK remaining length must be 2"));
        }
        let ack_flags = buf[offset];
        offset += 1;
        let session_present = ack_flags & 0b0000_0001 != 0;
        let return_code = ConnectReturnCode::from(buf[offset]);
        Ok(ConnectAckPacket {
            session_present,
            return_code,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_accepted() {
        let buf = [0x20, 0x02, 0x01, 0x00];
        let ack = ConnectAckPacket::decode(&buf).unwrap();
        assert!(ack.session_present);
        assert_eq!(ack.return_code, ConnectReturnCode::Accepted);
    }

    #[test]
    fn decode_identifier_rejected() {
        let buf = [0x20, 0x02, 0x00, 0x02];
        let ack = ConnectAckPacket::decode(&buf).unwrap();
        assert!(!ack.session_present);
        assert_eq!(ack.return_code, ConnectReturnCode::IdentifierRejected);
    }
}
