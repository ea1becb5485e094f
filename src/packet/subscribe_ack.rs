// Copyright (c) 2020 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use byteorder::{BigEndian, ByteOrder};

use crate::error::{Error, ErrorKind};
use crate::fixed_header::{FixedHeader, PacketId, PacketType, QoS};

use super::DecodePacket;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SubscribeAckPacket {
    pub packet_id: PacketId,
    pub granted: Option<QoS>,
}

impl DecodePacket for SubscribeAckPacket {
    fn decode(buf: &[u8]) -> Result<Self, Error> {
        let (header, mut offset) = FixedHeader::decode(buf)?;
        if header.packet_type != PacketType::SubscribeAck {
            return Err(Error::new(ErrorKind::DecodeError, "expected SUBACK packet"));
        }
        if header.remaining_length != 3 || offset + 3 > buf.len() {
            return Err(Error::new(ErrorKind::DecodeError, "malformed SUBACK packet"));
        }
        let packet_id = BigEndian::read_u16(&buf[offset..offset + 2]);
        offset += 2;
        let code = buf[offset];
        let granted = if code & 0x80 != 0 {
            None
        } else {
            Some(QoS::from_bits(code & 0x03)?)
        };
        Ok(SubscribeAckPacket { packet_id, granted })
    }
}
