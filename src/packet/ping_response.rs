// Copyright (c) 2020 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use crate::error::{Error, ErrorKind};
use crate::fixed_header::{FixedHeader, PacketType};

use super::DecodePacket;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct PingResponsePacket;

impl DecodePacket for PingResponsePacket {
    fn decode(buf: &[u8]) -> Result<Self, Error> {
        let (header, _offset) = FixedHeader::decode(buf)?;
        if header.packet_type != PacketType::PingResponse {
            return Err(Error::new(ErrorKind::DecodeError, "expected PINGRESP packet"));
        }
        Ok(PingResponsePacket)
    }
}
