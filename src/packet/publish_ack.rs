// Copyright (c) 2020 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use byteorder::{BigEndian, ByteOrder};

use crate::error::{Error, ErrorKind};
use crate::fixed_header::{FixedHeader, PacketId, PacketType};

use super::{DecodePacket, EncodePacket};

/// Acknowledgement for a QoS 1 PUBLISH.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PublishAckPacket {
    pub packet_id: PacketId,
}

impl PublishAckPacket {
    pub fn new(packet_id: PacketId) -> Self {
        PublishAckPacket { packet_id }
    }
}

impl EncodePacket for PublishAckPacket {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, Error> {
        let old_len = buf.len();
        let header = FixedHeader::new(PacketType::PublishAck, 2)?;
        header.encode(buf);
        let mut id_bytes = [0u8; 2];
        BigEndian::write_u16(&mut id_bytes, self.packet_id);
        buf.extend_from_slice(&id_bytes);
        Ok(buf.len() - old_len)
    }
}

impl DecodePacket for PublishAckPacket {
    fn decode(buf: &[u8]) -> Result<Self, Error> {
        let (header, offset) = FixedHeader::decode(buf)?;
        if header.packet_type != PacketType::PublishAck {
            return Err(Error::new(ErrorKind::DecodeError, "expected PUBACK packet"));
        }
        if header.remaining_length != 2 || offset + 2 > buf.len() {
            return Err(Error::new(ErrorKind::DecodeError, "malformed PUBACK packet"));
        }
        let packet_id = BigEndian::read_u16(&buf[offset..offset + 2]);
        Ok(PublishAckPacket { packet_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let packet = PublishAckPacket::new(7);
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        let decoded = PublishAckPacket::decode(&buf).unwrap();
        assert_eq!(decoded, packet);
    }
}
