// Copyright (c) 2020 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use byteorder::{BigEndian, ByteOrder};

use crate::error::Error;
use crate::fixed_header::{encode_string, FixedHeader, PacketId, PacketType, QoS};

use super::EncodePacket;

/// SUBSCRIBE packet carrying exactly one topic filter.
///
/// The original allows a single filter per SUBSCRIBE call; a client that
/// wants several subscriptions sends several packets, one per filter, which
/// is also how the reconnect-resubscribe loop replays the registry.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SubscribePacket {
    pub topic_filter: String,
    pub qos: QoS,
    pub packet_id: PacketId,
}

impl SubscribePacket {
    pub fn new(topic_filter: &str, qos: QoS, packet_id: PacketId) -> Self {
        SubscribePacket {
            topic_filter: topic_filter.to_owned(),
            qos,
            packet_id,
        }
    }
}

impl EncodePacket for SubscribePacket {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, Error> {
        let old_len = buf.len();
        let mut remaining = Vec::new();
        let mut id_bytes = [0u8; 2];
        BigEndian::write_u16(&mut id_bytes, self.packet_id);
        remaining.extend_from_slice(&id_bytes);
        encode_string(&self.topic_filter, &mut remaining);
        remaining.push(self.qos.bits());

        let header = FixedHeader::new(PacketType::Subscribe, remaining.len())?;
        header.encode(buf);
        buf.extend_from_slice(&remaining);
        Ok(buf.len() - old_len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_shape() {
        let packet = SubscribePacket::new("a/b", QoS::AtLeastOnce, 1);
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        // type/flags byte, remaining length, 2-byte packet id, 2-byte topic
        // length, topic bytes, requested qos byte.
        assert_eq!(buf[0], 0x82);
        assert_eq!(buf.last(), Some(&1u8));
    }
}
