// Copyright (c) 2020 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use byteorder::{BigEndian, ByteOrder};

use crate::error::{Error, ErrorKind};
use crate::fixed_header::{decode_string, encode_string, FixedHeader, PacketId, PacketType, QoS};

use super::{DecodePacket, EncodePacket};

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PublishPacket {
    pub dup: bool,
    pub qos: QoS,
    pub retain: bool,
    pub topic: String,
    pub packet_id: Option<PacketId>,
    pub payload: Vec<u8>,
}

impl PublishPacket {
    pub fn new(topic: &str, qos: QoS, payload: &[u8]) -> Self {
        PublishPacket {
            dup: false,
            qos,
            retain: false,
            topic: topic.to_owned(),
            packet_id: None,
            payload: payload.to_vec(),
        }
    }

    pub fn with_packet_id(mut self, packet_id: PacketId) -> Self {
        self.packet_id = Some(packet_id);
        self
    }
}

impl EncodePacket for PublishPacket {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, Error> {
        if self.qos != QoS::AtMostOnce && self.packet_id.is_none() {
            return Err(Error::new(
                ErrorKind::EncodeError,
                "PUBLISH at QoS 1 requires a packet id",
            ));
        }

        let old_len = buf.len();
        let mut remaining = Vec::new();
        encode_string(&self.topic, &mut remaining);
        if let Some(packet_id) = self.packet_id {
            let mut id_bytes = [0u8; 2];
            BigEndian::write_u16(&mut id_bytes, packet_id);
            remaining.extend_from_slice(&id_bytes);
        }
        remaining.extend_from_slice(&self.payload);

        let header = FixedHeader::new(
            PacketType::Publish {
                dup: self.dup,
                qos: self.qos,
                retain: self.retain,
            },
            remaining.len(),
        )?;
        header.encode(buf);
        buf.extend_from_slice(&remaining);
        Ok(buf.len() - old_len)
    }
}

impl DecodePacket for PublishPacket {
    fn decode(buf: &[u8]) -> Result<Self, Error> {
        let (header, mut offset) = FixedHeader::decode(buf)?;
        let (dup, qos, retain) = match header.packet_type {
            PacketType::Publish { dup, qos, retain } => (dup, qos, retain),
            _ => return Err(Error::new(ErrorKind::DecodeError, "expected PUBLISH packet")),
        };
        let payload_end = offset + header.remaining_length;

        let (topic, next) = decode_string(buf, offset)?;
        let topic = topic.to_owned();
        offset = next;

        let packet_id = if qos != QoS::AtMostOnce {
            if offset + 2 > buf.len() {
                return Err(Error::new(ErrorKind::DecodeError, "truncated PUBLISH packet id"));
            }
            let id = BigEndian::read_u16(&buf[offset..offset + 2]);
            offset += 2;
            Some(id)
        } else {
            None
        };

        if payload_end > buf.len() {
            return Err(Error::new(ErrorKind::DecodeError, "truncated PUBLISH payload"));
        }
        let payload = buf[offset..payload_end].to_vec();

        Ok(PublishPacket {
            dup,
            qos,
            retain,
            topic,
            packet_id,
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_at_most_once() {
        let packet = PublishPacket::new("a/b", QoS::AtMostOnce, b"hello");
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        let decoded = PublishPacket::decode(&buf).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn round_trip_at_least_once_carries_packet_id() {
        let packet = PublishPacket::new("a/b", QoS::AtLeastOnce, b"hello").with_packet_id(42);
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        let decoded = PublishPacket::decode(&buf).unwrap();
        assert_eq!(decoded.packet_id, Some(42));
        assert_eq!(decoded, packet);
    }

    #[test]
    fn encode_at_least_once_without_packet_id_is_rejected() {
        let packet = PublishPacket::new("a/b", QoS::AtLeastOnce, b"hello");
        let mut buf = Vec::new();
        assert!(packet.encode(&mut buf).is_err());
    }

    #[test]
    fn empty_payload_round_trips() {
        let packet = PublishPacket::new("a/b", QoS::AtMostOnce, b"");
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        let decoded = PublishPacket::decode(&buf).unwrap();
        assert!(decoded.payload.is_empty());
    }
}
