// Copyright (c) 2020 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Lesser General Public License that can be found
// in the LICENSE file.

use crate::v5::{Properties, ReasonCode};
use crate::{
    ByteArray, DecodeError, DecodePacket, EncodeError, EncodePacket, FixedHeader, Packet,
    PacketId, PacketType, VarIntError,
};

/// Acknowledgement for a PUBLISH packet with QoS 1, MQTT 5.0 variant.
#[allow(clippy::module_name_repetitions)]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PublishAckPacket {
    packet_id: PacketId,
    reason_code: ReasonCode,
    properties: Properties,
}

impl PublishAckPacket {
    #[must_use]
    pub fn new(packet_id: PacketId, reason_code: ReasonCode) -> Self {
        Self {
            packet_id,
            reason_code,
            properties: Properties::new(),
        }
    }

    #[must_use]
    pub const fn packet_id(&self) -> PacketId {
        self.packet_id
    }

    #[must_use]
    pub const fn reason_code(&self) -> ReasonCode {
        self.reason_code
    }

    fn get_fixed_header(&self) -> Result<FixedHeader, VarIntError> {
        if self.reason_code == ReasonCode::Success && self.properties.is_empty() {
            return FixedHeader::new(PacketType::PublishAck, PacketId::bytes());
        }
        let remaining_length = PacketId::bytes() + ReasonCode::bytes() + self.properties.bytes();
        FixedHeader::new(PacketType::PublishAck, remaining_length)
    }
}

impl DecodePacket for PublishAckPacket {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        let fixed_header = FixedHeader::decode(ba)?;
        if fixed_header.packet_type() != PacketType::PublishAck {
            return Err(DecodeError::InvalidPacketType);
        }

        let packet_id = PacketId::decode(ba)?;

        if fixed_header.remaining_length() == PacketId::bytes() {
            return Ok(Self::new(packet_id, ReasonCode::Success));
        }

        let reason_code = ReasonCode::decode(ba)?;
        let properties = if fixed_header.remaining_length() > PacketId::bytes() + ReasonCode::bytes() {
            Properties::decode(ba)?
        } else {
            Properties::new()
        };

        Ok(Self {
            packet_id,
            reason_code,
            properties,
        })
    }
}

impl EncodePacket for PublishAckPacket {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        let old_len = buf.len();
        let fixed_header = self.get_fixed_header()?;
        fixed_header.encode(buf)?;

        self.packet_id.encode(buf)?;
        if fixed_header.remaining_length() > PacketId::bytes() {
            self.reason_code.encode(buf)?;
            if fixed_header.remaining_length() > PacketId::bytes() + ReasonCode::bytes() {
                self.properties.encode(buf)?;
            }
        }

        Ok(buf.len() - old_len)
    }
}

impl Packet for PublishAckPacket {
    fn packet_type(&self) -> PacketType {
        PacketType::PublishAck
    }

    fn bytes(&self) -> Result<usize, VarIntError> {
        let fixed_header = self.get_fixed_header()?;
        Ok(fixed_header.bytes() + fixed_header.remaining_length())
    }
}
