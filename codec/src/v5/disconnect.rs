// Copyright (c) 2020 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Lesser General Public License that can be found
// in the LICENSE file.

use crate::v5::{Properties, ReasonCode};
use crate::{
    ByteArray, DecodeError, DecodePacket, EncodeError, EncodePacket, FixedHeader, Packet,
    PacketType, VarIntError,
};

/// DISCONNECT packet, MQTT 5.0 variant: carries a reason code and properties.
#[allow(clippy::module_name_repetitions)]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DisconnectPacket {
    reason_code: ReasonCode,
    properties: Properties,
}

impl DisconnectPacket {
    #[must_use]
    pub fn new(reason_code: ReasonCode) -> Self {
        Self {
            reason_code,
            properties: Properties::new(),
        }
    }

    #[must_use]
    pub const fn reason_code(&self) -> ReasonCode {
        self.reason_code
    }

    #[must_use]
    pub const fn properties(&self) -> &Properties {
        &self.properties
    }

    pub fn properties_mut(&mut self) -> &mut Properties {
        &mut self.properties
    }

    fn get_fixed_header(&self) -> Result<FixedHeader, VarIntError> {
        // A DISCONNECT with Success reason and no properties may omit both
        // fields entirely (remaining length 0).
        if self.reason_code == ReasonCode::Success && self.properties.is_empty() {
            return FixedHeader::new(PacketType::Disconnect, 0);
        }
        let remaining_length = ReasonCode::bytes() + self.properties.bytes();
        FixedHeader::new(PacketType::Disconnect, remaining_length)
    }
}

impl DecodePacket for DisconnectPacket {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        let fixed_header = FixedHeader::decode(ba)?;
        if fixed_header.packet_type() != PacketType::Disconnect {
            return Err(DecodeError::InvalidPacketType);
        }

        if fixed_header.remaining_length() == 0 {
            return Ok(Self::new(ReasonCode::Success));
        }

        let reason_code = ReasonCode::decode(ba)?;
        let properties = if fixed_header.remaining_length() > ReasonCode::bytes() {
            Properties::decode(ba)?
        } else {
            Properties::new()
        };

        Ok(Self {
            reason_code,
            properties,
        })
    }
}

impl EncodePacket for DisconnectPacket {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        let old_len = buf.len();
        let fixed_header = self.get_fixed_header()?;
        fixed_header.encode(buf)?;

        if fixed_header.remaining_length() > 0 {
            self.reason_code.encode(buf)?;
            if fixed_header.remaining_length() > ReasonCode::bytes() {
                self.properties.encode(buf)?;
            }
        }

        Ok(buf.len() - old_len)
    }
}

impl Packet for DisconnectPacket {
    fn packet_type(&self) -> PacketType {
        PacketType::Disconnect
    }

    fn bytes(&self) -> Result<usize, VarIntError> {
        let fixed_header = self.get_fixed_header()?;
        Ok(fixed_header.bytes() + fixed_header.remaining_length())
    }
}
