// Copyright (c) 2020 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use crate::v5::{Properties, ReasonCode};
use crate::{
    ByteArray, DecodeError, DecodePacket, EncodeError, EncodePacket, FixedHeader, Packet,
    PacketType, VarIntError,
};

/// AUTH packet, MQTT 5.0 only, used for extended authentication exchanges.
#[allow(clippy::module_name_repetitions)]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AuthPacket {
    reason_code: ReasonCode,
    properties: Properties,
}

impl AuthPacket {
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
        if self.reason_code == ReasonCode::Success && self.properties.is_empty() {
            return FixedHeader::new(PacketType::Auth, 0);
        }
        let remaining_length = ReasonCode::bytes() + self.properties.bytes();
        FixedHeader::new(PacketType::Auth, remaining_length)
    }
}

impl DecodePacket for AuthPacket {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        let fixed_header = FixedHeader::decode(ba)?;
        if fixed_header.packet_type() != PacketType::Auth {
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

impl EncodePacket for AuthPacket {
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

impl Packet for AuthPacket {
    fn packet_type(&self) -> PacketType {
        PacketType::Auth
    }

    fn bytes(&self) -> Result<usize, VarIntError> {
        let fixed_header = self.get_fixed_header()?;
        Ok(fixed_header.bytes() + fixed_header.remaining_length())
    }
}
