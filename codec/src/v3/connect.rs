// Copyright (c) 2020 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use crate::utils::{validate_client_id, validate_keep_alive};
use crate::{
    BinaryData, ByteArray, ConnectFlags, DecodeError, DecodePacket, EncodeError, EncodePacket,
    FixedHeader, KeepAlive, Packet, PacketType, ProtocolLevel, PubTopic, QoS, StringData,
    VarIntError,
};

const PROTOCOL_NAME: &str = "MQTT";

/// The CONNECT packet is the first packet sent from a Client to the Server
/// after the network connection is established [MQTT-3.1.0-1].
#[allow(clippy::module_name_repetitions)]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectPacket {
    protocol_level: ProtocolLevel,
    connect_flags: ConnectFlags,
    keep_alive: KeepAlive,
    client_id: StringData,
    will_topic: Option<PubTopic>,
    will_message: Option<BinaryData>,
    username: Option<StringData>,
    password: Option<BinaryData>,
}

impl ConnectPacket {
    /// Create a new connect packet with `client_id`.
    ///
    /// # Errors
    ///
    /// Returns error if `client_id` is invalid.
    pub fn new(client_id: &str) -> Result<Self, EncodeError> {
        validate_client_id(client_id)?;
        Ok(Self {
            protocol_level: ProtocolLevel::V311,
            connect_flags: ConnectFlags::default(),
            keep_alive: KeepAlive::new(60),
            client_id: StringData::from(client_id).map_err(|_e| EncodeError::InvalidClientId)?,
            will_topic: None,
            will_message: None,
            username: None,
            password: None,
        })
    }

    #[must_use]
    pub const fn protocol_level(&self) -> ProtocolLevel {
        self.protocol_level
    }

    pub fn set_client_id(&mut self, client_id: &str) -> Result<&mut Self, EncodeError> {
        validate_client_id(client_id)?;
        self.client_id = StringData::from(client_id).map_err(|_e| EncodeError::InvalidClientId)?;
        Ok(self)
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        self.client_id.as_ref()
    }

    pub fn set_keep_alive(&mut self, keep_alive: u16) -> &mut Self {
        self.keep_alive = KeepAlive::new(keep_alive);
        self
    }

    #[must_use]
    pub const fn keep_alive(&self) -> u16 {
        self.keep_alive.value()
    }

    pub fn set_clean_session(&mut self, clean_session: bool) -> &mut Self {
        self.connect_flags.set_clean_session(clean_session);
        self
    }

    #[must_use]
    pub const fn clean_session(&self) -> bool {
        self.connect_flags.clean_session()
    }

    /// Set the Will message.
    ///
    /// # Errors
    ///
    /// Returns error if `topic` is invalid or `message` is too large.
    pub fn set_will(
        &mut self,
        topic: &str,
        message: &[u8],
        qos: QoS,
        retain: bool,
    ) -> Result<&mut Self, EncodeError> {
        self.will_topic = Some(PubTopic::new(topic)?);
        self.will_message = Some(BinaryData::from_slice(message)?);
        self.connect_flags.set_will(true);
        self.connect_flags.set_will_qos(qos);
        self.connect_flags.set_will_retain(retain);
        Ok(self)
    }

    #[must_use]
    pub fn will_topic(&self) -> Option<&str> {
        self.will_topic.as_ref().map(AsRef::as_ref)
    }

    #[must_use]
    pub fn will_message(&self) -> Option<&[u8]> {
        self.will_message.as_ref().map(AsRef::as_ref)
    }

    /// Set username/password credentials.
    ///
    /// # Errors
    ///
    /// Returns error if `username` is invalid or `password` is too large.
    pub fn set_credentials(
        &mut self,
        username: &str,
        password: Option<&[u8]>,
    ) -> Result<&mut Self, EncodeError> {
        self.username = Some(StringData::from(username).map_err(|_e| EncodeError::InvalidUtf8String)?);
        self.connect_flags.set_has_username(true);
        if let Some(password) = password {
            self.password = Some(BinaryData::from_slice(password)?);
            self.connect_flags.set_has_password(true);
        }
        Ok(self)
    }

    #[must_use]
    pub fn username(&self) -> Option<&str> {
        self.username.as_ref().map(AsRef::as_ref)
    }

    #[must_use]
    pub fn password(&self) -> Option<&[u8]> {
        self.password.as_ref().map(AsRef::as_ref)
    }

    fn get_fixed_header(&self) -> Result<FixedHeader, VarIntError> {
        let mut remaining_length = 2
            + PROTOCOL_NAME.len()
            + self.protocol_level.bytes()
            + ConnectFlags::bytes()
            + KeepAlive::bytes()
            + self.client_id.bytes();

        if let Some(topic) = &self.will_topic {
            remaining_length += topic.bytes();
        }
        if let Some(message) = &self.will_message {
            remaining_length += message.bytes();
        }
        if let Some(username) = &self.username {
            remaining_length += username.bytes();
        }
        if let Some(password) = &self.password {
            remaining_length += password.bytes();
        }

        FixedHeader::new(PacketType::Connect, remaining_length)
    }
}

impl DecodePacket for ConnectPacket {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        let fixed_header = FixedHeader::decode(ba)?;
        if fixed_header.packet_type() != PacketType::Connect {
            return Err(DecodeError::InvalidPacketType);
        }

        let protocol_name = StringData::decode(ba)?;
        // The Protocol Name MUST be "MQTT" [MQTT-3.1.2-1].
        if protocol_name.as_ref() != PROTOCOL_NAME {
            return Err(DecodeError::InvalidProtocolName);
        }

        let protocol_level = ProtocolLevel::decode(ba)?;
        if protocol_level != ProtocolLevel::V311 {
            return Err(DecodeError::InvalidProtocolLevel);
        }

        let connect_flags = ConnectFlags::decode(ba)?;
        let keep_alive = KeepAlive::decode(ba)?;
        validate_keep_alive(keep_alive)?;

        let client_id = StringData::decode(ba)?;

        let will_topic = if connect_flags.will() {
            Some(PubTopic::decode(ba)?)
        } else {
            None
        };
        let will_message = if connect_flags.will() {
            Some(BinaryData::decode(ba)?)
        } else {
            None
        };

        let username = if connect_flags.has_username() {
            Some(StringData::decode(ba)?)
        } else {
            None
        };
        let password = if connect_flags.has_password() {
            Some(BinaryData::decode(ba)?)
        } else {
            None
        };

        Ok(Self {
            protocol_level,
            connect_flags,
            keep_alive,
            client_id,
            will_topic,
            will_message,
            username,
            password,
        })
    }
}

impl EncodePacket for ConnectPacket {
    fn encode(&self, v: &mut Vec<u8>) -> Result<usize, EncodeError> {
        let old_len = v.len();

        let fixed_header = self.get_fixed_header()?;
        fixed_header.encode(v)?;

        StringData::from(PROTOCOL_NAME)
            .map_err(|_e| EncodeError::InvalidUtf8String)?
            .encode(v)?;
        self.protocol_level.encode(v)?;
        self.connect_flags.encode(v)?;
        self.keep_alive.encode(v)?;
        self.client_id.encode(v)?;

        if let Some(topic) = &self.will_topic {
            topic.encode(v)?;
        }
        if let Some(message) = &self.will_message {
            message.encode(v)?;
        }
        if let Some(username) = &self.username {
            username.encode(v)?;
        }
        if let Some(password) = &self.password {
            password.encode(v)?;
        }

        Ok(v.len() - old_len)
    }
}

impl Packet for ConnectPacket {
    fn packet_type(&self) -> PacketType {
        PacketType::Connect
    }

    fn bytes(&self) -> Result<usize, VarIntError> {
        let fixed_header = self.get_fixed_header()?;
        Ok(fixed_header.bytes() + fixed_header.remaining_length())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let mut packet = ConnectPacket::new("client-01").unwrap();
        packet.set_keep_alive(30);
        packet.set_clean_session(true);
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();

        let mut ba = ByteArray::new(&buf);
        let decoded = ConnectPacket::decode(&mut ba).unwrap();
        assert_eq!(decoded.client_id(), "client-01");
        assert_eq!(decoded.keep_alive(), 30);
        assert!(decoded.clean_session());
    }
}
