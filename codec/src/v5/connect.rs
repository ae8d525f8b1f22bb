// Copyright (c) 2020 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use crate::utils::{validate_client_id, validate_keep_alive};
use crate::v5::Properties;
use crate::{
    BinaryData, ByteArray, ConnectFlags, DecodeError, DecodePacket, EncodeError, EncodePacket,
    FixedHeader, KeepAlive, Packet, PacketType, ProtocolLevel, PubTopic, QoS, StringData,
    VarIntError,
};

const PROTOCOL_NAME: &str = "MQTT";

/// CONNECT packet, MQTT 5.0 variant: carries a `Properties` list after the
/// variable header and another before the Will payload.
#[allow(clippy::module_name_repetitions)]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConnectPacket {
    connect_flags: ConnectFlags,
    keep_alive: KeepAlive,
    properties: Properties,
    client_id: StringData,
    will_properties: Properties,
    will_topic: Option<PubTopic>,
    will_message: Option<BinaryData>,
    username: Option<StringData>,
    password: Option<BinaryData>,
}

impl ConnectPacket {
    /// # Errors
    ///
    /// Returns error if `client_id` is invalid.
    pub fn new(client_id: &str) -> Result<Self, EncodeError> {
        validate_client_id(client_id)?;
        Ok(Self {
            connect_flags: ConnectFlags::default(),
            keep_alive: KeepAlive::new(60),
            properties: Properties::new(),
            client_id: StringData::from(client_id)?,
            will_properties: Properties::new(),
            will_topic: None,
            will_message: None,
            username: None,
            password: None,
        })
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        self.client_id.as_ref()
    }

    pub fn set_clean_start(&mut self, clean_start: bool) -> &mut Self {
        self.connect_flags.set_clean_session(clean_start);
        self
    }

    #[must_use]
    pub const fn clean_start(&self) -> bool {
        self.connect_flags.clean_session()
    }

    pub fn set_keep_alive(&mut self, keep_alive: u16) -> &mut Self {
        self.keep_alive = KeepAlive::new(keep_alive);
        self
    }

    #[must_use]
    pub const fn keep_alive(&self) -> u16 {
        self.keep_alive.value()
    }

    #[must_use]
    pub const fn properties(&self) -> &Properties {
        &self.properties
    }

    pub fn properties_mut(&mut self) -> &mut Properties {
        &mut self.properties
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
    pub fn username(&self) -> Option<&str> {
        self.username.as_ref().map(AsRef::as_ref)
    }

    fn get_fixed_header(&self) -> Result<FixedHeader, VarIntError> {
        let mut remaining_length = 2
            + PROTOCOL_NAME.len()
            + 1 // protocol level
            + ConnectFlags::bytes()
            + KeepAlive::bytes()
            + self.properties.bytes()
            + self.client_id.bytes();

        if self.connect_flags.will() {
            remaining_length += self.will_properties.bytes();
        }
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
        if protocol_name.as_ref() != PROTOCOL_NAME {
            return Err(DecodeError::InvalidProtocolName);
        }

        let protocol_level = ProtocolLevel::decode(ba)?;
        if protocol_level != ProtocolLevel::V5 {
            return Err(DecodeError::InvalidProtocolLevel);
        }

        let connect_flags = ConnectFlags::decode(ba)?;
        let keep_alive = KeepAlive::decode(ba)?;
        validate_keep_alive(keep_alive)?;

        let properties = Properties::decode(ba)?;
        let client_id = StringData::decode(ba)?;

        let will_properties = if connect_flags.will() {
            Properties::decode(ba)?
        } else {
            Properties::new()
        };
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
            connect_flags,
            keep_alive,
            properties,
            client_id,
            will_properties,
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

        StringData::from(PROTOCOL_NAME)?.encode(v)?;
        ProtocolLevel::V5.encode(v)?;
        self.connect_flags.encode(v)?;
        self.keep_alive.encode(v)?;
        self.properties.encode(v)?;
        self.client_id.encode(v)?;

        if self.connect_flags.will() {
            self.will_properties.encode(v)?;
        }
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
