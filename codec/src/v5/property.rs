// Copyright (c) 2020 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use std::convert::TryFrom;

use crate::{
    BinaryData, ByteArray, DecodeError, DecodePacket, EncodeError, EncodePacket, StringData,
    StringPairData, VarInt,
};

/// Identifies a property field on the wire, encoded as a single variable
/// byte integer (values used by the spec all fit in one byte).
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PropertyType {
    PayloadFormatIndicator = 0x01,
    MessageExpiryInterval = 0x02,
    ContentType = 0x03,
    ResponseTopic = 0x08,
    CorrelationData = 0x09,
    SubscriptionIdentifier = 0x0b,
    SessionExpiryInterval = 0x11,
    AssignedClientIdentifier = 0x12,
    ServerKeepAlive = 0x13,
    AuthenticationMethod = 0x15,
    AuthenticationData = 0x16,
    RequestProblemInformation = 0x17,
    WillDelayInterval = 0x18,
    RequestResponseInformation = 0x19,
    ResponseInformation = 0x1a,
    ServerReference = 0x1c,
    ReasonString = 0x1f,
    ReceiveMaximum = 0x21,
    TopicAliasMaximum = 0x22,
    TopicAlias = 0x23,
    MaximumQoS = 0x24,
    RetainAvailable = 0x25,
    UserProperty = 0x26,
    MaximumPacketSize = 0x27,
    WildcardSubscriptionAvailable = 0x28,
    SubscriptionIdentifierAvailable = 0x29,
    SharedSubscriptionAvailable = 0x2a,
}

impl TryFrom<u8> for PropertyType {
    type Error = DecodeError;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0x01 => Ok(Self::PayloadFormatIndicator),
            0x02 => Ok(Self::MessageExpiryInterval),
            0x03 => Ok(Self::ContentType),
            0x08 => Ok(Self::ResponseTopic),
            0x09 => Ok(Self::CorrelationData),
            0x0b => Ok(Self::SubscriptionIdentifier),
            0x11 => Ok(Self::SessionExpiryInterval),
            0x12 => Ok(Self::AssignedClientIdentifier),
            0x13 => Ok(Self::ServerKeepAlive),
            0x15 => Ok(Self::AuthenticationMethod),
            0x16 => Ok(Self::AuthenticationData),
            0x17 => Ok(Self::RequestProblemInformation),
            0x18 => Ok(Self::WillDelayInterval),
            0x19 => Ok(Self::RequestResponseInformation),
            0x1a => Ok(Self::ResponseInformation),
            0x1c => Ok(Self::ServerReference),
            0x1f => Ok(Self::ReasonString),
            0x21 => Ok(Self::ReceiveMaximum),
            0x22 => Ok(Self::TopicAliasMaximum),
            0x23 => Ok(Self::TopicAlias),
            0x24 => Ok(Self::MaximumQoS),
            0x25 => Ok(Self::RetainAvailable),
            0x26 => Ok(Self::UserProperty),
            0x27 => Ok(Self::MaximumPacketSize),
            0x28 => Ok(Self::WildcardSubscriptionAvailable),
            0x29 => Ok(Self::SubscriptionIdentifierAvailable),
            0x2a => Ok(Self::SharedSubscriptionAvailable),
            _ => Err(DecodeError::InvalidPropertyType),
        }
    }
}

/// A single decoded property value. One `PropertyType` maps to exactly one
/// variant shape here; `user_property` is the only one that may repeat
/// freely within a property list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Property {
    PayloadFormatIndicator(u8),
    MessageExpiryInterval(u32),
    ContentType(StringData),
    ResponseTopic(StringData),
    CorrelationData(BinaryData),
    SubscriptionIdentifier(usize),
    SessionExpiryInterval(u32),
    AssignedClientIdentifier(StringData),
    ServerKeepAlive(u16),
    AuthenticationMethod(StringData),
    AuthenticationData(BinaryData),
    RequestProblemInformation(u8),
    WillDelayInterval(u32),
    RequestResponseInformation(u8),
    ResponseInformation(StringData),
    ServerReference(StringData),
    ReasonString(StringData),
    ReceiveMaximum(u16),
    TopicAliasMaximum(u16),
    TopicAlias(u16),
    MaximumQoS(u8),
    RetainAvailable(bool),
    UserProperty(StringPairData),
    MaximumPacketSize(u32),
    WildcardSubscriptionAvailable(bool),
    SubscriptionIdentifierAvailable(bool),
    SharedSubscriptionAvailable(bool),
}

impl Property {
    #[must_use]
    pub const fn property_type(&self) -> PropertyType {
        match self {
            Self::PayloadFormatIndicator(_) => PropertyType::PayloadFormatIndicator,
            Self::MessageExpiryInterval(_) => PropertyType::MessageExpiryInterval,
            Self::ContentType(_) => PropertyType::ContentType,
            Self::ResponseTopic(_) => PropertyType::ResponseTopic,
            Self::CorrelationData(_) => PropertyType::CorrelationData,
            Self::SubscriptionIdentifier(_) => PropertyType::SubscriptionIdentifier,
            Self::SessionExpiryInterval(_) => PropertyType::SessionExpiryInterval,
            Self::AssignedClientIdentifier(_) => PropertyType::AssignedClientIdentifier,
            Self::ServerKeepAlive(_) => PropertyType::ServerKeepAlive,
            Self::AuthenticationMethod(_) => PropertyType::AuthenticationMethod,
            Self::AuthenticationData(_) => PropertyType::AuthenticationData,
            Self::RequestProblemInformation(_) => PropertyType::RequestProblemInformation,
            Self::WillDelayInterval(_) => PropertyType::WillDelayInterval,
            Self::RequestResponseInformation(_) => PropertyType::RequestResponseInformation,
            Self::ResponseInformation(_) => PropertyType::ResponseInformation,
            Self::ServerReference(_) => PropertyType::ServerReference,
            Self::ReasonString(_) => PropertyType::ReasonString,
            Self::ReceiveMaximum(_) => PropertyType::ReceiveMaximum,
            Self::TopicAliasMaximum(_) => PropertyType::TopicAliasMaximum,
            Self::TopicAlias(_) => PropertyType::TopicAlias,
            Self::MaximumQoS(_) => PropertyType::MaximumQoS,
            Self::RetainAvailable(_) => PropertyType::RetainAvailable,
            Self::UserProperty(_) => PropertyType::UserProperty,
            Self::MaximumPacketSize(_) => PropertyType::MaximumPacketSize,
            Self::WildcardSubscriptionAvailable(_) => PropertyType::WildcardSubscriptionAvailable,
            Self::SubscriptionIdentifierAvailable(_) => {
                PropertyType::SubscriptionIdentifierAvailable
            }
            Self::SharedSubscriptionAvailable(_) => PropertyType::SharedSubscriptionAvailable,
        }
    }

    /// Whether this property may legally appear more than once in a single
    /// property list.
    #[must_use]
    pub const fn repeatable(&self) -> bool {
        matches!(
            self,
            Self::UserProperty(_) | Self::SubscriptionIdentifier(_)
        )
    }

    #[must_use]
    pub fn bytes(&self) -> usize {
        // One byte for the property identifier plus the value's own size.
        1 + match self {
            Self::PayloadFormatIndicator(_)
            | Self::RequestProblemInformation(_)
            | Self::RequestResponseInformation(_)
            | Self::MaximumQoS(_)
            | Self::RetainAvailable(_)
            | Self::WildcardSubscriptionAvailable(_)
            | Self::SubscriptionIdentifierAvailable(_)
            | Self::SharedSubscriptionAvailable(_) => 1,
            Self::ServerKeepAlive(_) | Self::ReceiveMaximum(_) | Self::TopicAliasMaximum(_)
            | Self::TopicAlias(_) => 2,
            Self::MessageExpiryInterval(_)
            | Self::SessionExpiryInterval(_)
            | Self::WillDelayInterval(_)
            | Self::MaximumPacketSize(_) => 4,
            Self::SubscriptionIdentifier(v) => VarInt::from(*v).map_or(1, |v| v.bytes()),
            Self::ContentType(s)
            | Self::ResponseTopic(s)
            | Self::AssignedClientIdentifier(s)
            | Self::AuthenticationMethod(s)
            | Self::ResponseInformation(s)
            | Self::ServerReference(s)
            | Self::ReasonString(s) => s.bytes(),
            Self::CorrelationData(b) | Self::AuthenticationData(b) => b.bytes(),
            Self::UserProperty(p) => p.bytes(),
        }
    }
}

impl DecodePacket for Property {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        let property_type = PropertyType::try_from(ba.read_byte()?)?;
        match property_type {
            PropertyType::PayloadFormatIndicator => {
                Ok(Self::PayloadFormatIndicator(ba.read_byte()?))
            }
            PropertyType::MessageExpiryInterval => {
                Ok(Self::MessageExpiryInterval(ba.read_u32()?))
            }
            PropertyType::ContentType => Ok(Self::ContentType(StringData::decode(ba)?)),
            PropertyType::ResponseTopic => Ok(Self::ResponseTopic(StringData::decode(ba)?)),
            PropertyType::CorrelationData => Ok(Self::CorrelationData(BinaryData::decode(ba)?)),
            PropertyType::SubscriptionIdentifier => {
                let v = VarInt::decode(ba)?;
                Ok(Self::SubscriptionIdentifier(v.value()))
            }
            PropertyType::SessionExpiryInterval => {
                Ok(Self::SessionExpiryInterval(ba.read_u32()?))
            }
            PropertyType::AssignedClientIdentifier => {
                Ok(Self::AssignedClientIdentifier(StringData::decode(ba)?))
            }
            PropertyType::ServerKeepAlive => Ok(Self::ServerKeepAlive(ba.read_u16()?)),
            PropertyType::AuthenticationMethod => {
                Ok(Self::AuthenticationMethod(StringData::decode(ba)?))
            }
            PropertyType::AuthenticationData => {
                Ok(Self::AuthenticationData(BinaryData::decode(ba)?))
            }
            PropertyType::RequestProblemInformation => {
                Ok(Self::RequestProblemInformation(ba.read_byte()?))
            }
            PropertyType::WillDelayInterval => Ok(Self::WillDelayInterval(ba.read_u32()?)),
            PropertyType::RequestResponseInformation => {
                Ok(Self::RequestResponseInformation(ba.read_byte()?))
            }
            PropertyType::ResponseInformation => {
                Ok(Self::ResponseInformation(StringData::decode(ba)?))
            }
            PropertyType::ServerReference => Ok(Self::ServerReference(StringData::decode(ba)?)),
            PropertyType::ReasonString => Ok(Self::ReasonString(StringData::decode(ba)?)),
            PropertyType::ReceiveMaximum => {
                let v = ba.read_u16()?;
                if v == 0 {
                    return Err(DecodeError::InvalidPropertyValue);
                }
                Ok(Self::ReceiveMaximum(v))
            }
            PropertyType::TopicAliasMaximum => Ok(Self::TopicAliasMaximum(ba.read_u16()?)),
            PropertyType::TopicAlias => Ok(Self::TopicAlias(ba.read_u16()?)),
            PropertyType::MaximumQoS => {
                let v = ba.read_byte()?;
                if v > 1 {
                    return Err(DecodeError::InvalidPropertyValue);
                }
                Ok(Self::MaximumQoS(v))
            }
            PropertyType::RetainAvailable => Ok(Self::RetainAvailable(ba.read_byte()? == 1)),
            PropertyType::UserProperty => Ok(Self::UserProperty(StringPairData::decode(ba)?)),
            PropertyType::MaximumPacketSize => {
                let v = ba.read_u32()?;
                if v == 0 {
                    return Err(DecodeError::InvalidPropertyValue);
                }
                Ok(Self::MaximumPacketSize(v))
            }
            PropertyType::WildcardSubscriptionAvailable => {
                Ok(Self::WildcardSubscriptionAvailable(ba.read_byte()? == 1))
            }
            PropertyType::SubscriptionIdentifierAvailable => {
                Ok(Self::SubscriptionIdentifierAvailable(ba.read_byte()? == 1))
            }
            PropertyType::SharedSubscriptionAvailable => {
                Ok(Self::SharedSubscriptionAvailable(ba.read_byte()? == 1))
            }
        }
    }
}

impl EncodePacket for Property {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        let old_len = buf.len();
        buf.push(self.property_type() as u8);
        match self {
            Self::PayloadFormatIndicator(v)
            | Self::RequestProblemInformation(v)
            | Self::RequestResponseInformation(v)
            | Self::MaximumQoS(v) => buf.push(*v),
            Self::RetainAvailable(v)
            | Self::WildcardSubscriptionAvailable(v)
            | Self::SubscriptionIdentifierAvailable(v)
            | Self::SharedSubscriptionAvailable(v) => buf.push(u8::from(*v)),
            Self::MessageExpiryInterval(v)
            | Self::SessionExpiryInterval(v)
            | Self::WillDelayInterval(v)
            | Self::MaximumPacketSize(v) => {
                use byteorder::{BigEndian, WriteBytesExt};
                use std::io::Write as _;
                let mut tmp = Vec::new();
                tmp.write_u32::<BigEndian>(*v)?;
                buf.write_all(&tmp)?;
            }
            Self::ServerKeepAlive(v) | Self::ReceiveMaximum(v) | Self::TopicAliasMaximum(v)
            | Self::TopicAlias(v) => {
                use byteorder::{BigEndian, WriteBytesExt};
                use std::io::Write as _;
                let mut tmp = Vec::new();
                tmp.write_u16::<BigEndian>(*v)?;
                buf.write_all(&tmp)?;
            }
            Self::SubscriptionIdentifier(v) => {
                VarInt::from(*v)?.encode(buf)?;
            }
            Self::ContentType(s)
            | Self::ResponseTopic(s)
            | Self::AssignedClientIdentifier(s)
            | Self::AuthenticationMethod(s)
            | Self::ResponseInformation(s)
            | Self::ServerReference(s)
            | Self::ReasonString(s) => {
                s.encode(buf)?;
            }
            Self::CorrelationData(b) | Self::AuthenticationData(b) => {
                b.encode(buf)?;
            }
            Self::UserProperty(p) => {
                p.encode(buf)?;
            }
        }
        Ok(buf.len() - old_len)
    }
}

/// Ordered list of properties attached to a v5 packet, preceded on the wire
/// by a variable byte integer total length.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Properties(Vec<Property>);

impl Properties {
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Append a property.
    ///
    /// # Errors
    ///
    /// Returns error if a non-repeatable property type is already present.
    pub fn add(&mut self, property: Property) -> Result<(), EncodeError> {
        if !property.repeatable()
            && self
                .0
                .iter()
                .any(|p| p.property_type() as u8 == property.property_type() as u8)
        {
            return Err(EncodeError::InvalidProperty);
        }
        self.0.push(property);
        Ok(())
    }

    #[must_use]
    pub fn iter(&self) -> std::slice::Iter<'_, Property> {
        self.0.iter()
    }

    #[must_use]
    pub fn get(&self, t: PropertyType) -> Option<&Property> {
        self.0.iter().find(|p| p.property_type() as u8 == t as u8)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Byte length of the property list, including the leading length prefix.
    #[must_use]
    pub fn bytes(&self) -> usize {
        let payload_len: usize = self.0.iter().map(Property::bytes).sum();
        VarInt::from(payload_len).map_or(0, |v| v.bytes()) + payload_len
    }
}

impl DecodePacket for Properties {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        let len = VarInt::decode(ba)?.value();
        let mut properties = Vec::new();
        let mut consumed = 0;
        while consumed < len {
            let before = ba.offset();
            let property = Property::decode(ba)?;
            consumed += ba.offset() - before;
            properties.push(property);
        }
        Ok(Self(properties))
    }
}

impl EncodePacket for Properties {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        let old_len = buf.len();
        let payload_len: usize = self.0.iter().map(Property::bytes).sum();
        VarInt::from(payload_len)?.encode(buf)?;
        for property in &self.0 {
            property.encode(buf)?;
        }
        Ok(buf.len() - old_len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let mut properties = Properties::new();
        properties
            .add(Property::SessionExpiryInterval(3600))
            .unwrap();
        properties
            .add(Property::ReceiveMaximum(100))
            .unwrap();

        let mut buf = Vec::new();
        properties.encode(&mut buf).unwrap();

        let mut ba = ByteArray::new(&buf);
        let decoded = Properties::decode(&mut ba).unwrap();
        assert_eq!(decoded.iter().count(), 2);
        assert_eq!(
            decoded.get(PropertyType::ReceiveMaximum),
            Some(&Property::ReceiveMaximum(100))
        );
    }

    #[test]
    fn test_reject_duplicate_non_repeatable() {
        let mut properties = Properties::new();
        properties
            .add(Property::SessionExpiryInterval(1))
            .unwrap();
        assert!(properties
            .add(Property::SessionExpiryInterval(2))
            .is_err());
    }

    #[test]
    fn test_allow_duplicate_user_property() {
        let mut properties = Properties::new();
        properties
            .add(Property::UserProperty(
                StringPairData::new("k1", "v1").unwrap(),
            ))
            .unwrap();
        assert!(properties
            .add(Property::UserProperty(
                StringPairData::new("k2", "v2").unwrap()
            ))
            .is_ok());
    }
}
