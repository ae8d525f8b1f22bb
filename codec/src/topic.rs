// Copyright (c) 2020 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Affero General Public License that can be found
// in the LICENSE file.

use std::fmt;

use crate::{
    utils::validate_utf8_string, ByteArray, DecodeError, DecodePacket, EncodeError, EncodePacket,
    StringData,
};

/// Topic Name used in a PUBLISH packet. MUST NOT contain wildcard
/// characters and MUST NOT be empty [MQTT-4.7.3-1], [MQTT-4.7.3-2].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PubTopic(StringData);

impl PubTopic {
    /// # Errors
    ///
    /// Returns error if `topic` is empty or contains a wildcard character.
    pub fn new(topic: &str) -> Result<Self, EncodeError> {
        if topic.is_empty() {
            return Err(EncodeError::InvalidTopic);
        }
        if topic.contains(['#', '+']) {
            return Err(EncodeError::InvalidTopic);
        }
        validate_utf8_string(topic).map_err(|_e| EncodeError::InvalidUtf8String)?;
        let data = StringData::from(topic).map_err(|_e| EncodeError::InvalidUtf8String)?;
        Ok(Self(data))
    }

    #[must_use]
    pub fn bytes(&self) -> usize {
        self.0.bytes()
    }
}

impl AsRef<str> for PubTopic {
    fn as_ref(&self) -> &str {
        self.0.as_ref()
    }
}

impl fmt::Display for PubTopic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl DecodePacket for PubTopic {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        let data = StringData::decode(ba)?;
        if data.is_empty() || data.as_ref().contains(['#', '+']) {
            return Err(DecodeError::InvalidTopic);
        }
        Ok(Self(data))
    }
}

impl EncodePacket for PubTopic {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        self.0.encode(buf)
    }
}

/// Topic Filter used in a SUBSCRIBE/UNSUBSCRIBE packet. May contain the
/// multi-level wildcard `#` (only as the last level) and the single-level
/// wildcard `+`, and may name a shared subscription as
/// `$share/<group>/<filter>`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SubTopic(StringData);

impl SubTopic {
    /// # Errors
    ///
    /// Returns error if `topic` is empty or violates wildcard placement
    /// rules [MQTT-4.7.1-1], [MQTT-4.7.1-2], [MQTT-4.7.1-3].
    pub fn new(topic: &str) -> Result<Self, EncodeError> {
        validate_filter(topic).map_err(|_e| EncodeError::InvalidTopic)?;
        let data = StringData::from(topic).map_err(|_e| EncodeError::InvalidUtf8String)?;
        Ok(Self(data))
    }

    #[must_use]
    pub fn bytes(&self) -> usize {
        self.0.bytes()
    }

    /// Returns the `(group, filter)` pair if this is a shared subscription
    /// topic filter of the form `$share/<group>/<filter>`.
    #[must_use]
    pub fn shared_subscription(&self) -> Option<(&str, &str)> {
        let rest = self.0.as_ref().strip_prefix("$share/")?;
        let (group, filter) = rest.split_once('/')?;
        if group.is_empty() || filter.is_empty() {
            return None;
        }
        Some((group, filter))
    }
}

impl AsRef<str> for SubTopic {
    fn as_ref(&self) -> &str {
        self.0.as_ref()
    }
}

impl fmt::Display for SubTopic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl DecodePacket for SubTopic {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        let data = StringData::decode(ba)?;
        validate_filter(data.as_ref()).map_err(|()| DecodeError::InvalidTopic)?;
        Ok(Self(data))
    }
}

impl EncodePacket for SubTopic {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        self.0.encode(buf)
    }
}

fn validate_filter(topic: &str) -> Result<(), ()> {
    if topic.is_empty() {
        return Err(());
    }
    let levels: Vec<&str> = topic.split('/').collect();
    for (i, level) in levels.iter().enumerate() {
        if level.len() > 1 && (level.contains('#') || level.contains('+')) {
            return Err(());
        }
        if *level == "#" && i != levels.len() - 1 {
            return Err(());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pub_topic_rejects_wildcards() {
        assert!(PubTopic::new("a/b/+").is_err());
        assert!(PubTopic::new("").is_err());
        assert!(PubTopic::new("a/b/c").is_ok());
    }

    #[test]
    fn test_sub_topic_wildcard_placement() {
        assert!(SubTopic::new("a/#").is_ok());
        assert!(SubTopic::new("a/#/b").is_err());
        assert!(SubTopic::new("a/b#").is_err());
        assert!(SubTopic::new("+/b/+").is_ok());
    }

    #[test]
    fn test_shared_subscription() {
        let topic = SubTopic::new("$share/group1/a/b").unwrap();
        assert_eq!(topic.shared_subscription(), Some(("group1", "a/b")));
        let topic = SubTopic::new("a/b").unwrap();
        assert_eq!(topic.shared_subscription(), None);
    }
}
