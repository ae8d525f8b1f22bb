// Copyright (c) 2020 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Lesser General Public License that can be found
// in the LICENSE file.

use std::collections::{BTreeMap, HashSet};

use mqtt_codec::{PacketId, QoS};

/// Where an outbound QoS 1/2 PUBLISH is in its acknowledgement cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutboundState {
    /// QoS 1, waiting for PUBACK.
    AwaitingPubAck,
    /// QoS 2, waiting for PUBREC.
    AwaitingPubRec,
    /// QoS 2, PUBREC received and PUBREL sent, waiting for PUBCOMP.
    AwaitingPubComp,
}

/// Enough of a PUBLISH to retransmit it with DUP=1, kept around until the
/// peer fully acknowledges it or the session ends with clean-session set.
#[derive(Clone, Debug, PartialEq)]
pub struct OutboundEntry {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
    pub retain: bool,
    pub state: OutboundState,
}

/// Tracks in-flight QoS 1/2 exchanges so they can be replayed after a
/// reconnect and so duplicate inbound QoS 2 PUBLISH packets can be
/// suppressed. Keyed by packet identifier on both sides; entries survive
/// a transport loss but are dropped entirely when the session ends with
/// clean-session/clean-start set [MQTT-4.1.0-1 style session semantics].
#[derive(Debug, Default)]
pub struct Store {
    outbound: BTreeMap<u16, OutboundEntry>,
    inbound_qos2: HashSet<u16>,
}

impl Store {
    #[must_use]
    pub fn new() -> Self {
        Self {
            outbound: BTreeMap::new(),
            inbound_qos2: HashSet::new(),
        }
    }

    pub fn insert_outbound(&mut self, packet_id: PacketId, entry: OutboundEntry) {
        self.outbound.insert(packet_id.value(), entry);
    }

    pub fn get_outbound_mut(&mut self, packet_id: PacketId) -> Option<&mut OutboundEntry> {
        self.outbound.get_mut(&packet_id.value())
    }

    #[must_use]
    pub fn get_outbound(&self, packet_id: PacketId) -> Option<&OutboundEntry> {
        self.outbound.get(&packet_id.value())
    }

    pub fn remove_outbound(&mut self, packet_id: PacketId) -> Option<OutboundEntry> {
        self.outbound.remove(&packet_id.value())
    }

    /// Iterate stored outbound entries in packet-identifier order, the
    /// order they should be replayed in after a session resumes.
    pub fn iter_outbound(&self) -> impl Iterator<Item = (PacketId, &OutboundEntry)> {
        self.outbound
            .iter()
            .map(|(id, entry)| (PacketId::new(*id), entry))
    }

    #[must_use]
    pub fn outbound_len(&self) -> usize {
        self.outbound.len()
    }

    /// Record an inbound QoS 2 PUBLISH as being processed. Returns `false`
    /// if `packet_id` was already recorded, meaning this is a duplicate
    /// delivery that must not be delivered to the application again
    /// [MQTT-4.3.3-2].
    pub fn mark_inbound_qos2(&mut self, packet_id: PacketId) -> bool {
        self.inbound_qos2.insert(packet_id.value())
    }

    #[must_use]
    pub fn is_inbound_qos2_pending(&self, packet_id: PacketId) -> bool {
        self.inbound_qos2.contains(&packet_id.value())
    }

    /// Clear the duplicate-suppression entry once PUBCOMP has been sent.
    pub fn clear_inbound_qos2(&mut self, packet_id: PacketId) {
        self.inbound_qos2.remove(&packet_id.value());
    }

    /// Snapshot the packet identifiers currently held for inbound QoS 2
    /// duplicate suppression, for persistence across a process restart.
    pub fn inbound_qos2_ids(&self) -> impl Iterator<Item = PacketId> + '_ {
        self.inbound_qos2.iter().map(|id| PacketId::new(*id))
    }

    /// Reinstall a previously persisted set of inbound QoS 2 identifiers.
    pub fn restore_inbound_qos2(&mut self, ids: &[PacketId]) {
        self.inbound_qos2.extend(ids.iter().map(|id| id.value()));
    }

    /// Drop all stored state, used when a session ends without resumption.
    pub fn clear(&mut self) {
        self.outbound.clear();
        self.inbound_qos2.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outbound_roundtrip() {
        let mut store = Store::new();
        let id = PacketId::new(7);
        store.insert_outbound(
            id,
            OutboundEntry {
                topic: "a/b".to_string(),
                payload: vec![1, 2, 3],
                qos: QoS::AtLeastOnce,
                retain: false,
                state: OutboundState::AwaitingPubAck,
            },
        );
        assert!(store.get_outbound_mut(id).is_some());
        assert!(store.remove_outbound(id).is_some());
        assert!(store.get_outbound_mut(id).is_none());
    }

    #[test]
    fn test_inbound_qos2_dedup() {
        let mut store = Store::new();
        let id = PacketId::new(3);
        assert!(store.mark_inbound_qos2(id));
        assert!(!store.mark_inbound_qos2(id));
        store.clear_inbound_qos2(id);
        assert!(store.mark_inbound_qos2(id));
    }
}
