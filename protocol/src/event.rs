// Copyright (c) 2020 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Lesser General Public License that can be found
// in the LICENSE file.

use mqtt_codec::{PacketId, QoS};

use crate::error::Error;
use crate::timer::TimerOp;

/// Result of a SUBSCRIBE request, one reason per requested topic filter.
#[derive(Clone, Debug, PartialEq)]
pub enum SubscribeOutcome {
    /// v3.1.1 grants a QoS ceiling or fails outright.
    V311(mqtt_codec::v3::SubscribeAck),
    /// v5 carries a full reason code per filter.
    V5(mqtt_codec::v5::ReasonCode),
}

/// A side effect the connection engine wants the host to perform.
///
/// Nothing in this type ever blocks or performs I/O itself; the engine is
/// sans-I/O and only describes what should happen next. The host drains
/// these with [`crate::connection::Connection::poll_event`] after every
/// call into the engine.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    /// Bytes the host must write to the transport, in order.
    Send(Vec<u8>),

    /// An application message arrived and is ready for delivery.
    Deliver {
        topic: String,
        payload: Vec<u8>,
        qos: QoS,
        retain: bool,
    },

    /// A previously sent QoS 1/2 PUBLISH has been fully acknowledged by
    /// the peer (PUBACK for QoS 1, PUBCOMP for QoS 2).
    PublishComplete(PacketId),

    /// The peer's reply to an outbound SUBSCRIBE.
    SubscribeResult {
        packet_id: PacketId,
        results: Vec<SubscribeOutcome>,
    },

    /// The peer's reply to an outbound UNSUBSCRIBE.
    UnsubscribeResult { packet_id: PacketId },

    /// A packet identifier the host may have been holding a queued send
    /// for has just become free again.
    PacketIdReleased(PacketId),

    /// The engine needs a timer started or cancelled.
    Timer(TimerOp),

    /// The connection is finished; the host should close the transport.
    Closed { reason: Option<Error> },

    /// A non-fatal protocol error was observed and reported to the peer.
    ProtocolError(Error),
}
