// Copyright (c) 2020 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Lesser General Public License that can be found
// in the LICENSE file.

use std::time::Duration;

use mqtt_codec::PacketId;

/// Identifies a logical timer owned by the connection engine.
///
/// The engine never starts a real clock; it only ever asks the host, via
/// a [`TimerOp`] event, to start or cancel a timer named by this id and
/// later calls [`crate::connection::Connection::on_timer_fired`] when the
/// host reports that timer has elapsed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TimerId {
    /// Client-side. Fires periodically while connected so the engine can
    /// send a PINGREQ of its own accord to keep the session alive.
    PingReqSend,
    /// Server-side. Fires when no packet has been seen from the client
    /// within 1.5x the negotiated keep-alive interval [MQTT-3.1.2-22].
    /// Restarted on every non-AUTH packet received from the client.
    PingReqRecv,
    /// Client-side. Armed when a PINGREQ is sent; fires if no PINGRESP
    /// arrives in time, which is treated the same as a keep-alive timeout.
    PingRespRecv,
    /// Fires when an unacknowledged QoS 1/2 outbound packet should be
    /// retransmitted with DUP=1.
    Retry(PacketId),
}

/// Instruction for the host to start or cancel a named timer.
///
/// The host is free to implement this however it likes (a single timer
/// wheel, one `tokio::time::Sleep` per id, ...); the engine only needs
/// the eventual `on_timer_fired` callback to land with a matching id.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimerOp {
    Start { id: TimerId, after: Duration },
    Cancel { id: TimerId },
}
