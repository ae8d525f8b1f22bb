// Copyright (c) 2020 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Lesser General Public License that can be found
// in the LICENSE file.

use std::collections::VecDeque;
use std::time::Duration;

use log::{debug, warn};
use mqtt_codec::{v3, v5, AnyPacket, EncodePacket, PacketId, QoS, StreamParser, V3Packet, V5Packet};

use crate::error::{Error, ErrorKind};
use crate::event::{Event, SubscribeOutcome};
use crate::packet_id::PacketIdManager;
use crate::role::{ConnectionStatus, Role};
use crate::store::{OutboundEntry, OutboundState, Store};
use crate::timer::{TimerId, TimerOp};
use crate::topic_alias::{TopicAliasRecvTable, TopicAliasSendTable};
use crate::version::ProtocolVersion;

/// `Receive Maximum` we advertise when none is configured, matching the
/// protocol default of "no limit beyond 65535" [MQTT v5.0 3.1.2.11.3].
const DEFAULT_RECEIVE_MAXIMUM: u16 = 65535;

/// How long to wait for an acknowledgement before retransmitting a QoS
/// 1/2 PUBLISH with DUP=1. The host owns the actual clock; this is only
/// the duration passed along in the `TimerOp::Start` event.
const RETRY_INTERVAL: Duration = Duration::from_secs(20);

/// Sans-I/O MQTT connection engine, driving either the client or the
/// server side of a single connection for either protocol version.
///
/// The host feeds inbound bytes to [`Self::receive`] and local requests
/// through [`Self::connect`], [`Self::publish`], [`Self::subscribe`],
/// [`Self::unsubscribe`] and [`Self::disconnect`], then drains
/// [`Self::poll_event`] after every call to find out what to do next.
/// Nothing here touches a socket or a clock.
#[derive(Debug)]
pub struct Connection {
    role: Role,
    version: ProtocolVersion,
    status: ConnectionStatus,
    client_id: String,
    clean_session: bool,
    keep_alive: u16,
    session_present: bool,
    packet_ids: PacketIdManager,
    store: Store,
    topic_alias_send: TopicAliasSendTable,
    topic_alias_recv: TopicAliasRecvTable,
    /// What we advertised as our own Receive Maximum; bounds how many
    /// QoS 1/2 deliveries we allow the peer to have outstanding to us.
    receive_maximum_local: u16,
    /// What the peer advertised; bounds how many QoS 1/2 PUBLISH we may
    /// have outstanding to them at once.
    receive_maximum_peer: u16,
    inflight_outbound: u16,
    /// PUBLISH requests held back because the connection is offline (and
    /// `offline_publish` allows queueing) or because `receive_maximum_peer`
    /// is currently exhausted. Drained in order once either condition
    /// clears.
    offline_queue: VecDeque<QueuedPublish>,
    /// Whether `publish()` queues instead of erroring while disconnected.
    offline_publish: bool,
    /// Whether the engine sends PUBACK/PUBREC/PUBCOMP on the host's behalf.
    auto_pub_response: bool,
    /// Whether the engine sends PINGRESP on the host's behalf.
    auto_ping_response: bool,
    /// v5 only: assign a fresh topic alias for a topic that has never been
    /// aliased before, the first time it is published.
    auto_map_topic_alias_send: bool,
    /// v5 only: once a topic has an alias mapping, send the alias alone
    /// instead of the full topic name.
    auto_replace_topic_alias_send: bool,
    /// Overrides the keep-alive value for the client-side `pingreq_send`
    /// timer; defaults to the negotiated keep-alive interval.
    pingreq_send_interval: Option<Duration>,
    /// Overrides how long the client waits for PINGRESP before treating
    /// the connection as timed out; defaults to the `pingreq_send` period.
    pingresp_recv_timeout: Option<Duration>,
    parser: StreamParser,
    pending: VecDeque<Event>,
}

/// A PUBLISH request held in the offline/backpressure queue. Enough to
/// build the wire packet once a slot opens up; the packet identifier, if
/// any, is already reserved so ordering and `Event::PacketIdReleased`
/// semantics are unaffected by how long the request sits queued.
#[derive(Clone, Debug)]
struct QueuedPublish {
    packet_id: Option<PacketId>,
    topic: String,
    payload: Vec<u8>,
    qos: QoS,
    retain: bool,
}

impl Connection {
    #[must_use]
    pub fn new(role: Role, version: ProtocolVersion) -> Self {
        Self {
            role,
            version,
            status: ConnectionStatus::Invalid,
            client_id: String::new(),
            clean_session: true,
            keep_alive: 0,
            session_present: false,
            packet_ids: PacketIdManager::new(),
            store: Store::new(),
            topic_alias_send: TopicAliasSendTable::new(0),
            topic_alias_recv: TopicAliasRecvTable::new(),
            receive_maximum_local: DEFAULT_RECEIVE_MAXIMUM,
            receive_maximum_peer: DEFAULT_RECEIVE_MAXIMUM,
            inflight_outbound: 0,
            offline_queue: VecDeque::new(),
            offline_publish: true,
            auto_pub_response: true,
            auto_ping_response: true,
            auto_map_topic_alias_send: false,
            auto_replace_topic_alias_send: false,
            pingreq_send_interval: None,
            pingresp_recv_timeout: None,
            parser: StreamParser::new(),
            pending: VecDeque::new(),
        }
    }

    #[must_use]
    pub const fn status(&self) -> ConnectionStatus {
        self.status
    }

    #[must_use]
    pub const fn role(&self) -> Role {
        self.role
    }

    #[must_use]
    pub const fn session_present(&self) -> bool {
        self.session_present
    }

    /// Set the Receive Maximum we advertise in our own CONNECT/CONNACK.
    /// Has no effect once CONNECT has already been sent or answered.
    pub fn set_receive_maximum(&mut self, max: u16) {
        self.receive_maximum_local = max;
    }

    /// Set how many topic aliases we are willing to learn from the peer,
    /// advertised as our Topic Alias Maximum on CONNECT/CONNACK.
    pub fn set_topic_alias_maximum(&mut self, max: u16) {
        self.topic_alias_send.set_max(max);
    }

    /// Allow (`true`, the default) or forbid `publish()` from queueing a
    /// request while disconnected instead of returning an error.
    pub fn set_offline_publish(&mut self, enabled: bool) {
        self.offline_publish = enabled;
    }

    /// Enable (the default) or disable automatic PUBACK/PUBREC/PUBCOMP
    /// replies to inbound PUBLISH/PUBREL. When disabled the host must
    /// drive acknowledgement itself; no host-facing API for that exists
    /// yet beyond this flag, so disabling it only suppresses the replies.
    pub fn set_auto_pub_response(&mut self, enabled: bool) {
        self.auto_pub_response = enabled;
    }

    /// Enable (the default) or disable automatic PINGRESP replies to
    /// inbound PINGREQ.
    pub fn set_auto_ping_response(&mut self, enabled: bool) {
        self.auto_ping_response = enabled;
    }

    /// v5 only. When enabled, the first PUBLISH to a topic that has never
    /// been aliased assigns it a fresh alias from the send-side table.
    pub fn set_auto_map_topic_alias_send(&mut self, enabled: bool) {
        self.auto_map_topic_alias_send = enabled;
    }

    /// v5 only. When enabled, a PUBLISH to a topic that already has an
    /// alias mapping sends the alias alone instead of the full topic name.
    pub fn set_auto_replace_topic_alias_send(&mut self, enabled: bool) {
        self.auto_replace_topic_alias_send = enabled;
    }

    /// Override how long the client waits for PINGRESP after sending a
    /// PINGREQ before treating the connection as timed out. Defaults to
    /// the `pingreq_send` period.
    pub fn set_pingresp_recv_timeout(&mut self, timeout: Duration) {
        self.pingresp_recv_timeout = Some(timeout);
    }

    /// Override the interval between self-initiated PINGREQ sends.
    /// Defaults to the negotiated keep-alive interval.
    pub fn set_pingreq_send_interval(&mut self, interval: Duration) {
        self.pingreq_send_interval = Some(interval);
    }

    /// Drain the next side effect the host must act on.
    pub fn poll_event(&mut self) -> Option<Event> {
        self.pending.pop_front()
    }

    fn push(&mut self, event: Event) {
        self.pending.push_back(event);
    }

    fn push_send<P: EncodePacket>(&mut self, packet: &P) -> Result<(), Error> {
        let mut buf = Vec::new();
        packet.encode(&mut buf)?;
        self.push(Event::Send(buf));
        Ok(())
    }

    fn require_status(&self, expected: ConnectionStatus) -> Result<(), Error> {
        if self.status != expected {
            return Err(Error::new(
                ErrorKind::DisallowedAction,
                format!("expected status {expected:?}, was {:?}", self.status),
            ));
        }
        Ok(())
    }

    fn pingreq_send_period(&self) -> Option<Duration> {
        if self.keep_alive == 0 {
            return None;
        }
        Some(
            self.pingreq_send_interval
                .unwrap_or_else(|| Duration::from_secs(u64::from(self.keep_alive))),
        )
    }

    fn pingresp_recv_period(&self) -> Duration {
        self.pingresp_recv_timeout
            .or_else(|| self.pingreq_send_period())
            .unwrap_or(RETRY_INTERVAL)
    }

    /// Client-side: (re)arm the periodic self-initiated PINGREQ timer.
    /// A fresh `Start` event always supersedes any previous one for the
    /// same id, so arming again is how the timer is reset too.
    fn arm_pingreq_send(&mut self) {
        if let Some(after) = self.pingreq_send_period() {
            self.push(Event::Timer(TimerOp::Start {
                id: TimerId::PingReqSend,
                after,
            }));
        }
    }

    /// Server-side: (re)arm the timer that concludes the client has gone
    /// silent past 1.5x its keep-alive interval [MQTT-3.1.2-22].
    fn arm_pingreq_recv(&mut self) {
        if self.keep_alive > 0 {
            let after = Duration::from_millis(u64::from(self.keep_alive) * 1500);
            self.push(Event::Timer(TimerOp::Start {
                id: TimerId::PingReqRecv,
                after,
            }));
        }
    }

    /// Client-side: arm the timer that fires if PINGRESP doesn't arrive
    /// after a PINGREQ was just sent.
    fn arm_pingresp_recv(&mut self) {
        self.push(Event::Timer(TimerOp::Start {
            id: TimerId::PingRespRecv,
            after: self.pingresp_recv_period(),
        }));
    }

    fn cancel_pingresp_recv(&mut self) {
        self.push(Event::Timer(TimerOp::Cancel {
            id: TimerId::PingRespRecv,
        }));
    }

    fn close(&mut self, reason: Option<Error>) {
        self.status = ConnectionStatus::Disconnected;
        self.push(Event::Timer(TimerOp::Cancel {
            id: TimerId::PingReqSend,
        }));
        self.push(Event::Timer(TimerOp::Cancel {
            id: TimerId::PingReqRecv,
        }));
        self.push(Event::Timer(TimerOp::Cancel {
            id: TimerId::PingRespRecv,
        }));
        self.push(Event::Closed { reason });
    }

    /// Close with a v5 DISCONNECT carrying `reason` sent first, when the
    /// connection has progressed far enough for a DISCONNECT to be legal
    /// [MQTT §7 error class 1 and 3].
    fn close_with_reason(&mut self, reason_code: v5::ReasonCode, err: Error) {
        if self.version.is_v5() && matches!(self.status, ConnectionStatus::Connected | ConnectionStatus::Connecting) {
            let packet = v5::DisconnectPacket::new(reason_code);
            let _ = self.push_send(&packet);
        }
        self.close(Some(err));
    }

    // ---- client-initiated requests ----------------------------------

    /// Send a CONNECT packet. Client role only.
    ///
    /// # Errors
    ///
    /// Returns error if this is not a client connection, a CONNECT has
    /// already been sent, or `client_id` is rejected by the codec.
    pub fn connect(&mut self, client_id: &str, clean_session: bool, keep_alive: u16) -> Result<(), Error> {
        if self.role.is_server() {
            return Err(Error::new(ErrorKind::DisallowedAction, "connect is client-only"));
        }
        self.require_status(ConnectionStatus::Invalid)?;

        self.client_id = client_id.to_string();
        self.clean_session = clean_session;
        self.keep_alive = keep_alive;

        match self.version {
            ProtocolVersion::V311 => {
                let mut packet = v3::ConnectPacket::new(client_id)?;
                packet.set_clean_session(clean_session);
                packet.set_keep_alive(keep_alive);
                self.push_send(&packet)?;
            }
            ProtocolVersion::V5 => {
                let mut packet = v5::ConnectPacket::new(client_id)?;
                packet.set_clean_start(clean_session);
                packet.set_keep_alive(keep_alive);
                packet
                    .properties_mut()
                    .add(v5::Property::ReceiveMaximum(self.receive_maximum_local))?;
                packet
                    .properties_mut()
                    .add(v5::Property::TopicAliasMaximum(self.topic_alias_send.max()))?;
                self.push_send(&packet)?;
            }
        }

        self.status = ConnectionStatus::Connecting;
        self.arm_pingreq_send();
        Ok(())
    }

    /// Publish an application message. Returns the packet identifier
    /// assigned for QoS 1/2, or `None` for QoS 0.
    ///
    /// While disconnected with `offline_publish` enabled (the default),
    /// or while connected but the peer's Receive Maximum is currently
    /// exhausted, the request is held in a FIFO queue instead of being
    /// sent immediately; it is flushed automatically once a slot frees up
    /// or the connection (re)connects.
    ///
    /// # Errors
    ///
    /// Returns error if disconnected with `offline_publish` disabled, or
    /// if no packet identifier is free.
    pub fn publish(
        &mut self,
        topic: &str,
        payload: &[u8],
        qos: QoS,
        retain: bool,
    ) -> Result<Option<PacketId>, Error> {
        if self.status != ConnectionStatus::Connected {
            if !self.offline_publish {
                return Err(Error::new(ErrorKind::DisallowedAction, "not connected"));
            }
            return self.enqueue_publish(topic, payload, qos, retain);
        }

        if qos != QoS::AtMostOnce && self.inflight_outbound >= self.receive_maximum_peer {
            return self.enqueue_publish(topic, payload, qos, retain);
        }

        let packet_id = self.acquire_publish_packet_id(qos)?;
        self.send_publish_now(topic, payload, qos, retain, packet_id)?;
        Ok(packet_id)
    }

    fn acquire_publish_packet_id(&mut self, qos: QoS) -> Result<Option<PacketId>, Error> {
        if qos == QoS::AtMostOnce {
            return Ok(None);
        }
        self.packet_ids
            .acquire()
            .map(Some)
            .ok_or_else(|| Error::new(ErrorKind::DisallowedAction, "no packet identifiers available"))
    }

    fn enqueue_publish(
        &mut self,
        topic: &str,
        payload: &[u8],
        qos: QoS,
        retain: bool,
    ) -> Result<Option<PacketId>, Error> {
        let packet_id = self.acquire_publish_packet_id(qos)?;
        self.offline_queue.push_back(QueuedPublish {
            packet_id,
            topic: topic.to_string(),
            payload: payload.to_vec(),
            qos,
            retain,
        });
        Ok(packet_id)
    }

    /// Send a PUBLISH that has already cleared backpressure, registering
    /// it in the store for QoS 1/2 and arming its retry timer.
    fn send_publish_now(
        &mut self,
        topic: &str,
        payload: &[u8],
        qos: QoS,
        retain: bool,
        packet_id: Option<PacketId>,
    ) -> Result<(), Error> {
        self.build_and_send_publish(topic, payload, qos, retain, packet_id, false)?;

        if let Some(id) = packet_id {
            self.inflight_outbound += 1;
            let state = if qos == QoS::AtLeastOnce {
                OutboundState::AwaitingPubAck
            } else {
                OutboundState::AwaitingPubRec
            };
            self.store.insert_outbound(
                id,
                OutboundEntry {
                    topic: topic.to_string(),
                    payload: payload.to_vec(),
                    qos,
                    retain,
                    state,
                },
            );
            self.push(Event::Timer(TimerOp::Start {
                id: TimerId::Retry(id),
                after: RETRY_INTERVAL,
            }));
        }

        Ok(())
    }

    fn build_and_send_publish(
        &mut self,
        topic: &str,
        payload: &[u8],
        qos: QoS,
        retain: bool,
        packet_id: Option<PacketId>,
        dup: bool,
    ) -> Result<(), Error> {
        match self.version {
            ProtocolVersion::V311 => {
                let mut packet = v3::PublishPacket::new(topic, qos, payload)?;
                packet.set_retain(retain);
                if let Some(id) = packet_id {
                    packet.set_packet_id(id);
                }
                if dup {
                    packet.set_dup(true)?;
                }
                self.push_send(&packet)
            }
            ProtocolVersion::V5 => {
                let (alias, omit_topic) = if dup { (None, false) } else { self.resolve_send_alias(topic) };
                let send_topic = if omit_topic { "" } else { topic };
                let mut packet = v5::PublishPacket::new(send_topic, qos, payload)?;
                packet.set_retain(retain);
                if let Some(id) = packet_id {
                    packet.set_packet_id(id);
                }
                if dup {
                    packet.set_dup(true)?;
                }
                if let Some(alias) = alias {
                    packet.properties_mut().add(v5::Property::TopicAlias(alias))?;
                }
                self.push_send(&packet)
            }
        }
    }

    /// Decide the topic alias treatment for a fresh (non-retransmitted)
    /// v5 PUBLISH: `(alias_to_send, omit_topic_text)`. A topic only loses
    /// its text once an alias mapping for it already exists; the PUBLISH
    /// that establishes a brand-new mapping still carries the full topic.
    fn resolve_send_alias(&mut self, topic: &str) -> (Option<u16>, bool) {
        if let Some(alias) = self.topic_alias_send.existing_alias(topic) {
            return if self.auto_replace_topic_alias_send {
                (Some(alias), true)
            } else {
                (None, false)
            };
        }
        if self.auto_map_topic_alias_send {
            if let Some(alias) = self.topic_alias_send.assign(topic) {
                return (Some(alias), false);
            }
        }
        (None, false)
    }

    /// Flush as many queued PUBLISH requests as currently fit under the
    /// peer's Receive Maximum. Called whenever a slot might have opened:
    /// an ack freeing an inflight entry, or a (re)connection completing.
    fn drain_offline_queue(&mut self) {
        if self.status != ConnectionStatus::Connected {
            return;
        }
        loop {
            let Some(queued) = self.offline_queue.front() else {
                break;
            };
            if queued.qos != QoS::AtMostOnce && self.inflight_outbound >= self.receive_maximum_peer {
                break;
            }
            let queued = self.offline_queue.pop_front().expect("front just checked non-empty");
            if let Err(err) =
                self.send_publish_now(&queued.topic, &queued.payload, queued.qos, queued.retain, queued.packet_id)
            {
                warn!("failed to flush queued publish: {err}");
            }
        }
    }

    /// Subscribe to a set of topic filters. Returns the packet identifier
    /// used, to be matched against `Event::SubscribeResult`.
    ///
    /// # Errors
    ///
    /// Returns error if not connected, `topics` is empty, or no packet
    /// identifier is available.
    pub fn subscribe(&mut self, topics: &[(String, QoS)]) -> Result<PacketId, Error> {
        self.require_status(ConnectionStatus::Connected)?;
        if topics.is_empty() {
            return Err(Error::new(ErrorKind::DisallowedAction, "no topic filters given"));
        }
        let packet_id = self
            .packet_ids
            .acquire()
            .ok_or_else(|| Error::new(ErrorKind::DisallowedAction, "no packet identifiers available"))?;

        match self.version {
            ProtocolVersion::V311 => {
                let (first_topic, first_qos) = &topics[0];
                let mut packet = v3::SubscribePacket::new(first_topic, *first_qos, packet_id)?;
                let rest: Result<Vec<_>, Error> = topics
                    .iter()
                    .map(|(t, q)| v3::SubscribeTopic::new(t, *q).map_err(Error::from))
                    .collect();
                packet.set_topics(&rest?);
                self.push_send(&packet)?;
            }
            ProtocolVersion::V5 => {
                let (first_topic, first_qos) = &topics[0];
                let mut packet = v5::SubscribePacket::new(first_topic, *first_qos, packet_id)?;
                let rest: Result<Vec<_>, Error> = topics
                    .iter()
                    .map(|(t, q)| v5::SubscribeTopic::new(t, *q).map_err(Error::from))
                    .collect();
                packet.set_topics(&rest?);
                self.push_send(&packet)?;
            }
        }

        Ok(packet_id)
    }

    /// Unsubscribe from a set of topic filters.
    ///
    /// # Errors
    ///
    /// Returns error if not connected, `topics` is empty, or no packet
    /// identifier is available.
    pub fn unsubscribe(&mut self, topics: &[String]) -> Result<PacketId, Error> {
        self.require_status(ConnectionStatus::Connected)?;
        if topics.is_empty() {
            return Err(Error::new(ErrorKind::DisallowedAction, "no topic filters given"));
        }
        let packet_id = self
            .packet_ids
            .acquire()
            .ok_or_else(|| Error::new(ErrorKind::DisallowedAction, "no packet identifiers available"))?;
        let refs: Vec<&str> = topics.iter().map(String::as_str).collect();

        match self.version {
            ProtocolVersion::V311 => {
                let packet = v3::UnsubscribePacket::with_topics(&refs, packet_id)?;
                self.push_send(&packet)?;
            }
            ProtocolVersion::V5 => {
                let packet = v5::UnsubscribePacket::with_topics(&refs, packet_id)?;
                self.push_send(&packet)?;
            }
        }

        Ok(packet_id)
    }

    /// Send a graceful DISCONNECT and tear down local state.
    ///
    /// # Errors
    ///
    /// Returns error if not connected.
    pub fn disconnect(&mut self) -> Result<(), Error> {
        self.require_status(ConnectionStatus::Connected)?;
        self.status = ConnectionStatus::Disconnecting;

        match self.version {
            ProtocolVersion::V311 => {
                let packet = v3::DisconnectPacket::new();
                self.push_send(&packet)?;
            }
            ProtocolVersion::V5 => {
                let packet = v5::DisconnectPacket::new(v5::ReasonCode::Success);
                self.push_send(&packet)?;
            }
        }

        if self.clean_session {
            self.store.clear();
            self.topic_alias_send.clear();
            self.topic_alias_recv.clear();
            self.offline_queue.clear();
        }
        self.close(None);
        Ok(())
    }

    // ---- timers -------------------------------------------------------

    /// Tell the engine a previously requested timer has elapsed.
    ///
    /// # Errors
    ///
    /// Never fails; returns `Result` for symmetry with the other
    /// host-facing methods and to leave room for future validation.
    pub fn on_timer_fired(&mut self, id: TimerId) -> Result<(), Error> {
        match id {
            TimerId::PingReqSend => {
                if self.status == ConnectionStatus::Connected {
                    if let Err(err) = self.send_ping_request() {
                        warn!("failed to send PINGREQ: {err}");
                    }
                }
            }
            TimerId::PingReqRecv => {
                if matches!(self.status, ConnectionStatus::Connected | ConnectionStatus::Connecting) {
                    self.close_with_reason(
                        v5::ReasonCode::KeepAliveTimeout,
                        Error::new(ErrorKind::TransportLoss, "no packet received within 1.5x keep-alive interval"),
                    );
                }
            }
            TimerId::PingRespRecv => {
                if self.status == ConnectionStatus::Connected {
                    self.close_with_reason(
                        v5::ReasonCode::KeepAliveTimeout,
                        Error::new(ErrorKind::TransportLoss, "no PINGRESP received after PINGREQ"),
                    );
                }
            }
            TimerId::Retry(packet_id) => {
                if let Err(err) = self.retransmit(packet_id) {
                    warn!("failed to retransmit packet {packet_id:?}: {err}");
                }
            }
        }
        Ok(())
    }

    fn send_ping_request(&mut self) -> Result<(), Error> {
        match self.version {
            ProtocolVersion::V311 => {
                let packet = v3::PingRequestPacket::new();
                self.push_send(&packet)?;
            }
            ProtocolVersion::V5 => {
                let packet = v5::PingRequestPacket::new();
                self.push_send(&packet)?;
            }
        }
        self.arm_pingreq_send();
        self.arm_pingresp_recv();
        Ok(())
    }

    fn retransmit(&mut self, packet_id: PacketId) -> Result<(), Error> {
        let Some(entry) = self.store.get_outbound_mut(packet_id).map(|e| e.clone()) else {
            return Ok(());
        };
        self.resend_entry(packet_id, &entry)?;
        self.push(Event::Timer(TimerOp::Start {
            id: TimerId::Retry(packet_id),
            after: RETRY_INTERVAL,
        }));
        Ok(())
    }

    fn resend_entry(&mut self, packet_id: PacketId, entry: &OutboundEntry) -> Result<(), Error> {
        match entry.state {
            OutboundState::AwaitingPubAck | OutboundState::AwaitingPubRec => self.build_and_send_publish(
                &entry.topic,
                &entry.payload,
                entry.qos,
                entry.retain,
                Some(packet_id),
                true,
            ),
            OutboundState::AwaitingPubComp => match self.version {
                ProtocolVersion::V311 => {
                    let packet = v3::PublishReleasePacket::new(packet_id);
                    self.push_send(&packet)
                }
                ProtocolVersion::V5 => {
                    let packet = v5::PublishReleasePacket::new(packet_id, v5::ReasonCode::Success);
                    self.push_send(&packet)
                }
            },
        }
    }

    fn replay_outbound(&mut self) -> Result<(), Error> {
        let entries: Vec<(PacketId, OutboundEntry)> =
            self.store.iter_outbound().map(|(id, entry)| (id, entry.clone())).collect();
        for (packet_id, entry) in entries {
            self.resend_entry(packet_id, &entry)?;
        }
        Ok(())
    }

    // ---- inbound bytes --------------------------------------------------

    /// Feed freshly received bytes into the engine. May decode zero or
    /// more complete frames and queue any number of resulting events.
    ///
    /// # Errors
    ///
    /// Returns error and closes the connection if the byte stream cannot
    /// form valid frames for the configured protocol version.
    pub fn receive(&mut self, bytes: &[u8]) -> Result<(), Error> {
        if self.status == ConnectionStatus::Disconnected {
            return Err(Error::new(ErrorKind::DisallowedAction, "connection already closed"));
        }

        self.parser.extend(bytes);
        loop {
            match self.parser.next_frame() {
                Ok(Some(frame)) => {
                    if let Err(err) = self.handle_frame(&frame) {
                        self.close_on_inbound_error(err.clone());
                        return Err(err);
                    }
                }
                Ok(None) => return Ok(()),
                Err(decode_err) => {
                    let err = Error::from(decode_err);
                    self.close_on_inbound_error(err.clone());
                    return Err(err);
                }
            }
        }
    }

    /// Report and close on an inbound-processing failure [MQTT §7 error
    /// class 1]: a v5 peer gets a DISCONNECT with a reason matching the
    /// failure before the connection tears down.
    fn close_on_inbound_error(&mut self, err: Error) {
        self.push(Event::ProtocolError(err.clone()));
        let reason_code = match err.kind() {
            ErrorKind::MalformedInput => v5::ReasonCode::MalformedPacket,
            _ => v5::ReasonCode::ProtocolError,
        };
        self.close_with_reason(reason_code, err);
    }

    fn handle_frame(&mut self, frame: &[u8]) -> Result<(), Error> {
        let packet = mqtt_codec::decode_packet(self.version.level(), frame)?;
        if self.role.is_server() && !matches!(packet, AnyPacket::V5(V5Packet::Auth(_))) {
            self.arm_pingreq_recv();
        }
        match packet {
            AnyPacket::V3(p) => self.handle_v3(p),
            AnyPacket::V5(p) => self.handle_v5(p),
        }
    }

    fn handle_v3(&mut self, packet: V3Packet) -> Result<(), Error> {
        match packet {
            V3Packet::Connect(p) => self.on_connect_v3(p),
            V3Packet::ConnectAck(p) => self.on_connect_ack_v3(p),
            V3Packet::Publish(p) => self.on_publish_v3(p),
            V3Packet::PublishAck(p) => self.on_publish_ack(p.packet_id()),
            V3Packet::PublishReceived(p) => self.on_publish_received_v3(p.packet_id()),
            V3Packet::PublishRelease(p) => self.on_publish_release_v3(p.packet_id()),
            V3Packet::PublishComplete(p) => self.on_publish_complete(p.packet_id()),
            V3Packet::Subscribe(p) => self.on_subscribe_v3(p),
            V3Packet::SubscribeAck(p) => self.on_subscribe_ack_v3(p),
            V3Packet::Unsubscribe(p) => self.on_unsubscribe_v3(p),
            V3Packet::UnsubscribeAck(p) => self.on_unsubscribe_ack(p.packet_id()),
            V3Packet::PingRequest(_) => self.on_ping_request_v3(),
            V3Packet::PingResponse(_) => {
                self.cancel_pingresp_recv();
                Ok(())
            }
            V3Packet::Disconnect(_) => self.on_disconnect_from_peer(),
        }
    }

    fn handle_v5(&mut self, packet: V5Packet) -> Result<(), Error> {
        match packet {
            V5Packet::Connect(p) => self.on_connect_v5(p),
            V5Packet::ConnectAck(p) => self.on_connect_ack_v5(p),
            V5Packet::Publish(p) => self.on_publish_v5(p),
            V5Packet::PublishAck(p) => self.on_publish_ack(p.packet_id()),
            V5Packet::PublishReceived(p) => self.on_publish_received_v5(p.packet_id(), p.reason_code()),
            V5Packet::PublishRelease(p) => self.on_publish_release_v5(p.packet_id()),
            V5Packet::PublishComplete(p) => self.on_publish_complete(p.packet_id()),
            V5Packet::Subscribe(p) => self.on_subscribe_v5(p),
            V5Packet::SubscribeAck(p) => self.on_subscribe_ack_v5(p),
            V5Packet::Unsubscribe(p) => self.on_unsubscribe_v5(p),
            V5Packet::UnsubscribeAck(p) => self.on_unsubscribe_ack(p.packet_id()),
            V5Packet::PingRequest(_) => self.on_ping_request_v5(),
            V5Packet::PingResponse(_) => {
                self.cancel_pingresp_recv();
                Ok(())
            }
            V5Packet::Disconnect(p) => {
                debug!("peer disconnected with reason {:?}", p.reason_code());
                self.on_disconnect_from_peer()
            }
            V5Packet::Auth(_) => Ok(()),
        }
    }

    // ---- CONNECT / CONNACK ---------------------------------------------

    fn on_connect_v3(&mut self, packet: v3::ConnectPacket) -> Result<(), Error> {
        if self.role.is_client() {
            return Err(Error::new(ErrorKind::MalformedInput, "client received CONNECT"));
        }
        if self.status != ConnectionStatus::Invalid {
            return Err(Error::new(ErrorKind::MalformedInput, "duplicate CONNECT"));
        }

        self.client_id = packet.client_id().to_string();
        self.clean_session = packet.clean_session();
        self.keep_alive = packet.keep_alive();
        self.session_present = !self.clean_session && self.store.outbound_len() > 0;
        if self.clean_session {
            self.store.clear();
            self.packet_ids = PacketIdManager::new();
        }

        let ack = v3::ConnectAckPacket::new(self.session_present, v3::ConnectReturnCode::Accepted);
        self.push_send(&ack)?;
        self.status = ConnectionStatus::Connected;
        self.arm_pingreq_recv();
        if self.session_present {
            self.replay_outbound()?;
        }
        self.drain_offline_queue();
        Ok(())
    }

    fn on_connect_v5(&mut self, packet: v5::ConnectPacket) -> Result<(), Error> {
        if self.role.is_client() {
            return Err(Error::new(ErrorKind::MalformedInput, "client received CONNECT"));
        }
        if self.status != ConnectionStatus::Invalid {
            return Err(Error::new(ErrorKind::MalformedInput, "duplicate CONNECT"));
        }

        self.client_id = packet.client_id().to_string();
        self.clean_session = packet.clean_start();
        self.keep_alive = packet.keep_alive();
        self.session_present = !self.clean_session && self.store.outbound_len() > 0;
        if self.clean_session {
            self.store.clear();
            self.packet_ids = PacketIdManager::new();
            self.topic_alias_recv.clear();
        }

        if let Some(v5::Property::ReceiveMaximum(max)) = packet.properties().get(v5::PropertyType::ReceiveMaximum) {
            self.receive_maximum_peer = *max;
        }
        if let Some(v5::Property::TopicAliasMaximum(max)) =
            packet.properties().get(v5::PropertyType::TopicAliasMaximum)
        {
            self.topic_alias_send.set_max(*max);
        }

        let mut ack = v5::ConnectAckPacket::new(self.session_present, v5::ReasonCode::Success);
        ack.properties_mut()
            .add(v5::Property::ReceiveMaximum(self.receive_maximum_local))?;
        self.push_send(&ack)?;
        self.status = ConnectionStatus::Connected;
        self.arm_pingreq_recv();
        if self.session_present {
            self.replay_outbound()?;
        }
        self.drain_offline_queue();
        Ok(())
    }

    fn on_connect_ack_v3(&mut self, packet: v3::ConnectAckPacket) -> Result<(), Error> {
        if self.role.is_server() {
            return Err(Error::new(ErrorKind::MalformedInput, "server received CONNACK"));
        }
        if self.status != ConnectionStatus::Connecting {
            return Err(Error::new(ErrorKind::MalformedInput, "unexpected CONNACK"));
        }

        if !packet.return_code().is_success() {
            self.close(Some(Error::new(
                ErrorKind::TransportLoss,
                format!("connection refused: {:?}", packet.return_code()),
            )));
            return Ok(());
        }

        self.session_present = packet.session_present();
        self.status = ConnectionStatus::Connected;
        self.arm_pingreq_send();
        if self.session_present {
            self.replay_outbound()?;
        } else {
            self.store.clear();
        }
        self.drain_offline_queue();
        Ok(())
    }

    fn on_connect_ack_v5(&mut self, packet: v5::ConnectAckPacket) -> Result<(), Error> {
        if self.role.is_server() {
            return Err(Error::new(ErrorKind::MalformedInput, "server received CONNACK"));
        }
        if self.status != ConnectionStatus::Connecting {
            return Err(Error::new(ErrorKind::MalformedInput, "unexpected CONNACK"));
        }

        if !packet.reason_code().is_success() {
            self.close(Some(Error::new(
                ErrorKind::TransportLoss,
                format!("connection refused: {:?}", packet.reason_code()),
            )));
            return Ok(());
        }

        if let Some(v5::Property::ReceiveMaximum(max)) = packet.properties().get(v5::PropertyType::ReceiveMaximum) {
            self.receive_maximum_peer = *max;
        }
        if let Some(v5::Property::ServerKeepAlive(server_keep_alive)) =
            packet.properties().get(v5::PropertyType::ServerKeepAlive)
        {
            self.keep_alive = *server_keep_alive;
        }

        self.session_present = packet.session_present();
        self.status = ConnectionStatus::Connected;
        self.arm_pingreq_send();
        if self.session_present {
            self.replay_outbound()?;
        } else {
            self.store.clear();
        }
        self.drain_offline_queue();
        Ok(())
    }

    // ---- PUBLISH ----------------------------------------------------------

    fn on_publish_v3(&mut self, packet: v3::PublishPacket) -> Result<(), Error> {
        self.require_connected()?;
        self.dispatch_inbound_publish(
            packet.topic().to_string(),
            packet.message().to_vec(),
            packet.qos(),
            packet.retain(),
            packet.packet_id(),
        )
    }

    fn on_publish_v5(&mut self, packet: v5::PublishPacket) -> Result<(), Error> {
        self.require_connected()?;

        let topic = if packet.topic().is_empty() {
            match packet.properties().get(v5::PropertyType::TopicAlias) {
                Some(v5::Property::TopicAlias(alias)) => match self.topic_alias_recv.resolve(*alias) {
                    Some(topic) => topic.to_string(),
                    None => {
                        return Err(Error::new(
                            ErrorKind::MalformedInput,
                            "PUBLISH referenced an unregistered topic alias",
                        ))
                    }
                },
                _ => {
                    return Err(Error::new(
                        ErrorKind::MalformedInput,
                        "PUBLISH had an empty topic and no Topic Alias",
                    ))
                }
            }
        } else {
            if let Some(v5::Property::TopicAlias(alias)) = packet.properties().get(v5::PropertyType::TopicAlias) {
                self.topic_alias_recv.register(*alias, packet.topic());
            }
            packet.topic().to_string()
        };

        self.dispatch_inbound_publish(
            topic,
            packet.message().to_vec(),
            packet.qos(),
            packet.retain(),
            packet.packet_id(),
        )
    }

    fn dispatch_inbound_publish(
        &mut self,
        topic: String,
        payload: Vec<u8>,
        qos: QoS,
        retain: bool,
        packet_id: PacketId,
    ) -> Result<(), Error> {
        match qos {
            QoS::AtMostOnce => {
                self.push(Event::Deliver { topic, payload, qos, retain });
            }
            QoS::AtLeastOnce => {
                self.push(Event::Deliver { topic, payload, qos, retain });
                if self.auto_pub_response {
                    self.send_publish_ack(packet_id)?;
                }
            }
            QoS::ExactOnce => {
                if self.store.mark_inbound_qos2(packet_id) {
                    self.push(Event::Deliver { topic, payload, qos, retain });
                }
                if self.auto_pub_response {
                    self.send_publish_received(packet_id)?;
                }
            }
        }
        Ok(())
    }

    fn send_publish_ack(&mut self, packet_id: PacketId) -> Result<(), Error> {
        match self.version {
            ProtocolVersion::V311 => {
                let packet = v3::PublishAckPacket::new(packet_id);
                self.push_send(&packet)
            }
            ProtocolVersion::V5 => {
                let packet = v5::PublishAckPacket::new(packet_id, v5::ReasonCode::Success);
                self.push_send(&packet)
            }
        }
    }

    fn send_publish_received(&mut self, packet_id: PacketId) -> Result<(), Error> {
        match self.version {
            ProtocolVersion::V311 => {
                let packet = v3::PublishReceivedPacket::new(packet_id);
                self.push_send(&packet)
            }
            ProtocolVersion::V5 => {
                let packet = v5::PublishReceivedPacket::new(packet_id, v5::ReasonCode::Success);
                self.push_send(&packet)
            }
        }
    }

    fn on_publish_ack(&mut self, packet_id: PacketId) -> Result<(), Error> {
        self.require_connected()?;
        if self.store.remove_outbound(packet_id).is_some() {
            self.finish_outbound(packet_id);
        }
        Ok(())
    }

    /// v3.1.1 has no reason codes on PUBREC: the client always replies
    /// PUBREL unconditionally [MQTT-4.3.3-1].
    fn on_publish_received_v3(&mut self, packet_id: PacketId) -> Result<(), Error> {
        self.require_connected()?;
        if let Some(entry) = self.store.get_outbound_mut(packet_id) {
            entry.state = OutboundState::AwaitingPubComp;
        }
        let packet = v3::PublishReleasePacket::new(packet_id);
        self.push_send(&packet)
    }

    fn on_publish_received_v5(&mut self, packet_id: PacketId, reason_code: v5::ReasonCode) -> Result<(), Error> {
        self.require_connected()?;

        if self.store.get_outbound_mut(packet_id).is_none() {
            let packet = v5::PublishReleasePacket::new(packet_id, v5::ReasonCode::PacketIdentifierNotFound);
            return self.push_send(&packet);
        }

        if !reason_code.is_success() {
            self.store.remove_outbound(packet_id);
            self.finish_outbound(packet_id);
            return Ok(());
        }

        if let Some(entry) = self.store.get_outbound_mut(packet_id) {
            entry.state = OutboundState::AwaitingPubComp;
        }
        let packet = v5::PublishReleasePacket::new(packet_id, v5::ReasonCode::Success);
        self.push_send(&packet)
    }

    fn on_publish_release_v3(&mut self, packet_id: PacketId) -> Result<(), Error> {
        self.require_connected()?;
        self.store.clear_inbound_qos2(packet_id);
        let packet = v3::PublishCompletePacket::new(packet_id);
        self.push_send(&packet)
    }

    fn on_publish_release_v5(&mut self, packet_id: PacketId) -> Result<(), Error> {
        self.require_connected()?;
        self.store.clear_inbound_qos2(packet_id);
        let packet = v5::PublishCompletePacket::new(packet_id, v5::ReasonCode::Success);
        self.push_send(&packet)
    }

    fn on_publish_complete(&mut self, packet_id: PacketId) -> Result<(), Error> {
        self.require_connected()?;
        self.store.remove_outbound(packet_id);
        self.finish_outbound(packet_id);
        Ok(())
    }

    fn finish_outbound(&mut self, packet_id: PacketId) {
        self.inflight_outbound = self.inflight_outbound.saturating_sub(1);
        self.packet_ids.release(packet_id);
        self.push(Event::Timer(TimerOp::Cancel {
            id: TimerId::Retry(packet_id),
        }));
        self.push(Event::PublishComplete(packet_id));
        self.push(Event::PacketIdReleased(packet_id));
        self.drain_offline_queue();
    }

    // ---- SUBSCRIBE / UNSUBSCRIBE -------------------------------------------

    fn on_subscribe_v3(&mut self, packet: v3::SubscribePacket) -> Result<(), Error> {
        self.require_connected()?;
        if self.role.is_client() {
            return Err(Error::new(ErrorKind::MalformedInput, "client received SUBSCRIBE"));
        }
        let acks: Vec<v3::SubscribeAck> = packet
            .topics()
            .iter()
            .map(|t| v3::SubscribeAck::QoS(t.qos()))
            .collect();
        let ack = v3::SubscribeAckPacket::with_vec(packet.packet_id(), acks);
        self.push_send(&ack)
    }

    fn on_subscribe_v5(&mut self, packet: v5::SubscribePacket) -> Result<(), Error> {
        self.require_connected()?;
        if self.role.is_client() {
            return Err(Error::new(ErrorKind::MalformedInput, "client received SUBSCRIBE"));
        }
        let reasons: Vec<v5::ReasonCode> = packet.topics().iter().map(|_| v5::ReasonCode::Success).collect();
        let ack = v5::SubscribeAckPacket::new(packet.packet_id(), reasons);
        self.push_send(&ack)
    }

    fn on_subscribe_ack_v3(&mut self, packet: v3::SubscribeAckPacket) -> Result<(), Error> {
        self.require_connected()?;
        self.packet_ids.release(packet.packet_id());
        let results = packet
            .acknowledgements()
            .iter()
            .map(|ack| SubscribeOutcome::V311(*ack))
            .collect();
        self.push(Event::SubscribeResult {
            packet_id: packet.packet_id(),
            results,
        });
        self.push(Event::PacketIdReleased(packet.packet_id()));
        Ok(())
    }

    fn on_subscribe_ack_v5(&mut self, packet: v5::SubscribeAckPacket) -> Result<(), Error> {
        self.require_connected()?;
        self.packet_ids.release(packet.packet_id());
        let results = packet
            .reason_codes()
            .iter()
            .map(|code| SubscribeOutcome::V5(*code))
            .collect();
        self.push(Event::SubscribeResult {
            packet_id: packet.packet_id(),
            results,
        });
        self.push(Event::PacketIdReleased(packet.packet_id()));
        Ok(())
    }

    fn on_unsubscribe_v3(&mut self, packet: v3::UnsubscribePacket) -> Result<(), Error> {
        self.require_connected()?;
        if self.role.is_client() {
            return Err(Error::new(ErrorKind::MalformedInput, "client received UNSUBSCRIBE"));
        }
        let ack = v3::UnsubscribeAckPacket::new(packet.packet_id());
        self.push_send(&ack)
    }

    fn on_unsubscribe_v5(&mut self, packet: v5::UnsubscribePacket) -> Result<(), Error> {
        self.require_connected()?;
        if self.role.is_client() {
            return Err(Error::new(ErrorKind::MalformedInput, "client received UNSUBSCRIBE"));
        }
        let reasons = vec![v5::ReasonCode::Success; packet.topics().len()];
        let ack = v5::UnsubscribeAckPacket::new(packet.packet_id(), reasons);
        self.push_send(&ack)
    }

    fn on_unsubscribe_ack(&mut self, packet_id: PacketId) -> Result<(), Error> {
        self.require_connected()?;
        self.packet_ids.release(packet_id);
        self.push(Event::UnsubscribeResult { packet_id });
        self.push(Event::PacketIdReleased(packet_id));
        Ok(())
    }

    // ---- PING / DISCONNECT -------------------------------------------------

    fn on_ping_request_v3(&mut self) -> Result<(), Error> {
        self.require_connected()?;
        if self.auto_ping_response {
            let packet = v3::PingResponsePacket::new();
            self.push_send(&packet)?;
        }
        Ok(())
    }

    fn on_ping_request_v5(&mut self) -> Result<(), Error> {
        self.require_connected()?;
        if self.auto_ping_response {
            let packet = v5::PingResponsePacket::new();
            self.push_send(&packet)?;
        }
        Ok(())
    }

    fn on_disconnect_from_peer(&mut self) -> Result<(), Error> {
        if self.clean_session {
            self.store.clear();
            self.topic_alias_send.clear();
            self.topic_alias_recv.clear();
            self.offline_queue.clear();
        }
        self.close(None);
        Ok(())
    }

    // ---- host-facing session management -------------------------------

    /// Tell the engine the transport closed or failed without a graceful
    /// DISCONNECT having been exchanged. This is the mandatory entry
    /// point for transport loss: a dropped socket, a read error, anything
    /// the host observes that the engine itself has no way to detect.
    ///
    /// Cancels all timers. If the session does not survive a reconnect
    /// (`clean_session`/`clean_start` was set), also drops the store, the
    /// packet-identifier manager, the topic alias tables, and the offline
    /// queue, the same as a graceful disconnect would.
    pub fn notify_closed(&mut self) {
        if self.status == ConnectionStatus::Disconnected {
            return;
        }
        if self.clean_session {
            self.store.clear();
            self.packet_ids = PacketIdManager::new();
            self.topic_alias_send.clear();
            self.topic_alias_recv.clear();
            self.offline_queue.clear();
        }
        self.close(Some(Error::new(ErrorKind::TransportLoss, "transport closed")));
    }

    /// Reserve and return a fresh packet identifier without sending
    /// anything. `None` once all 65535 identifiers are in flight.
    pub fn acquire_unique_packet_id(&mut self) -> Option<PacketId> {
        self.packet_ids.acquire()
    }

    /// Reserve a specific packet identifier, e.g. one restored from a
    /// persisted session. Returns `false` if it is already in use.
    pub fn register_packet_id(&mut self, id: PacketId) -> bool {
        self.packet_ids.register(id)
    }

    /// Release a packet identifier back to the pool and emit
    /// `Event::PacketIdReleased`, the same as a completed ack cycle does.
    pub fn release_packet_id(&mut self, id: PacketId) {
        self.packet_ids.release(id);
        self.push(Event::PacketIdReleased(id));
    }

    /// Reinstall previously persisted inflight QoS 1/2 entries, marking
    /// each packet identifier as in use. For resuming a session across a
    /// process restart, where the store itself doesn't survive in memory.
    pub fn restore_packets(&mut self, entries: Vec<(PacketId, OutboundEntry)>) {
        for (id, entry) in entries {
            self.packet_ids.mark_in_use(id);
            self.store.insert_outbound(id, entry);
        }
    }

    /// Snapshot the currently stored inflight entries, in replay order,
    /// for persistence across a process restart.
    #[must_use]
    pub fn get_stored_packets(&self) -> Vec<(PacketId, OutboundEntry)> {
        self.store.iter_outbound().map(|(id, entry)| (id, entry.clone())).collect()
    }

    /// Resolve the topic a PUBLISH should be stored under: if `topic` is
    /// empty (an alias-only v5 PUBLISH), look it up by `alias` in the
    /// send-side alias table, since a stored entry must still be
    /// replayable even if the alias mapping itself doesn't survive a
    /// reconnect. Errors if neither a topic nor a resolvable alias exist.
    pub fn regulate_for_store(&self, topic: &str, alias: Option<u16>) -> Result<String, Error> {
        if !topic.is_empty() {
            return Ok(topic.to_string());
        }
        let alias = alias
            .ok_or_else(|| Error::new(ErrorKind::DisallowedAction, "cannot regulate a PUBLISH with no topic and no alias"))?;
        self.topic_alias_send
            .topic_for(alias)
            .map(str::to_string)
            .ok_or_else(|| Error::new(ErrorKind::DisallowedAction, "alias not mapped, cannot regulate for store"))
    }

    /// Whether an outbound PUBLISH with this identifier is still awaiting
    /// some acknowledgement (PUBACK, PUBREC, or PUBCOMP).
    #[must_use]
    pub fn is_publish_processing(&self, id: PacketId) -> bool {
        self.store.get_outbound(id).is_some()
    }

    /// How many more QoS 1/2 PUBLISH packets may be sent right now before
    /// hitting the peer's Receive Maximum. `None` while disconnected.
    #[must_use]
    pub fn get_receive_maximum_vacancy_for_send(&self) -> Option<usize> {
        if self.status != ConnectionStatus::Connected {
            return None;
        }
        Some(usize::from(self.receive_maximum_peer.saturating_sub(self.inflight_outbound)))
    }

    /// Snapshot the packet identifiers currently held for inbound QoS 2
    /// duplicate suppression, for persistence across a process restart.
    #[must_use]
    pub fn get_qos2_publish_handled_pids(&self) -> Vec<PacketId> {
        self.store.inbound_qos2_ids().collect()
    }

    /// Reinstall a previously persisted set of inbound QoS 2 identifiers.
    pub fn restore_qos2_publish_handled_pids(&mut self, ids: &[PacketId]) {
        self.store.restore_inbound_qos2(ids);
    }

    fn require_connected(&self) -> Result<(), Error> {
        if self.status != ConnectionStatus::Connected {
            return Err(Error::new(ErrorKind::MalformedInput, "packet received before CONNACK"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(conn: &mut Connection) -> Vec<Event> {
        let mut events = Vec::new();
        while let Some(event) = conn.poll_event() {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_client_connect_v311() {
        let mut client = Connection::new(Role::Client, ProtocolVersion::V311);
        client.connect("device-1", true, 30).unwrap();
        let events = drain(&mut client);
        assert!(matches!(events[0], Event::Send(_)));
        assert_eq!(client.status(), ConnectionStatus::Connecting);
    }

    #[test]
    fn test_server_accepts_connect_v311() {
        let mut server = Connection::new(Role::Server, ProtocolVersion::V311);
        let mut packet = v3::ConnectPacket::new("device-1").unwrap();
        packet.set_clean_session(true);
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();

        server.receive(&buf).unwrap();
        assert_eq!(server.status(), ConnectionStatus::Connected);
        let events = drain(&mut server);
        assert!(events.iter().any(|e| matches!(e, Event::Send(_))));
    }

    #[test]
    fn test_qos1_publish_roundtrip() {
        let mut client = Connection::new(Role::Client, ProtocolVersion::V311);
        client.connect("c1", true, 0).unwrap();
        drain(&mut client);
        let ack = v3::ConnectAckPacket::new(false, v3::ConnectReturnCode::Accepted);
        let mut buf = Vec::new();
        ack.encode(&mut buf).unwrap();
        client.receive(&buf).unwrap();
        drain(&mut client);

        let packet_id = client.publish("a/b", b"hi", QoS::AtLeastOnce, false).unwrap().unwrap();
        drain(&mut client);
        assert_eq!(client.store.outbound_len(), 1);

        let server_ack = v3::PublishAckPacket::new(packet_id);
        let mut buf = Vec::new();
        server_ack.encode(&mut buf).unwrap();
        client.receive(&buf).unwrap();
        let events = drain(&mut client);
        assert!(events.iter().any(|e| matches!(e, Event::PublishComplete(_))));
        assert_eq!(client.store.outbound_len(), 0);
    }

    #[test]
    fn test_qos2_inbound_duplicate_suppressed() {
        let mut server = Connection::new(Role::Server, ProtocolVersion::V311);
        let mut connect = v3::ConnectPacket::new("c1").unwrap();
        connect.set_clean_session(true);
        let mut buf = Vec::new();
        connect.encode(&mut buf).unwrap();
        server.receive(&buf).unwrap();
        drain(&mut server);

        let mut publish = v3::PublishPacket::new("a/b", QoS::ExactOnce, b"hi").unwrap();
        publish.set_packet_id(PacketId::new(9));
        let mut buf = Vec::new();
        publish.encode(&mut buf).unwrap();

        server.receive(&buf).unwrap();
        let first = drain(&mut server);
        assert!(first.iter().any(|e| matches!(e, Event::Deliver { .. })));

        server.receive(&buf).unwrap();
        let second = drain(&mut server);
        assert!(!second.iter().any(|e| matches!(e, Event::Deliver { .. })));
    }

    #[test]
    fn test_malformed_bytes_close_connection() {
        let mut server = Connection::new(Role::Server, ProtocolVersion::V311);
        let bytes = [0x30, 0xff, 0xff, 0xff, 0xff, 0x7f];
        let err = server.receive(&bytes).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedInput);
        assert_eq!(server.status(), ConnectionStatus::Disconnected);
    }
}
