// Copyright (c) 2020 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Lesser General Public License that can be found
// in the LICENSE file.

use crate::{ByteArray, DecodeError, DecodePacket, FixedHeader, PacketType, ProtocolLevel};

/// Every packet type decodable in an MQTT 3.1.1 connection, tagged by
/// its fixed header type so a connection engine can dispatch on a single
/// value instead of re-deciding the protocol version and packet type at
/// every call site.
#[derive(Debug)]
pub enum V3Packet {
    Connect(crate::v3::ConnectPacket),
    ConnectAck(crate::v3::ConnectAckPacket),
    Publish(crate::v3::PublishPacket),
    PublishAck(crate::v3::PublishAckPacket),
    PublishReceived(crate::v3::PublishReceivedPacket),
    PublishRelease(crate::v3::PublishReleasePacket),
    PublishComplete(crate::v3::PublishCompletePacket),
    Subscribe(crate::v3::SubscribePacket),
    SubscribeAck(crate::v3::SubscribeAckPacket),
    Unsubscribe(crate::v3::UnsubscribePacket),
    UnsubscribeAck(crate::v3::UnsubscribeAckPacket),
    PingRequest(crate::v3::PingRequestPacket),
    PingResponse(crate::v3::PingResponsePacket),
    Disconnect(crate::v3::DisconnectPacket),
}

/// Every packet type decodable in an MQTT 5.0 connection.
#[derive(Debug)]
pub enum V5Packet {
    Connect(crate::v5::ConnectPacket),
    ConnectAck(crate::v5::ConnectAckPacket),
    Publish(crate::v5::PublishPacket),
    PublishAck(crate::v5::PublishAckPacket),
    PublishReceived(crate::v5::PublishReceivedPacket),
    PublishRelease(crate::v5::PublishReleasePacket),
    PublishComplete(crate::v5::PublishCompletePacket),
    Subscribe(crate::v5::SubscribePacket),
    SubscribeAck(crate::v5::SubscribeAckPacket),
    Unsubscribe(crate::v5::UnsubscribePacket),
    UnsubscribeAck(crate::v5::UnsubscribeAckPacket),
    PingRequest(crate::v5::PingRequestPacket),
    PingResponse(crate::v5::PingResponsePacket),
    Disconnect(crate::v5::DisconnectPacket),
    Auth(crate::v5::AuthPacket),
}

/// A decoded packet, still tagged with which protocol version it was
/// parsed as. A connection engine configured for one version never
/// constructs the other variant.
#[derive(Debug)]
pub enum AnyPacket {
    V3(V3Packet),
    V5(V5Packet),
}

/// Decode a single complete frame (fixed header plus exactly
/// `remaining_length` more bytes) as `level`.
///
/// # Errors
///
/// Returns error if the frame is malformed, uses a packet type not valid
/// for `level` (e.g. AUTH in a v3.1.1 connection), or contains trailing
/// or missing bytes for its declared type.
pub fn decode_packet(level: ProtocolLevel, frame: &[u8]) -> Result<AnyPacket, DecodeError> {
    let mut peek = ByteArray::new(frame);
    let fixed_header = FixedHeader::decode(&mut peek)?;
    if !fixed_header.is_valid_header(level) {
        return Err(DecodeError::InvalidPacketType);
    }

    match level {
        ProtocolLevel::V311 => decode_v3(fixed_header.packet_type(), frame).map(AnyPacket::V3),
        ProtocolLevel::V5 => decode_v5(fixed_header.packet_type(), frame).map(AnyPacket::V5),
    }
}

fn decode_v3(packet_type: PacketType, frame: &[u8]) -> Result<V3Packet, DecodeError> {
    let mut ba = ByteArray::new(frame);
    match packet_type {
        PacketType::Connect => crate::v3::ConnectPacket::decode(&mut ba).map(V3Packet::Connect),
        PacketType::ConnectAck => {
            crate::v3::ConnectAckPacket::decode(&mut ba).map(V3Packet::ConnectAck)
        }
        PacketType::Publish { .. } => {
            crate::v3::PublishPacket::decode(&mut ba).map(V3Packet::Publish)
        }
        PacketType::PublishAck => {
            crate::v3::PublishAckPacket::decode(&mut ba).map(V3Packet::PublishAck)
        }
        PacketType::PublishReceived => {
            crate::v3::PublishReceivedPacket::decode(&mut ba).map(V3Packet::PublishReceived)
        }
        PacketType::PublishRelease => {
            crate::v3::PublishReleasePacket::decode(&mut ba).map(V3Packet::PublishRelease)
        }
        PacketType::PublishComplete => {
            crate::v3::PublishCompletePacket::decode(&mut ba).map(V3Packet::PublishComplete)
        }
        PacketType::Subscribe => {
            crate::v3::SubscribePacket::decode(&mut ba).map(V3Packet::Subscribe)
        }
        PacketType::SubscribeAck => {
            crate::v3::SubscribeAckPacket::decode(&mut ba).map(V3Packet::SubscribeAck)
        }
        PacketType::Unsubscribe => {
            crate::v3::UnsubscribePacket::decode(&mut ba).map(V3Packet::Unsubscribe)
        }
        PacketType::UnsubscribeAck => {
            crate::v3::UnsubscribeAckPacket::decode(&mut ba).map(V3Packet::UnsubscribeAck)
        }
        PacketType::PingRequest => {
            crate::v3::PingRequestPacket::decode(&mut ba).map(V3Packet::PingRequest)
        }
        PacketType::PingResponse => {
            crate::v3::PingResponsePacket::decode(&mut ba).map(V3Packet::PingResponse)
        }
        PacketType::Disconnect => {
            crate::v3::DisconnectPacket::decode(&mut ba).map(V3Packet::Disconnect)
        }
        PacketType::Auth => Err(DecodeError::InvalidPacketType),
    }
}

fn decode_v5(packet_type: PacketType, frame: &[u8]) -> Result<V5Packet, DecodeError> {
    let mut ba = ByteArray::new(frame);
    match packet_type {
        PacketType::Connect => crate::v5::ConnectPacket::decode(&mut ba).map(V5Packet::Connect),
        PacketType::ConnectAck => {
            crate::v5::ConnectAckPacket::decode(&mut ba).map(V5Packet::ConnectAck)
        }
        PacketType::Publish { .. } => {
            crate::v5::PublishPacket::decode(&mut ba).map(V5Packet::Publish)
        }
        PacketType::PublishAck => {
            crate::v5::PublishAckPacket::decode(&mut ba).map(V5Packet::PublishAck)
        }
        PacketType::PublishReceived => {
            crate::v5::PublishReceivedPacket::decode(&mut ba).map(V5Packet::PublishReceived)
        }
        PacketType::PublishRelease => {
            crate::v5::PublishReleasePacket::decode(&mut ba).map(V5Packet::PublishRelease)
        }
        PacketType::PublishComplete => {
            crate::v5::PublishCompletePacket::decode(&mut ba).map(V5Packet::PublishComplete)
        }
        PacketType::Subscribe => {
            crate::v5::SubscribePacket::decode(&mut ba).map(V5Packet::Subscribe)
        }
        PacketType::SubscribeAck => {
            crate::v5::SubscribeAckPacket::decode(&mut ba).map(V5Packet::SubscribeAck)
        }
        PacketType::Unsubscribe => {
            crate::v5::UnsubscribePacket::decode(&mut ba).map(V5Packet::Unsubscribe)
        }
        PacketType::UnsubscribeAck => {
            crate::v5::UnsubscribeAckPacket::decode(&mut ba).map(V5Packet::UnsubscribeAck)
        }
        PacketType::PingRequest => {
            crate::v5::PingRequestPacket::decode(&mut ba).map(V5Packet::PingRequest)
        }
        PacketType::PingResponse => {
            crate::v5::PingResponsePacket::decode(&mut ba).map(V5Packet::PingResponse)
        }
        PacketType::Disconnect => {
            crate::v5::DisconnectPacket::decode(&mut ba).map(V5Packet::Disconnect)
        }
        PacketType::Auth => crate::v5::AuthPacket::decode(&mut ba).map(V5Packet::Auth),
    }
}
