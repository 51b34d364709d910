/**
 * @file
 * @author Chanhee Lee (chanheel@asu.edu)
 * @author Hokeun Kim (hokeun@asu.edu)
 * @copyright (c) 2023, Arizona State University
 * License in [BSD 2-clause](..)
 * @brief Typed messages exchanged between the RTI and federates, with their
 * binary encoding and framing.
 */
use std::io::Read;
use std::mem;
use std::net::Ipv4Addr;

use crate::constants::{
    MAX_MESSAGE_BODY_LENGTH, MAX_NUMBER_OF_FEDERATES, NONCE_LENGTH, SHA256_HMAC_LENGTH,
};
use crate::error::{DecodeError, RtiError};
use crate::net_common::*;
use crate::net_util::{NetUtil, TAG_SIZE};
use crate::tag::{Instant, Interval, Tag, NEVER};

/** Payload-carrying message header (port, destination federate, bytes). */
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct DataMessage {
    pub port_id: u16,
    pub fed_id: u16,
    pub payload: Vec<u8>,
}

#[derive(PartialEq, Eq, Clone, Debug)]
pub enum Message {
    Reject(ErrType),
    FedIds {
        fed_id: u16,
        federation_id: String,
    },
    Timestamp(Instant),
    UntimedMessage(DataMessage),
    Resign,
    TaggedMessage(DataMessage, Tag),
    NextEventTag(Tag),
    TagAdvanceGrant(Tag),
    ProvisionalTagAdvanceGrant(Tag),
    LatestTagComplete(Tag),
    StopRequest(Tag),
    StopRequestReply(Tag),
    StopGranted(Tag),
    AddressQuery(u16),
    AddressAdvertisement {
        fed_id: u16,
        port: i32,
        ip_addr: Ipv4Addr,
    },
    P2pSendingFedId {
        fed_id: u16,
        federation_id: String,
    },
    P2pMessage(DataMessage),
    P2pTaggedMessage(DataMessage, Tag),
    ClockSyncT1(Instant),
    ClockSyncT3 {
        fed_id: u16,
        t2: Instant,
        t3: Instant,
    },
    ClockSyncT4(Instant),
    ClockSyncCodedProbe {
        fed_id: u16,
        send_time: Instant,
    },
    PortAbsent {
        port_id: u16,
        fed_id: u16,
        tag: Tag,
    },
    NeighborStructure {
        upstream: Vec<(u16, Interval)>,
        downstream: Vec<u16>,
    },
    Failed,
    FedNonce([u8; NONCE_LENGTH]),
    RtiResponse([u8; SHA256_HMAC_LENGTH]),
    FedResponse {
        nonce: [u8; NONCE_LENGTH],
        hmac: [u8; SHA256_HMAC_LENGTH],
    },
    UdpPort(u16),
    Ack,
}

impl Message {
    pub fn msg_type(&self) -> MsgType {
        match self {
            Message::Reject(_) => MsgType::Reject,
            Message::FedIds { .. } => MsgType::FedIds,
            Message::Timestamp(_) => MsgType::Timestamp,
            Message::UntimedMessage(_) => MsgType::Message,
            Message::Resign => MsgType::Resign,
            Message::TaggedMessage(..) => MsgType::TaggedMessage,
            Message::NextEventTag(_) => MsgType::NextEventTag,
            Message::TagAdvanceGrant(_) => MsgType::TagAdvanceGrant,
            Message::ProvisionalTagAdvanceGrant(_) => MsgType::PropositionalTagAdvanceGrant,
            Message::LatestTagComplete(_) => MsgType::LatestTagComplete,
            Message::StopRequest(_) => MsgType::StopRequest,
            Message::StopRequestReply(_) => MsgType::StopRequestReply,
            Message::StopGranted(_) => MsgType::StopGranted,
            Message::AddressQuery(_) => MsgType::AddressQuery,
            Message::AddressAdvertisement { .. } => MsgType::AddressAdvertisement,
            Message::P2pSendingFedId { .. } => MsgType::P2pSendingFedId,
            Message::P2pMessage(_) => MsgType::P2pMessage,
            Message::P2pTaggedMessage(..) => MsgType::P2pTaggedMessage,
            Message::ClockSyncT1(_) => MsgType::ClockSyncT1,
            Message::ClockSyncT3 { .. } => MsgType::ClockSyncT3,
            Message::ClockSyncT4(_) => MsgType::ClockSyncT4,
            Message::ClockSyncCodedProbe { .. } => MsgType::ClockSyncCodedProbe,
            Message::PortAbsent { .. } => MsgType::PortAbsent,
            Message::NeighborStructure { .. } => MsgType::NeighborStructure,
            Message::Failed => MsgType::Failed,
            Message::FedNonce(_) => MsgType::FedNonce,
            Message::RtiResponse(_) => MsgType::RtiResponse,
            Message::FedResponse { .. } => MsgType::FedResponse,
            Message::UdpPort(_) => MsgType::UdpPort,
            Message::Ack => MsgType::Ack,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let msg_type = self.msg_type();
        let mut buffer = match msg_type.fixed_length() {
            Some(length) => vec![0 as u8; length],
            None => vec![0 as u8; 1],
        };
        buffer[0] = msg_type.to_byte();
        match self {
            Message::Reject(reason) => buffer[1] = reason.to_byte(),
            Message::FedIds {
                fed_id,
                federation_id,
            }
            | Message::P2pSendingFedId {
                fed_id,
                federation_id,
            } => {
                // The federation ID length travels in a single byte.
                let id_bytes = federation_id.as_bytes();
                let id_len = id_bytes.len().min(u8::MAX as usize);
                buffer.resize(MSG_TYPE_FED_IDS_HEADER_LENGTH, 0);
                NetUtil::encode_uint16(*fed_id, &mut buffer, 1);
                buffer[3] = id_len as u8;
                buffer.extend_from_slice(&id_bytes[..id_len]);
            }
            Message::Timestamp(time)
            | Message::ClockSyncT1(time)
            | Message::ClockSyncT4(time) => NetUtil::encode_int64(*time, &mut buffer, 1),
            Message::UntimedMessage(data) | Message::P2pMessage(data) => {
                buffer.resize(1 + MESSAGE_HEADER_LENGTH, 0);
                Self::encode_data_header(data, &mut buffer);
                buffer.extend_from_slice(&data.payload);
            }
            Message::TaggedMessage(data, tag) | Message::P2pTaggedMessage(data, tag) => {
                buffer.resize(1 + TIMED_MESSAGE_HEADER_LENGTH, 0);
                Self::encode_data_header(data, &mut buffer);
                NetUtil::encode_tag(tag, &mut buffer, 1 + MESSAGE_HEADER_LENGTH);
                buffer.extend_from_slice(&data.payload);
            }
            Message::NextEventTag(tag)
            | Message::TagAdvanceGrant(tag)
            | Message::ProvisionalTagAdvanceGrant(tag)
            | Message::LatestTagComplete(tag)
            | Message::StopRequest(tag)
            | Message::StopRequestReply(tag)
            | Message::StopGranted(tag) => NetUtil::encode_tag(tag, &mut buffer, 1),
            Message::AddressQuery(fed_id) => NetUtil::encode_uint16(*fed_id, &mut buffer, 1),
            Message::AddressAdvertisement {
                fed_id,
                port,
                ip_addr,
            } => {
                NetUtil::encode_uint16(*fed_id, &mut buffer, 1);
                NetUtil::encode_int32(*port, &mut buffer, 3);
                buffer[7..11].copy_from_slice(&ip_addr.octets());
            }
            Message::ClockSyncT3 { fed_id, t2, t3 } => {
                NetUtil::encode_uint16(*fed_id, &mut buffer, 1);
                NetUtil::encode_int64(*t2, &mut buffer, 3);
                NetUtil::encode_int64(*t3, &mut buffer, 3 + mem::size_of::<i64>());
            }
            Message::ClockSyncCodedProbe { fed_id, send_time } => {
                NetUtil::encode_uint16(*fed_id, &mut buffer, 1);
                NetUtil::encode_int64(*send_time, &mut buffer, 3);
            }
            Message::PortAbsent {
                port_id,
                fed_id,
                tag,
            } => {
                NetUtil::encode_uint16(*port_id, &mut buffer, 1);
                NetUtil::encode_uint16(*fed_id, &mut buffer, 3);
                NetUtil::encode_tag(tag, &mut buffer, 5);
            }
            Message::NeighborStructure {
                upstream,
                downstream,
            } => {
                buffer.resize(MSG_TYPE_NEIGHBOR_STRUCTURE_HEADER_SIZE, 0);
                NetUtil::encode_int32(upstream.len() as i32, &mut buffer, 1);
                NetUtil::encode_int32(downstream.len() as i32, &mut buffer, 5);
                for (id, delay) in upstream {
                    let mut entry = [0 as u8; NEIGHBOR_STRUCTURE_UPSTREAM_ENTRY_SIZE];
                    NetUtil::encode_uint16(*id, &mut entry, 0);
                    // No after delay travels as NEVER.
                    NetUtil::encode_int64(delay.unwrap_or(NEVER), &mut entry, 2);
                    buffer.extend_from_slice(&entry);
                }
                for id in downstream {
                    buffer.extend_from_slice(&id.to_le_bytes());
                }
            }
            Message::FedNonce(nonce) => buffer[1..].copy_from_slice(nonce),
            Message::RtiResponse(hmac) => buffer[1..].copy_from_slice(hmac),
            Message::FedResponse { nonce, hmac } => {
                buffer[1..1 + NONCE_LENGTH].copy_from_slice(nonce);
                buffer[1 + NONCE_LENGTH..].copy_from_slice(hmac);
            }
            Message::UdpPort(port) => NetUtil::encode_uint16(*port, &mut buffer, 1),
            Message::Resign | Message::Failed | Message::Ack => {}
        }
        buffer
    }

    fn encode_data_header(data: &DataMessage, buffer: &mut [u8]) {
        NetUtil::encode_uint16(data.port_id, buffer, 1);
        NetUtil::encode_uint16(data.fed_id, buffer, 3);
        NetUtil::encode_int32(data.payload.len() as i32, buffer, 5);
    }

    /**
     * Decode a complete message. The buffer must hold exactly one message,
     * type byte included.
     */
    pub fn decode(buffer: &[u8]) -> Result<Message, DecodeError> {
        let type_byte = match buffer.first() {
            Some(byte) => *byte,
            None => return Err(DecodeError::malformed(0, "empty buffer")),
        };
        let msg_type =
            MsgType::to_msg_type(type_byte).ok_or(DecodeError::UnknownMessageType(type_byte))?;
        if let Some(length) = msg_type.fixed_length() {
            if buffer.len() != length {
                return Err(DecodeError::malformed(
                    type_byte,
                    format!("expected {} bytes, got {}", length, buffer.len()),
                ));
            }
        } else {
            let expected = Self::variable_length(msg_type, buffer)?;
            if buffer.len() != expected {
                return Err(DecodeError::malformed(
                    type_byte,
                    format!("expected {} bytes, got {}", expected, buffer.len()),
                ));
            }
        }
        let body = &buffer[1..];
        let message = match msg_type {
            MsgType::Reject => Message::Reject(
                ErrType::to_err_type(body[0])
                    .ok_or_else(|| DecodeError::malformed(type_byte, "unknown reject reason"))?,
            ),
            MsgType::FedIds => {
                let (fed_id, federation_id) = Self::decode_fed_ids(type_byte, body)?;
                Message::FedIds {
                    fed_id,
                    federation_id,
                }
            }
            MsgType::P2pSendingFedId => {
                let (fed_id, federation_id) = Self::decode_fed_ids(type_byte, body)?;
                Message::P2pSendingFedId {
                    fed_id,
                    federation_id,
                }
            }
            MsgType::Timestamp => Message::Timestamp(NetUtil::extract_int64(body)),
            MsgType::ClockSyncT1 => Message::ClockSyncT1(NetUtil::extract_int64(body)),
            MsgType::ClockSyncT4 => Message::ClockSyncT4(NetUtil::extract_int64(body)),
            MsgType::Message => Message::UntimedMessage(Self::decode_data(body, 0)),
            MsgType::P2pMessage => Message::P2pMessage(Self::decode_data(body, 0)),
            MsgType::TaggedMessage => {
                let tag = NetUtil::extract_tag(&body[MESSAGE_HEADER_LENGTH..]);
                Message::TaggedMessage(Self::decode_data(body, TAG_SIZE), tag)
            }
            MsgType::P2pTaggedMessage => {
                let tag = NetUtil::extract_tag(&body[MESSAGE_HEADER_LENGTH..]);
                Message::P2pTaggedMessage(Self::decode_data(body, TAG_SIZE), tag)
            }
            MsgType::Resign => Message::Resign,
            MsgType::Failed => Message::Failed,
            MsgType::Ack => Message::Ack,
            MsgType::NextEventTag => Message::NextEventTag(NetUtil::extract_tag(body)),
            MsgType::TagAdvanceGrant => Message::TagAdvanceGrant(NetUtil::extract_tag(body)),
            MsgType::PropositionalTagAdvanceGrant => {
                Message::ProvisionalTagAdvanceGrant(NetUtil::extract_tag(body))
            }
            MsgType::LatestTagComplete => Message::LatestTagComplete(NetUtil::extract_tag(body)),
            MsgType::StopRequest => Message::StopRequest(NetUtil::extract_tag(body)),
            MsgType::StopRequestReply => Message::StopRequestReply(NetUtil::extract_tag(body)),
            MsgType::StopGranted => Message::StopGranted(NetUtil::extract_tag(body)),
            MsgType::AddressQuery => Message::AddressQuery(NetUtil::extract_uint16(body)),
            MsgType::AddressAdvertisement => Message::AddressAdvertisement {
                fed_id: NetUtil::extract_uint16(body),
                port: NetUtil::extract_int32(&body[2..]),
                ip_addr: Ipv4Addr::new(body[6], body[7], body[8], body[9]),
            },
            MsgType::ClockSyncT3 => Message::ClockSyncT3 {
                fed_id: NetUtil::extract_uint16(body),
                t2: NetUtil::extract_int64(&body[2..]),
                t3: NetUtil::extract_int64(&body[2 + mem::size_of::<i64>()..]),
            },
            MsgType::ClockSyncCodedProbe => Message::ClockSyncCodedProbe {
                fed_id: NetUtil::extract_uint16(body),
                send_time: NetUtil::extract_int64(&body[2..]),
            },
            MsgType::PortAbsent => Message::PortAbsent {
                port_id: NetUtil::extract_uint16(body),
                fed_id: NetUtil::extract_uint16(&body[2..]),
                tag: NetUtil::extract_tag(&body[4..]),
            },
            MsgType::NeighborStructure => Self::decode_neighbor_structure(body),
            MsgType::FedNonce => {
                let mut nonce = [0 as u8; NONCE_LENGTH];
                nonce.copy_from_slice(body);
                Message::FedNonce(nonce)
            }
            MsgType::RtiResponse => {
                let mut hmac = [0 as u8; SHA256_HMAC_LENGTH];
                hmac.copy_from_slice(body);
                Message::RtiResponse(hmac)
            }
            MsgType::FedResponse => {
                let mut nonce = [0 as u8; NONCE_LENGTH];
                let mut hmac = [0 as u8; SHA256_HMAC_LENGTH];
                nonce.copy_from_slice(&body[..NONCE_LENGTH]);
                hmac.copy_from_slice(&body[NONCE_LENGTH..]);
                Message::FedResponse { nonce, hmac }
            }
            MsgType::UdpPort => Message::UdpPort(NetUtil::extract_uint16(body)),
        };
        Ok(message)
    }

    /**
     * Compute the total length of a variable-length message from its header.
     * `buffer` must contain at least the header; the result includes the
     * type byte.
     */
    fn variable_length(msg_type: MsgType, buffer: &[u8]) -> Result<usize, DecodeError> {
        let header_length = Self::header_length(msg_type);
        if buffer.len() < header_length {
            return Err(DecodeError::malformed(
                msg_type.to_byte(),
                format!("header needs {} bytes, got {}", header_length, buffer.len()),
            ));
        }
        let body_length = Self::length_after_header(msg_type, &buffer[..header_length])?;
        Ok(header_length + body_length)
    }

    /** Number of bytes, type byte included, needed to size a variable-length message. */
    fn header_length(msg_type: MsgType) -> usize {
        match msg_type {
            MsgType::FedIds | MsgType::P2pSendingFedId => MSG_TYPE_FED_IDS_HEADER_LENGTH,
            MsgType::Message | MsgType::P2pMessage => 1 + MESSAGE_HEADER_LENGTH,
            MsgType::TaggedMessage | MsgType::P2pTaggedMessage => 1 + TIMED_MESSAGE_HEADER_LENGTH,
            MsgType::NeighborStructure => MSG_TYPE_NEIGHBOR_STRUCTURE_HEADER_SIZE,
            _ => msg_type.fixed_length().unwrap_or(1),
        }
    }

    fn length_after_header(msg_type: MsgType, header: &[u8]) -> Result<usize, DecodeError> {
        let type_byte = msg_type.to_byte();
        let length = Self::claimed_length_after_header(msg_type, header)?;
        if length > MAX_MESSAGE_BODY_LENGTH {
            return Err(DecodeError::malformed(
                type_byte,
                format!(
                    "body of {} bytes exceeds the limit of {}",
                    length, MAX_MESSAGE_BODY_LENGTH
                ),
            ));
        }
        Ok(length)
    }

    fn claimed_length_after_header(
        msg_type: MsgType,
        header: &[u8],
    ) -> Result<usize, DecodeError> {
        let type_byte = msg_type.to_byte();
        match msg_type {
            MsgType::FedIds | MsgType::P2pSendingFedId => Ok(header[3] as usize),
            MsgType::Message
            | MsgType::P2pMessage
            | MsgType::TaggedMessage
            | MsgType::P2pTaggedMessage => {
                let (_, _, length) = NetUtil::extract_header(&header[1..]);
                usize::try_from(length).map_err(|_| {
                    DecodeError::malformed(type_byte, format!("negative payload length {}", length))
                })
            }
            MsgType::NeighborStructure => {
                let num_upstream = NetUtil::extract_int32(&header[1..]);
                let num_downstream = NetUtil::extract_int32(&header[5..]);
                if num_upstream < 0 || num_downstream < 0 {
                    return Err(DecodeError::malformed(
                        type_byte,
                        "negative number of neighbors",
                    ));
                }
                if num_upstream as usize > MAX_NUMBER_OF_FEDERATES
                    || num_downstream as usize > MAX_NUMBER_OF_FEDERATES
                {
                    return Err(DecodeError::malformed(
                        type_byte,
                        format!(
                            "{} upstream and {} downstream neighbors",
                            num_upstream, num_downstream
                        ),
                    ));
                }
                Ok(num_upstream as usize * NEIGHBOR_STRUCTURE_UPSTREAM_ENTRY_SIZE
                    + num_downstream as usize * NEIGHBOR_STRUCTURE_DOWNSTREAM_ENTRY_SIZE)
            }
            _ => Ok(0),
        }
    }

    fn decode_fed_ids(type_byte: u8, body: &[u8]) -> Result<(u16, String), DecodeError> {
        let fed_id = NetUtil::extract_uint16(body);
        let federation_id = String::from_utf8(body[3..].to_vec())
            .map_err(|_| DecodeError::malformed(type_byte, "federation ID is not UTF-8"))?;
        Ok((fed_id, federation_id))
    }

    fn decode_data(body: &[u8], extra_header: usize) -> DataMessage {
        let (port_id, fed_id, _) = NetUtil::extract_header(body);
        DataMessage {
            port_id,
            fed_id,
            payload: body[MESSAGE_HEADER_LENGTH + extra_header..].to_vec(),
        }
    }

    fn decode_neighbor_structure(body: &[u8]) -> Message {
        let num_upstream = NetUtil::extract_int32(body) as usize;
        let num_downstream = NetUtil::extract_int32(&body[4..]) as usize;
        let mut idx = MSG_TYPE_NEIGHBOR_STRUCTURE_HEADER_SIZE - 1;
        let mut upstream = Vec::with_capacity(num_upstream);
        for _ in 0..num_upstream {
            let id = NetUtil::extract_uint16(&body[idx..]);
            let delay = NetUtil::extract_int64(&body[idx + 2..]);
            upstream.push((id, if delay == NEVER { None } else { Some(delay) }));
            idx += NEIGHBOR_STRUCTURE_UPSTREAM_ENTRY_SIZE;
        }
        let mut downstream = Vec::with_capacity(num_downstream);
        for _ in 0..num_downstream {
            downstream.push(NetUtil::extract_uint16(&body[idx..]));
            idx += NEIGHBOR_STRUCTURE_DOWNSTREAM_ENTRY_SIZE;
        }
        Message::NeighborStructure {
            upstream,
            downstream,
        }
    }

    /**
     * Read exactly one message from a stream. The type byte determines how
     * many more bytes are read before decoding.
     */
    pub fn read_from<R: Read>(stream: &mut R, fed_id: u16) -> Result<Message, RtiError> {
        let mut buffer = vec![0 as u8; 1];
        NetUtil::read_from_socket(stream, &mut buffer, fed_id)?;
        let type_byte = buffer[0];
        let msg_type =
            MsgType::to_msg_type(type_byte).ok_or(DecodeError::UnknownMessageType(type_byte))?;
        let header_length = Self::header_length(msg_type);
        buffer.resize(header_length, 0);
        NetUtil::read_from_socket(stream, &mut buffer[1..], fed_id)?;
        let body_length = Self::length_after_header(msg_type, &buffer)?;
        if body_length > 0 {
            buffer.resize(header_length + body_length, 0);
            NetUtil::read_from_socket(stream, &mut buffer[header_length..], fed_id)?;
        }
        Ok(Self::decode(&buffer)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rand::Rng;

    #[test]
    fn test_stop_granted_layout() {
        let encoded = Message::StopGranted(Tag::new(55, 2)).encode();
        assert_eq!(MSG_TYPE_STOP_GRANTED_LENGTH, encoded.len());
        assert_eq!(MsgType::StopGranted.to_byte(), encoded[0]);
        assert_eq!(55i64.to_le_bytes(), encoded[1..9]);
        assert_eq!(2u32.to_le_bytes(), encoded[9..13]);
    }

    #[test]
    fn test_decode_rejects_wrong_length() {
        let mut encoded = Message::StopRequest(Tag::new(1, 0)).encode();
        encoded.push(0);
        assert!(matches!(
            Message::decode(&encoded),
            Err(DecodeError::MalformedMessage { msg_type: 10, .. })
        ));
        assert!(matches!(
            Message::decode(&encoded[..5]),
            Err(DecodeError::MalformedMessage { .. })
        ));
    }

    #[test]
    fn test_decode_rejects_unknown_type() {
        assert_eq!(
            Err(DecodeError::UnknownMessageType(18)),
            Message::decode(&[18, 0, 0])
        );
    }

    #[test]
    fn test_neighbor_structure_encodes_no_delay_as_never() {
        let message = Message::NeighborStructure {
            upstream: vec![(0, None), (2, Some(0)), (3, Some(1_000))],
            downstream: vec![1],
        };
        let encoded = message.encode();
        assert_eq!(
            MSG_TYPE_NEIGHBOR_STRUCTURE_HEADER_SIZE
                + 3 * NEIGHBOR_STRUCTURE_UPSTREAM_ENTRY_SIZE
                + NEIGHBOR_STRUCTURE_DOWNSTREAM_ENTRY_SIZE,
            encoded.len()
        );
        assert_eq!(NEVER.to_le_bytes(), encoded[11..19]);
        assert_eq!(message, Message::decode(&encoded).unwrap());
    }

    #[test]
    fn test_read_from_frames_tagged_message() {
        let mut rng = rand::thread_rng();
        let payload: Vec<u8> = (0..rng.gen_range(0..512)).map(|_| rng.gen()).collect();
        let tagged = Message::TaggedMessage(
            DataMessage {
                port_id: 4,
                fed_id: 1,
                payload,
            },
            Tag::new(rng.gen_range(0..i64::MAX), 3),
        );
        let mut wire = tagged.encode();
        wire.extend_from_slice(&Message::Resign.encode());
        let mut reader: &[u8] = &wire;
        assert_eq!(tagged, Message::read_from(&mut reader, 0).unwrap());
        assert_eq!(Message::Resign, Message::read_from(&mut reader, 0).unwrap());
        assert!(matches!(
            Message::read_from(&mut reader, 0),
            Err(RtiError::ConnectionClosed(0))
        ));
    }

    #[test]
    fn test_read_from_rejects_negative_payload_length() {
        let mut wire = vec![MsgType::Message.to_byte(), 0, 0, 1, 0];
        wire.extend_from_slice(&(-4i32).to_le_bytes());
        let mut reader: &[u8] = &wire;
        assert!(matches!(
            Message::read_from(&mut reader, 0),
            Err(RtiError::Decode(DecodeError::MalformedMessage { .. }))
        ));
    }

    #[test]
    fn test_read_from_refuses_oversized_payload() {
        let mut wire = vec![MsgType::Message.to_byte(), 0, 0, 1, 0];
        wire.extend_from_slice(&i32::MAX.to_le_bytes());
        let mut reader: &[u8] = &wire;
        assert!(matches!(
            Message::read_from(&mut reader, 0),
            Err(RtiError::Decode(DecodeError::MalformedMessage { msg_type: 3, .. }))
        ));

        let mut wire = vec![MsgType::TaggedMessage.to_byte(), 0, 0, 1, 0];
        wire.extend_from_slice(&((MAX_MESSAGE_BODY_LENGTH + 1) as i32).to_le_bytes());
        wire.extend_from_slice(&[0; TAG_SIZE]);
        let mut reader: &[u8] = &wire;
        assert!(matches!(
            Message::read_from(&mut reader, 0),
            Err(RtiError::Decode(DecodeError::MalformedMessage { .. }))
        ));
    }

    #[test]
    fn test_read_from_refuses_too_many_neighbors() {
        let mut wire = vec![MsgType::NeighborStructure.to_byte()];
        wire.extend_from_slice(&i32::MAX.to_le_bytes());
        wire.extend_from_slice(&0i32.to_le_bytes());
        let mut reader: &[u8] = &wire;
        assert!(matches!(
            Message::read_from(&mut reader, 0),
            Err(RtiError::Decode(DecodeError::MalformedMessage { .. }))
        ));
    }

    #[test]
    fn test_payload_at_the_limit_is_framed() {
        let mut wire = vec![MsgType::Message.to_byte(), 0, 0, 1, 0];
        wire.extend_from_slice(&(MAX_MESSAGE_BODY_LENGTH as i32).to_le_bytes());
        assert_eq!(
            Ok(1 + MESSAGE_HEADER_LENGTH + MAX_MESSAGE_BODY_LENGTH),
            Message::variable_length(MsgType::Message, &wire)
        );
    }

    #[test]
    fn test_fed_ids_and_address_advertisement() {
        let fed_ids = Message::FedIds {
            fed_id: 7,
            federation_id: String::from("Unidentified Federation"),
        };
        let encoded = fed_ids.encode();
        assert_eq!(MSG_TYPE_FED_IDS_HEADER_LENGTH + 23, encoded.len());
        assert_eq!(fed_ids, Message::decode(&encoded).unwrap());

        let advertisement = Message::AddressAdvertisement {
            fed_id: 2,
            port: -1,
            ip_addr: Ipv4Addr::LOCALHOST,
        };
        let encoded = advertisement.encode();
        assert_eq!(MSG_TYPE_ADDRESS_ADVERTISEMENT_LENGTH, encoded.len());
        assert_eq!(advertisement, Message::decode(&encoded).unwrap());
    }
}
