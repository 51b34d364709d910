/**
 * @file
 * @author Edward A. Lee (eal@berkeley.edu)
 * @author Soroush Bateni (soroush@utdallas.edu)
 * @author Hokeun Kim (hkim501@asu.edu)
 * @author Chanhee Lee (..)
 * @copyright (c) 2020-2023, The University of California at Berkeley
 * License in [BSD 2-clause](..)
 * @brief Message type bytes, rejection reason codes, and the fixed lengths of
 * the messages exchanged between the RTI and federates.
 *
 * Every message starts with a one-byte type. Multi-byte integers are
 * little endian.
 */
use std::mem;

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum MsgType {
    Reject,
    FedIds,
    Timestamp,
    Message,
    Resign,
    TaggedMessage,
    NextEventTag,
    TagAdvanceGrant,
    PropositionalTagAdvanceGrant,
    LatestTagComplete,
    StopRequest,
    StopRequestReply,
    StopGranted,
    AddressQuery,
    AddressAdvertisement,
    P2pSendingFedId,
    P2pMessage,
    P2pTaggedMessage,
    ClockSyncT1,
    ClockSyncT3,
    ClockSyncT4,
    ClockSyncCodedProbe,
    PortAbsent,
    NeighborStructure,
    Failed,
    FedNonce,
    RtiResponse,
    FedResponse,
    UdpPort,
    Ack,
}

impl MsgType {
    pub fn to_byte(&self) -> u8 {
        match self {
            MsgType::Reject => 0,
            MsgType::FedIds => 1,
            MsgType::Timestamp => 2,
            MsgType::Message => 3,
            MsgType::Resign => 4,
            MsgType::TaggedMessage => 5,
            MsgType::NextEventTag => 6,
            MsgType::TagAdvanceGrant => 7,
            MsgType::PropositionalTagAdvanceGrant => 8,
            MsgType::LatestTagComplete => 9,
            MsgType::StopRequest => 10,
            MsgType::StopRequestReply => 11,
            MsgType::StopGranted => 12,
            MsgType::AddressQuery => 13,
            MsgType::AddressAdvertisement => 14,
            MsgType::P2pSendingFedId => 15,
            MsgType::P2pMessage => 16,
            MsgType::P2pTaggedMessage => 17,
            MsgType::ClockSyncT1 => 19,
            MsgType::ClockSyncT3 => 20,
            MsgType::ClockSyncT4 => 21,
            MsgType::ClockSyncCodedProbe => 22,
            MsgType::PortAbsent => 23,
            MsgType::NeighborStructure => 24,
            MsgType::Failed => 25,
            MsgType::FedNonce => 100,
            MsgType::RtiResponse => 101,
            MsgType::FedResponse => 102,
            MsgType::UdpPort => 254,
            MsgType::Ack => 255,
        }
    }

    pub fn to_msg_type(val: u8) -> Option<MsgType> {
        let msg_type = match val {
            0 => MsgType::Reject,
            1 => MsgType::FedIds,
            2 => MsgType::Timestamp,
            3 => MsgType::Message,
            4 => MsgType::Resign,
            5 => MsgType::TaggedMessage,
            6 => MsgType::NextEventTag,
            7 => MsgType::TagAdvanceGrant,
            8 => MsgType::PropositionalTagAdvanceGrant,
            9 => MsgType::LatestTagComplete,
            10 => MsgType::StopRequest,
            11 => MsgType::StopRequestReply,
            12 => MsgType::StopGranted,
            13 => MsgType::AddressQuery,
            14 => MsgType::AddressAdvertisement,
            15 => MsgType::P2pSendingFedId,
            16 => MsgType::P2pMessage,
            17 => MsgType::P2pTaggedMessage,
            19 => MsgType::ClockSyncT1,
            20 => MsgType::ClockSyncT3,
            21 => MsgType::ClockSyncT4,
            22 => MsgType::ClockSyncCodedProbe,
            23 => MsgType::PortAbsent,
            24 => MsgType::NeighborStructure,
            25 => MsgType::Failed,
            100 => MsgType::FedNonce,
            101 => MsgType::RtiResponse,
            102 => MsgType::FedResponse,
            254 => MsgType::UdpPort,
            255 => MsgType::Ack,
            _ => return None,
        };
        Some(msg_type)
    }

    /**
     * Length of the whole message, type byte included, for message types
     * whose size is statically known. Variable-length messages return None.
     */
    pub fn fixed_length(&self) -> Option<usize> {
        let length = match self {
            MsgType::Reject => MSG_TYPE_REJECT_LENGTH,
            MsgType::Timestamp => MSG_TYPE_TIMESTAMP_LENGTH,
            MsgType::Resign | MsgType::Failed | MsgType::Ack => 1,
            MsgType::NextEventTag
            | MsgType::TagAdvanceGrant
            | MsgType::PropositionalTagAdvanceGrant
            | MsgType::LatestTagComplete => MSG_TYPE_TAG_LENGTH,
            MsgType::StopRequest => MSG_TYPE_STOP_REQUEST_LENGTH,
            MsgType::StopRequestReply => MSG_TYPE_STOP_REQUEST_REPLY_LENGTH,
            MsgType::StopGranted => MSG_TYPE_STOP_GRANTED_LENGTH,
            MsgType::AddressQuery => MSG_TYPE_ADDRESS_QUERY_LENGTH,
            MsgType::AddressAdvertisement => MSG_TYPE_ADDRESS_ADVERTISEMENT_LENGTH,
            MsgType::ClockSyncT1 | MsgType::ClockSyncT4 => MSG_TYPE_CLOCK_SYNC_T1_T4_LENGTH,
            MsgType::ClockSyncT3 => MSG_TYPE_CLOCK_SYNC_T3_LENGTH,
            MsgType::ClockSyncCodedProbe => MSG_TYPE_CLOCK_SYNC_CODED_PROBE_LENGTH,
            MsgType::PortAbsent => MSG_TYPE_PORT_ABSENT_LENGTH,
            MsgType::FedNonce => MSG_TYPE_FED_NONCE_LENGTH,
            MsgType::RtiResponse => MSG_TYPE_RTI_RESPONSE_LENGTH,
            MsgType::FedResponse => MSG_TYPE_FED_RESPONSE_LENGTH,
            MsgType::UdpPort => MSG_TYPE_UDP_PORT_LENGTH,
            MsgType::FedIds
            | MsgType::Message
            | MsgType::TaggedMessage
            | MsgType::P2pSendingFedId
            | MsgType::P2pMessage
            | MsgType::P2pTaggedMessage
            | MsgType::NeighborStructure => return None,
        };
        Some(length)
    }
}

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum ErrType {
    FederationIdDoesNotMatch,
    FederateIdInUse,
    FederateIdOutOfRange,
    UnexpectedMessage,
    WrongServer,
    HmacDoesNotMatch,
    RtiNotExecutedWithAuth,
}

impl ErrType {
    pub fn to_byte(&self) -> u8 {
        match self {
            ErrType::FederationIdDoesNotMatch => 1,
            ErrType::FederateIdInUse => 2,
            ErrType::FederateIdOutOfRange => 3,
            ErrType::UnexpectedMessage => 4,
            ErrType::WrongServer => 5,
            ErrType::HmacDoesNotMatch => 6,
            ErrType::RtiNotExecutedWithAuth => 7,
        }
    }

    pub fn to_err_type(val: u8) -> Option<ErrType> {
        match val {
            1 => Some(ErrType::FederationIdDoesNotMatch),
            2 => Some(ErrType::FederateIdInUse),
            3 => Some(ErrType::FederateIdOutOfRange),
            4 => Some(ErrType::UnexpectedMessage),
            5 => Some(ErrType::WrongServer),
            6 => Some(ErrType::HmacDoesNotMatch),
            7 => Some(ErrType::RtiNotExecutedWithAuth),
            _ => None,
        }
    }
}

const TYPE_SIZE: usize = mem::size_of::<u8>();
const FED_ID_SIZE: usize = mem::size_of::<u16>();
const TAG_SIZE: usize = mem::size_of::<i64>() + mem::size_of::<u32>();

pub const MSG_TYPE_REJECT_LENGTH: usize = TYPE_SIZE + 1;
pub const MSG_TYPE_TIMESTAMP_LENGTH: usize = TYPE_SIZE + mem::size_of::<i64>();
pub const MSG_TYPE_TAG_LENGTH: usize = TYPE_SIZE + TAG_SIZE;
pub const MSG_TYPE_STOP_REQUEST_LENGTH: usize = TYPE_SIZE + TAG_SIZE;
pub const MSG_TYPE_STOP_REQUEST_REPLY_LENGTH: usize = TYPE_SIZE + TAG_SIZE;
pub const MSG_TYPE_STOP_GRANTED_LENGTH: usize = TYPE_SIZE + TAG_SIZE;
pub const MSG_TYPE_ADDRESS_QUERY_LENGTH: usize = TYPE_SIZE + FED_ID_SIZE;
pub const MSG_TYPE_ADDRESS_ADVERTISEMENT_LENGTH: usize =
    TYPE_SIZE + FED_ID_SIZE + mem::size_of::<i32>() + 4;
pub const MSG_TYPE_CLOCK_SYNC_T1_T4_LENGTH: usize = TYPE_SIZE + mem::size_of::<i64>();
pub const MSG_TYPE_CLOCK_SYNC_T3_LENGTH: usize = TYPE_SIZE + FED_ID_SIZE + 2 * mem::size_of::<i64>();
pub const MSG_TYPE_CLOCK_SYNC_CODED_PROBE_LENGTH: usize =
    TYPE_SIZE + FED_ID_SIZE + mem::size_of::<i64>();
pub const MSG_TYPE_PORT_ABSENT_LENGTH: usize = TYPE_SIZE + 2 * mem::size_of::<u16>() + TAG_SIZE;
pub const MSG_TYPE_FED_NONCE_LENGTH: usize = TYPE_SIZE + crate::constants::NONCE_LENGTH;
pub const MSG_TYPE_RTI_RESPONSE_LENGTH: usize = TYPE_SIZE + crate::constants::SHA256_HMAC_LENGTH;
pub const MSG_TYPE_FED_RESPONSE_LENGTH: usize =
    TYPE_SIZE + crate::constants::NONCE_LENGTH + crate::constants::SHA256_HMAC_LENGTH;
pub const MSG_TYPE_UDP_PORT_LENGTH: usize = TYPE_SIZE + mem::size_of::<u16>();

/** Type byte, fed ID and the one-byte length of the federation ID. */
pub const MSG_TYPE_FED_IDS_HEADER_LENGTH: usize = TYPE_SIZE + FED_ID_SIZE + 1;

/** Type byte followed by the i32 numbers of upstream and downstream federates. */
pub const MSG_TYPE_NEIGHBOR_STRUCTURE_HEADER_SIZE: usize = TYPE_SIZE + 2 * mem::size_of::<i32>();
pub const NEIGHBOR_STRUCTURE_UPSTREAM_ENTRY_SIZE: usize = FED_ID_SIZE + mem::size_of::<i64>();
pub const NEIGHBOR_STRUCTURE_DOWNSTREAM_ENTRY_SIZE: usize = FED_ID_SIZE;

/** Port ID, federate ID and payload length. */
pub const MESSAGE_HEADER_LENGTH: usize = 2 * mem::size_of::<u16>() + mem::size_of::<i32>();
pub const TIMED_MESSAGE_HEADER_LENGTH: usize = MESSAGE_HEADER_LENGTH + TAG_SIZE;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_msg_type_byte_mapping() {
        for val in 0..=u8::MAX {
            if let Some(msg_type) = MsgType::to_msg_type(val) {
                assert_eq!(val, msg_type.to_byte());
            }
        }
        assert!(MsgType::to_msg_type(18).is_none());
        assert_eq!(Some(MsgType::Ack), MsgType::to_msg_type(255));
    }

    #[test]
    fn test_fixed_lengths() {
        assert_eq!(Some(9), MsgType::Timestamp.fixed_length());
        assert_eq!(Some(13), MsgType::StopRequest.fixed_length());
        assert_eq!(Some(13), MsgType::StopRequestReply.fixed_length());
        assert_eq!(Some(13), MsgType::StopGranted.fixed_length());
        assert_eq!(9, MSG_TYPE_NEIGHBOR_STRUCTURE_HEADER_SIZE);
        assert!(MsgType::TaggedMessage.fixed_length().is_none());
    }

    #[test]
    fn test_err_type_byte_mapping() {
        for val in 1..=7 {
            let err_type = ErrType::to_err_type(val).unwrap();
            assert_eq!(val, err_type.to_byte());
        }
        assert!(ErrType::to_err_type(0).is_none());
    }
}
