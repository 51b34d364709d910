/**
 * @file
 * @author Chanhee Lee (chanheel@asu.edu)
 * @author Hokeun Kim (hokeun@asu.edu)
 * @copyright (c) 2023, Arizona State University
 * License in [BSD 2-clause](..)
 * @brief Admission of a connecting federate: federation and federate ID
 * checks, followed by an HMAC nonce challenge when authentication is on.
 *
 * With authentication, after a valid FED_IDS the RTI sends FED_NONCE with a
 * random nonce. The federate answers FED_RESPONSE with its own nonce and
 * HMAC(key, FED_RESPONSE | federate ID | RTI nonce). The RTI verifies it,
 * then proves itself with RTI_RESPONSE carrying HMAC(key, RTI_RESPONSE |
 * federate nonce), and admits the federate with ACK. The key is the
 * federation ID.
 */
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use tracing::{debug, info, warn};

use crate::constants::{NONCE_LENGTH, SHA256_HMAC_LENGTH};
use crate::error::RtiError;
use crate::message::Message;
use crate::net_common::{ErrType, MsgType};

type HmacSha256 = Hmac<Sha256>;

fn new_mac(key: &[u8]) -> Result<HmacSha256, RtiError> {
    HmacSha256::new_from_slice(key).map_err(|_| RtiError::Authentication(ErrType::HmacDoesNotMatch))
}

fn finalize(mac: HmacSha256) -> [u8; SHA256_HMAC_LENGTH] {
    let mut out = [0 as u8; SHA256_HMAC_LENGTH];
    out.copy_from_slice(&mac.finalize().into_bytes());
    out
}

/** HMAC the federate returns over the RTI's nonce. */
pub fn federate_response_hmac(
    key: &[u8],
    fed_id: u16,
    rti_nonce: &[u8; NONCE_LENGTH],
) -> Result<[u8; SHA256_HMAC_LENGTH], RtiError> {
    let mut mac = new_mac(key)?;
    mac.update(&[MsgType::FedResponse.to_byte()]);
    mac.update(&fed_id.to_le_bytes());
    mac.update(rti_nonce);
    Ok(finalize(mac))
}

/** HMAC the RTI returns over the federate's nonce. */
pub fn rti_response_hmac(
    key: &[u8],
    fed_nonce: &[u8; NONCE_LENGTH],
) -> Result<[u8; SHA256_HMAC_LENGTH], RtiError> {
    let mut mac = new_mac(key)?;
    mac.update(&[MsgType::RtiResponse.to_byte()]);
    mac.update(fed_nonce);
    Ok(finalize(mac))
}

/** Check an RTI_RESPONSE on the federate side. */
pub fn verify_rti_response(
    key: &[u8],
    fed_nonce: &[u8; NONCE_LENGTH],
    hmac: &[u8; SHA256_HMAC_LENGTH],
) -> bool {
    match new_mac(key) {
        Ok(mut mac) => {
            mac.update(&[MsgType::RtiResponse.to_byte()]);
            mac.update(fed_nonce);
            mac.verify_slice(hmac).is_ok()
        }
        Err(_) => false,
    }
}

pub fn random_nonce() -> [u8; NONCE_LENGTH] {
    let mut nonce = [0 as u8; NONCE_LENGTH];
    rand::thread_rng().fill_bytes(&mut nonce);
    nonce
}

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum HandshakeState {
    AwaitingFederationId,
    AwaitingFederateId,
    AwaitingHmacResponse(u16),
    Admitted(u16),
    Rejected(ErrType),
}

/**
 * Handshake state for one incoming connection. `process` consumes each
 * message from the federate and returns the messages to send back.
 */
pub struct Handshake {
    state: HandshakeState,
    federation_id: String,
    number_of_federates: i32,
    authentication_enabled: bool,
    rti_nonce: [u8; NONCE_LENGTH],
}

impl Handshake {
    pub fn new(
        federation_id: &str,
        number_of_federates: i32,
        authentication_enabled: bool,
    ) -> Handshake {
        Self::with_nonce(
            federation_id,
            number_of_federates,
            authentication_enabled,
            random_nonce(),
        )
    }

    pub fn with_nonce(
        federation_id: &str,
        number_of_federates: i32,
        authentication_enabled: bool,
        rti_nonce: [u8; NONCE_LENGTH],
    ) -> Handshake {
        Handshake {
            state: HandshakeState::AwaitingFederationId,
            federation_id: String::from(federation_id),
            number_of_federates,
            authentication_enabled,
            rti_nonce,
        }
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    pub fn is_finished(&self) -> bool {
        matches!(
            self.state,
            HandshakeState::Admitted(_) | HandshakeState::Rejected(_)
        )
    }

    fn reject(&mut self, reason: ErrType) -> Vec<Message> {
        self.state = HandshakeState::Rejected(reason);
        vec![Message::Reject(reason)]
    }

    fn admit(&mut self, fed_id: u16, mut replies: Vec<Message>) -> Vec<Message> {
        info!("RTI admitted federate {}.", fed_id);
        self.state = HandshakeState::Admitted(fed_id);
        replies.push(Message::Ack);
        replies
    }

    pub fn process<F>(&mut self, message: Message, is_in_use: F) -> Vec<Message>
    where
        F: Fn(u16) -> bool,
    {
        match (self.state, message) {
            (
                HandshakeState::AwaitingFederationId,
                Message::FedIds {
                    fed_id,
                    federation_id,
                },
            ) => {
                if federation_id != self.federation_id {
                    warn!(
                        "RTI rejected federate {}: federation ID {} does not match {}.",
                        fed_id, federation_id, self.federation_id
                    );
                    return self.reject(ErrType::FederationIdDoesNotMatch);
                }
                self.state = HandshakeState::AwaitingFederateId;
                self.check_federate_id(fed_id, is_in_use)
            }
            (
                HandshakeState::AwaitingFederationId,
                Message::P2pSendingFedId { .. } | Message::P2pMessage(_) | Message::P2pTaggedMessage(..),
            ) => {
                warn!("RTI received a peer-to-peer message. Rejecting as the wrong server.");
                self.reject(ErrType::WrongServer)
            }
            (
                HandshakeState::AwaitingFederationId,
                Message::FedNonce(_) | Message::FedResponse { .. },
            ) if !self.authentication_enabled => {
                warn!("Federate expects authentication, but the RTI runs without it.");
                self.reject(ErrType::RtiNotExecutedWithAuth)
            }
            (HandshakeState::AwaitingHmacResponse(fed_id), Message::FedResponse { nonce, hmac }) => {
                if !self.verify_federate_response(fed_id, &hmac) {
                    warn!("RTI rejected federate {}: HMAC does not match.", fed_id);
                    return self.reject(ErrType::HmacDoesNotMatch);
                }
                match rti_response_hmac(self.federation_id.as_bytes(), &nonce) {
                    Ok(response) => self.admit(fed_id, vec![Message::RtiResponse(response)]),
                    Err(_) => self.reject(ErrType::HmacDoesNotMatch),
                }
            }
            (HandshakeState::Admitted(_), _) | (HandshakeState::Rejected(_), _) => {
                debug!("Ignoring message after the handshake finished.");
                Vec::new()
            }
            (_, other) => {
                warn!(
                    "RTI expected a handshake message but received {:?}.",
                    other.msg_type()
                );
                self.reject(ErrType::UnexpectedMessage)
            }
        }
    }

    fn check_federate_id<F>(&mut self, fed_id: u16, is_in_use: F) -> Vec<Message>
    where
        F: Fn(u16) -> bool,
    {
        if i32::from(fed_id) >= self.number_of_federates {
            warn!(
                "RTI rejected federate {}: ID out of range for {} federates.",
                fed_id, self.number_of_federates
            );
            return self.reject(ErrType::FederateIdOutOfRange);
        }
        if is_in_use(fed_id) {
            warn!("RTI rejected federate {}: ID already in use.", fed_id);
            return self.reject(ErrType::FederateIdInUse);
        }
        if self.authentication_enabled {
            self.state = HandshakeState::AwaitingHmacResponse(fed_id);
            return vec![Message::FedNonce(self.rti_nonce)];
        }
        self.admit(fed_id, Vec::new())
    }

    fn verify_federate_response(&self, fed_id: u16, hmac: &[u8; SHA256_HMAC_LENGTH]) -> bool {
        match new_mac(self.federation_id.as_bytes()) {
            Ok(mut mac) => {
                mac.update(&[MsgType::FedResponse.to_byte()]);
                mac.update(&fed_id.to_le_bytes());
                mac.update(&self.rti_nonce);
                mac.verify_slice(hmac).is_ok()
            }
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::message::DataMessage;
    use crate::tag::Tag;

    const FEDERATION_ID: &str = "Unidentified Federation";
    const RTI_NONCE: [u8; NONCE_LENGTH] = [1, 2, 3, 4, 5, 6, 7, 8];
    const FED_NONCE: [u8; NONCE_LENGTH] = [9, 9, 9, 9, 0, 0, 0, 0];

    fn fed_ids(fed_id: u16, federation_id: &str) -> Message {
        Message::FedIds {
            fed_id,
            federation_id: String::from(federation_id),
        }
    }

    fn none_in_use(_: u16) -> bool {
        false
    }

    #[test]
    fn test_admit_without_authentication() {
        let mut handshake = Handshake::new(FEDERATION_ID, 2, false);
        let replies = handshake.process(fed_ids(1, FEDERATION_ID), none_in_use);
        assert_eq!(vec![Message::Ack], replies);
        assert_eq!(HandshakeState::Admitted(1), handshake.state());
        assert!(handshake.is_finished());
    }

    #[test]
    fn test_wrong_federation_id_rejected() {
        let mut handshake = Handshake::new(FEDERATION_ID, 2, false);
        let replies = handshake.process(fed_ids(0, "Other Federation"), none_in_use);
        assert_eq!(
            vec![Message::Reject(ErrType::FederationIdDoesNotMatch)],
            replies
        );
        assert_eq!(
            HandshakeState::Rejected(ErrType::FederationIdDoesNotMatch),
            handshake.state()
        );
        assert!(handshake
            .process(fed_ids(0, FEDERATION_ID), none_in_use)
            .is_empty());
    }

    #[test]
    fn test_federate_id_out_of_range_and_in_use() {
        let mut out_of_range = Handshake::new(FEDERATION_ID, 2, false);
        assert_eq!(
            vec![Message::Reject(ErrType::FederateIdOutOfRange)],
            out_of_range.process(fed_ids(2, FEDERATION_ID), none_in_use)
        );
        let mut in_use = Handshake::new(FEDERATION_ID, 2, false);
        assert_eq!(
            vec![Message::Reject(ErrType::FederateIdInUse)],
            in_use.process(fed_ids(1, FEDERATION_ID), |id| id == 1)
        );
    }

    #[test]
    fn test_p2p_message_means_wrong_server() {
        let mut handshake = Handshake::new(FEDERATION_ID, 2, false);
        let replies = handshake.process(
            Message::P2pSendingFedId {
                fed_id: 0,
                federation_id: String::from(FEDERATION_ID),
            },
            none_in_use,
        );
        assert_eq!(vec![Message::Reject(ErrType::WrongServer)], replies);
    }

    #[test]
    fn test_unexpected_first_message() {
        let mut handshake = Handshake::new(FEDERATION_ID, 2, false);
        let replies = handshake.process(
            Message::TaggedMessage(
                DataMessage {
                    port_id: 0,
                    fed_id: 1,
                    payload: vec![1],
                },
                Tag::zero_tag(),
            ),
            none_in_use,
        );
        assert_eq!(vec![Message::Reject(ErrType::UnexpectedMessage)], replies);
    }

    #[test]
    fn test_authentication_requested_but_not_enabled() {
        let mut handshake = Handshake::new(FEDERATION_ID, 2, false);
        let replies = handshake.process(Message::FedNonce(FED_NONCE), none_in_use);
        assert_eq!(vec![Message::Reject(ErrType::RtiNotExecutedWithAuth)], replies);
    }

    #[test]
    fn test_hmac_challenge_admits_federate() {
        let mut handshake = Handshake::with_nonce(FEDERATION_ID, 3, true, RTI_NONCE);
        assert_eq!(
            vec![Message::FedNonce(RTI_NONCE)],
            handshake.process(fed_ids(2, FEDERATION_ID), none_in_use)
        );
        assert_eq!(HandshakeState::AwaitingHmacResponse(2), handshake.state());

        let hmac = federate_response_hmac(FEDERATION_ID.as_bytes(), 2, &RTI_NONCE).unwrap();
        let replies = handshake.process(
            Message::FedResponse {
                nonce: FED_NONCE,
                hmac,
            },
            none_in_use,
        );
        assert_eq!(2, replies.len());
        match &replies[0] {
            Message::RtiResponse(response) => {
                assert!(verify_rti_response(
                    FEDERATION_ID.as_bytes(),
                    &FED_NONCE,
                    response
                ))
            }
            other => panic!("unexpected reply {:?}", other),
        }
        assert_eq!(Message::Ack, replies[1]);
        assert_eq!(HandshakeState::Admitted(2), handshake.state());
    }

    #[test]
    fn test_hmac_mismatch_rejected() {
        let mut handshake = Handshake::with_nonce(FEDERATION_ID, 3, true, RTI_NONCE);
        handshake.process(fed_ids(0, FEDERATION_ID), none_in_use);
        // Signed for a different federate ID.
        let hmac = federate_response_hmac(FEDERATION_ID.as_bytes(), 1, &RTI_NONCE).unwrap();
        let replies = handshake.process(
            Message::FedResponse {
                nonce: FED_NONCE,
                hmac,
            },
            none_in_use,
        );
        assert_eq!(vec![Message::Reject(ErrType::HmacDoesNotMatch)], replies);
    }

    #[test]
    fn test_random_nonces_differ() {
        assert_ne!(random_nonce(), random_nonce());
    }
}
