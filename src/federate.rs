/**
 * @file
 * @author Edward A. Lee (eal@berkeley.edu)
 * @author Soroush Bateni (soroush@utdallas.edu)
 * @author Chanhee Lee (chanheel@asu.edu)
 * @author Hokeun Kim (hokeun@asu.edu)
 * @copyright (c) 2020-2023, The University of California at Berkeley
 * License in [BSD 2-clause](..)
 * @brief The federate side of the RTI protocol: joining a federation,
 * reporting tags, exchanging messages through the RTI, and the
 * connections federates make to each other.
 */
use std::collections::VecDeque;
use std::net::{SocketAddr, TcpStream, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info, warn};

use crate::authentication::{federate_response_hmac, random_nonce, verify_rti_response};
use crate::clock_sync::{self, ClockEstimate, SystemClock, TcpClockSyncChannel, UdpClockSyncChannel};
use crate::error::RtiError;
use crate::message::{DataMessage, Message};
use crate::net_common::ErrType;
use crate::net_util::NetUtil;
use crate::socket_common::{connect_to_address, RetryPolicy, Sleeper};
use crate::tag::{Instant, Interval, Tag};

/** How a federate reaches a peer it sends to. */
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum PeerRoute {
    Direct(SocketAddr),
    ViaRti,
}

/**
 * A federate's control connection to the RTI.
 */
pub struct FederateClient {
    fed_id: u16,
    federation_id: String,
    stream: TcpStream,
    // Messages read while waiting for a specific reply.
    pending: VecDeque<Message>,
    start_time: Instant,
}

impl FederateClient {
    /**
     * Connect to the RTI and complete the handshake. With `authenticate`,
     * the nonce challenge is answered with the federation ID as the key.
     */
    pub fn connect(
        address: &str,
        fed_id: u16,
        federation_id: &str,
        authenticate: bool,
        policy: RetryPolicy,
        sleeper: &dyn Sleeper,
    ) -> Result<FederateClient, RtiError> {
        let stream = connect_to_address(address, policy, sleeper)?;
        let mut client = FederateClient {
            fed_id,
            federation_id: String::from(federation_id),
            stream,
            pending: VecDeque::new(),
            start_time: 0,
        };
        client.send(&Message::FedIds {
            fed_id,
            federation_id: String::from(federation_id),
        })?;
        if authenticate {
            client.answer_challenge()?;
        }
        match client.read_message()? {
            Message::Ack => {
                info!("Federate {} joined federation {}.", fed_id, federation_id);
                Ok(client)
            }
            Message::Reject(reason) => Err(RtiError::Rejected(reason)),
            other => Err(RtiError::Protocol(format!(
                "expected ACK from the RTI, got {:?}",
                other.msg_type()
            ))),
        }
    }

    fn answer_challenge(&mut self) -> Result<(), RtiError> {
        let rti_nonce = match self.read_message()? {
            Message::FedNonce(nonce) => nonce,
            Message::Reject(reason) => return Err(RtiError::Rejected(reason)),
            other => {
                return Err(RtiError::Protocol(format!(
                    "expected FED_NONCE from the RTI, got {:?}",
                    other.msg_type()
                )))
            }
        };
        let key = self.federation_id.clone();
        let hmac = federate_response_hmac(key.as_bytes(), self.fed_id, &rti_nonce)?;
        let fed_nonce = random_nonce();
        self.send(&Message::FedResponse {
            nonce: fed_nonce,
            hmac,
        })?;
        match self.read_message()? {
            Message::RtiResponse(hmac) if verify_rti_response(key.as_bytes(), &fed_nonce, &hmac) => {
                Ok(())
            }
            Message::RtiResponse(_) => Err(RtiError::Authentication(ErrType::HmacDoesNotMatch)),
            Message::Reject(reason) => Err(RtiError::Rejected(reason)),
            other => Err(RtiError::Protocol(format!(
                "expected RTI_RESPONSE from the RTI, got {:?}",
                other.msg_type()
            ))),
        }
    }

    pub fn fed_id(&self) -> u16 {
        self.fed_id
    }

    pub fn start_time(&self) -> Instant {
        self.start_time
    }

    pub fn send(&mut self, message: &Message) -> Result<(), RtiError> {
        NetUtil::write_to_socket(&mut self.stream, &message.encode(), self.fed_id)
    }

    fn read_message(&mut self) -> Result<Message, RtiError> {
        Message::read_from(&mut self.stream, self.fed_id)
    }

    /** Next message from the RTI, including any read ahead earlier. */
    pub fn receive(&mut self) -> Result<Message, RtiError> {
        match self.pending.pop_front() {
            Some(message) => Ok(message),
            None => self.read_message(),
        }
    }

    pub fn send_neighbor_structure(
        &mut self,
        upstream: &[(u16, Interval)],
        downstream: &[u16],
    ) -> Result<(), RtiError> {
        self.send(&Message::NeighborStructure {
            upstream: upstream.to_vec(),
            downstream: downstream.to_vec(),
        })
    }

    /**
     * Tell the RTI where runtime clock synchronization messages go. Port 0
     * asks for synchronization at startup only. UDP_PORT_NONE opts out.
     */
    pub fn send_udp_port(&mut self, port: u16) -> Result<(), RtiError> {
        self.send(&Message::UdpPort(port))
    }

    pub fn respond_initial_clock_sync(
        &mut self,
        exchanges: u32,
        coded_probes: bool,
    ) -> Result<Option<ClockEstimate>, RtiError> {
        let mut channel = TcpClockSyncChannel::new(&mut self.stream, self.fed_id);
        clock_sync::respond_initial_clock_sync(
            &mut channel,
            &SystemClock,
            self.fed_id,
            exchanges,
            coded_probes,
        )
    }

    /**
     * Propose a start time and block until the RTI answers with the start
     * time agreed by the whole federation.
     */
    pub fn propose_start_time(&mut self, proposal: Instant) -> Result<Instant, RtiError> {
        self.send(&Message::Timestamp(proposal))?;
        loop {
            match self.read_message()? {
                Message::Timestamp(start_time) => {
                    self.start_time = start_time;
                    info!("Federate {} starts at {}.", self.fed_id, start_time);
                    return Ok(start_time);
                }
                other => self.pending.push_back(other),
            }
        }
    }

    pub fn send_next_event_tag(&mut self, tag: Tag) -> Result<(), RtiError> {
        debug!(
            "Federate {} sending NET {}.",
            self.fed_id,
            tag.elapsed(self.start_time)
        );
        self.send(&Message::NextEventTag(tag))
    }

    pub fn send_latest_tag_complete(&mut self, tag: Tag) -> Result<(), RtiError> {
        self.send(&Message::LatestTagComplete(tag))
    }

    pub fn send_stop_request(&mut self, tag: Tag) -> Result<(), RtiError> {
        self.send(&Message::StopRequest(tag))
    }

    pub fn send_stop_request_reply(&mut self, tag: Tag) -> Result<(), RtiError> {
        self.send(&Message::StopRequestReply(tag))
    }

    pub fn send_tagged_message(
        &mut self,
        dest: u16,
        port_id: u16,
        tag: Tag,
        payload: Vec<u8>,
    ) -> Result<(), RtiError> {
        self.send(&Message::TaggedMessage(
            DataMessage {
                port_id,
                fed_id: dest,
                payload,
            },
            tag,
        ))
    }

    pub fn send_port_absent(&mut self, dest: u16, port_id: u16, tag: Tag) -> Result<(), RtiError> {
        self.send(&Message::PortAbsent {
            port_id,
            fed_id: dest,
            tag,
        })
    }

    pub fn advertise_address(&mut self, port: u16) -> Result<(), RtiError> {
        self.send(&Message::AddressAdvertisement {
            fed_id: self.fed_id,
            port: port.into(),
            ip_addr: std::net::Ipv4Addr::UNSPECIFIED,
        })
    }

    /**
     * Ask the RTI where a peer's server listens, retrying while the peer has
     * not advertised it yet. When retries run out, messages to that peer go
     * through the RTI instead.
     */
    pub fn query_peer_address(
        &mut self,
        remote_fed_id: u16,
        policy: RetryPolicy,
        sleeper: &dyn Sleeper,
    ) -> Result<PeerRoute, RtiError> {
        for attempt in 1..=policy.max_attempts() {
            self.send(&Message::AddressQuery(remote_fed_id))?;
            let (port, ip_addr) = loop {
                match self.read_message()? {
                    Message::AddressAdvertisement {
                        fed_id,
                        port,
                        ip_addr,
                    } if fed_id == remote_fed_id => break (port, ip_addr),
                    other => self.pending.push_back(other),
                }
            };
            if let Ok(port) = u16::try_from(port) {
                return Ok(PeerRoute::Direct(SocketAddr::new(ip_addr.into(), port)));
            }
            debug!(
                "Federate {}: address of federate {} not known yet (attempt {}).",
                self.fed_id, remote_fed_id, attempt
            );
            if attempt < policy.max_attempts() {
                sleeper.sleep(policy.interval());
            }
        }
        warn!(
            "Federate {}: federate {} never advertised its address. Sending through the RTI.",
            self.fed_id, remote_fed_id
        );
        Ok(PeerRoute::ViaRti)
    }

    pub fn resign(mut self) -> Result<(), RtiError> {
        self.send(&Message::Resign)
    }
}

/**
 * Open a direct connection to a peer federate and identify to it.
 */
pub fn connect_to_peer(
    address: &str,
    fed_id: u16,
    federation_id: &str,
    policy: RetryPolicy,
    sleeper: &dyn Sleeper,
) -> Result<TcpStream, RtiError> {
    let mut stream = connect_to_address(address, policy, sleeper)?;
    let hello = Message::P2pSendingFedId {
        fed_id,
        federation_id: String::from(federation_id),
    };
    NetUtil::write_to_socket(&mut stream, &hello.encode(), fed_id)?;
    match Message::read_from(&mut stream, fed_id)? {
        Message::Ack => Ok(stream),
        Message::Reject(reason) => Err(RtiError::Rejected(reason)),
        other => Err(RtiError::Protocol(format!(
            "expected ACK from peer, got {:?}",
            other.msg_type()
        ))),
    }
}

/**
 * Check the identification sent by a peer that connected to this
 * federate's server. Returns the peer's federate ID once acknowledged.
 */
pub fn accept_peer(
    stream: &mut TcpStream,
    federation_id: &str,
    number_of_federates: u16,
) -> Result<u16, RtiError> {
    let verdict = match Message::read_from(stream, u16::MAX)? {
        Message::P2pSendingFedId {
            fed_id,
            federation_id: theirs,
        } => {
            if theirs != federation_id {
                Err(ErrType::FederationIdDoesNotMatch)
            } else if fed_id >= number_of_federates {
                Err(ErrType::FederateIdOutOfRange)
            } else {
                Ok(fed_id)
            }
        }
        _ => Err(ErrType::UnexpectedMessage),
    };
    match verdict {
        Ok(fed_id) => {
            NetUtil::write_to_socket(stream, &Message::Ack.encode(), fed_id)?;
            Ok(fed_id)
        }
        Err(reason) => {
            NetUtil::write_to_socket(stream, &Message::Reject(reason).encode(), u16::MAX)?;
            Err(RtiError::Rejected(reason))
        }
    }
}

/**
 * Answer runtime clock synchronization rounds from the RTI until `stop` is
 * set. Lost datagrams only cost the current round.
 */
pub fn respond_to_clock_sync(
    socket: &UdpSocket,
    rti_addr: SocketAddr,
    fed_id: u16,
    coded_probes: bool,
    stop: &AtomicBool,
) {
    let clock = SystemClock;
    let mut channel = UdpClockSyncChannel::new(socket, rti_addr);
    while !stop.load(Ordering::SeqCst) {
        match clock_sync::ClockSyncChannel::receive_message(&mut channel) {
            Ok(Message::ClockSyncT1(t1)) => {
                if let Err(e) = clock_sync::respond(&mut channel, &clock, fed_id, t1, coded_probes) {
                    debug!("Federate {}: clock sync round failed: {}", fed_id, e);
                }
            }
            Ok(other) => debug!(
                "Federate {}: ignoring {:?} on the clock sync socket.",
                fed_id,
                other.msg_type()
            ),
            Err(e) if e.is_peer_loss() => {}
            Err(e) => debug!("Federate {}: clock sync receive failed: {}", fed_id, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::net::TcpListener;
    use std::thread;

    use crate::socket_common::ThreadSleeper;

    #[test]
    fn test_peer_connection_acknowledged() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            accept_peer(&mut stream, "fed", 3)
        });
        let stream = connect_to_peer(&address, 2, "fed", RetryPolicy::connect(), &ThreadSleeper);
        assert!(stream.is_ok());
        assert_eq!(2, handle.join().unwrap().unwrap());
    }

    #[test]
    fn test_peer_from_other_federation_rejected() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            accept_peer(&mut stream, "fed", 3)
        });
        let result = connect_to_peer(&address, 1, "other", RetryPolicy::connect(), &ThreadSleeper);
        assert!(matches!(
            result,
            Err(RtiError::Rejected(ErrType::FederationIdDoesNotMatch))
        ));
        assert!(handle.join().unwrap().is_err());
    }

    #[test]
    fn test_peer_out_of_range_rejected() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            accept_peer(&mut stream, "fed", 3)
        });
        let result = connect_to_peer(&address, 7, "fed", RetryPolicy::connect(), &ThreadSleeper);
        assert!(matches!(
            result,
            Err(RtiError::Rejected(ErrType::FederateIdOutOfRange))
        ));
        assert!(handle.join().unwrap().is_err());
    }
}
