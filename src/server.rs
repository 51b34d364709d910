/**
 * @file
 * @author Edward A. Lee (eal@berkeley.edu)
 * @author Hokeun Kim (hkim501@asu.edu)
 * @author Chanhee Lee (chanheel@asu.edu)
 * @copyright (c) 2023, Arizona State University
 * License in [BSD 2-clause](..)
 * @brief The RTI socket server: admission of federates, one thread per
 * federate handling its messages, and the startup and shutdown sequence.
 */
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError, RwLock};
use std::thread;
use std::thread::JoinHandle;

use tracing::{debug, error, info, warn};

use crate::authentication::{Handshake, HandshakeState};
use crate::clock_sync::{self, SystemClock, TcpClockSyncChannel};
use crate::constants::*;
use crate::error::RtiError;
use crate::message::{DataMessage, Message};
use crate::net_common::ErrType;
use crate::net_util::NetUtil;
use crate::rti_common::SchedulingNodeState;
use crate::rti_remote::RTIRemote;
use crate::socket_common::{
    create_server_tcp, create_server_udp, set_tcp_timeout, RetryPolicy, ThreadSleeper,
};
use crate::stop::StopPhase;
use crate::tag::{Instant, StartTime, Tag, NEVER};
use crate::trace::{TraceDirection, TraceEvent};
use crate::ClockSyncStat;

/** Federate ID used in errors before a connection has identified itself. */
const UNIDENTIFIED_FEDERATE: u16 = u16::MAX;

/** Start time agreed by all federates, NEVER until the last one proposes. */
type StartTimeBarrier = Arc<(Mutex<StartTime>, Condvar)>;

pub struct Server {
    listener: TcpListener,
    port: u16,
}

impl Server {
    pub fn create_server(port: u16) -> Result<Server, RtiError> {
        let (listener, port) = create_server_tcp(port, RetryPolicy::bind(), &ThreadSleeper)?;
        Ok(Server { listener, port })
    }

    /** Serve on a socket that is already bound. */
    pub fn with_listener(listener: TcpListener) -> Result<Server, RtiError> {
        let port = listener.local_addr()?.port();
        Ok(Server { listener, port })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /**
     * Admit the expected number of federates, run the federation until all
     * of them have disconnected, then shut down.
     */
    pub fn wait_for_federates(&mut self, mut rti: RTIRemote) -> Result<(), RtiError> {
        rti.set_final_port_tcp(self.port);
        if rti.clock_sync_global_status() == ClockSyncStat::ClockSyncOn {
            let (socket, udp_port) = create_server_udp(
                self.port,
                RetryPolicy::new(1, DELAY_BETWEEN_SOCKET_RETRIES),
                &ThreadSleeper,
            )?;
            rti.set_final_port_udp(udp_port);
            rti.set_socket_descriptor_udp(Some(socket));
        }

        let arc_rti = Arc::new(RwLock::new(rti));
        let streams = self.connect_to_federates(&arc_rti)?;
        info!("RTI: All expected federates have connected. Starting execution.");

        {
            let mut locked_rti = arc_rti.write().unwrap_or_else(PoisonError::into_inner);
            if let Err(e) = locked_rti.base_mut().check_zero_delay_cycles() {
                error!("RTI: {}. Shutting down the federation.", e);
                let number_of_federates = locked_rti.base().scheduling_nodes().len();
                for id in 0..number_of_federates {
                    locked_rti.base_mut().scheduling_nodes_mut()[id].close_stream();
                }
                locked_rti.base_mut().trace().stop_trace();
                return Err(e);
            }
        }

        let start_time: StartTimeBarrier = Arc::new((Mutex::new(StartTime::new()), Condvar::new()));
        let mut handles: Vec<JoinHandle<()>> = Vec::new();
        for (fed_id, stream) in streams {
            let cloned_rti = Arc::clone(&arc_rti);
            let cloned_start_time = Arc::clone(&start_time);
            handles.push(
                thread::Builder::new()
                    .name(format!("federate-{}", fed_id))
                    .spawn(move || {
                        Self::federate_thread(cloned_rti, fed_id, stream, cloned_start_time)
                    })?,
            );
        }

        let all_federates_exited = Arc::new(AtomicBool::new(false));
        let clock_sync_handle = self.start_clock_sync_thread(&arc_rti, &all_federates_exited);

        // The socket server will not accept any more federates. Connections
        // from federates of other federations are answered by a separate
        // thread until shutdown.
        let responder_handle = match self.listener.try_clone() {
            Ok(listener) => {
                let exited = Arc::clone(&all_federates_exited);
                Some(thread::spawn(move || {
                    Self::respond_to_erroneous_connections(listener, exited)
                }))
            }
            Err(e) => {
                warn!("RTI: Cannot answer erroneous connections: {}", e);
                None
            }
        };

        for handle in handles {
            if handle.join().is_err() {
                error!("RTI: A federate thread panicked.");
            }
        }
        all_federates_exited.store(true, Ordering::SeqCst);
        info!("RTI: All federates have exited.");

        for handle in [responder_handle, clock_sync_handle].into_iter().flatten() {
            if handle.join().is_err() {
                error!("RTI: A helper thread panicked.");
            }
        }

        let mut locked_rti = arc_rti.write().unwrap_or_else(PoisonError::into_inner);
        locked_rti.base_mut().set_stop_phase(StopPhase::Terminated);
        locked_rti.base_mut().trace().stop_trace();
        Ok(())
    }

    /**
     * Accept connections until every federate has been admitted. A
     * connection that fails admission is dropped and does not count.
     * Returns the read half of each admitted federate's control connection.
     */
    fn connect_to_federates(
        &mut self,
        rti: &Arc<RwLock<RTIRemote>>,
    ) -> Result<Vec<(u16, TcpStream)>, RtiError> {
        let number_of_federates = {
            let locked_rti = rti.read().unwrap_or_else(PoisonError::into_inner);
            locked_rti.base().number_of_scheduling_nodes() as usize
        };
        let mut streams = Vec::with_capacity(number_of_federates);
        while streams.len() < number_of_federates {
            // Blocks until a federate connects.
            let (mut stream, peer) = self.listener.accept()?;
            info!("RTI: New connection from {}.", peer);
            match Self::admit_federate(rti, &mut stream, peer) {
                Ok(Some(fed_id)) => streams.push((fed_id, stream)),
                Ok(None) => {}
                Err(e) => warn!("RTI: Dropped connection from {}: {}", peer, e),
            }
        }
        Ok(streams)
    }

    /**
     * Run the startup protocol on a new connection: handshake, neighbor
     * structure, UDP port, and initial clock synchronization. On success the
     * federate's record holds the write half of the connection and the
     * federate is waiting for its start time.
     */
    fn admit_federate(
        rti: &Arc<RwLock<RTIRemote>>,
        stream: &mut TcpStream,
        peer: SocketAddr,
    ) -> Result<Option<u16>, RtiError> {
        set_tcp_timeout(stream, Some(TCP_TIMEOUT_TIME))?;
        let fed_id = match Self::receive_and_check_fed_id_message(rti, stream)? {
            Some(fed_id) => fed_id,
            None => return Ok(None),
        };
        let (upstream, downstream) = match Message::read_from(stream, fed_id)? {
            Message::NeighborStructure {
                upstream,
                downstream,
            } => (upstream, downstream),
            other => {
                Self::send_reject(stream, fed_id, ErrType::UnexpectedMessage);
                return Err(RtiError::Protocol(format!(
                    "expected neighbor structure from federate {}, got {:?}",
                    fed_id,
                    other.msg_type()
                )));
            }
        };
        let udp_port = match Message::read_from(stream, fed_id)? {
            Message::UdpPort(port) => port,
            other => {
                Self::send_reject(stream, fed_id, ErrType::UnexpectedMessage);
                return Err(RtiError::Protocol(format!(
                    "expected UDP port from federate {}, got {:?}",
                    fed_id,
                    other.msg_type()
                )));
            }
        };
        let checked = {
            let locked_rti = rti.read().unwrap_or_else(PoisonError::into_inner);
            locked_rti
                .base()
                .check_neighbor_structure(fed_id, &upstream, &downstream)
        };
        if let Err(e) = checked {
            Self::send_reject(stream, fed_id, ErrType::UnexpectedMessage);
            return Err(e);
        }
        debug!(
            "RTI: Federate {} has {} upstream and {} downstream federates.",
            fed_id,
            upstream.len(),
            downstream.len()
        );

        let (clock_sync, exchanges, coded_probes, idle_timeout) = {
            let locked_rti = rti.read().unwrap_or_else(PoisonError::into_inner);
            (
                locked_rti.clock_sync_global_status(),
                locked_rti.clock_sync_exchanges_per_interval(),
                locked_rti.clock_sync_coded_probes(),
                locked_rti.idle_timeout(),
            )
        };
        let mut estimate = None;
        let mut runtime_sync_addr = None;
        if clock_sync != ClockSyncStat::ClockSyncOff && udp_port != UDP_PORT_NONE {
            let mut channel = TcpClockSyncChannel::new(stream, fed_id);
            estimate = clock_sync::initial_clock_sync(
                &mut channel,
                &SystemClock,
                fed_id,
                exchanges,
                coded_probes,
            )?;
            // Port 0 asks for synchronization at startup only.
            if clock_sync == ClockSyncStat::ClockSyncOn && udp_port != 0 {
                runtime_sync_addr = Some(SocketAddr::new(peer.ip(), udp_port));
            }
        }

        set_tcp_timeout(stream, idle_timeout)?;
        let write_half = stream.try_clone()?;
        let mut locked_rti = rti.write().unwrap_or_else(PoisonError::into_inner);
        let fed = &mut locked_rti.base_mut().scheduling_nodes_mut()[fed_id as usize];
        fed.node_mut().set_neighbors(&upstream, &downstream);
        if let Some(estimate) = estimate {
            fed.set_clock_estimate(estimate);
        }
        fed.set_clock_synchronization_enabled(runtime_sync_addr.is_some());
        fed.set_udp_addr(runtime_sync_addr);
        fed.set_stream(write_half);
        fed.node_mut().set_state(SchedulingNodeState::Pending);
        Ok(Some(fed_id))
    }

    /**
     * Drive the handshake until the federate is admitted or rejected.
     * Returns the federate ID if it was admitted.
     */
    fn receive_and_check_fed_id_message(
        rti: &Arc<RwLock<RTIRemote>>,
        stream: &mut TcpStream,
    ) -> Result<Option<u16>, RtiError> {
        let mut handshake = {
            let locked_rti = rti.read().unwrap_or_else(PoisonError::into_inner);
            Handshake::new(
                &locked_rti.federation_id(),
                locked_rti.base().number_of_scheduling_nodes(),
                locked_rti.authentication_enabled(),
            )
        };
        while !handshake.is_finished() {
            let message = Message::read_from(stream, UNIDENTIFIED_FEDERATE)?;
            let replies = {
                let locked_rti = rti.read().unwrap_or_else(PoisonError::into_inner);
                handshake.process(message, |id| {
                    locked_rti.base().scheduling_nodes()[id as usize].is_in_use()
                })
            };
            for reply in &replies {
                NetUtil::write_to_socket(stream, &reply.encode(), UNIDENTIFIED_FEDERATE)?;
            }
        }
        match handshake.state() {
            HandshakeState::Admitted(fed_id) => {
                let mut locked_rti = rti.write().unwrap_or_else(PoisonError::into_inner);
                let zero = Tag::zero_tag();
                locked_rti.trace(TraceEvent::ReceiveFedId, fed_id, &zero, TraceDirection::From);
                locked_rti.trace(TraceEvent::SendAck, fed_id, &zero, TraceDirection::To);
                Ok(Some(fed_id))
            }
            HandshakeState::Rejected(reason) => {
                info!("RTI: Rejected a federate: {:?}.", reason);
                Ok(None)
            }
            _ => Ok(None),
        }
    }

    fn send_reject(stream: &mut TcpStream, fed_id: u16, reason: ErrType) {
        if let Err(e) =
            NetUtil::write_to_socket(stream, &Message::Reject(reason).encode(), fed_id)
        {
            debug!("RTI: Failed to send reject to federate {}: {}", fed_id, e);
        }
    }

    fn start_clock_sync_thread(
        &self,
        rti: &Arc<RwLock<RTIRemote>>,
        all_federates_exited: &Arc<AtomicBool>,
    ) -> Option<JoinHandle<()>> {
        let socket = {
            let mut locked_rti = rti.write().unwrap_or_else(PoisonError::into_inner);
            let any_enabled = locked_rti
                .base()
                .scheduling_nodes()
                .iter()
                .any(|fed| fed.clock_synchronization_enabled());
            if !any_enabled {
                return None;
            }
            match locked_rti.socket_descriptor_udp().as_ref().map(|s| s.try_clone()) {
                Some(Ok(socket)) => socket,
                Some(Err(e)) => {
                    warn!("RTI: Runtime clock synchronization disabled: {}", e);
                    return None;
                }
                None => return None,
            }
        };
        let cloned_rti = Arc::clone(rti);
        let exited = Arc::clone(all_federates_exited);
        Some(thread::spawn(move || {
            clock_sync::clock_synchronization_thread(cloned_rti, socket, exited)
        }))
    }

    /**
     * Reject every connection that arrives after the federation is
     * complete, until all federates have exited.
     */
    fn respond_to_erroneous_connections(listener: TcpListener, all_federates_exited: Arc<AtomicBool>) {
        if let Err(e) = listener.set_nonblocking(true) {
            warn!("RTI: Cannot answer erroneous connections: {}", e);
            return;
        }
        while !all_federates_exited.load(Ordering::SeqCst) {
            match listener.accept() {
                Ok((mut stream, peer)) => {
                    warn!("RTI received an unexpected connection request from {}. Federation is running.", peer);
                    if stream.set_nonblocking(false).is_ok() {
                        Self::send_reject(
                            &mut stream,
                            UNIDENTIFIED_FEDERATE,
                            ErrType::FederationIdDoesNotMatch,
                        );
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    thread::sleep(DELAY_BETWEEN_SOCKET_RETRIES);
                }
                Err(e) => {
                    debug!("RTI: Accept failed: {}", e);
                    thread::sleep(DELAY_BETWEEN_SOCKET_RETRIES);
                }
            }
        }
    }

    /**
     * Handle messages from one federate until it disconnects.
     */
    fn federate_thread(
        rti: Arc<RwLock<RTIRemote>>,
        fed_id: u16,
        mut stream: TcpStream,
        start_time: StartTimeBarrier,
    ) {
        loop {
            let message = match Message::read_from(&mut stream, fed_id) {
                Ok(message) => message,
                Err(e) => {
                    let mut locked_rti = rti.write().unwrap_or_else(PoisonError::into_inner);
                    if locked_rti.base().node(fed_id).state() != SchedulingNodeState::NotConnected {
                        if e.is_timeout() {
                            warn!(
                                "RTI: Federate {} has been silent for too long. Treating it as lost.",
                                fed_id
                            );
                        } else if e.is_peer_loss() {
                            warn!("RTI: Connection to federate {} lost: {}", fed_id, e);
                        } else {
                            warn!("RTI: Invalid message from federate {}: {}", fed_id, e);
                            let unidentified = Tag::never_tag();
                            locked_rti.trace(
                                TraceEvent::ReceiveUnidentified,
                                fed_id,
                                &unidentified,
                                TraceDirection::From,
                            );
                            Self::reject_unexpected(&mut locked_rti, fed_id);
                        }
                        locked_rti.handle_federate_disconnected(fed_id);
                    }
                    break;
                }
            };
            match message {
                Message::Timestamp(timestamp) => {
                    Self::handle_timestamp(&rti, fed_id, timestamp, &start_time)
                }
                message => {
                    let mut locked_rti = rti.write().unwrap_or_else(PoisonError::into_inner);
                    Self::handle_message(&mut locked_rti, fed_id, message, &stream);
                }
            }
            let locked_rti = rti.read().unwrap_or_else(PoisonError::into_inner);
            if locked_rti.base().node(fed_id).state() == SchedulingNodeState::NotConnected {
                break;
            }
        }
        info!("RTI: Federate {} thread exited.", fed_id);
    }

    fn reject_unexpected(rti: &mut RTIRemote, fed_id: u16) {
        let never = Tag::never_tag();
        rti.trace(TraceEvent::SendReject, fed_id, &never, TraceDirection::To);
        if let Err(e) = rti.send_to_federate(fed_id, &Message::Reject(ErrType::UnexpectedMessage)) {
            debug!("RTI: Failed to send reject to federate {}: {}", fed_id, e);
        }
    }

    /**
     * Dispatch one message from a federate that is past startup.
     */
    pub fn handle_message(rti: &mut RTIRemote, fed_id: u16, message: Message, stream: &TcpStream) {
        match message {
            Message::AddressQuery(remote_fed_id) => {
                Self::handle_address_query(rti, fed_id, remote_fed_id)
            }
            Message::AddressAdvertisement { port, ip_addr, .. } => {
                let ip_addr = match stream.peer_addr() {
                    Ok(SocketAddr::V4(addr)) if ip_addr.is_unspecified() => *addr.ip(),
                    _ => ip_addr,
                };
                Self::handle_address_ad(rti, fed_id, port, ip_addr)
            }
            Message::TaggedMessage(data, tag) => Self::handle_timed_message(rti, fed_id, data, tag),
            Message::UntimedMessage(data) => Self::handle_untimed_message(rti, fed_id, data),
            Message::PortAbsent {
                port_id,
                fed_id: dest,
                tag,
            } => Self::handle_port_absent(rti, fed_id, port_id, dest, tag),
            Message::NextEventTag(tag) => Self::handle_next_event_tag(rti, fed_id, tag),
            Message::LatestTagComplete(tag) => Self::handle_latest_tag_complete(rti, fed_id, tag),
            Message::StopRequest(tag) => rti.handle_stop_request(fed_id, tag),
            Message::StopRequestReply(tag) => rti.handle_stop_request_reply(fed_id, tag),
            Message::Resign => {
                let tag = rti.base().node(fed_id).completed();
                rti.trace(TraceEvent::ReceiveResign, fed_id, &tag, TraceDirection::From);
                info!("RTI: Federate {} has resigned.", fed_id);
                rti.handle_federate_disconnected(fed_id);
            }
            Message::Failed => {
                let tag = rti.base().node(fed_id).completed();
                rti.trace(TraceEvent::ReceiveFailed, fed_id, &tag, TraceDirection::From);
                error!("RTI: Federate {} reported an error and has exited.", fed_id);
                rti.handle_federate_disconnected(fed_id);
            }
            other => {
                warn!(
                    "RTI received from federate {} an unrecognized TCP message type: {:?}.",
                    fed_id,
                    other.msg_type()
                );
                let never = Tag::never_tag();
                rti.trace(TraceEvent::ReceiveUnidentified, fed_id, &never, TraceDirection::From);
                Self::reject_unexpected(rti, fed_id);
                rti.handle_federate_disconnected(fed_id);
            }
        }
    }

    /**
     * Collect start time proposals. The last federate to propose releases
     * everyone with the maximum proposal plus DELAY_START. The federate is
     * then sent its start time and can be granted tags.
     */
    fn handle_timestamp(
        rti: &Arc<RwLock<RTIRemote>>,
        fed_id: u16,
        timestamp: Instant,
        start_time: &StartTimeBarrier,
    ) {
        {
            let mut locked_rti = rti.write().unwrap_or_else(PoisonError::into_inner);
            let tag = Tag::new(timestamp, 0);
            locked_rti.trace(TraceEvent::ReceiveTimestamp, fed_id, &tag, TraceDirection::From);
            if locked_rti.base().node(fed_id).state() != SchedulingNodeState::Pending {
                warn!("RTI: Federate {} proposed a start time twice. Ignoring.", fed_id);
                return;
            }
            info!("RTI received timestamp message with time: {}.", timestamp);
            let num_feds_proposed_start = locked_rti.num_feds_proposed_start() + 1;
            locked_rti.set_num_feds_proposed_start(num_feds_proposed_start);
            if timestamp > locked_rti.max_start_time() {
                locked_rti.set_max_start_time(timestamp);
            }
            if num_feds_proposed_start == locked_rti.base().number_of_scheduling_nodes() {
                // All federates have proposed a start time.
                let agreed = locked_rti.max_start_time() + DELAY_START;
                locked_rti.set_start_time(agreed);
                let (lock, condvar) = &**start_time;
                lock.lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .set_start_time(agreed);
                condvar.notify_all();
            }
        }

        let agreed = {
            let (lock, condvar) = &**start_time;
            let mut decided = lock.lock().unwrap_or_else(PoisonError::into_inner);
            while decided.start_time() == NEVER {
                decided = condvar
                    .wait(decided)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            decided.start_time()
        };

        let mut locked_rti = rti.write().unwrap_or_else(PoisonError::into_inner);
        let tag = Tag::new(agreed, 0);
        locked_rti.trace(TraceEvent::SendTimestamp, fed_id, &tag, TraceDirection::To);
        if let Err(e) = locked_rti.send_to_federate(fed_id, &Message::Timestamp(agreed)) {
            error!("Failed to send the starting time to federate {}: {}", fed_id, e);
            locked_rti.handle_federate_disconnected(fed_id);
            return;
        }
        info!("RTI sent start time {} to federate {}.", agreed, fed_id);
        locked_rti.base_mut().node_mut(fed_id).set_state(SchedulingNodeState::Granted);
        // Grants held back while the federate was waiting can go out now.
        let mut grants = Vec::new();
        locked_rti
            .base_mut()
            .notify_advance_grant_if_safe(fed_id, agreed, &mut grants);
        locked_rti.send_grants(grants);
        locked_rti.request_configured_stop();
    }

    /**
     * Answer a query for the server port and address of another federate.
     * The port is -1 if that federate has not advertised it yet.
     */
    pub fn handle_address_query(rti: &mut RTIRemote, fed_id: u16, remote_fed_id: u16) {
        let never = Tag::never_tag();
        rti.trace(TraceEvent::ReceiveAdrQr, fed_id, &never, TraceDirection::From);
        let (port, ip_addr) = match rti.base().scheduling_nodes().get(remote_fed_id as usize) {
            Some(remote) => (remote.server_port(), remote.server_ip_addr()),
            None => {
                warn!(
                    "RTI: Federate {} asked for the address of unknown federate {}.",
                    fed_id, remote_fed_id
                );
                (-1, Ipv4Addr::UNSPECIFIED)
            }
        };
        debug!(
            "RTI sending port {} for federate {} to federate {}.",
            port, remote_fed_id, fed_id
        );
        rti.trace(TraceEvent::SendAdrAd, fed_id, &never, TraceDirection::To);
        let reply = Message::AddressAdvertisement {
            fed_id: remote_fed_id,
            port,
            ip_addr,
        };
        if let Err(e) = rti.send_to_federate(fed_id, &reply) {
            warn!("RTI: Failed to answer address query of federate {}: {}", fed_id, e);
            rti.handle_federate_disconnected(fed_id);
        }
    }

    pub fn handle_address_ad(rti: &mut RTIRemote, fed_id: u16, port: i32, ip_addr: Ipv4Addr) {
        let never = Tag::never_tag();
        rti.trace(TraceEvent::ReceiveAdrAd, fed_id, &never, TraceDirection::From);
        let fed = &mut rti.base_mut().scheduling_nodes_mut()[fed_id as usize];
        fed.set_server_port(port);
        fed.set_server_ip_addr(ip_addr);
        fed.set_server_hostname(IpAddr::V4(ip_addr).to_string());
        info!(
            "RTI: Federate {} advertised its server at {}:{}.",
            fed_id, ip_addr, port
        );
    }

    fn destination_is_connected(rti: &RTIRemote, fed_id: u16, dest: u16) -> bool {
        match rti.base().scheduling_nodes().get(dest as usize) {
            Some(fed) if fed.node().state() != SchedulingNodeState::NotConnected => true,
            Some(_) => {
                info!(
                    "RTI: Destination federate {} is no longer connected. Dropping message from federate {}.",
                    dest, fed_id
                );
                false
            }
            None => {
                warn!(
                    "RTI: Federate {} sent a message to unknown federate {}. Dropping it.",
                    fed_id, dest
                );
                false
            }
        }
    }

    fn forward(rti: &mut RTIRemote, dest: u16, message: &Message) {
        if let Err(e) = rti.send_to_federate(dest, message) {
            warn!("RTI: Failed to forward message to federate {}: {}", dest, e);
            rti.handle_federate_disconnected(dest);
        }
    }

    /**
     * Forward a tagged message to its destination and account for it until
     * the destination completes its tag. A message at or before a tag the
     * destination has already been granted cannot be processed on time.
     */
    pub fn handle_timed_message(rti: &mut RTIRemote, fed_id: u16, data: DataMessage, tag: Tag) {
        rti.trace(TraceEvent::ReceiveTaggedMsg, fed_id, &tag, TraceDirection::From);
        let dest = data.fed_id;
        let start_time = rti.start_time();
        debug!(
            "RTI forwarding message from federate {} to federate {} port {} with tag {}.",
            fed_id,
            dest,
            data.port_id,
            tag.elapsed(start_time)
        );
        if !Self::destination_is_connected(rti, fed_id, dest) {
            return;
        }
        let last_granted = rti.base().node(dest).last_granted();
        if tag <= last_granted {
            let violation = RtiError::CoordinationViolation {
                fed_id,
                tag,
                detail: format!(
                    "message to federate {} at or before its granted tag {}",
                    dest, last_granted
                ),
            };
            warn!("{}", violation);
        }
        rti.base_mut().scheduling_nodes_mut()[dest as usize]
            .in_transit_message_tags_mut()
            .insert_if_no_match_tag(tag);
        rti.trace(TraceEvent::SendTaggedMsg, dest, &tag, TraceDirection::To);
        Self::forward(rti, dest, &Message::TaggedMessage(data, tag));

        // The destination now has an event at this tag, which may be earlier
        // than the next event it reported.
        if rti.base().node(dest).state() != SchedulingNodeState::NotConnected
            && tag < rti.base().node(dest).next_event()
        {
            let grants = rti
                .base_mut()
                .update_federate_next_event_tag_locked(dest, tag, start_time);
            rti.send_grants(grants);
        }
    }

    pub fn handle_untimed_message(rti: &mut RTIRemote, fed_id: u16, data: DataMessage) {
        let never = Tag::never_tag();
        rti.trace(TraceEvent::ReceiveMsg, fed_id, &never, TraceDirection::From);
        let dest = data.fed_id;
        if !Self::destination_is_connected(rti, fed_id, dest) {
            return;
        }
        rti.trace(TraceEvent::SendMsg, dest, &never, TraceDirection::To);
        Self::forward(rti, dest, &Message::UntimedMessage(data));
    }

    pub fn handle_port_absent(rti: &mut RTIRemote, fed_id: u16, port_id: u16, dest: u16, tag: Tag) {
        rti.trace(TraceEvent::ReceivePortAbs, fed_id, &tag, TraceDirection::From);
        if !Self::destination_is_connected(rti, fed_id, dest) {
            return;
        }
        rti.trace(TraceEvent::SendPortAbs, dest, &tag, TraceDirection::To);
        Self::forward(
            rti,
            dest,
            &Message::PortAbsent {
                port_id,
                fed_id: dest,
                tag,
            },
        );
    }

    pub fn handle_next_event_tag(rti: &mut RTIRemote, fed_id: u16, tag: Tag) {
        rti.trace(TraceEvent::ReceiveNet, fed_id, &tag, TraceDirection::From);
        let start_time = rti.start_time();
        debug!(
            "RTI received from federate {} the next event tag {}.",
            fed_id,
            tag.elapsed(start_time)
        );
        let grants = rti
            .base_mut()
            .update_federate_next_event_tag_locked(fed_id, tag, start_time);
        rti.send_grants(grants);
    }

    pub fn handle_latest_tag_complete(rti: &mut RTIRemote, fed_id: u16, tag: Tag) {
        rti.trace(TraceEvent::ReceiveLtc, fed_id, &tag, TraceDirection::From);
        let start_time = rti.start_time();
        let grants = rti.base_mut().logical_tag_complete(fed_id, tag, start_time);
        rti.send_grants(grants);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::error::DecodeError;
    use crate::federate::FederateClient;
    use crate::net_common::MsgType;
    use crate::initialize_federates;
    use crate::initialize_rti;
    use crate::process_args;

    const RUST_RTI_PROGRAM_PATH: &str = "target/debug/rti";
    const RUST_RTI_NUMBER_OF_FEDERATES_OPTION: &str = "-n";

    /**
     * An RTI with two started federates, 0 upstream of 1, and the federate
     * ends of their control connections.
     */
    fn running_rti() -> (RTIRemote, Vec<TcpStream>) {
        let mut rti = initialize_rti();
        let args = vec![
            RUST_RTI_PROGRAM_PATH.to_string(),
            RUST_RTI_NUMBER_OF_FEDERATES_OPTION.to_string(),
            String::from("2"),
        ];
        process_args(&mut rti, &args).unwrap();
        initialize_federates(&mut rti);
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let mut federate_ends = Vec::new();
        for id in 0..2u16 {
            federate_ends.push(TcpStream::connect(listener.local_addr().unwrap()).unwrap());
            let (rti_end, _) = listener.accept().unwrap();
            let fed = &mut rti.base_mut().scheduling_nodes_mut()[id as usize];
            fed.set_stream(rti_end);
            fed.node_mut().set_state(SchedulingNodeState::Granted);
        }
        rti.base_mut().node_mut(0).set_neighbors(&[], &[1]);
        rti.base_mut().node_mut(1).set_neighbors(&[(0, None)], &[]);
        (rti, federate_ends)
    }

    #[test]
    fn test_create_server_port_search() {
        let server = Server::with_listener(TcpListener::bind("127.0.0.1:0").unwrap()).unwrap();
        assert!(server.port() > 0);
    }

    #[test]
    fn test_timed_message_forwarded_and_tracked() {
        let (mut rti, mut feds) = running_rti();
        Server::handle_next_event_tag(&mut rti, 1, Tag::new(50, 0));
        let data = DataMessage {
            port_id: 3,
            fed_id: 1,
            payload: vec![1, 2, 3],
        };
        Server::handle_timed_message(&mut rti, 0, data.clone(), Tag::new(10, 0));
        assert_eq!(
            Message::TaggedMessage(data, Tag::new(10, 0)),
            Message::read_from(&mut feds[1], 1).unwrap()
        );
        assert_eq!(1, rti.base().scheduling_nodes()[1].in_transit_message_tags().len());
        assert_eq!(Tag::new(10, 0), rti.base().node(1).next_event());

        // A later NET cannot hide the message still in transit.
        Server::handle_next_event_tag(&mut rti, 1, Tag::new(60, 0));
        assert_eq!(Tag::new(10, 0), rti.base().node(1).next_event());
        Server::handle_latest_tag_complete(&mut rti, 1, Tag::new(10, 0));
        assert!(rti.base().scheduling_nodes()[1].in_transit_message_tags().is_empty());
    }

    #[test]
    fn test_message_to_disconnected_federate_dropped() {
        let (mut rti, _feds) = running_rti();
        rti.handle_federate_disconnected(1);
        let data = DataMessage {
            port_id: 0,
            fed_id: 1,
            payload: vec![9],
        };
        Server::handle_timed_message(&mut rti, 0, data, Tag::new(10, 0));
        assert!(rti.base().scheduling_nodes()[1].in_transit_message_tags().is_empty());
    }

    #[test]
    fn test_address_query_before_and_after_advertisement() {
        let (mut rti, mut feds) = running_rti();
        Server::handle_address_query(&mut rti, 0, 1);
        assert_eq!(
            Message::AddressAdvertisement {
                fed_id: 1,
                port: -1,
                ip_addr: Ipv4Addr::UNSPECIFIED
            },
            Message::read_from(&mut feds[0], 0).unwrap()
        );
        Server::handle_address_ad(&mut rti, 1, 15100, Ipv4Addr::LOCALHOST);
        Server::handle_address_query(&mut rti, 0, 1);
        assert_eq!(
            Message::AddressAdvertisement {
                fed_id: 1,
                port: 15100,
                ip_addr: Ipv4Addr::LOCALHOST
            },
            Message::read_from(&mut feds[0], 0).unwrap()
        );
    }

    #[test]
    fn test_port_absent_forwarded() {
        let (mut rti, mut feds) = running_rti();
        Server::handle_port_absent(&mut rti, 0, 2, 1, Tag::new(5, 0));
        assert_eq!(
            Message::PortAbsent {
                port_id: 2,
                fed_id: 1,
                tag: Tag::new(5, 0)
            },
            Message::read_from(&mut feds[1], 1).unwrap()
        );
    }

    #[test]
    fn test_unexpected_message_rejected_and_disconnected() {
        let (mut rti, mut feds) = running_rti();
        let stream = feds[0].try_clone().unwrap();
        Server::handle_message(&mut rti, 0, Message::ClockSyncT4(1), &stream);
        assert_eq!(
            Message::Reject(ErrType::UnexpectedMessage),
            Message::read_from(&mut feds[0], 0).unwrap()
        );
        assert_eq!(SchedulingNodeState::NotConnected, rti.base().node(0).state());
    }

    #[test]
    fn test_resign_releases_downstream() {
        let (mut rti, mut feds) = running_rti();
        Server::handle_next_event_tag(&mut rti, 1, Tag::new(20, 0));
        let stream = feds[0].try_clone().unwrap();
        Server::handle_message(&mut rti, 0, Message::Resign, &stream);
        assert_eq!(
            Message::TagAdvanceGrant(Tag::forever_tag()),
            Message::read_from(&mut feds[1], 1).unwrap()
        );
    }

    fn configured_rti(extra_args: &[&str]) -> RTIRemote {
        let mut rti = initialize_rti();
        let args: Vec<String> = [RUST_RTI_PROGRAM_PATH, "-c", "off"]
            .iter()
            .chain(extra_args.iter())
            .map(|arg| String::from(*arg))
            .collect();
        process_args(&mut rti, &args).unwrap();
        initialize_federates(&mut rti);
        rti
    }

    fn shared_rti(extra_args: &[&str]) -> Arc<RwLock<RTIRemote>> {
        Arc::new(RwLock::new(configured_rti(extra_args)))
    }

    #[test]
    fn test_admission_rejects_neighbor_outside_federation() {
        let rti = shared_rti(&["-n", "2"]);
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let federate = thread::spawn(move || {
            let mut client = FederateClient::connect(
                &address,
                1,
                "Unidentified Federation",
                false,
                RetryPolicy::connect(),
                &ThreadSleeper,
            )
            .unwrap();
            client.send_neighbor_structure(&[(7, None)], &[]).unwrap();
            client.send_udp_port(UDP_PORT_NONE).unwrap();
            client.receive().unwrap()
        });
        let (mut stream, peer) = listener.accept().unwrap();
        assert!(matches!(
            Server::admit_federate(&rti, &mut stream, peer),
            Err(RtiError::Protocol(_))
        ));
        drop(stream);
        assert_eq!(
            Message::Reject(ErrType::UnexpectedMessage),
            federate.join().unwrap()
        );
        let locked_rti = rti.read().unwrap();
        assert_eq!(SchedulingNodeState::NotConnected, locked_rti.base().node(1).state());
        assert!(!locked_rti.base().scheduling_nodes()[1].is_in_use());
        assert!(locked_rti.base().node(1).upstream().is_empty());
    }

    #[test]
    fn test_admission_refuses_oversized_frame() {
        let rti = shared_rti(&["-n", "1"]);
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let mut client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let mut wire = vec![MsgType::Message.to_byte(), 0, 0, 1, 0];
        wire.extend_from_slice(&i32::MAX.to_le_bytes());
        NetUtil::write_to_socket(&mut client, &wire, 0).unwrap();

        let (mut stream, peer) = listener.accept().unwrap();
        assert!(matches!(
            Server::admit_federate(&rti, &mut stream, peer),
            Err(RtiError::Decode(DecodeError::MalformedMessage { .. }))
        ));
    }

    #[test]
    fn test_silent_federate_treated_as_lost() {
        let rti = configured_rti(&["-n", "1", "--idle_timeout", "200"]);
        let mut server = Server::with_listener(TcpListener::bind("127.0.0.1:0").unwrap()).unwrap();
        let address = format!("127.0.0.1:{}", server.port());
        let rti_handle = thread::spawn(move || server.wait_for_federates(rti));

        let mut client = FederateClient::connect(
            &address,
            0,
            "Unidentified Federation",
            false,
            RetryPolicy::connect(),
            &ThreadSleeper,
        )
        .unwrap();
        client.send_neighbor_structure(&[], &[]).unwrap();
        client.send_udp_port(UDP_PORT_NONE).unwrap();
        client.propose_start_time(Tag::lf_time_physical()).unwrap();

        // Nothing more is sent. The RTI closes the connection on its own.
        let closed = loop {
            if let Err(e) = client.receive() {
                break e;
            }
        };
        assert!(closed.is_peer_loss());
        assert!(rti_handle.join().unwrap().is_ok());
    }
}
