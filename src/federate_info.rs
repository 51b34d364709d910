/**
 * @file
 * @author Edward A. Lee (eal@berkeley.edu)
 * @author Soroush Bateni (soroush@utdallas.edu)
 * @author Erling Jellum (erling.r.jellum@ntnu.no)
 * @author Chadlia Jerad (chadlia.jerad@ensi-uma.tn)
 * @author Chanhee Lee (chanheel@asu.edu)
 * @author Hokeun Kim (hokeun@asu.edu)
 * @copyright (c) 2020-2023, The University of California at Berkeley
 * License in [BSD 2-clause](..)
 * @brief The record the RTI keeps for each federate: its scheduling node plus
 * everything that belongs to the connection rather than to coordination.
 */
use std::net::{Ipv4Addr, Shutdown, SocketAddr, TcpStream};

use crate::clock_sync::ClockEstimate;
use crate::error::RtiError;
use crate::in_transit_message_queue::InTransitMessageQueue;
use crate::message::Message;
use crate::net_util::NetUtil;
use crate::rti_common::*;

/**
 * Information about a federate known to the RTI, including its runtime state,
 * mode of execution, and connectivity with other federates.
 */
pub struct FederateInfo {
    node: SchedulingNode,
    requested_stop: bool, // The federate has requested stop or replied to a
    // stop request. Prevents double-counting it.
    stream: Option<TcpStream>, // Control channel to this federate. None when
    // not connected.
    udp_addr: Option<SocketAddr>, // Where runtime clock sync messages go, if any.
    clock_synchronization_enabled: bool, // Cleared when the federate opts out of clock sync.
    clock_estimate: Option<ClockEstimate>, // Latest offset/delay estimate.
    clock_drift: Option<i64>, // ns/s, from the last two estimates.
    in_transit_message_tags: InTransitMessageQueue, // Tags of messages forwarded
    // to this federate that it has not yet reported as completed.
    server_hostname: String, // Human-readable IP address and
    server_port: i32,        // port number of the socket server of the federate
    // for incoming direct connections. The port number is -1 if there is no
    // server or if the RTI has not been informed of the port number.
    server_ip_addr: Ipv4Addr,
}

impl FederateInfo {
    pub fn new() -> FederateInfo {
        FederateInfo {
            node: SchedulingNode::new(),
            requested_stop: false,
            stream: None::<TcpStream>,
            udp_addr: None,
            clock_synchronization_enabled: true,
            clock_estimate: None,
            clock_drift: None,
            in_transit_message_tags: InTransitMessageQueue::new(),
            server_hostname: String::from("localhost"),
            server_port: -1,
            server_ip_addr: Ipv4Addr::UNSPECIFIED,
        }
    }

    pub fn node(&self) -> &SchedulingNode {
        &self.node
    }

    pub fn node_mut(&mut self) -> &mut SchedulingNode {
        &mut self.node
    }

    pub fn requested_stop(&self) -> bool {
        self.requested_stop
    }

    pub fn stream(&self) -> &Option<TcpStream> {
        &self.stream
    }

    pub fn udp_addr(&self) -> Option<SocketAddr> {
        self.udp_addr
    }

    pub fn clock_synchronization_enabled(&self) -> bool {
        self.clock_synchronization_enabled
    }

    pub fn clock_estimate(&self) -> Option<&ClockEstimate> {
        self.clock_estimate.as_ref()
    }

    /** How fast the federate clock gains on the RTI clock, in ns/s. */
    pub fn clock_drift(&self) -> Option<i64> {
        self.clock_drift
    }

    pub fn in_transit_message_tags(&self) -> &InTransitMessageQueue {
        &self.in_transit_message_tags
    }

    pub fn in_transit_message_tags_mut(&mut self) -> &mut InTransitMessageQueue {
        &mut self.in_transit_message_tags
    }

    pub fn server_hostname(&self) -> &str {
        &self.server_hostname
    }

    pub fn server_port(&self) -> i32 {
        self.server_port
    }

    pub fn server_ip_addr(&self) -> Ipv4Addr {
        self.server_ip_addr
    }

    pub fn set_requested_stop(&mut self, requested_stop: bool) {
        self.requested_stop = requested_stop;
    }

    pub fn set_stream(&mut self, stream: TcpStream) {
        self.stream = Some(stream);
    }

    pub fn set_udp_addr(&mut self, udp_addr: Option<SocketAddr>) {
        self.udp_addr = udp_addr;
    }

    pub fn set_clock_synchronization_enabled(&mut self, clock_synchronization_enabled: bool) {
        self.clock_synchronization_enabled = clock_synchronization_enabled;
    }

    /** Replace the estimate. The drift is updated against the previous one. */
    pub fn set_clock_estimate(&mut self, clock_estimate: ClockEstimate) {
        if let Some(previous) = &self.clock_estimate {
            if let Some(drift) = clock_estimate.drift_since(previous) {
                self.clock_drift = Some(drift);
            }
        }
        self.clock_estimate = Some(clock_estimate);
    }

    pub fn set_server_hostname(&mut self, server_hostname: String) {
        self.server_hostname = server_hostname;
    }

    pub fn set_server_port(&mut self, server_port: i32) {
        self.server_port = server_port;
    }

    pub fn set_server_ip_addr(&mut self, server_ip_addr: Ipv4Addr) {
        self.server_ip_addr = server_ip_addr;
    }

    /** True while a live control connection is attached to this record. */
    pub fn is_in_use(&self) -> bool {
        self.stream.is_some() || self.node.state() != SchedulingNodeState::NotConnected
    }

    /** Write one message on the control channel. */
    pub fn send(&mut self, message: &Message) -> Result<(), RtiError> {
        let fed_id = self.node.id();
        match self.stream.as_mut() {
            Some(stream) => NetUtil::write_to_socket(stream, &message.encode(), fed_id),
            None => Err(RtiError::ConnectionClosed(fed_id)),
        }
    }

    /**
     * Drop the control connection. Shutting the socket down also wakes the
     * thread blocked reading from its clone.
     */
    pub fn close_stream(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
        self.udp_addr = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::net::TcpListener;

    use rand::Rng;

    use crate::tag::Tag;

    #[test]
    fn test_federate_info_positive() {
        let fed = FederateInfo::new();
        assert!(fed.requested_stop() == false);
        assert!(fed.stream().is_none());
        assert!(fed.udp_addr().is_none());
        assert!(fed.clock_synchronization_enabled() == true);
        assert!(fed.clock_estimate().is_none());
        assert!(fed.clock_drift().is_none());
        assert!(fed.in_transit_message_tags().is_empty());
        assert!(fed.server_hostname() == "localhost");
        assert!(fed.server_port() == -1);
        assert!(!fed.is_in_use());
    }

    #[test]
    fn test_set_server_port_positive() {
        let mut fed = FederateInfo::new();
        let mut rng = rand::thread_rng();
        let server_port: i32 = rng.gen_range(0..i32::MAX);
        fed.set_server_port(server_port);
        assert!(fed.server_port() == server_port);
    }

    #[test]
    fn test_send_without_stream_is_connection_closed() {
        let mut fed = FederateInfo::new();
        fed.node_mut().initialize_scheduling_node(3);
        let result = fed.send(&Message::TagAdvanceGrant(Tag::zero_tag()));
        assert!(matches!(result, Err(RtiError::ConnectionClosed(3))));
    }

    #[test]
    fn test_send_and_close_stream() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let mut peer = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (stream, _) = listener.accept().unwrap();

        let mut fed = FederateInfo::new();
        fed.set_stream(stream);
        assert!(fed.is_in_use());
        fed.send(&Message::StopGranted(Tag::new(55, 0))).unwrap();
        assert_eq!(
            Message::StopGranted(Tag::new(55, 0)),
            Message::read_from(&mut peer, 0).unwrap()
        );
        fed.close_stream();
        assert!(fed.stream().is_none());
        assert!(Message::read_from(&mut peer, 0).is_err());
    }
}
