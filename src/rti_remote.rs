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
 * @brief The RTI of a federation: configuration, the shared coordination
 * state, and delivery of what the coordinator decides to the federates.
 */
use std::collections::VecDeque;
use std::net::UdpSocket;
use std::time::Duration;

use tracing::{info, warn};

use crate::constants::*;
use crate::error::RtiError;
use crate::message::Message;
use crate::rti_common::{RTICommon, TagAdvanceGrant};
use crate::tag::{Instant, Tag};
use crate::trace::{TraceDirection, TraceEvent};
use crate::ClockSyncStat;

/**
 * The coordinator as a whole: the scheduling state of every federate in
 * `base`, start-time negotiation, and the options the RTI was started with.
 * One instance is shared by all federate threads behind a lock.
 */
pub struct RTIRemote {
    base: RTICommon,

    // Largest TIMESTAMP proposal received so far.
    max_start_time: i64,
    num_feds_proposed_start: i32,
    // 0 until every federate has proposed.
    start_time: Instant,

    // Federates presenting another ID are rejected. Also the HMAC key.
    federation_id: String,

    user_specified_port: u16,
    final_port_tcp: u16,
    // UDP_PORT_NONE unless runtime clock sync is on.
    final_port_udp: u16,
    socket_descriptor_udp: Option<UdpSocket>,

    // Federation-wide mode. A federate opts out with UDP_PORT_NONE.
    clock_sync_global_status: ClockSyncStat,
    clock_sync_period_ns: u64,
    clock_sync_exchanges_per_interval: u32,
    clock_sync_coded_probes: bool,

    authentication_enabled: bool,

    // A federate silent for longer than this is treated as lost. None waits
    // forever.
    idle_timeout: Option<Duration>,
    // The RTI asks the federation to stop this long after the start time.
    stop_after: Option<i64>,
}

impl RTIRemote {
    pub fn new() -> RTIRemote {
        RTIRemote {
            base: RTICommon::new(),
            max_start_time: 0,
            num_feds_proposed_start: 0,
            start_time: 0,
            federation_id: String::from("Unidentified Federation"),
            user_specified_port: STARTING_PORT,
            final_port_tcp: 0,
            final_port_udp: UDP_PORT_NONE,
            socket_descriptor_udp: None,
            clock_sync_global_status: ClockSyncStat::ClockSyncInit,
            clock_sync_period_ns: CLOCK_SYNC_PERIOD_NS,
            clock_sync_exchanges_per_interval: CLOCK_SYNC_EXCHANGES_PER_INTERVAL,
            clock_sync_coded_probes: false,
            authentication_enabled: false,
            idle_timeout: None,
            stop_after: None,
        }
    }

    pub fn base(&self) -> &RTICommon {
        &self.base
    }

    pub fn base_mut(&mut self) -> &mut RTICommon {
        &mut self.base
    }

    pub fn max_start_time(&self) -> i64 {
        self.max_start_time
    }

    pub fn num_feds_proposed_start(&self) -> i32 {
        self.num_feds_proposed_start
    }

    pub fn start_time(&self) -> Instant {
        self.start_time
    }

    pub fn federation_id(&self) -> String {
        self.federation_id.clone()
    }

    pub fn user_specified_port(&self) -> u16 {
        self.user_specified_port
    }

    pub fn final_port_tcp(&self) -> u16 {
        self.final_port_tcp
    }

    pub fn final_port_udp(&self) -> u16 {
        self.final_port_udp
    }

    pub fn socket_descriptor_udp(&mut self) -> &mut Option<UdpSocket> {
        &mut self.socket_descriptor_udp
    }

    pub fn clock_sync_global_status(&self) -> ClockSyncStat {
        self.clock_sync_global_status.clone()
    }

    pub fn clock_sync_period_ns(&self) -> u64 {
        self.clock_sync_period_ns
    }

    pub fn clock_sync_exchanges_per_interval(&self) -> u32 {
        self.clock_sync_exchanges_per_interval
    }

    pub fn clock_sync_coded_probes(&self) -> bool {
        self.clock_sync_coded_probes
    }

    pub fn authentication_enabled(&self) -> bool {
        self.authentication_enabled
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout
    }

    pub fn stop_after(&self) -> Option<i64> {
        self.stop_after
    }

    pub fn set_max_start_time(&mut self, max_start_time: i64) {
        self.max_start_time = max_start_time;
    }

    pub fn set_num_feds_proposed_start(&mut self, num_feds_proposed_start: i32) {
        self.num_feds_proposed_start = num_feds_proposed_start;
    }

    pub fn set_start_time(&mut self, start_time: Instant) {
        self.start_time = start_time;
        self.base.trace().set_start_time(start_time);
    }

    pub fn set_federation_id(&mut self, federation_id: String) {
        self.federation_id = federation_id;
    }

    pub fn set_port(&mut self, user_specified_port: u16) {
        self.user_specified_port = user_specified_port;
    }

    pub fn set_final_port_tcp(&mut self, final_port_tcp: u16) {
        self.final_port_tcp = final_port_tcp;
    }

    pub fn set_socket_descriptor_udp(&mut self, socket_descriptor_udp: Option<UdpSocket>) {
        self.socket_descriptor_udp = socket_descriptor_udp;
    }

    pub fn set_final_port_udp(&mut self, final_port_udp: u16) {
        self.final_port_udp = final_port_udp;
    }

    pub fn set_clock_sync_global_status(&mut self, clock_sync_global_status: ClockSyncStat) {
        self.clock_sync_global_status = clock_sync_global_status;
    }

    pub fn set_clock_sync_period_ns(&mut self, clock_sync_period_ns: u64) {
        self.clock_sync_period_ns = clock_sync_period_ns;
    }

    pub fn set_clock_sync_exchanges_per_interval(
        &mut self,
        clock_sync_exchanges_per_interval: u32,
    ) {
        self.clock_sync_exchanges_per_interval = clock_sync_exchanges_per_interval;
    }

    pub fn set_clock_sync_coded_probes(&mut self, clock_sync_coded_probes: bool) {
        self.clock_sync_coded_probes = clock_sync_coded_probes;
    }

    pub fn set_authentication_enabled(&mut self, authentication_enabled: bool) {
        self.authentication_enabled = authentication_enabled;
    }

    pub fn set_idle_timeout(&mut self, idle_timeout: Option<Duration>) {
        self.idle_timeout = idle_timeout;
    }

    pub fn set_stop_after(&mut self, stop_after: Option<i64>) {
        self.stop_after = stop_after;
    }

    pub fn trace(&mut self, event: TraceEvent, fed_id: u16, tag: &Tag, direction: TraceDirection) {
        if self.base.tracing_enabled() {
            self.base.trace().log_trace(event, fed_id, tag, direction);
        }
    }

    /**
     * Write a message on the control channel of a federate. The caller
     * decides what a failure means.
     */
    pub fn send_to_federate(&mut self, fed_id: u16, message: &Message) -> Result<(), RtiError> {
        self.base.scheduling_nodes_mut()[fed_id as usize].send(message)
    }

    /**
     * Put grants decided by the coordinator on the wire, in order. A write
     * failure is a soft failure: the federate is treated as gone, which may
     * unblock further grants downstream of it.
     */
    pub fn send_grants(&mut self, grants: Vec<TagAdvanceGrant>) {
        let start_time = self.start_time;
        let mut pending: VecDeque<TagAdvanceGrant> = grants.into();
        let mut lost_federate = false;
        while let Some(grant) = pending.pop_front() {
            let fed_id = grant.fed_id();
            let tag = grant.tag();
            let (message, event, name) = if grant.is_provisional() {
                (
                    Message::ProvisionalTagAdvanceGrant(tag),
                    TraceEvent::SendPTag,
                    "Provisional Tag Advance Grant (PTAG)",
                )
            } else {
                (
                    Message::TagAdvanceGrant(tag),
                    TraceEvent::SendTag,
                    "Tag Advance Grant (TAG)",
                )
            };
            self.trace(event, fed_id, &tag, TraceDirection::To);
            match self.send_to_federate(fed_id, &message) {
                Ok(()) => info!(
                    "RTI sent to federate {} the {} {}.",
                    fed_id,
                    name,
                    tag.elapsed(start_time)
                ),
                Err(e) => {
                    warn!("RTI failed to send {} to federate {}: {}", name, fed_id, e);
                    self.base.scheduling_nodes_mut()[fed_id as usize].close_stream();
                    pending.extend(self.base.mark_federate_disconnected(fed_id, start_time));
                    lost_federate = true;
                }
            }
        }
        if lost_federate {
            self.check_stop_complete();
        }
    }

    /**
     * A federate resigned, failed, or its connection was lost. Its record
     * stops constraining anyone, and any stop in progress stops waiting for it.
     */
    pub fn handle_federate_disconnected(&mut self, fed_id: u16) {
        let start_time = self.start_time;
        self.base.scheduling_nodes_mut()[fed_id as usize].close_stream();
        let grants = self.base.mark_federate_disconnected(fed_id, start_time);
        self.send_grants(grants);
        self.check_stop_complete();
    }
}
