/**
 * @file rti_common.rs
 * @author Edward A. Lee (eal@berkeley.edu)
 * @author Soroush Bateni (soroush@utdallas.edu)
 * @author Erling Jellum (erling.r.jellum@ntnu.no)
 * @author Chadlia Jerad (chadlia.jerad@ensi-uma.tn)
 * @author Chanhee Lee (chanheel@asu.edu)
 * @author Hokeun Kim (hokeun@asu.edu)
 * @copyright (c) 2020-2023, The University of California at Berkeley
 * License in [BSD 2-clause](https://github.com/lf-lang/reactor-c/blob/main/LICENSE.md)
 * @brief Scheduling nodes, the federation's dependency graph, and the tag
 * advance grant computation.
 *
 * Everything here operates on a snapshot of the whole federation and is
 * called with the RTI lock held. Grant decisions are recorded on the node and
 * returned to the caller, which is responsible for putting them on the wire.
 */
use tracing::{debug, info, warn};

use crate::error::RtiError;
use crate::federate_info::FederateInfo;
use crate::stop::StopPhase;
use crate::tag::{Instant, Interval, Tag};
use crate::trace::Trace;

const IS_IN_ZERO_DELAY_CYCLE: i32 = 1;
const IS_IN_CYCLE: i32 = 2;

#[derive(PartialEq, Clone, Copy, Debug)]
pub enum SchedulingNodeState {
    NotConnected, // The scheduling node has not connected, has resigned, or was lost.
    Granted,      // Most recent MsgType::NextEventTag has been granted.
    Pending,      // Connected, but the start time has not been sent yet.
}

/** Struct for minimum delays from upstream nodes. */
#[derive(PartialEq, Clone, Debug)]
pub struct MinimumDelay {
    id: u16,        // ID of the upstream node.
    min_delay: Tag, // Minimum delay from upstream.
}

impl MinimumDelay {
    pub fn new(id: u16, min_delay: Tag) -> MinimumDelay {
        MinimumDelay { id, min_delay }
    }

    pub fn id(&self) -> u16 {
        self.id
    }

    pub fn min_delay(&self) -> &Tag {
        &self.min_delay
    }
}

/**
 * Coordination state of one federate together with its edges in the
 * dependency graph. Upstream and downstream neighbors are held as federate
 * IDs that index into `RTICommon::scheduling_nodes`.
 * Connections denoted "physical" impose no scheduling constraint and are not
 * part of the graph.
 */
#[derive(PartialEq, Debug)]
pub struct SchedulingNode {
    id: u16,                         // ID of this scheduling node.
    completed: Tag, // The largest logical tag completed by the federate (or NEVER if no LTC has been received).
    last_granted: Tag, // The maximum Tag that has been granted so far (or NEVER if none granted)
    last_provisionally_granted: Tag, // The maximum PTAG that has been provisionally granted (or NEVER if none granted)
    next_event: Tag, // Most recent NET received from the federate (or NEVER if none received).
    state: SchedulingNodeState, // State of the federate.
    upstream: Vec<u16>, // Array of upstream federate ids.
    upstream_delay: Vec<Interval>, // Minimum delay on connections from upstream federates.
    // Here, None encodes no delay. Some(0) is a microstep delay.
    downstream: Vec<u16>, // Array of downstream federate ids.
    min_delays: Option<Vec<MinimumDelay>>, // Minimum path delays from transitive upstream nodes, once computed.
    flags: i32,                            // Or of IS_IN_ZERO_DELAY_CYCLE, IS_IN_CYCLE
}

impl SchedulingNode {
    pub fn new() -> SchedulingNode {
        SchedulingNode {
            id: 0,
            completed: Tag::never_tag(),
            last_granted: Tag::never_tag(),
            last_provisionally_granted: Tag::never_tag(),
            next_event: Tag::never_tag(),
            state: SchedulingNodeState::NotConnected,
            upstream: Vec::new(),
            upstream_delay: Vec::new(),
            downstream: Vec::new(),
            min_delays: None,
            flags: 0,
        }
    }

    pub fn initialize_scheduling_node(&mut self, id: u16) {
        self.id = id;
    }

    pub fn id(&self) -> u16 {
        self.id
    }

    pub fn completed(&self) -> Tag {
        self.completed
    }

    pub fn last_granted(&self) -> Tag {
        self.last_granted
    }

    pub fn last_provisionally_granted(&self) -> Tag {
        self.last_provisionally_granted
    }

    pub fn next_event(&self) -> Tag {
        self.next_event
    }

    pub fn state(&self) -> SchedulingNodeState {
        self.state
    }

    pub fn upstream(&self) -> &Vec<u16> {
        &self.upstream
    }

    pub fn upstream_delay(&self) -> &Vec<Interval> {
        &self.upstream_delay
    }

    pub fn num_upstream(&self) -> usize {
        self.upstream.len()
    }

    pub fn downstream(&self) -> &Vec<u16> {
        &self.downstream
    }

    pub fn num_downstream(&self) -> usize {
        self.downstream.len()
    }

    pub fn min_delays(&self) -> Option<&Vec<MinimumDelay>> {
        self.min_delays.as_ref()
    }

    pub fn flags(&self) -> i32 {
        self.flags
    }

    pub fn set_completed(&mut self, completed: Tag) {
        self.completed = completed;
    }

    pub fn set_last_granted(&mut self, tag: Tag) {
        self.last_granted = tag;
    }

    pub fn set_last_provisionally_granted(&mut self, tag: Tag) {
        self.last_provisionally_granted = tag;
    }

    pub fn set_next_event(&mut self, next_event_tag: Tag) {
        self.next_event = next_event_tag;
    }

    pub fn set_state(&mut self, state: SchedulingNodeState) {
        self.state = state;
    }

    /**
     * Replace the node's edges. Invalidates any cached path delays, which
     * are recomputed on the next grant computation.
     */
    pub fn set_neighbors(&mut self, upstream: &[(u16, Interval)], downstream: &[u16]) {
        self.upstream = upstream.iter().map(|(id, _)| *id).collect();
        self.upstream_delay = upstream.iter().map(|(_, delay)| *delay).collect();
        self.downstream = downstream.to_vec();
        self.downstream.sort_unstable();
        self.downstream.dedup();
        self.min_delays = None;
    }

    pub fn set_min_delays(&mut self, min_delays: Vec<MinimumDelay>) {
        self.min_delays = Some(min_delays);
    }

    pub fn set_flags(&mut self, flags: i32) {
        self.flags = flags;
    }
}

/**
 * A grant decided for a federate. A NEVER tag means no grant.
 */
#[derive(PartialEq, Clone, Copy, Debug)]
pub struct TagAdvanceGrant {
    fed_id: u16,
    tag: Tag,             // NEVER if there is no tag advance grant.
    is_provisional: bool, // True for PTAG, false for TAG.
}

impl TagAdvanceGrant {
    pub fn new(fed_id: u16, tag: Tag, is_provisional: bool) -> TagAdvanceGrant {
        TagAdvanceGrant {
            fed_id,
            tag,
            is_provisional,
        }
    }

    pub fn fed_id(&self) -> u16 {
        self.fed_id
    }

    pub fn tag(&self) -> Tag {
        self.tag
    }

    pub fn is_provisional(&self) -> bool {
        self.is_provisional
    }

    pub fn set_tag(&mut self, tag: Tag) {
        self.tag = tag;
    }

    pub fn set_provisional(&mut self, is_provisional: bool) {
        self.is_provisional = is_provisional;
    }
}

pub struct RTICommon {
    // The scheduling nodes, indexed by federate ID.
    scheduling_nodes: Vec<FederateInfo>,

    // Number of scheduling nodes
    number_of_scheduling_nodes: i32,

    // RTI's decided stop tag for the scheduling nodes
    max_stop_tag: Tag,

    // Number of scheduling nodes handling stop
    num_scheduling_nodes_handling_stop: i32,

    // Progress of the stop protocol.
    stop_phase: StopPhase,

    // Boolean indicating that tracing is enabled.
    tracing_enabled: bool,

    trace: Trace,
}

impl RTICommon {
    pub fn new() -> RTICommon {
        RTICommon {
            scheduling_nodes: Vec::new(),
            number_of_scheduling_nodes: 0,
            max_stop_tag: Tag::never_tag(),
            num_scheduling_nodes_handling_stop: 0,
            stop_phase: StopPhase::Running,
            tracing_enabled: false,
            trace: Trace::trace_new(""),
        }
    }

    pub fn scheduling_nodes(&self) -> &Vec<FederateInfo> {
        &self.scheduling_nodes
    }

    pub fn scheduling_nodes_mut(&mut self) -> &mut Vec<FederateInfo> {
        &mut self.scheduling_nodes
    }

    pub fn number_of_scheduling_nodes(&self) -> i32 {
        self.number_of_scheduling_nodes
    }

    pub fn max_stop_tag(&self) -> Tag {
        self.max_stop_tag
    }

    pub fn num_scheduling_nodes_handling_stop(&self) -> i32 {
        self.num_scheduling_nodes_handling_stop
    }

    pub fn stop_phase(&self) -> StopPhase {
        self.stop_phase
    }

    pub fn tracing_enabled(&self) -> bool {
        self.tracing_enabled
    }

    pub fn trace(&mut self) -> &mut Trace {
        &mut self.trace
    }

    pub fn set_max_stop_tag(&mut self, max_stop_tag: Tag) {
        self.max_stop_tag = max_stop_tag;
    }

    pub fn set_number_of_scheduling_nodes(&mut self, number_of_scheduling_nodes: i32) {
        self.number_of_scheduling_nodes = number_of_scheduling_nodes;
    }

    pub fn set_num_scheduling_nodes_handling_stop(
        &mut self,
        num_scheduling_nodes_handling_stop: i32,
    ) {
        self.num_scheduling_nodes_handling_stop = num_scheduling_nodes_handling_stop;
    }

    pub fn set_stop_phase(&mut self, stop_phase: StopPhase) {
        self.stop_phase = stop_phase;
    }

    pub fn set_tracing_enabled(&mut self, tracing_enabled: bool) {
        self.tracing_enabled = tracing_enabled;
    }

    pub fn set_trace(&mut self, trace: Trace) {
        self.trace = trace;
    }

    pub fn node(&self, fed_id: u16) -> &SchedulingNode {
        self.scheduling_nodes[fed_id as usize].node()
    }

    pub fn node_mut(&mut self, fed_id: u16) -> &mut SchedulingNode {
        self.scheduling_nodes[fed_id as usize].node_mut()
    }

    /** The agreed stop tag once STOP_GRANTED has gone out. */
    pub fn granted_stop_tag(&self) -> Option<Tag> {
        match self.stop_phase {
            StopPhase::StopGranted | StopPhase::Terminated => Some(self.max_stop_tag),
            _ => None,
        }
    }

    fn clamp_to_stop_tag(&self, tag: Tag) -> Tag {
        match self.granted_stop_tag() {
            Some(stop_tag) if tag > stop_tag => stop_tag,
            _ => tag,
        }
    }

    /**
     * Update the next event tag of a federate, first lowering it to the
     * earliest tag of any message still in transit to it.
     *
     * Returns the grants to send.
     */
    pub fn update_federate_next_event_tag_locked(
        &mut self,
        fed_id: u16,
        next_event_tag: Tag,
        start_time: Instant,
    ) -> Vec<TagAdvanceGrant> {
        let mut next_event_tag = next_event_tag;
        let min_in_transit_tag = self.scheduling_nodes[fed_id as usize]
            .in_transit_message_tags()
            .peek_tag();
        if min_in_transit_tag < next_event_tag {
            next_event_tag = min_in_transit_tag;
        }
        self.update_scheduling_node_next_event_tag_locked(fed_id, next_event_tag, start_time)
    }

    /**
     * Update the next event tag of a scheduling node and determine which
     * TAGs or PTAGs are now safe for it and for everything downstream.
     */
    pub fn update_scheduling_node_next_event_tag_locked(
        &mut self,
        fed_id: u16,
        next_event_tag: Tag,
        start_time: Instant,
    ) -> Vec<TagAdvanceGrant> {
        let next_event_tag = self.clamp_to_stop_tag(next_event_tag);
        let mut grants = Vec::new();
        let num_upstream;
        {
            let e = self.node_mut(fed_id);
            e.set_next_event(next_event_tag);
            num_upstream = e.num_upstream();
        }
        debug!(
            "RTI: Updated the recorded next event tag for federate {} to {}",
            fed_id,
            next_event_tag.elapsed(start_time)
        );

        // A node without upstream nodes does not wait for a grant. It just
        // proceeds to advance time.
        if num_upstream > 0 {
            self.notify_advance_grant_if_safe(fed_id, start_time, &mut grants);
        } else {
            let e = self.node_mut(fed_id);
            if next_event_tag > e.last_granted() {
                e.set_last_granted(next_event_tag);
            }
        }
        let mut visited = vec![false; self.scheduling_nodes.len()];
        self.notify_downstream_advance_grant_if_safe(
            fed_id,
            start_time,
            &mut visited,
            &mut grants,
        );
        grants
    }

    /**
     * Compute and record the grant, if any, that is safe for `fed_id`.
     */
    pub fn notify_advance_grant_if_safe(
        &mut self,
        fed_id: u16,
        start_time: Instant,
        grants: &mut Vec<TagAdvanceGrant>,
    ) {
        let grant = self.tag_advance_grant_if_safe(fed_id, start_time);
        if grant.tag() != Tag::never_tag() {
            if grant.is_provisional() {
                self.notify_provisional_tag_advance_grant(fed_id, grant.tag(), start_time, grants);
            } else {
                self.notify_tag_advance_grant(fed_id, grant.tag(), start_time, grants);
            }
        }
    }

    /**
     * Determine whether the specified node is eligible for a tag advance
     * grant.
     *
     * First the minimum M over all directly upstream nodes of the most
     * recent LTC adjusted by the "after" delay is computed. If M is greater
     * than the last TAG and at least the node's NET, TAG(M) is returned.
     *
     * Otherwise the earliest tag at which any transitive upstream node could
     * still send a message (EIMT) is computed from the recorded NETs. If the
     * EIMT is greater than the node's NET, a TAG for the NET is returned. If
     * it equals the NET, a PTAG for the NET is returned.
     */
    pub fn tag_advance_grant_if_safe(&mut self, fed_id: u16, start_time: Instant) -> TagAdvanceGrant {
        let mut result = TagAdvanceGrant::new(fed_id, Tag::never_tag(), false);

        // Find the earliest LTC of upstream scheduling nodes (M).
        {
            let mut min_upstream_completed = Tag::forever_tag();
            let e = self.node(fed_id);
            for (upstream_id, delay) in e.upstream().iter().zip(e.upstream_delay().iter()) {
                let upstream = self.node(*upstream_id);
                // Ignore this node if it is no longer connected.
                if upstream.state() == SchedulingNodeState::NotConnected {
                    continue;
                }
                // Adjust by the "after" delay.
                let candidate = Tag::lf_delay_strict(&upstream.completed(), *delay);
                if candidate < min_upstream_completed {
                    min_upstream_completed = candidate;
                }
            }
            let min_upstream_completed = self.clamp_to_stop_tag(min_upstream_completed);
            debug!(
                "Minimum upstream LTC for federate {} is {} (adjusted by after delay).",
                fed_id,
                min_upstream_completed.elapsed(start_time)
            );
            if min_upstream_completed > e.last_granted()
                && min_upstream_completed >= e.next_event()
            {
                result.set_tag(min_upstream_completed);
                return result;
            }
        }

        // Can't make progress based only on upstream LTCs. Find the tag of
        // the earliest event that may later be received from a transitive
        // upstream node (including any after delays on the connections).
        let t_d = self.earliest_future_incoming_message_tag(fed_id, start_time);
        debug!(
            "RTI: Earliest next event upstream of node {} has tag {}.",
            fed_id,
            t_d.elapsed(start_time)
        );

        let e = self.node(fed_id);
        let next_event = e.next_event();
        let last_provisionally_granted = e.last_provisionally_granted();
        let last_granted = e.last_granted();

        if t_d > next_event                         // EIMT greater than NET
            && next_event > Tag::never_tag()        // NET is not NEVER_TAG
            && t_d >= last_provisionally_granted    // The grant is not redundant
            && t_d > last_granted
        {
            // No upstream node can send events that will be received with a
            // tag less than or equal to next_event, so it is safe to send a TAG.
            debug!(
                "RTI: Earliest upstream message time for federate {} is {}. Granting tag advance (TAG) for {}",
                fed_id,
                t_d.elapsed(start_time),
                next_event.elapsed(start_time)
            );
            result.set_tag(next_event);
        } else if t_d == next_event
            && next_event > last_provisionally_granted
            && next_event > last_granted
        {
            // Some upstream node may send an event that has the same tag as
            // this node's next event, so only a PTAG can be granted.
            debug!(
                "RTI: Earliest upstream message time for federate {} is {}. Granting provisional tag advance (PTAG) for {}",
                fed_id,
                t_d.elapsed(start_time),
                next_event.elapsed(start_time)
            );
            result.set_tag(next_event);
            result.set_provisional(true);
        }
        result
    }

    /**
     * Find the tag of the earliest possible incoming message (EIMT) for a
     * node: the smallest transitive upstream NET plus the minimum path delay
     * from that node. An upstream node that has not reported a NET is
     * assumed able to send at the start time. Returns FOREVER when the node
     * has no upstream nodes.
     */
    pub fn earliest_future_incoming_message_tag(&mut self, fed_id: u16, start_time: Instant) -> Tag {
        self.update_min_delays_upstream(fed_id);

        let mut t_d = Tag::forever_tag();
        if let Some(min_delays) = self.node(fed_id).min_delays() {
            for min_delay in min_delays {
                let upstream = self.node(min_delay.id());
                let mut upstream_next_event = upstream.next_event();
                if upstream_next_event == Tag::never_tag() {
                    upstream_next_event = Tag::new(start_time, 0);
                }
                // No delay at all is (0,0) and a delay of 0 is (0,1). A path
                // with a positive time delay drops the upstream microstep.
                let earliest_tag_from_upstream =
                    Tag::lf_tag_add(&upstream_next_event, min_delay.min_delay());
                if earliest_tag_from_upstream < t_d {
                    t_d = earliest_tag_from_upstream;
                }
            }
        }
        t_d
    }

    /**
     * Compute and cache, for the given node, the minimum path delay from
     * every transitive upstream node, and set the cycle flags. Does nothing
     * if the cache is already valid.
     */
    pub fn update_min_delays_upstream(&mut self, node_idx: u16) {
        if self.node(node_idx).min_delays().is_some() {
            return;
        }
        let mut path_delays = vec![Tag::forever_tag(); self.scheduling_nodes.len()];
        self.node_mut(node_idx).set_flags(0);
        self._update_min_delays_upstream(node_idx, None, &mut path_delays);

        let min_delays: Vec<MinimumDelay> = path_delays
            .iter()
            .enumerate()
            .filter(|(_, delay)| **delay < Tag::forever_tag())
            .map(|(i, delay)| MinimumDelay::new(i as u16, *delay))
            .collect();
        let node = self.node_mut(node_idx);
        debug!(
            "Node {} (is in ZDC: {}) has {} upstream nodes.",
            node_idx,
            node.flags() & IS_IN_ZERO_DELAY_CYCLE != 0,
            min_delays.len()
        );
        node.set_min_delays(min_delays);
    }

    // Used recursively to find minimum delays upstream. A path delay from U
    // to the end node is the delay of the edge leaving U followed by the
    // delay already found from the intermediate node to the end node.
    fn _update_min_delays_upstream(
        &mut self,
        end_idx: u16,
        intermediate_idx: Option<u16>,
        path_delays: &mut Vec<Tag>,
    ) {
        let (intermediate, delay_from_intermediate_so_far) = match intermediate_idx {
            None => (end_idx, Tag::zero_tag()),
            Some(idx) => (idx, path_delays[idx as usize]),
        };
        let edges: Vec<(u16, Interval)> = {
            let e = self.node(intermediate);
            e.upstream()
                .iter()
                .copied()
                .zip(e.upstream_delay().iter().copied())
                .collect()
        };
        for (upstream_id, upstream_delay) in edges {
            let path_delay = Tag::lf_tag_add(
                &Tag::from_interval(upstream_delay),
                &delay_from_intermediate_so_far,
            );
            if path_delay < path_delays[upstream_id as usize] {
                path_delays[upstream_id as usize] = path_delay;
                if upstream_id != end_idx {
                    self._update_min_delays_upstream(end_idx, Some(upstream_id), path_delays);
                } else {
                    let end = self.node_mut(end_idx);
                    // Found a cycle.
                    end.set_flags(end.flags() | IS_IN_CYCLE);
                    if path_delay == Tag::zero_tag() {
                        end.set_flags(end.flags() | IS_IN_ZERO_DELAY_CYCLE);
                    }
                }
            }
        }
    }

    pub fn is_in_zero_delay_cycle(&mut self, fed_id: u16) -> bool {
        self.update_min_delays_upstream(fed_id);
        (self.node(fed_id).flags() & IS_IN_ZERO_DELAY_CYCLE) != 0
    }

    pub fn is_in_cycle(&mut self, fed_id: u16) -> bool {
        self.update_min_delays_upstream(fed_id);
        (self.node(fed_id).flags() & IS_IN_CYCLE) != 0
    }

    /**
     * Check that every neighbor a federate declares is a member of the
     * federation. The graph code indexes nodes by these IDs.
     */
    pub fn check_neighbor_structure(
        &self,
        fed_id: u16,
        upstream: &[(u16, Interval)],
        downstream: &[u16],
    ) -> Result<(), RtiError> {
        let number_of_federates = self.scheduling_nodes.len();
        let unknown = upstream
            .iter()
            .map(|(id, _)| *id)
            .chain(downstream.iter().copied())
            .find(|id| *id as usize >= number_of_federates);
        match unknown {
            Some(id) => Err(RtiError::Protocol(format!(
                "federate {} declares neighbor {} in a federation of {}",
                fed_id, id, number_of_federates
            ))),
            None => Ok(()),
        }
    }

    /**
     * Reject a dependency graph in which some federate can reach itself
     * with no delay at all. Such a federation can never safely advance.
     */
    pub fn check_zero_delay_cycles(&mut self) -> Result<(), RtiError> {
        for i in 0..self.scheduling_nodes.len() {
            let fed_id = i as u16;
            if self.is_in_zero_delay_cycle(fed_id) {
                return Err(RtiError::ZeroDelayCycle(fed_id));
            }
        }
        Ok(())
    }

    /**
     * Record a TAG for the node unless it is redundant: it must be later
     * than the previous TAG and not earlier than the previous PTAG. Nothing
     * is granted to a node that is disconnected or has not been sent its
     * start time yet.
     */
    pub fn notify_tag_advance_grant(
        &mut self,
        fed_id: u16,
        tag: Tag,
        start_time: Instant,
        grants: &mut Vec<TagAdvanceGrant>,
    ) {
        let e = self.node_mut(fed_id);
        if e.state() == SchedulingNodeState::NotConnected
            || tag <= e.last_granted()
            || tag < e.last_provisionally_granted()
        {
            return;
        }
        if e.state() == SchedulingNodeState::Pending {
            debug!(
                "RTI deferred TAG {} to federate {} until its start time is sent.",
                tag.elapsed(start_time),
                fed_id
            );
            return;
        }
        e.set_last_granted(tag);
        grants.push(TagAdvanceGrant::new(fed_id, tag, false));
    }

    /**
     * Record a PTAG for the node unless a TAG or PTAG at or beyond `tag`
     * was already sent.
     */
    pub fn notify_provisional_tag_advance_grant(
        &mut self,
        fed_id: u16,
        tag: Tag,
        start_time: Instant,
        grants: &mut Vec<TagAdvanceGrant>,
    ) {
        let e = self.node_mut(fed_id);
        if e.state() == SchedulingNodeState::NotConnected
            || tag <= e.last_granted()
            || tag <= e.last_provisionally_granted()
        {
            return;
        }
        if e.state() == SchedulingNodeState::Pending {
            debug!(
                "RTI deferred PTAG {} to federate {} until its start time is sent.",
                tag.elapsed(start_time),
                fed_id
            );
            return;
        }
        e.set_last_provisionally_granted(tag);
        grants.push(TagAdvanceGrant::new(fed_id, tag, true));
    }

    /**
     * For all nodes downstream of the specified node, in increasing ID
     * order, determine whether they should be granted a TAG or PTAG.
     */
    pub fn notify_downstream_advance_grant_if_safe(
        &mut self,
        fed_id: u16,
        start_time: Instant,
        visited: &mut Vec<bool>,
        grants: &mut Vec<TagAdvanceGrant>,
    ) {
        visited[fed_id as usize] = true;
        let downstream = self.node(fed_id).downstream().clone();
        for e_id in downstream {
            if visited[e_id as usize] {
                continue;
            }
            self.notify_advance_grant_if_safe(e_id, start_time, grants);
            self.notify_downstream_advance_grant_if_safe(e_id, start_time, visited, grants);
        }
    }

    /**
     * Record a latest tag complete (LTC) report and find the grants that it
     * unblocks downstream.
     */
    pub fn logical_tag_complete(
        &mut self,
        fed_id: u16,
        completed: Tag,
        start_time: Instant,
    ) -> Vec<TagAdvanceGrant> {
        let mut grants = Vec::new();
        {
            let fed = &mut self.scheduling_nodes[fed_id as usize];
            fed.in_transit_message_tags_mut().remove_up_to(completed);
            let node = fed.node_mut();
            if completed < node.completed() {
                let violation = RtiError::CoordinationViolation {
                    fed_id,
                    tag: completed,
                    detail: format!("LTC went backwards from {}", node.completed()),
                };
                warn!("{}", violation);
                return grants;
            }
            node.set_completed(completed);
        }
        info!(
            "RTI received from federate {} the latest tag complete (LTC) {}.",
            fed_id,
            completed.elapsed(start_time)
        );

        // Check downstream nodes to see whether they should now be granted a TAG.
        let downstream = self.node(fed_id).downstream().clone();
        for e_id in downstream {
            self.notify_advance_grant_if_safe(e_id, start_time, &mut grants);
            let mut visited = vec![false; self.scheduling_nodes.len()];
            self.notify_downstream_advance_grant_if_safe(
                e_id,
                start_time,
                &mut visited,
                &mut grants,
            );
        }
        grants
    }

    /**
     * A federate resigned, failed, or its connection was lost. It can no
     * longer send anything, so it stops constraining its downstream nodes.
     */
    pub fn mark_federate_disconnected(
        &mut self,
        fed_id: u16,
        start_time: Instant,
    ) -> Vec<TagAdvanceGrant> {
        let mut grants = Vec::new();
        {
            let e = self.node_mut(fed_id);
            if e.state() == SchedulingNodeState::NotConnected {
                return grants;
            }
            e.set_state(SchedulingNodeState::NotConnected);
            e.set_next_event(Tag::forever_tag());
        }
        let mut visited = vec![false; self.scheduling_nodes.len()];
        self.notify_downstream_advance_grant_if_safe(
            fed_id,
            start_time,
            &mut visited,
            &mut grants,
        );
        grants
    }
}
