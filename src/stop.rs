/**
 * @file
 * @author Edward A. Lee (eal@berkeley.edu)
 * @author Chanhee Lee (chanheel@asu.edu)
 * @author Hokeun Kim (hokeun@asu.edu)
 * @copyright (c) 2020-2023, The University of California at Berkeley
 * License in [BSD 2-clause](..)
 * @brief Agreement on a common stop tag.
 *
 * A stop request from any federate (or from the RTI itself) is forwarded once
 * to every other federate. Each answers with the tag it can stop at. When all
 * connected federates have answered, the maximum proposed tag is broadcast in
 * STOP_GRANTED. Every federate that disconnects along the way counts as
 * having answered.
 */
use tracing::{debug, info, warn};

use crate::error::RtiError;
use crate::message::Message;
use crate::rti_common::SchedulingNodeState;
use crate::rti_remote::RTIRemote;
use crate::tag::Tag;
use crate::trace::{TraceDirection, TraceEvent};

#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Debug)]
pub enum StopPhase {
    Running,
    StopRequested,    // The request has been forwarded. No reply yet.
    StopRequestAcked, // Some, but not all, federates have replied.
    StopGranted,
    Terminated,
}

impl RTIRemote {
    /**
     * A federate asks the federation to stop at `proposed_tag`.
     */
    pub fn handle_stop_request(&mut self, fed_id: u16, proposed_tag: Tag) {
        self.trace(TraceEvent::ReceiveStopReq, fed_id, &proposed_tag, TraceDirection::From);
        let start_time = self.start_time();
        info!(
            "RTI received from federate {} a MsgType::StopRequest message with tag {}.",
            fed_id,
            proposed_tag.elapsed(start_time)
        );
        if self.base().stop_phase() >= StopPhase::StopGranted {
            debug!("RTI: Stop already granted. Ignoring the request.");
            return;
        }
        self.raise_max_stop_tag(proposed_tag);
        if !self.mark_federate_requesting_stop(fed_id) {
            // Already counted. Only the proposed tag could have changed.
            return;
        }
        if self.base().stop_phase() == StopPhase::Running {
            self.forward_stop_request(Some(fed_id));
        }
        self.check_stop_complete();
    }

    /**
     * A federate answers a forwarded stop request. A reply earlier than the
     * tag the federate has already completed means it cannot actually stop
     * there; the violation is reported and the reply still counts.
     */
    pub fn handle_stop_request_reply(&mut self, fed_id: u16, reply_tag: Tag) {
        self.trace(TraceEvent::ReceiveStopReqRep, fed_id, &reply_tag, TraceDirection::From);
        let start_time = self.start_time();
        info!(
            "RTI received from federate {} STOP reply tag {}.",
            fed_id,
            reply_tag.elapsed(start_time)
        );
        if self.base().stop_phase() >= StopPhase::StopGranted {
            debug!("RTI: Stop already granted. Ignoring the reply.");
            return;
        }
        let completed = self.base().node(fed_id).completed();
        if reply_tag < completed {
            let violation = RtiError::CoordinationViolation {
                fed_id,
                tag: reply_tag,
                detail: format!("stop reply earlier than completed tag {}", completed),
            };
            warn!("{}", violation);
        }
        self.raise_max_stop_tag(reply_tag);
        self.mark_federate_requesting_stop(fed_id);
        if self.base().stop_phase() == StopPhase::StopRequested {
            self.base_mut().set_stop_phase(StopPhase::StopRequestAcked);
        }
        self.check_stop_complete();
    }

    /**
     * Originate a stop from the RTI. The federates are asked to stop at
     * `proposed_tag` or later.
     */
    pub fn request_stop(&mut self, proposed_tag: Tag) {
        if self.base().stop_phase() != StopPhase::Running {
            debug!("RTI: A stop is already in progress.");
            return;
        }
        info!(
            "RTI requesting the federation to stop at {}.",
            proposed_tag.elapsed(self.start_time())
        );
        self.raise_max_stop_tag(proposed_tag);
        self.forward_stop_request(None);
        self.check_stop_complete();
    }

    /**
     * Start the stop given on the command line once no federate is still
     * waiting for its start time. Requested at most once.
     */
    pub fn request_configured_stop(&mut self) {
        let stop_after = match self.stop_after() {
            Some(stop_after) => stop_after,
            None => return,
        };
        let all_started = self
            .base()
            .scheduling_nodes()
            .iter()
            .all(|fed| fed.node().state() != SchedulingNodeState::Pending);
        if !all_started {
            return;
        }
        self.set_stop_after(None);
        let stop_time = self.start_time().saturating_add(stop_after);
        self.request_stop(Tag::new(stop_time, 0));
    }

    fn raise_max_stop_tag(&mut self, tag: Tag) {
        if tag > self.base().max_stop_tag() {
            self.base_mut().set_max_stop_tag(tag);
        }
    }

    /** Returns false if the federate was already counted. */
    fn mark_federate_requesting_stop(&mut self, fed_id: u16) -> bool {
        let fed = &mut self.base_mut().scheduling_nodes_mut()[fed_id as usize];
        if fed.requested_stop() {
            return false;
        }
        fed.set_requested_stop(true);
        let handling = self.base().num_scheduling_nodes_handling_stop() + 1;
        self.base_mut().set_num_scheduling_nodes_handling_stop(handling);
        true
    }

    fn forward_stop_request(&mut self, requester: Option<u16>) {
        self.base_mut().set_stop_phase(StopPhase::StopRequested);
        let stop_tag = self.base().max_stop_tag();
        let targets: Vec<u16> = self
            .base()
            .scheduling_nodes()
            .iter()
            .filter(|fed| Some(fed.node().id()) != requester)
            .filter(|fed| !fed.requested_stop())
            .filter(|fed| fed.node().state() != SchedulingNodeState::NotConnected)
            .map(|fed| fed.node().id())
            .collect();
        for id in targets {
            self.trace(TraceEvent::SendStopReq, id, &stop_tag, TraceDirection::To);
            if let Err(e) = self.send_to_federate(id, &Message::StopRequest(stop_tag)) {
                warn!("RTI failed to forward the stop request to federate {}: {}", id, e);
                self.handle_federate_disconnected(id);
            }
        }
        info!(
            "RTI forwarded to federates the stop tag {}.",
            stop_tag.elapsed(self.start_time())
        );
    }

    /**
     * Grant the stop once every federate has either answered or is gone.
     */
    pub fn check_stop_complete(&mut self) {
        let phase = self.base().stop_phase();
        if phase != StopPhase::StopRequested && phase != StopPhase::StopRequestAcked {
            return;
        }
        let all_handled = self.base().scheduling_nodes().iter().all(|fed| {
            fed.requested_stop() || fed.node().state() == SchedulingNodeState::NotConnected
        });
        if all_handled {
            self.broadcast_stop_granted();
        }
    }

    fn broadcast_stop_granted(&mut self) {
        self.base_mut().set_stop_phase(StopPhase::StopGranted);
        let stop_tag = self.base().max_stop_tag();
        let connected: Vec<u16> = self
            .base()
            .scheduling_nodes()
            .iter()
            .filter(|fed| fed.node().state() != SchedulingNodeState::NotConnected)
            .map(|fed| fed.node().id())
            .collect();
        for id in connected {
            {
                let node = self.base_mut().node_mut(id);
                if node.next_event() > stop_tag {
                    node.set_next_event(stop_tag);
                }
            }
            self.trace(TraceEvent::SendStopGrn, id, &stop_tag, TraceDirection::To);
            if let Err(e) = self.send_to_federate(id, &Message::StopGranted(stop_tag)) {
                warn!("RTI failed to send the stop grant to federate {}: {}", id, e);
                self.handle_federate_disconnected(id);
            }
        }
        info!(
            "RTI sent to federates STOP_GRANTED with tag {}.",
            stop_tag.elapsed(self.start_time())
        );
    }
}
