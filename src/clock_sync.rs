/**
 * @file
 * @author Chanhee Lee (chanheel@asu.edu)
 * @author Hokeun Kim (hokeun@asu.edu)
 * @copyright (c) 2023, Arizona State University
 * License in [BSD 2-clause](..)
 * @brief PTP-style clock synchronization between the RTI and federates.
 *
 * One exchange: the RTI sends T1 carrying its send time t1. The federate
 * replies with T3 carrying its receive time t2 and send time t3, optionally
 * followed at once by a coded probe. The RTI records the receive time t4 (and
 * t4' for the probe) and sends T4 carrying t4, which lets the federate compute
 * the same sample. Estimates are diagnostic only and never influence tags.
 */
use std::io;
use std::net::{SocketAddr, TcpStream, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::constants::*;
use crate::error::RtiError;
use crate::message::Message;
use crate::net_util::NetUtil;
use crate::rti_common::SchedulingNodeState;
use crate::rti_remote::RTIRemote;
use crate::tag::{Instant, Tag};

/** Source of physical time. */
pub trait PhysicalClock {
    fn now(&self) -> Instant;
}

pub struct SystemClock;

impl PhysicalClock for SystemClock {
    fn now(&self) -> Instant {
        Tag::lf_time_physical()
    }
}

/** The four timestamps of one exchange. */
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub struct ClockSample {
    t1: Instant,
    t2: Instant,
    t3: Instant,
    t4: Instant,
}

impl ClockSample {
    pub fn new(t1: Instant, t2: Instant, t3: Instant, t4: Instant) -> ClockSample {
        ClockSample { t1, t2, t3, t4 }
    }

    /** Network round trip, excluding the time spent inside the federate. */
    pub fn round_trip_delay(&self) -> i64 {
        (self.t4 - self.t1) - (self.t3 - self.t2)
    }

    /** Federate clock minus RTI clock. */
    pub fn offset(&self) -> i64 {
        ((self.t2 - self.t1) + (self.t3 - self.t4)) / 2
    }
}

/**
 * A coded probe is sent back to back with T3. If the spacing seen on arrival
 * differs from the spacing at departure by more than the guard band, the
 * network or scheduler interfered and the sample is discarded.
 */
pub fn coded_probe_is_consistent(
    t3: Instant,
    t3_probe: Instant,
    t4: Instant,
    t4_probe: Instant,
) -> bool {
    ((t4_probe - t4) - (t3_probe - t3)).abs() <= CLOCK_SYNC_GUARD_BAND_NS
}

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub struct ClockEstimate {
    offset: i64,
    round_trip_delay: i64,
    samples: u32,
    measured_at: Instant, // RTI time of the last sample.
}

impl ClockEstimate {
    /** Average of the accepted samples, or None if there are none. */
    pub fn from_samples(samples: &[ClockSample]) -> Option<ClockEstimate> {
        if samples.is_empty() {
            return None;
        }
        let n = samples.len() as i64;
        let offset = samples.iter().map(|s| s.offset()).sum::<i64>() / n;
        let round_trip_delay = samples.iter().map(|s| s.round_trip_delay()).sum::<i64>() / n;
        let measured_at = samples.iter().map(|s| s.t4).max().unwrap_or(0);
        Some(ClockEstimate {
            offset,
            round_trip_delay,
            samples: samples.len() as u32,
            measured_at,
        })
    }

    /**
     * Rate at which the federate clock gains on the RTI clock between an
     * earlier estimate and this one, in nanoseconds per second. None if the
     * earlier estimate is not actually earlier.
     */
    pub fn drift_since(&self, earlier: &ClockEstimate) -> Option<i64> {
        let elapsed = self.measured_at - earlier.measured_at;
        if elapsed <= 0 {
            return None;
        }
        let gained = (self.offset - earlier.offset) as i128;
        Some((gained * 1_000_000_000 / elapsed as i128) as i64)
    }

    pub fn offset(&self) -> i64 {
        self.offset
    }

    pub fn round_trip_delay(&self) -> i64 {
        self.round_trip_delay
    }

    pub fn samples(&self) -> u32 {
        self.samples
    }

    pub fn measured_at(&self) -> Instant {
        self.measured_at
    }
}

/** A channel clock sync messages travel over. */
pub trait ClockSyncChannel {
    fn send_message(&mut self, message: &Message) -> Result<(), RtiError>;
    fn receive_message(&mut self) -> Result<Message, RtiError>;

    /** Drop replies still queued from an earlier exchange. */
    fn discard_pending(&mut self) -> Result<(), RtiError> {
        Ok(())
    }
}

pub struct TcpClockSyncChannel<'a> {
    stream: &'a mut TcpStream,
    fed_id: u16,
}

impl<'a> TcpClockSyncChannel<'a> {
    pub fn new(stream: &'a mut TcpStream, fed_id: u16) -> TcpClockSyncChannel<'a> {
        TcpClockSyncChannel { stream, fed_id }
    }
}

impl<'a> ClockSyncChannel for TcpClockSyncChannel<'a> {
    fn send_message(&mut self, message: &Message) -> Result<(), RtiError> {
        NetUtil::write_to_socket(self.stream, &message.encode(), self.fed_id)
    }

    fn receive_message(&mut self) -> Result<Message, RtiError> {
        Message::read_from(self.stream, self.fed_id)
    }
}

/** Datagrams from anyone but `peer` are ignored. */
pub struct UdpClockSyncChannel<'a> {
    socket: &'a UdpSocket,
    peer: SocketAddr,
}

impl<'a> UdpClockSyncChannel<'a> {
    pub fn new(socket: &'a UdpSocket, peer: SocketAddr) -> UdpClockSyncChannel<'a> {
        UdpClockSyncChannel { socket, peer }
    }
}

impl<'a> ClockSyncChannel for UdpClockSyncChannel<'a> {
    fn send_message(&mut self, message: &Message) -> Result<(), RtiError> {
        self.socket.send_to(&message.encode(), self.peer)?;
        Ok(())
    }

    fn receive_message(&mut self) -> Result<Message, RtiError> {
        let mut buffer = vec![0 as u8; FED_COM_BUFFER_SIZE];
        loop {
            let (bytes_read, from) = self.socket.recv_from(&mut buffer)?;
            if from != self.peer {
                debug!("Ignoring clock sync datagram from {}.", from);
                continue;
            }
            return Ok(Message::decode(&buffer[..bytes_read])?);
        }
    }

    fn discard_pending(&mut self) -> Result<(), RtiError> {
        let mut buffer = vec![0 as u8; FED_COM_BUFFER_SIZE];
        self.socket.set_nonblocking(true)?;
        let mut discarded = 0;
        let drained = loop {
            match self.socket.recv_from(&mut buffer) {
                Ok(_) => discarded += 1,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break Ok(()),
                Err(e) => break Err(e),
            }
        };
        self.socket.set_nonblocking(false)?;
        drained?;
        if discarded > 0 {
            debug!("Discarded {} stale clock sync datagrams.", discarded);
        }
        Ok(())
    }
}

/**
 * Run one exchange from the RTI side. Returns None when a coded probe shows
 * the sample is unreliable, or when the reply cannot belong to this T1
 * because the round trip it implies is negative or longer than a UDP read
 * may wait.
 */
pub fn exchange<C: ClockSyncChannel, K: PhysicalClock>(
    channel: &mut C,
    clock: &K,
    fed_id: u16,
    coded_probes: bool,
) -> Result<Option<ClockSample>, RtiError> {
    channel.discard_pending()?;
    let t1 = clock.now();
    channel.send_message(&Message::ClockSyncT1(t1))?;
    let (t2, t3) = match channel.receive_message()? {
        Message::ClockSyncT3 {
            fed_id: from,
            t2,
            t3,
        } if from == fed_id => (t2, t3),
        other => {
            return Err(RtiError::Protocol(format!(
                "expected clock sync T3 from federate {}, got {:?}",
                fed_id,
                other.msg_type()
            )))
        }
    };
    let t4 = clock.now();
    let mut consistent = true;
    if coded_probes {
        match channel.receive_message()? {
            Message::ClockSyncCodedProbe {
                fed_id: from,
                send_time,
            } if from == fed_id => {
                let t4_probe = clock.now();
                consistent = coded_probe_is_consistent(t3, send_time, t4, t4_probe);
            }
            other => {
                return Err(RtiError::Protocol(format!(
                    "expected coded probe from federate {}, got {:?}",
                    fed_id,
                    other.msg_type()
                )))
            }
        }
    }
    channel.send_message(&Message::ClockSyncT4(t4))?;
    if !consistent {
        debug!("Discarding clock sync sample from federate {}.", fed_id);
        return Ok(None);
    }
    let sample = ClockSample::new(t1, t2, t3, t4);
    let round_trip = sample.round_trip_delay();
    if round_trip < 0 || round_trip as u128 > UDP_TIMEOUT_TIME.as_nanos() {
        debug!(
            "Discarding clock sync reply from federate {} with round trip {} ns.",
            fed_id, round_trip
        );
        return Ok(None);
    }
    Ok(Some(sample))
}

/**
 * Answer one T1 from the federate side and wait for the matching T4.
 */
pub fn respond<C: ClockSyncChannel, K: PhysicalClock>(
    channel: &mut C,
    clock: &K,
    fed_id: u16,
    t1: Instant,
    coded_probes: bool,
) -> Result<ClockSample, RtiError> {
    let t2 = clock.now();
    let t3 = clock.now();
    channel.send_message(&Message::ClockSyncT3 { fed_id, t2, t3 })?;
    if coded_probes {
        channel.send_message(&Message::ClockSyncCodedProbe {
            fed_id,
            send_time: clock.now(),
        })?;
    }
    match channel.receive_message()? {
        Message::ClockSyncT4(t4) => Ok(ClockSample::new(t1, t2, t3, t4)),
        other => Err(RtiError::Protocol(format!(
            "expected clock sync T4, got {:?}",
            other.msg_type()
        ))),
    }
}

/**
 * Startup synchronization, RTI side. Runs `exchanges` exchanges and averages
 * the accepted samples.
 */
pub fn initial_clock_sync<C: ClockSyncChannel, K: PhysicalClock>(
    channel: &mut C,
    clock: &K,
    fed_id: u16,
    exchanges: u32,
    coded_probes: bool,
) -> Result<Option<ClockEstimate>, RtiError> {
    let mut samples = Vec::with_capacity(exchanges as usize);
    for _ in 0..exchanges {
        if let Some(sample) = exchange(channel, clock, fed_id, coded_probes)? {
            samples.push(sample);
        }
    }
    let estimate = ClockEstimate::from_samples(&samples);
    match estimate {
        Some(e) => info!(
            "RTI: Initial clock sync with federate {}: offset {} ns, round trip {} ns ({} of {} samples).",
            fed_id,
            e.offset(),
            e.round_trip_delay(),
            e.samples(),
            exchanges
        ),
        None => warn!(
            "RTI: Initial clock sync with federate {} produced no usable sample.",
            fed_id
        ),
    }
    Ok(estimate)
}

/** Startup synchronization, federate side. */
pub fn respond_initial_clock_sync<C: ClockSyncChannel, K: PhysicalClock>(
    channel: &mut C,
    clock: &K,
    fed_id: u16,
    exchanges: u32,
    coded_probes: bool,
) -> Result<Option<ClockEstimate>, RtiError> {
    let mut samples = Vec::with_capacity(exchanges as usize);
    for _ in 0..exchanges {
        let t1 = match channel.receive_message()? {
            Message::ClockSyncT1(t1) => t1,
            other => {
                return Err(RtiError::Protocol(format!(
                    "expected clock sync T1, got {:?}",
                    other.msg_type()
                )))
            }
        };
        samples.push(respond(channel, clock, fed_id, t1, coded_probes)?);
    }
    Ok(ClockEstimate::from_samples(&samples))
}

/**
 * Periodic synchronization over UDP with every federate that asked for it.
 * A lost or late datagram only fails that round.
 */
pub fn clock_synchronization_thread(
    rti: Arc<RwLock<RTIRemote>>,
    socket: UdpSocket,
    all_federates_exited: Arc<AtomicBool>,
) {
    let (period, exchanges, coded_probes) = {
        let locked_rti = rti.read().unwrap_or_else(PoisonError::into_inner);
        (
            Duration::from_nanos(locked_rti.clock_sync_period_ns()),
            locked_rti.clock_sync_exchanges_per_interval(),
            locked_rti.clock_sync_coded_probes(),
        )
    };
    let clock = SystemClock;
    info!("RTI: Starting periodic clock synchronization every {:?}.", period);
    while !all_federates_exited.load(Ordering::SeqCst) {
        thread::sleep(period);
        let targets: Vec<(u16, SocketAddr)> = {
            let locked_rti = rti.read().unwrap_or_else(PoisonError::into_inner);
            locked_rti
                .base()
                .scheduling_nodes()
                .iter()
                .filter(|fed| {
                    fed.clock_synchronization_enabled()
                        && fed.node().state() != SchedulingNodeState::NotConnected
                })
                .filter_map(|fed| fed.udp_addr().map(|addr| (fed.node().id(), addr)))
                .collect()
        };
        for (fed_id, addr) in targets {
            let mut channel = UdpClockSyncChannel::new(&socket, addr);
            let mut samples = Vec::new();
            for _ in 0..exchanges {
                match exchange(&mut channel, &clock, fed_id, coded_probes) {
                    Ok(Some(sample)) => samples.push(sample),
                    Ok(None) => {}
                    Err(e) => {
                        debug!("RTI: Clock sync round with federate {} failed: {}", fed_id, e);
                        break;
                    }
                }
            }
            if let Some(estimate) = ClockEstimate::from_samples(&samples) {
                let mut locked_rti = rti.write().unwrap_or_else(PoisonError::into_inner);
                let fed = &mut locked_rti.base_mut().scheduling_nodes_mut()[fed_id as usize];
                fed.set_clock_estimate(estimate);
                debug!(
                    "RTI: Clock offset of federate {} is {} ns, drift {:?} ns/s.",
                    fed_id,
                    estimate.offset(),
                    fed.clock_drift()
                );
            }
        }
    }
    debug!("RTI: Clock synchronization thread exiting.");
}
