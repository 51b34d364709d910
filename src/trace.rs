/**
 * @file
 * @author Edward A. Lee
 * @author Chanhee Lee
 * @copyright (c) 2020, The University of California at Berkeley and TU Dresden
 * License in [BSD 2-clause](..)
 * @brief Binary trace of the messages the RTI exchanges with federates.
 *
 * The trace file starts with a header holding the start time (i64) and the
 * size of the object description table (i32, always 0 for the RTI). It is
 * followed by chunks, each an i32 record count and that many fixed-size
 * records. Integers are in native byte order.
 */
use std::fs::File;
use std::io::{BufWriter, Write};

use tracing::{debug, info, warn};
use zerocopy::AsBytes;

use crate::error::RtiError;
use crate::tag::{Instant, Tag};

const TRACE_BUFFER_CAPACITY: usize = 2048;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TraceEvent {
    ReceiveAdrAd,
    ReceiveAdrQr,
    ReceiveFailed,
    ReceiveFedId,
    ReceiveMsg,
    ReceiveNet,
    ReceiveLtc,
    ReceivePortAbs,
    ReceiveResign,
    ReceiveStopReq,
    ReceiveStopReqRep,
    ReceiveTaggedMsg,
    ReceiveTimestamp,
    ReceiveUnidentified,
    SendAck,
    SendAdrAd,
    SendMsg,
    SendPortAbs,
    SendPTag,
    SendReject,
    SendStopGrn,
    SendStopReq,
    SendTag,
    SendTaggedMsg,
    SendTimestamp,
}

impl TraceEvent {
    pub fn to_value(&self) -> i32 {
        match self {
            TraceEvent::ReceiveAdrAd => 51,
            TraceEvent::ReceiveAdrQr => 52,
            TraceEvent::ReceiveFailed => 33,
            TraceEvent::ReceiveFedId => 40,
            TraceEvent::ReceiveMsg => 49,
            TraceEvent::ReceiveNet => 35,
            TraceEvent::ReceiveLtc => 36,
            TraceEvent::ReceivePortAbs => 45,
            TraceEvent::ReceiveResign => 44,
            TraceEvent::ReceiveStopReq => 37,
            TraceEvent::ReceiveStopReqRep => 38,
            TraceEvent::ReceiveTaggedMsg => 47,
            TraceEvent::ReceiveTimestamp => 34,
            TraceEvent::ReceiveUnidentified => 53,
            TraceEvent::SendAck => 11,
            TraceEvent::SendAdrAd => 30,
            TraceEvent::SendMsg => 28,
            TraceEvent::SendPortAbs => 24,
            TraceEvent::SendPTag => 20,
            TraceEvent::SendReject => 22,
            TraceEvent::SendStopGrn => 18,
            TraceEvent::SendStopReq => 16,
            TraceEvent::SendTag => 21,
            TraceEvent::SendTaggedMsg => 26,
            TraceEvent::SendTimestamp => 13,
        }
    }
}

pub enum TraceDirection {
    From,
    To,
}

#[derive(AsBytes, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C)]
pub struct TraceRecord {
    event_type: i32,
    src_id: i32, // Federate the message came from, or -1 for the RTI.
    dst_id: i32, // Federate the message went to, or -1 for the RTI.
    microstep: u32,
    logical_time: Instant,
    physical_time: Instant,
}

impl TraceRecord {
    pub fn event_type(&self) -> i32 {
        self.event_type
    }

    pub fn src_id(&self) -> i32 {
        self.src_id
    }

    pub fn dst_id(&self) -> i32 {
        self.dst_id
    }

    pub fn tag(&self) -> Tag {
        Tag::new(self.logical_time, self.microstep)
    }

    pub fn physical_time(&self) -> Instant {
        self.physical_time
    }
}

pub struct Trace {
    /** Records not yet written. Flushed when full and when tracing stops. */
    buffer: Vec<TraceRecord>,

    file: Option<BufWriter<File>>,

    /** The file name where the traces are written. */
    filename: String,

    header_written: bool,

    start_time: Instant,
}

impl Trace {
    pub fn trace_new(filename: &str) -> Trace {
        Trace {
            buffer: Vec::new(),
            file: None,
            filename: String::from(filename),
            header_written: false,
            start_time: 0,
        }
    }

    pub fn filename(&self) -> &String {
        &self.filename
    }

    pub fn buffered_records(&self) -> &Vec<TraceRecord> {
        &self.buffer
    }

    pub fn is_started(&self) -> bool {
        self.file.is_some()
    }

    pub fn set_start_time(&mut self, start_time: Instant) {
        self.start_time = start_time;
    }

    pub fn start_trace(&mut self) -> Result<(), RtiError> {
        let file = File::create(&self.filename)?;
        self.file = Some(BufWriter::new(file));
        self.buffer.reserve(TRACE_BUFFER_CAPACITY);
        info!("Started tracing to {}.", self.filename);
        Ok(())
    }

    pub fn stop_trace(&mut self) {
        if self.file.is_none() {
            return;
        }
        if let Err(e) = self.flush_trace() {
            warn!("Failed to flush the RTI trace file: {}", e);
        }
        if let Some(mut file) = self.file.take() {
            if let Err(e) = file.flush() {
                warn!("Failed to flush the RTI trace file: {}", e);
            }
        }
        info!("Stopped tracing.");
    }

    pub fn tracepoint_rti_from_federate(&mut self, event_type: TraceEvent, fed_id: u16, tag: Tag) {
        self.tracepoint(event_type, &tag, fed_id.into(), -1);
    }

    pub fn tracepoint_rti_to_federate(&mut self, event_type: TraceEvent, fed_id: u16, tag: Tag) {
        self.tracepoint(event_type, &tag, -1, fed_id.into());
    }

    fn tracepoint(&mut self, event_type: TraceEvent, tag: &Tag, src_id: i32, dst_id: i32) {
        if self.file.is_none() {
            return;
        }
        if self.buffer.len() >= TRACE_BUFFER_CAPACITY {
            if let Err(e) = self.flush_trace() {
                warn!("Failed to write to the RTI trace file: {}", e);
            }
        }
        self.buffer.push(TraceRecord {
            event_type: event_type.to_value(),
            src_id,
            dst_id,
            microstep: tag.microstep(),
            logical_time: tag.time(),
            physical_time: Tag::lf_time_physical(),
        });
    }

    fn flush_trace(&mut self) -> Result<(), RtiError> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let file = match self.file.as_mut() {
            Some(file) => file,
            None => return Ok(()),
        };
        if !self.header_written {
            debug!("Start time written to trace file is {}.", self.start_time);
            file.write_all(self.start_time.as_bytes())?;
            // The RTI registers no trace objects.
            file.write_all(0i32.as_bytes())?;
            self.header_written = true;
        }
        file.write_all((self.buffer.len() as i32).as_bytes())?;
        file.write_all(self.buffer.as_slice().as_bytes())?;
        self.buffer.clear();
        Ok(())
    }

    pub fn log_trace(
        &mut self,
        trace_event: TraceEvent,
        fed_id: u16,
        tag: &Tag,
        direction: TraceDirection,
    ) {
        match direction {
            TraceDirection::From => self.tracepoint_rti_from_federate(trace_event, fed_id, *tag),
            TraceDirection::To => self.tracepoint_rti_to_federate(trace_event, fed_id, *tag),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::fs;
    use std::mem;

    #[test]
    fn test_record_layout_has_no_padding() {
        assert_eq!(32, mem::size_of::<TraceRecord>());
    }

    #[test]
    fn test_tracepoints_ignored_until_started() {
        let mut trace = Trace::trace_new("unused.lft");
        trace.tracepoint_rti_to_federate(TraceEvent::SendTag, 1, Tag::zero_tag());
        assert!(trace.buffered_records().is_empty());
        assert!(!trace.is_started());
    }

    #[test]
    fn test_trace_file_format() {
        let path = std::env::temp_dir().join(format!("rti_trace_test_{}.lft", std::process::id()));
        let mut trace = Trace::trace_new(path.to_str().unwrap());
        trace.start_trace().unwrap();
        trace.set_start_time(1_000);
        trace.log_trace(
            TraceEvent::ReceiveNet,
            2,
            &Tag::new(1_010, 0),
            TraceDirection::From,
        );
        trace.log_trace(TraceEvent::SendTag, 3, &Tag::new(1_020, 1), TraceDirection::To);
        assert_eq!(2, trace.buffered_records().len());
        assert_eq!(2, trace.buffered_records()[0].src_id());
        assert_eq!(-1, trace.buffered_records()[0].dst_id());
        assert_eq!(Tag::new(1_020, 1), trace.buffered_records()[1].tag());
        trace.stop_trace();

        let bytes = fs::read(&path).unwrap();
        fs::remove_file(&path).unwrap();
        assert_eq!(8 + 4 + 4 + 2 * 32, bytes.len());
        assert_eq!(1_000i64.to_ne_bytes(), bytes[0..8]);
        assert_eq!(0i32.to_ne_bytes(), bytes[8..12]);
        assert_eq!(2i32.to_ne_bytes(), bytes[12..16]);
        assert_eq!(35i32.to_ne_bytes(), bytes[16..20]);
        assert_eq!(21i32.to_ne_bytes(), bytes[48..52]);
    }
}
