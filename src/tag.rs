/**
 * @file
 * @author Edward A. Lee (eal@berkeley.edu)
 * @author Soroush Bateni (soroush@utdallas.edu)
 * @author Chanhee Lee (chanheel@asu.edu)
 * @author Hokeun Kim (hokeun@asu.edu)
 * @copyright (c) 2020-2023, The University of California at Berkeley
 * License in [BSD 2-clause](..)
 * @brief Logical tags, time intervals, and the tag arithmetic used by the
 * tag-advance coordinator.
 */
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

////////////////  Type definitions

/**
 * Time instant. Both physical and logical times are represented
 * using this typedef.
 */
pub type Instant = i64;

/**
 * Interval of time. `None` encodes "no after delay" on a connection,
 * `Some(0)` is a one-microstep delay.
 */
pub type Interval = std::option::Option<i64>;

/**
 * Microstep instant.
 */
pub type Microstep = u32;

pub const NEVER: i64 = i64::MIN;
pub const FOREVER: i64 = i64::MAX;
pub const FOREVER_MICROSTEP: u32 = u32::MAX;

pub struct StartTime {
    start_time: Instant,
}

impl StartTime {
    pub fn new() -> StartTime {
        StartTime { start_time: NEVER }
    }

    pub fn start_time(&self) -> Instant {
        self.start_time
    }

    pub fn set_start_time(&mut self, start_time: Instant) {
        self.start_time = start_time;
    }
}

/**
 * A tag is a time, microstep pair. The derived ordering compares the
 * time first and the microstep second.
 */
#[derive(Hash, Eq, PartialEq, Ord, PartialOrd, Clone, Copy, Debug)]
pub struct Tag {
    time: Instant,
    microstep: Microstep,
}

////////////////  Functions

impl Tag {
    pub fn new(time: Instant, microstep: Microstep) -> Tag {
        Tag { time, microstep }
    }

    pub fn zero_tag() -> Tag {
        Tag {
            time: 0,
            microstep: 0,
        }
    }

    pub fn never_tag() -> Tag {
        Tag {
            time: NEVER,
            microstep: 0,
        }
    }

    pub fn forever_tag() -> Tag {
        Tag {
            time: FOREVER,
            microstep: FOREVER_MICROSTEP,
        }
    }

    pub fn time(&self) -> Instant {
        self.time
    }

    pub fn microstep(&self) -> Microstep {
        self.microstep
    }

    pub fn set_time(&mut self, time: i64) {
        self.time = time;
    }

    pub fn set_microstep(&mut self, microstep: u32) {
        self.microstep = microstep;
    }

    /**
     * Return the current physical time in nanoseconds since the UNIX epoch.
     * A clock that reads before the epoch yields 0.
     */
    pub fn lf_time_physical() -> Instant {
        match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(n) => i64::try_from(n.as_nanos()).unwrap_or(FOREVER),
            Err(_) => 0,
        }
    }

    pub fn lf_tag_compare(tag1: &Tag, tag2: &Tag) -> i32 {
        match tag1.cmp(tag2) {
            std::cmp::Ordering::Less => -1,
            std::cmp::Ordering::Equal => 0,
            std::cmp::Ordering::Greater => 1,
        }
    }

    /**
     * Delay a tag by the specified interval.
     * `None` (no delay) or a negative interval leaves the tag unchanged, as
     * does a NEVER tag. A zero interval increments the microstep. A positive
     * interval advances the time and resets the microstep. Overflow yields
     * FOREVER.
     */
    pub fn lf_delay_tag(tag: &Tag, interval: Interval) -> Tag {
        let delay = match interval {
            Some(delay) if delay >= 0 => delay,
            _ => return *tag,
        };
        if tag.time() == NEVER {
            return *tag;
        }
        if tag.time() >= FOREVER - delay {
            return Tag::forever_tag();
        }
        let mut result = *tag;
        if delay == 0 {
            result.set_microstep(result.microstep().saturating_add(1));
        } else {
            result.set_time(result.time() + delay);
            result.set_microstep(0);
        }
        result
    }

    /**
     * Like `lf_delay_tag`, but for a nonzero finite delay return the largest
     * tag strictly less than the delayed tag.
     */
    pub fn lf_delay_strict(tag: &Tag, interval: Interval) -> Tag {
        let mut result = Self::lf_delay_tag(tag, interval);
        if let Some(delay) = interval {
            if delay != 0
                && delay != NEVER
                && delay != FOREVER
                && result.time() != NEVER
                && result.time() != FOREVER
            {
                result.set_time(result.time() - 1);
                result.set_microstep(u32::MAX);
            }
        }
        result
    }

    /**
     * Add two tags where `b` is a delay. If `b` has a nonzero time the
     * microstep of `a` is lost and the result carries `b`'s microstep.
     */
    pub fn lf_tag_add(a: &Tag, b: &Tag) -> Tag {
        if a.time() == NEVER || b.time() == NEVER {
            return Tag::never_tag();
        }
        if a.time() == FOREVER || b.time() == FOREVER {
            return Tag::forever_tag();
        }
        let time = match a.time().checked_add(b.time()) {
            Some(time) if time != FOREVER => time,
            Some(_) => return Tag::forever_tag(),
            None if b.time() > 0 => return Tag::forever_tag(),
            None => return Tag::never_tag(),
        };
        if b.time() != 0 {
            return Tag::new(time, b.microstep());
        }
        match a.microstep().checked_add(b.microstep()) {
            Some(microstep) => Tag::new(time, microstep),
            None => Tag::forever_tag(),
        }
    }

    /**
     * Express a connection delay as a tag so that it can be accumulated
     * along a path: no delay is (0, 0), a zero delay is (0, 1), and a
     * positive delay d is (d, 0).
     */
    pub fn from_interval(interval: Interval) -> Tag {
        match interval {
            None => Tag::zero_tag(),
            Some(delay) if delay < 0 => Tag::zero_tag(),
            Some(0) => Tag::new(0, 1),
            Some(delay) => Tag::new(delay, 0),
        }
    }

    /** Format this tag relative to `start_time` for log messages. */
    pub fn elapsed(&self, start_time: Instant) -> ElapsedTag {
        ElapsedTag {
            tag: *self,
            start_time,
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.time {
            NEVER => write!(f, "(NEVER, {})", self.microstep),
            FOREVER => write!(f, "(FOREVER, {})", self.microstep),
            time => write!(f, "({}, {})", time, self.microstep),
        }
    }
}

pub struct ElapsedTag {
    tag: Tag,
    start_time: Instant,
}

impl fmt::Display for ElapsedTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.tag.time() {
            NEVER | FOREVER => write!(f, "{}", self.tag),
            time => write!(
                f,
                "({}, {})",
                time.saturating_sub(self.start_time),
                self.tag.microstep()
            ),
        }
    }
}
