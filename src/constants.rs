/**
 * @file
 * @author Hokeun Kim (hkim501@asu.edu)
 * @author Chanhee Lee (..)
 * @copyright (c) 2023, Arizona State University
 * License in [BSD 2-clause](..)
 * @brief Protocol-wide constants shared by the RTI and the federate-side client.
 */
use std::time::Duration;

/** Default port the RTI listens on. Port 0 on the command line means "search from here". */
pub const STARTING_PORT: u16 = 15045;

/** Number of consecutive ports tried when searching for a free RTI port. */
pub const MAX_NUM_PORT_ADDRESSES: u16 = 16;

/** Size of the random nonce used in the HMAC challenge. */
pub const NONCE_LENGTH: usize = 8;

/** Size of a SHA-256 HMAC tag. */
pub const SHA256_HMAC_LENGTH: usize = 32;

/** Bound on the size of fixed-format messages buffered by the RTI. */
pub const FED_COM_BUFFER_SIZE: usize = 256;

/**
 * Bound on the bytes following the header of a variable-length message.
 * Longer frames are refused before any buffer is allocated for them.
 */
pub const MAX_MESSAGE_BODY_LENGTH: usize = 16 * 1024 * 1024;

/** Federate IDs are u16 and u16::MAX is reserved, so no list can be longer. */
pub const MAX_NUMBER_OF_FEDERATES: usize = u16::MAX as usize - 1;

/** Offset added to the largest proposed start time. */
pub const DELAY_START: i64 = 1_000_000_000;

pub const PORT_BIND_RETRY_LIMIT: u32 = 60;
pub const PORT_BIND_RETRY_INTERVAL: Duration = Duration::from_secs(1);

pub const CONNECT_MAX_RETRIES: u32 = 100;
pub const CONNECT_RETRY_INTERVAL: Duration = Duration::from_millis(500);

pub const TCP_TIMEOUT_TIME: Duration = Duration::from_secs(10);
pub const UDP_TIMEOUT_TIME: Duration = Duration::from_secs(1);

pub const ADDRESS_QUERY_RETRY_INTERVAL: Duration = Duration::from_millis(250);
pub const ADDRESS_QUERY_MAX_RETRIES: u32 = 40;

pub const NUM_SOCKET_RETRIES: u32 = 10;
pub const DELAY_BETWEEN_SOCKET_RETRIES: Duration = Duration::from_millis(100);

/** Default period between runtime clock synchronization attempts. */
pub const CLOCK_SYNC_PERIOD_NS: u64 = 10 * 1_000_000;

/** Default number of T1/T3/T4 rounds per clock synchronization attempt. */
pub const CLOCK_SYNC_EXCHANGES_PER_INTERVAL: u32 = 10;

/**
 * Samples whose coded probe arrival spacing differs from the send spacing by
 * more than this many nanoseconds are discarded.
 */
pub const CLOCK_SYNC_GUARD_BAND_NS: i64 = 100_000;

/** Port value in a UDP_PORT message meaning "no runtime clock synchronization". */
pub const UDP_PORT_NONE: u16 = u16::MAX;

pub const RTI_TRACE_FILE_NAME: &str = "rti.lft";
