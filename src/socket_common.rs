/**
 * @file
 * @author Chanhee Lee (chanheel@asu.edu)
 * @author Hokeun Kim (hokeun@asu.edu)
 * @copyright (c) 2023, Arizona State University
 * License in [BSD 2-clause](..)
 * @brief Socket creation with bounded bind and connect retries.
 *
 * The retry loops take the bind or connect step as a closure and sleep
 * through a `Sleeper`, so they can be driven without real sockets or time.
 */
use std::io;
use std::net::{TcpListener, TcpStream, UdpSocket};
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::constants::*;
use crate::error::RtiError;

pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    interval: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, interval: Duration) -> RetryPolicy {
        RetryPolicy {
            max_attempts: max_attempts.max(1),
            interval,
        }
    }

    pub fn bind() -> RetryPolicy {
        RetryPolicy::new(PORT_BIND_RETRY_LIMIT, PORT_BIND_RETRY_INTERVAL)
    }

    pub fn connect() -> RetryPolicy {
        RetryPolicy::new(CONNECT_MAX_RETRIES, CONNECT_RETRY_INTERVAL)
    }

    pub fn address_query() -> RetryPolicy {
        RetryPolicy::new(ADDRESS_QUERY_MAX_RETRIES, ADDRESS_QUERY_RETRY_INTERVAL)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

/**
 * Ports tried for a requested port. Port 0 means any of the
 * MAX_NUM_PORT_ADDRESSES ports starting at STARTING_PORT.
 */
fn candidate_ports(port: u16) -> Vec<u16> {
    if port == 0 {
        (0..MAX_NUM_PORT_ADDRESSES)
            .map(|offset| STARTING_PORT + offset)
            .collect()
    } else {
        vec![port]
    }
}

/**
 * Bind with `binder`, retrying up to the policy's attempt count. One attempt
 * covers every candidate port once. Returns the bound object and the port
 * that succeeded.
 */
pub fn bind_with_retries<T, F>(
    port: u16,
    policy: RetryPolicy,
    sleeper: &dyn Sleeper,
    mut binder: F,
) -> Result<(T, u16), RtiError>
where
    F: FnMut(u16) -> io::Result<T>,
{
    let candidates = candidate_ports(port);
    for attempt in 1..=policy.max_attempts() {
        for candidate in &candidates {
            match binder(*candidate) {
                Ok(bound) => return Ok((bound, *candidate)),
                Err(e) => debug!("Failed to bind port {}: {}", candidate, e),
            }
        }
        if attempt < policy.max_attempts() {
            warn!(
                "RTI failed to get port {}. Will try again in {:?}.",
                port,
                policy.interval()
            );
            sleeper.sleep(policy.interval());
        }
    }
    Err(RtiError::BindFailed {
        port,
        attempts: policy.max_attempts(),
    })
}

/**
 * Call `connector` until it succeeds or the policy's attempt count is
 * exhausted, in which case the peer is reported unreachable.
 */
pub fn connect_with_retries<T, F>(
    address: &str,
    policy: RetryPolicy,
    sleeper: &dyn Sleeper,
    mut connector: F,
) -> Result<T, RtiError>
where
    F: FnMut() -> io::Result<T>,
{
    for attempt in 1..=policy.max_attempts() {
        match connector() {
            Ok(connection) => return Ok(connection),
            Err(e) => {
                debug!("Connect attempt {} to {} failed: {}", attempt, address, e);
                if attempt < policy.max_attempts() {
                    sleeper.sleep(policy.interval());
                }
            }
        }
    }
    Err(RtiError::UnreachablePeer {
        address: String::from(address),
        attempts: policy.max_attempts(),
    })
}

pub fn create_server_tcp(
    port: u16,
    policy: RetryPolicy,
    sleeper: &dyn Sleeper,
) -> Result<(TcpListener, u16), RtiError> {
    let (listener, bound_port) = bind_with_retries(port, policy, sleeper, |candidate| {
        TcpListener::bind(("0.0.0.0", candidate))
    })?;
    info!("Server listening on TCP port {}.", bound_port);
    Ok((listener, bound_port))
}

pub fn create_server_udp(
    port: u16,
    policy: RetryPolicy,
    sleeper: &dyn Sleeper,
) -> Result<(UdpSocket, u16), RtiError> {
    let (socket, bound_port) = bind_with_retries(port, policy, sleeper, |candidate| {
        UdpSocket::bind(("0.0.0.0", candidate))
    })?;
    socket.set_read_timeout(Some(UDP_TIMEOUT_TIME))?;
    info!("Server listening on UDP port {}.", bound_port);
    Ok((socket, bound_port))
}

pub fn connect_to_address(
    address: &str,
    policy: RetryPolicy,
    sleeper: &dyn Sleeper,
) -> Result<TcpStream, RtiError> {
    let stream = connect_with_retries(address, policy, sleeper, || TcpStream::connect(address))?;
    stream.set_nodelay(true)?;
    info!("Connected to {}.", address);
    Ok(stream)
}

/**
 * Bound blocking reads on the reliable channel. An expired read is reported
 * by the reader as peer loss.
 */
pub fn set_tcp_timeout(stream: &TcpStream, timeout: Option<Duration>) -> Result<(), RtiError> {
    stream.set_read_timeout(timeout)?;
    stream.set_write_timeout(timeout)?;
    Ok(())
}
