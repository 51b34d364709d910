/**
 * @file
 * @author Chanhee Lee (chanheel@asu.edu)
 * @author Hokeun Kim (hokeun@asu.edu)
 * @copyright (c) 2023, Arizona State University
 * License in [BSD 2-clause](..)
 * @brief Whole federations run against a live RTI over loopback sockets.
 */
use std::net::TcpListener;
use std::thread;
use std::thread::JoinHandle;

use rti::constants::UDP_PORT_NONE;
use rti::error::RtiError;
use rti::net_common::ErrType;
use rti::socket_common::{RetryPolicy, ThreadSleeper};
use rti::tag::{Instant, Interval, Tag};
use rti::{FederateClient, Message, Server};

const RUST_RTI_PROGRAM_PATH: &str = "target/debug/rti";
const FEDERATION_ID: &str = "integration_federation";

fn start_rti(extra_args: &[&str]) -> (String, JoinHandle<Result<(), RtiError>>) {
    let mut rti = rti::initialize_rti();
    let args: Vec<String> = [RUST_RTI_PROGRAM_PATH, "-i", FEDERATION_ID]
        .iter()
        .chain(extra_args.iter())
        .map(|arg| String::from(*arg))
        .collect();
    rti::process_args(&mut rti, &args).unwrap();
    rti::initialize_federates(&mut rti);
    let mut server = Server::with_listener(TcpListener::bind("127.0.0.1:0").unwrap()).unwrap();
    let address = format!("127.0.0.1:{}", server.port());
    let handle = thread::spawn(move || server.wait_for_federates(rti));
    (address, handle)
}

fn join_federation(
    address: &str,
    fed_id: u16,
    upstream: &[(u16, Interval)],
    downstream: &[u16],
) -> FederateClient {
    let mut client = FederateClient::connect(
        address,
        fed_id,
        FEDERATION_ID,
        false,
        RetryPolicy::connect(),
        &ThreadSleeper,
    )
    .unwrap();
    client.send_neighbor_structure(upstream, downstream).unwrap();
    client.send_udp_port(UDP_PORT_NONE).unwrap();
    client
}

fn start(client: &mut FederateClient) -> Instant {
    let now = Tag::lf_time_physical();
    client.propose_start_time(now).unwrap()
}

#[test]
fn test_upstream_message_delivered_before_grant() {
    let (address, rti_handle) = start_rti(&["-n", "2", "-c", "off"]);

    let address_a = address.clone();
    let federate_a = thread::spawn(move || {
        let mut a = join_federation(&address_a, 0, &[], &[1]);
        let start_time = start(&mut a);
        let tag = Tag::new(start_time + 10, 0);
        a.send_next_event_tag(tag).unwrap();
        a.send_tagged_message(1, 0, tag, vec![42]).unwrap();
        a.send_latest_tag_complete(tag).unwrap();
        a.resign().unwrap();
    });

    let mut b = join_federation(&address, 1, &[(0, None)], &[]);
    let start_time = start(&mut b);
    let target = Tag::new(start_time + 10, 0);
    b.send_next_event_tag(target).unwrap();
    let mut message_received = false;
    loop {
        match b.receive().unwrap() {
            Message::TaggedMessage(data, tag) => {
                assert_eq!(vec![42], data.payload);
                assert_eq!(target, tag);
                message_received = true;
            }
            Message::ProvisionalTagAdvanceGrant(tag) => assert!(tag <= target),
            Message::TagAdvanceGrant(tag) if tag >= target => break,
            Message::TagAdvanceGrant(_) => {}
            other => panic!("unexpected {:?}", other.msg_type()),
        }
    }
    assert!(message_received);
    b.send_latest_tag_complete(target).unwrap();
    b.resign().unwrap();

    federate_a.join().unwrap();
    assert!(rti_handle.join().unwrap().is_ok());
}

#[test]
fn test_stop_agreement_uses_largest_proposal() {
    let (address, rti_handle) = start_rti(&["-n", "2", "-c", "off"]);

    let address_a = address.clone();
    let federate_a = thread::spawn(move || {
        let mut a = join_federation(&address_a, 0, &[], &[]);
        let start_time = start(&mut a);
        a.send_stop_request(Tag::new(start_time + 50, 0)).unwrap();
        let granted = loop {
            if let Message::StopGranted(tag) = a.receive().unwrap() {
                break tag;
            }
        };
        a.resign().unwrap();
        (start_time, granted)
    });

    let mut b = join_federation(&address, 1, &[], &[]);
    let start_time = start(&mut b);
    loop {
        if let Message::StopRequest(tag) = b.receive().unwrap() {
            assert_eq!(Tag::new(start_time + 50, 0), tag);
            break;
        }
    }
    b.send_stop_request_reply(Tag::new(start_time + 55, 0)).unwrap();
    let granted = loop {
        if let Message::StopGranted(tag) = b.receive().unwrap() {
            break tag;
        }
    };
    assert_eq!(Tag::new(start_time + 55, 0), granted);
    b.resign().unwrap();

    let (start_time_a, granted_a) = federate_a.join().unwrap();
    assert_eq!(start_time, start_time_a);
    assert_eq!(granted, granted_a);
    assert!(rti_handle.join().unwrap().is_ok());
}

#[test]
fn test_wrong_federation_rejected_without_a_record() {
    let (address, rti_handle) = start_rti(&["-n", "1", "-c", "off"]);

    let wrong = FederateClient::connect(
        &address,
        0,
        "some_other_federation",
        false,
        RetryPolicy::connect(),
        &ThreadSleeper,
    );
    assert!(matches!(
        wrong,
        Err(RtiError::Rejected(ErrType::FederationIdDoesNotMatch))
    ));
    let out_of_range = FederateClient::connect(
        &address,
        4,
        FEDERATION_ID,
        false,
        RetryPolicy::connect(),
        &ThreadSleeper,
    );
    assert!(matches!(
        out_of_range,
        Err(RtiError::Rejected(ErrType::FederateIdOutOfRange))
    ));

    // Federate 0 is still free to join.
    let mut client = join_federation(&address, 0, &[], &[]);
    start(&mut client);
    client.resign().unwrap();
    assert!(rti_handle.join().unwrap().is_ok());
}

#[test]
fn test_authenticated_federate_admitted() {
    let (address, rti_handle) = start_rti(&["-n", "1", "-c", "off", "-a"]);
    let mut client = FederateClient::connect(
        &address,
        0,
        FEDERATION_ID,
        true,
        RetryPolicy::connect(),
        &ThreadSleeper,
    )
    .unwrap();
    client.send_neighbor_structure(&[], &[]).unwrap();
    client.send_udp_port(UDP_PORT_NONE).unwrap();
    start(&mut client);
    client.resign().unwrap();
    assert!(rti_handle.join().unwrap().is_ok());
}

#[test]
fn test_initial_clock_sync() {
    let (address, rti_handle) = start_rti(&["-n", "1", "-c", "init", "exchanges-per-interval", "3"]);
    let mut client = FederateClient::connect(
        &address,
        0,
        FEDERATION_ID,
        false,
        RetryPolicy::connect(),
        &ThreadSleeper,
    )
    .unwrap();
    client.send_neighbor_structure(&[], &[]).unwrap();
    client.send_udp_port(0).unwrap();
    let estimate = client.respond_initial_clock_sync(3, false).unwrap().unwrap();
    assert_eq!(3, estimate.samples());
    assert!(estimate.round_trip_delay() >= 0);
    start(&mut client);
    client.resign().unwrap();
    assert!(rti_handle.join().unwrap().is_ok());
}

#[test]
fn test_zero_delay_cycle_is_fatal() {
    let (address, rti_handle) = start_rti(&["-n", "2", "-c", "off"]);
    let address_a = address.clone();
    let federate_a = thread::spawn(move || {
        let mut a = join_federation(&address_a, 0, &[(1, None)], &[1]);
        a.propose_start_time(Tag::lf_time_physical()).is_err()
    });
    let mut b = join_federation(&address, 1, &[(0, None)], &[0]);
    assert!(matches!(
        rti_handle.join().unwrap(),
        Err(RtiError::ZeroDelayCycle(_))
    ));
    assert!(b.propose_start_time(Tag::lf_time_physical()).is_err());
    assert!(federate_a.join().unwrap());
}

#[test]
fn test_peer_address_falls_back_to_rti() {
    let (address, rti_handle) = start_rti(&["-n", "2", "-c", "off"]);
    let address_a = address.clone();
    let federate_a = thread::spawn(move || {
        let mut a = join_federation(&address_a, 0, &[], &[]);
        start(&mut a);
        let route = a
            .query_peer_address(
                1,
                RetryPolicy::new(2, std::time::Duration::from_millis(10)),
                &ThreadSleeper,
            )
            .unwrap();
        a.resign().unwrap();
        route
    });
    let mut b = join_federation(&address, 1, &[], &[]);
    start(&mut b);
    assert_eq!(rti::federate::PeerRoute::ViaRti, federate_a.join().unwrap());
    b.resign().unwrap();
    assert!(rti_handle.join().unwrap().is_ok());
}

#[test]
fn test_rti_requests_configured_stop() {
    let (address, rti_handle) = start_rti(&["-n", "2", "-c", "off", "-s", "1000"]);

    let address_a = address.clone();
    let federate_a = thread::spawn(move || {
        let mut a = join_federation(&address_a, 0, &[], &[]);
        let start_time = start(&mut a);
        let requested = loop {
            if let Message::StopRequest(tag) = a.receive().unwrap() {
                break tag;
            }
        };
        assert_eq!(Tag::new(start_time + 1000, 0), requested);
        a.send_stop_request_reply(requested).unwrap();
        let granted = loop {
            if let Message::StopGranted(tag) = a.receive().unwrap() {
                break tag;
            }
        };
        a.resign().unwrap();
        granted
    });

    let mut b = join_federation(&address, 1, &[], &[]);
    let start_time = start(&mut b);
    let requested = loop {
        if let Message::StopRequest(tag) = b.receive().unwrap() {
            break tag;
        }
    };
    // A later proposal wins.
    b.send_stop_request_reply(Tag::new(requested.time() + 1, 0)).unwrap();
    let granted = loop {
        if let Message::StopGranted(tag) = b.receive().unwrap() {
            break tag;
        }
    };
    assert_eq!(Tag::new(start_time + 1001, 0), granted);
    b.resign().unwrap();

    assert_eq!(granted, federate_a.join().unwrap());
    assert!(rti_handle.join().unwrap().is_ok());
}

#[test]
fn test_neighbor_outside_federation_rejected() {
    let (address, rti_handle) = start_rti(&["-n", "1", "-c", "off"]);

    let mut bad = join_federation(&address, 0, &[(3, None)], &[]);
    assert_eq!(
        Message::Reject(ErrType::UnexpectedMessage),
        bad.receive().unwrap()
    );
    drop(bad);

    // The slot is still free and the RTI keeps serving.
    let mut client = join_federation(&address, 0, &[], &[]);
    start(&mut client);
    client.resign().unwrap();
    assert!(rti_handle.join().unwrap().is_ok());
}
