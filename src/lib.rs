/**
 * @file
 * @author Chanhee Lee (chanheel@asu.edu)
 * @author Hokeun Kim (hokeun@asu.edu)
 * @copyright (c) 2023, Arizona State University
 * License in [BSD 2-clause](..)
 * @brief Runtime infrastructure (RTI) for federated Lingua Franca programs,
 * and the federate-side client of its protocol.
 */
pub mod authentication;
pub mod clock_sync;
pub mod constants;
pub mod error;
pub mod federate;
pub mod federate_info;
pub mod in_transit_message_queue;
pub mod message;
pub mod net_common;
pub mod net_util;
pub mod rti_common;
pub mod rti_remote;
pub mod server;
pub mod socket_common;
pub mod stop;
pub mod tag;
pub mod trace;

use std::time::Duration;

use tracing::info;

use crate::constants::*;
use crate::error::RtiError;
use crate::federate_info::FederateInfo;
use crate::rti_remote::RTIRemote;
use crate::trace::Trace;

pub use crate::federate::FederateClient;
pub use crate::message::Message;
pub use crate::server::Server;
pub use crate::tag::Tag;

#[derive(PartialEq, PartialOrd, Clone, Debug)]
pub enum ClockSyncStat {
    ClockSyncOff,
    ClockSyncInit,
    ClockSyncOn,
}

impl ClockSyncStat {
    pub fn to_int(&self) -> i32 {
        match self {
            ClockSyncStat::ClockSyncOff => 0,
            ClockSyncStat::ClockSyncInit => 1,
            ClockSyncStat::ClockSyncOn => 2,
        }
    }
}

fn invalid_argument(argc: usize, argv: &[String], reason: &str) -> RtiError {
    println!("{}", reason);
    usage(argc, argv);
    RtiError::InvalidArgument(String::from(reason))
}

pub fn process_args(rti: &mut RTIRemote, argv: &[String]) -> Result<(), RtiError> {
    let mut idx = 1;
    let argc = argv.len();
    while idx < argc {
        let arg = argv[idx].as_str();
        if arg == "-i" || arg == "--id" {
            if argc < idx + 2 {
                return Err(invalid_argument(argc, argv, "--id needs a string argument."));
            }
            idx += 1;
            info!("RTI: Federation ID: {}", argv[idx]);
            rti.set_federation_id(argv[idx].clone());
        } else if arg == "-n" || arg == "--number_of_federates" {
            if argc < idx + 2 {
                return Err(invalid_argument(
                    argc,
                    argv,
                    "--number_of_federates needs an integer argument.",
                ));
            }
            idx += 1;
            let num_federates = match argv[idx].parse::<i32>() {
                Ok(parsed_value) if parsed_value > 0 && parsed_value < u16::MAX.into() => {
                    parsed_value
                }
                _ => {
                    return Err(invalid_argument(
                        argc,
                        argv,
                        "--number_of_federates needs a valid positive integer argument.",
                    ))
                }
            };
            rti.base_mut().set_number_of_scheduling_nodes(num_federates);
            info!(
                "RTI: Number of federates: {}",
                rti.base().number_of_scheduling_nodes()
            );
        } else if arg == "-p" || arg == "--port" {
            if argc < idx + 2 {
                return Err(invalid_argument(
                    argc,
                    argv,
                    "--port needs a short unsigned integer argument ( > 0 and < 65535).",
                ));
            }
            idx += 1;
            let rti_port = match argv[idx].parse::<u16>() {
                Ok(parsed_value) if parsed_value > 0 && parsed_value < u16::MAX => parsed_value,
                _ => {
                    return Err(invalid_argument(
                        argc,
                        argv,
                        "--port needs a short unsigned integer argument ( > 0 and < 65535).",
                    ))
                }
            };
            rti.set_port(rti_port);
        } else if arg == "-c" || arg == "--clock_sync" {
            if argc < idx + 2 {
                return Err(invalid_argument(argc, argv, "--clock-sync needs off|init|on."));
            }
            idx += 1;
            idx += process_clock_sync_args(rti, &argv[idx..]).map_err(|e| {
                usage(argc, argv);
                e
            })?;
        } else if arg == "-s" || arg == "--stop_after" {
            if argc < idx + 2 {
                return Err(invalid_argument(
                    argc,
                    argv,
                    "--stop_after needs a positive number of nanoseconds.",
                ));
            }
            idx += 1;
            match argv[idx].parse::<i64>() {
                Ok(stop_after) if stop_after > 0 => {
                    info!("RTI: Stopping the federation {} ns after the start time.", stop_after);
                    rti.set_stop_after(Some(stop_after));
                }
                _ => {
                    return Err(invalid_argument(
                        argc,
                        argv,
                        "--stop_after needs a positive number of nanoseconds.",
                    ))
                }
            }
        } else if arg == "--idle_timeout" {
            if argc < idx + 2 {
                return Err(invalid_argument(
                    argc,
                    argv,
                    "--idle_timeout needs a positive number of milliseconds.",
                ));
            }
            idx += 1;
            match argv[idx].parse::<u64>() {
                Ok(millis) if millis > 0 => {
                    info!("RTI: Federates silent for {} ms are treated as lost.", millis);
                    rti.set_idle_timeout(Some(Duration::from_millis(millis)));
                }
                _ => {
                    return Err(invalid_argument(
                        argc,
                        argv,
                        "--idle_timeout needs a positive number of milliseconds.",
                    ))
                }
            }
        } else if arg == "-a" || arg == "--auth" {
            rti.set_authentication_enabled(true);
        } else if arg == "-t" || arg == "--tracing" {
            rti.base_mut().set_tracing_enabled(true);
        } else if arg == " " {
            // Tolerate spaces
        } else {
            return Err(invalid_argument(
                argc,
                argv,
                &format!("Unrecognized command-line argument: {}", arg),
            ));
        }
        idx += 1;
    }
    if rti.base().number_of_scheduling_nodes() == 0 {
        return Err(invalid_argument(
            argc,
            argv,
            "--number_of_federates needs a valid positive integer argument.",
        ));
    }
    Ok(())
}

/**
 * Process command-line arguments related to clock synchronization, starting
 * at the mode (off|init|on). Returns how many arguments after the mode were
 * consumed. Parsing stops at the first argument that is not a clock sync
 * parameter.
 */
fn process_clock_sync_args(rti: &mut RTIRemote, args: &[String]) -> Result<usize, RtiError> {
    match args[0].as_str() {
        "off" => {
            rti.set_clock_sync_global_status(ClockSyncStat::ClockSyncOff);
            info!("RTI: Clock sync: off");
        }
        "init" | "initial" => {
            rti.set_clock_sync_global_status(ClockSyncStat::ClockSyncInit);
            info!("RTI: Clock sync: init");
        }
        "on" => {
            rti.set_clock_sync_global_status(ClockSyncStat::ClockSyncOn);
            info!("RTI: Clock sync: on");
        }
        other => {
            return Err(RtiError::InvalidArgument(format!(
                "invalid clock sync mode {}",
                other
            )))
        }
    }
    let mut consumed = 0;
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "period" => {
                let period = parse_clock_sync_value::<u64>(args, i, "period")?;
                if period == 0 {
                    return Err(RtiError::InvalidArgument(String::from(
                        "clock sync period must be positive",
                    )));
                }
                rti.set_clock_sync_period_ns(period);
                info!("RTI: Clock sync period: {}", period);
                i += 2;
            }
            "exchanges-per-interval" => {
                let exchanges =
                    parse_clock_sync_value::<u32>(args, i, "exchanges-per-interval")?;
                if exchanges == 0 {
                    return Err(RtiError::InvalidArgument(String::from(
                        "clock sync exchanges-per-interval must be positive",
                    )));
                }
                rti.set_clock_sync_exchanges_per_interval(exchanges);
                info!("RTI: Clock sync exchanges per interval: {}", exchanges);
                i += 2;
            }
            "coded-probes" => {
                rti.set_clock_sync_coded_probes(true);
                i += 1;
            }
            _ => break,
        }
        consumed = i - 1;
    }
    Ok(consumed)
}

fn parse_clock_sync_value<T: std::str::FromStr>(
    args: &[String],
    i: usize,
    name: &str,
) -> Result<T, RtiError> {
    args.get(i + 1)
        .and_then(|value| value.parse::<T>().ok())
        .ok_or_else(|| RtiError::InvalidArgument(format!("clock sync {} needs a number", name)))
}

fn usage(argc: usize, argv: &[String]) {
    println!("\nCommand-line arguments: ");
    println!("  -i, --id <n>");
    println!("   The ID of the federation that this RTI will control.");
    println!("  -n, --number_of_federates <n>");
    println!("   The number of federates in the federation that this RTI will control.");
    println!("  -p, --port <n>");
    println!("   The port number to use for the RTI. Must be larger than 0 and smaller than {}. Default is {}.", u16::MAX, STARTING_PORT);
    println!("  -c, --clock_sync [off|init|on] [period <n>] [exchanges-per-interval <n>] [coded-probes]");
    println!("   The status of clock synchronization for this federate.");
    println!("       - off: Clock synchronization is off.");
    println!("       - init (default): Clock synchronization is done only during startup.");
    println!(
        "       - on: Clock synchronization is done both at startup and during the execution."
    );
    println!("   Relevant parameters that can be set: ");
    println!("       - period <n>(in nanoseconds): Controls how often a clock synchronization attempt is made");
    println!("          (period in nanoseconds, default is 10 msec). Only applies to 'on'.");
    println!("       - exchanges-per-interval <n>: Controls the number of messages that are exchanged for each");
    println!("          clock sync attempt (default is 10). Applies to 'init' and 'on'.");
    println!("       - coded-probes: Follow each reply with a probe to discard samples distorted by jitter.");
    println!("  -s, --stop_after <n>");
    println!("   Ask the federation to stop n nanoseconds of logical time after the start time.");
    println!("  --idle_timeout <n>");
    println!("   Treat a federate that sends nothing for n milliseconds as lost. By default the RTI waits forever.");
    println!("  -a, --auth Turn on HMAC authentication options.");
    println!("  -t, --tracing Turn on tracing.");

    println!("Command given:");
    for arg in argv.iter().take(argc) {
        println!("{} ", arg);
    }
}

pub fn initialize_federates(rti: &mut RTIRemote) {
    if rti.base().tracing_enabled() {
        let mut trace = Trace::trace_new(RTI_TRACE_FILE_NAME);
        match trace.start_trace() {
            Ok(()) => rti.base_mut().set_trace(trace),
            Err(e) => {
                tracing::warn!("RTI: Tracing disabled: {}", e);
                rti.base_mut().set_tracing_enabled(false);
            }
        }
    }
    let number_of_federates = rti.base().number_of_scheduling_nodes();
    for i in 0..number_of_federates as u16 {
        let mut federate = FederateInfo::new();
        initialize_federate(&mut federate, i);
        rti.base_mut().scheduling_nodes_mut().push(federate);
    }
}

fn initialize_federate(fed: &mut FederateInfo, id: u16) {
    fed.node_mut().initialize_scheduling_node(id);
}

pub fn start_rti_server(rti: &mut RTIRemote) -> Result<Server, RtiError> {
    Server::create_server(rti.user_specified_port())
}

/**
 * Initialize the _RTI instance.
 */
pub fn initialize_rti() -> RTIRemote {
    RTIRemote::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    use rand::Rng;

    const RUST_RTI_PROGRAM_PATH: &str = "target/debug/rti";

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once(RUST_RTI_PROGRAM_PATH)
            .chain(list.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn test_process_args_option_n_positive() {
        let mut rng = rand::thread_rng();
        let number_of_federates: i32 = rng.gen_range(1..i32::from(u16::MAX));
        let mut rti = initialize_rti();
        process_args(&mut rti, &args(&["-n", &number_of_federates.to_string()])).unwrap();
        assert!(rti.base().number_of_scheduling_nodes() == number_of_federates);
    }

    #[test]
    fn test_process_args_missing_number_of_federates_negative() {
        let mut rti = initialize_rti();
        assert!(process_args(&mut rti, &args(&["-i", "fed"])).is_err());
        assert!(process_args(&mut rti, &args(&["-n", "0"])).is_err());
        assert!(process_args(&mut rti, &args(&["-n"])).is_err());
        assert!(process_args(&mut rti, &args(&["-n", "two"])).is_err());
    }

    #[test]
    fn test_process_args_option_p_negative() {
        let mut rti = initialize_rti();
        assert!(process_args(&mut rti, &args(&["-n", "2", "-p", "0"])).is_err());
        assert!(process_args(&mut rti, &args(&["-n", "2", "-p", "65535"])).is_err());
    }

    #[test]
    fn test_process_args_all_options() {
        let mut rti = initialize_rti();
        process_args(
            &mut rti,
            &args(&[
                "-i",
                "my_federation",
                "-n",
                "3",
                "-p",
                "15050",
                "-c",
                "on",
                "period",
                "2000000",
                "exchanges-per-interval",
                "4",
                "coded-probes",
                "-a",
            ]),
        )
        .unwrap();
        assert!(rti.federation_id() == "my_federation");
        assert!(rti.base().number_of_scheduling_nodes() == 3);
        assert!(rti.user_specified_port() == 15050);
        assert!(rti.clock_sync_global_status() == ClockSyncStat::ClockSyncOn);
        assert!(rti.clock_sync_period_ns() == 2_000_000);
        assert!(rti.clock_sync_exchanges_per_interval() == 4);
        assert!(rti.clock_sync_coded_probes());
        assert!(rti.authentication_enabled());
    }

    #[test]
    fn test_process_args_stop_after_and_idle_timeout() {
        let mut rng = rand::thread_rng();
        let stop_after: i64 = rng.gen_range(1..i64::MAX);
        let mut rti = initialize_rti();
        process_args(
            &mut rti,
            &args(&[
                "-n",
                "2",
                "-s",
                &stop_after.to_string(),
                "--idle_timeout",
                "1500",
            ]),
        )
        .unwrap();
        assert!(rti.stop_after() == Some(stop_after));
        assert!(rti.idle_timeout() == Some(Duration::from_millis(1500)));

        let mut rti = initialize_rti();
        assert!(process_args(&mut rti, &args(&["-n", "2", "-s", "0"])).is_err());
        assert!(process_args(&mut rti, &args(&["-n", "2", "--stop_after"])).is_err());
        assert!(process_args(&mut rti, &args(&["-n", "2", "--idle_timeout", "-5"])).is_err());
    }

    #[test]
    fn test_process_clock_sync_args_stops_at_next_option() {
        let mut rti = initialize_rti();
        process_args(&mut rti, &args(&["-c", "off", "-n", "2"])).unwrap();
        assert!(rti.clock_sync_global_status() == ClockSyncStat::ClockSyncOff);
        assert!(rti.base().number_of_scheduling_nodes() == 2);
    }

    #[test]
    fn test_process_clock_sync_args_negative() {
        let mut rti = initialize_rti();
        assert!(process_args(&mut rti, &args(&["-n", "2", "-c", "sometimes"])).is_err());
        assert!(process_args(&mut rti, &args(&["-n", "2", "-c", "on", "period"])).is_err());
        assert!(process_args(&mut rti, &args(&["-n", "2", "-c", "on", "period", "0"])).is_err());
    }

    #[test]
    fn test_initialize_federates() {
        let mut rti = initialize_rti();
        process_args(&mut rti, &args(&["-n", "4"])).unwrap();
        initialize_federates(&mut rti);
        assert!(rti.base().scheduling_nodes().len() == 4);
        for (i, fed) in rti.base().scheduling_nodes().iter().enumerate() {
            assert!(fed.node().id() == i as u16);
            assert!(!fed.is_in_use());
        }
    }
}
