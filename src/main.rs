/**
 * @file
 * @author Hokeun Kim (hokeun@asu.edu)
 * @author Chanhee Lee (chanheel@asu.edu)
 * @copyright (c) 2023, Arizona State University
 * License in [BSD 2-clause](..)
 * @brief Entry point of the RTI executable.
 */
use std::env;
use std::process;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_thread_names(true)
        .init();

    let mut rti = rti::initialize_rti();

    let args: Vec<String> = env::args().collect();

    rti::process_args(&mut rti, &args).unwrap_or_else(|err| {
        error!("Problem parsing arguments: {err}");
        process::exit(1);
    });

    info!(
        "Starting RTI for {} federates in federation ID {}.",
        rti.base().number_of_scheduling_nodes(),
        rti.federation_id()
    );

    rti::initialize_federates(&mut rti);

    let mut server = rti::start_rti_server(&mut rti).unwrap_or_else(|err| {
        error!("Failed to start the RTI server: {err}");
        process::exit(1);
    });
    if let Err(err) = server.wait_for_federates(rti) {
        error!("RTI exited with an error: {err}");
        process::exit(1);
    }
    info!("RTI is exiting.");
}
