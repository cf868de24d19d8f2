// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

#![deny(clippy::all, clippy::pedantic)]
#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use interface_manager::Netlink;
use metadata::Client;
use overlay::{Controller, ReloadHandle};
use overlay_agent::args::{CmdArgs, Parser};
use overlay_agent::server::spawn_control_server;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracectl::{LevelFilter, get_trace_ctl};
use tracing::{error, info};

/// Delay between two attempts to reach the metadata feed at startup.
const METADATA_RETRY: Duration = Duration::from_secs(1);

enum Stop {
    Signal,
    ServerExited,
}

fn init_logging(args: &CmdArgs) -> bool {
    let tctl = get_trace_ctl();
    if args.debug() {
        tctl.set_default_level(LevelFilter::DEBUG);
    }
    if let Some(levels) = args.log_level()
        && let Err(e) = tctl.setup_from_string(levels)
    {
        error!("Invalid log level configuration: {e}");
        return false;
    }
    true
}

async fn start(args: &CmdArgs) -> Option<ReloadHandle> {
    let config = match args.overlay_config() {
        Ok(config) => Arc::new(config),
        Err(e) => {
            error!("Bad configuration: {e}");
            return None;
        }
    };
    let kernel = match Netlink::connect() {
        Ok(kernel) => Arc::new(kernel),
        Err(e) => {
            error!("Failed to open a netlink connection: {e}");
            return None;
        }
    };
    let source = match Client::connect(args.metadata_address(), METADATA_RETRY).await {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!("Failed to create the metadata client: {e}");
            return None;
        }
    };
    match Controller::start(config, kernel, source).await {
        Ok((handle, report)) => {
            info!("Overlay started: {report}");
            Some(handle)
        }
        Err(e) => {
            error!("Failed to start the overlay: {e}");
            None
        }
    }
}

fn main() -> ExitCode {
    let args = CmdArgs::parse();
    if !init_logging(&args) {
        return ExitCode::FAILURE;
    }
    info!("Starting overlay agent...");

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .thread_name("overlay")
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create the runtime: {e}");
            return ExitCode::FAILURE;
        }
    };
    let Some(reload) = runtime.block_on(start(&args)) else {
        return ExitCode::FAILURE;
    };

    let (stop_tx, stop_rx) = std::sync::mpsc::channel();
    let signal_tx = stop_tx.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        let _ = signal_tx.send(Stop::Signal);
    }) {
        error!("Failed to set the signal handler: {e}");
        return ExitCode::FAILURE;
    }
    if let Err(e) = spawn_control_server(args.listen(), reload, move || {
        let _ = stop_tx.send(Stop::ServerExited);
    }) {
        error!("Failed to start the control server: {e}");
        return ExitCode::FAILURE;
    }

    match stop_rx.recv() {
        Ok(Stop::Signal) => {
            info!("Shutting down overlay agent");
            ExitCode::SUCCESS
        }
        Ok(Stop::ServerExited) | Err(_) => {
            error!("Control server stopped, exiting");
            ExitCode::FAILURE
        }
    }
}
