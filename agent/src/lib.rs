// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Command line and control endpoint of the overlay agent.

#![deny(clippy::all, clippy::pedantic)]
#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

pub mod args;
pub mod server;

use tracectl::trace_target;
trace_target!("agent", LevelFilter::INFO, &["agent"]);
