// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Crate to control tracing dynamically at runtime

#![deny(clippy::all, clippy::unwrap_used, clippy::expect_used, clippy::panic)]

pub mod control;
pub mod targets;

// re-exports
pub use control::{LevelError, TracingControl, get_trace_ctl, parse_level};
pub use tracing_subscriber::filter::LevelFilter;
