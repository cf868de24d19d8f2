// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Client side of the cluster metadata feed.
//!
//! The feed publishes the hosts, networks and containers of the cluster plus the identity of
//! the host asking; a version string changes whenever any of it does.

#![deny(
    missing_docs,
    clippy::all,
    clippy::pedantic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic
)]

mod client;
mod model;
mod source;
mod watch;

pub use client::Client;
pub use model::{Container, Host, Network};
pub use source::{FetchError, MetadataError, MetadataSource, Snapshot};
pub use watch::watch;

use tracectl::trace_target;
trace_target!("metadata", LevelFilter::INFO, &["metadata"]);
