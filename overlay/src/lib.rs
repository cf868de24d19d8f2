// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

#![deny(
    unsafe_code,
    missing_docs,
    clippy::all,
    clippy::pedantic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic
)]

//! The reconciliation engine of the VXLAN overlay agent.
//!
//! A cycle fetches a fresh [`metadata::Snapshot`], turns it into a [`desired::DesiredState`],
//! makes sure the local VTEP exists and is attached to the bridge, then converges the VTEP's
//! neighbor and forwarding tables. The [`Controller`] runs cycles one at a time, whoever
//! triggers them.

pub mod address;
pub mod config;
pub mod controller;
pub mod desired;
pub mod error;
pub mod tables;
pub mod vtep;

pub use config::{OverlayConfig, OverlayConfigBuilder, OverlayConfigError};
pub use controller::{Controller, ReloadHandle};
pub use error::{CycleError, CycleReport, Skipped};

use tracectl::trace_target;
trace_target!("overlay", LevelFilter::INFO, &["overlay"]);
