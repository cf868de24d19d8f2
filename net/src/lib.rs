// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

#![forbid(unsafe_code)] // Validation logic should always be strictly safe
#![deny(missing_docs, clippy::all, clippy::pedantic)]
#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

//! Strictly validated value types for the overlay agent.
//!
//! Nothing in here talks to the kernel; these are the vocabulary types shared by the
//! kernel capability, the metadata model and the reconciliation engine.

pub mod eth;
pub mod interface;
pub mod vxlan;
