// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! VXLAN identifiers and constants.

mod vni;

pub use vni::*;

/// Constants describing the [VXLAN][RFC7348] encapsulation.
///
/// [RFC7348]: https://datatracker.ietf.org/doc/html/rfc7348
#[non_exhaustive]
pub struct Vxlan;

impl Vxlan {
    /// The IANA assigned UDP destination port for VXLAN.
    pub const PORT: u16 = 4789;
}
