// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use std::fmt::{Display, Formatter};
use std::num::NonZero;

/// A [VXLAN][RFC7348] Network Identifier.
///
/// A 24-bit value naming the overlay segment the local VTEP belongs to.
/// Zero is reserved by most implementations and is rejected here, as is anything
/// above <var>2<sup>24</sup> - 1</var>.
///
/// [RFC7348]: https://datatracker.ietf.org/doc/html/rfc7348#section-5
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Deserialize, serde::Serialize,
)]
#[serde(try_from = "u32", into = "u32")]
#[repr(transparent)]
pub struct Vni(NonZero<u32>);

/// Errors that can occur when converting a `u32` to a [`Vni`]
#[must_use]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, thiserror::Error)]
pub enum InvalidVni {
    /// Zero is not a legal Vni.
    #[error("zero is not a legal vni")]
    ReservedZero,
    /// The value does not fit in 24 bits.
    #[error("the value {0} is too large to be a vni (max is {max})", max = Vni::MAX)]
    TooLarge(u32),
}

impl Vni {
    /// The maximum legal [`Vni`] value.
    pub const MAX: u32 = 0x00_FF_FF_FF;

    /// Create a new [`Vni`] from a `u32`.
    ///
    /// # Errors
    ///
    /// Returns an [`InvalidVni`] error if the value is 0 or greater than [`Vni::MAX`].
    pub fn new_checked(raw: u32) -> Result<Vni, InvalidVni> {
        match NonZero::new(raw) {
            None => Err(InvalidVni::ReservedZero),
            Some(_) if raw > Vni::MAX => Err(InvalidVni::TooLarge(raw)),
            Some(vni) => Ok(Vni(vni)),
        }
    }

    /// Get the value of the [`Vni`] as a `u32`.
    #[must_use]
    pub fn as_u32(self) -> u32 {
        self.0.get()
    }
}

impl Display for Vni {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Vni> for u32 {
    fn from(vni: Vni) -> u32 {
        vni.as_u32()
    }
}

impl TryFrom<u32> for Vni {
    type Error = InvalidVni;

    fn try_from(raw: u32) -> Result<Vni, Self::Error> {
        Vni::new_checked(raw)
    }
}

#[cfg(any(test, feature = "bolero"))]
mod contract {
    use super::Vni;
    use bolero::{Driver, TypeGenerator};

    impl TypeGenerator for Vni {
        fn generate<D: Driver>(driver: &mut D) -> Option<Self> {
            let raw = (driver.produce::<u32>()? & Vni::MAX).max(1);
            Vni::new_checked(raw).ok()
        }
    }
}
