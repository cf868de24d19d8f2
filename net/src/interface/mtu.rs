// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::num::NonZero;

/// The MTU of a network interface.
#[derive(Copy, Clone, Debug, Hash, Ord, PartialOrd, Eq, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
#[repr(transparent)]
pub struct Mtu(NonZero<u32>);

impl Mtu {
    const MIN_U32: u32 = 68; // RFC 791 minimum for IPv4
    const MAX_U32: u32 = 65_535;
    const DEFAULT_U32: u32 = 1500;

    /// The typical MTU for an ethernet interface
    pub const DEFAULT: Mtu = Mtu(NonZero::new(Self::DEFAULT_U32).unwrap());

    /// Return the `Mtu` represented as a u32
    #[must_use]
    pub fn to_u32(&self) -> u32 {
        self.0.get()
    }
}

impl Default for Mtu {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl TryFrom<u32> for Mtu {
    type Error = MtuError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        if !(Self::MIN_U32..=Self::MAX_U32).contains(&value) {
            return Err(MtuError::InvalidMtu(value));
        }
        NonZero::new(value).map(Mtu).ok_or(MtuError::InvalidMtu(value))
    }
}

impl From<Mtu> for u32 {
    fn from(value: Mtu) -> Self {
        value.0.get()
    }
}

impl Display for Mtu {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.get())
    }
}

/// Errors constructing an [`Mtu`]
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, thiserror::Error)]
pub enum MtuError {
    /// The MTU is not within the valid range.
    #[error("mtu {0} is not within the valid range of {min} to {max}", min = Mtu::MIN_U32, max = Mtu::MAX_U32)]
    InvalidMtu(u32),
}

#[cfg(any(test, feature = "bolero"))]
mod contract {
    use super::Mtu;
    use bolero::{Driver, TypeGenerator};

    impl TypeGenerator for Mtu {
        fn generate<D: Driver>(driver: &mut D) -> Option<Self> {
            let mtu = driver.gen_u32(
                std::ops::Bound::Included(&Mtu::MIN_U32),
                std::ops::Bound::Included(&Mtu::MAX_U32),
            )?;
            Mtu::try_from(mtu).ok()
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // valid in tests
mod test {
    use super::*;

    #[test]
    fn mtu_is_constrained() {
        bolero::check!().with_type().for_each(|x: &Mtu| {
            assert!((Mtu::MIN_U32..=Mtu::MAX_U32).contains(&x.to_u32()));
        });
    }

    #[test]
    fn mtu_oob_rejects() {
        assert!(Mtu::try_from(0).is_err());
        assert!(Mtu::try_from(Mtu::MIN_U32 - 1).is_err());
        assert!(Mtu::try_from(Mtu::MAX_U32 + 1).is_err());
        assert_eq!(Mtu::try_from(1500), Ok(Mtu::DEFAULT));
    }
}
