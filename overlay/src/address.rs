// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Derivation of link-layer addresses from tunnel endpoint addresses.
//!
//! Every VTEP of the overlay gets the MAC made of the first two octets of a shared prefix
//! followed by the four octets of its IPv4 tunnel endpoint. Any host can thus compute the MAC
//! of any peer without asking it, and distinct addresses never share a MAC.

use net::eth::mac::{Mac, MacFromStringError};
use std::fmt::{Display, Formatter};
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

/// A locally administered unicast MAC whose first two octets prefix every derived address.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct MacPrefix(Mac);

/// Errors raised when validating a [`MacPrefix`].
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum MacPrefixError {
    /// Not a mac address at all.
    #[error(transparent)]
    Malformed(#[from] MacFromStringError),
    /// Derived addresses would collide with vendor assigned ones.
    #[error("mac prefix {0} is not locally administered")]
    NotLocal(Mac),
    /// Derived addresses would be multicast.
    #[error("mac prefix {0} is not unicast")]
    NotUnicast(Mac),
}

/// Errors raised when deriving an address.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum AddressError {
    /// The input is not an IPv4 address.
    #[error("invalid IPv4 address {0:?}")]
    InvalidAddress(String),
}

impl MacPrefix {
    /// `0e:00:00:00:00:00`
    pub const DEFAULT: MacPrefix = MacPrefix(Mac([0x0e, 0, 0, 0, 0, 0]));

    /// Validate `mac` as a prefix. Only its first two octets matter.
    ///
    /// # Errors
    ///
    /// Fails if `mac` is not a locally administered unicast address.
    pub fn new(mac: Mac) -> Result<Self, MacPrefixError> {
        if !mac.is_local() {
            return Err(MacPrefixError::NotLocal(mac));
        }
        if !mac.is_unicast() {
            return Err(MacPrefixError::NotUnicast(mac));
        }
        Ok(MacPrefix(mac))
    }

    /// The MAC of the VTEP whose tunnel endpoint is `ip`.
    #[must_use]
    pub fn mac_for(&self, ip: Ipv4Addr) -> Mac {
        let [a, b, ..] = self.0.0;
        let [c, d, e, f] = ip.octets();
        Mac([a, b, c, d, e, f])
    }

    /// Parse `ip` and derive its MAC.
    ///
    /// IPv4-mapped IPv6 notation (`::ffff:10.0.0.1`) is accepted.
    ///
    /// # Errors
    ///
    /// Fails with [`AddressError::InvalidAddress`] if `ip` is not an IPv4 address.
    pub fn derive(&self, ip: &str) -> Result<Mac, AddressError> {
        parse_ipv4(ip).map(|ip| self.mac_for(ip))
    }
}

impl Default for MacPrefix {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl Display for MacPrefix {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for MacPrefix {
    type Err = MacPrefixError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(Mac::try_from(s)?)
    }
}

/// Parse an IPv4 address the way the metadata feed writes them.
///
/// # Errors
///
/// Fails with [`AddressError::InvalidAddress`] if `ip` is not an IPv4 address.
pub fn parse_ipv4(input: &str) -> Result<Ipv4Addr, AddressError> {
    match input.parse::<IpAddr>() {
        Ok(IpAddr::V4(ip)) => Ok(ip),
        Ok(IpAddr::V6(ip)) => ip
            .to_ipv4_mapped()
            .ok_or_else(|| AddressError::InvalidAddress(input.to_string())),
        Err(_) => Err(AddressError::InvalidAddress(input.to_string())),
    }
}
