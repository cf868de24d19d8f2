// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Settings of the overlay, fixed for the lifetime of the process.

use crate::address::MacPrefix;
use derive_builder::Builder;
use net::interface::{InterfaceName, Mtu};
use net::vxlan::{Vni, Vxlan};
use std::time::Duration;

fn default_bridge() -> InterfaceName {
    InterfaceName::try_from(OverlayConfig::DEFAULT_BRIDGE).unwrap_or_else(|_| unreachable!())
}

fn default_vni() -> Vni {
    Vni::new_checked(OverlayConfig::DEFAULT_VNI).unwrap_or_else(|_| unreachable!())
}

/// Immutable settings of the overlay; build with [`OverlayConfigBuilder`].
#[derive(Builder, Clone, Debug, PartialEq, Eq)]
#[builder(build_fn(validate = "Self::validate", error = "OverlayConfigError"))]
pub struct OverlayConfig {
    /// The bridge the VTEP is attached to.
    #[builder(default = "default_bridge()")]
    pub bridge: InterfaceName,
    /// The VNI of the overlay.
    #[builder(default = "default_vni()")]
    pub vni: Vni,
    /// Name of the VTEP, `vtep{vni}` if unset.
    #[builder(setter(strip_option), default)]
    vtep_name: Option<InterfaceName>,
    /// MTU of the VTEP.
    #[builder(default)]
    pub mtu: Mtu,
    /// UDP port of the tunnel.
    #[builder(default = "Vxlan::PORT")]
    pub port: u16,
    /// Prefix of the derived VTEP MACs.
    #[builder(default)]
    pub mac_prefix: MacPrefix,
    /// How often the metadata version is polled.
    #[builder(default = "OverlayConfig::DEFAULT_POLL_INTERVAL")]
    pub poll_interval: Duration,
}

/// Errors raised by [`OverlayConfigBuilder::build`].
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum OverlayConfigError {
    /// A required setting is missing.
    #[error("incomplete overlay configuration: {0}")]
    Incomplete(String),
    /// The tunnel port is zero.
    #[error("the tunnel port must not be zero")]
    ZeroPort,
    /// The poll interval is zero.
    #[error("the metadata poll interval must not be zero")]
    ZeroPollInterval,
}

impl From<derive_builder::UninitializedFieldError> for OverlayConfigError {
    fn from(value: derive_builder::UninitializedFieldError) -> Self {
        OverlayConfigError::Incomplete(value.to_string())
    }
}

impl OverlayConfigBuilder {
    fn validate(&self) -> Result<(), OverlayConfigError> {
        if self.port == Some(0) {
            return Err(OverlayConfigError::ZeroPort);
        }
        if self.poll_interval.is_some_and(|interval| interval.is_zero()) {
            return Err(OverlayConfigError::ZeroPollInterval);
        }
        Ok(())
    }
}

impl OverlayConfig {
    /// Bridge of the default docker network.
    pub const DEFAULT_BRIDGE: &str = "docker0";
    /// VNI used unless configured otherwise.
    pub const DEFAULT_VNI: u32 = 1042;
    /// Metadata poll interval used unless configured otherwise.
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

    /// Name of the VTEP.
    #[must_use]
    pub fn vtep_name(&self) -> InterfaceName {
        // at most 12 characters, always legal
        self.vtep_name.clone().unwrap_or_else(|| {
            InterfaceName::try_from(format!("vtep{}", self.vni)).unwrap_or_else(|_| unreachable!())
        })
    }
}

impl Default for OverlayConfig {
    fn default() -> Self {
        OverlayConfig {
            bridge: default_bridge(),
            vni: default_vni(),
            vtep_name: None,
            mtu: Mtu::DEFAULT,
            port: Vxlan::PORT,
            mac_prefix: MacPrefix::DEFAULT,
            poll_interval: Self::DEFAULT_POLL_INTERVAL,
        }
    }
}
