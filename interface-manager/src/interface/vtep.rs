// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use crate::interface::{Interface, InterfaceKind};
use derive_builder::Builder;
use net::eth::mac::Mac;
use net::interface::{InterfaceName, Mtu};
use net::vxlan::{Vni, Vxlan};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// The planned VTEP (vxlan device) of the local host.
#[derive(Builder, Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[builder(build_fn(error = "VtepSpecError"))]
pub struct VtepSpec {
    /// Name of the device.
    pub name: InterfaceName,
    /// The vni to be used for this device.
    pub vni: Vni,
    /// UDP destination port of the encapsulated traffic.
    #[builder(default = "Vxlan::PORT")]
    pub port: u16,
    /// MAC address of the device.
    pub mac: Mac,
    /// MTU of the device.
    #[builder(default)]
    pub mtu: Mtu,
}

/// Error raised when a [`VtepSpecBuilder`] is missing a field.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("incomplete vtep description: {0}")]
pub struct VtepSpecError(String);

impl From<derive_builder::UninitializedFieldError> for VtepSpecError {
    fn from(value: derive_builder::UninitializedFieldError) -> Self {
        VtepSpecError(value.to_string())
    }
}

impl Display for VtepSpec {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} (vni {}, port {}, mac {}, mtu {})",
            self.name, self.vni, self.port, self.mac, self.mtu
        )
    }
}

impl VtepSpec {
    /// Returns true if the observed interface is a vxlan device this spec could have created.
    ///
    /// Only the properties linux won't let us change in place (device kind and vni) are
    /// compared; the caller decides what to do with a mismatch.
    #[must_use]
    pub fn is_compatible_with(&self, observed: &Interface) -> bool {
        match &observed.kind {
            InterfaceKind::Vtep { vni, .. } => vni.is_none_or(|vni| vni == self.vni),
            InterfaceKind::Bridge | InterfaceKind::Other => false,
        }
    }
}

#[cfg(any(test, feature = "bolero"))]
mod contract {
    use super::VtepSpec;
    use bolero::{Driver, TypeGenerator};
    use net::interface::InterfaceName;

    impl TypeGenerator for VtepSpec {
        fn generate<D: Driver>(driver: &mut D) -> Option<Self> {
            let vni = driver.produce()?;
            Some(Self {
                name: InterfaceName::try_from(format!("vtep{vni}")).ok()?,
                vni,
                port: driver.produce()?,
                mac: driver.produce()?,
                mtu: driver.produce()?,
            })
        }
    }
}
