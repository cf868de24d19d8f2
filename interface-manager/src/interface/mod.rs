// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Observe linux network interfaces and create the local VTEP.

mod association;
mod vtep;

pub use association::*;
pub use vtep::*;

use crate::{KernelError, Manager};
use futures::TryStreamExt;
use net::eth::mac::Mac;
use net::interface::{InterfaceIndex, InterfaceName, Mtu};
use net::vxlan::Vni;
use rekon::{Create, Observe};
use rtnetlink::LinkVxlan;
use rtnetlink::packet_route::link::{
    InfoData, InfoKind, InfoVxlan, LinkAttribute, LinkInfo, LinkMessage,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// What kind of device an observed interface is, as far as the overlay cares.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum InterfaceKind {
    /// A vxlan device.
    Vtep {
        /// The device's vni, if the kernel reported it.
        vni: Option<Vni>,
        /// The device's UDP destination port, if the kernel reported it.
        port: Option<u16>,
    },
    /// A linux bridge.
    Bridge,
    /// Anything else.
    Other,
}

/// An observed network interface.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Interface {
    /// The kernel's index for the interface.
    pub index: InterfaceIndex,
    /// The interface's name.
    pub name: InterfaceName,
    /// The interface's MAC address.
    pub mac: Option<Mac>,
    /// The interface's MTU.
    pub mtu: Option<Mtu>,
    /// The interface's controller (e.g. the bridge it is attached to).
    pub controller: Option<InterfaceIndex>,
    /// What kind of device this is.
    pub kind: InterfaceKind,
}

fn kind_of(infos: &[LinkInfo]) -> InterfaceKind {
    let mut kind = InterfaceKind::Other;
    for info in infos {
        match info {
            LinkInfo::Kind(InfoKind::Bridge) => kind = InterfaceKind::Bridge,
            LinkInfo::Kind(InfoKind::Vxlan) if kind == InterfaceKind::Other => {
                kind = InterfaceKind::Vtep {
                    vni: None,
                    port: None,
                };
            }
            LinkInfo::Data(InfoData::Vxlan(data)) => {
                let mut vni = None;
                let mut port = None;
                for attr in data {
                    match attr {
                        InfoVxlan::Id(id) => vni = Vni::new_checked(*id).ok(),
                        InfoVxlan::Port(p) => port = Some(*p),
                        _ => {}
                    }
                }
                kind = InterfaceKind::Vtep { vni, port };
            }
            _ => {}
        }
    }
    kind
}

impl TryFrom<LinkMessage> for Interface {
    type Error = KernelError;

    fn try_from(message: LinkMessage) -> Result<Self, Self::Error> {
        let index = InterfaceIndex::try_new(message.header.index)
            .map_err(|e| KernelError::Malformed(e.to_string()))?;
        let mut name = None;
        let mut mac = None;
        let mut mtu = None;
        let mut controller = None;
        let mut kind = InterfaceKind::Other;
        for attr in message.attributes {
            match attr {
                LinkAttribute::IfName(n) => {
                    name = Some(
                        InterfaceName::try_from(n)
                            .map_err(|e| KernelError::Malformed(e.to_string()))?,
                    );
                }
                LinkAttribute::Address(bytes) => mac = Mac::try_from(bytes.as_slice()).ok(),
                LinkAttribute::Mtu(m) => mtu = Mtu::try_from(m).ok(),
                LinkAttribute::Controller(c) => controller = InterfaceIndex::try_new(c).ok(),
                LinkAttribute::LinkInfo(infos) => kind = kind_of(&infos),
                _ => {}
            }
        }
        let name = name.ok_or_else(|| {
            KernelError::Malformed(format!("interface {index} reported without a name"))
        })?;
        Ok(Interface {
            index,
            name,
            mac,
            mtu,
            controller,
            kind,
        })
    }
}

/// `true` if netlink answered "no such device".
fn is_no_such_device(err: &rtnetlink::Error) -> bool {
    matches!(err, rtnetlink::Error::NetlinkError(msg) if msg.raw_code() == -libc::ENODEV)
}

impl Observe for Manager<Interface> {
    type Scope = InterfaceName;
    type Observation = Option<Interface>;
    type Error = KernelError;

    async fn observe(&self, name: &InterfaceName) -> Result<Option<Interface>, KernelError> {
        let mut links = self
            .handle
            .link()
            .get()
            .match_name(name.to_string())
            .execute();
        match links.try_next().await {
            Ok(Some(message)) => Interface::try_from(message).map(Some),
            Ok(None) => Ok(None),
            Err(e) if is_no_such_device(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

impl Create for Manager<Interface> {
    type Requirement = VtepSpec;
    type Error = KernelError;

    async fn create(&self, requirement: &VtepSpec) -> Result<(), KernelError> {
        debug!("Creating vtep {requirement}");
        let mut message = LinkVxlan::new(requirement.name.as_ref(), requirement.vni.as_u32())
            .set_info_data(InfoData::Vxlan(vec![
                InfoVxlan::Id(requirement.vni.as_u32()),
                InfoVxlan::Port(requirement.port),
            ]))
            .up()
            .build();
        message
            .attributes
            .push(LinkAttribute::Address(requirement.mac.to_vec()));
        message
            .attributes
            .push(LinkAttribute::Mtu(requirement.mtu.to_u32()));
        self.handle.link().add(message).execute().await?;
        Ok(())
    }
}
