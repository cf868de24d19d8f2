// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The neighbor (ARP) and forwarding (FDB) tables of the VTEP.
//!
//! Both tables are handled as maps from an IPv4 address to a MAC address, bound to one
//! interface:
//!
//! * a neighbor entry maps an overlay address (a container) to the MAC of the peer VTEP
//!   behind which it lives,
//! * a forwarding entry maps a peer VTEP's MAC to the peer's tunnel endpoint; we key it by
//!   the tunnel endpoint.

mod fdb;
mod neighbor;

use ipnet::Ipv4Net;
use net::eth::mac::Mac;
use net::interface::InterfaceIndex;
use rtnetlink::packet_route::AddressFamily;
use rtnetlink::packet_route::neighbour::{
    NeighbourAddress, NeighbourAttribute, NeighbourFlags, NeighbourMessage, NeighbourState,
};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::net::Ipv4Addr;

/// Marker for the neighbor (ARP) table.
#[derive(Clone, Copy, Debug)]
#[non_exhaustive]
pub struct Neighbor;

/// Marker for the forwarding (FDB) table.
#[derive(Clone, Copy, Debug)]
#[non_exhaustive]
pub struct Fdb;

/// One entry of either table.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct TableEntry {
    /// The interface the entry is bound to.
    pub link: InterfaceIndex,
    /// The entry's key.
    pub ip: Ipv4Addr,
    /// The entry's MAC.
    pub mac: Mac,
}

impl Display for TableEntry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -> {} on {}", self.ip, self.mac, self.link)
    }
}

/// The neighbor entries the overlay manages: those on `link` whose address lies in one of
/// `subnets`.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct NeighborScope {
    /// The VTEP.
    pub link: InterfaceIndex,
    /// The bridge subnets of the overlay networks.
    pub subnets: Vec<Ipv4Net>,
}

impl NeighborScope {
    /// Returns true if an entry for `ip` on the scope's link belongs to the overlay.
    #[must_use]
    pub fn admits(&self, ip: &Ipv4Addr) -> bool {
        self.subnets.iter().any(|net| net.contains(ip))
    }
}

/// Pull the destination address and link layer address out of a neighbour message.
fn parse(message: &NeighbourMessage) -> (Option<Ipv4Addr>, Option<Mac>) {
    let mut ip = None;
    let mut mac = None;
    for attr in &message.attributes {
        match attr {
            NeighbourAttribute::Destination(NeighbourAddress::Inet(addr)) => ip = Some(*addr),
            NeighbourAttribute::LinkLocalAddress(lla) => mac = Mac::try_from(lla.as_slice()).ok(),
            _ => {}
        }
    }
    (ip, mac)
}

/// `true` for the permanent entries of the VTEP's own forwarding table, i.e. the ones we write.
fn is_managed_fdb(message: &NeighbourMessage) -> bool {
    message.header.flags.contains(NeighbourFlags::Own)
        && message.header.state == NeighbourState::Permanent
}

/// Build the message naming `entry` in the table of `family`.
///
/// Bridge family messages are permanent entries flagged `NTF_SELF`: they address the VTEP's
/// own forwarding table, not the one of the bridge the VTEP is a port of.
fn message_for(family: AddressFamily, entry: &TableEntry, with_mac: bool) -> NeighbourMessage {
    let mut message = NeighbourMessage::default();
    message.header.family = family;
    message.header.ifindex = entry.link.to_u32();
    if family == AddressFamily::Bridge {
        message.header.flags = NeighbourFlags::Own;
        message.header.state = NeighbourState::Permanent;
    }
    message
        .attributes
        .push(NeighbourAttribute::Destination(NeighbourAddress::Inet(
            entry.ip,
        )));
    if with_mac {
        message
            .attributes
            .push(NeighbourAttribute::LinkLocalAddress(entry.mac.to_vec()));
    }
    message
}
