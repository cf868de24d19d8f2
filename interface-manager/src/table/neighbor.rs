// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use super::{Neighbor, NeighborScope, TableEntry, message_for, parse};
use crate::{KernelError, Manager};
use futures::TryStreamExt;
use net::eth::mac::Mac;
use rekon::{Create, Observe, Remove};
use rtnetlink::IpVersion;
use rtnetlink::packet_route::AddressFamily;
use rtnetlink::packet_route::neighbour::NeighbourState;
use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr};
use tracing::{debug, trace};

impl Observe for Manager<Neighbor> {
    type Scope = NeighborScope;
    type Observation = BTreeMap<Ipv4Addr, Mac>;
    type Error = KernelError;

    async fn observe(&self, scope: &NeighborScope) -> Result<BTreeMap<Ipv4Addr, Mac>, KernelError> {
        let mut entries = BTreeMap::new();
        let mut dump = self
            .handle
            .neighbours()
            .get()
            .set_family(IpVersion::V4)
            .execute();
        while let Some(message) = dump.try_next().await? {
            if message.header.ifindex != scope.link.to_u32() {
                continue;
            }
            // incomplete / failed entries carry no link layer address
            if let (Some(ip), Some(mac)) = parse(&message)
                && scope.admits(&ip)
            {
                entries.insert(ip, mac);
            }
        }
        trace!("Observed {} neighbor entries on {}", entries.len(), scope.link);
        Ok(entries)
    }
}

impl Create for Manager<Neighbor> {
    type Requirement = TableEntry;
    type Error = KernelError;

    async fn create(&self, entry: &TableEntry) -> Result<(), KernelError> {
        debug!("Adding neighbor {entry}");
        self.handle
            .neighbours()
            .add(entry.link.to_u32(), IpAddr::V4(entry.ip))
            .link_local_address(&entry.mac.0)
            .state(NeighbourState::Permanent)
            .replace()
            .execute()
            .await?;
        Ok(())
    }
}

impl Remove for Manager<Neighbor> {
    type Observation = TableEntry;
    type Error = KernelError;

    async fn remove(&self, entry: &TableEntry) -> Result<(), KernelError> {
        debug!("Removing neighbor {entry}");
        self.handle
            .neighbours()
            .del(message_for(AddressFamily::Inet, entry, false))
            .execute()
            .await?;
        Ok(())
    }
}
