// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use super::{Fdb, TableEntry, is_managed_fdb, message_for, parse};
use crate::{KernelError, Manager};
use futures::StreamExt;
use net::eth::mac::Mac;
use net::interface::InterfaceIndex;
use rekon::{Create, Observe, Remove};
use rtnetlink::packet_core::{
    NLM_F_ACK, NLM_F_CREATE, NLM_F_DUMP, NLM_F_REPLACE, NLM_F_REQUEST, NetlinkMessage,
    NetlinkPayload,
};
use rtnetlink::packet_route::neighbour::NeighbourMessage;
use rtnetlink::packet_route::{AddressFamily, RouteNetlinkMessage};
use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use tracing::{debug, trace};

impl Manager<Fdb> {
    /// Send a bridge-family neighbour request and collect the neighbour messages it yields.
    async fn request(
        &self,
        message: RouteNetlinkMessage,
        flags: u16,
    ) -> Result<Vec<NeighbourMessage>, KernelError> {
        let mut request = NetlinkMessage::from(message);
        request.header.flags = flags;
        let mut handle = (*self.handle).clone();
        let mut response = handle.request(request)?;
        let mut out = Vec::new();
        while let Some(message) = response.next().await {
            match message.payload {
                NetlinkPayload::InnerMessage(RouteNetlinkMessage::NewNeighbour(n)) => out.push(n),
                NetlinkPayload::Error(e) if e.raw_code() != 0 => {
                    return Err(rtnetlink::Error::NetlinkError(e).into());
                }
                _ => {}
            }
        }
        Ok(out)
    }
}

impl Observe for Manager<Fdb> {
    type Scope = InterfaceIndex;
    type Observation = BTreeMap<Ipv4Addr, Mac>;
    type Error = KernelError;

    async fn observe(&self, link: &InterfaceIndex) -> Result<BTreeMap<Ipv4Addr, Mac>, KernelError> {
        let mut query = NeighbourMessage::default();
        query.header.family = AddressFamily::Bridge;
        query.header.ifindex = link.to_u32();
        let dump = self
            .request(
                RouteNetlinkMessage::GetNeighbour(query),
                NLM_F_REQUEST | NLM_F_DUMP,
            )
            .await?;
        let entries: BTreeMap<_, _> = dump
            .iter()
            .filter(|message| message.header.ifindex == link.to_u32())
            // the bridge's view of the port and learned entries are not ours
            .filter(|message| is_managed_fdb(message))
            .filter_map(|message| match parse(message) {
                // all-zero flood entries are not peers
                (Some(ip), Some(mac)) if !mac.is_zero() => Some((ip, mac)),
                _ => None,
            })
            .collect();
        trace!("Observed {} forwarding entries on {link}", entries.len());
        Ok(entries)
    }
}

impl Create for Manager<Fdb> {
    type Requirement = TableEntry;
    type Error = KernelError;

    async fn create(&self, entry: &TableEntry) -> Result<(), KernelError> {
        debug!("Adding forwarding entry {entry}");
        self.request(
            RouteNetlinkMessage::NewNeighbour(message_for(AddressFamily::Bridge, entry, true)),
            NLM_F_REQUEST | NLM_F_ACK | NLM_F_CREATE | NLM_F_REPLACE,
        )
        .await?;
        Ok(())
    }
}

impl Remove for Manager<Fdb> {
    type Observation = TableEntry;
    type Error = KernelError;

    async fn remove(&self, entry: &TableEntry) -> Result<(), KernelError> {
        debug!("Removing forwarding entry {entry}");
        self.handle
            .neighbours()
            .del(message_for(AddressFamily::Bridge, entry, true))
            .execute()
            .await?;
        Ok(())
    }
}
