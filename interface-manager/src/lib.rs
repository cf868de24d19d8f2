// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The kernel capability of the overlay agent.
//!
//! Everything the reconciliation engine needs from the linux networking stack (interface
//! lookup, VXLAN device creation, bridge attachment, neighbor and forwarding table access) is
//! expressed as `rekon` trait implementations on [`Manager<R>`], and bundled behind the
//! [`Kernel`] trait so the engine can run against an in-memory kernel in tests.

#![deny(
    unsafe_code,
    missing_docs,
    clippy::all,
    clippy::pedantic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic
)]

use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::net::Ipv4Addr;
use std::sync::Arc;

pub mod interface;
pub mod table;

#[cfg(any(test, feature = "testing"))]
pub mod fake;

use interface::{Interface, InterfaceAssociation, VtepSpec};
use net::eth::mac::Mac;
use net::interface::{InterfaceIndex, InterfaceName};
use rekon::{Create, Observe, Remove, Update};
use rtnetlink::Handle;
use table::{Fdb, Neighbor, NeighborScope, TableEntry};
use tracectl::trace_target;

trace_target!("interface-manager", LevelFilter::INFO, &["kernel"]);

/// `Manager` is the primary entry point to the netlink backed kernel capability.
///
/// It is a newtype wrapper around a netlink handle, with a `PhantomData<R>` used to allow
/// for multiple implementations of the `rekon` traits (based on the type `R`) which we are
/// reconciling.
#[derive(Clone, Debug)]
pub struct Manager<R: ?Sized> {
    handle: Arc<Handle>,
    _marker: PhantomData<R>,
}

impl<R> Manager<R> {
    /// Create a new `Manager` from an [`Arc<Handle>`].
    #[must_use]
    pub fn new(handle: Arc<Handle>) -> Self {
        Manager {
            handle,
            _marker: PhantomData,
        }
    }
}

/// Convenience method for reducing syntactic noise when creating ephemeral `Manager` structs.
pub fn manager_of<T>(other: impl Into<Manager<T>>) -> Manager<T> {
    other.into()
}

impl<T, U> From<&Manager<T>> for Manager<U> {
    fn from(handle: &Manager<T>) -> Self {
        Self::new(handle.handle.clone())
    }
}

/// Errors raised by the kernel capability.
#[derive(Debug, thiserror::Error)]
pub enum KernelError {
    /// The netlink request failed.
    #[error(transparent)]
    Netlink(#[from] rtnetlink::Error),
    /// The kernel answered with something we could not make sense of.
    #[error("malformed kernel message: {0}")]
    Malformed(String),
    /// The kernel refused the request (only raised by the in-memory kernel).
    #[error("request rejected: {0}")]
    Rejected(String),
}

/// Interface lookup by name and VTEP creation.
pub trait LinkOps:
    Observe<Scope = InterfaceName, Observation = Option<Interface>, Error = KernelError>
    + Create<Requirement = VtepSpec, Error = KernelError>
    + Send
    + Sync
{
}

impl<T> LinkOps for T where
    T: Observe<Scope = InterfaceName, Observation = Option<Interface>, Error = KernelError>
        + Create<Requirement = VtepSpec, Error = KernelError>
        + Send
        + Sync
{
}

/// Attaching an interface to a controller (bridge).
pub trait AssociationOps:
    Update<Requirement = InterfaceIndex, Observation = Interface, Error = KernelError> + Send + Sync
{
}

impl<T> AssociationOps for T where
    T: Update<Requirement = InterfaceIndex, Observation = Interface, Error = KernelError>
        + Send
        + Sync
{
}

/// Read/add/remove access to a kernel table keyed by IPv4 address.
///
/// `S` is whatever restricts the read to the entries the caller manages.
pub trait TableOps<S>:
    Observe<Scope = S, Observation = BTreeMap<Ipv4Addr, Mac>, Error = KernelError>
    + Create<Requirement = TableEntry, Error = KernelError>
    + Remove<Observation = TableEntry, Error = KernelError>
    + Send
    + Sync
{
}

impl<S, T> TableOps<S> for T where
    T: Observe<Scope = S, Observation = BTreeMap<Ipv4Addr, Mac>, Error = KernelError>
        + Create<Requirement = TableEntry, Error = KernelError>
        + Remove<Observation = TableEntry, Error = KernelError>
        + Send
        + Sync
{
}

/// The full set of kernel capabilities the reconciliation engine consumes.
pub trait Kernel: Send + Sync + 'static {
    /// Interface lookup and creation.
    type Links: LinkOps;
    /// Bridge attachment.
    type Associations: AssociationOps;
    /// The neighbor (ARP) table.
    type Neighbors: TableOps<NeighborScope>;
    /// The forwarding (FDB) table.
    type Forwarding: TableOps<InterfaceIndex>;

    /// Interface lookup and creation.
    fn links(&self) -> &Self::Links;
    /// Bridge attachment.
    fn associations(&self) -> &Self::Associations;
    /// The neighbor (ARP) table.
    fn neighbors(&self) -> &Self::Neighbors;
    /// The forwarding (FDB) table.
    fn forwarding(&self) -> &Self::Forwarding;
}

/// The netlink backed [`Kernel`].
#[derive(Clone, Debug)]
pub struct Netlink {
    links: Manager<Interface>,
    associations: Manager<InterfaceAssociation>,
    neighbors: Manager<Neighbor>,
    forwarding: Manager<Fdb>,
}

impl Netlink {
    /// Wrap an existing netlink handle.
    #[must_use]
    pub fn new(handle: Arc<Handle>) -> Self {
        let links = Manager::<Interface>::new(handle);
        Netlink {
            associations: manager_of(&links),
            neighbors: manager_of(&links),
            forwarding: manager_of(&links),
            links,
        }
    }

    /// Open a netlink connection and drive it on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns the io error raised while opening the netlink socket.
    pub fn connect() -> Result<Self, std::io::Error> {
        let (connection, handle, _) = rtnetlink::new_connection()?;
        tokio::spawn(connection);
        Ok(Self::new(Arc::new(handle)))
    }
}

impl Kernel for Netlink {
    type Links = Manager<Interface>;
    type Associations = Manager<InterfaceAssociation>;
    type Neighbors = Manager<Neighbor>;
    type Forwarding = Manager<Fdb>;

    fn links(&self) -> &Self::Links {
        &self.links
    }
    fn associations(&self) -> &Self::Associations {
        &self.associations
    }
    fn neighbors(&self) -> &Self::Neighbors {
        &self.neighbors
    }
    fn forwarding(&self) -> &Self::Forwarding {
        &self.forwarding
    }
}
