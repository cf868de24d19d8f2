// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Outcomes of a reconciliation cycle.
//!
//! Problems with a single metadata item are [`Skipped`]: the item is left out and the cycle
//! goes on. Anything else aborts the cycle with a [`CycleError`] naming the stage that failed.

use crate::address::AddressError;
use crate::tables::TableChanges;
use crate::vtep::VtepState;
use interface_manager::KernelError;
use interface_manager::interface::{Interface, VtepSpec};
use interface_manager::table::TableEntry;
use metadata::FetchError;
use net::interface::InterfaceName;
use std::fmt::{Display, Formatter};

/// A metadata item left out of the desired state.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum Skipped {
    /// An overlay network whose bridge subnet is missing or malformed.
    #[error("network {network}: bad bridge subnet {subnet:?}: {reason}")]
    ConfigError {
        /// Identity of the network.
        network: String,
        /// The subnet as published, if any.
        subnet: Option<String>,
        /// What is wrong with it.
        reason: String,
    },
    /// A host or container whose address could not be used.
    #[error("{owner}: {source}")]
    AddressDerivation {
        /// What the address belongs to, e.g. `host 1a2b`.
        owner: String,
        /// Why it could not be used.
        source: AddressError,
    },
}

/// The kernel table a [`CycleError::TableApply`] happened in.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Table {
    /// The neighbor (ARP) table.
    Neighbor,
    /// The forwarding (FDB) table.
    Forwarding,
}

impl Display for Table {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Table::Neighbor => write!(f, "neighbor"),
            Table::Forwarding => write!(f, "forwarding"),
        }
    }
}

/// A single change to a kernel table.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TableOp {
    /// An entry was being added.
    Add,
    /// An entry was being removed.
    Remove,
}

impl Display for TableOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            TableOp::Add => write!(f, "add"),
            TableOp::Remove => write!(f, "remove"),
        }
    }
}

/// Why the VTEP could not be attached to the bridge.
#[derive(Debug, thiserror::Error)]
pub enum AttachFailure {
    /// There is no interface with the bridge's name.
    #[error("no such interface")]
    Missing,
    /// The interface with the bridge's name is not a bridge.
    #[error("not a bridge")]
    NotABridge,
    /// The kernel failed the lookup or the attachment.
    #[error(transparent)]
    Kernel(#[from] KernelError),
}

/// Errors aborting a reconciliation cycle.
#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    /// The metadata snapshot could not be fetched.
    #[error("metadata fetch failed: {0}")]
    MetadataFetch(#[from] FetchError),
    /// The local VTEP's MAC cannot be derived from the self host's address.
    #[error("cannot derive the vtep address: {0}")]
    VtepAddress(AddressError),
    /// The VTEP could not be looked up or created.
    #[error("failed to create vtep {descriptor}: {source}")]
    InterfaceCreate {
        /// The VTEP we tried to create.
        descriptor: Box<VtepSpec>,
        /// What the kernel said.
        source: KernelError,
    },
    /// An incompatible interface holds the VTEP's name.
    #[error("interface {} ({:?}) conflicts with vtep {descriptor}", .found.name, .found.kind)]
    InterfaceConflict {
        /// The VTEP we need.
        descriptor: Box<VtepSpec>,
        /// The interface in the way.
        found: Box<Interface>,
    },
    /// The VTEP could not be attached to the bridge.
    #[error("failed to attach vtep to bridge {bridge}: {reason}")]
    Attach {
        /// The configured bridge.
        bridge: InterfaceName,
        /// What went wrong.
        reason: AttachFailure,
    },
    /// A kernel table could not be read.
    #[error("failed to read the {table} table: {source}")]
    TableRead {
        /// The table.
        table: Table,
        /// What the kernel said.
        source: KernelError,
    },
    /// A kernel table change failed; the remaining changes of the cycle were not attempted.
    #[error("failed to {op} {table} entry {entry}: {source}")]
    TableApply {
        /// The table.
        table: Table,
        /// The change attempted.
        op: TableOp,
        /// The entry concerned.
        entry: TableEntry,
        /// What the kernel said.
        source: KernelError,
    },
    /// The reconciliation worker is gone.
    #[error("internal error: {0}")]
    Internal(&'static str),
}

/// What a successful cycle did.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CycleReport {
    /// State the VTEP ended the cycle in.
    pub vtep: VtepState,
    /// Changes made to the neighbor table.
    pub neighbors: TableChanges,
    /// Changes made to the forwarding table.
    pub forwarding: TableChanges,
    /// Metadata items left out.
    pub skipped: Vec<Skipped>,
}

impl Display for CycleReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "vtep {}, neighbors {}, forwarding {}, {} skipped",
            self.vtep,
            self.neighbors,
            self.forwarding,
            self.skipped.len()
        )
    }
}
