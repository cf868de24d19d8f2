// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Convergence of the VTEP's neighbor and forwarding tables.

use crate::error::{CycleError, Table, TableOp};
use interface_manager::table::{NeighborScope, TableEntry};
use interface_manager::{Kernel, TableOps};
use net::eth::mac::Mac;
use net::interface::InterfaceIndex;
use rekon::{Create, Observe, Op, Plan, Remove};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::net::Ipv4Addr;
use tracing::debug;

/// Number of entries a reconciliation added and removed.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct TableChanges {
    /// Entries added.
    pub added: usize,
    /// Entries removed.
    pub removed: usize,
}

impl Display for TableChanges {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "+{} -{}", self.added, self.removed)
    }
}

async fn reconcile<S, T>(
    ops: &T,
    table: Table,
    scope: &S,
    link: InterfaceIndex,
    desired: &BTreeMap<Ipv4Addr, Mac>,
) -> Result<TableChanges, CycleError>
where
    S: Sync,
    T: TableOps<S>,
{
    let observed = ops
        .observe(scope)
        .await
        .map_err(|source| CycleError::TableRead { table, source })?;
    let plan = Plan::between(&observed, desired);
    if plan.is_empty() {
        debug!("The {table} table is up to date");
        return Ok(TableChanges::default());
    }
    let mut changes = TableChanges::default();
    for op in plan.into_ops() {
        match op {
            Op::Remove(ip, mac) => {
                let entry = TableEntry { link, ip, mac };
                ops.remove(&entry)
                    .await
                    .map_err(|source| CycleError::TableApply {
                        table,
                        op: TableOp::Remove,
                        entry,
                        source,
                    })?;
                changes.removed += 1;
            }
            Op::Add(ip, mac) => {
                let entry = TableEntry { link, ip, mac };
                ops.create(&entry)
                    .await
                    .map_err(|source| CycleError::TableApply {
                        table,
                        op: TableOp::Add,
                        entry,
                        source,
                    })?;
                changes.added += 1;
            }
        }
    }
    debug!("Updated the {table} table: {changes}");
    Ok(changes)
}

/// Converge the neighbor entries of `scope` to `desired`.
///
/// Entries on other links or outside of the scope's subnets are neither read nor touched.
///
/// # Errors
///
/// Fails on the first kernel error; the remaining changes are not attempted.
pub async fn reconcile_neighbors<K: Kernel>(
    kernel: &K,
    scope: &NeighborScope,
    desired: &BTreeMap<Ipv4Addr, Mac>,
) -> Result<TableChanges, CycleError> {
    reconcile(kernel.neighbors(), Table::Neighbor, scope, scope.link, desired).await
}

/// Converge the forwarding entries of `link` to `desired`.
///
/// # Errors
///
/// Fails on the first kernel error; the remaining changes are not attempted.
pub async fn reconcile_forwarding<K: Kernel>(
    kernel: &K,
    link: InterfaceIndex,
    desired: &BTreeMap<Ipv4Addr, Mac>,
) -> Result<TableChanges, CycleError> {
    reconcile(kernel.forwarding(), Table::Forwarding, &link, link, desired).await
}
