// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! An in-memory [`Kernel`] for tests.
//!
//! [`FakeKernel`] keeps interfaces and both tables in memory and journals every mutation (plus
//! free-form notes the test can interleave), so tests can assert on what a reconciliation
//! actually did and in which order.
//! Every mutation yields to the scheduler first, leaving room for concurrent callers to
//! interleave if nothing serializes them.

#![allow(clippy::missing_panics_doc)]

use crate::interface::{Interface, InterfaceAssociation, InterfaceKind, VtepSpec};
use crate::table::{Fdb, Neighbor, NeighborScope, TableEntry};
use crate::{Kernel, KernelError};
use net::eth::mac::Mac;
use net::interface::{InterfaceIndex, InterfaceName};
use parking_lot::Mutex;
use rekon::{Create, Observe, Remove, Update};
use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::net::Ipv4Addr;
use std::sync::Arc;

/// A mutation applied to the in-memory kernel.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Mutation {
    /// A vxlan device was created.
    CreateLink(VtepSpec),
    /// An interface was attached to a controller.
    Attach {
        /// The attached interface.
        link: InterfaceName,
        /// Its new controller.
        controller: InterfaceIndex,
    },
    /// A neighbor entry was added.
    AddNeighbor(TableEntry),
    /// A neighbor entry was removed.
    RemoveNeighbor(TableEntry),
    /// A forwarding entry was added.
    AddFdb(TableEntry),
    /// A forwarding entry was removed.
    RemoveFdb(TableEntry),
}

/// One line of the [`FakeKernel`] journal.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Event {
    /// The kernel was mutated.
    Mutation(Mutation),
    /// A note added by the test through [`FakeKernel::note`].
    Note(String),
}

type Rejector = Box<dyn Fn(&Mutation) -> bool + Send>;

#[derive(Default)]
struct State {
    links: BTreeMap<InterfaceName, Interface>,
    last_index: u32,
    neighbors: BTreeMap<(InterfaceIndex, Ipv4Addr), Mac>,
    fdb: BTreeMap<(InterfaceIndex, Ipv4Addr), Mac>,
    journal: Vec<Event>,
    reject: Option<Rejector>,
}

impl State {
    fn next_index(&mut self) -> InterfaceIndex {
        self.last_index += 1;
        InterfaceIndex::try_new(self.last_index).unwrap_or_else(|_| unreachable!())
    }

    fn apply(&mut self, mutation: Mutation) -> Result<(), KernelError> {
        if let Some(reject) = &self.reject
            && reject(&mutation)
        {
            return Err(KernelError::Rejected(format!("{mutation:?}")));
        }
        match &mutation {
            Mutation::CreateLink(spec) => {
                if self.links.contains_key(&spec.name) {
                    return Err(KernelError::Rejected(format!("{} exists", spec.name)));
                }
                let index = self.next_index();
                self.links.insert(
                    spec.name.clone(),
                    Interface {
                        index,
                        name: spec.name.clone(),
                        mac: Some(spec.mac),
                        mtu: Some(spec.mtu),
                        controller: None,
                        kind: InterfaceKind::Vtep {
                            vni: Some(spec.vni),
                            port: Some(spec.port),
                        },
                    },
                );
            }
            Mutation::Attach { link, controller } => {
                if !self.links.values().any(|l| l.index == *controller) {
                    return Err(KernelError::Rejected(format!("no controller {controller}")));
                }
                let Some(link) = self.links.get_mut(link) else {
                    return Err(KernelError::Rejected(format!("no interface {link}")));
                };
                link.controller = Some(*controller);
            }
            Mutation::AddNeighbor(e) => {
                self.neighbors.insert((e.link, e.ip), e.mac);
            }
            Mutation::RemoveNeighbor(e) => {
                self.neighbors
                    .remove(&(e.link, e.ip))
                    .ok_or_else(|| KernelError::Rejected(format!("no neighbor {e}")))?;
            }
            Mutation::AddFdb(e) => {
                self.fdb.insert((e.link, e.ip), e.mac);
            }
            Mutation::RemoveFdb(e) => {
                self.fdb
                    .remove(&(e.link, e.ip))
                    .ok_or_else(|| KernelError::Rejected(format!("no fdb entry {e}")))?;
            }
        }
        self.journal.push(Event::Mutation(mutation));
        Ok(())
    }
}

/// One capability of the in-memory kernel; `R` selects which, as with [`crate::Manager`].
pub struct Fake<R> {
    state: Arc<Mutex<State>>,
    _marker: PhantomData<R>,
}

impl<R> Fake<R> {
    fn new(state: &Arc<Mutex<State>>) -> Self {
        Fake {
            state: state.clone(),
            _marker: PhantomData,
        }
    }

    async fn apply(&self, mutation: Mutation) -> Result<(), KernelError> {
        tokio::task::yield_now().await;
        self.state.lock().apply(mutation)
    }
}

/// The in-memory [`Kernel`].
pub struct FakeKernel {
    state: Arc<Mutex<State>>,
    links: Fake<Interface>,
    associations: Fake<InterfaceAssociation>,
    neighbors: Fake<Neighbor>,
    forwarding: Fake<Fdb>,
}

impl Default for FakeKernel {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeKernel {
    /// An empty kernel.
    #[must_use]
    pub fn new() -> Self {
        let state = Arc::new(Mutex::new(State::default()));
        FakeKernel {
            links: Fake::new(&state),
            associations: Fake::new(&state),
            neighbors: Fake::new(&state),
            forwarding: Fake::new(&state),
            state,
        }
    }

    /// Add an interface without journaling it.
    pub fn insert_link(&self, name: &str, kind: InterfaceKind) -> InterfaceIndex {
        let mut state = self.state.lock();
        let index = state.next_index();
        let name = InterfaceName::try_from(name).unwrap_or_else(|e| unreachable!("{e}"));
        state.links.insert(
            name.clone(),
            Interface {
                index,
                name,
                mac: None,
                mtu: None,
                controller: None,
                kind,
            },
        );
        index
    }

    /// Add a neighbor entry without journaling it.
    pub fn seed_neighbor(&self, entry: TableEntry) {
        self.state
            .lock()
            .neighbors
            .insert((entry.link, entry.ip), entry.mac);
    }

    /// Add a forwarding entry without journaling it.
    pub fn seed_fdb(&self, entry: TableEntry) {
        self.state.lock().fdb.insert((entry.link, entry.ip), entry.mac);
    }

    /// Look up an interface.
    #[must_use]
    pub fn link(&self, name: &str) -> Option<Interface> {
        let name = InterfaceName::try_from(name).ok()?;
        self.state.lock().links.get(&name).cloned()
    }

    /// Every neighbor entry bound to `link`, regardless of subnet.
    #[must_use]
    pub fn neighbor_table(&self, link: InterfaceIndex) -> BTreeMap<Ipv4Addr, Mac> {
        table_of(&self.state.lock().neighbors, link)
    }

    /// Every forwarding entry bound to `link`.
    #[must_use]
    pub fn fdb_table(&self, link: InterfaceIndex) -> BTreeMap<Ipv4Addr, Mac> {
        table_of(&self.state.lock().fdb, link)
    }

    /// Make every mutation matching `predicate` fail.
    pub fn reject_when(&self, predicate: impl Fn(&Mutation) -> bool + Send + 'static) {
        self.state.lock().reject = Some(Box::new(predicate));
    }

    /// Stop rejecting mutations.
    pub fn accept_all(&self) {
        self.state.lock().reject = None;
    }

    /// Append a note to the journal.
    pub fn note(&self, note: impl Into<String>) {
        self.state.lock().journal.push(Event::Note(note.into()));
    }

    /// The journal so far.
    #[must_use]
    pub fn journal(&self) -> Vec<Event> {
        self.state.lock().journal.clone()
    }

    /// The mutations journaled so far.
    #[must_use]
    pub fn mutations(&self) -> Vec<Mutation> {
        self.journal()
            .into_iter()
            .filter_map(|event| match event {
                Event::Mutation(m) => Some(m),
                Event::Note(_) => None,
            })
            .collect()
    }

    /// Forget the journal.
    pub fn clear_journal(&self) {
        self.state.lock().journal.clear();
    }
}

fn table_of(
    table: &BTreeMap<(InterfaceIndex, Ipv4Addr), Mac>,
    link: InterfaceIndex,
) -> BTreeMap<Ipv4Addr, Mac> {
    table
        .iter()
        .filter(|((l, _), _)| *l == link)
        .map(|((_, ip), mac)| (*ip, *mac))
        .collect()
}

impl Kernel for FakeKernel {
    type Links = Fake<Interface>;
    type Associations = Fake<InterfaceAssociation>;
    type Neighbors = Fake<Neighbor>;
    type Forwarding = Fake<Fdb>;

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

impl Observe for Fake<Interface> {
    type Scope = InterfaceName;
    type Observation = Option<Interface>;
    type Error = KernelError;

    async fn observe(&self, name: &InterfaceName) -> Result<Option<Interface>, KernelError> {
        Ok(self.state.lock().links.get(name).cloned())
    }
}

impl Create for Fake<Interface> {
    type Requirement = VtepSpec;
    type Error = KernelError;

    async fn create(&self, requirement: &VtepSpec) -> Result<(), KernelError> {
        self.apply(Mutation::CreateLink(requirement.clone())).await
    }
}

impl Update for Fake<InterfaceAssociation> {
    type Requirement = InterfaceIndex;
    type Observation = Interface;
    type Error = KernelError;

    async fn update(
        &self,
        controller: &InterfaceIndex,
        observation: &Interface,
    ) -> Result<(), KernelError> {
        self.apply(Mutation::Attach {
            link: observation.name.clone(),
            controller: *controller,
        })
        .await
    }
}

impl Observe for Fake<Neighbor> {
    type Scope = NeighborScope;
    type Observation = BTreeMap<Ipv4Addr, Mac>;
    type Error = KernelError;

    async fn observe(&self, scope: &NeighborScope) -> Result<BTreeMap<Ipv4Addr, Mac>, KernelError> {
        let mut table = table_of(&self.state.lock().neighbors, scope.link);
        table.retain(|ip, _| scope.admits(ip));
        Ok(table)
    }
}

impl Create for Fake<Neighbor> {
    type Requirement = TableEntry;
    type Error = KernelError;

    async fn create(&self, entry: &TableEntry) -> Result<(), KernelError> {
        self.apply(Mutation::AddNeighbor(*entry)).await
    }
}

impl Remove for Fake<Neighbor> {
    type Observation = TableEntry;
    type Error = KernelError;

    async fn remove(&self, entry: &TableEntry) -> Result<(), KernelError> {
        self.apply(Mutation::RemoveNeighbor(*entry)).await
    }
}

impl Observe for Fake<Fdb> {
    type Scope = InterfaceIndex;
    type Observation = BTreeMap<Ipv4Addr, Mac>;
    type Error = KernelError;

    async fn observe(&self, link: &InterfaceIndex) -> Result<BTreeMap<Ipv4Addr, Mac>, KernelError> {
        Ok(table_of(&self.state.lock().fdb, *link))
    }
}

impl Create for Fake<Fdb> {
    type Requirement = TableEntry;
    type Error = KernelError;

    async fn create(&self, entry: &TableEntry) -> Result<(), KernelError> {
        self.apply(Mutation::AddFdb(*entry)).await
    }
}

impl Remove for Fake<Fdb> {
    type Observation = TableEntry;
    type Error = KernelError;

    async fn remove(&self, entry: &TableEntry) -> Result<(), KernelError> {
        self.apply(Mutation::RemoveFdb(*entry)).await
    }
}
