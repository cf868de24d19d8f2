// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

#![deny(clippy::all, clippy::pedantic)]
#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

//! Small vocabulary for reconciling an external system (here, the kernel) towards a
//! required state.
//!
//! The capability traits ([`Observe`], [`Create`], [`Update`], [`Remove`]) are implemented by
//! whatever talks to the external system.
//! [`Plan`] computes the operations which take an observed keyed table to a required one.

use std::collections::BTreeMap;

/// `Observe` is implemented by whatever is able to measure the state of an external system.
pub trait Observe {
    /// What part of the system to look at (an interface name, an interface plus a subnet
    /// filter, ...).
    type Scope;

    /// The returned data type of the observation.
    type Observation;

    /// Error raised if the system can't be observed.
    type Error;

    /// Observe the state of the system.
    ///
    /// # Contract
    ///
    /// Implementations must not mutate the state of the external system.
    fn observe(
        &self,
        scope: &Self::Scope,
    ) -> impl Future<Output = Result<Self::Observation, Self::Error>> + Send;
}

/// `Create` is implemented by an object able to create an external resource in service of a
/// `Requirement`.
pub trait Create {
    /// The data required to create the resource.
    type Requirement;

    /// Error raised if the resource can't be created.
    type Error;

    /// Create a resource in service of a requirement.
    fn create(
        &self,
        requirement: &Self::Requirement,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

/// `Update` drives an extant resource closer to the state described by a requirement.
pub trait Update {
    /// The state the resource should end up in.
    type Requirement;

    /// The resource as it was observed.
    type Observation;

    /// Error raised if the resource can't be updated.
    type Error;

    /// Attempt to drive an observed resource closer to the requirement.
    ///
    /// There is no assurance that the resource meets the requirement afterwards; callers
    /// observe again to find out.
    fn update(
        &self,
        requirement: &Self::Requirement,
        observation: &Self::Observation,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

/// `Remove` is implemented by an object able to remove an externally observed resource.
pub trait Remove {
    /// The resource as it was observed.
    type Observation;

    /// Error raised if the resource can't be removed.
    type Error;

    /// Remove an observed external resource.
    fn remove(
        &self,
        observation: &Self::Observation,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

/// A single step of a [`Plan`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op<K, V> {
    /// Drop the observed entry `K -> V`.
    Remove(K, V),
    /// Install the required entry `K -> V`.
    Add(K, V),
}

/// The operations which take an observed keyed table to a required one.
///
/// An entry survives only if both key and value match.
/// A key whose value changed is removed with its old value and added with its new one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan<K, V> {
    removals: Vec<(K, V)>,
    additions: Vec<(K, V)>,
}

impl<K, V> Plan<K, V>
where
    K: Ord + Clone,
    V: Eq + Clone,
{
    /// Diff `observed` against `required`.
    #[must_use]
    pub fn between(observed: &BTreeMap<K, V>, required: &BTreeMap<K, V>) -> Self {
        let removals = observed
            .iter()
            .filter(|(key, value)| required.get(key) != Some(value))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        let additions = required
            .iter()
            .filter(|(key, value)| observed.get(key) != Some(value))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        Plan {
            removals,
            additions,
        }
    }
}

impl<K, V> Plan<K, V> {
    /// True if the observed table already matches.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.removals.is_empty() && self.additions.is_empty()
    }

    /// Entries to remove.
    #[must_use]
    pub fn removals(&self) -> &[(K, V)] {
        &self.removals
    }

    /// Entries to add.
    #[must_use]
    pub fn additions(&self) -> &[(K, V)] {
        &self.additions
    }

    /// Consume the plan as an ordered list of operations: every removal before any addition.
    pub fn into_ops(self) -> impl Iterator<Item = Op<K, V>> {
        self.removals
            .into_iter()
            .map(|(k, v)| Op::Remove(k, v))
            .chain(self.additions.into_iter().map(|(k, v)| Op::Add(k, v)))
    }
}
