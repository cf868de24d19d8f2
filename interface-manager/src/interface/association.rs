// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use crate::interface::Interface;
use crate::{KernelError, Manager};
use net::interface::InterfaceIndex;
use rekon::Update;
use rtnetlink::LinkUnspec;
use tracing::debug;

/// Marker for the association of one network interface with a controlling one (e.g. a VTEP
/// with its bridge).
///
/// Associations are observed by way of [`Interface::controller`].
#[derive(Clone, Copy, Debug)]
#[non_exhaustive]
pub struct InterfaceAssociation;

impl Update for Manager<InterfaceAssociation> {
    type Requirement = InterfaceIndex;
    type Observation = Interface;
    type Error = KernelError;

    /// Attach the observed interface to `controller` and bring it up.
    async fn update(
        &self,
        controller: &InterfaceIndex,
        observation: &Interface,
    ) -> Result<(), KernelError> {
        debug!(
            "Attaching {} ({}) to controller {controller}",
            observation.name, observation.index
        );
        self.handle
            .link()
            .set(
                LinkUnspec::new_with_index(observation.index.to_u32())
                    .controller(controller.to_u32())
                    .up()
                    .build(),
            )
            .execute()
            .await?;
        Ok(())
    }
}
