// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Lifecycle of the local VTEP: absent, created, attached to the bridge.

use crate::error::{AttachFailure, CycleError};
use interface_manager::Kernel;
use interface_manager::interface::{Interface, InterfaceKind, VtepSpec};
use net::interface::InterfaceName;
use rekon::{Create, Observe, Update};
use std::fmt::{Display, Formatter};
use tracing::{debug, info};

/// Where [`ensure`] found the VTEP.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum VtepState {
    /// The VTEP did not exist and was created (and attached).
    Created,
    /// The VTEP existed; it is attached to the bridge.
    Attached,
}

impl Display for VtepState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            VtepState::Created => write!(f, "created"),
            VtepState::Attached => write!(f, "attached"),
        }
    }
}

fn create_error(spec: &VtepSpec) -> impl FnOnce(interface_manager::KernelError) -> CycleError {
    let descriptor = Box::new(spec.clone());
    move |source| CycleError::InterfaceCreate { descriptor, source }
}

/// Make sure the VTEP described by `spec` exists and is attached to `bridge`.
///
/// Returns the VTEP as observed and the state it was found in.
///
/// # Errors
///
/// Fails if the VTEP can be neither found nor created, if another kind of interface holds its
/// name, or if it cannot be attached to the bridge.
pub async fn ensure<K: Kernel>(
    kernel: &K,
    spec: &VtepSpec,
    bridge: &InterfaceName,
) -> Result<(Interface, VtepState), CycleError> {
    let links = kernel.links();
    let (vtep, state) = match links.observe(&spec.name).await.map_err(create_error(spec))? {
        Some(vtep) => (vtep, VtepState::Attached),
        None => {
            links.create(spec).await.map_err(create_error(spec))?;
            info!("Created vtep {spec}");
            let vtep = links
                .observe(&spec.name)
                .await
                .map_err(create_error(spec))?
                .ok_or_else(|| {
                    create_error(spec)(interface_manager::KernelError::Malformed(format!(
                        "{} not found after creation",
                        spec.name
                    )))
                })?;
            (vtep, VtepState::Created)
        }
    };
    if !spec.is_compatible_with(&vtep) {
        return Err(CycleError::InterfaceConflict {
            descriptor: Box::new(spec.clone()),
            found: Box::new(vtep),
        });
    }

    let attach_error = |reason: AttachFailure| CycleError::Attach {
        bridge: bridge.clone(),
        reason,
    };
    let controller = match links.observe(bridge).await {
        Ok(Some(found)) if found.kind == InterfaceKind::Bridge => found.index,
        Ok(Some(_)) => return Err(attach_error(AttachFailure::NotABridge)),
        Ok(None) => return Err(attach_error(AttachFailure::Missing)),
        Err(e) => return Err(attach_error(e.into())),
    };
    if vtep.controller == Some(controller) {
        debug!("{} already attached to {bridge}", vtep.name);
    } else {
        kernel
            .associations()
            .update(&controller, &vtep)
            .await
            .map_err(|e| attach_error(e.into()))?;
        info!("Attached {} to {bridge}", vtep.name);
    }
    Ok((vtep, state))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // valid in tests
mod test {
    use super::*;
    use interface_manager::fake::{FakeKernel, Mutation};
    use interface_manager::interface::VtepSpecBuilder;
    use net::eth::mac::Mac;
    use net::vxlan::Vni;
    use pretty_assertions::assert_eq;
    use tracing_test::traced_test;

    fn spec() -> VtepSpec {
        VtepSpecBuilder::default()
            .name(InterfaceName::try_from("vtep1042").unwrap())
            .vni(Vni::new_checked(1042).unwrap())
            .mac(Mac([0x0e, 0, 10, 0, 0, 1]))
            .build()
            .unwrap()
    }

    fn docker0() -> InterfaceName {
        InterfaceName::try_from("docker0").unwrap()
    }

    #[tokio::test]
    #[traced_test]
    async fn creates_then_leaves_alone() {
        let kernel = FakeKernel::new();
        let bridge = kernel.insert_link("docker0", InterfaceKind::Bridge);
        let (vtep, state) = ensure(&kernel, &spec(), &docker0()).await.unwrap();
        assert_eq!(state, VtepState::Created);
        assert_eq!(vtep.name, spec().name);
        assert_eq!(
            kernel.mutations(),
            vec![
                Mutation::CreateLink(spec()),
                Mutation::Attach {
                    link: spec().name,
                    controller: bridge
                }
            ]
        );
        kernel.clear_journal();
        for _ in 0..3 {
            let (again, state) = ensure(&kernel, &spec(), &docker0()).await.unwrap();
            assert_eq!(state, VtepState::Attached);
            assert_eq!(again.index, vtep.index);
        }
        assert_eq!(kernel.mutations(), vec![]);
        assert!(logs_contain("already attached to docker0"));
    }

    #[tokio::test]
    async fn reattaches_a_detached_or_misattached_vtep() {
        let kernel = FakeKernel::new();
        kernel.insert_link(
            "vtep1042",
            InterfaceKind::Vtep {
                vni: Some(spec().vni),
                port: None,
            },
        );
        let other = kernel.insert_link("br-other", InterfaceKind::Bridge);
        let bridge = kernel.insert_link("docker0", InterfaceKind::Bridge);
        let (_, state) = ensure(&kernel, &spec(), &docker0()).await.unwrap();
        assert_eq!(state, VtepState::Attached);
        assert_eq!(kernel.link("vtep1042").unwrap().controller, Some(bridge));

        let vtep = kernel.link("vtep1042").unwrap();
        kernel.associations().update(&other, &vtep).await.unwrap();
        kernel.clear_journal();
        ensure(&kernel, &spec(), &docker0()).await.unwrap();
        assert_eq!(
            kernel.mutations(),
            vec![Mutation::Attach {
                link: spec().name,
                controller: bridge
            }]
        );
    }

    #[tokio::test]
    async fn foreign_interfaces_are_conflicts() {
        let kernel = FakeKernel::new();
        kernel.insert_link("docker0", InterfaceKind::Bridge);
        kernel.insert_link(
            "vtep1042",
            InterfaceKind::Vtep {
                vni: Some(Vni::new_checked(7).unwrap()),
                port: None,
            },
        );
        let err = ensure(&kernel, &spec(), &docker0()).await.unwrap_err();
        assert!(matches!(err, CycleError::InterfaceConflict { .. }));
        assert!(err.to_string().contains("conflicts with vtep vtep1042"));
        assert_eq!(kernel.mutations(), vec![]);
    }

    #[tokio::test]
    async fn bridge_problems_are_attach_errors() {
        let kernel = FakeKernel::new();
        let err = ensure(&kernel, &spec(), &docker0()).await.unwrap_err();
        assert!(matches!(
            err,
            CycleError::Attach {
                reason: AttachFailure::Missing,
                ..
            }
        ));
        // created anyway, the next cycle only needs to attach it
        assert!(kernel.link("vtep1042").is_some());

        let kernel = FakeKernel::new();
        kernel.insert_link("docker0", InterfaceKind::Other);
        assert!(matches!(
            ensure(&kernel, &spec(), &docker0()).await,
            Err(CycleError::Attach {
                reason: AttachFailure::NotABridge,
                ..
            })
        ));

        let kernel = FakeKernel::new();
        kernel.insert_link("docker0", InterfaceKind::Bridge);
        kernel.reject_when(|m| matches!(m, Mutation::Attach { .. }));
        assert!(matches!(
            ensure(&kernel, &spec(), &docker0()).await,
            Err(CycleError::Attach {
                reason: AttachFailure::Kernel(_),
                ..
            })
        ));
    }

    #[tokio::test]
    async fn creation_failures_carry_the_descriptor() {
        let kernel = FakeKernel::new();
        kernel.insert_link("docker0", InterfaceKind::Bridge);
        kernel.reject_when(|m| matches!(m, Mutation::CreateLink(_)));
        match ensure(&kernel, &spec(), &docker0()).await {
            Err(CycleError::InterfaceCreate { descriptor, .. }) => {
                assert_eq!(*descriptor, spec());
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
