// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The reconciliation worker and its handle.
//!
//! Cycles run on a single worker task fed by a bounded queue of reload requests. Whoever
//! triggers a reload (the metadata watcher, the control endpoint) waits for its turn and
//! gets the outcome of its own cycle back.

use crate::config::OverlayConfig;
use crate::desired;
use crate::error::{CycleError, CycleReport};
use crate::tables::{reconcile_forwarding, reconcile_neighbors};
use crate::vtep;
use interface_manager::Kernel;
use interface_manager::interface::VtepSpec;
use interface_manager::table::NeighborScope;
use metadata::{FetchError, MetadataSource, Snapshot};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};

/// Pending reloads beyond this many make triggers wait to enqueue.
const QUEUE_DEPTH: usize = 64;

type ReloadReplyTx = oneshot::Sender<Result<CycleReport, CycleError>>;

struct ReloadRequest {
    reply: ReloadReplyTx,
}

/// Requests reconciliation cycles from a running [`Controller`].
#[derive(Clone, Debug)]
pub struct ReloadHandle(mpsc::Sender<ReloadRequest>);

impl ReloadHandle {
    /// Run one reconciliation cycle, after any already queued, and return its outcome.
    ///
    /// # Errors
    ///
    /// Returns the error that aborted the cycle, or [`CycleError::Internal`] if the worker is
    /// gone.
    pub async fn reload(&self) -> Result<CycleReport, CycleError> {
        debug!("Requesting reload...");
        let (reply, reply_rx) = oneshot::channel();
        self.0
            .send(ReloadRequest { reply })
            .await
            .map_err(|_| CycleError::Internal("Failed to send reload request"))?;
        reply_rx
            .await
            .map_err(|_| CycleError::Internal("Failed to receive reload reply"))?
    }
}

/// Owns everything a reconciliation cycle needs.
pub struct Controller<K, S> {
    config: Arc<OverlayConfig>,
    kernel: Arc<K>,
    source: Arc<S>,
    vtep: VtepSpec,
}

impl<K: Kernel, S: MetadataSource> Controller<K, S> {
    /// Derive the local VTEP, run a first cycle, then start the reconciliation worker and the
    /// metadata watcher.
    ///
    /// Returns the handle to request further cycles with, and the report of the first one.
    ///
    /// # Errors
    ///
    /// Fails if the VTEP cannot be described or if the first cycle fails; nothing is started
    /// then.
    pub async fn start(
        config: Arc<OverlayConfig>,
        kernel: Arc<K>,
        source: Arc<S>,
    ) -> Result<(ReloadHandle, CycleReport), CycleError> {
        let self_host = source.self_host().await.map_err(|source| FetchError {
            resource: "self host",
            source,
        })?;
        let mac = config
            .mac_prefix
            .derive(&self_host.agent_ip)
            .map_err(CycleError::VtepAddress)?;
        let vtep = VtepSpec {
            name: config.vtep_name(),
            vni: config.vni,
            port: config.port,
            mac,
            mtu: config.mtu,
        };
        info!("Local vtep is {vtep}");
        let controller = Controller {
            config,
            kernel,
            source,
            vtep,
        };
        let report = controller.run_cycle().await?;

        let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
        let handle = ReloadHandle(tx);
        let source = controller.source.clone();
        let interval = controller.config.poll_interval;
        tokio::spawn(controller.serve(rx));
        tokio::spawn(watch(source, interval, handle.clone()));
        Ok((handle, report))
    }

    async fn cycle(&self) -> Result<CycleReport, CycleError> {
        let snapshot = Snapshot::fetch(self.source.as_ref()).await?;
        let desired = desired::build(&snapshot, &self.config.mac_prefix);
        let kernel = self.kernel.as_ref();
        let (vtep, state) = vtep::ensure(kernel, &self.vtep, &self.config.bridge).await?;
        let scope = NeighborScope {
            link: vtep.index,
            subnets: desired.bridge_subnets,
        };
        let neighbors = reconcile_neighbors(kernel, &scope, &desired.neighbors).await?;
        let forwarding = reconcile_forwarding(kernel, vtep.index, &desired.forwarding).await?;
        Ok(CycleReport {
            vtep: state,
            neighbors,
            forwarding,
            skipped: desired.skipped,
        })
    }

    async fn run_cycle(&self) -> Result<CycleReport, CycleError> {
        let result = self.cycle().await;
        match &result {
            Ok(report) => info!("Reconciled overlay: {report}"),
            Err(e) => error!("Reconciliation failed: {e}"),
        }
        result
    }

    async fn serve(self, mut requests: mpsc::Receiver<ReloadRequest>) {
        while let Some(request) = requests.recv().await {
            let result = self.run_cycle().await;
            if request.reply.send(result).is_err() {
                debug!("Reload requester went away");
            }
        }
        debug!("Reconciliation worker exiting");
    }
}

async fn watch<S: MetadataSource>(source: Arc<S>, interval: Duration, handle: ReloadHandle) {
    metadata::watch(source.as_ref(), interval, |version| {
        let handle = handle.clone();
        async move {
            debug!("Reloading for metadata version {version}");
            // failures are logged by the worker; the next change retries
            let _ = handle.reload().await;
        }
    })
    .await;
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // valid in tests
mod test {
    use super::*;
    use crate::address::MacPrefix;
    use crate::vtep::VtepState;
    use interface_manager::fake::{Event, FakeKernel, Mutation};
    use interface_manager::interface::InterfaceKind;
    use interface_manager::table::TableEntry;
    use metadata::{Container, Host, MetadataError, Network};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::net::Ipv4Addr;
    use std::sync::atomic::{AtomicU8, Ordering};
    use tracing_test::traced_test;

    fn host(uuid: &str, agent_ip: &str) -> Host {
        Host {
            uuid: uuid.to_string(),
            name: uuid.to_string(),
            agent_ip: agent_ip.to_string(),
        }
    }

    fn unavailable() -> MetadataError {
        MetadataError::Unavailable("test source".to_string())
    }

    /// A cluster whose peer moves to `10.0.0.{n}` on the n-th fetch.
    ///
    /// Every fetch is noted in the kernel's journal. The version is never available, so the
    /// watcher never triggers cycles of its own.
    struct Moving {
        kernel: Arc<FakeKernel>,
        fetches: AtomicU8,
    }

    impl MetadataSource for Moving {
        async fn hosts(&self) -> Result<Vec<Host>, MetadataError> {
            let n = self.fetches.fetch_add(1, Ordering::SeqCst) + 1;
            self.kernel.note(format!("fetch {n}"));
            Ok(vec![host("self", "10.0.1.1"), host("peer", &format!("10.0.0.{n}"))])
        }
        async fn networks(&self) -> Result<Vec<Network>, MetadataError> {
            Ok(vec![])
        }
        async fn containers(&self) -> Result<Vec<Container>, MetadataError> {
            Ok(vec![])
        }
        async fn self_host(&self) -> Result<Host, MetadataError> {
            Ok(host("self", "10.0.1.1"))
        }
        async fn version(&self) -> Result<String, MetadataError> {
            Err(unavailable())
        }
    }

    /// A fixed cluster: self, one peer with one container on an overlay network.
    struct Fixed {
        self_ip: &'static str,
        hosts_fail: bool,
    }

    impl MetadataSource for Fixed {
        async fn hosts(&self) -> Result<Vec<Host>, MetadataError> {
            if self.hosts_fail {
                return Err(unavailable());
            }
            Ok(vec![host("self", self.self_ip), host("peer", "10.0.0.2")])
        }
        async fn networks(&self) -> Result<Vec<Network>, MetadataError> {
            Ok(vec![Network {
                uuid: "managed".to_string(),
                name: "managed".to_string(),
                metadata: json!({"cniConfig": {"10-bridge.conf": {"bridgeSubnet": "10.42.0.0/16"}}})
                    .as_object()
                    .unwrap()
                    .clone(),
            }])
        }
        async fn containers(&self) -> Result<Vec<Container>, MetadataError> {
            Ok(vec![Container {
                uuid: "c1".to_string(),
                name: "web".to_string(),
                primary_ip: "10.42.0.5".to_string(),
                network_uuid: "managed".to_string(),
                host_uuid: "peer".to_string(),
                state: "running".to_string(),
                network_from_container_uuid: String::new(),
            }])
        }
        async fn self_host(&self) -> Result<Host, MetadataError> {
            Ok(host("self", self.self_ip))
        }
        async fn version(&self) -> Result<String, MetadataError> {
            Err(unavailable())
        }
    }

    /// A cluster with one peer at `10.0.0.{peer}`, published as metadata version `v{peer}`.
    struct Published {
        peer: AtomicU8,
    }

    impl MetadataSource for Published {
        async fn hosts(&self) -> Result<Vec<Host>, MetadataError> {
            let peer = self.peer.load(Ordering::SeqCst);
            Ok(vec![host("self", "10.0.1.1"), host("peer", &format!("10.0.0.{peer}"))])
        }
        async fn networks(&self) -> Result<Vec<Network>, MetadataError> {
            Ok(vec![])
        }
        async fn containers(&self) -> Result<Vec<Container>, MetadataError> {
            Ok(vec![])
        }
        async fn self_host(&self) -> Result<Host, MetadataError> {
            Ok(host("self", "10.0.1.1"))
        }
        async fn version(&self) -> Result<String, MetadataError> {
            Ok(format!("v{}", self.peer.load(Ordering::SeqCst)))
        }
    }

    fn kernel_with_bridge() -> Arc<FakeKernel> {
        let kernel = Arc::new(FakeKernel::new());
        kernel.insert_link("docker0", InterfaceKind::Bridge);
        kernel
    }

    #[tokio::test]
    #[traced_test]
    async fn start_converges_the_host() {
        let kernel = kernel_with_bridge();
        let source = Arc::new(Fixed {
            self_ip: "10.0.0.1",
            hosts_fail: false,
        });
        let config = Arc::new(OverlayConfig::default());
        let (handle, report) = Controller::start(config, kernel.clone(), source)
            .await
            .unwrap();
        assert_eq!(report.vtep, VtepState::Created);
        assert_eq!(report.neighbors.added, 1);
        assert_eq!(report.forwarding.added, 1);

        let vtep = kernel.link("vtep1042").unwrap();
        assert_eq!(vtep.mac, Some(MacPrefix::DEFAULT.derive("10.0.0.1").unwrap()));
        let peer_mac = MacPrefix::DEFAULT.derive("10.0.0.2").unwrap();
        assert_eq!(
            kernel.neighbor_table(vtep.index),
            BTreeMap::from([(Ipv4Addr::new(10, 42, 0, 5), peer_mac)])
        );
        assert_eq!(
            kernel.fdb_table(vtep.index),
            BTreeMap::from([(Ipv4Addr::new(10, 0, 0, 2), peer_mac)])
        );

        kernel.clear_journal();
        let report = handle.reload().await.unwrap();
        assert_eq!(report.vtep, VtepState::Attached);
        assert_eq!(kernel.mutations(), vec![]);
        assert!(logs_contain("Reconciled overlay"));
    }

    #[tokio::test]
    async fn start_fails_on_a_failed_first_cycle() {
        let source = Arc::new(Fixed {
            self_ip: "10.0.0.1",
            hosts_fail: true,
        });
        let result = Controller::start(
            Arc::new(OverlayConfig::default()),
            kernel_with_bridge(),
            source,
        )
        .await;
        match result {
            Err(CycleError::MetadataFetch(e)) => assert_eq!(e.resource, "hosts"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn start_fails_without_a_usable_self_address() {
        let source = Arc::new(Fixed {
            self_ip: "nowhere",
            hosts_fail: false,
        });
        let kernel = kernel_with_bridge();
        let result =
            Controller::start(Arc::new(OverlayConfig::default()), kernel.clone(), source).await;
        assert!(matches!(result, Err(CycleError::VtepAddress(_))));
        assert_eq!(kernel.mutations(), vec![]);
    }

    #[tokio::test]
    #[traced_test]
    async fn reload_failures_are_returned_and_the_worker_survives() {
        let kernel = kernel_with_bridge();
        let source = Arc::new(Fixed {
            self_ip: "10.0.0.1",
            hosts_fail: false,
        });
        let (handle, _) = Controller::start(
            Arc::new(OverlayConfig::default()),
            kernel.clone(),
            source,
        )
        .await
        .unwrap();
        let link = kernel.link("vtep1042").unwrap().index;
        kernel.seed_fdb(TableEntry {
            link,
            ip: Ipv4Addr::new(10, 0, 0, 9),
            mac: MacPrefix::DEFAULT.mac_for(Ipv4Addr::new(10, 0, 0, 9)),
        });
        kernel.reject_when(|m| matches!(m, Mutation::RemoveFdb(_)));
        let err = handle.reload().await.unwrap_err();
        assert!(matches!(err, CycleError::TableApply { .. }));
        assert!(logs_contain("Reconciliation failed"));
        kernel.accept_all();
        let report = handle.reload().await.unwrap();
        assert_eq!(report.forwarding.removed, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_reloads_never_interleave() {
        let kernel = kernel_with_bridge();
        let source = Arc::new(Moving {
            kernel: kernel.clone(),
            fetches: AtomicU8::new(0),
        });
        let (handle, _) = Controller::start(
            Arc::new(OverlayConfig::default()),
            kernel.clone(),
            source,
        )
        .await
        .unwrap();
        let reloads: Vec<_> = (0..16)
            .map(|_| {
                let handle = handle.clone();
                tokio::spawn(async move { handle.reload().await })
            })
            .collect();
        for reload in reloads {
            reload.await.unwrap().unwrap();
        }

        // each cycle moves the peer by one: it adds 10.0.0.n and removes 10.0.0.(n-1), and
        // nothing of another cycle may show up between its fetch and the next one
        let link = kernel.link("vtep1042").unwrap().index;
        let fdb = |n: u8| TableEntry {
            link,
            ip: Ipv4Addr::new(10, 0, 0, n),
            mac: MacPrefix::DEFAULT.mac_for(Ipv4Addr::new(10, 0, 0, n)),
        };
        let mut cycle = 0u8;
        let mut seen = Vec::new();
        for event in kernel.journal() {
            match event {
                Event::Note(note) => {
                    if cycle > 1 {
                        assert_eq!(
                            seen,
                            vec![Mutation::RemoveFdb(fdb(cycle - 1)), Mutation::AddFdb(fdb(cycle))],
                            "cycle {cycle}"
                        );
                    }
                    cycle += 1;
                    assert_eq!(note, format!("fetch {cycle}"));
                    seen.clear();
                }
                Event::Mutation(Mutation::CreateLink(_) | Mutation::Attach { .. }) => {
                    assert_eq!(cycle, 1);
                }
                Event::Mutation(m) => seen.push(m),
            }
        }
        assert_eq!(cycle, 17);
        assert_eq!(seen, vec![Mutation::RemoveFdb(fdb(16)), Mutation::AddFdb(fdb(17))]);
    }

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn new_metadata_versions_trigger_cycles() {
        let kernel = kernel_with_bridge();
        let source = Arc::new(Published {
            peer: AtomicU8::new(2),
        });
        let config = Arc::new(OverlayConfig::default());
        let interval = config.poll_interval;
        let (_handle, _) = Controller::start(config, kernel.clone(), source.clone())
            .await
            .unwrap();
        let link = kernel.link("vtep1042").unwrap().index;
        let fdb = |n: u8| {
            let ip = Ipv4Addr::new(10, 0, 0, n);
            BTreeMap::from([(ip, MacPrefix::DEFAULT.mac_for(ip))])
        };
        assert_eq!(kernel.fdb_table(link), fdb(2));

        // let the watcher record the current version
        tokio::time::sleep(interval / 2).await;
        assert_eq!(kernel.fdb_table(link), fdb(2));

        source.peer.store(7, Ordering::SeqCst);
        tokio::time::sleep(interval * 2).await;
        assert_eq!(kernel.fdb_table(link), fdb(7));
        assert!(logs_contain("Reloading for metadata version v7"));

        kernel.clear_journal();
        tokio::time::sleep(interval * 3).await;
        assert_eq!(kernel.mutations(), vec![]);
    }
}
