// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Computation of the overlay's desired state from a metadata snapshot.
//!
//! This is a pure function of the snapshot and the MAC prefix: no kernel access happens here.

use crate::address::{MacPrefix, parse_ipv4};
use crate::error::Skipped;
use ipnet::Ipv4Net;
use metadata::{Container, Network, Snapshot};
use net::eth::mac::Mac;
use std::collections::{BTreeMap, BTreeSet};
use std::net::Ipv4Addr;
use tracing::{debug, warn};

/// Container states in which a container is reachable.
const LIVE_STATES: [&str; 2] = ["running", "starting"];

/// What the overlay should look like according to one snapshot.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DesiredState {
    /// Identities of the networks taking part in the overlay.
    pub participating: BTreeSet<String>,
    /// Bridge subnets of the participating networks; the neighbor entries we manage.
    pub bridge_subnets: Vec<Ipv4Net>,
    /// Tunnel endpoint of every host but self, by host identity.
    pub peers: BTreeMap<String, Ipv4Addr>,
    /// Neighbor table: remote container address to the MAC of its host's VTEP.
    pub neighbors: BTreeMap<Ipv4Addr, Mac>,
    /// Forwarding table: peer tunnel endpoint to the MAC of its VTEP.
    pub forwarding: BTreeMap<Ipv4Addr, Mac>,
    /// Items left out, and why.
    pub skipped: Vec<Skipped>,
}

fn bridge_subnet(network: &Network) -> Result<Ipv4Net, Skipped> {
    let Some(subnet) = network.bridge_subnet() else {
        return Err(Skipped::ConfigError {
            network: network.uuid.clone(),
            subnet: None,
            reason: "no bridge subnet configured".to_string(),
        });
    };
    subnet
        .parse::<Ipv4Net>()
        .map(|net| net.trunc())
        .map_err(|e| Skipped::ConfigError {
            network: network.uuid.clone(),
            subnet: Some(subnet.to_string()),
            reason: e.to_string(),
        })
}

impl DesiredState {
    fn skip(&mut self, skipped: Skipped) {
        warn!("Skipping {skipped}");
        self.skipped.push(skipped);
    }

    fn add_networks(&mut self, networks: &[Network]) {
        for network in networks.iter().filter(|n| n.is_overlay()) {
            match bridge_subnet(network) {
                Ok(subnet) => {
                    self.participating.insert(network.uuid.clone());
                    if !self.bridge_subnets.contains(&subnet) {
                        self.bridge_subnets.push(subnet);
                    }
                }
                Err(skipped) => self.skip(skipped),
            }
        }
    }

    fn add_peers(&mut self, snapshot: &Snapshot, prefix: &MacPrefix) {
        for host in &snapshot.hosts {
            if host.uuid == snapshot.self_host.uuid {
                continue;
            }
            match parse_ipv4(&host.agent_ip) {
                Ok(ip) => {
                    self.peers.insert(host.uuid.clone(), ip);
                    self.forwarding.insert(ip, prefix.mac_for(ip));
                }
                Err(source) => self.skip(Skipped::AddressDerivation {
                    owner: format!("host {}", host.uuid),
                    source,
                }),
            }
        }
    }

    /// The tunnel endpoint behind which `container` is reachable, if it belongs in the overlay.
    fn peer_of(&self, container: &Container, self_uuid: &str) -> Option<Ipv4Addr> {
        if container.primary_ip.is_empty()
            || !container.network_from_container_uuid.is_empty()
            || container.host_uuid == self_uuid
            || !LIVE_STATES.contains(&container.state.as_str())
            || !self.participating.contains(&container.network_uuid)
        {
            return None;
        }
        self.peers.get(&container.host_uuid).copied()
    }

    fn add_containers(&mut self, snapshot: &Snapshot, prefix: &MacPrefix) {
        for container in &snapshot.containers {
            let Some(peer) = self.peer_of(container, &snapshot.self_host.uuid) else {
                continue;
            };
            let ip = match parse_ipv4(&container.primary_ip) {
                Ok(ip) => ip,
                Err(source) => {
                    self.skip(Skipped::AddressDerivation {
                        owner: format!("container {}", container.uuid),
                        source,
                    });
                    continue;
                }
            };
            // the host itself, as listed among containers
            if ip == peer {
                continue;
            }
            if !self.bridge_subnets.iter().any(|net| net.contains(&ip)) {
                debug!(
                    "Container {} ({ip}) lies outside of the overlay subnets, ignored",
                    container.uuid
                );
                continue;
            }
            self.neighbors.insert(ip, prefix.mac_for(peer));
        }
    }
}

/// Compute the desired state of the overlay from `snapshot`.
#[must_use]
pub fn build(snapshot: &Snapshot, prefix: &MacPrefix) -> DesiredState {
    let mut desired = DesiredState::default();
    desired.add_networks(&snapshot.networks);
    desired.add_peers(snapshot, prefix);
    desired.add_containers(snapshot, prefix);
    debug!(
        "Desired: {} peers, {} neighbors, {} skipped",
        desired.peers.len(),
        desired.neighbors.len(),
        desired.skipped.len()
    );
    desired
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // valid in tests
mod test {
    use super::*;
    use metadata::Host;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn host(uuid: &str, agent_ip: &str) -> Host {
        Host {
            uuid: uuid.to_string(),
            name: uuid.to_string(),
            agent_ip: agent_ip.to_string(),
        }
    }

    fn overlay_network(uuid: &str, subnet: &str) -> Network {
        Network {
            uuid: uuid.to_string(),
            name: uuid.to_string(),
            metadata: json!({"cniConfig": {"10-bridge.conf": {"bridgeSubnet": subnet}}})
                .as_object()
                .unwrap()
                .clone(),
        }
    }

    fn plain_network(uuid: &str) -> Network {
        Network {
            uuid: uuid.to_string(),
            name: uuid.to_string(),
            metadata: serde_json::Map::new(),
        }
    }

    fn container(ip: &str, host: &str, network: &str, state: &str) -> Container {
        Container {
            uuid: format!("c-{ip}"),
            name: format!("c-{ip}"),
            primary_ip: ip.to_string(),
            network_uuid: network.to_string(),
            host_uuid: host.to_string(),
            state: state.to_string(),
            network_from_container_uuid: String::new(),
        }
    }

    fn scenario_a() -> Snapshot {
        Snapshot {
            hosts: vec![host("self", "10.0.0.1"), host("peer-a", "10.0.0.2")],
            networks: vec![overlay_network("managed", "10.42.0.0/16")],
            containers: vec![],
            self_host: host("self", "10.0.0.1"),
        }
    }

    fn mac(ip: &str) -> Mac {
        MacPrefix::DEFAULT.derive(ip).unwrap()
    }

    #[test]
    fn peers_without_containers_only_get_forwarding_entries() {
        let desired = build(&scenario_a(), &MacPrefix::DEFAULT);
        let peer: Ipv4Addr = "10.0.0.2".parse().unwrap();
        assert_eq!(desired.forwarding, BTreeMap::from([(peer, mac("10.0.0.2"))]));
        assert_eq!(desired.peers, BTreeMap::from([("peer-a".to_string(), peer)]));
        assert!(desired.neighbors.is_empty());
        assert!(desired.skipped.is_empty());
    }

    #[test]
    fn remote_containers_map_to_their_host_mac() {
        let mut snapshot = scenario_a();
        snapshot
            .containers
            .push(container("10.42.0.5", "peer-a", "managed", "running"));
        let desired = build(&snapshot, &MacPrefix::DEFAULT);
        assert_eq!(
            desired.neighbors,
            BTreeMap::from([("10.42.0.5".parse().unwrap(), mac("10.0.0.2"))])
        );
    }

    #[test]
    fn stopped_containers_are_left_out() {
        let mut snapshot = scenario_a();
        snapshot
            .containers
            .push(container("10.42.0.5", "peer-a", "managed", "stopped"));
        assert!(build(&snapshot, &MacPrefix::DEFAULT).neighbors.is_empty());
    }

    #[test]
    fn containers_outside_the_bridge_subnets_are_left_out() {
        let mut snapshot = scenario_a();
        snapshot
            .containers
            .push(container("10.99.0.5", "peer-a", "managed", "running"));
        snapshot
            .containers
            .push(container("10.42.3.4", "peer-a", "managed", "running"));
        let desired = build(&snapshot, &MacPrefix::DEFAULT);
        assert_eq!(
            desired.neighbors,
            BTreeMap::from([("10.42.3.4".parse().unwrap(), mac("10.0.0.2"))])
        );
        assert!(desired.skipped.is_empty());
    }

    #[test]
    fn networks_without_bridge_configuration_are_ignored() {
        let mut snapshot = scenario_a();
        snapshot.networks.push(plain_network("host-only"));
        snapshot
            .containers
            .push(container("10.42.0.5", "peer-a", "host-only", "running"));
        let desired = build(&snapshot, &MacPrefix::DEFAULT);
        assert_eq!(desired.participating, BTreeSet::from(["managed".to_string()]));
        assert!(desired.neighbors.is_empty());
        assert!(desired.skipped.is_empty());
    }

    #[test]
    fn bad_items_are_skipped_and_reported() {
        let mut snapshot = scenario_a();
        snapshot.networks.push(overlay_network("broken", "10.43.0.0/33"));
        snapshot.hosts.push(host("peer-b", "not-an-ip"));
        snapshot.hosts.push(host("peer-c", "10.0.0.3"));
        snapshot.containers.extend([
            container("10.42.0.5", "peer-c", "managed", "starting"),
            container("10.42.0.x", "peer-c", "managed", "running"),
            container("10.43.0.5", "peer-c", "broken", "running"),
            container("10.42.0.6", "peer-b", "managed", "running"),
        ]);
        let desired = build(&snapshot, &MacPrefix::DEFAULT);
        assert_eq!(desired.bridge_subnets, vec!["10.42.0.0/16".parse::<Ipv4Net>().unwrap()]);
        assert_eq!(
            desired.neighbors,
            BTreeMap::from([("10.42.0.5".parse().unwrap(), mac("10.0.0.3"))])
        );
        assert_eq!(desired.forwarding.len(), 2);
        assert_eq!(desired.skipped.len(), 3);
        assert!(matches!(
            &desired.skipped[0],
            Skipped::ConfigError { network, subnet: Some(subnet), .. }
                if network == "broken" && subnet == "10.43.0.0/33"
        ));
        assert!(matches!(
            &desired.skipped[1],
            Skipped::AddressDerivation { owner, .. } if owner == "host peer-b"
        ));
        assert!(matches!(
            &desired.skipped[2],
            Skipped::AddressDerivation { owner, .. } if owner == "container c-10.42.0.x"
        ));
    }

    #[test]
    fn networks_without_subnet_are_config_errors() {
        let mut snapshot = scenario_a();
        let mut network = overlay_network("no-subnet", "unused");
        network.metadata = json!({"cniConfig": {"10-bridge.conf": {"mtu": 1400}}})
            .as_object()
            .unwrap()
            .clone();
        snapshot.networks.push(network);
        let desired = build(&snapshot, &MacPrefix::DEFAULT);
        assert_eq!(
            desired.skipped,
            vec![Skipped::ConfigError {
                network: "no-subnet".to_string(),
                subnet: None,
                reason: "no bridge subnet configured".to_string(),
            }]
        );
    }

    #[test]
    fn host_addresses_listed_as_containers_are_not_neighbors() {
        let mut snapshot = scenario_a();
        snapshot.networks[0] = overlay_network("managed", "10.0.0.0/8");
        snapshot
            .containers
            .push(container("10.0.0.2", "peer-a", "managed", "running"));
        assert!(build(&snapshot, &MacPrefix::DEFAULT).neighbors.is_empty());
    }

    #[test]
    fn subnets_are_normalized() {
        let mut snapshot = scenario_a();
        snapshot.networks[0] = overlay_network("managed", "10.42.7.1/16");
        let desired = build(&snapshot, &MacPrefix::DEFAULT);
        assert_eq!(desired.bridge_subnets, vec!["10.42.0.0/16".parse::<Ipv4Net>().unwrap()]);
    }

    /// Small generated cluster: hosts `h0..h3` at `10.0.0.{1..4}`, self is `h0`, networks
    /// `n0` (overlay, 10.42.0.0/16) and `n1` (not overlay). Some containers sit in 10.43.0.0/16.
    fn generated(containers: &[(u8, u8, u8, bool, bool, u8)]) -> Snapshot {
        let hosts: Vec<_> = (0..4u8)
            .map(|i| host(&format!("h{i}"), &format!("10.0.0.{}", i + 1)))
            .collect();
        let states = ["running", "starting", "stopped", "", "created"];
        let containers = containers
            .iter()
            .map(|&(ip, host, net, has_ip, alias, state)| {
                let second_octet = if ip % 7 == 0 { 43 } else { 42 };
                let mut c = container(
                    &format!("10.{second_octet}.0.{ip}"),
                    &format!("h{}", host % 5),
                    &format!("n{}", net % 2),
                    states[usize::from(state) % states.len()],
                );
                if !has_ip {
                    c.primary_ip.clear();
                }
                if alias {
                    c.network_from_container_uuid = "other".to_string();
                }
                c
            })
            .collect();
        Snapshot {
            self_host: hosts[0].clone(),
            hosts,
            networks: vec![overlay_network("n0", "10.42.0.0/16"), plain_network("n1")],
            containers,
        }
    }

    #[test]
    fn self_is_never_a_peer() {
        bolero::check!()
            .with_type()
            .for_each(|containers: &Vec<(u8, u8, u8, bool, bool, u8)>| {
                let snapshot = generated(containers);
                let desired = build(&snapshot, &MacPrefix::DEFAULT);
                let own: Ipv4Addr = snapshot.self_host.agent_ip.parse().unwrap();
                assert!(!desired.peers.contains_key(&snapshot.self_host.uuid));
                assert!(!desired.forwarding.contains_key(&own));
                assert!(
                    !desired
                        .neighbors
                        .values()
                        .any(|mac| *mac == MacPrefix::DEFAULT.mac_for(own))
                );
            });
    }

    #[test]
    fn containers_qualify_exactly_by_predicate() {
        bolero::check!()
            .with_type()
            .for_each(|containers: &Vec<(u8, u8, u8, bool, bool, u8)>| {
                let snapshot = generated(containers);
                let desired = build(&snapshot, &MacPrefix::DEFAULT);
                let mut expected = BTreeMap::new();
                for c in &snapshot.containers {
                    let host = snapshot.hosts.iter().find(|h| h.uuid == c.host_uuid);
                    let qualifies = !c.primary_ip.is_empty()
                        && c.network_from_container_uuid.is_empty()
                        && c.host_uuid != snapshot.self_host.uuid
                        && (c.state == "running" || c.state == "starting")
                        && c.network_uuid == "n0"
                        && c.primary_ip.starts_with("10.42.")
                        && host.is_some_and(|h| h.agent_ip != c.primary_ip);
                    if let (true, Some(host)) = (qualifies, host) {
                        expected.insert(c.primary_ip.parse().unwrap(), mac(&host.agent_ip));
                    }
                }
                assert_eq!(desired.neighbors, expected);
            });
    }
}
