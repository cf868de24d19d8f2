// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// An explicit `null` reads as an empty map, the way the feed encodes a network without any.
fn null_as_empty<'de, D>(deserializer: D) -> Result<Map<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Map<String, Value>>::deserialize(deserializer)?.unwrap_or_default())
}

/// A member of the cluster.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Host {
    /// Identity of the host; the join key for containers.
    pub uuid: String,
    /// Human readable name.
    pub name: String,
    /// The host's tunnel endpoint address, as published (unvalidated).
    pub agent_ip: String,
}

/// A container somewhere in the cluster.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Container {
    /// Identity of the container.
    pub uuid: String,
    /// Human readable name.
    pub name: String,
    /// The container's address on its network, empty if it has none (yet).
    pub primary_ip: String,
    /// The network the container is attached to.
    pub network_uuid: String,
    /// The host the container runs on.
    pub host_uuid: String,
    /// Lifecycle state (`running`, `starting`, `stopped`, ...).
    pub state: String,
    /// Set when the container shares the network namespace of another container.
    pub network_from_container_uuid: String,
}

/// A network of the cluster.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Network {
    /// Identity of the network.
    pub uuid: String,
    /// Human readable name.
    pub name: String,
    /// Free-form metadata; overlay networks carry a `cniConfig` object here.
    #[serde(deserialize_with = "null_as_empty")]
    pub metadata: Map<String, Value>,
}

impl Network {
    const CNI_CONFIG: &str = "cniConfig";
    const BRIDGE_SUBNET: &str = "bridgeSubnet";

    /// The network's CNI configuration files, keyed by file name.
    #[must_use]
    pub fn cni_config(&self) -> Option<&Map<String, Value>> {
        self.metadata.get(Self::CNI_CONFIG)?.as_object()
    }

    /// Returns true if the network carries an overlay bridge configuration.
    #[must_use]
    pub fn is_overlay(&self) -> bool {
        self.cni_config().is_some()
    }

    /// The bridge subnet declared by the network's CNI configuration, unparsed.
    ///
    /// Files are visited in name order and the last one declaring a subnet wins.
    #[must_use]
    pub fn bridge_subnet(&self) -> Option<&str> {
        let mut files: Vec<_> = self.cni_config()?.iter().collect();
        files.sort_by(|(a, _), (b, _)| a.cmp(b));
        files
            .into_iter()
            .filter_map(|(_, file)| file.get(Self::BRIDGE_SUBNET)?.as_str())
            .next_back()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // valid in tests
mod test {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn network(metadata: Value) -> Network {
        serde_json::from_value(json!({"uuid": "n1", "name": "managed", "metadata": metadata}))
            .unwrap()
    }

    #[test]
    fn decodes_feed_objects_ignoring_unknown_fields() {
        let host: Host = serde_json::from_value(json!({
            "uuid": "h1", "name": "node-1", "agent_ip": "10.0.0.1", "labels": {"a": "b"}
        }))
        .unwrap();
        assert_eq!(host.agent_ip, "10.0.0.1");
        let container: Container = serde_json::from_value(json!({
            "uuid": "c1", "primary_ip": "10.42.0.5", "host_uuid": "h2",
            "network_uuid": "n1", "state": "running", "ports": []
        }))
        .unwrap();
        assert_eq!(container.network_from_container_uuid, "");
        assert_eq!(container.state, "running");
    }

    #[test]
    fn overlay_membership_follows_cni_config() {
        assert!(!network(json!({})).is_overlay());
        assert!(!network(json!({"cniConfig": "nope"})).is_overlay());
        assert!(network(json!({"cniConfig": {}})).is_overlay());
    }

    #[test]
    fn null_metadata_is_a_plain_network() {
        let networks: Vec<Network> = serde_json::from_value(json!([
            {"uuid": "n1", "name": "managed", "metadata": {"cniConfig": {}}},
            {"uuid": "n2", "name": "host", "metadata": null},
            {"uuid": "n3", "name": "none"},
        ]))
        .unwrap();
        assert_eq!(networks.len(), 3);
        assert!(networks[0].is_overlay());
        assert!(!networks[1].is_overlay());
        assert!(networks[1].metadata.is_empty());
        assert!(!networks[2].is_overlay());
    }

    #[test]
    fn last_file_declaring_a_subnet_wins() {
        let n = network(json!({"cniConfig": {
            "10-bridge.conf": {"bridgeSubnet": "10.42.0.0/16"},
            "20-other.conf": {"mtu": 1400},
            "30-bridge.conf": {"bridgeSubnet": "10.43.0.0/16"},
        }}));
        assert_eq!(n.bridge_subnet(), Some("10.43.0.0/16"));
        let n = network(json!({"cniConfig": {"10-bridge.conf": {"bridge": "docker0"}}}));
        assert_eq!(n.bridge_subnet(), None);
    }
}
