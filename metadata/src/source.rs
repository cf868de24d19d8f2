// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use crate::model::{Container, Host, Network};
use std::future::Future;
use tracing::debug;

/// Errors raised while talking to the metadata feed.
#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    /// The request could not be sent or its body could not be read.
    #[error("request to {url} failed: {source}")]
    Http {
        /// The requested url.
        url: String,
        /// The underlying error.
        source: reqwest::Error,
    },
    /// The feed answered with a non-success status.
    #[error("{url} answered {status}")]
    Status {
        /// The requested url.
        url: String,
        /// The received status code.
        status: u16,
    },
    /// The feed's answer is not what we expected.
    #[error("malformed answer from {url}: {source}")]
    Decode {
        /// The requested url.
        url: String,
        /// The underlying error.
        source: serde_json::Error,
    },
    /// The source cannot answer at all.
    #[error("metadata unavailable: {0}")]
    Unavailable(String),
}

/// Anything able to answer the questions the overlay asks the metadata feed.
pub trait MetadataSource: Send + Sync + 'static {
    /// All hosts of the cluster.
    fn hosts(&self) -> impl Future<Output = Result<Vec<Host>, MetadataError>> + Send;
    /// All networks of the cluster.
    fn networks(&self) -> impl Future<Output = Result<Vec<Network>, MetadataError>> + Send;
    /// All containers of the cluster.
    fn containers(&self) -> impl Future<Output = Result<Vec<Container>, MetadataError>> + Send;
    /// The host this agent runs on.
    fn self_host(&self) -> impl Future<Output = Result<Host, MetadataError>> + Send;
    /// The current version of the feed's content.
    fn version(&self) -> impl Future<Output = Result<String, MetadataError>> + Send;
}

/// A failed snapshot fetch, naming the resource that could not be fetched.
#[derive(Debug, thiserror::Error)]
#[error("failed to fetch {resource}: {source}")]
pub struct FetchError {
    /// The resource being fetched.
    pub resource: &'static str,
    /// Why it failed.
    pub source: MetadataError,
}

/// Everything one reconciliation cycle needs to know about the cluster.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Snapshot {
    /// All hosts.
    pub hosts: Vec<Host>,
    /// All networks.
    pub networks: Vec<Network>,
    /// All containers.
    pub containers: Vec<Container>,
    /// The host the agent runs on.
    pub self_host: Host,
}

fn context(resource: &'static str) -> impl FnOnce(MetadataError) -> FetchError {
    move |source| FetchError { resource, source }
}

impl Snapshot {
    /// Fetch a fresh snapshot from `source`.
    ///
    /// # Errors
    ///
    /// Fails on the first resource that cannot be fetched.
    pub async fn fetch<S: MetadataSource>(source: &S) -> Result<Snapshot, FetchError> {
        let hosts = source.hosts().await.map_err(context("hosts"))?;
        let networks = source.networks().await.map_err(context("networks"))?;
        let containers = source.containers().await.map_err(context("containers"))?;
        let self_host = source.self_host().await.map_err(context("self host"))?;
        debug!(
            "Fetched {} hosts, {} networks and {} containers",
            hosts.len(),
            networks.len(),
            containers.len()
        );
        Ok(Snapshot {
            hosts,
            networks,
            containers,
            self_host,
        })
    }
}
