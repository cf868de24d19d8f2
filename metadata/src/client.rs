// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

use crate::model::{Container, Host, Network};
use crate::source::{MetadataError, MetadataSource};
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Revision of the feed's API this client speaks.
const API_REVISION: &str = "2016-07-29";

/// HTTP client of the metadata feed.
#[derive(Clone, Debug)]
pub struct Client {
    base: String,
    http: reqwest::Client,
}

impl Client {
    /// Create a client for the feed served at `address` (`host` or `host:port`).
    ///
    /// # Errors
    ///
    /// Fails if the underlying HTTP client cannot be set up.
    pub fn new(address: &str) -> Result<Self, MetadataError> {
        let base = format!("http://{address}/{API_REVISION}");
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|source| MetadataError::Http {
                url: base.clone(),
                source,
            })?;
        Ok(Client { base, http })
    }

    /// Create a client and wait until the feed answers, retrying every `retry`.
    ///
    /// # Errors
    ///
    /// Fails only if the client cannot be set up; an unreachable feed is waited for.
    pub async fn connect(address: &str, retry: Duration) -> Result<Self, MetadataError> {
        let client = Self::new(address)?;
        loop {
            match client.version().await {
                Ok(version) => {
                    info!("Connected to metadata at {}, version {version}", client.base);
                    return Ok(client);
                }
                Err(e) => {
                    warn!("Metadata not reachable yet: {e}");
                    tokio::time::sleep(retry).await;
                }
            }
        }
    }

    /// The base url all requests are relative to.
    #[must_use]
    pub fn base(&self) -> &str {
        &self.base
    }

    async fn get(&self, path: &str) -> Result<(String, Vec<u8>), MetadataError> {
        let url = format!("{}{path}", self.base);
        debug!("GET {url}");
        let response = match self.http.get(&url).send().await {
            Ok(response) => response,
            Err(source) => return Err(MetadataError::Http { url, source }),
        };
        let status = response.status();
        if !status.is_success() {
            return Err(MetadataError::Status {
                url,
                status: status.as_u16(),
            });
        }
        match response.bytes().await {
            Ok(body) => Ok((url, body.to_vec())),
            Err(source) => Err(MetadataError::Http { url, source }),
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, MetadataError> {
        let (url, body) = self.get(path).await?;
        serde_json::from_slice(&body).map_err(|source| MetadataError::Decode { url, source })
    }
}

impl MetadataSource for Client {
    async fn hosts(&self) -> Result<Vec<Host>, MetadataError> {
        self.get_json("/hosts").await
    }

    async fn networks(&self) -> Result<Vec<Network>, MetadataError> {
        self.get_json("/networks").await
    }

    async fn containers(&self) -> Result<Vec<Container>, MetadataError> {
        self.get_json("/containers").await
    }

    async fn self_host(&self) -> Result<Host, MetadataError> {
        self.get_json("/self/host").await
    }

    /// The version comes as a JSON string, or as plain text from older feeds.
    async fn version(&self) -> Result<String, MetadataError> {
        let (_, body) = self.get("/version").await?;
        let text = String::from_utf8_lossy(&body);
        Ok(serde_json::from_str::<String>(&text).unwrap_or_else(|_| text.trim().to_string()))
    }
}
