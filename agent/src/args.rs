// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

pub use clap::Parser;
use net::interface::{IllegalInterfaceName, InterfaceName, Mtu, MtuError};
use net::vxlan::{InvalidVni, Vni};
use overlay::{OverlayConfig, OverlayConfigBuilder, OverlayConfigError};
use std::net::SocketAddr;
use std::time::Duration;

/// Errors turning the command line into an [`OverlayConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ArgsError {
    /// `--bridge` is not a legal interface name.
    #[error("invalid bridge name: {0}")]
    Bridge(#[from] IllegalInterfaceName),
    /// `--vxlan-vni` is out of range.
    #[error("invalid vni: {0}")]
    Vni(#[from] InvalidVni),
    /// `--vtep-mtu` is out of range.
    #[error("invalid vtep mtu: {0}")]
    Mtu(#[from] MtuError),
    /// The resulting configuration is rejected.
    #[error(transparent)]
    Config(#[from] OverlayConfigError),
}

#[derive(Debug, Parser)]
#[command(name = "overlay-agent")]
#[command(version)]
#[command(about = "Maintains a VXLAN overlay between the hosts of a cluster", long_about = None)]
pub struct CmdArgs {
    /// Address of the control endpoint.
    #[arg(long, env = "OVERLAY_LISTEN", default_value = "0.0.0.0:8111")]
    listen: SocketAddr,
    /// Log at debug level.
    #[arg(short, long, env = "OVERLAY_DEBUG")]
    debug: bool,
    /// Bridge the VTEP is attached to.
    #[arg(long, env = "OVERLAY_BRIDGE", default_value = OverlayConfig::DEFAULT_BRIDGE)]
    bridge: String,
    /// Address (`host` or `host:port`) of the metadata feed.
    #[arg(long, env = "OVERLAY_METADATA_ADDRESS", default_value = "169.254.169.250")]
    metadata_address: String,
    /// MTU of the VTEP.
    #[arg(long, env = "OVERLAY_VTEP_MTU", default_value_t = 1500)]
    vtep_mtu: u32,
    /// VNI of the overlay.
    #[arg(long, env = "OVERLAY_VXLAN_VNI", default_value_t = OverlayConfig::DEFAULT_VNI)]
    vxlan_vni: u32,
    /// Seconds between two polls of the metadata version.
    #[arg(long, env = "OVERLAY_POLL_INTERVAL", default_value_t = 5)]
    poll_interval: u64,
    /// Per target log levels, e.g. `overlay=debug,metadata=trace`.
    #[arg(long, env = "OVERLAY_LOG_LEVEL")]
    log_level: Option<String>,
}

impl CmdArgs {
    #[must_use]
    pub fn listen(&self) -> SocketAddr {
        self.listen
    }

    #[must_use]
    pub fn debug(&self) -> bool {
        self.debug
    }

    #[must_use]
    pub fn metadata_address(&self) -> &str {
        &self.metadata_address
    }

    #[must_use]
    pub fn log_level(&self) -> Option<&str> {
        self.log_level.as_deref()
    }

    /// The overlay settings given on the command line.
    ///
    /// # Errors
    ///
    /// Fails if a value is out of range.
    pub fn overlay_config(&self) -> Result<OverlayConfig, ArgsError> {
        Ok(OverlayConfigBuilder::default()
            .bridge(InterfaceName::try_from(self.bridge.as_str())?)
            .vni(Vni::new_checked(self.vxlan_vni)?)
            .mtu(Mtu::try_from(self.vtep_mtu)?)
            .poll_interval(Duration::from_secs(self.poll_interval))
            .build()?)
    }
}
