// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Tracing runtime control.
//!
//! A single [`TracingControl`] owns the subscriber's `EnvFilter` (behind a reload layer) and a
//! database of the registered targets.
//! Changing a level rebuilds the filter from the database and swaps it in.

use ordermap::OrderMap;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::str::FromStr;
use std::sync::OnceLock;
use tracing::{error, info, warn};
use tracing_subscriber::filter::{Directive, LevelFilter};
use tracing_subscriber::{EnvFilter, Registry, prelude::*, reload};

use crate::{targets::TRACING_TARGETS, trace_target};

trace_target!("tracectl", LevelFilter::INFO, &[]);

/// Errors parsing a log level or a `tag=level` list.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LevelError {
    /// Not one of off, error, warn, info, debug, trace.
    #[error("not a valid log level: '{0}'")]
    InvalidLevel(String),
    /// An item of the list is not of the form `tag=level`.
    #[error("invalid syntax '{0}': it should be tag=level")]
    Syntax(String),
}

/// Parse a single level name.
///
/// # Errors
///
/// Fails with [`LevelError::InvalidLevel`] if the name isn't a level.
pub fn parse_level(input: &str) -> Result<LevelFilter, LevelError> {
    LevelFilter::from_str(input.trim()).map_err(|_| LevelError::InvalidLevel(input.to_string()))
}

/// A registered target and its current level.
#[derive(Debug, Clone)]
pub struct TargetCfg {
    pub target: &'static str,
    pub name: &'static str,
    pub level: LevelFilter,
    pub tags: Vec<&'static str>,
}

#[derive(Debug)]
struct TargetCfgDb {
    level: LevelFilter,
    targets: OrderMap<&'static str, TargetCfg>,
    tags: OrderMap<&'static str, HashSet<&'static str>>,
}

impl TargetCfgDb {
    fn new(level: LevelFilter) -> Self {
        let mut db = Self {
            level,
            targets: OrderMap::new(),
            tags: OrderMap::new(),
        };
        for t in TRACING_TARGETS {
            db.register(t.target, t.name, t.level, t.tags);
        }
        db
    }

    fn register(
        &mut self,
        target: &'static str,
        name: &'static str,
        level: LevelFilter,
        tags: &'static [&'static str],
    ) {
        // a target is always reachable through its own name
        let mut tags = tags.to_vec();
        if !tags.contains(&name) {
            tags.push(name);
        }
        for tag in &tags {
            self.tags.entry(tag).or_default().insert(target);
        }
        let cfg = TargetCfg {
            target,
            name,
            level,
            tags,
        };
        if self.targets.insert(target, cfg).is_some() {
            warn!("Target {target} has been multiply defined!");
        }
    }

    fn env_filter(&self) -> EnvFilter {
        self.targets
            .values()
            .filter_map(|t| format!("{}={}", t.target, t.level).parse::<Directive>().ok())
            .fold(EnvFilter::new(self.level.to_string()), EnvFilter::add_directive)
    }

    fn tag_targets_mut(&mut self, tag: &str) -> impl Iterator<Item = &mut TargetCfg> {
        let members = self.tags.get(tag).cloned().unwrap_or_default();
        self.targets
            .values_mut()
            .filter(move |t| members.contains(t.target))
    }
}

/// Runtime handle over the process-wide tracing configuration.
#[derive(Debug)]
pub struct TracingControl {
    db: Mutex<TargetCfgDb>,
    reload_filter: reload::Handle<EnvFilter, Registry>,
}

impl TracingControl {
    fn new() -> Self {
        let db = TargetCfgDb::new(LevelFilter::INFO);
        let (filter, reload_filter) = reload::Layer::new(db.env_filter());

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_line_number(true)
            .with_target(true)
            .with_thread_names(true)
            .with_level(true);

        // another subscriber (e.g. the test harness) may already be installed
        if let Err(e) = tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .try_init()
        {
            warn!("Tracing subscriber not installed: {e}");
        }

        Self {
            db: Mutex::new(db),
            reload_filter,
        }
    }

    fn reload(&self, filter: EnvFilter) {
        if let Err(e) = self.reload_filter.reload(filter) {
            error!("Failed to reload tracing filter: {e}");
        }
    }

    /// Set the level of every target carrying `tag`.
    pub fn set_tag_level(&self, tag: &str, level: LevelFilter) {
        let mut db = self.db.lock();
        let mut changed = 0;
        for target in db.tag_targets_mut(tag) {
            if target.level != level {
                target.level = level;
                changed += 1;
            }
        }
        if changed > 0 {
            self.reload(db.env_filter());
        }
        info!("Changed log level for tag '{tag}' to {level}. Targets changed: {changed}");
    }

    /// Set the level of every registered target.
    pub fn set_level_all(&self, level: LevelFilter) {
        let mut db = self.db.lock();
        for target in db.targets.values_mut() {
            target.level = level;
        }
        self.reload(db.env_filter());
    }

    /// Set the level that applies to events of targets nobody registered.
    pub fn set_default_level(&self, level: LevelFilter) {
        let mut db = self.db.lock();
        if db.level != level {
            db.level = level;
            info!("Set default log level to {level}");
            self.reload(db.env_filter());
        }
    }

    /// The level that applies to events of targets nobody registered.
    pub fn get_default_level(&self) -> LevelFilter {
        self.db.lock().level
    }

    /// Set the default level and the level of every target at once.
    ///
    /// This is what the agent's log-level endpoint drives.
    pub fn set_global_level(&self, level: LevelFilter) {
        let mut db = self.db.lock();
        db.level = level;
        for target in db.targets.values_mut() {
            target.level = level;
        }
        info!("Set log level to {level}");
        self.reload(db.env_filter());
    }

    fn parse_tracing_config(input: &str) -> Result<OrderMap<String, LevelFilter>, LevelError> {
        let mut result = OrderMap::new();
        for item in input.split(',').map(str::trim) {
            let (tag, level) = item
                .split_once('=')
                .ok_or_else(|| LevelError::Syntax(item.to_string()))?;
            result.insert(tag.trim().to_string(), parse_level(level)?);
        }
        Ok(result)
    }

    /// Apply a comma separated list of `tag=level`.
    ///
    /// `default=level` sets the default level and `all=level` sets every target; both are
    /// applied before the per-tag items so `all=info,kernel=debug` works as expected.
    ///
    /// # Errors
    ///
    /// Nothing is applied if any item fails to parse.
    pub fn setup_from_string(&self, input: &str) -> Result<(), LevelError> {
        let config = Self::parse_tracing_config(input)?;
        if let Some(level) = config.get("default") {
            self.set_default_level(*level);
        }
        if let Some(level) = config.get("all") {
            self.set_level_all(*level);
        }
        for (tag, level) in config
            .iter()
            .filter(|(tag, _)| !matches!(tag.as_str(), "default" | "all"))
        {
            self.set_tag_level(tag, *level);
        }
        Ok(())
    }
}

static TRACING_CTL: OnceLock<TracingControl> = OnceLock::new();

/// Get a reference to the static [`TracingControl`], initializing it if needed.
pub fn get_trace_ctl() -> &'static TracingControl {
    TRACING_CTL.get_or_init(TracingControl::new)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serial_test::serial;

    trace_target!("tracectl-test", LevelFilter::DEBUG, &["common-tag"]);

    fn target(tctl: &TracingControl, target: &str) -> Option<TargetCfg> {
        tctl.db.lock().targets.get(target).cloned()
    }

    fn tagged(tctl: &TracingControl, tag: &str) -> Vec<TargetCfg> {
        let mut db = tctl.db.lock();
        db.tag_targets_mut(tag).map(|t| t.clone()).collect()
    }

    #[test]
    #[serial]
    fn linked_targets_are_registered() {
        let tctl = get_trace_ctl();
        let cfg = target(tctl, module_path!()).unwrap();
        assert_eq!(cfg.name, "tracectl-test");
        assert!(cfg.tags.contains(&"common-tag"));
        assert!(cfg.tags.contains(&"tracectl-test"));
        assert!(target(tctl, "overlay_tracectl::control").is_some());
    }

    #[test]
    #[serial]
    fn tag_level_changes_targets() {
        let tctl = get_trace_ctl();
        tctl.set_tag_level("common-tag", LevelFilter::WARN);
        assert_eq!(target(tctl, module_path!()).unwrap().level, LevelFilter::WARN);
        tctl.setup_from_string("common-tag=trace").unwrap();
        let members = tagged(tctl, "common-tag");
        assert!(!members.is_empty());
        assert!(members.iter().all(|t| t.level == LevelFilter::TRACE));
    }

    #[test]
    #[serial]
    fn global_level_round_trips() {
        let tctl = get_trace_ctl();
        tctl.set_global_level(LevelFilter::DEBUG);
        assert_eq!(tctl.get_default_level(), LevelFilter::DEBUG);
        tctl.set_global_level(LevelFilter::INFO);
        assert_eq!(tctl.get_default_level(), LevelFilter::INFO);
        assert_eq!(target(tctl, module_path!()).unwrap().level, LevelFilter::INFO);
    }

    #[test]
    #[serial]
    fn bad_config_strings_are_rejected() {
        let tctl = get_trace_ctl();
        assert_eq!(
            tctl.setup_from_string("common-tag=bad"),
            Err(LevelError::InvalidLevel("bad".into()))
        );
        assert_eq!(
            tctl.setup_from_string("common-tag=error, foo"),
            Err(LevelError::Syntax("foo".into()))
        );
        assert_eq!(parse_level(" debug "), Ok(LevelFilter::DEBUG));
    }
}
