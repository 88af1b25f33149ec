//! Access guard - decision engine, request guard, redirect resolution
//! and site-list filtering
//!
//! Evaluation order for a (visitor, site) pair:
//! 1. network protection (multisite only), unless the site is the exempted main site
//! 2. site protection, unless the network runs in network-only mode
//! 3. pass
//!
//! Nothing here caches a decision: every call reads the configuration
//! store again.

mod engine;
mod guard;
mod hooks;
pub mod middleware;
mod redirect;
mod settings;
mod site_list;

pub use engine::AccessEngine;
pub use guard::{is_feed, Enforcement, PageKind, PageRequest, RequestGuard};
pub use hooks::{BlockNotice, FilterChain, Hooks, RedirectContext};
pub use redirect::NetworkRedirectResolver;
pub use settings::SettingsReader;
pub use site_list::{SiteListFilter, HIDE_MY_SITES_BELOW};

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::config::PortierConfig;
use crate::models::{SiteId, UserId, ANONYMOUS_USER_ID};
use crate::store::{ConfigStore, Directory, SettingScope};

/// The identity behind a request; `user_id == 0` means anonymous.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Visitor {
    pub user_id: UserId,
}

impl Visitor {
    pub fn new(user_id: UserId) -> Self {
        Self { user_id }
    }

    pub fn anonymous() -> Self {
        Self {
            user_id: ANONYMOUS_USER_ID,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.user_id != ANONYMOUS_USER_ID
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockScope {
    Network,
    Site,
}

impl fmt::Display for BlockScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockScope::Network => f.write_str("network"),
            BlockScope::Site => f.write_str("site"),
        }
    }
}

/// Outcome of evaluating a visitor against a site. Recomputed per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    Allowed,
    Blocked(BlockScope),
}

impl AccessDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, AccessDecision::Allowed)
    }
}

/// Failures the guard recovers from locally. They are logged, never
/// surfaced to the visitor.
#[derive(thiserror::Error, Debug)]
pub enum AccessError {
    #[error("configuration unavailable for {scope} `{key}`: {reason}")]
    ConfigurationUnavailable {
        scope: SettingScope,
        key: String,
        reason: String,
    },
    #[error("cannot evaluate site {site_id}: {reason}")]
    TenantContext { site_id: SiteId, reason: String },
    #[error("invalid redirect target `{target}`: {reason}")]
    InvalidRedirectTarget { target: String, reason: String },
}

impl AccessError {
    pub fn configuration(scope: SettingScope, key: &str, reason: impl Into<String>) -> Self {
        Self::ConfigurationUnavailable {
            scope,
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    pub fn tenant(site_id: SiteId, reason: impl Into<String>) -> Self {
        Self::TenantContext {
            site_id,
            reason: reason.into(),
        }
    }

    pub fn redirect(target: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidRedirectTarget {
            target: target.into(),
            reason: reason.into(),
        }
    }
}

/// Composition root for the guard, built once at startup and shared.
#[derive(Clone)]
pub struct Portier {
    engine: AccessEngine,
    guard: RequestGuard,
    site_list: SiteListFilter,
}

impl Portier {
    pub fn new(
        config: PortierConfig,
        store: Arc<dyn ConfigStore>,
        directory: Arc<dyn Directory>,
        hooks: Hooks,
    ) -> Self {
        let engine = AccessEngine::new(store, directory, Arc::new(hooks), Arc::new(config));
        let resolver = NetworkRedirectResolver::new(engine.clone());
        let guard = RequestGuard::new(engine.clone(), resolver);
        let site_list = SiteListFilter::new(engine.clone());

        Self {
            engine,
            guard,
            site_list,
        }
    }

    pub fn engine(&self) -> &AccessEngine {
        &self.engine
    }

    pub fn guard(&self) -> &RequestGuard {
        &self.guard
    }

    pub fn site_list(&self) -> &SiteListFilter {
        &self.site_list
    }

    pub fn config(&self) -> &PortierConfig {
        self.engine.config()
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::models::site::Site;
    use crate::store::MemoryStore;

    pub const MAIN: SiteId = 1;
    pub const S1: SiteId = 2;
    pub const S2: SiteId = 3;

    /// Three sites, nothing protected.
    pub fn store() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store
            .add_site(Site::new(MAIN, "Main", "https://example.com/"))
            .add_site(Site::new(S1, "First", "https://first.example.com/"))
            .add_site(Site::new(S2, "Second", "https://second.example.com/"));
        store
    }

    pub fn portier(store: &Arc<MemoryStore>, config: PortierConfig, hooks: Hooks) -> Portier {
        Portier::new(config, store.clone(), store.clone(), hooks)
    }

    pub fn multisite() -> PortierConfig {
        PortierConfig::default().multisite().with_main_site(MAIN)
    }
}
