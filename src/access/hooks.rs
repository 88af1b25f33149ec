//! Extension points for third-party access logic.
//!
//! Each filter point is an ordered chain: callbacks run in registration
//! order, each receiving the previous value. An empty chain is the
//! identity. Administrator overrides are applied by the engine after the
//! chain, so no filter can revoke them.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use super::BlockScope;
use crate::models::{SiteId, UserId};

pub struct FilterChain<T, C: ?Sized> {
    filters: Vec<Arc<dyn Fn(T, &C) -> T + Send + Sync>>,
}

impl<T, C: ?Sized> Default for FilterChain<T, C> {
    fn default() -> Self {
        Self { filters: Vec::new() }
    }
}

impl<T, C: ?Sized> Clone for FilterChain<T, C> {
    fn clone(&self) -> Self {
        Self {
            filters: self.filters.clone(),
        }
    }
}

impl<T, C: ?Sized> fmt::Debug for FilterChain<T, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterChain").field("len", &self.filters.len()).finish()
    }
}

impl<T, C: ?Sized> FilterChain<T, C> {
    pub fn push(&mut self, filter: impl Fn(T, &C) -> T + Send + Sync + 'static) {
        self.filters.push(Arc::new(filter));
    }

    pub fn apply(&self, value: T, ctx: &C) -> T {
        self.filters.iter().fold(value, |acc, filter| filter(acc, ctx))
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}

/// Context passed to redirect-target filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedirectContext {
    pub user_id: UserId,
    /// The site whose request was blocked.
    pub site_id: SiteId,
}

/// Passed to pre-block observers right before enforcement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockNotice {
    pub scope: BlockScope,
    pub user_id: UserId,
    pub site_id: SiteId,
    pub uri: String,
    pub feed: bool,
}

impl crate::events::Loggable for BlockNotice {
    fn entity_type() -> &'static str {
        "access"
    }

    fn subject_id(&self) -> Option<i64> {
        Some(self.site_id)
    }

    fn severity(&self) -> crate::events::Severity {
        crate::events::Severity::Noise
    }
}

type Observer<E> = Arc<dyn Fn(&E) + Send + Sync>;

#[derive(Clone, Default)]
pub struct Hooks {
    pub(crate) site_protected: FilterChain<bool, SiteId>,
    pub(crate) network_protected: FilterChain<bool, ()>,
    pub(crate) network_only: FilterChain<bool, ()>,
    pub(crate) site_user_allowed: FilterChain<bool, (UserId, SiteId)>,
    pub(crate) network_user_allowed: FilterChain<bool, UserId>,
    pub(crate) redirect_target: FilterChain<Option<String>, RedirectContext>,
    pub(crate) hide_my_sites: FilterChain<bool, UserId>,
    pub(crate) pre_block: Vec<Observer<BlockNotice>>,
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("site_protected", &self.site_protected)
            .field("network_protected", &self.network_protected)
            .field("network_only", &self.network_only)
            .field("site_user_allowed", &self.site_user_allowed)
            .field("network_user_allowed", &self.network_user_allowed)
            .field("redirect_target", &self.redirect_target)
            .field("hide_my_sites", &self.hide_my_sites)
            .field("pre_block", &self.pre_block.len())
            .finish()
    }
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_site_protected(mut self, f: impl Fn(bool, &SiteId) -> bool + Send + Sync + 'static) -> Self {
        self.site_protected.push(f);
        self
    }

    pub fn with_network_protected(mut self, f: impl Fn(bool) -> bool + Send + Sync + 'static) -> Self {
        self.network_protected.push(move |value, _: &()| f(value));
        self
    }

    pub fn with_network_only(mut self, f: impl Fn(bool) -> bool + Send + Sync + 'static) -> Self {
        self.network_only.push(move |value, _: &()| f(value));
        self
    }

    /// Filter the raw allow-list answer for a user on a site.
    pub fn with_site_user_allowed(
        mut self,
        f: impl Fn(bool, UserId, SiteId) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.site_user_allowed
            .push(move |value, &(user_id, site_id): &(UserId, SiteId)| f(value, user_id, site_id));
        self
    }

    pub fn with_network_user_allowed(mut self, f: impl Fn(bool, UserId) -> bool + Send + Sync + 'static) -> Self {
        self.network_user_allowed.push(move |value, user_id: &UserId| f(value, *user_id));
        self
    }

    pub fn with_redirect_target(
        mut self,
        f: impl Fn(Option<String>, &RedirectContext) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        self.redirect_target.push(f);
        self
    }

    pub fn with_hide_my_sites(mut self, f: impl Fn(bool, UserId) -> bool + Send + Sync + 'static) -> Self {
        self.hide_my_sites.push(move |value, user_id: &UserId| f(value, *user_id));
        self
    }

    /// Register an observer that runs before every block is enforced.
    pub fn with_pre_block(mut self, f: impl Fn(&BlockNotice) + Send + Sync + 'static) -> Self {
        self.pre_block.push(Arc::new(f));
        self
    }

    pub(crate) fn notify_pre_block(&self, notice: &BlockNotice) {
        for observer in &self.pre_block {
            observer(notice);
        }
    }
}
