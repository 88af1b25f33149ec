use url::form_urlencoded;

use super::{AccessDecision, AccessEngine, BlockNotice, BlockScope, NetworkRedirectResolver, Visitor};
use crate::models::SiteId;

const FEED_SEGMENT: &str = "feed";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    Content,
    Feed,
    /// The request would render a "not found" page anyway.
    NotFound,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub visitor: Visitor,
    pub site_id: SiteId,
    /// Path and query as requested, used as the post-login destination.
    pub uri: String,
    pub kind: PageKind,
}

/// What the host must do with the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Enforcement {
    Proceed,
    NotFound,
    /// End any session and send the visitor to the login screen.
    Login { location: String },
    Redirect { location: String },
}

/// Per-request interceptor: network rules, then site rules, then pass.
#[derive(Clone)]
pub struct RequestGuard {
    engine: AccessEngine,
    resolver: NetworkRedirectResolver,
}

impl RequestGuard {
    pub fn new(engine: AccessEngine, resolver: NetworkRedirectResolver) -> Self {
        Self { engine, resolver }
    }

    /// Classify a page path (normalized, without surrounding slashes) on a site.
    ///
    /// Directory failures classify as content: when unsure, the block
    /// logic still runs.
    pub async fn classify(&self, site_id: SiteId, path: &str, query: Option<&str>) -> PageKind {
        let directory = self.engine.directory();

        match directory.site(site_id).await {
            Ok(Some(_)) => {}
            Ok(None) => return PageKind::NotFound,
            Err(err) => {
                tracing::warn!(error = %err, site_id, "site lookup failed while classifying request");
                return PageKind::Content;
            }
        }

        if is_feed(path, query) {
            return PageKind::Feed;
        }

        match directory.page_exists(site_id, path).await {
            Ok(true) => PageKind::Content,
            Ok(false) => PageKind::NotFound,
            Err(err) => {
                tracing::warn!(error = %err, site_id, path, "page lookup failed while classifying request");
                PageKind::Content
            }
        }
    }

    pub async fn handle(&self, request: &PageRequest) -> Enforcement {
        let scope = match self.engine.evaluate(&request.visitor, request.site_id).await {
            AccessDecision::Allowed => return Enforcement::Proceed,
            AccessDecision::Blocked(scope) => scope,
        };

        if request.kind == PageKind::NotFound {
            return Enforcement::Proceed;
        }

        self.engine.hooks().notify_pre_block(&BlockNotice {
            scope,
            user_id: request.visitor.user_id,
            site_id: request.site_id,
            uri: request.uri.clone(),
            feed: request.kind == PageKind::Feed,
        });

        tracing::info!(
            user_id = request.visitor.user_id,
            site_id = request.site_id,
            scope = %scope,
            feed = request.kind == PageKind::Feed,
            "request blocked"
        );

        // Feed readers would follow a login redirect forever.
        if request.kind == PageKind::Feed {
            return Enforcement::NotFound;
        }

        if scope == BlockScope::Network && self.engine.redirect_enabled().await {
            if let Some(location) = self.resolver.resolve(&request.visitor, request.site_id).await {
                return Enforcement::Redirect { location };
            }
        }

        Enforcement::Login {
            location: self.login_location(request),
        }
    }

    pub fn login_location(&self, request: &PageRequest) -> String {
        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair("redirect_to", &request.uri)
            .append_pair("site_id", &request.site_id.to_string())
            .finish();

        format!("{}?{}", self.engine.config().login_path, query)
    }
}

/// Feed endpoints: a `feed` path segment or a `feed` query parameter.
pub fn is_feed(path: &str, query: Option<&str>) -> bool {
    if path == FEED_SEGMENT || path.ends_with("/feed") {
        return true;
    }

    query
        .map(|query| form_urlencoded::parse(query.as_bytes()).any(|(key, _)| key == FEED_SEGMENT))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::super::fixtures::{self, MAIN, S1, S2};
    use super::super::{Hooks, Portier};
    use super::*;
    use crate::config::PortierConfig;
    use crate::store::{keys, ConfigStore, MemoryStore, MemoryUser, SettingValue, SettingsMap, StoreError};

    fn page(user_id: i64, site_id: SiteId, kind: PageKind) -> PageRequest {
        PageRequest {
            visitor: Visitor::new(user_id),
            site_id,
            uri: format!("/sites/{site_id}/about"),
            kind,
        }
    }

    fn is_login(enforcement: &Enforcement) -> bool {
        matches!(enforcement, Enforcement::Login { .. })
    }

    #[tokio::test]
    async fn scenario_site_allow_list() {
        let store = fixtures::store();
        store
            .add_user(MemoryUser::new(42))
            .add_user(MemoryUser::new(7))
            .set_site(S1, keys::PROTECT, SettingValue::Bool(true))
            .set_site(S1, keys::ALLOWED_USERS, SettingValue::IdList(vec![42]));
        let portier = fixtures::portier(&store, PortierConfig::default(), Hooks::new());

        assert_eq!(portier.guard().handle(&page(42, S1, PageKind::Content)).await, Enforcement::Proceed);

        let blocked = portier.guard().handle(&page(7, S1, PageKind::Content)).await;
        assert_eq!(
            blocked,
            Enforcement::Login {
                location: "/login?redirect_to=%2Fsites%2F2%2Fabout&site_id=2".into()
            }
        );
    }

    #[tokio::test]
    async fn scenario_network_blocks_unprotected_site() {
        let store = fixtures::store();
        store
            .add_user(MemoryUser::new(1).super_admin())
            .add_user(MemoryUser::new(2))
            .set_network(keys::PROTECT, SettingValue::Bool(true))
            .set_network(keys::ALLOWED_USERS, SettingValue::IdList(vec![]))
            .set_site(S1, keys::PROTECT, SettingValue::Bool(false));
        let notices = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&notices);
        let hooks = Hooks::new().with_pre_block(move |notice| sink.lock().unwrap().push(notice.scope));
        let portier = fixtures::portier(&store, fixtures::multisite(), hooks);

        assert_eq!(portier.guard().handle(&page(1, S1, PageKind::Content)).await, Enforcement::Proceed);
        assert!(is_login(&portier.guard().handle(&page(2, S1, PageKind::Content)).await));
        assert_eq!(*notices.lock().unwrap(), vec![BlockScope::Network]);
    }

    #[tokio::test]
    async fn scenario_network_only_ignores_site_rules() {
        let store = fixtures::store();
        store
            .add_user(MemoryUser::new(3))
            .set_network(keys::NETWORK_ONLY, SettingValue::Bool(true))
            .set_network(keys::PROTECT, SettingValue::Bool(false))
            .set_site(S1, keys::PROTECT, SettingValue::Bool(true))
            .set_site(S1, keys::ALLOWED_USERS, SettingValue::IdList(vec![]));
        let portier = fixtures::portier(&store, fixtures::multisite(), Hooks::new());

        assert_eq!(portier.guard().handle(&page(3, S1, PageKind::Content)).await, Enforcement::Proceed);
        assert_eq!(portier.guard().handle(&page(0, S1, PageKind::Content)).await, Enforcement::Proceed);
    }

    #[tokio::test]
    async fn network_only_skips_site_rules_under_active_network_protection() {
        let store = fixtures::store();
        store
            .add_user(MemoryUser::new(3))
            .add_user(MemoryUser::new(4))
            .set_network(keys::PROTECT, SettingValue::Bool(true))
            .set_network(keys::NETWORK_ONLY, SettingValue::Bool(true))
            .set_network(keys::ALLOWED_USERS, SettingValue::IdList(vec![3]))
            .set_site(S1, keys::PROTECT, SettingValue::Bool(true))
            .set_site(S1, keys::ALLOWED_USERS, SettingValue::IdList(vec![4]));
        let portier = fixtures::portier(&store, fixtures::multisite(), Hooks::new());

        assert_eq!(portier.guard().handle(&page(3, S1, PageKind::Content)).await, Enforcement::Proceed);
        assert!(is_login(&portier.guard().handle(&page(4, S1, PageKind::Content)).await));
        assert_eq!(
            portier.engine().evaluate(&Visitor::new(4), S1).await,
            AccessDecision::Blocked(BlockScope::Network)
        );
    }

    #[tokio::test]
    async fn scenario_network_fallback_redirect() {
        let store = fixtures::store();
        store
            .add_user(MemoryUser::new(5).with_primary_site(S2))
            .set_network(keys::PROTECT, SettingValue::Bool(true))
            .set_network(keys::REDIRECT, SettingValue::Bool(true))
            .set_site(S2, keys::PROTECT, SettingValue::Bool(false));
        let portier = fixtures::portier(&store, fixtures::multisite(), Hooks::new());

        assert_eq!(
            portier.guard().handle(&page(5, S1, PageKind::Content)).await,
            Enforcement::Redirect {
                location: "https://second.example.com/".into()
            }
        );

        // Without the redirect flag the login screen is used.
        store.set_network(keys::REDIRECT, SettingValue::Bool(false));
        assert!(is_login(&portier.guard().handle(&page(5, S1, PageKind::Content)).await));
    }

    #[tokio::test]
    async fn scenario_feed_is_masked_as_not_found() {
        let store = fixtures::store();
        store.set_site(S1, keys::PROTECT, SettingValue::Bool(true));
        let portier = fixtures::portier(&store, PortierConfig::default(), Hooks::new());

        assert_eq!(portier.guard().classify(S1, "feed", None).await, PageKind::Feed);
        assert_eq!(portier.guard().handle(&page(0, S1, PageKind::Feed)).await, Enforcement::NotFound);
    }

    #[tokio::test]
    async fn not_found_pages_pass_through_without_notice() {
        let store = fixtures::store();
        store.set_site(S1, keys::PROTECT, SettingValue::Bool(true));
        let fired = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&fired);
        let hooks = Hooks::new().with_pre_block(move |_| *counter.lock().unwrap() += 1);
        let portier = fixtures::portier(&store, PortierConfig::default(), hooks);

        assert_eq!(portier.guard().classify(S1, "missing", None).await, PageKind::NotFound);
        assert_eq!(portier.guard().classify(99, "", None).await, PageKind::NotFound);
        assert_eq!(portier.guard().handle(&page(0, S1, PageKind::NotFound)).await, Enforcement::Proceed);
        assert_eq!(*fired.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn unprotected_sites_never_block_on_site_scope() {
        let store = fixtures::store();
        store
            .set_site(S1, keys::PROTECT, SettingValue::Bool(false))
            .set_site(S1, keys::ALLOWED_USERS, SettingValue::IdList(vec![99]));
        let portier = fixtures::portier(&store, PortierConfig::default(), Hooks::new());

        for user in [0, 1, 7, 99] {
            assert_eq!(portier.guard().handle(&page(user, S1, PageKind::Content)).await, Enforcement::Proceed);
        }
    }

    #[test]
    fn feed_detection() {
        assert!(is_feed("feed", None));
        assert!(is_feed("news/feed", None));
        assert!(is_feed("", Some("feed=rss2")));
        assert!(!is_feed("feedback", None));
        assert!(!is_feed("about", Some("page=2")));
    }

    /// Store whose reads always fail.
    struct UnreachableStore;

    #[async_trait::async_trait]
    impl ConfigStore for UnreachableStore {
        async fn site_setting(&self, _: SiteId, _: &str) -> Result<Option<SettingValue>, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }

        async fn network_setting(&self, _: &str) -> Result<Option<SettingValue>, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }

        async fn save_site_settings(&self, _: SiteId, _: &SettingsMap) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }

        async fn save_network_settings(&self, _: &SettingsMap) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
    }

    #[tokio::test]
    async fn unreadable_configuration_fails_open() {
        let directory = Arc::new(MemoryStore::new());
        let portier = Portier::new(
            fixtures::multisite(),
            Arc::new(UnreachableStore),
            directory,
            Hooks::new(),
        );

        for site in [MAIN, S1, S2] {
            assert_eq!(portier.guard().handle(&page(0, site, PageKind::Content)).await, Enforcement::Proceed);
        }
    }
}
