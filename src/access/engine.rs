use std::sync::Arc;

use super::{AccessDecision, BlockScope, Hooks, SettingsReader, Visitor};
use crate::config::PortierConfig;
use crate::models::{SiteId, UserId};
use crate::store::{keys, ConfigStore, Directory, SettingScope};

/// Pure access predicates over the configuration store and directory.
///
/// Network rules are evaluated before site rules and a network block
/// always wins. Administrator overrides are applied after the allow
/// hooks, so hooks can grant access but never revoke it from admins.
#[derive(Clone)]
pub struct AccessEngine {
    settings: SettingsReader,
    directory: Arc<dyn Directory>,
    hooks: Arc<Hooks>,
    config: Arc<PortierConfig>,
}

impl AccessEngine {
    pub fn new(
        store: Arc<dyn ConfigStore>,
        directory: Arc<dyn Directory>,
        hooks: Arc<Hooks>,
        config: Arc<PortierConfig>,
    ) -> Self {
        Self {
            settings: SettingsReader::new(store),
            directory,
            hooks,
            config,
        }
    }

    pub fn config(&self) -> &PortierConfig {
        &self.config
    }

    pub(crate) fn directory(&self) -> &Arc<dyn Directory> {
        &self.directory
    }

    pub(crate) fn hooks(&self) -> &Hooks {
        &self.hooks
    }

    pub async fn is_site_protected(&self, site_id: SiteId) -> bool {
        let raw = self.settings.flag(SettingScope::Site(site_id), keys::PROTECT).await;
        self.hooks.site_protected.apply(raw, &site_id)
    }

    pub async fn is_user_allowed_for_site(&self, user_id: UserId, site_id: SiteId) -> bool {
        let listed = self
            .settings
            .ids(SettingScope::Site(site_id), keys::ALLOWED_USERS)
            .await
            .contains(&user_id);
        let allowed = self.hooks.site_user_allowed.apply(listed, &(user_id, site_id));

        allowed || self.is_site_administrator(user_id, site_id).await
    }

    pub async fn is_network_protected(&self) -> bool {
        if !self.config.multisite {
            return false;
        }
        let raw = self.settings.flag(SettingScope::Network, keys::PROTECT).await;
        self.hooks.network_protected.apply(raw, &())
    }

    pub async fn is_user_allowed_for_network(&self, user_id: UserId) -> bool {
        let listed = self
            .settings
            .ids(SettingScope::Network, keys::ALLOWED_USERS)
            .await
            .contains(&user_id);
        let allowed = self.hooks.network_user_allowed.apply(listed, &user_id);

        allowed || self.is_super_admin(user_id).await
    }

    /// When set, per-site protection is inert everywhere.
    pub async fn is_network_only(&self) -> bool {
        if !self.config.multisite {
            return false;
        }
        let raw = self.settings.flag(SettingScope::Network, keys::NETWORK_ONLY).await;
        self.hooks.network_only.apply(raw, &())
    }

    pub async fn is_main_site_exempt(&self, site_id: SiteId) -> bool {
        self.config.multisite
            && site_id == self.config.main_site_id
            && self.settings.flag(SettingScope::Network, keys::EXEMPT_MAIN_SITE).await
    }

    pub async fn redirect_enabled(&self) -> bool {
        self.config.multisite && self.settings.flag(SettingScope::Network, keys::REDIRECT).await
    }

    pub async fn hide_my_sites_enabled(&self) -> bool {
        self.config.multisite && self.settings.flag(SettingScope::Network, keys::HIDE_MY_SITES).await
    }

    /// Directory failures count as "not an administrator".
    pub async fn is_super_admin(&self, user_id: UserId) -> bool {
        if !self.config.multisite {
            return false;
        }
        match self.directory.is_super_admin(user_id).await {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(error = %err, user_id, "super admin lookup failed");
                false
            }
        }
    }

    async fn is_site_administrator(&self, user_id: UserId, site_id: SiteId) -> bool {
        match self.directory.is_site_admin(user_id, site_id).await {
            Ok(true) => return true,
            Ok(false) => {}
            Err(err) => {
                tracing::warn!(error = %err, user_id, site_id, "site admin lookup failed");
            }
        }
        self.is_super_admin(user_id).await
    }

    pub async fn network_blocks(&self, visitor: &Visitor, site_id: SiteId) -> bool {
        if !self.is_network_protected().await {
            return false;
        }
        if self.is_main_site_exempt(site_id).await {
            tracing::debug!(site_id, "main site exempt from network protection");
            return false;
        }
        !self.is_user_allowed_for_network(visitor.user_id).await
    }

    pub async fn site_blocks(&self, visitor: &Visitor, site_id: SiteId) -> bool {
        if self.is_network_only().await {
            return false;
        }
        if !self.is_site_protected(site_id).await {
            return false;
        }
        if !visitor.is_authenticated() {
            return true;
        }
        !self.is_user_allowed_for_site(visitor.user_id, site_id).await
    }

    pub async fn evaluate(&self, visitor: &Visitor, site_id: SiteId) -> AccessDecision {
        let decision = if self.network_blocks(visitor, site_id).await {
            AccessDecision::Blocked(BlockScope::Network)
        } else if self.site_blocks(visitor, site_id).await {
            AccessDecision::Blocked(BlockScope::Site)
        } else {
            AccessDecision::Allowed
        };

        tracing::debug!(
            user_id = visitor.user_id,
            site_id,
            decision = ?decision,
            "access evaluated"
        );
        decision
    }

    /// Custom login notices, network first.
    pub async fn login_messages(&self, site_id: Option<SiteId>) -> Vec<String> {
        let mut messages = Vec::new();

        if self.is_network_protected().await {
            messages.extend(self.settings.text(SettingScope::Network, keys::LOGIN_MESSAGE).await);
        }

        if let Some(site_id) = site_id {
            if !self.is_network_only().await && self.is_site_protected(site_id).await {
                messages.extend(self.settings.text(SettingScope::Site(site_id), keys::LOGIN_MESSAGE).await);
            }
        }

        messages
    }
}
