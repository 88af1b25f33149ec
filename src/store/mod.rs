//! Configuration store and identity directory
//!
//! The access core only reads through these traits. Every call names its
//! scope explicitly (a site id or the network), there is no ambient
//! "current site" to switch and restore.

mod memory;
mod sqlite;

pub use memory::{MemoryStore, MemoryUser};
pub use sqlite::SqliteStore;

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::site::Site;
use crate::models::{SiteId, UserId};

/// Well-known setting keys
pub mod keys {
    // Site and network
    pub const PROTECT: &str = "protect";
    pub const ALLOWED_USERS: &str = "allowed_users";
    pub const LOGIN_MESSAGE: &str = "login_message";

    // Network only
    pub const NETWORK_ONLY: &str = "network_only";
    pub const REDIRECT: &str = "redirect";
    pub const HIDE_MY_SITES: &str = "hide_my_sites";
    pub const EXEMPT_MAIN_SITE: &str = "exempt_main_site";

    pub const SITE_KEYS: &[&str] = &[PROTECT, ALLOWED_USERS, LOGIN_MESSAGE];
    pub const NETWORK_KEYS: &[&str] = &[
        PROTECT,
        NETWORK_ONLY,
        REDIRECT,
        HIDE_MY_SITES,
        EXEMPT_MAIN_SITE,
        ALLOWED_USERS,
        LOGIN_MESSAGE,
    ];
}

/// A stored setting. Persisted as plain JSON (`true`, `3`, `[1,2]`, `"text"`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Bool(bool),
    Int(i64),
    IdList(Vec<i64>),
    Text(String),
}

impl SettingValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SettingValue::Bool(value) => Some(*value),
            SettingValue::Int(value) => Some(*value != 0),
            _ => None,
        }
    }

    pub fn as_ids(&self) -> Option<&[i64]> {
        match self {
            SettingValue::IdList(ids) => Some(ids),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            SettingValue::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SettingValue::Bool(_) => "bool",
            SettingValue::Int(_) => "int",
            SettingValue::IdList(_) => "id list",
            SettingValue::Text(_) => "text",
        }
    }
}

pub type SettingsMap = BTreeMap<String, SettingValue>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingScope {
    Site(SiteId),
    Network,
}

impl fmt::Display for SettingScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingScope::Site(id) => write!(f, "site {id}"),
            SettingScope::Network => f.write_str("network"),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("database error")]
    Database(#[from] sqlx::Error),
    #[error("malformed value for `{key}`: {source}")]
    Malformed {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("unknown site {0}")]
    UnknownSite(SiteId),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Per-site and network-wide settings.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn site_setting(&self, site_id: SiteId, key: &str) -> Result<Option<SettingValue>, StoreError>;

    async fn network_setting(&self, key: &str) -> Result<Option<SettingValue>, StoreError>;

    async fn save_site_settings(&self, site_id: SiteId, settings: &SettingsMap) -> Result<(), StoreError>;

    async fn save_network_settings(&self, settings: &SettingsMap) -> Result<(), StoreError>;

    async fn setting(&self, scope: SettingScope, key: &str) -> Result<Option<SettingValue>, StoreError> {
        match scope {
            SettingScope::Site(site_id) => self.site_setting(site_id, key).await,
            SettingScope::Network => self.network_setting(key).await,
        }
    }
}

/// Identity and site catalog collaborator.
#[async_trait]
pub trait Directory: Send + Sync {
    async fn site(&self, site_id: SiteId) -> Result<Option<Site>, StoreError>;

    /// `path` is normalized: no leading or trailing slash, `""` for the front page.
    async fn page_exists(&self, site_id: SiteId, path: &str) -> Result<bool, StoreError>;

    async fn is_site_admin(&self, user_id: UserId, site_id: SiteId) -> Result<bool, StoreError>;

    async fn is_super_admin(&self, user_id: UserId) -> Result<bool, StoreError>;

    async fn sites_of_user(&self, user_id: UserId, include_hidden: bool) -> Result<Vec<SiteId>, StoreError>;

    async fn primary_site(&self, user_id: UserId) -> Result<Option<SiteId>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setting_values_use_plain_json() {
        let parsed: SettingValue = serde_json::from_str("true").unwrap();
        assert_eq!(parsed, SettingValue::Bool(true));

        let parsed: SettingValue = serde_json::from_str("[4, 2]").unwrap();
        assert_eq!(parsed.as_ids(), Some(&[4, 2][..]));

        let parsed: SettingValue = serde_json::from_str("\"Members only\"").unwrap();
        assert_eq!(parsed.as_text(), Some("Members only"));
        assert_eq!(parsed.as_bool(), None);
    }

    #[test]
    fn integer_flags_read_as_booleans() {
        assert_eq!(SettingValue::Int(1).as_bool(), Some(true));
        assert_eq!(SettingValue::Int(0).as_bool(), Some(false));
        assert_eq!(SettingValue::Text("1".into()).as_bool(), None);
    }
}
