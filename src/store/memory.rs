use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use super::{ConfigStore, Directory, SettingValue, SettingsMap, StoreError};
use crate::models::site::Site;
use crate::models::{SiteId, UserId};

#[derive(Debug, Clone, Default)]
pub struct MemoryUser {
    pub id: UserId,
    pub is_super_admin: bool,
    pub primary_site_id: Option<SiteId>,
    pub admin_of: BTreeSet<SiteId>,
    pub member_of: BTreeSet<SiteId>,
}

impl MemoryUser {
    pub fn new(id: UserId) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    pub fn super_admin(mut self) -> Self {
        self.is_super_admin = true;
        self
    }

    pub fn with_primary_site(mut self, site_id: SiteId) -> Self {
        self.primary_site_id = Some(site_id);
        self.member_of.insert(site_id);
        self
    }

    pub fn member_of(mut self, sites: impl IntoIterator<Item = SiteId>) -> Self {
        self.member_of.extend(sites);
        self
    }

    pub fn admin_of(mut self, site_id: SiteId) -> Self {
        self.admin_of.insert(site_id);
        self.member_of.insert(site_id);
        self
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    sites: BTreeMap<SiteId, Site>,
    pages: HashSet<(SiteId, String)>,
    users: HashMap<UserId, MemoryUser>,
    site_settings: HashMap<(SiteId, String), SettingValue>,
    network_settings: HashMap<String, SettingValue>,
}

/// In-process store for embedding the guard without a database.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, MemoryState> {
        self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, MemoryState> {
        self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn add_site(&self, site: Site) -> &Self {
        self.write().sites.insert(site.id, site);
        self
    }

    pub fn remove_site(&self, site_id: SiteId) -> &Self {
        self.write().sites.remove(&site_id);
        self
    }

    pub fn add_page(&self, site_id: SiteId, path: &str) -> &Self {
        self.write().pages.insert((site_id, path.to_string()));
        self
    }

    pub fn add_user(&self, user: MemoryUser) -> &Self {
        self.write().users.insert(user.id, user);
        self
    }

    pub fn set_site(&self, site_id: SiteId, key: &str, value: SettingValue) -> &Self {
        self.write().site_settings.insert((site_id, key.to_string()), value);
        self
    }

    pub fn set_network(&self, key: &str, value: SettingValue) -> &Self {
        self.write().network_settings.insert(key.to_string(), value);
        self
    }
}

#[async_trait]
impl ConfigStore for MemoryStore {
    async fn site_setting(&self, site_id: SiteId, key: &str) -> Result<Option<SettingValue>, StoreError> {
        Ok(self.read().site_settings.get(&(site_id, key.to_string())).cloned())
    }

    async fn network_setting(&self, key: &str) -> Result<Option<SettingValue>, StoreError> {
        Ok(self.read().network_settings.get(key).cloned())
    }

    async fn save_site_settings(&self, site_id: SiteId, settings: &SettingsMap) -> Result<(), StoreError> {
        let mut state = self.write();
        if !state.sites.contains_key(&site_id) {
            return Err(StoreError::UnknownSite(site_id));
        }
        for (key, value) in settings {
            state.site_settings.insert((site_id, key.clone()), value.clone());
        }
        Ok(())
    }

    async fn save_network_settings(&self, settings: &SettingsMap) -> Result<(), StoreError> {
        let mut state = self.write();
        for (key, value) in settings {
            state.network_settings.insert(key.clone(), value.clone());
        }
        Ok(())
    }
}

#[async_trait]
impl Directory for MemoryStore {
    async fn site(&self, site_id: SiteId) -> Result<Option<Site>, StoreError> {
        Ok(self.read().sites.get(&site_id).cloned())
    }

    async fn page_exists(&self, site_id: SiteId, path: &str) -> Result<bool, StoreError> {
        Ok(self.read().pages.contains(&(site_id, path.to_string())))
    }

    async fn is_site_admin(&self, user_id: UserId, site_id: SiteId) -> Result<bool, StoreError> {
        Ok(self
            .read()
            .users
            .get(&user_id)
            .map(|user| user.admin_of.contains(&site_id))
            .unwrap_or(false))
    }

    async fn is_super_admin(&self, user_id: UserId) -> Result<bool, StoreError> {
        Ok(self
            .read()
            .users
            .get(&user_id)
            .map(|user| user.is_super_admin)
            .unwrap_or(false))
    }

    async fn sites_of_user(&self, user_id: UserId, include_hidden: bool) -> Result<Vec<SiteId>, StoreError> {
        let state = self.read();
        let Some(user) = state.users.get(&user_id) else {
            return Ok(Vec::new());
        };

        Ok(user
            .member_of
            .iter()
            .copied()
            .filter(|site_id| match state.sites.get(site_id) {
                Some(site) => include_hidden || !site.hidden,
                // Membership rows can outlive their site; callers skip them on lookup.
                None => true,
            })
            .collect())
    }

    async fn primary_site(&self, user_id: UserId) -> Result<Option<SiteId>, StoreError> {
        Ok(self.read().users.get(&user_id).and_then(|user| user.primary_site_id))
    }
}
