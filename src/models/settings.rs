use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{SiteId, UserId};
use crate::errors::AppError;
use crate::events::{Loggable, Severity};
use crate::store::{keys, SettingValue, SettingsMap};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SiteSettings {
    pub site_id: SiteId,
    pub protect: bool,
    pub allowed_users: Vec<UserId>,
    pub login_message: Option<String>,
}

impl Loggable for SiteSettings {
    fn entity_type() -> &'static str {
        "site_settings"
    }

    fn subject_id(&self) -> Option<i64> {
        Some(self.site_id)
    }

    fn severity(&self) -> Severity {
        Severity::Critical
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct NetworkSettings {
    pub protect: bool,
    /// Disables every per-site protection in favour of the network rule.
    pub network_only: bool,
    /// Send blocked visitors to a reachable site instead of the login screen.
    pub redirect: bool,
    pub hide_my_sites: bool,
    pub exempt_main_site: bool,
    pub allowed_users: Vec<UserId>,
    pub login_message: Option<String>,
}

impl Loggable for NetworkSettings {
    fn entity_type() -> &'static str {
        "network_settings"
    }

    fn subject_id(&self) -> Option<i64> {
        None
    }

    fn severity(&self) -> Severity {
        Severity::Critical
    }
}

/// Partial update; absent fields keep their stored value.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct SiteSettingsUpdate {
    #[schema(example = true)]
    pub protect: Option<bool>,
    #[schema(example = json!([42, 7]))]
    pub allowed_users: Option<Vec<UserId>>,
    #[schema(example = "This site is for project members only.")]
    pub login_message: Option<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct NetworkSettingsUpdate {
    pub protect: Option<bool>,
    pub network_only: Option<bool>,
    pub redirect: Option<bool>,
    pub hide_my_sites: Option<bool>,
    pub exempt_main_site: Option<bool>,
    pub allowed_users: Option<Vec<UserId>>,
    pub login_message: Option<String>,
}

fn put_flag(map: &mut SettingsMap, key: &str, value: Option<bool>) {
    if let Some(value) = value {
        map.insert(key.to_string(), SettingValue::Bool(value));
    }
}

fn put_users(map: &mut SettingsMap, users: Option<Vec<UserId>>) -> Result<(), AppError> {
    let Some(mut users) = users else {
        return Ok(());
    };
    if let Some(invalid) = users.iter().find(|id| **id <= 0) {
        return Err(AppError::bad_request(format!("invalid user id {invalid}")));
    }
    users.sort_unstable();
    users.dedup();
    map.insert(keys::ALLOWED_USERS.to_string(), SettingValue::IdList(users));
    Ok(())
}

fn put_message(map: &mut SettingsMap, message: Option<String>) {
    if let Some(message) = message {
        map.insert(keys::LOGIN_MESSAGE.to_string(), SettingValue::Text(message.trim().to_string()));
    }
}

impl SiteSettingsUpdate {
    pub fn into_map(self) -> Result<SettingsMap, AppError> {
        let mut map = SettingsMap::new();
        put_flag(&mut map, keys::PROTECT, self.protect);
        put_users(&mut map, self.allowed_users)?;
        put_message(&mut map, self.login_message);
        Ok(map)
    }
}

impl NetworkSettingsUpdate {
    pub fn into_map(self) -> Result<SettingsMap, AppError> {
        let mut map = SettingsMap::new();
        put_flag(&mut map, keys::PROTECT, self.protect);
        put_flag(&mut map, keys::NETWORK_ONLY, self.network_only);
        put_flag(&mut map, keys::REDIRECT, self.redirect);
        put_flag(&mut map, keys::HIDE_MY_SITES, self.hide_my_sites);
        put_flag(&mut map, keys::EXEMPT_MAIN_SITE, self.exempt_main_site);
        put_users(&mut map, self.allowed_users)?;
        put_message(&mut map, self.login_message);
        Ok(map)
    }
}
