//! Admin screens for protection settings.
//!
//! Authorization here reads the directory strictly: a failed lookup is an
//! error, never an implicit grant.

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;

use crate::app::AppState;
use crate::errors::{AppError, AppResult};
use crate::events::{log_activity_with_context, RequestContext};
use crate::jwt::AuthUser;
use crate::models::settings::{NetworkSettings, NetworkSettingsUpdate, SiteSettings, SiteSettingsUpdate};
use crate::models::{SiteId, UserId};
use crate::store::{keys, ConfigStore, Directory, SettingScope, SqliteStore, StoreError};

async fn require_super_admin(state: &AppState, user_id: UserId) -> AppResult<()> {
    if state.store.is_super_admin(user_id).await? {
        return Ok(());
    }
    Err(AppError::forbidden("network settings require a super admin"))
}

async fn require_site_admin(state: &AppState, user_id: UserId, site_id: SiteId) -> AppResult<()> {
    if state.store.site(site_id).await?.is_none() {
        return Err(AppError::not_found(format!("site {site_id}")));
    }
    if state.store.is_site_admin(user_id, site_id).await? || state.store.is_super_admin(user_id).await? {
        return Ok(());
    }
    Err(AppError::forbidden(format!("not an administrator of site {site_id}")))
}

async fn read_flag(store: &SqliteStore, scope: SettingScope, key: &str) -> Result<bool, StoreError> {
    Ok(store.setting(scope, key).await?.and_then(|value| value.as_bool()).unwrap_or(false))
}

async fn read_ids(store: &SqliteStore, scope: SettingScope) -> Result<Vec<UserId>, StoreError> {
    Ok(store
        .setting(scope, keys::ALLOWED_USERS)
        .await?
        .and_then(|value| value.as_ids().map(<[UserId]>::to_vec))
        .unwrap_or_default())
}

async fn read_text(store: &SqliteStore, scope: SettingScope) -> Result<Option<String>, StoreError> {
    Ok(store
        .setting(scope, keys::LOGIN_MESSAGE)
        .await?
        .and_then(|value| value.as_text().map(str::to_string))
        .filter(|text| !text.is_empty()))
}

async fn load_site_settings(store: &SqliteStore, site_id: SiteId) -> Result<SiteSettings, StoreError> {
    let scope = SettingScope::Site(site_id);
    Ok(SiteSettings {
        site_id,
        protect: read_flag(store, scope, keys::PROTECT).await?,
        allowed_users: read_ids(store, scope).await?,
        login_message: read_text(store, scope).await?,
    })
}

async fn load_network_settings(store: &SqliteStore) -> Result<NetworkSettings, StoreError> {
    let scope = SettingScope::Network;
    Ok(NetworkSettings {
        protect: read_flag(store, scope, keys::PROTECT).await?,
        network_only: read_flag(store, scope, keys::NETWORK_ONLY).await?,
        redirect: read_flag(store, scope, keys::REDIRECT).await?,
        hide_my_sites: read_flag(store, scope, keys::HIDE_MY_SITES).await?,
        exempt_main_site: read_flag(store, scope, keys::EXEMPT_MAIN_SITE).await?,
        allowed_users: read_ids(store, scope).await?,
        login_message: read_text(store, scope).await?,
    })
}

#[utoipa::path(
    get,
    path = "/settings/network",
    tag = "Settings",
    responses(
        (status = 200, description = "Network protection settings", body = NetworkSettings),
        (status = 403, description = "Caller is not a super admin")
    )
)]
pub async fn get_network_settings(State(state): State<AppState>, auth: AuthUser) -> AppResult<Json<NetworkSettings>> {
    require_super_admin(&state, auth.user_id).await?;
    Ok(Json(load_network_settings(&state.store).await?))
}

#[utoipa::path(
    put,
    path = "/settings/network",
    tag = "Settings",
    request_body = NetworkSettingsUpdate,
    responses(
        (status = 200, description = "Settings saved", body = NetworkSettings),
        (status = 400, description = "Invalid allow-list"),
        (status = 403, description = "Caller is not a super admin")
    )
)]
pub async fn update_network_settings(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Json(payload): Json<NetworkSettingsUpdate>,
) -> AppResult<Json<NetworkSettings>> {
    require_super_admin(&state, auth.user_id).await?;

    let changes = payload.into_map()?;
    state.store.save_network_settings(&changes).await?;
    let saved = load_network_settings(&state.store).await?;

    tracing::info!(user_id = auth.user_id, keys = changes.len(), "network settings saved");
    log_activity_with_context(
        &state.event_bus,
        "updated",
        Some(auth.user_id),
        &saved,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(saved))
}

#[utoipa::path(
    get,
    path = "/settings/sites/{site_id}",
    tag = "Settings",
    params(("site_id" = i64, Path, description = "Site id")),
    responses(
        (status = 200, description = "Site protection settings", body = SiteSettings),
        (status = 403, description = "Caller does not administer the site"),
        (status = 404, description = "Site not found")
    )
)]
pub async fn get_site_settings(
    State(state): State<AppState>,
    Path(site_id): Path<SiteId>,
    auth: AuthUser,
) -> AppResult<Json<SiteSettings>> {
    require_site_admin(&state, auth.user_id, site_id).await?;
    Ok(Json(load_site_settings(&state.store, site_id).await?))
}

#[utoipa::path(
    put,
    path = "/settings/sites/{site_id}",
    tag = "Settings",
    params(("site_id" = i64, Path, description = "Site id")),
    request_body = SiteSettingsUpdate,
    responses(
        (status = 200, description = "Settings saved", body = SiteSettings),
        (status = 400, description = "Invalid allow-list"),
        (status = 403, description = "Caller does not administer the site"),
        (status = 404, description = "Site not found")
    )
)]
pub async fn update_site_settings(
    State(state): State<AppState>,
    Path(site_id): Path<SiteId>,
    auth: AuthUser,
    headers: HeaderMap,
    Json(payload): Json<SiteSettingsUpdate>,
) -> AppResult<Json<SiteSettings>> {
    require_site_admin(&state, auth.user_id, site_id).await?;

    let changes = payload.into_map()?;
    state.store.save_site_settings(site_id, &changes).await?;
    let saved = load_site_settings(&state.store, site_id).await?;

    tracing::info!(user_id = auth.user_id, site_id, keys = changes.len(), "site settings saved");
    log_activity_with_context(
        &state.event_bus,
        "updated",
        Some(auth.user_id),
        &saved,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(saved))
}
