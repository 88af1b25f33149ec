//! Page rendering for guarded sites. Access has already been decided by
//! the guard middleware by the time these handlers run.

use axum::extract::{Path, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::Uri;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::access::is_feed;
use crate::access::middleware::normalize_path;
use crate::app::AppState;
use crate::errors::{AppError, AppResult};
use crate::models::site::{DbPage, Page, Site};
use crate::models::SiteId;

#[utoipa::path(
    get,
    path = "/sites/{site_id}",
    tag = "Pages",
    params(("site_id" = i64, Path, description = "Site id")),
    responses(
        (status = 200, description = "Front page", body = Page),
        (status = 302, description = "Blocked: sent to the login screen or another site"),
        (status = 404, description = "No such site or page")
    )
)]
pub async fn front_page(State(state): State<AppState>, Path(site_id): Path<SiteId>, uri: Uri) -> AppResult<Response> {
    render(&state, site_id, "", uri.query()).await
}

#[utoipa::path(
    get,
    path = "/sites/{site_id}/{path}",
    tag = "Pages",
    params(
        ("site_id" = i64, Path, description = "Site id"),
        ("path" = String, Path, description = "Page path; `feed` serves the site feed")
    ),
    responses(
        (status = 200, description = "Page or feed", body = Page),
        (status = 302, description = "Blocked: sent to the login screen or another site"),
        (status = 404, description = "No such page, or a blocked feed")
    )
)]
pub async fn page(
    State(state): State<AppState>,
    Path((site_id, path)): Path<(SiteId, String)>,
    uri: Uri,
) -> AppResult<Response> {
    render(&state, site_id, &normalize_path(Some(&path)), uri.query()).await
}

async fn render(state: &AppState, site_id: SiteId, path: &str, query: Option<&str>) -> AppResult<Response> {
    if is_feed(path, query) {
        return feed(state, site_id).await;
    }

    let page = sqlx::query_as::<_, DbPage>("SELECT site_id, path, title, body FROM pages WHERE site_id = ? AND path = ?")
        .bind(site_id)
        .bind(path)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| AppError::not_found(format!("page `{path}` on site {site_id}")))?;

    Ok(Json(Page::from(page)).into_response())
}

async fn feed(state: &AppState, site_id: SiteId) -> AppResult<Response> {
    let site = sqlx::query_as::<_, Site>("SELECT id, name, url, hidden FROM sites WHERE id = ?")
        .bind(site_id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| AppError::not_found(format!("site {site_id}")))?;

    let pages = sqlx::query_as::<_, DbPage>("SELECT site_id, path, title, body FROM pages WHERE site_id = ? ORDER BY path")
        .bind(site_id)
        .fetch_all(&state.pool)
        .await?;

    let base = site.url.trim_end_matches('/');
    let mut items = String::new();
    for page in &pages {
        items.push_str(&format!(
            "<item><title>{}</title><link>{}/{}</link></item>",
            escape_xml(&page.title),
            escape_xml(base),
            escape_xml(&page.path)
        ));
    }

    let body = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?><rss version=\"2.0\"><channel><title>{}</title><link>{}</link>{}</channel></rss>",
        escape_xml(&site.name),
        escape_xml(&site.url),
        items
    );

    Ok(([(CONTENT_TYPE, "application/rss+xml; charset=utf-8")], body).into_response())
}

fn escape_xml(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
