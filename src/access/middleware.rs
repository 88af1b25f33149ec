use std::collections::HashMap;

use axum::extract::{Path, Request, State};
use axum::http::header::{LOCATION, SET_COOKIE};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use super::{Enforcement, PageRequest, Visitor};
use crate::app::AppState;
use crate::jwt::expired_session_cookie;
use crate::models::SiteId;

/// Strip surrounding slashes; the front page is `""`.
pub fn normalize_path(path: Option<&str>) -> String {
    path.unwrap_or_default().trim_matches('/').to_string()
}

/// Route layer for `/sites/:site_id` and `/sites/:site_id/*path`.
pub async fn guard_pages(
    State(state): State<AppState>,
    Path(params): Path<HashMap<String, String>>,
    visitor: Visitor,
    request: Request,
    next: Next,
) -> Response {
    let Some(site_id) = params.get("site_id").and_then(|value| value.parse::<SiteId>().ok()) else {
        return next.run(request).await;
    };
    let path = normalize_path(params.get("path").map(String::as_str));

    let guard = state.portier.guard();
    let kind = guard.classify(site_id, &path, request.uri().query()).await;
    let uri = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    let page = PageRequest {
        visitor,
        site_id,
        uri,
        kind,
    };

    match guard.handle(&page).await {
        Enforcement::Proceed => next.run(request).await,
        Enforcement::NotFound => StatusCode::NOT_FOUND.into_response(),
        Enforcement::Redirect { location } => (StatusCode::FOUND, [(LOCATION, location)]).into_response(),
        Enforcement::Login { location } => (
            StatusCode::FOUND,
            [(LOCATION, location), (SET_COOKIE, expired_session_cookie())],
        )
            .into_response(),
    }
}
