use axum::extract::{Query, State};
use axum::http::header::SET_COOKIE;
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use utoipa::{IntoParams, ToSchema};

use crate::app::AppState;
use crate::errors::{AppError, AppResult};
use crate::events::{log_activity_with_context, RequestContext};
use crate::jwt::{expired_session_cookie, AuthUser};
use crate::models::user::{AuthResponse, DbUser, LoginRequest, LoginScreen, User};
use crate::models::{SiteId, UserId};
use crate::utils::verify_password;

#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    message: String,
}

type WithCookie<T> = ([(axum::http::HeaderName, String); 1], T);

#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "Auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful; also sets the session cookie", body = AuthResponse),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<LoginRequest>,
) -> AppResult<WithCookie<Json<AuthResponse>>> {
    let db_user = sqlx::query_as::<_, DbUser>(
        "SELECT id, login, display_name, password_hash, is_super_admin, primary_site_id FROM users WHERE login = ?",
    )
    .bind(payload.login.trim())
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| AppError::unauthorized("invalid credentials"))?;

    if !verify_password(&payload.password, &db_user.password_hash)? {
        return Err(AppError::unauthorized("invalid credentials"));
    }

    let token = state.jwt.encode(db_user.id)?;
    let cookie = state.jwt.session_cookie(&token);
    let user = User::from(db_user);

    log_activity_with_context(
        &state.event_bus,
        "login",
        Some(user.id),
        &user,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(([(SET_COOKIE, cookie)], Json(AuthResponse { token, user })))
}

#[utoipa::path(
    post,
    path = "/auth/logout",
    tag = "Auth",
    responses((status = 200, description = "Session cookie cleared", body = MessageResponse))
)]
pub async fn logout() -> WithCookie<Json<MessageResponse>> {
    (
        [(SET_COOKIE, expired_session_cookie())],
        Json(MessageResponse {
            message: "Logged out".to_string(),
        }),
    )
}

#[utoipa::path(
    get,
    path = "/auth/me",
    tag = "Auth",
    responses(
        (status = 200, description = "Current user", body = User),
        (status = 401, description = "No valid session")
    )
)]
pub async fn me(State(state): State<AppState>, auth: AuthUser) -> AppResult<Json<User>> {
    let db_user = fetch_user_by_id(&state.pool, auth.user_id).await?;
    Ok(Json(db_user.into()))
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct LoginScreenQuery {
    /// Site whose login screen is shown.
    pub site_id: Option<SiteId>,
    /// Where to send the visitor after logging in.
    pub redirect_to: Option<String>,
}

#[utoipa::path(
    get,
    path = "/login",
    tag = "Auth",
    params(LoginScreenQuery),
    responses((status = 200, description = "Login screen data with custom notices", body = LoginScreen))
)]
pub async fn login_screen(State(state): State<AppState>, Query(query): Query<LoginScreenQuery>) -> Json<LoginScreen> {
    let messages = state.portier.engine().login_messages(query.site_id).await;

    Json(LoginScreen {
        site_id: query.site_id,
        redirect_to: query.redirect_to,
        messages,
    })
}

async fn fetch_user_by_id(pool: &SqlitePool, user_id: UserId) -> AppResult<DbUser> {
    sqlx::query_as::<_, DbUser>(
        "SELECT id, login, display_name, password_hash, is_super_admin, primary_site_id FROM users WHERE id = ?",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::not_found("user not found"))
}
