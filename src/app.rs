use std::sync::Arc;

use axum::http::Method;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use sqlx::SqlitePool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::access::middleware::guard_pages;
use crate::access::{BlockNotice, Hooks, Portier};
use crate::config::PortierConfig;
use crate::errors::AppError;
use crate::events::{init_event_bus, log_activity, start_activity_listener, EventBus};
use crate::jwt::JwtConfig;
use crate::routes::{auth, health, pages, settings, sites};
use crate::store::SqliteStore;

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub jwt: Arc<JwtConfig>,
    pub portier: Arc<Portier>,
    pub store: Arc<SqliteStore>,
    pub event_bus: EventBus,
}

/// Build the router from environment configuration.
pub async fn create_app(pool: SqlitePool) -> Result<Router, AppError> {
    create_app_with(pool, PortierConfig::from_env()?, Hooks::new()).await
}

/// Build the router with explicit guard configuration and extension hooks.
pub async fn create_app_with(pool: SqlitePool, config: PortierConfig, hooks: Hooks) -> Result<Router, AppError> {
    config.validate()?;
    let jwt = JwtConfig::from_env()?;
    let login_path = config.login_path.clone();

    let (event_bus, rx) = init_event_bus();
    tokio::spawn(start_activity_listener(rx, pool.clone()));

    let bus = event_bus.clone();
    let hooks = hooks.with_pre_block(move |notice: &BlockNotice| {
        let actor = (notice.user_id > 0).then_some(notice.user_id);
        log_activity(&bus, "blocked", actor, notice);
    });

    let store = Arc::new(SqliteStore::new(pool.clone()));
    let portier = Portier::new(config, store.clone(), store.clone(), hooks);

    let state = AppState {
        pool,
        jwt: Arc::new(jwt),
        portier: Arc::new(portier),
        store,
        event_bus,
    };

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_origin(Any)
        .allow_headers(Any);

    // The guard runs after routing so it sees the matched site id.
    let page_routes = Router::new()
        .route("/sites/:site_id", get(pages::front_page))
        .route("/sites/:site_id/*path", get(pages::page))
        .route_layer(middleware::from_fn_with_state(state.clone(), guard_pages));

    let auth_routes = Router::new()
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
        .route("/me", get(auth::me));

    let settings_routes = Router::new()
        .route(
            "/network",
            get(settings::get_network_settings).put(settings::update_network_settings),
        )
        .route(
            "/sites/:site_id",
            get(settings::get_site_settings).put(settings::update_site_settings),
        );

    let router = Router::new()
        .merge(page_routes)
        .route(&login_path, get(auth::login_screen))
        .nest("/auth", auth_routes)
        .route("/my-sites", get(sites::my_sites))
        .nest("/settings", settings_routes)
        .route("/api/health", get(health::health))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    Ok(router)
}
