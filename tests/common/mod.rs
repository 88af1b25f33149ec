#![allow(dead_code)]

use std::path::Path;

use anyhow::Result;
use axum::body::{self, Body};
use axum::http::{Request, Response};
use axum::Router;
use serde_json::Value;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::SqlitePool;
use tempfile::{tempdir, TempDir};
use tower::util::ServiceExt;

use portier::jwt::JwtConfig;
use portier::{create_app_with, Hooks, PortierConfig};

pub const MAIN: i64 = 1;
pub const FIRST: i64 = 2;
pub const SECOND: i64 = 3;

const SECRET: &str = "test-secret";

pub struct TestApp {
    // Keeps the database file alive for the duration of the test.
    _dir: TempDir,
    pub pool: SqlitePool,
    pub app: Router,
}

impl TestApp {
    pub async fn get(&self, uri: &str) -> Result<Response<Body>> {
        self.send(Request::builder().method("GET").uri(uri).body(Body::empty())?).await
    }

    pub async fn get_as(&self, uri: &str, user_id: i64) -> Result<Response<Body>> {
        let req = Request::builder()
            .method("GET")
            .uri(uri)
            .header("authorization", format!("Bearer {}", token(user_id)))
            .body(Body::empty())?;
        self.send(req).await
    }

    pub async fn put_json_as(&self, uri: &str, user_id: i64, body: Value) -> Result<Response<Body>> {
        let req = Request::builder()
            .method("PUT")
            .uri(uri)
            .header("authorization", format!("Bearer {}", token(user_id)))
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))?;
        self.send(req).await
    }

    pub async fn send(&self, req: Request<Body>) -> Result<Response<Body>> {
        Ok(self.app.clone().oneshot(req).await?)
    }
}

pub fn token(user_id: i64) -> String {
    JwtConfig::new(SECRET, 24).encode(user_id).expect("token encodes")
}

pub async fn spawn_app(config: PortierConfig, hooks: Hooks) -> Result<TestApp> {
    let dir = tempdir()?;
    let opts = SqliteConnectOptions::new()
        .filename(dir.path().join("test.db"))
        .create_if_missing(true);
    let pool = SqlitePool::connect_with(opts).await?;

    let migrator = sqlx::migrate::Migrator::new(Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations")).await?;
    migrator.run(&pool).await?;

    seed_site(&pool, MAIN, "Main", "https://example.com/").await?;
    seed_site(&pool, FIRST, "First", "https://first.example.com/").await?;
    seed_site(&pool, SECOND, "Second", "https://second.example.com/").await?;
    for site in [MAIN, FIRST, SECOND] {
        seed_page(&pool, site, "", "Home").await?;
        seed_page(&pool, site, "about", "About").await?;
    }

    std::env::set_var("JWT_SECRET", SECRET);
    let app = create_app_with(pool.clone(), config, hooks).await?;

    Ok(TestApp { _dir: dir, pool, app })
}

pub fn multisite() -> PortierConfig {
    PortierConfig::default().multisite().with_main_site(MAIN)
}

pub async fn seed_site(pool: &SqlitePool, id: i64, name: &str, url: &str) -> Result<()> {
    sqlx::query("INSERT INTO sites (id, name, url) VALUES (?, ?, ?)")
        .bind(id)
        .bind(name)
        .bind(url)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn seed_page(pool: &SqlitePool, site_id: i64, path: &str, title: &str) -> Result<()> {
    sqlx::query("INSERT INTO pages (site_id, path, title, body) VALUES (?, ?, ?, ?)")
        .bind(site_id)
        .bind(path)
        .bind(title)
        .bind(format!("{title} body"))
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn seed_user(pool: &SqlitePool, id: i64, login: &str, super_admin: bool) -> Result<()> {
    sqlx::query("INSERT INTO users (id, login, display_name, password_hash, is_super_admin) VALUES (?, ?, ?, ?, ?)")
        .bind(id)
        .bind(login)
        .bind(login)
        .bind("unused")
        .bind(super_admin)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn add_member(pool: &SqlitePool, user_id: i64, site_id: i64, role: &str) -> Result<()> {
    sqlx::query("INSERT INTO site_members (user_id, site_id, role) VALUES (?, ?, ?)")
        .bind(user_id)
        .bind(site_id)
        .bind(role)
        .execute(pool)
        .await?;
    Ok(())
}

/// `value` is the JSON text stored for the setting.
pub async fn set_site(pool: &SqlitePool, site_id: i64, key: &str, value: &str) -> Result<()> {
    sqlx::query("INSERT INTO site_settings (site_id, key, value) VALUES (?, ?, ?)")
        .bind(site_id)
        .bind(key)
        .bind(value)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn set_network(pool: &SqlitePool, key: &str, value: &str) -> Result<()> {
    sqlx::query("INSERT INTO network_settings (key, value) VALUES (?, ?)")
        .bind(key)
        .bind(value)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn json_body(resp: Response<Body>) -> Result<Value> {
    let bytes = body::to_bytes(resp.into_body(), 10_485_760).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

pub fn header(resp: &Response<Body>, name: &str) -> String {
    resp.headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string()
}
