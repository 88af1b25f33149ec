mod common;

use anyhow::Result;
use axum::http::StatusCode;
use portier::{Hooks, PortierConfig};

use common::{json_body, spawn_app};

#[tokio::test]
async fn health_endpoint_reports_db_ok() -> Result<()> {
    let t = spawn_app(PortierConfig::default(), Hooks::new()).await?;

    let resp = t.get("/api/health").await?;
    assert_eq!(resp.status(), StatusCode::OK, "health endpoint did not return 200");

    let v = json_body(resp).await?;
    let db_ok = v.get("db_ok").and_then(|b| b.as_bool()).unwrap_or(false);
    assert!(db_ok, "expected db_ok: true, got: {}", v);
    assert_eq!(v["multisite"], false);

    Ok(())
}
