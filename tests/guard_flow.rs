mod common;

use anyhow::Result;
use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use portier::{Hooks, PortierConfig};

use common::{add_member, header, json_body, multisite, seed_user, set_network, set_site, spawn_app, FIRST, SECOND};

#[tokio::test]
async fn anonymous_visitor_on_protected_site_is_sent_to_login() -> Result<()> {
    let t = spawn_app(PortierConfig::default(), Hooks::new()).await?;
    set_site(&t.pool, FIRST, "protect", "true").await?;

    let resp = t.get("/sites/2/about?ref=mail").await?;
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(
        header(&resp, "location"),
        "/login?redirect_to=%2Fsites%2F2%2Fabout%3Fref%3Dmail&site_id=2"
    );

    let cookie = header(&resp, "set-cookie");
    assert!(cookie.starts_with("portier_session=;"), "session not cleared: {cookie}");
    assert!(cookie.contains("Max-Age=0"));

    Ok(())
}

#[tokio::test]
async fn listed_user_reads_protected_page() -> Result<()> {
    let t = spawn_app(PortierConfig::default(), Hooks::new()).await?;
    seed_user(&t.pool, 42, "ada", false).await?;
    set_site(&t.pool, FIRST, "protect", "true").await?;
    set_site(&t.pool, FIRST, "allowed_users", "[42]").await?;

    let resp = t.get_as("/sites/2/about", 42).await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let page = json_body(resp).await?;
    assert_eq!(page["title"], "About");

    // Same session carried by cookie instead of a bearer header.
    let req = Request::builder()
        .uri("/sites/2")
        .header("cookie", format!("portier_session={}", common::token(42)))
        .body(Body::empty())?;
    let resp = t.send(req).await?;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(json_body(resp).await?["title"], "Home");

    let resp = t.get_as("/sites/2/about", 7).await?;
    assert_eq!(resp.status(), StatusCode::FOUND);

    Ok(())
}

#[tokio::test]
async fn site_administrators_bypass_the_allow_list() -> Result<()> {
    let t = spawn_app(PortierConfig::default(), Hooks::new()).await?;
    seed_user(&t.pool, 10, "admin", false).await?;
    add_member(&t.pool, 10, FIRST, "administrator").await?;
    set_site(&t.pool, FIRST, "protect", "true").await?;

    let resp = t.get_as("/sites/2/about", 10).await?;
    assert_eq!(resp.status(), StatusCode::OK);

    Ok(())
}

#[tokio::test]
async fn blocked_feed_is_not_found_and_open_feed_is_served() -> Result<()> {
    let t = spawn_app(PortierConfig::default(), Hooks::new()).await?;
    set_site(&t.pool, FIRST, "protect", "true").await?;

    let resp = t.get("/sites/2/feed").await?;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert!(header(&resp, "location").is_empty());

    let resp = t.get("/sites/2?feed=rss2").await?;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = t.get("/sites/3/feed").await?;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(header(&resp, "content-type").starts_with("application/rss+xml"));
    let bytes = body::to_bytes(resp.into_body(), 1_048_576).await?;
    let xml = String::from_utf8(bytes.to_vec())?;
    assert!(xml.contains("<title>Second</title>"));
    assert!(xml.contains("<link>https://second.example.com/about</link>"));

    Ok(())
}

#[tokio::test]
async fn missing_pages_stay_not_found_on_protected_sites() -> Result<()> {
    let t = spawn_app(PortierConfig::default(), Hooks::new()).await?;
    set_site(&t.pool, FIRST, "protect", "true").await?;

    let resp = t.get("/sites/2/no-such-page").await?;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = t.get("/sites/99").await?;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    Ok(())
}

#[tokio::test]
async fn unprotected_sites_are_open_to_everyone() -> Result<()> {
    let t = spawn_app(PortierConfig::default(), Hooks::new()).await?;

    let resp = t.get("/sites/3/about").await?;
    assert_eq!(resp.status(), StatusCode::OK);

    Ok(())
}

#[tokio::test]
async fn network_block_falls_back_to_the_main_site() -> Result<()> {
    let t = spawn_app(multisite(), Hooks::new()).await?;
    set_network(&t.pool, "protect", "true").await?;
    set_network(&t.pool, "redirect", "true").await?;
    set_network(&t.pool, "exempt_main_site", "true").await?;

    let resp = t.get("/sites/2/about").await?;
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(header(&resp, "location"), "https://example.com/");
    assert!(header(&resp, "set-cookie").is_empty());

    // The exempt main site itself stays reachable.
    let resp = t.get("/sites/1").await?;
    assert_eq!(resp.status(), StatusCode::OK);

    Ok(())
}

#[tokio::test]
async fn network_redirect_skips_a_home_site_that_is_also_blocked() -> Result<()> {
    let t = spawn_app(multisite(), Hooks::new()).await?;
    set_network(&t.pool, "protect", "true").await?;
    set_network(&t.pool, "redirect", "true").await?;

    let resp = t.get("/sites/2/about").await?;
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert!(header(&resp, "location").starts_with("/login?"));

    Ok(())
}

#[tokio::test]
async fn network_block_without_redirect_goes_to_login() -> Result<()> {
    let t = spawn_app(multisite(), Hooks::new()).await?;
    seed_user(&t.pool, 42, "ada", false).await?;
    set_network(&t.pool, "protect", "true").await?;
    set_network(&t.pool, "allowed_users", "[7]").await?;

    let resp = t.get_as("/sites/3/about", 42).await?;
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert!(header(&resp, "location").starts_with("/login?"));

    let resp = t.get_as("/sites/3/about", 7).await?;
    assert_eq!(resp.status(), StatusCode::OK);

    Ok(())
}

#[tokio::test]
async fn network_only_mode_ignores_site_protection() -> Result<()> {
    let t = spawn_app(multisite(), Hooks::new()).await?;
    set_site(&t.pool, SECOND, "protect", "true").await?;
    set_network(&t.pool, "network_only", "true").await?;

    let resp = t.get("/sites/3/about").await?;
    assert_eq!(resp.status(), StatusCode::OK);

    Ok(())
}

#[tokio::test]
async fn network_only_mode_applies_only_the_network_allow_list() -> Result<()> {
    let t = spawn_app(multisite(), Hooks::new()).await?;
    set_network(&t.pool, "protect", "true").await?;
    set_network(&t.pool, "network_only", "true").await?;
    set_network(&t.pool, "allowed_users", "[7]").await?;
    set_site(&t.pool, SECOND, "protect", "true").await?;
    set_site(&t.pool, SECOND, "allowed_users", "[42]").await?;

    let resp = t.get_as("/sites/3/about", 7).await?;
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = t.get_as("/sites/3/about", 42).await?;
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert!(header(&resp, "location").starts_with("/login?"));

    Ok(())
}

#[tokio::test]
async fn blocks_are_recorded_in_the_activity_log() -> Result<()> {
    let t = spawn_app(PortierConfig::default(), Hooks::new()).await?;
    set_site(&t.pool, FIRST, "protect", "true").await?;

    let resp = t.get("/sites/2/about").await?;
    assert_eq!(resp.status(), StatusCode::FOUND);

    let mut recorded = 0_i64;
    for _ in 0..100 {
        recorded = sqlx::query_scalar(
            "SELECT COUNT(1) FROM activity_log WHERE event_name = 'access.blocked' AND subject_id = 2",
        )
        .fetch_one(&t.pool)
        .await?;
        if recorded > 0 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    assert_eq!(recorded, 1);

    Ok(())
}
