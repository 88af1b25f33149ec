use std::sync::Arc;

use axum::{routing::get, Json, Router};
use serde_json::{json, Map, Value};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::models;
use crate::routes;

#[derive(OpenApi)]
#[openapi(
    paths(
        routes::auth::login,
        routes::auth::logout,
        routes::auth::me,
        routes::auth::login_screen,
        routes::pages::front_page,
        routes::pages::page,
        routes::sites::my_sites,
        routes::settings::get_network_settings,
        routes::settings::update_network_settings,
        routes::settings::get_site_settings,
        routes::settings::update_site_settings,
        routes::health::health
    ),
    components(
        schemas(
            models::user::User,
            models::user::AuthResponse,
            models::user::LoginRequest,
            models::user::LoginScreen,
            models::site::Site,
            models::site::Page,
            models::site::MySitesResponse,
            models::settings::SiteSettings,
            models::settings::SiteSettingsUpdate,
            models::settings::NetworkSettings,
            models::settings::NetworkSettingsUpdate,
            routes::auth::MessageResponse,
            routes::health::HealthResponse
        )
    ),
    tags(
        (name = "Auth", description = "Sessions and the login screen"),
        (name = "Pages", description = "Guarded site content"),
        (name = "Sites", description = "Site listings filtered by access"),
        (name = "Settings", description = "Site and network protection settings"),
        (name = "Health", description = "Liveness")
    )
)]
pub struct ApiDoc;

pub fn build_openapi(port: u16) -> anyhow::Result<utoipa::openapi::OpenApi> {
    let mut doc = serde_json::to_value(ApiDoc::openapi())?;

    ensure_security_components(&mut doc)?;
    ensure_global_security(&mut doc)?;
    ensure_servers(&mut doc, port);

    Ok(serde_json::from_value(doc)?)
}

pub fn swagger_routes(doc: utoipa::openapi::OpenApi) -> anyhow::Result<Router> {
    let swagger_config = utoipa_swagger_ui::Config::new(["/api-docs/openapi.json"])
        .try_it_out_enabled(true)
        .with_credentials(true)
        .persist_authorization(true);

    let doc_json = Arc::new(serde_json::to_value(&doc)?);

    let json_route = get(move || {
        let doc_json = Arc::clone(&doc_json);
        async move { Json((*doc_json).clone()) }
    });

    Ok(Router::new()
        .route("/api-docs/openapi.json", json_route)
        .merge(SwaggerUi::new("/docs").config(swagger_config)))
}

fn root_object(doc: &mut Value) -> anyhow::Result<&mut Map<String, Value>> {
    doc.as_object_mut()
        .ok_or_else(|| anyhow::anyhow!("OpenAPI root must be an object"))
}

fn ensure_security_components(doc: &mut Value) -> anyhow::Result<()> {
    let components = root_object(doc)?
        .entry("components")
        .or_insert_with(|| Value::Object(Map::new()))
        .as_object_mut()
        .ok_or_else(|| anyhow::anyhow!("components must be an object"))?;

    let schemes = components
        .entry("securitySchemes")
        .or_insert_with(|| Value::Object(Map::new()))
        .as_object_mut()
        .ok_or_else(|| anyhow::anyhow!("securitySchemes must be an object"))?;

    schemes.insert(
        "bearerAuth".to_string(),
        json!({
            "type": "http",
            "scheme": "bearer",
            "bearerFormat": "JWT"
        }),
    );
    schemes.insert(
        "sessionCookie".to_string(),
        json!({
            "type": "apiKey",
            "in": "cookie",
            "name": crate::jwt::SESSION_COOKIE
        }),
    );

    Ok(())
}

fn ensure_global_security(doc: &mut Value) -> anyhow::Result<()> {
    root_object(doc)?
        .entry("security")
        .or_insert_with(|| json!([{ "bearerAuth": [] }, { "sessionCookie": [] }]));
    Ok(())
}

fn ensure_servers(doc: &mut Value, port: u16) {
    let server_url = format!("http://localhost:{port}");

    match doc.get_mut("servers") {
        Some(Value::Array(servers)) => {
            let present = servers
                .iter()
                .any(|server| server.get("url").and_then(Value::as_str) == Some(server_url.as_str()));
            if !present {
                servers.push(json!({ "url": server_url }));
            }
        }
        _ => {
            doc["servers"] = json!([{ "url": server_url }]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn servers_are_not_duplicated() {
        let mut doc = json!({ "servers": [{ "url": "http://localhost:8000" }] });
        ensure_servers(&mut doc, 8000);
        ensure_servers(&mut doc, 9000);

        let urls: Vec<&str> = doc["servers"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|server| server["url"].as_str())
            .collect();
        assert_eq!(urls, ["http://localhost:8000", "http://localhost:9000"]);
    }
}
