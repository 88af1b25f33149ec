use axum::extract::State;
use axum::Json;

use crate::access::Visitor;
use crate::app::AppState;
use crate::jwt::AuthUser;
use crate::models::site::MySitesResponse;

/// Sites of the current user that they can actually enter.
#[utoipa::path(
    get,
    path = "/my-sites",
    tag = "Sites",
    responses(
        (status = 200, description = "Reachable member sites and the navigation hint", body = MySitesResponse),
        (status = 401, description = "No valid session")
    )
)]
pub async fn my_sites(State(state): State<AppState>, auth: AuthUser) -> Json<MySitesResponse> {
    let visitor = Visitor::new(auth.user_id);
    let site_list = state.portier.site_list();

    let sites = site_list.sites_for(&visitor).await;
    let hide_navigation = site_list.hide_my_sites(&visitor, sites.len()).await;

    Json(MySitesResponse { sites, hide_navigation })
}
