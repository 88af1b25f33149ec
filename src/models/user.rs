use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use super::{SiteId, UserId};
use crate::events::Loggable;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct User {
    pub id: UserId,
    pub login: String,
    pub display_name: String,
    pub is_super_admin: bool,
    pub primary_site_id: Option<SiteId>,
}

impl Loggable for User {
    fn entity_type() -> &'static str {
        "user"
    }

    fn subject_id(&self) -> Option<i64> {
        Some(self.id)
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbUser {
    pub id: UserId,
    pub login: String,
    pub display_name: String,
    pub password_hash: String,
    pub is_super_admin: bool,
    pub primary_site_id: Option<SiteId>,
}

impl From<DbUser> for User {
    fn from(value: DbUser) -> Self {
        User {
            id: value.id,
            login: value.login,
            display_name: value.display_name,
            is_super_admin: value.is_super_admin,
            primary_site_id: value.primary_site_id,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    #[schema(example = "ada")]
    pub login: String,
    #[schema(example = "S3cureP@ssw0rd")]
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AuthResponse {
    pub token: String,
    pub user: User,
}

/// Data for rendering the login screen of a site.
#[derive(Debug, Serialize, ToSchema)]
pub struct LoginScreen {
    pub site_id: Option<SiteId>,
    pub redirect_to: Option<String>,
    /// Custom notices configured by the network and the site, network first.
    pub messages: Vec<String>,
}
