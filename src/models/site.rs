use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use super::SiteId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Site {
    pub id: SiteId,
    #[schema(example = "Field Notes")]
    pub name: String,
    #[schema(example = "https://notes.example.com/")]
    pub url: String,
    /// Archived, spammed or deleted sites stay in the table but are hidden
    /// from membership listings.
    pub hidden: bool,
}

impl Site {
    pub fn new(id: SiteId, name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            url: url.into(),
            hidden: false,
        }
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbPage {
    pub site_id: SiteId,
    pub path: String,
    pub title: String,
    pub body: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct Page {
    pub site_id: SiteId,
    pub path: String,
    pub title: String,
    pub body: String,
}

impl From<DbPage> for Page {
    fn from(value: DbPage) -> Self {
        Page {
            site_id: value.site_id,
            path: value.path,
            title: value.title,
            body: value.body,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MySitesResponse {
    pub sites: Vec<Site>,
    /// Presentation hint for navigation; access is still enforced per request.
    pub hide_navigation: bool,
}
