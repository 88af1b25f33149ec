use super::{AccessEngine, AccessError, Visitor};
use crate::models::site::Site;
use crate::models::SiteId;

/// Navigation entry points are hidden when fewer sites than this remain.
pub const HIDE_MY_SITES_BELOW: usize = 2;

/// Narrows a user's site list to the sites they can actually reach, using
/// the same precedence as the request guard.
#[derive(Clone)]
pub struct SiteListFilter {
    engine: AccessEngine,
}

impl SiteListFilter {
    pub fn new(engine: AccessEngine) -> Self {
        Self { engine }
    }

    /// Sites from the visitor's memberships they may view. Membership
    /// lookup failures yield an empty list.
    pub async fn sites_for(&self, visitor: &Visitor) -> Vec<Site> {
        match self.engine.directory().sites_of_user(visitor.user_id, false).await {
            Ok(candidates) => self.filter(visitor, &candidates).await,
            Err(err) => {
                tracing::warn!(error = %err, user_id = visitor.user_id, "site membership lookup failed");
                Vec::new()
            }
        }
    }

    /// Sites that cannot be evaluated are skipped; the rest are kept in order.
    pub async fn filter(&self, visitor: &Visitor, candidates: &[SiteId]) -> Vec<Site> {
        let mut visible = Vec::with_capacity(candidates.len());

        for &site_id in candidates {
            match self.evaluate(visitor, site_id).await {
                Ok(Some(site)) => visible.push(site),
                Ok(None) => {}
                Err(err) => tracing::warn!(error = %err, user_id = visitor.user_id, "skipping site"),
            }
        }

        visible
    }

    async fn evaluate(&self, visitor: &Visitor, site_id: SiteId) -> Result<Option<Site>, AccessError> {
        let site = self
            .engine
            .directory()
            .site(site_id)
            .await
            .map_err(|err| AccessError::tenant(site_id, err.to_string()))?
            .ok_or_else(|| AccessError::tenant(site_id, "site no longer exists"))?;

        if self.engine.network_blocks(visitor, site_id).await || self.engine.site_blocks(visitor, site_id).await {
            return Ok(None);
        }
        Ok(Some(site))
    }

    /// Presentation hint for the "My Sites" menu. Never an access decision.
    pub async fn hide_my_sites(&self, visitor: &Visitor, visible_sites: usize) -> bool {
        let hide = self.engine.hide_my_sites_enabled().await
            && !self.engine.is_super_admin(visitor.user_id).await
            && visible_sites < HIDE_MY_SITES_BELOW;

        self.engine.hooks().hide_my_sites.apply(hide, &visitor.user_id)
    }
}
