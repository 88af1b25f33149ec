use url::Url;

use super::{AccessEngine, AccessError, RedirectContext, Visitor};
use crate::models::site::Site;
use crate::models::SiteId;

/// Picks a fallback destination for visitors blocked by network protection.
///
/// Candidates are re-checked against site protection so the visitor is
/// not sent somewhere that would block them again, and the site being
/// requested is never a candidate.
#[derive(Clone)]
pub struct NetworkRedirectResolver {
    engine: AccessEngine,
}

impl NetworkRedirectResolver {
    pub fn new(engine: AccessEngine) -> Self {
        Self { engine }
    }

    /// `None` means "fall back to the login redirect".
    pub async fn resolve(&self, visitor: &Visitor, current_site: SiteId) -> Option<String> {
        let candidate = if visitor.is_authenticated() {
            self.primary_site_target(visitor, current_site).await
        } else {
            self.network_home_target(current_site).await
        };

        let ctx = RedirectContext {
            user_id: visitor.user_id,
            site_id: current_site,
        };
        let target = self.engine.hooks().redirect_target.apply(candidate, &ctx)?;

        match validate_target(&target) {
            Ok(url) => {
                tracing::debug!(user_id = visitor.user_id, site_id = current_site, location = %url, "network fallback redirect");
                Some(url)
            }
            Err(err) => {
                tracing::warn!(error = %err, "falling back to login redirect");
                None
            }
        }
    }

    async fn primary_site_target(&self, visitor: &Visitor, current_site: SiteId) -> Option<String> {
        let primary = match self.engine.directory().primary_site(visitor.user_id).await {
            Ok(primary) => primary?,
            Err(err) => {
                tracing::warn!(error = %err, user_id = visitor.user_id, "primary site lookup failed");
                return None;
            }
        };
        if primary == current_site {
            return None;
        }

        let site = self.reachable_site(primary).await?;
        if self.engine.site_blocks(visitor, site.id).await {
            return None;
        }
        Some(site.url)
    }

    async fn network_home_target(&self, current_site: SiteId) -> Option<String> {
        let home = self.engine.config().main_site_id;
        if home == current_site {
            return None;
        }

        let site = self.reachable_site(home).await?;
        let anonymous = Visitor::anonymous();
        if self.engine.network_blocks(&anonymous, site.id).await || self.engine.site_blocks(&anonymous, site.id).await {
            return None;
        }
        Some(site.url)
    }

    async fn reachable_site(&self, site_id: SiteId) -> Option<Site> {
        match self.engine.directory().site(site_id).await {
            Ok(Some(site)) if !site.hidden => Some(site),
            Ok(_) => None,
            Err(err) => {
                tracing::warn!(error = %err, site_id, "site lookup failed");
                None
            }
        }
    }
}

fn validate_target(target: &str) -> Result<String, AccessError> {
    let trimmed = target.trim();
    if trimmed.is_empty() {
        return Err(AccessError::redirect(target, "empty target"));
    }

    let url = Url::parse(trimmed).map_err(|err| AccessError::redirect(target, err.to_string()))?;
    match url.scheme() {
        "http" | "https" if url.has_host() => Ok(url.into()),
        _ => Err(AccessError::redirect(target, "not an absolute http(s) url")),
    }
}
