pub mod settings;
pub mod site;
pub mod user;

/// Integer identifier of a site (tenant).
pub type SiteId = i64;

/// Integer identifier of a user. `0` is the anonymous visitor.
pub type UserId = i64;

/// Reserved id for visitors without a session.
pub const ANONYMOUS_USER_ID: UserId = 0;
