use crate::errors::AppError;
use crate::models::SiteId;

const DEFAULT_LOGIN_PATH: &str = "/login";

/// Prefixes already routed by the service; the login screen cannot live under them.
const RESERVED_PREFIXES: [&str; 7] = [
    "/sites",
    "/auth",
    "/settings",
    "/my-sites",
    "/api",
    "/api-docs",
    "/docs",
];

/// Installation-level settings read once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortierConfig {
    /// Network-scope checks only run on multisite installations.
    pub multisite: bool,
    /// The network's home site, eligible for the main-site exemption.
    pub main_site_id: SiteId,
    pub login_path: String,
}

impl Default for PortierConfig {
    fn default() -> Self {
        Self {
            multisite: false,
            main_site_id: 1,
            login_path: DEFAULT_LOGIN_PATH.to_string(),
        }
    }
}

impl PortierConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let defaults = Self::default();

        let multisite = match std::env::var("PORTIER_MULTISITE") {
            Ok(value) => parse_flag(&value)
                .ok_or_else(|| AppError::configuration("PORTIER_MULTISITE must be true or false"))?,
            Err(_) => defaults.multisite,
        };

        let main_site_id = std::env::var("PORTIER_MAIN_SITE_ID")
            .map(|val| val.parse::<SiteId>())
            .unwrap_or(Ok(defaults.main_site_id))
            .map_err(|_| AppError::configuration("PORTIER_MAIN_SITE_ID must be a valid integer"))?;

        let login_path = std::env::var("PORTIER_LOGIN_PATH").unwrap_or(defaults.login_path);

        let config = Self {
            multisite,
            main_site_id,
            login_path,
        };
        config.validate()?;
        Ok(config)
    }

    /// The login screen is mounted at `login_path`, so it must be a plain
    /// route that does not collide with the service's own routes.
    pub fn validate(&self) -> Result<(), AppError> {
        let path = self.login_path.as_str();
        if !path.starts_with('/') || path.len() < 2 {
            return Err(AppError::configuration("PORTIER_LOGIN_PATH must start with '/' and name a route"));
        }
        if path.contains([':', '*', '?', '#']) {
            return Err(AppError::configuration("PORTIER_LOGIN_PATH must be a plain path"));
        }
        let collides = RESERVED_PREFIXES.iter().any(|prefix| {
            path == *prefix || path.strip_prefix(prefix).is_some_and(|rest| rest.starts_with('/'))
        });
        if collides {
            return Err(AppError::configuration(format!(
                "PORTIER_LOGIN_PATH `{path}` collides with a service route"
            )));
        }
        Ok(())
    }

    pub fn multisite(mut self) -> Self {
        self.multisite = true;
        self
    }

    pub fn with_main_site(mut self, site_id: SiteId) -> Self {
        self.main_site_id = site_id;
        self
    }

    pub fn with_login_path(mut self, path: impl Into<String>) -> Self {
        self.login_path = path.into();
        self
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_accept_common_spellings() {
        assert_eq!(parse_flag("TRUE"), Some(true));
        assert_eq!(parse_flag(" on "), Some(true));
        assert_eq!(parse_flag("0"), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }

    #[test]
    fn builder_overrides_defaults() {
        let config = PortierConfig::default().multisite().with_main_site(4);
        assert!(config.multisite);
        assert_eq!(config.main_site_id, 4);
        assert_eq!(config.login_path, "/login");
    }

    #[test]
    fn login_path_must_be_a_free_plain_route() {
        assert!(PortierConfig::default().validate().is_ok());
        assert!(PortierConfig::default().with_login_path("/account/sign-in").validate().is_ok());
        assert!(PortierConfig::default().with_login_path("/sitesmap").validate().is_ok());

        for bad in ["login", "/", "/auth", "/auth/login", "/sites/1", "/login/:id", "/docs/", "/api-docs/openapi.json"] {
            let err = PortierConfig::default().with_login_path(bad).validate();
            assert!(matches!(err, Err(AppError::Configuration(_))), "accepted `{bad}`");
        }
    }
}
