use serde::{Deserialize, Serialize};

/// Severity levels for activity logs.
/// Controls retention policies and log filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Critical events: long-term retention, never auto-delete
    Critical,
    /// Important events: medium-term retention (default)
    #[default]
    Important,
    /// Noise events: aggressively trimmed
    Noise,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::Important => "important",
            Severity::Noise => "noise",
        }
    }
}

/// Implement on anything that should land in the activity log.
pub trait Loggable: Serialize + Send + Sync {
    /// Prefix of event names, e.g. `site_settings` in `site_settings.updated`
    fn entity_type() -> &'static str;

    /// Site or user the event is about, if any
    fn subject_id(&self) -> Option<i64>;

    fn severity(&self) -> Severity {
        Severity::Important
    }
}
