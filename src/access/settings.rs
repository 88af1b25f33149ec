use std::collections::BTreeSet;
use std::sync::Arc;

use super::AccessError;
use crate::store::{ConfigStore, SettingScope, SettingValue};

/// Typed, fail-open reads over a [`ConfigStore`].
///
/// Read errors and values of the wrong kind are logged and read as
/// "unset": `false` for flags, an empty allow-list, no message.
#[derive(Clone)]
pub struct SettingsReader {
    store: Arc<dyn ConfigStore>,
}

impl SettingsReader {
    pub fn new(store: Arc<dyn ConfigStore>) -> Self {
        Self { store }
    }

    async fn fetch<T>(
        &self,
        scope: SettingScope,
        key: &str,
        expected: &'static str,
        extract: impl FnOnce(&SettingValue) -> Option<T>,
    ) -> Result<Option<T>, AccessError> {
        let value = self
            .store
            .setting(scope, key)
            .await
            .map_err(|err| AccessError::configuration(scope, key, err.to_string()))?;

        match value {
            None => Ok(None),
            Some(value) => extract(&value).map(Some).ok_or_else(|| {
                AccessError::configuration(scope, key, format!("expected {expected}, found {}", value.kind()))
            }),
        }
    }

    async fn read_or_default<T: Default>(
        &self,
        scope: SettingScope,
        key: &str,
        expected: &'static str,
        extract: impl FnOnce(&SettingValue) -> Option<T>,
    ) -> T {
        match self.fetch(scope, key, expected, extract).await {
            Ok(value) => value.unwrap_or_default(),
            Err(err) => {
                tracing::warn!(error = %err, "reading setting as unset");
                T::default()
            }
        }
    }

    pub async fn flag(&self, scope: SettingScope, key: &str) -> bool {
        self.read_or_default(scope, key, "bool", SettingValue::as_bool).await
    }

    pub async fn ids(&self, scope: SettingScope, key: &str) -> BTreeSet<i64> {
        self.read_or_default(scope, key, "id list", |value| {
            value.as_ids().map(|ids| ids.iter().copied().collect())
        })
        .await
    }

    /// Blank text reads as `None`.
    pub async fn text(&self, scope: SettingScope, key: &str) -> Option<String> {
        let text: String = self
            .read_or_default(scope, key, "text", |value| value.as_text().map(str::to_string))
            .await;
        Some(text).filter(|text| !text.trim().is_empty())
    }
}
