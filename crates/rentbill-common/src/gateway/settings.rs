//! Runtime settings and flags

use crate::Result;
use async_trait::async_trait;

/// Key/value settings edited by the admin panel and read fresh by the core
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn get_setting(&self, key: &str) -> Result<Option<String>>;

    /// Boolean flag stored as `"1"`/`"0"` (also accepts `true`/`false`)
    async fn get_flag(&self, key: &str, default: bool) -> Result<bool> {
        let value = self.get_setting(key).await?;
        Ok(match value.as_deref().map(str::trim) {
            Some("1") | Some("true") | Some("on") => true,
            Some("0") | Some("false") | Some("off") => false,
            _ => default,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;

    struct MapSettings(HashMap<String, String>);

    #[async_trait]
    impl SettingsStore for MapSettings {
        async fn get_setting(&self, key: &str) -> Result<Option<String>> {
            Ok(self.0.get(key).cloned())
        }
    }

    #[tokio::test]
    async fn test_flag_parsing() {
        let store = MapSettings(HashMap::from([
            ("on".to_string(), "1".to_string()),
            ("off".to_string(), "0".to_string()),
            ("junk".to_string(), "maybe".to_string()),
        ]));

        assert!(store.get_flag("on", false).await.unwrap());
        assert!(!store.get_flag("off", true).await.unwrap());
        assert!(store.get_flag("junk", true).await.unwrap());
        assert!(!store.get_flag("missing", false).await.unwrap());
    }
}
