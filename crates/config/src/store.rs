//! Live configuration storage.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwap;
use tracing::{info, warn};

use crate::error::ConfigError;
use crate::Config;

/// Holds the current configuration and swaps it atomically on reload.
///
/// Readers call [`ConfigStore::current`] and keep the returned `Arc` for as
/// long as they need a consistent view; a concurrent reload never changes
/// a configuration that is already being read.
#[derive(Debug)]
pub struct ConfigStore {
    path: Option<PathBuf>,
    current: ArcSwap<Config>,
}

impl ConfigStore {
    /// Load the configuration at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref().to_path_buf();
        let config = Config::from_file(&path)?;
        Ok(Self {
            path: Some(path),
            current: ArcSwap::from_pointee(config),
        })
    }

    /// Wrap an in-memory configuration. [`ConfigStore::reload`] keeps it as is.
    pub fn from_config(config: Config) -> Self {
        Self {
            path: None,
            current: ArcSwap::from_pointee(config),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn current(&self) -> Arc<Config> {
        self.current.load_full()
    }

    /// Replace the configuration directly.
    pub fn replace(&self, config: Config) {
        self.current.store(Arc::new(config));
    }

    /// Re-read the configuration file.
    ///
    /// On any error the previous configuration stays in effect and the
    /// error is returned. Returns `Ok(true)` when the file content differs
    /// from the active configuration.
    pub fn reload(&self) -> Result<bool, ConfigError> {
        let Some(path) = &self.path else {
            return Ok(false);
        };

        let config = match Config::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "Configuration reload failed, keeping previous configuration"
                );
                return Err(e);
            }
        };

        let changed = *self.current.load_full() != config;
        if changed {
            self.current.store(Arc::new(config));
            info!(path = %path.display(), "Configuration reloaded");
        } else {
            info!(path = %path.display(), "Configuration unchanged after reload");
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn document(access_key: &str) -> String {
        format!(
            r#"
            issuer {{
                command "lego" "--domains" "{{domain}}" "run"
                certificate-path "/certs/{{domain}}.crt"
                key-path "/certs/{{domain}}.key"
            }}
            publisher {{
                access-key "{access_key}"
                secret-key "sk"
            }}
            "#
        )
    }

    fn access_key(store: &ConfigStore) -> String {
        store
            .current()
            .publisher
            .as_ref()
            .map(|p| p.access_key.clone())
            .unwrap_or_default()
    }

    #[test]
    fn test_reload_picks_up_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("autossl.kdl");
        fs::write(&path, document("ak-1")).unwrap();

        let store = ConfigStore::load(&path).unwrap();
        assert_eq!(access_key(&store), "ak-1");
        assert!(!store.reload().unwrap());

        fs::write(&path, document("ak-2")).unwrap();
        assert!(store.reload().unwrap());
        assert_eq!(access_key(&store), "ak-2");
    }

    #[test]
    fn test_failed_reload_keeps_previous() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("autossl.kdl");
        fs::write(&path, document("ak-1")).unwrap();
        let store = ConfigStore::load(&path).unwrap();

        fs::write(&path, "publisher {").unwrap();
        assert!(store.reload().is_err());
        assert_eq!(access_key(&store), "ak-1");

        fs::write(&path, "renewal { workers 1 }").unwrap();
        assert!(matches!(
            store.reload(),
            Err(ConfigError::Validation { .. })
        ));
        assert_eq!(access_key(&store), "ak-1");
    }

    #[test]
    fn test_in_memory_store() {
        let store = ConfigStore::from_config(Config::default());
        assert!(store.path().is_none());
        assert!(!store.reload().unwrap());

        let mut config = Config::default();
        config.renewal.workers = 4;
        store.replace(config);
        assert_eq!(store.current().renewal.workers, 4);
    }
}
