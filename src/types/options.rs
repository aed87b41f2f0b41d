//! Ingestion switches and store connection settings.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants::{
    CONFIG_DIR_ENV, CONFIG_FILE_NAME, DEFAULT_STORE_DB, DEFAULT_STORE_HOST, DEFAULT_STORE_PORT,
};
use crate::error::{IngestError, Result};

/// Tunable behaviour of [`crate::RecordIngestor`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestOptions {
    /// Overwrite an existing task with the same directory instead of skipping it.
    #[serde(default)]
    pub update_duplicates: bool,
    /// Report what would be inserted without touching the store.
    #[serde(default)]
    pub simulate: bool,
    /// Always open a new structure group for optimized structures.
    #[serde(default)]
    pub force_new_group: bool,
}

impl IngestOptions {
    #[must_use]
    pub fn builder() -> IngestOptionsBuilder {
        IngestOptionsBuilder::default()
    }
}

#[derive(Debug, Clone, Default)]
pub struct IngestOptionsBuilder {
    inner: IngestOptions,
}

impl IngestOptionsBuilder {
    #[must_use]
    pub fn update_duplicates(mut self, enabled: bool) -> Self {
        self.inner.update_duplicates = enabled;
        self
    }

    #[must_use]
    pub fn simulate(mut self, enabled: bool) -> Self {
        self.inner.simulate = enabled;
        self
    }

    #[must_use]
    pub fn force_new_group(mut self, enabled: bool) -> Self {
        self.inner.force_new_group = enabled;
        self
    }

    #[must_use]
    pub fn build(self) -> IngestOptions {
        self.inner
    }
}

/// Store connection parameters: `host`, `port`, `db`, `username`, `password`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_db")]
    pub db: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

fn default_host() -> String {
    DEFAULT_STORE_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_STORE_PORT
}

fn default_db() -> String {
    DEFAULT_STORE_DB.to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            db: default_db(),
            username: None,
            password: None,
        }
    }
}

// Passwords stay out of logs.
impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("db", &self.db)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

impl StoreConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let config: Self = serde_json::from_slice(&bytes)?;
        config.validate()?;
        tracing::debug!(
            target = "vasp_ingest::config",
            path = %path.display(),
            host = %config.host,
            db = %config.db,
            "loaded store config"
        );
        Ok(config)
    }

    /// Load `store_db.json` from the directory named by `DB_LOC`.
    pub fn auto_load() -> Result<Self> {
        let dir = std::env::var_os(CONFIG_DIR_ENV).ok_or_else(|| IngestError::InvalidConfig {
            reason: format!("{CONFIG_DIR_ENV} is not set"),
        })?;
        Self::from_file(PathBuf::from(dir).join(CONFIG_FILE_NAME))
    }

    pub fn validate(&self) -> Result<()> {
        if self.db.trim().is_empty() {
            return Err(IngestError::InvalidConfig {
                reason: "db must not be empty".into(),
            });
        }
        if self.db.contains(['/', '\\']) || self.db == ".." {
            return Err(IngestError::InvalidConfig {
                reason: format!("db name '{}' is not a plain name", self.db),
            });
        }
        if self.username.is_some() != self.password.is_some() {
            return Err(IngestError::InvalidConfig {
                reason: "username and password must be given together".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let config: StoreConfig = serde_json::from_str(r#"{"db": "structures"}"#).unwrap();
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 27017);
        assert_eq!(config.db, "structures");
        config.validate().unwrap();
    }

    #[test]
    fn username_without_password_is_rejected() {
        let config = StoreConfig {
            username: Some("ingest".into()),
            ..StoreConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(IngestError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn debug_redacts_password() {
        let config = StoreConfig {
            username: Some("ingest".into()),
            password: Some("hunter2".into()),
            ..StoreConfig::default()
        };
        let shown = format!("{config:?}");
        assert!(!shown.contains("hunter2"));
        assert!(shown.contains("***"));
    }

    #[test]
    fn builder_sets_flags() {
        let opts = IngestOptions::builder()
            .update_duplicates(true)
            .simulate(false)
            .build();
        assert!(opts.update_duplicates);
        assert!(!opts.simulate);
        assert!(!opts.force_new_group);
    }
}
