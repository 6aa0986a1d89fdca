//! Hierarchical configuration loader with precedence
//!
//! Loads configuration from multiple sources with the following precedence (low to high):
//! 1. Built-in defaults
//! 2. Config file (explicit path, else ./creel.yaml, else ~/.creel/config.yaml)
//! 3. Environment variables (CREEL_* prefix, plus the Supabase variables the
//!    web application already exports)
//! 4. CLI flags (handled by caller)

use crate::config::types::{BucketSpec, CreelConfig};
use crate::error::{Error, Result};
use camino::{Utf8Path, Utf8PathBuf};
use std::env;
use std::fs;
use tracing::debug;

/// Configuration file names searched in the working directory
pub const CONFIG_FILE_NAMES: &[&str] = &["creel.yaml", "creel.yml"];

/// Environment variables consulted for the store URL, in order
const URL_VARS: &[&str] = &["CREEL_STORE_URL", "SUPABASE_URL", "VITE_SUPABASE_URL"];

/// Environment variables consulted for the service key, in order
const KEY_VARS: &[&str] = &["CREEL_SERVICE_KEY", "SUPABASE_SERVICE_ROLE_KEY"];

/// Configuration hierarchy loader
pub struct ConfigLoader {
    /// Per-user configuration directory (~/.creel)
    config_dir: Utf8PathBuf,

    /// Directory searched for creel.yaml
    working_dir: Utf8PathBuf,
}

impl ConfigLoader {
    /// Create a loader rooted at ~/.creel and the current directory
    pub fn new() -> Result<Self> {
        let home = crate::utils::get_home_dir()
            .map_err(|e| Error::invalid_config(e.to_string()))?;
        let config_dir = Utf8PathBuf::from_path_buf(home)
            .map_err(|_| Error::invalid_config("Home directory is not valid UTF-8"))?
            .join(".creel");

        let working_dir = env::current_dir()
            .ok()
            .and_then(|p| Utf8PathBuf::from_path_buf(p).ok())
            .unwrap_or_else(|| Utf8PathBuf::from("."));

        Ok(Self {
            config_dir,
            working_dir,
        })
    }

    /// Create a loader with custom directories
    pub fn with_dirs(config_dir: Utf8PathBuf, working_dir: Utf8PathBuf) -> Self {
        Self {
            config_dir,
            working_dir,
        }
    }

    /// Load configuration, applying file and environment layers over the defaults
    pub fn load(&self, explicit: Option<&Utf8Path>) -> Result<CreelConfig> {
        let mut config = match self.locate(explicit)? {
            Some(path) => {
                debug!("Loading configuration from {}", path);
                Self::load_yaml_file(&path)?
            }
            None => {
                debug!("No configuration file found, using defaults");
                CreelConfig::default()
            }
        };

        config = Self::apply_env_overrides(config)?;
        config.validate()?;
        Ok(config)
    }

    /// Resolve which configuration file applies, if any
    pub fn locate(&self, explicit: Option<&Utf8Path>) -> Result<Option<Utf8PathBuf>> {
        if let Some(path) = explicit {
            if !path.exists() {
                return Err(Error::config_not_found(path.as_str()));
            }
            return Ok(Some(path.to_owned()));
        }

        for name in CONFIG_FILE_NAMES {
            let candidate = self.working_dir.join(name);
            if candidate.exists() {
                return Ok(Some(candidate));
            }
        }

        let global = self.config_dir.join("config.yaml");
        if global.exists() {
            return Ok(Some(global));
        }

        Ok(None)
    }

    fn load_yaml_file(path: &Utf8Path) -> Result<CreelConfig> {
        let content = fs::read_to_string(path)?;
        CreelConfig::from_yaml_str(&content)
            .map_err(|e| Error::invalid_config(format!("Failed to parse {}: {}", path, e)))
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(mut config: CreelConfig) -> Result<CreelConfig> {
        if let Some(url) = first_var(URL_VARS) {
            config.store.url = Some(url);
        }

        if let Some(key) = first_var(KEY_VARS) {
            config.store.service_key = Some(key);
        }

        if let Ok(val) = env::var("CREEL_BACKUP_ROOT") {
            config.backup.root = Utf8PathBuf::from(val);
        }

        if let Ok(val) = env::var("CREEL_CONCURRENCY") {
            config.backup.concurrency = val
                .parse()
                .map_err(|_| Error::invalid_config("CREEL_CONCURRENCY must be a valid number"))?;
        }

        if let Ok(val) = env::var("CREEL_INTERVAL_MINUTES") {
            config.schedule.interval_minutes = val.parse().map_err(|_| {
                Error::invalid_config("CREEL_INTERVAL_MINUTES must be a valid number")
            })?;
        }

        if let Ok(val) = env::var("CREEL_TABLES") {
            config.tables = split_list(&val);
        }

        if let Ok(val) = env::var("CREEL_BUCKETS") {
            config.buckets = split_list(&val).into_iter().map(BucketSpec::new).collect();
        }

        Ok(config)
    }

    /// Path of the per-user config file
    pub fn global_config_path(&self) -> Utf8PathBuf {
        self.config_dir.join("config.yaml")
    }
}

fn first_var(names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|name| env::var(name).ok())
        .find(|v| !v.trim().is_empty())
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl CreelConfig {
    /// Parse a YAML document into a configuration
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml_ng::from_str(content)?)
    }

    /// Render the configuration as YAML (the service key is omitted)
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml_ng::to_string(self)?)
    }

    /// Check internal consistency of the configuration
    pub fn validate(&self) -> Result<()> {
        if self.tables.is_empty() {
            return Err(Error::invalid_config("at least one table must be configured"));
        }

        let mut seen = std::collections::HashSet::new();
        for table in &self.tables {
            if table.trim().is_empty() {
                return Err(Error::invalid_config("table names must not be empty"));
            }
            if !seen.insert(table.as_str()) {
                return Err(Error::invalid_config(format!(
                    "table '{}' is listed more than once",
                    table
                )));
            }
        }

        let mut seen = std::collections::HashSet::new();
        for bucket in &self.buckets {
            if bucket.name.trim().is_empty() {
                return Err(Error::invalid_config("bucket names must not be empty"));
            }
            if !seen.insert(bucket.name.as_str()) {
                return Err(Error::invalid_config(format!(
                    "bucket '{}' is listed more than once",
                    bucket.name
                )));
            }
        }

        if self.backup.concurrency == 0 {
            return Err(Error::invalid_config("backup.concurrency must be at least 1"));
        }
        if self.store.page_size == 0 || self.store.insert_batch_size == 0 {
            return Err(Error::invalid_config(
                "store.page-size and store.insert-batch-size must be at least 1",
            ));
        }
        if self.schedule.interval_minutes == 0 {
            return Err(Error::invalid_config(
                "schedule.interval-minutes must be at least 1",
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::invalid_config("retry.max-attempts must be at least 1"));
        }

        Ok(())
    }

    /// Store URL, or an error naming the variables that can provide it
    pub fn require_store_url(&self) -> Result<&str> {
        self.store.url.as_deref().ok_or_else(|| {
            Error::missing_field(format!("store.url (or one of {})", URL_VARS.join(", ")))
        })
    }

    /// Service key, or an error naming the variables that can provide it
    pub fn require_service_key(&self) -> Result<&str> {
        self.store.service_key.as_deref().ok_or_else(|| {
            Error::missing_field(format!(
                "store.service-key (or one of {})",
                KEY_VARS.join(", ")
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    const ALL_VARS: &[&str] = &[
        "CREEL_STORE_URL",
        "SUPABASE_URL",
        "VITE_SUPABASE_URL",
        "CREEL_SERVICE_KEY",
        "SUPABASE_SERVICE_ROLE_KEY",
        "CREEL_BACKUP_ROOT",
        "CREEL_CONCURRENCY",
        "CREEL_INTERVAL_MINUTES",
        "CREEL_TABLES",
        "CREEL_BUCKETS",
    ];

    fn clear_env() {
        for var in ALL_VARS {
            // SAFETY: tests touching the environment run under #[serial]
            unsafe { env::remove_var(var) };
        }
    }

    fn create_temp_loader() -> (ConfigLoader, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let root =
            Utf8PathBuf::from_path_buf(temp_dir.path().to_path_buf()).expect("Invalid UTF-8 path");
        let loader = ConfigLoader::with_dirs(root.join("home"), root.join("work"));
        fs::create_dir_all(root.join("home")).unwrap();
        fs::create_dir_all(root.join("work")).unwrap();
        (loader, temp_dir)
    }

    #[test]
    #[serial]
    fn test_load_defaults_without_file() {
        clear_env();
        let (loader, _temp) = create_temp_loader();
        let config = loader.load(None).unwrap();
        assert_eq!(config.tables.len(), 12);
        assert!(config.store.url.is_none());
    }

    #[test]
    #[serial]
    fn test_working_dir_file_wins_over_global() {
        clear_env();
        let (loader, temp) = create_temp_loader();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        fs::write(root.join("home/config.yaml"), "backup:\n  concurrency: 2\n").unwrap();
        fs::write(root.join("work/creel.yaml"), "backup:\n  concurrency: 8\n").unwrap();

        let config = loader.load(None).unwrap();
        assert_eq!(config.backup.concurrency, 8);
    }

    #[test]
    #[serial]
    fn test_global_file_used_when_no_local_file() {
        clear_env();
        let (loader, temp) = create_temp_loader();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        fs::write(root.join("home/config.yaml"), "tables: [users, records]\n").unwrap();

        let config = loader.load(None).unwrap();
        assert_eq!(config.tables, vec!["users", "records"]);
    }

    #[test]
    #[serial]
    fn test_explicit_missing_file_is_error() {
        clear_env();
        let (loader, _temp) = create_temp_loader();
        let result = loader.load(Some(Utf8Path::new("/nonexistent/creel.yaml")));
        assert!(matches!(result, Err(Error::ConfigNotFound { .. })));
    }

    #[test]
    #[serial]
    fn test_env_overrides_file() {
        clear_env();
        let (loader, temp) = create_temp_loader();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        fs::write(
            root.join("work/creel.yaml"),
            "store:\n  url: https://file.example\n",
        )
        .unwrap();

        unsafe {
            env::set_var("VITE_SUPABASE_URL", "https://vite.example");
            env::set_var("SUPABASE_SERVICE_ROLE_KEY", "service-key");
            env::set_var("CREEL_TABLES", "users, records ,");
        }

        let config = loader.load(None).unwrap();
        assert_eq!(config.store.url.as_deref(), Some("https://vite.example"));
        assert_eq!(config.store.service_key.as_deref(), Some("service-key"));
        assert_eq!(config.tables, vec!["users", "records"]);

        clear_env();
    }

    #[test]
    #[serial]
    fn test_invalid_env_number() {
        clear_env();
        let (loader, _temp) = create_temp_loader();
        unsafe { env::set_var("CREEL_CONCURRENCY", "lots") };
        let result = loader.load(None);
        assert!(matches!(result, Err(Error::InvalidConfig { .. })));
        clear_env();
    }

    #[test]
    fn test_validate_rejects_duplicate_tables() {
        let mut config = CreelConfig::default();
        config.tables = vec!["users".to_string(), "users".to_string()];
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("more than once"), "got: {}", err);
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let mut config = CreelConfig::default();
        config.backup.concurrency = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_require_service_key_names_env_vars() {
        let config = CreelConfig::default();
        let err = config.require_service_key().unwrap_err().to_string();
        assert!(err.contains("SUPABASE_SERVICE_ROLE_KEY"));
    }

    #[test]
    fn test_empty_yaml_is_default() {
        let config = CreelConfig::from_yaml_str("  \n").unwrap();
        assert_eq!(config.tables, CreelConfig::default().tables);
    }
}
