// src/config.rs
use crate::utils::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Browser-like user agents rotated across requests and retries.
const DEFAULT_USER_AGENTS: [&str; 5] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
];

/// Top-level settings, loaded from `config.yaml`. Every section falls back
/// to its defaults when absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub project: ProjectSettings,
    pub http: HttpSettings,
    pub download: DownloadSettings,
    pub validation: ValidationSettings,
    pub paths: PathSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectSettings {
    pub target_years: Vec<i32>,
}

impl Default for ProjectSettings {
    fn default() -> Self {
        Self {
            target_years: (2019..=2024).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub user_agents: Vec<String>,
    pub request_timeout_secs: u64,
    /// Pause before every request.
    pub request_delay_ms: u64,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            user_agents: DEFAULT_USER_AGENTS.iter().map(|ua| ua.to_string()).collect(),
            request_timeout_secs: 30,
            request_delay_ms: 0,
        }
    }
}

impl HttpSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadSettings {
    pub max_retries: u32,
    pub max_consecutive_failures: u32,
    pub max_depth: u32,
    pub max_child_pages: usize,
    pub enable_failsafe: bool,
    pub retry_pause_ms: u64,
    /// Pause between crawled child pages.
    pub crawl_pause_ms: u64,
    /// Pause between target years of one company.
    pub year_pause_ms: u64,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            max_consecutive_failures: 3,
            max_depth: 2,
            max_child_pages: 5,
            enable_failsafe: true,
            retry_pause_ms: 2000,
            crawl_pause_ms: 500,
            year_pause_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationSettings {
    pub min_pages: usize,
    pub max_pages: usize,
    pub confidence_threshold: f64,
    pub max_pages_to_check: usize,
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            min_pages: 50,
            max_pages: 500,
            confidence_threshold: 60.0,
            max_pages_to_check: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathSettings {
    /// Company master table (tab separated).
    pub master: PathBuf,
    /// Coverage table (tab separated).
    pub coverage: PathBuf,
    /// Validation results (comma separated).
    pub validation_results: PathBuf,
    pub companies_dir: PathBuf,
    pub validated_dir: PathBuf,
    /// Directory holding `download_summary_*.json` files.
    pub summary_dir: PathBuf,
    /// Annotated HTML snapshots written in debug mode.
    pub debug_dir: PathBuf,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            master: PathBuf::from("instrument_master.csv"),
            coverage: PathBuf::from("coverage_table_updated.csv"),
            validation_results: PathBuf::from("validation_results.csv"),
            companies_dir: PathBuf::from("companies"),
            validated_dir: PathBuf::from("companies_validated"),
            summary_dir: PathBuf::from("."),
            debug_dir: PathBuf::from("debug"),
        }
    }
}

impl Settings {
    /// Loads settings from a YAML file. A missing file yields the defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let settings = Self::from_yaml(&raw)?;
        tracing::info!("Loaded config from {}", path.display());
        Ok(settings)
    }

    /// Parses and checks settings from YAML text.
    pub fn from_yaml(raw: &str) -> Result<Self, ConfigError> {
        // An empty document deserializes to unit, not to a mapping.
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        let settings: Settings = serde_yaml::from_str(raw)?;
        settings.check()?;
        Ok(settings)
    }

    fn check(&self) -> Result<(), ConfigError> {
        if self.http.user_agents.is_empty() {
            return Err(ConfigError::Invalid(
                "http.user_agents must contain at least one entry".to_string(),
            ));
        }
        if self.project.target_years.is_empty() {
            return Err(ConfigError::Invalid(
                "project.target_years must not be empty".to_string(),
            ));
        }
        if self.validation.min_pages > self.validation.max_pages {
            return Err(ConfigError::Invalid(format!(
                "validation.min_pages ({}) exceeds validation.max_pages ({})",
                self.validation.min_pages, self.validation.max_pages
            )));
        }
        if self.download.max_consecutive_failures == 0 {
            return Err(ConfigError::Invalid(
                "download.max_consecutive_failures must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.project.target_years, vec![2019, 2020, 2021, 2022, 2023, 2024]);
        assert_eq!(settings.http.user_agents.len(), 5);
        assert_eq!(settings.download.max_retries, 3);
        assert_eq!(settings.download.max_consecutive_failures, 3);
        assert_eq!(settings.download.max_depth, 2);
        assert_eq!(settings.download.max_child_pages, 5);
        assert_eq!(settings.validation.min_pages, 50);
        assert_eq!(settings.validation.max_pages, 500);
        assert_eq!(settings.validation.max_pages_to_check, 5);
    }

    #[test]
    fn test_partial_yaml_keeps_other_defaults() {
        let yaml = r#"
project:
  target_years: [2023, 2024]
validation:
  min_pages: 40
download:
  enable_failsafe: false
"#;
        let settings = Settings::from_yaml(yaml).unwrap();
        assert_eq!(settings.project.target_years, vec![2023, 2024]);
        assert_eq!(settings.validation.min_pages, 40);
        assert_eq!(settings.validation.max_pages, 500, "untouched keys keep defaults");
        assert!(!settings.download.enable_failsafe);
        assert_eq!(settings.download.retry_pause_ms, 2000);
        assert_eq!(settings.paths.companies_dir, PathBuf::from("companies"));
    }

    #[test]
    fn test_empty_yaml_is_default() {
        let settings = Settings::from_yaml("  \n").unwrap();
        assert_eq!(settings.validation.confidence_threshold, 60.0);
    }

    #[test]
    fn test_invalid_page_bounds_rejected() {
        let yaml = "validation:\n  min_pages: 600\n";
        let err = Settings::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)), "got {:?}", err);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let path = std::env::temp_dir().join(format!("no_such_config_{}.yaml", uuid::Uuid::new_v4()));
        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.download.max_depth, 2);
    }
}
