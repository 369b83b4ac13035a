//! Launcher settings and endpoint configuration.
//!
//! Settings live in a TOML file (default `.cloudbuild/settings.toml`) and can
//! be overridden from the environment:
//!
//! | variable                | field        |
//! |-------------------------|--------------|
//! | `CLOUDBUILD_ORG_ID`     | `org_id`     |
//! | `CLOUDBUILD_PROJECT_ID` | `project_id` |
//! | `CLOUDBUILD_API_TOKEN`  | `api_token`  |
//! | `CLOUDBUILD_BASE_URL`   | API base URL |

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CloudBuildError, Result};

/// Production API root.
pub const DEFAULT_BASE_URL: &str = "https://build-api.cloud.unity3d.com/api/v1";

/// Upper bound on a single remote call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Settings file location relative to the working directory.
pub const DEFAULT_SETTINGS_PATH: &str = ".cloudbuild/settings.toml";

pub const ENV_ORG_ID: &str = "CLOUDBUILD_ORG_ID";
pub const ENV_PROJECT_ID: &str = "CLOUDBUILD_PROJECT_ID";
pub const ENV_API_TOKEN: &str = "CLOUDBUILD_API_TOKEN";
pub const ENV_BASE_URL: &str = "CLOUDBUILD_BASE_URL";

/// Organization, project and token used by every remote call of a run.
#[derive(Clone, PartialEq, Eq)]
pub struct EndpointConfig {
    pub org_id: String,
    pub project_id: String,
    /// Sent verbatim after `Basic `; the server expects the dashboard API key as-is.
    pub api_token: String,
}

impl EndpointConfig {
    pub fn new(org_id: &str, project_id: &str, api_token: &str) -> Self {
        EndpointConfig {
            org_id: org_id.to_string(),
            project_id: project_id.to_string(),
            api_token: api_token.to_string(),
        }
    }

    /// All three fields must be non-empty before any remote operation.
    pub fn validate(&self) -> Result<()> {
        let missing: Vec<&str> = [
            ("org_id", &self.org_id),
            ("project_id", &self.project_id),
            ("api_token", &self.api_token),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(CloudBuildError::InvalidConfig(format!(
                "missing {}",
                missing.join(", ")
            )))
        }
    }
}

impl std::fmt::Debug for EndpointConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointConfig")
            .field("org_id", &self.org_id)
            .field("project_id", &self.project_id)
            .field("api_token", &"<redacted>")
            .finish()
    }
}

/// Where the API lives and how long a single call may take.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiOptions {
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for ApiOptions {
    fn default() -> Self {
        ApiOptions {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl ApiOptions {
    /// Defaults, with `CLOUDBUILD_BASE_URL` applied when set.
    pub fn from_env() -> Self {
        let options = Self::default();
        match std::env::var(ENV_BASE_URL) {
            Ok(url) if !url.trim().is_empty() => options.with_base_url(&url),
            _ => options,
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Persisted launcher settings: credentials plus the ordered list of target ids.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LauncherSettings {
    #[serde(default)]
    pub org_id: String,
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub api_token: String,
    /// Build target ids in the order they are launched.
    #[serde(default)]
    pub target_configs: Vec<String>,
}

impl LauncherSettings {
    /// Read settings from `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let settings: LauncherSettings = toml::from_str(&content)
            .map_err(|e| CloudBuildError::Settings(format!("{}: {}", path.display(), e)))?;
        debug!(path = %path.display(), targets = settings.target_configs.len(), "loaded settings");
        Ok(settings)
    }

    /// Read settings from `path`, or start from empty settings if the file does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            debug!(path = %path.display(), "settings file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Write settings to `path`, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| CloudBuildError::Settings(e.to_string()))?;
        std::fs::write(path, content)?;
        debug!(path = %path.display(), "saved settings");
        Ok(())
    }

    /// Apply `CLOUDBUILD_*` overrides from the process environment.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup; empty values are ignored.
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let pick = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(org_id) = pick(ENV_ORG_ID) {
            self.org_id = org_id;
        }
        if let Some(project_id) = pick(ENV_PROJECT_ID) {
            self.project_id = project_id;
        }
        if let Some(api_token) = pick(ENV_API_TOKEN) {
            self.api_token = api_token;
        }
        self
    }

    /// Validated endpoint snapshot for a run.
    pub fn endpoint(&self) -> Result<EndpointConfig> {
        let endpoint = EndpointConfig::new(&self.org_id, &self.project_id, &self.api_token);
        endpoint.validate()?;
        Ok(endpoint)
    }

    /// Append a target id. Returns `false` if it is already present.
    pub fn add_target(&mut self, target_id: &str) -> Result<bool> {
        let target_id = target_id.trim();
        if target_id.is_empty() {
            return Err(CloudBuildError::InvalidInput(
                "target id must not be empty".to_string(),
            ));
        }
        if self.target_configs.iter().any(|t| t == target_id) {
            return Ok(false);
        }
        self.target_configs.push(target_id.to_string());
        Ok(true)
    }

    /// Remove a target id. Returns `false` if it was not present.
    pub fn remove_target(&mut self, target_id: &str) -> bool {
        let before = self.target_configs.len();
        self.target_configs.retain(|t| t != target_id.trim());
        self.target_configs.len() != before
    }

    /// Replace the stored target list, dropping blanks and duplicates but keeping order.
    pub fn replace_targets<I>(&mut self, target_ids: I)
    where
        I: IntoIterator<Item = String>,
    {
        let mut kept: Vec<String> = Vec::new();
        for id in target_ids {
            let id = id.trim().to_string();
            if !id.is_empty() && !kept.contains(&id) {
                kept.push(id);
            }
        }
        self.target_configs = kept;
    }
}

/// Default settings path under the current directory.
pub fn default_settings_path() -> PathBuf {
    PathBuf::from(DEFAULT_SETTINGS_PATH)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn test_endpoint_validate_accepts_complete_config() {
        let endpoint = EndpointConfig::new("acme", "1234abcd", "secret");
        assert!(endpoint.validate().is_ok());
    }

    #[test]
    fn test_endpoint_validate_names_missing_fields() {
        let endpoint = EndpointConfig::new("acme", " ", "");
        let err = endpoint.validate().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("project_id"));
        assert!(msg.contains("api_token"));
        assert!(!msg.contains("org_id"));
    }

    #[test]
    fn test_endpoint_debug_redacts_token() {
        let endpoint = EndpointConfig::new("acme", "proj", "super-secret");
        let debug = format!("{:?}", endpoint);
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_api_options_default() {
        let options = ApiOptions::default();
        assert_eq!(options.base_url, "https://build-api.cloud.unity3d.com/api/v1");
        assert_eq!(options.timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_api_options_trims_trailing_slash() {
        let options = ApiOptions::default().with_base_url("http://localhost:8080/api/v1/");
        assert_eq!(options.base_url, "http://localhost:8080/api/v1");
    }

    #[test]
    fn test_settings_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.toml");
        let settings = LauncherSettings {
            org_id: "acme".to_string(),
            project_id: "proj".to_string(),
            api_token: "token".to_string(),
            target_configs: vec!["ios-dev".to_string(), "android-dev".to_string()],
        };
        settings.save(&path).unwrap();

        let loaded = LauncherSettings::load(&path).unwrap();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let dir = tempdir().unwrap();
        let settings = LauncherSettings::load_or_default(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(settings, LauncherSettings::default());
    }

    #[test]
    fn test_load_rejects_malformed_toml() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        std::fs::write(&path, "org_id = [unterminated").unwrap();
        let err = LauncherSettings::load(&path).unwrap_err();
        assert!(matches!(err, CloudBuildError::Settings(_)));
    }

    #[test]
    fn test_overrides_take_precedence_and_ignore_blank() {
        let env: HashMap<&str, &str> = [
            (ENV_ORG_ID, "env-org"),
            (ENV_PROJECT_ID, ""),
            (ENV_API_TOKEN, "env-token"),
        ]
        .into_iter()
        .collect();
        let settings = LauncherSettings {
            org_id: "file-org".to_string(),
            project_id: "file-proj".to_string(),
            api_token: "file-token".to_string(),
            target_configs: vec![],
        }
        .with_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(settings.org_id, "env-org");
        assert_eq!(settings.project_id, "file-proj");
        assert_eq!(settings.api_token, "env-token");
    }

    #[test]
    fn test_endpoint_requires_all_fields() {
        let settings = LauncherSettings {
            org_id: "acme".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            settings.endpoint(),
            Err(CloudBuildError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_add_and_remove_target() {
        let mut settings = LauncherSettings::default();
        assert!(settings.add_target("ios-dev").unwrap());
        assert!(!settings.add_target(" ios-dev ").unwrap());
        assert!(settings.add_target("").is_err());
        assert_eq!(settings.target_configs, vec!["ios-dev".to_string()]);

        assert!(settings.remove_target("ios-dev"));
        assert!(!settings.remove_target("ios-dev"));
        assert!(settings.target_configs.is_empty());
    }

    #[test]
    fn test_replace_targets_dedupes_in_order() {
        let mut settings = LauncherSettings::default();
        settings.replace_targets(vec![
            "b".to_string(),
            "a".to_string(),
            "b".to_string(),
            " ".to_string(),
        ]);
        assert_eq!(settings.target_configs, vec!["b".to_string(), "a".to_string()]);
    }
}
