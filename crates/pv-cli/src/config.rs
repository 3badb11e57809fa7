//! Configuration loading and management.

use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Where audit records are appended. `None` or an empty path disables
    /// auditing.
    pub audit_log: Option<PathBuf>,

    /// Duration used by script `create` operations that do not give one.
    pub default_duration_secs: i64,

    /// Worker threads for `simulate`. Unset lets rayon decide.
    pub threads: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            audit_log: dirs_data_path().map(|dir| dir.join("audit.jsonl")),
            default_duration_secs: 3600,
            threads: None,
        }
    }
}

impl Config {
    /// Loads configuration, optionally from a specific file.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // PVOTE_AUDIT_LOG, PVOTE_DEFAULT_DURATION_SECS, PVOTE_THREADS
        figment = figment.merge(Env::prefixed("PVOTE_"));

        figment.extract()
    }

    /// The audit log path, if auditing is enabled.
    pub fn audit_path(&self) -> Option<&Path> {
        self.audit_log
            .as_deref()
            .filter(|path| !path.as_os_str().is_empty())
    }
}

/// Returns the platform-specific config directory for pvote.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("pvote"))
}

/// Returns the platform-specific data directory for pvote.
///
/// On Linux: `~/.local/share/pvote`
pub fn dirs_data_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("pvote"))
}
