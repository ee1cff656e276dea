use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::mail::driver::Platform;

const TEMPLATE: &str = r#"# outlook_scraper configuration. Every setting is optional.

# Record store (default: emails.db in this directory)
# db_path = "/path/to/emails.db"

# Where CSV exports go (default: ./csv_files)
# export_dir = "csv_files"

# Name used in export file names
# account_name = "Jane Doe"

# "macos" or "windows" (default: the host OS)
# platform = "macos"

# Drop Teams meeting and Bookings notifications
# skip_meetings = true

# osascript_path = "osascript"
# powershell_path = "powershell"
"#;

#[derive(Debug, Default, Serialize, Deserialize, Clone)]
pub struct Config {
    pub db_path: Option<String>,
    pub export_dir: Option<String>,
    pub account_name: Option<String>,
    pub platform: Option<Platform>,
    pub skip_meetings: Option<bool>,
    pub osascript_path: Option<String>,
    pub powershell_path: Option<String>,
}

fn config_dir() -> Result<PathBuf> {
    Ok(dirs::config_dir()
        .ok_or_else(|| anyhow::anyhow!("no config dir available"))?
        .join("outlook_scraper"))
}

pub fn config_path() -> Result<PathBuf> {
    let mut p = config_dir()?;
    fs::create_dir_all(&p)?;
    p.push("config.toml");
    Ok(p)
}

pub fn default_db_path() -> Result<PathBuf> {
    let mut p = config_dir()?;
    fs::create_dir_all(&p)?;
    p.push("emails.db");
    Ok(p)
}

/// Load the config at `path` (default location if `None`). A missing file
/// is replaced by a commented template and defaults are used.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => config_path()?,
    };
    if !path.exists() {
        if let Err(e) = fs::write(&path, TEMPLATE) {
            log::warn!("couldn't write config template to {}: {e}", path.display());
        } else {
            log::info!("created template config at {}", path.display());
        }
        return Ok(Config::default());
    }
    let s = fs::read_to_string(&path)?;
    let cfg: Config = toml::from_str(&s)
        .map_err(|e| anyhow::anyhow!("invalid config {}: {e}", path.display()))?;
    Ok(cfg)
}

pub fn resolve_db_path(cfg: &Config) -> Result<PathBuf> {
    if let Some(p) = &cfg.db_path {
        Ok(PathBuf::from(p))
    } else {
        default_db_path()
    }
}

impl Config {
    pub fn platform(&self) -> Platform {
        self.platform.unwrap_or_else(Platform::host)
    }

    pub fn export_dir(&self) -> PathBuf {
        PathBuf::from(self.export_dir.as_deref().unwrap_or("csv_files"))
    }

    pub fn skip_meetings(&self) -> bool {
        self.skip_meetings.unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_gets_template_and_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let cfg = load_config(Some(&path)).unwrap();
        assert!(cfg.db_path.is_none());
        assert!(cfg.skip_meetings());

        // The template itself parses to defaults.
        let again = load_config(Some(&path)).unwrap();
        assert!(again.platform.is_none());
    }

    #[test]
    fn reads_settings() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "db_path = \"/tmp/e.db\"\nplatform = \"windows\"\nskip_meetings = false\n",
        )
        .unwrap();
        let cfg = load_config(Some(&path)).unwrap();
        assert_eq!(cfg.platform(), Platform::Windows);
        assert!(!cfg.skip_meetings());
        assert_eq!(resolve_db_path(&cfg).unwrap(), PathBuf::from("/tmp/e.db"));
    }

    #[test]
    fn rejects_unknown_platform() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "platform = \"linux\"\n").unwrap();
        assert!(load_config(Some(&path)).is_err());
    }
}
