//! Configuration management
//!
//! Settings are flat key/value sections stored as JSON: `GENERAL`,
//! `PLUGINS` and one `plugin_<name>` section per plugin.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, warn};

use crate::error::{Error, Result};

pub const APP_DIR: &str = "m3u_manager";
pub const GENERAL: &str = "GENERAL";
pub const PLUGINS: &str = "PLUGINS";

pub type Section = BTreeMap<String, String>;

#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    sections: BTreeMap<String, Section>,
    /// Where `save` writes; `None` keeps the config in memory only
    path: Option<PathBuf>,
}

/// Handle given to every plugin
pub type SharedConfig = Arc<Mutex<AppConfig>>;

pub fn shared(config: AppConfig) -> SharedConfig {
    Arc::new(Mutex::new(config))
}

/// Lock the shared config, recovering from a poisoned lock
pub fn lock(config: &SharedConfig) -> MutexGuard<'_, AppConfig> {
    config.lock().unwrap_or_else(|e| e.into_inner())
}

impl AppConfig {
    pub fn config_path() -> PathBuf {
        let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push(APP_DIR);
        path.push("config.json");
        path
    }

    /// Load from the default location, writing defaults on first run
    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    /// Load `path`. A missing file gets defaults written to it. A file that
    /// cannot be read or parsed is moved aside to `<name>.bak` first; if
    /// that fails the defaults stay in memory and the file is left alone.
    pub fn load_from(path: &Path) -> Self {
        if path.exists() {
            let parsed = fs::read_to_string(path)
                .map_err(|e| e.to_string())
                .and_then(|content| serde_json::from_str(&content).map_err(|e| e.to_string()));
            match parsed {
                Ok(sections) => {
                    return Self {
                        sections,
                        path: Some(path.to_path_buf()),
                    }
                }
                Err(e) => {
                    let backup = backup_path(path);
                    warn!(
                        "Unreadable config {}: {}. Moving it to {}",
                        path.display(),
                        e,
                        backup.display()
                    );
                    if let Err(e) = fs::rename(path, &backup) {
                        warn!("Failed to back up config, changes will not be saved: {}", e);
                        return Self::in_memory();
                    }
                }
            }
        }

        let config = Self {
            path: Some(path.to_path_buf()),
            ..Self::in_memory()
        };
        if let Err(e) = config.save() {
            warn!("Failed to write default config: {}", e);
        }
        config
    }

    /// Defaults, never written to disk
    pub fn in_memory() -> Self {
        let mut sections = BTreeMap::new();
        sections.insert(
            GENERAL.to_string(),
            Section::from([
                ("last_file".to_string(), String::new()),
                ("dark_mode".to_string(), "true".to_string()),
            ]),
        );
        sections.insert(
            PLUGINS.to_string(),
            Section::from([("enabled".to_string(), String::new())]),
        );
        Self {
            sections,
            path: None,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        let content = serde_json::to_string_pretty(&self.sections)?;
        fs::write(path, content).map_err(|e| Error::io(path, e))?;
        debug!("Config saved to {}", path.display());
        Ok(())
    }

    pub fn get(&self, section: &str, key: &str, default: &str) -> String {
        self.sections
            .get(section)
            .and_then(|s| s.get(key))
            .cloned()
            .unwrap_or_else(|| default.to_string())
    }

    pub fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        let value = self.get(section, key, if default { "true" } else { "false" });
        matches!(value.to_lowercase().as_str(), "1" | "true" | "yes")
    }

    /// Set a value and persist immediately
    pub fn set(&mut self, section: &str, key: &str, value: &str) -> Result<()> {
        self.sections
            .entry(section.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
        self.save()
    }

    pub fn section(&self, section: &str) -> Section {
        self.sections.get(section).cloned().unwrap_or_default()
    }

    // --- GENERAL ---

    pub fn last_file(&self) -> String {
        self.get(GENERAL, "last_file", "")
    }

    pub fn set_last_file(&mut self, path: &Path) -> Result<()> {
        self.set(GENERAL, "last_file", &path.to_string_lossy())
    }

    pub fn dark_mode(&self) -> bool {
        self.get_bool(GENERAL, "dark_mode", true)
    }

    pub fn set_dark_mode(&mut self, dark: bool) -> Result<()> {
        self.set(GENERAL, "dark_mode", if dark { "true" } else { "false" })
    }

    // --- PLUGINS ---

    pub fn enabled_plugins(&self) -> Vec<String> {
        self.get(PLUGINS, "enabled", "")
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn set_enabled_plugins(&mut self, units: &[String]) -> Result<()> {
        self.set(PLUGINS, "enabled", &units.join(","))
    }

    /// Settings stored for a plugin, by display name
    pub fn plugin_settings(&self, plugin_name: &str) -> Section {
        self.section(&plugin_section_name(plugin_name))
    }

    pub fn set_plugin_settings(&mut self, plugin_name: &str, values: &Section) -> Result<()> {
        let section = self
            .sections
            .entry(plugin_section_name(plugin_name))
            .or_default();
        for (key, value) in values {
            section.insert(key.clone(), value.clone());
        }
        self.save()
    }
}

fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".bak");
    path.with_file_name(name)
}

/// `plugin_` + display name with `/` replaced by `_`
pub fn plugin_section_name(plugin_name: &str) -> String {
    format!("plugin_{}", plugin_name.replace('/', "_"))
}

/// Per-user data directory, for files plugins keep between runs
pub fn data_dir() -> PathBuf {
    let mut path = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push(APP_DIR);
    path
}

/// Directory holding on-disk plugin units, created on demand
pub fn plugins_dir() -> Result<PathBuf> {
    let path = data_dir().join("plugins");
    fs::create_dir_all(&path).map_err(|e| Error::io(&path, e))?;
    Ok(path)
}

pub fn cache_dir() -> PathBuf {
    let mut path = dirs::cache_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push(APP_DIR);
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_written_on_first_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub").join("config.json");
        let config = AppConfig::load_from(&path);
        assert!(path.exists());
        assert!(config.dark_mode());
        assert_eq!(config.last_file(), "");
        assert!(config.enabled_plugins().is_empty());
    }

    #[test]
    fn test_unreadable_config_backed_up() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ broken").unwrap();

        let config = AppConfig::load_from(&path);
        assert!(config.dark_mode());
        assert_eq!(
            fs::read_to_string(dir.path().join("config.json.bak")).unwrap(),
            "{ broken"
        );
        let rewritten: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(rewritten["GENERAL"]["dark_mode"], "true");
    }

    #[test]
    fn test_set_persists_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut config = AppConfig::load_from(&path);
        config
            .set_enabled_plugins(&["epg_data".to_string(), "tv_logos".to_string()])
            .unwrap();
        config.set_dark_mode(false).unwrap();

        let reloaded = AppConfig::load_from(&path);
        assert_eq!(reloaded.enabled_plugins(), vec!["epg_data", "tv_logos"]);
        assert!(!reloaded.dark_mode());
    }

    #[test]
    fn test_plugin_section_naming() {
        let mut config = AppConfig::in_memory();
        assert_eq!(
            plugin_section_name("Legacy Plugins/EPG Data Plugin"),
            "plugin_Legacy Plugins_EPG Data Plugin"
        );
        let values = Section::from([("source".to_string(), "http://e/epg.xml".to_string())]);
        config
            .set_plugin_settings("Legacy Plugins/EPG Data Plugin", &values)
            .unwrap();
        assert_eq!(
            config.get("plugin_Legacy Plugins_EPG Data Plugin", "source", ""),
            "http://e/epg.xml"
        );
    }

    #[test]
    fn test_get_bool_variants() {
        let mut config = AppConfig::in_memory();
        config.set(GENERAL, "flag", "Yes").unwrap();
        assert!(config.get_bool(GENERAL, "flag", false));
        assert!(!config.get_bool(GENERAL, "missing", false));
        config.set(GENERAL, "flag", "0").unwrap();
        assert!(!config.get_bool(GENERAL, "flag", true));
    }
}
