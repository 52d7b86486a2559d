use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

pub const SETTINGS_FILE: &str = "delbrot.toml";
pub const DEFAULT_SCRIPT_EXTENSION: &str = "mkvs";

/// Contents of `delbrot.toml`. Every key is optional.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub plugin_dir: Option<PathBuf>,
    pub script_extension: String,
    pub color: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            plugin_dir: None,
            script_extension: DEFAULT_SCRIPT_EXTENSION.to_string(),
            color: true,
        }
    }
}

impl Settings {
    /// Reads `path`, falling back to defaults when the file does not exist.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read settings file {}", path.display()))?;
        Self::parse(&text)
            .with_context(|| format!("invalid settings file {}", path.display()))
    }

    pub fn parse(text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Directory searched by `import`.
    pub fn plugin_dir(&self) -> PathBuf {
        self.plugin_dir
            .clone()
            .or_else(default_plugin_dir)
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

/// `<config dir>/mkvsynth`, e.g. `~/.config/mkvsynth` on Linux.
pub fn default_plugin_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("mkvsynth"))
}

pub fn default_settings_path(plugin_dir: &Path) -> PathBuf {
    plugin_dir.join(SETTINGS_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_take_defaults() {
        let settings = Settings::parse("color = false\n").unwrap();
        assert!(!settings.color);
        assert_eq!(settings.script_extension, "mkvs");
        assert!(settings.plugin_dir.is_none());
    }

    #[test]
    fn explicit_plugin_dir_wins() {
        let settings = Settings::parse("plugin_dir = \"/opt/filters\"\n").unwrap();
        assert_eq!(settings.plugin_dir(), PathBuf::from("/opt/filters"));
    }

    #[test]
    fn missing_file_means_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load(&dir.path().join(SETTINGS_FILE)).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE);
        fs::write(&path, "color = \"maybe\"\n").unwrap();
        let err = Settings::load(&path).unwrap_err();
        assert!(err.to_string().contains("invalid settings file"));
    }
}
