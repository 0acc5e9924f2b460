use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::mode::Appearance;
use crate::util::is_script_path;

/// Bridge configuration, persisted to `<config_dir>/codepane/bridge.json`.
///
/// `#[serde(default)]` fills in fields missing from older files, so new
/// settings can be added without breaking existing configs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeSettings {
    /// How long a pull waits for the runtime before giving up.
    pub pull_timeout_ms: u64,
    /// Name of the script message handler the runtime posts to.
    pub message_handler: String,
    /// Global script function that receives outbound messages.
    pub receive_function: String,
    pub appearance: Appearance,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        BridgeSettings {
            pull_timeout_ms: 3000,
            message_handler: String::from("codepane"),
            receive_function: String::from("codepaneReceive"),
            appearance: Appearance::Dark,
        }
    }
}

impl BridgeSettings {
    pub fn pull_timeout(&self) -> Duration {
        Duration::from_millis(self.pull_timeout_ms.max(1))
    }

    /// `receive_function` is spliced into evaluated script text, so anything
    /// but a dotted identifier path falls back to the default.
    pub fn validated(mut self) -> Self {
        if !is_script_path(&self.receive_function) {
            log::warn!(
                "Ignoring invalid receive_function {:?} in bridge settings",
                self.receive_function
            );
            self.receive_function = BridgeSettings::default().receive_function;
        }
        self
    }
}

pub fn settings_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("codepane").join("bridge.json"))
}

/// Load settings from the default location, falling back to defaults.
pub fn load() -> BridgeSettings {
    match settings_path() {
        Some(path) => load_from(&path),
        None => {
            log::warn!("Cannot determine config directory; using default bridge settings");
            BridgeSettings::default()
        }
    }
}

pub fn load_from(path: &Path) -> BridgeSettings {
    let settings = match std::fs::read_to_string(path) {
        Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
            log::warn!("Invalid bridge settings in {:?}: {}", path, e);
            BridgeSettings::default()
        }),
        Err(_) => BridgeSettings::default(),
    };
    settings.validated()
}

pub fn save(settings: &BridgeSettings) -> Result<(), String> {
    let path = settings_path().ok_or_else(|| "Cannot determine config directory".to_string())?;
    save_to(settings, &path)
}

pub fn save_to(settings: &BridgeSettings, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create settings directory: {}", e))?;
    }
    let json = serde_json::to_string_pretty(settings)
        .map_err(|e| format!("Failed to serialize settings: {}", e))?;
    std::fs::write(path, json).map_err(|e| format!("Failed to write {:?}: {}", path, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load_from(&dir.path().join("nope.json"));
        assert_eq!(settings, BridgeSettings::default());
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bridge.json");
        std::fs::write(&path, r#"{"pull_timeout_ms": 500, "appearance": "light"}"#).unwrap();
        let settings = load_from(&path);
        assert_eq!(settings.pull_timeout(), Duration::from_millis(500));
        assert_eq!(settings.appearance, Appearance::Light);
        assert_eq!(settings.receive_function, "codepaneReceive");
    }

    #[test]
    fn invalid_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bridge.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert_eq!(load_from(&path), BridgeSettings::default());
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("bridge.json");
        let settings = BridgeSettings {
            pull_timeout_ms: 1234,
            message_handler: "ob".to_string(),
            ..BridgeSettings::default()
        };
        save_to(&settings, &path).unwrap();
        assert_eq!(load_from(&path), settings);
    }

    #[test]
    fn invalid_receive_function_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bridge.json");
        std::fs::write(
            &path,
            r#"{"receive_function": "alert(document.cookie);x", "message_handler": "ob"}"#,
        )
        .unwrap();
        let settings = load_from(&path);
        assert_eq!(settings.receive_function, "codepaneReceive");
        assert_eq!(settings.message_handler, "ob");
    }

    #[test]
    fn dotted_receive_function_is_kept() {
        let settings = BridgeSettings {
            receive_function: "window.ob.receive".to_string(),
            ..BridgeSettings::default()
        }
        .validated();
        assert_eq!(settings.receive_function, "window.ob.receive");
    }

    #[test]
    fn zero_timeout_is_clamped() {
        let settings = BridgeSettings {
            pull_timeout_ms: 0,
            ..BridgeSettings::default()
        };
        assert_eq!(settings.pull_timeout(), Duration::from_millis(1));
    }
}
