use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::api::Voice;

const SETTINGS_FILE_NAME: &str = "settings.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Backend API base URL (Flask service)
    pub api_base_url: String,

    /// TTS voice for narration and questions
    pub voice: Voice,

    /// Prefer real-time streaming transcription. When off, every answer
    /// goes through batch transcription of the recorded clip.
    pub streaming_enabled: bool,

    /// Hard ceiling on a single answer recording, in seconds
    pub max_recording_secs: u64,

    /// Warm the backend TTS cache with the narrative lines at startup
    pub pre_cache_narratives: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            api_base_url: crate::api::DEFAULT_API_BASE_URL.to_string(),
            voice: Voice::Nova,
            streaming_enabled: true,
            max_recording_secs: 180,
            pre_cache_narratives: false,
        }
    }
}

fn settings_path() -> Result<PathBuf, String> {
    let dir =
        dirs::config_dir().ok_or_else(|| "Could not determine config directory".to_string())?;
    Ok(dir.join("life-review").join(SETTINGS_FILE_NAME))
}

pub fn load_settings() -> AppSettings {
    let path = match settings_path() {
        Ok(p) => p,
        Err(e) => {
            log::warn!("Settings: {}", e);
            return AppSettings::default();
        }
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => match serde_json::from_str::<AppSettings>(&contents) {
            Ok(settings) => settings,
            Err(e) => {
                log::warn!("Settings: failed to parse {:?}: {}", path, e);
                AppSettings::default()
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => AppSettings::default(),
        Err(e) => {
            log::warn!("Settings: failed to read {:?}: {}", path, e);
            AppSettings::default()
        }
    }
}

pub fn save_settings(settings: &AppSettings) -> Result<(), String> {
    let path = settings_path()?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory {:?}: {}", parent, e))?;
    }

    let contents =
        serde_json::to_string_pretty(settings).map_err(|e| format!("Serialize settings: {}", e))?;

    // Write atomically: temp file in the same directory, then rename, so a
    // crash mid-write never leaves a corrupt settings.json
    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, &contents)
        .map_err(|e| format!("Write temp settings {:?}: {}", tmp_path, e))?;

    // On Unix, rename atomically replaces the destination. On Windows it
    // fails if the destination exists, so remove it first.
    if cfg!(windows) {
        if path.exists() {
            if let Err(e) = std::fs::remove_file(&path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    return Err(format!("Remove existing settings file {:?}: {}", path, e));
                }
            }
        }
    }

    std::fs::rename(&tmp_path, &path)
        .map_err(|e| format!("Rename temp settings {:?} to {:?}: {}", tmp_path, path, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = AppSettings::default();
        assert!(settings.streaming_enabled);
        assert_eq!(settings.max_recording_secs, 180);
        assert_eq!(settings.voice, Voice::Nova);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let settings: AppSettings =
            serde_json::from_str(r#"{"streaming_enabled": false}"#).unwrap();
        assert!(!settings.streaming_enabled);
        assert_eq!(settings.max_recording_secs, 180);
        assert_eq!(settings.api_base_url, crate::api::DEFAULT_API_BASE_URL);
    }

    #[test]
    fn test_round_trip() {
        let mut settings = AppSettings::default();
        settings.voice = Voice::Onyx;
        let json = serde_json::to_string(&settings).unwrap();
        let parsed: AppSettings = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.voice, Voice::Onyx);
    }
}
