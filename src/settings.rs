use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, sync::RwLock};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalysisSettings {
    /// Key used for the remote vision calls; the `GEMINI_API_KEY` env var
    /// wins when set so packaged builds never need the key on disk.
    pub api_key: Option<String>,
    pub analysis_model: String,
    pub edit_model: String,
    pub timeout_secs: u64,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            analysis_model: "gemini-2.0-flash".into(),
            edit_model: "gemini-2.0-flash-exp-image-generation".into(),
            timeout_secs: 60,
        }
    }
}

impl AnalysisSettings {
    pub fn resolve_api_key(&self) -> Option<String> {
        std::env::var("GEMINI_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty())
            .or_else(|| self.api_key.clone())
            .filter(|key| !key.trim().is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CaptureSettings {
    pub jpeg_quality: u8,
    pub width: u32,
    pub height: u32,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            jpeg_quality: 85,
            width: 1280,
            height: 720,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserSettings {
    pub analysis: AnalysisSettings,
    pub capture: CaptureSettings,
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<UserSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_default()
        } else {
            UserSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn current(&self) -> UserSettings {
        self.data.read().unwrap().clone()
    }

    pub fn analysis(&self) -> AnalysisSettings {
        self.data.read().unwrap().analysis.clone()
    }

    pub fn capture(&self) -> CaptureSettings {
        self.data.read().unwrap().capture.clone()
    }

    pub fn update(&self, settings: UserSettings) -> Result<()> {
        {
            let mut guard = self.data.write().unwrap();
            *guard = settings;
            self.persist(&guard)?;
        }
        Ok(())
    }

    fn persist(&self, data: &UserSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corrupt_settings_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{ not json").unwrap();

        let store = SettingsStore::new(path).unwrap();
        assert_eq!(store.capture().jpeg_quality, 85);
    }

    #[test]
    fn update_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let store = SettingsStore::new(path.clone()).unwrap();
        let mut settings = store.current();
        settings.capture.jpeg_quality = 60;
        store.update(settings).unwrap();

        let reopened = SettingsStore::new(path).unwrap();
        assert_eq!(reopened.capture().jpeg_quality, 60);
    }
}
