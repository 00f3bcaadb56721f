use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::PathBuf,
    sync::{PoisonError, RwLock},
    time::Duration,
};

use crate::detection::ClassifierKind;
use crate::narration::{DEFAULT_PITCH, DEFAULT_RATE};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NarrationSettings {
    pub locale: String,
    pub use_fallback: bool,
    pub rate: f32,
    pub pitch: f32,
}

impl Default for NarrationSettings {
    fn default() -> Self {
        Self {
            locale: "en".into(),
            use_fallback: false,
            rate: DEFAULT_RATE,
            pitch: DEFAULT_PITCH,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DetectionSettings {
    pub classifier: ClassifierKind,
    pub analysis_delay_ms: u64,
    pub analysis_timeout_ms: u64,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            classifier: ClassifierKind::Deterministic,
            analysis_delay_ms: 2000,
            analysis_timeout_ms: 10_000,
        }
    }
}

impl DetectionSettings {
    pub fn analysis_delay(&self) -> Duration {
        Duration::from_millis(self.analysis_delay_ms)
    }

    pub fn analysis_timeout(&self) -> Duration {
        Duration::from_millis(self.analysis_timeout_ms)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct UserSettings {
    narration: NarrationSettings,
    detection: DetectionSettings,
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
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                warn!("Ignoring unreadable settings in {}: {err}", path.display());
                UserSettings::default()
            })
        } else {
            UserSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn narration(&self) -> NarrationSettings {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .narration
            .clone()
    }

    pub fn detection(&self) -> DetectionSettings {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .detection
            .clone()
    }

    pub fn update_narration(&self, settings: NarrationSettings) -> Result<()> {
        let mut guard = self.data.write().unwrap_or_else(PoisonError::into_inner);
        guard.narration = settings;
        self.persist(&guard)
    }

    pub fn update_detection(&self, settings: DetectionSettings) -> Result<()> {
        let mut guard = self.data.write().unwrap_or_else(PoisonError::into_inner);
        guard.detection = settings;
        self.persist(&guard)
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
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("settings.json")).unwrap();

        assert_eq!(store.narration(), NarrationSettings::default());
        assert_eq!(store.detection().analysis_delay(), Duration::from_secs(2));
        assert_eq!(store.detection().classifier, ClassifierKind::Deterministic);
    }

    #[test]
    fn updates_survive_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let store = SettingsStore::new(path.clone()).unwrap();
        store
            .update_narration(NarrationSettings {
                locale: "ta".into(),
                use_fallback: true,
                ..NarrationSettings::default()
            })
            .unwrap();
        store
            .update_detection(DetectionSettings {
                classifier: ClassifierKind::Remote {
                    endpoint: "http://localhost:8000/predict".into(),
                },
                ..DetectionSettings::default()
            })
            .unwrap();

        let reloaded = SettingsStore::new(path).unwrap();
        assert_eq!(reloaded.narration().locale, "ta");
        assert!(reloaded.narration().use_fallback);
        assert!(matches!(
            reloaded.detection().classifier,
            ClassifierKind::Remote { .. }
        ));
    }

    #[test]
    fn partial_document_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"narration": {"locale": "bn"}}"#).unwrap();

        let store = SettingsStore::new(path).unwrap();
        assert_eq!(store.narration().locale, "bn");
        assert_eq!(store.narration().rate, DEFAULT_RATE);
        assert_eq!(store.detection(), DetectionSettings::default());
    }

    #[test]
    fn corrupt_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{not json").unwrap();

        let store = SettingsStore::new(path).unwrap();
        assert_eq!(store.narration(), NarrationSettings::default());
    }
}
