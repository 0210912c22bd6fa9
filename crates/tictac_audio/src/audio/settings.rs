//! Audio policy settings and the asset manifest

use crate::audio::asset::{AssetDescriptor, SoundCategory};
use crate::audio::backend::AudioBackendConfig;
use crate::audio::loader::FetchMode;
use crate::config::Config;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Manifest key of the prioritized background track
pub const BACKGROUND_MUSIC: &str = "backgroundMusic";

/// User-facing audio policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicySettings {
    /// Effects and interface sounds on or off
    pub sound_enabled: bool,
    /// Background music on or off
    pub music_enabled: bool,
    /// Effects bus volume (0.0 to 1.0)
    pub sound_volume: f32,
    /// Music bus volume (0.0 to 1.0)
    pub music_volume: f32,
    /// Master volume (0.0 to 1.0)
    pub master_volume: f32,
    /// Concurrency ceiling for live instances (at least 1)
    pub max_concurrent_sounds: usize,
    /// Default fade length for music stop and crossfade
    pub fade_time_seconds: f32,
    /// Whether music may be ducked
    pub ducking_enabled: bool,
    /// Default duck depth (0.0 to 1.0)
    pub ducking_amount: f32,
}

impl Default for PolicySettings {
    fn default() -> Self {
        Self {
            sound_enabled: true,
            music_enabled: true,
            sound_volume: 0.7,
            music_volume: 0.5,
            master_volume: 1.0,
            max_concurrent_sounds: 8,
            fade_time_seconds: 1.0,
            ducking_enabled: true,
            ducking_amount: 0.3,
        }
    }
}

impl PolicySettings {
    /// Merge `patch` in, clamping every value into range
    pub fn apply(&mut self, patch: &SettingsPatch) {
        if let Some(enabled) = patch.sound_enabled {
            self.sound_enabled = enabled;
        }
        if let Some(enabled) = patch.music_enabled {
            self.music_enabled = enabled;
        }
        if let Some(volume) = patch.sound_volume {
            self.sound_volume = volume;
        }
        if let Some(volume) = patch.music_volume {
            self.music_volume = volume;
        }
        if let Some(volume) = patch.master_volume {
            self.master_volume = volume;
        }
        if let Some(max) = patch.max_concurrent_sounds {
            self.max_concurrent_sounds = max;
        }
        if let Some(seconds) = patch.fade_time_seconds {
            self.fade_time_seconds = seconds;
        }
        if let Some(enabled) = patch.ducking_enabled {
            self.ducking_enabled = enabled;
        }
        if let Some(amount) = patch.ducking_amount {
            self.ducking_amount = amount;
        }
        self.sanitize();
    }

    /// Clamp values loaded from elsewhere into range
    pub fn sanitize(&mut self) {
        self.sound_volume = self.sound_volume.clamp(0.0, 1.0);
        self.music_volume = self.music_volume.clamp(0.0, 1.0);
        self.master_volume = self.master_volume.clamp(0.0, 1.0);
        self.ducking_amount = self.ducking_amount.clamp(0.0, 1.0);
        self.max_concurrent_sounds = self.max_concurrent_sounds.max(1);
        self.fade_time_seconds = self.fade_time_seconds.max(0.0);
    }
}

impl Config for PolicySettings {}

/// Partial settings update; absent fields are left alone
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
#[allow(missing_docs)]
pub struct SettingsPatch {
    pub sound_enabled: Option<bool>,
    pub music_enabled: Option<bool>,
    pub sound_volume: Option<f32>,
    pub music_volume: Option<f32>,
    pub master_volume: Option<f32>,
    pub max_concurrent_sounds: Option<usize>,
    pub fade_time_seconds: Option<f32>,
    pub ducking_enabled: Option<bool>,
    pub ducking_amount: Option<f32>,
}

/// Name → descriptor table the loader works from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetManifest {
    entries: BTreeMap<String, AssetDescriptor>,
}

impl AssetManifest {
    /// Empty manifest
    pub fn empty() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Add or replace an entry (builder style)
    pub fn with(mut self, name: impl Into<String>, descriptor: AssetDescriptor) -> Self {
        self.insert(name, descriptor);
        self
    }

    /// Add or replace an entry
    pub fn insert(&mut self, name: impl Into<String>, descriptor: AssetDescriptor) {
        self.entries.insert(name.into(), descriptor);
    }

    /// Descriptor for `name`
    pub fn get(&self, name: &str) -> Option<&AssetDescriptor> {
        self.entries.get(name)
    }

    /// Whether `name` is declared
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the manifest is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &AssetDescriptor)> {
        self.entries.iter().map(|(name, descriptor)| (name.as_str(), descriptor))
    }
}

impl Default for AssetManifest {
    fn default() -> Self {
        let effect = |path: &str, volume: f32| AssetDescriptor::new(path, SoundCategory::Effect).with_volume(volume);
        let ui = |path: &str, volume: f32| AssetDescriptor::new(path, SoundCategory::Ui).with_volume(volume);

        Self::empty()
            .with(
                BACKGROUND_MUSIC,
                AssetDescriptor::new("sounds/background-music.mp3", SoundCategory::Music).with_volume(0.6),
            )
            .with("click", effect("sounds/click.mp3", 0.6))
            .with("move", effect("sounds/move.mp3", 0.5))
            .with("win", effect("sounds/win.mp3", 0.8))
            .with("lose", effect("sounds/lose.mp3", 0.7))
            .with("error", effect("sounds/error.mp3", 0.6))
            .with("buttonClick", effect("sounds/button-click.mp3", 0.4))
            .with("buttonHover", effect("sounds/button-hover.mp3", 0.3))
            .with("uiClick", ui("sounds/ui-click.mp3", 0.4))
            .with("uiHover", ui("sounds/ui-hover.mp3", 0.3))
    }
}

impl Config for AssetManifest {}

/// Everything needed to build a [`SoundManager`](crate::audio::SoundManager)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Where loads run
    pub fetch_mode: FetchMode,
    /// Initial policy
    pub settings: PolicySettings,
    /// Output device settings
    pub backend: AudioBackendConfig,
    /// Sounds the game knows about
    pub manifest: AssetManifest,
}

impl Config for AudioConfig {}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_defaults() {
        let settings = PolicySettings::default();
        assert!(settings.sound_enabled && settings.music_enabled);
        assert_relative_eq!(settings.sound_volume, 0.7);
        assert_relative_eq!(settings.music_volume, 0.5);
        assert_eq!(settings.max_concurrent_sounds, 8);
        assert_relative_eq!(settings.ducking_amount, 0.3);
    }

    #[test]
    fn test_patch_merges_and_clamps() {
        let mut settings = PolicySettings::default();
        settings.apply(&SettingsPatch {
            music_volume: Some(1.5),
            max_concurrent_sounds: Some(0),
            sound_enabled: Some(false),
            ..Default::default()
        });

        assert_relative_eq!(settings.music_volume, 1.0);
        assert_eq!(settings.max_concurrent_sounds, 1);
        assert!(!settings.sound_enabled);
        assert_relative_eq!(settings.sound_volume, 0.7);
    }

    #[test]
    fn test_default_manifest_prioritizes_music() {
        let manifest = AssetManifest::default();
        let music = manifest.get(BACKGROUND_MUSIC).unwrap();
        assert_eq!(music.category, SoundCategory::Music);
        assert!(music.looped);
        assert_eq!(manifest.get("click").unwrap().category, SoundCategory::Effect);
    }

    #[test]
    fn test_toml_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audio.toml");

        let mut config = AudioConfig::default();
        config.settings.music_volume = 0.25;
        config.fetch_mode = FetchMode::Inline;
        config.save_to_file(&path).unwrap();

        let loaded = AudioConfig::load_from_file(&path).unwrap();
        assert_relative_eq!(loaded.settings.music_volume, 0.25);
        assert_eq!(loaded.fetch_mode, FetchMode::Inline);
        assert_eq!(loaded.manifest, config.manifest);
    }

    #[test]
    fn test_ron_manifest_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.ron");

        let manifest = AssetManifest::empty().with("beep", AssetDescriptor::new("beep.wav", SoundCategory::Ui));
        manifest.save_to_file(&path).unwrap();
        assert_eq!(AssetManifest::load_from_file(&path).unwrap(), manifest);
    }

    #[test]
    fn test_partial_patch_from_toml() {
        let patch: SettingsPatch = toml::from_str("music_enabled = false").unwrap();
        assert_eq!(patch.music_enabled, Some(false));
        assert_eq!(patch.sound_volume, None);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = PolicySettings::load_or_default(dir.path().join("absent.toml")).unwrap();
        assert_eq!(settings, PolicySettings::default());
    }
}
