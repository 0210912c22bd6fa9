//! Sound asset types
//!
//! A [`SoundAsset`] is one named, registered sound together with whatever the
//! loader managed to turn it into: a fully decoded buffer, the encoded bytes
//! for streaming playback, or a synthetic stand-in tone.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Declared purpose of a sound; selects its volume bus and fallback policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SoundCategory {
    /// Gameplay sound effect (has a synthetic fallback)
    Effect,
    /// Interface feedback such as clicks and hovers
    Ui,
    /// Background music
    Music,
}

/// Which playback path an asset ended up on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AssetBackend {
    /// Decoded up front into PCM
    Graph,
    /// Encoded bytes decoded while streaming
    Element,
    /// Procedurally generated replacement tone
    Synthetic,
}

/// Decoded PCM samples, interleaved
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedBuffer {
    /// Number of interleaved channels
    pub channels: u16,
    /// Frames per second
    pub sample_rate: u32,
    /// Interleaved samples in -1.0..=1.0
    pub samples: Arc<[f32]>,
}

impl DecodedBuffer {
    /// Wrap interleaved samples
    pub fn new(channels: u16, sample_rate: u32, samples: Vec<f32>) -> Self {
        Self {
            channels,
            sample_rate,
            samples: samples.into(),
        }
    }

    /// Play time at normal speed
    pub fn duration(&self) -> Duration {
        if self.channels == 0 || self.sample_rate == 0 {
            return Duration::ZERO;
        }
        let frames = self.samples.len() / usize::from(self.channels);
        Duration::from_secs_f64(frames as f64 / f64::from(self.sample_rate))
    }

    /// Whether there is nothing to play
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Playable payload of a registered asset
#[derive(Debug, Clone)]
pub enum AssetPayload {
    /// Decoded buffer, played through a per-instance gain stage
    Graph(DecodedBuffer),
    /// Encoded file bytes, decoded by the backend on each play
    Element(Arc<[u8]>),
    /// Synthetic tone substituted for an asset that failed to load
    Synthetic(DecodedBuffer),
}

impl AssetPayload {
    /// Backend tag for this payload
    pub fn backend(&self) -> AssetBackend {
        match self {
            Self::Graph(_) => AssetBackend::Graph,
            Self::Element(_) => AssetBackend::Element,
            Self::Synthetic(_) => AssetBackend::Synthetic,
        }
    }
}

/// Where to find a sound and how to treat it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetDescriptor {
    /// Path or URL handed to the asset source
    pub path: String,
    /// Base volume (0.0 to 1.0)
    #[serde(default = "default_volume")]
    pub volume: f32,
    /// Declared category
    pub category: SoundCategory,
    /// Loop by default (only meaningful for music)
    #[serde(default, rename = "loop")]
    pub looped: bool,
}

fn default_volume() -> f32 {
    1.0
}

impl AssetDescriptor {
    /// Create a descriptor at full volume
    pub fn new(path: impl Into<String>, category: SoundCategory) -> Self {
        Self {
            path: path.into(),
            volume: 1.0,
            category,
            looped: category == SoundCategory::Music,
        }
    }

    /// Set the base volume
    pub fn with_volume(mut self, volume: f32) -> Self {
        self.volume = volume.clamp(0.0, 1.0);
        self
    }
}

/// One registered sound
#[derive(Debug, Clone)]
pub struct SoundAsset {
    /// Unique key
    pub name: String,
    /// Path the bytes came from
    pub source_path: String,
    /// Declared category
    pub category: SoundCategory,
    /// Base volume (0.0 to 1.0)
    pub volume: f32,
    /// Loop by default
    pub looped: bool,
    /// What to play
    pub payload: AssetPayload,
}

impl SoundAsset {
    /// Register a payload under `name` using the descriptor's metadata
    pub fn new(name: impl Into<String>, descriptor: &AssetDescriptor, payload: AssetPayload) -> Self {
        Self {
            name: name.into(),
            source_path: descriptor.path.clone(),
            category: descriptor.category,
            volume: descriptor.volume.clamp(0.0, 1.0),
            looped: descriptor.looped,
            payload,
        }
    }

    /// Playback path this asset uses
    pub fn backend(&self) -> AssetBackend {
        self.payload.backend()
    }
}

/// Container formats recognized by their magic bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    /// WAV uncompressed
    Wav,
    /// OGG Vorbis compressed
    Ogg,
    /// MP3 compressed
    Mp3,
    /// FLAC lossless
    Flac,
    /// Unknown format
    Unknown,
}

impl AudioFormat {
    /// Detect the container from the first bytes of a file
    pub fn detect(bytes: &[u8]) -> Self {
        if bytes.len() < 4 {
            return Self::Unknown;
        }

        match &bytes[0..4] {
            b"RIFF" => Self::Wav,
            b"OggS" => Self::Ogg,
            b"fLaC" => Self::Flac,
            // MP3 can start with ID3 tag or frame sync
            [0xFF, 0xFB | 0xFA | 0xF3 | 0xF2, _, _] | [b'I', b'D', b'3', _] => Self::Mp3,
            _ => Self::Unknown,
        }
    }
}
