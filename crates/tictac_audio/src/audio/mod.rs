//! Audio system
//!
//! Layered leaves-first:
//! - [`synth`]: procedural stand-in tones
//! - [`loader`] / [`source`]: fetch, decode and register assets
//! - [`playback`]: live instances, admission control, gain automation
//! - [`music`]: the single background track state machine
//! - [`sound_manager`]: the façade that owns policy, gating and lifecycle
//!
//! Nothing here blocks; time only moves when the host calls
//! [`SoundManager::update`].

pub mod asset;
pub mod backend;
pub mod loader;
pub mod mixer;
pub mod music;
pub mod playback;
pub mod settings;
pub mod sound_manager;
pub mod source;
pub mod synth;

pub use asset::{AssetBackend, AssetDescriptor, AssetPayload, DecodedBuffer, SoundAsset, SoundCategory};
pub use backend::{create_backend, AudioBackend, AudioBackendConfig, NullBackend, NullProbe, SoundHandle};
pub use loader::{AssetLoader, FetchMode, LoadOutcome, LoadTicket};
pub use mixer::{GainAutomation, MixerSystem, VolumeGroup};
pub use music::{MusicContext, MusicController, MusicState, StartOptions};
pub use playback::{Completed, EndReason, PlayOptions, PlaybackEngine, PlaybackRole};
pub use settings::{AssetManifest, AudioConfig, PolicySettings, SettingsPatch, BACKGROUND_MUSIC};
pub use sound_manager::{AudioStatus, GateState, SoundManager};
pub use source::{AssetSource, FileSource, MemorySource};

#[cfg(feature = "http")]
pub use source::HttpSource;

use thiserror::Error;

/// Backend-level audio errors
#[derive(Error, Debug)]
pub enum AudioError {
    /// The output device could not be opened
    #[error("Audio backend failed to initialize: {0}")]
    BackendInitFailed(String),

    /// Playback was requested before `initialize`
    #[error("Audio backend not initialized")]
    BackendNotInitialized,

    /// The handle does not refer to a live sound
    #[error("Invalid sound handle")]
    InvalidHandle,

    /// Sink creation or decoding failed
    #[error("Playback failed: {0}")]
    PlaybackFailed(String),
}

/// Asset fetch and decode failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    /// Reading the bytes failed
    #[error("Failed to fetch {path}: {reason}")]
    Fetch {
        /// Path or URL requested
        path: String,
        /// Underlying cause
        reason: String,
    },

    /// The server answered with a non-success status
    #[error("HTTP {status} for {path}")]
    HttpStatus {
        /// URL requested
        path: String,
        /// Status code received
        status: u16,
    },

    /// The bytes were not a recognizable audio container
    #[error("Unsupported audio format: {0}")]
    UnsupportedFormat(String),

    /// The decoder rejected the bytes
    #[error("Failed to decode {path}: {reason}")]
    Decode {
        /// Path or URL requested
        path: String,
        /// Decoder message
        reason: String,
    },

    /// Neither decoding nor streaming is available on this backend
    #[error("No playback path for {0}")]
    NoPlaybackPath(String),
}

/// Reasons a play request produced no sound
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlayError {
    /// No asset is registered under this name
    #[error("Sound not found: {0}")]
    NotFound(String),

    /// The concurrency ceiling was hit even after eviction
    #[error("Too many concurrent sounds ({0})")]
    CapacityExceeded(usize),

    /// The backend refused to start the sound
    #[error("Backend failure: {0}")]
    BackendFailure(String),

    /// Sound (or music) is switched off in settings
    #[error("Playback disabled by settings")]
    Disabled,
}

impl From<AudioError> for PlayError {
    fn from(err: AudioError) -> Self {
        Self::BackendFailure(err.to_string())
    }
}
