//! Audio backend implementations
//!
//! Platform-independent abstraction over audio playback libraries.
//! Backends know nothing about names, categories or policy; they start,
//! steer and stop individual sounds and report whether those sounds are
//! still audible.

pub mod null_backend;
pub mod rodio_backend;

use crate::audio::asset::DecodedBuffer;
use crate::audio::AudioError;
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use null_backend::{NullBackend, NullProbe};
pub use rodio_backend::RodioBackend;

/// Sound handle for tracking active sounds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SoundHandle {
    /// Unique identifier for the sound
    pub id: u32,
    /// Generation counter for handle validation
    pub generation: u32,
}

impl SoundHandle {
    /// Create a new sound handle
    pub fn new(id: u32, generation: u32) -> Self {
        Self { id, generation }
    }
}

bitflags! {
    /// What a backend can do with asset bytes
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BackendCaps: u8 {
        /// Assets may be decoded up front into PCM buffers
        const DECODE = 0b01;
        /// Encoded bytes may be handed over and decoded while streaming
        const STREAM = 0b10;
    }
}

/// What to play
#[derive(Debug, Clone)]
pub enum PlaySource {
    /// Decoded PCM
    Buffer(DecodedBuffer),
    /// Encoded file bytes
    Encoded(Arc<[u8]>),
}

/// How to play it
#[derive(Debug, Clone, PartialEq)]
pub struct PlayParams {
    /// Initial sink volume
    pub volume: f32,
    /// Playback speed multiplier
    pub speed: f32,
    /// Repeat until stopped
    pub looped: bool,
    /// Silence before the first sample, in seconds
    pub delay: f32,
    /// Label used in logs (usually the asset name)
    pub label: String,
}

impl Default for PlayParams {
    fn default() -> Self {
        Self {
            volume: 1.0,
            speed: 1.0,
            looped: false,
            delay: 0.0,
            label: String::new(),
        }
    }
}

/// Audio backend trait for platform abstraction
///
/// Not `Send`: the audio core runs entirely on the thread that drives
/// `SoundManager::update`.
pub trait AudioBackend {
    /// Initialize the audio backend
    fn initialize(&mut self, config: &AudioBackendConfig) -> Result<(), AudioError>;

    /// Shutdown the audio backend
    fn shutdown(&mut self);

    /// Check if backend is initialized
    fn is_initialized(&self) -> bool;

    /// What this backend can do with asset bytes
    fn capabilities(&self) -> BackendCaps;

    /// Output sample rate, used to render synthetic tones
    fn sample_rate(&self) -> u32;

    /// Advance by `delta_time` seconds and forget finished sounds
    fn update(&mut self, delta_time: f32);

    /// Start a sound
    fn play(&mut self, source: PlaySource, params: &PlayParams) -> Result<SoundHandle, AudioError>;

    /// Pause a playing sound
    fn pause(&mut self, handle: SoundHandle) -> Result<(), AudioError>;

    /// Resume a paused sound
    fn resume(&mut self, handle: SoundHandle) -> Result<(), AudioError>;

    /// Stop a sound (idempotent)
    fn stop(&mut self, handle: SoundHandle);

    /// Stop all playing sounds
    fn stop_all(&mut self);

    /// Set volume of a sound
    fn set_volume(&mut self, handle: SoundHandle, volume: f32) -> Result<(), AudioError>;

    /// Get volume of a sound
    fn get_volume(&self, handle: SoundHandle) -> Result<f32, AudioError>;

    /// Check if a sound is audible right now (known, not paused, not finished)
    fn is_playing(&self, handle: SoundHandle) -> bool;

    /// Check if a sound has run out or was never known
    fn is_finished(&self, handle: SoundHandle) -> bool;

    /// Stop producing output without forgetting any sound
    fn suspend_context(&mut self);

    /// Undo [`AudioBackend::suspend_context`]
    fn resume_context(&mut self) -> Result<(), AudioError>;
}

/// Configuration for audio backend
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioBackendConfig {
    /// Sample rate (e.g., 44100, 48000)
    pub sample_rate: u32,
    /// Number of output channels (1=mono, 2=stereo)
    pub channels: u16,
    /// Skip the output device entirely and run silently
    pub headless: bool,
}

impl Default for AudioBackendConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            channels: 2,
            headless: false,
        }
    }
}

/// Create the default audio backend for the platform
///
/// Falls back to a silent [`NullBackend`] when no output device can be
/// opened: missing audio must never take the game down with it.
pub fn create_backend(config: &AudioBackendConfig) -> Box<dyn AudioBackend> {
    if !config.headless {
        let mut backend = RodioBackend::new();
        match backend.initialize(config) {
            Ok(()) => return Box::new(backend),
            Err(e) => log::warn!("Audio output unavailable, continuing silently: {}", e),
        }
    }

    let mut backend = NullBackend::new();
    // NullBackend initialization cannot fail
    let _ = backend.initialize(config);
    Box::new(backend)
}
