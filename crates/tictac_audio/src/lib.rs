//! # TicTac+ Audio
//!
//! Audio playback and lifecycle core for the TicTac+ game client.
//!
//! ## Features
//!
//! - **Autoplay Gate**: Nothing plays before the first user gesture; earlier requests are queued
//! - **Two Playback Paths**: Decoded buffers or streamed encoded bytes, chosen per backend
//! - **Synthetic Fallback**: Missing effects are replaced by generated tones
//! - **Admission Control**: A concurrency ceiling with eviction of the oldest effects
//! - **Background Music**: Start, stop, crossfade and duck a single looping track
//! - **Lifecycle**: Visibility pause/resume and memory-pressure recovery
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tictac_audio::prelude::*;
//! use std::sync::Arc;
//!
//! let config = AudioConfig::default();
//! let source = Arc::new(FileSource::new(["assets"]));
//! let mut audio = SoundManager::with_default_backend(config, source);
//!
//! // Queued until the first gesture
//! audio.play_sound("click", PlayOptions::default());
//! audio.handle_event(PageEvent::Input(InputKind::Click));
//!
//! // Once per frame
//! audio.update(1.0 / 60.0);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::cast_possible_truncation)]

pub mod foundation;
pub mod config;
pub mod events;
pub mod audio;

#[cfg(test)]
mod tests;

/// Common imports for users of the audio core
pub mod prelude {
    pub use crate::{
        audio::{
            AssetDescriptor, AssetManifest, AssetSource, AudioConfig, AudioStatus, FileSource, MemorySource,
            MusicState, PlayOptions, PolicySettings, SettingsPatch, SoundCategory, SoundManager,
            BACKGROUND_MUSIC,
        },
        config::Config,
        events::{InputKind, Notice, PageEvent},
        foundation::{collections::PlaybackId, time::Timer},
    };

    #[cfg(feature = "http")]
    pub use crate::audio::HttpSource;
}
