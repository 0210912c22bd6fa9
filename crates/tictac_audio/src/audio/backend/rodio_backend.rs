//! Rodio audio backend implementation
//!
//! Uses the Rodio library for cross-platform audio playback.
//! Rodio is pure Rust and supports WAV, OGG Vorbis, MP3, and FLAC formats.
//!
//! Every sound gets its own [`Sink`], which doubles as its private gain
//! stage: per-instance fades are just `set_volume` calls on that sink.
//!
//! # Example
//!
//! ```no_run
//! use tictac_audio::audio::backend::{AudioBackend, AudioBackendConfig, PlayParams, PlaySource};
//! use tictac_audio::audio::backend::rodio_backend::RodioBackend;
//! use tictac_audio::audio::synth;
//!
//! let mut backend = RodioBackend::new();
//! backend.initialize(&AudioBackendConfig::default()).unwrap();
//!
//! let tone = synth::synthesize("click", backend.sample_rate());
//! let handle = backend.play(PlaySource::Buffer(tone), &PlayParams::default()).unwrap();
//! backend.set_volume(handle, 0.5).unwrap();
//! ```

use super::{AudioBackend, AudioBackendConfig, BackendCaps, PlayParams, PlaySource, SoundHandle};
use crate::audio::AudioError;
use rodio::buffer::SamplesBuffer;
use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink, Source};
use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::time::Duration;

/// Rodio-based audio backend
pub struct RodioBackend {
    /// Audio output stream (must be kept alive)
    _output_stream: Option<OutputStream>,
    /// Output stream handle for creating sinks
    stream_handle: Option<OutputStreamHandle>,
    /// Active sound sinks
    active_sounds: HashMap<SoundHandle, Sink>,
    /// Sinks paused by `suspend_context` (resumed by `resume_context`)
    suspended: HashSet<SoundHandle>,
    /// Whether output is currently suspended
    context_suspended: bool,
    /// Sample rate reported to callers
    sample_rate: u32,
    /// Next sound ID for handle generation
    next_id: u32,
    /// Initialization state
    initialized: bool,
}

impl RodioBackend {
    /// Create a new Rodio backend
    pub fn new() -> Self {
        Self {
            _output_stream: None,
            stream_handle: None,
            active_sounds: HashMap::new(),
            suspended: HashSet::new(),
            context_suspended: false,
            sample_rate: AudioBackendConfig::default().sample_rate,
            next_id: 0,
            initialized: false,
        }
    }

    /// Generate a new sound handle
    fn next_handle(&mut self) -> SoundHandle {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        SoundHandle::new(id, 0)
    }

    fn sink(&self, handle: SoundHandle) -> Result<&Sink, AudioError> {
        self.active_sounds.get(&handle).ok_or(AudioError::InvalidHandle)
    }

    /// Queue `source` on `sink` with speed, delay and looping applied
    fn append(sink: &Sink, source: PlaySource, params: &PlayParams) -> Result<(), AudioError> {
        let delay = Duration::from_secs_f32(params.delay.max(0.0));
        let speed = params.speed.max(0.01);

        match source {
            PlaySource::Buffer(buffer) => {
                let samples = SamplesBuffer::new(buffer.channels, buffer.sample_rate, buffer.samples.to_vec());
                if params.looped {
                    sink.append(samples.repeat_infinite().speed(speed).delay(delay));
                } else {
                    sink.append(samples.speed(speed).delay(delay));
                }
            }
            PlaySource::Encoded(bytes) => {
                let cursor = Cursor::new(bytes);
                if params.looped {
                    let decoder = Decoder::new_looped(cursor)
                        .map_err(|e| AudioError::PlaybackFailed(format!("Failed to decode audio: {}", e)))?;
                    sink.append(decoder.speed(speed).delay(delay));
                } else {
                    let decoder = Decoder::new(cursor)
                        .map_err(|e| AudioError::PlaybackFailed(format!("Failed to decode audio: {}", e)))?;
                    sink.append(decoder.speed(speed).delay(delay));
                }
            }
        }
        Ok(())
    }
}

impl AudioBackend for RodioBackend {
    fn initialize(&mut self, config: &AudioBackendConfig) -> Result<(), AudioError> {
        if self.initialized {
            return Ok(());
        }

        // Create output stream
        let (stream, stream_handle) = OutputStream::try_default()
            .map_err(|e| AudioError::BackendInitFailed(format!("Failed to create audio output: {}", e)))?;

        self._output_stream = Some(stream);
        self.stream_handle = Some(stream_handle);
        self.sample_rate = config.sample_rate;
        self.initialized = true;

        log::info!("Rodio audio backend initialized");
        Ok(())
    }

    fn shutdown(&mut self) {
        if !self.initialized {
            return;
        }

        self.stop_all();

        // Drop stream handle and output
        self.stream_handle = None;
        self._output_stream = None;
        self.initialized = false;

        log::info!("Rodio audio backend shutdown");
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn capabilities(&self) -> BackendCaps {
        BackendCaps::DECODE | BackendCaps::STREAM
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn update(&mut self, _delta_time: f32) {
        // Remove finished sounds
        self.active_sounds.retain(|_handle, sink| !sink.empty());
        let active = &self.active_sounds;
        self.suspended.retain(|handle| active.contains_key(handle));
    }

    fn play(&mut self, source: PlaySource, params: &PlayParams) -> Result<SoundHandle, AudioError> {
        let stream_handle = self.stream_handle.as_ref().ok_or(AudioError::BackendNotInitialized)?;

        let sink = Sink::try_new(stream_handle)
            .map_err(|e| AudioError::PlaybackFailed(format!("Failed to create sink: {}", e)))?;
        sink.set_volume(params.volume);
        Self::append(&sink, source, params)?;

        let handle = self.next_handle();
        if self.context_suspended {
            sink.pause();
            self.suspended.insert(handle);
        }
        self.active_sounds.insert(handle, sink);

        log::trace!("Rodio playing '{}' as {:?}", params.label, handle);
        Ok(handle)
    }

    fn pause(&mut self, handle: SoundHandle) -> Result<(), AudioError> {
        self.sink(handle)?.pause();
        self.suspended.remove(&handle);
        Ok(())
    }

    fn resume(&mut self, handle: SoundHandle) -> Result<(), AudioError> {
        if self.context_suspended {
            // Comes back together with everything else
            self.sink(handle)?;
            self.suspended.insert(handle);
        } else {
            self.sink(handle)?.play();
        }
        Ok(())
    }

    fn stop(&mut self, handle: SoundHandle) {
        if let Some(sink) = self.active_sounds.remove(&handle) {
            sink.stop();
        }
        self.suspended.remove(&handle);
    }

    fn stop_all(&mut self) {
        for (_handle, sink) in self.active_sounds.drain() {
            sink.stop();
        }
        self.suspended.clear();
    }

    fn set_volume(&mut self, handle: SoundHandle, volume: f32) -> Result<(), AudioError> {
        self.sink(handle)?.set_volume(volume);
        Ok(())
    }

    fn get_volume(&self, handle: SoundHandle) -> Result<f32, AudioError> {
        Ok(self.sink(handle)?.volume())
    }

    fn is_playing(&self, handle: SoundHandle) -> bool {
        self.active_sounds
            .get(&handle)
            .is_some_and(|sink| !sink.is_paused() && !sink.empty())
    }

    fn is_finished(&self, handle: SoundHandle) -> bool {
        self.active_sounds.get(&handle).map_or(true, Sink::empty)
    }

    fn suspend_context(&mut self) {
        if self.context_suspended {
            return;
        }
        self.context_suspended = true;
        for (handle, sink) in &self.active_sounds {
            if !sink.is_paused() {
                sink.pause();
                self.suspended.insert(*handle);
            }
        }
    }

    fn resume_context(&mut self) -> Result<(), AudioError> {
        if !self.initialized {
            return Err(AudioError::BackendNotInitialized);
        }
        self.context_suspended = false;
        for handle in self.suspended.drain() {
            if let Some(sink) = self.active_sounds.get(&handle) {
                sink.play();
            }
        }
        Ok(())
    }
}

impl Default for RodioBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for RodioBackend {
    fn drop(&mut self) {
        self.shutdown();
    }
}
