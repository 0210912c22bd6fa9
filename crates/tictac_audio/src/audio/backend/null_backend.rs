//! Silent, simulated audio backend
//!
//! Used when no output device is available and for deterministic tests.
//! Each voice advances on the `update` clock according to its buffer length,
//! speed and delay, so completion behaves like a real device without any
//! sound being produced. A [`NullProbe`] shares the backend's state and lets
//! callers inspect volumes or force a voice to end early.

use super::{AudioBackend, AudioBackendConfig, BackendCaps, PlayParams, PlaySource, SoundHandle};
use crate::audio::AudioError;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Assumed length of encoded sources, which the null backend never decodes
const DEFAULT_ENCODED_SECONDS: f32 = 1.0;

#[derive(Debug, Clone)]
struct NullVoice {
    label: String,
    volume: f32,
    speed: f32,
    delay: f32,
    /// Seconds of content left; `None` when looping
    remaining: Option<f32>,
    paused: bool,
    finished: bool,
    samples: Option<usize>,
}

#[derive(Debug, Default)]
struct NullState {
    voices: HashMap<SoundHandle, NullVoice>,
    started: Vec<String>,
    suspended: bool,
    encoded_seconds: Option<f32>,
}

/// Inspection handle sharing state with a [`NullBackend`]
#[derive(Debug, Clone, Default)]
pub struct NullProbe {
    state: Rc<RefCell<NullState>>,
}

impl NullProbe {
    /// Labels of every sound ever started, in order
    pub fn started(&self) -> Vec<String> {
        self.state.borrow().started.clone()
    }

    /// How many times a sound with `label` was started
    pub fn start_count(&self, label: &str) -> usize {
        self.state.borrow().started.iter().filter(|l| *l == label).count()
    }

    /// Voices still known to the backend (finished ones linger until `update`)
    pub fn live_count(&self) -> usize {
        self.state.borrow().voices.values().filter(|v| !v.finished).count()
    }

    /// Labels of audible voices
    pub fn playing(&self) -> Vec<String> {
        let state = self.state.borrow();
        let mut labels: Vec<String> = state
            .voices
            .values()
            .filter(|v| !v.finished && !v.paused && !state.suspended)
            .map(|v| v.label.clone())
            .collect();
        labels.sort();
        labels
    }

    /// Sink volume of the newest live voice with `label`
    pub fn volume_of(&self, label: &str) -> Option<f32> {
        let state = self.state.borrow();
        state
            .voices
            .iter()
            .filter(|(_, v)| v.label == label && !v.finished)
            .max_by_key(|(handle, _)| handle.id)
            .map(|(_, v)| v.volume)
    }

    /// Sample count of the newest voice with `label`, if it was a decoded buffer
    pub fn samples_of(&self, label: &str) -> Option<usize> {
        let state = self.state.borrow();
        state
            .voices
            .iter()
            .filter(|(_, v)| v.label == label)
            .max_by_key(|(handle, _)| handle.id)
            .and_then(|(_, v)| v.samples)
    }

    /// Make every live voice with `label` end as if it ran out naturally
    pub fn finish(&self, label: &str) {
        for voice in self.state.borrow_mut().voices.values_mut() {
            if voice.label == label {
                voice.finished = true;
            }
        }
    }

    /// Whether output is suspended
    pub fn is_suspended(&self) -> bool {
        self.state.borrow().suspended
    }

    /// Override the assumed play time of encoded sources
    pub fn set_encoded_seconds(&self, seconds: f32) {
        self.state.borrow_mut().encoded_seconds = Some(seconds);
    }
}

/// Silent backend that simulates playback timing
pub struct NullBackend {
    state: Rc<RefCell<NullState>>,
    caps: BackendCaps,
    sample_rate: u32,
    next_id: u32,
    initialized: bool,
}

impl NullBackend {
    /// Create a backend that accepts decoded and streamed sources
    pub fn new() -> Self {
        Self::with_caps(BackendCaps::DECODE | BackendCaps::STREAM)
    }

    /// Create a backend advertising only `caps`
    pub fn with_caps(caps: BackendCaps) -> Self {
        Self {
            state: Rc::default(),
            caps,
            sample_rate: AudioBackendConfig::default().sample_rate,
            next_id: 0,
            initialized: false,
        }
    }

    /// Shared inspection handle
    pub fn probe(&self) -> NullProbe {
        NullProbe {
            state: Rc::clone(&self.state),
        }
    }

    fn with_voice<R>(&self, handle: SoundHandle, f: impl FnOnce(&mut NullVoice) -> R) -> Result<R, AudioError> {
        let mut state = self.state.borrow_mut();
        state.voices.get_mut(&handle).map(f).ok_or(AudioError::InvalidHandle)
    }
}

impl AudioBackend for NullBackend {
    fn initialize(&mut self, config: &AudioBackendConfig) -> Result<(), AudioError> {
        self.sample_rate = config.sample_rate;
        if !self.initialized {
            self.initialized = true;
            log::debug!("Null audio backend initialized at {} Hz", self.sample_rate);
        }
        Ok(())
    }

    fn shutdown(&mut self) {
        self.stop_all();
        self.initialized = false;
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn capabilities(&self) -> BackendCaps {
        self.caps
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn update(&mut self, delta_time: f32) {
        let mut state = self.state.borrow_mut();
        state.voices.retain(|_, voice| !voice.finished);
        if state.suspended {
            return;
        }

        for voice in state.voices.values_mut() {
            if voice.paused {
                continue;
            }
            let mut elapsed = delta_time;
            if voice.delay > 0.0 {
                let consumed = voice.delay.min(elapsed);
                voice.delay -= consumed;
                elapsed -= consumed;
            }
            if let Some(remaining) = voice.remaining.as_mut() {
                *remaining -= elapsed * voice.speed;
                if *remaining <= 0.0 {
                    voice.finished = true;
                }
            }
        }
    }

    fn play(&mut self, source: PlaySource, params: &PlayParams) -> Result<SoundHandle, AudioError> {
        if !self.initialized {
            return Err(AudioError::BackendNotInitialized);
        }

        let mut state = self.state.borrow_mut();
        let (seconds, samples) = match &source {
            PlaySource::Buffer(buffer) => (buffer.duration().as_secs_f32(), Some(buffer.samples.len())),
            PlaySource::Encoded(_) => (state.encoded_seconds.unwrap_or(DEFAULT_ENCODED_SECONDS), None),
        };

        let handle = SoundHandle::new(self.next_id, 0);
        self.next_id = self.next_id.wrapping_add(1);

        state.voices.insert(
            handle,
            NullVoice {
                label: params.label.clone(),
                volume: params.volume,
                speed: params.speed.max(0.01),
                delay: params.delay.max(0.0),
                remaining: if params.looped { None } else { Some(seconds) },
                paused: false,
                finished: false,
                samples,
            },
        );
        state.started.push(params.label.clone());
        Ok(handle)
    }

    fn pause(&mut self, handle: SoundHandle) -> Result<(), AudioError> {
        self.with_voice(handle, |voice| voice.paused = true)
    }

    fn resume(&mut self, handle: SoundHandle) -> Result<(), AudioError> {
        self.with_voice(handle, |voice| voice.paused = false)
    }

    fn stop(&mut self, handle: SoundHandle) {
        self.state.borrow_mut().voices.remove(&handle);
    }

    fn stop_all(&mut self) {
        self.state.borrow_mut().voices.clear();
    }

    fn set_volume(&mut self, handle: SoundHandle, volume: f32) -> Result<(), AudioError> {
        self.with_voice(handle, |voice| voice.volume = volume)
    }

    fn get_volume(&self, handle: SoundHandle) -> Result<f32, AudioError> {
        self.with_voice(handle, |voice| voice.volume)
    }

    fn is_playing(&self, handle: SoundHandle) -> bool {
        let state = self.state.borrow();
        !state.suspended
            && state
                .voices
                .get(&handle)
                .is_some_and(|voice| !voice.paused && !voice.finished)
    }

    fn is_finished(&self, handle: SoundHandle) -> bool {
        self.state
            .borrow()
            .voices
            .get(&handle)
            .map_or(true, |voice| voice.finished)
    }

    fn suspend_context(&mut self) {
        self.state.borrow_mut().suspended = true;
    }

    fn resume_context(&mut self) -> Result<(), AudioError> {
        if !self.initialized {
            return Err(AudioError::BackendNotInitialized);
        }
        self.state.borrow_mut().suspended = false;
        Ok(())
    }
}

impl Default for NullBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::asset::DecodedBuffer;

    fn ready() -> NullBackend {
        let mut backend = NullBackend::new();
        backend.initialize(&AudioBackendConfig::default()).unwrap();
        backend
    }

    fn half_second() -> PlaySource {
        PlaySource::Buffer(DecodedBuffer::new(1, 1000, vec![0.1; 500]))
    }

    fn labelled(label: &str) -> PlayParams {
        PlayParams {
            label: label.to_string(),
            ..PlayParams::default()
        }
    }

    #[test]
    fn test_plays_for_buffer_length() {
        let mut backend = ready();
        let handle = backend.play(half_second(), &labelled("a")).unwrap();

        backend.update(0.3);
        assert!(backend.is_playing(handle));
        backend.update(0.3);
        assert!(backend.is_finished(handle));
        assert!(!backend.is_playing(handle));
    }

    #[test]
    fn test_speed_and_delay() {
        let mut backend = ready();
        let params = PlayParams {
            speed: 2.0,
            delay: 0.2,
            ..labelled("fast")
        };
        let handle = backend.play(half_second(), &params).unwrap();

        backend.update(0.2);
        assert!(!backend.is_finished(handle));
        backend.update(0.26);
        assert!(backend.is_finished(handle));
    }

    #[test]
    fn test_looped_never_finishes() {
        let mut backend = ready();
        let params = PlayParams { looped: true, ..labelled("loop") };
        let handle = backend.play(half_second(), &params).unwrap();
        for _ in 0..100 {
            backend.update(0.1);
        }
        assert!(backend.is_playing(handle));
    }

    #[test]
    fn test_suspend_freezes_time() {
        let mut backend = ready();
        let handle = backend.play(half_second(), &labelled("a")).unwrap();
        backend.suspend_context();
        backend.update(5.0);
        assert!(!backend.is_finished(handle));
        assert!(!backend.is_playing(handle));
        backend.resume_context().unwrap();
        assert!(backend.is_playing(handle));
    }

    #[test]
    fn test_probe_sees_volume_and_finish() {
        let mut backend = ready();
        let probe = backend.probe();
        let handle = backend.play(half_second(), &labelled("music")).unwrap();
        backend.set_volume(handle, 0.25).unwrap();

        assert_eq!(probe.volume_of("music"), Some(0.25));
        assert_eq!(probe.samples_of("music"), Some(500));
        probe.finish("music");
        assert!(backend.is_finished(handle));
        assert_eq!(probe.live_count(), 0);
    }

    #[test]
    fn test_invalid_handle_operations() {
        let mut backend = ready();
        let invalid = SoundHandle::new(999, 0);
        assert!(matches!(backend.pause(invalid), Err(AudioError::InvalidHandle)));
        assert!(matches!(backend.resume(invalid), Err(AudioError::InvalidHandle)));
        assert!(matches!(backend.set_volume(invalid, 0.5), Err(AudioError::InvalidHandle)));
        assert!(matches!(backend.get_volume(invalid), Err(AudioError::InvalidHandle)));
        backend.stop(invalid);
    }

    #[test]
    fn test_requires_initialization() {
        let mut backend = NullBackend::new();
        let result = backend.play(half_second(), &PlayParams::default());
        assert!(matches!(result, Err(AudioError::BackendNotInitialized)));
    }
}
