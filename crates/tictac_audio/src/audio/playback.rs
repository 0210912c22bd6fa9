//! Playback engine
//!
//! Owns the backend, the shared mixer buses and the active set: every sound
//! currently started, keyed by a generational [`PlaybackId`]. Admission
//! control keeps the active set under the configured ceiling by pruning
//! finished and leaked instances first and then evicting the oldest
//! effects.
//!
//! Each instance's audible volume is `instance gain × bus gain`, where the
//! instance gain is `asset volume × option volume` shaped by its private
//! automation lane, and the bus gain is `category volume × master`.

use crate::audio::asset::{AssetPayload, SoundAsset, SoundCategory};
use crate::audio::backend::{AudioBackend, PlayParams, PlaySource, SoundHandle};
use crate::audio::mixer::{GainAutomation, MixerSystem, VolumeGroup};
use crate::audio::PlayError;
use crate::foundation::collections::{HandleMap, PlaybackId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Instances older than this are considered leaked and force-removed
pub const STALE_AFTER_SECONDS: f64 = 10.0;

/// Most instances evicted to admit a single new one
pub const MAX_EVICTIONS_PER_PLAY: usize = 3;

/// Volume changes smaller than this are not pushed to the backend
const GAIN_EPSILON: f32 = 1e-4;

/// Per-request playback options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PlayOptions {
    /// Multiplier on the asset's base volume
    pub volume: f32,
    /// Speed multiplier (also shifts pitch)
    pub playback_rate: f32,
    /// Override the asset's loop flag
    #[serde(rename = "loop")]
    pub looped: Option<bool>,
    /// Seconds to ramp in from silence
    pub fade_in: Option<f32>,
    /// Seconds to ramp out to silence before `duration` elapses
    pub fade_out: Option<f32>,
    /// Seconds after start at which the sound is hard-stopped
    pub duration: Option<f32>,
    /// Seconds from now until playback starts
    pub when: f32,
    /// Bypass the interaction gate
    pub force: bool,
}

impl Default for PlayOptions {
    fn default() -> Self {
        Self {
            volume: 1.0,
            playback_rate: 1.0,
            looped: None,
            fade_in: None,
            fade_out: None,
            duration: None,
            when: 0.0,
            force: false,
        }
    }
}

impl PlayOptions {
    /// Set the volume multiplier
    pub fn with_volume(mut self, volume: f32) -> Self {
        self.volume = volume;
        self
    }

    /// Set the playback rate
    pub fn with_rate(mut self, rate: f32) -> Self {
        self.playback_rate = rate;
        self
    }

    /// Ramp in over `seconds`
    pub fn with_fade_in(mut self, seconds: f32) -> Self {
        self.fade_in = Some(seconds);
        self
    }

    /// Play for `duration` seconds, ramping out over the last `fade_out`
    pub fn with_fade_out(mut self, fade_out: f32, duration: f32) -> Self {
        self.fade_out = Some(fade_out);
        self.duration = Some(duration);
        self
    }

    /// Start `seconds` from now
    pub fn delayed(mut self, seconds: f32) -> Self {
        self.when = seconds;
        self
    }

    /// Force looping on or off
    pub fn looping(mut self, looped: bool) -> Self {
        self.looped = Some(looped);
        self
    }

    /// Bypass the interaction gate
    pub fn forced(mut self) -> Self {
        self.force = true;
        self
    }
}

/// What an instance is for; only effects are evicted or aged out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackRole {
    /// Effect or interface sound
    Effect,
    /// Music-category asset played directly rather than as the background track
    Music,
    /// The background track
    BackgroundMusic,
}

impl PlaybackRole {
    /// Role for a directly requested asset of `category`
    pub fn for_category(category: SoundCategory) -> Self {
        match category {
            SoundCategory::Music => Self::Music,
            SoundCategory::Effect | SoundCategory::Ui => Self::Effect,
        }
    }
}

/// Why an instance left the active set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// Ran out naturally
    Finished,
    /// Stopped on request
    Stopped,
    /// Reached its scheduled stop time
    Scheduled,
    /// Made room for a newer sound
    Evicted,
    /// Outlived [`STALE_AFTER_SECONDS`]
    Stale,
}

/// Record of an instance leaving the active set (emitted exactly once per instance)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completed {
    /// The removed instance
    pub id: PlaybackId,
    /// Asset it was playing
    pub name: String,
    /// Its role
    pub role: PlaybackRole,
    /// Why it ended
    pub reason: EndReason,
}

/// One live playback instance
#[derive(Debug)]
struct ActivePlayback {
    name: String,
    handle: SoundHandle,
    group: VolumeGroup,
    gain: GainAutomation,
    started_at: f64,
    // Admission order; breaks ties between instances started in the same tick
    seq: u64,
    role: PlaybackRole,
    looped: bool,
    stop_at: Option<f64>,
    paused: bool,
    applied: f32,
}

/// Active set, admission control and gain application
pub struct PlaybackEngine {
    backend: Box<dyn AudioBackend>,
    mixer: MixerSystem,
    voices: HandleMap<ActivePlayback>,
    max_concurrent: usize,
    now: f64,
    next_seq: u64,
    ended: Vec<Completed>,
}

impl PlaybackEngine {
    /// Create an engine around an initialized backend
    pub fn new(backend: Box<dyn AudioBackend>, max_concurrent: usize) -> Self {
        Self {
            backend,
            mixer: MixerSystem::new(),
            voices: HandleMap::with_key(),
            max_concurrent: max_concurrent.max(1),
            now: 0.0,
            next_seq: 0,
            ended: Vec::new(),
        }
    }

    /// Current clock time in seconds
    pub fn now(&self) -> f64 {
        self.now
    }

    /// The backend in use
    pub fn backend(&self) -> &dyn AudioBackend {
        self.backend.as_ref()
    }

    /// Mutable backend access (context suspend/resume)
    pub fn backend_mut(&mut self) -> &mut dyn AudioBackend {
        self.backend.as_mut()
    }

    /// Shared buses
    pub fn mixer(&self) -> &MixerSystem {
        &self.mixer
    }

    /// Mutable shared buses; changes are pushed on the next `update`
    pub fn mixer_mut(&mut self) -> &mut MixerSystem {
        &mut self.mixer
    }

    /// Change the concurrency ceiling
    pub fn set_max_concurrent(&mut self, max: usize) {
        self.max_concurrent = max.max(1);
    }

    /// Concurrency ceiling
    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Number of instances in the active set
    pub fn active_count(&self) -> usize {
        self.voices.len()
    }

    /// Whether `id` is still in the active set
    pub fn contains(&self, id: PlaybackId) -> bool {
        self.voices.contains_key(id)
    }

    /// Asset name of a live instance
    pub fn name_of(&self, id: PlaybackId) -> Option<&str> {
        self.voices.get(id).map(|voice| voice.name.as_str())
    }

    /// The one place that decides whether an instance is audible
    ///
    /// Checks the live backend state every call instead of trusting a
    /// cached flag: the instance must be in the active set, not paused, and
    /// not finished.
    pub fn is_playing(&self, id: PlaybackId) -> bool {
        self.voices
            .get(id)
            .is_some_and(|voice| !voice.paused && self.backend.is_playing(voice.handle))
    }

    /// Start `asset` with `options`
    pub fn play(&mut self, asset: &SoundAsset, options: &PlayOptions, role: PlaybackRole) -> Result<PlaybackId, PlayError> {
        self.prune();
        self.make_room()?;

        let gain = asset.volume * options.volume.max(0.0);
        let start = self.now + f64::from(options.when.max(0.0));

        let mut lane = GainAutomation::new(gain);
        if let Some(fade_in) = options.fade_in.filter(|secs| *secs > 0.0) {
            lane = GainAutomation::new(0.0);
            lane.schedule_ramp(start, start + f64::from(fade_in), 0.0, gain);
        }

        let mut stop_at = options.duration.map(|secs| start + f64::from(secs.max(0.0)));
        if let (Some(fade_out), Some(end)) = (options.fade_out, stop_at) {
            let ramp_start = (end - f64::from(fade_out.max(0.0))).max(start);
            let from = lane.value_at(ramp_start);
            lane.schedule_ramp(ramp_start, end, from, 0.0);
        } else if options.fade_out.is_some() {
            log::debug!("fade_out without duration ignored for '{}'", asset.name);
        }
        if stop_at.is_some_and(|end| end <= self.now) {
            stop_at = None;
        }

        let looped = role == PlaybackRole::BackgroundMusic || options.looped.unwrap_or(asset.looped);
        let group = VolumeGroup::for_category(asset.category);
        let volume = lane.value_at(self.now) * self.mixer.get_effective_volume(group);

        let source = match &asset.payload {
            AssetPayload::Graph(buffer) | AssetPayload::Synthetic(buffer) => PlaySource::Buffer(buffer.clone()),
            AssetPayload::Element(bytes) => PlaySource::Encoded(Arc::clone(bytes)),
        };
        let params = PlayParams {
            volume,
            speed: options.playback_rate.max(0.01),
            looped,
            delay: options.when.max(0.0),
            label: asset.name.clone(),
        };

        let handle = self.backend.play(source, &params).map_err(|e| {
            log::warn!("Backend refused '{}': {}", asset.name, e);
            PlayError::from(e)
        })?;

        let seq = self.next_seq;
        self.next_seq += 1;
        let id = self.voices.insert(ActivePlayback {
            name: asset.name.clone(),
            handle,
            group,
            gain: lane,
            started_at: start,
            seq,
            role,
            looped,
            stop_at,
            paused: false,
            applied: volume,
        });
        log::trace!("Started '{}' ({} active)", asset.name, self.voices.len());
        Ok(id)
    }

    /// Remove finished and stale instances
    fn prune(&mut self) {
        let now = self.now;
        let backend = self.backend.as_ref();
        let expired: Vec<(PlaybackId, EndReason)> = self
            .voices
            .iter()
            .filter_map(|(id, voice)| {
                if backend.is_finished(voice.handle) {
                    Some((id, EndReason::Finished))
                } else if voice.role == PlaybackRole::Effect && !voice.looped && now - voice.started_at > STALE_AFTER_SECONDS {
                    Some((id, EndReason::Stale))
                } else {
                    None
                }
            })
            .collect();

        for (id, reason) in expired {
            if reason == EndReason::Stale {
                log::debug!("Evicting leaked instance of '{}'", self.name_of(id).unwrap_or("?"));
            }
            self.remove(id, reason);
        }
    }

    /// Evict the oldest effects until one slot is free
    fn make_room(&mut self) -> Result<(), PlayError> {
        if self.voices.len() < self.max_concurrent {
            return Ok(());
        }

        let mut candidates: Vec<(f64, u64, PlaybackId)> = self
            .voices
            .iter()
            .filter(|(_, voice)| voice.role == PlaybackRole::Effect)
            .map(|(id, voice)| (voice.started_at, voice.seq, id))
            .collect();
        candidates.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

        let needed = (self.voices.len() + 1 - self.max_concurrent).min(MAX_EVICTIONS_PER_PLAY);
        for (_, _, id) in candidates.into_iter().take(needed) {
            log::debug!("Evicting '{}' to admit a new sound", self.name_of(id).unwrap_or("?"));
            self.remove(id, EndReason::Evicted);
        }

        if self.voices.len() >= self.max_concurrent {
            log::debug!("Concurrency ceiling of {} reached", self.max_concurrent);
            return Err(PlayError::CapacityExceeded(self.max_concurrent));
        }
        Ok(())
    }

    /// Take `id` out of the active set, stopping it unless it already ended
    fn remove(&mut self, id: PlaybackId, reason: EndReason) -> bool {
        let Some(voice) = self.voices.remove(id) else {
            return false;
        };
        if reason != EndReason::Finished {
            self.backend.stop(voice.handle);
        }
        self.ended.push(Completed {
            id,
            name: voice.name,
            role: voice.role,
            reason,
        });
        true
    }

    /// Stop one instance; returns whether it was live
    pub fn stop(&mut self, id: PlaybackId) -> bool {
        self.remove(id, EndReason::Stopped)
    }

    /// Stop every instance matching `predicate` (given name and role)
    pub fn stop_where(&mut self, mut predicate: impl FnMut(&str, PlaybackRole) -> bool) -> usize {
        let doomed: Vec<PlaybackId> = self
            .voices
            .iter()
            .filter(|(_, voice)| predicate(&voice.name, voice.role))
            .map(|(id, _)| id)
            .collect();
        doomed.into_iter().filter(|id| self.remove(*id, EndReason::Stopped)).count()
    }

    /// Stop everything
    pub fn stop_all(&mut self) -> usize {
        self.stop_where(|_, _| true)
    }

    /// Pause every playing instance
    pub fn pause_all(&mut self) {
        for voice in self.voices.values_mut() {
            if !voice.paused && self.backend.pause(voice.handle).is_ok() {
                voice.paused = true;
            }
        }
    }

    /// Resume everything paused by [`PlaybackEngine::pause_all`]
    pub fn resume_all(&mut self) {
        for voice in self.voices.values_mut() {
            if voice.paused && self.backend.resume(voice.handle).is_ok() {
                voice.paused = false;
            }
        }
    }

    /// Instance gain of `id` right now (before bus gains)
    pub fn gain_of(&self, id: PlaybackId) -> Option<f32> {
        self.voices.get(id).map(|voice| voice.gain.value_at(self.now))
    }

    /// Instance gain `id` will settle at once its ramps finish
    pub fn target_gain_of(&self, id: PlaybackId) -> Option<f32> {
        self.voices.get(id).map(|voice| voice.gain.final_value())
    }

    /// Full output gain of `id` right now: instance gain times bus gain
    pub fn computed_gain(&self, id: PlaybackId) -> Option<f32> {
        self.voices
            .get(id)
            .map(|voice| voice.gain.value_at(self.now) * self.mixer.get_effective_volume(voice.group))
    }

    /// Ramp the instance gain of `id` to `target` over `seconds`, starting now
    pub fn ramp_gain(&mut self, id: PlaybackId, target: f32, seconds: f32) -> bool {
        let now = self.now;
        self.voices
            .get_mut(id)
            .map(|voice| voice.gain.ramp_to(now, target, seconds))
            .is_some()
    }

    /// Hard-stop `id` once the clock reaches `at`
    pub fn schedule_stop(&mut self, id: PlaybackId, at: f64) -> bool {
        self.voices
            .get_mut(id)
            .map(|voice| voice.stop_at = Some(voice.stop_at.map_or(at, |existing| existing.min(at))))
            .is_some()
    }

    /// Advance the clock, reap ended instances and push gains to the backend
    ///
    /// Returns every instance that left the active set since the last call,
    /// whatever the reason.
    pub fn update(&mut self, delta_time: f32) -> Vec<Completed> {
        self.now += f64::from(delta_time.max(0.0));
        self.backend.update(delta_time);

        self.prune();

        let now = self.now;
        let due: Vec<PlaybackId> = self
            .voices
            .iter()
            .filter(|(_, voice)| voice.stop_at.is_some_and(|at| at <= now))
            .map(|(id, _)| id)
            .collect();
        for id in due {
            self.remove(id, EndReason::Scheduled);
        }

        self.apply_gains(false);
        std::mem::take(&mut self.ended)
    }

    /// Push automation and bus values to the backend
    pub fn apply_gains(&mut self, force: bool) {
        let now = self.now;
        for voice in self.voices.values_mut() {
            let volume = voice.gain.value_at(now) * self.mixer.get_effective_volume(voice.group);
            if force || (volume - voice.applied).abs() > GAIN_EPSILON {
                if let Err(e) = self.backend.set_volume(voice.handle, volume) {
                    log::trace!("Volume update for '{}' skipped: {}", voice.name, e);
                }
                voice.applied = volume;
            }
        }
    }

    /// Completions recorded outside `update` (explicit stops, evictions)
    pub fn take_completed(&mut self) -> Vec<Completed> {
        std::mem::take(&mut self.ended)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::asset::{AssetDescriptor, DecodedBuffer, SoundCategory};
    use crate::audio::backend::{AudioBackendConfig, NullBackend, NullProbe};
    use approx::assert_relative_eq;

    fn engine(max: usize) -> (PlaybackEngine, NullProbe) {
        let mut backend = NullBackend::new();
        backend.initialize(&AudioBackendConfig::default()).unwrap();
        let probe = backend.probe();
        (PlaybackEngine::new(Box::new(backend), max), probe)
    }

    fn asset(name: &str, category: SoundCategory, seconds: f32, volume: f32) -> SoundAsset {
        let frames = (1000.0 * seconds) as usize;
        let descriptor = AssetDescriptor::new(format!("{name}.wav"), category).with_volume(volume);
        let buffer = DecodedBuffer::new(1, 1000, vec![0.1; frames]);
        SoundAsset::new(name, &descriptor, AssetPayload::Graph(buffer))
    }

    #[test]
    fn test_gain_is_asset_times_option_times_bus() {
        let (mut engine, probe) = engine(8);
        engine.mixer_mut().set_group_volume(VolumeGroup::Effects, 0.5);
        engine.mixer_mut().set_group_volume(VolumeGroup::Master, 0.8);

        let click = asset("click", SoundCategory::Effect, 0.2, 0.7);
        let id = engine.play(&click, &PlayOptions::default(), PlaybackRole::Effect).unwrap();

        assert_relative_eq!(engine.computed_gain(id).unwrap(), 0.28, epsilon = 1e-6);
        assert_relative_eq!(probe.volume_of("click").unwrap(), 0.28, epsilon = 1e-6);
    }

    #[test]
    fn test_natural_completion_reported_once() {
        let (mut engine, _probe) = engine(8);
        let click = asset("click", SoundCategory::Effect, 0.1, 1.0);
        let id = engine.play(&click, &PlayOptions::default(), PlaybackRole::Effect).unwrap();

        let first = engine.update(0.2);
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].id, id);
        assert_eq!(first[0].reason, EndReason::Finished);
        assert!(engine.update(0.2).is_empty());
        assert!(!engine.stop(id));
        assert_eq!(engine.active_count(), 0);
    }

    #[test]
    fn test_ceiling_evicts_oldest_effects_only() {
        let (mut engine, _probe) = engine(3);
        let music = asset("theme", SoundCategory::Music, 60.0, 1.0);
        let music_id = engine.play(&music, &PlayOptions::default(), PlaybackRole::BackgroundMusic).unwrap();

        let mut ids = Vec::new();
        for i in 0..4 {
            let effect = asset(&format!("fx{i}"), SoundCategory::Effect, 5.0, 1.0);
            ids.push(engine.play(&effect, &PlayOptions::default(), PlaybackRole::Effect).unwrap());
            engine.update(0.01);
            assert!(engine.active_count() <= 3);
        }

        assert!(engine.contains(music_id));
        assert!(!engine.contains(ids[0]));
        assert!(!engine.contains(ids[1]));
        assert!(engine.contains(ids[2]));
        assert!(engine.contains(ids[3]));
    }

    #[test]
    fn test_same_tick_plays_evict_in_admission_order() {
        let (mut engine, probe) = engine(3);
        for name in ["a", "b", "c", "d", "e"] {
            let effect = asset(name, SoundCategory::Effect, 5.0, 1.0);
            engine.play(&effect, &PlayOptions::default(), PlaybackRole::Effect).unwrap();
        }

        // Freed slots get reused, so key order no longer matches age
        assert_eq!(engine.active_count(), 3);
        assert_eq!(probe.playing(), vec!["c", "d", "e"]);
    }

    #[test]
    fn test_capacity_exceeded_when_only_music_remains() {
        let (mut engine, _probe) = engine(1);
        let music = asset("theme", SoundCategory::Music, 60.0, 1.0);
        engine.play(&music, &PlayOptions::default(), PlaybackRole::BackgroundMusic).unwrap();

        let click = asset("click", SoundCategory::Effect, 0.1, 1.0);
        let result = engine.play(&click, &PlayOptions::default(), PlaybackRole::Effect);
        assert_eq!(result, Err(PlayError::CapacityExceeded(1)));
    }

    #[test]
    fn test_directly_played_music_is_not_evicted() {
        let (mut engine, _probe) = engine(2);
        let sting = asset("victory", SoundCategory::Music, 60.0, 1.0);
        let role = PlaybackRole::for_category(sting.category);
        assert_eq!(role, PlaybackRole::Music);
        let sting_id = engine.play(&sting, &PlayOptions::default(), role).unwrap();

        for name in ["a", "b", "c"] {
            let effect = asset(name, SoundCategory::Effect, 5.0, 1.0);
            engine.play(&effect, &PlayOptions::default(), PlaybackRole::Effect).unwrap();
        }
        assert!(engine.contains(sting_id));
        assert_eq!(engine.active_count(), 2);
    }

    #[test]
    fn test_stale_instances_are_removed() {
        let (mut engine, _probe) = engine(8);
        let long = asset("drone", SoundCategory::Effect, 30.0, 1.0);
        let id = engine.play(&long, &PlayOptions::default(), PlaybackRole::Effect).unwrap();

        for _ in 0..101 {
            engine.update(0.1);
        }
        assert!(!engine.contains(id));
    }

    #[test]
    fn test_fade_in_ramps_from_silence() {
        let (mut engine, _probe) = engine(8);
        let win = asset("win", SoundCategory::Effect, 2.0, 1.0);
        let id = engine
            .play(&win, &PlayOptions::default().with_fade_in(1.0), PlaybackRole::Effect)
            .unwrap();

        assert_relative_eq!(engine.gain_of(id).unwrap(), 0.0);
        engine.update(0.5);
        assert_relative_eq!(engine.gain_of(id).unwrap(), 0.5, epsilon = 1e-4);
        engine.update(0.6);
        assert_relative_eq!(engine.gain_of(id).unwrap(), 1.0);
    }

    #[test]
    fn test_fade_out_ends_with_hard_stop() {
        let (mut engine, _probe) = engine(8);
        let theme = asset("jingle", SoundCategory::Effect, 5.0, 1.0);
        let id = engine
            .play(&theme, &PlayOptions::default().with_fade_out(0.5, 1.0), PlaybackRole::Effect)
            .unwrap();

        engine.update(0.5);
        assert_relative_eq!(engine.gain_of(id).unwrap(), 1.0);
        engine.update(0.25);
        assert_relative_eq!(engine.gain_of(id).unwrap(), 0.5, epsilon = 1e-4);

        let ended = engine.update(0.3);
        assert_eq!(ended.len(), 1);
        assert_eq!(ended[0].reason, EndReason::Scheduled);
    }

    #[test]
    fn test_pause_and_resume_all() {
        let (mut engine, probe) = engine(8);
        let click = asset("click", SoundCategory::Effect, 1.0, 1.0);
        let id = engine.play(&click, &PlayOptions::default(), PlaybackRole::Effect).unwrap();

        engine.pause_all();
        assert!(!engine.is_playing(id));
        assert!(probe.playing().is_empty());

        engine.resume_all();
        assert!(engine.is_playing(id));
    }

    #[test]
    fn test_bus_change_is_pushed_on_update() {
        let (mut engine, probe) = engine(8);
        let theme = asset("theme", SoundCategory::Music, 60.0, 1.0);
        engine.play(&theme, &PlayOptions::default(), PlaybackRole::BackgroundMusic).unwrap();

        engine.mixer_mut().set_group_volume(VolumeGroup::Music, 0.25);
        engine.update(0.0);
        assert_relative_eq!(probe.volume_of("theme").unwrap(), 0.25);
    }
}
