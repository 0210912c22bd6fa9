//! Sound manager
//!
//! The façade the game talks to. It owns policy settings, the asset loader,
//! the playback engine and the music controller, and decides when a request
//! may reach the engine at all:
//!
//! - nothing plays until the first user gesture opens the interaction gate;
//!   requests made before that are queued and replayed afterwards
//! - a hidden page pauses everything and queues new requests
//! - memory pressure stops all sound and drops every loaded asset
//!
//! Expected audio failures never surface as errors here. Play calls return
//! `Option<PlaybackId>` and log why nothing happened.

use crate::audio::backend::{create_backend, AudioBackend};
use crate::audio::loader::{AssetLoader, LoadOutcome, LoadTicket};
use crate::audio::mixer::VolumeGroup;
use crate::audio::music::{MusicContext, MusicController, MusicState, StartOptions};
use crate::audio::playback::{PlayOptions, PlaybackEngine, PlaybackRole};
use crate::audio::settings::{AssetManifest, AudioConfig, PolicySettings, SettingsPatch, BACKGROUND_MUSIC};
use crate::audio::source::AssetSource;
use crate::audio::PlayError;
use crate::events::{Notice, PageEvent};
use crate::foundation::collections::PlaybackId;
use crate::foundation::time::Timeline;
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

/// Most requests held while gated; the oldest is dropped beyond this
pub const MAX_PENDING_REQUESTS: usize = 32;

/// Distinct unknown names remembered for log-once warnings
const MAX_MISSING_LOGGED: usize = 64;

/// Spacing between replayed requests
pub const QUEUE_PACING_SECONDS: f64 = 0.05;

/// Autoplay gate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GateState {
    /// No user gesture seen yet
    Closed,
    /// Audio may play
    Open,
}

/// A play request held back by the gate or a hidden page
#[derive(Debug, Clone)]
struct PendingRequest {
    name: String,
    options: PlayOptions,
}

#[derive(Debug, Clone)]
enum Deferred {
    DrainQueue,
    SequenceStep { name: String, options: PlayOptions },
}

/// Bulk preload bookkeeping: the prioritized track first, then the rest
#[derive(Debug, Default)]
struct Preload {
    outstanding: HashSet<String>,
    rest_requested: bool,
    loaded: usize,
    failed: usize,
}

impl Preload {
    fn request(&mut self, loader: &mut AssetLoader, manifest: &AssetManifest, name: &str) {
        let Some(descriptor) = manifest.get(name) else {
            return;
        };
        match loader.load(name, descriptor) {
            LoadTicket::Ready => self.loaded += 1,
            LoadTicket::InFlight | LoadTicket::Started => {
                self.outstanding.insert(name.to_string());
            }
        }
    }

    fn request_rest(&mut self, loader: &mut AssetLoader, manifest: &AssetManifest) {
        self.rest_requested = true;
        let rest: Vec<String> = manifest
            .iter()
            .filter(|(name, _)| *name != BACKGROUND_MUSIC)
            .map(|(name, _)| name.to_string())
            .collect();
        for name in rest {
            self.request(loader, manifest, &name);
        }
    }

    fn settle(&mut self, outcome: &LoadOutcome) -> bool {
        if !self.outstanding.remove(&outcome.name) {
            return false;
        }
        match outcome.result {
            Ok(_) => self.loaded += 1,
            Err(_) => self.failed += 1,
        }
        true
    }

    fn is_done(&self) -> bool {
        self.rest_requested && self.outstanding.is_empty()
    }
}

/// Read-only snapshot for debug overlays and the demo binary
#[derive(Debug, Clone, Serialize)]
pub struct AudioStatus {
    /// Gate open and initialized
    pub ready: bool,
    /// Autoplay gate
    pub gate: GateState,
    /// Page hidden
    pub hidden: bool,
    /// Assets were dropped under memory pressure
    pub performance_mode: bool,
    /// Music state machine
    pub music_state: MusicState,
    /// Current background track
    pub music_track: Option<String>,
    /// Background track audible
    pub background_music_playing: bool,
    /// Live instances
    pub active_sounds: usize,
    /// Requests waiting for the gate or visibility
    pub pending_requests: usize,
    /// Loads not yet settled
    pub loading: usize,
    /// Registered assets, sorted
    pub loaded_sounds: Vec<String>,
    /// Current policy
    pub settings: PolicySettings,
}

/// Audio lifecycle and policy manager
pub struct SoundManager {
    settings: PolicySettings,
    manifest: AssetManifest,
    loader: AssetLoader,
    engine: PlaybackEngine,
    music: MusicController,
    timeline: Timeline<Deferred>,
    pending: VecDeque<PendingRequest>,
    awaiting_load: HashMap<String, PlayOptions>,
    preload: Option<Preload>,
    gate: GateState,
    hidden: bool,
    initialized: bool,
    performance_mode: bool,
    autostart: bool,
    draining: bool,
    missing_logged: HashSet<String>,
    notices: Vec<Notice>,
}

impl SoundManager {
    /// Create a manager around `backend`, loading assets from `source`
    pub fn new(config: AudioConfig, mut backend: Box<dyn AudioBackend>, source: Arc<dyn AssetSource>) -> Self {
        if !backend.is_initialized() {
            if let Err(e) = backend.initialize(&config.backend) {
                log::warn!("Audio backend unavailable: {}", e);
            }
        }

        let mut settings = config.settings;
        settings.sanitize();

        let loader = AssetLoader::new(source, config.fetch_mode, backend.capabilities(), backend.sample_rate());
        let engine = PlaybackEngine::new(backend, settings.max_concurrent_sounds);

        let mut manager = Self {
            settings,
            manifest: config.manifest,
            loader,
            engine,
            music: MusicController::new(),
            timeline: Timeline::new(),
            pending: VecDeque::new(),
            awaiting_load: HashMap::new(),
            preload: None,
            gate: GateState::Closed,
            hidden: false,
            initialized: false,
            performance_mode: false,
            autostart: false,
            draining: false,
            missing_logged: HashSet::new(),
            notices: Vec::new(),
        };
        manager.apply_bus_gains();
        manager
    }

    /// Create a manager on the platform's default output device
    pub fn with_default_backend(config: AudioConfig, source: Arc<dyn AssetSource>) -> Self {
        let backend = create_backend(&config.backend);
        Self::new(config, backend, source)
    }

    fn music_ctx(&mut self) -> (&mut MusicController, MusicContext<'_>) {
        (
            &mut self.music,
            MusicContext {
                engine: &mut self.engine,
                loader: &mut self.loader,
                manifest: &self.manifest,
                settings: &self.settings,
            },
        )
    }

    fn apply_bus_gains(&mut self) {
        let mixer = self.engine.mixer_mut();
        mixer.set_group_volume(VolumeGroup::Master, self.settings.master_volume);
        mixer.set_group_volume(VolumeGroup::Effects, self.settings.sound_volume);
        mixer.set_group_volume(VolumeGroup::Music, self.settings.music_volume);
        self.engine.set_max_concurrent(self.settings.max_concurrent_sounds);
        self.engine.apply_gains(true);
    }

    fn accepting(&self) -> bool {
        self.gate == GateState::Open && !self.hidden
    }

    // ========================================================================
    // Effects
    // ========================================================================

    /// Play `name`, or queue it while sound is off, the gate is closed or the
    /// page hidden
    ///
    /// `force` skips the gate and visibility checks but not the sound setting.
    ///
    /// Returns the new instance when it started right away. Names from the
    /// manifest that are not loaded yet are fetched and played once they
    /// settle.
    pub fn play_sound(&mut self, name: &str, options: PlayOptions) -> Option<PlaybackId> {
        if !self.settings.sound_enabled {
            log::trace!("'{}' held: {}", name, PlayError::Disabled);
            self.enqueue(name, options);
            return None;
        }
        if !options.force && !self.accepting() {
            self.enqueue(name, options);
            return None;
        }
        self.play_now(name, options)
    }

    fn play_now(&mut self, name: &str, options: PlayOptions) -> Option<PlaybackId> {
        match self.try_play(name, &options) {
            Ok(id) => id,
            Err(PlayError::NotFound(name)) => {
                if self.missing_logged.len() >= MAX_MISSING_LOGGED && !self.missing_logged.contains(&name) {
                    self.missing_logged.clear();
                }
                if self.missing_logged.insert(name.clone()) {
                    log::warn!("Sound not found: {}", name);
                }
                None
            }
            Err(e) => {
                log::debug!("'{}' not played: {}", name, e);
                None
            }
        }
    }

    fn try_play(&mut self, name: &str, options: &PlayOptions) -> Result<Option<PlaybackId>, PlayError> {
        if let Some(asset) = self.loader.get(name) {
            let role = PlaybackRole::for_category(asset.category);
            return self.engine.play(asset, options, role).map(Some);
        }

        let descriptor = self
            .manifest
            .get(name)
            .ok_or_else(|| PlayError::NotFound(name.to_string()))?;
        if self.loader.load(name, descriptor) != LoadTicket::Ready {
            log::debug!("'{}' not loaded yet, playing once it arrives", name);
            self.awaiting_load.insert(name.to_string(), options.clone());
        }
        Ok(None)
    }

    fn enqueue(&mut self, name: &str, options: PlayOptions) {
        if self.pending.len() >= MAX_PENDING_REQUESTS {
            if let Some(dropped) = self.pending.pop_front() {
                log::debug!("Pending queue full, dropping '{}'", dropped.name);
            }
        }
        log::debug!("Queued '{}' until audio is allowed", name);
        self.pending.push_back(PendingRequest {
            name: name.to_string(),
            options,
        });
    }

    fn schedule_drain(&mut self) {
        if !self.draining && !self.pending.is_empty() {
            self.draining = true;
            self.timeline.schedule(self.engine.now(), Deferred::DrainQueue);
        }
    }

    fn drain_one(&mut self) {
        self.draining = false;
        if !self.settings.sound_enabled {
            return;
        }
        let Some(front) = self.pending.front() else {
            return;
        };
        if !front.options.force && !self.accepting() {
            return;
        }
        if let Some(request) = self.pending.pop_front() {
            self.play_now(&request.name, request.options);
        }
        if !self.pending.is_empty() {
            self.draining = true;
            self.timeline
                .schedule(self.engine.now() + QUEUE_PACING_SECONDS, Deferred::DrainQueue);
        }
    }

    /// Play `entries` one after another, `interval_ms` apart
    ///
    /// Each step goes through [`SoundManager::play_sound`] when it fires, so
    /// a step that cannot play right away is queued or skipped without
    /// affecting the others.
    pub fn play_sequence<S: Into<String>>(&mut self, entries: impl IntoIterator<Item = (S, PlayOptions)>, interval_ms: u64) {
        let now = self.engine.now();
        let interval = interval_ms as f64 / 1000.0;
        for (index, (name, options)) in entries.into_iter().enumerate() {
            let name = name.into();
            if index == 0 {
                self.play_sound(&name, options);
            } else {
                self.timeline
                    .schedule(now + interval * index as f64, Deferred::SequenceStep { name, options });
            }
        }
    }

    // ========================================================================
    // Music
    // ========================================================================

    /// Start the background track (once audio is allowed)
    pub fn start_background_music(&mut self) {
        if !self.accepting() {
            log::debug!("Background music deferred until audio is allowed");
            self.autostart = true;
            return;
        }
        self.autostart = false;
        let (music, mut ctx) = self.music_ctx();
        music.start(&mut ctx, BACKGROUND_MUSIC, StartOptions::default());
    }

    /// Stop the background track, optionally fading it out
    pub fn stop_background_music(&mut self, fade_out: bool) {
        self.autostart = false;
        let (music, mut ctx) = self.music_ctx();
        music.stop(&mut ctx, fade_out);
    }

    /// Crossfade from the current track to `name`
    pub fn crossfade_to_track(&mut self, name: &str, fade_time_seconds: f32) {
        self.autostart = false;
        let (music, mut ctx) = self.music_ctx();
        music.crossfade_to(&mut ctx, name, fade_time_seconds);
    }

    /// Lower the music by `amount` for `duration_seconds`
    pub fn duck_background_music(&mut self, amount: f32, duration_seconds: f32) {
        let (music, mut ctx) = self.music_ctx();
        music.duck(&mut ctx, amount, duration_seconds);
    }

    /// Start the background track once the gate is open and the asset is in
    fn coordinate_music(&mut self) {
        if !self.autostart || !self.accepting() || !self.settings.music_enabled {
            return;
        }
        if self.music.state() == MusicState::Starting || self.music.is_playing(&self.engine) {
            self.autostart = false;
            return;
        }
        if !self.loader.is_loaded(BACKGROUND_MUSIC) {
            if !self.loader.is_loading(BACKGROUND_MUSIC) {
                if self.manifest.contains(BACKGROUND_MUSIC) {
                    log::warn!("Background music unavailable, not autostarting");
                }
                self.autostart = false;
            }
            return;
        }
        self.autostart = false;
        let (music, mut ctx) = self.music_ctx();
        music.start(&mut ctx, BACKGROUND_MUSIC, StartOptions::default());
    }

    // ========================================================================
    // Policy and lifecycle
    // ========================================================================

    /// Merge a settings change and react to it
    pub fn update_settings(&mut self, patch: SettingsPatch) {
        let before = self.settings.clone();
        self.settings.apply(&patch);
        self.apply_bus_gains();

        if before.music_enabled && !self.settings.music_enabled {
            self.stop_background_music(true);
        } else if !before.music_enabled
            && self.settings.music_enabled
            && self.gate == GateState::Open
            && !self.music.is_playing(&self.engine)
        {
            self.start_background_music();
        }

        if before.sound_enabled && !self.settings.sound_enabled {
            let stopped = self.engine.stop_where(|_, role| role != PlaybackRole::BackgroundMusic);
            log::debug!("Sound disabled, stopped {} sounds", stopped);
        } else if !before.sound_enabled && self.settings.sound_enabled {
            self.schedule_drain();
        }
    }

    /// Feed a page or input event
    pub fn handle_event(&mut self, event: PageEvent) {
        match event {
            PageEvent::Input(kind) => {
                if kind.is_activation() && self.gate == GateState::Closed {
                    log::info!("User gesture ({:?}) opened the audio gate", kind);
                    self.gate = GateState::Open;
                    self.notices.push(Notice::GateOpened);
                    self.initialize();
                }
            }
            PageEvent::VisibilityChanged { hidden: true } => {
                if !self.hidden {
                    log::debug!("Page hidden, pausing audio");
                    self.hidden = true;
                    self.engine.pause_all();
                    self.engine.backend_mut().suspend_context();
                }
            }
            PageEvent::VisibilityChanged { hidden: false } => {
                if self.hidden {
                    log::debug!("Page visible, resuming audio");
                    self.hidden = false;
                    if let Err(e) = self.engine.backend_mut().resume_context() {
                        log::warn!("Could not resume audio output: {}", e);
                    }
                    self.engine.resume_all();
                    self.schedule_drain();
                    self.coordinate_music();
                }
            }
            PageEvent::MemoryWarning => self.enter_performance_mode(),
        }
    }

    fn enter_performance_mode(&mut self) {
        {
            let (music, mut ctx) = self.music_ctx();
            music.stop(&mut ctx, false);
            music.reset();
        }
        let stopped = self.engine.stop_all();
        let discarded = self.loader.discard_all();
        self.awaiting_load.clear();
        self.performance_mode = true;
        log::info!(
            "Memory warning: stopped {} sounds, discarded {} assets",
            stopped,
            discarded
        );
        self.notices.push(Notice::PerformanceMode);
    }

    /// Resume output, preload assets, replay queued requests and autostart music
    ///
    /// Runs on the first user gesture; safe to call again.
    pub fn initialize(&mut self) {
        if let Err(e) = self.engine.backend_mut().resume_context() {
            log::warn!("Could not resume audio output: {}", e);
        }
        if self.preload.is_none() {
            self.start_preload();
        }
        self.initialized = true;
        self.schedule_drain();
        self.autostart = true;
        self.coordinate_music();
    }

    fn start_preload(&mut self) {
        let mut preload = Preload::default();
        if self.manifest.contains(BACKGROUND_MUSIC) {
            preload.request(&mut self.loader, &self.manifest, BACKGROUND_MUSIC);
        }
        if preload.outstanding.is_empty() {
            preload.request_rest(&mut self.loader, &self.manifest);
        }
        log::debug!("Preloading {} assets", self.manifest.len());
        self.preload = Some(preload);
        self.finish_preload_if_done();
    }

    fn on_loaded(&mut self, outcome: LoadOutcome) {
        if let Some(preload) = self.preload.as_mut() {
            if preload.settle(&outcome) && !preload.rest_requested && preload.outstanding.is_empty() {
                preload.request_rest(&mut self.loader, &self.manifest);
            }
        }
        self.finish_preload_if_done();

        if let Some(options) = self.awaiting_load.remove(&outcome.name) {
            if outcome.result.is_ok() {
                self.play_sound(&outcome.name, options);
            }
        }
    }

    fn finish_preload_if_done(&mut self) {
        if !self.preload.as_ref().is_some_and(Preload::is_done) {
            return;
        }
        if let Some(preload) = self.preload.take() {
            log::info!("Preload complete: {} loaded, {} failed", preload.loaded, preload.failed);
            self.notices.push(Notice::PreloadComplete {
                loaded: preload.loaded,
                failed: preload.failed,
            });
        }
    }

    /// Advance time by `delta_time` seconds
    ///
    /// Collects load results, reaps finished sounds, fires due timers and
    /// pushes gain automation to the backend.
    pub fn update(&mut self, delta_time: f32) {
        for completed in self.engine.update(delta_time) {
            self.music.on_completed(&completed);
        }

        for outcome in self.loader.poll() {
            self.on_loaded(outcome);
        }

        for task in self.timeline.drain_due(self.engine.now()) {
            match task {
                Deferred::DrainQueue => self.drain_one(),
                Deferred::SequenceStep { name, options } => {
                    self.play_sound(&name, options);
                }
            }
        }

        {
            let (music, mut ctx) = self.music_ctx();
            music.update(&mut ctx);
        }
        self.coordinate_music();

        // Explicit stops made during this tick
        for completed in self.engine.take_completed() {
            self.music.on_completed(&completed);
        }
        self.notices.extend(self.music.take_notices());
    }

    /// Notices emitted since the last call
    pub fn drain_notices(&mut self) -> Vec<Notice> {
        self.notices.extend(self.music.take_notices());
        std::mem::take(&mut self.notices)
    }

    /// Stop everything and drop queued work and loaded assets
    pub fn cleanup(&mut self) {
        self.music.reset();
        let stopped = self.engine.stop_all();
        self.engine.take_completed();
        self.timeline.clear();
        self.pending.clear();
        self.awaiting_load.clear();
        self.preload = None;
        self.draining = false;
        self.autostart = false;
        self.missing_logged.clear();
        let discarded = self.loader.discard_all();
        log::debug!("Cleanup: stopped {} sounds, discarded {} assets", stopped, discarded);
    }

    // ========================================================================
    // Status
    // ========================================================================

    /// Gate open and initialized
    pub fn is_ready(&self) -> bool {
        self.gate == GateState::Open && self.initialized
    }

    /// Whether the background track is live, unpaused and not finished
    pub fn is_background_music_playing(&self) -> bool {
        self.music.is_playing(&self.engine)
    }

    /// Registered asset names, sorted
    pub fn loaded_sounds(&self) -> Vec<String> {
        self.loader.loaded_names()
    }

    /// Live instances, music included
    pub fn active_sound_count(&self) -> usize {
        self.engine.active_count()
    }

    /// Autoplay gate state
    pub fn gate(&self) -> GateState {
        self.gate
    }

    /// Music state machine
    pub fn music_state(&self) -> MusicState {
        self.music.state()
    }

    /// Requests waiting for the gate or visibility
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Whether assets were dropped under memory pressure
    pub fn is_performance_mode(&self) -> bool {
        self.performance_mode
    }

    /// Current policy
    pub fn settings(&self) -> &PolicySettings {
        &self.settings
    }

    /// Playback engine (gains, liveness)
    pub fn engine(&self) -> &PlaybackEngine {
        &self.engine
    }

    /// Id of the current background track
    pub fn background_music_id(&self) -> Option<PlaybackId> {
        self.music.current_id()
    }

    /// Snapshot for overlays and logs
    pub fn status(&self) -> AudioStatus {
        AudioStatus {
            ready: self.is_ready(),
            gate: self.gate,
            hidden: self.hidden,
            performance_mode: self.performance_mode,
            music_state: self.music.state(),
            music_track: self.music.current_track().map(str::to_string),
            background_music_playing: self.is_background_music_playing(),
            active_sounds: self.engine.active_count(),
            pending_requests: self.pending.len(),
            loading: self.loader.pending_count(),
            loaded_sounds: self.loader.loaded_names(),
            settings: self.settings.clone(),
        }
    }
}
