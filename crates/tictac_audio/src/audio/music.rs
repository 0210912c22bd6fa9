//! Music system
//!
//! Keeps at most one background track alive. Start, stop, crossfade and duck
//! are all expressed as gain ramps and scheduled stops on the playback
//! engine; the controller itself only holds a non-owning [`PlaybackId`] to
//! the current track and clears it the moment that instance goes away.

use crate::audio::loader::AssetLoader;
use crate::audio::playback::{Completed, PlayOptions, PlaybackEngine, PlaybackRole};
use crate::audio::settings::{AssetManifest, PolicySettings};
use crate::events::Notice;
use crate::foundation::collections::PlaybackId;
use crate::foundation::time::Timeline;
use serde::Serialize;

/// Seconds between checks while waiting for a track to load
pub const LOAD_POLL_INTERVAL: f64 = 0.1;

/// Checks before a start attempt is abandoned (5 s at the interval above)
pub const LOAD_POLL_ATTEMPTS: u32 = 50;

/// Ramp length when ducking down
pub const DUCK_ATTACK_SECONDS: f32 = 0.1;

/// Ramp length when restoring after a duck
pub const DUCK_RELEASE_SECONDS: f32 = 0.3;

/// Background music state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MusicState {
    /// Nothing playing or pending
    Idle,
    /// A start is waiting for its asset
    Starting,
    /// The track is playing at its normal level
    Playing,
    /// The track is temporarily lowered
    Ducked,
    /// The last track is ramping out and nothing replaces it yet
    FadingOut,
}

/// How to bring a track in
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StartOptions {
    /// Seconds to ramp in from silence (0 for an immediate start)
    pub fade_in: f32,
    /// Multiplier on the track's base volume
    pub volume: f32,
}

impl Default for StartOptions {
    fn default() -> Self {
        Self {
            fade_in: 0.0,
            volume: 1.0,
        }
    }
}

/// Everything a music operation touches, borrowed from the manager
pub struct MusicContext<'a> {
    /// Live instances
    pub engine: &'a mut PlaybackEngine,
    /// Asset registry
    pub loader: &'a mut AssetLoader,
    /// Declared assets
    pub manifest: &'a AssetManifest,
    /// Current policy
    pub settings: &'a PolicySettings,
}

/// The current background track
#[derive(Debug, Clone)]
struct ActiveTrack {
    name: String,
    id: PlaybackId,
    start_volume: f32,
}

#[derive(Debug, Clone)]
enum MusicTask {
    PollAsset {
        track: String,
        options: StartOptions,
        attempt: u32,
    },
    Restore {
        id: PlaybackId,
    },
    CrossfadeIn {
        track: String,
        fade_in: f32,
    },
}

/// Single-track background music state machine
#[derive(Default)]
pub struct MusicController {
    current: Option<ActiveTrack>,
    starting: Option<String>,
    duck_restore: Option<f32>,
    fading: Vec<PlaybackId>,
    timeline: Timeline<MusicTask>,
    notices: Vec<Notice>,
}

impl MusicController {
    /// Create an idle controller
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state
    pub fn state(&self) -> MusicState {
        if self.starting.is_some() {
            MusicState::Starting
        } else if self.current.is_some() {
            if self.duck_restore.is_some() {
                MusicState::Ducked
            } else {
                MusicState::Playing
            }
        } else if !self.fading.is_empty() {
            MusicState::FadingOut
        } else {
            MusicState::Idle
        }
    }

    /// Name of the current track
    pub fn current_track(&self) -> Option<&str> {
        self.current.as_ref().map(|track| track.name.as_str())
    }

    /// Playback id of the current track
    pub fn current_id(&self) -> Option<PlaybackId> {
        self.current.as_ref().map(|track| track.id)
    }

    /// Volume the current track was started with
    pub fn start_volume(&self) -> Option<f32> {
        self.current.as_ref().map(|track| track.start_volume)
    }

    /// Whether the current track is audible right now
    pub fn is_playing(&self, engine: &PlaybackEngine) -> bool {
        self.current.as_ref().is_some_and(|track| engine.is_playing(track.id))
    }

    /// Notices produced since the last call
    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    /// Start `track`; returns whether an attempt began
    pub fn start(&mut self, ctx: &mut MusicContext<'_>, track: &str, options: StartOptions) -> bool {
        if !ctx.settings.music_enabled {
            log::debug!("Music disabled, not starting '{}'", track);
            return false;
        }

        if let Some(current) = &self.current {
            if !ctx.engine.contains(current.id) {
                log::debug!("Clearing stale reference to '{}'", current.name);
                self.current = None;
                self.duck_restore = None;
            } else if current.name == track && ctx.engine.is_playing(current.id) {
                log::trace!("'{}' already playing", track);
                return false;
            }
        }

        if let Some(pending) = &self.starting {
            log::debug!("Start of '{}' already in progress, ignoring '{}'", pending, track);
            return false;
        }

        self.starting = Some(track.to_string());
        self.attempt(ctx, track.to_string(), options, 0);
        true
    }

    fn attempt(&mut self, ctx: &mut MusicContext<'_>, track: String, options: StartOptions, attempt: u32) {
        let Some(asset) = ctx.loader.get(&track).cloned() else {
            if attempt == 0 {
                match ctx.manifest.get(&track) {
                    Some(descriptor) => {
                        ctx.loader.load(&track, descriptor);
                    }
                    None => {
                        log::warn!("Unknown music track '{}'", track);
                        self.starting = None;
                        return;
                    }
                }
            }
            if attempt >= LOAD_POLL_ATTEMPTS {
                log::warn!("Gave up waiting for '{}' to load", track);
                self.starting = None;
                return;
            }
            let due = ctx.engine.now() + LOAD_POLL_INTERVAL;
            self.timeline.schedule(
                due,
                MusicTask::PollAsset {
                    track,
                    options,
                    attempt: attempt + 1,
                },
            );
            return;
        };

        let mut play_options = PlayOptions::default().with_volume(options.volume).looping(true).forced();
        if options.fade_in > 0.0 {
            play_options = play_options.with_fade_in(options.fade_in);
        }

        self.starting = None;

        // A different track may still hold the slot
        if let Some(previous) = self.current.take() {
            ctx.engine.stop(previous.id);
            self.duck_restore = None;
        }

        match ctx.engine.play(&asset, &play_options, PlaybackRole::BackgroundMusic) {
            Ok(id) => {
                log::info!("Background music '{}' started", track);
                self.current = Some(ActiveTrack {
                    name: track.clone(),
                    id,
                    start_volume: asset.volume * options.volume,
                });
                self.notices.push(Notice::MusicStarted(track));
            }
            Err(e) => log::warn!("Could not start '{}': {}", track, e),
        }
    }

    /// Stop the current track, ramping it out over the configured fade time
    /// when `fade_out` is set
    ///
    /// Also cancels a start still waiting for its asset.
    pub fn stop(&mut self, ctx: &mut MusicContext<'_>, fade_out: bool) {
        self.timeline
            .cancel_where(|task| matches!(task, MusicTask::PollAsset { .. } | MusicTask::CrossfadeIn { .. }));
        if let Some(pending) = self.starting.take() {
            log::debug!("Cancelled pending start of '{}'", pending);
        }

        // Clear the reference before touching the instance
        let Some(track) = self.current.take() else {
            return;
        };
        self.duck_restore = None;
        self.timeline.cancel_where(|task| matches!(task, MusicTask::Restore { .. }));

        let fade = ctx.settings.fade_time_seconds;
        if fade_out && fade > 0.0 && ctx.engine.contains(track.id) {
            self.fade_out(ctx.engine, track.id, fade);
        } else {
            ctx.engine.stop(track.id);
        }
        log::info!("Background music '{}' stopped", track.name);
        self.notices.push(Notice::MusicStopped);
    }

    fn fade_out(&mut self, engine: &mut PlaybackEngine, id: PlaybackId, seconds: f32) {
        engine.ramp_gain(id, 0.0, seconds);
        engine.schedule_stop(id, engine.now() + f64::from(seconds));
        self.fading.push(id);
    }

    /// Fade the current track out over `fade_time` while `track` fades in
    /// over the second half
    pub fn crossfade_to(&mut self, ctx: &mut MusicContext<'_>, track: &str, fade_time: f32) {
        let fade_time = fade_time.max(0.0);
        let half = fade_time / 2.0;

        if let Some(previous) = self.current.take() {
            self.duck_restore = None;
            self.timeline.cancel_where(|task| matches!(task, MusicTask::Restore { .. }));
            if fade_time > 0.0 && ctx.engine.contains(previous.id) {
                self.fade_out(ctx.engine, previous.id, fade_time);
            } else {
                ctx.engine.stop(previous.id);
            }
            log::debug!("Crossfading '{}' → '{}'", previous.name, track);
        }

        let due = ctx.engine.now() + f64::from(half);
        self.timeline.schedule(
            due,
            MusicTask::CrossfadeIn {
                track: track.to_string(),
                fade_in: half,
            },
        );
    }

    /// Lower the current track by `amount` for `duration` seconds
    pub fn duck(&mut self, ctx: &mut MusicContext<'_>, amount: f32, duration: f32) {
        if !ctx.settings.ducking_enabled {
            return;
        }
        let Some(id) = self.current_id().filter(|id| ctx.engine.contains(*id)) else {
            return;
        };

        let restore = match self.duck_restore {
            Some(level) => level,
            None => ctx.engine.target_gain_of(id).unwrap_or(1.0),
        };
        self.duck_restore = Some(restore);

        ctx.engine.ramp_gain(id, restore * (1.0 - amount.clamp(0.0, 1.0)), DUCK_ATTACK_SECONDS);
        self.timeline.cancel_where(|task| matches!(task, MusicTask::Restore { .. }));
        let due = ctx.engine.now() + f64::from(duration.max(0.0));
        self.timeline.schedule(due, MusicTask::Restore { id });
    }

    /// React to an instance leaving the active set
    pub fn on_completed(&mut self, completed: &Completed) {
        self.fading.retain(|id| *id != completed.id);
        if self.current_id() == Some(completed.id) {
            log::debug!("Background track '{}' ended", completed.name);
            self.current = None;
            self.duck_restore = None;
            self.notices.push(Notice::MusicStopped);
        }
    }

    /// Run timers that are due
    pub fn update(&mut self, ctx: &mut MusicContext<'_>) {
        for task in self.timeline.drain_due(ctx.engine.now()) {
            match task {
                MusicTask::PollAsset { track, options, attempt } => {
                    if self.starting.as_deref() == Some(track.as_str()) {
                        self.attempt(ctx, track, options, attempt);
                    }
                }
                MusicTask::Restore { id } => {
                    if let Some(level) = self.duck_restore.take() {
                        if self.current_id() == Some(id) {
                            ctx.engine.ramp_gain(id, level, DUCK_RELEASE_SECONDS);
                        }
                    }
                }
                MusicTask::CrossfadeIn { track, fade_in } => {
                    let options = StartOptions {
                        fade_in,
                        ..StartOptions::default()
                    };
                    self.start(ctx, &track, options);
                }
            }
        }
    }

    /// Forget everything without touching the engine (after `stop_all`)
    pub fn reset(&mut self) {
        self.current = None;
        self.starting = None;
        self.duck_restore = None;
        self.fading.clear();
        self.timeline.clear();
    }
}
