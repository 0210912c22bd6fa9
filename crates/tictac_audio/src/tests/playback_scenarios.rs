//! Gating, loading, admission control and volume scenarios

use super::fixtures::{effect, music, wav_bytes, Harness};
use crate::audio::{
    synth, AssetManifest, AudioBackendConfig, MemorySource, MusicState, PlayOptions, PolicySettings, SettingsPatch,
    BACKGROUND_MUSIC,
};
use crate::events::{InputKind, Notice, PageEvent};
use approx::assert_relative_eq;

fn clicks_only() -> Harness {
    let manifest = AssetManifest::empty().with("click", effect("click.wav", 1.0));
    let source = MemorySource::new().with_file("click.wav", wav_bytes(0.2, 800.0));
    Harness::new(manifest, source, PolicySettings::default())
}

#[test]
fn test_overlapping_requests_share_one_fetch() {
    let mut harness = clicks_only();
    harness.manager.handle_event(PageEvent::Input(InputKind::Click));

    // Preload already started the fetch; these join it
    for _ in 0..3 {
        assert!(harness.manager.play_sound("click", PlayOptions::default()).is_none());
    }
    harness.manager.update(0.0);

    assert_eq!(harness.source.fetch_count("click.wav"), 1);
    assert_eq!(harness.probe.start_count("click"), 1);

    assert!(harness.manager.play_sound("click", PlayOptions::default()).is_some());
    assert_eq!(harness.source.fetch_count("click.wav"), 1);
}

#[test]
fn test_nothing_plays_before_a_gesture() {
    let mut harness = clicks_only();
    for _ in 0..3 {
        harness.manager.play_sound("click", PlayOptions::default());
    }
    harness.manager.handle_event(PageEvent::Input(InputKind::Scroll));
    harness.run(0.5);

    assert!(harness.probe.started().is_empty());
    assert_eq!(harness.manager.pending_count(), 3);
    assert!(!harness.manager.is_ready());

    harness.manager.handle_event(PageEvent::Input(InputKind::TouchStart));
    harness.manager.update(0.0);
    assert_eq!(harness.probe.start_count("click"), 1);

    // Remaining requests replay FIFO, paced apart
    harness.manager.update(0.05);
    harness.manager.update(0.05);
    assert_eq!(harness.probe.start_count("click"), 3);
    assert_eq!(harness.manager.pending_count(), 0);
}

#[test]
fn test_queued_requests_replay_in_arrival_order() {
    let manifest = AssetManifest::empty()
        .with("a", effect("a.wav", 1.0))
        .with("b", effect("b.wav", 1.0))
        .with("c", effect("c.wav", 1.0));
    let source = MemorySource::new()
        .with_file("a.wav", wav_bytes(0.5, 440.0))
        .with_file("b.wav", wav_bytes(0.5, 550.0))
        .with_file("c.wav", wav_bytes(0.5, 660.0));
    let mut harness = Harness::new(manifest, source, PolicySettings::default());

    for name in ["c", "a", "b"] {
        harness.manager.play_sound(name, PlayOptions::default());
    }
    harness.manager.handle_event(PageEvent::Input(InputKind::Click));
    harness.manager.update(0.0);
    harness.manager.update(0.05);
    harness.manager.update(0.05);

    assert_eq!(harness.probe.started(), vec!["c", "a", "b"]);
    assert_eq!(harness.manager.pending_count(), 0);
}

#[test]
fn test_gate_opens_once() {
    let mut harness = clicks_only();
    harness.manager.handle_event(PageEvent::Input(InputKind::Click));
    harness.manager.handle_event(PageEvent::Input(InputKind::KeyDown));

    let opened = harness
        .manager
        .drain_notices()
        .into_iter()
        .filter(|notice| *notice == Notice::GateOpened)
        .count();
    assert_eq!(opened, 1);
}

#[test]
fn test_forced_play_bypasses_gate() {
    let mut harness = clicks_only();
    harness.manager.play_sound("click", PlayOptions::default().forced());
    harness.manager.update(0.0);

    assert_eq!(harness.probe.start_count("click"), 1);
    assert_eq!(harness.manager.pending_count(), 0);
}

fn ceiling_harness(with_music: bool) -> Harness {
    let mut manifest = AssetManifest::empty().with("win", effect("win.wav", 1.0));
    let mut source = MemorySource::new().with_file("win.wav", wav_bytes(2.0, 523.25));
    if with_music {
        manifest.insert(BACKGROUND_MUSIC, music("theme.wav"));
        source = source.with_file("theme.wav", wav_bytes(1.0, 220.0));
    }
    let settings = PolicySettings {
        max_concurrent_sounds: 3,
        ..Default::default()
    };
    let mut harness = Harness::new(manifest, source, settings);
    harness.open_gate();
    harness
}

#[test]
fn test_ceiling_evicts_two_oldest() {
    let mut harness = ceiling_harness(false);

    let mut ids = Vec::new();
    for _ in 0..5 {
        ids.push(harness.manager.play_sound("win", PlayOptions::default()).unwrap());
        assert!(harness.manager.active_sound_count() <= 3);
        harness.manager.update(0.01);
        assert!(harness.manager.active_sound_count() <= 3);
    }

    let engine = harness.manager.engine();
    assert!(!engine.contains(ids[0]));
    assert!(!engine.contains(ids[1]));
    assert!(ids[2..].iter().all(|id| engine.contains(*id)));
}

#[test]
fn test_ceiling_evicts_oldest_within_one_frame() {
    let mut harness = ceiling_harness(false);

    let ids: Vec<_> = (0..5)
        .map(|_| harness.manager.play_sound("win", PlayOptions::default()).unwrap())
        .collect();

    let engine = harness.manager.engine();
    assert_eq!(engine.active_count(), 3);
    assert!(!engine.contains(ids[0]));
    assert!(!engine.contains(ids[1]));
    assert!(ids[2..].iter().all(|id| engine.contains(*id)));
}

#[test]
fn test_ceiling_never_evicts_music() {
    let mut harness = ceiling_harness(true);
    let track = harness.manager.background_music_id().unwrap();

    for _ in 0..5 {
        harness.manager.play_sound("win", PlayOptions::default());
        harness.manager.update(0.01);
        assert!(harness.manager.active_sound_count() <= 3);
    }

    assert!(harness.manager.engine().contains(track));
    assert!(harness.manager.is_background_music_playing());
}

#[test]
fn test_output_volume_multiplies_all_stages() {
    let manifest = AssetManifest::empty().with("click", effect("click.wav", 0.7));
    let source = MemorySource::new().with_file("click.wav", wav_bytes(0.5, 800.0));
    let settings = PolicySettings {
        sound_volume: 0.5,
        master_volume: 0.8,
        ..Default::default()
    };
    let mut harness = Harness::new(manifest, source, settings);
    harness.open_gate();

    let id = harness.manager.play_sound("click", PlayOptions::default()).unwrap();
    assert_relative_eq!(harness.manager.engine().computed_gain(id).unwrap(), 0.28, epsilon = 1e-6);
    assert_relative_eq!(harness.probe.volume_of("click").unwrap(), 0.28, epsilon = 1e-6);

    harness.manager.update_settings(SettingsPatch {
        master_volume: Some(0.4),
        ..Default::default()
    });
    assert_relative_eq!(harness.probe.volume_of("click").unwrap(), 0.14, epsilon = 1e-6);
}

#[test]
fn test_missing_effect_plays_synthetic_tone() {
    let manifest = AssetManifest::empty()
        .with("error", effect("missing/error.mp3", 1.0))
        .with(BACKGROUND_MUSIC, music("missing/theme.mp3"));
    let mut harness = Harness::new(manifest, MemorySource::new(), PolicySettings::default());
    harness.open_gate();

    assert!(harness
        .manager
        .drain_notices()
        .contains(&Notice::PreloadComplete { loaded: 1, failed: 1 }));
    assert_eq!(harness.manager.loaded_sounds(), vec!["error".to_string()]);

    harness.manager.play_sound("error", PlayOptions::default()).unwrap();
    let expected = synth::synthesize("error", AudioBackendConfig::default().sample_rate).samples.len();
    assert_eq!(harness.probe.samples_of("error"), Some(expected));
}

#[test]
fn test_missing_music_gives_up_quietly() {
    let manifest = AssetManifest::empty().with(BACKGROUND_MUSIC, music("missing/theme.mp3"));
    let mut harness = Harness::new(manifest, MemorySource::new(), PolicySettings::default());
    harness.open_gate();

    harness.manager.start_background_music();
    harness.run(6.0);

    assert!(!harness.manager.is_background_music_playing());
    assert_eq!(harness.manager.music_state(), MusicState::Idle);
    assert_eq!(harness.probe.start_count(BACKGROUND_MUSIC), 0);
}

#[test]
fn test_hidden_page_suspends_and_recovers() {
    let mut harness = clicks_only();
    harness.open_gate();
    let id = harness.manager.play_sound("click", PlayOptions::default()).unwrap();

    harness.manager.handle_event(PageEvent::VisibilityChanged { hidden: true });
    assert!(!harness.manager.engine().is_playing(id));
    harness.run(1.0);
    assert!(harness.manager.engine().contains(id));

    harness.manager.handle_event(PageEvent::VisibilityChanged { hidden: false });
    assert!(harness.manager.engine().is_playing(id));
}
