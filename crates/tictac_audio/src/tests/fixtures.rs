//! Shared test fixtures: generated WAV files and a ready-made manager

use crate::audio::{
    AssetDescriptor, AssetManifest, AssetSource, AudioBackendConfig, AudioConfig, FetchMode, MemorySource,
    NullBackend, NullProbe, PolicySettings, SoundCategory, SoundManager,
};
use crate::events::{InputKind, PageEvent};
use hound::{SampleFormat, WavSpec, WavWriter};
use std::f32::consts::PI;
use std::io::Cursor;
use std::sync::Arc;

/// Sample rate of generated fixtures
pub const FIXTURE_SAMPLE_RATE: u32 = 22_050;

/// Step used by [`Harness::run`]
pub const TICK: f32 = 0.05;

/// Mono 16-bit sine wave WAV, entirely in memory
pub fn wav_bytes(seconds: f32, frequency: f32) -> Vec<u8> {
    let spec = WavSpec {
        channels: 1,
        sample_rate: FIXTURE_SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let frames = (FIXTURE_SAMPLE_RATE as f32 * seconds) as usize;
    let mut cursor = Cursor::new(Vec::new());
    let mut writer = WavWriter::new(&mut cursor, spec).unwrap();
    for i in 0..frames {
        let t = i as f32 / FIXTURE_SAMPLE_RATE as f32;
        let sample = (2.0 * PI * frequency * t).sin() * 0.5;
        writer.write_sample((sample * f32::from(i16::MAX)) as i16).unwrap();
    }
    writer.finalize().unwrap();
    cursor.into_inner()
}

/// Effect descriptor at `volume`
pub fn effect(path: &str, volume: f32) -> AssetDescriptor {
    AssetDescriptor::new(path, SoundCategory::Effect).with_volume(volume)
}

/// Looping music descriptor at full volume
pub fn music(path: &str) -> AssetDescriptor {
    AssetDescriptor::new(path, SoundCategory::Music)
}

/// A manager on the silent backend plus handles to inspect it
pub struct Harness {
    pub manager: SoundManager,
    pub probe: NullProbe,
    pub source: Arc<MemorySource>,
}

impl Harness {
    pub fn new(manifest: AssetManifest, source: MemorySource, settings: PolicySettings) -> Self {
        let backend = NullBackend::new();
        let probe = backend.probe();
        let source = Arc::new(source);
        let shared: Arc<dyn AssetSource> = Arc::clone(&source) as Arc<dyn AssetSource>;

        let config = AudioConfig {
            fetch_mode: FetchMode::Inline,
            settings,
            backend: AudioBackendConfig {
                headless: true,
                ..Default::default()
            },
            manifest,
        };

        Self {
            manager: SoundManager::new(config, Box::new(backend), shared),
            probe,
            source,
        }
    }

    /// Send a click and let the preload settle
    pub fn open_gate(&mut self) {
        self.manager.handle_event(PageEvent::Input(InputKind::Click));
        self.manager.update(0.0);
        self.manager.update(0.0);
    }

    /// Advance by `seconds` in fixed ticks
    pub fn run(&mut self, seconds: f32) {
        let steps = (seconds / TICK).round() as usize;
        for _ in 0..steps {
            self.manager.update(TICK);
        }
    }
}
