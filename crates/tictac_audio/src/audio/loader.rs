//! Asset loading
//!
//! Turns manifest entries into registered [`SoundAsset`]s. Loads are
//! idempotent per name: a request for a name that is already registered or
//! already in flight never starts a second fetch. Fetch and decode happen off
//! the caller's tick, either on a worker thread ([`FetchMode::Threaded`]) or
//! on the next [`AssetLoader::poll`] ([`FetchMode::Inline`]).
//!
//! Failure ladder: fetch → decode (or keep bytes for streaming) → for
//! effect-category sounds only, a synthetic tone. Music has no substitute and
//! simply stays unregistered.

use crate::audio::asset::{AssetBackend, AssetDescriptor, AssetPayload, AudioFormat, DecodedBuffer, SoundAsset, SoundCategory};
use crate::audio::backend::BackendCaps;
use crate::audio::source::AssetSource;
use crate::audio::{synth, LoadError};
use rodio::{Decoder, Source};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::io::Cursor;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use std::thread;

/// Where fetch and decode run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchMode {
    /// One worker thread per load; results collected by `poll`
    #[default]
    Threaded,
    /// Run queued loads during the next `poll` (deterministic)
    Inline,
}

/// Immediate answer to a load request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadTicket {
    /// Already registered; nothing to do
    Ready,
    /// A load for this name was already running; this request joined it
    InFlight,
    /// A new load was started
    Started,
}

/// Settled load, reported once per started load
#[derive(Debug, Clone, PartialEq)]
pub struct LoadOutcome {
    /// Asset name
    pub name: String,
    /// Backend the asset was registered with, or why it was not registered
    pub result: Result<AssetBackend, LoadError>,
}

/// What a worker hands back
enum Prepared {
    Decoded(DecodedBuffer),
    Encoded(Arc<[u8]>),
}

struct Job {
    name: String,
    path: String,
    caps: BackendCaps,
}

type JobResult = (String, Result<Prepared, LoadError>);

/// Asset registry plus the machinery that fills it
pub struct AssetLoader {
    source: Arc<dyn AssetSource>,
    mode: FetchMode,
    caps: BackendCaps,
    sample_rate: u32,
    assets: HashMap<String, SoundAsset>,
    in_flight: HashMap<String, AssetDescriptor>,
    inline_jobs: VecDeque<Job>,
    results_tx: Sender<JobResult>,
    results_rx: Receiver<JobResult>,
}

impl AssetLoader {
    /// Create a loader for a backend with `caps` rendering at `sample_rate`
    pub fn new(source: Arc<dyn AssetSource>, mode: FetchMode, caps: BackendCaps, sample_rate: u32) -> Self {
        let (results_tx, results_rx) = channel();
        Self {
            source,
            mode,
            caps,
            sample_rate,
            assets: HashMap::new(),
            in_flight: HashMap::new(),
            inline_jobs: VecDeque::new(),
            results_tx,
            results_rx,
        }
    }

    /// Request `name`; shares any load already in flight
    pub fn load(&mut self, name: &str, descriptor: &AssetDescriptor) -> LoadTicket {
        if self.assets.contains_key(name) {
            return LoadTicket::Ready;
        }
        if self.in_flight.contains_key(name) {
            log::trace!("Joining in-flight load of '{}'", name);
            return LoadTicket::InFlight;
        }

        self.in_flight.insert(name.to_string(), descriptor.clone());
        let job = Job {
            name: name.to_string(),
            path: descriptor.path.clone(),
            caps: self.caps,
        };

        match self.mode {
            FetchMode::Inline => self.inline_jobs.push_back(job),
            FetchMode::Threaded => self.spawn(job),
        }
        log::debug!("Loading '{}' from {}", name, descriptor.path);
        LoadTicket::Started
    }

    fn spawn(&mut self, job: Job) {
        let source = Arc::clone(&self.source);
        let results_tx = self.results_tx.clone();
        let name = job.name.clone();
        let (tx_job, rx_job) = channel::<Job>();

        let spawned = thread::Builder::new()
            .name(format!("asset-load-{}", name))
            .spawn(move || {
                if let Ok(job) = rx_job.recv() {
                    let result = prepare(source.as_ref(), &job);
                    // The loader may be gone by now; nobody to tell
                    let _ = results_tx.send((job.name, result));
                }
            });

        match spawned {
            Ok(_) => {
                // The worker is alive, so the receiver is too
                let _ = tx_job.send(job);
            }
            Err(e) => {
                log::warn!("Could not spawn loader thread for '{}' ({}), loading inline", name, e);
                self.inline_jobs.push_back(job);
            }
        }
    }

    /// Run pending inline jobs, collect worker results and register assets
    pub fn poll(&mut self) -> Vec<LoadOutcome> {
        let mut finished: Vec<JobResult> = Vec::new();
        while let Some(job) = self.inline_jobs.pop_front() {
            let result = prepare(self.source.as_ref(), &job);
            finished.push((job.name, result));
        }
        finished.extend(self.results_rx.try_iter());

        finished
            .into_iter()
            .filter_map(|(name, result)| self.settle(name, result))
            .collect()
    }

    fn settle(&mut self, name: String, result: Result<Prepared, LoadError>) -> Option<LoadOutcome> {
        let Some(descriptor) = self.in_flight.remove(&name) else {
            log::debug!("Dropping result for '{}' with no pending load", name);
            return None;
        };

        let payload = match result {
            Ok(Prepared::Decoded(buffer)) => Ok(AssetPayload::Graph(buffer)),
            Ok(Prepared::Encoded(bytes)) => Ok(AssetPayload::Element(bytes)),
            Err(err) if descriptor.category == SoundCategory::Effect => {
                log::warn!("'{}' unavailable ({}), substituting synthetic tone", name, err);
                Ok(AssetPayload::Synthetic(synth::synthesize(&name, self.sample_rate)))
            }
            Err(err) => {
                log::warn!("Failed to load '{}': {}", name, err);
                Err(err)
            }
        };

        let result = payload.map(|payload| {
            let asset = SoundAsset::new(name.clone(), &descriptor, payload);
            let backend = asset.backend();
            log::debug!("Registered '{}' ({:?})", name, backend);
            self.assets.insert(name.clone(), asset);
            backend
        });

        Some(LoadOutcome { name, result })
    }

    /// Register an asset directly, bypassing fetch
    pub fn insert(&mut self, asset: SoundAsset) {
        self.assets.insert(asset.name.clone(), asset);
    }

    /// Look up a registered asset
    pub fn get(&self, name: &str) -> Option<&SoundAsset> {
        self.assets.get(name)
    }

    /// Whether `name` is registered
    pub fn is_loaded(&self, name: &str) -> bool {
        self.assets.contains_key(name)
    }

    /// Whether a load for `name` has not settled yet
    pub fn is_loading(&self, name: &str) -> bool {
        self.in_flight.contains_key(name)
    }

    /// Number of loads that have not settled
    pub fn pending_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Registered names, sorted
    pub fn loaded_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.assets.keys().cloned().collect();
        names.sort();
        names
    }

    /// Drop every registered asset; in-flight loads still register when they settle
    pub fn discard_all(&mut self) -> usize {
        let count = self.assets.len();
        self.assets.clear();
        count
    }
}

/// Fetch and prepare one asset according to the backend's capabilities
fn prepare(source: &dyn AssetSource, job: &Job) -> Result<Prepared, LoadError> {
    let bytes = source.fetch(&job.path)?;

    if job.caps.contains(BackendCaps::DECODE) {
        return decode(&job.path, bytes).map(Prepared::Decoded);
    }
    if job.caps.contains(BackendCaps::STREAM) {
        if AudioFormat::detect(&bytes) == AudioFormat::Unknown {
            return Err(LoadError::UnsupportedFormat(job.path.clone()));
        }
        return Ok(Prepared::Encoded(bytes.into()));
    }
    Err(LoadError::NoPlaybackPath(job.path.clone()))
}

/// Decode a whole file into interleaved f32 PCM
pub fn decode(path: &str, bytes: Vec<u8>) -> Result<DecodedBuffer, LoadError> {
    let decode_error = |reason: String| LoadError::Decode {
        path: path.to_string(),
        reason,
    };

    let format = AudioFormat::detect(&bytes);
    let decoder = Decoder::new(Cursor::new(bytes)).map_err(|e| decode_error(e.to_string()))?;
    let channels = decoder.channels();
    let sample_rate = decoder.sample_rate();
    let samples: Vec<f32> = decoder.convert_samples::<f32>().collect();

    if samples.is_empty() {
        return Err(decode_error("no audio frames".to_string()));
    }
    log::trace!("Decoded {} ({:?}): {} samples", path, format, samples.len());
    Ok(DecodedBuffer::new(channels, sample_rate, samples))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::source::MemorySource;
    use crate::tests::fixtures::wav_bytes;

    fn inline_loader(source: Arc<MemorySource>, caps: BackendCaps) -> AssetLoader {
        AssetLoader::new(source, FetchMode::Inline, caps, 44_100)
    }

    fn effect(path: &str) -> AssetDescriptor {
        AssetDescriptor::new(path, SoundCategory::Effect)
    }

    #[test]
    fn test_concurrent_loads_share_one_fetch() {
        let source = Arc::new(MemorySource::new().with_file("click.wav", wav_bytes(0.1, 440.0)));
        let mut loader = inline_loader(Arc::clone(&source), BackendCaps::DECODE);

        assert_eq!(loader.load("click", &effect("click.wav")), LoadTicket::Started);
        assert_eq!(loader.load("click", &effect("click.wav")), LoadTicket::InFlight);

        let outcomes = loader.poll();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].result, Ok(AssetBackend::Graph));
        assert_eq!(source.fetch_count("click.wav"), 1);
        assert_eq!(loader.load("click", &effect("click.wav")), LoadTicket::Ready);
    }

    #[test]
    fn test_effect_falls_back_to_synthetic() {
        let source = Arc::new(MemorySource::new());
        let mut loader = inline_loader(source, BackendCaps::DECODE);

        loader.load("win", &effect("missing/win.mp3"));
        let outcomes = loader.poll();
        assert_eq!(outcomes[0].result, Ok(AssetBackend::Synthetic));

        let asset = loader.get("win").unwrap();
        match &asset.payload {
            AssetPayload::Synthetic(buffer) => assert!(!buffer.is_empty()),
            other => panic!("expected synthetic payload, got {:?}", other.backend()),
        }
    }

    #[test]
    fn test_music_failure_stays_unregistered() {
        let source = Arc::new(MemorySource::new().with_file("theme.mp3", b"garbage!".to_vec()));
        let mut loader = inline_loader(source, BackendCaps::DECODE);

        loader.load("theme", &AssetDescriptor::new("theme.mp3", SoundCategory::Music));
        let outcomes = loader.poll();
        assert!(matches!(outcomes[0].result, Err(LoadError::Decode { .. })));
        assert!(!loader.is_loaded("theme"));
        assert!(!loader.is_loading("theme"));
    }

    #[test]
    fn test_streaming_backend_keeps_encoded_bytes() {
        let bytes = wav_bytes(0.05, 440.0);
        let source = Arc::new(MemorySource::new().with_file("move.wav", bytes.clone()));
        let mut loader = inline_loader(source, BackendCaps::STREAM);

        loader.load("move", &effect("move.wav"));
        loader.poll();
        match &loader.get("move").unwrap().payload {
            AssetPayload::Element(stored) => assert_eq!(stored.as_ref(), bytes.as_slice()),
            other => panic!("expected element payload, got {:?}", other.backend()),
        }
    }

    #[test]
    fn test_decoded_buffer_matches_fixture() {
        let buffer = decode("tone.wav", wav_bytes(0.25, 440.0)).unwrap();
        assert_eq!(buffer.channels, 1);
        assert_eq!(buffer.sample_rate, 22_050);
        assert!((buffer.duration().as_secs_f32() - 0.25).abs() < 0.01);
    }

    #[test]
    fn test_threaded_mode_settles() {
        let source = Arc::new(MemorySource::new().with_file("click.wav", wav_bytes(0.05, 880.0)));
        let mut loader = AssetLoader::new(source, FetchMode::Threaded, BackendCaps::DECODE, 44_100);
        loader.load("click", &effect("click.wav"));

        let mut outcomes = Vec::new();
        for _ in 0..500 {
            outcomes.extend(loader.poll());
            if !outcomes.is_empty() {
                break;
            }
            thread::sleep(std::time::Duration::from_millis(2));
        }
        assert_eq!(outcomes.len(), 1);
        assert!(loader.is_loaded("click"));
    }

    #[test]
    fn test_discard_all_forgets_assets() {
        let source = Arc::new(MemorySource::new());
        let mut loader = inline_loader(source, BackendCaps::DECODE);
        loader.load("click", &effect("click.wav"));
        loader.poll();
        assert_eq!(loader.loaded_names(), vec!["click".to_string()]);

        assert_eq!(loader.discard_all(), 1);
        assert!(loader.loaded_names().is_empty());
        assert_eq!(loader.load("click", &effect("click.wav")), LoadTicket::Started);
    }
}
