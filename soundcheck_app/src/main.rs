//! Soundcheck demo
//!
//! Drives the TicTac+ audio core through a short scripted session: a first
//! click opens the gate, a few effects and a win sequence play, the music is
//! ducked, the page is hidden and shown again, and the music fades out before
//! a final cleanup.
//!
//! Usage: `soundcheck [--headless] [--config FILE] [--assets DIR] [--url BASE]`

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tictac_audio::audio::{create_backend, AssetSource, HttpSource, NullBackend};
use tictac_audio::config::ConfigError;
use tictac_audio::prelude::*;

const FRAME: Duration = Duration::from_millis(16);
const RUN_SECONDS: f32 = 8.0;

#[derive(Debug, thiserror::Error)]
enum AppError {
    #[error("unknown argument '{0}'")]
    UnknownArgument(String),
    #[error("'{0}' expects a value")]
    MissingValue(&'static str),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[derive(Debug)]
struct Options {
    headless: bool,
    config: PathBuf,
    assets: PathBuf,
    url: Option<String>,
}

impl Options {
    fn parse(args: impl IntoIterator<Item = String>) -> Result<Self, AppError> {
        let mut options = Self {
            headless: false,
            config: PathBuf::from("soundcheck.toml"),
            assets: PathBuf::from("assets"),
            url: None,
        };

        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--headless" => options.headless = true,
                "--config" => options.config = args.next().ok_or(AppError::MissingValue("--config"))?.into(),
                "--assets" => options.assets = args.next().ok_or(AppError::MissingValue("--assets"))?.into(),
                "--url" => options.url = Some(args.next().ok_or(AppError::MissingValue("--url"))?),
                _ => return Err(AppError::UnknownArgument(arg)),
            }
        }
        Ok(options)
    }
}

/// One scripted step, fired once the session clock passes `at`
struct Cue {
    at: f32,
    label: &'static str,
    action: fn(&mut SoundManager),
}

fn script() -> Vec<Cue> {
    vec![
        Cue {
            at: 0.0,
            label: "queue a click before any gesture",
            action: |audio| {
                audio.play_sound("buttonClick", PlayOptions::default());
            },
        },
        Cue {
            at: 0.5,
            label: "first click",
            action: |audio| audio.handle_event(PageEvent::Input(InputKind::Click)),
        },
        Cue {
            at: 1.5,
            label: "moves",
            action: |audio| {
                audio.play_sound("move", PlayOptions::default());
                audio.play_sound("move", PlayOptions::default().with_volume(0.8).delayed(0.25));
            },
        },
        Cue {
            at: 2.5,
            label: "win sequence",
            action: |audio| {
                audio.play_sequence(
                    [
                        ("win", PlayOptions::default()),
                        ("buttonClick", PlayOptions::default().with_rate(1.5)),
                    ],
                    300,
                );
            },
        },
        Cue {
            at: 3.5,
            label: "duck music",
            action: |audio| audio.duck_background_music(0.3, 1.0),
        },
        Cue {
            at: 5.0,
            label: "page hidden",
            action: |audio| audio.handle_event(PageEvent::VisibilityChanged { hidden: true }),
        },
        Cue {
            at: 5.5,
            label: "page visible",
            action: |audio| audio.handle_event(PageEvent::VisibilityChanged { hidden: false }),
        },
        Cue {
            at: 6.0,
            label: "fade music out",
            action: |audio| audio.stop_background_music(true),
        },
    ]
}

fn build_manager(options: &Options, config: AudioConfig) -> SoundManager {
    let source: Arc<dyn AssetSource> = match &options.url {
        Some(base) => Arc::new(HttpSource::new(base.clone())),
        None => Arc::new(FileSource::new([options.assets.clone()])),
    };

    if options.headless {
        log::info!("Running headless");
        SoundManager::new(config, Box::new(NullBackend::new()), source)
    } else {
        let backend = create_backend(&config.backend);
        SoundManager::new(config, backend, source)
    }
}

fn run(options: &Options) -> Result<(), AppError> {
    let config = AudioConfig::load_or_default(&options.config)?;
    log::info!("Manifest has {} sounds", config.manifest.len());

    let mut audio = build_manager(options, config);
    let mut cues = script().into_iter().peekable();
    let mut timer = Timer::new();

    while timer.total_time() < RUN_SECONDS {
        std::thread::sleep(FRAME);
        timer.update();

        while let Some(cue) = cues.next_if(|cue| cue.at <= timer.total_time()) {
            log::info!("[{:>5.2}s] {}", timer.total_time(), cue.label);
            (cue.action)(&mut audio);
        }

        audio.update(timer.delta_time());

        for notice in audio.drain_notices() {
            log::info!("Notice: {:?}", notice);
        }

        if timer.frame_count() % 60 == 0 {
            log::debug!("Status: {:?}", audio.status());
        }
    }

    log::info!("Final status: {:?}", audio.status());
    audio.cleanup();
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("Starting soundcheck");
    let result = Options::parse(std::env::args().skip(1)).and_then(|options| run(&options));

    match result {
        Ok(()) => log::info!("Soundcheck finished"),
        Err(e) => {
            log::error!("Soundcheck failed: {}", e);
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|arg| (*arg).to_string()).collect()
    }

    #[test]
    fn test_parse_defaults() {
        let options = Options::parse(Vec::new()).unwrap();
        assert!(!options.headless);
        assert_eq!(options.config, PathBuf::from("soundcheck.toml"));
        assert!(options.url.is_none());
    }

    #[test]
    fn test_parse_flags() {
        let options = Options::parse(args(&["--headless", "--url", "http://localhost:8080"])).unwrap();
        assert!(options.headless);
        assert_eq!(options.url.as_deref(), Some("http://localhost:8080"));
    }

    #[test]
    fn test_parse_rejects_unknown() {
        assert!(matches!(
            Options::parse(args(&["--loud"])),
            Err(AppError::UnknownArgument(_))
        ));
        assert!(matches!(
            Options::parse(args(&["--config"])),
            Err(AppError::MissingValue("--config"))
        ));
    }

    #[test]
    fn test_script_is_ordered() {
        let cues = script();
        assert!(cues.windows(2).all(|pair| pair[0].at <= pair[1].at));
    }
}
