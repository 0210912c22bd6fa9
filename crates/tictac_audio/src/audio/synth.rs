//! Synthetic tone generator
//!
//! When an effect's asset cannot be fetched or decoded, the loader registers a
//! short procedural tone in its place so gameplay feedback never goes silent.
//! The mapping from name to tone is fixed; unknown names sound like `click`.

use crate::audio::asset::DecodedBuffer;
use std::f32::consts::TAU;

/// Length of every synthetic tone in seconds
pub const TONE_SECONDS: f32 = 0.15;

/// Overall attenuation applied after mixing partials
const HEADROOM: f32 = 0.3;

/// Oscillator shape, computed by formula per sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Waveform {
    /// Pure sine
    Sine,
    /// Symmetric triangle
    Triangle,
    /// Rising ramp
    Sawtooth,
    /// 50% duty square
    Square,
}

impl Waveform {
    /// Sample the waveform at `phase` cycles (only the fractional part matters)
    pub fn sample(self, phase: f32) -> f32 {
        let p = phase.rem_euclid(1.0);
        match self {
            Self::Sine => (TAU * p).sin(),
            Self::Triangle => 1.0 - 4.0 * (p - 0.5).abs(),
            Self::Sawtooth => 2.0 * p - 1.0,
            Self::Square => {
                if p < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
        }
    }
}

/// One oscillator in a tone: frequency in Hz and starting phase in cycles
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Partial {
    /// Frequency in Hz
    pub frequency: f32,
    /// Phase offset in cycles
    pub phase: f32,
}

/// Recipe for one synthetic tone
#[derive(Debug, Clone, PartialEq)]
pub struct ToneProfile {
    /// Oscillators summed together
    pub partials: Vec<Partial>,
    /// Shape shared by every partial
    pub waveform: Waveform,
    /// Exponential decay rate of the envelope (per second)
    pub decay: f32,
}

fn partials(frequencies: &[f32]) -> Vec<Partial> {
    // Spread starting phases so stacked partials don't all peak together
    let count = frequencies.len().max(1) as f32;
    frequencies
        .iter()
        .enumerate()
        .map(|(i, &frequency)| Partial {
            frequency,
            phase: i as f32 / count,
        })
        .collect()
}

/// Tone recipe for a sound name
pub fn profile_for(name: &str) -> ToneProfile {
    let (frequencies, waveform, decay): (&[f32], Waveform, f32) = match name {
        "move" => (&[440.0, 660.0], Waveform::Triangle, 18.0),
        "win" => (&[523.25, 659.25, 783.99], Waveform::Sine, 8.0),
        "lose" => (&[220.0, 207.65], Waveform::Sawtooth, 10.0),
        "error" => (&[160.0], Waveform::Square, 14.0),
        "uiClick" | "buttonClick" => (&[1200.0], Waveform::Sine, 45.0),
        "uiHover" | "buttonHover" => (&[1500.0], Waveform::Triangle, 60.0),
        _ => (&[800.0], Waveform::Sine, 30.0),
    };

    ToneProfile {
        partials: partials(frequencies),
        waveform,
        decay,
    }
}

/// Render the tone for `name` as a 150 ms mono buffer at `sample_rate`
pub fn synthesize(name: &str, sample_rate: u32) -> DecodedBuffer {
    render(&profile_for(name), sample_rate)
}

/// Render an arbitrary profile as a 150 ms mono buffer
pub fn render(profile: &ToneProfile, sample_rate: u32) -> DecodedBuffer {
    let rate = sample_rate.max(1) as f32;
    let frames = (rate * TONE_SECONDS).round() as usize;
    let voices = profile.partials.len().max(1) as f32;

    let samples = (0..frames)
        .map(|i| {
            let t = i as f32 / rate;
            let mixed: f32 = profile
                .partials
                .iter()
                .map(|partial| profile.waveform.sample(partial.frequency * t + partial.phase))
                .sum::<f32>()
                / voices;
            mixed * (-profile.decay * t).exp() * HEADROOM
        })
        .collect();

    DecodedBuffer::new(1, sample_rate.max(1), samples)
}
