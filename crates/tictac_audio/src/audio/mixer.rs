//! Audio mixer system
//!
//! Two layers of gain. The shared buses (master, effects, music) belong to
//! the manager and are only changed through settings. Each live playback
//! additionally owns a private [`GainAutomation`] lane for its own fades and
//! ducking; instances never touch the buses.

use crate::audio::asset::SoundCategory;
use std::collections::HashMap;

/// Shared output buses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VolumeGroup {
    /// Master volume (affects all sounds)
    Master,
    /// Sound effects and interface sounds
    Effects,
    /// Background music
    Music,
}

impl VolumeGroup {
    /// Bus a sound category is routed to
    pub fn for_category(category: SoundCategory) -> Self {
        match category {
            SoundCategory::Music => Self::Music,
            SoundCategory::Effect | SoundCategory::Ui => Self::Effects,
        }
    }
}

/// Audio mixer managing the shared bus gains
#[derive(Debug, Clone)]
pub struct MixerSystem {
    /// Volume levels for each group (0.0 to 1.0)
    group_volumes: HashMap<VolumeGroup, f32>,
}

impl MixerSystem {
    /// Create a new mixer system with every bus at full volume
    pub fn new() -> Self {
        let group_volumes = [VolumeGroup::Master, VolumeGroup::Effects, VolumeGroup::Music]
            .into_iter()
            .map(|group| (group, 1.0))
            .collect();

        Self { group_volumes }
    }

    /// Set volume for a specific group (0.0 to 1.0)
    pub fn set_group_volume(&mut self, group: VolumeGroup, volume: f32) {
        self.group_volumes.insert(group, volume.clamp(0.0, 1.0));
    }

    /// Get volume for a specific group
    pub fn get_group_volume(&self, group: VolumeGroup) -> f32 {
        self.group_volumes.get(&group).copied().unwrap_or(1.0)
    }

    /// Effective gain of a bus: its own volume times master
    pub fn get_effective_volume(&self, group: VolumeGroup) -> f32 {
        let group_vol = self.get_group_volume(group);
        if group == VolumeGroup::Master {
            return group_vol;
        }
        group_vol * self.get_group_volume(VolumeGroup::Master)
    }
}

impl Default for MixerSystem {
    fn default() -> Self {
        Self::new()
    }
}

/// One linear segment of a gain lane
#[derive(Debug, Clone, Copy, PartialEq)]
struct Ramp {
    start: f64,
    end: f64,
    from: f32,
    to: f32,
}

impl Ramp {
    fn value_at(&self, t: f64) -> f32 {
        if t >= self.end || self.end <= self.start {
            return self.to;
        }
        let progress = ((t - self.start) / (self.end - self.start)) as f32;
        self.from + (self.to - self.from) * progress.clamp(0.0, 1.0)
    }
}

/// Per-instance gain lane: a resting value plus time-ordered linear ramps
///
/// Modelled on an audio-graph gain parameter: ramps are scheduled against
/// absolute clock time, and scheduling a new ramp cancels whatever was
/// planned after it starts.
#[derive(Debug, Clone, PartialEq)]
pub struct GainAutomation {
    initial: f32,
    ramps: Vec<Ramp>,
}

impl GainAutomation {
    /// Constant gain
    pub fn new(value: f32) -> Self {
        Self {
            initial: value,
            ramps: Vec::new(),
        }
    }

    /// Gain at clock time `t`
    pub fn value_at(&self, t: f64) -> f32 {
        let mut value = self.initial;
        for ramp in &self.ramps {
            if t < ramp.start {
                break;
            }
            value = ramp.value_at(t);
        }
        value
    }

    /// Drop every ramp starting after `t`, freezing the lane at its value there
    pub fn cancel_after(&mut self, t: f64) {
        let held = self.value_at(t);
        self.ramps.retain(|ramp| ramp.start <= t);
        if let Some(last) = self.ramps.last_mut() {
            if last.end > t {
                *last = Ramp {
                    start: last.start,
                    end: t,
                    from: last.from,
                    to: held,
                };
            }
        }
    }

    /// Ramp linearly from `from` at `start` to `to` at `end`
    pub fn schedule_ramp(&mut self, start: f64, end: f64, from: f32, to: f32) {
        self.cancel_after(start);
        self.ramps.push(Ramp {
            start,
            end: end.max(start),
            from,
            to,
        });
    }

    /// Ramp from the current value at `now` to `target` over `seconds`
    pub fn ramp_to(&mut self, now: f64, target: f32, seconds: f32) {
        let from = self.value_at(now);
        self.schedule_ramp(now, now + f64::from(seconds.max(0.0)), from, target);
    }

    /// Value the lane settles at once every ramp has run
    pub fn final_value(&self) -> f32 {
        self.ramps.last().map_or(self.initial, |ramp| ramp.to)
    }
}
