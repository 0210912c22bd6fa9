//! Scenario tests for the audio core
//!
//! Everything here runs on the silent backend with inline loading, so time
//! only moves when a test calls `update`.

pub mod fixtures;

mod playback_scenarios;
