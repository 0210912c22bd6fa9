//! Foundation module - Core utilities and types
//!
//! This module provides fundamental utilities used throughout the crate:
//! - Collections and stable handles
//! - Time management and deferred tasks
//! - Logging utilities

pub mod collections;
pub mod time;
pub mod logging;
