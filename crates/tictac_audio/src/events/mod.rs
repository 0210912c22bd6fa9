//! Page and input events consumed by the audio core, and the notices it emits
//!
//! The host translates whatever its windowing or browser layer reports into
//! [`PageEvent`]s and hands them to `SoundManager::handle_event`. Going the
//! other way, the manager queues [`Notice`]s that the host can drain at its
//! leisure (for a debug overlay, or to know when preloading finished).

use serde::Serialize;

/// Kind of input the host observed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputKind {
    /// Mouse or tap click
    Click,
    /// Touch began
    TouchStart,
    /// Touch ended
    TouchEnd,
    /// Key pressed
    KeyDown,
    /// Mouse button pressed
    MouseDown,
    /// Pointer pressed
    PointerDown,
    /// Pointer moved without pressing
    PointerMove,
    /// Wheel or touch scroll
    Scroll,
}

impl InputKind {
    /// Whether autoplay policy accepts this input as a user activation
    ///
    /// Movement and scrolling never unlock audio; presses do.
    pub fn is_activation(self) -> bool {
        !matches!(self, Self::PointerMove | Self::Scroll)
    }
}

/// Event delivered to the audio core
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageEvent {
    /// The user interacted with the page
    Input(InputKind),
    /// The page was hidden (`true`) or became visible again (`false`)
    VisibilityChanged {
        /// Whether the page is now hidden
        hidden: bool,
    },
    /// The host is short on memory
    MemoryWarning,
}

/// Outbound signal from the audio core
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Notice {
    /// The interaction gate opened
    GateOpened,
    /// Every asset of the bulk preload has settled
    PreloadComplete {
        /// Assets registered (including synthetic substitutes)
        loaded: usize,
        /// Assets that could not be registered
        failed: usize,
    },
    /// A background track started
    MusicStarted(String),
    /// The background track stopped
    MusicStopped,
    /// Assets were discarded to relieve memory pressure
    PerformanceMode,
}
