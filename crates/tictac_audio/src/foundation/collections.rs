//! Specialized collection types

pub use slotmap::SlotMap;

slotmap::new_key_type! {
    /// Stable handle to one live playback instance
    ///
    /// Generational: once the instance is removed the key never resolves
    /// again, so a late timer holding an old id is inert.
    pub struct PlaybackId;
}

/// Handle-based map using slot map for stable references
pub type HandleMap<T> = SlotMap<PlaybackId, T>;
