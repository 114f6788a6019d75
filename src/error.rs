//! Unified error type for the head unit core.
//!
//! We avoid `alloc` - all error variants are plain tags.
//! Implements `defmt::Format` for efficient on-target logging.

/// Top-level error type used across the crate.
///
/// None of these are fatal: callers log them and keep the in-memory
/// state as the source of truth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    // Storage
    /// Flash read/write/erase failed.
    Storage,

    /// A stored value had an unexpected size or encoding.
    Corrupt,

    // Collaborators
    /// The audio stack rejected or failed a command.
    Audio,

    /// The display sink could not accept a notification.
    Display,

    // Input
    /// The event queue was full and the event was dropped.
    QueueFull,
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let msg = match self {
            Error::Storage => "settings storage failure",
            Error::Corrupt => "corrupt stored value",
            Error::Audio => "audio stack command failed",
            Error::Display => "display sink rejected notification",
            Error::QueueFull => "event queue full",
        };
        f.write_str(msg)
    }
}
