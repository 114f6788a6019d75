//! Display notification contract.
//!
//! The core never renders text. It hands a [`Notification`] to a
//! [`DisplaySink`]; the sink owns layout, scrolling and arbitration
//! between competing notifications (using `priority` as a hint).

use crate::error::Error;
use crate::stereo::OperatingMode;
use core::fmt::Write;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, Receiver, Sender};
use heapless::String;

/// Primary text capacity (bytes).
pub const TEXT_LEN: usize = 127;
/// Secondary text capacity (bytes).
pub const SUBTEXT_LEN: usize = 63;

/// What a notification is about.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DisplayKind {
    /// RDS station name.
    RadioStation,
    /// RDS song / artist text.
    RadioSong,
    BtTrack,
    BtArtist,
    BtAlbum,
    CallIncoming,
    CallActive,
    PhonebookContact,
    Volume,
    Frequency,
    ModeChange,
}

/// One display request.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Notification {
    pub kind: DisplayKind,
    pub text: String<TEXT_LEN>,
    pub subtext: String<SUBTEXT_LEN>,
    /// How long to show it; 0 keeps it until replaced.
    pub duration_ms: u32,
    /// Advisory, higher wins.
    pub priority: u8,
}

impl Notification {
    pub fn new(kind: DisplayKind, text: &str, subtext: &str, duration_ms: u32, priority: u8) -> Self {
        Self {
            kind,
            text: truncated(text),
            subtext: truncated(subtext),
            duration_ms,
            priority,
        }
    }

    /// Like [`Notification::new`] with a formatted primary text.
    pub fn formatted(
        kind: DisplayKind,
        text: core::fmt::Arguments<'_>,
        subtext: &str,
        duration_ms: u32,
        priority: u8,
    ) -> Self {
        let mut n = Self::new(kind, "", subtext, duration_ms, priority);
        // Overflow keeps what fitted.
        let _ = TruncatingWriter(&mut n.text).write_fmt(text);
        n
    }

    pub fn text(&self) -> &str {
        self.text.as_str()
    }

    pub fn subtext(&self) -> &str {
        self.subtext.as_str()
    }
}

/// Copy `s` into a bounded string, dropping whole characters that do not fit.
pub fn truncated<const N: usize>(s: &str) -> String<N> {
    let mut out = String::new();
    for c in s.chars() {
        if out.push(c).is_err() {
            break;
        }
    }
    out
}

struct TruncatingWriter<'a, const N: usize>(&'a mut String<N>);

impl<const N: usize> Write for TruncatingWriter<'_, N> {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        for c in s.chars() {
            self.0.push(c).map_err(|_| core::fmt::Error)?;
        }
        Ok(())
    }
}

/// Where notifications go.
pub trait DisplaySink {
    async fn show(&mut self, notification: Notification) -> Result<(), Error>;

    /// Called after every mode transition.
    async fn mode_changed(&mut self, _from: OperatingMode, _to: OperatingMode) -> Result<(), Error> {
        Ok(())
    }
}

pub const DISPLAY_QUEUE_DEPTH: usize = crate::config::DISPLAY_QUEUE_DEPTH;

/// Hand-off queue to a display task.
pub type DisplayQueue = Channel<CriticalSectionRawMutex, Notification, DISPLAY_QUEUE_DEPTH>;
pub type DisplayReceiver<'a> = Receiver<'a, CriticalSectionRawMutex, Notification, DISPLAY_QUEUE_DEPTH>;

/// A queue sender is a sink: notifications are handed to whichever task
/// drives the LCD. A full queue drops the notification.
impl<const N: usize> DisplaySink for Sender<'_, CriticalSectionRawMutex, Notification, N> {
    async fn show(&mut self, notification: Notification) -> Result<(), Error> {
        self.try_send(notification).map_err(|_| Error::Display)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_text_is_truncated_not_rejected() {
        let long = "x".repeat(300);
        let n = Notification::new(DisplayKind::RadioSong, &long, &long, 5000, 80);
        assert_eq!(n.text().len(), TEXT_LEN);
        assert_eq!(n.subtext().len(), SUBTEXT_LEN);
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let s: String<4> = truncated("aéé");
        assert_eq!(s.as_str(), "aé");
    }

    #[test]
    fn formatted_text() {
        let n = Notification::formatted(DisplayKind::Frequency, format_args!("Station {}: {}.{} MHz", 3, 98, 5), "", 2000, 130);
        assert_eq!(n.text(), "Station 3: 98.5 MHz");
        assert_eq!(n.subtext(), "");
    }

    #[tokio::test]
    async fn queue_sender_is_a_sink() {
        let queue: Channel<CriticalSectionRawMutex, Notification, 1> = Channel::new();
        let mut sink = queue.sender();
        let n = Notification::new(DisplayKind::ModeChange, "Power ON", "", 1500, 150);

        assert_eq!(sink.show(n.clone()).await, Ok(()));
        assert_eq!(sink.show(n.clone()).await, Err(Error::Display));
        assert_eq!(queue.try_receive().ok(), Some(n));
    }
}
