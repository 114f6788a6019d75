//! Input event pipeline - button ladder, rotary encoder, event queue.
//!
//! ```text
//!  ADC ladder ──(20 ms poll)──┐
//!  Encoder ISR ───────────────┼──▶ EventQueue ──▶ dispatcher (single consumer)
//!  Long-press monitor ────────┘
//! ```
//!
//! Producers only ever `try_send`; a full queue drops the event. The
//! dispatcher is the only reader and the only writer of mode state.

pub mod encoder;
pub mod ladder;
pub mod monitor;

use crate::config::EVENT_QUEUE_DEPTH;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, Receiver, Sender};
use embassy_time::Instant;

/// Physical buttons.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ButtonId {
    /// Push switch of the rotary encoder (separate GPIO).
    EncoderButton,
    Band1,
    Band2,
    Station1,
    Station2,
    Station3,
    Station4,
    Station5,
    SeekDown,
    SeekUp,
    None,
}

/// Ladder buttons in threshold order.
const LADDER_ORDER: [ButtonId; crate::config::LADDER_BUTTONS] = [
    ButtonId::Band1,
    ButtonId::Band2,
    ButtonId::Station1,
    ButtonId::Station2,
    ButtonId::Station3,
    ButtonId::Station4,
    ButtonId::Station5,
    ButtonId::SeekDown,
    ButtonId::SeekUp,
];

impl ButtonId {
    /// Ladder button at `index` in threshold order, `None` if out of range.
    pub(crate) fn from_ladder_index(index: usize) -> ButtonId {
        LADDER_ORDER.get(index).copied().unwrap_or(ButtonId::None)
    }

    /// Zero-based preset slot for the station buttons.
    pub fn station_slot(self) -> Option<usize> {
        match self {
            ButtonId::Station1 => Some(0),
            ButtonId::Station2 => Some(1),
            ButtonId::Station3 => Some(2),
            ButtonId::Station4 => Some(3),
            ButtonId::Station5 => Some(4),
            _ => None,
        }
    }

    pub fn is_none(self) -> bool {
        self == ButtonId::None
    }
}

/// Kinds of logical input events.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EventKind {
    Press,
    Release,
    LongPress,
    ReleaseAfterLongPress,
    Repeat,
    RotateCw,
    RotateCcw,
}

/// A decoded input event. Created by a decoder, consumed once by the
/// dispatcher.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ButtonEvent {
    pub button: ButtonId,
    pub kind: EventKind,
    pub timestamp: Instant,
}

impl ButtonEvent {
    pub const fn new(button: ButtonId, kind: EventKind, timestamp: Instant) -> Self {
        Self {
            button,
            kind,
            timestamp,
        }
    }
}

/// Bounded FIFO between the decoders and the dispatcher.
pub type EventQueue = Channel<CriticalSectionRawMutex, ButtonEvent, EVENT_QUEUE_DEPTH>;
pub type EventSender<'a> = Sender<'a, CriticalSectionRawMutex, ButtonEvent, EVENT_QUEUE_DEPTH>;
pub type EventReceiver<'a> = Receiver<'a, CriticalSectionRawMutex, ButtonEvent, EVENT_QUEUE_DEPTH>;

/// Non-blocking enqueue, safe from interrupt context.
///
/// Returns `false` when the queue was full and the event was dropped.
pub fn post(sender: &EventSender<'_>, event: ButtonEvent) -> bool {
    match sender.try_send(event) {
        Ok(()) => true,
        Err(_) => {
            trace!("Event queue full - dropped {}", event);
            false
        }
    }
}
