//! Event × mode × button → action table.
//!
//! Tier one (global interceptors) is checked before the mode is looked
//! at:
//!
//! | Button        | Event   | Action                                   |
//! |---------------|---------|------------------------------------------|
//! | EncoderButton | Press   | toggle power (end the call in PhoneCall) |
//! | Band1         | Press   | start voice assistant                    |
//! | Band2         | Press   | stop voice assistant                     |
//!
//! Everything else goes to the current mode's table below; `Off` and
//! `Phonebook` ignore it. In Bluetooth mode `Repeat` on the seek buttons
//! ramps the volume: holding a seek button turns the volume up or down,
//! and releasing it still skips a track.

use super::bluetooth::{CallAction, MediaAction};
use super::radio::RadioAction;
use super::{OperatingMode, Step};
use crate::input::{ButtonId, EventKind};

/// What an input event means in the current mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Action {
    Ignore,
    TogglePower,
    StartVoice,
    StopVoice,
    /// End the active call from the unit.
    HangUp,
    Radio(RadioAction),
    Media(MediaAction),
    Call(CallAction),
}

pub fn action(mode: OperatingMode, kind: EventKind, button: ButtonId) -> Action {
    match (button, kind) {
        (ButtonId::EncoderButton, EventKind::Press) => {
            return if mode == OperatingMode::PhoneCall {
                Action::HangUp
            } else {
                Action::TogglePower
            };
        }
        (ButtonId::Band1, EventKind::Press) => return Action::StartVoice,
        (ButtonId::Band2, EventKind::Press) => return Action::StopVoice,
        _ => {}
    }

    match mode {
        OperatingMode::Off | OperatingMode::Phonebook => Action::Ignore,
        OperatingMode::Radio => radio(kind, button),
        OperatingMode::Bluetooth => bluetooth(kind, button),
        OperatingMode::PhoneCall => phone_call(kind, button),
    }
}

fn radio(kind: EventKind, button: ButtonId) -> Action {
    use EventKind::*;

    let a = match (kind, button) {
        (RotateCw, _) => RadioAction::Rotate(Step::Up),
        (RotateCcw, _) => RadioAction::Rotate(Step::Down),
        (Release | ReleaseAfterLongPress, ButtonId::EncoderButton) => RadioAction::ToggleBrowse,
        (Release, ButtonId::SeekUp) => RadioAction::Seek(Step::Up),
        (Release, ButtonId::SeekDown) => RadioAction::Seek(Step::Down),
        (LongPress, ButtonId::Band2) => RadioAction::ToggleBand,
        (Release, b) => match b.station_slot() {
            Some(slot) => RadioAction::RecallPreset(slot),
            None => return Action::Ignore,
        },
        (LongPress, b) => match b.station_slot() {
            Some(slot) => RadioAction::StorePreset(slot),
            None => return Action::Ignore,
        },
        _ => return Action::Ignore,
    };
    Action::Radio(a)
}

fn bluetooth(kind: EventKind, button: ButtonId) -> Action {
    use EventKind::*;

    let a = match (kind, button) {
        (RotateCw, _) => MediaAction::Volume(Step::Up),
        (RotateCcw, _) => MediaAction::Volume(Step::Down),
        (Release | ReleaseAfterLongPress, ButtonId::EncoderButton) => MediaAction::TogglePlayback,
        (Release, ButtonId::SeekUp) => MediaAction::Next,
        (Release, ButtonId::SeekDown) => MediaAction::Previous,
        (Repeat, ButtonId::SeekUp) => MediaAction::Volume(Step::Up),
        (Repeat, ButtonId::SeekDown) => MediaAction::Volume(Step::Down),
        _ => return Action::Ignore,
    };
    Action::Media(a)
}

fn phone_call(kind: EventKind, _button: ButtonId) -> Action {
    match kind {
        EventKind::RotateCw => Action::Call(CallAction::Volume(Step::Up)),
        EventKind::RotateCcw => Action::Call(CallAction::Volume(Step::Down)),
        _ => Action::Ignore,
    }
}
