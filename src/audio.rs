//! Audio-stack collaborator: outbound commands and inbound notifications.

use crate::config::STACK_QUEUE_DEPTH;
use crate::error::Error;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, Receiver, Sender};
use heapless::String;

/// Bluetooth device address.
pub type Mac = [u8; 6];

/// Commands the core sends to the Bluetooth stack.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AudioCommand {
    SetA2dpVolume(u8),
    SetHfpSpeakerVolume(u8),
    SetHfpMicVolume(u8),
    Play,
    Pause,
    Next,
    Previous,
    Answer,
    Hangup,
    StartVoice,
    StopVoice,
}

/// The Bluetooth audio/call stack.
pub trait AudioStack {
    async fn execute(&mut self, command: AudioCommand) -> Result<(), Error>;
}

/// Audio path a remote volume change applies to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum VolumeTarget {
    A2dp,
    HfpSpeaker,
    HfpMic,
}

/// Notifications raised by the stack (its own task or callbacks).
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StackEvent {
    Connected(Mac),
    Disconnected(Mac),
    Streaming(bool),
    CallStatus {
        active: bool,
        caller: Option<String<31>>,
    },
    Metadata {
        title: String<63>,
        artist: String<63>,
    },
    Rds {
        station: Option<String<31>>,
        song: Option<String<63>>,
    },
    RemoteVolume {
        target: VolumeTarget,
        volume: u8,
    },
}

pub type StackQueue = Channel<CriticalSectionRawMutex, StackEvent, STACK_QUEUE_DEPTH>;
pub type StackSender<'a> = Sender<'a, CriticalSectionRawMutex, StackEvent, STACK_QUEUE_DEPTH>;
pub type StackReceiver<'a> = Receiver<'a, CriticalSectionRawMutex, StackEvent, STACK_QUEUE_DEPTH>;
