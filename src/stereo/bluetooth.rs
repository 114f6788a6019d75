//! A2DP / HFP sub-state, per-device volume profiles and the Bluetooth
//! and phone-call mode handlers.

use super::{emit, notify, notify_volume, Effect, Effects, Step, Volume};
use crate::audio::{AudioCommand, Mac};
use crate::config::{DEFAULT_A2DP_VOLUME, DEFAULT_HFP_MIC_VOLUME, DEFAULT_HFP_SPEAKER_VOLUME, MAX_BT_DEVICES};
use crate::display::DisplayKind;
use heapless::String;

#[derive(Debug, Clone)]
pub struct A2dpState {
    pub volume: Volume,
    pub playing: bool,
    pub title: String<63>,
    pub artist: String<63>,
}

impl A2dpState {
    pub fn new() -> Self {
        Self {
            volume: Volume::new(DEFAULT_A2DP_VOLUME),
            playing: false,
            title: String::new(),
            artist: String::new(),
        }
    }
}

impl Default for A2dpState {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct HfpState {
    pub speaker_volume: Volume,
    pub mic_volume: Volume,
    pub call_active: bool,
    pub caller_id: String<31>,
}

impl HfpState {
    pub fn new() -> Self {
        Self {
            speaker_volume: Volume::new(DEFAULT_HFP_SPEAKER_VOLUME),
            mic_volume: Volume::new(DEFAULT_HFP_MIC_VOLUME),
            call_active: false,
            caller_id: String::new(),
        }
    }
}

impl Default for HfpState {
    fn default() -> Self {
        Self::new()
    }
}

/// Volumes remembered for one paired device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DeviceProfile {
    pub mac: Mac,
    pub a2dp_volume: Volume,
    pub hfp_speaker_volume: Volume,
    pub hfp_mic_volume: Volume,
}

impl DeviceProfile {
    /// Stored as 6 address bytes followed by the three volumes.
    pub const PACKED_LEN: usize = 9;

    pub fn pack(&self) -> [u8; Self::PACKED_LEN] {
        let mut out = [0u8; Self::PACKED_LEN];
        out[..6].copy_from_slice(&self.mac);
        out[6] = self.a2dp_volume.get();
        out[7] = self.hfp_speaker_volume.get();
        out[8] = self.hfp_mic_volume.get();
        out
    }

    /// Volumes are clamped; anything but exactly 9 bytes is rejected.
    pub fn unpack(data: &[u8]) -> Option<Self> {
        if data.len() != Self::PACKED_LEN {
            return None;
        }
        let mut mac = [0u8; 6];
        mac.copy_from_slice(&data[..6]);
        Some(Self {
            mac,
            a2dp_volume: Volume::new(data[6]),
            hfp_speaker_volume: Volume::new(data[7]),
            hfp_mic_volume: Volume::new(data[8]),
        })
    }
}

/// Fixed set of profile slots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceTable {
    slots: [Option<DeviceProfile>; MAX_BT_DEVICES],
}

impl DeviceTable {
    pub const fn new() -> Self {
        Self {
            slots: [None; MAX_BT_DEVICES],
        }
    }

    pub fn find(&self, mac: &Mac) -> Option<&DeviceProfile> {
        self.slots.iter().flatten().find(|p| &p.mac == mac)
    }

    pub fn slot(&self, index: usize) -> Option<&DeviceProfile> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    pub(crate) fn set_slot(&mut self, index: usize, profile: Option<DeviceProfile>) {
        if let Some(slot) = self.slots.get_mut(index) {
            *slot = profile;
        }
    }

    /// Store `profile` in the slot already holding its MAC, else the first
    /// free slot, else slot 0. Returns the slot used.
    pub fn upsert(&mut self, profile: DeviceProfile) -> usize {
        let index = self
            .slots
            .iter()
            .position(|s| s.map_or(false, |p| p.mac == profile.mac))
            .or_else(|| self.slots.iter().position(Option::is_none))
            .unwrap_or(0);
        self.slots[index] = Some(profile);
        index
    }

    pub fn len(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Occupied slots with their index.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &DeviceProfile)> {
        self.slots.iter().enumerate().filter_map(|(i, s)| s.as_ref().map(|p| (i, p)))
    }
}

/// Bluetooth-mode action resolved by the policy table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MediaAction {
    Volume(Step),
    TogglePlayback,
    Next,
    Previous,
}

/// Phone-call action resolved by the policy table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CallAction {
    Volume(Step),
}

pub fn handle_media(a2dp: &mut A2dpState, action: MediaAction, fx: &mut Effects) {
    match action {
        MediaAction::Volume(step) => {
            let changed = a2dp.volume.step(step);
            notify_volume(fx, a2dp.volume, "Bluetooth", 120);
            emit(fx, Effect::Audio(AudioCommand::SetA2dpVolume(a2dp.volume.get())));
            if changed {
                emit(fx, Effect::Persist);
            }
        }
        MediaAction::TogglePlayback => {
            if a2dp.playing {
                a2dp.playing = false;
                emit(fx, Effect::Audio(AudioCommand::Pause));
                notify(fx, DisplayKind::ModeChange, "Paused", "", 1000, 110);
            } else {
                a2dp.playing = true;
                emit(fx, Effect::Audio(AudioCommand::Play));
                notify(fx, DisplayKind::ModeChange, "Playing", "", 1000, 110);
            }
        }
        MediaAction::Next => {
            emit(fx, Effect::Audio(AudioCommand::Next));
            notify(fx, DisplayKind::ModeChange, "Next Track", "", 1000, 110);
        }
        MediaAction::Previous => {
            emit(fx, Effect::Audio(AudioCommand::Previous));
            notify(fx, DisplayKind::ModeChange, "Previous Track", "", 1000, 110);
        }
    }
}

pub fn handle_call(hfp: &mut HfpState, action: CallAction, fx: &mut Effects) {
    match action {
        CallAction::Volume(step) => {
            if !hfp.speaker_volume.step(step) {
                return;
            }
            notify_volume(fx, hfp.speaker_volume, "Call Volume", 200);
            emit(fx, Effect::Audio(AudioCommand::SetHfpSpeakerVolume(hfp.speaker_volume.get())));
            emit(fx, Effect::Persist);
        }
    }
}
