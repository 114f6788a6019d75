//! Mode state machine.
//!
//! [`Stereo`] owns the operating mode, power state and every per-mode
//! sub-state. It is driven from a single task (the dispatcher), so none
//! of it is shared or locked.
//!
//! Every operation is synchronous and returns the side effects it wants
//! performed as [`Effects`]; the [`HeadUnit`](crate::HeadUnit) applies them
//! against the display, the audio stack and persistence. This keeps the
//! machine testable without any collaborator in place.
//!
//! Button events are resolved in two tiers by [`policy::action`]: global
//! interceptors (power, voice assistant) first, then the handler of the
//! current mode.

pub mod bluetooth;
pub mod policy;
pub mod radio;

pub use bluetooth::{A2dpState, CallAction, DeviceProfile, DeviceTable, HfpState, MediaAction};
pub use policy::Action;
pub use radio::{Band, RadioAction, RadioState};

use crate::audio::{AudioCommand, Mac, VolumeTarget};
use crate::config::VOLUME_MAX;
use crate::display::{truncated, DisplayKind, Notification};
use crate::input::ButtonEvent;
use embassy_time::Instant;
use heapless::Vec;

/// Top-level operating mode. Exactly one is active.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum OperatingMode {
    Off = 0,
    Radio = 1,
    Bluetooth = 2,
    PhoneCall = 3,
    Phonebook = 4,
}

impl OperatingMode {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(OperatingMode::Off),
            1 => Some(OperatingMode::Radio),
            2 => Some(OperatingMode::Bluetooth),
            3 => Some(OperatingMode::PhoneCall),
            4 => Some(OperatingMode::Phonebook),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Modes the user selects and that are resumed after power cycles
    /// and calls.
    pub fn is_user_mode(self) -> bool {
        matches!(
            self,
            OperatingMode::Radio | OperatingMode::Bluetooth | OperatingMode::Phonebook
        )
    }

    pub fn label(self) -> &'static str {
        match self {
            OperatingMode::Off => "Off",
            OperatingMode::Radio => "Radio",
            OperatingMode::Bluetooth => "Bluetooth",
            OperatingMode::PhoneCall => "Phone Call",
            OperatingMode::Phonebook => "Phonebook",
        }
    }
}

/// Volume step, always within `0..=VOLUME_MAX`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Volume(u8);

impl Volume {
    pub const MAX: Volume = Volume(VOLUME_MAX);

    /// Clamps out-of-range values.
    pub const fn new(value: u8) -> Self {
        if value > VOLUME_MAX {
            Volume(VOLUME_MAX)
        } else {
            Volume(value)
        }
    }

    pub const fn get(self) -> u8 {
        self.0
    }

    /// Move one step; returns whether the value changed.
    pub fn step(&mut self, step: Step) -> bool {
        let before = self.0;
        self.0 = match step {
            Step::Up => self.0.saturating_add(1).min(VOLUME_MAX),
            Step::Down => self.0.saturating_sub(1),
        };
        self.0 != before
    }
}

impl core::fmt::Display for Volume {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Direction of a relative adjustment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Step {
    Up,
    Down,
}

/// A side effect requested by the machine.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Effect {
    Notify(Notification),
    Audio(AudioCommand),
    /// Write the settings (power, mode, radio, volumes).
    Persist,
    /// Write the Bluetooth device profile table.
    PersistDevices,
    ModeChanged { from: OperatingMode, to: OperatingMode },
}

pub const MAX_EFFECTS: usize = 8;

pub type Effects = Vec<Effect, MAX_EFFECTS>;

pub(crate) fn emit(fx: &mut Effects, effect: Effect) {
    if fx.push(effect).is_err() {
        warn!("Effect list full - dropped effect");
    }
}

pub(crate) fn notify(fx: &mut Effects, kind: DisplayKind, text: &str, subtext: &str, duration_ms: u32, priority: u8) {
    emit(fx, Effect::Notify(Notification::new(kind, text, subtext, duration_ms, priority)));
}

pub(crate) fn notify_volume(fx: &mut Effects, volume: Volume, context: &str, priority: u8) {
    emit(
        fx,
        Effect::Notify(Notification::formatted(
            DisplayKind::Volume,
            format_args!("{}", volume),
            context,
            1000,
            priority,
        )),
    );
}

/// The head unit's control state.
#[derive(Debug, Clone)]
pub struct Stereo {
    pub(crate) mode: OperatingMode,
    pub(crate) powered_on: bool,
    /// Last user mode; survives power-off.
    pub(crate) resume_mode: OperatingMode,
    pub(crate) mode_before_call: OperatingMode,
    pub(crate) mode_before_phonebook: OperatingMode,
    pub(crate) voice_active: bool,
    pub(crate) radio: RadioState,
    pub(crate) a2dp: A2dpState,
    pub(crate) hfp: HfpState,
    pub(crate) devices: DeviceTable,
    pub(crate) current_device: Option<Mac>,
}

impl Default for Stereo {
    fn default() -> Self {
        Self::new()
    }
}

impl Stereo {
    /// Power-on defaults, before anything is loaded from storage.
    pub fn new() -> Self {
        Self {
            mode: OperatingMode::Off,
            powered_on: false,
            resume_mode: OperatingMode::Radio,
            mode_before_call: OperatingMode::Radio,
            mode_before_phonebook: OperatingMode::Radio,
            voice_active: false,
            radio: RadioState::new(),
            a2dp: A2dpState::new(),
            hfp: HfpState::new(),
            devices: DeviceTable::new(),
            current_device: None,
        }
    }

    pub fn mode(&self) -> OperatingMode {
        self.mode
    }

    pub fn is_powered_on(&self) -> bool {
        self.powered_on
    }

    pub fn resume_mode(&self) -> OperatingMode {
        self.resume_mode
    }

    /// Mode restored when the current call ends.
    pub fn mode_before_call(&self) -> OperatingMode {
        self.mode_before_call
    }

    pub fn voice_active(&self) -> bool {
        self.voice_active
    }

    pub fn radio(&self) -> &RadioState {
        &self.radio
    }

    pub fn a2dp(&self) -> &A2dpState {
        &self.a2dp
    }

    pub fn hfp(&self) -> &HfpState {
        &self.hfp
    }

    pub fn devices(&self) -> &DeviceTable {
        &self.devices
    }

    pub fn current_device(&self) -> Option<Mac> {
        self.current_device
    }

    /// When the pending browse candidate should be tuned, if any.
    pub fn browse_deadline(&self) -> Option<Instant> {
        if self.mode != OperatingMode::Radio {
            return None;
        }
        self.radio.browse_deadline()
    }

    /// Apply the persisted power flag and resume mode. Produces no effects.
    pub(crate) fn restore_power(&mut self, powered_on: bool, resume: OperatingMode) {
        if resume.is_user_mode() {
            self.resume_mode = resume;
        }
        if powered_on {
            self.mode = self.resume_mode;
            self.powered_on = true;
        } else {
            self.mode = OperatingMode::Off;
            self.powered_on = false;
        }
    }

    // ═══════════════════════════════════════════════════════════════
    // Transitions
    // ═══════════════════════════════════════════════════════════════

    /// The only place `mode` and `powered_on` change.
    fn transition(&mut self, to: OperatingMode, fx: &mut Effects) {
        let from = self.mode;
        if from == to {
            return;
        }

        match to {
            OperatingMode::PhoneCall => {
                self.mode_before_call = match from {
                    OperatingMode::Phonebook => self.mode_before_phonebook,
                    m if m.is_user_mode() => m,
                    _ => self.resume_mode,
                };
            }
            OperatingMode::Phonebook => {
                if matches!(from, OperatingMode::Radio | OperatingMode::Bluetooth) {
                    self.mode_before_phonebook = from;
                }
            }
            _ => {}
        }

        if from == OperatingMode::Radio {
            self.radio.cancel_browse();
        }

        if to == OperatingMode::Off && self.voice_active {
            self.voice_active = false;
            emit(fx, Effect::Audio(AudioCommand::StopVoice));
        }

        self.mode = to;
        self.powered_on = to != OperatingMode::Off;
        if to.is_user_mode() {
            self.resume_mode = to;
        }

        info!("Mode: {} -> {}", from, to);
        emit(fx, Effect::ModeChanged { from, to });
    }

    fn toggle_power(&mut self, fx: &mut Effects) {
        if self.mode == OperatingMode::Off {
            info!("Power ON");
            self.transition(OperatingMode::Radio, fx);
            notify(fx, DisplayKind::ModeChange, "Power ON", "", 1500, 150);
        } else {
            info!("Power OFF");
            self.transition(OperatingMode::Off, fx);
            notify(fx, DisplayKind::ModeChange, "Power OFF", "", 1000, 150);
        }
        emit(fx, Effect::Persist);
    }

    /// Power on into `target` if off; if already on, switch unless a call
    /// is in progress.
    fn auto_power_on(&mut self, target: OperatingMode, reason: &str, fx: &mut Effects) {
        if self.powered_on {
            if self.mode != target && self.mode != OperatingMode::PhoneCall {
                self.transition(target, fx);
                notify(fx, DisplayKind::ModeChange, target.label(), reason, 1500, 180);
                emit(fx, Effect::Persist);
            }
            return;
        }

        info!("Auto power on: {}", reason);
        self.transition(target, fx);
        notify(fx, DisplayKind::ModeChange, "Auto Power ON", reason, 2000, 200);
        emit(fx, Effect::Persist);
    }

    fn end_call(&mut self, fx: &mut Effects) {
        self.hfp.call_active = false;
        let resume = self.mode_before_call;
        self.transition(resume, fx);
        emit(fx, Effect::Persist);
    }

    // ═══════════════════════════════════════════════════════════════
    // Voice assistant
    // ═══════════════════════════════════════════════════════════════

    fn start_voice(&mut self, fx: &mut Effects) {
        if self.voice_active {
            warn!("Voice assistant already active");
            notify(fx, DisplayKind::ModeChange, "Voice Assistant", "Already Active", 2000, 200);
            return;
        }
        if !self.powered_on || !matches!(self.mode, OperatingMode::Radio | OperatingMode::Bluetooth) {
            warn!("Voice assistant not available in {}", self.mode);
            notify(fx, DisplayKind::ModeChange, "Voice Assistant", "Not Available", 2000, 200);
            return;
        }

        info!("Starting voice assistant");
        self.voice_active = true;
        notify(fx, DisplayKind::ModeChange, "Voice Assistant", "Listening...", 0, 200);
        emit(fx, Effect::Audio(AudioCommand::StartVoice));
    }

    fn stop_voice(&mut self, fx: &mut Effects) {
        if !self.voice_active {
            warn!("Voice assistant not active");
            return;
        }

        info!("Stopping voice assistant");
        self.voice_active = false;
        emit(fx, Effect::Audio(AudioCommand::StopVoice));
        notify(fx, DisplayKind::ModeChange, "Voice Assistant", "Stopped", 1500, 180);
    }

    /// Feedback for an audio command the stack failed to execute.
    pub fn on_audio_failure(&mut self, command: AudioCommand) -> Effects {
        let mut fx = Effects::new();
        match command {
            AudioCommand::StartVoice => {
                error!("Failed to start voice assistant");
                self.voice_active = false;
                notify(&mut fx, DisplayKind::ModeChange, "Voice Assistant", "Failed to Start", 2000, 200);
            }
            AudioCommand::StopVoice if self.powered_on => {
                error!("Failed to stop voice assistant");
                self.voice_active = true;
            }
            other => {
                warn!("Audio command {} failed", other);
            }
        }
        fx
    }

    // ═══════════════════════════════════════════════════════════════
    // Input
    // ═══════════════════════════════════════════════════════════════

    /// Interpret one input event in the current mode.
    pub fn handle_button_event(&mut self, event: ButtonEvent) -> Effects {
        let mut fx = Effects::new();
        let action = policy::action(self.mode, event.kind, event.button);
        trace!("{} in {} -> {}", event, self.mode, action);

        match action {
            Action::Ignore => {}
            Action::TogglePower => self.toggle_power(&mut fx),
            Action::StartVoice => self.start_voice(&mut fx),
            Action::StopVoice => self.stop_voice(&mut fx),
            Action::HangUp => {
                info!("Call ended by user");
                emit(&mut fx, Effect::Audio(AudioCommand::Hangup));
                notify(&mut fx, DisplayKind::CallActive, "Call Ended", "", 2000, 250);
                self.end_call(&mut fx);
            }
            Action::Radio(a) => radio::handle(&mut self.radio, a, event.timestamp, &mut fx),
            Action::Media(a) => bluetooth::handle_media(&mut self.a2dp, a, &mut fx),
            Action::Call(a) => bluetooth::handle_call(&mut self.hfp, a, &mut fx),
        }
        fx
    }

    /// Commit the browse candidate if its deadline has passed.
    pub fn on_browse_deadline(&mut self, now: Instant) -> Effects {
        let mut fx = Effects::new();
        if self.mode == OperatingMode::Radio {
            self.radio.commit_browse(now, &mut fx);
        }
        fx
    }

    // ═══════════════════════════════════════════════════════════════
    // Direct control
    // ═══════════════════════════════════════════════════════════════

    pub fn set_power(&mut self, on: bool) -> Effects {
        let mut fx = Effects::new();
        if on == self.powered_on {
            return fx;
        }
        if on {
            self.transition(OperatingMode::Radio, &mut fx);
            notify(&mut fx, DisplayKind::ModeChange, "Power ON", "Welcome", 2000, 200);
        } else {
            self.transition(OperatingMode::Off, &mut fx);
            notify(&mut fx, DisplayKind::ModeChange, "Power OFF", "Goodbye", 2000, 200);
        }
        emit(&mut fx, Effect::Persist);
        fx
    }

    /// Switch mode directly. Switching to `Off` powers down; anything else
    /// powers up.
    pub fn set_mode(&mut self, mode: OperatingMode) -> Effects {
        let mut fx = Effects::new();
        if mode == self.mode {
            return fx;
        }
        self.transition(mode, &mut fx);
        notify(&mut fx, DisplayKind::ModeChange, mode.label(), "", 2000, 150);
        emit(&mut fx, Effect::Persist);
        fx
    }

    pub fn set_band(&mut self, band: Band) -> Effects {
        let mut fx = Effects::new();
        radio::select_band(&mut self.radio, band, &mut fx);
        fx
    }

    // ═══════════════════════════════════════════════════════════════
    // Audio stack notifications
    // ═══════════════════════════════════════════════════════════════

    pub fn on_call_status(&mut self, active: bool, caller_id: Option<&str>) -> Effects {
        let mut fx = Effects::new();

        if active && self.mode != OperatingMode::PhoneCall {
            self.hfp.caller_id = truncated(caller_id.unwrap_or("Unknown Caller"));
            self.hfp.call_active = true;
            info!("Incoming call: {}", self.hfp.caller_id.as_str());

            if self.powered_on {
                self.transition(OperatingMode::PhoneCall, &mut fx);
            } else {
                self.auto_power_on(OperatingMode::PhoneCall, "Incoming Call", &mut fx);
            }

            let caller = self.hfp.caller_id.clone();
            notify(&mut fx, DisplayKind::CallIncoming, &caller, "Press to answer", 0, 255);
            emit(&mut fx, Effect::Audio(AudioCommand::Answer));
            notify(&mut fx, DisplayKind::CallActive, &caller, "Connected", 0, 250);
        } else if !active && self.mode == OperatingMode::PhoneCall {
            info!("Call ended");
            notify(&mut fx, DisplayKind::CallActive, "Call Ended", "", 2000, 200);
            self.end_call(&mut fx);
        } else if !active {
            self.hfp.call_active = false;
        }

        fx
    }

    /// RDS text is always kept; shown only while in Radio mode.
    pub fn on_rds(&mut self, station: Option<&str>, song: Option<&str>) -> Effects {
        let mut fx = Effects::new();
        if let Some(s) = station {
            self.radio.station = truncated(s);
        }
        if let Some(s) = song {
            self.radio.song = truncated(s);
        }
        if self.mode != OperatingMode::Radio {
            return fx;
        }
        if let Some(s) = station {
            notify(&mut fx, DisplayKind::RadioStation, s, "", 5000, 80);
        }
        if let Some(s) = song {
            notify(&mut fx, DisplayKind::RadioSong, s, station.unwrap_or(""), 5000, 80);
        }
        fx
    }

    /// Track metadata is always kept; shown only while in Bluetooth mode.
    pub fn on_a2dp_metadata(&mut self, title: &str, artist: &str) -> Effects {
        let mut fx = Effects::new();
        self.a2dp.title = truncated(title);
        self.a2dp.artist = truncated(artist);
        if self.mode == OperatingMode::Bluetooth {
            notify(&mut fx, DisplayKind::BtTrack, title, artist, 5000, 80);
        }
        fx
    }

    /// Restore the device's remembered volumes, or push the current ones
    /// to a device seen for the first time.
    pub fn on_device_connected(&mut self, mac: Mac) -> Effects {
        let mut fx = Effects::new();
        self.current_device = Some(mac);

        let known = self.devices.find(&mac).copied();
        if let Some(profile) = known {
            info!(
                "Restoring volumes: A2DP={} HFP_SPK={} HFP_MIC={}",
                profile.a2dp_volume.get(),
                profile.hfp_speaker_volume.get(),
                profile.hfp_mic_volume.get()
            );
            self.a2dp.volume = profile.a2dp_volume;
            self.hfp.speaker_volume = profile.hfp_speaker_volume;
            self.hfp.mic_volume = profile.hfp_mic_volume;
        } else {
            info!("New device, applying current volumes");
        }

        emit(&mut fx, Effect::Audio(AudioCommand::SetA2dpVolume(self.a2dp.volume.get())));
        emit(&mut fx, Effect::Audio(AudioCommand::SetHfpSpeakerVolume(self.hfp.speaker_volume.get())));
        emit(&mut fx, Effect::Audio(AudioCommand::SetHfpMicVolume(self.hfp.mic_volume.get())));

        if known.is_some() {
            notify(&mut fx, DisplayKind::ModeChange, "Device Connected", "Volumes Restored", 2000, 140);
        } else {
            notify(&mut fx, DisplayKind::ModeChange, "New Device", "Default Volumes", 2000, 140);
        }
        fx
    }

    /// Remember the device's volumes for its next connection.
    pub fn on_device_disconnected(&mut self, mac: Mac) -> Effects {
        let mut fx = Effects::new();
        let slot = self.devices.upsert(DeviceProfile {
            mac,
            a2dp_volume: self.a2dp.volume,
            hfp_speaker_volume: self.hfp.speaker_volume,
            hfp_mic_volume: self.hfp.mic_volume,
        });
        debug!("Device profile stored in slot {}", slot);
        if self.current_device == Some(mac) {
            self.current_device = None;
        }
        emit(&mut fx, Effect::PersistDevices);
        fx
    }

    pub fn on_streaming(&mut self, streaming: bool) -> Effects {
        let mut fx = Effects::new();
        self.a2dp.playing = streaming;
        if streaming {
            info!("A2DP streaming started");
            self.auto_power_on(OperatingMode::Bluetooth, "Music Playing", &mut fx);
        } else {
            info!("A2DP streaming stopped");
        }
        fx
    }

    /// Volume changed from the phone side.
    pub fn on_remote_volume(&mut self, target: VolumeTarget, volume: u8) -> Effects {
        let mut fx = Effects::new();
        let volume = Volume::new(volume);
        let context = match target {
            VolumeTarget::A2dp => {
                self.a2dp.volume = volume;
                "Bluetooth"
            }
            VolumeTarget::HfpSpeaker => {
                self.hfp.speaker_volume = volume;
                "Call Volume"
            }
            VolumeTarget::HfpMic => {
                self.hfp.mic_volume = volume;
                "Mic Volume"
            }
        };
        notify_volume(&mut fx, volume, context, 120);
        emit(&mut fx, Effect::Persist);
        fx
    }
}
