//! Head unit façade: the mode machine wired to its collaborators.
//!
//! Every public operation forwards to [`Stereo`] and then performs the
//! returned effects in order. Collaborator failures are logged and
//! otherwise ignored; the in-memory state stays authoritative until the
//! next successful save.

use crate::audio::{AudioCommand, AudioStack, Mac, StackEvent, VolumeTarget};
use crate::display::{DisplayKind, DisplaySink, Notification};
use crate::error::Error;
use crate::input::ButtonEvent;
use crate::stereo::{emit, Band, Effect, Effects, OperatingMode, Stereo, MAX_EFFECTS};
use crate::storage::{self, SettingsStore};
use embassy_time::Instant;
use heapless::Deque;

/// Collaborators handed to [`HeadUnit::initialize`].
pub struct Config<S, D, A> {
    pub store: S,
    pub display: D,
    pub audio: A,
}

pub struct HeadUnit<S, D, A> {
    stereo: Stereo,
    store: S,
    display: D,
    audio: A,
}

impl<S, D, A> HeadUnit<S, D, A>
where
    S: SettingsStore,
    D: DisplaySink,
    A: AudioStack,
{
    /// Build defaults, overlay the stored settings and bring the audio
    /// stack and display in line with them.
    pub async fn initialize(config: Config<S, D, A>) -> Self {
        let Config {
            mut store,
            display,
            audio,
        } = config;

        let mut stereo = Stereo::new();
        storage::load(&mut store, &mut stereo).await;

        let mut unit = Self {
            stereo,
            store,
            display,
            audio,
        };

        let mut fx = Effects::new();
        emit(&mut fx, Effect::Audio(AudioCommand::SetA2dpVolume(unit.stereo.a2dp().volume.get())));
        emit(
            &mut fx,
            Effect::Audio(AudioCommand::SetHfpSpeakerVolume(unit.stereo.hfp().speaker_volume.get())),
        );
        emit(&mut fx, Effect::Audio(AudioCommand::SetHfpMicVolume(unit.stereo.hfp().mic_volume.get())));

        let mode = unit.stereo.mode();
        if unit.stereo.is_powered_on() {
            info!("Restoring {}", mode);
            emit(
                &mut fx,
                Effect::Notify(Notification::new(DisplayKind::ModeChange, mode.label(), "", 2000, 100)),
            );
            emit(
                &mut fx,
                Effect::ModeChanged {
                    from: OperatingMode::Off,
                    to: mode,
                },
            );
        }

        unit.apply(fx).await;
        unit
    }

    pub fn stereo(&self) -> &Stereo {
        &self.stereo
    }

    pub fn get_mode(&self) -> OperatingMode {
        self.stereo.mode()
    }

    pub fn is_powered_on(&self) -> bool {
        self.stereo.is_powered_on()
    }

    pub fn browse_deadline(&self) -> Option<Instant> {
        self.stereo.browse_deadline()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    pub fn audio(&self) -> &A {
        &self.audio
    }

    /// Hand the collaborators back, e.g. to reuse the flash after shutdown.
    pub fn into_config(self) -> Config<S, D, A> {
        Config {
            store: self.store,
            display: self.display,
            audio: self.audio,
        }
    }

    pub async fn handle_button_event(&mut self, event: ButtonEvent) {
        let fx = self.stereo.handle_button_event(event);
        self.apply(fx).await;
    }

    pub async fn on_browse_deadline(&mut self, now: Instant) {
        let fx = self.stereo.on_browse_deadline(now);
        self.apply(fx).await;
    }

    pub async fn set_power(&mut self, on: bool) {
        let fx = self.stereo.set_power(on);
        self.apply(fx).await;
    }

    pub async fn set_mode(&mut self, mode: OperatingMode) {
        let fx = self.stereo.set_mode(mode);
        self.apply(fx).await;
    }

    pub async fn set_band(&mut self, band: Band) {
        let fx = self.stereo.set_band(band);
        self.apply(fx).await;
    }

    pub async fn on_call_status(&mut self, active: bool, caller_id: Option<&str>) {
        let fx = self.stereo.on_call_status(active, caller_id);
        self.apply(fx).await;
    }

    pub async fn on_rds(&mut self, station: Option<&str>, song: Option<&str>) {
        let fx = self.stereo.on_rds(station, song);
        self.apply(fx).await;
    }

    pub async fn on_a2dp_metadata(&mut self, title: &str, artist: &str) {
        let fx = self.stereo.on_a2dp_metadata(title, artist);
        self.apply(fx).await;
    }

    pub async fn on_device_connected(&mut self, mac: Mac) {
        let fx = self.stereo.on_device_connected(mac);
        self.apply(fx).await;
    }

    pub async fn on_device_disconnected(&mut self, mac: Mac) {
        let fx = self.stereo.on_device_disconnected(mac);
        self.apply(fx).await;
    }

    pub async fn on_streaming(&mut self, streaming: bool) {
        let fx = self.stereo.on_streaming(streaming);
        self.apply(fx).await;
    }

    pub async fn on_remote_volume(&mut self, target: VolumeTarget, volume: u8) {
        let fx = self.stereo.on_remote_volume(target, volume);
        self.apply(fx).await;
    }

    /// Route one queued stack notification.
    pub async fn handle_stack_event(&mut self, event: StackEvent) {
        match event {
            StackEvent::Connected(mac) => self.on_device_connected(mac).await,
            StackEvent::Disconnected(mac) => self.on_device_disconnected(mac).await,
            StackEvent::Streaming(on) => self.on_streaming(on).await,
            StackEvent::CallStatus { active, caller } => {
                self.on_call_status(active, caller.as_ref().map(|c| c.as_str())).await
            }
            StackEvent::Metadata { title, artist } => self.on_a2dp_metadata(&title, &artist).await,
            StackEvent::Rds { station, song } => {
                self.on_rds(station.as_ref().map(|s| s.as_str()), song.as_ref().map(|s| s.as_str()))
                    .await
            }
            StackEvent::RemoteVolume { target, volume } => self.on_remote_volume(target, volume).await,
        }
    }

    /// Write all settings and the device table now.
    pub async fn save(&mut self) -> Result<(), Error> {
        storage::save(&mut self.store, &self.stereo).await?;
        storage::save_devices(&mut self.store, &self.stereo).await
    }

    /// Perform effects in order. Audio failures are fed back to the
    /// machine and their follow-up effects run in the same pass; writes
    /// are coalesced to one per kind at the end.
    async fn apply(&mut self, fx: Effects) {
        // Room for a full effect list plus the same again in follow-ups.
        let mut pending: Deque<Effect, { 2 * MAX_EFFECTS }> = Deque::new();
        for effect in fx {
            if pending.push_back(effect).is_err() {
                warn!("Effect queue full - dropped effect");
            }
        }

        let mut persist = false;
        let mut persist_devices = false;

        while let Some(effect) = pending.pop_front() {
            match effect {
                Effect::Notify(notification) => {
                    if let Err(e) = self.display.show(notification).await {
                        warn!("Display: {}", e);
                    }
                }
                Effect::Audio(command) => {
                    if let Err(e) = self.audio.execute(command).await {
                        error!("Audio: {} failed ({})", command, e);
                        for follow_up in self.stereo.on_audio_failure(command) {
                            if pending.push_back(follow_up).is_err() {
                                warn!("Effect queue full - dropped follow-up");
                            }
                        }
                    }
                }
                Effect::Persist => persist = true,
                Effect::PersistDevices => persist_devices = true,
                Effect::ModeChanged { from, to } => {
                    if let Err(e) = self.display.mode_changed(from, to).await {
                        warn!("Display: {}", e);
                    }
                }
            }
        }

        if persist {
            if let Err(e) = storage::save(&mut self.store, &self.stereo).await {
                error!("Settings not saved: {}", e);
            }
        }
        if persist_devices {
            if let Err(e) = storage::save_devices(&mut self.store, &self.stereo).await {
                error!("Device profiles not saved: {}", e);
            }
        }
    }
}
