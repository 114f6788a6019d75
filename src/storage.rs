//! Persistent settings.
//!
//! A closed set of keys, each holding a fixed-width integer or a small
//! blob. The backing store is any [`SettingsStore`]; on target this is
//! [`FlashStore`], a `sequential-storage` key-value map on internal flash
//! that takes care of wear levelling and garbage collection.
//!
//! Layout:
//!   - `power_on`, `mode`, `radio_band`, `radio_vol`, `a2dp_vol`,
//!     `hfp_spk_vol`, `hfp_mic_vol`: one byte each.
//!   - `radio_freq`, `preset_{fm,am}_{1..5}`: u32 hundredths (0 = empty
//!     preset).
//!   - `bt_dev_cnt`: number of stored profiles, `bt_dev_0..` the profiles
//!     packed as 6 address bytes + 3 volumes.
//!
//! Missing keys keep the in-memory defaults. Values that do not decode
//! are ignored with a warning.

use crate::config::{MAX_BT_DEVICES, PRESETS_PER_BAND, STORAGE_FLASH_START, STORAGE_PAGE_COUNT, STORAGE_PAGE_SIZE};
use crate::error::Error;
use crate::stereo::{Band, DeviceProfile, OperatingMode, Stereo, Volume};
use core::ops::Range;
use embedded_storage_async::nor_flash::NorFlash;
use sequential_storage::cache::NoCache;

/// Persisted settings keys.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Key {
    PowerOn,
    /// Last user mode.
    Mode,
    RadioBand,
    RadioFrequency,
    RadioVolume,
    A2dpVolume,
    HfpSpeakerVolume,
    HfpMicVolume,
    /// `(band, zero-based slot)`
    Preset(Band, u8),
    BtDeviceCount,
    BtDevice(u8),
}

const PRESET_NAMES: [[&str; PRESETS_PER_BAND]; 2] = [
    ["preset_fm_1", "preset_fm_2", "preset_fm_3", "preset_fm_4", "preset_fm_5"],
    ["preset_am_1", "preset_am_2", "preset_am_3", "preset_am_4", "preset_am_5"],
];

const BT_DEVICE_NAMES: [&str; MAX_BT_DEVICES] = ["bt_dev_0", "bt_dev_1", "bt_dev_2", "bt_dev_3", "bt_dev_4"];

impl Key {
    /// Stable one-byte identifier used as the flash map key.
    pub fn id(self) -> u8 {
        match self {
            Key::PowerOn => 0x01,
            Key::Mode => 0x02,
            Key::RadioBand => 0x03,
            Key::RadioFrequency => 0x04,
            Key::RadioVolume => 0x05,
            Key::A2dpVolume => 0x06,
            Key::HfpSpeakerVolume => 0x07,
            Key::HfpMicVolume => 0x08,
            Key::Preset(band, slot) => 0x10 + band.as_u8() * PRESETS_PER_BAND as u8 + slot,
            Key::BtDeviceCount => 0x20,
            Key::BtDevice(index) => 0x21 + index,
        }
    }

    /// Short string name, for stores addressed by name.
    pub fn name(self) -> &'static str {
        match self {
            Key::PowerOn => "power_on",
            Key::Mode => "mode",
            Key::RadioBand => "radio_band",
            Key::RadioFrequency => "radio_freq",
            Key::RadioVolume => "radio_vol",
            Key::A2dpVolume => "a2dp_vol",
            Key::HfpSpeakerVolume => "hfp_spk_vol",
            Key::HfpMicVolume => "hfp_mic_vol",
            Key::Preset(band, slot) => PRESET_NAMES[band.index()]
                .get(slot as usize)
                .copied()
                .unwrap_or("preset"),
            Key::BtDeviceCount => "bt_dev_cnt",
            Key::BtDevice(index) => BT_DEVICE_NAMES.get(index as usize).copied().unwrap_or("bt_dev"),
        }
    }
}

/// Key-value store for settings.
///
/// Implementors provide raw byte access; the typed accessors are built
/// on top (integers are little-endian).
pub trait SettingsStore {
    /// Copy the value of `key` into `buf`, returning its length, or
    /// `None` if the key was never written.
    async fn fetch(&mut self, key: Key, buf: &mut [u8]) -> Result<Option<usize>, Error>;

    async fn store(&mut self, key: Key, value: &[u8]) -> Result<(), Error>;

    async fn get_u8(&mut self, key: Key) -> Result<Option<u8>, Error> {
        let mut buf = [0u8; 1];
        match self.fetch(key, &mut buf).await? {
            Some(1) => Ok(Some(buf[0])),
            Some(_) => Err(Error::Corrupt),
            None => Ok(None),
        }
    }

    async fn set_u8(&mut self, key: Key, value: u8) -> Result<(), Error> {
        self.store(key, &[value]).await
    }

    async fn get_u32(&mut self, key: Key) -> Result<Option<u32>, Error> {
        let mut buf = [0u8; 4];
        match self.fetch(key, &mut buf).await? {
            Some(4) => Ok(Some(u32::from_le_bytes(buf))),
            Some(_) => Err(Error::Corrupt),
            None => Ok(None),
        }
    }

    async fn set_u32(&mut self, key: Key, value: u32) -> Result<(), Error> {
        self.store(key, &value.to_le_bytes()).await
    }

    async fn get_blob(&mut self, key: Key, buf: &mut [u8]) -> Result<Option<usize>, Error> {
        self.fetch(key, buf).await
    }

    async fn set_blob(&mut self, key: Key, value: &[u8]) -> Result<(), Error> {
        self.store(key, value).await
    }
}

/// Scratch space for one map item (key, value and item header).
const ITEM_BUFFER: usize = 32;

/// [`SettingsStore`] on NOR flash via `sequential-storage`.
pub struct FlashStore<F> {
    flash: F,
    range: Range<u32>,
}

impl<F: NorFlash> FlashStore<F> {
    /// Use `range` (page aligned, at least two pages) of `flash`.
    pub fn new(flash: F, range: Range<u32>) -> Self {
        Self { flash, range }
    }

    /// Use the partition described in `config`.
    pub fn with_default_range(flash: F) -> Self {
        let start = STORAGE_FLASH_START;
        Self::new(flash, start..start + STORAGE_PAGE_SIZE * STORAGE_PAGE_COUNT)
    }

    pub fn into_inner(self) -> F {
        self.flash
    }
}

impl<F: NorFlash> SettingsStore for FlashStore<F> {
    async fn fetch(&mut self, key: Key, buf: &mut [u8]) -> Result<Option<usize>, Error> {
        let mut data_buf = [0u8; ITEM_BUFFER];

        match sequential_storage::map::fetch_item::<u8, &[u8], _>(
            &mut self.flash,
            self.range.clone(),
            &mut NoCache::new(),
            &mut data_buf,
            &key.id(),
        )
        .await
        {
            Ok(Some(data)) => {
                if data.len() > buf.len() {
                    warn!("Storage: {} is {} bytes, expected at most {}", key.name(), data.len(), buf.len());
                    return Err(Error::Corrupt);
                }
                buf[..data.len()].copy_from_slice(data);
                Ok(Some(data.len()))
            }
            Ok(None) => Ok(None),
            Err(_) => {
                error!("Storage: flash read error on {}", key.name());
                Err(Error::Storage)
            }
        }
    }

    async fn store(&mut self, key: Key, value: &[u8]) -> Result<(), Error> {
        let mut data_buf = [0u8; ITEM_BUFFER];

        match sequential_storage::map::store_item::<u8, &[u8], _>(
            &mut self.flash,
            self.range.clone(),
            &mut NoCache::new(),
            &mut data_buf,
            &key.id(),
            &value,
        )
        .await
        {
            Ok(()) => Ok(()),
            Err(_) => {
                error!("Storage: flash write error on {}", key.name());
                Err(Error::Storage)
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════
// Load / save
// ═══════════════════════════════════════════════════════════════════

/// A failed read counts as missing.
async fn read_u8<S: SettingsStore>(store: &mut S, key: Key) -> Option<u8> {
    match store.get_u8(key).await {
        Ok(v) => v,
        Err(e) => {
            warn!("Storage: ignoring {} ({})", key.name(), e);
            None
        }
    }
}

async fn read_u32<S: SettingsStore>(store: &mut S, key: Key) -> Option<u32> {
    match store.get_u32(key).await {
        Ok(v) => v,
        Err(e) => {
            warn!("Storage: ignoring {} ({})", key.name(), e);
            None
        }
    }
}

fn in_band(band: Band, frequency: u32) -> bool {
    (band.min()..=band.max()).contains(&frequency)
}

/// Overlay the stored settings onto `stereo`. Never fails: anything
/// missing or unreadable keeps its default.
pub async fn load<S: SettingsStore>(store: &mut S, stereo: &mut Stereo) {
    let powered_on = read_u8(store, Key::PowerOn).await.map_or(false, |v| v != 0);
    let resume = read_u8(store, Key::Mode)
        .await
        .and_then(OperatingMode::from_u8)
        .unwrap_or(OperatingMode::Radio);

    if let Some(band) = read_u8(store, Key::RadioBand).await.and_then(Band::from_u8) {
        stereo.radio.band = band;
    }
    let band = stereo.radio.band;

    match read_u32(store, Key::RadioFrequency).await {
        Some(f) if in_band(band, f) => stereo.radio.frequency = f,
        Some(f) => {
            warn!("Storage: frequency {} outside {}", f, band.label());
            stereo.radio.frequency = band.min();
        }
        None => {
            if !in_band(band, stereo.radio.frequency) {
                stereo.radio.frequency = band.min();
            }
        }
    }

    if let Some(v) = read_u8(store, Key::RadioVolume).await {
        stereo.radio.volume = Volume::new(v);
    }
    if let Some(v) = read_u8(store, Key::A2dpVolume).await {
        stereo.a2dp.volume = Volume::new(v);
    }
    if let Some(v) = read_u8(store, Key::HfpSpeakerVolume).await {
        stereo.hfp.speaker_volume = Volume::new(v);
    }
    if let Some(v) = read_u8(store, Key::HfpMicVolume).await {
        stereo.hfp.mic_volume = Volume::new(v);
    }

    for band in [Band::Fm, Band::Am] {
        for slot in 0..PRESETS_PER_BAND {
            let Some(f) = read_u32(store, Key::Preset(band, slot as u8)).await else {
                continue;
            };
            if f == 0 || in_band(band, f) {
                stereo.radio.presets[band.index()][slot] = f;
            } else {
                warn!("Storage: preset {} {} out of range", band.label(), slot + 1);
            }
        }
    }

    let count = read_u8(store, Key::BtDeviceCount).await.unwrap_or(0) as usize;
    let mut restored = 0;
    for index in 0..count.min(MAX_BT_DEVICES) {
        let mut blob = [0u8; DeviceProfile::PACKED_LEN];
        let profile = match store.get_blob(Key::BtDevice(index as u8), &mut blob).await {
            Ok(Some(len)) => DeviceProfile::unpack(&blob[..len]),
            Ok(None) => None,
            Err(e) => {
                warn!("Storage: ignoring bt_dev_{} ({})", index, e);
                None
            }
        };
        if let Some(p) = profile {
            stereo.devices.set_slot(index, Some(p));
            restored += 1;
        }
    }

    stereo.restore_power(powered_on, resume);

    info!(
        "Storage: loaded power={} mode={} band={} devices={}",
        powered_on,
        stereo.mode(),
        band.label(),
        restored
    );
}

/// Write everything except the device table.
pub async fn save<S: SettingsStore>(store: &mut S, stereo: &Stereo) -> Result<(), Error> {
    let radio = stereo.radio();

    store.set_u8(Key::PowerOn, stereo.is_powered_on() as u8).await?;
    store.set_u8(Key::Mode, stereo.resume_mode().as_u8()).await?;
    store.set_u8(Key::RadioBand, radio.band.as_u8()).await?;
    store.set_u32(Key::RadioFrequency, radio.frequency).await?;
    store.set_u8(Key::RadioVolume, radio.volume.get()).await?;
    store.set_u8(Key::A2dpVolume, stereo.a2dp().volume.get()).await?;
    store.set_u8(Key::HfpSpeakerVolume, stereo.hfp().speaker_volume.get()).await?;
    store.set_u8(Key::HfpMicVolume, stereo.hfp().mic_volume.get()).await?;

    for band in [Band::Fm, Band::Am] {
        for (slot, &f) in radio.presets[band.index()].iter().enumerate() {
            store.set_u32(Key::Preset(band, slot as u8), f).await?;
        }
    }

    debug!("Storage: settings saved");
    Ok(())
}

/// Write the device profile table, packed into `bt_dev_0..bt_dev_{n-1}`.
pub async fn save_devices<S: SettingsStore>(store: &mut S, stereo: &Stereo) -> Result<(), Error> {
    let mut count: u8 = 0;
    for (_, profile) in stereo.devices().iter() {
        store.set_blob(Key::BtDevice(count), &profile.pack()).await?;
        count += 1;
    }
    store.set_u8(Key::BtDeviceCount, count).await?;
    info!("Storage: saved {} device profiles", count);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[derive(Default)]
    struct MapStore {
        items: BTreeMap<u8, std::vec::Vec<u8>>,
    }

    impl SettingsStore for MapStore {
        async fn fetch(&mut self, key: Key, buf: &mut [u8]) -> Result<Option<usize>, Error> {
            match self.items.get(&key.id()) {
                Some(v) if v.len() <= buf.len() => {
                    buf[..v.len()].copy_from_slice(v);
                    Ok(Some(v.len()))
                }
                Some(_) => Err(Error::Corrupt),
                None => Ok(None),
            }
        }

        async fn store(&mut self, key: Key, value: &[u8]) -> Result<(), Error> {
            self.items.insert(key.id(), value.to_vec());
            Ok(())
        }
    }

    #[test]
    fn key_ids_are_unique() {
        let mut keys = std::vec![
            Key::PowerOn,
            Key::Mode,
            Key::RadioBand,
            Key::RadioFrequency,
            Key::RadioVolume,
            Key::A2dpVolume,
            Key::HfpSpeakerVolume,
            Key::HfpMicVolume,
            Key::BtDeviceCount,
        ];
        for band in [Band::Fm, Band::Am] {
            for slot in 0..PRESETS_PER_BAND as u8 {
                keys.push(Key::Preset(band, slot));
            }
        }
        for i in 0..MAX_BT_DEVICES as u8 {
            keys.push(Key::BtDevice(i));
        }
        let mut ids: std::vec::Vec<u8> = keys.iter().map(|k| k.id()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), keys.len());
    }

    #[test]
    fn key_names() {
        assert_eq!(Key::RadioFrequency.name(), "radio_freq");
        assert_eq!(Key::Preset(Band::Fm, 0).name(), "preset_fm_1");
        assert_eq!(Key::Preset(Band::Am, 4).name(), "preset_am_5");
        assert_eq!(Key::BtDevice(3).name(), "bt_dev_3");
    }

    #[tokio::test]
    async fn empty_store_keeps_defaults_and_stays_off() {
        let mut store = MapStore::default();
        let mut s = Stereo::new();
        load(&mut store, &mut s).await;
        assert_eq!(s.mode(), OperatingMode::Off);
        assert!(!s.is_powered_on());
        assert_eq!(s.radio().frequency, crate::config::DEFAULT_FREQUENCY);
        assert_eq!(s.hfp().speaker_volume.get(), crate::config::DEFAULT_HFP_SPEAKER_VOLUME);
        assert!(s.devices().is_empty());
    }

    #[tokio::test]
    async fn save_then_load_restores_state() {
        let mut store = MapStore::default();
        let mut s = Stereo::new();
        s.set_mode(OperatingMode::Bluetooth);
        s.radio.frequency = 9850;
        s.radio.presets[Band::Fm.index()][2] = 9850;
        s.radio.presets[Band::Am.index()][0] = 0;
        s.on_remote_volume(crate::audio::VolumeTarget::HfpMic, 3);
        save(&mut store, &s).await.unwrap();

        let mut restored = Stereo::new();
        load(&mut store, &mut restored).await;
        assert_eq!(restored.mode(), OperatingMode::Bluetooth);
        assert!(restored.is_powered_on());
        assert_eq!(restored.radio().frequency, 9850);
        assert_eq!(restored.radio().preset(Band::Fm, 2), Some(9850));
        assert_eq!(restored.radio().preset(Band::Am, 0), None);
        assert_eq!(restored.hfp().mic_volume.get(), 3);
    }

    #[tokio::test]
    async fn powered_off_restores_off_but_remembers_mode() {
        let mut store = MapStore::default();
        store.set_u8(Key::PowerOn, 0).await.unwrap();
        store.set_u8(Key::Mode, OperatingMode::Bluetooth.as_u8()).await.unwrap();

        let mut s = Stereo::new();
        load(&mut store, &mut s).await;
        assert_eq!(s.mode(), OperatingMode::Off);
        assert_eq!(s.resume_mode(), OperatingMode::Bluetooth);
    }

    #[tokio::test]
    async fn bad_values_are_ignored() {
        let mut store = MapStore::default();
        store.set_u8(Key::PowerOn, 1).await.unwrap();
        store.set_u8(Key::Mode, 3).await.unwrap(); // PhoneCall is never resumed
        store.set_u8(Key::RadioVolume, 99).await.unwrap();
        store.set_u32(Key::RadioFrequency, 123).await.unwrap();
        store.set_u8(Key::A2dpVolume, 4).await.unwrap();
        store.store(Key::HfpMicVolume, &[1, 2]).await.unwrap();
        store.set_u32(Key::Preset(Band::Fm, 0), 99999).await.unwrap();

        let mut s = Stereo::new();
        load(&mut store, &mut s).await;
        assert_eq!(s.mode(), OperatingMode::Radio);
        assert_eq!(s.radio().volume.get(), 15);
        assert_eq!(s.radio().frequency, Band::Fm.min());
        assert_eq!(s.a2dp().volume.get(), 4);
        assert_eq!(s.hfp().mic_volume.get(), crate::config::DEFAULT_HFP_MIC_VOLUME);
        assert_eq!(s.radio().preset(Band::Fm, 0), Some(crate::config::DEFAULT_FM_PRESETS[0]));
    }

    #[tokio::test]
    async fn device_table_round_trip() {
        let mut store = MapStore::default();
        let mut s = Stereo::new();
        let a = [1, 1, 1, 1, 1, 1];
        let b = [2, 2, 2, 2, 2, 2];
        s.on_device_disconnected(a);
        s.on_remote_volume(crate::audio::VolumeTarget::A2dp, 7);
        s.on_device_disconnected(b);
        save_devices(&mut store, &s).await.unwrap();
        assert_eq!(store.get_u8(Key::BtDeviceCount).await.unwrap(), Some(2));

        let mut restored = Stereo::new();
        load(&mut store, &mut restored).await;
        assert_eq!(restored.devices().len(), 2);
        assert_eq!(restored.devices().find(&b).unwrap().a2dp_volume.get(), 7);
        assert_eq!(restored.devices().find(&a).unwrap().a2dp_volume.get(), 10);
    }
}
