//! Radio sub-state: band, tuned frequency, presets, browsing.
//!
//! Frequencies are integer hundredths of the band's display unit (MHz on
//! FM, kHz on AM), the same encoding used in storage, so a preset always
//! recalls exactly what was saved.

use super::{emit, notify, notify_volume, Effect, Effects, Step, Volume};
use crate::config::{BROWSE_COMMIT_MS, DEFAULT_AM_PRESETS, DEFAULT_FM_PRESETS, DEFAULT_FREQUENCY, DEFAULT_RADIO_VOLUME, PRESETS_PER_BAND};
use crate::display::{DisplayKind, Notification};
use embassy_time::{Duration, Instant};
use heapless::String;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Band {
    Fm = 0,
    Am = 1,
}

impl Band {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Band::Fm),
            1 => Some(Band::Am),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn toggled(self) -> Band {
        match self {
            Band::Fm => Band::Am,
            Band::Am => Band::Fm,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Band::Fm => "FM",
            Band::Am => "AM",
        }
    }

    /// Lowest tunable frequency (hundredths).
    pub fn min(self) -> u32 {
        match self {
            Band::Fm => 8750,
            Band::Am => 53000,
        }
    }

    pub fn max(self) -> u32 {
        match self {
            Band::Fm => 10800,
            Band::Am => 171000,
        }
    }

    /// Browse step: 0.2 MHz on FM, 10 kHz on AM.
    pub fn step(self) -> u32 {
        match self {
            Band::Fm => 20,
            Band::Am => 1000,
        }
    }

    fn channels(self) -> u32 {
        (self.max() - self.min()) / self.step() + 1
    }

    fn channel_of(self, frequency: u32) -> u32 {
        (frequency.clamp(self.min(), self.max()) - self.min()) / self.step()
    }

    /// Next channel in `step` direction, wrapping at the band edges.
    pub fn step_channel(self, frequency: u32, step: Step) -> u32 {
        let n = self.channels();
        let ch = self.channel_of(frequency);
        let next = match step {
            Step::Up => (ch + 1) % n,
            Step::Down => (ch + n - 1) % n,
        };
        self.min() + next * self.step()
    }
}

/// Display form of a frequency in hundredths.
pub struct Frequency(pub Band, pub u32);

impl core::fmt::Display for Frequency {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let Frequency(band, value) = *self;
        match band {
            Band::Fm => {
                write!(f, "{}.{}", value / 100, (value % 100) / 10)?;
                if value % 10 != 0 {
                    write!(f, "{}", value % 10)?;
                }
                f.write_str(" MHz")
            }
            Band::Am => write!(f, "{} kHz", value / 100),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Browse {
    candidate: u32,
    /// Set on the first step; until then there is nothing to commit.
    deadline: Option<Instant>,
}

/// Radio action resolved by the policy table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RadioAction {
    /// Volume, or a browse step while browsing.
    Rotate(Step),
    ToggleBrowse,
    RecallPreset(usize),
    StorePreset(usize),
    Seek(Step),
    ToggleBand,
}

#[derive(Debug, Clone)]
pub struct RadioState {
    pub frequency: u32,
    pub volume: Volume,
    pub band: Band,
    /// Indexed by `Band::index()`; 0 is an empty slot.
    pub presets: [[u32; PRESETS_PER_BAND]; 2],
    pub station: String<31>,
    pub song: String<63>,
    browse: Option<Browse>,
}

impl Default for RadioState {
    fn default() -> Self {
        Self::new()
    }
}

impl RadioState {
    pub fn new() -> Self {
        Self {
            frequency: DEFAULT_FREQUENCY,
            volume: Volume::new(DEFAULT_RADIO_VOLUME),
            band: Band::Fm,
            presets: [DEFAULT_FM_PRESETS, DEFAULT_AM_PRESETS],
            station: String::new(),
            song: String::new(),
            browse: None,
        }
    }

    pub fn is_browsing(&self) -> bool {
        self.browse.is_some()
    }

    pub fn browse_candidate(&self) -> Option<u32> {
        self.browse.map(|b| b.candidate)
    }

    pub fn browse_deadline(&self) -> Option<Instant> {
        self.browse.and_then(|b| b.deadline)
    }

    pub fn preset(&self, band: Band, slot: usize) -> Option<u32> {
        match self.presets[band.index()].get(slot) {
            Some(&f) if f != 0 => Some(f),
            _ => None,
        }
    }

    pub(crate) fn cancel_browse(&mut self) {
        self.browse = None;
    }

    /// Tune the candidate if browsing is still on and its deadline passed.
    pub(crate) fn commit_browse(&mut self, now: Instant, fx: &mut Effects) {
        let Some(browse) = self.browse else {
            return;
        };
        match browse.deadline {
            Some(deadline) if now >= deadline => {}
            _ => return,
        }

        self.browse = None;
        self.frequency = browse.candidate;
        info!("Radio: tuned {}", self.frequency);
        notify_frequency(fx, self.band, self.frequency, "Tuned", 2000, 100);
        emit(fx, Effect::Persist);
    }
}

fn notify_frequency(fx: &mut Effects, band: Band, frequency: u32, subtext: &str, duration_ms: u32, priority: u8) {
    emit(
        fx,
        Effect::Notify(Notification::formatted(
            DisplayKind::Frequency,
            format_args!("{}", Frequency(band, frequency)),
            subtext,
            duration_ms,
            priority,
        )),
    );
}

pub fn handle(radio: &mut RadioState, action: RadioAction, now: Instant, fx: &mut Effects) {
    match action {
        RadioAction::Rotate(step) => match radio.browse.as_mut() {
            Some(browse) => {
                browse.candidate = radio.band.step_channel(browse.candidate, step);
                browse.deadline = Some(now + Duration::from_millis(BROWSE_COMMIT_MS));
                let candidate = browse.candidate;
                notify_frequency(fx, radio.band, candidate, "Browsing", 0, 150);
            }
            None => {
                let changed = radio.volume.step(step);
                notify_volume(fx, radio.volume, "Radio", 120);
                if changed {
                    emit(fx, Effect::Persist);
                }
            }
        },

        RadioAction::ToggleBrowse => {
            if radio.browse.take().is_some() {
                debug!("Radio: browsing off");
                notify_frequency(fx, radio.band, radio.frequency, radio.band.label(), 2000, 130);
            } else {
                let candidate = radio.band.min() + radio.band.channel_of(radio.frequency) * radio.band.step();
                radio.browse = Some(Browse {
                    candidate,
                    deadline: None,
                });
                debug!("Radio: browsing on");
                notify_frequency(fx, radio.band, candidate, "Browse Mode", 0, 150);
            }
        }

        RadioAction::RecallPreset(slot) => {
            let Some(frequency) = radio.preset(radio.band, slot) else {
                debug!("Radio: preset {} empty", slot + 1);
                return;
            };
            radio.frequency = frequency;
            emit(
                fx,
                Effect::Notify(Notification::formatted(
                    DisplayKind::Frequency,
                    format_args!("Station {}: {}", slot + 1, Frequency(radio.band, frequency)),
                    "",
                    2000,
                    130,
                )),
            );
            emit(fx, Effect::Persist);
        }

        RadioAction::StorePreset(slot) => {
            if slot >= PRESETS_PER_BAND {
                return;
            }
            radio.presets[radio.band.index()][slot] = radio.frequency;
            info!("Radio: preset {} = {}", slot + 1, radio.frequency);
            emit(
                fx,
                Effect::Notify(Notification::formatted(
                    DisplayKind::Frequency,
                    format_args!("Station {} Saved", slot + 1),
                    "",
                    2000,
                    140,
                )),
            );
            emit(fx, Effect::Persist);
        }

        // Seek hardware is not modelled.
        RadioAction::Seek(Step::Up) => notify(fx, DisplayKind::ModeChange, "Seeking Up", "", 1000, 110),
        RadioAction::Seek(Step::Down) => notify(fx, DisplayKind::ModeChange, "Seeking Down", "", 1000, 110),

        RadioAction::ToggleBand => {
            let band = radio.band.toggled();
            select_band(radio, band, fx);
        }
    }
}

/// Switch band; the tuner restarts at the bottom of the new band.
pub fn select_band(radio: &mut RadioState, band: Band, fx: &mut Effects) {
    if radio.band == band {
        return;
    }
    radio.band = band;
    radio.frequency = band.min();
    radio.browse = None;
    info!("Radio: band {}", band.label());
    notify_frequency(fx, band, radio.frequency, band.label(), 2000, 150);
    emit(fx, Effect::Persist);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(ms: u64) -> Instant {
        Instant::from_millis(ms)
    }

    fn run(radio: &mut RadioState, action: RadioAction, ms: u64) -> Effects {
        let mut fx = Effects::new();
        handle(radio, action, at(ms), &mut fx);
        fx
    }

    fn texts(fx: &Effects) -> std::vec::Vec<std::string::String> {
        fx.iter()
            .filter_map(|e| match e {
                Effect::Notify(n) => Some(std::format!("{}|{}", n.text(), n.subtext())),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn frequency_text() {
        assert_eq!(std::format!("{}", Frequency(Band::Fm, 8750)), "87.5 MHz");
        assert_eq!(std::format!("{}", Frequency(Band::Fm, 9850)), "98.5 MHz");
        assert_eq!(std::format!("{}", Frequency(Band::Fm, 10115)), "101.15 MHz");
        assert_eq!(std::format!("{}", Frequency(Band::Am, 54000)), "540 kHz");
    }

    #[test]
    fn channel_stepping_wraps() {
        assert_eq!(Band::Fm.step_channel(8750, Step::Up), 8770);
        assert_eq!(Band::Fm.step_channel(8750, Step::Down), 10790);
        assert_eq!(Band::Fm.step_channel(10790, Step::Up), 8750);
        assert_eq!(Band::Am.step_channel(170000, Step::Up), 171000);
        assert_eq!(Band::Am.step_channel(171000, Step::Up), 53000);
    }

    #[test]
    fn volume_stays_clamped_at_max() {
        let mut r = RadioState::new();
        r.volume = Volume::new(14);
        let fx = run(&mut r, RadioAction::Rotate(Step::Up), 0);
        assert!(fx.contains(&Effect::Persist));
        for i in 1..4 {
            let fx = run(&mut r, RadioAction::Rotate(Step::Up), i);
            // Still shown, nothing to write.
            assert_eq!(texts(&fx), ["15|Radio"]);
            assert!(!fx.contains(&Effect::Persist));
        }
        assert_eq!(r.volume.get(), 15);
    }

    #[test]
    fn preset_round_trip_across_band_switch() {
        let mut r = RadioState::new();
        r.frequency = 9850;
        run(&mut r, RadioAction::StorePreset(2), 0);

        run(&mut r, RadioAction::ToggleBand, 10);
        assert_eq!(r.band, Band::Am);
        assert_eq!(r.frequency, Band::Am.min());
        run(&mut r, RadioAction::ToggleBand, 20);
        assert_eq!(r.band, Band::Fm);

        let fx = run(&mut r, RadioAction::RecallPreset(2), 30);
        assert_eq!(r.frequency, 9850);
        assert_eq!(texts(&fx), ["Station 3: 98.5 MHz|"]);
    }

    #[test]
    fn empty_preset_is_a_no_op() {
        let mut r = RadioState::new();
        r.presets[Band::Fm.index()][1] = 0;
        let before = r.frequency;
        let fx = run(&mut r, RadioAction::RecallPreset(1), 0);
        assert!(fx.is_empty());
        assert_eq!(r.frequency, before);
    }

    #[test]
    fn browse_toggled_off_before_commit_keeps_frequency() {
        let mut r = RadioState::new();
        r.frequency = 9850;
        run(&mut r, RadioAction::ToggleBrowse, 0);
        assert!(r.is_browsing());
        for i in 1..=3 {
            let fx = run(&mut r, RadioAction::Rotate(Step::Up), i * 100);
            assert!(!fx.contains(&Effect::Persist));
        }
        assert_eq!(r.browse_candidate(), Some(9910));
        run(&mut r, RadioAction::ToggleBrowse, 400);

        let mut fx = Effects::new();
        r.commit_browse(at(5000), &mut fx);
        assert!(fx.is_empty());
        assert_eq!(r.frequency, 9850);
        assert_eq!(r.volume.get(), DEFAULT_RADIO_VOLUME);
    }

    #[test]
    fn browse_commits_after_quiet_period() {
        let mut r = RadioState::new();
        run(&mut r, RadioAction::ToggleBrowse, 0);
        assert_eq!(r.browse_deadline(), None);

        run(&mut r, RadioAction::Rotate(Step::Up), 1000);
        run(&mut r, RadioAction::Rotate(Step::Up), 2500);
        assert_eq!(r.browse_deadline(), Some(at(4500)));

        let mut fx = Effects::new();
        r.commit_browse(at(4499), &mut fx);
        assert!(fx.is_empty());

        r.commit_browse(at(4500), &mut fx);
        assert_eq!(r.frequency, 8790);
        assert!(!r.is_browsing());
        assert_eq!(texts(&fx), ["87.9 MHz|Tuned"]);
        assert!(fx.contains(&Effect::Persist));
    }

    #[test]
    fn store_preset_uses_current_band() {
        let mut r = RadioState::new();
        let mut fx = Effects::new();
        select_band(&mut r, Band::Am, &mut fx);
        r.frequency = 99000;
        let fx = run(&mut r, RadioAction::StorePreset(0), 0);
        assert_eq!(r.preset(Band::Am, 0), Some(99000));
        assert_eq!(r.preset(Band::Fm, 0), Some(DEFAULT_FM_PRESETS[0]));
        assert_eq!(texts(&fx), ["Station 1 Saved|"]);
    }

    #[test]
    fn seek_only_notifies() {
        let mut r = RadioState::new();
        let fx = run(&mut r, RadioAction::Seek(Step::Down), 0);
        assert_eq!(texts(&fx), ["Seeking Down|"]);
        assert_eq!(r.frequency, DEFAULT_FREQUENCY);
    }
}
