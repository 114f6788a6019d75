//! Resistor-ladder buttons on a single ADC line.
//!
//! Nine buttons share one analog input; each pulls the line to a
//! distinct voltage. A reading is the mean of a few raw samples,
//! classified into at most one button band:
//!
//! ```text
//!   0 ───── 100 (noise floor) ── [201±40] ── [346±40] ── ... ── [4095±40]
//!            None                 Band1       Band2              SeekUp
//! ```
//!
//! The ladder can only represent one pressed button at a time; pressing
//! two at once yields whichever band the combined resistance lands in
//! (or nothing).

use super::{post, ButtonEvent, ButtonId, EventKind, EventSender};
use crate::config;
use embassy_time::{Duration, Instant, Ticker, Timer};

/// Local async ADC abstraction, one raw conversion per call.
pub trait AsyncAdc {
    type Error;
    async fn read(&mut self) -> Result<u16, Self::Error>;
}

/// Calibration and timing for the ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LadderConfig {
    /// Band centres in `ButtonId` ladder order.
    pub thresholds: [u16; config::LADDER_BUTTONS],
    /// Half-width of each band.
    pub tolerance: u16,
    /// Means below this read as "no button".
    pub noise_floor: u16,
    /// Pause between raw samples.
    pub sample_delay: Duration,
    /// Polling period of the tracker loop.
    pub poll_period: Duration,
    /// Hold time before `LongPress`.
    pub long_press: Duration,
    /// Period of `Repeat` after the long press.
    pub repeat_interval: Duration,
}

impl Default for LadderConfig {
    fn default() -> Self {
        Self {
            thresholds: config::LADDER_THRESHOLDS,
            tolerance: config::LADDER_TOLERANCE,
            noise_floor: config::LADDER_NOISE_FLOOR,
            sample_delay: Duration::from_millis(config::LADDER_SAMPLE_DELAY_MS),
            poll_period: Duration::from_millis(config::LADDER_POLL_MS),
            long_press: Duration::from_millis(config::LONG_PRESS_MS),
            repeat_interval: Duration::from_millis(config::REPEAT_INTERVAL_MS),
        }
    }
}

impl LadderConfig {
    /// Map an averaged reading to a button. First matching band wins.
    pub fn classify(&self, mean: u16) -> ButtonId {
        if mean < self.noise_floor {
            return ButtonId::None;
        }

        let hit = self.thresholds.iter().position(|&centre| {
            mean >= centre.saturating_sub(self.tolerance) && mean <= centre.saturating_add(self.tolerance)
        });

        match hit {
            Some(index) => ButtonId::from_ladder_index(index),
            None => {
                // Calibration drift: something is pressed but matches no band.
                warn!("Ladder: unknown ADC value {} (no button matched)", mean);
                ButtonId::None
            }
        }
    }

    /// Take `LADDER_SAMPLES` raw readings, average the successful ones and
    /// classify the mean.
    pub async fn read<A: AsyncAdc>(&self, adc: &mut A) -> ButtonId {
        let mut sum: u32 = 0;
        let mut count: u32 = 0;

        for _ in 0..config::LADDER_SAMPLES {
            if let Ok(raw) = adc.read().await {
                sum += u32::from(raw);
                count += 1;
            }
            Timer::after(self.sample_delay).await;
        }

        if count == 0 {
            warn!("Ladder: all ADC samples failed");
            return ButtonId::None;
        }

        self.classify((sum / count) as u16)
    }
}

/// Press / long-press / repeat / release synthesis for one tracked button.
#[derive(Debug, Clone)]
pub struct LadderTracker {
    long_press: Duration,
    repeat_interval: Duration,
    held: ButtonId,
    pressed_at: Instant,
    last_repeat: Instant,
    long_press_sent: bool,
}

impl LadderTracker {
    pub fn new(config: &LadderConfig) -> Self {
        Self {
            long_press: config.long_press,
            repeat_interval: config.repeat_interval,
            held: ButtonId::None,
            pressed_at: Instant::from_ticks(0),
            last_repeat: Instant::from_ticks(0),
            long_press_sent: false,
        }
    }

    /// Button currently considered held.
    pub fn held(&self) -> ButtonId {
        self.held
    }

    /// Feed one classified reading taken at `now`.
    pub fn poll(&mut self, current: ButtonId, now: Instant) -> Option<ButtonEvent> {
        let previous = self.held;
        self.held = current;

        if current.is_none() {
            if previous.is_none() {
                return None;
            }
            return Some(ButtonEvent::new(previous, EventKind::Release, now));
        }

        if current != previous {
            self.pressed_at = now;
            self.last_repeat = now;
            self.long_press_sent = false;
            return Some(ButtonEvent::new(current, EventKind::Press, now));
        }

        if !self.long_press_sent {
            if now.saturating_duration_since(self.pressed_at) >= self.long_press {
                self.long_press_sent = true;
                self.last_repeat = now;
                return Some(ButtonEvent::new(current, EventKind::LongPress, now));
            }
            return None;
        }

        if now.saturating_duration_since(self.last_repeat) >= self.repeat_interval {
            self.last_repeat = now;
            return Some(ButtonEvent::new(current, EventKind::Repeat, now));
        }

        None
    }
}

/// Background driver that owns the ADC and feeds the event queue.
pub struct LadderDriver<A: AsyncAdc> {
    adc: A,
    config: LadderConfig,
    tracker: LadderTracker,
}

impl<A: AsyncAdc> LadderDriver<A> {
    pub fn new(adc: A, config: LadderConfig) -> Self {
        let tracker = LadderTracker::new(&config);
        Self {
            adc,
            config,
            tracker,
        }
    }

    /// Polling loop. Spawn this in its own task.
    pub async fn run(mut self, sender: EventSender<'_>) -> ! {
        info!("Ladder: polling every {} ms", self.config.poll_period.as_millis());
        let mut ticker = Ticker::every(self.config.poll_period);
        loop {
            let current = self.config.read(&mut self.adc).await;
            if let Some(event) = self.tracker.poll(current, Instant::now()) {
                debug!("Ladder: {}", event);
                post(&sender, event);
            }
            ticker.next().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(ms: u64) -> Instant {
        Instant::from_millis(ms)
    }

    fn tracker() -> LadderTracker {
        LadderTracker::new(&LadderConfig::default())
    }

    #[test]
    fn classify_band_centres_and_edges() {
        let cfg = LadderConfig::default();
        assert_eq!(cfg.classify(201), ButtonId::Band1);
        assert_eq!(cfg.classify(161), ButtonId::Band1);
        assert_eq!(cfg.classify(241), ButtonId::Band1);
        assert_eq!(cfg.classify(346), ButtonId::Band2);
        assert_eq!(cfg.classify(757), ButtonId::Station1);
        assert_eq!(cfg.classify(2204), ButtonId::Station3);
        assert_eq!(cfg.classify(3450), ButtonId::Station5);
        assert_eq!(cfg.classify(3900), ButtonId::SeekDown);
        assert_eq!(cfg.classify(4095), ButtonId::SeekUp);
    }

    #[test]
    fn classify_below_floor_and_between_bands() {
        let cfg = LadderConfig::default();
        assert_eq!(cfg.classify(0), ButtonId::None);
        assert_eq!(cfg.classify(99), ButtonId::None);
        // Above the floor but outside every band.
        assert_eq!(cfg.classify(120), ButtonId::None);
        assert_eq!(cfg.classify(1000), ButtonId::None);
    }

    #[test]
    fn bands_do_not_overlap() {
        let cfg = LadderConfig::default();
        for pair in cfg.thresholds.windows(2) {
            assert!(pair[1] - pair[0] > 2 * cfg.tolerance);
        }
    }

    #[test]
    fn press_then_hold_does_not_repeat_press() {
        let mut t = tracker();
        let ev = t.poll(ButtonId::Station2, at(0)).unwrap();
        assert_eq!(ev.kind, EventKind::Press);
        assert_eq!(ev.button, ButtonId::Station2);

        assert_eq!(t.poll(ButtonId::Station2, at(20)), None);
        assert_eq!(t.poll(ButtonId::Station2, at(40)), None);

        let ev = t.poll(ButtonId::None, at(60)).unwrap();
        assert_eq!(ev.kind, EventKind::Release);
        assert_eq!(ev.button, ButtonId::Station2);

        assert_eq!(t.poll(ButtonId::None, at(80)), None);
    }

    #[test]
    fn long_press_once_then_repeats_at_interval() {
        let mut t = tracker();
        t.poll(ButtonId::SeekUp, at(0));

        let mut kinds = std::vec::Vec::new();
        let mut now = 20;
        while now <= 1700 {
            if let Some(ev) = t.poll(ButtonId::SeekUp, at(now)) {
                kinds.push((now, ev.kind));
            }
            now += 20;
        }

        assert_eq!(kinds[0], (1000, EventKind::LongPress));
        let long_presses = kinds.iter().filter(|(_, k)| *k == EventKind::LongPress).count();
        assert_eq!(long_presses, 1);

        let repeats: std::vec::Vec<u64> = kinds
            .iter()
            .filter(|(_, k)| *k == EventKind::Repeat)
            .map(|(t, _)| *t)
            .collect();
        assert_eq!(repeats, [1200, 1400, 1600]);
    }

    #[test]
    fn switching_buttons_presses_the_new_one() {
        let mut t = tracker();
        t.poll(ButtonId::Station1, at(0));
        let ev = t.poll(ButtonId::Station4, at(20)).unwrap();
        assert_eq!(ev.kind, EventKind::Press);
        assert_eq!(ev.button, ButtonId::Station4);

        let ev = t.poll(ButtonId::None, at(40)).unwrap();
        assert_eq!(ev.button, ButtonId::Station4);
        assert_eq!(ev.kind, EventKind::Release);
    }

    #[test]
    fn new_press_rearms_long_press() {
        let mut t = tracker();
        t.poll(ButtonId::Band1, at(0));
        assert_eq!(t.poll(ButtonId::Band1, at(1000)).unwrap().kind, EventKind::LongPress);
        t.poll(ButtonId::None, at(1020));
        t.poll(ButtonId::Band1, at(1040));
        assert_eq!(t.poll(ButtonId::Band1, at(1500)), None);
        assert_eq!(t.poll(ButtonId::Band1, at(2040)).unwrap().kind, EventKind::LongPress);
    }
}
