//! Periodic long-press check for the encoder push switch.
//!
//! The edge handler only sees time pass when another edge arrives, so a
//! button held perfectly still would never report a long press. This
//! task looks at the shared [`PressLatch`] every 100 ms and emits the
//! `LongPress` if the edge handler has not already done so.

use super::encoder::PressLatch;
use super::{post, ButtonEvent, ButtonId, EventKind, EventSender};
use crate::config;
use embassy_time::{Duration, Instant, Ticker};

pub struct LongPressMonitor<'a> {
    latch: &'a PressLatch,
    threshold: Duration,
    period: Duration,
}

impl<'a> LongPressMonitor<'a> {
    pub fn new(latch: &'a PressLatch) -> Self {
        Self {
            latch,
            threshold: Duration::from_millis(config::LONG_PRESS_MS),
            period: Duration::from_millis(config::LONG_PRESS_MONITOR_MS),
        }
    }

    pub fn with_timing(latch: &'a PressLatch, threshold: Duration, period: Duration) -> Self {
        Self {
            latch,
            threshold,
            period,
        }
    }

    /// One monitor tick.
    pub fn check(&self, now: Instant) -> Option<ButtonEvent> {
        if self.latch.claim_long_press(now, self.threshold) {
            return Some(ButtonEvent::new(ButtonId::EncoderButton, EventKind::LongPress, now));
        }
        None
    }

    pub async fn run(self, sender: EventSender<'_>) -> ! {
        let mut ticker = Ticker::every(self.period);
        loop {
            ticker.next().await;
            if let Some(event) = self.check(Instant::now()) {
                debug!("Monitor: encoder long press");
                post(&sender, event);
            }
        }
    }
}
