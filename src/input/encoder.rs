//! Quadrature rotary encoder with push switch.
//!
//! Runs on every edge of CLK, DT or SW, typically straight from the GPIO
//! interrupt. Everything here is short, non-blocking and allocation-free;
//! events leave through a `try_send` onto the event queue.
//!
//! Rotation is decoded with a Gray-code state machine:
//!
//! ```text
//!        CW:  11 → 01 → 00 → 10 → 11
//!       CCW:  11 → 10 → 00 → 01 → 11
//! ```
//!
//! Each table lookup yields no movement, one step clockwise or one step
//! counter-clockwise. Steps accumulate until a full detent is reached.
//!
//! The push switch is only evaluated while both phase lines are at rest
//! (high), so contact chatter from turning is never read as a press.

use super::{post, ButtonEvent, ButtonId, EventKind, EventSender};
use crate::config;
use core::cell::Cell;
use embassy_futures::select::select3;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_time::{Duration, Instant};
use embedded_hal::digital::InputPin;
use embedded_hal_async::digital::Wait;
use heapless::Vec;

/// Result of one transition table lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    None,
    Cw,
    Ccw,
}

impl Direction {
    pub fn step(self) -> i8 {
        match self {
            Direction::None => 0,
            Direction::Cw => 1,
            Direction::Ccw => -1,
        }
    }
}

/// Gray-code phase of the two encoder lines, `(CLK << 1) | DT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Phase {
    /// Both low.
    P00 = 0,
    /// DT high, CLK low.
    P01 = 1,
    /// CLK high, DT low.
    P10 = 2,
    /// Both high - the detent rest position.
    P11 = 3,
}

impl Phase {
    pub fn from_levels(clk: bool, dt: bool) -> Phase {
        match (clk, dt) {
            (false, false) => Phase::P00,
            (false, true) => Phase::P01,
            (true, false) => Phase::P10,
            (true, true) => Phase::P11,
        }
    }
}

use Direction::{Ccw, Cw, None as Still};

/// Transition table indexed by `[previous][next]`.
///
/// Same-phase and two-bit jumps (invalid, e.g. a missed edge) are
/// `None`; they never move the accumulator.
pub const TRANSITIONS: [[Direction; 4]; 4] = [
    //  → 00    → 01   → 10   → 11
    [Still, Ccw, Cw, Still], // from 00
    [Cw, Still, Still, Ccw], // from 01
    [Ccw, Still, Still, Cw], // from 10
    [Still, Cw, Ccw, Still], // from 11
];

/// Look up the direction of a phase change.
pub fn transition(from: Phase, to: Phase) -> Direction {
    TRANSITIONS[from as usize][to as usize]
}

/// Sampled levels of the encoder lines (`true` = high).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PinLevels {
    pub clk: bool,
    pub dt: bool,
    /// Push switch, active low.
    pub sw: bool,
}

impl PinLevels {
    /// Both phase lines high.
    pub fn at_rest(&self) -> bool {
        self.clk && self.dt
    }
}

/// Encoder timing and detent size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EncoderConfig {
    /// Edges closer than this to the last accepted one are bounce.
    pub refractory: Duration,
    /// Pushes shorter than this are bounce.
    pub min_press: Duration,
    /// Hold time for a long press.
    pub long_press: Duration,
    /// Quadrature steps per reported detent.
    pub detent_steps: i8,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            refractory: Duration::from_millis(config::ENCODER_REFRACTORY_MS),
            min_press: Duration::from_millis(config::ENCODER_MIN_PRESS_MS),
            long_press: Duration::from_millis(config::LONG_PRESS_MS),
            detent_steps: config::ENCODER_DETENT_STEPS,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct PressState {
    pressed: bool,
    since: Instant,
    long_press_sent: bool,
}

/// Push-switch state shared between the edge handler and the long-press
/// monitor.
pub struct PressLatch {
    state: Mutex<CriticalSectionRawMutex, Cell<PressState>>,
}

impl PressLatch {
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(Cell::new(PressState {
                pressed: false,
                since: Instant::from_ticks(0),
                long_press_sent: false,
            })),
        }
    }

    /// Record a press start. Returns `false` if already pressed.
    pub fn press(&self, now: Instant) -> bool {
        self.state.lock(|cell| {
            let s = cell.get();
            if s.pressed {
                return false;
            }
            cell.set(PressState {
                pressed: true,
                since: now,
                long_press_sent: false,
            });
            true
        })
    }

    /// End the press, returning when it started.
    pub fn release(&self) -> Option<Instant> {
        self.state.lock(|cell| {
            let mut s = cell.get();
            if !s.pressed {
                return None;
            }
            s.pressed = false;
            cell.set(s);
            Some(s.since)
        })
    }

    pub fn is_pressed(&self) -> bool {
        self.state.lock(|cell| cell.get().pressed)
    }

    /// Atomically claim the long press for the current press.
    ///
    /// Returns `true` exactly once per press, the first time it is called
    /// with the switch held for at least `threshold`.
    pub fn claim_long_press(&self, now: Instant, threshold: Duration) -> bool {
        self.state.lock(|cell| {
            let mut s = cell.get();
            if !s.pressed || s.long_press_sent {
                return false;
            }
            if now.saturating_duration_since(s.since) < threshold {
                return false;
            }
            s.long_press_sent = true;
            cell.set(s);
            true
        })
    }
}

impl Default for PressLatch {
    fn default() -> Self {
        Self::new()
    }
}

/// Events produced by a single edge (a long press and a rotation can
/// coincide).
pub type EdgeEvents = Vec<ButtonEvent, 2>;

/// Interrupt-side decoder state.
pub struct EncoderDecoder<'a> {
    config: EncoderConfig,
    latch: &'a PressLatch,
    phase: Phase,
    position: i8,
    last_edge: Option<Instant>,
}

impl<'a> EncoderDecoder<'a> {
    pub fn new(config: EncoderConfig, latch: &'a PressLatch) -> Self {
        Self {
            config,
            latch,
            phase: Phase::P11,
            position: 0,
            last_edge: None,
        }
    }

    /// Sub-detent accumulator.
    pub fn position(&self) -> i8 {
        self.position
    }

    pub fn reset_position(&mut self) {
        self.position = 0;
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Decode one edge sampled at `now`.
    pub fn on_edge(&mut self, levels: PinLevels, now: Instant) -> EdgeEvents {
        let mut out = EdgeEvents::new();

        if let Some(last) = self.last_edge {
            if now.saturating_duration_since(last) < self.config.refractory {
                return out;
            }
        }

        if levels.at_rest() && !levels.sw {
            if self.latch.press(now) {
                self.position = 0;
                self.last_edge = Some(now);
            } else if self.latch.claim_long_press(now, self.config.long_press) {
                let _ = out.push(ButtonEvent::new(ButtonId::EncoderButton, EventKind::LongPress, now));
            }
            return out;
        }

        if levels.at_rest() && levels.sw && self.latch.is_pressed() {
            self.last_edge = Some(now);
            if let Some(since) = self.latch.release() {
                let held = now.saturating_duration_since(since);
                let kind = if held >= self.config.long_press {
                    Some(EventKind::ReleaseAfterLongPress)
                } else if held > self.config.min_press {
                    Some(EventKind::Press)
                } else {
                    None
                };
                if let Some(kind) = kind {
                    let _ = out.push(ButtonEvent::new(ButtonId::EncoderButton, kind, now));
                }
            }
            return out;
        }

        if self.latch.claim_long_press(now, self.config.long_press) {
            let _ = out.push(ButtonEvent::new(ButtonId::EncoderButton, EventKind::LongPress, now));
        }

        let next = Phase::from_levels(levels.clk, levels.dt);
        let direction = transition(self.phase, next);
        self.phase = next;

        if direction != Direction::None {
            self.position += direction.step();
            self.last_edge = Some(now);

            if self.position >= self.config.detent_steps {
                self.position = 0;
                let _ = out.push(ButtonEvent::new(ButtonId::EncoderButton, EventKind::RotateCw, now));
            } else if self.position <= -self.config.detent_steps {
                self.position = 0;
                let _ = out.push(ButtonEvent::new(ButtonId::EncoderButton, EventKind::RotateCcw, now));
            }
        }

        out
    }

    /// Interrupt entry point: decode and enqueue, never blocks.
    pub fn handle_edge(&mut self, levels: PinLevels, now: Instant, sender: &EventSender<'_>) {
        for event in self.on_edge(levels, now) {
            post(sender, event);
        }
    }
}

/// Async front-end for boards that wait on pin edges instead of wiring
/// a raw interrupt handler.
pub struct EncoderInput<CLK, DT, SW> {
    clk: CLK,
    dt: DT,
    sw: SW,
    config: EncoderConfig,
}

impl<CLK, DT, SW> EncoderInput<CLK, DT, SW>
where
    CLK: InputPin + Wait,
    DT: InputPin + Wait,
    SW: InputPin + Wait,
{
    pub fn new(clk: CLK, dt: DT, sw: SW, config: EncoderConfig) -> Self {
        Self { clk, dt, sw, config }
    }

    fn levels(&mut self) -> PinLevels {
        // Pins are pulled up; an unreadable line is treated as idle.
        PinLevels {
            clk: self.clk.is_high().unwrap_or(true),
            dt: self.dt.is_high().unwrap_or(true),
            sw: self.sw.is_high().unwrap_or(true),
        }
    }

    /// Edge loop. Spawn this in its own task.
    pub async fn run(mut self, latch: &PressLatch, sender: EventSender<'_>) -> ! {
        let mut decoder = EncoderDecoder::new(self.config, latch);
        info!("Encoder: edge loop started");
        loop {
            let _ = select3(
                self.clk.wait_for_any_edge(),
                self.dt.wait_for_any_edge(),
                self.sw.wait_for_any_edge(),
            )
            .await;
            let levels = self.levels();
            decoder.handle_edge(levels, Instant::now(), &sender);
        }
    }
}
