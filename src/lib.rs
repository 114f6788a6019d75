//! Input-and-control core of a car audio head unit.
//!
//! ```text
//!  ADC ladder ─┐
//!  Encoder ISR ├─▶ EventQueue ─▶ dispatcher ─▶ Stereo ─▶ effects
//!  LP monitor ─┘                    ▲                    ├─ display
//!                    StackQueue ────┘                    ├─ audio stack
//!                                                        └─ settings store
//! ```
//!
//! The crate is `no_std` and hardware-agnostic. A firmware binary provides
//! the ADC, encoder pins, flash, display and Bluetooth stack through the
//! traits exported here and spawns the `run` loops:
//!
//!   - [`input::ladder::LadderDriver::run`]
//!   - [`input::encoder::EncoderInput::run`] (or call
//!     [`input::encoder::EncoderDecoder::handle_edge`] from the GPIO ISR)
//!   - [`input::monitor::LongPressMonitor::run`]
//!   - [`dispatch::run`]
//!
//! Host tests: `cargo test`. Target logging: `--features defmt`.

#![cfg_attr(not(test), no_std)]
#![allow(async_fn_in_trait)]

#[macro_use]
mod fmt;

pub mod audio;
pub mod config;
pub mod dispatch;
pub mod display;
pub mod error;
pub mod head_unit;
pub mod input;
pub mod stereo;
pub mod storage;

pub use audio::{AudioCommand, AudioStack, StackEvent, StackQueue, VolumeTarget};
pub use display::{DisplayKind, DisplaySink, Notification};
pub use error::Error;
pub use head_unit::{Config, HeadUnit};
pub use input::{ButtonEvent, ButtonId, EventKind, EventQueue};
pub use stereo::{Band, OperatingMode, Stereo, Volume};
pub use storage::{FlashStore, Key, SettingsStore};
