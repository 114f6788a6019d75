//! Application-wide constants and compile-time configuration.
//!
//! All calibration values, timing parameters, and persisted defaults
//! live here so they can be tuned in one place.

// Button ladder (12-bit ADC, 3.3 V, pull-down divider)

/// Measured ADC centre value for each ladder button, in `ButtonId` order
/// starting at `Band1`.
///
///   Band1     100 kΩ →  201
///   Band2      68 kΩ →  346
///   Station1   33 kΩ →  757
///   Station2   15 kΩ → 1425
///   Station3  6.8 kΩ → 2204
///   Station4  3.3 kΩ → 2830
///   Station5  1.5 kΩ → 3450
///   SeekDown  330 Ω  → 3920
///   SeekUp    150 Ω  → 4095 (estimated)
pub const LADDER_THRESHOLDS: [u16; LADDER_BUTTONS] =
    [201, 346, 757, 1425, 2204, 2830, 3450, 3920, 4095];

/// Number of buttons on the resistor ladder.
pub const LADDER_BUTTONS: usize = 9;

/// Half-width of each button's voltage band (ADC counts).
pub const LADDER_TOLERANCE: u16 = 40;

/// Averaged readings below this are "no button pressed".
pub const LADDER_NOISE_FLOOR: u16 = 100;

/// Raw ADC samples averaged per reading.
pub const LADDER_SAMPLES: usize = 4;

/// Delay between consecutive raw samples (ms).
pub const LADDER_SAMPLE_DELAY_MS: u64 = 1;

/// Ladder polling period (ms).
pub const LADDER_POLL_MS: u64 = 20;

// Timing shared by both decoders

/// Hold time before a `LongPress` is reported (ms).
pub const LONG_PRESS_MS: u64 = 1000;

/// Interval between `Repeat` events once a long press was reported (ms).
pub const REPEAT_INTERVAL_MS: u64 = 200;

// Rotary encoder

/// Edges closer than this to the last accepted edge are ignored (ms).
pub const ENCODER_REFRACTORY_MS: u64 = 5;

/// Encoder push shorter than this is contact bounce (ms).
pub const ENCODER_MIN_PRESS_MS: u64 = 50;

/// Quadrature steps per reported detent.
pub const ENCODER_DETENT_STEPS: i8 = 2;

/// Long-press monitor period (ms).
pub const LONG_PRESS_MONITOR_MS: u64 = 100;

// Queues

/// Depth of the button event queue. Sized to absorb a fast spin.
pub const EVENT_QUEUE_DEPTH: usize = 20;

/// Depth of the inbound audio-stack notification queue.
pub const STACK_QUEUE_DEPTH: usize = 8;

/// Depth of the outbound display notification queue.
pub const DISPLAY_QUEUE_DEPTH: usize = 8;

// Mode machine

/// Highest volume step on every audio path.
pub const VOLUME_MAX: u8 = 15;

/// Candidate frequency is tuned this long after the last browse step (ms).
pub const BROWSE_COMMIT_MS: u64 = 2000;

/// Station preset buttons per band.
pub const PRESETS_PER_BAND: usize = 5;

/// Maximum number of Bluetooth devices with remembered volumes.
pub const MAX_BT_DEVICES: usize = 5;

// Defaults applied before the persisted state is loaded

pub const DEFAULT_RADIO_VOLUME: u8 = 10;
pub const DEFAULT_A2DP_VOLUME: u8 = 10;
pub const DEFAULT_HFP_SPEAKER_VOLUME: u8 = 12;
pub const DEFAULT_HFP_MIC_VOLUME: u8 = 10;

/// 87.50 MHz, in hundredths.
pub const DEFAULT_FREQUENCY: u32 = 8750;

/// FM presets in hundredths of MHz.
pub const DEFAULT_FM_PRESETS: [u32; PRESETS_PER_BAND] = [8790, 9530, 10110, 10570, 10790];

/// AM presets in hundredths of kHz.
pub const DEFAULT_AM_PRESETS: [u32; PRESETS_PER_BAND] = [54000, 72000, 95000, 120000, 145000];

// Settings storage

/// Offset of the settings partition inside the flash handed to `FlashStore`.
pub const STORAGE_FLASH_START: u32 = 0;

/// Flash page size used by the settings partition (4 KB).
pub const STORAGE_PAGE_SIZE: u32 = 4096;

/// Number of flash pages reserved for settings.
pub const STORAGE_PAGE_COUNT: u32 = 4;
