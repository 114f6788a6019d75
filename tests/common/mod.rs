//! Host-side stand-ins for the head unit's collaborators.
#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, VecDeque};
use std::convert::Infallible;
use std::rc::Rc;

use embedded_storage_async::nor_flash::{ErrorType as FlashErrorType, NorFlash, NorFlashErrorKind, ReadNorFlash};
use headunit::input::ladder::AsyncAdc;
use headunit::{AudioCommand, AudioStack, DisplaySink, Error, Key, Notification, OperatingMode, SettingsStore};

// ════════════════════════════════════════════════════════════════════
// Settings
// ════════════════════════════════════════════════════════════════════

#[derive(Default)]
pub struct MemoryStore {
    pub items: BTreeMap<u8, Vec<u8>>,
    pub fail: bool,
}

impl MemoryStore {
    pub fn raw(&self, key: Key) -> Option<&[u8]> {
        self.items.get(&key.id()).map(Vec::as_slice)
    }
}

impl SettingsStore for MemoryStore {
    async fn fetch(&mut self, key: Key, buf: &mut [u8]) -> Result<Option<usize>, Error> {
        if self.fail {
            return Err(Error::Storage);
        }
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
        if self.fail {
            return Err(Error::Storage);
        }
        self.items.insert(key.id(), value.to_vec());
        Ok(())
    }
}

/// RAM-backed NOR flash, erased to 0xFF.
pub struct RamFlash {
    pub data: Vec<u8>,
}

impl RamFlash {
    pub const PAGE: usize = 4096;

    pub fn new(pages: usize) -> Self {
        Self {
            data: vec![0xFF; pages * Self::PAGE],
        }
    }
}

impl FlashErrorType for RamFlash {
    type Error = NorFlashErrorKind;
}

impl ReadNorFlash for RamFlash {
    const READ_SIZE: usize = 1;

    async fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        let start = offset as usize;
        let end = start + bytes.len();
        if end > self.data.len() {
            return Err(NorFlashErrorKind::OutOfBounds);
        }
        bytes.copy_from_slice(&self.data[start..end]);
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.data.len()
    }
}

impl NorFlash for RamFlash {
    const WRITE_SIZE: usize = 4;
    const ERASE_SIZE: usize = Self::PAGE;

    async fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
        let (from, to) = (from as usize, to as usize);
        if to > self.data.len() || from % Self::PAGE != 0 || to % Self::PAGE != 0 {
            return Err(NorFlashErrorKind::NotAligned);
        }
        self.data[from..to].fill(0xFF);
        Ok(())
    }

    async fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        let start = offset as usize;
        let end = start + bytes.len();
        if end > self.data.len() {
            return Err(NorFlashErrorKind::OutOfBounds);
        }
        // NOR semantics: writes can only clear bits.
        for (cell, b) in self.data[start..end].iter_mut().zip(bytes) {
            *cell &= *b;
        }
        Ok(())
    }
}

// ════════════════════════════════════════════════════════════════════
// Display / audio
// ════════════════════════════════════════════════════════════════════

#[derive(Default)]
pub struct RecordingDisplay {
    pub shown: Vec<Notification>,
    pub modes: Vec<(OperatingMode, OperatingMode)>,
}

impl RecordingDisplay {
    pub fn texts(&self) -> Vec<(String, String)> {
        self.shown
            .iter()
            .map(|n| (n.text().to_string(), n.subtext().to_string()))
            .collect()
    }

    pub fn last(&self) -> Option<(&str, &str)> {
        self.shown.last().map(|n| (n.text(), n.subtext()))
    }
}

impl DisplaySink for RecordingDisplay {
    async fn show(&mut self, notification: Notification) -> Result<(), Error> {
        self.shown.push(notification);
        Ok(())
    }

    async fn mode_changed(&mut self, from: OperatingMode, to: OperatingMode) -> Result<(), Error> {
        self.modes.push((from, to));
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingAudio {
    pub executed: Vec<AudioCommand>,
    /// Commands that fail instead of executing.
    pub failing: Vec<AudioCommand>,
}

impl AudioStack for RecordingAudio {
    async fn execute(&mut self, command: AudioCommand) -> Result<(), Error> {
        if self.failing.contains(&command) {
            return Err(Error::Audio);
        }
        self.executed.push(command);
        Ok(())
    }
}

// ════════════════════════════════════════════════════════════════════
// Input hardware
// ════════════════════════════════════════════════════════════════════

/// ADC conversion error.
#[derive(Debug, PartialEq)]
pub struct AdcFault;

/// ADC whose reading is set by the test. Queued `script` entries are
/// consumed first, one per conversion; `None` fails that conversion.
pub struct ScriptedAdc<'a> {
    pub level: &'a Cell<u16>,
    pub script: RefCell<VecDeque<Option<u16>>>,
}

impl<'a> ScriptedAdc<'a> {
    pub fn new(level: &'a Cell<u16>) -> Self {
        Self {
            level,
            script: RefCell::new(VecDeque::new()),
        }
    }

    pub fn with_script(level: &'a Cell<u16>, samples: &[Option<u16>]) -> Self {
        let adc = Self::new(level);
        adc.script.borrow_mut().extend(samples.iter().copied());
        adc
    }
}

impl AsyncAdc for ScriptedAdc<'_> {
    type Error = AdcFault;

    async fn read(&mut self) -> Result<u16, Self::Error> {
        match self.script.get_mut().pop_front() {
            Some(Some(raw)) => Ok(raw),
            Some(None) => Err(AdcFault),
            None => Ok(self.level.get()),
        }
    }
}

/// One GPIO line shared between the test and a pin handle.
pub struct Line {
    level: Cell<bool>,
    edge: tokio::sync::Notify,
}

impl Line {
    pub fn new(level: bool) -> Rc<Self> {
        Rc::new(Self {
            level: Cell::new(level),
            edge: tokio::sync::Notify::new(),
        })
    }

    pub fn set(&self, level: bool) {
        if self.level.replace(level) != level {
            self.edge.notify_waiters();
        }
    }
}

pub struct MockPin(pub Rc<Line>);

impl embedded_hal::digital::ErrorType for MockPin {
    type Error = Infallible;
}

impl embedded_hal::digital::InputPin for MockPin {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(self.0.level.get())
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.0.level.get())
    }
}

impl embedded_hal_async::digital::Wait for MockPin {
    async fn wait_for_high(&mut self) -> Result<(), Self::Error> {
        while !self.0.level.get() {
            self.0.edge.notified().await;
        }
        Ok(())
    }

    async fn wait_for_low(&mut self) -> Result<(), Self::Error> {
        while self.0.level.get() {
            self.0.edge.notified().await;
        }
        Ok(())
    }

    async fn wait_for_rising_edge(&mut self) -> Result<(), Self::Error> {
        self.wait_for_low().await?;
        self.wait_for_high().await
    }

    async fn wait_for_falling_edge(&mut self) -> Result<(), Self::Error> {
        self.wait_for_high().await?;
        self.wait_for_low().await
    }

    async fn wait_for_any_edge(&mut self) -> Result<(), Self::Error> {
        self.0.edge.notified().await;
        Ok(())
    }
}
