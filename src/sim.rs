//! Host-side stand-ins for the device peripherals.
//!
//! Useful for host tools and tests that drive a [`Bootloader`](crate::session::Bootloader)
//! without hardware:
//!
//! - [`SimSerial`]: an `embedded-hal-nb` serial port fed from a queue, recording what is sent
//! - [`SimFlash`]: word-addressed program memory with erase-before-write semantics
//! - [`SimEeprom`]: byte cells that read back as zero until written
//!
//! Each one can be told to fail so error paths can be exercised.

use std::collections::{BTreeMap, VecDeque};

use embedded_hal_nb::serial::{self, ErrorKind, ErrorType, Read, Write};

use crate::flash::ProgramMemory;
use crate::provision::Eeprom;

/// Value of an erased program-memory word (phantom byte reads as zero).
pub const ERASED_WORD: u32 = 0x00FF_FFFF;

/// Error raised by [`SimSerial`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimSerialError(pub ErrorKind);

impl serial::Error for SimSerialError {
    fn kind(&self) -> ErrorKind {
        self.0
    }
}

/// A serial port whose receive side is scripted and whose transmit side is recorded.
#[derive(Debug, Default)]
pub struct SimSerial {
    rx: VecDeque<Result<u8, ErrorKind>>,
    tx: Vec<u8>,
    tx_busy_polls: usize,
    tx_pending: usize,
    fail_tx: bool,
}

impl SimSerial {
    /// Creates an idle port.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every transmitted byte report "buffer full" `polls` times before it is accepted.
    pub fn with_tx_busy_polls(mut self, polls: usize) -> Self {
        self.tx_busy_polls = polls;
        self.tx_pending = polls;
        self
    }

    /// Queues bytes as if they arrived on the line.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.rx.extend(bytes.iter().map(|&b| Ok(b)));
    }

    /// Queues a line error (the byte that caused it is lost).
    pub fn feed_error(&mut self, kind: ErrorKind) {
        self.rx.push_back(Err(kind));
    }

    /// Number of scripted receive events not yet read.
    pub fn pending_rx(&self) -> usize {
        self.rx.len()
    }

    /// Everything transmitted so far.
    pub fn sent(&self) -> &[u8] {
        &self.tx
    }

    /// Returns and clears everything transmitted so far.
    pub fn take_sent(&mut self) -> Vec<u8> {
        core::mem::take(&mut self.tx)
    }

    /// Makes every following transmit fail.
    pub fn fail_transmit(&mut self) {
        self.fail_tx = true;
    }
}

impl ErrorType for SimSerial {
    type Error = SimSerialError;
}

impl Read<u8> for SimSerial {
    fn read(&mut self) -> nb::Result<u8, Self::Error> {
        match self.rx.pop_front() {
            None => Err(nb::Error::WouldBlock),
            Some(Ok(byte)) => Ok(byte),
            Some(Err(kind)) => Err(nb::Error::Other(SimSerialError(kind))),
        }
    }
}

impl Write<u8> for SimSerial {
    fn write(&mut self, word: u8) -> nb::Result<(), Self::Error> {
        if self.fail_tx {
            return Err(nb::Error::Other(SimSerialError(ErrorKind::Other)));
        }
        if self.tx_pending > 0 {
            self.tx_pending -= 1;
            return Err(nb::Error::WouldBlock);
        }
        self.tx.push(word);
        self.tx_pending = self.tx_busy_polls;
        Ok(())
    }

    fn flush(&mut self) -> nb::Result<(), Self::Error> {
        Ok(())
    }
}

/// Error raised by [`SimFlash`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimFlashError {
    /// A failure injected by the test.
    Injected,
    /// The target word was programmed without being erased first.
    NotErased,
}

/// Word-addressed program memory.
///
/// Words that were never written read as [`ERASED_WORD`]. Programming a word that is
/// not erased fails, as it would on the real NVM controller.
#[derive(Debug, Clone)]
pub struct SimFlash {
    words: BTreeMap<u32, u32>,
    page_size: u32,
    erased_pages: Vec<u32>,
    fail_write_at: Option<u32>,
    fail_erase_at: Option<u32>,
}

impl SimFlash {
    /// Creates a blank memory erased in pages of `page_size` address units.
    pub fn new(page_size: u32) -> Self {
        Self {
            words: BTreeMap::new(),
            page_size,
            erased_pages: Vec::new(),
            fail_write_at: None,
            fail_erase_at: None,
        }
    }

    /// Reads the word at `address`.
    pub fn read_word(&self, address: u32) -> u32 {
        self.words.get(&address).copied().unwrap_or(ERASED_WORD)
    }

    /// Places `word` at `address` directly, bypassing erase rules.
    pub fn fill(&mut self, address: u32, word: u32) {
        let _ = self.words.insert(address, word & ERASED_WORD);
    }

    /// Pages erased so far, in order.
    pub fn erased_pages(&self) -> &[u32] {
        &self.erased_pages
    }

    /// Makes the dual-word write at `address` fail.
    pub fn fail_writes_at(&mut self, address: u32) {
        self.fail_write_at = Some(address);
    }

    /// Makes the erase of the page at `address` fail.
    pub fn fail_erase_at(&mut self, address: u32) {
        self.fail_erase_at = Some(address);
    }
}

impl ProgramMemory for SimFlash {
    type Error = SimFlashError;

    fn erase_page(&mut self, address: u32) -> Result<(), Self::Error> {
        if self.fail_erase_at == Some(address) {
            return Err(SimFlashError::Injected);
        }
        let end = address + self.page_size;
        self.words.retain(|&a, _| a < address || a >= end);
        self.erased_pages.push(address);
        Ok(())
    }

    fn write_double_word(
        &mut self,
        address: u32,
        first: u32,
        second: u32,
    ) -> Result<(), Self::Error> {
        if self.fail_write_at == Some(address) {
            return Err(SimFlashError::Injected);
        }
        if self.words.contains_key(&address) || self.words.contains_key(&(address + 2)) {
            return Err(SimFlashError::NotErased);
        }
        self.fill(address, first);
        self.fill(address + 2, second);
        Ok(())
    }
}

/// Error raised by [`SimEeprom`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimEepromError;

/// Byte-addressed EEPROM whose cells read as zero until written.
#[derive(Debug, Clone, Default)]
pub struct SimEeprom {
    cells: BTreeMap<u16, u8>,
    failing: bool,
    fail_write_to: Option<u16>,
}

impl SimEeprom {
    /// Creates a blank EEPROM.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads a cell without going through the [`Eeprom`] trait.
    pub fn cell(&self, cell: u16) -> u8 {
        self.cells.get(&cell).copied().unwrap_or(0)
    }

    /// Makes every following access fail.
    pub fn fail(&mut self) {
        self.failing = true;
    }

    /// Makes the next write to `cell` fail; later writes succeed again.
    pub fn fail_next_write_to(&mut self, cell: u16) {
        self.fail_write_to = Some(cell);
    }
}

impl Eeprom for SimEeprom {
    type Error = SimEepromError;

    fn read_byte(&mut self, cell: u16) -> Result<u8, Self::Error> {
        if self.failing {
            return Err(SimEepromError);
        }
        Ok(self.cell(cell))
    }

    fn write_byte(&mut self, cell: u16, value: u8) -> Result<(), Self::Error> {
        if self.failing {
            return Err(SimEepromError);
        }
        if self.fail_write_to == Some(cell) {
            self.fail_write_to = None;
            return Err(SimEepromError);
        }
        let _ = self.cells.insert(cell, value);
        Ok(())
    }
}
