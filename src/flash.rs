//! Program-memory partition and the flash programming engine.
//!
//! Program memory is addressed in 16-bit address units. Every instruction word is 24 bits
//! wide and spans two address units; the hardware programs two words (a *dual word*) at
//! a time and erases in pages of [`FLASH_PAGE_SIZE`] address units.
//!
//! The partition is described by a [`FlashLayout`]:
//!
//! | Region      | Range                                    | Packet writes |
//! |-------------|------------------------------------------|---------------|
//! | Reset vector| `0x000000..0x000004`                     | never         |
//! | Vectors     | `0x000004..bootloader_start`             | yes           |
//! | Bootloader  | `bootloader_start..application_start`    | never         |
//! | Application | `application_start..=application_end`    | yes           |
//!
//! [`FlashEngine`] applies `WRITE_DATA` packets to a [`ProgramMemory`] implementation,
//! checking [`FlashLayout::is_writable`] once per stride so that neither the bootloader
//! nor the reset vector can be overwritten by a flashing session.

use crate::consts::{
    APPLICATION_END, APPLICATION_START, BOOTLOADER_START, FLASH_PAGE_SIZE, GOTO_OPCODE,
    RESET_VECTOR_END, STRIDE_LEN, WORD_ADDRESS_UNITS, WRITE_ADDRESS_LEN,
};
use crate::error::{FlashError, LayoutError};
use crate::packet::Packet;

/// Low-level access to the device's program memory.
///
/// Implemented by the HAL glue of the target (or by [`crate::sim::SimFlash`] on a host).
pub trait ProgramMemory {
    /// Error reported by the underlying NVM controller.
    type Error;

    /// Erases the page starting at `address`.
    fn erase_page(&mut self, address: u32) -> Result<(), Self::Error>;

    /// Programs the words at `address` and `address + 2`.
    ///
    /// Each word carries 24 data bits in its low bytes; the top (phantom) byte is zero.
    fn write_double_word(&mut self, address: u32, first: u32, second: u32)
    -> Result<(), Self::Error>;
}

/// A half-open range of program-memory addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct FlashRegion {
    start: u32,
    end: u32,
}

impl FlashRegion {
    /// Creates the region `start..end`.
    pub const fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    /// First address of the region.
    pub const fn start(&self) -> u32 {
        self.start
    }

    /// First address after the region.
    pub const fn end(&self) -> u32 {
        self.end
    }

    /// Whether `address` lies inside the region.
    pub const fn contains(&self, address: u32) -> bool {
        address >= self.start && address < self.end
    }

    /// Whether any address of `start..end` lies inside the region.
    pub const fn overlaps(&self, start: u32, end: u32) -> bool {
        start < self.end && end > self.start
    }
}

/// Partition of program memory between the bootloader and the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct FlashLayout {
    bootloader: FlashRegion,
    application_end: u32,
    page_size: u32,
}

impl Default for FlashLayout {
    fn default() -> Self {
        Self {
            bootloader: FlashRegion::new(BOOTLOADER_START, APPLICATION_START),
            application_end: APPLICATION_END,
            page_size: FLASH_PAGE_SIZE,
        }
    }
}

impl FlashLayout {
    /// Creates a layout, rejecting partitions that could expose the bootloader.
    ///
    /// # Arguments
    /// - `bootloader_start`: first bootloader address, page aligned and past the first page.
    /// - `application_start`: first application address, page aligned.
    /// - `application_end`: last application address (inclusive).
    /// - `page_size`: erase page size in address units.
    pub const fn new(
        bootloader_start: u32,
        application_start: u32,
        application_end: u32,
        page_size: u32,
    ) -> Result<Self, LayoutError> {
        if bootloader_start >= application_start {
            return Err(LayoutError::BootloaderRegion {
                start: bootloader_start,
                end: application_start,
            });
        }
        if bootloader_start < page_size {
            return Err(LayoutError::ResetVectorPage {
                start: bootloader_start,
            });
        }
        if bootloader_start % page_size != 0 {
            return Err(LayoutError::Unaligned {
                address: bootloader_start,
                page_size,
            });
        }
        if application_start % page_size != 0 {
            return Err(LayoutError::Unaligned {
                address: application_start,
                page_size,
            });
        }
        if application_end < application_start {
            return Err(LayoutError::ApplicationRegion {
                end: application_end,
            });
        }
        Ok(Self {
            bootloader: FlashRegion::new(bootloader_start, application_start),
            application_end,
            page_size,
        })
    }

    /// The region the bootloader itself lives in.
    pub const fn bootloader(&self) -> FlashRegion {
        self.bootloader
    }

    /// The region the application may occupy.
    pub const fn application(&self) -> FlashRegion {
        FlashRegion::new(self.bootloader.end(), self.application_end + WORD_ADDRESS_UNITS)
    }

    /// Erase page size in address units.
    pub const fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Whether a flashing session may program the word at `address`.
    ///
    /// False for the reset vector, anything inside the bootloader and anything past
    /// `application_end`.
    pub const fn is_writable(&self, address: u32) -> bool {
        address >= RESET_VECTOR_END
            && address <= self.application_end
            && !self.bootloader.contains(address)
    }

    /// Whether the page starting at `page` may be erased by a flashing session.
    pub const fn is_erasable_page(&self, page: u32) -> bool {
        !self.bootloader.overlaps(page, page + self.page_size)
    }

    /// The two words placed in the reset vector: `GOTO bootloader_start`.
    pub const fn reset_instruction(&self) -> (u32, u32) {
        (GOTO_OPCODE + self.bootloader.start(), 0x00_0000)
    }

    /// Start addresses of every page erased after the reset vector page.
    pub fn erasable_pages(&self) -> impl Iterator<Item = u32> + use<> {
        let layout = *self;
        (layout.page_size..=layout.application_end)
            .step_by(layout.page_size as usize)
            .filter(move |&page| layout.is_erasable_page(page))
    }
}

/// Summary of a successfully applied write packet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct WriteReport {
    /// Address decoded from the packet.
    pub address: u32,
    /// Whether the packet triggered an erase of the whole application space.
    pub erased: bool,
    /// Dual words programmed.
    pub written: u16,
    /// Words skipped because they fell into a protected range.
    pub skipped: u16,
}

/// Erases and programs the application space on behalf of the host tool.
#[derive(Debug)]
pub struct FlashEngine<F> {
    memory: F,
    layout: FlashLayout,
}

impl<F> FlashEngine<F>
where
    F: ProgramMemory,
{
    /// Creates an engine over `memory` partitioned by `layout`.
    pub fn new(memory: F, layout: FlashLayout) -> Self {
        Self { memory, layout }
    }

    /// The partition this engine enforces.
    pub fn layout(&self) -> &FlashLayout {
        &self.layout
    }

    /// Shared access to the program memory.
    pub fn memory(&self) -> &F {
        &self.memory
    }

    /// Exclusive access to the program memory.
    pub fn memory_mut(&mut self) -> &mut F {
        &mut self.memory
    }

    /// Consumes the engine, returning the program memory.
    pub fn release(self) -> F {
        self.memory
    }

    /// Clears the whole application space.
    ///
    /// The first page is erased and the reset vector immediately rewritten to jump into
    /// the bootloader; every following page up to the end of the application is then
    /// erased, skipping pages that overlap the bootloader.
    pub fn erase(&mut self) -> Result<(), FlashError> {
        self.erase_page(0)?;
        let (goto, upper) = self.layout.reset_instruction();
        if self.memory.write_double_word(0, goto, upper).is_err() {
            error!("failed to restore the reset vector");
            return Err(FlashError::Write { address: 0 });
        }
        let mut erased: u32 = 1;
        for page in self.layout.erasable_pages() {
            self.erase_page(page)?;
            erased += 1;
        }
        info!("erased {} pages", erased);
        Ok(())
    }

    /// Applies one `WRITE_DATA` packet.
    ///
    /// The first three payload bytes hold the big-endian target address; an address of
    /// zero marks the start of a flashing session and erases the application space first.
    /// The rest of the payload is written six bytes (two words) at a time. Strides that
    /// touch a protected address are skipped one word at a time and counted in the
    /// returned [`WriteReport`].
    ///
    /// Processing stops at the first failed erase or write.
    pub fn write(&mut self, packet: &Packet) -> Result<WriteReport, FlashError> {
        let data = &packet.data[..];
        if data.len() < WRITE_ADDRESS_LEN {
            warn!("write packet too short: {} bytes", data.len());
            return Err(FlashError::ShortPacket { len: data.len() });
        }
        let mut address = u32::from_be_bytes([0, data[0], data[1], data[2]]);
        let mut report = WriteReport {
            address,
            ..WriteReport::default()
        };

        if address == 0 {
            self.erase()?;
            report.erased = true;
        }

        let mut index = WRITE_ADDRESS_LEN;
        while index < data.len() {
            if !self.stride_writable(address) {
                address += WORD_ADDRESS_UNITS;
                index += STRIDE_LEN / 2;
                report.skipped += 1;
                continue;
            }
            let first = word_at(data, index);
            let second = word_at(data, index + STRIDE_LEN / 2);
            if self.memory.write_double_word(address, first, second).is_err() {
                error!("dual-word write failed at {:#x}", address);
                return Err(FlashError::Write { address });
            }
            address += 2 * WORD_ADDRESS_UNITS;
            index += STRIDE_LEN;
            report.written += 1;
        }

        if report.skipped > 0 {
            warn!(
                "skipped {} protected words from {:#x}",
                report.skipped, report.address
            );
        }
        Ok(report)
    }

    fn stride_writable(&self, address: u32) -> bool {
        self.layout.is_writable(address) && self.layout.is_writable(address + WORD_ADDRESS_UNITS)
    }

    fn erase_page(&mut self, address: u32) -> Result<(), FlashError> {
        self.memory.erase_page(address).map_err(|_| {
            error!("page erase failed at {:#x}", address);
            FlashError::Erase { address }
        })
    }
}

/// Packs three payload bytes into one word with a zero phantom byte.
///
/// Bytes past the end of the payload read as `0xFF`, the erased state.
fn word_at(data: &[u8], index: usize) -> u32 {
    let byte = |i: usize| data.get(index + i).copied().unwrap_or(0xFF);
    u32::from_be_bytes([0x00, byte(0), byte(1), byte(2)])
}
