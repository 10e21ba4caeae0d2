//! Error types.
//!
//! Protocol-level outcomes (incomplete or corrupt frames, protected-address skips, failed
//! flash operations, an already provisioned serial number) are reported to the host as
//! response packets and never show up here. These errors only cover the cases where the
//! device cannot talk to the host or to its own hardware at all.

use embedded_hal::digital;
use thiserror::Error;

/// Failure of a low-level program-memory operation.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum FlashError {
    /// A page erase did not complete.
    #[error("page erase failed at {address:#08x}")]
    Erase {
        /// First address of the page.
        address: u32,
    },
    /// A dual-word program operation did not complete.
    #[error("dual-word write failed at {address:#08x}")]
    Write {
        /// Address of the first word.
        address: u32,
    },
    /// A write packet did not carry the 3-byte target address.
    #[error("write packet of {len} bytes has no target address")]
    ShortPacket {
        /// Payload length received.
        len: usize,
    },
}

/// A program-memory partition that cannot be used safely.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum LayoutError {
    /// The bootloader region is empty or ends after the application starts.
    #[error("bootloader region {start:#08x}..{end:#08x} is empty or overlaps the application")]
    BootloaderRegion {
        /// First bootloader address.
        start: u32,
        /// First address after the bootloader.
        end: u32,
    },
    /// The bootloader shares the first page with the reset vector.
    #[error("bootloader starts at {start:#08x}, inside the reset vector page")]
    ResetVectorPage {
        /// First bootloader address.
        start: u32,
    },
    /// A region boundary is not aligned to the erase page size.
    #[error("{address:#08x} is not aligned to the {page_size:#x} erase page")]
    Unaligned {
        /// The offending boundary.
        address: u32,
        /// The erase page size.
        page_size: u32,
    },
    /// The application region is empty.
    #[error("application region ends at {end:#08x}, before it starts")]
    ApplicationRegion {
        /// Last application address.
        end: u32,
    },
}

/// Errors surfaced to the firmware that drives the bootloader.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error<SE> {
    /// The serial link rejected a byte while transmitting.
    #[error("serial link error: {0:?}")]
    Serial(SE),
    /// A response payload does not fit into one frame.
    #[error("payload of {len} bytes does not fit in a frame")]
    PayloadTooLarge {
        /// Requested payload length.
        len: usize,
    },
    /// The line-routing selectors could not be driven.
    #[error("failed to drive the line-routing selectors: {0:?}")]
    Routing(digital::ErrorKind),
    /// The configured flash layout is unusable.
    #[error("invalid flash layout: {0}")]
    Layout(LayoutError),
}

impl<SE> From<LayoutError> for Error<SE> {
    fn from(e: LayoutError) -> Self {
        Self::Layout(e)
    }
}
