//! # gwboot
//!
//! A portable, no_std Rust core for the serial firmware-update path of an automotive gateway
//! microcontroller. A host tool talks to the device over a point-to-point UART to erase and
//! reprogram its program memory, while the bootloader itself and the reset vector are never
//! touched.
//!
//! The crate implements:
//! - a fixed-capacity circular receive queue fed from an `embedded-hal-nb` serial port
//! - a framed packet codec with an XOR checksum
//! - a flash programming engine that refuses to overwrite protected regions
//! - one-time serial number provisioning in EEPROM
//! - hand-over of the host line to an auxiliary radio module (passthrough)
//!
//! ## Crate features
//! | Feature            | Description |
//! |--------------------|-------------|
//! | `std`              | Builds against `std` and enables the host-side [`sim`] peripherals |
//! | `delay-loop`       | Adds [`Bootloader::run`], a blocking loop paced by `embedded_hal::delay::DelayNs` |
//! | `rx-isr` (default) | Adds the [`shared`] receive queue for interrupt-driven UARTs (`critical-section`) |
//! | `defmt-0-3`        | Uses `defmt` logging |
//! | `log`              | Uses `log` logging |
//!
//! ## Wire format
//!
//! | Byte        | Content                                    |
//! |-------------|--------------------------------------------|
//! | 0           | command                                    |
//! | 1           | length: payload bytes + 2                  |
//! | 2..length   | payload (at least one byte)                |
//! | length      | XOR of every previous byte of the frame    |
//!
//! ## Usage
//!
//! ```rust
//! use gwboot::{Bootloader, Config, Step};
//! use gwboot::routing::NoRouting;
//! use gwboot::sim::{SimEeprom, SimFlash, SimSerial};
//!
//! let config = Config::default();
//! let mut serial = SimSerial::new();
//! serial.feed(&gwboot::packet::encode(0x02, &[]).unwrap());
//!
//! let mut bootloader: Bootloader<_, _, _, _> = Bootloader::new(
//!     serial,
//!     SimFlash::new(config.layout.page_size()),
//!     SimEeprom::new(),
//!     NoRouting,
//!     config,
//! );
//! assert_eq!(bootloader.poll(0), Ok(Step::Handled(0x02)));
//! ```
//!
//! On a target, call [`Bootloader::poll`] from the main loop with a millisecond clock, or
//! hand the loop over to [`Bootloader::run`] (feature `delay-loop`).
//!
//! ## Integration Notes
//!
//! - Only bytes read in the same execution context as `poll` may reach the transport's
//!   queue; interrupt-driven ports go through [`shared`].
//! - Jumping to the application after [`SessionExit::StartApplication`] is left to the
//!   board support code.
//!
//! --
//! Designed for `#![no_std]` use in resource-constrained embedded environments.

#![deny(
    bad_style,
    improper_ctypes,
    non_shorthand_field_patterns,
    no_mangle_generic_items,
    overflowing_literals,
    path_statements,
    patterns_in_fns_without_body,
    unconditional_recursion,
    while_true,
    missing_debug_implementations,
    trivial_casts,
    unused_extern_crates,
    unused_import_braces,
    dead_code,
    unused,
    missing_docs,
    trivial_numeric_casts,
    unused_qualifications,
    unused_results
)]
#![cfg_attr(not(any(test, feature = "std")), no_std)]

#[macro_use]
mod fmt;

#[cfg(feature = "rx-isr")]
pub use critical_section;

pub use heapless;

pub(crate) mod checksum;
pub mod config;
pub mod console;
pub mod consts;
pub mod error;
pub mod flash;
pub mod packet;
pub mod provision;
pub mod ring;
pub mod routing;
pub mod session;
#[cfg(feature = "rx-isr")]
pub mod shared;
#[cfg(any(test, feature = "std"))]
pub mod sim;
pub mod transport;

pub use config::Config;
pub use error::{Error, FlashError, LayoutError};
pub use flash::{FlashEngine, FlashLayout, FlashRegion, ProgramMemory, WriteReport};
pub use packet::{Packet, PacketStatus};
pub use provision::{Eeprom, Provisioning, SerialNumberStore};
pub use ring::RingBuffer;
pub use routing::{LinkRouting, SelectorPins};
pub use session::{Bootloader, SessionExit, Step};
pub use transport::SerialTransport;
