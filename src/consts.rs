//! Constants used across the bootloader protocol implementation.
//!
//! This module defines the protocol opcodes, frame sizing, receive queue sizing and
//! the default program-memory partition of the gateway MCU.
//!
//! ## Key Concepts
//!
//! - **Opcodes**: every request has a matching response opcode sent back by the device.
//! - **Frames**: `[command, length, payload.., checksum]` where `length` counts the command,
//!   the length byte and the payload, but not the trailing checksum.
//! - **Program memory**: addressed in 16-bit address units; every instruction word is 24 bits
//!   wide and occupies two address units.
//!
//! These values should be used wherever framing or flash logic is implemented to ensure
//! consistent message boundaries and protected ranges.

/// Host asks for the platform identifier string.
pub const CMD_PLATFORM_REQUEST: u8 = 0x00;
/// Platform identifier string, NUL terminated.
pub const CMD_PLATFORM_RESPONSE: u8 = 0x01;
/// Host asks for the bootloader version string.
pub const CMD_VERSION_REQUEST: u8 = 0x02;
/// Bootloader version string, NUL terminated.
pub const CMD_VERSION_RESPONSE: u8 = 0x03;
/// 24-bit address followed by program data.
pub const CMD_WRITE_DATA: u8 = 0x04;
/// Every non-protected stride of a write packet was programmed.
pub const CMD_WRITE_DATA_RESPONSE_OK: u8 = 0x05;
/// A page erase or dual-word write failed.
pub const CMD_WRITE_DATA_RESPONSE_ERR: u8 = 0x06;
/// Host asks the bootloader to hand over to the application.
pub const CMD_START_APP: u8 = 0x07;
/// Acknowledges [`CMD_START_APP`].
pub const CMD_START_APP_RESPONSE: u8 = 0x08;
/// Host asks for the serial lines to be routed to the auxiliary radio module.
pub const CMD_MODULE_MODE: u8 = 0x09;
/// Acknowledges [`CMD_MODULE_MODE`], sent right before the lines are re-routed.
pub const CMD_MODULE_MODE_RESPONSE: u8 = 0x0A;
/// Two serial number bytes, most significant first.
pub const CMD_WRITE_SN: u8 = 0x0B;
/// The serial number was stored.
pub const CMD_WRITE_SN_RESPONSE_OK: u8 = 0x0C;
/// The serial number was already provisioned (or could not be stored).
pub const CMD_WRITE_SN_RESPONSE_ERR: u8 = 0x0D;
/// Optional answer to a frame that failed checksum validation.
pub const CMD_BAD_PACKET_RESPONSE: u8 = 0xFF;

/// Number of control bytes counted by the length field (command + length).
pub const CONTROL_PACKET_SIZE: u8 = 2;

/// Number of trailing checksum bytes, not counted by the length field.
pub const CHECKSUM_SIZE: usize = 1;

/// Largest payload a single frame can carry (the length field is one byte wide).
pub const MAX_PAYLOAD_LEN: usize = u8::MAX as usize - CONTROL_PACKET_SIZE as usize;

/// Largest on-wire frame, checksum included.
pub const MAX_FRAME_LEN: usize = u8::MAX as usize + CHECKSUM_SIZE;

/// Default receive queue capacity; holds exactly one maximum-size frame.
pub const RX_QUEUE_SIZE: usize = MAX_FRAME_LEN;

/// Size in bytes of the big-endian address that prefixes every write packet.
pub const WRITE_ADDRESS_LEN: usize = 3;

/// Payload bytes consumed by one dual-word write (two 24-bit words).
pub const STRIDE_LEN: usize = 6;

/// Address units covered by one 24-bit instruction word.
pub const WORD_ADDRESS_UNITS: u32 = 2;

/// Program-memory row size in instructions.
pub const FLASH_ROW: u32 = 128;

/// Erase page size in address units (1024 instructions).
pub const FLASH_PAGE_SIZE: u32 = FLASH_ROW * 16;

/// End of the reset vector window; nothing below this address is written by a packet.
pub const RESET_VECTOR_END: u32 = 0x04;

/// Opcode of the `GOTO` instruction placed in the reset vector.
pub const GOTO_OPCODE: u32 = 0x04_0000;

/// Default first address of the bootloader.
pub const BOOTLOADER_START: u32 = 0x0800;

/// Default first address of the application (end of the bootloader, exclusive).
pub const APPLICATION_START: u32 = 0x1800;

/// Default last address of the application (inclusive).
pub const APPLICATION_END: u32 = 0x0A_AFFE;

/// Default EEPROM cell holding the serial number's most significant byte.
pub const SN_MSB_CELL: u16 = 0x00;

/// Default EEPROM cell holding the serial number's least significant byte.
pub const SN_LSB_CELL: u16 = 0x01;

/// Line terminator recognised by the interactive console.
pub const CONSOLE_LINE_END: u8 = b'\r';

/// Token delimiter recognised by the interactive console.
pub const CONSOLE_DELIMITER: u8 = b' ';

/// Maximum number of whitespace separated tokens the console hands to a handler.
pub const CONSOLE_MAX_TOKENS: usize = 8;
