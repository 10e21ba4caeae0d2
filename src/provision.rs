//! One-time serial number provisioning.
//!
//! The device serial number is a 16-bit value kept in two EEPROM byte cells. A value of
//! zero means "not provisioned"; the first `WRITE_SN` request stores the two bytes it
//! carries and every later request is refused. Zero itself can never be provisioned, and
//! a write that fails halfway is rolled back so the cells never hold half a number.

use crate::consts::{
    CMD_WRITE_SN_RESPONSE_ERR, CMD_WRITE_SN_RESPONSE_OK, SN_LSB_CELL, SN_MSB_CELL,
};
use crate::packet::Packet;

/// Byte-wide persistent storage.
pub trait Eeprom {
    /// Error reported by the storage driver.
    type Error;

    /// Reads the byte stored in `cell`.
    fn read_byte(&mut self, cell: u16) -> Result<u8, Self::Error>;

    /// Stores `value` in `cell`.
    fn write_byte(&mut self, cell: u16, value: u8) -> Result<(), Self::Error>;
}

/// Location of the serial number in EEPROM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct SerialNumberCells {
    /// Cell holding the most significant byte.
    pub msb: u16,
    /// Cell holding the least significant byte.
    pub lsb: u16,
}

impl Default for SerialNumberCells {
    fn default() -> Self {
        Self {
            msb: SN_MSB_CELL,
            lsb: SN_LSB_CELL,
        }
    }
}

/// Result of a `WRITE_SN` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum Provisioning {
    /// The serial number was unset and has been stored.
    Stored(u16),
    /// A serial number is already present; nothing was written.
    AlreadySet(u16),
    /// The request carried fewer than two bytes.
    ShortPacket,
    /// The requested serial number is zero, which reads back as unset.
    ZeroValue,
    /// The EEPROM could not be read or written.
    StorageFailure,
}

impl Provisioning {
    /// Response opcode sent back to the host.
    pub fn response(&self) -> u8 {
        match self {
            Provisioning::Stored(_) => CMD_WRITE_SN_RESPONSE_OK,
            _ => CMD_WRITE_SN_RESPONSE_ERR,
        }
    }
}

/// Reads and provisions the device serial number.
#[derive(Debug)]
pub struct SerialNumberStore<E> {
    eeprom: E,
    cells: SerialNumberCells,
}

impl<E> SerialNumberStore<E>
where
    E: Eeprom,
{
    /// Creates a store over `eeprom` using `cells`.
    pub fn new(eeprom: E, cells: SerialNumberCells) -> Self {
        Self { eeprom, cells }
    }

    /// Shared access to the EEPROM.
    pub fn eeprom(&self) -> &E {
        &self.eeprom
    }

    /// Exclusive access to the EEPROM.
    pub fn eeprom_mut(&mut self) -> &mut E {
        &mut self.eeprom
    }

    /// Consumes the store, returning the EEPROM.
    pub fn release(self) -> E {
        self.eeprom
    }

    /// Reads the stored serial number; zero when unset.
    pub fn serial_number(&mut self) -> Result<u16, E::Error> {
        let msb = self.eeprom.read_byte(self.cells.msb)?;
        let lsb = self.eeprom.read_byte(self.cells.lsb)?;
        Ok(u16::from_be_bytes([msb, lsb]))
    }

    /// Handles a `WRITE_SN` packet.
    ///
    /// Stores the first two payload bytes (most significant first) if no serial number
    /// is present yet; otherwise leaves the EEPROM untouched. If either cell cannot be
    /// written, both are cleared again before [`Provisioning::StorageFailure`] is returned.
    pub fn write_serial_number(&mut self, packet: &Packet) -> Provisioning {
        let &[msb, lsb, ..] = packet.data.as_slice() else {
            warn!("serial number packet too short: {} bytes", packet.data_size());
            return Provisioning::ShortPacket;
        };
        let sn = u16::from_be_bytes([msb, lsb]);
        if sn == 0 {
            warn!("refusing to provision serial number zero");
            return Provisioning::ZeroValue;
        }
        let current = match self.serial_number() {
            Ok(sn) => sn,
            Err(_) => {
                error!("failed to read the serial number cells");
                return Provisioning::StorageFailure;
            }
        };
        if current != 0 {
            warn!("serial number already set to {}", current);
            return Provisioning::AlreadySet(current);
        }
        if self.eeprom.write_byte(self.cells.msb, msb).is_err()
            || self.eeprom.write_byte(self.cells.lsb, lsb).is_err()
        {
            error!("failed to store the serial number");
            self.clear();
            return Provisioning::StorageFailure;
        }
        info!("serial number provisioned: {}", sn);
        Provisioning::Stored(sn)
    }

    fn clear(&mut self) {
        let msb = self.eeprom.write_byte(self.cells.msb, 0);
        let lsb = self.eeprom.write_byte(self.cells.lsb, 0);
        if msb.is_err() || lsb.is_err() {
            error!("failed to clear a partly written serial number");
        }
    }
}
