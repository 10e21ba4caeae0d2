//! Session configuration.

use crate::flash::FlashLayout;
use crate::provision::SerialNumberCells;

/// Platform identifier reported by default.
pub const DEFAULT_PLATFORM: &str = "GATEWAY";

/// Bootloader version reported by default.
pub const DEFAULT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Everything a [`Bootloader`](crate::session::Bootloader) needs to know about its board.
///
/// Start from [`Config::default()`] and adjust with the `with_*` methods:
///
/// ```
/// use gwboot::config::Config;
/// use gwboot::flash::FlashLayout;
///
/// let layout = FlashLayout::new(0x0800, 0x1800, 0x0A_AFFE, 0x0800).unwrap();
/// let config = Config::default()
///     .with_layout(layout)
///     .with_platform("GW-B")
///     .with_rx_idle_timeout_ms(Some(500));
/// assert_eq!(config.platform, "GW-B");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
#[non_exhaustive]
pub struct Config {
    /// Program-memory partition.
    pub layout: FlashLayout,
    /// String sent in response to `PLATFORM_REQUEST`.
    pub platform: &'static str,
    /// String sent in response to `VERSION_REQUEST`.
    pub version: &'static str,
    /// EEPROM cells that hold the serial number.
    pub serial_number_cells: SerialNumberCells,
    /// Drop a partially received frame once the line has been quiet this long.
    ///
    /// `None` keeps partial frames forever; a stray byte then stalls the session until
    /// the host resynchronises by reset.
    pub rx_idle_timeout_ms: Option<u32>,
    /// Answer corrupt frames with `BAD_PACKET_RESPONSE` instead of dropping them silently.
    pub reply_to_bad_packets: bool,
    /// Pause between two polls of the blocking loop.
    pub poll_interval_us: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            layout: FlashLayout::default(),
            platform: DEFAULT_PLATFORM,
            version: DEFAULT_VERSION,
            serial_number_cells: SerialNumberCells::default(),
            rx_idle_timeout_ms: None,
            reply_to_bad_packets: false,
            poll_interval_us: 100,
        }
    }
}

impl Config {
    /// Sets the program-memory partition.
    pub fn with_layout(mut self, layout: FlashLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Sets the platform string.
    pub fn with_platform(mut self, platform: &'static str) -> Self {
        self.platform = platform;
        self
    }

    /// Sets the version string.
    pub fn with_version(mut self, version: &'static str) -> Self {
        self.version = version;
        self
    }

    /// Sets the serial number cells.
    pub fn with_serial_number_cells(mut self, cells: SerialNumberCells) -> Self {
        self.serial_number_cells = cells;
        self
    }

    /// Sets the idle timeout for partial frames.
    pub fn with_rx_idle_timeout_ms(mut self, timeout: Option<u32>) -> Self {
        self.rx_idle_timeout_ms = timeout;
        self
    }

    /// Enables or disables `BAD_PACKET_RESPONSE`.
    pub fn with_reply_to_bad_packets(mut self, reply: bool) -> Self {
        self.reply_to_bad_packets = reply;
        self
    }

    /// Sets the poll interval of the blocking loop.
    pub fn with_poll_interval_us(mut self, interval: u32) -> Self {
        self.poll_interval_us = interval;
        self
    }
}
