//! Polled serial transport.
//!
//! [`SerialTransport`] owns the UART and the receive [`RingBuffer`]. It is driven from a
//! single control loop:
//!
//! 1. [`read_pending()`](SerialTransport::read_pending) drains every byte the UART has
//!    received into the queue,
//! 2. [`decode()`](SerialTransport::decode) tries to take one frame out of the queue,
//! 3. [`send()`](SerialTransport::send) answers with a response frame.
//!
//! Transmission busy-waits on the UART for every byte (`nb::block!`), so bytes always
//! leave in order and none are dropped.
//!
//! ## Line errors
//!
//! A byte flagged with a line error (overrun, framing, parity or noise) is discarded.
//! Reading the error from the HAL is what clears the flag on the peripheral, so draining
//! simply continues with the next byte.

use embedded_hal_nb::serial::{Error as _, ErrorKind, Read, Write};
use nb::block;

use crate::consts::RX_QUEUE_SIZE;
use crate::error::Error;
use crate::packet::{self, Packet};
use crate::ring::RingBuffer;

/// UART plus receive queue.
///
/// `N` is the receive queue capacity; it should hold at least one maximum-size frame.
#[derive(Debug)]
pub struct SerialTransport<S, const N: usize = RX_QUEUE_SIZE> {
    serial: S,
    rx: RingBuffer<N>,
    /// Bytes lost to receiver overruns since creation.
    pub overruns: u16,
    /// Bytes lost to framing, parity or noise errors since creation.
    pub line_errors: u16,
}

impl<S, const N: usize> SerialTransport<S, N>
where
    S: Read<u8> + Write<u8>,
{
    /// Wraps an initialised UART.
    pub fn new(serial: S) -> Self {
        Self {
            serial,
            rx: RingBuffer::new(),
            overruns: 0,
            line_errors: 0,
        }
    }

    /// The receive queue.
    pub fn rx(&self) -> &RingBuffer<N> {
        &self.rx
    }

    /// The receive queue, for producers other than [`read_pending`](Self::read_pending).
    pub fn rx_mut(&mut self) -> &mut RingBuffer<N> {
        &mut self.rx
    }

    /// Shared access to the UART.
    pub fn serial(&self) -> &S {
        &self.serial
    }

    /// Exclusive access to the UART.
    pub fn serial_mut(&mut self) -> &mut S {
        &mut self.serial
    }

    /// Consumes the transport, returning the UART.
    pub fn release(self) -> S {
        self.serial
    }

    /// Moves every byte the UART holds into the receive queue.
    ///
    /// # Arguments
    /// - `now`: current time in milliseconds, recorded as the last activity time.
    ///
    /// # Returns
    /// The number of bytes accepted into the queue.
    pub fn read_pending(&mut self, now: u32) -> usize {
        let mut accepted = 0;
        loop {
            match self.serial.read() {
                Ok(byte) => {
                    if self.rx.push(byte, now) {
                        accepted += 1;
                    }
                }
                Err(nb::Error::WouldBlock) => break,
                Err(nb::Error::Other(e)) => match e.kind() {
                    ErrorKind::Overrun => {
                        self.overruns = self.overruns.wrapping_add(1);
                        warn!("rx overrun");
                    }
                    _ => {
                        self.line_errors = self.line_errors.wrapping_add(1);
                        debug!("rx line error");
                    }
                },
            }
        }
        accepted
    }

    /// Tries to decode one frame from the receive queue.
    ///
    /// See [`packet::decode`].
    pub fn decode(&mut self) -> Packet {
        packet::decode(&mut self.rx)
    }

    /// Drops everything in the receive queue.
    pub fn reset(&mut self) {
        self.rx.reset();
    }

    /// Writes raw bytes, blocking until each one has been accepted by the UART.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), Error<S::Error>> {
        for &byte in bytes {
            block!(self.serial.write(byte)).map_err(Error::Serial)?;
        }
        block!(self.serial.flush()).map_err(Error::Serial)
    }

    /// Sends `command` carrying `data` as one frame.
    pub fn send(&mut self, command: u8, data: &[u8]) -> Result<(), Error<S::Error>> {
        let frame = packet::encode(command, data)
            .ok_or(Error::PayloadTooLarge { len: data.len() })?;
        trace!("tx command {:#x}, {} bytes", command, frame.len());
        self.write_bytes(&frame)
    }

    /// Sends `command` carrying `string` plus a NUL terminator as one frame.
    pub fn send_string(&mut self, command: u8, string: &str) -> Result<(), Error<S::Error>> {
        let frame = packet::encode_str(command, string).ok_or(Error::PayloadTooLarge {
            len: string.len() + 1,
        })?;
        self.write_bytes(&frame)
    }
}
