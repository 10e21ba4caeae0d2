//! Line console on a serial link.
//!
//! The console shares the receive queue machinery with the bootloader but speaks plain
//! text: every received byte is echoed, a carriage return ends a line, and the line is
//! split on spaces and handed to a [`CommandHandler`]. The handler's verdict is answered
//! with `OK` or a hint to ask for `HELP`.
//!
//! ```
//! use gwboot::console::Console;
//! use gwboot::sim::SimSerial;
//!
//! let mut serial = SimSerial::new();
//! serial.feed(b"PING\r");
//! let mut console: Console<_> = Console::new(serial);
//! let seen = console
//!     .process(0, |tokens: &[&str]| tokens == ["PING"])
//!     .unwrap();
//! assert_eq!(seen, Some(true));
//! assert_eq!(console.transport().serial().sent(), b"PING\r\nOK\r\n");
//! ```

use embedded_hal_nb::serial::{Read, Write};
use heapless::Vec;

use crate::consts::{CONSOLE_DELIMITER, CONSOLE_LINE_END, CONSOLE_MAX_TOKENS, RX_QUEUE_SIZE};
use crate::error::Error;
use crate::transport::SerialTransport;

const REPLY_OK: &[u8] = b"OK\r\n";
const REPLY_UNKNOWN: &[u8] = b"Command Unknown or invalid. Try HELP\r\n";

/// Executes console commands.
pub trait CommandHandler {
    /// Runs the command made of `tokens`; returns whether it was recognised.
    ///
    /// `tokens` is empty for a blank line.
    fn handle(&mut self, tokens: &[&str]) -> bool;
}

impl<F> CommandHandler for F
where
    F: FnMut(&[&str]) -> bool,
{
    fn handle(&mut self, tokens: &[&str]) -> bool {
        self(tokens)
    }
}

/// Text console over a serial link.
#[derive(Debug)]
pub struct Console<S, const N: usize = RX_QUEUE_SIZE> {
    transport: SerialTransport<S, N>,
}

impl<S, const N: usize> Console<S, N>
where
    S: Read<u8> + Write<u8>,
{
    /// Wraps an initialised UART.
    pub fn new(serial: S) -> Self {
        Self {
            transport: SerialTransport::new(serial),
        }
    }

    /// The underlying transport.
    pub fn transport(&self) -> &SerialTransport<S, N> {
        &self.transport
    }

    /// The underlying transport, mutably.
    pub fn transport_mut(&mut self) -> &mut SerialTransport<S, N> {
        &mut self.transport
    }

    /// Consumes the console, returning the UART.
    pub fn release(self) -> S {
        self.transport.release()
    }

    /// Echoes new input and runs at most one complete line.
    ///
    /// # Returns
    /// `None` when no complete line was buffered, otherwise what the handler returned.
    pub fn process<H>(
        &mut self,
        now: u32,
        mut handler: H,
    ) -> Result<Option<bool>, Error<S::Error>>
    where
        H: CommandHandler,
    {
        let echoed = self.transport.rx().len();
        let _ = self.transport.read_pending(now);
        for offset in echoed..self.transport.rx().len() {
            let byte = self.transport.rx().peek_at(offset);
            self.transport.write_bytes(&[byte])?;
        }

        let line_len = self.transport.rx().find(CONSOLE_LINE_END);
        if line_len == 0 {
            if self.transport.rx().is_full() {
                warn!("console line longer than {} bytes, dropped", N);
                self.transport.reset();
                self.transport.write_bytes(REPLY_UNKNOWN)?;
                return Ok(Some(false));
            }
            return Ok(None);
        }
        self.transport.write_bytes(b"\n")?;

        let mut line: Vec<u8, N> = Vec::new();
        for _ in 0..line_len {
            let byte = self.transport.rx_mut().pop_next();
            if byte != CONSOLE_LINE_END {
                // Cannot overflow: the line came out of an N-byte queue.
                let _ = line.push(byte);
            }
        }

        let recognised = match core::str::from_utf8(&line) {
            Ok(text) => {
                let tokens: Vec<&str, CONSOLE_MAX_TOKENS> = text
                    .split(CONSOLE_DELIMITER as char)
                    .filter(|token| !token.is_empty())
                    .take(CONSOLE_MAX_TOKENS)
                    .collect();
                debug!("console command with {} tokens", tokens.len());
                handler.handle(&tokens)
            }
            Err(_) => {
                debug!("console line is not valid UTF-8");
                false
            }
        };

        let reply = if recognised { REPLY_OK } else { REPLY_UNKNOWN };
        self.transport.write_bytes(reply)?;
        Ok(Some(recognised))
    }
}
