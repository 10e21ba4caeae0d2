//! The bootloader session: command dispatch over the serial link.
//!
//! [`Bootloader`] ties the pieces together. Every call to [`Bootloader::poll`] drains the
//! UART, tries to decode one frame and, if one arrived intact, executes it and answers:
//!
//! | Request            | Effect                                  | Response                       |
//! |--------------------|-----------------------------------------|--------------------------------|
//! | `PLATFORM_REQUEST` | none                                    | `PLATFORM_RESPONSE` + string   |
//! | `VERSION_REQUEST`  | none                                    | `VERSION_RESPONSE` + string    |
//! | `WRITE_DATA`       | [`FlashEngine::write`]                  | `WRITE_DATA_RESPONSE_OK`/`ERR` |
//! | `START_APP`        | session ends                            | `START_APP_RESPONSE`           |
//! | `MODULE_MODE`      | line handed to the module, session ends | `MODULE_MODE_RESPONSE`         |
//! | `WRITE_SN`         | [`SerialNumberStore::write_serial_number`] | `WRITE_SN_RESPONSE_OK`/`ERR` |
//!
//! Unknown opcodes are ignored. Corrupt frames are dropped, or answered with
//! `BAD_PACKET_RESPONSE` when [`Config::reply_to_bad_packets`] is set.
//!
//! Once the session has ended every further `poll` reports the same [`SessionExit`]
//! without reading the line, so nothing reaches the packet codec after passthrough.
//!
//! ## Blocking loop
//!
//! With the `delay-loop` feature, [`Bootloader::run`] polls until the session ends,
//! pausing [`Config::poll_interval_us`] between polls.

#[cfg(feature = "delay-loop")]
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::Error as _;
use embedded_hal_nb::serial::{Read, Write};

use crate::config::Config;
use crate::consts::{
    CMD_BAD_PACKET_RESPONSE, CMD_MODULE_MODE, CMD_MODULE_MODE_RESPONSE, CMD_PLATFORM_REQUEST,
    CMD_PLATFORM_RESPONSE, CMD_START_APP, CMD_START_APP_RESPONSE, CMD_VERSION_REQUEST,
    CMD_VERSION_RESPONSE, CMD_WRITE_DATA, CMD_WRITE_DATA_RESPONSE_ERR,
    CMD_WRITE_DATA_RESPONSE_OK, CMD_WRITE_SN, RX_QUEUE_SIZE,
};
use crate::error::Error;
use crate::flash::{FlashEngine, ProgramMemory};
use crate::packet::{Packet, PacketStatus};
use crate::provision::{Eeprom, SerialNumberStore};
use crate::routing::LinkRouting;
use crate::transport::SerialTransport;

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum SessionExit {
    /// The host asked to boot the application.
    StartApplication,
    /// The host line now belongs to the module.
    Passthrough,
}

/// Outcome of one [`Bootloader::poll`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum Step {
    /// No complete frame was available.
    Idle,
    /// A request with this opcode was executed and answered.
    Handled(u8),
    /// A frame with an unknown opcode was received and ignored.
    Unknown(u8),
    /// A corrupt frame was dropped.
    Rejected,
    /// The session is over.
    Exit(SessionExit),
}

/// A firmware-update session.
#[derive(Debug)]
pub struct Bootloader<S, F, E, R, const N: usize = RX_QUEUE_SIZE> {
    transport: SerialTransport<S, N>,
    flash: FlashEngine<F>,
    serial_number: SerialNumberStore<E>,
    routing: R,
    config: Config,
    exit: Option<SessionExit>,
}

impl<S, F, E, R, const N: usize> Bootloader<S, F, E, R, N>
where
    S: Read<u8> + Write<u8>,
    F: ProgramMemory,
    E: Eeprom,
    R: LinkRouting,
{
    /// Creates a session over initialised peripherals.
    ///
    /// # Arguments
    /// - `serial`: the host UART.
    /// - `memory`: program memory of this device.
    /// - `eeprom`: storage holding the serial number.
    /// - `routing`: the host line selectors.
    /// - `config`: board description.
    pub fn new(serial: S, memory: F, eeprom: E, routing: R, config: Config) -> Self {
        Self {
            transport: SerialTransport::new(serial),
            flash: FlashEngine::new(memory, config.layout),
            serial_number: SerialNumberStore::new(eeprom, config.serial_number_cells),
            routing,
            config,
            exit: None,
        }
    }

    /// The active configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The serial transport.
    pub fn transport(&self) -> &SerialTransport<S, N> {
        &self.transport
    }

    /// The serial transport, mutably.
    pub fn transport_mut(&mut self) -> &mut SerialTransport<S, N> {
        &mut self.transport
    }

    /// The flash engine.
    pub fn flash(&self) -> &FlashEngine<F> {
        &self.flash
    }

    /// The serial number store, mutably.
    pub fn serial_number_mut(&mut self) -> &mut SerialNumberStore<E> {
        &mut self.serial_number
    }

    /// The line routing.
    pub fn routing(&self) -> &R {
        &self.routing
    }

    /// Why the session ended, if it has.
    pub fn exit(&self) -> Option<SessionExit> {
        self.exit
    }

    /// Runs one iteration of the control loop.
    ///
    /// # Arguments
    /// - `now`: current time in milliseconds.
    ///
    /// # Errors
    /// Fails when a response cannot be transmitted or the line selectors cannot be driven.
    pub fn poll(&mut self, now: u32) -> Result<Step, Error<S::Error>> {
        if let Some(exit) = self.exit {
            return Ok(Step::Exit(exit));
        }

        let _ = self.transport.read_pending(now);
        let packet = self.transport.decode();
        match packet.status {
            PacketStatus::Incomplete => {
                self.flush_stale(now);
                Ok(Step::Idle)
            }
            PacketStatus::Bad => {
                warn!("dropped corrupt frame, command {:#x}", packet.command);
                if self.config.reply_to_bad_packets {
                    self.transport.send(CMD_BAD_PACKET_RESPONSE, &[])?;
                }
                Ok(Step::Rejected)
            }
            PacketStatus::Ok => self.dispatch(&packet),
        }
    }

    fn dispatch(&mut self, packet: &Packet) -> Result<Step, Error<S::Error>> {
        debug!(
            "command {:#x} with {} data bytes",
            packet.command,
            packet.data_size()
        );
        match packet.command {
            CMD_PLATFORM_REQUEST => {
                self.transport
                    .send_string(CMD_PLATFORM_RESPONSE, self.config.platform)?;
            }
            CMD_VERSION_REQUEST => {
                self.transport
                    .send_string(CMD_VERSION_RESPONSE, self.config.version)?;
            }
            CMD_WRITE_DATA => {
                let response = match self.flash.write(packet) {
                    Ok(_) => CMD_WRITE_DATA_RESPONSE_OK,
                    Err(_) => CMD_WRITE_DATA_RESPONSE_ERR,
                };
                self.transport.send(response, &[])?;
            }
            CMD_START_APP => {
                self.transport.send(CMD_START_APP_RESPONSE, &[])?;
                info!("starting application");
                return Ok(self.finish(SessionExit::StartApplication));
            }
            CMD_MODULE_MODE => {
                self.transport.send(CMD_MODULE_MODE_RESPONSE, &[])?;
                self.routing.enter_passthrough_mode().map_err(|e| {
                    let kind = e.kind();
                    error!("failed to route the host line to the module: {:?}", kind);
                    Error::Routing(kind)
                })?;
                return Ok(self.finish(SessionExit::Passthrough));
            }
            CMD_WRITE_SN => {
                let outcome = self.serial_number.write_serial_number(packet);
                self.transport.send(outcome.response(), &[])?;
            }
            other => {
                debug!("ignoring unknown command {:#x}", other);
                return Ok(Step::Unknown(other));
            }
        }
        Ok(Step::Handled(packet.command))
    }

    fn finish(&mut self, exit: SessionExit) -> Step {
        self.transport.reset();
        self.exit = Some(exit);
        Step::Exit(exit)
    }

    /// Drops a partial frame the host stopped sending.
    fn flush_stale(&mut self, now: u32) {
        let Some(timeout) = self.config.rx_idle_timeout_ms else {
            return;
        };
        let rx = self.transport.rx();
        if !rx.is_empty() && now.wrapping_sub(rx.last_activity()) >= timeout {
            warn!("flushing {} stale bytes", rx.len());
            self.transport.reset();
        }
    }

    /// Polls until the session ends.
    ///
    /// # Arguments
    /// - `delay`: pauses [`Config::poll_interval_us`] between polls.
    /// - `clock`: returns the current time in milliseconds.
    #[cfg(feature = "delay-loop")]
    pub fn run<D: DelayNs>(
        &mut self,
        delay: &mut D,
        mut clock: impl FnMut() -> u32,
    ) -> Result<SessionExit, Error<S::Error>> {
        loop {
            if let Step::Exit(exit) = self.poll(clock())? {
                return Ok(exit);
            }
            delay.delay_us(self.config.poll_interval_us);
        }
    }

    /// Consumes the session, returning the peripherals.
    pub fn release(self) -> (S, F, E, R) {
        (
            self.transport.release(),
            self.flash.release(),
            self.serial_number.release(),
            self.routing,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::{
        CMD_WRITE_SN_RESPONSE_ERR, CMD_WRITE_SN_RESPONSE_OK, SN_LSB_CELL, SN_MSB_CELL,
    };
    use crate::flash::FlashLayout;
    use crate::packet::encode;
    use crate::routing::{NoRouting, SelectorPins};
    use crate::sim::{ERASED_WORD, SimEeprom, SimFlash, SimSerial};
    use embedded_hal::digital::ErrorKind;
    use embedded_hal_mock::eh1::MockError;
    use embedded_hal_mock::eh1::digital::{
        Mock as PinMock, State as PinState, Transaction as PinTransaction,
    };

    type TestBootloader = Bootloader<SimSerial, SimFlash, SimEeprom, NoRouting>;

    fn bootloader(config: Config) -> TestBootloader {
        Bootloader::new(
            SimSerial::new(),
            SimFlash::new(config.layout.page_size()),
            SimEeprom::new(),
            NoRouting,
            config,
        )
    }

    fn request<R: LinkRouting>(
        bl: &mut Bootloader<SimSerial, SimFlash, SimEeprom, R>,
        command: u8,
        data: &[u8],
    ) -> (Step, Vec<u8>) {
        bl.transport_mut()
            .serial_mut()
            .feed(&encode(command, data).unwrap());
        let step = bl.poll(0).unwrap();
        (step, bl.transport_mut().serial_mut().take_sent())
    }

    fn response(command: u8) -> Vec<u8> {
        encode(command, &[]).unwrap().to_vec()
    }

    #[test]
    fn test_idle_without_input() {
        let mut bl = bootloader(Config::default());
        assert_eq!(bl.poll(0), Ok(Step::Idle));
        assert!(bl.transport().serial().sent().is_empty());
    }

    #[test]
    fn test_platform_and_version() {
        let config = Config::default().with_platform("GW").with_version("1.2");
        let mut bl = bootloader(config);
        let (step, sent) = request(&mut bl, CMD_PLATFORM_REQUEST, &[]);
        assert_eq!(step, Step::Handled(CMD_PLATFORM_REQUEST));
        assert_eq!(
            sent,
            encode(CMD_PLATFORM_RESPONSE, b"GW\0").unwrap().to_vec()
        );
        let (_, sent) = request(&mut bl, CMD_VERSION_REQUEST, &[]);
        assert_eq!(sent, encode(CMD_VERSION_RESPONSE, b"1.2\0").unwrap().to_vec());
    }

    #[test]
    fn test_write_at_zero_erases_and_answers_ok() {
        let mut bl = bootloader(Config::default());
        let (step, sent) = request(
            &mut bl,
            CMD_WRITE_DATA,
            &[0x00, 0x00, 0x00, 0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF],
        );
        assert_eq!(step, Step::Handled(CMD_WRITE_DATA));
        assert_eq!(sent, [0x05, 0x03, 0x00, 0x06]);

        let flash = bl.flash().memory();
        assert_eq!(flash.erased_pages().first(), Some(&0));
        let (goto, upper) = FlashLayout::default().reset_instruction();
        assert_eq!(flash.read_word(0), goto);
        assert_eq!(flash.read_word(2), upper);
        // The six data bytes fall on the reset vector and are skipped.
        assert_eq!(flash.read_word(4), ERASED_WORD);
    }

    #[test]
    fn test_first_vector_dual_word_comes_after_reset_window() {
        let mut bl = bootloader(Config::default());
        let mut data = vec![0x00, 0x00, 0x00];
        data.extend_from_slice(&[0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);
        data.extend_from_slice(&[0x01, 0x02, 0x03, 0x04, 0x05, 0x06]);
        let (_, sent) = request(&mut bl, CMD_WRITE_DATA, &data);
        assert_eq!(sent, response(CMD_WRITE_DATA_RESPONSE_OK));
        let flash = bl.flash().memory();
        assert_eq!(flash.read_word(4), 0x0001_0203);
        assert_eq!(flash.read_word(6), 0x0004_0506);
    }

    #[test]
    fn test_write_into_bootloader_leaves_memory_unchanged() {
        let mut bl = bootloader(Config::default());
        let (_, sent) = request(
            &mut bl,
            CMD_WRITE_DATA,
            &[0x00, 0x08, 0x00, 1, 2, 3, 4, 5, 6],
        );
        assert_eq!(sent, response(CMD_WRITE_DATA_RESPONSE_OK));
        assert_eq!(bl.flash().memory().read_word(0x0800), ERASED_WORD);
        assert_eq!(bl.flash().memory().read_word(0x0802), ERASED_WORD);
    }

    #[test]
    fn test_write_failure_answers_err() {
        let mut bl = bootloader(Config::default());
        bl.flash.memory_mut().fail_writes_at(0x1800);
        let (_, sent) = request(
            &mut bl,
            CMD_WRITE_DATA,
            &[0x00, 0x18, 0x00, 1, 2, 3, 4, 5, 6],
        );
        assert_eq!(sent, response(CMD_WRITE_DATA_RESPONSE_ERR));
    }

    #[test]
    fn test_short_write_answers_err() {
        let mut bl = bootloader(Config::default());
        let (_, sent) = request(&mut bl, CMD_WRITE_DATA, &[0x00, 0x18]);
        assert_eq!(sent, response(CMD_WRITE_DATA_RESPONSE_ERR));
    }

    #[test]
    fn test_serial_number_is_provisioned_once() {
        let mut bl = bootloader(Config::default());
        let (_, sent) = request(&mut bl, CMD_WRITE_SN, &[0x12, 0x34]);
        assert_eq!(sent, response(CMD_WRITE_SN_RESPONSE_OK));
        let (_, sent) = request(&mut bl, CMD_WRITE_SN, &[0x56, 0x78]);
        assert_eq!(sent, response(CMD_WRITE_SN_RESPONSE_ERR));
        assert_eq!(bl.serial_number_mut().serial_number(), Ok(0x1234));
        let (_, _, eeprom, _) = bl.release();
        assert_eq!(eeprom.cell(SN_MSB_CELL), 0x12);
        assert_eq!(eeprom.cell(SN_LSB_CELL), 0x34);
    }

    #[test]
    fn test_unknown_command_is_ignored() {
        let mut bl = bootloader(Config::default());
        let (step, sent) = request(&mut bl, 0x42, &[1, 2]);
        assert_eq!(step, Step::Unknown(0x42));
        assert!(sent.is_empty());
        assert!(bl.transport().rx().is_empty());
    }

    #[test]
    fn test_bad_frame_is_dropped_silently() {
        let mut bl = bootloader(Config::default());
        let mut frame = encode(CMD_PLATFORM_REQUEST, &[]).unwrap();
        frame[2] ^= 0x01;
        bl.transport_mut().serial_mut().feed(&frame);
        assert_eq!(bl.poll(0), Ok(Step::Rejected));
        assert!(bl.transport().serial().sent().is_empty());
        assert!(bl.transport().rx().is_empty());
    }

    #[test]
    fn test_bad_frame_is_answered_when_configured() {
        let mut bl = bootloader(Config::default().with_reply_to_bad_packets(true));
        let mut frame = encode(CMD_PLATFORM_REQUEST, &[]).unwrap();
        frame[0] ^= 0x80;
        bl.transport_mut().serial_mut().feed(&frame);
        assert_eq!(bl.poll(0), Ok(Step::Rejected));
        assert_eq!(
            bl.transport().serial().sent(),
            &response(CMD_BAD_PACKET_RESPONSE)[..]
        );
    }

    #[test]
    fn test_start_app_ends_session() {
        let mut bl = bootloader(Config::default());
        let (step, sent) = request(&mut bl, CMD_START_APP, &[]);
        assert_eq!(step, Step::Exit(SessionExit::StartApplication));
        assert_eq!(sent, response(CMD_START_APP_RESPONSE));
        assert_eq!(bl.exit(), Some(SessionExit::StartApplication));
    }

    #[test]
    fn test_passthrough_stops_decoding() {
        let mcu = PinMock::new(&[
            PinTransaction::set(PinState::Low),
            PinTransaction::set(PinState::High),
        ]);
        let module = PinMock::new(&[
            PinTransaction::set(PinState::High),
            PinTransaction::set(PinState::Low),
        ]);
        let routing = SelectorPins::new(mcu, module).unwrap();
        let mut bl = Bootloader::<_, _, _, _>::new(
            SimSerial::new(),
            SimFlash::new(FlashLayout::default().page_size()),
            SimEeprom::new(),
            routing,
            Config::default(),
        );
        let (step, sent) = request(&mut bl, CMD_MODULE_MODE, &[]);
        assert_eq!(step, Step::Exit(SessionExit::Passthrough));
        assert_eq!(sent, response(CMD_MODULE_MODE_RESPONSE));

        // Module traffic is not for us.
        let (step, sent) = request(&mut bl, CMD_PLATFORM_REQUEST, &[]);
        assert_eq!(step, Step::Exit(SessionExit::Passthrough));
        assert!(sent.is_empty());
        assert_eq!(bl.transport().serial().pending_rx(), 4);

        let (_, _, _, routing) = bl.release();
        let (mut mcu, mut module) = routing.release();
        mcu.done();
        module.done();
    }

    #[test]
    fn test_routing_failure_is_reported() {
        let mcu = PinMock::new(&[
            PinTransaction::set(PinState::Low),
            PinTransaction::set(PinState::High)
                .with_error(MockError::Io(std::io::ErrorKind::Other)),
        ]);
        let module = PinMock::new(&[PinTransaction::set(PinState::High)]);
        let routing = SelectorPins::new(mcu, module).unwrap();
        let mut bl = Bootloader::<_, _, _, _>::new(
            SimSerial::new(),
            SimFlash::new(FlashLayout::default().page_size()),
            SimEeprom::new(),
            routing,
            Config::default(),
        );
        bl.transport_mut()
            .serial_mut()
            .feed(&encode(CMD_MODULE_MODE, &[]).unwrap());
        assert_eq!(bl.poll(0), Err(Error::Routing(ErrorKind::Other)));
        assert_eq!(bl.exit(), None);

        let (_, _, _, routing) = bl.release();
        let (mut mcu, mut module) = routing.release();
        mcu.done();
        module.done();
    }

    #[test]
    fn test_requests_split_across_polls() {
        let mut bl = bootloader(Config::default());
        let frame = encode(CMD_VERSION_REQUEST, &[]).unwrap();
        bl.transport_mut().serial_mut().feed(&frame[..1]);
        assert_eq!(bl.poll(0), Ok(Step::Idle));
        bl.transport_mut().serial_mut().feed(&frame[1..]);
        assert_eq!(bl.poll(1), Ok(Step::Handled(CMD_VERSION_REQUEST)));
    }

    #[test]
    fn test_partial_frame_kept_without_timeout() {
        let mut bl = bootloader(Config::default());
        bl.transport_mut().serial_mut().feed(&[CMD_VERSION_REQUEST]);
        assert_eq!(bl.poll(0), Ok(Step::Idle));
        assert_eq!(bl.poll(u32::MAX), Ok(Step::Idle));
        assert_eq!(bl.transport().rx().len(), 1);
    }

    #[test]
    fn test_stale_partial_frame_is_flushed() {
        let mut bl = bootloader(Config::default().with_rx_idle_timeout_ms(Some(100)));
        bl.transport_mut().serial_mut().feed(&[0x13, 0x37]);
        assert_eq!(bl.poll(1_000), Ok(Step::Idle));
        assert_eq!(bl.poll(1_099), Ok(Step::Idle));
        assert_eq!(bl.transport().rx().len(), 2);
        assert_eq!(bl.poll(1_100), Ok(Step::Idle));
        assert!(bl.transport().rx().is_empty());

        let (step, _) = request(&mut bl, CMD_VERSION_REQUEST, &[]);
        assert_eq!(step, Step::Handled(CMD_VERSION_REQUEST));
    }

    #[test]
    fn test_transmit_failure_is_reported() {
        let mut bl = bootloader(Config::default());
        bl.transport_mut().serial_mut().fail_transmit();
        bl.transport_mut()
            .serial_mut()
            .feed(&encode(CMD_VERSION_REQUEST, &[]).unwrap());
        assert!(matches!(bl.poll(0), Err(Error::Serial(_))));
    }

    #[cfg(feature = "delay-loop")]
    #[test]
    fn test_run_until_start_app() {
        struct CountingDelay(u32);

        impl DelayNs for CountingDelay {
            fn delay_ns(&mut self, ns: u32) {
                self.0 += ns / 1_000;
            }
        }

        let mut bl = bootloader(Config::default().with_poll_interval_us(50));
        bl.transport_mut()
            .serial_mut()
            .feed(&encode(CMD_START_APP, &[]).unwrap());

        let mut delay = CountingDelay(0);
        let mut ticks = 0;
        let exit = bl.run(&mut delay, || {
            ticks += 1;
            ticks
        });
        assert_eq!(exit, Ok(SessionExit::StartApplication));
        assert_eq!(ticks, 1);
        assert_eq!(delay.0, 0);
        assert_eq!(
            bl.transport().serial().sent(),
            &response(CMD_START_APP_RESPONSE)[..]
        );
        // An ended session returns at once.
        assert_eq!(bl.run(&mut delay, || 0), Ok(SessionExit::StartApplication));
    }
}
