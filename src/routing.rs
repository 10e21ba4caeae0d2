//! Serial line routing.
//!
//! The host UART can be switched between the MCU and the Bluetooth module by two
//! active-low selector outputs. At power-up the line belongs to the MCU; once the host
//! asks for module mode the MCU lets go of the line and the module takes over until the
//! next reset.
//!
//! ```
//! # use embedded_hal_mock::eh1::digital::{Mock as Pin, State as PinState, Transaction as PinTransaction};
//! use gwboot::routing::{LinkRouting, SelectorPins};
//!
//! let mcu = Pin::new(&[PinTransaction::set(PinState::Low), PinTransaction::set(PinState::High)]);
//! let module = Pin::new(&[PinTransaction::set(PinState::High), PinTransaction::set(PinState::Low)]);
//! let mut routing = SelectorPins::new(mcu, module).unwrap();
//! routing.enter_passthrough_mode().unwrap();
//! # let (mut mcu, mut module) = routing.release();
//! # mcu.done();
//! # module.done();
//! ```

use embedded_hal::digital::{self, OutputPin};

/// Switches the host line between the MCU and the module.
pub trait LinkRouting {
    /// Error raised while driving the selectors.
    type Error: digital::Error;

    /// Hands the host line over to the module.
    fn enter_passthrough_mode(&mut self) -> Result<(), Self::Error>;
}

/// Line routing through a pair of active-low selector pins.
#[derive(Debug)]
pub struct SelectorPins<MCU, MODULE> {
    mcu: MCU,
    module: MODULE,
}

impl<MCU, MODULE, E> SelectorPins<MCU, MODULE>
where
    MCU: OutputPin<Error = E>,
    MODULE: OutputPin<Error = E>,
{
    /// Takes the selector pins and routes the host line to the MCU.
    pub fn new(mut mcu: MCU, mut module: MODULE) -> Result<Self, E> {
        mcu.set_low()?;
        module.set_high()?;
        Ok(Self { mcu, module })
    }

    /// Returns the selector pins.
    pub fn release(self) -> (MCU, MODULE) {
        (self.mcu, self.module)
    }
}

impl<MCU, MODULE, E> LinkRouting for SelectorPins<MCU, MODULE>
where
    MCU: OutputPin<Error = E>,
    MODULE: OutputPin<Error = E>,
    E: digital::Error,
{
    type Error = E;

    fn enter_passthrough_mode(&mut self) -> Result<(), E> {
        // Release the MCU side first so both ends never drive the line together.
        self.mcu.set_high()?;
        self.module.set_low()?;
        info!("host line routed to the module");
        Ok(())
    }
}

/// Routing for boards that have no selector pins.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoRouting;

impl LinkRouting for NoRouting {
    type Error = core::convert::Infallible;

    fn enter_passthrough_mode(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}
