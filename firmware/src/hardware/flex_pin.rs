//! Runtime reconfigurable GPIO
//!
//! The typestate pins of the HAL fix direction and pull at compile time.
//! The bus data line needs to change both per byte, so this owns the HAL pin
//! (keeping it in the SIO function) and drives the SIO and pad registers
//! directly.
use core::convert::Infallible;

use bitbang::{FlexPin, Pull};
use embedded_hal_1::digital::{ErrorType, InputPin, OutputPin};

use super::hal::{
    self,
    gpio::{FunctionSioInput, Pin, PinId, PullNone},
    pac,
};

pub struct SioFlexPin<I: PinId> {
    _pin: Pin<I, FunctionSioInput, PullNone>,
    num: u8,
}

impl<I: PinId> SioFlexPin<I> {
    pub fn new(pin: Pin<I, FunctionSioInput, PullNone>) -> Self {
        let num = pin.id().num;
        Self { _pin: pin, num }
    }

    fn mask(&self) -> u32 {
        1 << self.num
    }

    fn sio() -> &'static pac::sio::RegisterBlock {
        // Set/clear/read registers only, atomic per pin
        unsafe { &*pac::SIO::ptr() }
    }
}

impl<I: PinId> ErrorType for SioFlexPin<I> {
    type Error = Infallible;
}

impl<I: PinId> InputPin for SioFlexPin<I> {
    fn is_high(&mut self) -> Result<bool, Infallible> {
        Ok(Self::sio().gpio_in().read().bits() & self.mask() != 0)
    }

    fn is_low(&mut self) -> Result<bool, Infallible> {
        self.is_high().map(|high| !high)
    }
}

impl<I: PinId> OutputPin for SioFlexPin<I> {
    fn set_low(&mut self) -> Result<(), Infallible> {
        Self::sio()
            .gpio_out_clr()
            .write(|w| unsafe { w.bits(self.mask()) });
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        Self::sio()
            .gpio_out_set()
            .write(|w| unsafe { w.bits(self.mask()) });
        Ok(())
    }
}

impl<I: PinId> FlexPin for SioFlexPin<I> {
    fn set_as_input(&mut self) -> Result<(), Infallible> {
        Self::sio()
            .gpio_oe_clr()
            .write(|w| unsafe { w.bits(self.mask()) });
        Ok(())
    }

    fn set_as_output(&mut self) -> Result<(), Infallible> {
        Self::sio()
            .gpio_oe_set()
            .write(|w| unsafe { w.bits(self.mask()) });
        Ok(())
    }

    fn set_pull(&mut self, pull: Pull) -> Result<(), Infallible> {
        // Only this pin's pad register is touched
        let pads = unsafe { &*pac::PADS_BANK0::ptr() };
        pads.gpio(self.num as usize).modify(|_, w| {
            w.pue()
                .bit(pull == Pull::Up)
                .pde()
                .bit(pull == Pull::Down)
        });
        Ok(())
    }
}

/// The bus data line
pub type DataLine = SioFlexPin<hal::gpio::bank0::Gpio26>;
