//! Bit-banged three-wire serial bus
//!
//! One clock line and one shared bidirectional data line, no chip select.
//! Bytes are shifted MSB first. The host launches data while the clock is low
//! and the device samples on the rising edge. On reads the device presents
//! data after the rising edge and the host samples while the clock is high.
//!
//! Before every byte written the data line is probed for activity
//! ([`BitBang::is_idle`]). The probe does not trust the pad pulls: some parts
//! (RP2350 erratum E9) have a pull-down too weak to pull the released line
//! low, so a low reading is confirmed by actively driving the line low and
//! sampling again after releasing it.
#![no_std]

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{self, InputPin, OutputPin, PinState};
use embedded_hal::spi::{self, ErrorType, Operation, SpiDevice};

/// Default clock phase duration. Correctness over speed: the bus has no
/// minimum clock rate.
pub const SETTLE_NS: u32 = 1_000;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Pull {
    #[default]
    None,
    Up,
    Down,
}

/// A GPIO whose direction and pull can be changed at runtime.
pub trait FlexPin: InputPin + OutputPin {
    /// Release the pin: stop driving and sample the pad.
    fn set_as_input(&mut self) -> Result<(), Self::Error>;
    /// Drive the pad with the current output state.
    fn set_as_output(&mut self) -> Result<(), Self::Error>;
    fn set_pull(&mut self, pull: Pull) -> Result<(), Self::Error>;
}

#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("Bus not idle")]
    NotIdle,
    #[error("Full duplex transfer on half duplex bus")]
    Unsupported,
    #[error("Pin: {0:?}")]
    Pin(digital::ErrorKind),
}

impl<E: digital::Error> From<E> for Error {
    fn from(value: E) -> Self {
        Self::Pin(value.kind())
    }
}

impl spi::Error for Error {
    fn kind(&self) -> spi::ErrorKind {
        spi::ErrorKind::Other
    }
}

pub struct BitBang<CLK, IO, D> {
    clk: CLK,
    io: IO,
    delay: D,
    settle_ns: u32,
}

impl<CLK, IO, D> BitBang<CLK, IO, D>
where
    CLK: OutputPin,
    IO: FlexPin,
    D: DelayNs,
{
    pub fn new(clk: CLK, io: IO, delay: D) -> Result<Self, Error> {
        Self::with_settle(clk, io, delay, SETTLE_NS)
    }

    /// Take the bus lines and put them into the idle state:
    /// clock driven low, data line released.
    pub fn with_settle(
        clk: CLK,
        io: IO,
        delay: D,
        settle_ns: u32,
    ) -> Result<Self, Error> {
        let mut bus = Self {
            clk,
            io,
            delay,
            settle_ns,
        };
        bus.release()?;
        Ok(bus)
    }

    pub fn free(self) -> (CLK, IO, D) {
        (self.clk, self.io, self.delay)
    }

    fn settle(&mut self) {
        self.delay.delay_ns(self.settle_ns);
    }

    pub fn clock_high(&mut self) -> Result<(), Error> {
        self.clk.set_high()?;
        self.settle();
        Ok(())
    }

    pub fn clock_low(&mut self) -> Result<(), Error> {
        self.clk.set_low()?;
        self.settle();
        Ok(())
    }

    /// Return to idle: clock low, data line input without pull.
    pub fn release(&mut self) -> Result<(), Error> {
        self.clk.set_low()?;
        self.io.set_as_input()?;
        self.io.set_pull(Pull::None)?;
        Ok(())
    }

    /// Probe whether the data line is free.
    ///
    /// High with pull-up: idle. Low with pull-up is ambiguous: either the
    /// device drives it or the line just kept its last level. Drive it low,
    /// release it and sample again. If it comes back high, something is
    /// driving it. If it stays low, it is idle.
    ///
    /// Leaves the data line released as input.
    pub fn is_idle(&mut self) -> Result<bool, Error> {
        self.io.set_as_input()?;
        self.io.set_pull(Pull::Up)?;
        self.settle();
        if self.io.is_high()? {
            return Ok(true);
        }

        self.io.set_pull(Pull::Down)?;
        self.io.set_low()?;
        self.io.set_as_output()?;
        self.settle();
        self.io.set_as_input()?;
        Ok(self.io.is_low()?)
    }

    /// Shift out one byte, MSB first.
    ///
    /// The bus must be idle. Otherwise the byte is dropped and
    /// [`Error::NotIdle`] is returned. There is no retry.
    pub fn write_byte(&mut self, byte: u8) -> Result<(), Error> {
        if !self.is_idle()? {
            log::warn!("Bus not idle, dropping {byte:#04x}");
            return Err(Error::NotIdle);
        }
        self.io.set_as_output()?;
        for i in 0..8 {
            self.clock_low()?;
            self.io.set_state(PinState::from(byte & (0x80 >> i) != 0))?;
            self.clock_high()?;
        }
        self.clock_low()
    }

    /// Shift in one byte, MSB first.
    pub fn read_byte(&mut self) -> Result<u8, Error> {
        self.io.set_as_input()?;
        self.io.set_pull(Pull::None)?;
        let mut byte = 0u8;
        for _ in 0..8 {
            self.clock_high()?;
            byte = (byte << 1) + self.io.is_high()? as u8;
            self.clock_low()?;
        }
        Ok(byte)
    }

    fn operation(&mut self, op: &mut Operation<'_, u8>) -> Result<(), Error> {
        match op {
            Operation::Write(data) => {
                for byte in data.iter() {
                    self.write_byte(*byte)?;
                }
            }
            Operation::Read(data) => {
                for byte in data.iter_mut() {
                    *byte = self.read_byte()?;
                }
            }
            Operation::DelayNs(ns) => self.delay.delay_ns(*ns),
            Operation::Transfer(..) | Operation::TransferInPlace(..) => {
                return Err(Error::Unsupported)
            }
        }
        Ok(())
    }
}

impl<CLK, IO, D> ErrorType for BitBang<CLK, IO, D> {
    type Error = Error;
}

/// Without a chip select a "device" is the bus itself. The first failing
/// operation aborts the transaction. The bus is released in any case.
impl<CLK, IO, D> SpiDevice<u8> for BitBang<CLK, IO, D>
where
    CLK: OutputPin,
    IO: FlexPin,
    D: DelayNs,
{
    fn transaction(
        &mut self,
        operations: &mut [Operation<'_, u8>],
    ) -> Result<(), Error> {
        let res = operations.iter_mut().try_for_each(|op| self.operation(op));
        self.release()?;
        res
    }
}
