//! Supply current shunt on ADC channel 2
use embedded_hal_02::adc::OneShot;
use iqstream::heartbeat::Sensor;

use log::error;

use super::hal::{
    adc::{Adc, AdcPin},
    gpio::{
        bank0::Gpio28, FunctionNull, FunctionSioInput, Pin, PullDown, PullNone,
    },
    pac,
};

pub type ShuntPin = AdcPin<Pin<Gpio28, FunctionSioInput, PullNone>>;

/// ADC resources, held until the sensor is brought up.
pub struct Parts {
    pub adc: pac::ADC,
    pub pin: Pin<Gpio28, FunctionNull, PullDown>,
    pub resets: pac::RESETS,
}

impl Parts {
    /// Take the ADC out of reset and claim the shunt input.
    pub fn enable(mut self) -> Option<Shunt> {
        let adc = Adc::new(self.adc, &mut self.resets);
        let pin = AdcPin::new(self.pin.into_floating_input())
            .map_err(|_| error!("GPIO28 is not an ADC input"))
            .ok()?;
        Some(Shunt::new(adc, pin))
    }
}

pub struct Shunt {
    adc: Adc,
    pin: ShuntPin,
}

impl Shunt {
    pub fn new(adc: Adc, pin: ShuntPin) -> Self {
        Self { adc, pin }
    }
}

impl Sensor for Shunt {
    fn sample_raw(&mut self) -> u16 {
        // Blocking conversion, never `WouldBlock`
        self.adc.read(&mut self.pin).unwrap_or(0)
    }
}
