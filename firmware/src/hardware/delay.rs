//! Basic blocking delay
//!
//! Cycle counting busy wait for the bit-banged bus.
use embedded_hal_1::delay::DelayNs;

/// A basic delay implementation.
#[derive(Copy, Clone, Debug)]
pub struct AsmDelay {
    frequency_mhz: u32,
}

impl AsmDelay {
    /// Create a new delay.
    ///
    /// # Args
    /// * `freq` - The CPU core frequency.
    pub fn new(freq: u32) -> AsmDelay {
        AsmDelay {
            frequency_mhz: freq / 1_000_000,
        }
    }
}

impl DelayNs for AsmDelay {
    fn delay_ns(&mut self, ns: u32) {
        // Round up, at least one cycle
        let cycles = (self.frequency_mhz as u64 * ns as u64).div_ceil(1_000);
        cortex_m::asm::delay(cycles.clamp(1, u32::MAX as u64) as u32)
    }
}
