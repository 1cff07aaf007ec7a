//! Parallel data port
//!
//! A PIO state machine shifts each 32 bit FIFO word out MSB first as
//! nibbles on four data pins, one nibble per PDCLK edge: the first while
//! PDCLK is low, the second after it went high.
use iqstream::feeder::OutputFifo;

use super::hal::{
    gpio::{bank0, FunctionPio0, Pin, PullDown},
    pac,
    pio::{
        Buffers, PIOBuilder, PIOExt, PinDir, Running, ShiftDirection,
        StateMachine, Stopped, Tx, SM0,
    },
};

/// First of four consecutive data pins
pub const DATA_BASE: u8 = 14;
/// Parallel data clock from the DDS, also hardcoded in the program
pub const PDCLK: u8 = 22;

pub type DataPins = (
    Pin<bank0::Gpio14, FunctionPio0, PullDown>,
    Pin<bank0::Gpio15, FunctionPio0, PullDown>,
    Pin<bank0::Gpio16, FunctionPio0, PullDown>,
    Pin<bank0::Gpio17, FunctionPio0, PullDown>,
);
pub type ClockPin = Pin<bank0::Gpio22, FunctionPio0, PullDown>;

pub type Configured = StateMachine<(pac::PIO0, SM0), Stopped>;
pub type Started = StateMachine<(pac::PIO0, SM0), Running>;

/// Pushes into the joined TX FIFO.
pub struct ParPort {
    tx: Tx<(pac::PIO0, SM0)>,
}

impl OutputFifo for ParPort {
    fn try_push(&mut self, word: u32) -> Result<(), u32> {
        if self.tx.write(word) {
            Ok(())
        } else {
            Err(word)
        }
    }

    fn level(&self) -> usize {
        level()
    }
}

/// Number of words in the TX FIFO.
pub fn level() -> usize {
    // Read only status register
    let pio = unsafe { &*pac::PIO0::ptr() };
    pio.flevel().read().tx0().bits() as usize
}

/// Load the program and configure the state machine. It is not started.
pub fn setup(
    pio0: pac::PIO0,
    resets: &mut pac::RESETS,
    _data: DataPins,
    _pdclk: ClockPin,
) -> (Configured, ParPort) {
    let program = pio_proc::pio_asm!(
        ".wrap_target",
        "    wait 0 gpio 22",
        "    out pins, 4",
        "    wait 1 gpio 22",
        "    out pins, 4",
        ".wrap",
    );
    let (mut pio, sm0, _, _, _) = pio0.split(resets);
    let installed = pio.install(&program.program).unwrap();
    let (mut sm, _, tx) = PIOBuilder::from_installed_program(installed)
        .out_pins(DATA_BASE, 4)
        .out_shift_direction(ShiftDirection::Left)
        .autopull(true)
        .pull_threshold(32)
        .buffers(Buffers::OnlyTx)
        .clock_divisor_fixed_point(1, 0)
        .build(sm0);
    sm.set_pindirs((DATA_BASE..DATA_BASE + 4).map(|pin| (pin, PinDir::Output)));
    (sm, ParPort { tx })
}

/// Start clocking out FIFO words.
pub fn start(sm: Configured) -> Started {
    log::info!("Parallel port running, PDCLK on GPIO{PDCLK}");
    sm.start()
}
