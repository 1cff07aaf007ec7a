//! Pico 2 with the AD9957 board attached
use ad9957::{Ad9957, InitReport, Setup};
use embedded_hal_1::digital::{OutputPin, PinState};
use fugit::ExtU64;
use iqstream::{
    feeder::Counters,
    heartbeat::{CurrentMeter, Status},
    link::Activity,
    settings::MeterSettings,
    supervisor::Board,
    Duration, Instant,
};
use rtic_monotonics::Monotonic;

use super::{
    current::{self, Shunt},
    delay::AsmDelay,
    flex_pin::DataLine,
    hal::gpio::{
        bank0::{Gpio25, Gpio27},
        FunctionSioOutput, Pin, PullDown,
    },
    parport,
};
use crate::Mono;

pub type Led = Pin<Gpio25, FunctionSioOutput, PullDown>;
pub type BusClock = Pin<Gpio27, FunctionSioOutput, PullDown>;
pub type Bus = bitbang::BitBang<BusClock, DataLine, AsmDelay>;

/// Milliseconds since boot, wrapping.
pub fn now() -> Instant {
    Instant::from_ticks((Mono::now().ticks() / 1_000) as u32)
}

pub struct Pico {
    pub led: Led,
    pub dds: Ad9957<Bus>,
    pub adc: Option<current::Parts>,
    pub meter: Option<CurrentMeter<Shunt>>,
    pub meter_settings: MeterSettings,
    pub parport: Option<parport::Configured>,
    pub running: Option<parport::Started>,
    pub activity: &'static Activity,
    pub counters: &'static Counters,
    pub spawn_host_link: fn(),
    pub spawn_feeder: fn(),
}

impl Board for Pico {
    fn start_host_link(&mut self) {
        (self.spawn_host_link)();
    }

    async fn sleep(&mut self, duration: Duration) {
        Mono::delay(u64::from(duration.ticks()).millis()).await;
    }

    fn init_sensor(&mut self) {
        self.meter = self
            .adc
            .take()
            .and_then(current::Parts::enable)
            .map(|shunt| CurrentMeter::new(shunt, &self.meter_settings));
    }

    fn init_output(&mut self) {
        if let Some(sm) = self.parport.take() {
            self.running = Some(parport::start(sm));
        }
    }

    fn init_dds(
        &mut self,
        setup: &Setup,
    ) -> Result<InitReport, ad9957::Error> {
        self.dds.init(setup)
    }

    fn start_feeder(&mut self) {
        (self.spawn_feeder)();
    }

    fn now(&self) -> Instant {
        now()
    }

    fn last_activity(&self) -> Instant {
        self.activity.last()
    }

    fn set_indicator(&mut self, on: bool) {
        self.led.set_state(PinState::from(on)).ok();
    }

    fn status(&mut self) -> Status {
        Status {
            current_ma: self.meter.as_mut().map_or(f32::NAN, |m| m.sample()),
            fifo_level: parport::level(),
            stats: self.counters.snapshot(),
        }
    }
}
