//! Liveness indicator and status reports
use core::fmt;

use crate::{
    feeder::Stats,
    settings::{MeterSettings, Settings},
    Duration, Instant,
};

/// Full scale of the 12 bit ADC
const ADC_SCALE: f32 = 4096.0;

/// Raw ADC conversions of the supply current shunt.
pub trait Sensor {
    fn sample_raw(&mut self) -> u16;
}

/// Averaging current meter.
pub struct CurrentMeter<S> {
    sensor: S,
    samples: u32,
    /// mA per ADC LSB
    scale: f32,
}

impl<S: Sensor> CurrentMeter<S> {
    pub fn new(sensor: S, settings: &MeterSettings) -> Self {
        Self {
            sensor,
            samples: settings.samples.max(1),
            scale: settings.vref / settings.shunt * 1000.0 / ADC_SCALE,
        }
    }

    /// Supply current in mA.
    pub fn sample(&mut self) -> f32 {
        let sum: u32 = (0..self.samples)
            .map(|_| self.sensor.sample_raw() as u32)
            .sum();
        sum as f32 / self.samples as f32 * self.scale
    }

    pub fn free(self) -> S {
        self.sensor
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Status {
    pub current_ma: f32,
    pub fifo_level: usize,
    pub stats: Stats,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Current draw: {:.1} mA, FIFO level: {}",
            self.current_ma, self.fifo_level
        )
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Beat {
    /// Indicator state
    pub led: bool,
    /// A status report is due
    pub report: bool,
}

pub struct Heartbeat {
    liveness: Duration,
    interval: Duration,
    report: bool,
    next: Option<Instant>,
}

impl Heartbeat {
    pub fn new(settings: &Settings) -> Self {
        Self {
            liveness: settings.liveness(),
            interval: settings.report_interval(),
            report: settings.report,
            next: None,
        }
    }

    /// Whether the host link was active within the liveness window.
    ///
    /// Wrapping safe. Activity stamped shortly after `now` (by a preempting
    /// writer) counts as alive, stale activity never does.
    pub fn alive(&self, now: Instant, last: Instant) -> bool {
        match now.checked_duration_since(last) {
            Some(age) => age < self.liveness,
            None => {
                last.ticks().wrapping_sub(now.ticks()) < self.liveness.ticks()
            }
        }
    }

    pub fn update(&mut self, now: Instant, last: Instant) -> Beat {
        let report = self.report
            && match self.next {
                Some(next) if now < next => false,
                _ => {
                    self.next = Some(now + self.interval);
                    true
                }
            };
        Beat {
            led: self.alive(now, last),
            report,
        }
    }
}
