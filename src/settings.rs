//! Runtime settings
//!
//! All fields have defaults matching the reference board. A JSON document
//! can override any subset of them.
use ad9957::Setup;
use serde::{Deserialize, Serialize};

use crate::Duration;

#[derive(Copy, Clone, Debug, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("Repeat count must be at least one")]
    Repeat,
    #[error("Intervals must be non-zero")]
    Interval,
    #[error("Meter needs at least one sample")]
    Samples,
    #[error("DDS frequency out of range")]
    Frequency,
    #[error("Malformed settings")]
    Json,
}

/// Supply current measurement through the shunt on the ADC input.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeterSettings {
    /// Number of conversions averaged per reading
    pub samples: u32,
    /// ADC full scale voltage
    pub vref: f32,
    /// Shunt resistance (Ohm)
    pub shunt: f32,
}

impl Default for MeterSettings {
    fn default() -> Self {
        Self {
            samples: 32,
            vref: 3.3,
            shunt: 3.3,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub dds: Setup,
    /// Output FIFO pushes per host word
    pub repeat: u32,
    /// Delay after starting the host link (ms)
    pub settle_ms: u32,
    /// The host link counts as alive this long after its last activity (ms)
    pub liveness_ms: u32,
    /// Log periodic status reports
    pub report: bool,
    /// Status report interval (ms)
    pub report_ms: u32,
    pub meter: MeterSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            dds: Setup::default(),
            repeat: 12,
            settle_ms: 2000,
            liveness_ms: 50,
            report: false,
            report_ms: 100,
            meter: MeterSettings::default(),
        }
    }
}

impl Settings {
    /// Parse and validate settings. Missing fields take their default.
    pub fn from_json(json: &[u8]) -> Result<Self, Error> {
        let (settings, _): (Self, _) =
            serde_json_core::from_slice(json).or(Err(Error::Json))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.repeat == 0 {
            return Err(Error::Repeat);
        }
        if self.liveness_ms == 0 || self.report_ms == 0 {
            return Err(Error::Interval);
        }
        if self.meter.samples == 0 {
            return Err(Error::Samples);
        }
        ad9957::checked_frequency_to_ftw(self.dds.frequency, self.dds.sysclk())
            .or(Err(Error::Frequency))?;
        Ok(())
    }

    pub fn settle(&self) -> Duration {
        Duration::millis(self.settle_ms)
    }

    pub fn liveness(&self) -> Duration {
        Duration::millis(self.liveness_ms)
    }

    pub fn report_interval(&self) -> Duration {
        Duration::millis(self.report_ms)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults() {
        let s = Settings::default();
        s.validate().unwrap();
        assert_eq!(s.repeat, 12);
        assert_eq!(s.settle(), Duration::millis(2000));
        assert_eq!(s.liveness(), Duration::millis(50));
        assert!(!s.report);
        assert_eq!(s.meter.samples, 32);
    }

    #[test]
    fn partial() {
        let json = br#"{"repeat": 4, "report": true,
            "dds": {"frequency": 1000000.0}}"#;
        let s = Settings::from_json(json).unwrap();
        assert_eq!(s.repeat, 4);
        assert!(s.report);
        assert_eq!(s.dds.frequency, 1e6);
        assert_eq!(s.dds.refclk, Setup::default().refclk);
        assert_eq!(s.settle_ms, 2000);
    }

    #[test]
    fn invalid() {
        assert_eq!(
            Settings::from_json(br#"{"repeat": 0}"#),
            Err(Error::Repeat)
        );
        assert_eq!(
            Settings::from_json(br#"{"report_ms": 0}"#),
            Err(Error::Interval)
        );
        assert_eq!(
            Settings::from_json(br#"{"meter": {"samples": 0}}"#),
            Err(Error::Samples)
        );
        assert_eq!(
            Settings::from_json(br#"{"dds": {"frequency": 200000000.0}}"#),
            Err(Error::Frequency)
        );
        assert_eq!(Settings::from_json(br#"{"repeat": "#), Err(Error::Json));
    }
}
