//! Startup sequence and heartbeat loop
use ad9957::{InitReport, Setup};
use log::{error, info};

use crate::{
    heartbeat::{Beat, Heartbeat, Status},
    settings::Settings,
    Duration, Instant,
};

/// Heartbeat loop period
pub const PERIOD: Duration = Duration::millis(1);

/// Board bring-up and runtime services used by the supervisor.
#[allow(async_fn_in_trait)]
pub trait Board {
    /// Start servicing the host link in the background.
    fn start_host_link(&mut self);
    async fn sleep(&mut self, duration: Duration);
    fn init_sensor(&mut self);
    /// Configure and enable the output FIFO and parallel port.
    fn init_output(&mut self);
    fn init_dds(&mut self, setup: &Setup) -> Result<InitReport, ad9957::Error>;
    /// Start moving host words into the output FIFO.
    fn start_feeder(&mut self);

    fn now(&self) -> Instant;
    /// Most recent host link activity
    fn last_activity(&self) -> Instant;
    fn set_indicator(&mut self, on: bool);
    fn status(&mut self) -> Status;
}

/// Bring up the board.
///
/// The output is running before the feeder starts. A DDS fault is logged
/// and startup continues.
pub async fn boot<B: Board>(
    board: &mut B,
    settings: &Settings,
) -> Option<InitReport> {
    board.start_host_link();
    board.sleep(settings.settle()).await;
    board.init_sensor();
    board.init_output();
    let report = board
        .init_dds(&settings.dds)
        .map_err(|e| error!("DDS init failed: {e}"))
        .ok();
    board.start_feeder();
    info!(" === System ready ===");
    report
}

/// One heartbeat: drive the indicator and log a status report when due.
pub fn beat<B: Board>(board: &mut B, heartbeat: &mut Heartbeat) -> Beat {
    let beat = heartbeat.update(board.now(), board.last_activity());
    board.set_indicator(beat.led);
    if beat.report {
        let status = board.status();
        info!("{status}");
        info!("Feeder: {}", status.stats);
    }
    beat
}

pub async fn run<B: Board>(board: &mut B, settings: &Settings) -> ! {
    boot(board, settings).await;
    let mut heartbeat = Heartbeat::new(settings);
    loop {
        beat(board, &mut heartbeat);
        board.sleep(PERIOD).await;
    }
}

#[cfg(test)]
mod test {
    extern crate std;

    use super::*;
    use crate::feeder::Stats;
    use embassy_futures::block_on;
    use std::{vec, vec::Vec};

    #[derive(Copy, Clone, Debug, PartialEq)]
    enum Event {
        HostLink,
        Sleep(u32),
        Sensor,
        Output,
        Dds,
        Feeder,
        Indicator(bool),
        Status,
    }

    #[derive(Default)]
    struct Recorder {
        events: Vec<Event>,
        dds_fails: bool,
        now: u32,
        last: u32,
    }

    impl Board for Recorder {
        fn start_host_link(&mut self) {
            self.events.push(Event::HostLink);
        }

        async fn sleep(&mut self, duration: Duration) {
            self.now += duration.ticks();
            self.events.push(Event::Sleep(duration.ticks()));
        }

        fn init_sensor(&mut self) {
            self.events.push(Event::Sensor);
        }

        fn init_output(&mut self) {
            self.events.push(Event::Output);
        }

        fn init_dds(
            &mut self,
            setup: &Setup,
        ) -> Result<InitReport, ad9957::Error> {
            self.events.push(Event::Dds);
            if self.dds_fails {
                return Err(ad9957::Error::Frequency);
            }
            Ok(InitReport {
                sysclk: setup.sysclk(),
                ftw: ad9957::frequency_to_ftw(setup.frequency, setup.sysclk()),
                faults: 0,
                readback: None,
            })
        }

        fn start_feeder(&mut self) {
            assert!(self.events.contains(&Event::Output));
            self.events.push(Event::Feeder);
        }

        fn now(&self) -> Instant {
            Instant::from_ticks(self.now)
        }

        fn last_activity(&self) -> Instant {
            Instant::from_ticks(self.last)
        }

        fn set_indicator(&mut self, on: bool) {
            self.events.push(Event::Indicator(on));
        }

        fn status(&mut self) -> Status {
            self.events.push(Event::Status);
            Status {
                current_ma: 0.0,
                fifo_level: 0,
                stats: Stats::default(),
            }
        }
    }

    #[test]
    fn boot_order() {
        let mut board = Recorder::default();
        let report = block_on(boot(&mut board, &Settings::default())).unwrap();
        assert_eq!(report.ftw, 0x553f_7cee);
        assert_eq!(
            board.events,
            vec![
                Event::HostLink,
                Event::Sleep(2000),
                Event::Sensor,
                Event::Output,
                Event::Dds,
                Event::Feeder
            ]
        );
    }

    #[test]
    fn dds_failure_continues() {
        let mut board = Recorder {
            dds_fails: true,
            ..Default::default()
        };
        assert!(block_on(boot(&mut board, &Settings::default())).is_none());
        assert_eq!(board.events.last(), Some(&Event::Feeder));
    }

    #[test]
    fn heartbeat() {
        let settings = Settings {
            report: true,
            ..Default::default()
        };
        let mut board = Recorder {
            now: 3000,
            last: 2990,
            ..Default::default()
        };
        let mut hb = Heartbeat::new(&settings);
        assert_eq!(
            beat(&mut board, &mut hb),
            Beat {
                led: true,
                report: true
            }
        );
        board.now = 3060;
        assert_eq!(
            beat(&mut board, &mut hb),
            Beat {
                led: false,
                report: false
            }
        );
        assert_eq!(
            board.events,
            vec![
                Event::Indicator(true),
                Event::Status,
                Event::Indicator(false)
            ]
        );
    }
}
