//! Stream baseband I/Q words from USB into an AD9957.
//!
//! The host writes 32 bit words to the CDC data interface. Each is repeated
//! to match the DDS baseband rate and clocked out on the parallel port.
//!
//! Settings default to the reference board. They can be overridden at build
//! time with a JSON document in `IQSTREAM_SETTINGS`.
#![no_std]
#![no_main]

mod hardware;

use iqstream::settings::Settings;

rtic_monotonics::rp235x_timer_monotonic!(Mono);

/// Host link byte queue depth, a multiple of the USB packet size
const QUEUE: usize = 1024;

#[rtic::app(
    device = rp235x_hal::pac,
    peripherals = true,
    dispatchers = [TIMER1_IRQ_0]
)]
mod app {
    use super::*;

    use embassy_futures::yield_now;
    use heapless::spsc::{Consumer, Producer, Queue};
    use iqstream::{
        feeder::{Counters, Feeder},
        link::{self, Activity},
    };
    use usb_device::{
        bus::UsbBusAllocator,
        device::{UsbDevice, UsbDeviceState},
    };
    use usbd_serial::SerialPort;

    use crate::hardware::{
        board::{self, Pico},
        current,
        delay::AsmDelay,
        flex_pin::SioFlexPin,
        hal::{self, clocks::Clock},
        parport::{self, ParPort},
        XTAL_FREQ_HZ,
    };

    static ACTIVITY: Activity = Activity::new();
    static COUNTERS: Counters = Counters::new();

    #[shared]
    struct Shared {}

    #[local]
    struct Local {
        pico: Pico,
        settings: Settings,
        usb_device: UsbDevice<'static, hal::usb::UsbBus>,
        usb_serial: SerialPort<'static, hal::usb::UsbBus>,
        producer: Producer<'static, u8, QUEUE>,
        feeder: Feeder<'static, Consumer<'static, u8, QUEUE>, ParPort>,
    }

    #[init(local = [
        usb_bus: Option<UsbBusAllocator<hal::usb::UsbBus>> = None,
        queue: Queue<u8, QUEUE> = Queue::new(),
    ])]
    fn init(c: init::Context) -> (Shared, Local) {
        hardware::setup_logging();

        let settings = match option_env!("IQSTREAM_SETTINGS") {
            Some(json) => Settings::from_json(json.as_bytes())
                .inspect_err(|e| log::error!("Settings: {e}, using defaults"))
                .unwrap_or_default(),
            None => Settings::default(),
        };

        let mut device = c.device;
        Mono::start(device.TIMER0, &device.RESETS);

        let mut watchdog = hal::watchdog::Watchdog::new(device.WATCHDOG);
        let clocks = hal::clocks::init_clocks_and_plls(
            XTAL_FREQ_HZ,
            device.XOSC,
            device.CLOCKS,
            device.PLL_SYS,
            device.PLL_USB,
            &mut device.RESETS,
            &mut watchdog,
        )
        .ok()
        .unwrap();

        let sio = hal::Sio::new(device.SIO);
        let pins = hal::gpio::Pins::new(
            device.IO_BANK0,
            device.PADS_BANK0,
            sio.gpio_bank0,
            &mut device.RESETS,
        );

        let dds = {
            let delay = AsmDelay::new(clocks.system_clock.freq().to_Hz());
            let bus = bitbang::BitBang::new(
                pins.gpio27.into_push_pull_output(),
                SioFlexPin::new(pins.gpio26.into_floating_input()),
                delay,
            )
            .unwrap();
            ad9957::Ad9957::new(bus)
        };

        let (sm, parport) = parport::setup(
            device.PIO0,
            &mut device.RESETS,
            (
                pins.gpio14.into_function(),
                pins.gpio15.into_function(),
                pins.gpio16.into_function(),
                pins.gpio17.into_function(),
            ),
            pins.gpio22.into_function(),
        );

        let (usb_device, usb_serial) = {
            let usb_bus: &'static _ =
                c.local.usb_bus.insert(UsbBusAllocator::new(
                    hal::usb::UsbBus::new(
                        device.USB,
                        device.USB_DPRAM,
                        clocks.usb_clock,
                        true,
                        &mut device.RESETS,
                    ),
                ));
            let serial = SerialPort::new(usb_bus);
            let usb_device = usb_device::device::UsbDeviceBuilder::new(
                usb_bus,
                usb_device::device::UsbVidPid(0x1209, 0x0001),
            )
            .strings(&[usb_device::device::StringDescriptors::default()
                .manufacturer("QUARTIQ")
                .product("IQ stream")
                .serial_number("0001")])
            .unwrap()
            .device_class(usbd_serial::USB_CLASS_CDC)
            .build();
            (usb_device, serial)
        };

        let (producer, consumer) = c.local.queue.split();

        let pico = Pico {
            led: pins.gpio25.into_push_pull_output(),
            dds,
            // Brought up by the supervisor after the host link
            adc: Some(current::Parts {
                adc: device.ADC,
                pin: pins.gpio28,
                resets: device.RESETS,
            }),
            meter: None,
            meter_settings: settings.meter,
            parport: Some(sm),
            running: None,
            activity: &ACTIVITY,
            counters: &COUNTERS,
            spawn_host_link: || {
                usb::spawn().ok();
            },
            spawn_feeder: || {
                feeder::spawn().ok();
            },
        };

        supervisor::spawn().unwrap();

        (
            Shared {},
            Local {
                pico,
                settings,
                usb_device,
                usb_serial,
                producer,
                feeder: Feeder::new(
                    consumer,
                    parport,
                    settings.repeat,
                    &COUNTERS,
                ),
            },
        )
    }

    #[task(priority = 1, local = [pico, settings])]
    async fn supervisor(c: supervisor::Context) {
        iqstream::supervisor::run(c.local.pico, c.local.settings).await
    }

    /// Service the USB device and move received packets into the queue.
    #[task(priority = 1, local = [usb_device, usb_serial, producer])]
    async fn usb(c: usb::Context) {
        loop {
            c.local.usb_device.poll(&mut [&mut *c.local.usb_serial]);
            if c.local.usb_device.state() == UsbDeviceState::Configured {
                ACTIVITY.touch(board::now());
            }
            let serial = &mut *c.local.usb_serial;
            link::pump(c.local.producer, |buf| serial.read(buf).unwrap_or(0));
            yield_now().await;
        }
    }

    #[task(priority = 1, local = [feeder])]
    async fn feeder(c: feeder::Context) {
        c.local.feeder.run().await
    }
}
