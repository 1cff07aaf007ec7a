//! Module for all hardware-specific setup of the Pico 2 streamer
pub use rp235x_hal as hal;

pub mod board;
pub mod current;
pub mod delay;
pub mod flex_pin;
pub mod parport;

/// Pico 2 crystal
pub const XTAL_FREQ_HZ: u32 = 12_000_000;

/// Boot ROM image definition
#[link_section = ".start_block"]
#[used]
pub static IMAGE_DEF: hal::block::ImageDef = hal::block::ImageDef::secure_exe();

pub fn setup_logging() {
    use rtt_logger::RTTLogger;

    static LOGGER: RTTLogger = RTTLogger::new(log::LevelFilter::Info);
    rtt_target::rtt_init_print!();
    log::set_logger(&LOGGER)
        .map(|()| log::set_max_level(log::LevelFilter::Trace))
        .unwrap();
    log::info!("Starting");
}

/// Any fault restarts from scratch.
#[inline(never)]
#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    use core::{
        fmt::Write,
        sync::atomic::{AtomicBool, Ordering},
    };
    use cortex_m::{asm, peripheral::SCB};
    use rtt_target::{ChannelMode, UpChannel};

    cortex_m::interrupt::disable();

    // Recursion protection
    static PANICKED: AtomicBool = AtomicBool::new(false);
    if !PANICKED.swap(true, Ordering::Relaxed) {
        // Analogous to panic-rtt-target, but never block without a probe
        if let Some(mut channel) = unsafe { UpChannel::conjure(0) } {
            channel.set_mode(ChannelMode::NoBlockTrim);
            writeln!(channel, "{}", info).ok();
        }
    }

    asm::dsb();
    SCB::sys_reset()
}

#[cortex_m_rt::exception]
unsafe fn HardFault(ef: &cortex_m_rt::ExceptionFrame) -> ! {
    panic!("HardFault at {:#?}", ef);
}

#[cortex_m_rt::exception]
unsafe fn DefaultHandler(irqn: i16) {
    panic!("Unhandled exception (IRQn = {})", irqn);
}
