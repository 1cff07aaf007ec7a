//! Baseband I/Q streaming into an AD9957
//!
//! The host sends 32 bit words over USB. Each word is repeated to match the
//! DDS baseband rate and pushed into the PIO TX FIFO which clocks it out as
//! four nibbles on the parallel data port, paced by PDCLK.
//!
//! This crate holds the target independent parts. The RP2350 firmware in
//! `firmware/` wires them to the peripherals.
#![no_std]

pub mod feeder;
pub mod heartbeat;
pub mod link;
pub mod settings;
pub mod supervisor;

pub use ad9957;

/// Millisecond timestamp of the monotonic clock, wrapping.
pub type Instant = fugit::TimerInstantU32<1000>;
pub type Duration = fugit::MillisDurationU32;
