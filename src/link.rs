//! Host link byte queue and activity tracking
//!
//! The USB task owns the producer side of a single producer single consumer
//! byte queue and the feeder owns the consumer side.
use core::sync::atomic::{AtomicU32, Ordering};

use heapless::spsc::{Consumer, Producer};

use crate::{feeder::HostLink, Instant};

/// Full speed bulk packet size
pub const PACKET: usize = 64;

impl<const N: usize> HostLink for Consumer<'_, u8, N> {
    fn read(&mut self, buf: &mut [u8]) -> usize {
        buf.iter_mut()
            .map_while(|b| self.dequeue().map(|v| *b = v))
            .count()
    }
}

/// Move one packet from the transport into the queue.
///
/// The transport is only read if a full packet fits so that bytes are never
/// dropped: unread data stays with the transport which then stalls the host.
/// Returns the number of bytes queued.
pub fn pump<const N: usize>(
    producer: &mut Producer<'_, u8, N>,
    read: impl FnOnce(&mut [u8]) -> usize,
) -> usize {
    if producer.capacity() - producer.len() < PACKET {
        return 0;
    }
    let mut buf = [0; PACKET];
    let n = read(&mut buf).min(PACKET);
    buf[..n]
        .iter()
        .take_while(|&&b| producer.enqueue(b).is_ok())
        .count()
}

/// Timestamp of the most recent host link activity.
#[derive(Debug, Default)]
pub struct Activity(AtomicU32);

impl Activity {
    pub const fn new() -> Self {
        Self(AtomicU32::new(0))
    }

    pub fn touch(&self, now: Instant) {
        self.0.store(now.ticks(), Ordering::Relaxed);
    }

    pub fn last(&self) -> Instant {
        Instant::from_ticks(self.0.load(Ordering::Relaxed))
    }
}
