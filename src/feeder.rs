//! Host word stream into the output FIFO
//!
//! Words arrive as four little-endian bytes. Every complete word is pushed
//! `repeat` times. A full FIFO is backpressure: the push is retried until it
//! succeeds, the host link is not read meanwhile and no word is dropped.
use core::{
    fmt,
    sync::atomic::{AtomicU32, Ordering},
};

use embassy_futures::yield_now;
use log::warn;

/// Byte source of the host link.
pub trait HostLink {
    /// Copy up to `buf.len()` pending bytes into `buf`, without blocking.
    ///
    /// Returns the number of bytes copied.
    fn read(&mut self, buf: &mut [u8]) -> usize;
}

/// Hardware output FIFO.
pub trait OutputFifo {
    /// Push a word, returning it if the FIFO is full.
    fn try_push(&mut self, word: u32) -> Result<(), u32>;
    /// Number of words queued.
    fn level(&self) -> usize;
}

/// Outcome of one feeder step.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Step {
    /// Nothing pending on the host link
    Idle,
    /// A short read of this many bytes, discarded
    Incomplete(usize),
    /// A word, pushed in full
    Word(u32),
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Stats {
    pub words: u32,
    pub incomplete: u32,
    /// Pushes refused by a full FIFO
    pub stalls: u32,
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} words, {} incomplete, {} stalls",
            self.words, self.incomplete, self.stalls
        )
    }
}

/// Feeder counters, shared with the status report.
#[derive(Debug, Default)]
pub struct Counters {
    words: AtomicU32,
    incomplete: AtomicU32,
    stalls: AtomicU32,
}

impl Counters {
    pub const fn new() -> Self {
        Self {
            words: AtomicU32::new(0),
            incomplete: AtomicU32::new(0),
            stalls: AtomicU32::new(0),
        }
    }

    pub fn snapshot(&self) -> Stats {
        Stats {
            words: self.words.load(Ordering::Relaxed),
            incomplete: self.incomplete.load(Ordering::Relaxed),
            stalls: self.stalls.load(Ordering::Relaxed),
        }
    }
}

pub struct Feeder<'a, L, F> {
    link: L,
    fifo: F,
    repeat: u32,
    counters: &'a Counters,
}

impl<'a, L: HostLink, F: OutputFifo> Feeder<'a, L, F> {
    /// `repeat` must be at least one.
    pub fn new(
        link: L,
        fifo: F,
        repeat: u32,
        counters: &'a Counters,
    ) -> Self {
        debug_assert!(repeat > 0);
        Self {
            link,
            fifo,
            repeat,
            counters,
        }
    }

    pub fn stats(&self) -> Stats {
        self.counters.snapshot()
    }

    pub fn fifo(&self) -> &F {
        &self.fifo
    }

    pub fn free(self) -> (L, F) {
        (self.link, self.fifo)
    }

    async fn push(&mut self, word: u32) {
        while self.fifo.try_push(word).is_err() {
            self.counters.stalls.fetch_add(1, Ordering::Relaxed);
            yield_now().await;
        }
    }

    /// Read at most one word from the host link and push it.
    pub async fn step(&mut self) -> Step {
        let mut buf = [0; 4];
        match self.link.read(&mut buf) {
            0 => {
                yield_now().await;
                Step::Idle
            }
            4 => {
                let word = u32::from_le_bytes(buf);
                for _ in 0..self.repeat {
                    self.push(word).await;
                }
                self.counters.words.fetch_add(1, Ordering::Relaxed);
                Step::Word(word)
            }
            n => {
                warn!("Incomplete word ({n} bytes)");
                self.counters.incomplete.fetch_add(1, Ordering::Relaxed);
                Step::Incomplete(n.min(buf.len()))
            }
        }
    }

    pub async fn run(&mut self) -> ! {
        loop {
            self.step().await;
        }
    }
}
