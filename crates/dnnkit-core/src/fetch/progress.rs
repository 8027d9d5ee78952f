//! Byte-interval progress marks for streamed writes.

use std::io::Write;

/// Counts written bytes and reports how many interval boundaries were crossed.
#[derive(Debug, Clone)]
pub struct ProgressMarks {
    interval: u64,
    next: u64,
    total: u64,
}

impl ProgressMarks {
    /// `interval` of 0 is treated as 1 byte.
    pub fn new(interval: u64) -> Self {
        let interval = interval.max(1);
        Self {
            interval,
            next: interval,
            total: 0,
        }
    }

    /// Adds `n` bytes; returns the number of marks to emit.
    pub fn advance(&mut self, n: u64) -> usize {
        self.total += n;
        let mut marks = 0;
        while self.total >= self.next {
            self.next += self.interval;
            marks += 1;
        }
        marks
    }

    /// Total bytes seen so far.
    pub fn total(&self) -> u64 {
        self.total
    }
}

/// Prints `count` progress marks to stdout without a newline.
pub(crate) fn print_marks(count: usize) {
    if count == 0 {
        return;
    }
    let mut out = std::io::stdout().lock();
    let _ = out.write_all(">".repeat(count).as_bytes());
    let _ = out.flush();
}
