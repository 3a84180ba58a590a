//! Allocation journal: a fixed ring of recent large allocations.

/// One journaled allocation. `retaddr` is a best-effort return-address
/// capture and stays zero in the portable backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JournalEntry {
    pub size: usize,
    pub align: usize,
    pub retaddr: usize,
}

const JOURNAL_CAPACITY: usize = 1024;

/// Ring buffer of journal entries, lazily sized on first record so arenas
/// with journaling off pay nothing.
pub(crate) struct JournalRing {
    entries: Vec<JournalEntry>,
    head: usize,
}

impl JournalRing {
    pub(crate) const fn new() -> Self {
        JournalRing {
            entries: Vec::new(),
            head: 0,
        }
    }

    pub(crate) fn record(&mut self, size: usize, align: usize) {
        let e = JournalEntry {
            size,
            align,
            retaddr: 0,
        };
        if self.entries.len() < JOURNAL_CAPACITY {
            self.entries.push(e);
        } else {
            self.entries[self.head] = e;
            self.head = (self.head + 1) % JOURNAL_CAPACITY;
        }
    }

    /// Entries oldest-first.
    pub(crate) fn snapshot(&self) -> Vec<JournalEntry> {
        let mut out = Vec::with_capacity(self.entries.len());
        out.extend_from_slice(&self.entries[self.head..]);
        out.extend_from_slice(&self.entries[..self.head]);
        out
    }
}
