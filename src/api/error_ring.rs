use std::sync::{Arc, Mutex};

use crate::clock::Clock;
use crate::config::truncate_utf8;

pub const ERROR_RING_CAPACITY: usize = 10;
pub const ERROR_SOURCE_MAX_LEN: usize = 7;
pub const ERROR_MESSAGE_MAX_LEN: usize = 95;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ErrorEntry {
    pub ts_ms: u64,
    pub code: i32,
    pub source: String,
    pub message: String,
}

struct RingInner {
    entries: Vec<ErrorEntry>,
    head: usize,
}

/// Fixed ring of the most recent failures observed at the HTTP layer.
/// Append-only; the oldest entry is overwritten.
pub struct ErrorRing {
    inner: Mutex<RingInner>,
    clock: Arc<dyn Clock>,
}

impl ErrorRing {
    pub fn new(clock: Arc<dyn Clock>) -> Arc<Self> {
        Arc::new(ErrorRing {
            inner: Mutex::new(RingInner {
                entries: Vec::with_capacity(ERROR_RING_CAPACITY),
                head: 0,
            }),
            clock,
        })
    }

    pub fn add(&self, source: &str, code: i32, message: &str) {
        let entry = ErrorEntry {
            ts_ms: self.clock.now_ms(),
            code,
            source: truncate_utf8(source, ERROR_SOURCE_MAX_LEN).to_string(),
            message: truncate_utf8(message, ERROR_MESSAGE_MAX_LEN).to_string(),
        };
        let mut inner = self.inner.lock().expect("lock error ring");
        if inner.entries.len() < ERROR_RING_CAPACITY {
            inner.entries.push(entry);
            inner.head = inner.entries.len() % ERROR_RING_CAPACITY;
        } else {
            let head = inner.head;
            inner.entries[head] = entry;
            inner.head = (head + 1) % ERROR_RING_CAPACITY;
        }
    }

    /// Most-recent-first snapshot.
    pub fn snapshot(&self) -> Vec<ErrorEntry> {
        let inner = self.inner.lock().expect("lock error ring");
        let count = inner.entries.len();
        let mut out = Vec::with_capacity(count);
        for i in 0..count {
            let index = (inner.head + count - 1 - i) % count;
            out.push(inner.entries[index].clone());
        }
        out
    }
}
