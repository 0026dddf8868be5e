use crossbeam::queue::ArrayQueue;

use super::record::Record;

/// Bounded free list of cleared records shared by the parsers and the index
/// consumer. Records recycled into a full pool are simply dropped.
#[derive(Debug)]
pub struct RecordPool {
    free: ArrayQueue<Record>,
}

impl RecordPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            free: ArrayQueue::new(capacity.max(1)),
        }
    }

    pub fn acquire(&self) -> Record {
        self.free.pop().unwrap_or_else(Record::new)
    }

    pub fn recycle(&self, mut record: Record) {
        record.clear();
        let _ = self.free.push(record);
    }

    pub fn available(&self) -> usize {
        self.free.len()
    }
}
