//! Ring buffer for trace records.
//!
//! Provides a fixed-size buffer that stores the most recent trace records,
//! with a cycle index for per-firing queries.

use std::collections::{HashMap, VecDeque};

use reteline_engine::EngineEvent;

use super::record::TraceRecord;

// =============================================================================
// Trace Buffer
// =============================================================================

/// A ring buffer for storing trace records.
///
/// Maintains a fixed maximum size, discarding oldest records when full.
#[derive(Clone, Debug)]
pub struct TraceBuffer {
    /// The records, oldest first.
    records: VecDeque<TraceRecord>,
    /// Maximum number of records to store.
    max_size: usize,
    /// Next record ID to assign.
    next_id: u64,
    /// Cycle index: each cycle with its first record's position.
    cycle_index: VecDeque<(u64, usize)>,
    /// Records discarded to stay within `max_size`.
    evicted: u64,
}

impl TraceBuffer {
    /// Creates a new trace buffer with the given maximum size.
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        Self {
            records: VecDeque::with_capacity(max_size.min(1024)),
            max_size,
            next_id: 0,
            cycle_index: VecDeque::new(),
            evicted: 0,
        }
    }

    /// Creates a buffer with default size (10000 records).
    #[must_use]
    pub fn default_size() -> Self {
        Self::new(10000)
    }

    /// Pushes a new event to the buffer.
    ///
    /// Returns the assigned record ID.
    pub fn push(&mut self, cycle: u64, timestamp_ns: u64, event: EngineEvent) -> u64 {
        let id = self.next_id;
        self.next_id += 1;

        if self.cycle_index.back().map(|(c, _)| *c) != Some(cycle) {
            self.cycle_index.push_back((cycle, self.records.len()));
        }
        self.records
            .push_back(TraceRecord::new(id, cycle, timestamp_ns, event));

        while self.records.len() > self.max_size {
            self.records.pop_front();
            self.evicted += 1;
            for (_, start) in &mut self.cycle_index {
                *start = start.saturating_sub(1);
            }
            // A cycle whose records are all gone starts where the next one does.
            while self.cycle_index.len() > 1 && self.cycle_index[1].1 == 0 {
                self.cycle_index.pop_front();
            }
            if self.records.is_empty() {
                self.cycle_index.clear();
            }
        }

        id
    }

    /// Returns the number of records in the buffer.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if the buffer is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Clears all records from the buffer.
    pub fn clear(&mut self) {
        self.records.clear();
        self.cycle_index.clear();
        // Ids stay monotonic across clears.
    }

    /// Returns an iterator over all records, oldest first.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &TraceRecord> {
        self.records.iter()
    }

    /// Returns the most recently pushed record.
    #[must_use]
    pub fn latest(&self) -> Option<&TraceRecord> {
        self.records.back()
    }

    /// Returns the records of one firing cycle.
    #[must_use]
    pub fn records_for_cycle(&self, cycle: u64) -> Vec<&TraceRecord> {
        let Some(slot) = self.cycle_index.iter().position(|(c, _)| *c == cycle) else {
            return Vec::new();
        };
        let start = self.cycle_index[slot].1;
        let end = self
            .cycle_index
            .get(slot + 1)
            .map_or(self.records.len(), |(_, next)| *next);
        self.records.range(start..end).collect()
    }

    /// Returns records in a cycle range (inclusive).
    #[must_use]
    pub fn records_in_range(&self, start_cycle: u64, end_cycle: u64) -> Vec<&TraceRecord> {
        self.records
            .iter()
            .filter(|r| r.cycle >= start_cycle && r.cycle <= end_cycle)
            .collect()
    }

    /// Returns the most recent N records.
    #[must_use]
    pub fn recent(&self, count: usize) -> Vec<&TraceRecord> {
        let start = self.records.len().saturating_sub(count);
        self.records.iter().skip(start).collect()
    }

    /// Returns records matching a predicate.
    pub fn filter<F>(&self, predicate: F) -> Vec<&TraceRecord>
    where
        F: Fn(&TraceRecord) -> bool,
    {
        self.records.iter().filter(|r| predicate(r)).collect()
    }

    /// Returns records of a specific event type.
    #[must_use]
    pub fn by_event_type(&self, event_type: &str) -> Vec<&TraceRecord> {
        self.filter(|r| r.event_type() == event_type)
    }

    /// Returns records concerning one rule.
    #[must_use]
    pub fn by_rule(&self, rule: &str) -> Vec<&TraceRecord> {
        self.filter(|r| r.rule() == Some(rule))
    }

    /// Returns the oldest cycle in the buffer.
    #[must_use]
    pub fn oldest_cycle(&self) -> Option<u64> {
        self.records.front().map(|r| r.cycle)
    }

    /// Returns the newest cycle in the buffer.
    #[must_use]
    pub fn newest_cycle(&self) -> Option<u64> {
        self.records.back().map(|r| r.cycle)
    }

    /// Returns all cycles with records in the buffer.
    #[must_use]
    pub fn cycles(&self) -> Vec<u64> {
        self.cycle_index.iter().map(|(c, _)| *c).collect()
    }

    /// Returns statistics about the buffer.
    #[must_use]
    pub fn stats(&self) -> TraceBufferStats {
        let mut event_counts = HashMap::new();
        for record in &self.records {
            *event_counts.entry(record.event_type()).or_insert(0) += 1;
        }

        TraceBufferStats {
            record_count: self.records.len(),
            max_size: self.max_size,
            oldest_cycle: self.oldest_cycle(),
            newest_cycle: self.newest_cycle(),
            cycle_count: self.cycle_index.len(),
            evicted: self.evicted,
            event_counts,
        }
    }
}

impl Default for TraceBuffer {
    fn default() -> Self {
        Self::default_size()
    }
}

// =============================================================================
// Buffer Statistics
// =============================================================================

/// Statistics about a trace buffer.
#[derive(Clone, Debug)]
pub struct TraceBufferStats {
    /// Number of records currently in buffer.
    pub record_count: usize,
    /// Maximum buffer size.
    pub max_size: usize,
    /// Oldest cycle in buffer.
    pub oldest_cycle: Option<u64>,
    /// Newest cycle in buffer.
    pub newest_cycle: Option<u64>,
    /// Number of distinct cycles.
    pub cycle_count: usize,
    /// Records discarded because the buffer was full.
    pub evicted: u64,
    /// Count of each event type.
    pub event_counts: HashMap<&'static str, usize>,
}

// =============================================================================
// Tests
// =============================================================================
