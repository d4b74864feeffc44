//! Bounded per-subscription result queue

use crate::EvaluationResult;
use std::collections::VecDeque;

/// Arrival-ordered queue of evaluation results with a high-water mark
///
/// When a push takes the queue past its high-water mark, the oldest `NoMatch`
/// entries are evicted first and the oldest `Match` entries only after no
/// `NoMatch` remains. The entry that was just pushed is never evicted.
#[derive(Debug)]
pub struct ResultQueue {
    /// Queued results, oldest first
    entries: VecDeque<EvaluationResult>,

    /// Maximum number of pending results
    high_water_mark: usize,

    /// Queued `Match` results
    pending_matches: usize,

    /// Results evicted over the queue's lifetime
    evicted: u64,
}

impl ResultQueue {
    /// Create a new result queue
    ///
    /// A high-water mark of zero is treated as one.
    pub fn new(high_water_mark: usize) -> Self {
        let high_water_mark = high_water_mark.max(1);
        Self {
            entries: VecDeque::with_capacity(high_water_mark.min(256)),
            high_water_mark,
            pending_matches: 0,
            evicted: 0,
        }
    }

    /// Append a result, returning how many older results were evicted
    pub fn push(&mut self, result: EvaluationResult) -> usize {
        if result.is_match() {
            self.pending_matches += 1;
        }
        self.entries.push_back(result);

        let mut evicted = 0;
        while self.entries.len() > self.high_water_mark {
            // The newest entry sits at the back and is excluded from the search.
            let newest = self.entries.len() - 1;
            let victim = self
                .entries
                .iter()
                .take(newest)
                .position(|r| !r.is_match())
                .unwrap_or(0);

            if let Some(removed) = self.entries.remove(victim) {
                if removed.is_match() {
                    self.pending_matches -= 1;
                }
                evicted += 1;
            }
        }

        self.evicted += evicted as u64;
        evicted
    }

    /// Remove and return the oldest result
    pub fn pop(&mut self) -> Option<EvaluationResult> {
        let result = self.entries.pop_front()?;
        if result.is_match() {
            self.pending_matches -= 1;
        }
        Some(result)
    }

    /// Iterate queued results, oldest first
    pub fn iter(&self) -> impl Iterator<Item = &EvaluationResult> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of queued `Match` results
    pub fn pending_matches(&self) -> usize {
        self.pending_matches
    }

    /// Total results evicted by the overflow policy
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    pub fn high_water_mark(&self) -> usize {
        self.high_water_mark
    }

    /// Drop everything still queued
    pub fn clear(&mut self) {
        self.entries.clear();
        self.pending_matches = 0;
    }
}
