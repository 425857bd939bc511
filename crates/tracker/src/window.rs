//! Confirmation window: cached headers above the last processed block.
//!
//! Holds headers numbered `(last_processed, last_cached]` with no gaps. A block is final once
//! `last_cached - number >= confirmations`; the final prefix is handed to the log pipeline and
//! evicted only after its logs are durable, which advances `last_processed`.
//!
//! The window itself is not synchronized; the tracker keeps it behind one async mutex held for
//! the whole of each classify/append/process or reset/rebuild sequence.

use crate::types::BlockHeader;
use std::collections::VecDeque;
use thiserror::Error;

/// How a newly observed head relates to the cached chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    /// `number == last_cached + 1` and the parent hash matches the cached parent, if cached.
    Sequential,
    /// Gap, repeated/shrinking head, or fork at the same height.
    OutOfSync,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WindowError {
    #[error("block {number} does not extend last cached block {last_cached}")]
    Gap { number: u64, last_cached: u64 },
    #[error("range [{from}, {to}] is not a prefix of the cache (first cached: {first_cached:?})")]
    NotAPrefix {
        from: u64,
        to: u64,
        first_cached: Option<u64>,
    },
}

#[derive(Debug, Clone)]
pub struct BlockWindow {
    last_processed: u64,
    blocks: VecDeque<BlockHeader>,
}

impl BlockWindow {
    /// Empty window whose watermark is `last_processed`.
    pub fn new(last_processed: u64) -> Self {
        Self {
            last_processed,
            blocks: VecDeque::new(),
        }
    }

    pub fn last_processed(&self) -> u64 {
        self.last_processed
    }

    /// Highest cached block number, or the watermark when nothing is cached.
    pub fn last_cached(&self) -> u64 {
        self.blocks
            .back()
            .map(|b| b.number)
            .unwrap_or(self.last_processed)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Cached block numbers, oldest first.
    pub fn cached_numbers(&self) -> Vec<u64> {
        self.blocks.iter().map(|b| b.number).collect()
    }

    pub fn classify(&self, block: &BlockHeader) -> SyncStatus {
        if block.number != self.last_cached().wrapping_add(1) {
            return SyncStatus::OutOfSync;
        }
        match self.blocks.back() {
            Some(parent) if parent.hash != block.parent_hash => SyncStatus::OutOfSync,
            _ => SyncStatus::Sequential,
        }
    }

    /// Append the next sequential header.
    ///
    /// Returns `Ok(false)` without touching the cache when the block is already covered
    /// (`number <= last_cached`), so a duplicate delivery is harmless.
    pub fn append(&mut self, block: BlockHeader) -> Result<bool, WindowError> {
        let last_cached = self.last_cached();
        if block.number <= last_cached {
            return Ok(false);
        }
        if block.number != last_cached + 1 {
            return Err(WindowError::Gap {
                number: block.number,
                last_cached,
            });
        }
        self.blocks.push_back(block);
        Ok(true)
    }

    /// Oldest-first run of cached blocks with at least `confirmations` blocks on top,
    /// as an inclusive `(from, to)` range. `None` if the oldest cached block is not final yet.
    pub fn confirmed_range(&self, confirmations: u64) -> Option<(u64, u64)> {
        let first = self.blocks.front()?.number;
        let last_final = self.last_cached().checked_sub(confirmations)?;
        if first > last_final {
            return None;
        }
        Some((first, last_final))
    }

    /// Drop `[from, to]` from the front of the cache and advance the watermark to `to`.
    /// Leaves the window untouched on error.
    pub fn evict(&mut self, from: u64, to: u64) -> Result<(), WindowError> {
        let first_cached = self.blocks.front().map(|b| b.number);
        if first_cached != Some(from) || to < from || to > self.last_cached() {
            return Err(WindowError::NotAPrefix {
                from,
                to,
                first_cached,
            });
        }
        let count = (to - from + 1) as usize;
        self.blocks.drain(..count);
        self.last_processed = to;
        Ok(())
    }

    /// Discard every cached block and restart the window at `baseline`.
    pub fn reset(&mut self, baseline: u64) {
        self.blocks.clear();
        self.last_processed = baseline;
    }
}
