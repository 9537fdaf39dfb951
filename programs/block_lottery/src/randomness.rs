use anchor_lang::prelude::*;

use crate::{LotteryError, HASH_RETENTION};

/// Source of revealed block hashes.
pub trait RandomnessSource {
    /// Hash revealed for `block`, or `None` if it can no longer be recovered.
    fn block_hash(&self, block: u64) -> Option<[u8; 32]>;
}

/// `block` is revealed and still young enough for the ledger to remember.
pub fn within_retention(block: u64, current: u64) -> bool {
    block <= current && current - block < HASH_RETENTION
}

// ── SlotHashes sysvar ────────────────────────────────────────────────────
// Layout: u64 entry count, then `count` × (u64 slot, [u8; 32] hash),
// newest slot first. Skipped slots have no entry.

const ENTRY_LEN: usize = 8 + 32;

pub struct SlotHashesSource<'a> {
    data:    &'a [u8],
    entries: usize,
}

impl<'a> SlotHashesSource<'a> {
    pub fn new(data: &'a [u8]) -> Result<Self> {
        let count = data
            .get(0..8)
            .and_then(|b| b.try_into().ok())
            .map(u64::from_le_bytes)
            .ok_or(LotteryError::MalformedSlotHashes)?;
        let entries = usize::try_from(count)
            .ok()
            .filter(|n| n.checked_mul(ENTRY_LEN).and_then(|len| len.checked_add(8)).is_some_and(|len| len <= data.len()))
            .ok_or(LotteryError::MalformedSlotHashes)?;
        Ok(Self { data, entries })
    }

    fn entry(&self, index: usize) -> (u64, [u8; 32]) {
        let off = 8 + index * ENTRY_LEN;
        let mut slot = [0u8; 8];
        let mut hash = [0u8; 32];
        slot.copy_from_slice(&self.data[off..off + 8]);
        hash.copy_from_slice(&self.data[off + 8..off + ENTRY_LEN]);
        (u64::from_le_bytes(slot), hash)
    }

    /// Latest slot whose hash has been recorded.
    pub fn newest_slot(&self) -> Option<u64> {
        (self.entries > 0).then(|| self.entry(0).0)
    }
}

impl RandomnessSource for SlotHashesSource<'_> {
    /// A skipped answer slot resolves to the next slot that was produced,
    /// as long as the history still reaches back past the answer slot.
    fn block_hash(&self, block: u64) -> Option<[u8; 32]> {
        let newest = self.newest_slot()?;
        if !within_retention(block, newest) {
            return None;
        }
        let mut candidate = None;
        for index in 0..self.entries {
            let (slot, hash) = self.entry(index);
            if slot == block {
                return Some(hash);
            }
            if slot < block {
                return candidate;
            }
            candidate = Some(hash);
        }
        // history ends before reaching below `block`
        None
    }
}

// ── Operator-set answer ──────────────────────────────────────────────────

/// Same answer for every block, subject to the usual retention window.
pub struct FixedAnswer {
    pub answer:  [u8; 32],
    pub current: u64,
}

impl RandomnessSource for FixedAnswer {
    fn block_hash(&self, block: u64) -> Option<[u8; 32]> {
        within_retention(block, self.current).then_some(self.answer)
    }
}
