use anchor_lang::prelude::*;

use crate::matcher::Challenge;
use crate::{LotteryError, REVEAL_DELAY, STAKE};

// ── Bet record ───────────────────────────────────────────────────────────

#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct Bet {
    pub id:           u64,     // 8
    pub bettor:       Pubkey,  // 32
    pub challenge:    u8,      // 1
    pub answer_block: u64,     // 8
    pub stake:        u64,     // 8
}
impl Bet {
    pub const LEN: usize = 8 + 32 + 1 + 8 + 8;

    pub fn challenge(&self) -> Challenge { Challenge(self.challenge) }
}

// ── Cursor ───────────────────────────────────────────────────────────────

/// `head` is the oldest unsettled id, `tail` the next id to hand out.
/// Both only move forward and `head <= tail` always holds.
#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueCursor {
    pub head: u64,  // 8
    pub tail: u64,  // 8
}
impl QueueCursor {
    pub const LEN: usize = 8 + 8;

    pub fn is_empty(&self) -> bool { self.head == self.tail }

    /// Bets placed but not yet settled.
    pub fn pending(&self) -> u64 { self.tail - self.head }
}

// ── Storage seam ─────────────────────────────────────────────────────────

/// Where bet records live. Ids are dense, starting at zero.
pub trait BetStore {
    fn load(&self, id: u64) -> Option<Bet>;
    fn store(&mut self, bet: Bet) -> Result<()>;
}

/// Append-only FIFO of bets. Settled entries stay readable; only the
/// head pointer moves past them.
pub struct BetQueue<S> {
    cursor: QueueCursor,
    store:  S,
}

impl<S: BetStore> BetQueue<S> {
    pub fn new(cursor: QueueCursor, store: S) -> Self {
        Self { cursor, store }
    }

    pub fn cursor(&self) -> QueueCursor { self.cursor }

    pub fn into_parts(self) -> (QueueCursor, S) { (self.cursor, self.store) }

    /// Put the head back after an aborted settlement run. Nothing is
    /// stored during settlement, so only the cursor needs restoring.
    pub(crate) fn rewind(&mut self, cursor: QueueCursor) {
        self.cursor = cursor;
    }

    pub fn enqueue(&mut self, bettor: Pubkey, challenge: Challenge, created_at_block: u64) -> Result<Bet> {
        let answer_block = created_at_block
            .checked_add(REVEAL_DELAY)
            .ok_or(LotteryError::MathOverflow)?;
        let next_tail = self.cursor.tail.checked_add(1).ok_or(LotteryError::MathOverflow)?;
        let bet = Bet {
            id: self.cursor.tail,
            bettor,
            challenge: challenge.0,
            answer_block,
            stake: STAKE,
        };
        self.store.store(bet)?;
        self.cursor.tail = next_tail;
        Ok(bet)
    }

    pub fn peek_head(&self) -> Option<Bet> {
        if self.cursor.is_empty() {
            return None;
        }
        self.store.load(self.cursor.head)
    }

    pub fn advance_head(&mut self) -> Result<()> {
        require!(!self.cursor.is_empty(), LotteryError::QueueEmpty);
        self.cursor.head += 1;
        Ok(())
    }

    pub fn get_by_id(&self, id: u64) -> Result<Bet> {
        require!(id < self.cursor.tail, LotteryError::BetNotFound);
        self.store.load(id).ok_or_else(|| LotteryError::BetNotFound.into())
    }
}

// ── Stores ───────────────────────────────────────────────────────────────

/// Whole history held in memory.
#[derive(Default)]
pub struct MemoryStore {
    bets: Vec<Bet>,
}

impl BetStore for MemoryStore {
    fn load(&self, id: u64) -> Option<Bet> {
        usize::try_from(id).ok().and_then(|i| self.bets.get(i)).copied()
    }

    fn store(&mut self, bet: Bet) -> Result<()> {
        require!(bet.id == self.bets.len() as u64, LotteryError::QueueOutOfOrder);
        self.bets.push(bet);
        Ok(())
    }
}

/// The slice of the queue an instruction actually has accounts for:
/// a contiguous run of tickets starting at the head, plus at most one
/// freshly placed bet waiting to be written to its ticket account.
#[derive(Default, Debug)]
pub struct WindowStore {
    start:  u64,
    window: Vec<Bet>,
    placed: Option<Bet>,
}

impl WindowStore {
    /// `window` must hold consecutive ids beginning at `start`.
    pub fn new(start: u64, window: Vec<Bet>) -> Result<Self> {
        Self::default().with_window(start, window)
    }

    /// Replace the loaded run of tickets, keeping any placed bet.
    pub fn with_window(mut self, start: u64, window: Vec<Bet>) -> Result<Self> {
        for (offset, bet) in window.iter().enumerate() {
            require!(bet.id == start + offset as u64, LotteryError::QueueOutOfOrder);
        }
        self.start  = start;
        self.window = window;
        Ok(self)
    }

    pub fn placed(&self) -> Option<Bet> { self.placed }
}

impl BetStore for WindowStore {
    fn load(&self, id: u64) -> Option<Bet> {
        if let Some(bet) = self.placed.filter(|b| b.id == id) {
            return Some(bet);
        }
        let offset = id.checked_sub(self.start)?;
        usize::try_from(offset).ok().and_then(|i| self.window.get(i)).copied()
    }

    fn store(&mut self, bet: Bet) -> Result<()> {
        require!(self.placed.is_none(), LotteryError::QueueOutOfOrder);
        self.placed = Some(bet);
        Ok(())
    }
}
