use anchor_lang::prelude::*;

use crate::LotteryError;

/// Lamports forfeited by losing bets, owed in full to the next winner.
#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Pot {
    pub balance: u64,
}

impl Pot {
    pub const LEN: usize = 8;

    pub fn balance(&self) -> u64 { self.balance }

    /// Add a forfeited stake.
    pub fn absorb(&mut self, stake: u64) -> Result<()> {
        self.balance = self.balance.checked_add(stake).ok_or(LotteryError::MathOverflow)?;
        Ok(())
    }

    /// Empty the pot, returning what it held.
    pub fn take(&mut self) -> u64 {
        std::mem::take(&mut self.balance)
    }
}
