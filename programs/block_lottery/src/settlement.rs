use anchor_lang::prelude::*;

use crate::matcher::{is_match, MatchResult};
use crate::pot::Pot;
use crate::queue::{Bet, BetQueue, BetStore};
use crate::randomness::RandomnessSource;
use crate::{LotteryError, STAKE};

#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Both nibbles matched: stake plus the whole pot.
    Win,
    /// One nibble matched: stake returned.
    Draw,
    /// No match: stake joins the pot.
    Fail,
    /// Answer hash aged out of history before settlement: stake joins the pot.
    Expired,
}

impl From<MatchResult> for Outcome {
    fn from(result: MatchResult) -> Self {
        match result {
            MatchResult::Win  => Outcome::Win,
            MatchResult::Draw => Outcome::Draw,
            MatchResult::Fail => Outcome::Fail,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Settlement {
    pub bet_id:    u64,
    pub bettor:    Pubkey,
    pub outcome:   Outcome,
    pub payout:    u64,
    pub pot_after: u64,
}

pub fn check_stake(payment: u64) -> Result<()> {
    require!(payment == STAKE, LotteryError::InvalidStake);
    Ok(())
}

/// Payout policy for a single bet. `revealed` is `None` when the answer
/// block's hash is gone for good.
pub fn settle_bet(pot: &mut Pot, bet: &Bet, revealed: Option<&[u8; 32]>) -> Result<Settlement> {
    let outcome = match revealed {
        Some(hash) => Outcome::from(is_match(bet.challenge(), hash)),
        None       => Outcome::Expired,
    };
    let payout = match outcome {
        Outcome::Win => {
            let prize = bet.stake.checked_add(pot.balance()).ok_or(LotteryError::MathOverflow)?;
            pot.take();
            prize
        }
        Outcome::Draw => bet.stake,
        Outcome::Fail | Outcome::Expired => {
            pot.absorb(bet.stake)?;
            0
        }
    };
    Ok(Settlement {
        bet_id: bet.id,
        bettor: bet.bettor,
        outcome,
        payout,
        pot_after: pot.balance(),
    })
}

/// Settle bets from the head of `queue` in order, stopping at the first
/// bet whose answer block is past `current_block`, when the head is not
/// loaded, or after `max_settlements`. On error the queue and pot are left
/// as they were on entry.
pub fn distribute<S, R>(
    queue: &mut BetQueue<S>,
    pot: &mut Pot,
    source: &R,
    current_block: u64,
    max_settlements: usize,
) -> Result<Vec<Settlement>>
where
    S: BetStore,
    R: RandomnessSource + ?Sized,
{
    let cursor = queue.cursor();
    let saved_pot = *pot;
    let result = drain(queue, pot, source, current_block, max_settlements);
    if result.is_err() {
        queue.rewind(cursor);
        *pot = saved_pot;
    }
    result
}

fn drain<S, R>(
    queue: &mut BetQueue<S>,
    pot: &mut Pot,
    source: &R,
    current_block: u64,
    max_settlements: usize,
) -> Result<Vec<Settlement>>
where
    S: BetStore,
    R: RandomnessSource + ?Sized,
{
    let mut settled = Vec::new();
    while settled.len() < max_settlements {
        let Some(bet) = queue.peek_head() else { break };
        if bet.answer_block > current_block {
            break;
        }
        let revealed = source.block_hash(bet.answer_block);
        let settlement = settle_bet(pot, &bet, revealed.as_ref())?;
        queue.advance_head()?;
        settled.push(settlement);
    }
    Ok(settled)
}
