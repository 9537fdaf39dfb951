use anchor_lang::prelude::*;
use anchor_lang::solana_program::sysvar::slot_hashes;
use anchor_lang::solana_program::system_instruction;
use anchor_lang::solana_program::program::invoke;

pub mod matcher;
pub mod pot;
pub mod queue;
pub mod randomness;
pub mod settlement;

use matcher::{Challenge, MatchResult};
use pot::Pot;
use queue::{Bet, BetQueue, QueueCursor, WindowStore};
use randomness::{FixedAnswer, RandomnessSource, SlotHashesSource};
use settlement::{Outcome, Settlement};

declare_id!("EdMZrLfFLRnDabUgAizyTLQKNMnfzUSZSMdghN3Z5fcv");

// ── Constants ─────────────────────────────────────────────────────────────
pub const STAKE:          u64 = 5_000_000; // 0.005 SOL, the only accepted bet
pub const REVEAL_DELAY:   u64 = 3;         // answer slot = bet slot + 3
pub const HASH_RETENTION: u64 = 512;       // SlotHashes keeps the last 512 slots
pub const MAX_SETTLEMENTS_PER_CALL: usize = 16;

pub const LOTTERY_SEED: &[u8] = b"lottery";
pub const BET_SEED:     &[u8] = b"bet";

// ── Game rules ────────────────────────────────────────────────────────────
//
// Each bet is one byte (two nibbles) and stakes exactly STAKE. It is answered
// by the first byte of the hash of slot `bet_slot + REVEAL_DELAY`:
//   both nibbles match → stake + whole pot, pot resets to 0
//   one nibble matches → stake back
//   no match           → stake goes to the pot
// If the answer hash has already dropped out of SlotHashes when the bet
// reaches the head of the queue, the stake goes to the pot.
//
// Bets settle strictly in placement order. Anyone may crank `distribute`.

#[program]
pub mod block_lottery {
    use super::*;

    // ── Initialize ────────────────────────────────────────────────
    pub fn initialize(ctx: Context<Initialize>, test_mode: bool) -> Result<()> {
        let lottery = &mut ctx.accounts.lottery;
        lottery.authority   = ctx.accounts.authority.key();
        lottery.queue       = QueueCursor::default();
        lottery.pot         = Pot::default();
        lottery.test_mode   = test_mode;
        lottery.test_answer = None;
        lottery.bump        = ctx.bumps.lottery;
        msg!("Lottery initialized (test mode: {})", test_mode);
        Ok(())
    }

    // ── Bet ───────────────────────────────────────────────────────
    pub fn bet(ctx: Context<PlaceBet>, challenge: u8, payment: u64) -> Result<()> {
        place_bet(
            &mut ctx.accounts.lottery, &ctx.accounts.bettor,
            &mut ctx.accounts.ticket, ctx.bumps.ticket, challenge, payment,
        )?;
        Ok(())
    }

    // ── Bet, then settle whatever is ready ────────────────────────
    pub fn bet_and_distribute<'info>(
        ctx: Context<'_, '_, 'info, 'info, BetAndDistribute<'info>>,
        challenge: u8,
        payment: u64,
    ) -> Result<()> {
        let placed = place_bet(
            &mut ctx.accounts.lottery, &ctx.accounts.bettor,
            &mut ctx.accounts.ticket, ctx.bumps.ticket, challenge, payment,
        )?;
        // The new ticket is only written on exit, so its bet comes from `placed`.
        let fresh_ticket = ctx.accounts.ticket.key();
        let slot_hashes_ai = ctx.accounts.slot_hashes.to_account_info();
        settle_window(
            &mut ctx.accounts.lottery, &slot_hashes_ai, ctx.remaining_accounts,
            placed, Some(fresh_ticket),
        )?;
        Ok(())
    }

    // ── Distribute (permissionless crank) ─────────────────────────
    // remaining_accounts: [ticket_head, bettor_head, ticket_head+1, bettor_head+1, ...]
    pub fn distribute<'info>(ctx: Context<'_, '_, 'info, 'info, Distribute<'info>>) -> Result<()> {
        let slot_hashes_ai = ctx.accounts.slot_hashes.to_account_info();
        settle_window(
            &mut ctx.accounts.lottery, &slot_hashes_ai, ctx.remaining_accounts,
            WindowStore::default(), None,
        )?;
        Ok(())
    }

    // ── Views (returned through return data) ──────────────────────
    pub fn get_pot(ctx: Context<ReadLottery>) -> Result<u64> {
        Ok(ctx.accounts.lottery.pot.balance())
    }

    pub fn get_bet_info(ctx: Context<GetBetInfo>, id: u64) -> Result<Bet> {
        let lottery = &ctx.accounts.lottery;
        read_bet(&ctx.accounts.ticket, &lottery.key(), lottery.queue, id)
    }

    pub fn is_match(_ctx: Context<Stateless>, challenge: u8, hash: [u8; 32]) -> Result<MatchResult> {
        Ok(matcher::is_match(Challenge(challenge), &hash))
    }

    // ── Admin: fixed answer (test deployments only) ───────────────
    pub fn set_answer_for_test(ctx: Context<AdminOnly>, answer: [u8; 32]) -> Result<()> {
        let lottery = &mut ctx.accounts.lottery;
        require!(lottery.test_mode, LotteryError::TestModeDisabled);
        lottery.test_answer = Some(answer);
        emit!(TestAnswerSet { answer });
        Ok(())
    }
}

// ══════════════════════════════════════════════════════════════════════════
//  HELPERS
// ══════════════════════════════════════════════════════════════════════════

/// Validate the stake, pull it into the lottery account and append the bet.
/// Returns the store holding the new bet for a settlement run in the same
/// instruction.
fn place_bet<'info>(
    lottery: &mut Account<'info, Lottery>,
    bettor: &Signer<'info>,
    ticket: &mut Account<'info, BetTicket>,
    ticket_bump: u8,
    challenge: u8,
    payment: u64,
) -> Result<WindowStore> {
    settlement::check_stake(payment)?;
    let slot = Clock::get()?.slot;

    let mut queue = BetQueue::new(lottery.queue, WindowStore::default());
    let bet = queue.enqueue(bettor.key(), Challenge(challenge), slot)?;
    let (cursor, placed) = queue.into_parts();

    // ── Transfer stake bettor → lottery ──────────────────────────
    let ix = system_instruction::transfer(&bettor.key(), &lottery.key(), payment);
    invoke(&ix, &[
        bettor.to_account_info(),
        lottery.to_account_info(),
    ])?;

    lottery.queue = cursor;
    ticket.bet    = bet;
    ticket.bump   = ticket_bump;
    check_reserves(lottery)?;

    msg!("Bet {} by {}: challenge {:#04x}, answer slot {}", bet.id, bet.bettor, bet.challenge, bet.answer_block);
    emit!(BetPlaced {
        id: bet.id, bettor: bet.bettor,
        challenge: bet.challenge, answer_block: bet.answer_block,
    });
    Ok(placed)
}

/// Settle the supplied window of tickets from the head of the queue.
///
/// ORDER:
///   1. Load and verify the tickets (PDA, id sequence, bettor wallet)
///   2. Run the settlement engine on copies of the cursor and pot
///   3. Commit cursor and pot to the lottery account
///   4. Move payout lamports
///   5. Re-check that the account still covers pot + pending stakes
///
/// Payouts are direct lamport moves, no CPI, so nothing can re-enter.
fn settle_window<'info>(
    lottery: &mut Account<'info, Lottery>,
    slot_hashes_ai: &AccountInfo<'info>,
    remaining: &'info [AccountInfo<'info>],
    placed: WindowStore,
    fresh_ticket: Option<Pubkey>,
) -> Result<Vec<Settlement>> {
    let (store, pairs) = load_window(
        remaining, &lottery.key(), lottery.queue.head, placed, fresh_ticket,
    )?;

    let (cursor, pot, settled) = {
        let data = slot_hashes_ai.try_borrow_data()?;
        run_engine(lottery, store, &data[..], pairs.len())?
    };

    // ── Effects ──────────────────────────────────────────────────
    lottery.queue = cursor;
    lottery.pot   = pot;

    // ── Interactions ─────────────────────────────────────────────
    let lottery_ai = lottery.to_account_info();
    pay_out(&lottery_ai, &settled, &pairs)?;
    for s in &settled {
        emit!(BetSettled {
            id: s.bet_id, bettor: s.bettor, outcome: s.outcome,
            payout: s.payout, pot: s.pot_after,
        });
    }
    check_reserves(lottery)?;

    if !settled.is_empty() {
        msg!("Settled {} bet(s); head {} pot {}", settled.len(), lottery.queue.head, lottery.pot.balance());
    }
    Ok(settled)
}

/// Read `remaining` as `(ticket, bettor)` pairs for consecutive ids from
/// `head`, at most `MAX_SETTLEMENTS_PER_CALL` of them. `fresh_ticket` is the
/// ticket created by this instruction: its bet comes from `placed` and the
/// window ends there, since nothing was placed after it.
fn load_window<'a, 'info>(
    remaining: &'a [AccountInfo<'info>],
    lottery: &Pubkey,
    head: u64,
    placed: WindowStore,
    fresh_ticket: Option<Pubkey>,
) -> Result<(WindowStore, Vec<&'a [AccountInfo<'info>]>)> {
    require!(remaining.len() % 2 == 0, LotteryError::QueueOutOfOrder);

    let mut pairs  = Vec::new();
    let mut window = Vec::new();
    for (offset, pair) in remaining.chunks_exact(2).take(MAX_SETTLEMENTS_PER_CALL).enumerate() {
        let id = head + offset as u64;
        let fresh = fresh_ticket == Some(pair[0].key());
        let bet = if fresh {
            placed.placed()
                .filter(|bet| bet.id == id)
                .ok_or(LotteryError::QueueOutOfOrder)?
        } else {
            load_ticket(&pair[0], lottery, id)?
        };
        require_keys_eq!(pair[1].key(), bet.bettor, LotteryError::BettorMismatch);
        pairs.push(pair);
        if fresh {
            break;
        }
        window.push(bet);
    }
    Ok((placed.with_window(head, window)?, pairs))
}

/// Run the engine over `store` against raw SlotHashes bytes, or against the
/// test answer when one is set. The lottery itself is not touched.
fn run_engine(
    lottery: &Lottery,
    store: WindowStore,
    slot_hashes: &[u8],
    limit: usize,
) -> Result<(QueueCursor, Pot, Vec<Settlement>)> {
    let history = SlotHashesSource::new(slot_hashes)?;
    let Some(current) = history.newest_slot() else {
        return Ok((lottery.queue, lottery.pot, Vec::new()));
    };
    let fixed;
    let source: &dyn RandomnessSource = match lottery.test_answer {
        Some(answer) => {
            fixed = FixedAnswer { answer, current };
            &fixed
        }
        None => &history,
    };

    let mut queue = BetQueue::new(lottery.queue, store);
    let mut pot = lottery.pot;
    let settled = settlement::distribute(&mut queue, &mut pot, source, current, limit)?;
    Ok((queue.cursor(), pot, settled))
}

/// Pay each settlement to the wallet it was paired with. Settlements come
/// out of the engine in head order, the same order as `pairs`.
fn pay_out(lottery_ai: &AccountInfo, settled: &[Settlement], pairs: &[&[AccountInfo]]) -> Result<()> {
    require!(settled.len() <= pairs.len(), LotteryError::QueueOutOfOrder);
    for (s, pair) in settled.iter().zip(pairs) {
        require_keys_eq!(pair[1].key(), s.bettor, LotteryError::BettorMismatch);
        if s.payout > 0 {
            require!(pair[1].is_writable, LotteryError::BettorMismatch);
            **lottery_ai.try_borrow_mut_lamports()? -= s.payout;
            **pair[1].try_borrow_mut_lamports()?    += s.payout;
        }
    }
    Ok(())
}

/// Look up bet `id` through the queue, with its ticket as the only loaded entry.
fn read_bet(ticket_ai: &AccountInfo, lottery: &Pubkey, cursor: QueueCursor, id: u64) -> Result<Bet> {
    // unassigned ids have no ticket data to read
    let window = if id < cursor.tail {
        vec![load_ticket(ticket_ai, lottery, id)?]
    } else {
        Vec::new()
    };
    BetQueue::new(cursor, WindowStore::new(id, window)?).get_by_id(id)
}

/// Deserialize a ticket and make sure it is the PDA for bet `id`.
fn load_ticket(ticket_ai: &AccountInfo, lottery: &Pubkey, id: u64) -> Result<Bet> {
    require_keys_eq!(*ticket_ai.owner, crate::ID, anchor_lang::error::ErrorCode::AccountOwnedByWrongProgram);
    let ticket = {
        let data = ticket_ai.try_borrow_data()?;
        BetTicket::try_deserialize(&mut &data[..])?
    };
    require!(ticket.bet.id == id, LotteryError::QueueOutOfOrder);
    let expected = Pubkey::create_program_address(
        &[BET_SEED, lottery.as_ref(), &id.to_le_bytes(), &[ticket.bump]],
        &crate::ID,
    ).map_err(|_| LotteryError::QueueOutOfOrder)?;
    require_keys_eq!(ticket_ai.key(), expected, LotteryError::QueueOutOfOrder);
    Ok(ticket.bet)
}

/// Lamports above rent must cover the pot plus every unsettled stake.
fn check_reserves(lottery: &Account<Lottery>) -> Result<()> {
    let lottery_ai = lottery.to_account_info();
    let rent = Rent::get()?.minimum_balance(lottery_ai.data_len());
    covers_reserves(lottery_ai.lamports().saturating_sub(rent), lottery.queue, lottery.pot)
}

fn covers_reserves(physical: u64, queue: QueueCursor, pot: Pot) -> Result<()> {
    let reserved = queue.pending()
        .checked_mul(STAKE)
        .and_then(|pending| pending.checked_add(pot.balance()))
        .ok_or(LotteryError::MathOverflow)?;
    require!(physical >= reserved, LotteryError::AccountingBroken);
    Ok(())
}

// ══════════════════════════════════════════════════════════════════════════
//  ACCOUNTS
// ══════════════════════════════════════════════════════════════════════════

#[derive(Accounts)]
pub struct Initialize<'info> {
    #[account(init, payer = authority, space = 8 + Lottery::LEN,
              seeds = [LOTTERY_SEED], bump)]
    pub lottery: Account<'info, Lottery>,
    #[account(mut)] pub authority: Signer<'info>,
    pub system_program: Program<'info, System>,
}

#[derive(Accounts)]
pub struct PlaceBet<'info> {
    #[account(mut)] pub bettor: Signer<'info>,
    #[account(mut, seeds = [LOTTERY_SEED], bump = lottery.bump)]
    pub lottery: Account<'info, Lottery>,
    #[account(init, payer = bettor, space = 8 + BetTicket::LEN,
              seeds = [BET_SEED, lottery.key().as_ref(), &lottery.queue.tail.to_le_bytes()], bump)]
    pub ticket: Account<'info, BetTicket>,
    pub system_program: Program<'info, System>,
}

#[derive(Accounts)]
pub struct BetAndDistribute<'info> {
    #[account(mut)] pub bettor: Signer<'info>,
    #[account(mut, seeds = [LOTTERY_SEED], bump = lottery.bump)]
    pub lottery: Account<'info, Lottery>,
    #[account(init, payer = bettor, space = 8 + BetTicket::LEN,
              seeds = [BET_SEED, lottery.key().as_ref(), &lottery.queue.tail.to_le_bytes()], bump)]
    pub ticket: Account<'info, BetTicket>,
    /// CHECK: address validated — not injectable
    #[account(address = slot_hashes::ID)]
    pub slot_hashes: UncheckedAccount<'info>,
    pub system_program: Program<'info, System>,
}

#[derive(Accounts)]
pub struct Distribute<'info> {
    #[account(mut, seeds = [LOTTERY_SEED], bump = lottery.bump)]
    pub lottery: Account<'info, Lottery>,
    /// CHECK: address validated — not injectable
    #[account(address = slot_hashes::ID)]
    pub slot_hashes: UncheckedAccount<'info>,
}

#[derive(Accounts)]
pub struct ReadLottery<'info> {
    #[account(seeds = [LOTTERY_SEED], bump = lottery.bump)]
    pub lottery: Account<'info, Lottery>,
}

#[derive(Accounts)]
#[instruction(id: u64)]
pub struct GetBetInfo<'info> {
    #[account(seeds = [LOTTERY_SEED], bump = lottery.bump)]
    pub lottery: Account<'info, Lottery>,
    /// CHECK: PDA for `id`; deserialized in the handler once `id` is known to exist.
    #[account(seeds = [BET_SEED, lottery.key().as_ref(), &id.to_le_bytes()], bump)]
    pub ticket: UncheckedAccount<'info>,
}

#[derive(Accounts)]
pub struct Stateless {}

#[derive(Accounts)]
pub struct AdminOnly<'info> {
    #[account(mut, seeds = [LOTTERY_SEED], bump = lottery.bump,
              has_one = authority @ LotteryError::Unauthorized)]
    pub lottery: Account<'info, Lottery>,
    pub authority: Signer<'info>,
}

// ══════════════════════════════════════════════════════════════════════════
//  STATE
// ══════════════════════════════════════════════════════════════════════════

#[account]
pub struct Lottery {
    pub authority:   Pubkey,            // 32
    pub queue:       QueueCursor,       // 16
    pub pot:         Pot,               // 8
    pub test_mode:   bool,              // 1
    pub test_answer: Option<[u8; 32]>,  // 1 + 32 = 33
    pub bump:        u8,                // 1
}
impl Lottery { pub const LEN: usize = 32 + QueueCursor::LEN + Pot::LEN + 1 + 33 + 1; }

/// One per bet, never closed so history stays queryable.
#[account]
pub struct BetTicket {
    pub bet:  Bet,  // 57
    pub bump: u8,   // 1
}
impl BetTicket { pub const LEN: usize = Bet::LEN + 1; }

// ══════════════════════════════════════════════════════════════════════════
//  ERRORS & EVENTS
// ══════════════════════════════════════════════════════════════════════════

#[error_code]
pub enum LotteryError {
    #[msg("Payment must equal the fixed stake (0.005 SOL)")]
    InvalidStake,
    #[msg("No bet with this id")]
    BetNotFound,
    #[msg("Bet queue is empty")]
    QueueEmpty,
    #[msg("Tickets must be passed in queue order starting at the head")]
    QueueOutOfOrder,
    #[msg("Payout wallet does not match the bettor")]
    BettorMismatch,
    #[msg("SlotHashes sysvar data is malformed")]
    MalformedSlotHashes,
    #[msg("Only the lottery authority may do this")]
    Unauthorized,
    #[msg("Test answers are disabled for this lottery")]
    TestModeDisabled,
    #[msg("Arithmetic overflow")]
    MathOverflow,
    #[msg("Accounting invariant violated")]
    AccountingBroken,
}

#[event] pub struct BetPlaced     { pub id: u64, pub bettor: Pubkey, pub challenge: u8, pub answer_block: u64 }
#[event] pub struct BetSettled    { pub id: u64, pub bettor: Pubkey, pub outcome: Outcome, pub payout: u64, pub pot: u64 }
#[event] pub struct TestAnswerSet { pub answer: [u8; 32] }
