use anchor_lang::prelude::*;

/// Result of comparing a challenge against a revealed hash.
/// Variant order is the wire value clients decode: Fail 0, Win 1, Draw 2.
#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum MatchResult {
    Fail,
    Win,
    Draw,
}

/// A one-byte guess: two nibbles, compared position by position.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Challenge(pub u8);

impl Challenge {
    pub fn high_nibble(self) -> u8 { high_nibble(self.0) }
    pub fn low_nibble(self)  -> u8 { low_nibble(self.0) }
}

pub fn high_nibble(byte: u8) -> u8 { (byte >> 4) & 0x0f }
pub fn low_nibble(byte: u8)  -> u8 { byte & 0x0f }

/// Compare `challenge` with the first byte of `revealed`.
/// Both nibbles equal → Win, exactly one → Draw, none → Fail.
pub fn is_match(challenge: Challenge, revealed: &[u8; 32]) -> MatchResult {
    let answer = revealed[0];
    let hits = (challenge.high_nibble() == high_nibble(answer)) as u8
             + (challenge.low_nibble()  == low_nibble(answer))  as u8;
    match hits {
        2 => MatchResult::Win,
        1 => MatchResult::Draw,
        _ => MatchResult::Fail,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 0x24b4012cf88e10e66e2a3f1df2b35fe755358b1308d0539250cf585b92913440
    const ANSWER: [u8; 32] = [
        0x24, 0xb4, 0x01, 0x2c, 0xf8, 0x8e, 0x10, 0xe6, 0x6e, 0x2a, 0x3f, 0x1d, 0xf2, 0xb3, 0x5f, 0xe7,
        0x55, 0x35, 0x8b, 0x13, 0x08, 0xd0, 0x53, 0x92, 0x50, 0xcf, 0x58, 0x5b, 0x92, 0x91, 0x34, 0x40,
    ];

    #[test]
    fn test_nibbles() {
        assert_eq!(high_nibble(0xab), 0x0a);
        assert_eq!(low_nibble(0xab), 0x0b);
        assert_eq!(Challenge(0x24).high_nibble(), 2);
        assert_eq!(Challenge(0x24).low_nibble(), 4);
    }

    #[test]
    fn test_is_match_win() {
        assert_eq!(is_match(Challenge(0x24), &ANSWER), MatchResult::Win);
    }

    #[test]
    fn test_is_match_draw() {
        assert_eq!(is_match(Challenge(0x25), &ANSWER), MatchResult::Draw);
        assert_eq!(is_match(Challenge(0x2a), &ANSWER), MatchResult::Draw);
        assert_eq!(is_match(Challenge(0x14), &ANSWER), MatchResult::Draw);
    }

    #[test]
    fn test_is_match_fail() {
        assert_eq!(is_match(Challenge(0xab), &ANSWER), MatchResult::Fail);
        // swapped nibbles do not count
        assert_eq!(is_match(Challenge(0x42), &ANSWER), MatchResult::Fail);
    }

    #[test]
    fn test_only_first_byte_matters() {
        let mut other = ANSWER;
        other[1..].fill(0xff);
        assert_eq!(is_match(Challenge(0x24), &other), MatchResult::Win);
    }

    #[test]
    fn test_wire_values() {
        assert_eq!(MatchResult::Fail as u8, 0);
        assert_eq!(MatchResult::Win as u8, 1);
        assert_eq!(MatchResult::Draw as u8, 2);
    }
}
