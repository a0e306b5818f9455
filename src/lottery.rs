//! Three-from-twenty number lottery.
//!
//! Outcomes are computed from a supplied `NumberSource`, so settlement never
//! depends on presentation timing. A bonus number is only drawn when some
//! pick has exactly two matches.

use std::fmt;

use crate::activity::{ActivityEntry, ActivityKind, Clock, Reward};
use crate::coins::Coins;
use crate::error::CoinError;
use crate::store::{RecordStore, StudentKey, StudentRecord};

pub const NUMBER_MIN: u8 = 1;
pub const NUMBER_MAX: u8 = 20;
pub const PICK_SIZE: usize = 3;

/// Price of one draw or pooled ticket
pub const TICKET_COST: Coins = Coins::ONE;

/// Credit paid for a single match
pub const FOURTH_PRIZE_CREDIT: Coins = Coins::HALF;

/// Uniform choice over a finite candidate list. Callers remove drawn numbers
/// from `candidates` themselves, which makes repeated calls sampling without
/// replacement.
pub trait NumberSource {
    fn choose(&mut self, candidates: &[u8]) -> u8;
}

/// Three distinct numbers in 1..=20, stored sorted so equality ignores order
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NumberSet([u8; PICK_SIZE]);

impl NumberSet {
    pub fn new(numbers: &[u8]) -> Result<Self, CoinError> {
        if numbers.len() != PICK_SIZE {
            return Err(CoinError::InvalidPick(format!(
                "expected {} numbers, got {}",
                PICK_SIZE,
                numbers.len()
            )));
        }
        if let Some(n) = numbers.iter().find(|n| !(NUMBER_MIN..=NUMBER_MAX).contains(*n)) {
            return Err(CoinError::InvalidPick(format!(
                "{} is outside {}..={}",
                n, NUMBER_MIN, NUMBER_MAX
            )));
        }
        let mut sorted = [0u8; PICK_SIZE];
        sorted.copy_from_slice(numbers);
        sorted.sort_unstable();
        if sorted.windows(2).any(|w| w[0] == w[1]) {
            return Err(CoinError::InvalidPick("numbers must be distinct".to_string()));
        }
        Ok(NumberSet(sorted))
    }

    pub fn numbers(&self) -> [u8; PICK_SIZE] {
        self.0
    }

    pub fn contains(&self, n: u8) -> bool {
        self.0.contains(&n)
    }

    pub fn match_count(&self, drawn: &NumberSet) -> usize {
        self.0.iter().filter(|n| drawn.contains(**n)).count()
    }

    /// The one number not among `drawn`, when exactly two matched
    pub fn unmatched(&self, drawn: &NumberSet) -> Option<u8> {
        let mut missing = self.0.iter().filter(|n| !drawn.contains(**n));
        match (missing.next(), missing.next()) {
            (Some(n), None) => Some(*n),
            _ => None,
        }
    }
}

impl fmt::Display for NumberSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}, {}]", self.0[0], self.0[1], self.0[2])
    }
}

fn remaining_numbers(exclude: &[u8]) -> Vec<u8> {
    (NUMBER_MIN..=NUMBER_MAX).filter(|n| !exclude.contains(n)).collect()
}

/// Draw three distinct main numbers
pub fn draw_main<R: NumberSource>(source: &mut R) -> NumberSet {
    let mut drawn = [0u8; PICK_SIZE];
    for i in 0..PICK_SIZE {
        let candidates = remaining_numbers(&drawn[..i]);
        drawn[i] = source.choose(&candidates);
    }
    drawn.sort_unstable();
    NumberSet(drawn)
}

/// Draw the bonus from the 17 numbers left after the main draw
pub fn draw_bonus<R: NumberSource>(source: &mut R, main: &NumberSet) -> u8 {
    source.choose(&remaining_numbers(&main.0))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DrawOutcome {
    pub main: NumberSet,
    pub bonus: Option<u8>,
}

impl DrawOutcome {
    /// One shared outcome for every pick. The bonus is drawn once, and only
    /// if at least one pick matched exactly two main numbers.
    pub fn draw<R: NumberSource>(source: &mut R, picks: &[NumberSet]) -> Self {
        let main = draw_main(source);
        let bonus = picks
            .iter()
            .any(|p| p.match_count(&main) == 2)
            .then(|| draw_bonus(source, &main));
        Self { main, bonus }
    }

    /// A two-match pick without a drawn bonus settles as third prize
    pub fn reward_for(&self, pick: &NumberSet) -> Option<Reward> {
        match pick.match_count(&self.main) {
            3 => Some(Reward::GrandPrize),
            2 if self.bonus.is_some() && pick.unmatched(&self.main) == self.bonus => Some(Reward::SecondPrize),
            2 => Some(Reward::ThirdPrize),
            1 => Some(Reward::FourthPrize),
            _ => None,
        }
    }

    pub fn describe(&self) -> String {
        match self.bonus {
            Some(bonus) => format!("drawn numbers: {}, bonus: {}", self.main, bonus),
            None => format!("drawn numbers: {}", self.main),
        }
    }
}

/// Balance credit attached to a reward. Prize goods are handed out offline.
pub fn credit_for(reward: Option<Reward>) -> Coins {
    match reward {
        Some(Reward::FourthPrize) => FOURTH_PRIZE_CREDIT,
        _ => Coins::ZERO,
    }
}

/// Result of settling one pick against an outcome
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settlement {
    pub key: StudentKey,
    /// Set for pooled tickets
    pub ticket_id: Option<u64>,
    pub pick: NumberSet,
    pub reward: Option<Reward>,
    pub credit: Coins,
    pub balance: Coins,
}

/// Take the ticket cost up front. Never lets the balance go negative.
pub fn escrow_ticket(record: &mut StudentRecord) -> Result<(), CoinError> {
    if record.balance < TICKET_COST {
        return Err(CoinError::InsufficientBalance {
            balance: record.balance,
            required: TICKET_COST,
        });
    }
    record.balance -= TICKET_COST;
    Ok(())
}

/// Apply a reward to a record and log it
pub fn settle(
    record: &mut StudentRecord,
    pick: NumberSet,
    ticket_id: Option<u64>,
    outcome: &DrawOutcome,
    kind: ActivityKind,
    timestamp: String,
) -> (Settlement, ActivityEntry) {
    let reward = outcome.reward_for(&pick);
    let credit = credit_for(reward);
    record.balance += credit;
    let entry = ActivityEntry::new(
        timestamp,
        kind,
        reward,
        format!("pick: {}, {}", pick, outcome.describe()),
    );
    record.log.append(entry.clone());
    let settlement = Settlement {
        key: record.key.clone(),
        ticket_id,
        pick,
        reward,
        credit,
        balance: record.balance,
    };
    (settlement, entry)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstantDraw {
    pub outcome: DrawOutcome,
    pub settlement: Settlement,
    pub entry: ActivityEntry,
}

/// Idle -> Escrow -> Drawing -> Settled for a single student, persisted once
pub fn draw_instant_lottery<S: RecordStore, R: NumberSource, C: Clock>(
    store: &mut S,
    source: &mut R,
    clock: &C,
    key: &StudentKey,
    numbers: &[u8],
) -> Result<InstantDraw, CoinError> {
    let pick = NumberSet::new(numbers)?;
    let mut record = store.require(key)?;
    escrow_ticket(&mut record)?;

    let outcome = DrawOutcome::draw(source, &[pick]);
    let (settlement, entry) = settle(
        &mut record,
        pick,
        None,
        &outcome,
        ActivityKind::LotteryInstantDraw,
        clock.stamp(),
    );

    store.save(std::slice::from_ref(&record))?;
    Ok(InstantDraw {
        outcome,
        settlement,
        entry,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testing::{FixedClock, MemoryStore, ScriptedSource, SeededSource};

    fn set(numbers: [u8; 3]) -> NumberSet {
        NumberSet::new(&numbers).unwrap()
    }

    #[test]
    fn test_number_set_validation() {
        assert!(NumberSet::new(&[1, 2, 3]).is_ok());
        assert!(NumberSet::new(&[20, 1, 10]).is_ok());
        assert!(matches!(NumberSet::new(&[1, 2]), Err(CoinError::InvalidPick(_))));
        assert!(matches!(NumberSet::new(&[1, 2, 3, 4]), Err(CoinError::InvalidPick(_))));
        assert!(matches!(NumberSet::new(&[0, 2, 3]), Err(CoinError::InvalidPick(_))));
        assert!(matches!(NumberSet::new(&[1, 2, 21]), Err(CoinError::InvalidPick(_))));
        assert!(matches!(NumberSet::new(&[4, 4, 9]), Err(CoinError::InvalidPick(_))));
        assert_eq!(set([13, 2, 7]), set([2, 7, 13]));
    }

    #[test]
    fn test_draws_are_distinct_and_in_range() {
        let mut source = SeededSource(0x5eed);
        for _ in 0..500 {
            let main = draw_main(&mut source);
            let numbers = main.numbers();
            assert!(numbers.windows(2).all(|w| w[0] < w[1]));
            assert!(numbers.iter().all(|n| (NUMBER_MIN..=NUMBER_MAX).contains(n)));
            let bonus = draw_bonus(&mut source, &main);
            assert!(!main.contains(bonus));
        }
    }

    #[test]
    fn test_second_versus_third_prize() {
        let pick = set([2, 7, 13]);

        let mut source = ScriptedSource::new(&[2, 7, 19, 13]);
        let outcome = DrawOutcome::draw(&mut source, &[pick]);
        assert_eq!(outcome.bonus, Some(13));
        assert_eq!(outcome.reward_for(&pick), Some(Reward::SecondPrize));

        let mut source = ScriptedSource::new(&[2, 7, 19, 5]);
        let outcome = DrawOutcome::draw(&mut source, &[pick]);
        assert_eq!(outcome.reward_for(&pick), Some(Reward::ThirdPrize));
    }

    #[test]
    fn test_reward_table() {
        let outcome = DrawOutcome {
            main: set([2, 7, 19]),
            bonus: None,
        };
        assert_eq!(outcome.reward_for(&set([19, 2, 7])), Some(Reward::GrandPrize));
        assert_eq!(outcome.reward_for(&set([2, 8, 9])), Some(Reward::FourthPrize));
        assert_eq!(outcome.reward_for(&set([1, 8, 9])), None);
        assert_eq!(credit_for(Some(Reward::FourthPrize)), Coins::HALF);
        assert_eq!(credit_for(Some(Reward::GrandPrize)), Coins::ZERO);
    }

    #[test]
    fn test_no_bonus_without_two_matches() {
        let mut source = ScriptedSource::new(&[2, 7, 19]);
        let outcome = DrawOutcome::draw(&mut source, &[set([2, 7, 19]), set([1, 3, 4])]);
        assert_eq!(outcome.bonus, None);
        assert_eq!(source.calls, 3);
    }

    #[test]
    fn test_instant_grand_prize_costs_one() {
        let mut store = MemoryStore::with_students(&[("3-1", "Mina", 3)]);
        let mut source = ScriptedSource::new(&[2, 7, 13]);
        let key = StudentKey::new("3-1", "Mina");

        let draw = draw_instant_lottery(&mut store, &mut source, &FixedClock::at(10), &key, &[13, 7, 2]).unwrap();

        assert_eq!(draw.settlement.reward, Some(Reward::GrandPrize));
        assert_eq!(draw.outcome.bonus, None);
        assert_eq!(store.record("3-1", "Mina").balance, Coins::whole(2));
        let entry = store.record("3-1", "Mina").log.last().cloned().unwrap();
        assert_eq!(entry.kind, ActivityKind::LotteryInstantDraw);
        assert_eq!(entry.detail, "pick: [2, 7, 13], drawn numbers: [2, 7, 13]");
        assert_eq!(store.saves, 1);
    }

    #[test]
    fn test_instant_single_match_nets_minus_half() {
        let mut store = MemoryStore::with_students(&[("3-1", "Mina", 3)]);
        let mut source = ScriptedSource::new(&[2, 8, 9]);
        let key = StudentKey::new("3-1", "Mina");

        let draw = draw_instant_lottery(&mut store, &mut source, &FixedClock::at(10), &key, &[2, 7, 13]).unwrap();

        assert_eq!(draw.settlement.reward, Some(Reward::FourthPrize));
        assert_eq!(draw.settlement.credit, Coins::HALF);
        assert_eq!(store.record("3-1", "Mina").balance, Coins::from_halves(5));
    }

    #[test]
    fn test_instant_miss_nets_minus_one() {
        let mut store = MemoryStore::with_students(&[("3-1", "Mina", 1)]);
        let mut source = ScriptedSource::new(&[1, 3, 4]);
        let key = StudentKey::new("3-1", "Mina");

        let draw = draw_instant_lottery(&mut store, &mut source, &FixedClock::at(10), &key, &[2, 7, 13]).unwrap();

        assert_eq!(draw.settlement.reward, None);
        assert_eq!(store.record("3-1", "Mina").balance, Coins::ZERO);
        assert_eq!(store.record("3-1", "Mina").log.len(), 1);
    }

    #[test]
    fn test_instant_rejects_before_mutation() {
        let mut store = MemoryStore::with_students(&[("3-1", "Mina", 0)]);
        store
            .records
            .get_mut(&StudentKey::new("3-1", "Mina"))
            .unwrap()
            .balance = Coins::HALF;
        let mut source = ScriptedSource::new(&[]);
        let key = StudentKey::new("3-1", "Mina");
        let clock = FixedClock::at(10);

        let err = draw_instant_lottery(&mut store, &mut source, &clock, &key, &[2, 7]).unwrap_err();
        assert!(matches!(err, CoinError::InvalidPick(_)));

        let err = draw_instant_lottery(&mut store, &mut source, &clock, &key, &[2, 7, 13]).unwrap_err();
        assert!(matches!(err, CoinError::InsufficientBalance { .. }));

        assert_eq!(store.record("3-1", "Mina").balance, Coins::HALF);
        assert!(store.record("3-1", "Mina").log.is_empty());
        assert_eq!(source.calls, 0);
        assert_eq!(store.saves, 0);
    }
}
