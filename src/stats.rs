//! Lottery statistics.
//!
//! The published tally is kept up to date as draws settle. It can always be
//! rebuilt from the activity logs, which is what happens after an import or
//! an account reset.

use crate::activity::Reward;
use crate::lottery::Settlement;
use crate::store::{StudentKey, StudentRecord};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RewardTally {
    pub grand_prize: u32,
    pub second_prize: u32,
    pub third_prize: u32,
    pub fourth_prize: u32,
}

impl RewardTally {
    pub fn record(&mut self, reward: Reward) {
        let slot = match reward {
            Reward::GrandPrize => &mut self.grand_prize,
            Reward::SecondPrize => &mut self.second_prize,
            Reward::ThirdPrize => &mut self.third_prize,
            Reward::FourthPrize => &mut self.fourth_prize,
        };
        *slot += 1;
    }

    pub fn count(&self, reward: Reward) -> u32 {
        match reward {
            Reward::GrandPrize => self.grand_prize,
            Reward::SecondPrize => self.second_prize,
            Reward::ThirdPrize => self.third_prize,
            Reward::FourthPrize => self.fourth_prize,
        }
    }

    pub fn total(&self) -> u32 {
        Reward::ALL.iter().map(|r| self.count(*r)).sum()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Winner {
    pub key: StudentKey,
    pub reward: Reward,
    pub timestamp: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LotteryStats {
    pub tally: RewardTally,
    /// Third prize or better, in record then log order
    pub winners: Vec<Winner>,
}

impl LotteryStats {
    /// Continue counting from an already published tally
    pub fn starting_from(tally: RewardTally) -> Self {
        Self {
            tally,
            winners: Vec::new(),
        }
    }

    pub fn record(&mut self, key: &StudentKey, reward: Reward, timestamp: &str) {
        self.tally.record(reward);
        if reward.is_third_or_better() {
            self.winners.push(Winner {
                key: key.clone(),
                reward,
                timestamp: timestamp.to_string(),
            });
        }
    }

    /// Fold in the picks of one draw. Picks without a reward are ignored.
    pub fn record_settlements<'a, I>(&mut self, settlements: I, timestamp: &str)
    where
        I: IntoIterator<Item = &'a Settlement>,
    {
        for settlement in settlements {
            if let Some(reward) = settlement.reward {
                self.record(&settlement.key, reward, timestamp);
            }
        }
    }
}

pub fn aggregate_stats<'a, I>(records: I) -> LotteryStats
where
    I: IntoIterator<Item = &'a StudentRecord>,
{
    let mut stats = LotteryStats::default();
    for record in records {
        for entry in record.log.entries() {
            if let Some(reward) = entry.reward {
                stats.record(&record.key, reward, &entry.timestamp);
            }
        }
    }
    stats
}
