//! Class-wide pooled lottery.
//!
//! Students buy tickets into their class pool (the cost is taken at purchase).
//! A teacher then runs one draw that settles every ticket against the same
//! outcome and empties the pool.

use std::collections::BTreeMap;

use crate::activity::{ActivityEntry, ActivityKind, Clock};
use crate::coins::Coins;
use crate::error::CoinError;
use crate::lottery::{escrow_ticket, settle, DrawOutcome, NumberSet, NumberSource, Settlement, TICKET_COST};
use crate::store::{PoolStore, RecordStore, StudentKey, StudentRecord};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ticket {
    /// Assigned by the pool store, 0 before insertion
    pub ticket_id: u64,
    pub owner: StudentKey,
    pub numbers: NumberSet,
    pub purchased_at: String,
}

/// Idle -> Reserved. Validates everything before debiting.
pub fn purchase_ticket<S, P, C>(
    store: &mut S,
    pool: &mut P,
    clock: &C,
    key: &StudentKey,
    numbers: &[u8],
) -> Result<Ticket, CoinError>
where
    S: RecordStore,
    P: PoolStore,
    C: Clock,
{
    let pick = NumberSet::new(numbers)?;
    let mut record = store.require(key)?;

    let duplicate = pool
        .tickets(&key.class_id)?
        .iter()
        .any(|t| t.owner == *key && t.numbers == pick);
    if duplicate {
        return Err(CoinError::DuplicateTicket);
    }

    escrow_ticket(&mut record)?;
    let timestamp = clock.stamp();
    record.log.append(ActivityEntry::new(
        timestamp.clone(),
        ActivityKind::LotteryTicketPurchase,
        None,
        format!("ticket: {}, cost: {}", pick, TICKET_COST),
    ));
    store.save(std::slice::from_ref(&record))?;

    pool.add(Ticket {
        ticket_id: 0,
        owner: key.clone(),
        numbers: pick,
        purchased_at: timestamp,
    })
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PoolDraw {
    pub class_id: String,
    pub outcome: DrawOutcome,
    /// Class-time stamp written into the winners' logs
    pub drawn_at: String,
    /// One per ticket considered, in pool order
    pub settlements: Vec<Settlement>,
}

impl PoolDraw {
    pub fn winners(&self) -> impl Iterator<Item = &Settlement> {
        self.settlements.iter().filter(|s| s.reward.is_some())
    }
}

/// Pooled -> Drawing -> Settled -> Cleared for one class
pub fn run_pool_draw<S, P, R, C>(
    store: &mut S,
    pool: &mut P,
    source: &mut R,
    clock: &C,
    class_id: &str,
) -> Result<PoolDraw, CoinError>
where
    S: RecordStore,
    P: PoolStore,
    R: NumberSource,
    C: Clock,
{
    let tickets = pool.tickets(class_id)?;
    if tickets.is_empty() {
        return Err(CoinError::EmptyPool(class_id.to_string()));
    }

    let mut owners: BTreeMap<StudentKey, StudentRecord> = BTreeMap::new();
    for ticket in &tickets {
        if !owners.contains_key(&ticket.owner) {
            match store.find(&ticket.owner)? {
                Some(record) => {
                    owners.insert(ticket.owner.clone(), record);
                }
                None => log::warn!("[POOL] ticket:{} owner {} no longer exists", ticket.ticket_id, ticket.owner),
            }
        }
    }

    let picks: Vec<NumberSet> = tickets.iter().map(|t| t.numbers).collect();
    let outcome = DrawOutcome::draw(source, &picks);
    let timestamp = clock.stamp();

    let mut settlements = Vec::with_capacity(tickets.len());
    let mut touched: Vec<StudentKey> = Vec::new();
    for ticket in &tickets {
        let Some(record) = owners.get_mut(&ticket.owner) else {
            continue;
        };
        if outcome.reward_for(&ticket.numbers).is_none() {
            settlements.push(Settlement {
                key: ticket.owner.clone(),
                ticket_id: Some(ticket.ticket_id),
                pick: ticket.numbers,
                reward: None,
                credit: Coins::ZERO,
                balance: record.balance,
            });
            continue;
        }
        let (settlement, _) = settle(
            record,
            ticket.numbers,
            Some(ticket.ticket_id),
            &outcome,
            ActivityKind::LotteryPoolDraw,
            timestamp.clone(),
        );
        if !touched.contains(&ticket.owner) {
            touched.push(ticket.owner.clone());
        }
        settlements.push(settlement);
    }

    let winners: Vec<StudentRecord> = touched.iter().filter_map(|k| owners.get(k).cloned()).collect();
    if !winners.is_empty() {
        store.save(&winners)?;
    }
    pool.clear(class_id)?;

    Ok(PoolDraw {
        class_id: class_id.to_string(),
        outcome,
        drawn_at: timestamp,
        settlements,
    })
}
