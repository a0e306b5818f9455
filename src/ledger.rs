//! Balance mutations. Every balance change is paired with one log entry.

use crate::activity::{ActivityEntry, ActivityKind, Clock};
use crate::coins::Coins;
use crate::error::CoinError;
use crate::store::{RecordStore, StudentKey, StudentRecord};

/// Largest single grant or revoke a teacher may enter
pub const MAX_ADJUSTMENT: Coins = Coins::whole(100);

/// Whether a teacher revoke may push a balance below zero.
/// Lottery purchases always require the full ticket cost regardless.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LedgerPolicy {
    pub allow_negative_balance: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LedgerOp {
    Adjust { key: StudentKey, delta: Coins },
    Reset { key: StudentKey },
    BatchAdjust { class_id: String, delta: Coins },
    BatchReset { class_id: String },
    SetCredential { key: StudentKey, credential: String },
}

/// Post-operation state of one touched student
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LedgerReceipt {
    pub key: StudentKey,
    pub balance: Coins,
    /// None for credential changes, which are not logged
    pub entry: Option<ActivityEntry>,
}

impl LedgerReceipt {
    fn of(record: &StudentRecord, entry: Option<ActivityEntry>) -> Self {
        Self {
            key: record.key.clone(),
            balance: record.balance,
            entry,
        }
    }
}

pub fn validate_delta(delta: Coins) -> Result<(), CoinError> {
    if delta.is_zero() || delta.abs() > MAX_ADJUSTMENT {
        return Err(CoinError::InvalidAmount(delta));
    }
    Ok(())
}

fn check_floor(record: &StudentRecord, delta: Coins, policy: LedgerPolicy) -> Result<(), CoinError> {
    if !policy.allow_negative_balance && (record.balance + delta).is_negative() {
        return Err(CoinError::InsufficientBalance {
            balance: record.balance,
            required: -delta,
        });
    }
    Ok(())
}

fn format_delta(delta: Coins) -> String {
    if delta.is_negative() {
        format!("delta: {}", delta)
    } else {
        format!("delta: +{}", delta)
    }
}

/// Add a signed delta and log it. Validation happens before any mutation.
pub fn grant_or_revoke(
    record: &mut StudentRecord,
    delta: Coins,
    policy: LedgerPolicy,
    kind: ActivityKind,
    timestamp: String,
) -> Result<ActivityEntry, CoinError> {
    validate_delta(delta)?;
    check_floor(record, delta, policy)?;

    record.balance += delta;
    let entry = ActivityEntry::new(timestamp, kind, None, format_delta(delta));
    record.log.append(entry.clone());
    Ok(entry)
}

/// Zero the balance, drop the history, then log the reset itself
pub fn reset(record: &mut StudentRecord, kind: ActivityKind, timestamp: String) -> ActivityEntry {
    let previous = record.balance;
    record.balance = Coins::ZERO;
    record.log.clear();
    let entry = ActivityEntry::new(timestamp, kind, None, format!("balance and log reset (was {})", previous));
    record.log.append(entry.clone());
    entry
}

/// Overwrite unconditionally, empty string included. Not logged.
pub fn set_credential(record: &mut StudentRecord, credential: String) {
    record.credential = credential;
}

/// Run one ledger operation against the store and persist the touched records
pub fn apply_ledger_op<S: RecordStore, C: Clock>(
    store: &mut S,
    clock: &C,
    policy: LedgerPolicy,
    op: LedgerOp,
) -> Result<Vec<LedgerReceipt>, CoinError> {
    let timestamp = clock.stamp();

    let (records, receipts) = match op {
        LedgerOp::Adjust { key, delta } => {
            let mut record = store.require(&key)?;
            let entry = grant_or_revoke(&mut record, delta, policy, ActivityKind::CoinAdjust, timestamp)?;
            let receipt = LedgerReceipt::of(&record, Some(entry));
            (vec![record], vec![receipt])
        }
        LedgerOp::Reset { key } => {
            let mut record = store.require(&key)?;
            let entry = reset(&mut record, ActivityKind::CoinReset, timestamp);
            let receipt = LedgerReceipt::of(&record, Some(entry));
            (vec![record], vec![receipt])
        }
        LedgerOp::BatchAdjust { class_id, delta } => {
            validate_delta(delta)?;
            let mut members = store.class_members(&class_id)?;
            // Reject the whole batch if any one member would fail
            for record in &members {
                check_floor(record, delta, policy)?;
            }
            let mut receipts = Vec::with_capacity(members.len());
            for record in members.iter_mut() {
                let entry = grant_or_revoke(record, delta, policy, ActivityKind::BatchCoinAdjust, timestamp.clone())?;
                receipts.push(LedgerReceipt::of(record, Some(entry)));
            }
            (members, receipts)
        }
        LedgerOp::BatchReset { class_id } => {
            let mut members = store.class_members(&class_id)?;
            let receipts = members
                .iter_mut()
                .map(|record| {
                    let entry = reset(record, ActivityKind::BatchCoinReset, timestamp.clone());
                    LedgerReceipt::of(record, Some(entry))
                })
                .collect();
            (members, receipts)
        }
        LedgerOp::SetCredential { key, credential } => {
            let mut record = store.require(&key)?;
            set_credential(&mut record, credential);
            let receipt = LedgerReceipt::of(&record, None);
            (vec![record], vec![receipt])
        }
    };

    if records.is_empty() {
        log::warn!("[LEDGER] operation touched no students");
        return Ok(receipts);
    }
    store.save(&records)?;
    Ok(receipts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testing::{FixedClock, MemoryStore};

    fn adjust(class_id: &str, name: &str, delta: i64) -> LedgerOp {
        LedgerOp::Adjust {
            key: StudentKey::new(class_id, name),
            delta: Coins::whole(delta),
        }
    }

    #[test]
    fn test_adjust_sums_deltas_and_grows_log() {
        let mut store = MemoryStore::with_students(&[("3-1", "Mina", 10)]);
        let clock = FixedClock::at(9);
        let policy = LedgerPolicy::default();

        for delta in [5, -3, 2, -7, 1] {
            apply_ledger_op(&mut store, &clock, policy, adjust("3-1", "Mina", delta)).unwrap();
        }

        let record = store.record("3-1", "Mina");
        assert_eq!(record.balance, Coins::whole(10 + 5 - 3 + 2 - 7 + 1));
        assert_eq!(record.log.len(), 5);
        assert!(record.log.entries().iter().all(|e| e.kind == ActivityKind::CoinAdjust));
        assert_eq!(record.log.entries()[0].detail, "delta: +5");
        assert_eq!(record.log.entries()[1].detail, "delta: -3");
        assert_eq!(record.log.entries()[0].timestamp, "2025-03-04 09:30:00");
    }

    #[test]
    fn test_adjust_rejects_zero_and_out_of_bounds() {
        let mut store = MemoryStore::with_students(&[("3-1", "Mina", 10)]);
        let clock = FixedClock::at(9);
        let policy = LedgerPolicy::default();

        for delta in [0, 101, -101] {
            let err = apply_ledger_op(&mut store, &clock, policy, adjust("3-1", "Mina", delta)).unwrap_err();
            assert_eq!(err, CoinError::InvalidAmount(Coins::whole(delta)));
        }
        assert_eq!(store.record("3-1", "Mina").balance, Coins::whole(10));
        assert!(store.record("3-1", "Mina").log.is_empty());
        assert_eq!(store.saves, 0);
    }

    #[test]
    fn test_revoke_below_zero_rejected_by_default() {
        let mut store = MemoryStore::with_students(&[("3-1", "Mina", 3)]);
        let clock = FixedClock::at(9);

        let err = apply_ledger_op(&mut store, &clock, LedgerPolicy::default(), adjust("3-1", "Mina", -5)).unwrap_err();
        assert_eq!(
            err,
            CoinError::InsufficientBalance {
                balance: Coins::whole(3),
                required: Coins::whole(5)
            }
        );
        assert_eq!(store.record("3-1", "Mina").balance, Coins::whole(3));
        assert!(store.record("3-1", "Mina").log.is_empty());
    }

    #[test]
    fn test_revoke_below_zero_allowed_by_policy() {
        let mut store = MemoryStore::with_students(&[("3-1", "Mina", 3)]);
        let clock = FixedClock::at(9);
        let policy = LedgerPolicy {
            allow_negative_balance: true,
        };

        let receipts = apply_ledger_op(&mut store, &clock, policy, adjust("3-1", "Mina", -5)).unwrap();
        assert_eq!(receipts[0].balance, Coins::whole(-2));
        assert_eq!(store.record("3-1", "Mina").balance, Coins::whole(-2));
    }

    #[test]
    fn test_reset_clears_balance_and_history() {
        let mut store = MemoryStore::with_students(&[("3-1", "Mina", 3)]);
        let clock = FixedClock::at(9);
        let policy = LedgerPolicy::default();
        apply_ledger_op(&mut store, &clock, policy, adjust("3-1", "Mina", 4)).unwrap();
        apply_ledger_op(&mut store, &clock, policy, adjust("3-1", "Mina", 2)).unwrap();

        let key = StudentKey::new("3-1", "Mina");
        let receipts = apply_ledger_op(&mut store, &clock, policy, LedgerOp::Reset { key }).unwrap();

        let record = store.record("3-1", "Mina");
        assert_eq!(record.balance, Coins::ZERO);
        assert_eq!(record.log.len(), 1);
        assert_eq!(record.log.entries()[0].kind, ActivityKind::CoinReset);
        assert_eq!(receipts[0].entry.as_ref().map(|e| e.kind), Some(ActivityKind::CoinReset));
    }

    #[test]
    fn test_batch_adjust_touches_only_class() {
        let mut store = MemoryStore::with_students(&[("3-1", "Mina", 1), ("3-1", "Jun", 4), ("3-2", "Hana", 7)]);
        let clock = FixedClock::at(9);

        let op = LedgerOp::BatchAdjust {
            class_id: "3-1".to_string(),
            delta: Coins::whole(2),
        };
        let receipts = apply_ledger_op(&mut store, &clock, LedgerPolicy::default(), op).unwrap();

        assert_eq!(receipts.len(), 2);
        assert_eq!(store.record("3-1", "Mina").balance, Coins::whole(3));
        assert_eq!(store.record("3-1", "Jun").balance, Coins::whole(6));
        assert_eq!(store.record("3-2", "Hana").balance, Coins::whole(7));
        assert_eq!(store.record("3-1", "Jun").log.entries()[0].kind, ActivityKind::BatchCoinAdjust);
        assert!(store.record("3-2", "Hana").log.is_empty());
        assert_eq!(store.saves, 1);
    }

    #[test]
    fn test_batch_revoke_is_all_or_nothing() {
        let mut store = MemoryStore::with_students(&[("3-1", "Mina", 1), ("3-1", "Jun", 4)]);
        let clock = FixedClock::at(9);

        let op = LedgerOp::BatchAdjust {
            class_id: "3-1".to_string(),
            delta: Coins::whole(-2),
        };
        assert!(apply_ledger_op(&mut store, &clock, LedgerPolicy::default(), op).is_err());
        assert_eq!(store.record("3-1", "Jun").balance, Coins::whole(4));
        assert!(store.record("3-1", "Jun").log.is_empty());
    }

    #[test]
    fn test_batch_reset() {
        let mut store = MemoryStore::with_students(&[("3-1", "Mina", 1), ("3-1", "Jun", 4), ("3-2", "Hana", 7)]);
        let clock = FixedClock::at(9);

        let op = LedgerOp::BatchReset {
            class_id: "3-1".to_string(),
        };
        apply_ledger_op(&mut store, &clock, LedgerPolicy::default(), op).unwrap();

        for name in ["Mina", "Jun"] {
            let record = store.record("3-1", name);
            assert_eq!(record.balance, Coins::ZERO);
            assert_eq!(record.log.len(), 1);
            assert_eq!(record.log.entries()[0].kind, ActivityKind::BatchCoinReset);
        }
        assert_eq!(store.record("3-2", "Hana").balance, Coins::whole(7));
    }

    #[test]
    fn test_set_credential_allows_empty_and_is_not_logged() {
        let mut store = MemoryStore::with_students(&[("3-1", "Mina", 1)]);
        let clock = FixedClock::at(9);

        let op = LedgerOp::SetCredential {
            key: StudentKey::new("3-1", "Mina"),
            credential: String::new(),
        };
        let receipts = apply_ledger_op(&mut store, &clock, LedgerPolicy::default(), op).unwrap();

        assert_eq!(receipts[0].entry, None);
        assert_eq!(store.record("3-1", "Mina").credential, "");
        assert!(store.record("3-1", "Mina").log.is_empty());
    }

    #[test]
    fn test_unknown_student_and_persistence_failure_surface() {
        let mut store = MemoryStore::with_students(&[("3-1", "Mina", 1)]);
        let clock = FixedClock::at(9);

        let err = apply_ledger_op(&mut store, &clock, LedgerPolicy::default(), adjust("3-1", "Nobody", 1)).unwrap_err();
        assert!(matches!(err, CoinError::UnknownStudent { .. }));

        store.fail_saves = true;
        let err = apply_ledger_op(&mut store, &clock, LedgerPolicy::default(), adjust("3-1", "Mina", 1)).unwrap_err();
        assert!(matches!(err, CoinError::PersistenceFailure(_)));
    }
}
