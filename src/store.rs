//! Record and ticket-pool storage seams.
//!
//! Ledger and lottery code only talk to these traits. The module implements
//! them over SpacetimeDB tables (see `lib.rs`); tests use the in-memory
//! doubles in `testing`.

use std::fmt;

use crate::activity::ActivityLog;
use crate::coins::Coins;
use crate::error::CoinError;
use crate::pool::Ticket;

/// Students are identified by class and name. Names are unique within a class.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StudentKey {
    pub class_id: String,
    pub student_name: String,
}

impl StudentKey {
    pub fn new(class_id: impl Into<String>, student_name: impl Into<String>) -> Self {
        Self {
            class_id: class_id.into(),
            student_name: student_name.into(),
        }
    }
}

impl fmt::Display for StudentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.class_id, self.student_name)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StudentRecord {
    pub key: StudentKey,
    pub balance: Coins,
    /// Plaintext shared secret, may be empty
    pub credential: String,
    pub log: ActivityLog,
}

impl StudentRecord {
    pub fn new(key: StudentKey, balance: Coins, credential: impl Into<String>) -> Self {
        Self {
            key,
            balance,
            credential: credential.into(),
            log: ActivityLog::new(),
        }
    }

    pub fn check_credential(&self, given: &str) -> Result<(), CoinError> {
        if self.credential == given {
            Ok(())
        } else {
            Err(CoinError::CredentialMismatch)
        }
    }
}

pub trait RecordStore {
    fn find(&self, key: &StudentKey) -> Result<Option<StudentRecord>, CoinError>;

    /// Every record of a class, in a stable order
    fn class_members(&self, class_id: &str) -> Result<Vec<StudentRecord>, CoinError>;

    /// Write back records that already exist in the store
    fn save(&mut self, records: &[StudentRecord]) -> Result<(), CoinError>;

    fn require(&self, key: &StudentKey) -> Result<StudentRecord, CoinError> {
        self.find(key)?.ok_or_else(|| CoinError::UnknownStudent {
            class_id: key.class_id.clone(),
            student_name: key.student_name.clone(),
        })
    }
}

/// Live tickets, grouped by class
pub trait PoolStore {
    fn tickets(&self, class_id: &str) -> Result<Vec<Ticket>, CoinError>;

    /// Stores the ticket and returns it with its assigned id
    fn add(&mut self, ticket: Ticket) -> Result<Ticket, CoinError>;

    /// Empties the class pool, returning how many tickets were removed
    fn clear(&mut self, class_id: &str) -> Result<usize, CoinError>;
}

/// Gate for student-facing actions
pub fn authenticate<S: RecordStore>(store: &S, key: &StudentKey, credential: &str) -> Result<StudentRecord, CoinError> {
    let record = store.require(key)?;
    record.check_credential(credential)?;
    Ok(record)
}
