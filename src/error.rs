use std::fmt;

use crate::coins::Coins;

/// Every way a ledger or lottery action can be refused.
/// All variants are user-visible; none of them is fatal to the module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoinError {
    /// Zero or out-of-bounds coin adjustment
    InvalidAmount(Coins),
    /// Wrong count, out of range or repeated numbers
    InvalidPick(String),
    InsufficientBalance { balance: Coins, required: Coins },
    DuplicateTicket,
    EmptyPool(String),
    /// Store write failed after validation passed
    PersistenceFailure(String),
    UnknownStudent { class_id: String, student_name: String },
    CredentialMismatch,
    Unauthorized,
    /// Serialized activity log could not be parsed
    CorruptLog(String),
    InvalidImport(String),
    /// Host timestamp (micros since epoch) that can't be placed in class time
    InvalidTimestamp(i64),
}

impl fmt::Display for CoinError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoinError::InvalidAmount(amount) => write!(f, "Invalid coin amount: {}", amount),
            CoinError::InvalidPick(reason) => write!(f, "Invalid pick: {}", reason),
            CoinError::InsufficientBalance { balance, required } => {
                write!(f, "Insufficient balance: have {}, need {}", balance, required)
            }
            CoinError::DuplicateTicket => {
                write!(f, "A ticket with the same numbers is already in the pool")
            }
            CoinError::EmptyPool(class_id) => write!(f, "No tickets in the pool for class {}", class_id),
            CoinError::PersistenceFailure(reason) => write!(f, "Failed to persist: {}", reason),
            CoinError::UnknownStudent { class_id, student_name } => {
                write!(f, "Student {} not found in class {}", student_name, class_id)
            }
            CoinError::CredentialMismatch => write!(f, "Wrong password"),
            CoinError::Unauthorized => write!(f, "Unauthorized"),
            CoinError::CorruptLog(reason) => write!(f, "Corrupt activity log: {}", reason),
            CoinError::InvalidImport(reason) => write!(f, "Invalid import: {}", reason),
            CoinError::InvalidTimestamp(micros) => write!(f, "Timestamp out of range: {}", micros),
        }
    }
}

impl std::error::Error for CoinError {}

impl From<CoinError> for String {
    fn from(err: CoinError) -> Self {
        err.to_string()
    }
}
