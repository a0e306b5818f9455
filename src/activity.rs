//! Per-student activity log.
//!
//! The log is a typed, append-only list in memory. It is flattened to a JSON
//! string only at the storage boundary (the `activity_log` column), which is
//! also where labels written by the old spreadsheet dashboard are mapped onto
//! the canonical tags.

use std::iter::Peekable;
use std::str::Chars;

use chrono::{DateTime, Duration, NaiveDateTime, Timelike};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::CoinError;

/// Class time is fixed at UTC+9. Every timestamp in every log uses it.
pub const CLASS_UTC_OFFSET_HOURS: i64 = 9;

/// Coin adjustments at or after this hour (class time) are flagged in the feed
pub const AFTER_HOURS_START: u32 = 17;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Source of "now" in class time
pub trait Clock {
    fn now(&self) -> NaiveDateTime;

    fn stamp(&self) -> String {
        self.now().format(TIMESTAMP_FORMAT).to_string()
    }
}

/// Convert microseconds since the unix epoch into class time
pub fn class_time_from_micros(micros: i64) -> Option<NaiveDateTime> {
    DateTime::from_timestamp_micros(micros)
        .and_then(|utc| utc.naive_utc().checked_add_signed(Duration::hours(CLASS_UTC_OFFSET_HOURS)))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActivityKind {
    #[serde(alias = "세진코인 변경")]
    CoinAdjust,
    #[serde(alias = "세진코인 초기화")]
    CoinReset,
    BatchCoinAdjust,
    BatchCoinReset,
    CredentialChange,
    #[serde(alias = "로또")]
    LotteryInstantDraw,
    LotteryTicketPurchase,
    LotteryPoolDraw,
}

impl ActivityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityKind::CoinAdjust => "coin-adjust",
            ActivityKind::CoinReset => "coin-reset",
            ActivityKind::BatchCoinAdjust => "batch-coin-adjust",
            ActivityKind::BatchCoinReset => "batch-coin-reset",
            ActivityKind::CredentialChange => "credential-change",
            ActivityKind::LotteryInstantDraw => "lottery-instant-draw",
            ActivityKind::LotteryTicketPurchase => "lottery-ticket-purchase",
            ActivityKind::LotteryPoolDraw => "lottery-pool-draw",
        }
    }

    pub fn is_coin_adjustment(&self) -> bool {
        matches!(self, ActivityKind::CoinAdjust | ActivityKind::BatchCoinAdjust)
    }
}

/// Prize tiers, best first. "No reward" is `Option::None` on the entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Reward {
    #[serde(alias = "치킨")]
    GrandPrize,
    #[serde(alias = "햄버거세트")]
    SecondPrize,
    #[serde(alias = "매점이용권")]
    ThirdPrize,
    #[serde(alias = "0.5코인")]
    FourthPrize,
}

impl Reward {
    pub const ALL: [Reward; 4] = [
        Reward::GrandPrize,
        Reward::SecondPrize,
        Reward::ThirdPrize,
        Reward::FourthPrize,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Reward::GrandPrize => "grand-prize",
            Reward::SecondPrize => "second-prize",
            Reward::ThirdPrize => "third-prize",
            Reward::FourthPrize => "fourth-prize",
        }
    }

    pub fn is_third_or_better(&self) -> bool {
        *self <= Reward::ThirdPrize
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub timestamp: String,
    #[serde(alias = "activity")]
    pub kind: ActivityKind,
    #[serde(default)]
    pub reward: Option<Reward>,
    #[serde(default, alias = "additional_info", deserialize_with = "string_or_null")]
    pub detail: String,
}

fn string_or_null<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl ActivityEntry {
    pub fn new(timestamp: String, kind: ActivityKind, reward: Option<Reward>, detail: impl Into<String>) -> Self {
        Self {
            timestamp,
            kind,
            reward,
            detail: detail.into(),
        }
    }

    /// Coin adjustments made late in the day get highlighted for the teacher
    pub fn is_after_hours(&self) -> bool {
        if !self.kind.is_coin_adjustment() {
            return false;
        }
        NaiveDateTime::parse_from_str(&self.timestamp, TIMESTAMP_FORMAT)
            .map(|t| t.hour() >= AFTER_HOURS_START)
            .unwrap_or(false)
    }
}

/// Append-only sequence of entries. Insertion order is chronological order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActivityLog(Vec<ActivityEntry>);

impl ActivityLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, entry: ActivityEntry) {
        self.0.push(entry);
    }

    pub fn entries(&self) -> &[ActivityEntry] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn last(&self) -> Option<&ActivityEntry> {
        self.0.last()
    }

    /// Only an explicit account reset may drop history
    pub(crate) fn clear(&mut self) {
        self.0.clear();
    }

    pub fn encode(&self) -> Result<String, CoinError> {
        serde_json::to_string(&self.0).map_err(|e| CoinError::PersistenceFailure(format!("encode activity log: {}", e)))
    }

    /// Blank cells decode to an empty log. Cells written by the old dashboard
    /// hold a Python list literal instead of JSON and are accepted too.
    pub fn decode(raw: &str) -> Result<Self, CoinError> {
        if raw.trim().is_empty() {
            return Ok(Self::new());
        }
        match serde_json::from_str(raw) {
            Ok(log) => Ok(log),
            Err(json_err) => {
                let converted = python_literal_to_json(raw).ok_or_else(|| CoinError::CorruptLog(json_err.to_string()))?;
                serde_json::from_str(&converted).map_err(|e| CoinError::CorruptLog(e.to_string()))
            }
        }
    }
}

/// Rewrite a Python literal (`str()` of a list of dicts) as JSON.
/// Strings may use either quote; `None`, `True` and `False` become JSON words.
/// Returns None for anything else that isn't a number or punctuation.
fn python_literal_to_json(raw: &str) -> Option<String> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\'' | '"' => {
                let mut text = String::new();
                loop {
                    match chars.next()? {
                        ch if ch == c => break,
                        '\\' => text.push(match chars.next()? {
                            'n' => '\n',
                            't' => '\t',
                            'r' => '\r',
                            'x' => hex_escape(&mut chars, 2)?,
                            'u' => hex_escape(&mut chars, 4)?,
                            'U' => hex_escape(&mut chars, 8)?,
                            other => other,
                        }),
                        ch => text.push(ch),
                    }
                }
                out.push_str(&serde_json::to_string(&text).ok()?);
            }
            c if c.is_ascii_alphabetic() => {
                let mut word = String::from(c);
                while let Some(&next) = chars.peek() {
                    if !next.is_ascii_alphanumeric() {
                        break;
                    }
                    word.push(next);
                    chars.next();
                }
                out.push_str(match word.as_str() {
                    "None" => "null",
                    "True" => "true",
                    "False" => "false",
                    _ => return None,
                });
            }
            c => out.push(c),
        }
    }
    Some(out)
}

fn hex_escape(chars: &mut Peekable<Chars<'_>>, len: usize) -> Option<char> {
    let digits: String = chars.by_ref().take(len).collect();
    if digits.len() != len {
        return None;
    }
    u32::from_str_radix(&digits, 16).ok().and_then(char::from_u32)
}
