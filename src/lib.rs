use spacetimedb::{
    ReducerContext, Identity, Table, Timestamp,
    table, reducer, SpacetimeType, rand::Rng,
};

use chrono::NaiveDateTime;

pub mod activity;
pub mod coins;
pub mod error;
pub mod ledger;
pub mod lottery;
pub mod pool;
pub mod stats;
pub mod store;

// Roster import from the class spreadsheet
mod import;

use activity::{class_time_from_micros, ActivityEntry, ActivityLog, Clock};
use coins::Coins;
use error::CoinError;
use ledger::{apply_ledger_op, LedgerOp, LedgerPolicy};
use lottery::{DrawOutcome, NumberSet, NumberSource, Settlement};
use pool::Ticket;
use stats::{LotteryStats, RewardTally, Winner};
use store::{authenticate, PoolStore, RecordStore, StudentKey, StudentRecord};

// ==================== CONSTANTS ====================

/// Singleton row id of the ledger_config table
const LEDGER_CONFIG_ID: u32 = 0;

/// Singleton row id of the lottery_tally table
const LOTTERY_TALLY_ID: u32 = 0;

/// Settled picks kept per class for the reveal screen; older rows are pruned
const RESULT_HISTORY_PER_CLASS: usize = 100;

// ==================== TABLES ====================

/// One row per student, imported from the class spreadsheet
/// Public: balances and logs are what the dashboard shows. The password lives in student_credential
#[table(name = student, public)]
#[derive(Clone)]
pub struct Student {
    #[primary_key]
    #[auto_inc]
    pub id: u64,

    /// Class grouping key (not unique per student)
    #[index(btree)]
    pub class_id: String,

    /// Unique within class_id
    pub student_name: String,

    /// Balance in half-coin units (the fourth prize pays 0.5)
    pub balance_halves: i64,

    /// Activity log stored as JSON
    /// Example: [{"timestamp": "2025-03-04 09:10:11", "kind": "coin-adjust", "reward": null, "detail": "delta: +5"}]
    pub activity_log: String,
}

/// PRIVATE: plaintext shared secret per student (may be empty)
#[table(name = student_credential)]
pub struct StudentCredential {
    #[primary_key]
    pub student_id: u64,

    pub credential: String,
}

/// Flattened activity logs for the dashboard feed, one row per log entry
/// Kept in step with student.activity_log whenever a record is saved
#[table(name = activity_feed, public)]
#[derive(Clone, Debug, PartialEq)]
pub struct ActivityFeedEntry {
    #[primary_key]
    #[auto_inc]
    pub id: u64,

    #[index(btree)]
    pub student_id: u64,

    pub class_id: String,
    pub student_name: String,

    /// Position in the student's log (0 = oldest)
    pub seq: u32,

    pub timestamp: String,
    pub kind: String,
    pub reward: Option<String>,
    pub detail: String,

    /// Coin adjustment made at or after 17:00 class time
    pub after_hours: bool,
}

/// Live pooled-lottery tickets awaiting the next class draw
/// Rows are deleted as soon as the draw settles them
#[table(name = lottery_ticket, public)]
pub struct LotteryTicket {
    #[primary_key]
    #[auto_inc]
    pub id: u64,

    #[index(btree)]
    pub class_id: String,

    pub student_name: String,

    /// Three distinct numbers in 1..=20, sorted
    pub numbers: Vec<u8>,

    /// Class-time purchase stamp (same format as the activity log)
    pub purchased_at: String,
}

/// Identities allowed to run teacher actions (grants, resets, pool draws, imports)
#[table(name = authorized_teacher)]
pub struct AuthorizedTeacher {
    #[primary_key]
    pub identity: Identity,
}

/// Runtime ledger settings (single row, id = 0)
#[table(name = ledger_config)]
pub struct LedgerConfig {
    #[primary_key]
    pub id: u32,

    /// Whether teacher revokes may drive a balance below zero
    pub allow_negative_balance: bool,
}

/// Settled lottery picks, written at settlement time
/// The client animates the reveal from these rows; nothing here is pending
#[table(name = lottery_result, public)]
#[derive(Clone, Debug, PartialEq)]
pub struct LotteryResult {
    #[primary_key]
    #[auto_inc]
    pub id: u64,

    #[index(btree)]
    pub class_id: String,

    pub student_name: String,

    pub mode: DrawMode,

    /// Pool ticket this result settles (None for instant draws)
    pub ticket_id: Option<u64>,

    pub pick: Vec<u8>,

    pub main_numbers: Vec<u8>,

    /// Only drawn when some pick matched exactly two main numbers
    pub bonus_number: Option<u8>,

    /// "grand-prize" | "second-prize" | "third-prize" | "fourth-prize", None = no prize
    pub reward: Option<String>,

    pub credit_halves: i64,

    /// Balance right after settlement
    pub balance_halves: i64,

    pub drawn_at: Timestamp,
}

#[derive(SpacetimeType, Debug, Clone, PartialEq)]
pub enum DrawMode {
    Instant,
    Pooled,
}

/// Prize counts across every log (single row, id = 0)
#[table(name = lottery_tally, public)]
#[derive(Clone, Debug, PartialEq)]
pub struct LotteryTally {
    #[primary_key]
    pub id: u32,

    pub grand_prize: u32,
    pub second_prize: u32,
    pub third_prize: u32,
    pub fourth_prize: u32,
    pub total: u32,
}

/// Third prize or better, with when it was won
#[table(name = lottery_winner, public)]
#[derive(Clone, Debug, PartialEq)]
pub struct LotteryWinner {
    #[primary_key]
    #[auto_inc]
    pub id: u64,

    pub class_id: String,
    pub student_name: String,
    pub reward: String,

    /// Class-time stamp of the winning log entry
    pub won_at: String,
}

// ==================== HELPER FUNCTIONS ====================

/// Decode a table row (plus its credential) into a ledger record
fn row_to_record(row: &Student, credential: &str) -> Result<StudentRecord, CoinError> {
    let mut record = StudentRecord::new(
        StudentKey::new(row.class_id.clone(), row.student_name.clone()),
        Coins::from_halves(row.balance_halves),
        credential,
    );
    record.log = ActivityLog::decode(&row.activity_log)?;
    Ok(record)
}

/// Every student whose log still decodes, without credentials.
/// Bad rows are logged and skipped so one corrupt cell doesn't blank the statistics.
fn decodable_records(rows: impl Iterator<Item = Student>) -> Vec<StudentRecord> {
    rows.filter_map(|row| match row_to_record(&row, "") {
        Ok(record) => Some(record),
        Err(e) => {
            log::error!("[STATS] skipping student:{}/{} error:{}", row.class_id, row.student_name, e);
            None
        }
    })
    .collect()
}

fn ticket_to_row(ticket: &Ticket) -> LotteryTicket {
    LotteryTicket {
        id: 0, // auto_inc
        class_id: ticket.owner.class_id.clone(),
        student_name: ticket.owner.student_name.clone(),
        numbers: ticket.numbers.numbers().to_vec(),
        purchased_at: ticket.purchased_at.clone(),
    }
}

fn row_to_ticket(row: &LotteryTicket) -> Result<Ticket, CoinError> {
    let numbers = NumberSet::new(&row.numbers)
        .map_err(|e| CoinError::PersistenceFailure(format!("ticket {} unreadable: {}", row.id, e)))?;
    Ok(Ticket {
        ticket_id: row.id,
        owner: StudentKey::new(row.class_id.clone(), row.student_name.clone()),
        numbers,
        purchased_at: row.purchased_at.clone(),
    })
}

fn feed_row(student_id: u64, key: &StudentKey, seq: usize, entry: &ActivityEntry) -> ActivityFeedEntry {
    ActivityFeedEntry {
        id: 0, // auto_inc
        student_id,
        class_id: key.class_id.clone(),
        student_name: key.student_name.clone(),
        seq: seq as u32,
        timestamp: entry.timestamp.clone(),
        kind: entry.kind.as_str().to_string(),
        reward: entry.reward.map(|r| r.as_str().to_string()),
        detail: entry.detail.clone(),
        after_hours: entry.is_after_hours(),
    }
}

/// How many leading feed rows (sorted by seq) still match the log.
/// Logs only grow between resets, so usually this is every existing row.
fn unchanged_prefix(existing: &[ActivityFeedEntry], log: &ActivityLog) -> usize {
    existing
        .iter()
        .zip(log.entries())
        .enumerate()
        .take_while(|(seq, (row, entry))| {
            row.seq as usize == *seq
                && row.timestamp == entry.timestamp
                && row.kind == entry.kind.as_str()
                && row.detail == entry.detail
        })
        .count()
}

/// Bring a student's feed rows in line with their log
fn sync_activity_feed(ctx: &ReducerContext, student_id: u64, record: &StudentRecord) {
    let mut existing: Vec<ActivityFeedEntry> = ctx.db.activity_feed()
        .student_id()
        .filter(&student_id)
        .collect();
    existing.sort_by_key(|r| r.seq);

    let keep = unchanged_prefix(&existing, &record.log);
    for stale in &existing[keep..] {
        ctx.db.activity_feed().id().delete(&stale.id);
    }
    for (seq, entry) in record.log.entries().iter().enumerate().skip(keep) {
        ctx.db.activity_feed().insert(feed_row(student_id, &record.key, seq, entry));
    }
}

fn upsert_credential(ctx: &ReducerContext, student_id: u64, credential: &str) {
    let row = StudentCredential {
        student_id,
        credential: credential.to_string(),
    };
    if ctx.db.student_credential().student_id().find(&student_id).is_some() {
        ctx.db.student_credential().student_id().update(row);
    } else {
        ctx.db.student_credential().insert(row);
    }
}

/// Authorization check: only teachers may mutate other students' records
fn require_teacher(ctx: &ReducerContext, action: &str) -> Result<(), CoinError> {
    if ctx.db.authorized_teacher().identity().find(&ctx.sender).is_none() {
        log::warn!("Unauthorized {} attempt by {}", action, ctx.sender);
        return Err(CoinError::Unauthorized);
    }
    Ok(())
}

fn ledger_policy(ctx: &ReducerContext) -> LedgerPolicy {
    ctx.db.ledger_config()
        .id()
        .find(&LEDGER_CONFIG_ID)
        .map(|c| LedgerPolicy { allow_negative_balance: c.allow_negative_balance })
        .unwrap_or_default()
}

fn result_row(class_id: &str, mode: DrawMode, settlement: &Settlement, outcome: &DrawOutcome, drawn_at: Timestamp) -> LotteryResult {
    LotteryResult {
        id: 0, // auto_inc
        class_id: class_id.to_string(),
        student_name: settlement.key.student_name.clone(),
        mode,
        ticket_id: settlement.ticket_id,
        pick: settlement.pick.numbers().to_vec(),
        main_numbers: outcome.main.numbers().to_vec(),
        bonus_number: outcome.bonus,
        reward: settlement.reward.map(|r| r.as_str().to_string()),
        credit_halves: settlement.credit.halves(),
        balance_halves: settlement.balance.halves(),
        drawn_at,
    }
}

/// Oldest result ids beyond the per-class history limit
fn results_to_prune(mut ids: Vec<u64>, keep: usize) -> Vec<u64> {
    if ids.len() <= keep {
        return Vec::new();
    }
    ids.sort_unstable();
    ids.truncate(ids.len() - keep);
    ids
}

fn record_results(ctx: &ReducerContext, class_id: &str, mode: DrawMode, settlements: &[Settlement], outcome: &DrawOutcome) {
    for settlement in settlements {
        ctx.db.lottery_result().insert(result_row(class_id, mode.clone(), settlement, outcome, ctx.timestamp));
    }

    let ids: Vec<u64> = ctx.db.lottery_result()
        .class_id()
        .filter(&class_id.to_string())
        .map(|r| r.id)
        .collect();
    let pruned = results_to_prune(ids, RESULT_HISTORY_PER_CLASS);
    for id in &pruned {
        ctx.db.lottery_result().id().delete(id);
    }
    if !pruned.is_empty() {
        log::debug!("[LOTTERY] pruned {} old results for class:{}", pruned.len(), class_id);
    }
}

fn tally_row(tally: &RewardTally) -> LotteryTally {
    LotteryTally {
        id: LOTTERY_TALLY_ID,
        grand_prize: tally.grand_prize,
        second_prize: tally.second_prize,
        third_prize: tally.third_prize,
        fourth_prize: tally.fourth_prize,
        total: tally.total(),
    }
}

fn row_to_tally(row: &LotteryTally) -> RewardTally {
    RewardTally {
        grand_prize: row.grand_prize,
        second_prize: row.second_prize,
        third_prize: row.third_prize,
        fourth_prize: row.fourth_prize,
    }
}

fn winner_row(winner: &Winner) -> LotteryWinner {
    LotteryWinner {
        id: 0, // auto_inc
        class_id: winner.key.class_id.clone(),
        student_name: winner.key.student_name.clone(),
        reward: winner.reward.as_str().to_string(),
        won_at: winner.timestamp.clone(),
    }
}

/// Overwrite the tally row and append the new winners
fn publish_stats(ctx: &ReducerContext, stats: &LotteryStats) {
    let row = tally_row(&stats.tally);
    if ctx.db.lottery_tally().id().find(&LOTTERY_TALLY_ID).is_some() {
        ctx.db.lottery_tally().id().update(row);
    } else {
        ctx.db.lottery_tally().insert(row);
    }
    for winner in &stats.winners {
        ctx.db.lottery_winner().insert(winner_row(winner));
    }
}

/// Add one draw's prizes to the published statistics
fn publish_settlements(ctx: &ReducerContext, settlements: &[Settlement], timestamp: &str) {
    let published = ctx.db.lottery_tally()
        .id()
        .find(&LOTTERY_TALLY_ID)
        .map(|row| row_to_tally(&row))
        .unwrap_or_default();
    let mut stats = LotteryStats::starting_from(published);
    stats.record_settlements(settlements, timestamp);
    publish_stats(ctx, &stats);
}

/// Recount the statistics from every log. Needed when logs are replaced or wiped.
fn rebuild_lottery_stats(ctx: &ReducerContext) {
    let records = decodable_records(ctx.db.student().iter());
    let stats = stats::aggregate_stats(&records);

    let stale: Vec<u64> = ctx.db.lottery_winner().iter().map(|w| w.id).collect();
    for id in &stale {
        ctx.db.lottery_winner().id().delete(id);
    }
    publish_stats(ctx, &stats);
    log::info!("[STATS] rebuilt prizes:{} winners:{}", stats.tally.total(), stats.winners.len());
}

// ==================== STORE ADAPTERS ====================

/// Record store and ticket pool backed by this module's tables
/// Reducers are transactions, so every read-modify-write here is isolated
struct TableStore<'a> {
    ctx: &'a ReducerContext,
}

impl TableStore<'_> {
    fn find_row(&self, key: &StudentKey) -> Option<Student> {
        self.ctx.db.student()
            .class_id()
            .filter(&key.class_id)
            .find(|s| s.student_name == key.student_name)
    }

    fn load(&self, row: &Student) -> Result<StudentRecord, CoinError> {
        let credential = self.ctx.db.student_credential()
            .student_id()
            .find(&row.id)
            .map(|c| c.credential)
            .unwrap_or_default();
        row_to_record(row, &credential)
    }
}

impl RecordStore for TableStore<'_> {
    fn find(&self, key: &StudentKey) -> Result<Option<StudentRecord>, CoinError> {
        self.find_row(key).map(|row| self.load(&row)).transpose()
    }

    fn class_members(&self, class_id: &str) -> Result<Vec<StudentRecord>, CoinError> {
        let mut rows: Vec<Student> = self.ctx.db.student()
            .class_id()
            .filter(&class_id.to_string())
            .collect();
        rows.sort_by_key(|s| s.id);
        rows.iter().map(|row| self.load(row)).collect()
    }

    fn save(&mut self, records: &[StudentRecord]) -> Result<(), CoinError> {
        for record in records {
            let mut row = self.find_row(&record.key)
                .ok_or_else(|| CoinError::PersistenceFailure(format!("student {} vanished", record.key)))?;
            row.balance_halves = record.balance.halves();
            row.activity_log = record.log.encode()?;
            let student_id = row.id;
            self.ctx.db.student().id().update(row);
            upsert_credential(self.ctx, student_id, &record.credential);
            sync_activity_feed(self.ctx, student_id, record);
        }
        Ok(())
    }
}

impl PoolStore for TableStore<'_> {
    fn tickets(&self, class_id: &str) -> Result<Vec<Ticket>, CoinError> {
        let mut rows: Vec<LotteryTicket> = self.ctx.db.lottery_ticket()
            .class_id()
            .filter(&class_id.to_string())
            .collect();
        rows.sort_by_key(|t| t.id);
        rows.iter().map(row_to_ticket).collect()
    }

    fn add(&mut self, ticket: Ticket) -> Result<Ticket, CoinError> {
        let row = self.ctx.db.lottery_ticket().insert(ticket_to_row(&ticket));
        Ok(Ticket { ticket_id: row.id, ..ticket })
    }

    fn clear(&mut self, class_id: &str) -> Result<usize, CoinError> {
        let ids: Vec<u64> = self.ctx.db.lottery_ticket()
            .class_id()
            .filter(&class_id.to_string())
            .map(|t| t.id)
            .collect();
        for id in &ids {
            if !self.ctx.db.lottery_ticket().id().delete(id) {
                return Err(CoinError::PersistenceFailure(format!("ticket {} already gone", id)));
            }
        }
        Ok(ids.len())
    }
}

/// Class time of the current reducer call
struct ReducerClock(NaiveDateTime);

impl ReducerClock {
    fn at(timestamp: Timestamp) -> Result<Self, CoinError> {
        Self::from_micros(timestamp.to_micros_since_unix_epoch())
    }

    fn from_micros(micros: i64) -> Result<Self, CoinError> {
        class_time_from_micros(micros).map(ReducerClock).ok_or_else(|| {
            log::error!("[CLOCK] timestamp {} has no class time, refusing to stamp the log", micros);
            CoinError::InvalidTimestamp(micros)
        })
    }
}

impl Clock for ReducerClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}

/// Deterministic per-transaction RNG provided by the host
struct ReducerRng<'a>(&'a ReducerContext);

impl NumberSource for ReducerRng<'_> {
    fn choose(&mut self, candidates: &[u8]) -> u8 {
        let mut rng = self.0.rng();
        candidates[rng.gen_range(0..candidates.len())]
    }
}

// ==================== REDUCERS ====================

#[reducer(init)]
pub fn init(ctx: &ReducerContext) {
    // In init, ctx.sender is the module owner identity
    if ctx.db.authorized_teacher().identity().find(&ctx.sender).is_none() {
        ctx.db.authorized_teacher().insert(AuthorizedTeacher {
            identity: ctx.sender,
        });
    }

    // Negative balances are refused until a teacher opts in
    if ctx.db.ledger_config().id().find(&LEDGER_CONFIG_ID).is_none() {
        ctx.db.ledger_config().insert(LedgerConfig {
            id: LEDGER_CONFIG_ID,
            allow_negative_balance: false,
        });
    }

    if ctx.db.lottery_tally().id().find(&LOTTERY_TALLY_ID).is_none() {
        ctx.db.lottery_tally().insert(tally_row(&RewardTally::default()));
    }

    log::info!("Class coin module initialized successfully");
}

/// Teacher: grant teacher rights to another identity (hex string)
#[reducer]
pub fn authorize_teacher(ctx: &ReducerContext, identity_hex: String) -> Result<(), String> {
    require_teacher(ctx, "authorize_teacher")?;

    let identity = Identity::from_hex(&identity_hex)
        .map_err(|e| format!("Invalid identity hex string: {}", e))?;

    if ctx.db.authorized_teacher().identity().find(&identity).is_none() {
        ctx.db.authorized_teacher().insert(AuthorizedTeacher { identity });
        log::info!("[ADMIN] authorized teacher:{}", &identity_hex[..8.min(identity_hex.len())]);
    }
    Ok(())
}

/// Teacher: choose whether revokes may push balances below zero
#[reducer]
pub fn set_ledger_policy(ctx: &ReducerContext, allow_negative_balance: bool) -> Result<(), String> {
    require_teacher(ctx, "set_ledger_policy")?;

    let config = LedgerConfig {
        id: LEDGER_CONFIG_ID,
        allow_negative_balance,
    };
    if ctx.db.ledger_config().id().find(&LEDGER_CONFIG_ID).is_some() {
        ctx.db.ledger_config().id().update(config);
    } else {
        ctx.db.ledger_config().insert(config);
    }

    log::info!("[ADMIN] ledger policy allow_negative_balance:{}", allow_negative_balance);
    Ok(())
}

/// Shared path for every teacher ledger operation
fn run_ledger_op(ctx: &ReducerContext, action: &str, op: LedgerOp) -> Result<(), String> {
    require_teacher(ctx, action)?;

    let wipes_history = matches!(op, LedgerOp::Reset { .. } | LedgerOp::BatchReset { .. });
    let clock = ReducerClock::at(ctx.timestamp)?;
    let mut store = TableStore { ctx };
    let receipts = apply_ledger_op(&mut store, &clock, ledger_policy(ctx), op)
        .map_err(|e| {
            log::warn!("[LEDGER] {} rejected: {}", action, e);
            e
        })?;

    for receipt in &receipts {
        let detail = receipt.entry.as_ref().map(|e| e.detail.as_str()).unwrap_or("-");
        log::info!("[LEDGER] {} student:{} balance:{} {}", action, receipt.key, receipt.balance, detail);
    }

    // Wiped logs take their prizes with them
    if wipes_history && !receipts.is_empty() {
        rebuild_lottery_stats(ctx);
    }
    Ok(())
}

/// Teacher: grant (positive) or revoke (negative) whole coins, at most 100 either way
#[reducer]
pub fn adjust_coins(ctx: &ReducerContext, class_id: String, student_name: String, delta: i32) -> Result<(), String> {
    let op = LedgerOp::Adjust {
        key: StudentKey::new(class_id, student_name),
        delta: Coins::whole(delta as i64),
    };
    run_ledger_op(ctx, "adjust_coins", op)
}

/// Teacher: zero a student's balance and wipe their log
#[reducer]
pub fn reset_student(ctx: &ReducerContext, class_id: String, student_name: String) -> Result<(), String> {
    let op = LedgerOp::Reset {
        key: StudentKey::new(class_id, student_name),
    };
    run_ledger_op(ctx, "reset_student", op)
}

/// Teacher: same adjustment for every student in a class
#[reducer]
pub fn batch_adjust_coins(ctx: &ReducerContext, class_id: String, delta: i32) -> Result<(), String> {
    let op = LedgerOp::BatchAdjust {
        class_id,
        delta: Coins::whole(delta as i64),
    };
    run_ledger_op(ctx, "batch_adjust_coins", op)
}

/// Teacher: reset every student in a class
#[reducer]
pub fn batch_reset_class(ctx: &ReducerContext, class_id: String) -> Result<(), String> {
    run_ledger_op(ctx, "batch_reset_class", LedgerOp::BatchReset { class_id })
}

/// Teacher: overwrite a student's password (empty allowed)
#[reducer]
pub fn set_credential(ctx: &ReducerContext, class_id: String, student_name: String, credential: String) -> Result<(), String> {
    let op = LedgerOp::SetCredential {
        key: StudentKey::new(class_id, student_name),
        credential,
    };
    run_ledger_op(ctx, "set_credential", op)
}

/// Student: pay one coin and draw immediately against three chosen numbers
#[reducer]
pub fn draw_instant_lottery(
    ctx: &ReducerContext,
    class_id: String,
    student_name: String,
    credential: String,
    numbers: Vec<u8>,
) -> Result<(), String> {
    let key = StudentKey::new(class_id, student_name);
    let mut store = TableStore { ctx };
    authenticate(&store, &key, &credential).map_err(|e| {
        log::warn!("[LOTTERY] instant draw refused student:{} reason:{}", key, e);
        e
    })?;

    let clock = ReducerClock::at(ctx.timestamp)?;
    let draw = lottery::draw_instant_lottery(&mut store, &mut ReducerRng(ctx), &clock, &key, &numbers)
        .map_err(|e| {
            log::warn!("[LOTTERY] instant draw rejected student:{} reason:{}", key, e);
            e
        })?;

    let settled = std::slice::from_ref(&draw.settlement);
    record_results(ctx, &key.class_id, DrawMode::Instant, settled, &draw.outcome);
    publish_settlements(ctx, settled, &draw.entry.timestamp);

    log::info!(
        "[LOTTERY] instant student:{} pick:{} main:{} bonus:{:?} reward:{} balance:{}",
        key,
        draw.settlement.pick,
        draw.outcome.main,
        draw.outcome.bonus,
        draw.settlement.reward.map(|r| r.as_str()).unwrap_or("none"),
        draw.settlement.balance,
    );
    Ok(())
}

/// Student: pay one coin to put a ticket into the class pool
#[reducer]
pub fn purchase_ticket(
    ctx: &ReducerContext,
    class_id: String,
    student_name: String,
    credential: String,
    numbers: Vec<u8>,
) -> Result<(), String> {
    let key = StudentKey::new(class_id, student_name);
    let mut store = TableStore { ctx };
    authenticate(&store, &key, &credential).map_err(|e| {
        log::warn!("[POOL] purchase refused student:{} reason:{}", key, e);
        e
    })?;

    // One adapter serves as both record store and pool
    let mut ticket_pool = TableStore { ctx };
    let clock = ReducerClock::at(ctx.timestamp)?;
    let ticket = pool::purchase_ticket(&mut store, &mut ticket_pool, &clock, &key, &numbers)
        .map_err(|e| {
            log::warn!("[POOL] purchase rejected student:{} reason:{}", key, e);
            e
        })?;

    log::info!("[POOL] ticket:{} student:{} numbers:{}", ticket.ticket_id, key, ticket.numbers);
    Ok(())
}

/// Teacher: draw once for the whole class pool, settle every ticket, empty the pool
#[reducer]
pub fn run_pool_draw(ctx: &ReducerContext, class_id: String) -> Result<(), String> {
    require_teacher(ctx, "run_pool_draw")?;

    let mut store = TableStore { ctx };
    let mut ticket_pool = TableStore { ctx };
    let clock = ReducerClock::at(ctx.timestamp)?;
    let draw = pool::run_pool_draw(&mut store, &mut ticket_pool, &mut ReducerRng(ctx), &clock, &class_id)
        .map_err(|e| {
            log::warn!("[POOL] draw rejected class:{} reason:{}", class_id, e);
            e
        })?;

    record_results(ctx, &class_id, DrawMode::Pooled, &draw.settlements, &draw.outcome);
    publish_settlements(ctx, &draw.settlements, &draw.drawn_at);

    log::info!(
        "[POOL] draw class:{} main:{} bonus:{:?} tickets:{} winners:{}",
        class_id,
        draw.outcome.main,
        draw.outcome.bonus,
        draw.settlements.len(),
        draw.winners().count(),
    );
    Ok(())
}
