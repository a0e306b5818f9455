// Roster import from the class spreadsheet
// Accepts a JSON array of sheet rows; both the English column names and the
// original Korean headers (반, 학생, 세진코인, 비밀번호, 기록) are understood.

use spacetimedb::{reducer, ReducerContext, log, Table};
use crate::{rebuild_lottery_stats, require_teacher, sync_activity_feed, upsert_credential, Student, student};
use crate::activity::ActivityLog;
use crate::coins::Coins;
use crate::error::CoinError;
use crate::store::{StudentKey, StudentRecord};
use serde_json::Value;

/// Look up the first present column among its aliases
fn column<'a>(row: &'a Value, names: &[&str]) -> Option<&'a Value> {
    names.iter().find_map(|n| row.get(*n)).filter(|v| !v.is_null())
}

/// Sheet cells come back as strings or numbers depending on content
fn cell_text(val: &Value) -> Option<String> {
    match val {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn parse_balance(val: &Value) -> Option<Coins> {
    match val {
        Value::Number(n) => n.as_f64().and_then(Coins::from_f64),
        Value::String(s) => s.trim().parse::<f64>().ok().and_then(Coins::from_f64),
        _ => None,
    }
}

/// The log column is normally a serialized string, but an inline array is fine too
fn parse_log(val: Option<&Value>) -> Result<ActivityLog, CoinError> {
    match val {
        None => Ok(ActivityLog::new()),
        Some(Value::String(s)) => ActivityLog::decode(s),
        Some(v @ Value::Array(_)) => {
            serde_json::from_value(v.clone()).map_err(|e| CoinError::CorruptLog(e.to_string()))
        }
        Some(_) => Err(CoinError::CorruptLog("expected string or array".to_string())),
    }
}

/// Parse one sheet row into a record
fn parse_row(i: usize, row: &Value) -> Result<StudentRecord, CoinError> {
    let missing = |field: &str| CoinError::InvalidImport(format!("Row {}: missing {}", i, field));

    let class_id = column(row, &["class_id", "반"])
        .and_then(cell_text)
        .ok_or_else(|| missing("class_id"))?;
    let student_name = column(row, &["student_name", "학생"])
        .and_then(cell_text)
        .ok_or_else(|| missing("student_name"))?;
    let balance = column(row, &["balance", "세진코인"])
        .ok_or_else(|| missing("balance"))
        .and_then(|v| {
            parse_balance(v).ok_or_else(|| CoinError::InvalidImport(format!("Row {}: invalid balance {}", i, v)))
        })?;
    let credential = column(row, &["credential", "비밀번호"])
        .and_then(cell_text)
        .unwrap_or_default();
    let log = parse_log(column(row, &["activity_log", "기록"]))
        .map_err(|e| CoinError::InvalidImport(format!("Row {}: {}", i, e)))?;

    let mut record = StudentRecord::new(StudentKey::new(class_id, student_name), balance, credential);
    record.log = log;
    Ok(record)
}

/// Parse the whole roster. Fails on the first bad row so nothing is half-imported.
pub fn parse_roster(json_data: &str) -> Result<Vec<StudentRecord>, CoinError> {
    let data: Value = serde_json::from_str(json_data)
        .map_err(|e| CoinError::InvalidImport(format!("Invalid JSON: {}", e)))?;

    let rows = data.as_array()
        .ok_or_else(|| CoinError::InvalidImport("Expected JSON array of students".to_string()))?;

    let mut records: Vec<StudentRecord> = Vec::with_capacity(rows.len());
    for (i, row) in rows.iter().enumerate() {
        let record = parse_row(i, row)?;
        if records.iter().any(|r| r.key == record.key) {
            return Err(CoinError::InvalidImport(format!("Row {}: duplicate student {}", i, record.key)));
        }
        records.push(record);
    }
    Ok(records)
}

/// Bulk import students from the class spreadsheet
/// Existing (class, name) rows are replaced, new ones inserted
/// Protected by authorization check - only teachers can call this
#[reducer]
pub fn bulk_import_students(ctx: &ReducerContext, json_data: String) -> Result<(), String> {
    require_teacher(ctx, "bulk_import_students")?;

    let records = parse_roster(&json_data)?;

    let mut inserted = 0;
    let mut replaced = 0;
    for record in &records {
        let activity_log = record.log.encode()?;
        let existing = ctx.db.student()
            .class_id()
            .filter(&record.key.class_id)
            .find(|s| s.student_name == record.key.student_name);

        let student_id = match existing {
            Some(mut row) => {
                row.balance_halves = record.balance.halves();
                row.activity_log = activity_log;
                let id = row.id;
                ctx.db.student().id().update(row);
                replaced += 1;
                id
            }
            None => {
                let row = ctx.db.student().insert(Student {
                    id: 0, // auto_inc
                    class_id: record.key.class_id.clone(),
                    student_name: record.key.student_name.clone(),
                    balance_halves: record.balance.halves(),
                    activity_log,
                });
                inserted += 1;
                row.id
            }
        };
        upsert_credential(ctx, student_id, &record.credential);
        sync_activity_feed(ctx, student_id, record);
    }

    // Imported logs may carry prizes won before the import
    rebuild_lottery_stats(ctx);

    log::info!("[IMPORT] students inserted:{} replaced:{}", inserted, replaced);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::{ActivityKind, Reward};

    #[test]
    fn test_parse_korean_headers() {
        let json = r#"[
            {"반": "3-1", "학생": "Mina", "세진코인": 4, "비밀번호": 1234,
             "기록": "[{\"timestamp\": \"2025-03-04 10:00:00\", \"activity\": \"로또\", \"reward\": \"치킨\", \"additional_info\": null}]"},
            {"반": 2, "학생": "Jun", "세진코인": "2.5", "비밀번호": "", "기록": "[]"}
        ]"#;
        let records = parse_roster(json).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].key, StudentKey::new("3-1", "Mina"));
        assert_eq!(records[0].balance, Coins::whole(4));
        assert_eq!(records[0].credential, "1234");
        assert_eq!(records[0].log.entries()[0].kind, ActivityKind::LotteryInstantDraw);
        assert_eq!(records[0].log.entries()[0].reward, Some(Reward::GrandPrize));
        assert_eq!(records[1].key.class_id, "2");
        assert_eq!(records[1].balance, Coins::from_halves(5));
        assert!(records[1].log.is_empty());
    }

    #[test]
    fn test_parse_sheet_log_written_as_python_list() {
        let json = r#"[{"반": "3-1", "학생": "Mina", "세진코인": 5, "비밀번호": "",
            "기록": "[{'timestamp': '2025-03-04 09:10:11', 'activity': '세진코인 변경', 'reward': None, 'additional_info': '변경된 코인: 5'}, {'timestamp': '2025-03-04 10:00:00', 'activity': '로또', 'reward': '0.5코인', 'additional_info': '당첨번호: [2, 7, 19]'}]"}]"#;
        let records = parse_roster(json).unwrap();

        let log = &records[0].log;
        assert_eq!(log.len(), 2);
        assert_eq!(log.entries()[0].kind, ActivityKind::CoinAdjust);
        assert_eq!(log.entries()[0].reward, None);
        assert_eq!(log.entries()[0].detail, "변경된 코인: 5");
        assert_eq!(log.entries()[1].kind, ActivityKind::LotteryInstantDraw);
        assert_eq!(log.entries()[1].reward, Some(Reward::FourthPrize));
    }

    #[test]
    fn test_parse_english_headers_with_inline_log() {
        let json = r#"[{"class_id": "3-1", "student_name": "Hana", "balance": 0,
            "activity_log": [{"timestamp": "2025-03-04 10:00:00", "kind": "coin-adjust", "reward": null, "detail": "delta: +1"}]}]"#;
        let records = parse_roster(json).unwrap();
        assert_eq!(records[0].credential, "");
        assert_eq!(records[0].log.len(), 1);
    }

    #[test]
    fn test_rejects_bad_rows() {
        assert!(matches!(parse_roster("{}"), Err(CoinError::InvalidImport(_))));
        assert!(matches!(
            parse_roster(r#"[{"class_id": "3-1", "balance": 1}]"#),
            Err(CoinError::InvalidImport(_))
        ));
        assert!(matches!(
            parse_roster(r#"[{"class_id": "3-1", "student_name": "A", "balance": 0.3}]"#),
            Err(CoinError::InvalidImport(_))
        ));
        assert!(matches!(
            parse_roster(r#"[{"class_id": "3-1", "student_name": "A", "balance": 1, "activity_log": "[{"}]"#),
            Err(CoinError::InvalidImport(_))
        ));
        let dup = r#"[{"class_id": "3-1", "student_name": "A", "balance": 1},
                      {"class_id": "3-1", "student_name": "A", "balance": 2}]"#;
        assert!(matches!(parse_roster(dup), Err(CoinError::InvalidImport(_))));
    }
}
