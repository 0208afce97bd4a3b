//! Durable per-direction sync progress.
//!
//! Each [`Direction`] has its own JSON file holding the watermark of the last
//! successful run and the ids of all records already synced. A missing or
//! corrupt file is never fatal: it reads as an empty cursor, which at worst
//! re-fetches records that the id set or the upstream query then filters out.
//!
//! Files are rewritten atomically (temp file + rename) but not locked, so
//! invocations must not overlap.

use crate::{Direction, Result, Tz};
use anyhow::Context;
use chrono::{DateTime, Days, NaiveDateTime, SecondsFormat, TimeDelta, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Lookback used when a direction has never completed a run.
pub const DEFAULT_LOOKBACK_DAYS: u64 = 7;

/// Watermark and dedup set for one direction.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SyncCursor {
    pub last_sync: Option<DateTime<Tz>>,
    pub synced_ids: BTreeSet<String>,
}

impl SyncCursor {
    pub fn is_synced(&self, id: &str) -> bool {
        self.synced_ids.contains(id)
    }

    /// Lower bound for the upstream query of a run ending at `window_end`.
    pub fn window_start(&self, window_end: DateTime<Tz>) -> DateTime<Tz> {
        match self.last_sync {
            Some(last_sync) => last_sync,
            None => window_end
                .checked_sub_days(Days::new(DEFAULT_LOOKBACK_DAYS))
                .unwrap_or_else(|| window_end - TimeDelta::days(DEFAULT_LOOKBACK_DAYS as i64)),
        }
    }
}

/// On-disk layout of a state file.
///
/// Both id lists are present in every file; each direction only uses its own.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub synced_transaction_ids: BTreeSet<String>,
    #[serde(default)]
    pub synced_expense_ids: BTreeSet<String>,
}

impl StateFile {
    /// The id set tracking records already synced in `direction`.
    pub fn ids(&self, direction: Direction) -> &BTreeSet<String> {
        match direction {
            Direction::YnabToSplitwise => &self.synced_transaction_ids,
            Direction::SplitwiseToYnab => &self.synced_expense_ids,
        }
    }

    fn ids_mut(&mut self, direction: Direction) -> &mut BTreeSet<String> {
        match direction {
            Direction::YnabToSplitwise => &mut self.synced_transaction_ids,
            Direction::SplitwiseToYnab => &mut self.synced_expense_ids,
        }
    }
}

pub struct StateStore {
    dir: PathBuf,
    timezone: Tz,
    clock: fn() -> DateTime<Utc>,
}

impl StateStore {
    pub fn new(dir: impl Into<PathBuf>, timezone: Tz) -> Self {
        StateStore {
            dir: dir.into(),
            timezone,
            clock: Utc::now,
        }
    }

    /// Replaces the clock used for `updated_at`.
    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    pub fn path(&self, direction: Direction) -> PathBuf {
        self.dir.join(format!("{}.json", direction.name()))
    }

    /// The persisted cursor, or an empty one if there is no usable state.
    pub fn load_cursor(&self, direction: Direction) -> SyncCursor {
        let file = self.read_lenient(direction);

        let last_sync = file.last_sync_date.as_deref().and_then(|raw| {
            parse_timestamp(raw, self.timezone)
                .inspect_err(|e| {
                    warn!(
                        "Ignoring last sync date in {}: {e}",
                        self.path(direction).display()
                    )
                })
                .ok()
        });
        match last_sync {
            Some(last_sync) => info!("{direction}: last successful sync at {last_sync}"),
            None => info!("{direction}: no previous sync"),
        }

        let synced_ids = match direction {
            Direction::YnabToSplitwise => file.synced_transaction_ids,
            Direction::SplitwiseToYnab => file.synced_expense_ids,
        };
        SyncCursor {
            last_sync,
            synced_ids,
        }
    }

    /// Advances the watermark to `instant`, keeping the id sets.
    ///
    /// A watermark later than `instant` is kept, so the stored value never decreases.
    pub fn save_timestamp(&self, direction: Direction, instant: DateTime<Tz>) -> Result<()> {
        let mut file = self.read_lenient(direction);

        let existing = file
            .last_sync_date
            .as_deref()
            .and_then(|raw| parse_timestamp(raw, self.timezone).ok());
        let watermark = match existing {
            Some(existing) if existing > instant => {
                warn!("{direction}: keeping later watermark {existing} instead of {instant}");
                existing
            }
            _ => instant.with_timezone(&self.timezone),
        };

        file.last_sync_date = Some(format_timestamp(watermark));
        self.write(direction, file)?;
        info!("{direction}: saved last sync date {watermark}");
        Ok(())
    }

    /// Adds ids to the direction's synced set.
    pub fn mark_synced<I, S>(&self, direction: Direction, ids: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut file = self.read_lenient(direction);

        let synced = file.ids_mut(direction);
        let before = synced.len();
        synced.extend(ids.into_iter().map(Into::into));
        let added = synced.len() - before;

        self.write(direction, file)?;
        info!("{direction}: marked {added} record(s) as synced");
        Ok(())
    }

    /// See [`SyncCursor::window_start`].
    pub fn compute_window_start(
        &self,
        direction: Direction,
        window_end: DateTime<Tz>,
    ) -> DateTime<Tz> {
        self.load_cursor(direction).window_start(window_end)
    }

    /// The raw state file, `None` if it does not exist.
    pub fn snapshot(&self, direction: Direction) -> Result<Option<StateFile>> {
        let path = self.path(direction);
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read sync state {}", path.display()));
            }
        };
        let file = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse sync state {}", path.display()))?;
        Ok(Some(file))
    }

    fn read_lenient(&self, direction: Direction) -> StateFile {
        match self.snapshot(direction) {
            Ok(Some(file)) => file,
            Ok(None) => {
                debug!("{} does not exist yet", self.path(direction).display());
                StateFile::default()
            }
            Err(e) => {
                warn!("{e:#}. Treating as no previous sync.");
                StateFile::default()
            }
        }
    }

    fn write(&self, direction: Direction, mut file: StateFile) -> Result<()> {
        let now = (self.clock)().with_timezone(&self.timezone);
        file.updated_at = Some(format_timestamp(now));

        let path = self.path(direction);
        let temp_path = path.with_extension("json.tmp");
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create state directory {}", self.dir.display()))?;

        let contents = serde_json::to_string_pretty(&file).context("Failed to serialize sync state")?;
        std::fs::write(&temp_path, contents)
            .with_context(|| format!("Failed to write {}", temp_path.display()))?;
        std::fs::rename(&temp_path, &path)
            .with_context(|| format!("Failed to replace {}", path.display()))?;
        Ok(())
    }
}

fn format_timestamp(instant: DateTime<Tz>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Micros, false)
}

/// ISO-8601 instant; values without an offset are taken to be in `timezone`.
fn parse_timestamp(raw: &str, timezone: Tz) -> Result<DateTime<Tz>, String> {
    if let Ok(instant) = DateTime::parse_from_rfc3339(raw) {
        return Ok(instant.with_timezone(&timezone));
    }

    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map_err(|e| format!("'{raw}' is not an ISO-8601 timestamp: {e}"))?;
    timezone
        .from_local_datetime(&naive)
        .earliest()
        .ok_or_else(|| format!("'{raw}' does not exist in {timezone}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::Australia::Sydney;
    use std::path::Path;

    const DIRECTION: Direction = Direction::SplitwiseToYnab;

    fn fixed_clock() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 8, 2, 0, 0).unwrap()
    }

    fn store(dir: &Path) -> StateStore {
        StateStore::new(dir, Sydney).with_clock(fixed_clock)
    }

    fn sydney(y: i32, m: u32, d: u32, h: u32) -> DateTime<Tz> {
        Sydney.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn missing_file_is_empty_cursor() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(store(dir.path()).load_cursor(DIRECTION), SyncCursor::default());
    }

    #[test]
    fn corrupt_file_is_empty_cursor() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        for contents in ["", "{not json", "[1, 2, 3]", r#"{"synced_expense_ids": 5}"#] {
            std::fs::write(store.path(DIRECTION), contents).unwrap();
            assert_eq!(store.load_cursor(DIRECTION), SyncCursor::default());
        }
    }

    #[test]
    fn default_lookback_is_seven_days() {
        let dir = tempfile::tempdir().unwrap();
        let window_end = sydney(2024, 6, 8, 0);
        assert_eq!(
            store(dir.path()).compute_window_start(DIRECTION, window_end),
            sydney(2024, 6, 1, 0)
        );
    }

    #[test]
    fn window_starts_at_last_sync() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        store.save_timestamp(DIRECTION, sydney(2024, 6, 5, 21)).unwrap();
        assert_eq!(
            store.compute_window_start(DIRECTION, sydney(2024, 6, 8, 0)),
            sydney(2024, 6, 5, 21)
        );
    }

    #[test]
    fn save_timestamp_preserves_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        store.mark_synced(DIRECTION, ["3001", "3002"]).unwrap();
        store.save_timestamp(DIRECTION, sydney(2024, 6, 8, 9)).unwrap();

        let cursor = store.load_cursor(DIRECTION);
        assert_eq!(cursor.last_sync, Some(sydney(2024, 6, 8, 9)));
        assert!(cursor.is_synced("3001"));
        assert!(cursor.is_synced("3002"));
    }

    #[test]
    fn watermark_never_moves_backwards() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        store.save_timestamp(DIRECTION, sydney(2024, 6, 8, 9)).unwrap();
        store.save_timestamp(DIRECTION, sydney(2024, 6, 7, 9)).unwrap();
        assert_eq!(
            store.load_cursor(DIRECTION).last_sync,
            Some(sydney(2024, 6, 8, 9))
        );
    }

    #[test]
    fn mark_synced_unions_and_keeps_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        store.save_timestamp(DIRECTION, sydney(2024, 6, 8, 9)).unwrap();
        store.mark_synced(DIRECTION, ["a", "b"]).unwrap();
        store.mark_synced(DIRECTION, ["b", "c"]).unwrap();

        let cursor = store.load_cursor(DIRECTION);
        assert_eq!(cursor.last_sync, Some(sydney(2024, 6, 8, 9)));
        assert_eq!(
            cursor.synced_ids.iter().map(String::as_str).collect::<Vec<_>>(),
            ["a", "b", "c"]
        );
    }

    #[test]
    fn mark_synced_with_no_ids_only_touches_updated_at() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        store.mark_synced(DIRECTION, Vec::<String>::new()).unwrap();

        let file = store.snapshot(DIRECTION).unwrap().unwrap();
        assert_eq!(
            file,
            StateFile {
                last_sync_date: None,
                updated_at: Some("2024-06-08T12:00:00.000000+10:00".into()),
                synced_transaction_ids: BTreeSet::new(),
                synced_expense_ids: BTreeSet::new(),
            }
        );
    }

    #[test]
    fn directions_are_tracked_separately() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        store.mark_synced(Direction::SplitwiseToYnab, ["3001"]).unwrap();
        store.mark_synced(Direction::YnabToSplitwise, ["t-1"]).unwrap();
        store
            .save_timestamp(Direction::YnabToSplitwise, sydney(2024, 6, 8, 9))
            .unwrap();

        let to_ynab = store.load_cursor(Direction::SplitwiseToYnab);
        assert_eq!(to_ynab.last_sync, None);
        assert!(to_ynab.is_synced("3001"));
        assert!(!to_ynab.is_synced("t-1"));

        let to_splitwise = store.load_cursor(Direction::YnabToSplitwise);
        assert!(to_splitwise.is_synced("t-1"));
        assert!(!to_splitwise.is_synced("3001"));
    }

    #[test]
    fn state_file_layout() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        store.mark_synced(DIRECTION, ["3002", "3001"]).unwrap();
        store.save_timestamp(DIRECTION, sydney(2024, 6, 8, 9)).unwrap();

        let contents = std::fs::read_to_string(store.path(DIRECTION)).unwrap();
        insta::assert_snapshot!(contents, @r#"
        {
          "last_sync_date": "2024-06-08T09:00:00.000000+10:00",
          "updated_at": "2024-06-08T12:00:00.000000+10:00",
          "synced_transaction_ids": [],
          "synced_expense_ids": [
            "3001",
            "3002"
          ]
        }
        "#);
        assert!(!store.path(DIRECTION).with_extension("json.tmp").exists());
    }

    #[test]
    fn reads_state_written_with_unordered_lists_and_naive_dates() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        std::fs::write(
            store.path(DIRECTION),
            r#"{
              "last_sync_date": "2024-06-08T09:30:00.123456",
              "synced_expense_ids": ["9", "10", "9"]
            }"#,
        )
        .unwrap();

        let cursor = store.load_cursor(DIRECTION);
        assert_eq!(
            cursor.last_sync,
            Some(
                Sydney
                    .with_ymd_and_hms(2024, 6, 8, 9, 30, 0)
                    .unwrap()
                    .checked_add_signed(TimeDelta::microseconds(123456))
                    .unwrap()
            )
        );
        assert_eq!(cursor.synced_ids.len(), 2);
    }

    #[test]
    fn invalid_last_sync_date_keeps_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        std::fs::write(
            store.path(DIRECTION),
            r#"{ "last_sync_date": "yesterday", "synced_expense_ids": ["1"] }"#,
        )
        .unwrap();

        let cursor = store.load_cursor(DIRECTION);
        assert_eq!(cursor.last_sync, None);
        assert!(cursor.is_synced("1"));
    }

    #[test]
    fn corrupt_file_is_replaced_on_save() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        std::fs::write(store.path(DIRECTION), "{truncated").unwrap();
        store.save_timestamp(DIRECTION, sydney(2024, 6, 8, 9)).unwrap();
        assert_eq!(
            store.load_cursor(DIRECTION).last_sync,
            Some(sydney(2024, 6, 8, 9))
        );
    }

    #[test]
    fn offsets_are_converted_to_the_configured_timezone() {
        let parsed = parse_timestamp("2024-06-07T23:00:00+00:00", Sydney).unwrap();
        assert_eq!(parsed, sydney(2024, 6, 8, 9));
        assert!(parse_timestamp("2024-13-01T00:00:00", Sydney).is_err());
    }
}
