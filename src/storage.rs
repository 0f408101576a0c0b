use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{Duration, NaiveDate, NaiveTime};
use fs2::FileExt;
use log::{debug, warn};
use rand::{Rng, distributions::Alphanumeric, thread_rng};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{ActiveTask, Config, LogEntry, MemoList};

const STATE_FILE: &str = "state.json";
const LOG_FILE: &str = "timelog.json";
const CONFIG_FILE: &str = "config.json";
const MEMO_FILE: &str = "memos.json";
const LOCK_FILE: &str = "timetrack.lock";
const TEMP_SUFFIX_LEN: usize = 8;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode JSON record: {0}")]
    JsonEncode(serde_json::Error),
}

/// The single active-task record. Its presence is the only signal that a
/// task is being tracked.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(STATE_FILE),
        }
    }

    /// Missing, unreadable, corrupt and invalid records all read as "no task".
    pub fn read(&self) -> Option<ActiveTask> {
        let state: ActiveTask = read_json(&self.path)?;
        if let Err(reason) = state.validate() {
            warn!(
                "event=state_read status=invalid path={} reason={reason}",
                self.path.display()
            );
            return None;
        }
        Some(state)
    }

    pub fn write(&self, state: &ActiveTask) -> Result<(), StorageError> {
        write_json(&self.path, state)
    }

    pub fn delete(&self) -> Result<(), StorageError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(StorageError::Io(err)),
        }
    }
}

#[derive(Serialize)]
struct TimeLogRecord<'a> {
    entries: &'a [LogEntry],
}

/// Completed entries, always persisted whole and sorted by start time.
#[derive(Debug, Clone)]
pub struct LogStore {
    path: PathBuf,
}

impl LogStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(LOG_FILE),
        }
    }

    pub fn read(&self) -> Vec<LogEntry> {
        let Some(raw) = read_json::<Value>(&self.path) else {
            return Vec::new();
        };

        let items = match raw {
            Value::Object(mut record) => match record.remove("entries") {
                Some(Value::Array(items)) => items,
                None => Vec::new(),
                Some(_) => {
                    warn!(
                        "event=log_read status=corrupt path={} reason=entries_not_a_list",
                        self.path.display()
                    );
                    return Vec::new();
                }
            },
            Value::Array(items) => items,
            _ => {
                warn!(
                    "event=log_read status=corrupt path={} reason=unexpected_shape",
                    self.path.display()
                );
                return Vec::new();
            }
        };

        let mut entries = Vec::with_capacity(items.len());
        for (index, item) in items.into_iter().enumerate() {
            match decode_entry(item) {
                Ok(entry) => entries.push(entry),
                Err(reason) => warn!(
                    "event=log_read status=skipped_entry index={index} reason={reason}"
                ),
            }
        }

        sort_entries(&mut entries);
        entries
    }

    pub fn write(&self, entries: &mut [LogEntry]) -> Result<(), StorageError> {
        sort_entries(entries);
        write_json(&self.path, &TimeLogRecord { entries })
    }
}

pub fn sort_entries(entries: &mut [LogEntry]) {
    entries.sort_by_key(|entry| entry.start_time);
}

/// Entry shape written before start and end became full timestamps.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LegacyEntry {
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub activity: String,
    pub duration_minutes: u32,
    #[serde(default)]
    pub notes: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StoredEntry {
    Current(LogEntry),
    Legacy(LegacyEntry),
}

/// Decodes one persisted entry in either known shape.
pub fn decode_entry(value: Value) -> Result<LogEntry, String> {
    let entry = match serde_json::from_value::<StoredEntry>(value) {
        Ok(StoredEntry::Current(entry)) => entry,
        Ok(StoredEntry::Legacy(legacy)) => upgrade_legacy_entry(legacy)?,
        Err(err) => return Err(format!("unrecognised entry shape: {err}")),
    };

    if entry.end_time <= entry.start_time {
        return Err(format!(
            "entry {:?} ends at {} but starts at {}",
            entry.activity, entry.end_time, entry.start_time
        ));
    }
    Ok(entry)
}

/// An end time earlier than the start means the entry ran past midnight.
pub fn upgrade_legacy_entry(legacy: LegacyEntry) -> Result<LogEntry, String> {
    let start_time = legacy.date.and_time(legacy.start_time);
    let mut end_time = legacy.date.and_time(legacy.end_time);
    if end_time < start_time {
        end_time = end_time
            .checked_add_signed(Duration::days(1))
            .ok_or_else(|| format!("end time overflows after {}", legacy.date))?;
    }

    Ok(LogEntry {
        start_time,
        end_time,
        activity: legacy.activity,
        duration_minutes: legacy.duration_minutes,
        notes: legacy.notes,
    })
}

#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(CONFIG_FILE),
        }
    }

    pub fn read(&self) -> Config {
        read_json(&self.path).unwrap_or_default()
    }

    pub fn write(&self, config: &Config) -> Result<(), StorageError> {
        write_json(&self.path, config)
    }
}

#[derive(Debug, Clone)]
pub struct MemoStore {
    path: PathBuf,
}

impl MemoStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(MEMO_FILE),
        }
    }

    pub fn read(&self) -> MemoList {
        read_json(&self.path).unwrap_or_default()
    }

    pub fn write(&self, memos: &MemoList) -> Result<(), StorageError> {
        write_json(&self.path, memos)
    }
}

/// Exclusive advisory lock on the data directory, released on drop.
#[derive(Debug)]
pub struct StoreLock {
    file: File,
}

impl StoreLock {
    pub fn acquire(data_dir: &Path) -> Result<Self, StorageError> {
        fs::create_dir_all(data_dir)?;
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(data_dir.join(LOCK_FILE))?;
        FileExt::lock_exclusive(&file)?;
        debug!("event=store_lock status=acquired dir={}", data_dir.display());
        Ok(Self { file })
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == ErrorKind::NotFound => return None,
        Err(err) => {
            warn!(
                "event=store_read status=unreadable path={} error={err}",
                path.display()
            );
            return None;
        }
    };

    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(
                "event=store_read status=corrupt path={} error={err}",
                path.display()
            );
            None
        }
    }
}

/// Writes through a sibling temp file and a rename, so readers never see a
/// half-written record.
fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StorageError> {
    let parent = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;

    let json = serde_json::to_string_pretty(value).map_err(StorageError::JsonEncode)?;
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp_path = parent.join(format!(".{file_name}.{}.tmp", temp_suffix()));

    let written = write_synced(&temp_path, json.as_bytes())
        .and_then(|()| fs::rename(&temp_path, path));
    if let Err(err) = written {
        let _ = fs::remove_file(&temp_path);
        return Err(StorageError::Io(err));
    }

    debug!("event=store_write status=ok path={}", path.display());
    Ok(())
}

fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

fn temp_suffix() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TEMP_SUFFIX_LEN)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use std::fs::{self, OpenOptions};

    use chrono::{NaiveDate, NaiveDateTime};
    use fs2::FileExt;
    use serde_json::json;
    use tempfile::TempDir;

    use crate::domain::{ActiveTask, Config, LogEntry, Memo, MemoList, TaskStatus};

    use super::{
        ConfigStore, LegacyEntry, LogStore, MemoStore, StateStore, StoreLock, decode_entry,
        upgrade_legacy_entry,
    };

    fn at(day: u32, hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 7, day)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    fn entry(activity: &str, start: NaiveDateTime, end: NaiveDateTime) -> LogEntry {
        LogEntry::spanning(activity, start, end).expect("valid entry")
    }

    #[test]
    fn state_round_trips_and_deletes() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::new(dir.path());
        assert!(store.read().is_none());

        let mut state = ActiveTask::new("Write report", at(25, 9, 0));
        state.status = TaskStatus::Paused;
        state.pause_start_time = Some(at(25, 9, 30));
        state.total_paused_seconds = 42.5;
        state.notes.push("first draft".to_string());
        store.write(&state).expect("write should succeed");

        assert_eq!(store.read(), Some(state));
        store.delete().expect("delete should succeed");
        assert!(store.read().is_none());
        store.delete().expect("deleting a missing record is fine");
    }

    #[test]
    fn corrupt_or_invalid_state_reads_as_absent() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::new(dir.path());

        fs::write(dir.path().join("state.json"), "{ not json").unwrap();
        assert!(store.read().is_none());

        fs::write(
            dir.path().join("state.json"),
            r#"{"activity": "  ", "start_time": "2025-07-25T09:00:00"}"#,
        )
        .unwrap();
        assert!(store.read().is_none());

        fs::write(
            dir.path().join("state.json"),
            r#"{"activity": "Read", "start_time": "2025-07-25T09:00:00", "total_paused_seconds": -1.0}"#,
        )
        .unwrap();
        assert!(store.read().is_none());
    }

    #[test]
    fn accepts_state_written_with_fractional_seconds() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("state.json"),
            r#"{
                "activity": "Read",
                "start_time": "2025-07-25T09:00:00.123456",
                "status": "running",
                "pause_start_time": null,
                "total_paused_seconds": 0.0,
                "notes": []
            }"#,
        )
        .unwrap();

        let state = StateStore::new(dir.path()).read().expect("state should parse");
        assert_eq!(state.activity, "Read");
        assert_eq!(state.status, TaskStatus::Running);
    }

    #[test]
    fn log_is_returned_sorted_whatever_the_write_order() {
        let dir = TempDir::new().unwrap();
        let store = LogStore::new(dir.path());
        let mut entries = vec![
            entry("Late", at(25, 15, 0), at(25, 16, 0)),
            entry("Early", at(24, 9, 0), at(24, 10, 0)),
            entry("Middle", at(25, 9, 0), at(25, 9, 45)),
        ];
        store.write(&mut entries).expect("write should succeed");

        let loaded = store.read();
        let names = loaded
            .iter()
            .map(|entry| entry.activity.as_str())
            .collect::<Vec<_>>();
        assert_eq!(names, ["Early", "Middle", "Late"]);
        assert_eq!(loaded, entries);
    }

    #[test]
    fn corrupt_log_reads_as_empty() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("timelog.json"), "[[[").unwrap();
        assert!(LogStore::new(dir.path()).read().is_empty());

        fs::write(dir.path().join("timelog.json"), r#"{"entries": 7}"#).unwrap();
        assert!(LogStore::new(dir.path()).read().is_empty());
    }

    #[test]
    fn decodes_current_and_legacy_entry_shapes() {
        let current = decode_entry(json!({
            "start_time": "2025-07-25T09:00:00",
            "end_time": "2025-07-25T10:15:00",
            "activity": "Standup",
            "duration_minutes": 75,
            "notes": ["note"]
        }))
        .expect("current shape");
        assert_eq!(current.end_time, at(25, 10, 15));
        assert_eq!(current.notes, ["note"]);

        let legacy = decode_entry(json!({
            "date": "2025-07-25",
            "start_time": "09:00:00",
            "end_time": "10:15:00",
            "activity": "Standup",
            "duration_minutes": 75
        }))
        .expect("legacy shape");
        assert_eq!(legacy.start_time, at(25, 9, 0));
        assert_eq!(legacy.end_time, at(25, 10, 15));
        assert!(legacy.notes.is_empty());

        assert!(decode_entry(json!({"activity": "no times"})).is_err());
    }

    #[test]
    fn legacy_entry_past_midnight_ends_next_day() {
        let upgraded = upgrade_legacy_entry(LegacyEntry {
            date: NaiveDate::from_ymd_opt(2025, 7, 25).unwrap(),
            start_time: "23:30:00".parse().unwrap(),
            end_time: "00:15:00".parse().unwrap(),
            activity: "Deploy".to_string(),
            duration_minutes: 45,
            notes: Vec::new(),
        })
        .expect("upgrade should succeed");

        assert_eq!(upgraded.start_time, at(25, 23, 30));
        assert_eq!(upgraded.end_time, at(26, 0, 15));
    }

    #[test]
    fn unreadable_entries_are_skipped_not_fatal() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("timelog.json"),
            json!({
                "entries": [
                    {
                        "date": "2025-07-25",
                        "start_time": "14:00:00",
                        "end_time": "15:00:00",
                        "activity": "Legacy",
                        "duration_minutes": 60
                    },
                    {"date": "25/07/2025", "activity": "Broken"},
                    {
                        "date": "2025-07-25",
                        "start_time": "10:00:00",
                        "end_time": "10:00:00",
                        "activity": "Zero length",
                        "duration_minutes": 0
                    },
                    {
                        "start_time": "2025-07-25T10:00:00",
                        "end_time": "2025-07-25T09:00:00",
                        "activity": "Backwards",
                        "duration_minutes": 60,
                        "notes": []
                    },
                    {
                        "start_time": "2025-07-25T08:00:00",
                        "end_time": "2025-07-25T08:30:00",
                        "activity": "Current",
                        "duration_minutes": 30,
                        "notes": []
                    }
                ]
            })
            .to_string(),
        )
        .unwrap();

        let loaded = LogStore::new(dir.path()).read();
        let names = loaded
            .iter()
            .map(|entry| entry.activity.as_str())
            .collect::<Vec<_>>();
        assert_eq!(names, ["Current", "Legacy"]);
    }

    #[test]
    fn writes_leave_no_temp_files_behind() {
        let dir = TempDir::new().unwrap();
        let store = LogStore::new(dir.path());
        store
            .write(&mut vec![entry("Read", at(25, 9, 0), at(25, 10, 0))])
            .expect("write should succeed");

        let names = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|item| item.ok())
            .map(|item| item.file_name().to_string_lossy().into_owned())
            .collect::<Vec<_>>();
        assert_eq!(names, ["timelog.json"]);
    }

    #[test]
    fn config_and_memos_degrade_to_defaults() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("config.json"), "nope").unwrap();
        fs::write(dir.path().join("memos.json"), "{\"memos\": 3}").unwrap();

        assert_eq!(ConfigStore::new(dir.path()).read(), Config::default());
        assert!(MemoStore::new(dir.path()).read().memos.is_empty());
    }

    #[test]
    fn config_and_memos_round_trip() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.aliases.insert("@w".to_string(), "Work".to_string());
        ConfigStore::new(dir.path()).write(&config).unwrap();
        assert_eq!(ConfigStore::new(dir.path()).read(), config);

        let memos = MemoList {
            memos: vec![Memo {
                text: "call the bank".to_string(),
                created_at: at(25, 8, 0),
            }],
        };
        MemoStore::new(dir.path()).write(&memos).unwrap();
        assert_eq!(MemoStore::new(dir.path()).read().memos, memos.memos);
    }

    #[test]
    fn lock_can_be_reacquired_after_release() {
        let dir = TempDir::new().unwrap();
        let first = StoreLock::acquire(dir.path()).expect("first lock");
        drop(first);
        let _second = StoreLock::acquire(dir.path()).expect("second lock");
    }

    #[test]
    fn held_lock_excludes_other_handles() {
        let dir = TempDir::new().unwrap();
        let guard = StoreLock::acquire(dir.path()).expect("lock");
        let other = OpenOptions::new()
            .read(true)
            .write(true)
            .open(dir.path().join("timetrack.lock"))
            .unwrap();

        assert!(other.try_lock_exclusive().is_err());
        drop(guard);
        other.try_lock_exclusive().expect("lock is free after release");
        FileExt::unlock(&other).unwrap();
    }
}
