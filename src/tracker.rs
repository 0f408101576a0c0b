use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime};
use log::{info, warn};

use crate::domain::{
    ALIAS_MARKER, ActiveTask, LogEntry, Memo, TaskStatus, format_minutes, next_activity_name,
    parse_duration, seconds_between, seconds_to_minutes,
};
use crate::export::{ExportFormat, export_log};
use crate::report::{locate_entry, render_day, resolve_day};
use crate::storage::{ConfigStore, LogStore, MemoStore, StateStore, StorageError};
use crate::timeparse::parse_when;

const STAMP_FORMAT: &str = "%Y-%m-%d %H:%M";

/// What every tracker operation reports back. The message is meant to be
/// printed as-is whether or not the operation succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub success: bool,
    pub message: String,
}

impl Outcome {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// How a retroactive entry's end is given: an explicit time, or a duration
/// counted from its start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryEnd {
    At(String),
    For(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryChanges {
    pub activity: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
}

impl EntryChanges {
    pub fn is_empty(&self) -> bool {
        self.activity.is_none() && self.start.is_none() && self.end.is_none()
    }

    fn touches_times(&self) -> bool {
        self.start.is_some() || self.end.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoRequest {
    Add(String),
    Remove(usize),
    List,
}

/// Drives the active task and the log. Validation problems come back as a
/// failed [`Outcome`] with nothing written; only storage write failures are
/// returned as errors.
#[derive(Debug, Clone)]
pub struct Tracker {
    state: StateStore,
    log: LogStore,
    config: ConfigStore,
    memos: MemoStore,
}

impl Tracker {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            state: StateStore::new(data_dir),
            log: LogStore::new(data_dir),
            config: ConfigStore::new(data_dir),
            memos: MemoStore::new(data_dir),
        }
    }

    pub fn start(
        &self,
        activity: &str,
        force: bool,
        now: NaiveDateTime,
    ) -> Result<Outcome, StorageError> {
        let activity = match self.resolve_activity(activity) {
            Ok(activity) => activity,
            Err(message) => return Ok(Outcome::fail(message)),
        };

        let mut messages = Vec::new();
        if let Some(current) = self.state.read() {
            if !force {
                return Ok(Outcome::fail(format!(
                    "Error: A task is already running: '{}'. Use --force to stop it and start a new one.",
                    current.activity
                )));
            }

            let stopped = self.stop(now)?;
            if stopped.success {
                messages.push(stopped.message);
            } else {
                // The task cannot be logged, so forcing drops it.
                self.state.delete()?;
                warn!(
                    "event=task_discard activity={:?} reason={:?}",
                    current.activity, stopped.message
                );
                messages.push(stopped.message);
                messages.push(format!(
                    "Discarded '{}' without logging it.",
                    current.activity
                ));
            }
        }

        messages.push(self.begin(activity, now)?.message);
        Ok(Outcome::ok(messages.join("\n")))
    }

    pub fn stop(&self, now: NaiveDateTime) -> Result<Outcome, StorageError> {
        let Some(state) = self.state.read() else {
            return Ok(Outcome::fail("No task is currently running."));
        };

        // A paused task ended when it was paused.
        let end_time = match (state.status, state.pause_start_time) {
            (TaskStatus::Running, _) => now,
            (TaskStatus::Paused, Some(pause_start)) => pause_start,
            (TaskStatus::Paused, None) => return Ok(Outcome::fail(missing_pause_start(&state))),
        };
        if end_time <= state.start_time {
            return Ok(Outcome::fail(format!(
                "Error: Task '{}' would end at {}, before it started at {}. Check the system clock; nothing was changed. Use 'start --force' to discard it.",
                state.activity,
                end_time.format(STAMP_FORMAT),
                state.start_time.format(STAMP_FORMAT)
            )));
        }

        let duration_minutes = seconds_to_minutes(state.active_seconds_at(end_time));
        let entry = LogEntry {
            start_time: state.start_time,
            end_time,
            activity: state.activity,
            duration_minutes,
            notes: state.notes,
        };
        let message = format!(
            "Stopped tracking '{}'. Logged {}.",
            entry.activity,
            format_minutes(u64::from(duration_minutes))
        );
        info!(
            "event=task_stop activity={:?} duration_minutes={duration_minutes}",
            entry.activity
        );

        // The log is written before the state is deleted. If the delete fails,
        // the next stop finds its entry already logged and only clears the state.
        let mut entries = self.log.read();
        let already_logged = entries.iter().any(|logged| {
            logged.start_time == entry.start_time && logged.activity == entry.activity
        });
        if already_logged {
            warn!(
                "event=task_stop status=duplicate activity={:?} start={}",
                entry.activity, entry.start_time
            );
        } else {
            entries.push(entry);
            self.log.write(&mut entries)?;
        }
        self.state.delete()?;

        Ok(Outcome::ok(message))
    }

    pub fn pause(&self, now: NaiveDateTime) -> Result<Outcome, StorageError> {
        let Some(mut state) = self.state.read() else {
            return Ok(Outcome::fail("No task is running to pause."));
        };
        if state.is_paused() {
            return Ok(Outcome::fail(format!(
                "Task '{}' is already paused.",
                state.activity
            )));
        }

        let active_minutes = seconds_to_minutes(state.active_seconds_at(now));
        state.status = TaskStatus::Paused;
        state.pause_start_time = Some(now);
        self.state.write(&state)?;
        info!("event=task_pause activity={:?}", state.activity);

        Ok(Outcome::ok(format!(
            "Paused '{}' after {} of active time.",
            state.activity,
            format_minutes(u64::from(active_minutes))
        )))
    }

    pub fn resume(&self, now: NaiveDateTime) -> Result<Outcome, StorageError> {
        let Some(mut state) = self.state.read() else {
            return Ok(Outcome::fail("No task is paused to resume."));
        };
        if !state.is_paused() {
            return Ok(Outcome::fail(format!(
                "Task '{}' is already running.",
                state.activity
            )));
        }
        let Some(pause_start) = state.pause_start_time else {
            return Ok(Outcome::fail(missing_pause_start(&state)));
        };

        state.total_paused_seconds += seconds_between(pause_start, now).max(0.0);
        state.status = TaskStatus::Running;
        state.pause_start_time = None;
        self.state.write(&state)?;
        info!(
            "event=task_resume activity={:?} total_paused_seconds={:.0}",
            state.activity, state.total_paused_seconds
        );

        let active_minutes = seconds_to_minutes(state.active_seconds_at(now));
        Ok(Outcome::ok(format!(
            "Resumed tracking '{}' ({} active so far).",
            state.activity,
            format_minutes(u64::from(active_minutes))
        )))
    }

    pub fn status(&self, now: NaiveDateTime) -> Outcome {
        let Some(state) = self.state.read() else {
            return Outcome::ok("No task is currently running.");
        };

        let active = format_minutes(u64::from(seconds_to_minutes(state.active_seconds_at(now))));
        let mut lines = match (state.status, state.pause_start_time) {
            (TaskStatus::Paused, None) => return Outcome::fail(missing_pause_start(&state)),
            (TaskStatus::Paused, Some(pause_start)) => vec![format!(
                "Paused task: '{}' ({} logged, paused since {}).",
                state.activity,
                active,
                pause_start.format("%H:%M:%S")
            )],
            (TaskStatus::Running, _) => vec![format!(
                "Active task: '{}' (started at {}, {} so far).",
                state.activity,
                state.start_time.format("%H:%M:%S"),
                active
            )],
        };
        lines.extend(state.notes.iter().map(|note| format!("  - {note}")));

        Outcome::ok(lines.join("\n"))
    }

    pub fn add_note(&self, text: &str) -> Result<Outcome, StorageError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(Outcome::fail("Error: A note needs some text."));
        }
        let Some(mut state) = self.state.read() else {
            return Ok(Outcome::fail("No active task to add a note to."));
        };

        state.notes.push(text.to_string());
        self.state.write(&state)?;
        Ok(Outcome::ok(format!("Added note to '{}'.", state.activity)))
    }

    /// Starts a renumbered copy of the most recently started log entry.
    pub fn start_previous(&self, now: NaiveDateTime) -> Result<Outcome, StorageError> {
        if self.state.read().is_some() {
            return Ok(Outcome::fail(
                "Error: A task is already running. Stop it before starting a new one.",
            ));
        }

        let entries = self.log.read();
        let Some(last) = entries.last() else {
            return Ok(Outcome::fail(
                "Error: No previous task found in the log. Use 'track start' to begin.",
            ));
        };

        self.begin(next_activity_name(&last.activity), now)
    }

    pub fn add_entry(
        &self,
        activity: &str,
        start: &str,
        end: &EntryEnd,
        now: NaiveDateTime,
    ) -> Result<Outcome, StorageError> {
        let today = now.date();
        let entry = non_empty(activity).and_then(|activity| {
            let start_time = parse_when(start, today, today)?;
            let end_time = match end {
                EntryEnd::At(raw) => parse_when(raw, today, start_time.date())?,
                EntryEnd::For(raw) => start_time
                    .checked_add_signed(parse_duration(raw)?)
                    .ok_or_else(|| format!("duration '{raw}' runs past the calendar"))?,
            };
            LogEntry::spanning(activity, start_time, end_time)
        });

        match entry {
            Ok(entry) => self.insert_entry(entry),
            Err(reason) => Ok(Outcome::fail(format!("Error: {reason}"))),
        }
    }

    /// Logs `duration` of `activity` that ended just now.
    pub fn backdate(
        &self,
        duration: &str,
        activity: &str,
        now: NaiveDateTime,
    ) -> Result<Outcome, StorageError> {
        let entry = non_empty(activity).and_then(|activity| {
            let start_time = now
                .checked_sub_signed(parse_duration(duration)?)
                .ok_or_else(|| format!("duration '{duration}' runs past the calendar"))?;
            LogEntry::spanning(activity, start_time, now)
        });

        match entry {
            Ok(entry) => self.insert_entry(entry),
            Err(reason) => Ok(Outcome::fail(format!("Error: {reason}"))),
        }
    }

    pub fn remove_entry(
        &self,
        day: &str,
        local_id: usize,
        now: NaiveDateTime,
    ) -> Result<Outcome, StorageError> {
        let mut entries = self.log.read();
        if entries.is_empty() {
            return Ok(Outcome::fail("No entries found in the log."));
        }
        let (day, index) = match resolve_day(day, now.date())
            .and_then(|day| Ok((day, locate_entry(&entries, day, local_id)?)))
        {
            Ok(located) => located,
            Err(message) => return Ok(Outcome::fail(message)),
        };

        let removed = entries.remove(index);
        self.log.write(&mut entries)?;
        info!(
            "event=entry_remove day={day} local_id={local_id} activity={:?}",
            removed.activity
        );

        Ok(Outcome::ok(format!(
            "Removed entry {local_id} from {}: '{}' ({} - {}).",
            day.format("%Y-%m-%d"),
            removed.activity,
            removed.start_time.format("%H:%M"),
            removed.end_time.format("%H:%M")
        )))
    }

    pub fn edit_entry(
        &self,
        local_id: usize,
        day: &str,
        changes: &EntryChanges,
        now: NaiveDateTime,
    ) -> Result<Outcome, StorageError> {
        if changes.is_empty() {
            return Ok(Outcome::fail(
                "Error: Nothing to edit. Pass a new activity, start or end.",
            ));
        }

        let mut entries = self.log.read();
        if entries.is_empty() {
            return Ok(Outcome::fail("No entries found in the log."));
        }
        let today = now.date();
        let edited = resolve_day(day, today).and_then(|day| {
            let index = locate_entry(&entries, day, local_id)?;
            let updated = apply_changes(&entries[index], changes, today)
                .map_err(|reason| format!("Error: {reason}"))?;
            Ok((day, index, updated))
        });
        let (day, index, updated) = match edited {
            Ok(edited) => edited,
            Err(message) => return Ok(Outcome::fail(message)),
        };

        let message = format!(
            "Updated entry {local_id} on {}: '{}' {} - {} ({}).",
            day.format("%Y-%m-%d"),
            updated.activity,
            updated.start_time.format(STAMP_FORMAT),
            updated.end_time.format(STAMP_FORMAT),
            format_minutes(u64::from(updated.duration_minutes))
        );
        entries[index] = updated;
        self.log.write(&mut entries)?;
        info!("event=entry_edit day={day} local_id={local_id}");

        Ok(Outcome::ok(message))
    }

    pub fn get_log(&self, day: &str, now: NaiveDateTime) -> Outcome {
        let entries = self.log.read();
        if entries.is_empty() {
            return Outcome::ok("No entries found in the log.");
        }

        match resolve_day(day, now.date()) {
            Ok(day) => Outcome::ok(render_day(day, &entries)),
            Err(message) => Outcome::fail(message),
        }
    }

    /// Export failures are reported, not raised: the log itself is untouched.
    pub fn export(&self, format: ExportFormat, out_dir: &Path, now: NaiveDateTime) -> Outcome {
        let entries = self.log.read();
        if entries.is_empty() {
            return Outcome::fail("No log entries to export.");
        }

        match export_log(&entries, format, out_dir, now) {
            Ok(path) => {
                info!("event=export status=ok path={}", path.display());
                Outcome::ok(format!(
                    "Exported {} entries to {}",
                    entries.len(),
                    path.display()
                ))
            }
            Err(err) => {
                warn!("event=export status=failed dir={} error={err}", out_dir.display());
                Outcome::fail(format!("An error occurred during export: {err}"))
            }
        }
    }

    pub fn add_alias(&self, alias: &str, activity: &str) -> Result<Outcome, StorageError> {
        let alias = alias.trim();
        let Some(name) = alias.strip_prefix(ALIAS_MARKER) else {
            return Ok(Outcome::fail(format!(
                "Error: Aliases must start with '{ALIAS_MARKER}', e.g. {ALIAS_MARKER}work."
            )));
        };
        if name.is_empty() || name.contains(char::is_whitespace) {
            return Ok(Outcome::fail(format!(
                "Error: '{alias}' is not a usable alias name."
            )));
        }
        let activity = match non_empty(activity) {
            Ok(activity) => activity,
            Err(reason) => return Ok(Outcome::fail(format!("Error: {reason}"))),
        };

        let mut config = self.config.read();
        let previous = config.aliases.insert(alias.to_string(), activity.to_string());
        self.config.write(&config)?;

        Ok(Outcome::ok(match previous {
            Some(previous) => format!("Updated alias {alias}: '{previous}' -> '{activity}'."),
            None => format!("Added alias {alias} -> '{activity}'."),
        }))
    }

    pub fn remove_alias(&self, alias: &str) -> Result<Outcome, StorageError> {
        let alias = alias.trim();
        let mut config = self.config.read();
        let Some(activity) = config.aliases.remove(alias) else {
            return Ok(Outcome::fail(format!("Error: Alias '{alias}' not found.")));
        };

        self.config.write(&config)?;
        Ok(Outcome::ok(format!("Removed alias {alias} (was '{activity}').")))
    }

    pub fn list_aliases(&self) -> Outcome {
        let config = self.config.read();
        if config.aliases.is_empty() {
            return Outcome::ok("No aliases configured.");
        }

        let lines = config
            .aliases
            .iter()
            .map(|(alias, activity)| format!("{alias} -> {activity}"))
            .collect::<Vec<_>>();
        Outcome::ok(lines.join("\n"))
    }

    pub fn memo(&self, request: MemoRequest, now: NaiveDateTime) -> Result<Outcome, StorageError> {
        let mut list = self.memos.read();

        match request {
            MemoRequest::Add(text) => {
                let text = match non_empty(&text) {
                    Ok(text) => text.to_string(),
                    Err(reason) => return Ok(Outcome::fail(format!("Error: {reason}"))),
                };
                list.memos.push(Memo {
                    text,
                    created_at: now,
                });
                self.memos.write(&list)?;
                Ok(Outcome::ok(format!("Saved memo {}.", list.memos.len() - 1)))
            }
            MemoRequest::Remove(index) => {
                if index >= list.memos.len() {
                    return Ok(Outcome::fail(format!("Error: No memo with ID {index}.")));
                }
                let removed = list.memos.remove(index);
                self.memos.write(&list)?;
                Ok(Outcome::ok(format!("Removed memo {index}: '{}'.", removed.text)))
            }
            MemoRequest::List => {
                if list.memos.is_empty() {
                    return Ok(Outcome::ok("No memos saved."));
                }
                let lines = list
                    .memos
                    .iter()
                    .enumerate()
                    .map(|(index, memo)| {
                        format!(
                            "{index:<4} {}  {}",
                            memo.created_at.format(STAMP_FORMAT),
                            memo.text
                        )
                    })
                    .collect::<Vec<_>>();
                Ok(Outcome::ok(lines.join("\n")))
            }
        }
    }

    fn begin(&self, activity: String, now: NaiveDateTime) -> Result<Outcome, StorageError> {
        let state = ActiveTask::new(activity, now);
        self.state.write(&state)?;
        info!("event=task_start activity={:?}", state.activity);
        Ok(Outcome::ok(format!("Started tracking '{}'.", state.activity)))
    }

    fn resolve_activity(&self, raw: &str) -> Result<String, String> {
        let activity = non_empty(raw).map_err(|reason| format!("Error: {reason}"))?;
        if !activity.starts_with(ALIAS_MARKER) {
            return Ok(activity.to_string());
        }

        self.config
            .read()
            .aliases
            .get(activity)
            .cloned()
            .ok_or_else(|| format!("Error: Alias '{activity}' not found."))
    }

    fn insert_entry(&self, entry: LogEntry) -> Result<Outcome, StorageError> {
        let message = format!(
            "Added '{}' from {} to {} ({}).",
            entry.activity,
            entry.start_time.format(STAMP_FORMAT),
            entry.end_time.format(STAMP_FORMAT),
            format_minutes(u64::from(entry.duration_minutes))
        );
        info!(
            "event=entry_add activity={:?} duration_minutes={}",
            entry.activity, entry.duration_minutes
        );

        let mut entries = self.log.read();
        entries.push(entry);
        self.log.write(&mut entries)?;
        Ok(Outcome::ok(message))
    }
}

/// Applies an edit to one entry. Changing either time recomputes the duration
/// from the new span; an activity-only edit keeps the recorded active time.
fn apply_changes(
    entry: &LogEntry,
    changes: &EntryChanges,
    today: NaiveDate,
) -> Result<LogEntry, String> {
    let activity = match &changes.activity {
        Some(activity) => non_empty(activity)?.to_string(),
        None => entry.activity.clone(),
    };

    if !changes.touches_times() {
        return Ok(LogEntry {
            activity,
            ..entry.clone()
        });
    }

    let start_time = match &changes.start {
        Some(raw) => parse_when(raw, today, entry.start_time.date())?,
        None => entry.start_time,
    };
    let end_time = match &changes.end {
        Some(raw) => parse_when(raw, today, entry.end_time.date())?,
        None => entry.end_time,
    };

    let mut updated = LogEntry::spanning(activity, start_time, end_time)?;
    updated.notes = entry.notes.clone();
    Ok(updated)
}

fn non_empty(raw: &str) -> Result<&str, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        Err("text must not be empty".to_string())
    } else {
        Ok(trimmed)
    }
}

fn missing_pause_start(state: &ActiveTask) -> String {
    format!(
        "Error: Task '{}' is paused but has no recorded pause start. Use 'start --force' to discard it.",
        state.activity
    )
}
