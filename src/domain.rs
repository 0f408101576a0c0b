use std::collections::BTreeMap;

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

pub const ALIAS_MARKER: char = '@';

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Running,
    Paused,
}

/// The single in-progress activity, persisted between invocations.
///
/// `pause_start_time` is set exactly when `status` is `Paused`. The store does
/// not enforce that on read; the engine reports a broken pairing instead of
/// repairing it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveTask {
    pub activity: String,
    pub start_time: NaiveDateTime,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub pause_start_time: Option<NaiveDateTime>,
    #[serde(default)]
    pub total_paused_seconds: f64,
    #[serde(default)]
    pub notes: Vec<String>,
}

impl ActiveTask {
    pub fn new(activity: impl Into<String>, start_time: NaiveDateTime) -> Self {
        Self {
            activity: activity.into(),
            start_time,
            status: TaskStatus::Running,
            pause_start_time: None,
            total_paused_seconds: 0.0,
            notes: Vec::new(),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.activity.trim().is_empty() {
            return Err("activity must not be empty".to_string());
        }

        if !self.total_paused_seconds.is_finite() || self.total_paused_seconds < 0.0 {
            return Err(format!(
                "invalid paused total: {}",
                self.total_paused_seconds
            ));
        }

        Ok(())
    }

    pub fn is_paused(&self) -> bool {
        self.status == TaskStatus::Paused
    }

    /// Active seconds as of `now`. A paused task is frozen at its pause start.
    pub fn active_seconds_at(&self, now: NaiveDateTime) -> f64 {
        let until = match (self.status, self.pause_start_time) {
            (TaskStatus::Paused, Some(pause_start)) => pause_start,
            _ => now,
        };
        active_seconds(until, self.start_time, self.total_paused_seconds)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    pub activity: String,
    pub duration_minutes: u32,
    #[serde(default)]
    pub notes: Vec<String>,
}

impl LogEntry {
    /// Builds an entry for an explicit interval, with no paused time inside it.
    pub fn spanning(
        activity: impl Into<String>,
        start_time: NaiveDateTime,
        end_time: NaiveDateTime,
    ) -> Result<Self, String> {
        if end_time <= start_time {
            return Err(format!(
                "end time {} must be after start time {}",
                end_time.format("%Y-%m-%d %H:%M"),
                start_time.format("%Y-%m-%d %H:%M")
            ));
        }

        Ok(Self {
            start_time,
            end_time,
            activity: activity.into(),
            duration_minutes: seconds_to_minutes(seconds_between(start_time, end_time)),
            notes: Vec::new(),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub aliases: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Memo {
    pub text: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoList {
    #[serde(default)]
    pub memos: Vec<Memo>,
}

pub fn seconds_between(start: NaiveDateTime, end: NaiveDateTime) -> f64 {
    (end - start).num_milliseconds() as f64 / 1000.0
}

pub fn active_seconds(now: NaiveDateTime, start: NaiveDateTime, total_paused_seconds: f64) -> f64 {
    (seconds_between(start, now) - total_paused_seconds).max(0.0)
}

/// Rounds half to even, so 90s is 2 minutes and 150s is also 2 minutes.
pub fn seconds_to_minutes(seconds: f64) -> u32 {
    (seconds.max(0.0) / 60.0).round_ties_even() as u32
}

/// Parses `<N>h<N>m` strings such as `1h30m`, `2h` or `45m`.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let compact = input
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase();
    let invalid = || format!("invalid duration '{input}': use forms like 1h30m, 2h or 45m");

    let (hours, rest) = match compact.split_once('h') {
        Some((hours, rest)) => (Some(hours), rest),
        None => (None, compact.as_str()),
    };
    let minutes = match rest.strip_suffix('m') {
        Some(minutes) => Some(minutes),
        None if rest.is_empty() => None,
        None => return Err(invalid()),
    };

    if hours.is_none() && minutes.is_none() {
        return Err(invalid());
    }

    let number = |part: Option<&str>| -> Result<i64, String> {
        match part {
            None => Ok(0),
            Some(digits) if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) => {
                digits.parse::<i64>().map_err(|_| invalid())
            }
            Some(_) => Err(invalid()),
        }
    };

    let hours = number(hours)?;
    let minutes = number(minutes)?;
    let total = hours
        .checked_mul(60)
        .and_then(|from_hours| from_hours.checked_add(minutes))
        .ok_or_else(invalid)?;

    Duration::try_minutes(total).ok_or_else(invalid)
}

pub fn format_minutes(minutes: u64) -> String {
    let hours = minutes / 60;
    let minutes = minutes % 60;
    if hours > 0 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m")
    }
}

/// Day-report flavour of [`format_minutes`].
pub fn format_total(minutes: u64) -> String {
    let hours = minutes / 60;
    let minutes = minutes % 60;
    if hours > 0 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes} minutes")
    }
}

/// `Review - 3` becomes `Review - 4`; anything else gets ` - 2` appended.
pub fn next_activity_name(last: &str) -> String {
    if let Some((base, suffix)) = last.rsplit_once(" - ") {
        if !base.is_empty() && !suffix.is_empty() && suffix.chars().all(|c| c.is_ascii_digit()) {
            if let Ok(number) = suffix.parse::<u64>() {
                return format!("{base} - {}", number.saturating_add(1));
            }
        }
    }

    format!("{last} - 2")
}
