use chrono::NaiveDate;

use crate::domain::{LogEntry, format_total};

const DAY_FORMAT: &str = "%d-%m-%Y";
const ACTIVITY_WIDTH: usize = 40;
const RULE_WIDTH: usize = 78;

pub fn resolve_day(token: &str, today: NaiveDate) -> Result<NaiveDate, String> {
    match token.trim().to_lowercase().as_str() {
        "today" => Ok(today),
        "yesterday" => today
            .pred_opt()
            .ok_or_else(|| "Error: There is no day before today.".to_string()),
        other => NaiveDate::parse_from_str(other, DAY_FORMAT)
            .map_err(|_| "Error: Invalid date format. Please use DD-MM-YYYY.".to_string()),
    }
}

/// Entries that start on `day`, in stored order, each paired with its index in
/// the full log. The position within the returned list is the local ID.
pub fn entries_for_day(entries: &[LogEntry], day: NaiveDate) -> Vec<(usize, &LogEntry)> {
    entries
        .iter()
        .enumerate()
        .filter(|(_, entry)| entry.start_time.date() == day)
        .collect()
}

/// Maps a local ID on `day` to an index into the full log.
pub fn locate_entry(
    entries: &[LogEntry],
    day: NaiveDate,
    local_id: usize,
) -> Result<usize, String> {
    let day_entries = entries_for_day(entries, day);
    if let Some((index, _)) = day_entries.get(local_id) {
        return Ok(*index);
    }

    if day_entries.is_empty() {
        Err(format!("Error: No log entries for {}.", day.format("%Y-%m-%d")))
    } else {
        Err(format!(
            "Error: Invalid ID {local_id}. IDs for {} run from 0 to {}.",
            day.format("%Y-%m-%d"),
            day_entries.len() - 1
        ))
    }
}

pub fn render_day(day: NaiveDate, entries: &[LogEntry]) -> String {
    let day_label = day.format("%Y-%m-%d");
    let day_entries = entries_for_day(entries, day);
    if day_entries.is_empty() {
        return format!("No log entries for {day_label}.");
    }

    let mut lines = vec![
        format!("--- Time Log for {day_label} ---"),
        format!(
            "{:<4} {:<10} {:<12} {:<width$} {:>10}",
            "ID",
            "Start",
            "End",
            "Activity",
            "Duration",
            width = ACTIVITY_WIDTH
        ),
        "-".repeat(RULE_WIDTH),
    ];

    let mut total_minutes = 0u64;
    for (local_id, (_, entry)) in day_entries.iter().enumerate() {
        let mut end = entry.end_time.format("%H:%M:%S").to_string();
        let days_later = (entry.end_time.date() - entry.start_time.date()).num_days();
        if days_later > 0 {
            end.push_str(&format!("+{days_later}d"));
        }

        lines.push(format!(
            "{:<4} {:<10} {:<12} {:<width$} {:>10}",
            local_id,
            entry.start_time.format("%H:%M:%S").to_string(),
            end,
            entry.activity,
            format!("{} min", entry.duration_minutes),
            width = ACTIVITY_WIDTH
        ));
        for note in &entry.notes {
            lines.push(format!("       - {note}"));
        }
        total_minutes += u64::from(entry.duration_minutes);
    }

    lines.push("-".repeat(RULE_WIDTH));
    lines.push(format!(
        "Total time for {day_label}: {}",
        format_total(total_minutes)
    ));
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveDateTime};

    use crate::domain::LogEntry;

    use super::{entries_for_day, locate_entry, render_day, resolve_day};

    fn day(number: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 7, number).unwrap()
    }

    fn at(number: u32, hour: u32, minute: u32) -> NaiveDateTime {
        day(number).and_hms_opt(hour, minute, 0).unwrap()
    }

    fn sample_log() -> Vec<LogEntry> {
        let mut standup = LogEntry::spanning("Standup", at(25, 9, 0), at(25, 9, 15)).unwrap();
        standup.notes.push("sprint planning moved".to_string());
        vec![
            LogEntry::spanning("Yesterday's work", at(24, 16, 0), at(24, 17, 0)).unwrap(),
            standup,
            LogEntry::spanning("Deep work", at(25, 10, 0), at(25, 12, 0)).unwrap(),
            LogEntry::spanning("Night deploy", at(25, 23, 30), at(26, 0, 30)).unwrap(),
        ]
    }

    #[test]
    fn resolves_day_tokens() {
        let today = day(25);
        assert_eq!(resolve_day("today", today), Ok(today));
        assert_eq!(resolve_day("Yesterday", today), Ok(day(24)));
        assert_eq!(resolve_day("01-07-2025", today), Ok(day(1)));
        assert!(resolve_day("2025-07-01", today).is_err());
        assert!(resolve_day("last week", today).is_err());
    }

    #[test]
    fn local_ids_follow_stored_order_within_the_day() {
        let log = sample_log();
        let for_day = entries_for_day(&log, day(25));
        let names = for_day
            .iter()
            .map(|(_, entry)| entry.activity.as_str())
            .collect::<Vec<_>>();
        assert_eq!(names, ["Standup", "Deep work", "Night deploy"]);
        assert_eq!(locate_entry(&log, day(25), 0), Ok(1));
        assert_eq!(locate_entry(&log, day(25), 2), Ok(3));
        assert_eq!(locate_entry(&log, day(24), 0), Ok(0));
    }

    #[test]
    fn out_of_range_ids_are_reported() {
        let log = sample_log();
        let err = locate_entry(&log, day(25), 3).unwrap_err();
        assert!(err.contains("Invalid ID 3"), "{err}");
        let err = locate_entry(&log, day(20), 0).unwrap_err();
        assert!(err.contains("No log entries"), "{err}");
    }

    #[test]
    fn renders_rows_notes_and_total() {
        let report = render_day(day(25), &sample_log());
        let lines = report.lines().collect::<Vec<_>>();

        assert_eq!(lines[0], "--- Time Log for 2025-07-25 ---");
        assert!(lines[3].starts_with("0    09:00:00   09:15:00"));
        assert!(lines[3].ends_with("15 min"));
        assert_eq!(lines[4], "       - sprint planning moved");
        assert!(lines[6].contains("00:30:00+1d"));
        assert_eq!(
            lines.last().copied(),
            Some("Total time for 2025-07-25: 3h 15m")
        );
    }

    #[test]
    fn short_days_total_in_minutes() {
        let log = vec![LogEntry::spanning("Email", at(24, 8, 0), at(24, 8, 20)).unwrap()];
        let report = render_day(day(24), &log);
        assert!(report.ends_with("Total time for 2025-07-24: 20 minutes"));
        assert_eq!(render_day(day(23), &log), "No log entries for 2025-07-23.");
    }
}
