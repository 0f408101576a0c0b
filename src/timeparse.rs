use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"];
// Day-first wins for the ambiguous numeric orders.
const DATE_FORMATS: [&str; 5] = ["%Y-%m-%d", "%Y/%m/%d", "%d-%m-%Y", "%d/%m/%Y", "%d.%m.%Y"];

/// Resolves a user-supplied date/time string to a local timestamp.
///
/// `today` and `yesterday` are replaced by calendar dates before parsing. A
/// string holding only a time of day lands on `default_date`; a string holding
/// only a date means midnight.
pub fn parse_when(
    input: &str,
    today: NaiveDate,
    default_date: NaiveDate,
) -> Result<NaiveDateTime, String> {
    let substituted = substitute_relative_days(input, today);
    let tokens = substituted.split_whitespace().collect::<Vec<_>>();
    let invalid = || format!("could not understand date/time '{}'", input.trim());

    match tokens.as_slice() {
        [] => Err(invalid()),
        [single] => parse_datetime(single)
            .or_else(|| parse_date(single).and_then(|date| date.and_hms_opt(0, 0, 0)))
            .or_else(|| parse_time(single).map(|time| default_date.and_time(time)))
            .ok_or_else(invalid),
        [first, rest @ ..] => {
            if let (Some(date), Some(time)) = (parse_date(first), parse_time(&rest.join(" "))) {
                return Ok(date.and_time(time));
            }

            let (last, init) = tokens.split_last().ok_or_else(invalid)?;
            if let (Some(date), Some(time)) = (parse_date(last), parse_time(&init.join(" "))) {
                return Ok(date.and_time(time));
            }

            Err(invalid())
        }
    }
}

pub fn substitute_relative_days(input: &str, today: NaiveDate) -> String {
    input
        .split_whitespace()
        .map(|token| {
            let day = match token.to_lowercase().as_str() {
                "today" => Some(today),
                "yesterday" => today.pred_opt(),
                _ => None,
            };
            day.map(|day| day.format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| token.to_string())
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn parse_datetime(token: &str) -> Option<NaiveDateTime> {
    DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(token, format).ok())
}

fn parse_date(token: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(token, format).ok())
}

fn parse_time(raw: &str) -> Option<NaiveTime> {
    let compact = raw
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase();

    let (clock, pm) = if let Some(clock) = compact.strip_suffix("am") {
        (clock, Some(false))
    } else if let Some(clock) = compact.strip_suffix("pm") {
        (clock, Some(true))
    } else {
        (compact.as_str(), None)
    };

    let Some(pm) = pm else {
        return NaiveTime::parse_from_str(clock, "%H:%M:%S")
            .or_else(|_| NaiveTime::parse_from_str(clock, "%H:%M"))
            .ok();
    };

    let (hour, minute) = match clock.split_once(':') {
        Some((hour, minute)) => (hour.parse::<u32>().ok()?, minute.parse::<u32>().ok()?),
        None => (clock.parse::<u32>().ok()?, 0),
    };
    if !(1..=12).contains(&hour) {
        return None;
    }

    let hour = match (hour, pm) {
        (12, false) => 0,
        (12, true) => 12,
        (hour, true) => hour + 12,
        (hour, false) => hour,
    };
    NaiveTime::from_hms_opt(hour, minute, 0)
}
