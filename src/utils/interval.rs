/// Interval literal parsing for `every` tasks
use chrono::Duration;

const SECONDS_PER_MINUTE: i64 = 60;
const SECONDS_PER_HOUR: i64 = 60 * SECONDS_PER_MINUTE;
const SECONDS_PER_DAY: i64 = 24 * SECONDS_PER_HOUR;
const SECONDS_PER_WEEK: i64 = 7 * SECONDS_PER_DAY;

/// Longest accepted interval: 100 years
const MAX_INTERVAL_SECONDS: i64 = 100 * 365 * SECONDS_PER_DAY;

/// Parse an interval literal into a strictly positive duration.
///
/// Accepted forms:
/// - bare seconds: `"300"`
/// - relative phrase: `"5 minutes"`, `"1 day"`
/// - compact: `"30s"`, `"5m"`, `"2h"`, `"1d"`, `"1w"`
/// - ISO-8601: `"PT5M"`, `"P1D"`, `"P1DT12H"`, `"P2W"`
pub fn parse_interval(value: &str) -> Result<Duration, String> {
    let value = value.trim();
    if value.is_empty() {
        return Err("empty interval".to_string());
    }

    let seconds = if let Ok(seconds) = value.parse::<i64>() {
        seconds
    } else if let Some(rest) = value.strip_prefix(['P', 'p']) {
        parse_iso8601(rest)?
    } else {
        parse_relative(value)?
    };

    if seconds <= 0 {
        return Err(format!("interval must be positive, got {} seconds", seconds));
    }

    if seconds > MAX_INTERVAL_SECONDS {
        return Err(format!(
            "interval of {} seconds exceeds the 100 year maximum",
            seconds
        ));
    }

    Duration::try_seconds(seconds).ok_or_else(|| format!("interval '{}' is too large", value))
}

fn unit_seconds(unit: &str) -> Option<i64> {
    match unit.to_ascii_lowercase().as_str() {
        "s" | "sec" | "secs" | "second" | "seconds" => Some(1),
        "m" | "min" | "mins" | "minute" | "minutes" => Some(SECONDS_PER_MINUTE),
        "h" | "hour" | "hours" => Some(SECONDS_PER_HOUR),
        "d" | "day" | "days" => Some(SECONDS_PER_DAY),
        "w" | "week" | "weeks" => Some(SECONDS_PER_WEEK),
        _ => None,
    }
}

/// `"5 minutes"` or `"5m"`
fn parse_relative(value: &str) -> Result<i64, String> {
    let idx = value
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| format!("interval '{}' is missing a unit", value))?;

    let (amount_part, unit_part) = value.split_at(idx);
    let amount: i64 = amount_part
        .parse()
        .map_err(|e| format!("invalid interval amount '{}': {}", amount_part, e))?;

    let unit = unit_part.trim();
    let factor = unit_seconds(unit).ok_or_else(|| {
        format!(
            "unsupported interval unit '{}'; expected seconds, minutes, hours, days or weeks",
            unit
        )
    })?;

    amount
        .checked_mul(factor)
        .ok_or_else(|| format!("interval '{}' is too large", value))
}

/// The part of an ISO-8601 duration after the leading `P`
fn parse_iso8601(rest: &str) -> Result<i64, String> {
    let (date_part, time_part) = match rest.split_once(['T', 't']) {
        Some((date, time)) => (date, Some(time)),
        None => (rest, None),
    };

    if date_part.is_empty() && time_part.is_none_or(str::is_empty) {
        return Err(format!("empty ISO-8601 duration 'P{}'", rest));
    }

    let mut total = sum_designators(date_part, &[('W', SECONDS_PER_WEEK), ('D', SECONDS_PER_DAY)])?;

    if let Some(time) = time_part {
        if time.is_empty() {
            return Err(format!("ISO-8601 duration 'P{}' has an empty time part", rest));
        }
        let time_total = sum_designators(
            time,
            &[('H', SECONDS_PER_HOUR), ('M', SECONDS_PER_MINUTE), ('S', 1)],
        )?;
        total = total
            .checked_add(time_total)
            .ok_or_else(|| "ISO-8601 duration is too large".to_string())?;
    }

    Ok(total)
}

fn sum_designators(part: &str, units: &[(char, i64)]) -> Result<i64, String> {
    let mut total: i64 = 0;
    let mut digits = String::new();

    for c in part.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }

        let factor = units
            .iter()
            .find(|(designator, _)| designator.eq_ignore_ascii_case(&c))
            .map(|(_, factor)| *factor)
            .ok_or_else(|| format!("unsupported ISO-8601 designator '{}'", c))?;

        let amount: i64 = digits
            .parse()
            .map_err(|_| format!("missing amount before ISO-8601 designator '{}'", c))?;

        total = amount
            .checked_mul(factor)
            .and_then(|seconds| total.checked_add(seconds))
            .ok_or_else(|| "ISO-8601 duration is too large".to_string())?;
        digits.clear();
    }

    if !digits.is_empty() {
        return Err(format!("ISO-8601 amount '{}' has no designator", digits));
    }

    Ok(total)
}
