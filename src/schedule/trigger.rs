use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use std::str::FromStr;

use super::error::RecurrenceError;
use crate::models::{RecurrenceType, Task};
use crate::utils::interval::parse_interval;

const DAY_NAMES: [&str; 7] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];

/// Resolves the next fire instant of a task from its recurrence.
#[derive(Debug, Clone)]
pub enum Trigger {
    Cron { schedule: cron::Schedule, timezone: Tz },
    Every { interval: Duration },
    /// `consumed` lives only as long as the registry entry holding it
    Once { at: DateTime<Utc>, consumed: bool },
}

impl Trigger {
    pub fn for_task(task: &Task, timezone: Tz) -> Result<Self, RecurrenceError> {
        Self::parse(task.recurrence_type, &task.recurrence_value, timezone)
    }

    pub fn parse(
        recurrence_type: RecurrenceType,
        value: &str,
        timezone: Tz,
    ) -> Result<Self, RecurrenceError> {
        match recurrence_type {
            RecurrenceType::Cron => {
                let cron_error = |reason: String| RecurrenceError::Cron {
                    expression: value.to_string(),
                    reason,
                };
                let normalized = normalize_cron(value).map_err(cron_error)?;
                let schedule = cron::Schedule::from_str(&normalized)
                    .map_err(|e| cron_error(e.to_string()))?;
                if schedule.upcoming(timezone).next().is_none() {
                    return Err(cron_error("expression never matches a future date".to_string()));
                }
                Ok(Trigger::Cron { schedule, timezone })
            }
            RecurrenceType::Every => {
                let interval = parse_interval(value).map_err(|reason| RecurrenceError::Interval {
                    value: value.to_string(),
                    reason,
                })?;
                Ok(Trigger::Every { interval })
            }
            RecurrenceType::Once => {
                let at = value
                    .trim()
                    .parse::<i64>()
                    .ok()
                    .and_then(|seconds| DateTime::from_timestamp(seconds, 0))
                    .ok_or_else(|| RecurrenceError::Timestamp(value.to_string()))?;
                Ok(Trigger::Once { at, consumed: false })
            }
        }
    }

    /// Next fire instant after `previous`, or after `now` when the entry has
    /// never fired. `None` means no further occurrences.
    pub fn next_after(
        &mut self,
        previous: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        match self {
            Trigger::Cron { schedule, timezone } => {
                let from = previous.unwrap_or(now).with_timezone(timezone);
                schedule
                    .after(&from)
                    .next()
                    .map(|next| next.with_timezone(&Utc))
            }
            // `None` once the sum leaves the representable range
            Trigger::Every { interval } => previous.unwrap_or(now).checked_add_signed(*interval),
            Trigger::Once { at, consumed } => {
                if *consumed {
                    return None;
                }
                *consumed = true;
                Some(*at)
            }
        }
    }

    pub fn interval(&self) -> Option<Duration> {
        match self {
            Trigger::Every { interval } => Some(*interval),
            _ => None,
        }
    }
}

/// Turn a five-field crontab expression into the seconds-first syntax of the
/// `cron` crate. `@daily` style shorthands pass through unchanged.
fn normalize_cron(expression: &str) -> Result<String, String> {
    let expression = expression.trim();
    if expression.starts_with('@') {
        return Ok(expression.to_string());
    }

    let fields: Vec<&str> = expression.split_whitespace().collect();
    if fields.len() != 5 {
        return Err(format!("expected 5 fields, found {}", fields.len()));
    }

    let day_of_week = normalize_day_of_week(fields[4])?;
    Ok(format!(
        "0 {} {} {} {} {}",
        fields[0], fields[1], fields[2], fields[3], day_of_week
    ))
}

/// Crontab counts weekdays from `0` (with `7` also Sunday) while the `cron`
/// crate counts from `1`. Expanding to names sidesteps the difference.
fn normalize_day_of_week(field: &str) -> Result<String, String> {
    if field == "*" || field == "?" {
        return Ok(field.to_string());
    }

    let mut days = [false; 7];
    for item in field.split(',') {
        let (range, step) = match item.split_once('/') {
            Some((range, step)) => {
                let step: usize = step
                    .parse()
                    .map_err(|_| format!("invalid day-of-week step '{}'", step))?;
                if step == 0 {
                    return Err("day-of-week step must be positive".to_string());
                }
                (range, step)
            }
            None => (item, 1),
        };

        let (start, end) = match range {
            "*" => (0, 6),
            _ => match range.split_once('-') {
                Some((start, end)) => (day_index(start)?, day_index(end)?),
                None => {
                    let day = day_index(range)?;
                    // `5/2` means "from Friday every two days"
                    if step > 1 { (day, 6) } else { (day, day) }
                }
            },
        };

        // `7` only matters as the end of a range such as `5-7`
        let (start, end) = if start == 7 { (0, 0) } else { (start, end) };
        if start > end {
            return Err(format!("day-of-week range '{}' runs backwards", range));
        }

        for day in (start..=end).step_by(step) {
            days[day % 7] = true;
        }
    }

    let names: Vec<&str> = days
        .iter()
        .enumerate()
        .filter(|(_, selected)| **selected)
        .map(|(day, _)| DAY_NAMES[day])
        .collect();
    Ok(names.join(","))
}

fn day_index(token: &str) -> Result<usize, String> {
    if let Ok(day) = token.parse::<usize>() {
        return if day <= 7 {
            Ok(day)
        } else {
            Err(format!("day-of-week '{}' is out of range 0-7", token))
        };
    }

    let upper = token.to_ascii_uppercase();
    DAY_NAMES
        .iter()
        .position(|name| upper.starts_with(name))
        .ok_or_else(|| format!("unknown day-of-week '{}'", token))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone, Timelike, Weekday};

    fn at(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(year, month, day, hour, minute, 0).unwrap()
    }

    fn cron(expression: &str) -> Trigger {
        Trigger::parse(RecurrenceType::Cron, expression, Tz::UTC).unwrap()
    }

    #[test]
    fn test_normalize_cron_prepends_seconds() {
        assert_eq!(normalize_cron("*/5 * * * *").unwrap(), "0 */5 * * * *");
        assert_eq!(normalize_cron("@daily").unwrap(), "@daily");
        assert!(normalize_cron("0 30 8 * * *").is_err());
        assert!(normalize_cron("* * *").is_err());
    }

    #[test]
    fn test_normalize_day_of_week() {
        assert_eq!(normalize_day_of_week("*").unwrap(), "*");
        assert_eq!(normalize_day_of_week("0").unwrap(), "SUN");
        assert_eq!(normalize_day_of_week("7").unwrap(), "SUN");
        assert_eq!(normalize_day_of_week("1-5").unwrap(), "MON,TUE,WED,THU,FRI");
        assert_eq!(normalize_day_of_week("5-7").unwrap(), "SUN,FRI,SAT");
        assert_eq!(normalize_day_of_week("mon,wed").unwrap(), "MON,WED");
        assert_eq!(normalize_day_of_week("*/2").unwrap(), "SUN,TUE,THU,SAT");
        assert!(normalize_day_of_week("8").is_err());
        assert!(normalize_day_of_week("5-1").is_err());
        assert!(normalize_day_of_week("FUNDAY").is_err());
    }

    #[test]
    fn test_cron_next_matches_expression_and_is_strictly_after() {
        let mut trigger = cron("30 8 * * *");
        let previous = at(2025, 3, 10, 8, 30);

        let next = trigger.next_after(Some(previous), previous).unwrap();
        assert_eq!(next, at(2025, 3, 11, 8, 30));

        let mut previous = previous;
        for _ in 0..10 {
            let next = trigger.next_after(Some(previous), previous).unwrap();
            assert!(next > previous);
            assert_eq!((next.hour(), next.minute(), next.second()), (8, 30, 0));
            previous = next;
        }
    }

    #[test]
    fn test_cron_weekday_numbering_follows_crontab() {
        // 2025-03-10 is a Monday
        let mut trigger = cron("0 9 * * 0");
        let next = trigger.next_after(None, at(2025, 3, 10, 12, 0)).unwrap();
        assert_eq!(next.weekday(), Weekday::Sun);
        assert_eq!(next, at(2025, 3, 16, 9, 0));
    }

    #[test]
    fn test_cron_evaluated_in_configured_timezone() {
        let mut trigger =
            Trigger::parse(RecurrenceType::Cron, "0 9 * * *", chrono_tz::Europe::Paris).unwrap();
        let next = trigger.next_after(None, at(2025, 1, 15, 0, 0)).unwrap();
        // 09:00 CET is 08:00 UTC in winter
        assert_eq!(next, at(2025, 1, 15, 8, 0));
    }

    #[test]
    fn test_malformed_cron_rejected() {
        assert!(Trigger::parse(RecurrenceType::Cron, "not a cron", Tz::UTC).is_err());
        assert!(Trigger::parse(RecurrenceType::Cron, "61 * * * *", Tz::UTC).is_err());
        assert!(Trigger::parse(RecurrenceType::Cron, "", Tz::UTC).is_err());
    }

    #[test]
    fn test_every_adds_interval_to_previous() {
        let mut trigger = Trigger::parse(RecurrenceType::Every, "5 minutes", Tz::UTC).unwrap();
        let admitted = at(2025, 3, 10, 12, 0);

        assert_eq!(trigger.next_after(None, admitted), Some(at(2025, 3, 10, 12, 5)));
        assert_eq!(
            trigger.next_after(Some(at(2025, 3, 10, 12, 5)), admitted),
            Some(at(2025, 3, 10, 12, 10))
        );
        assert_eq!(trigger.interval(), Some(Duration::minutes(5)));
    }

    #[test]
    fn test_every_rejects_bad_interval() {
        assert!(Trigger::parse(RecurrenceType::Every, "soon", Tz::UTC).is_err());
        assert!(Trigger::parse(RecurrenceType::Every, "0", Tz::UTC).is_err());
        assert!(Trigger::parse(RecurrenceType::Every, "9223372036854775807", Tz::UTC).is_err());
        assert!(Trigger::parse(RecurrenceType::Every, "1000000000 weeks", Tz::UTC).is_err());
    }

    #[test]
    fn test_every_stops_at_end_of_representable_time() {
        let mut trigger = Trigger::parse(RecurrenceType::Every, "5200w", Tz::UTC).unwrap();
        let near_max = DateTime::<Utc>::MAX_UTC - Duration::days(1);

        assert_eq!(trigger.next_after(Some(near_max), near_max), None);
    }

    #[test]
    fn test_unsatisfiable_cron_rejected() {
        let err = Trigger::parse(RecurrenceType::Cron, "0 0 30 2 *", Tz::UTC).unwrap_err();
        assert!(matches!(err, RecurrenceError::Cron { .. }));
        assert!(Trigger::parse(RecurrenceType::Cron, "0 0 29 2 *", Tz::UTC).is_ok());
    }

    #[test]
    fn test_once_yields_a_single_instant() {
        let mut trigger = Trigger::parse(RecurrenceType::Once, "1700000000", Tz::UTC).unwrap();
        let now = at(2023, 1, 1, 0, 0);
        let expected = DateTime::from_timestamp(1_700_000_000, 0);

        assert_eq!(trigger.next_after(None, now), expected);
        for _ in 0..5 {
            assert_eq!(trigger.next_after(expected, now), None);
            assert_eq!(trigger.next_after(None, now), None);
        }
    }

    #[test]
    fn test_once_rejects_non_timestamp() {
        assert!(Trigger::parse(RecurrenceType::Once, "tomorrow", Tz::UTC).is_err());
        assert!(Trigger::parse(RecurrenceType::Once, "17.5", Tz::UTC).is_err());
    }

    #[test]
    fn test_once_timestamp_outside_calendar_range_rejected() {
        let err = Trigger::parse(RecurrenceType::Once, "9223372036854775807", Tz::UTC).unwrap_err();
        assert!(matches!(err, RecurrenceError::Timestamp(_)));
        assert!(Trigger::parse(RecurrenceType::Once, "-9223372036854775808", Tz::UTC).is_err());
    }

    #[test]
    fn test_once_at_latest_representable_second() {
        let latest = DateTime::<Utc>::MAX_UTC.timestamp();
        let mut trigger =
            Trigger::parse(RecurrenceType::Once, &latest.to_string(), Tz::UTC).unwrap();

        let next = trigger.next_after(None, Utc::now()).unwrap();
        assert_eq!(next.timestamp(), latest);
        assert_eq!(trigger.next_after(Some(next), Utc::now()), None);
    }
}
