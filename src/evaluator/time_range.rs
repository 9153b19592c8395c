//! Time-range business predicate.
//!
//! One call evaluates at most one of three independent shapes, in
//! configuration-field priority order:
//!
//! 1. `{startTime, endTime}` — `HH:mm` time-of-day window, supporting
//!    overnight ranges where start > end (e.g. `22:00-06:00`);
//! 2. `{startDate, endDate}` — inclusive calendar-date range;
//! 3. `{workdayOnly: true}` — ISO weekday 1–5.
//!
//! The `"HH:mm-HH:mm"` string shorthand is accepted for the first shape.

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime};
use serde_json::{Map, Value};

use crate::error::{NodeError, NodeResult};
use crate::evaluator::operators::to_text;

/// Time source, injectable so calendar-dependent predicates are testable.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// Wall-clock time in the local zone.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        chrono::Local::now().naive_local()
    }
}

/// Evaluate a time-range configuration value against the clock.
pub fn in_time_range(clock: &dyn Clock, config: &Value) -> NodeResult<bool> {
    let range = match config {
        Value::Object(map) => map.clone(),
        Value::String(s) => parse_shorthand(s)
            .ok_or_else(|| NodeError::Evaluation(format!("unrecognized time range: {s:?}")))?,
        other => {
            return Err(NodeError::Evaluation(format!(
                "unrecognized time range configuration: {other}"
            )))
        }
    };

    let now = clock.now();

    if let (Some(start), Some(end)) = (range.get("startTime"), range.get("endTime")) {
        let start = parse_time(start)?;
        let end = parse_time(end)?;
        let current = now.time();
        let in_range = if start < end {
            current >= start && current <= end
        } else {
            // Overnight window, e.g. 22:00-06:00.
            current >= start || current <= end
        };
        return Ok(in_range);
    }

    if let (Some(start), Some(end)) = (range.get("startDate"), range.get("endDate")) {
        let start = parse_date(start)?;
        let end = parse_date(end)?;
        let today = now.date();
        return Ok(today >= start && today <= end);
    }

    if let Some(workday_only) = range.get("workdayOnly") {
        if workday_only.as_bool() == Some(true) || to_text(workday_only) == "true" {
            let weekday = now.weekday().number_from_monday();
            return Ok((1..=5).contains(&weekday));
        }
    }

    tracing::warn!("time range configuration matched no known shape");
    Ok(false)
}

fn parse_shorthand(raw: &str) -> Option<Map<String, Value>> {
    // "09:00-18:00"
    if !raw.contains(':') {
        return None;
    }
    let (start, end) = raw.split_once('-')?;
    let mut map = Map::new();
    map.insert("startTime".into(), Value::String(start.trim().to_string()));
    map.insert("endTime".into(), Value::String(end.trim().to_string()));
    Some(map)
}

fn parse_time(value: &Value) -> NodeResult<NaiveTime> {
    let text = to_text(value);
    NaiveTime::parse_from_str(&text, "%H:%M")
        .map_err(|e| NodeError::Evaluation(format!("invalid time {text:?}: {e}")))
}

fn parse_date(value: &Value) -> NodeResult<NaiveDate> {
    let text = to_text(value);
    NaiveDate::parse_from_str(&text, "%Y-%m-%d")
        .map_err(|e| NodeError::Evaluation(format!("invalid date {text:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct FixedClock(NaiveDateTime);

    impl Clock for FixedClock {
        fn now(&self) -> NaiveDateTime {
            self.0
        }
    }

    fn at(date: &str, time: &str) -> FixedClock {
        let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap();
        let time = NaiveTime::parse_from_str(time, "%H:%M").unwrap();
        FixedClock(date.and_time(time))
    }

    #[test]
    fn daytime_window() {
        let config = json!({ "startTime": "09:00", "endTime": "18:00" });
        assert!(in_time_range(&at("2026-03-02", "12:00"), &config).unwrap());
        assert!(!in_time_range(&at("2026-03-02", "20:00"), &config).unwrap());
    }

    #[test]
    fn overnight_window_wraps() {
        let config = json!({ "startTime": "22:00", "endTime": "06:00" });
        assert!(in_time_range(&at("2026-03-02", "23:30"), &config).unwrap());
        assert!(in_time_range(&at("2026-03-02", "02:00"), &config).unwrap());
        assert!(!in_time_range(&at("2026-03-02", "12:00"), &config).unwrap());
    }

    #[test]
    fn shorthand_string_form() {
        assert!(in_time_range(&at("2026-03-02", "10:00"), &json!("09:00-18:00")).unwrap());
        assert!(!in_time_range(&at("2026-03-02", "08:00"), &json!("09:00-18:00")).unwrap());
    }

    #[test]
    fn date_range_is_inclusive() {
        let config = json!({ "startDate": "2026-03-01", "endDate": "2026-03-31" });
        assert!(in_time_range(&at("2026-03-01", "00:30"), &config).unwrap());
        assert!(in_time_range(&at("2026-03-31", "23:30"), &config).unwrap());
        assert!(!in_time_range(&at("2026-04-01", "00:30"), &config).unwrap());
    }

    #[test]
    fn time_window_takes_priority_over_date_range() {
        let config = json!({
            "startTime": "09:00", "endTime": "18:00",
            "startDate": "2020-01-01", "endDate": "2020-01-02"
        });
        // Date range would fail, but the time-of-day shape wins.
        assert!(in_time_range(&at("2026-03-02", "12:00"), &config).unwrap());
    }

    #[test]
    fn workday_only() {
        let config = json!({ "workdayOnly": true });
        // 2026-03-02 is a Monday, 2026-03-07 a Saturday.
        assert!(in_time_range(&at("2026-03-02", "12:00"), &config).unwrap());
        assert!(!in_time_range(&at("2026-03-07", "12:00"), &config).unwrap());
        assert!(!in_time_range(&at("2026-03-02", "12:00"), &json!({ "workdayOnly": false })).unwrap());
    }

    #[test]
    fn malformed_configs_error() {
        assert!(in_time_range(&at("2026-03-02", "12:00"), &json!(42)).is_err());
        assert!(in_time_range(
            &at("2026-03-02", "12:00"),
            &json!({ "startTime": "9 am", "endTime": "6 pm" })
        )
        .is_err());
        assert!(in_time_range(&at("2026-03-02", "12:00"), &json!("not a range")).is_err());
    }

    #[test]
    fn unknown_shape_is_false_not_error() {
        assert!(!in_time_range(&at("2026-03-02", "12:00"), &json!({ "other": 1 })).unwrap());
    }
}
