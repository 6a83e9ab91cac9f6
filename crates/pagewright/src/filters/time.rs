//! Date and time filters.

use std::fmt::Write;

use chrono::{DateTime, FixedOffset, Local, NaiveDate, NaiveDateTime};

use super::{string_arg, FilterDef};
use crate::error::{TemplateError, TemplateResult};
use crate::value::Value;

const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d";

pub(super) fn filters() -> Vec<FilterDef> {
    vec![
        FilterDef::value("now", 0, |_, _, _| Ok(Value::from(Local::now().to_rfc3339()))),
        FilterDef::value("dateFormat", 1, |_, value, _| date_format(&value, DEFAULT_DATE_FORMAT)),
        FilterDef::value("dateFormat", 2, |_, value, args| {
            let pattern = string_arg("dateFormat", args, 0)?;
            date_format(&value, pattern)
        }),
    ]
}

fn date_format(value: &Value, pattern: &str) -> TemplateResult<Value> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    let date = parse_date(value)
        .ok_or_else(|| TemplateError::invalid_argument(format!("'{}' is not a date", value)))?;
    let mut out = String::new();
    write!(out, "{}", date.format(pattern))
        .map_err(|_| TemplateError::invalid_argument(format!("invalid date format '{}'", pattern)))?;
    Ok(Value::from(out))
}

/// Accepts RFC 3339 timestamps, `YYYY-MM-DD[THH:MM:SS]` (read as UTC) and
/// unix timestamps in seconds.
fn parse_date(value: &Value) -> Option<DateTime<FixedOffset>> {
    if let Value::Int(secs) = value {
        return DateTime::from_timestamp(*secs, 0).map(|dt| dt.fixed_offset());
    }
    let text = value.as_str()?.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt);
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S") {
        return Some(naive.and_utc().fixed_offset());
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc().fixed_offset())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_date_format_inputs() {
        let formatted = |v: Value| date_format(&v, "%d/%m/%Y").unwrap();
        assert_eq!(formatted(Value::from("2024-03-09")), Value::from("09/03/2024"));
        assert_eq!(formatted(Value::from("2024-03-09T10:00:00+02:00")), Value::from("09/03/2024"));
        assert_eq!(formatted(Value::from("2024-03-09T23:59:00")), Value::from("09/03/2024"));
        assert_eq!(formatted(Value::Int(0)), Value::from("01/01/1970"));
    }

    #[test]
    fn test_date_format_errors() {
        assert!(date_format(&Value::from("yesterday"), "%Y").is_err());
        assert!(date_format(&Value::from("2024-03-09"), "%Q").is_err());
        assert_eq!(date_format(&Value::Null, "%Y").unwrap(), Value::Null);
    }

    #[test]
    fn test_now_is_rfc3339() {
        let now = Local::now().to_rfc3339();
        assert!(DateTime::parse_from_rfc3339(&now).is_ok());
    }
}
