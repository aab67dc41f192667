//! Normalizes input values into the shapes the database driver expects.

use std::sync::LazyLock;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use cypher_schema::{Field, FieldKind, ScalarType, TemporalType};
use regex::Regex;
use serde_json::{json, Map, Value};

use crate::{Error, Result};

static TIME_WITH_OFFSET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{2}:\d{2}(?::\d{2}(?:\.\d+)?)?)(Z|[+-]\d{2}:\d{2})$").expect("must be valid")
});

static DURATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(-)?P(?:(\d+)Y)?(?:(\d+)M)?(?:(\d+)W)?(?:(\d+)D)?(?:T(?:(\d+)H)?(?:(\d+)M)?(?:(\d+)(?:\.(\d{1,9}))?S)?)?$",
    )
    .expect("must be valid")
});

/// The `{low, high}` pair a 64-bit integer travels as.
pub(crate) fn int64(value: i64) -> Value {
    json!({
        "low": value as i32,
        "high": (value >> 32) as i32,
    })
}

pub(crate) fn parse_int64(value: &Value) -> Result<i64> {
    let invalid = || Error::InvalidInteger { value: value.to_string() };

    match value {
        Value::Number(number) => match number.as_i64() {
            Some(value) => Ok(value),
            None => number
                .as_f64()
                .filter(|value| value.fract() == 0.0 && value.abs() < i64::MAX as f64)
                .map(|value| value as i64)
                .ok_or_else(invalid),
        },
        Value::String(string) => string.parse().map_err(|_| invalid()),
        _ => Err(invalid()),
    }
}

/// Normalizes a value for the given field, element-wise for lists.
pub(crate) fn normalize(field: &Field, value: &Value) -> Result<Value> {
    match value {
        Value::Null => Ok(Value::Null),
        Value::Array(items) => items
            .iter()
            .map(|item| normalize_single(field, item))
            .collect::<Result<Vec<_>>>()
            .map(Value::Array),
        value => normalize_single(field, value),
    }
}

pub(crate) fn normalize_single(field: &Field, value: &Value) -> Result<Value> {
    if value.is_null() {
        return Ok(Value::Null);
    }

    match &field.kind {
        FieldKind::Scalar(ScalarType::Int | ScalarType::BigInt) => parse_int64(value).map(int64),
        FieldKind::Temporal(ty) => match value {
            Value::String(string) => temporal(*ty, string),
            // Already structured.
            Value::Object(_) => Ok(value.clone()),
            other => Err(Error::InvalidTemporal {
                ty: ty.to_string(),
                value: other.to_string(),
            }),
        },
        FieldKind::Point(_) => match value {
            Value::Object(object) if is_point(object) => Ok(value.clone()),
            _ => Err(Error::InvalidPoint {
                field: field.name.clone(),
            }),
        },
        _ => Ok(value.clone()),
    }
}

fn is_point(object: &Map<String, Value>) -> bool {
    (object.contains_key("longitude") && object.contains_key("latitude"))
        || (object.contains_key("x") && object.contains_key("y"))
}

/// Splits a temporal literal into its named components.
pub(crate) fn temporal(ty: TemporalType, input: &str) -> Result<Value> {
    let invalid = || Error::InvalidTemporal {
        ty: ty.to_string(),
        value: input.to_string(),
    };

    let value = match ty {
        TemporalType::DateTime => {
            let datetime = DateTime::parse_from_rfc3339(input).map_err(|_| invalid())?;
            let mut components = date_components(datetime.date_naive());
            components.extend(time_components(datetime.time()));
            components.insert("timezone".into(), json!(datetime.offset().to_string()));
            components
        }
        TemporalType::LocalDateTime => {
            let datetime = NaiveDateTime::parse_from_str(input, "%Y-%m-%dT%H:%M:%S%.f").map_err(|_| invalid())?;
            let mut components = date_components(datetime.date());
            components.extend(time_components(datetime.time()));
            components
        }
        TemporalType::Date => {
            let date = NaiveDate::parse_from_str(input, "%Y-%m-%d").map_err(|_| invalid())?;
            date_components(date)
        }
        TemporalType::LocalTime => time_components(parse_time(input).ok_or_else(invalid)?),
        TemporalType::Time => {
            let captures = TIME_WITH_OFFSET.captures(input).ok_or_else(invalid)?;
            let time = parse_time(&captures[1]).ok_or_else(invalid)?;
            let offset = match &captures[2] {
                "Z" => "+00:00",
                offset => offset,
            };

            let mut components = time_components(time);
            components.insert("timezone".into(), json!(offset));
            components
        }
        TemporalType::Duration => duration(input).ok_or_else(invalid)?,
    };

    Ok(Value::Object(value))
}

fn parse_time(input: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(input, "%H:%M:%S%.f")
        .or_else(|_| NaiveTime::parse_from_str(input, "%H:%M:%S"))
        .or_else(|_| NaiveTime::parse_from_str(input, "%H:%M"))
        .ok()
}

fn date_components(date: NaiveDate) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert("year".into(), json!(date.year()));
    map.insert("month".into(), json!(date.month()));
    map.insert("day".into(), json!(date.day()));
    map
}

fn time_components(time: NaiveTime) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert("hour".into(), json!(time.hour()));
    map.insert("minute".into(), json!(time.minute()));
    map.insert("second".into(), json!(time.second()));
    map.insert("nanosecond".into(), json!(time.nanosecond()));
    map
}

fn duration(input: &str) -> Option<Map<String, Value>> {
    let captures = DURATION.captures(input)?;

    // `P` alone is not a duration.
    if captures.iter().skip(2).all(|group| group.is_none()) {
        return None;
    }

    let number = |index: usize| -> Option<i64> {
        match captures.get(index) {
            Some(group) => group.as_str().parse().ok(),
            None => Some(0),
        }
    };

    let sign = if captures.get(1).is_some() { -1 } else { 1 };
    let months = number(2)? * 12 + number(3)?;
    let days = number(4)? * 7 + number(5)?;
    let seconds = number(6)? * 3600 + number(7)? * 60 + number(8)?;
    let nanoseconds = match captures.get(9) {
        Some(fraction) => format!("{:0<9}", fraction.as_str()).parse::<i64>().ok()?,
        None => 0,
    };

    let mut map = Map::new();
    map.insert("months".into(), json!(sign * months));
    map.insert("days".into(), json!(sign * days));
    map.insert("seconds".into(), json!(sign * seconds));
    map.insert("nanoseconds".into(), json!(sign * nanoseconds));
    Some(map)
}
