use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use crate::db::models::Unit;

pub fn parse_datetime(value: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("failed to parse {field}"))
}

pub fn parse_unit(value: &str) -> Result<Unit> {
    value
        .parse::<Unit>()
        .with_context(|| format!("failed to parse unit column '{value}'"))
}

pub fn to_u64(value: i64, field: &str) -> Result<u64> {
    u64::try_from(value).with_context(|| format!("{field} contains negative value {value}"))
}
