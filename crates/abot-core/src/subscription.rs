//! Payment flag and subscription date arithmetic.
//!
//! Everything here is pure: current record state + command argument in, new
//! field value (or "nothing to do") out.

use std::sync::OnceLock;

use chrono::{Duration, NaiveDate};
use regex::Regex;
use serde_json::Value;

use crate::{
    applicant::{Row, EXPIRATION_COLUMN, PAYMENT_COLUMN},
    domain::PaymentStatus,
    errors::Error,
    Result,
};

/// Upper bound for a single extension, in days.
pub const MAX_EXTENSION_DAYS: i64 = 3650;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Result of applying a value to a field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Changed,
    Unchanged,
}

/// Patch setting the payment flag, or `None` when it already has that value.
pub fn payment_patch(current: Option<PaymentStatus>, target: PaymentStatus) -> Option<Row> {
    if current == Some(target) {
        return None;
    }
    let mut row = Row::new();
    row.insert(
        PAYMENT_COLUMN.to_string(),
        Value::String(target.as_str().to_string()),
    );
    Some(row)
}

pub fn expiration_patch(date: NaiveDate) -> Row {
    let mut row = Row::new();
    row.insert(
        EXPIRATION_COLUMN.to_string(),
        Value::String(date.format(DATE_FORMAT).to_string()),
    );
    row
}

/// Accepts exactly `YYYY-MM-DD` naming a real calendar date. Past dates are allowed.
pub fn parse_subscription_date(input: &str) -> Result<NaiveDate> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("valid regex"));

    let input = input.trim();
    if !re.is_match(input) {
        return Err(Error::InvalidArgument(format!(
            "'{input}' is not in YYYY-MM-DD format (e.g. 2024-12-31)"
        )));
    }
    NaiveDate::parse_from_str(input, DATE_FORMAT)
        .map_err(|_| Error::InvalidArgument(format!("'{input}' is not a valid calendar date")))
}

/// Accepts an optionally signed whole number of days.
pub fn parse_extension_days(input: &str) -> Result<i64> {
    let input = input.trim();
    let days = input
        .parse::<i64>()
        .map_err(|_| Error::InvalidArgument(format!("'{input}' is not a whole number of days")))?;
    if days.abs() > MAX_EXTENSION_DAYS {
        return Err(Error::InvalidArgument(format!(
            "cannot extend by more than {MAX_EXTENSION_DAYS} days at once"
        )));
    }
    Ok(days)
}

/// Date an extension is counted from: the current expiration when one is set,
/// otherwise today.
pub fn extension_base(current: Option<NaiveDate>, today: NaiveDate) -> NaiveDate {
    current.unwrap_or(today)
}

pub fn extend(current: Option<NaiveDate>, today: NaiveDate, days: i64) -> Result<NaiveDate> {
    extension_base(current, today)
        .checked_add_signed(Duration::days(days))
        .ok_or_else(|| Error::InvalidArgument(format!("extending by {days} days overflows")))
}

/// Whole days until `expiration` (negative once lapsed).
pub fn days_left(expiration: NaiveDate, today: NaiveDate) -> i64 {
    (expiration - today).num_days()
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}
