use derive_more::{Display, From};
use serde::{Deserialize, Serialize};
use std::{
    fmt::{self, Debug},
    sync::OnceLock,
};
use thiserror::Error as ThisError;
use time::{
    Date as TimeDate, Month,
    format_description::{self, FormatItem},
};

static DATE_FORMAT: OnceLock<Vec<FormatItem<'static>>> = OnceLock::new();

///
/// Key
///
/// Engine-allocated numeric primary key.
///

#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Deserialize,
    Display,
    Eq,
    From,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
)]
#[repr(transparent)]
pub struct Key(u64);

impl Key {
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

///
/// SessionId
///
/// Process-unique identifier for one unit-of-work session.
///

#[derive(
    Clone, Copy, Debug, Default, Deserialize, Display, Eq, Hash, Ord, PartialEq, PartialOrd,
    Serialize,
)]
#[repr(transparent)]
pub struct SessionId(u64);

impl SessionId {
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

///
/// DateError
///

#[derive(Debug, ThisError)]
pub enum DateError {
    #[error("invalid calendar date: {0}")]
    InvalidCalendarDate(String),
}

///
/// Date
///
/// Calendar date stored as whole days since the Unix epoch.
///

#[derive(
    Clone, Copy, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
#[repr(transparent)]
pub struct Date(i32);

impl Date {
    pub const EPOCH: Self = Self(0);

    fn epoch_date() -> TimeDate {
        // Constant valid date.
        TimeDate::from_calendar_date(1970, Month::January, 1).unwrap_or(TimeDate::MIN)
    }

    pub fn from_calendar(year: i32, month: u8, day: u8) -> Result<Self, DateError> {
        let month = Month::try_from(month)
            .map_err(|err| DateError::InvalidCalendarDate(err.to_string()))?;
        let date = TimeDate::from_calendar_date(year, month, day)
            .map_err(|err| DateError::InvalidCalendarDate(err.to_string()))?;

        Ok(Self(date.to_julian_day() - Self::epoch_date().to_julian_day()))
    }

    #[must_use]
    pub const fn from_days_since_epoch(days: i32) -> Self {
        Self(days)
    }

    #[must_use]
    pub const fn days_since_epoch(self) -> i32 {
        self.0
    }

    fn to_time(self) -> Option<TimeDate> {
        let julian = Self::epoch_date().to_julian_day().checked_add(self.0)?;

        TimeDate::from_julian_day(julian).ok()
    }

    fn format_items() -> &'static [FormatItem<'static>] {
        DATE_FORMAT.get_or_init(|| {
            format_description::parse("[year]-[month]-[day]").unwrap_or_default()
        })
    }
}

impl fmt::Display for Date {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_time().and_then(|d| d.format(Self::format_items()).ok()) {
            Some(formatted) => write!(f, "{formatted}"),
            None => write!(f, "{}d", self.0),
        }
    }
}

///
/// Decimal
///
/// Fixed-point numeric wrapper for metrics-style fields.
///

#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Deserialize,
    Display,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
)]
#[repr(transparent)]
pub struct Decimal(rust_decimal::Decimal);

impl Decimal {
    pub const ZERO: Self = Self(rust_decimal::Decimal::ZERO);

    /// `value == mantissa * 10^-scale`, mantissa carries the sign.
    #[must_use]
    pub fn new(mantissa: i64, scale: u32) -> Self {
        Self(rust_decimal::Decimal::new(mantissa, scale))
    }
}

impl From<i64> for Decimal {
    fn from(value: i64) -> Self {
        Self(rust_decimal::Decimal::from(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_round_trips_calendar_components() {
        let date = Date::from_calendar(2009, 12, 18).expect("valid date");

        assert_eq!(date.to_string(), "2009-12-18");
        assert!(date > Date::EPOCH);
    }

    #[test]
    fn date_epoch_displays_epoch_day() {
        assert_eq!(Date::EPOCH.to_string(), "1970-01-01");
        assert_eq!(Date::EPOCH.days_since_epoch(), 0);
    }

    #[test]
    fn date_rejects_invalid_components() {
        assert!(Date::from_calendar(2009, 13, 1).is_err());
        assert!(Date::from_calendar(2009, 2, 30).is_err());
    }

    #[test]
    fn decimal_orders_by_numeric_value() {
        let small = Decimal::new(4_20, 2);
        let large = Decimal::new(12_345_600, 6);

        assert!(small < large);
        assert_eq!(Decimal::new(1_000, 3), Decimal::from(1));
    }
}
