use std::fmt;
use std::str::FromStr;

use chrono::{Days, Local, NaiveDate};
use thiserror::Error;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SnapshotDate(NaiveDate);

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid date '{0}', expected YYYY-MM-DD")]
pub struct InvalidDate(pub String);

impl SnapshotDate {
    pub fn today() -> Self {
        Self(Local::now().date_naive())
    }

    pub fn parse(value: &str) -> Result<Self, InvalidDate> {
        let trimmed = value.trim();
        // chrono accepts unpadded fields, the file naming scheme does not.
        if trimmed.len() != 10 {
            return Err(InvalidDate(trimmed.to_string()));
        }

        NaiveDate::parse_from_str(trimmed, DATE_FORMAT)
            .map(Self)
            .map_err(|_| InvalidDate(trimmed.to_string()))
    }

    pub fn previous(self) -> Option<Self> {
        self.0.checked_sub_days(Days::new(1)).map(Self)
    }
}

impl fmt::Display for SnapshotDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(DATE_FORMAT))
    }
}

impl FromStr for SnapshotDate {
    type Err = InvalidDate;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}
