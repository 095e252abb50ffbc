//! xsd:dateTime values for the effective date.
//!
//! Only the lexical form `YYYY-MM-DDThh:mm:ss[.fff][Z|(+|-)hh:mm]` is
//! accepted. [`Display`](std::fmt::Display) re-emits the canonical form,
//! which is what ends up in `gml:beginPosition`.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// A validated xsd:dateTime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateTime {
    pub year: i32,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    /// Fractional-second digits as written (without the dot).
    pub fraction: Option<String>,
    /// Zeitzonen-Offset in Minuten; `None` = keine Zeitzone angegeben.
    pub tz_offset_minutes: Option<i16>,
}

impl DateTime {
    fn validate(&self) -> core::result::Result<(), ()> {
        let ok = (1..=9999).contains(&self.year)
            && (1..=12).contains(&self.month)
            && self.day >= 1
            && self.day <= days_in_month(self.year, self.month)
            && (self.hour < 24 || (self.hour == 24 && self.minute == 0 && self.second == 0))
            && self.minute < 60
            && self.second < 60
            && self.tz_offset_minutes.is_none_or(|tz| tz.abs() <= 14 * 60);
        if ok { Ok(()) } else { Err(()) }
    }
}

fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

fn days_in_month(year: i32, month: u8) -> u8 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 if is_leap_year(year) => 29,
        2 => 28,
        _ => 0,
    }
}

/// Feste Anzahl ASCII-Ziffern parsen.
fn digits<T: FromStr>(s: &str, len: usize) -> Option<T> {
    if s.len() != len || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

/// Extrahiert Timezone-Offset (`Z`, `+hh:mm`, `-hh:mm`) vom Ende des Zeitteils.
fn extract_timezone(time: &str) -> Option<(&str, Option<i16>)> {
    if let Some(without_z) = time.strip_suffix('Z') {
        return Some((without_z, Some(0)));
    }
    let Some(pos) = time.rfind(['+', '-']) else {
        return Some((time, None));
    };
    let tz = &time[pos..];
    if tz.len() != 6 || tz.as_bytes()[3] != b':' {
        return None;
    }
    let sign: i16 = if tz.starts_with('-') { -1 } else { 1 };
    let hours: i16 = digits(&tz[1..3], 2)?;
    let minutes: i16 = digits(&tz[4..6], 2)?;
    if minutes >= 60 {
        return None;
    }
    Some((&time[..pos], Some(sign * (hours * 60 + minutes))))
}

fn parse(value: &str) -> Option<DateTime> {
    let (date, time) = value.split_once('T')?;

    let mut date_parts = date.splitn(3, '-');
    let year_str = date_parts.next()?;
    if year_str.len() < 4 {
        return None;
    }
    let year: i32 = digits(year_str, year_str.len())?;
    let month: u8 = digits(date_parts.next()?, 2)?;
    let day: u8 = digits(date_parts.next()?, 2)?;

    let (time, tz_offset_minutes) = extract_timezone(time)?;
    let (hms, fraction) = match time.split_once('.') {
        Some((hms, frac)) => {
            if frac.is_empty() || !frac.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            (hms, Some(frac.to_string()))
        }
        None => (time, None),
    };
    let mut time_parts = hms.splitn(3, ':');
    let hour: u8 = digits(time_parts.next()?, 2)?;
    let minute: u8 = digits(time_parts.next()?, 2)?;
    let second: u8 = digits(time_parts.next()?, 2)?;

    let dt = DateTime {
        year,
        month,
        day,
        hour,
        minute,
        second,
        fraction,
        tz_offset_minutes,
    };
    dt.validate().ok()?;
    Some(dt)
}

impl FromStr for DateTime {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        parse(value.trim()).ok_or_else(|| Error::InvalidDateTime(value.to_string()))
    }
}

impl fmt::Display for DateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        )?;
        if let Some(frac) = &self.fraction {
            write!(f, ".{frac}")?;
        }
        match self.tz_offset_minutes {
            None => Ok(()),
            Some(0) => f.write_str("Z"),
            Some(offset) => {
                let sign = if offset < 0 { '-' } else { '+' };
                let abs = offset.unsigned_abs();
                write!(f, "{sign}{:02}:{:02}", abs / 60, abs % 60)
            }
        }
    }
}
