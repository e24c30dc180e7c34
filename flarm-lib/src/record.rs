//! Recorded flight metadata as reported by `GETRECORDINFO`.
//!
//! The device answers with a `|`-separated ASCII line. Two layouts are seen
//! in the field:
//!
//! ```text
//! 18CG6NG1.IGC|2011-08-12|12:23:48|02:03:25|TOBIAS BIENIEK|TH|Club   (firmware 5.03)
//! 2000-11-08|20:05:21|01:21:09|J.Doe|XYZ|15M                        (documented)
//! ```
//!
//! Only date, start time and duration are used. Pilot name, class and
//! glider id are skipped.

use crate::constants::{DEFAULT_LIST_CAPACITY, MAX_DATE_FIELD_LEN};
use crate::error::FlarmError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Add;
use std::str::FromStr;

const FIELD_SEPARATOR: char = '|';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BrokenDate {
    pub year: u32,
    pub month: u32,
    pub day: u32,
}

impl BrokenDate {
    pub fn new(year: u32, month: u32, day: u32) -> Self {
        Self { year, month, day }
    }

    /// Calendar date, if the fields form one
    pub fn to_naive_date(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(i32::try_from(self.year).ok()?, self.month, self.day)
    }
}

impl fmt::Display for BrokenDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }
}

impl FromStr for BrokenDate {
    type Err = FlarmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_date(s).ok_or_else(|| FlarmError::InvalidRecordInfo(format!("bad date {s:?}")))
    }
}

/// Time of day or duration. Hours are not wrapped at 24.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BrokenTime {
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
}

impl BrokenTime {
    pub fn new(hour: u32, minute: u32, second: u32) -> Self {
        Self { hour, minute, second }
    }
}

impl fmt::Display for BrokenTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}:{:02}", self.hour, self.minute, self.second)
    }
}

impl FromStr for BrokenTime {
    type Err = FlarmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_time(s).ok_or_else(|| FlarmError::InvalidRecordInfo(format!("bad time {s:?}")))
    }
}

/// Component-wise sum. Carry happens only once a component exceeds 60, so
/// a sum of exactly 60 seconds stays `:60`.
impl Add for BrokenTime {
    type Output = BrokenTime;

    fn add(self, rhs: BrokenTime) -> BrokenTime {
        let mut hour = self.hour.saturating_add(rhs.hour);
        let mut minute = self.minute.saturating_add(rhs.minute);
        let mut second = self.second.saturating_add(rhs.second);

        while second > 60 {
            second -= 60;
            minute = minute.saturating_add(1);
        }

        while minute > 60 {
            minute -= 60;
            hour = hour.saturating_add(1);
        }

        BrokenTime { hour, minute, second }
    }
}

/// Leading decimal digits of `s` and the rest of the string
fn take_number<T: FromStr>(s: &str) -> Option<(T, &str)> {
    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    if end == 0 {
        return None;
    }
    let value = s[..end].parse().ok()?;
    Some((value, &s[end..]))
}

/// Three numbers separated by `separator`. Text after the third is ignored.
fn take_triple<A: FromStr, B: FromStr, C: FromStr>(s: &str, separator: char) -> Option<(A, B, C)> {
    let (a, rest) = take_number(s)?;
    let rest = rest.strip_prefix(separator)?;
    let (b, rest) = take_number(rest)?;
    let rest = rest.strip_prefix(separator)?;
    let (c, _) = take_number(rest)?;
    Some((a, b, c))
}

/// Parse `YYYY-MM-DD`. Only the structure is checked, not the ranges.
pub fn parse_date(s: &str) -> Option<BrokenDate> {
    let (year, month, day) = take_triple(s, '-')?;
    Some(BrokenDate { year, month, day })
}

/// Parse `HH:MM:SS`. Only the structure is checked, not the ranges.
pub fn parse_time(s: &str) -> Option<BrokenTime> {
    let (hour, minute, second) = take_triple(s, ':')?;
    Some(BrokenTime { hour, minute, second })
}

/// One recorded flight in the device's log memory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedFlightInfo {
    pub date: BrokenDate,
    pub start_time: BrokenTime,
    pub end_time: BrokenTime,
    /// Record number used with `SELECTRECORD`
    pub index: u8,
}

impl fmt::Display for RecordedFlightInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{:<3} {} {} - {}",
            self.index, self.date, self.start_time, self.end_time
        )
    }
}

/// Walks the `|`-separated fields of a record info line
struct FieldCursor<'a> {
    rest: &'a str,
}

impl<'a> FieldCursor<'a> {
    fn new(text: &'a str) -> Self {
        Self { rest: text }
    }

    /// Next field. It must be terminated by a separator and followed by
    /// something, otherwise the line is considered truncated.
    fn next_field(&mut self) -> Option<&'a str> {
        let (field, rest) = self.rest.split_once(FIELD_SEPARATOR)?;
        if rest.is_empty() {
            return None;
        }
        self.rest = rest;
        Some(field)
    }
}

/// Parse a record info line into a flight tagged with `index`
pub fn parse_record_info(text: &str, index: u8) -> Option<RecordedFlightInfo> {
    let mut fields = FieldCursor::new(text);

    let mut date_field = fields.next_field()?;
    // Firmware 5.x puts the IGC file name first; a date is never that long
    if date_field.len() > MAX_DATE_FIELD_LEN {
        date_field = fields.next_field()?;
    }
    let date = parse_date(date_field)?;

    let start_time = parse_time(fields.next_field()?)?;
    let duration = parse_time(fields.next_field()?)?;

    Some(RecordedFlightInfo {
        date,
        start_time,
        end_time: start_time + duration,
        index,
    })
}

/// Append-only list of flights with a fixed capacity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedFlightList {
    flights: Vec<RecordedFlightInfo>,
    capacity: usize,
}

impl Default for RecordedFlightList {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordedFlightList {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_LIST_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            flights: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a flight. Hands it back if the list is already full.
    pub fn push(&mut self, flight: RecordedFlightInfo) -> Result<(), RecordedFlightInfo> {
        if self.is_full() {
            return Err(flight);
        }
        self.flights.push(flight);
        Ok(())
    }

    pub fn is_full(&self) -> bool {
        self.flights.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.flights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flights.is_empty()
    }

    pub fn get(&self, i: usize) -> Option<&RecordedFlightInfo> {
        self.flights.get(i)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RecordedFlightInfo> {
        self.flights.iter()
    }

    pub fn as_slice(&self) -> &[RecordedFlightInfo] {
        &self.flights
    }
}

impl<'a> IntoIterator for &'a RecordedFlightList {
    type Item = &'a RecordedFlightInfo;
    type IntoIter = std::slice::Iter<'a, RecordedFlightInfo>;

    fn into_iter(self) -> Self::IntoIter {
        self.flights.iter()
    }
}
