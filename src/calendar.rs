//! # Calendar / Schedule assembly
//!
//! ## Responsibility
//! Turn normalized rooms into the two time-based surfaces: a month grid
//! (rooms grouped by calendar date) and a chronologically ordered schedule.
//!
//! ## Guarantees
//! - Grouping compares parsed [`NaiveDate`]s, so a room lands in exactly the
//!   cell for its date regardless of how the server padded the string.
//! - The grid always holds every day of the month: 5 rows normally, 6 when
//!   the leading blanks push the last days past the fifth row.
//! - Schedule order: date ascending, then start time ascending. Rooms without
//!   a start time sort last within their date; rooms without a date sort
//!   after every dated room. Ties keep their input order.

use std::collections::BTreeMap;

use chrono::{Datelike, Duration, NaiveDate, Weekday};

use crate::error::{Result, StudyRoomError};
use crate::normalize::RoomView;

const DAYS_PER_WEEK: usize = 7;
const MIN_CELLS: usize = 35;
const UNKNOWN_HOST: &str = "Unknown";

/// Rooms keyed by their parsed date. Undated rooms are left out.
pub type DateGroups<'a> = BTreeMap<NaiveDate, Vec<&'a RoomView>>;

pub fn group_by_date<'a>(rooms: impl IntoIterator<Item = &'a RoomView>) -> DateGroups<'a> {
    let mut groups: DateGroups<'a> = BTreeMap::new();
    for room in rooms {
        if let Some(date) = room.date {
            groups.entry(date).or_default().push(room);
        }
    }
    groups
}

// ---------------------------------------------------------------------------
// Month grid
// ---------------------------------------------------------------------------

/// Sunday-first month grid: leading blanks, then one cell per day, padded
/// with trailing blanks to whole weeks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthGrid {
    first: NaiveDate,
    days_in_month: u32,
    cells: Vec<Option<NaiveDate>>,
}

impl MonthGrid {
    pub fn new(year: i32, month: u32) -> Result<Self> {
        let first = NaiveDate::from_ymd_opt(year, month, 1)
            .ok_or_else(|| StudyRoomError::Invalid(format!("no such month: {year}-{month:02}")))?;
        let days_in_month = days_in_month(first);
        let leading = first.weekday().num_days_from_sunday() as usize;

        let used = leading + days_in_month as usize;
        let total = used.div_ceil(DAYS_PER_WEEK).max(MIN_CELLS / DAYS_PER_WEEK) * DAYS_PER_WEEK;

        let mut cells = vec![None; leading];
        cells.extend((1..=days_in_month).map(|d| first.with_day(d)));
        cells.resize(total, None);
        Ok(Self {
            first,
            days_in_month,
            cells,
        })
    }

    /// The grid for the month containing `date`.
    pub fn containing(date: NaiveDate) -> Result<Self> {
        Self::new(date.year(), date.month())
    }

    pub fn year(&self) -> i32 {
        self.first.year()
    }

    pub fn month(&self) -> u32 {
        self.first.month()
    }

    pub fn days_in_month(&self) -> u32 {
        self.days_in_month
    }

    /// e.g. `March 2024`.
    pub fn title(&self) -> String {
        self.first.format("%B %Y").to_string()
    }

    pub fn cells(&self) -> &[Option<NaiveDate>] {
        &self.cells
    }

    pub fn weeks(&self) -> impl Iterator<Item = &[Option<NaiveDate>]> {
        self.cells.chunks(DAYS_PER_WEEK)
    }

    pub fn previous(&self) -> Result<Self> {
        let prev = self
            .first
            .pred_opt()
            .ok_or_else(|| StudyRoomError::Invalid("calendar underflow".to_string()))?;
        Self::containing(prev)
    }

    pub fn next(&self) -> Result<Self> {
        let last = self.first + Duration::days(i64::from(self.days_in_month));
        Self::containing(last)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date.year() == self.year() && date.month() == self.month()
    }

    /// Rooms scheduled on `day` of this month. Out-of-range days are empty.
    pub fn rooms_on<'g, 'a>(&self, day: u32, groups: &'g DateGroups<'a>) -> &'g [&'a RoomView] {
        self.first
            .with_day(day)
            .and_then(|date| groups.get(&date))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// True when some rooms carry dates but none of them fall in this month.
    pub fn has_unplaced(&self, groups: &DateGroups<'_>) -> bool {
        !groups.is_empty() && !groups.keys().any(|d| self.contains(*d))
    }
}

fn days_in_month(first: NaiveDate) -> u32 {
    let (y, m) = if first.month() == 12 {
        (first.year() + 1, 1)
    } else {
        (first.year(), first.month() + 1)
    };
    NaiveDate::from_ymd_opt(y, m, 1)
        .and_then(|next| next.pred_opt())
        .map(|last| last.day())
        .unwrap_or(31)
}

// ---------------------------------------------------------------------------
// Schedule
// ---------------------------------------------------------------------------

/// Every room in chronological order.
pub fn schedule<'a>(rooms: impl IntoIterator<Item = &'a RoomView>) -> Vec<&'a RoomView> {
    let mut ordered: Vec<&RoomView> = rooms.into_iter().collect();
    ordered.sort_by_key(|r| (r.date.is_none(), r.date, r.start_time.is_none(), r.start_time));
    ordered
}

/// The schedule widget: rooms dated today or later (and undated rooms,
/// which sort last), capped at `limit`.
pub fn upcoming<'a>(
    rooms: impl IntoIterator<Item = &'a RoomView>,
    today: NaiveDate,
    limit: usize,
) -> Vec<&'a RoomView> {
    schedule(rooms)
        .into_iter()
        .filter(|r| r.date.map_or(true, |d| d >= today))
        .take(limit)
        .collect()
}

/// `Today`, `Tomorrow`, a short weekday name within the coming week, else
/// the ISO date.
pub fn day_label(date: NaiveDate, today: NaiveDate) -> String {
    match (date - today).num_days() {
        0 => "Today".to_string(),
        1 => "Tomorrow".to_string(),
        2..=6 => date.format("%a").to_string(),
        _ => date.format("%Y-%m-%d").to_string(),
    }
}

/// One column of the seven-day strip above the schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StripDay {
    pub date: NaiveDate,
    pub weekday: Weekday,
    pub is_today: bool,
}

impl StripDay {
    pub fn day_name(&self) -> String {
        self.date.format("%a").to_string()
    }
}

pub fn week_strip(today: NaiveDate) -> Vec<StripDay> {
    today
        .iter_days()
        .take(DAYS_PER_WEEK)
        .map(|date| StripDay {
            date,
            weekday: date.weekday(),
            is_today: date == today,
        })
        .collect()
}

/// Who to credit on a calendar entry: creator username, else host.
pub fn host_label(view: &RoomView) -> &str {
    view.creator
        .as_ref()
        .and_then(|c| c.username.as_deref())
        .filter(|u| !u.trim().is_empty())
        .or_else(|| Some(view.host.as_str()).filter(|h| !h.trim().is_empty()))
        .unwrap_or(UNKNOWN_HOST)
}
