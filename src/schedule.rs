use std::fmt;

use chrono::NaiveDate;

use crate::model::issue::Issue;
use crate::model::mapping::ProjectMapping;
use crate::util::display::normalize;

pub const SCHEDULED_DATE: &str = "scheduled_date";

/// Calendar day an issue is filed under. `NoDate` orders before every real
/// day, like the smallest representable date would, but prints as "no date".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GroupDate {
    NoDate,
    Day(NaiveDate),
}

impl fmt::Display for GroupDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupDate::NoDate => f.write_str("no date"),
            GroupDate::Day(day) => write!(f, "{}", day.format("%Y-%m-%d")),
        }
    }
}

/// Inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Undated issues always pass; only real days are range-checked.
    pub fn admits(&self, date: GroupDate) -> bool {
        match date {
            GroupDate::NoDate => true,
            GroupDate::Day(day) => self.start <= day && day <= self.end,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DateGroup {
    pub date: GroupDate,
    pub issues: Vec<Issue>,
}

/// Reads the leading `YYYY-MM-DD` of an ISO-8601 style string.
pub fn parse_day(value: &str) -> Option<NaiveDate> {
    let head = value.trim().get(..10)?;
    NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
}

/// The mapped scheduled date when the issue has one, else its creation
/// timestamp. Whichever is picked must parse, or the issue is undated.
pub fn group_date(issue: &Issue, mapping: &ProjectMapping) -> GroupDate {
    let scheduled = mapping
        .resolve(SCHEDULED_DATE)
        .and_then(|id| issue.field(id))
        .map(normalize)
        .filter(|s| !s.trim().is_empty());
    let raw = scheduled.or_else(|| issue.created().map(str::to_string));
    raw.as_deref()
        .and_then(parse_day)
        .map(GroupDate::Day)
        .unwrap_or(GroupDate::NoDate)
}

/// Filter by window, sort by (date, key) and split into runs of equal date.
/// Keys compare as plain strings, so "FS-10" sorts before "FS-2".
pub fn arrange(issues: Vec<Issue>, mapping: &ProjectMapping, window: &DateWindow) -> Vec<DateGroup> {
    let mut dated: Vec<(GroupDate, Issue)> = issues
        .into_iter()
        .map(|issue| (group_date(&issue, mapping), issue))
        .filter(|(date, _)| window.admits(*date))
        .collect();
    dated.sort_by(|(da, a), (db, b)| da.cmp(db).then_with(|| a.key.cmp(&b.key)));

    let mut groups: Vec<DateGroup> = Vec::new();
    for (date, issue) in dated {
        match groups.last_mut() {
            Some(group) if group.date == date => group.issues.push(issue),
            _ => groups.push(DateGroup {
                date,
                issues: vec![issue],
            }),
        }
    }
    groups
}
