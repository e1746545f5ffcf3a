use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

use crate::domain::RsvpError;

/// A single attendance confirmation as stored by the remote collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub id: Option<i64>,
    pub name: String,
    pub party_size: u32,
    pub attending: bool,
    pub created_at: Option<DateTime<Utc>>,
}

impl Record {
    /// Builds a record the way the public confirmation form does.
    /// The name is trimmed and must not be empty, a decline never carries a party.
    pub fn confirmation(name: &str, party_size: u32, attending: bool) -> Result<Self, RsvpError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(RsvpError::InvalidRecord {
                row: None,
                reason: "name must not be empty".to_string(),
            });
        }
        Ok(Record {
            id: None,
            name: name.to_string(),
            party_size: if attending { party_size } else { 0 },
            attending,
            created_at: None,
        })
    }

    pub fn with_id(mut self, id: Option<i64>) -> Self {
        self.id = id;
        self
    }

    pub fn with_created_at(mut self, created_at: Option<DateTime<Utc>>) -> Self {
        self.created_at = created_at;
        self
    }

    // Missing timestamps sort as the epoch
    pub fn created_at_millis(&self) -> i64 {
        self.created_at
            .map(|t| t.timestamp_millis())
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AttendanceFilter {
    #[default]
    ATTENDING,
    DECLINED,
    ALL,
}

impl AttendanceFilter {
    pub fn matches(&self, record: &Record) -> bool {
        match self {
            AttendanceFilter::ATTENDING => record.attending,
            AttendanceFilter::DECLINED => !record.attending,
            AttendanceFilter::ALL => true,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AttendanceFilter::ATTENDING => "attending",
            AttendanceFilter::DECLINED => "declined",
            AttendanceFilter::ALL => "all",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    #[default]
    NAME,
    PARTY,
    CREATED,
}

impl SortKey {
    pub fn compare(&self, a: &Record, b: &Record) -> Ordering {
        match self {
            SortKey::NAME => collate(&a.name, &b.name),
            SortKey::PARTY => a.party_size.cmp(&b.party_size),
            SortKey::CREATED => a.created_at_millis().cmp(&b.created_at_millis()),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SortKey::NAME => "Name",
            SortKey::PARTY => "Party",
            SortKey::CREATED => "Submitted",
        }
    }
}

fn fold(s: &str, strip_accents: bool) -> String {
    s.nfd()
        .filter(|c| !(strip_accents && is_combining_mark(*c)))
        .collect::<String>()
        .to_lowercase()
}

/// Locale-like comparison of two names.
///
/// Base letters decide first (accents and case ignored), then accents, then
/// case with lowercase ordered before uppercase. Names that only differ in
/// normalization form compare equal.
pub fn collate(a: &str, b: &str) -> Ordering {
    fold(a, true)
        .cmp(&fold(b, true))
        .then_with(|| fold(a, false).cmp(&fold(b, false)))
        .then_with(|| {
            // Same letters at this point, the case pattern decides
            let a = a.nfd().map(|c| c.is_uppercase());
            let b = b.nfd().map(|c| c.is_uppercase());
            a.cmp(b)
        })
}
