//! Resolution of DTSTART/DTEND values into absolute instants.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Local, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

use super::property::ContentLine;

/// A resolved DTSTART/DTEND
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemporalEntry {
    pub instant: DateTime<Utc>,
    pub is_all_day: bool,
}

/// Memoized IANA zone lookups.
///
/// Append-only: both known and unknown names are cached, and entries are never
/// evicted. Safe to share between concurrent parse calls.
#[derive(Debug, Default)]
pub struct TimezoneCache {
    zones: RwLock<HashMap<String, Option<Tz>>>,
}

impl TimezoneCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a zone by name, caching the outcome
    pub fn resolve(&self, name: &str) -> Option<Tz> {
        let name = normalize_tzid(name);

        if let Some(zone) = self
            .zones
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
        {
            return *zone;
        }

        let zone = name.parse::<Tz>().ok();
        if zone.is_none() {
            tracing::debug!(tzid = name, "Unknown timezone identifier");
        }

        self.zones
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(name.to_string())
            .or_insert(zone);

        zone
    }

    /// Number of cached names, including unknown ones
    pub fn len(&self) -> usize {
        self.zones.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, name: &str) -> bool {
        self.zones
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(normalize_tzid(name))
    }
}

/// Strip quoting and the RFC 5545 globally-unique `/` prefix from a TZID
fn normalize_tzid(name: &str) -> &str {
    let name = name.trim().trim_matches('"');
    name.strip_prefix('/').unwrap_or(name)
}

/// Resolve a DTSTART/DTEND-style property.
///
/// The property's `TZID` wins over `default_timezone`; an unknown `TZID` falls
/// back to the default. With no usable zone, date-times are floating (host
/// local time) and dates start at midnight UTC.
pub fn resolve(
    line: &ContentLine,
    default_timezone: Option<&str>,
    timezones: &TimezoneCache,
) -> Option<TemporalEntry> {
    let value = line.value.trim();
    // Looked up only when a wall-clock value needs it
    let zone = || {
        line.param("TZID")
            .and_then(|tzid| timezones.resolve(tzid))
            .or_else(|| default_timezone.and_then(|tzid| timezones.resolve(tzid)))
    };

    let is_date = match line.param("VALUE") {
        Some(_) => line.has_param_value("VALUE", "DATE"),
        None => is_bare_date(value),
    };

    if is_date {
        let midnight = parse_date(value)?.and_time(NaiveTime::MIN);
        let instant = match zone() {
            Some(tz) => local_to_utc(midnight, &tz)?,
            None => midnight.and_utc(),
        };
        return Some(TemporalEntry {
            instant,
            is_all_day: true,
        });
    }

    let (naive, is_utc) = parse_date_time(value)?;
    let instant = if is_utc {
        naive.and_utc()
    } else if let Some(tz) = zone() {
        local_to_utc(naive, &tz)?
    } else {
        local_to_utc(naive, &Local)?
    };

    Some(TemporalEntry {
        instant,
        is_all_day: false,
    })
}

/// Convert wall-clock components in `zone` to UTC.
///
/// Unambiguous times use the zone database directly. Repeated times (DST
/// overlap) take the earlier instant. Skipped times (DST gap) fall back to
/// [`reverse_offset`].
pub fn local_to_utc<Z: TimeZone>(naive: NaiveDateTime, zone: &Z) -> Option<DateTime<Utc>> {
    match zone.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Some(dt.with_timezone(&Utc)),
        LocalResult::Ambiguous(earliest, _) => Some(earliest.with_timezone(&Utc)),
        LocalResult::None => reverse_offset(naive, zone),
    }
}

/// Offset reversal: treat the wall clock as a UTC guess, read the zone's wall
/// clock at that guess, and subtract the observed offset from the guess.
///
/// Exact away from transitions; inside a transition window the result can be
/// off by the transition delta.
pub fn reverse_offset<Z: TimeZone>(naive: NaiveDateTime, zone: &Z) -> Option<DateTime<Utc>> {
    let guess = naive.and_utc();
    let zoned = guess.with_timezone(zone).naive_local();
    let offset = zoned.signed_duration_since(naive);
    guess.checked_sub_signed(offset)
}

fn is_bare_date(value: &str) -> bool {
    value.len() == 8 && value.bytes().all(|b| b.is_ascii_digit())
}

fn digits(text: &str) -> Option<u32> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

/// `YYYYMMDD`
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    if value.len() != 8 {
        return None;
    }
    let year = digits(value.get(0..4)?)?;
    let month = digits(value.get(4..6)?)?;
    let day = digits(value.get(6..8)?)?;
    NaiveDate::from_ymd_opt(i32::try_from(year).ok()?, month, day)
}

/// `YYYYMMDDTHHMMSS[Z]`, returning the components and whether they are UTC
pub fn parse_date_time(value: &str) -> Option<(NaiveDateTime, bool)> {
    let (body, is_utc) = match value.strip_suffix(['Z', 'z']) {
        Some(body) => (body, true),
        None => (value, false),
    };

    let (date, time) = body.split_once(['T', 't'])?;
    let date = parse_date(date)?;

    if time.len() != 6 {
        return None;
    }
    let hour = digits(time.get(0..2)?)?;
    let minute = digits(time.get(2..4)?)?;
    let second = digits(time.get(4..6)?)?;
    let time = NaiveTime::from_hms_opt(hour, minute, second)?;

    Some((date.and_time(time), is_utc))
}
