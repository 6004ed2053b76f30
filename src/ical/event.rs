use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use super::duration::parse_duration;
use super::parser::ParseOptions;
use super::property::{EventProperties, first_value};
use super::temporal::{self, TemporalEntry, TimezoneCache};

/// VEVENT STATUS
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    #[default]
    Confirmed,
    Tentative,
    Cancelled,
}

impl EventStatus {
    /// Unrecognized values map to `Confirmed`
    pub fn from_ical(value: &str) -> Self {
        match value.trim().to_ascii_uppercase().as_str() {
            "TENTATIVE" => Self::Tentative,
            "CANCELLED" => Self::Cancelled,
            _ => Self::Confirmed,
        }
    }
}

/// VEVENT TRANSP
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Transparency {
    /// Blocks availability
    #[default]
    Opaque,
    Transparent,
}

impl Transparency {
    /// Unrecognized values map to `Opaque`
    pub fn from_ical(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("TRANSPARENT") {
            Self::Transparent
        } else {
            Self::Opaque
        }
    }
}

/// A finalized calendar event. `start` is inclusive and `end` exclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEvent {
    uid: String,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    is_all_day: bool,
    status: EventStatus,
    transparency: Transparency,
    summary: Option<String>,
    description: Option<String>,
    location: Option<String>,
    sequence: i64,
    recurrence_rule: Option<String>,
}

impl CalendarEvent {
    pub fn uid(&self) -> &str {
        &self.uid
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn is_all_day(&self) -> bool {
        self.is_all_day
    }

    pub fn status(&self) -> EventStatus {
        self.status
    }

    pub fn transparency(&self) -> Transparency {
        self.transparency
    }

    pub fn summary(&self) -> Option<&str> {
        self.summary.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    pub fn sequence(&self) -> i64 {
        self.sequence
    }

    /// Raw RRULE value; occurrences are never expanded
    pub fn recurrence_rule(&self) -> Option<&str> {
        self.recurrence_rule.as_deref()
    }

    /// Whether the event occupies the vendor's time
    pub fn is_busy(&self) -> bool {
        self.transparency == Transparency::Opaque && self.status != EventStatus::Cancelled
    }
}

/// Why a VEVENT block produced no event
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SkipReason {
    #[error("missing DTSTART")]
    MissingStart,

    #[error("unparsable DTSTART '{0}'")]
    InvalidStart(String),

    #[error("event is cancelled")]
    Cancelled,

    #[error("event lies outside the requested window")]
    OutsideWindow,
}

/// Build one event from the properties of a VEVENT block.
pub fn finalize(
    props: &EventProperties,
    options: &ParseOptions,
    timezones: &TimezoneCache,
) -> Result<CalendarEvent, SkipReason> {
    let default_timezone = options.default_timezone.as_deref();

    let start_line = props.dtstart.first().ok_or(SkipReason::MissingStart)?;
    let start = temporal::resolve(start_line, default_timezone, timezones)
        .ok_or_else(|| SkipReason::InvalidStart(start_line.value.clone()))?;

    let end = resolve_end(props, start, default_timezone, timezones);
    let is_all_day = start.is_all_day || end.is_all_day;

    let status = first_value(&props.status)
        .map(EventStatus::from_ical)
        .unwrap_or_default();
    if status == EventStatus::Cancelled && !options.include_cancelled {
        return Err(SkipReason::Cancelled);
    }

    let transparency = first_value(&props.transp)
        .map(Transparency::from_ical)
        .unwrap_or_default();

    let uid = match first_value(&props.uid) {
        Some(uid) if !uid.trim().is_empty() => uid.to_string(),
        _ => fallback_uid(start.instant, end.instant),
    };

    let sequence = first_value(&props.sequence)
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(0);

    if options.window.excludes(start.instant, end.instant) {
        return Err(SkipReason::OutsideWindow);
    }

    Ok(CalendarEvent {
        uid,
        start: start.instant,
        end: end.instant,
        is_all_day,
        status,
        transparency,
        summary: first_value(&props.summary).map(str::to_string),
        description: first_value(&props.description).map(str::to_string),
        location: first_value(&props.location).map(str::to_string),
        sequence,
        recurrence_rule: first_value(&props.rrule).map(str::to_string),
    })
}

/// DTEND, else DTSTART + DURATION, else one day for all-day events and a
/// zero-length span otherwise.
fn resolve_end(
    props: &EventProperties,
    start: TemporalEntry,
    default_timezone: Option<&str>,
    timezones: &TimezoneCache,
) -> TemporalEntry {
    if let Some(line) = props.dtend.first() {
        match temporal::resolve(line, default_timezone, timezones) {
            Some(end) => return end,
            None => tracing::debug!(value = %line.value, "Ignoring unparsable DTEND"),
        }
    }

    let from_duration = first_value(&props.duration)
        .and_then(parse_duration)
        .and_then(|ms| start.instant.checked_add_signed(TimeDelta::milliseconds(ms)));
    if let Some(instant) = from_duration {
        return TemporalEntry {
            instant,
            is_all_day: false,
        };
    }

    let instant = if start.is_all_day {
        start
            .instant
            .checked_add_signed(TimeDelta::days(1))
            .unwrap_or(start.instant)
    } else {
        start.instant
    };

    TemporalEntry {
        instant,
        is_all_day: false,
    }
}

/// Deterministic identifier for events without a UID
pub fn fallback_uid(start: DateTime<Utc>, end: DateTime<Utc>) -> String {
    format!(
        "wt:{}:{}",
        start.to_rfc3339_opts(SecondsFormat::Millis, true),
        end.to_rfc3339_opts(SecondsFormat::Millis, true)
    )
}
