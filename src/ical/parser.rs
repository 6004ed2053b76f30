use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::event::{CalendarEvent, finalize};
use super::property::{ContentLine, EventProperties, PropertyName, tokenize};
use super::temporal::TimezoneCache;
use super::unfold::unfold;

/// Restricts output to events overlapping `[start, end)`. A missing bound is
/// unbounded on that side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Window {
    #[serde(default)]
    pub start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end: Option<DateTime<Utc>>,
}

impl Window {
    /// Half-open exclusion: an event that only touches a bound is outside
    pub fn excludes(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start.is_some_and(|bound| end <= bound) || self.end.is_some_and(|bound| start >= bound)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ParseOptions {
    /// Keep events whose STATUS is CANCELLED
    #[serde(default)]
    pub include_cancelled: bool,
    #[serde(default)]
    pub window: Window,
    /// IANA zone for DTSTART/DTEND values without a TZID
    #[serde(default)]
    pub default_timezone: Option<String>,
}

/// Accumulator for one open VEVENT block
#[derive(Debug, Default)]
struct EventBlock {
    properties: EventProperties,
    /// Depth of sub-components (VALARM, ...) currently open inside the event
    nested: usize,
}

impl EventBlock {
    fn accept(&mut self, line: ContentLine) {
        match line.name {
            PropertyName::Begin => self.nested += 1,
            PropertyName::End => self.nested = self.nested.saturating_sub(1),
            _ if self.nested == 0 => self.properties.push(line),
            _ => {}
        }
    }
}

#[derive(Debug)]
enum ScanState {
    Idle,
    InEvent(EventBlock),
}

/// ICS feed parser.
///
/// Holds the timezone cache shared by every parse call made through it, so a
/// single instance can serve concurrent callers.
#[derive(Debug, Default)]
pub struct IcsParser {
    timezones: TimezoneCache,
}

impl IcsParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timezones(&self) -> &TimezoneCache {
        &self.timezones
    }

    /// Parse a feed into events sorted by start.
    ///
    /// Malformed lines and VEVENT blocks are skipped; the rest of the feed is
    /// still returned. Bytes that are not valid UTF-8 are replaced.
    pub fn parse(&self, source: impl AsRef<[u8]>, options: &ParseOptions) -> Vec<CalendarEvent> {
        let text = String::from_utf8_lossy(source.as_ref());
        let text = text.strip_prefix('\u{feff}').unwrap_or(&*text);

        let mut events = Vec::new();
        let mut skipped = 0usize;
        let mut state = ScanState::Idle;

        for line in unfold(text) {
            let Some(line) = tokenize(&line) else {
                continue;
            };

            state = match state {
                ScanState::Idle if line.begins("VEVENT") => ScanState::InEvent(EventBlock::default()),
                ScanState::Idle => ScanState::Idle,
                ScanState::InEvent(block) if line.ends("VEVENT") => {
                    match finalize(&block.properties, options, &self.timezones) {
                        Ok(event) => events.push(event),
                        Err(reason) => {
                            skipped += 1;
                            tracing::debug!(
                                uid = block.properties.uid.first().map(|l| l.value.as_str()),
                                %reason,
                                "Skipping VEVENT"
                            );
                        }
                    }
                    ScanState::Idle
                }
                ScanState::InEvent(_) if line.begins("VEVENT") => {
                    skipped += 1;
                    tracing::debug!("Discarding VEVENT without END:VEVENT");
                    ScanState::InEvent(EventBlock::default())
                }
                ScanState::InEvent(mut block) => {
                    block.accept(line);
                    ScanState::InEvent(block)
                }
            };
        }

        if let ScanState::InEvent(_) = state {
            skipped += 1;
            tracing::debug!("Discarding unterminated VEVENT at end of input");
        }

        events.sort_by_key(CalendarEvent::start);

        tracing::debug!(events = events.len(), skipped, "Parsed calendar feed");

        events
    }
}

/// Parse a feed with a throwaway parser.
///
/// Prefer a long-lived [`IcsParser`] when parsing many feeds so timezone
/// lookups are shared.
pub fn parse_calendar(source: impl AsRef<[u8]>, options: &ParseOptions) -> Vec<CalendarEvent> {
    IcsParser::new().parse(source, options)
}
