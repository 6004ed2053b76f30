use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;

use crate::config::{Config, SourceConfig};
use crate::error::{Error, Result};
use crate::fetcher::Fetcher;
use crate::filter::{CompiledStep, process_events};
use crate::ical::{CalendarEvent, IcsParser, Window};

/// Events of one vendor gathered from all of its sources
#[derive(Debug)]
pub struct VendorEvents {
    pub events: Vec<CalendarEvent>,
    /// Sources that could not be loaded, keyed by URL
    pub errors: Vec<(String, Error)>,
}

impl VendorEvents {
    pub fn new(events: Vec<CalendarEvent>, errors: Vec<(String, Error)>) -> Self {
        Self { events, errors }
    }

    pub fn busy_slots(&self) -> Vec<BusySlot> {
        busy_slots(&self.events)
    }
}

/// A span during which the vendor is unavailable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BusySlot {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Merge blocking events into sorted, non-overlapping busy slots.
///
/// Transparent, cancelled and zero- or negative-length events do not block.
/// Overlapping or touching spans are coalesced.
pub fn busy_slots(events: &[CalendarEvent]) -> Vec<BusySlot> {
    let mut spans: Vec<BusySlot> = events
        .iter()
        .filter(|event| event.is_busy() && event.end() > event.start())
        .map(|event| BusySlot {
            start: event.start(),
            end: event.end(),
        })
        .collect();
    spans.sort_by_key(|slot| slot.start);

    let mut merged: Vec<BusySlot> = Vec::with_capacity(spans.len());
    for span in spans {
        match merged.last_mut() {
            Some(last) if span.start <= last.end => last.end = last.end.max(span.end),
            _ => merged.push(span),
        }
    }

    merged
}

/// Fetch, parse and filter every source of a vendor
pub async fn load_vendor(
    vendor_id: &str,
    config: &Config,
    fetcher: &Fetcher,
    parser: &IcsParser,
    window: Window,
) -> Result<VendorEvents> {
    let vendor = config
        .vendors
        .get(vendor_id)
        .ok_or_else(|| Error::VendorNotFound(vendor_id.to_string()))?;

    let futures: Vec<_> = vendor
        .sources
        .iter()
        .map(|source| {
            load_source(
                source,
                fetcher,
                parser,
                window,
                config.default_timezone.as_deref(),
            )
        })
        .collect();

    let results = join_all(futures).await;

    let mut all_events = Vec::new();
    let mut errors = Vec::new();

    for result in results {
        match result {
            Ok(events) => all_events.extend(events),
            Err((url, err)) => {
                tracing::warn!(vendor = vendor_id, url = %url, error = %err, "Failed to load source");
                errors.push((url, err));
            }
        }
    }

    // Vendor-level steps
    let vendor_steps = CompiledStep::compile_many(&vendor.steps)
        .map_err(|e| Error::Config(format!("Failed to compile vendor-level steps: {}", e)))?;
    let mut events = process_events(all_events, &vendor_steps);
    events.sort_by_key(CalendarEvent::start);

    tracing::info!(
        vendor = vendor_id,
        events = events.len(),
        failed_sources = errors.len(),
        "Loaded vendor calendar"
    );

    Ok(VendorEvents::new(events, errors))
}

/// Fetch and parse a single source, then apply its steps
async fn load_source(
    source: &SourceConfig,
    fetcher: &Fetcher,
    parser: &IcsParser,
    window: Window,
    fallback_timezone: Option<&str>,
) -> std::result::Result<Vec<CalendarEvent>, (String, Error)> {
    let url = source.url.clone();

    let body = fetcher.fetch(&source.url).await.map_err(|e| (url.clone(), e))?;

    let options = source.parse_options(window, fallback_timezone);
    let events = parser.parse(&body, &options);

    let steps = CompiledStep::compile_many(&source.steps).map_err(|e| (url.clone(), e))?;
    Ok(process_events(events, &steps))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MatchMode, ServerConfig, Step, VendorConfig};
    use crate::ical::{ParseOptions, parse_calendar};
    use chrono::TimeZone;
    use std::collections::HashMap;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    const GOOGLE_FEED: &str = r#"BEGIN:VCALENDAR
VERSION:2.0
PRODID:-//Google Inc//Google Calendar 70.9054//EN
BEGIN:VEVENT
UID:shoot-1@google.com
DTSTART:20240115T090000Z
DTEND:20240115T110000Z
SUMMARY:Booked: engagement shoot
END:VEVENT
BEGIN:VEVENT
UID:hold-1@google.com
DTSTART:20240116T090000Z
DTEND:20240116T100000Z
SUMMARY:Soft hold
END:VEVENT
END:VCALENDAR"#;

    const OUTLOOK_FEED: &str = r#"BEGIN:VCALENDAR
VERSION:2.0
PRODID:-//Microsoft Corporation//Outlook 16.0 MIMEDIR//EN
BEGIN:VEVENT
UID:outlook-1
DTSTART;TZID=Asia/Tashkent:20240115T150000
DTEND;TZID=Asia/Tashkent:20240115T170000
SUMMARY:Booked: studio
END:VEVENT
BEGIN:VEVENT
UID:outlook-2
DTSTART:20240117T090000Z
DTEND:20240117T100000Z
STATUS:CANCELLED
SUMMARY:Booked: cancelled
END:VEVENT
END:VCALENDAR"#;

    fn source(url: String) -> SourceConfig {
        SourceConfig {
            url,
            default_timezone: None,
            include_cancelled: false,
            steps: vec![],
        }
    }

    fn config_with(vendor: VendorConfig) -> Config {
        let mut vendors = HashMap::new();
        vendors.insert("studio".to_string(), vendor);
        Config {
            server: ServerConfig::default(),
            default_timezone: None,
            vendors,
        }
    }

    async fn mount(server: &MockServer, route: &str, body: &str) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_load_vendor_merges_sources() {
        let mock_server = MockServer::start().await;
        mount(&mock_server, "/google.ics", GOOGLE_FEED).await;
        mount(&mock_server, "/outlook.ics", OUTLOOK_FEED).await;

        let config = config_with(VendorConfig {
            sources: vec![
                source(format!("{}/google.ics", mock_server.uri())),
                source(format!("{}/outlook.ics", mock_server.uri())),
            ],
            steps: vec![],
        });

        let fetcher = Fetcher::new().unwrap();
        let parser = IcsParser::new();
        let result = load_vendor("studio", &config, &fetcher, &parser, Window::default())
            .await
            .unwrap();

        let uids: Vec<_> = result.events.iter().map(CalendarEvent::uid).collect();
        assert_eq!(uids, vec!["shoot-1@google.com", "outlook-1", "hold-1@google.com"]);
        assert!(result.errors.is_empty());
        assert!(parser.timezones().contains("Asia/Tashkent"));
    }

    #[tokio::test]
    async fn test_load_vendor_applies_steps_and_options() {
        let mock_server = MockServer::start().await;
        mount(&mock_server, "/google.ics", GOOGLE_FEED).await;
        mount(&mock_server, "/outlook.ics", OUTLOOK_FEED).await;

        let mut outlook = source(format!("{}/outlook.ics", mock_server.uri()));
        outlook.include_cancelled = true;

        let config = config_with(VendorConfig {
            sources: vec![source(format!("{}/google.ics", mock_server.uri())), outlook],
            steps: vec![Step::Deny {
                patterns: vec!["(?i)hold".to_string()],
                mode: MatchMode::Any,
                fields: vec!["summary".to_string()],
            }],
        });

        let fetcher = Fetcher::new().unwrap();
        let parser = IcsParser::new();
        let result = load_vendor("studio", &config, &fetcher, &parser, Window::default())
            .await
            .unwrap();

        let uids: Vec<_> = result.events.iter().map(CalendarEvent::uid).collect();
        assert_eq!(uids, vec!["shoot-1@google.com", "outlook-1", "outlook-2"]);
    }

    #[tokio::test]
    async fn test_load_vendor_window() {
        let mock_server = MockServer::start().await;
        mount(&mock_server, "/google.ics", GOOGLE_FEED).await;

        let config = config_with(VendorConfig {
            sources: vec![source(format!("{}/google.ics", mock_server.uri()))],
            steps: vec![],
        });

        let window = Window {
            start: Some(utc(2024, 1, 16, 0, 0, 0)),
            end: None,
        };
        let fetcher = Fetcher::new().unwrap();
        let result = load_vendor("studio", &config, &fetcher, &IcsParser::new(), window)
            .await
            .unwrap();

        assert_eq!(result.events.len(), 1);
        assert_eq!(result.events[0].uid(), "hold-1@google.com");
    }

    #[tokio::test]
    async fn test_partial_failure() {
        let mock_server = MockServer::start().await;
        mount(&mock_server, "/google.ics", GOOGLE_FEED).await;
        Mock::given(method("GET"))
            .and(path("/notfound.ics"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let config = config_with(VendorConfig {
            sources: vec![
                source(format!("{}/google.ics", mock_server.uri())),
                source(format!("{}/notfound.ics", mock_server.uri())),
            ],
            steps: vec![],
        });

        let fetcher = Fetcher::new().unwrap();
        let result = load_vendor("studio", &config, &fetcher, &IcsParser::new(), Window::default())
            .await
            .unwrap();

        assert_eq!(result.events.len(), 2);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].0.contains("notfound.ics"));
    }

    #[tokio::test]
    async fn test_unknown_vendor() {
        let config = config_with(VendorConfig {
            sources: vec![],
            steps: vec![],
        });
        let fetcher = Fetcher::new().unwrap();
        let result = load_vendor("nobody", &config, &fetcher, &IcsParser::new(), Window::default()).await;
        assert!(matches!(result, Err(Error::VendorNotFound(id)) if id == "nobody"));
    }

    #[test]
    fn test_busy_slots_merge_and_skip() {
        let feed = r#"BEGIN:VEVENT
UID:a
DTSTART:20240115T090000Z
DTEND:20240115T100000Z
END:VEVENT
BEGIN:VEVENT
UID:b
DTSTART:20240115T093000Z
DTEND:20240115T103000Z
END:VEVENT
BEGIN:VEVENT
UID:touching
DTSTART:20240115T103000Z
DTEND:20240115T110000Z
END:VEVENT
BEGIN:VEVENT
UID:free
DTSTART:20240115T120000Z
DTEND:20240115T130000Z
TRANSP:TRANSPARENT
END:VEVENT
BEGIN:VEVENT
UID:cancelled
DTSTART:20240115T140000Z
DTEND:20240115T150000Z
STATUS:CANCELLED
END:VEVENT
BEGIN:VEVENT
UID:instant
DTSTART:20240115T160000Z
END:VEVENT
BEGIN:VEVENT
UID:later
DTSTART:20240115T170000Z
DURATION:PT30M
END:VEVENT"#;
        let options = ParseOptions {
            include_cancelled: true,
            ..Default::default()
        };
        let events = parse_calendar(feed, &options);
        assert_eq!(events.len(), 7);

        assert_eq!(
            busy_slots(&events),
            vec![
                BusySlot {
                    start: utc(2024, 1, 15, 9, 0, 0),
                    end: utc(2024, 1, 15, 11, 0, 0),
                },
                BusySlot {
                    start: utc(2024, 1, 15, 17, 0, 0),
                    end: utc(2024, 1, 15, 17, 30, 0),
                },
            ]
        );
    }

    #[test]
    fn test_busy_slots_contained_span() {
        let feed = r#"BEGIN:VEVENT
DTSTART;VALUE=DATE:20240115
END:VEVENT
BEGIN:VEVENT
DTSTART:20240115T090000Z
DTEND:20240115T100000Z
END:VEVENT"#;
        let events = parse_calendar(feed, &ParseOptions::default());
        assert_eq!(
            busy_slots(&events),
            vec![BusySlot {
                start: utc(2024, 1, 15, 0, 0, 0),
                end: utc(2024, 1, 16, 0, 0, 0),
            }]
        );
    }
}
