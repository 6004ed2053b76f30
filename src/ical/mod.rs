pub mod duration;
pub mod event;
pub mod parser;
pub mod property;
pub mod temporal;
pub mod unfold;

pub use duration::parse_duration;
pub use event::{CalendarEvent, EventStatus, SkipReason, Transparency};
pub use parser::{IcsParser, ParseOptions, Window, parse_calendar};
pub use temporal::TimezoneCache;
