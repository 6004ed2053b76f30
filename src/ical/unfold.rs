//! Line unfolding for iCalendar content.
//!
//! Long content lines are split by inserting a line break followed by a single
//! space or horizontal tab (RFC 5545 section 3.1). Unfolding removes the break
//! and that one whitespace character.

/// Merge folded continuation lines into logical lines.
///
/// Accepts both `\r\n` and bare `\n` line endings. A continuation on the very
/// first line has nothing to attach to and is kept as its own line.
pub fn unfold(text: &str) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();

    for raw in text.split('\n') {
        let raw = raw.strip_suffix('\r').unwrap_or(raw);

        if let Some(continuation) = raw.strip_prefix([' ', '\t'])
            && let Some(previous) = lines.last_mut()
        {
            previous.push_str(continuation);
            continue;
        }

        lines.push(raw.to_string());
    }

    lines
}
