//! Content line tokenizer and per-event property accumulation.

use std::collections::HashMap;

/// Property names the parser acts on. Everything else is kept as `Other`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyName {
    Begin,
    End,
    DtStart,
    DtEnd,
    Duration,
    Status,
    Transp,
    Uid,
    Summary,
    Description,
    Location,
    Sequence,
    RRule,
    Other(String),
}

impl PropertyName {
    /// Match an already upper-cased property name
    fn from_upper(name: String) -> Self {
        match name.as_str() {
            "BEGIN" => Self::Begin,
            "END" => Self::End,
            "DTSTART" => Self::DtStart,
            "DTEND" => Self::DtEnd,
            "DURATION" => Self::Duration,
            "STATUS" => Self::Status,
            "TRANSP" => Self::Transp,
            "UID" => Self::Uid,
            "SUMMARY" => Self::Summary,
            "DESCRIPTION" => Self::Description,
            "LOCATION" => Self::Location,
            "SEQUENCE" => Self::Sequence,
            "RRULE" => Self::RRule,
            _ => Self::Other(name),
        }
    }
}

/// One tokenized content line: `NAME;PARAM=V1,V2:VALUE`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentLine {
    pub name: PropertyName,
    pub params: HashMap<String, Vec<String>>,
    pub value: String,
}

impl ContentLine {
    /// First value of a parameter
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .get(name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// Whether any value of the parameter equals `value`, ignoring ASCII case
    pub fn has_param_value(&self, name: &str, value: &str) -> bool {
        self.params
            .get(name)
            .is_some_and(|values| values.iter().any(|v| v.eq_ignore_ascii_case(value)))
    }

    /// `BEGIN:<component>`
    pub fn begins(&self, component: &str) -> bool {
        self.name == PropertyName::Begin && self.value.trim().eq_ignore_ascii_case(component)
    }

    /// `END:<component>`
    pub fn ends(&self, component: &str) -> bool {
        self.name == PropertyName::End && self.value.trim().eq_ignore_ascii_case(component)
    }
}

/// Split a logical line into name, parameters and unescaped value.
///
/// Returns `None` for lines without a `:` separator or without a name.
pub fn tokenize(line: &str) -> Option<ContentLine> {
    let colon = find_unquoted(line, ':')?;
    let (head, raw_value) = (&line[..colon], &line[colon + 1..]);

    let mut segments = split_unquoted(head, ';').into_iter();
    let name = segments.next()?.trim().to_ascii_uppercase();
    if name.is_empty() {
        return None;
    }

    let mut params: HashMap<String, Vec<String>> = HashMap::new();
    for segment in segments {
        let (key, values) = match find_unquoted(segment, '=') {
            Some(eq) => (
                &segment[..eq],
                split_unquoted(&segment[eq + 1..], ',')
                    .into_iter()
                    .map(unquote)
                    .collect(),
            ),
            None => (segment, vec!["TRUE".to_string()]),
        };

        let key = key.trim().to_ascii_uppercase();
        if key.is_empty() {
            continue;
        }
        params.entry(key).or_default().extend(values);
    }

    Some(ContentLine {
        name: PropertyName::from_upper(name),
        params,
        value: unescape(raw_value),
    })
}

/// Byte offset of the first `target` outside double quotes and not preceded by
/// a backslash escape
fn find_unquoted(text: &str, target: char) -> Option<usize> {
    let mut in_quotes = false;
    let mut escaped = false;

    for (idx, c) in text.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '"' => in_quotes = !in_quotes,
            c if c == target && !in_quotes => return Some(idx),
            _ => {}
        }
    }

    None
}

fn split_unquoted(text: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut rest = text;

    while let Some(idx) = find_unquoted(rest, separator) {
        parts.push(&rest[..idx]);
        rest = &rest[idx + separator.len_utf8()..];
    }
    parts.push(rest);

    parts
}

fn unquote(value: &str) -> String {
    let value = value.trim();
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
        .to_string()
}

/// Reverse TEXT escaping. Unknown escape sequences are kept as written.
pub fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n' | 'N') => out.push('\n'),
            Some(',') => out.push(','),
            Some(';') => out.push(';'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }

    out
}

/// Properties collected for one VEVENT block.
///
/// Every occurrence is retained in arrival order; readers use the first.
#[derive(Debug, Default, Clone)]
pub struct EventProperties {
    pub dtstart: Vec<ContentLine>,
    pub dtend: Vec<ContentLine>,
    pub duration: Vec<ContentLine>,
    pub status: Vec<ContentLine>,
    pub transp: Vec<ContentLine>,
    pub uid: Vec<ContentLine>,
    pub summary: Vec<ContentLine>,
    pub description: Vec<ContentLine>,
    pub location: Vec<ContentLine>,
    pub sequence: Vec<ContentLine>,
    pub rrule: Vec<ContentLine>,
    pub other: Vec<ContentLine>,
}

impl EventProperties {
    pub fn push(&mut self, line: ContentLine) {
        let bucket = match &line.name {
            PropertyName::DtStart => &mut self.dtstart,
            PropertyName::DtEnd => &mut self.dtend,
            PropertyName::Duration => &mut self.duration,
            PropertyName::Status => &mut self.status,
            PropertyName::Transp => &mut self.transp,
            PropertyName::Uid => &mut self.uid,
            PropertyName::Summary => &mut self.summary,
            PropertyName::Description => &mut self.description,
            PropertyName::Location => &mut self.location,
            PropertyName::Sequence => &mut self.sequence,
            PropertyName::RRule => &mut self.rrule,
            PropertyName::Begin | PropertyName::End | PropertyName::Other(_) => &mut self.other,
        };
        bucket.push(line);
    }
}

/// First value of a bucket
pub fn first_value(bucket: &[ContentLine]) -> Option<&str> {
    bucket.first().map(|line| line.value.as_str())
}
