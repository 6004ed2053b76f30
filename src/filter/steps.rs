use regex::Regex;

use crate::config::{MatchMode, Step};
use crate::error::Result;
use crate::ical::CalendarEvent;

/// A compiled pattern with associated fields
#[derive(Debug)]
pub struct CompiledPattern {
    regex: Regex,
    fields: Vec<String>,
}

impl CompiledPattern {
    pub fn new(pattern: &str, fields: Vec<String>) -> Result<Self> {
        let regex = Regex::new(pattern)?;
        Ok(Self { regex, fields })
    }

    /// Check if this pattern matches any of the specified fields in the event
    pub fn matches(&self, event: &CalendarEvent) -> bool {
        self.fields.iter().any(|field| {
            let text = match field.as_str() {
                "summary" => event.summary(),
                "description" => event.description(),
                "location" => event.location(),
                _ => None,
            };
            text.is_some_and(|text| self.regex.is_match(text))
        })
    }
}

/// Result of applying a step
#[derive(Debug, PartialEq)]
pub enum StepResult {
    Keep,
    Reject,
}

/// A compiled step with pre-compiled regexes
#[derive(Debug)]
pub enum CompiledStep {
    Allow {
        patterns: Vec<CompiledPattern>,
        mode: MatchMode,
    },
    Deny {
        patterns: Vec<CompiledPattern>,
        mode: MatchMode,
    },
}

impl CompiledStep {
    pub fn compile(step: &Step) -> Result<Self> {
        let compile_patterns = |patterns: &[String], fields: &[String]| {
            patterns
                .iter()
                .map(|p| CompiledPattern::new(p, fields.to_vec()))
                .collect::<Result<Vec<_>>>()
        };

        match step {
            Step::Allow {
                patterns,
                mode,
                fields,
            } => Ok(Self::Allow {
                patterns: compile_patterns(patterns, fields)?,
                mode: mode.clone(),
            }),
            Step::Deny {
                patterns,
                mode,
                fields,
            } => Ok(Self::Deny {
                patterns: compile_patterns(patterns, fields)?,
                mode: mode.clone(),
            }),
        }
    }

    pub fn compile_many(steps: &[Step]) -> Result<Vec<Self>> {
        steps.iter().map(Self::compile).collect()
    }

    pub fn apply(&self, event: &CalendarEvent) -> StepResult {
        let (patterns, mode, keep_on_match) = match self {
            Self::Allow { patterns, mode } => (patterns, mode, true),
            Self::Deny { patterns, mode } => (patterns, mode, false),
        };

        let matched = match mode {
            MatchMode::Any => patterns.iter().any(|p| p.matches(event)),
            MatchMode::All => patterns.iter().all(|p| p.matches(event)),
        };

        if matched == keep_on_match {
            StepResult::Keep
        } else {
            StepResult::Reject
        }
    }
}

/// Apply all steps to an event, stopping at the first rejection
pub fn apply_steps(event: &CalendarEvent, steps: &[CompiledStep]) -> StepResult {
    if steps.iter().any(|step| step.apply(event) == StepResult::Reject) {
        StepResult::Reject
    } else {
        StepResult::Keep
    }
}

/// Keep the events every step accepts, preserving order
pub fn process_events(events: Vec<CalendarEvent>, steps: &[CompiledStep]) -> Vec<CalendarEvent> {
    events
        .into_iter()
        .filter(|event| apply_steps(event, steps) == StepResult::Keep)
        .collect()
}
