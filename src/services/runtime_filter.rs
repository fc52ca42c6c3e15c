use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// Runtime bounds extracted from a free-text query, in minutes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuntimeConstraints {
    pub min_minutes: Option<u32>,
    pub max_minutes: Option<u32>,
}

impl RuntimeConstraints {
    pub fn is_empty(&self) -> bool {
        self.min_minutes.is_none() && self.max_minutes.is_none()
    }

    /// Whether a film of `runtime` minutes fits every present bound
    pub fn admits(&self, runtime: u32) -> bool {
        self.max_minutes.map_or(true, |max| runtime <= max)
            && self.min_minutes.map_or(true, |min| runtime >= min)
    }
}

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(&format!("(?i){}", p)).expect("runtime pattern should compile"))
        .collect()
}

static HOUR_MAX_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"under\s+(\d+)\s+hours?",
        r"less\s+than\s+(\d+)\s+hours?",
        r"below\s+(\d+)\s+hours?",
        r"shorter\s+than\s+(\d+)\s+hours?",
    ])
});

static HOUR_MIN_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"over\s+(\d+)\s+hours?",
        r"more\s+than\s+(\d+)\s+hours?",
        r"above\s+(\d+)\s+hours?",
        r"longer\s+than\s+(\d+)\s+hours?",
        r"at\s+least\s+(\d+)\s+hours?",
    ])
});

// The `NhMm` forms capture hours and optional minutes
static MINUTE_MAX_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"under\s+(\d+)\s+minutes?",
        r"less\s+than\s+(\d+)\s+minutes?",
        r"below\s+(\d+)\s+minutes?",
        r"shorter\s+than\s+(\d+)\s+minutes?",
        r"under\s+(\d+)h\s*(\d+)?\s*m",
        r"less\s+than\s+(\d+)h\s*(\d+)?\s*m",
        r"(\d+)h\s*(\d+)?\s*m\s+or\s+less",
        r"(\d+)h\s*(\d+)?\s*m\s+and\s+under",
    ])
});

static MINUTE_MIN_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"over\s+(\d+)\s+minutes?",
        r"more\s+than\s+(\d+)\s+minutes?",
        r"above\s+(\d+)\s+minutes?",
        r"longer\s+than\s+(\d+)\s+minutes?",
        r"at\s+least\s+(\d+)\s+minutes?",
    ])
});

static MINUTE_RANGE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)between\s+(\d+)\s+(?:and|-)\s+(\d+)\s+minutes?")
        .expect("minute range pattern should compile")
});

static HOUR_RANGE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)between\s+(\d+)\s+(?:and|-)\s+(\d+)\s+hours?")
        .expect("hour range pattern should compile")
});

fn number(caps: &Captures<'_>, group: usize) -> Option<u32> {
    caps.get(group)?.as_str().parse().ok()
}

/// Value of the first pattern that matches, converted by `value`
fn first_match<F>(patterns: &[Regex], query: &str, value: F) -> Option<u32>
where
    F: Fn(&Captures<'_>) -> Option<u32>,
{
    patterns
        .iter()
        .find_map(|p| p.captures(query))
        .and_then(|caps| value(&caps))
}

fn hours(caps: &Captures<'_>) -> Option<u32> {
    number(caps, 1).map(|h| h.saturating_mul(60))
}

fn minutes(caps: &Captures<'_>) -> Option<u32> {
    number(caps, 1)
}

/// `NhMm` counts hours and minutes; a plain match counts minutes
fn hours_and_minutes(caps: &Captures<'_>) -> Option<u32> {
    let first = number(caps, 1)?;
    match number(caps, 2) {
        Some(mins) => Some(first.saturating_mul(60).saturating_add(mins)),
        None => Some(first),
    }
}

/// Extracts runtime bounds from phrases like "under 100 minutes",
/// "less than 2 hours", "at least 90 minutes" or "between 80 and 120 minutes".
///
/// Hour phrases are checked before minute phrases, and a "between" range
/// overrides any single bound found earlier.
pub fn parse_runtime_constraints(query: &str) -> RuntimeConstraints {
    let query = query.to_lowercase();

    let mut max_minutes = first_match(&HOUR_MAX_PATTERNS, &query, hours);
    let mut min_minutes = first_match(&HOUR_MIN_PATTERNS, &query, hours);

    if max_minutes.is_none() {
        max_minutes = first_match(&MINUTE_MAX_PATTERNS, &query, hours_and_minutes);
    }

    if min_minutes.is_none() {
        min_minutes = first_match(&MINUTE_MIN_PATTERNS, &query, minutes);
    }

    if let Some(caps) = MINUTE_RANGE_PATTERN.captures(&query) {
        if let (Some(low), Some(high)) = (number(&caps, 1), number(&caps, 2)) {
            min_minutes = Some(low);
            max_minutes = Some(high);
        }
    }

    if let Some(caps) = HOUR_RANGE_PATTERN.captures(&query) {
        if let (Some(low), Some(high)) = (number(&caps, 1), number(&caps, 2)) {
            min_minutes = Some(low.saturating_mul(60));
            max_minutes = Some(high.saturating_mul(60));
        }
    }

    RuntimeConstraints {
        min_minutes,
        max_minutes,
    }
}
