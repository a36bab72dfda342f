//! Lightweight numeric extraction from prompts, defect messages and code

use regex::Regex;
use std::ops::Range;
use std::sync::OnceLock;

const NUMBER: &str = r"-?\d+(?:\.\d+)?";

fn dimensions_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(\d+(?:\.\d+)?)\s*(?:mm)?\s*(?:x|×|\*|by)\s*(\d+(?:\.\d+)?)(?:\s*(?:mm)?\s*(?:x|×|\*|by)\s*(\d+(?:\.\d+)?))?",
        )
        .ok()
    })
    .as_ref()
}

fn angle_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*(?:°|deg\b|degrees?\b)").ok())
        .as_ref()
}

fn tuple_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(
            r"(^|[\[\(,\s=])(\(\s*({n})\s*,\s*({n})\s*(?:,\s*({n})\s*)?\))",
            n = NUMBER
        ))
        .ok()
    })
    .as_ref()
}

/// Number following the first label that appears in `text`
///
/// Labels are tried in order, so more specific ones ("major radius") should
/// precede generic ones ("radius"). Accepts `of`, `is`, `=` and `:` between
/// the label and the number.
pub fn number_after(text: &str, labels: &[&str]) -> Option<f64> {
    labels.iter().find_map(|label| {
        let pattern = format!(
            r"(?i)\b{}\b\s*(?:of|is|=|:)?\s*({})",
            regex::escape(label),
            NUMBER
        );
        let re = Regex::new(&pattern).ok()?;
        re.captures(text)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse().ok())
    })
}

/// `W x D [x H]` dimensions, if the text states them that way
pub fn dimensions(text: &str) -> Option<Vec<f64>> {
    let caps = dimensions_regex()?.captures(text)?;
    let values: Vec<f64> = (1..=3)
        .filter_map(|i| caps.get(i))
        .filter_map(|m| m.as_str().parse().ok())
        .collect();
    (values.len() >= 2).then_some(values)
}

/// First angle written with a degree unit
pub fn angle_degrees(text: &str) -> Option<f64> {
    angle_regex()?
        .captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Parse a bare numeric literal
pub fn parse_number(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    let unwrapped = trimmed
        .strip_prefix('(')
        .and_then(|t| t.strip_suffix(')'))
        .unwrap_or(trimmed)
        .trim();
    unwrapped.parse().ok()
}

/// Parse a literal numeric tuple like `(0, 1, 0)`
pub fn parse_tuple(text: &str) -> Option<Vec<f64>> {
    let inner = text.trim().strip_prefix('(')?.strip_suffix(')')?;
    inner
        .split(',')
        .filter(|part| !part.trim().is_empty())
        .map(parse_number)
        .collect()
}

/// A literal coordinate tuple located in a larger text
#[derive(Debug, Clone, PartialEq)]
pub struct TupleSpan {
    /// Byte range of the tuple including its parentheses
    pub range: Range<usize>,
    pub values: Vec<f64>,
}

/// Literal 2- or 3-tuples that stand on their own (not a call's argument list)
pub fn tuple_spans(text: &str) -> Vec<TupleSpan> {
    let Some(re) = tuple_regex() else {
        return Vec::new();
    };
    re.captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(2)?;
            let values: Vec<f64> = (3..=5)
                .filter_map(|i| caps.get(i))
                .filter_map(|m| m.as_str().parse().ok())
                .collect();
            Some(TupleSpan {
                range: whole.range(),
                values,
            })
        })
        .collect()
}

/// Render a number the way a person would type it into a script
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e12 {
        format!("{}", value as i64)
    } else {
        let text = format!("{:.3}", value);
        text.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}
