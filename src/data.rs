//! Conversions between cell text and expression values.
//!
//! Cells bind into filter expressions as their raw text, so a filter that
//! returns `value` unchanged reproduces the cell byte for byte. Arithmetic
//! goes through [`parse_number()`] (exposed to expressions as `to_number`).
//! Expression results are rendered back to text with [`render_eval_value()`].

use anyhow::{Result, anyhow};
use chrono::NaiveDate;
use evalexpr::Value as EvalValue;
use itertools::Itertools;

/// Integers parse as [`EvalValue::Int`], finite decimals as
/// [`EvalValue::Float`]. Surrounding whitespace is ignored.
pub fn parse_number(raw: &str) -> Option<EvalValue> {
    let trimmed = raw.trim();
    if let Ok(int) = trimmed.parse::<i64>() {
        return Some(EvalValue::Int(int));
    }
    match trimmed.parse::<f64>() {
        Ok(float) if float.is_finite() => Some(EvalValue::Float(float)),
        _ => None,
    }
}

pub fn render_eval_value(value: EvalValue) -> String {
    match value {
        EvalValue::String(s) => s,
        EvalValue::Int(i) => i.to_string(),
        EvalValue::Float(f) => render_float(f),
        EvalValue::Boolean(b) => b.to_string(),
        EvalValue::Tuple(values) => values.into_iter().map(render_eval_value).join("|"),
        EvalValue::Empty => String::new(),
    }
}

fn render_float(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        (value as i64).to_string()
    } else {
        value.to_string()
    }
}

/// Turns a header name into something usable as an expression identifier.
pub fn normalize_column_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' => c,
            _ => '_',
        })
        .collect::<String>()
        .to_ascii_lowercase()
}

pub fn parse_naive_date(value: &str) -> Result<NaiveDate> {
    const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%d/%m/%Y", "%d-%m-%Y"];
    let trimmed = value.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
        .ok_or_else(|| anyhow!("Failed to parse '{value}' as date"))
}
