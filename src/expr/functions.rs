//! Helper functions available inside filter expressions.
//!
//! Cells arrive as strings. `to_int`, `to_float` and `to_number` convert them
//! for arithmetic; text helpers also accept numbers produced that way.

use std::fmt::Write as _;

use anyhow::Result;
use chrono::Duration;
use evalexpr::{
    ContextWithMutableFunctions, EvalexprError, Function, HashMapContext, Value as EvalValue,
};
use heck::{ToLowerCamelCase, ToSnakeCase, ToUpperCamelCase};
use regex::Regex;

use crate::data::{parse_naive_date, parse_number, render_eval_value};

type FunctionResult = Result<EvalValue, EvalexprError>;
type Helper = fn(&EvalValue) -> FunctionResult;

const HELPERS: &[(&str, Helper)] = &[
    ("lowercase", lowercase as Helper),
    ("uppercase", uppercase as Helper),
    ("trim", trim as Helper),
    ("snake_case", snake_case as Helper),
    ("camel_case", camel_case as Helper),
    ("pascal_case", pascal_case as Helper),
    ("substring", substring as Helper),
    ("regex_replace", regex_replace as Helper),
    ("date_add", date_add as Helper),
    ("date_diff_days", date_diff_days as Helper),
    ("date_format", date_format as Helper),
    ("to_int", to_int as Helper),
    ("to_float", to_float as Helper),
    ("to_number", to_number as Helper),
];

pub(crate) fn register(context: &mut HashMapContext) -> Result<()> {
    for (name, helper) in HELPERS {
        context
            .set_function((*name).to_string(), Function::new(*helper))
            .map_err(anyhow::Error::from)?;
    }
    Ok(())
}

fn lowercase(arguments: &EvalValue) -> FunctionResult {
    map_text(arguments, "lowercase", |s| s.to_lowercase())
}

fn uppercase(arguments: &EvalValue) -> FunctionResult {
    map_text(arguments, "uppercase", |s| s.to_uppercase())
}

fn trim(arguments: &EvalValue) -> FunctionResult {
    map_text(arguments, "trim", |s| s.trim().to_string())
}

fn snake_case(arguments: &EvalValue) -> FunctionResult {
    map_text(arguments, "snake_case", |s| s.to_snake_case())
}

fn camel_case(arguments: &EvalValue) -> FunctionResult {
    map_text(arguments, "camel_case", |s| s.to_lower_camel_case())
}

fn pascal_case(arguments: &EvalValue) -> FunctionResult {
    map_text(arguments, "pascal_case", |s| s.to_upper_camel_case())
}

fn map_text(arguments: &EvalValue, name: &str, op: fn(&str) -> String) -> FunctionResult {
    let args = expect_args(arguments, 1, name)?;
    let text = text_arg(&args[0], name)?;
    Ok(EvalValue::String(op(&text)))
}

fn substring(arguments: &EvalValue) -> FunctionResult {
    let args = expect_args(arguments, 3, "substring")?;
    let text = text_arg(&args[0], "substring")?;
    let start = int_arg(&args[1], "start")?.max(0) as usize;
    let length = int_arg(&args[2], "length")?.max(0) as usize;
    Ok(EvalValue::String(
        text.chars().skip(start).take(length).collect(),
    ))
}

fn regex_replace(arguments: &EvalValue) -> FunctionResult {
    let args = expect_args(arguments, 3, "regex_replace")?;
    let text = text_arg(&args[0], "regex_replace")?;
    let pattern = text_arg(&args[1], "pattern")?;
    let replacement = text_arg(&args[2], "replacement")?;
    let regex =
        Regex::new(&pattern).map_err(|err| eval_error(format!("Invalid regex: {err}")))?;
    Ok(EvalValue::String(
        regex.replace_all(&text, replacement.as_str()).into_owned(),
    ))
}

fn date_add(arguments: &EvalValue) -> FunctionResult {
    let args = expect_args(arguments, 2, "date_add")?;
    let date = date_arg(&args[0])?;
    let days = int_arg(&args[1], "days")?;
    let shifted = date
        .checked_add_signed(Duration::days(days))
        .ok_or_else(|| eval_error("date_add overflow".to_string()))?;
    Ok(EvalValue::String(shifted.format("%Y-%m-%d").to_string()))
}

fn date_diff_days(arguments: &EvalValue) -> FunctionResult {
    let args = expect_args(arguments, 2, "date_diff_days")?;
    let end = date_arg(&args[0])?;
    let start = date_arg(&args[1])?;
    Ok(EvalValue::Int((end - start).num_days()))
}

fn date_format(arguments: &EvalValue) -> FunctionResult {
    let args = expect_args(arguments, 2, "date_format")?;
    let date = date_arg(&args[0])?;
    let fmt = text_arg(&args[1], "format")?;
    let mut rendered = String::new();
    write!(rendered, "{}", date.format(&fmt))
        .map_err(|_| eval_error(format!("Invalid date format '{fmt}'")))?;
    Ok(EvalValue::String(rendered))
}

fn to_number(arguments: &EvalValue) -> FunctionResult {
    let args = expect_args(arguments, 1, "to_number")?;
    number_arg(&args[0], "to_number")
}

fn to_int(arguments: &EvalValue) -> FunctionResult {
    let args = expect_args(arguments, 1, "to_int")?;
    match number_arg(&args[0], "to_int")? {
        EvalValue::Float(f) => Ok(EvalValue::Int(f.trunc() as i64)),
        value => Ok(value),
    }
}

fn to_float(arguments: &EvalValue) -> FunctionResult {
    let args = expect_args(arguments, 1, "to_float")?;
    match number_arg(&args[0], "to_float")? {
        EvalValue::Int(i) => Ok(EvalValue::Float(i as f64)),
        value => Ok(value),
    }
}

fn number_arg(value: &EvalValue, name: &str) -> FunctionResult {
    match value {
        EvalValue::Int(_) | EvalValue::Float(_) => Ok(value.clone()),
        EvalValue::String(s) => parse_number(s)
            .ok_or_else(|| eval_error(format!("{name} cannot parse '{s}' as a number"))),
        other => Err(eval_error(format!(
            "Expected number for {name}, got {other:?}"
        ))),
    }
}

fn expect_args(
    arguments: &EvalValue,
    expected: usize,
    name: &str,
) -> Result<Vec<EvalValue>, EvalexprError> {
    let args = match arguments {
        EvalValue::Tuple(values) if expected != 1 => values.clone(),
        EvalValue::Empty => Vec::new(),
        value => vec![value.clone()],
    };
    if args.len() != expected {
        return Err(eval_error(format!(
            "{name} expects {expected} argument(s), got {}",
            args.len()
        )));
    }
    Ok(args)
}

fn text_arg(value: &EvalValue, name: &str) -> Result<String, EvalexprError> {
    match value {
        EvalValue::String(s) => Ok(s.clone()),
        EvalValue::Int(_) | EvalValue::Float(_) | EvalValue::Boolean(_) => {
            Ok(render_eval_value(value.clone()))
        }
        other => Err(eval_error(format!(
            "Expected text for {name}, got {other:?}"
        ))),
    }
}

fn int_arg(value: &EvalValue, name: &str) -> Result<i64, EvalexprError> {
    match value {
        EvalValue::Int(i) => Ok(*i),
        EvalValue::Float(f) => Ok(*f as i64),
        EvalValue::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| eval_error(format!("Expected integer for {name}, got '{s}'"))),
        other => Err(eval_error(format!(
            "Expected integer for {name}, got {other:?}"
        ))),
    }
}

fn date_arg(value: &EvalValue) -> Result<chrono::NaiveDate, EvalexprError> {
    let raw = text_arg(value, "date")?;
    parse_naive_date(&raw).map_err(|err| eval_error(err.to_string()))
}

fn eval_error(message: String) -> EvalexprError {
    EvalexprError::CustomMessage(message)
}

#[cfg(test)]
mod tests {
    use evalexpr::eval_with_context;

    use super::*;

    fn context() -> HashMapContext {
        let mut context = HashMapContext::new();
        register(&mut context).expect("register helpers");
        context
    }

    fn eval_text(expression: &str) -> String {
        eval_with_context(expression, &context())
            .expect("evaluate")
            .as_string()
            .expect("string result")
    }

    #[test]
    fn text_helpers_transform_strings() {
        assert_eq!(eval_text("lowercase(\"FOO\")"), "foo");
        assert_eq!(eval_text("uppercase(\"straße\")"), "STRASSE");
        assert_eq!(eval_text("trim(\"  value  \")"), "value");
        assert_eq!(eval_text("snake_case(\"Foo Bar\")"), "foo_bar");
        assert_eq!(eval_text("camel_case(\"foo-bar baz\")"), "fooBarBaz");
        assert_eq!(eval_text("pascal_case(\"HTTP_STATUS\")"), "HttpStatus");
    }

    #[test]
    fn text_helpers_accept_numbers() {
        assert_eq!(eval_text("trim(42)"), "42");
        assert_eq!(eval_text("substring(123456, 1, 3)"), "234");
    }

    #[test]
    fn substring_counts_characters() {
        assert_eq!(eval_text("substring(\"héllo\", 1, 3)"), "éll");
        assert_eq!(eval_text("substring(\"abc\", 5, 2)"), "");
    }

    #[test]
    fn regex_replace_rewrites_every_match() {
        assert_eq!(eval_text("regex_replace(\"a1b22\", \"[0-9]+\", \"#\")"), "a#b#");
        assert!(eval_with_context("regex_replace(\"a\", \"(\", \"x\")", &context()).is_err());
    }

    #[test]
    fn date_helpers_shift_and_compare() {
        assert_eq!(eval_text("date_add(\"2024-01-30\", 3)"), "2024-02-02");
        let diff = eval_with_context("date_diff_days(\"2024-01-10\", \"2024-01-01\")", &context())
            .unwrap()
            .as_int()
            .unwrap();
        assert_eq!(diff, 9);
        assert_eq!(eval_text("date_format(\"2024-05-06\", \"%d.%m.%Y\")"), "06.05.2024");
    }

    #[test]
    fn numeric_conversions_parse_text() {
        let eval = |expression: &str| eval_with_context(expression, &context()).unwrap();
        assert_eq!(eval("to_number(\"007\") + 1"), EvalValue::Int(8));
        assert_eq!(eval("to_number(\" 2.5 \") * 2"), EvalValue::Float(5.0));
        assert_eq!(eval("to_int(\"3.9\")"), EvalValue::Int(3));
        assert_eq!(eval("to_float(\"4\")"), EvalValue::Float(4.0));
        assert_eq!(
            eval("date_add(\"2024-01-30\", \"1\")"),
            EvalValue::String("2024-01-31".into())
        );
        let err = eval_with_context("to_number(\"n/a\")", &context()).unwrap_err();
        assert!(err.to_string().contains("cannot parse 'n/a'"));
    }

    #[test]
    fn wrong_argument_count_is_reported() {
        let err = eval_with_context("substring(\"abc\", 1)", &context()).unwrap_err();
        assert!(err.to_string().contains("substring expects 3"));
    }
}
