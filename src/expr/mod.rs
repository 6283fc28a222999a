//! Filter expression evaluation.
//!
//! The projector only talks to the [`ExpressionEngine`] and
//! [`CompiledExpression`] traits: an expression is compiled once when the
//! colspec is compiled and then evaluated once per selected value with an
//! [`EvaluationContext`]. [`EvalexprEngine`] is the default implementation,
//! backed by `evalexpr`.
//!
//! Bindings visible to an evalexpr filter, all cells as unmodified strings:
//!
//! - `value`: the selected cell
//! - `row`: the whole row as a tuple
//! - `c0`, `c1`, ...: cells by position
//! - header names, both verbatim and normalised (`Order ID` -> `order_id`)
//! - `_csv_rownum`, `_csv_columns`

mod functions;

use std::{any::Any, cell::RefCell, collections::HashMap, fmt, sync::Arc};

use evalexpr::{ContextWithMutableVariables, HashMapContext, Node, Value as EvalValue};
use thiserror::Error;

use crate::data::{normalize_column_name, render_eval_value};

/// Everything a filter may observe about the value being transformed.
#[derive(Debug, Clone, Copy)]
pub struct EvaluationContext<'a> {
    pub value: &'a str,
    pub row: &'a [String],
    pub row_index: usize,
    pub row_length: usize,
    /// Header names paired positionally with row cells; empty without header mode.
    pub named_columns: &'a [(&'a str, &'a str)],
    /// Shared by every filter call on the same row.
    pub scope: &'a RowScope,
}

/// Per-row cache an engine may fill on the first filter call of a row and
/// reuse for the remaining calls. A fresh scope is created for every row.
#[derive(Default)]
pub struct RowScope {
    slot: RefCell<Option<Box<dyn Any>>>,
}

impl RowScope {
    /// Runs `f` on the cached `T`, building it with `init` when the slot is
    /// empty or holds another type.
    pub fn with<T, R>(
        &self,
        init: impl FnOnce() -> Result<T, ExpressionError>,
        f: impl FnOnce(&mut T) -> Result<R, ExpressionError>,
    ) -> Result<R, ExpressionError>
    where
        T: 'static,
    {
        let mut slot = self.slot.borrow_mut();
        if slot.as_deref().and_then(|cached| cached.downcast_ref::<T>()).is_none() {
            *slot = Some(Box::new(init()?));
        }
        match slot
            .as_deref_mut()
            .and_then(|cached| cached.downcast_mut::<T>())
        {
            Some(cached) => f(cached),
            None => Err(ExpressionError::new("row scope lost its cached bindings")),
        }
    }
}

impl fmt::Debug for RowScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RowScope")
            .field("cached", &self.slot.borrow().is_some())
            .finish()
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct ExpressionError {
    message: String,
}

impl ExpressionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

pub trait CompiledExpression: fmt::Debug + Send + Sync {
    /// Expression text as written in the colspec.
    fn source(&self) -> &str;

    fn evaluate(&self, context: &EvaluationContext<'_>) -> Result<String, ExpressionError>;
}

pub trait ExpressionEngine {
    fn compile(&self, source: &str) -> Result<Arc<dyn CompiledExpression>, ExpressionError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct EvalexprEngine;

impl ExpressionEngine for EvalexprEngine {
    fn compile(&self, source: &str) -> Result<Arc<dyn CompiledExpression>, ExpressionError> {
        let tree: Node = evalexpr::build_operator_tree(source)
            .map_err(|err| ExpressionError::new(err.to_string()))?;
        Ok(Arc::new(EvalexprExpression {
            source: source.to_string(),
            tree,
        }))
    }
}

#[derive(Debug)]
struct EvalexprExpression {
    source: String,
    tree: Node,
}

impl CompiledExpression for EvalexprExpression {
    fn source(&self) -> &str {
        &self.source
    }

    fn evaluate(&self, context: &EvaluationContext<'_>) -> Result<String, ExpressionError> {
        context.scope.with(
            || build_row_scope(context).map_err(|err| ExpressionError::new(err.to_string())),
            |scope: &mut HashMapContext| {
                scope
                    .set_value("value".to_string(), text(context.value))
                    .map_err(|err| ExpressionError::new(err.to_string()))?;
                self.tree
                    .eval_with_context(scope)
                    .map(render_eval_value)
                    .map_err(|err| ExpressionError::new(err.to_string()))
            },
        )
    }
}

fn text(cell: &str) -> EvalValue {
    EvalValue::String(cell.to_string())
}

/// Binds everything except `value`, which changes with every call.
fn build_row_scope(context: &EvaluationContext<'_>) -> anyhow::Result<HashMapContext> {
    // evalexpr refuses to rebind a variable with a value of another type, so
    // the final set of bindings is settled here before anything is assigned.
    let mut bindings: HashMap<String, EvalValue> = HashMap::new();
    for (name, cell) in context.named_columns {
        bindings
            .entry(normalize_column_name(name))
            .or_insert_with(|| text(cell));
        bindings.entry((*name).to_string()).or_insert_with(|| text(cell));
    }
    for (idx, cell) in context.row.iter().enumerate() {
        bindings.insert(format!("c{idx}"), text(cell));
    }
    bindings.insert(
        "row".to_string(),
        EvalValue::Tuple(context.row.iter().map(|cell| text(cell)).collect()),
    );
    bindings.insert(
        "_csv_rownum".to_string(),
        EvalValue::Int(context.row_index as i64),
    );
    bindings.insert(
        "_csv_columns".to_string(),
        EvalValue::Int(context.row_length as i64),
    );
    bindings.insert("value".to_string(), text(""));

    let mut scope = HashMapContext::new();
    functions::register(&mut scope)?;
    for (name, value) in bindings {
        scope.set_value(name, value)?;
    }
    Ok(scope)
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    fn evaluate(source: &str, context: &EvaluationContext<'_>) -> Result<String, ExpressionError> {
        EvalexprEngine.compile(source)?.evaluate(context)
    }

    #[test]
    fn cells_bind_as_unmodified_text() {
        let cells = row(&["007", "1e3", "1.50"]);
        let scope = RowScope::default();
        for cell in &cells {
            let context = EvaluationContext {
                value: cell,
                row: &cells,
                row_index: 0,
                row_length: cells.len(),
                named_columns: &[],
                scope: &scope,
            };
            assert_eq!(&evaluate("value", &context).unwrap(), cell);
            assert_eq!(&evaluate("trim(value)", &context).unwrap(), cell);
        }
        let context = EvaluationContext {
            value: "00042",
            row: &cells,
            row_index: 0,
            row_length: cells.len(),
            named_columns: &[],
            scope: &scope,
        };
        assert_eq!(evaluate("substring(value, 0, 3)", &context).unwrap(), "000");
        assert_eq!(evaluate("c0", &context).unwrap(), "007");
    }

    #[test]
    fn arithmetic_goes_through_number_conversion() {
        let cells = row(&["3", "4.5"]);
        let scope = RowScope::default();
        let context = EvaluationContext {
            value: "3",
            row: &cells,
            row_index: 0,
            row_length: cells.len(),
            named_columns: &[],
            scope: &scope,
        };
        assert_eq!(evaluate("to_number(value) * 2", &context).unwrap(), "6");
        assert_eq!(evaluate("to_number(c0) + to_number(c1)", &context).unwrap(), "7.5");
        assert_eq!(evaluate("c0 + c1", &context).unwrap(), "34.5");
        assert_eq!(evaluate("len(row)", &context).unwrap(), "2");
        assert!(evaluate("value * 2", &context).is_err());
    }

    #[test]
    fn header_names_bind_verbatim_and_normalised() {
        let cells = row(&["7", "Ada"]);
        let named = [("Order ID", "7"), ("name", "Ada")];
        let scope = RowScope::default();
        let context = EvaluationContext {
            value: "Ada",
            row: &cells,
            row_index: 4,
            row_length: 2,
            named_columns: &named,
            scope: &scope,
        };
        assert_eq!(evaluate("to_int(order_id) + 1", &context).unwrap(), "8");
        assert_eq!(evaluate("uppercase(name)", &context).unwrap(), "ADA");
        assert_eq!(evaluate("_csv_rownum", &context).unwrap(), "4");
        assert_eq!(evaluate("_csv_columns", &context).unwrap(), "2");
    }

    #[test]
    fn reserved_bindings_win_over_header_names() {
        let cells = row(&["x"]);
        let named = [("value", "x"), ("_csv_rownum", "x")];
        let scope = RowScope::default();
        let context = EvaluationContext {
            value: "10",
            row: &cells,
            row_index: 0,
            row_length: 1,
            named_columns: &named,
            scope: &scope,
        };
        assert_eq!(evaluate("to_int(value) + 1", &context).unwrap(), "11");
        assert_eq!(evaluate("_csv_rownum + 1", &context).unwrap(), "1");
    }

    #[test]
    fn row_scope_is_reused_across_values() {
        let cells = row(&["a", "b"]);
        let scope = RowScope::default();
        let upper = EvalexprEngine.compile("uppercase(value) + c1").unwrap();
        let outputs = cells
            .iter()
            .map(|cell| {
                upper.evaluate(&EvaluationContext {
                    value: cell,
                    row: &cells,
                    row_index: 0,
                    row_length: cells.len(),
                    named_columns: &[],
                    scope: &scope,
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(outputs, vec!["Ab", "Bb"]);
    }

    #[test]
    fn row_scope_builds_once() {
        let scope = RowScope::default();
        let builds = Cell::new(0);
        for _ in 0..3 {
            let seen = scope
                .with(
                    || {
                        builds.set(builds.get() + 1);
                        Ok(String::from("cached"))
                    },
                    |cached: &mut String| Ok(cached.clone()),
                )
                .unwrap();
            assert_eq!(seen, "cached");
        }
        assert_eq!(builds.get(), 1);
    }

    #[test]
    fn syntax_errors_surface_at_compile_time() {
        let err = EvalexprEngine.compile("(value * 2").unwrap_err();
        assert!(!err.message().is_empty());
    }
}
