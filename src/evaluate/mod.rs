//! User-defined derived columns.
//!
//! An [`Evaluator`] computes one value per entry from an expression, the
//! entry's named values and its stack trace. Failures are per entry: one
//! bad cell never stops the rest of the column.

pub mod locals;

pub use locals::LocalsEvaluator;

use crate::report::{ReportStore, ValueGroup};
use crate::stack::StackTrace;
use crate::value::Value;
use log::debug;
use serde::Serialize;
use thiserror::Error;

/// Errors produced while evaluating an expression for one entry
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("Invalid expression: {0}")]
    InvalidExpression(String),

    #[error("Name not found: {0}")]
    UnknownName(String),

    #[error("Evaluation failed: {0}")]
    Failed(String),
}

/// What an expression can see for one entry
#[derive(Debug, Clone, PartialEq)]
pub struct EvalContext<'a> {
    pub trace: Option<&'a StackTrace>,
    /// The entry's named values, in recorded order
    pub locals: Vec<(String, Value)>,
}

impl<'a> EvalContext<'a> {
    pub fn for_entry(store: &'a ReportStore, group: &ValueGroup) -> Self {
        let locals = group
            .values
            .iter()
            .filter_map(|v| v.name.clone().map(|name| (name, v.value.clone())))
            .collect();
        Self {
            trace: group.stack_trace_id.and_then(|id| store.stack_trace(id)),
            locals,
        }
    }

    pub fn local(&self, name: &str) -> Option<&Value> {
        self.locals.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }
}

/// Pluggable expression evaluator
pub trait Evaluator {
    fn evaluate(&self, expression: &str, context: &EvalContext<'_>) -> Result<Value, EvalError>;
}

/// One cell of a derived column
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Cell {
    Value(Value),
    Error { error: String },
}

impl Cell {
    pub fn value(&self) -> Option<&Value> {
        match self {
            Cell::Value(v) => Some(v),
            Cell::Error { .. } => None,
        }
    }
}

/// A derived column: one cell per entry, in log-index order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Column {
    pub expression: String,
    pub cells: Vec<(u64, Cell)>,
}

impl Column {
    pub fn error_count(&self) -> usize {
        self.cells
            .iter()
            .filter(|(_, c)| matches!(c, Cell::Error { .. }))
            .count()
    }
}

/// Evaluate `expression` for every entry in the store
pub fn evaluate_column(store: &ReportStore, evaluator: &dyn Evaluator, expression: &str) -> Column {
    let cells = store
        .entries()
        .map(|(_, group)| {
            let context = EvalContext::for_entry(store, group);
            let cell = match evaluator.evaluate(expression, &context) {
                Ok(value) => Cell::Value(value),
                Err(e) => {
                    debug!("Entry {}: {}", group.log_index, e);
                    Cell::Error {
                        error: e.to_string(),
                    }
                }
            };
            (group.log_index, cell)
        })
        .collect();

    Column {
        expression: expression.to_string(),
        cells,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{CallSiteKey, NamedValue, NewEntry};

    struct Doubler;

    impl Evaluator for Doubler {
        fn evaluate(&self, expression: &str, context: &EvalContext<'_>) -> Result<Value, EvalError> {
            let value = context
                .local(expression)
                .ok_or_else(|| EvalError::UnknownName(expression.to_string()))?;
            value
                .as_i64()
                .map(|n| Value::Int(n * 2))
                .ok_or_else(|| EvalError::Failed(format!("{} is not an integer", value.type_name())))
        }
    }

    #[test]
    fn test_failures_do_not_abort_column() {
        let mut store = ReportStore::new();
        let site = CallSiteKey::new("src/a.rs", 1);
        store
            .append(site.clone(), NewEntry::values("f", vec![NamedValue::new(Some("n"), 4)]))
            .unwrap();
        store
            .append(site.clone(), NewEntry::values("f", vec![NamedValue::new(Some("n"), "x")]))
            .unwrap();
        store.append(site, NewEntry::values("f", Vec::new())).unwrap();

        let column = evaluate_column(&store, &Doubler, "n");

        assert_eq!(column.cells.len(), 3);
        assert_eq!(column.cells[0].1, Cell::Value(Value::Int(8)));
        assert_eq!(column.error_count(), 2);
        assert_eq!(
            column.cells[2].1,
            Cell::Error {
                error: "Name not found: n".to_string()
            }
        );
    }

    #[test]
    fn test_cell_serialization() {
        let json = serde_json::to_value(Cell::Error {
            error: "boom".to_string(),
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"error": "boom"}));
        assert_eq!(serde_json::to_value(Cell::Value(Value::Int(3))).unwrap(), 3);
    }
}
