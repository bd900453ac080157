//! Dotted-path lookup evaluator.
//!
//! Expressions are paths such as `order.items.0.price`. The first segment
//! names an entry value, or else a local variable of the innermost trace
//! frame that has it. A `frames.N.` prefix reads from trace frame `N`
//! instead.

use super::{EvalContext, EvalError, Evaluator};
use crate::value::Value;

#[derive(Debug, Clone, Copy, Default)]
pub struct LocalsEvaluator;

impl Evaluator for LocalsEvaluator {
    fn evaluate(&self, expression: &str, context: &EvalContext<'_>) -> Result<Value, EvalError> {
        let path: Vec<&str> = expression.trim().split('.').collect();
        if path.iter().any(|s| s.is_empty()) {
            return Err(EvalError::InvalidExpression(expression.to_string()));
        }

        let (root, rest) = match path.as_slice() {
            ["frames", index, name, rest @ ..] => {
                let index: usize = index
                    .parse()
                    .map_err(|_| EvalError::InvalidExpression(expression.to_string()))?;
                let frame = context
                    .trace
                    .and_then(|t| t.frames.get(index))
                    .ok_or_else(|| EvalError::UnknownName(format!("frames.{}", index)))?;
                let root = frame
                    .variable(name)
                    .ok_or_else(|| EvalError::UnknownName(name.to_string()))?;
                (root, rest)
            }
            [name, rest @ ..] => {
                let root = context
                    .local(name)
                    .or_else(|| {
                        context
                            .trace
                            .and_then(|t| t.frames.iter().find_map(|f| f.variable(name)))
                    })
                    .ok_or_else(|| EvalError::UnknownName(name.to_string()))?;
                (root, rest)
            }
            [] => return Err(EvalError::InvalidExpression(expression.to_string())),
        };

        let mut current = root;
        for segment in rest {
            let next = match current {
                Value::List(_) => segment.parse::<usize>().ok().and_then(|i| current.at(i)),
                _ => current.get(segment),
            };
            current = next.ok_or_else(|| {
                EvalError::Failed(format!(
                    "cannot read '{}' from {} in '{}'",
                    segment,
                    current.type_name(),
                    expression
                ))
            })?;
        }

        Ok(current.clone())
    }
}
