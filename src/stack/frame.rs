//! A single captured stack frame.

use crate::value::Value;
use serde::{Deserialize, Serialize};

/// One level of a call stack: location, source line and a snapshot of the
/// variables bound in that scope
///
/// **Public** - stored inside every captured `StackTrace`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackFrame {
    /// Source file of the frame
    pub filename: String,

    /// Function the frame belongs to
    pub function_name: String,

    /// Type owning the function, for methods
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enclosing_type_name: Option<String>,

    /// 1-based line number
    pub line_number: u32,

    /// Source text of the line, empty when unavailable
    #[serde(default)]
    pub code_context: String,

    /// Variables in binding order
    #[serde(default, with = "crate::value::ordered")]
    pub local_variables: Vec<(String, Value)>,
}

impl StackFrame {
    /// Create a frame with no code context and no variables
    pub fn new(
        filename: impl Into<String>,
        function_name: impl Into<String>,
        line_number: u32,
    ) -> Self {
        Self {
            filename: filename.into(),
            function_name: function_name.into(),
            enclosing_type_name: None,
            line_number,
            code_context: String::new(),
            local_variables: Vec::new(),
        }
    }

    pub fn with_type(mut self, type_name: impl Into<String>) -> Self {
        self.enclosing_type_name = Some(type_name.into());
        self
    }

    pub fn with_code_context(mut self, code: impl Into<String>) -> Self {
        self.code_context = code.into();
        self
    }

    /// Add a variable, replacing an earlier binding of the same name in place
    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set_variable(name.into(), value.into());
        self
    }

    pub(crate) fn set_variable(&mut self, name: String, value: Value) {
        match self.local_variables.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.local_variables.push((name, value)),
        }
    }

    /// Look up a variable by name
    pub fn variable(&self, name: &str) -> Option<&Value> {
        self.local_variables
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn variable_names(&self) -> Vec<String> {
        self.local_variables.iter().map(|(n, _)| n.clone()).collect()
    }

    /// `Type::function` for methods, `function` otherwise
    pub fn qualified_name(&self) -> String {
        match &self.enclosing_type_name {
            Some(type_name) => format!("{}::{}", type_name, self.function_name),
            None => self.function_name.clone(),
        }
    }

    /// Location identity used for signatures: file, line and function only
    pub fn identity(&self) -> (&str, u32, &str) {
        (&self.filename, self.line_number, &self.function_name)
    }
}
