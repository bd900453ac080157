//! Success-or-structured-error container for queries.
//!
//! `QueryResult` is what every stack query returns. A failure carries an
//! [`ErrorInfo`] with a message, diagnostic context and the location that
//! produced it. Chaining (`map`, `and_then` and the frame accessors in
//! `call_stack`) short-circuits: once a chain has failed, the first failure
//! travels to the end untouched.
//!
//! Reading the value of a failure (or the error of a success) is misuse and
//! panics. Everything else is total.

use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Where a failure was produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub file: String,
    pub line: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
}

impl Location {
    /// Location of the (track_caller) caller
    #[track_caller]
    pub fn caller() -> Self {
        let loc = std::panic::Location::caller();
        Self {
            file: loc.file().to_string(),
            line: loc.line(),
            function: None,
        }
    }

    pub fn new(file: impl Into<String>, line: u32, function: Option<String>) -> Self {
        Self {
            file: file.into(),
            line,
            function,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.function {
            Some(function) => write!(f, "{}:{} in {}", self.file, self.line, function),
            None => write!(f, "{}:{}", self.file, self.line),
        }
    }
}

/// Structured description of a query failure
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[error("{message} (at {origin})")]
pub struct ErrorInfo {
    pub message: String,

    /// Diagnostic data in insertion order
    #[serde(with = "crate::value::ordered")]
    pub context: Vec<(String, Value)>,

    pub origin: Location,
}

impl ErrorInfo {
    /// Build a failure originating at the caller
    #[track_caller]
    pub fn new<K, I>(message: impl Into<String>, context: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Self::at(Location::caller(), message, context)
    }

    /// Build a failure with an explicit origin
    pub fn at<K, I>(origin: Location, message: impl Into<String>, context: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Self {
            message: message.into(),
            context: context.into_iter().map(|(k, v)| (k.into(), v)).collect(),
            origin,
        }
    }

    /// Look up one context entry
    pub fn context_value(&self, key: &str) -> Option<&Value> {
        self.context.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }
}

/// Result of a query: a value or an [`ErrorInfo`]
#[derive(Debug, Clone, PartialEq)]
#[must_use]
pub enum QueryResult<T> {
    Ok(T),
    Err(ErrorInfo),
}

impl<T> QueryResult<T> {
    pub fn success(value: T) -> Self {
        QueryResult::Ok(value)
    }

    /// Failure originating at the caller; message and context are required
    #[track_caller]
    pub fn failure<K, I>(message: impl Into<String>, context: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        QueryResult::Err(ErrorInfo::new(message, context))
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, QueryResult::Ok(_))
    }

    pub fn is_err(&self) -> bool {
        matches!(self, QueryResult::Err(_))
    }

    /// The success value
    ///
    /// # Panics
    /// If this is a failure. Check `is_ok()` first or use `ok()`.
    #[track_caller]
    pub fn value(&self) -> &T {
        match self {
            QueryResult::Ok(value) => value,
            QueryResult::Err(error) => {
                panic!("value() called on a failed query: {}", error)
            }
        }
    }

    /// Owned success value
    ///
    /// # Panics
    /// If this is a failure.
    #[track_caller]
    pub fn into_value(self) -> T {
        match self {
            QueryResult::Ok(value) => value,
            QueryResult::Err(error) => {
                panic!("into_value() called on a failed query: {}", error)
            }
        }
    }

    /// The failure
    ///
    /// # Panics
    /// If this is a success.
    #[track_caller]
    pub fn error(&self) -> &ErrorInfo {
        match self {
            QueryResult::Err(error) => error,
            QueryResult::Ok(_) => panic!("error() called on a successful query"),
        }
    }

    pub fn ok(self) -> Option<T> {
        match self {
            QueryResult::Ok(value) => Some(value),
            QueryResult::Err(_) => None,
        }
    }

    pub fn err(self) -> Option<ErrorInfo> {
        match self {
            QueryResult::Ok(_) => None,
            QueryResult::Err(error) => Some(error),
        }
    }

    pub fn as_ref(&self) -> QueryResult<&T> {
        match self {
            QueryResult::Ok(value) => QueryResult::Ok(value),
            QueryResult::Err(error) => QueryResult::Err(error.clone()),
        }
    }

    /// Transform the value; a failure passes through and `f` is not called
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> QueryResult<U> {
        match self {
            QueryResult::Ok(value) => QueryResult::Ok(f(value)),
            QueryResult::Err(error) => QueryResult::Err(error),
        }
    }

    /// Chain another query; a failure passes through and `f` is not called
    pub fn and_then<U, F: FnOnce(T) -> QueryResult<U>>(self, f: F) -> QueryResult<U> {
        match self {
            QueryResult::Ok(value) => f(value),
            QueryResult::Err(error) => QueryResult::Err(error),
        }
    }

    pub fn value_or(self, default: T) -> T {
        match self {
            QueryResult::Ok(value) => value,
            QueryResult::Err(_) => default,
        }
    }

    pub fn into_result(self) -> Result<T, ErrorInfo> {
        self.into()
    }
}

impl<T> From<QueryResult<T>> for Result<T, ErrorInfo> {
    fn from(result: QueryResult<T>) -> Self {
        match result {
            QueryResult::Ok(value) => Ok(value),
            QueryResult::Err(error) => Err(error),
        }
    }
}

impl<T> From<Result<T, ErrorInfo>> for QueryResult<T> {
    fn from(result: Result<T, ErrorInfo>) -> Self {
        match result {
            Ok(value) => QueryResult::Ok(value),
            Err(error) => QueryResult::Err(error),
        }
    }
}
