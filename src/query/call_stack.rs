//! Fluent, never-failing queries over a stack.
//!
//! ```ignore
//! let stack = call_stack!();
//! let user = stack.caller().variable("user_id");
//! if user.is_ok() { ... }
//! ```
//!
//! Every accessor returns a [`QueryResult`]. Accessors defined on a frame
//! result pass a failure through unchanged, so arbitrarily long chains can be
//! written without checking each step; the first miss is what comes out.

use super::result::{ErrorInfo, Location, QueryResult};
use crate::stack::{FrameSource, StackFrame, StackTrace};
use crate::value::Value;
use std::borrow::Cow;
use std::fmt;
use std::ops::Deref;

/// Query engine over any [`FrameSource`]
pub struct CallStack<S: FrameSource> {
    source: S,
}

impl<S: FrameSource> CallStack<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn depth(&self) -> usize {
        self.source.depth()
    }

    /// The innermost frame
    #[track_caller]
    pub fn current(&self) -> QueryResult<Frame<'_>> {
        match self.source.frame_at(0) {
            Some(frame) => QueryResult::Ok(Frame::new(0, frame, &self.source)),
            None => QueryResult::failure("No current frame", [("available_frames", Value::Int(0))]),
        }
    }

    /// The frame that called the current one
    #[track_caller]
    pub fn caller(&self) -> QueryResult<Frame<'_>> {
        self.frame(1)
    }

    /// Any frame by 0-based index, 0 being the current frame
    #[track_caller]
    pub fn frame(&self, index: usize) -> QueryResult<Frame<'_>> {
        resolve(&self.source, index, Location::caller())
    }

    /// First caller, walking outward from the current frame's caller,
    /// that satisfies `predicate`
    #[track_caller]
    pub fn find_caller<P>(&self, mut predicate: P) -> QueryResult<Frame<'_>>
    where
        P: FnMut(&StackFrame) -> bool,
    {
        let depth = self.source.depth();
        for index in 1..depth {
            if let Some(frame) = self.source.frame_at(index) {
                if predicate(&frame) {
                    return QueryResult::Ok(Frame::new(index, frame, &self.source));
                }
            }
        }
        QueryResult::failure(
            "No caller matches predicate",
            [("available_frames", Value::from(depth))],
        )
    }

    /// Materialize the whole stack
    pub fn capture(&self) -> StackTrace {
        self.source.capture()
    }
}

fn resolve(source: &dyn FrameSource, index: usize, origin: Location) -> QueryResult<Frame<'_>> {
    match source.frame_at(index) {
        Some(frame) => QueryResult::Ok(Frame::new(index, frame, source)),
        None => QueryResult::Err(ErrorInfo::at(
            origin,
            "Frame index out of range",
            [
                ("available_frames", Value::from(source.depth())),
                ("required_index", Value::from(index)),
            ],
        )),
    }
}

/// A resolved frame, still attached to the stack it came from
#[derive(Clone)]
pub struct Frame<'a> {
    index: usize,
    frame: Cow<'a, StackFrame>,
    stack: &'a dyn FrameSource,
}

impl<'a> Frame<'a> {
    fn new(index: usize, frame: Cow<'a, StackFrame>, stack: &'a dyn FrameSource) -> Self {
        Self {
            index,
            frame,
            stack,
        }
    }

    /// Position in the stack, 0 being the current frame
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn into_owned(self) -> StackFrame {
        self.frame.into_owned()
    }

    /// The frame that called this one
    #[track_caller]
    pub fn caller(&self) -> QueryResult<Frame<'a>> {
        resolve(self.stack, self.index + 1, Location::caller())
    }

    pub fn variable(&self, name: &str) -> QueryResult<Value> {
        match self.frame.variable(name) {
            Some(value) => QueryResult::Ok(value.clone()),
            None => QueryResult::Err(ErrorInfo::at(
                self.location(),
                format!("Variable '{}' not found in frame", name),
                [
                    ("variable_name", Value::from(name)),
                    (
                        "available_variable_names",
                        Value::from(self.frame.variable_names()),
                    ),
                ],
            )),
        }
    }

    /// Location of this frame, used as the origin of lookups that miss in it
    fn location(&self) -> Location {
        Location::new(
            self.frame.filename.clone(),
            self.frame.line_number,
            Some(self.frame.qualified_name()),
        )
    }
}

impl Deref for Frame<'_> {
    type Target = StackFrame;

    fn deref(&self) -> &StackFrame {
        &self.frame
    }
}

impl fmt::Debug for Frame<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("index", &self.index)
            .field("frame", &*self.frame)
            .finish()
    }
}

impl PartialEq for Frame<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && *self.frame == *other.frame
    }
}

/// Frame accessors on a query result. Each one passes a failure through
/// untouched.
impl<'a> QueryResult<Frame<'a>> {
    #[track_caller]
    pub fn caller(&self) -> QueryResult<Frame<'a>> {
        match self {
            QueryResult::Ok(frame) => frame.caller(),
            QueryResult::Err(error) => QueryResult::Err(error.clone()),
        }
    }

    pub fn variable(&self, name: &str) -> QueryResult<Value> {
        self.project(|frame| frame.variable(name))
    }

    /// All variables in binding order
    pub fn variables(&self) -> QueryResult<Vec<(String, Value)>> {
        self.project(|frame| QueryResult::Ok(frame.local_variables.clone()))
    }

    pub fn function_name(&self) -> QueryResult<String> {
        self.project(|frame| QueryResult::Ok(frame.function_name.clone()))
    }

    pub fn filename(&self) -> QueryResult<String> {
        self.project(|frame| QueryResult::Ok(frame.filename.clone()))
    }

    pub fn line_number(&self) -> QueryResult<u32> {
        self.project(|frame| QueryResult::Ok(frame.line_number))
    }

    pub fn enclosing_type_name(&self) -> QueryResult<Option<String>> {
        self.project(|frame| QueryResult::Ok(frame.enclosing_type_name.clone()))
    }

    pub fn code_context(&self) -> QueryResult<String> {
        self.project(|frame| QueryResult::Ok(frame.code_context.clone()))
    }

    pub fn qualified_name(&self) -> QueryResult<String> {
        self.project(|frame| QueryResult::Ok(frame.qualified_name()))
    }

    fn project<U>(&self, f: impl FnOnce(&Frame<'a>) -> QueryResult<U>) -> QueryResult<U> {
        match self {
            QueryResult::Ok(frame) => f(frame),
            QueryResult::Err(error) => QueryResult::Err(error.clone()),
        }
    }
}
