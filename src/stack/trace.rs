//! Captured, immutable stack traces.

use super::frame::StackFrame;
use super::FrameSource;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

/// Key of a stack trace in the report's trace table
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StackTraceId(pub u64);

impl fmt::Display for StackTraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A captured call stack, innermost frame first
///
/// Never mutated after capture; the store shares it by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackTrace {
    pub frames: Vec<StackFrame>,
    pub captured_at: DateTime<Utc>,
}

impl StackTrace {
    pub fn new(frames: Vec<StackFrame>) -> Self {
        Self {
            frames,
            captured_at: Utc::now(),
        }
    }

    /// Frame identities, innermost first
    pub fn shape(&self) -> Vec<(&str, u32, &str)> {
        self.frames.iter().map(StackFrame::identity).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl FrameSource for StackTrace {
    fn depth(&self) -> usize {
        self.frames.len()
    }

    fn frame_at(&self, index: usize) -> Option<Cow<'_, StackFrame>> {
        self.frames.get(index).map(Cow::Borrowed)
    }

    fn capture(&self) -> StackTrace {
        self.clone()
    }
}
