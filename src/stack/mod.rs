//! Stack model.
//!
//! A stack is read through the [`FrameSource`] trait, which has two
//! implementations:
//! - [`StackTrace`] - eager, immutable, stored in reports
//! - [`LiveStack`] - reads the current thread's shadow stack on demand,
//!   used transiently while querying and never stored
//!
//! The query engine in `crate::query` is agnostic to which one backs it.

pub mod frame;
pub mod shadow;
pub mod source;
pub mod trace;

pub use frame::StackFrame;
pub use shadow::{bind, enter_scope, scope_depth, set_line, LiveStack, ScopeGuard};
pub use trace::{StackTrace, StackTraceId};

use std::borrow::Cow;

/// Read access to a stack, innermost frame at index 0
pub trait FrameSource {
    /// Number of frames currently visible
    fn depth(&self) -> usize;

    /// The frame at `index`, materialized only when asked for
    fn frame_at(&self, index: usize) -> Option<Cow<'_, StackFrame>>;

    /// Materialize every frame into an immutable trace
    fn capture(&self) -> StackTrace;
}
