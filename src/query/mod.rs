//! Stack queries.
//!
//! - [`QueryResult`] / [`ErrorInfo`] - the result wrapper every query returns
//! - [`CallStack`] - lazy accessor over any `FrameSource`

pub mod call_stack;
pub mod result;

pub use call_stack::{CallStack, Frame};
pub use result::{ErrorInfo, Location, QueryResult};

use crate::stack::{LiveStack, StackFrame};

/// Query engine over the current thread's live stack with `site` as the
/// innermost frame
///
/// **Public** - used by the `call_stack!` macro
pub fn live_call_stack(site: StackFrame) -> CallStack<LiveStack> {
    CallStack::new(LiveStack::at(site))
}
