//! Thread-local shadow stack and the live view over it.
//!
//! Instrumented functions announce themselves with [`enter_scope`] (usually
//! through the `scope!` macro) and publish variables with [`bind`]. The
//! returned guard pops the frame when the function returns, so the shadow
//! stack mirrors the instrumented part of the real call stack.
//!
//! [`LiveStack`] reads through to this state on demand. It is deliberately
//! `!Send`: it only makes sense on the thread that created it, for the
//! duration of a query chain, and is never stored. Use
//! [`FrameSource::capture`] to turn it into an immutable `StackTrace`.

use super::frame::StackFrame;
use super::source;
use super::trace::StackTrace;
use super::FrameSource;
use crate::value::Value;
use std::borrow::Cow;
use std::cell::RefCell;
use std::marker::PhantomData;

thread_local! {
    static SHADOW: RefCell<Vec<StackFrame>> = const { RefCell::new(Vec::new()) };
}

/// Pops the scope pushed by [`enter_scope`] when dropped
#[must_use = "the scope ends when the guard is dropped"]
pub struct ScopeGuard {
    depth: usize,
    _not_send: PhantomData<*const ()>,
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        // Truncate rather than pop so a leaked inner guard cannot desync us
        SHADOW.with(|stack| stack.borrow_mut().truncate(self.depth));
    }
}

/// Push a frame for the current function onto this thread's shadow stack
pub fn enter_scope(
    filename: &str,
    function_name: &str,
    line_number: u32,
    enclosing_type_name: Option<&str>,
) -> ScopeGuard {
    let mut frame = StackFrame::new(filename, function_name, line_number.max(1));
    frame.enclosing_type_name = enclosing_type_name.map(str::to_string);

    let depth = SHADOW.with(|stack| {
        let mut stack = stack.borrow_mut();
        stack.push(frame);
        stack.len() - 1
    });

    ScopeGuard {
        depth,
        _not_send: PhantomData,
    }
}

/// Bind a variable in the innermost scope
///
/// # Returns
/// `false` when no scope is active on this thread
pub fn bind(name: &str, value: Value) -> bool {
    SHADOW.with(|stack| match stack.borrow_mut().last_mut() {
        Some(frame) => {
            frame.set_variable(name.to_string(), value);
            true
        }
        None => false,
    })
}

/// Update the line number of the innermost scope
pub fn set_line(line_number: u32) {
    SHADOW.with(|stack| {
        if let Some(frame) = stack.borrow_mut().last_mut() {
            frame.line_number = line_number.max(1);
        }
    });
}

/// Number of active scopes on this thread
pub fn scope_depth() -> usize {
    SHADOW.with(|stack| stack.borrow().len())
}

/// Live, read-through view of the current thread's stack
///
/// When built with a site frame (the location a query or recording was made
/// from), that frame is the innermost one. If the innermost scope belongs to
/// the same function, the two are merged: the scope's variables with the
/// site's line.
pub struct LiveStack {
    site: Option<StackFrame>,
    code_context: bool,
    _not_send: PhantomData<*const ()>,
}

impl LiveStack {
    /// View of the active scopes only
    pub fn current() -> Self {
        Self {
            site: None,
            code_context: false,
            _not_send: PhantomData,
        }
    }

    /// View with `site` as the innermost frame
    pub fn at(site: StackFrame) -> Self {
        Self {
            site: Some(site),
            code_context: false,
            _not_send: PhantomData,
        }
    }

    /// Fill in source lines for frames as they are read
    pub fn with_code_context(mut self, enabled: bool) -> Self {
        self.code_context = enabled;
        self
    }

    /// Whether the site frame stands on its own rather than merging into
    /// the innermost scope
    fn site_is_separate(&self, shadow: &[StackFrame]) -> bool {
        match (&self.site, shadow.last()) {
            (Some(site), Some(top)) => {
                !(site.filename == top.filename && site.function_name == top.function_name)
            }
            (Some(_), None) => true,
            (None, _) => false,
        }
    }

    fn resolve(&self, shadow: &[StackFrame], index: usize) -> Option<StackFrame> {
        let separate = self.site_is_separate(shadow);
        let mut frame = match (&self.site, index) {
            (Some(site), 0) if separate => site.clone(),
            (Some(site), 0) => {
                let mut merged = shadow.last()?.clone();
                merged.line_number = site.line_number;
                merged.code_context = site.code_context.clone();
                if merged.enclosing_type_name.is_none() {
                    merged.enclosing_type_name = site.enclosing_type_name.clone();
                }
                merged
            }
            _ => {
                let offset = if separate { index - 1 } else { index };
                let position = shadow.len().checked_sub(offset + 1)?;
                shadow.get(position)?.clone()
            }
        };

        if self.code_context && frame.code_context.is_empty() {
            frame.code_context = source::line_at(&frame.filename, frame.line_number);
        }
        Some(frame)
    }
}

impl FrameSource for LiveStack {
    fn depth(&self) -> usize {
        SHADOW.with(|stack| {
            let stack = stack.borrow();
            stack.len() + usize::from(self.site_is_separate(&stack))
        })
    }

    fn frame_at(&self, index: usize) -> Option<Cow<'_, StackFrame>> {
        SHADOW.with(|stack| self.resolve(&stack.borrow(), index).map(Cow::Owned))
    }

    fn capture(&self) -> StackTrace {
        let frames = SHADOW.with(|stack| {
            let stack = stack.borrow();
            let depth = stack.len() + usize::from(self.site_is_separate(&stack));
            (0..depth)
                .filter_map(|i| self.resolve(&stack, i))
                .collect()
        });
        StackTrace::new(frames)
    }
}
