//! Per-resolution cycle detection
//!
//! Every top-level resolution owns one [`ResolutionContext`] and threads it
//! through its recursive calls. Nothing here is shared between independent
//! resolutions, so concurrent callers never see each other's in-progress
//! names.

use crate::{DiError, Result};
use ahash::AHashSet;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::trace;

/// Names currently being constructed on one resolution call chain.
#[derive(Debug, Default)]
pub struct ResolutionContext {
    /// Entry order, used to report the cycle path
    stack: Vec<Arc<str>>,
    /// Membership index over `stack`
    in_progress: AHashSet<Arc<str>>,
}

impl ResolutionContext {
    /// Create an empty context for a new top-level resolution
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `name` as being resolved.
    ///
    /// Fails with [`DiError::CircularDependency`] if `name` is already in
    /// progress; the reported path starts at the first occurrence of `name`
    /// and ends with `name` again, e.g. `[a, b, c, a]` or `[a, a]`.
    ///
    /// The returned frame removes `name` again when dropped, on every exit
    /// path of the caller.
    pub fn enter(&mut self, name: &Arc<str>) -> Result<ResolutionFrame<'_>> {
        if self.in_progress.contains(name) {
            let start = self
                .stack
                .iter()
                .position(|entry| entry == name)
                .unwrap_or(0);
            let path = self.stack[start..]
                .iter()
                .chain(std::iter::once(name))
                .map(|entry| entry.to_string())
                .collect();

            #[cfg(feature = "logging")]
            trace!(
                target: "service_container",
                service = &**name,
                depth = self.stack.len(),
                "Resolution re-entered an in-progress service"
            );

            return Err(DiError::CircularDependency { path });
        }

        self.in_progress.insert(Arc::clone(name));
        self.stack.push(Arc::clone(name));

        Ok(ResolutionFrame { context: self })
    }

    /// Remove the most recently entered name.
    fn leave(&mut self) {
        if let Some(name) = self.stack.pop() {
            self.in_progress.remove(&name);
        }
    }

    /// Check if `name` is currently being resolved
    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.in_progress.contains(name)
    }

    /// Current nesting depth
    #[inline]
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// In-progress names, outermost first
    pub fn path(&self) -> impl Iterator<Item = &str> {
        self.stack.iter().map(|name| &**name)
    }

    /// Check if no resolution is in progress
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }
}

/// Guard for one entered name; dereferences to the owning context so
/// nested resolutions can enter further names through it.
#[derive(Debug)]
pub struct ResolutionFrame<'a> {
    context: &'a mut ResolutionContext,
}

impl Deref for ResolutionFrame<'_> {
    type Target = ResolutionContext;

    #[inline]
    fn deref(&self) -> &Self::Target {
        self.context
    }
}

impl DerefMut for ResolutionFrame<'_> {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.context
    }
}

impl Drop for ResolutionFrame<'_> {
    fn drop(&mut self) {
        self.context.leave();
    }
}
