//! # Composition locals
//!
//! A composition local is a value that flows down the composition without
//! being passed through every call: a theme name, a locale tag, the id of the
//! enclosing form. Declare one as a `static`, override it for a subtree with
//! `Composer::provide`, read it with `Composer::local`:
//!
//! ```rust
//! use recompose_core::*;
//!
//! static ACCENT: CompositionLocal<&'static str> = CompositionLocal::new("accent", || "green");
//!
//! let mut cx = Composer::detached();
//! cx.begin_pass();
//! assert_eq!(cx.local(&ACCENT), "green");
//! cx.provide(&ACCENT, "red", |cx| {
//!     assert_eq!(cx.local(&ACCENT), "red");
//! });
//! cx.end_pass();
//! ```
//!
//! Provided values live on the composer that is running, so two requests
//! composing on the same thread never see each other's values.

use std::any::Any;
use std::fmt;

pub struct CompositionLocal<T: 'static> {
    name: &'static str,
    default: fn() -> T,
}

impl<T: 'static> CompositionLocal<T> {
    pub const fn new(name: &'static str, default: fn() -> T) -> Self {
        Self { name, default }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn default_value(&self) -> T {
        (self.default)()
    }

    // statics have a fixed address, which makes a cheap identity
    fn key(&'static self) -> usize {
        self as *const Self as *const () as usize
    }
}

impl<T> fmt::Debug for CompositionLocal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CompositionLocal").field(&self.name).finish()
    }
}

#[derive(Default)]
pub(crate) struct LocalStack {
    frames: Vec<(usize, Box<dyn Any>)>,
}

impl LocalStack {
    /// Returns the depth to truncate back to once the subtree is done.
    pub(crate) fn push<T: 'static>(&mut self, local: &'static CompositionLocal<T>, value: T) -> usize {
        let depth = self.frames.len();
        self.frames.push((local.key(), Box::new(value)));
        depth
    }

    pub(crate) fn truncate(&mut self, depth: usize) {
        self.frames.truncate(depth);
    }

    pub(crate) fn clear(&mut self) {
        self.frames.clear();
    }

    pub(crate) fn get<T: Clone + 'static>(&self, local: &'static CompositionLocal<T>) -> T {
        let key = local.key();
        self.frames
            .iter()
            .rev()
            .find(|(k, _)| *k == key)
            .and_then(|(_, v)| v.downcast_ref::<T>())
            .cloned()
            .unwrap_or_else(|| local.default_value())
    }
}
