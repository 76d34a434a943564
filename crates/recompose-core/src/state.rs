use std::cell::{Ref, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::reactive::StateId;
use crate::recomposer::RecomposerInner;

/// A reactive value. Reading it with `get`/`with` during a pass subscribes
/// the running composer; `set`/`update` notify every subscriber.
///
/// Clones share the same value and identity.
pub struct State<T: 'static> {
    inner: Rc<StateInner<T>>,
}

struct StateInner<T> {
    id: StateId,
    value: RefCell<T>,
    runtime: Weak<RecomposerInner>,
}

impl<T: 'static> State<T> {
    pub(crate) fn attached(
        runtime: &Weak<RecomposerInner>,
        label: Option<&'static str>,
        value: T,
    ) -> Self {
        let id = runtime
            .upgrade()
            .map(|rt| rt.graph.borrow_mut().new_state(label))
            .unwrap_or_default();
        Self {
            inner: Rc::new(StateInner {
                id,
                value: RefCell::new(value),
                runtime: runtime.clone(),
            }),
        }
    }

    /// A value not attached to any runtime; reads and writes are untracked.
    pub fn detached(value: T) -> Self {
        Self::attached(&Weak::new(), None, value)
    }

    pub fn id(&self) -> StateId {
        self.inner.id
    }

    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.track();
        self.inner.value.borrow().clone()
    }

    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.track();
        f(&self.inner.value.borrow())
    }

    /// Reads without subscribing the running composer.
    pub fn get_untracked(&self) -> T
    where
        T: Clone,
    {
        self.inner.value.borrow().clone()
    }

    pub fn borrow_untracked(&self) -> Ref<'_, T> {
        self.inner.value.borrow()
    }

    /// Stores `value` and notifies readers, even when it equals the old one.
    pub fn set(&self, value: T) {
        *self.inner.value.borrow_mut() = value;
        self.notify();
    }

    pub fn update(&self, f: impl FnOnce(&mut T)) {
        f(&mut self.inner.value.borrow_mut());
        self.notify();
    }

    /// Stores `value` only if it differs; returns whether it did.
    pub fn set_if_changed(&self, value: T) -> bool
    where
        T: PartialEq,
    {
        if *self.inner.value.borrow() == value {
            return false;
        }
        self.set(value);
        true
    }

    fn track(&self) {
        if let Some(rt) = self.inner.runtime.upgrade() {
            rt.record_read_current(self.inner.id);
        }
    }

    fn notify(&self) {
        if let Some(rt) = self.inner.runtime.upgrade() {
            rt.record_state_write(self.inner.id);
        }
    }
}

impl<T: 'static> Clone for State<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: fmt::Debug + 'static> fmt::Debug for State<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.value.try_borrow() {
            Ok(v) => f
                .debug_struct("State")
                .field("id", &self.inner.id)
                .field("value", &*v)
                .finish(),
            Err(_) => f
                .debug_struct("State")
                .field("id", &self.inner.id)
                .finish_non_exhaustive(),
        }
    }
}

impl<T> Drop for StateInner<T> {
    fn drop(&mut self) {
        if let Some(rt) = self.runtime.upgrade() {
            rt.forget_state(self.id);
        }
    }
}
