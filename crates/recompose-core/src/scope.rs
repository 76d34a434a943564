use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::error::catch_panic;

/// An owner of cleanup callbacks. Composers register their disposables here;
/// disposing the scope disposes children first, then runs its own callbacks
/// in registration order.
pub struct Scope {
    inner: Rc<ScopeInner>,
}

struct ScopeInner {
    disposers: RefCell<Vec<Box<dyn FnOnce()>>>,
    children: RefCell<Vec<Scope>>,
    disposed: Cell<bool>,
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}

impl Scope {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(ScopeInner {
                disposers: RefCell::new(Vec::new()),
                children: RefCell::new(Vec::new()),
                disposed: Cell::new(false),
            }),
        }
    }

    /// Disposers added after disposal run immediately.
    pub fn add_disposer(&self, disposer: impl FnOnce() + 'static) {
        if self.inner.disposed.get() {
            if let Err(message) = catch_panic(disposer) {
                log::error!("disposer panicked: {message}");
            }
            return;
        }
        self.inner.disposers.borrow_mut().push(Box::new(disposer));
    }

    pub fn child(&self) -> Scope {
        let child = Scope::new();
        self.inner.children.borrow_mut().push(child.clone());
        child
    }

    pub fn pending(&self) -> usize {
        self.inner.disposers.borrow().len()
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }

    /// Runs every disposer even if some panic, and returns the panic
    /// messages. Later calls do nothing.
    pub fn dispose(&self) -> Vec<String> {
        if self.inner.disposed.replace(true) {
            return Vec::new();
        }
        self.inner.run_all()
    }
}

impl Clone for Scope {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl ScopeInner {
    fn run_all(&self) -> Vec<String> {
        let mut failures = Vec::new();
        let children = std::mem::take(&mut *self.children.borrow_mut());
        for child in children {
            failures.extend(child.dispose());
        }

        let disposers = std::mem::take(&mut *self.disposers.borrow_mut());
        for disposer in disposers {
            if let Err(message) = catch_panic(disposer) {
                log::error!("disposer panicked: {message}");
                failures.push(message);
            }
        }
        failures
    }
}

impl Drop for ScopeInner {
    fn drop(&mut self) {
        if !self.disposed.replace(true) {
            self.run_all();
        }
    }
}
