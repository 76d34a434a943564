use std::any::Any;
use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::rc::{Rc, Weak};

use bitflags::bitflags;
use smallvec::SmallVec;

use crate::effects::{EffectErrorSink, EffectExecutor, InlineExecutor};
use crate::error::EffectError;
use crate::locals::{CompositionLocal, LocalStack};
use crate::reactive::{ComposerId, StateId};
use crate::recomposer::RecomposerInner;
use crate::render_api::{NodeId, Renderer, SharedRenderer};
use crate::scope::Scope;
use crate::slot_table::{GroupKey, SlotTable};
use crate::state::State;

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
    pub struct ComposerFlags: u8 {
        /// A pass is running.
        const COMPOSING = 1 << 0;
        const DISPOSED = 1 << 1;
        /// The latest pass panicked; its output was not committed.
        const FAILED = 1 << 2;
    }
}

/// Hashes any key into a group key. Used for loop item keys and the like.
pub fn group_key<K: Hash + ?Sized>(key: &K) -> GroupKey {
    let mut h = DefaultHasher::new();
    key.hash(&mut h);
    h.finish()
}

/// Drives one composition pass at a time over its own slot table.
///
/// Memory is positional: the Nth `next_slot` of a pass sees what the Nth
/// `next_slot` of the previous pass stored. Code whose control flow changes
/// which slots it visits (conditionals, loops) must wrap each branch or item
/// in a group with a stable key (`start_group`/`end_group`, or `keyed`),
/// otherwise a pass that takes another branch reads unrelated values. The
/// composer cannot detect that mistake; it can only warn when a slot's type
/// no longer matches.
pub struct Composer {
    pub(crate) id: ComposerId,
    pub(crate) slots: SlotTable,
    keyed_slots: HashMap<String, Box<dyn Any>>,
    nodes: SmallVec<[NodeId; 16]>,
    next_node: u32,
    locals: LocalStack,
    scope: Scope,
    pub(crate) side_effects: Vec<Box<dyn FnOnce()>>,
    flags: ComposerFlags,
    passes: u64,
    runtime: Weak<RecomposerInner>,
    renderer: Option<SharedRenderer>,
    pub(crate) executor: Rc<dyn EffectExecutor>,
    pub(crate) effect_errors: EffectErrorSink,
}

impl Default for Composer {
    fn default() -> Self {
        Self::detached()
    }
}

impl Composer {
    /// A composer outside any `Recomposer`: no dependency tracking, effects
    /// run inline. Drive passes by hand with `begin_pass`/`end_pass`.
    pub fn detached() -> Self {
        Self {
            id: ComposerId::default(),
            slots: SlotTable::new(),
            keyed_slots: HashMap::new(),
            nodes: SmallVec::new(),
            next_node: 0,
            locals: LocalStack::default(),
            scope: Scope::new(),
            side_effects: Vec::new(),
            flags: ComposerFlags::empty(),
            passes: 0,
            runtime: Weak::new(),
            renderer: None,
            executor: Rc::new(InlineExecutor),
            effect_errors: EffectErrorSink::default(),
        }
    }

    pub(crate) fn attached(
        id: ComposerId,
        runtime: Weak<RecomposerInner>,
        renderer: Option<SharedRenderer>,
        executor: Rc<dyn EffectExecutor>,
        effect_errors: EffectErrorSink,
    ) -> Self {
        let mut composer = Self::detached();
        composer.id = id;
        composer.runtime = runtime;
        composer.renderer = renderer;
        composer.executor = executor;
        composer.effect_errors = effect_errors;
        composer
    }

    pub fn with_renderer(mut self, renderer: SharedRenderer) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn id(&self) -> ComposerId {
        self.id
    }

    pub fn flags(&self) -> ComposerFlags {
        self.flags
    }

    pub fn is_disposed(&self) -> bool {
        self.flags.contains(ComposerFlags::DISPOSED)
    }

    /// Number of passes that completed.
    pub fn pass_count(&self) -> u64 {
        self.passes
    }

    pub fn slot_table(&self) -> &SlotTable {
        &self.slots
    }

    pub fn effect_errors(&self) -> &EffectErrorSink {
        &self.effect_errors
    }

    // Pass control. The Recomposer brackets every pass with these.

    pub fn begin_pass(&mut self) {
        self.slots.begin_pass();
        self.nodes.clear();
        self.next_node = 0;
        self.locals.clear();
        self.side_effects.clear();
        self.flags.insert(ComposerFlags::COMPOSING);
    }

    /// Commits the pass: drops unvisited slots, then runs side effects.
    pub fn end_pass(&mut self) {
        if !self.nodes.is_empty() {
            log::warn!(
                "composer {:?}: {} node(s) left open at end of pass",
                self.id,
                self.nodes.len()
            );
            self.nodes.clear();
        }
        self.slots.end_pass();
        let failures = self.slots.take_hook_failures();
        self.report_cleanup_failures(failures);
        self.flags
            .remove(ComposerFlags::COMPOSING | ComposerFlags::FAILED);
        self.passes += 1;
        for effect in std::mem::take(&mut self.side_effects) {
            effect();
        }
    }

    /// Abandons a failed pass. Slots keep their last values.
    pub fn abort_pass(&mut self) {
        self.slots.abort_pass();
        let failures = self.slots.take_hook_failures();
        self.report_cleanup_failures(failures);
        self.nodes.clear();
        self.locals.clear();
        self.side_effects.clear();
        self.flags.remove(ComposerFlags::COMPOSING);
        self.flags.insert(ComposerFlags::FAILED);
    }

    // Output tree

    pub fn start_node(&mut self) -> NodeId {
        let id = NodeId(self.next_node);
        self.next_node += 1;
        self.nodes.push(id);
        id
    }

    pub fn end_node(&mut self) -> Option<NodeId> {
        let node = self.nodes.pop();
        if node.is_none() {
            log::warn!("end_node called without a matching start_node");
        }
        node
    }

    pub fn current_node(&self) -> Option<NodeId> {
        self.nodes.last().copied()
    }

    pub fn node_depth(&self) -> usize {
        self.nodes.len()
    }

    /// Hands the injected renderer to `f`, if there is one.
    pub fn render(&self, f: impl FnOnce(&mut dyn Renderer)) {
        if let Some(r) = &self.renderer {
            f(&mut *r.borrow_mut());
        }
    }

    // Groups

    pub fn start_group(&mut self, key: GroupKey) {
        self.slots.start_group(key);
    }

    pub fn end_group(&mut self) {
        self.slots.end_group();
    }

    /// Runs `f` inside a group keyed by `key`.
    pub fn keyed<K: Hash + ?Sized, R>(&mut self, key: &K, f: impl FnOnce(&mut Self) -> R) -> R {
        self.start_group(group_key(key));
        let out = f(self);
        self.end_group();
        out
    }

    // Slots

    pub fn next_slot(&mut self) -> usize {
        self.slots.next_slot()
    }

    pub fn get_slot(&self) -> Option<&dyn Any> {
        self.slots.get_slot()
    }

    pub fn set_slot<T: 'static>(&mut self, value: T) {
        self.slots.set_slot(Box::new(value));
    }

    /// Claims the next slot and stores `value` if it differs from what the
    /// previous pass stored there. Returns whether it differed.
    pub fn changed<T: PartialEq + 'static>(&mut self, value: T) -> bool {
        self.next_slot();
        if self.get_slot().and_then(|v| v.downcast_ref::<T>()) == Some(&value) {
            return false;
        }
        self.slots.set_slot(Box::new(value));
        true
    }

    /// Slot-based remember (positional).
    pub fn remember<T: 'static>(&mut self, init: impl FnOnce() -> T) -> Rc<T> {
        let at = self.next_slot();
        if let Some(rc) = self.get_slot().and_then(|v| v.downcast_ref::<Rc<T>>()) {
            return rc.clone();
        }
        if self.get_slot().is_some() {
            log::warn!(
                "remember: slot {at} type changed; replacing. \
                 If this is due to conditional composition, wrap the branch in a keyed group."
            );
        }
        let rc = Rc::new(init());
        self.slots.set_slot(Box::new(rc.clone()));
        rc
    }

    /// Positional remember that recomputes when `input` changes.
    pub fn remember_keyed<K: PartialEq + 'static, T: 'static>(
        &mut self,
        input: K,
        init: impl FnOnce(&K) -> T,
    ) -> Rc<T> {
        self.next_slot();
        if let Some((k, rc)) = self.get_slot().and_then(|v| v.downcast_ref::<(K, Rc<T>)>())
            && *k == input
        {
            return rc.clone();
        }
        let rc = Rc::new(init(&input));
        self.slots.set_slot(Box::new((input, rc.clone())));
        rc
    }

    /// Key-based remember; survives branch changes.
    ///
    /// Entries are not tied to slots, so a value stays until `forget_key`
    /// or disposal even if no pass asks for its key again.
    pub fn remember_with_key<T: 'static>(
        &mut self,
        key: impl Into<String>,
        init: impl FnOnce() -> T,
    ) -> Rc<T> {
        let key = key.into();
        if let Some(existing) = self.keyed_slots.get(&key) {
            if let Some(rc) = existing.downcast_ref::<Rc<T>>() {
                return rc.clone();
            }
            log::warn!("remember_with_key: key '{key}' reused with a different type; replacing.");
        }
        let rc = Rc::new(init());
        self.keyed_slots.insert(key, Box::new(rc.clone()));
        rc
    }

    /// Releases a `remember_with_key` value. Returns false if the key was
    /// not held.
    pub fn forget_key(&mut self, key: &str) -> bool {
        self.keyed_slots.remove(key).is_some()
    }

    /// A reactive value owned by this call site.
    pub fn remember_state<T: 'static>(&mut self, init: impl FnOnce() -> T) -> State<T> {
        let runtime = self.runtime.clone();
        let state = self.remember(|| State::attached(&runtime, None, init()));
        State::clone(&state)
    }

    /// A fresh reactive value tied to this composer's runtime.
    pub fn state<T: 'static>(&self, value: T) -> State<T> {
        State::attached(&self.runtime, None, value)
    }

    // Dependencies

    /// Adds `state` to this pass's read set. `State::get` does this on its
    /// own; call it directly for values held outside a `State`.
    pub fn record_read(&mut self, state: StateId) -> bool {
        match self.runtime.upgrade() {
            Some(rt) => rt.graph.borrow_mut().record_read(self.id, state),
            None => false,
        }
    }

    pub fn read_set(&self) -> Vec<StateId> {
        match self.runtime.upgrade() {
            Some(rt) => rt.graph.borrow().reads_of(self.id),
            None => Vec::new(),
        }
    }

    // Locals

    pub fn provide<T: 'static, R>(
        &mut self,
        local: &'static CompositionLocal<T>,
        value: T,
        f: impl FnOnce(&mut Self) -> R,
    ) -> R {
        let depth = self.locals.push(local, value);
        let out = f(self);
        self.locals.truncate(depth);
        out
    }

    pub fn local<T: Clone + 'static>(&self, local: &'static CompositionLocal<T>) -> T {
        self.locals.get(local)
    }

    // Lifecycle

    pub fn register_disposable(&self, f: impl FnOnce() + 'static) {
        self.scope.add_disposer(f);
    }

    /// Runs registered disposables, clears every slot (running effect
    /// cleanups) and removes this composer from the dependency graph.
    /// A panicking cleanup is reported to the effect error sink and the
    /// rest still run. Later calls do nothing.
    pub fn dispose(&mut self) {
        if self.flags.contains(ComposerFlags::DISPOSED) {
            return;
        }
        self.flags.insert(ComposerFlags::DISPOSED);
        self.flags.remove(ComposerFlags::COMPOSING);
        let mut failures = self.scope.dispose();
        self.slots.clear();
        failures.extend(self.slots.take_hook_failures());
        self.keyed_slots.clear();
        self.side_effects.clear();
        self.report_cleanup_failures(failures);
        if let Some(rt) = self.runtime.upgrade() {
            rt.forget_composer(self.id);
        }
    }

    pub(crate) fn report_cleanup_failures(&self, failures: Vec<String>) {
        for message in failures {
            self.effect_errors.push(EffectError::CleanupPanicked {
                composer: self.id,
                message,
            });
        }
    }
}

impl Drop for Composer {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for Composer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Composer")
            .field("id", &self.id)
            .field("flags", &self.flags)
            .field("passes", &self.passes)
            .field("slots", &self.slots)
            .finish()
    }
}
