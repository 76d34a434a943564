//! Dependency tracking and recomposition scheduling.
//!
//! The `Recomposer` owns every `Composer`, the `state -> composers` graph
//! and the pending set. A write to a `State` enqueues each composer that read
//! it during its latest pass and asks the injected `FlushScheduler` for one
//! flush; the flush re-runs each queued composer's content in isolation.

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};

use slotmap::SlotMap;

use crate::composer::Composer;
use crate::effects::{EffectErrorSink, EffectExecutor, InlineExecutor};
use crate::error::{ComposeError, EffectError, RuntimeError, panic_message};
use crate::reactive::{ComposerId, DependencyGraph, StateId};
use crate::render_api::SharedRenderer;
use crate::scheduler::{FlushScheduler, ImmediateScheduler};
use crate::state::State;
use crate::sync::InvalidationInbox;

/// Entry point a composer re-runs on every pass.
pub type Content = Rc<dyn Fn(&mut Composer)>;

pub type ErrorHook = Box<dyn Fn(&RuntimeError)>;

pub const DEFAULT_MAX_FLUSH_PASSES: usize = 32;

/// Outcome of one flush.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FlushReport {
    /// Composers whose pass committed, in execution order.
    pub recomposed: Vec<ComposerId>,
    pub failed: Vec<ComposeError>,
    pub effect_errors: Vec<EffectError>,
    /// Still pending because the flush hit its pass limit.
    pub deferred: Vec<ComposerId>,
}

impl FlushReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.effect_errors.is_empty() && self.deferred.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.recomposed.is_empty() && self.is_clean()
    }
}

pub struct RecomposerBuilder {
    scheduler: Rc<dyn FlushScheduler>,
    renderer: Option<SharedRenderer>,
    executor: Rc<dyn EffectExecutor>,
    on_error: Option<ErrorHook>,
    max_flush_passes: usize,
}

impl Default for RecomposerBuilder {
    fn default() -> Self {
        Self {
            scheduler: Rc::new(ImmediateScheduler),
            renderer: None,
            executor: Rc::new(InlineExecutor),
            on_error: None,
            max_flush_passes: DEFAULT_MAX_FLUSH_PASSES,
        }
    }
}

impl RecomposerBuilder {
    pub fn scheduler(mut self, scheduler: impl FlushScheduler + 'static) -> Self {
        self.scheduler = Rc::new(scheduler);
        self
    }

    pub fn renderer(mut self, renderer: SharedRenderer) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn executor(mut self, executor: impl EffectExecutor + 'static) -> Self {
        self.executor = Rc::new(executor);
        self
    }

    /// Receives every composition and effect failure, after it is logged.
    pub fn on_error(mut self, hook: impl Fn(&RuntimeError) + 'static) -> Self {
        self.on_error = Some(Box::new(hook));
        self
    }

    /// Upper bound on rounds within one flush. Composers invalidated by the
    /// last allowed round stay pending for the next flush.
    pub fn max_flush_passes(mut self, n: usize) -> Self {
        self.max_flush_passes = n.max(1);
        self
    }

    pub fn build(self) -> Recomposer {
        let inner = Rc::new_cyclic(|weak| RecomposerInner {
            this: weak.clone(),
            graph: RefCell::new(DependencyGraph::new()),
            composers: RefCell::new(SlotMap::with_key()),
            pending: RefCell::new(PendingSet::default()),
            flush_scheduled: Cell::new(false),
            processing: Cell::new(false),
            hold: Cell::new(0),
            flush_wanted: Cell::new(false),
            current: Cell::new(None),
            root: Cell::new(None),
            scheduler: self.scheduler,
            renderer: self.renderer,
            executor: self.executor,
            effect_errors: EffectErrorSink::default(),
            on_error: self.on_error,
            inbox: InvalidationInbox::new(),
            max_flush_passes: self.max_flush_passes,
            last_report: RefCell::new(FlushReport::default()),
        });
        Recomposer { inner }
    }
}

#[derive(Default)]
struct PendingSet {
    order: Vec<ComposerId>,
    members: HashSet<ComposerId>,
}

impl PendingSet {
    fn insert(&mut self, id: ComposerId) -> bool {
        if !self.members.insert(id) {
            return false;
        }
        self.order.push(id);
        true
    }

    fn remove(&mut self, id: ComposerId) {
        if self.members.remove(&id) {
            self.order.retain(|c| *c != id);
        }
    }

    fn take(&mut self) -> Vec<ComposerId> {
        self.members.clear();
        std::mem::take(&mut self.order)
    }

    fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

struct ComposerEntry {
    composer: RefCell<Composer>,
    content: RefCell<Content>,
}

pub(crate) struct RecomposerInner {
    this: Weak<RecomposerInner>,
    pub(crate) graph: RefCell<DependencyGraph>,
    composers: RefCell<SlotMap<ComposerId, Rc<ComposerEntry>>>,
    pending: RefCell<PendingSet>,
    flush_scheduled: Cell<bool>,
    processing: Cell<bool>,
    // open `batch` calls; flush requests wait until it drops to zero
    hold: Cell<u32>,
    flush_wanted: Cell<bool>,
    current: Cell<Option<ComposerId>>,
    root: Cell<Option<ComposerId>>,
    scheduler: Rc<dyn FlushScheduler>,
    renderer: Option<SharedRenderer>,
    executor: Rc<dyn EffectExecutor>,
    effect_errors: EffectErrorSink,
    on_error: Option<ErrorHook>,
    inbox: InvalidationInbox,
    max_flush_passes: usize,
    last_report: RefCell<FlushReport>,
}

/// Makes `id` the current composer; restores the previous one on drop.
struct CurrentGuard<'a> {
    cell: &'a Cell<Option<ComposerId>>,
    prev: Option<ComposerId>,
}

impl<'a> CurrentGuard<'a> {
    fn enter(cell: &'a Cell<Option<ComposerId>>, id: ComposerId) -> Self {
        let prev = cell.replace(Some(id));
        Self { cell, prev }
    }
}

impl Drop for CurrentGuard<'_> {
    fn drop(&mut self) {
        self.cell.set(self.prev);
    }
}

struct HoldGuard<'a>(&'a Cell<u32>);

impl Drop for HoldGuard<'_> {
    fn drop(&mut self) {
        self.0.set(self.0.get() - 1);
    }
}

impl RecomposerInner {
    pub(crate) fn record_read_current(&self, state: StateId) {
        if let Some(composer) = self.current.get() {
            self.graph.borrow_mut().record_read(composer, state);
        }
    }

    pub(crate) fn record_state_write(&self, state: StateId) {
        if self.enqueue_readers(state) {
            self.request_flush();
        }
    }

    pub(crate) fn forget_state(&self, state: StateId) {
        if let Ok(mut graph) = self.graph.try_borrow_mut() {
            graph.remove_state(state);
        }
    }

    pub(crate) fn forget_composer(&self, id: ComposerId) {
        if let Ok(mut graph) = self.graph.try_borrow_mut() {
            graph.remove_composer(id);
        }
        if let Ok(mut pending) = self.pending.try_borrow_mut() {
            pending.remove(id);
        }
    }

    fn enqueue_readers(&self, state: StateId) -> bool {
        let readers = self.graph.borrow().readers_of(state);
        if readers.is_empty() {
            return false;
        }
        let mut pending = self.pending.borrow_mut();
        let mut added = false;
        for reader in readers {
            added |= pending.insert(reader);
        }
        added
    }

    fn schedule(&self, id: ComposerId) {
        let added = self.pending.borrow_mut().insert(id);
        if added {
            self.request_flush();
        }
    }

    fn request_flush(&self) {
        if self.hold.get() > 0 {
            self.flush_wanted.set(true);
            return;
        }
        if self.flush_scheduled.replace(true) {
            return;
        }
        let weak = self.this.clone();
        self.scheduler.schedule_flush(Box::new(move || {
            if let Some(rt) = weak.upgrade() {
                rt.process();
            }
        }));
    }

    fn process(&self) -> FlushReport {
        if self.processing.replace(true) {
            log::debug!("flush requested while flushing; folded into the running flush");
            return FlushReport::default();
        }
        for state in self.inbox.drain() {
            self.enqueue_readers(state);
        }

        let mut report = FlushReport::default();
        let mut rounds = 0;
        loop {
            self.flush_scheduled.set(false);
            let batch = self.pending.borrow_mut().take();
            if batch.is_empty() {
                break;
            }
            if rounds == self.max_flush_passes {
                log::warn!(
                    "recomposition did not settle after {rounds} rounds; {} composer(s) left pending",
                    batch.len()
                );
                let mut pending = self.pending.borrow_mut();
                for id in &batch {
                    pending.insert(*id);
                }
                report.deferred = batch;
                break;
            }
            rounds += 1;
            for id in batch {
                match self.run_pass(id) {
                    Ok(true) => report.recomposed.push(id),
                    Ok(false) => {}
                    Err(err) => {
                        self.report_error(RuntimeError::Compose(err.clone()));
                        report.failed.push(err);
                    }
                }
            }
        }
        self.flush_scheduled.set(false);
        self.processing.set(false);

        report.effect_errors = self.effect_errors.take();
        for err in &report.effect_errors {
            self.report_error(RuntimeError::Effect(err.clone()));
        }
        if !report.recomposed.is_empty() {
            log::debug!(
                "flush: {} recomposed, {} failed",
                report.recomposed.len(),
                report.failed.len()
            );
        }
        *self.last_report.borrow_mut() = report.clone();
        report
    }

    /// Runs one pass of `id`. `Ok(false)` means the composer is gone.
    fn run_pass(&self, id: ComposerId) -> Result<bool, ComposeError> {
        let Some(entry) = self.composers.borrow().get(id).cloned() else {
            return Ok(false);
        };
        let content = entry.content.borrow().clone();
        let Ok(mut composer) = entry.composer.try_borrow_mut() else {
            return Err(ComposeError::Busy(id));
        };
        if composer.is_disposed() {
            return Ok(false);
        }

        // a new pass replaces the old read set rather than merging into it
        self.graph.borrow_mut().clear_reads(id);
        let _current = CurrentGuard::enter(&self.current, id);

        if let Some(r) = &self.renderer {
            r.borrow_mut().begin_pass(id);
        }
        composer.begin_pass();
        let result = panic::catch_unwind(AssertUnwindSafe(|| content(&mut *composer)));
        match result {
            Ok(()) => {
                if let Some(r) = &self.renderer {
                    r.borrow_mut().commit_pass(id);
                }
                composer.end_pass();
                Ok(true)
            }
            Err(payload) => {
                composer.abort_pass();
                if let Some(r) = &self.renderer {
                    r.borrow_mut().abort_pass(id);
                }
                Err(ComposeError::Panicked {
                    composer: id,
                    message: panic_message(&*payload),
                })
            }
        }
    }

    fn report_error(&self, err: RuntimeError) {
        log::error!("{err}");
        if let Some(hook) = &self.on_error {
            hook(&err);
        }
    }
}

/// Handle to a recomposition runtime. Clones share it.
#[derive(Clone)]
pub struct Recomposer {
    inner: Rc<RecomposerInner>,
}

impl Default for Recomposer {
    fn default() -> Self {
        Self::new()
    }
}

impl Recomposer {
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> RecomposerBuilder {
        RecomposerBuilder::default()
    }

    pub fn state<T: 'static>(&self, value: T) -> State<T> {
        State::attached(&Rc::downgrade(&self.inner), None, value)
    }

    pub fn labeled_state<T: 'static>(&self, label: &'static str, value: T) -> State<T> {
        State::attached(&Rc::downgrade(&self.inner), Some(label), value)
    }

    /// Registers a value that lives outside any `State` (a store, a value
    /// owned by another thread). Report reads with `Composer::record_read`
    /// and writes with `record_state_write` or the inbox.
    pub fn external_state(&self, label: &'static str) -> StateId {
        self.inner.graph.borrow_mut().new_state(Some(label))
    }

    pub fn remove_external_state(&self, state: StateId) {
        self.inner.forget_state(state);
    }

    pub fn label_of(&self, state: StateId) -> Option<&'static str> {
        self.inner.graph.borrow().label(state)
    }

    /// Creates a composer for `content` and schedules its first pass.
    pub fn create_composer(&self, content: impl Fn(&mut Composer) + 'static) -> ComposerId {
        let inner = &self.inner;
        let runtime = Rc::downgrade(inner);
        let content: Content = Rc::new(content);
        let id = inner.composers.borrow_mut().insert_with_key(|id| {
            Rc::new(ComposerEntry {
                composer: RefCell::new(Composer::attached(
                    id,
                    runtime,
                    inner.renderer.clone(),
                    inner.executor.clone(),
                    inner.effect_errors.clone(),
                )),
                content: RefCell::new(content),
            })
        });
        log::debug!("created composer {id:?}");
        inner.schedule(id);
        id
    }

    /// Registers the top-level entry point. A full re-execution always
    /// re-enters here; slots make unchanged parts cheap.
    pub fn set_composition_root(&self, content: impl Fn(&mut Composer) + 'static) -> ComposerId {
        if let Some(old) = self.inner.root.get() {
            self.dispose_composer(old);
        }
        let id = self.create_composer(content);
        self.inner.root.set(Some(id));
        id
    }

    pub fn root(&self) -> Option<ComposerId> {
        self.inner.root.get()
    }

    /// Swaps the entry point of `id` and schedules a pass.
    pub fn set_content(&self, id: ComposerId, content: impl Fn(&mut Composer) + 'static) -> bool {
        let Some(entry) = self.inner.composers.borrow().get(id).cloned() else {
            return false;
        };
        *entry.content.borrow_mut() = Rc::new(content);
        self.inner.schedule(id);
        true
    }

    pub fn schedule_recomposition(&self, id: ComposerId) {
        if self.contains(id) {
            self.inner.schedule(id);
        } else {
            log::debug!("ignoring recomposition of unknown composer {id:?}");
        }
    }

    /// Enqueues every composer that read `state` in its latest pass.
    pub fn record_state_write(&self, state: StateId) {
        self.inner.record_state_write(state);
    }

    /// Runs all pending recompositions now, regardless of the scheduler.
    pub fn process_recompositions(&self) -> FlushReport {
        self.inner.process()
    }

    /// Runs one pass of `id` immediately, outside any flush.
    pub fn compose_now(&self, id: ComposerId) -> Result<(), ComposeError> {
        if let Ok(mut pending) = self.inner.pending.try_borrow_mut() {
            pending.remove(id);
        }
        match self.inner.run_pass(id) {
            Ok(true) => Ok(()),
            Ok(false) => Err(ComposeError::Disposed(id)),
            Err(err) => {
                self.inner.report_error(RuntimeError::Compose(err.clone()));
                Err(err)
            }
        }
    }

    /// Collapses every write made by `f` into at most one flush request.
    pub fn batch<R>(&self, f: impl FnOnce() -> R) -> R {
        let inner = &self.inner;
        inner.hold.set(inner.hold.get() + 1);
        let guard = HoldGuard(&inner.hold);
        let out = f();
        drop(guard);
        if inner.hold.get() == 0 && inner.flush_wanted.replace(false) {
            inner.request_flush();
        }
        out
    }

    /// Disposes `id`: cleanups run, slots clear, edges go. Returns false if
    /// it was already gone.
    pub fn dispose_composer(&self, id: ComposerId) -> bool {
        let entry = self.inner.composers.borrow_mut().remove(id);
        let Some(entry) = entry else {
            return false;
        };
        if self.inner.root.get() == Some(id) {
            self.inner.root.set(None);
        }
        match entry.composer.try_borrow_mut() {
            Ok(mut composer) => composer.dispose(),
            // still mid-pass; it disposes itself when the pass drops it
            Err(_) => log::warn!("composer {id:?} disposed while composing"),
        }
        self.inner.forget_composer(id);
        if let Some(r) = &self.inner.renderer {
            match r.try_borrow_mut() {
                Ok(mut r) => r.dispose(id),
                Err(_) => log::warn!("renderer busy; output of {id:?} left in place"),
            }
        }
        true
    }

    /// Disposes every composer.
    pub fn dispose(&self) {
        let ids: Vec<ComposerId> = self.inner.composers.borrow().keys().collect();
        for id in ids {
            self.dispose_composer(id);
        }
    }

    pub fn contains(&self, id: ComposerId) -> bool {
        self.inner.composers.borrow().contains_key(id)
    }

    pub fn composer_count(&self) -> usize {
        self.inner.composers.borrow().len()
    }

    pub fn with_composer<R>(&self, id: ComposerId, f: impl FnOnce(&Composer) -> R) -> Option<R> {
        let entry = self.inner.composers.borrow().get(id).cloned()?;
        let composer = entry.composer.try_borrow().ok()?;
        Some(f(&composer))
    }

    pub fn current_composer(&self) -> Option<ComposerId> {
        self.inner.current.get()
    }

    pub fn reads_of(&self, id: ComposerId) -> Vec<StateId> {
        self.inner.graph.borrow().reads_of(id)
    }

    pub fn readers_of(&self, state: StateId) -> Vec<ComposerId> {
        self.inner.graph.borrow().readers_of(state)
    }

    pub fn edge_count(&self) -> usize {
        self.inner.graph.borrow().edge_count()
    }

    /// Composers waiting for the next flush, in the order they were queued.
    pub fn pending(&self) -> Vec<ComposerId> {
        self.inner.pending.borrow().order.clone()
    }

    pub fn has_pending(&self) -> bool {
        !self.inner.pending.borrow().is_empty()
    }

    pub fn is_flush_scheduled(&self) -> bool {
        self.inner.flush_scheduled.get()
    }

    /// Report of the most recent flush, however it was triggered.
    pub fn last_report(&self) -> FlushReport {
        self.inner.last_report.borrow().clone()
    }

    /// A `Send` handle for recording writes from other threads.
    pub fn inbox(&self) -> InvalidationInbox {
        self.inner.inbox.clone()
    }

    /// Applies writes queued in the inbox. Returns how many states it saw.
    pub fn drain_inbox(&self) -> usize {
        let writes = self.inner.inbox.drain();
        let n = writes.len();
        self.batch(|| {
            for state in writes {
                self.inner.record_state_write(state);
            }
        });
        n
    }

    /// Effect failures recorded since the last flush.
    pub fn take_effect_errors(&self) -> Vec<EffectError> {
        self.inner.effect_errors.take()
    }
}

impl std::fmt::Debug for Recomposer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Recomposer")
            .field("composers", &self.composer_count())
            .field("pending", &self.inner.pending.borrow().order.len())
            .field("root", &self.inner.root.get())
            .finish()
    }
}
