use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::{Rc, Weak};

use recompose_core::Clock;

use crate::config::HydrationConfig;
use crate::error::{HydrationError, ManifestError};
use crate::events::{
    CapturedEvent, EventBuffer, EventReplayResult, HandlerRegistry, ReplayReport, replay_events,
};
use crate::manifest::HydrationManifest;
use crate::marker::IslandMarker;
use crate::priority::HydrationPriority;
use crate::scheduler::{HostYield, HydrationScheduler};
use crate::task::HydrationTask;

struct HydratorInner {
    scheduler: HydrationScheduler,
    buffer: RefCell<EventBuffer>,
    handlers: RefCell<HandlerRegistry>,
    active: RefCell<HashSet<String>>,
    reports: RefCell<Vec<ReplayReport>>,
    failures: RefCell<Vec<HydrationError>>,
    manifest: RefCell<Option<HydrationManifest>>,
    clock: Rc<dyn Clock>,
    config: HydrationConfig,
}

/// Client-side driver: schedules island activation, holds events for
/// islands that are still dormant and replays them once each island is live.
#[derive(Clone)]
pub struct Hydrator {
    inner: Rc<HydratorInner>,
}

impl Hydrator {
    pub fn new(clock: impl Clock, host: impl HostYield + 'static, config: HydrationConfig) -> Self {
        let clock: Rc<dyn Clock> = Rc::new(clock);
        let scheduler = HydrationScheduler::from_parts(clock.clone(), Rc::new(host), &config);
        Self {
            inner: Rc::new(HydratorInner {
                scheduler,
                buffer: RefCell::default(),
                handlers: RefCell::default(),
                active: RefCell::default(),
                reports: RefCell::default(),
                failures: RefCell::default(),
                manifest: RefCell::new(None),
                clock,
                config,
            }),
        }
    }

    pub fn scheduler(&self) -> &HydrationScheduler {
        &self.inner.scheduler
    }

    pub fn config(&self) -> &HydrationConfig {
        &self.inner.config
    }

    /// Queues activation of `target_id`. `activate` typically registers the
    /// island's handlers with `on` and returns `Ok(true)`. Buffered events
    /// for the target are replayed as soon as it succeeds.
    pub fn register_island(
        &self,
        target_id: impl Into<String>,
        priority: HydrationPriority,
        activate: impl FnOnce(&Hydrator) -> anyhow::Result<bool> + 'static,
    ) -> bool {
        let target_id = target_id.into();
        let weak = Rc::downgrade(&self.inner);

        let task = HydrationTask::new(target_id.clone(), priority, {
            let weak = weak.clone();
            move || match upgrade(&weak) {
                Some(hydrator) => activate(&hydrator),
                None => Ok(false),
            }
        })
        .on_complete({
            let (weak, target) = (weak.clone(), target_id.clone());
            move || {
                if let Some(hydrator) = upgrade(&weak) {
                    hydrator.activated(&target);
                }
            }
        })
        .on_error(move |err| {
            if let Some(hydrator) = upgrade(&weak) {
                hydrator.inner.failures.borrow_mut().push(err.clone());
            }
        });
        self.inner.scheduler.schedule(task)
    }

    /// Same as `register_island`, with target and priority read from markup.
    pub fn register_marker(
        &self,
        marker: &IslandMarker,
        activate: impl FnOnce(&Hydrator) -> anyhow::Result<bool> + 'static,
    ) -> bool {
        self.register_island(marker.target_id.clone(), marker.priority, activate)
    }

    pub fn on(
        &self,
        target_id: impl Into<String>,
        event_type: impl Into<String>,
        handler: impl Fn(&CapturedEvent) -> anyhow::Result<()> + 'static,
    ) {
        self.inner
            .handlers
            .borrow_mut()
            .register(target_id, event_type, handler);
    }

    /// Delivers `event` now if its target is live; otherwise buffers it and
    /// returns `None`. Buffering first drops events already past the
    /// staleness window, reporting them as `Stale`.
    pub fn dispatch(&self, event: CapturedEvent) -> Option<EventReplayResult> {
        if !self.is_active(&event.target_id) {
            let now = self.inner.clock.now();
            let pruned = {
                let mut buffer = self.inner.buffer.borrow_mut();
                let pruned = buffer.prune_stale(now, self.inner.config.max_event_age);
                buffer.capture(event);
                pruned
            };
            if !pruned.is_empty() {
                log::debug!("dropped {} stale buffered event(s)", pruned.len());
                self.inner
                    .reports
                    .borrow_mut()
                    .extend(pruned.into_iter().map(|e| ReplayReport {
                        target_id: e.target_id,
                        event_type: e.event_type,
                        timestamp: e.timestamp,
                        result: EventReplayResult::Stale,
                    }));
            }
            return None;
        }
        let handlers = self.inner.handlers.borrow().clone();
        let now = self.inner.clock.now();
        replay_events(vec![event], &handlers, now, self.inner.config.max_event_age)
            .pop()
            .map(|r| r.result)
    }

    pub fn is_active(&self, target_id: &str) -> bool {
        self.inner.active.borrow().contains(target_id)
    }

    pub fn pending_events(&self, target_id: &str) -> usize {
        self.inner.buffer.borrow().pending_for(target_id)
    }

    /// Replay outcomes collected so far, oldest first.
    pub fn take_reports(&self) -> Vec<ReplayReport> {
        std::mem::take(&mut *self.inner.reports.borrow_mut())
    }

    pub fn take_failures(&self) -> Vec<HydrationError> {
        std::mem::take(&mut *self.inner.failures.borrow_mut())
    }

    /// Reads the manifest out of the server document.
    pub fn load_manifest(&self, html: &str) -> Result<(), ManifestError> {
        let manifest = HydrationManifest::from_html(html)?;
        log::debug!("loaded hydration manifest with {} callback(s)", manifest.len());
        *self.inner.manifest.borrow_mut() = Some(manifest);
        Ok(())
    }

    pub fn manifest(&self) -> Option<HydrationManifest> {
        self.inner.manifest.borrow().clone()
    }

    pub fn run_until_idle(&self) -> Vec<String> {
        self.inner.scheduler.run_until_idle()
    }

    fn activated(&self, target_id: &str) {
        self.inner.active.borrow_mut().insert(target_id.to_string());
        let events = self.inner.buffer.borrow_mut().take(target_id);
        if events.is_empty() {
            return;
        }
        let handlers = self.inner.handlers.borrow().clone();
        let now = self.inner.clock.now();
        let reports = replay_events(events, &handlers, now, self.inner.config.max_event_age);
        for r in &reports {
            if let EventReplayResult::Error(err) = &r.result {
                log::warn!("replay on '{target_id}': {err}");
            }
        }
        log::debug!("replayed {} event(s) for '{target_id}'", reports.len());
        self.inner.reports.borrow_mut().extend(reports);
    }
}

fn upgrade(weak: &Weak<HydratorInner>) -> Option<Hydrator> {
    weak.upgrade().map(|inner| Hydrator { inner })
}

impl std::fmt::Debug for Hydrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hydrator")
            .field("scheduler", &self.inner.scheduler)
            .field("active", &self.inner.active.borrow().len())
            .field("buffered", &self.inner.buffer.borrow().len())
            .finish()
    }
}
