//! Capture and replay of interactions on dormant subtrees.
//!
//! Markup is visible before it is interactive. Anything the user does to a
//! subtree that has not hydrated yet is kept in an `EventBuffer` under the
//! subtree's target id, then replayed in timestamp order once the subtree's
//! handlers are live. Events older than the staleness window at replay time
//! are dropped, so a click made five seconds ago does not fire out of nowhere.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use std::time::Duration;

use recompose_core::panic_message;
use web_time::Instant;

use crate::error::ReplayError;

/// An interaction seen before its target was live.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedEvent {
    pub event_type: String,
    pub target_id: String,
    pub timestamp: Instant,
    /// Event details as delivered by the host (value of an input, key, ...).
    pub data: serde_json::Value,
}

impl CapturedEvent {
    pub fn new(
        event_type: impl Into<String>,
        target_id: impl Into<String>,
        timestamp: Instant,
    ) -> Self {
        Self {
            event_type: event_type.into(),
            target_id: target_id.into(),
            timestamp,
            data: serde_json::Value::Null,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }

    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.timestamp)
    }

    /// Older than `max_age` at `now`. An event exactly `max_age` old is
    /// still fresh.
    pub fn is_stale(&self, now: Instant, max_age: Duration) -> bool {
        self.age(now) > max_age
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventReplayResult {
    Success,
    Stale,
    /// No live handler for this target and event type.
    TargetNotFound,
    Error(ReplayError),
}

/// Outcome of replaying one event.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayReport {
    pub target_id: String,
    pub event_type: String,
    pub timestamp: Instant,
    pub result: EventReplayResult,
}

pub type EventHandler = Rc<dyn Fn(&CapturedEvent) -> anyhow::Result<()>>;

/// Live handlers by target id, then event type.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, HashMap<String, EventHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        target_id: impl Into<String>,
        event_type: impl Into<String>,
        handler: impl Fn(&CapturedEvent) -> anyhow::Result<()> + 'static,
    ) {
        self.handlers
            .entry(target_id.into())
            .or_default()
            .insert(event_type.into(), Rc::new(handler));
    }

    pub fn unregister(&mut self, target_id: &str) {
        self.handlers.remove(target_id);
    }

    pub fn get(&self, target_id: &str, event_type: &str) -> Option<EventHandler> {
        self.handlers.get(target_id)?.get(event_type).cloned()
    }

    pub fn has_target(&self, target_id: &str) -> bool {
        self.handlers.contains_key(target_id)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("targets", &self.handlers.len())
            .finish()
    }
}

/// Append-only store of captured events, keyed by target id.
#[derive(Debug, Default)]
pub struct EventBuffer {
    pending: HashMap<String, Vec<CapturedEvent>>,
}

impl EventBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn capture(&mut self, event: CapturedEvent) {
        log::debug!(
            "buffered '{}' for dormant target '{}'",
            event.event_type,
            event.target_id
        );
        self.pending
            .entry(event.target_id.clone())
            .or_default()
            .push(event);
    }

    pub fn pending_for(&self, target_id: &str) -> usize {
        self.pending.get(target_id).map_or(0, Vec::len)
    }

    pub fn len(&self) -> usize {
        self.pending.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Removes and returns the events for `target_id`, oldest first. Events
    /// with equal timestamps keep their capture order.
    pub fn take(&mut self, target_id: &str) -> Vec<CapturedEvent> {
        let mut events = self.pending.remove(target_id).unwrap_or_default();
        events.sort_by_key(|e| e.timestamp);
        events
    }

    /// Removes every event already past `max_age` at `now`, whatever its
    /// target. Keeps the buffer bounded for targets that never go live.
    pub fn prune_stale(&mut self, now: Instant, max_age: Duration) -> Vec<CapturedEvent> {
        let mut pruned = Vec::new();
        self.pending.retain(|_, events| {
            let (stale, fresh): (Vec<_>, Vec<_>) = std::mem::take(events)
                .into_iter()
                .partition(|e| e.is_stale(now, max_age));
            pruned.extend(stale);
            *events = fresh;
            !events.is_empty()
        });
        pruned.sort_by_key(|e| e.timestamp);
        pruned
    }

    /// Drains `target_id` and replays it against `handlers`.
    pub fn replay(
        &mut self,
        target_id: &str,
        handlers: &HandlerRegistry,
        now: Instant,
        max_age: Duration,
    ) -> Vec<ReplayReport> {
        let events = self.take(target_id);
        replay_events(events, handlers, now, max_age)
    }
}

/// Replays `events` in the order given. Every event yields a report; nothing
/// here panics or returns an error to the caller.
pub fn replay_events(
    events: Vec<CapturedEvent>,
    handlers: &HandlerRegistry,
    now: Instant,
    max_age: Duration,
) -> Vec<ReplayReport> {
    events
        .into_iter()
        .map(|event| {
            let result = replay_one(&event, handlers, now, max_age);
            ReplayReport {
                target_id: event.target_id,
                event_type: event.event_type,
                timestamp: event.timestamp,
                result,
            }
        })
        .collect()
}

fn replay_one(
    event: &CapturedEvent,
    handlers: &HandlerRegistry,
    now: Instant,
    max_age: Duration,
) -> EventReplayResult {
    if event.is_stale(now, max_age) {
        log::debug!(
            "dropping stale '{}' on '{}' ({:?} old)",
            event.event_type,
            event.target_id,
            event.age(now)
        );
        return EventReplayResult::Stale;
    }
    let Some(handler) = handlers.get(&event.target_id, &event.event_type) else {
        return EventReplayResult::TargetNotFound;
    };
    match panic::catch_unwind(AssertUnwindSafe(|| handler(event))) {
        Ok(Ok(())) => EventReplayResult::Success,
        Ok(Err(err)) => EventReplayResult::Error(ReplayError::HandlerFailed {
            target: event.target_id.clone(),
            event_type: event.event_type.clone(),
            message: format!("{err:#}"),
        }),
        Err(payload) => EventReplayResult::Error(ReplayError::HandlerPanicked {
            target: event.target_id.clone(),
            event_type: event.event_type.clone(),
            message: panic_message(&*payload),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    const MAX_AGE: Duration = Duration::from_millis(5000);

    #[test]
    fn test_take_orders_by_timestamp() {
        let t0 = Instant::now();
        let mut buf = EventBuffer::new();
        buf.capture(CapturedEvent::new("input", "form", t0 + Duration::from_millis(20)));
        buf.capture(CapturedEvent::new("click", "form", t0));
        buf.capture(CapturedEvent::new("keydown", "form", t0 + Duration::from_millis(20)));
        buf.capture(CapturedEvent::new("click", "other", t0));
        assert_eq!(buf.len(), 4);

        let types: Vec<_> = buf
            .take("form")
            .into_iter()
            .map(|e| e.event_type)
            .collect();
        assert_eq!(types, vec!["click", "input", "keydown"]);
        assert_eq!(buf.pending_for("form"), 0);
        assert_eq!(buf.pending_for("other"), 1);
    }

    #[test]
    fn test_staleness_boundary() {
        let t0 = Instant::now();
        let now = t0 + MAX_AGE;
        let just_fresh = CapturedEvent::new("click", "btn1", t0 + Duration::from_millis(1));
        let exactly = CapturedEvent::new("click", "btn1", t0);
        let stale = CapturedEvent::new("click", "btn1", t0);
        assert!(!just_fresh.is_stale(now, MAX_AGE));
        assert!(!exactly.is_stale(now, MAX_AGE));
        assert!(stale.is_stale(now + Duration::from_millis(1), MAX_AGE));
    }

    #[test]
    fn test_replay_never_escalates() {
        let t0 = Instant::now();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut handlers = HandlerRegistry::new();
        {
            let seen = seen.clone();
            handlers.register("btn", "click", move |e| {
                seen.borrow_mut().push(e.data.clone());
                Ok(())
            });
        }
        handlers.register("btn", "input", |_| anyhow::bail!("bad value"));
        handlers.register("btn", "focus", |_| panic!("focus handler"));

        let events = vec![
            CapturedEvent::new("click", "btn", t0).with_data(serde_json::json!({"n": 1})),
            CapturedEvent::new("input", "btn", t0),
            CapturedEvent::new("focus", "btn", t0),
            CapturedEvent::new("click", "gone", t0),
        ];
        let results: Vec<_> = replay_events(events, &handlers, t0, MAX_AGE)
            .into_iter()
            .map(|r| r.result)
            .collect();

        assert_eq!(results[0], EventReplayResult::Success);
        assert!(matches!(
            &results[1],
            EventReplayResult::Error(ReplayError::HandlerFailed { message, .. }) if message == "bad value"
        ));
        assert!(matches!(
            &results[2],
            EventReplayResult::Error(ReplayError::HandlerPanicked { .. })
        ));
        assert_eq!(results[3], EventReplayResult::TargetNotFound);
        assert_eq!(*seen.borrow(), vec![serde_json::json!({"n": 1})]);
    }

    #[test]
    fn test_prune_drops_only_stale_events() {
        let t0 = Instant::now();
        let mut buf = EventBuffer::new();
        buf.capture(CapturedEvent::new("click", "never-hydrated", t0));
        buf.capture(CapturedEvent::new("click", "form", t0));
        buf.capture(CapturedEvent::new("input", "form", t0 + Duration::from_millis(10)));

        let pruned = buf.prune_stale(t0 + MAX_AGE + Duration::from_millis(5), MAX_AGE);
        assert_eq!(pruned.len(), 2);
        assert_eq!(buf.pending_for("never-hydrated"), 0);
        assert_eq!(buf.pending_for("form"), 1);
        assert_eq!(buf.len(), 1);
    }
}
