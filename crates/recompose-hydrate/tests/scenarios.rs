use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use recompose_core::{Clock, ManualClock};
use recompose_hydrate::*;

type Log = Rc<RefCell<Vec<String>>>;

fn record(log: &Log, id: &str, priority: HydrationPriority) -> HydrationTask {
    let (log, name) = (log.clone(), id.to_string());
    HydrationTask::new(id, priority, move || {
        log.borrow_mut().push(name);
        Ok(true)
    })
}

fn hydrator(clock: &ManualClock) -> (Hydrator, ManualHost) {
    let host = ManualHost::new();
    let h = Hydrator::new(clock.clone(), host.clone(), HydrationConfig::default());
    (h, host)
}

#[test]
fn higher_priority_runs_first_regardless_of_queue_order() {
    let clock = ManualClock::new();
    let host = ManualHost::new();
    let sched = HydrationScheduler::new(clock, host.clone(), &HydrationConfig::default());
    let log: Log = Rc::default();

    sched.schedule(record(&log, "t1", HydrationPriority::Deferred));
    sched.schedule(record(&log, "t2", HydrationPriority::Critical));
    host.run_all();

    assert_eq!(*log.borrow(), vec!["t2", "t1"]);
    assert_eq!(sched.state_of("t1"), Some(TaskState::Complete));
}

#[test]
fn task_queued_mid_drain_is_ordered_by_priority() {
    let clock = ManualClock::new();
    let host = ManualHost::new();
    let sched = HydrationScheduler::new(clock, host.clone(), &HydrationConfig::default());
    let log: Log = Rc::default();

    let spawner = {
        let (sched, log) = (sched.clone(), log.clone());
        HydrationTask::new("near", HydrationPriority::Near, move || {
            log.borrow_mut().push("near".into());
            sched.schedule(record(&log, "late-critical", HydrationPriority::Critical));
            sched.schedule(record(&log, "late-deferred", HydrationPriority::Deferred));
            Ok(true)
        })
    };
    sched.schedule(record(&log, "first", HydrationPriority::Visible));
    sched.schedule(spawner);
    sched.schedule(record(&log, "deferred", HydrationPriority::Deferred));
    sched.schedule(record(&log, "near-2", HydrationPriority::Near));
    host.run_all();

    assert_eq!(
        *log.borrow(),
        vec![
            "first",
            "near",
            "late-critical",
            "near-2",
            "deferred",
            "late-deferred"
        ]
    );
}

#[test]
fn buffered_click_replays_after_fast_hydration() {
    let clock = ManualClock::new();
    let (h, host) = hydrator(&clock);
    let clicks = Rc::new(RefCell::new(0));

    h.register_island("btn1", HydrationPriority::Visible, {
        let clicks = clicks.clone();
        move |h| {
            h.on("btn1", "click", move |_| {
                *clicks.borrow_mut() += 1;
                Ok(())
            });
            Ok(true)
        }
    });
    assert_eq!(h.dispatch(CapturedEvent::new("click", "btn1", clock.now())), None);
    assert_eq!(h.pending_events("btn1"), 1);

    clock.advance(Duration::from_millis(100));
    host.run_all();

    let reports = h.take_reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].result, EventReplayResult::Success);
    assert_eq!(*clicks.borrow(), 1);

    // live now: delivered straight away
    assert_eq!(
        h.dispatch(CapturedEvent::new("click", "btn1", clock.now())),
        Some(EventReplayResult::Success)
    );
    assert_eq!(*clicks.borrow(), 2);
}

#[test]
fn click_older_than_the_window_is_stale() {
    let clock = ManualClock::new();
    let (h, host) = hydrator(&clock);
    let clicks = Rc::new(RefCell::new(0));

    h.register_island("btn1", HydrationPriority::Visible, {
        let clicks = clicks.clone();
        move |h| {
            h.on("btn1", "click", move |_| {
                *clicks.borrow_mut() += 1;
                Ok(())
            });
            Ok(true)
        }
    });
    h.dispatch(CapturedEvent::new("click", "btn1", clock.now()));
    clock.advance(Duration::from_millis(6000));
    host.run_all();

    assert_eq!(h.take_reports()[0].result, EventReplayResult::Stale);
    assert_eq!(*clicks.borrow(), 0);
}

#[test]
fn click_just_inside_the_window_is_delivered() {
    let clock = ManualClock::new();
    let (h, host) = hydrator(&clock);
    h.register_island("btn1", HydrationPriority::Visible, |h| {
        h.on("btn1", "click", |_| Ok(()));
        Ok(true)
    });

    let t0 = clock.now();
    h.dispatch(CapturedEvent::new("click", "btn1", t0));
    h.dispatch(CapturedEvent::new("click", "btn1", t0 + Duration::from_millis(1)));
    clock.advance(Duration::from_millis(5001));
    host.run_all();

    let results: Vec<_> = h.take_reports().into_iter().map(|r| r.result).collect();
    assert_eq!(
        results,
        vec![EventReplayResult::Stale, EventReplayResult::Success]
    );
}

#[test]
fn failed_activation_keeps_events_buffered() {
    let clock = ManualClock::new();
    let (h, host) = hydrator(&clock);
    h.register_island("form", HydrationPriority::Near, |_| {
        Err(anyhow::anyhow!("template missing"))
    });
    h.dispatch(CapturedEvent::new("submit", "form", clock.now()));
    host.run_all();

    assert!(!h.is_active("form"));
    assert_eq!(h.pending_events("form"), 1);
    let failures = h.take_failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].task_id(), "form");
    assert!(h.take_reports().is_empty());
}

#[test]
fn replayed_event_without_handler_reports_target_not_found() {
    let clock = ManualClock::new();
    let (h, host) = hydrator(&clock);
    h.register_island("card", HydrationPriority::Critical, |_| Ok(true));
    h.dispatch(CapturedEvent::new("click", "card", clock.now()));
    host.run_all();

    assert_eq!(
        h.take_reports()[0].result,
        EventReplayResult::TargetNotFound
    );
}

#[test]
fn events_for_an_island_that_never_hydrates_are_pruned() {
    let clock = ManualClock::new();
    let (h, _host) = hydrator(&clock);

    h.dispatch(CapturedEvent::new("click", "orphan", clock.now()));
    clock.advance(Duration::from_millis(6000));
    h.dispatch(CapturedEvent::new("click", "orphan", clock.now()));

    assert_eq!(h.pending_events("orphan"), 1);
    let reports = h.take_reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].target_id, "orphan");
    assert_eq!(reports[0].result, EventReplayResult::Stale);
}
