use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use crate::composer::Composer;
use crate::effects::{
    CancellationToken, Dispose, EffectErrorSink, EffectState, EffectStatus,
};
use crate::error::{EffectError, catch_panic, panic_message};

type EffectCell<K> = Rc<RefCell<EffectState<K>>>;

enum Visit<K> {
    Unchanged(EffectStatus),
    Start(EffectCell<K>),
}

impl Composer {
    /// cleanup on key change or dispose
    ///
    /// `effect` runs on the first visit and again whenever `key` differs from
    /// the previous visit, after the previous cleanup has run. Returns the
    /// effect's status after this visit.
    pub fn disposable_effect<K: PartialEq + Clone + 'static>(
        &mut self,
        key: K,
        effect: impl FnOnce() -> Dispose,
    ) -> EffectStatus {
        let state = match self.visit_effect(&key) {
            Visit::Unchanged(status) => return status,
            Visit::Start(state) => state,
        };
        match panic::catch_unwind(AssertUnwindSafe(effect)) {
            Ok(cleanup) => {
                let mut st = state.borrow_mut();
                st.cleanup = Some(cleanup);
                st.status = EffectStatus::Running;
                EffectStatus::Running
            }
            Err(payload) => {
                let message = panic_message(&*payload);
                log::error!("effect start panicked in composer {:?}: {message}", self.id);
                self.effect_errors.push(EffectError::StartPanicked {
                    composer: self.id,
                    message,
                });
                state.borrow_mut().status = EffectStatus::Failed;
                EffectStatus::Failed
            }
        }
    }

    /// Hands `job` to the effect executor; a key change or dispose cancels
    /// its token. The composing call never waits for the job.
    pub fn launched_effect<K, F>(&mut self, key: K, job: F) -> EffectStatus
    where
        K: PartialEq + Clone + 'static,
        F: FnOnce(CancellationToken) -> anyhow::Result<()> + Send + 'static,
    {
        let state = match self.visit_effect(&key) {
            Visit::Unchanged(status) => return status,
            Visit::Start(state) => state,
        };
        let token = CancellationToken::new();
        {
            let cancel = token.clone();
            let mut st = state.borrow_mut();
            st.cleanup = Some(Dispose::new(move || cancel.cancel()));
            st.status = EffectStatus::Running;
        }
        let sink = self.effect_errors.clone();
        self.executor
            .spawn(Box::new(move || run_job(job, token, sink)));
        EffectStatus::Running
    }

    /// Runs after the current pass commits; dropped if the pass fails.
    pub fn side_effect(&mut self, effect: impl FnOnce() + 'static) {
        self.side_effects.push(Box::new(effect));
    }

    fn visit_effect<K: PartialEq + Clone + 'static>(&mut self, key: &K) -> Visit<K> {
        let at = self.next_slot();
        let existing = self
            .get_slot()
            .and_then(|v| v.downcast_ref::<EffectCell<K>>())
            .cloned();
        let state = match existing {
            Some(state) => state,
            None => {
                if self.get_slot().is_some() {
                    log::warn!(
                        "effect at slot {at} replaced a value of another type; \
                         wrap conditional effects in a keyed group"
                    );
                }
                let state: EffectCell<K> = Rc::new(RefCell::new(EffectState::new()));
                let on_forget = state.clone();
                self.slots.set_slot_with_forget(
                    Box::new(state.clone()),
                    Box::new(move || EffectState::dispose(&on_forget)),
                );
                state
            }
        };

        let (same, status) = {
            let st = state.borrow();
            (st.key.as_ref() == Some(key), st.status)
        };
        if same {
            return Visit::Unchanged(status);
        }
        let previous = {
            let mut st = state.borrow_mut();
            if st.key.is_some() {
                st.status = EffectStatus::Restarting;
            }
            st.cleanup.take()
        };
        // the new key is only recorded once the old work is cleaned up
        if let Some(cleanup) = previous {
            if let Err(message) = catch_panic(|| cleanup.run()) {
                log::error!("effect cleanup panicked in composer {:?}: {message}", self.id);
                self.effect_errors.push(EffectError::CleanupPanicked {
                    composer: self.id,
                    message,
                });
            }
        }
        state.borrow_mut().key = Some(key.clone());
        Visit::Start(state)
    }
}

fn run_job<F>(job: F, token: CancellationToken, sink: EffectErrorSink)
where
    F: FnOnce(CancellationToken) -> anyhow::Result<()>,
{
    match panic::catch_unwind(AssertUnwindSafe(move || job(token))) {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            log::error!("launched effect failed: {err:#}");
            sink.push(EffectError::JobFailed(format!("{err:#}")));
        }
        Err(payload) => {
            let message = panic_message(&*payload);
            log::error!("launched effect panicked: {message}");
            sink.push(EffectError::JobPanicked(message));
        }
    }
}
