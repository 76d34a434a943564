pub use crate::clock::{Clock, ManualClock, SystemClock};
pub use crate::composer::{Composer, ComposerFlags, group_key};
pub use crate::effects::{
    CancellationToken, Dispose, EffectExecutor, EffectStatus, InlineExecutor, ThreadExecutor,
    on_unmount,
};
pub use crate::error::*;
pub use crate::locals::CompositionLocal;
pub use crate::reactive::{ComposerId, StateId};
pub use crate::recomposer::{FlushReport, Recomposer, RecomposerBuilder};
pub use crate::render_api::{Callback, InputCallback, NodeId, Renderer, SharedRenderer, shared};
pub use crate::scheduler::{DeferredScheduler, FlushScheduler, ImmediateScheduler};
pub use crate::state::State;
pub use crate::sync::InvalidationInbox;
