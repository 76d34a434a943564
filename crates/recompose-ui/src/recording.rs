//! A renderer that only records what it was told. Used in tests.

use std::cell::RefCell;

use recompose_core::{Callback, ComposerId, InputCallback, NodeId, Renderer};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderOp {
    Begin(ComposerId),
    Commit(ComposerId),
    Abort(ComposerId),
    Dispose(ComposerId),
    Open {
        node: NodeId,
        tag: String,
        attrs: Vec<(String, String)>,
    },
    Close(NodeId),
    Text {
        node: NodeId,
        text: String,
    },
    Button {
        node: NodeId,
        label: String,
    },
    Input {
        node: NodeId,
        value: String,
    },
}

#[derive(Default)]
pub struct RecordingRenderer {
    pub ops: Vec<RenderOp>,
    current: Option<ComposerId>,
    clicks: Vec<(Option<ComposerId>, String, Callback)>,
    inputs: Vec<(Option<ComposerId>, NodeId, InputCallback)>,
}

impl RecordingRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take_ops(&mut self) -> Vec<RenderOp> {
        std::mem::take(&mut self.ops)
    }

    /// Ops of the last committed pass, without its brackets.
    pub fn last_pass(&self) -> &[RenderOp] {
        let Some(end) = self
            .ops
            .iter()
            .rposition(|op| matches!(op, RenderOp::Commit(_)))
        else {
            return &[];
        };
        let start = self.ops[..end]
            .iter()
            .rposition(|op| matches!(op, RenderOp::Begin(_)))
            .map_or(0, |i| i + 1);
        &self.ops[start..end]
    }

    /// Text nodes of the last committed pass.
    pub fn texts(&self) -> Vec<String> {
        self.last_pass()
            .iter()
            .filter_map(|op| match op {
                RenderOp::Text { text, .. } => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    /// Clicks the first live button labelled `label`.
    pub fn click(this: &RefCell<Self>, label: &str) -> bool {
        let handler = this
            .borrow()
            .clicks
            .iter()
            .find(|(_, l, _)| l == label)
            .map(|(_, _, f)| f.clone());
        handler.map(|f| f()).is_some()
    }

    /// Types `value` into the first live input with node id `node`.
    pub fn type_into(this: &RefCell<Self>, node: NodeId, value: impl Into<String>) -> bool {
        let handler = this
            .borrow()
            .inputs
            .iter()
            .find(|(_, n, _)| *n == node)
            .map(|(_, _, f)| f.clone());
        match handler {
            Some(f) => {
                f(value.into());
                true
            }
            None => false,
        }
    }
}

impl Renderer for RecordingRenderer {
    fn begin_pass(&mut self, composer: ComposerId) {
        let owner = Some(composer);
        self.clicks.retain(|(c, _, _)| *c != owner);
        self.inputs.retain(|(c, _, _)| *c != owner);
        self.current = owner;
        self.ops.push(RenderOp::Begin(composer));
    }

    fn commit_pass(&mut self, composer: ComposerId) {
        self.current = None;
        self.ops.push(RenderOp::Commit(composer));
    }

    fn abort_pass(&mut self, composer: ComposerId) {
        self.current = None;
        self.ops.push(RenderOp::Abort(composer));
    }

    fn dispose(&mut self, composer: ComposerId) {
        let owner = Some(composer);
        self.clicks.retain(|(c, _, _)| *c != owner);
        self.inputs.retain(|(c, _, _)| *c != owner);
        self.ops.push(RenderOp::Dispose(composer));
    }

    fn open_container(&mut self, node: NodeId, tag: &str, attrs: &[(&str, String)]) {
        self.ops.push(RenderOp::Open {
            node,
            tag: tag.to_string(),
            attrs: attrs
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        });
    }

    fn close_container(&mut self, node: NodeId) {
        self.ops.push(RenderOp::Close(node));
    }

    fn text(&mut self, node: NodeId, text: &str) {
        self.ops.push(RenderOp::Text {
            node,
            text: text.to_string(),
        });
    }

    fn button(&mut self, node: NodeId, label: &str, on_click: Callback) {
        self.clicks
            .push((self.current, label.to_string(), on_click));
        self.ops.push(RenderOp::Button {
            node,
            label: label.to_string(),
        });
    }

    fn input(&mut self, node: NodeId, value: &str, on_input: InputCallback) {
        self.inputs.push((self.current, node, on_input));
        self.ops.push(RenderOp::Input {
            node,
            value: value.to_string(),
        });
    }
}

impl std::fmt::Debug for RecordingRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingRenderer")
            .field("ops", &self.ops)
            .finish_non_exhaustive()
    }
}
