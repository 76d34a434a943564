use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::reactive::ComposerId;

pub type Callback = Rc<dyn Fn()>;
pub type InputCallback = Rc<dyn Fn(String)>;

/// Position of an output node within one composer's pass (pre-order).
/// Same control flow, same ids.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Output side of composition, one implementation per target (HTML string,
/// DOM, test recorder). A renderer only consumes; it reaches back into the
/// runtime solely through the callbacks it is handed.
///
/// Every pass is bracketed by `begin_pass` and then exactly one of
/// `commit_pass` / `abort_pass`. A renderer that keeps output per composer
/// should keep the last committed output when a pass aborts, and drop it
/// (with any callbacks it handed out) on `dispose`.
pub trait Renderer {
    fn begin_pass(&mut self, _composer: ComposerId) {}
    fn commit_pass(&mut self, _composer: ComposerId) {}
    fn abort_pass(&mut self, _composer: ComposerId) {}
    fn dispose(&mut self, _composer: ComposerId) {}

    fn open_container(&mut self, node: NodeId, tag: &str, attrs: &[(&str, String)]);
    fn close_container(&mut self, node: NodeId);
    fn text(&mut self, node: NodeId, text: &str);
    fn button(&mut self, node: NodeId, label: &str, on_click: Callback);
    fn input(&mut self, node: NodeId, value: &str, on_input: InputCallback);
}

pub type SharedRenderer = Rc<RefCell<dyn Renderer>>;

/// Wraps a concrete renderer for injection while keeping a typed handle.
pub fn shared<R: Renderer + 'static>(renderer: R) -> (Rc<RefCell<R>>, SharedRenderer) {
    let typed = Rc::new(RefCell::new(renderer));
    let erased: SharedRenderer = typed.clone();
    (typed, erased)
}
