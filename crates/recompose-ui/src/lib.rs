#![allow(non_snake_case)]
//! Primitives and renderers.
//!
//! Primitives are plain functions over a `Composer`. Each one claims a
//! `NodeId` and forwards a single call to whatever `Renderer` the composer
//! was given; they keep no state of their own.
//!
//! ```rust
//! use recompose_core::*;
//! use recompose_ui::*;
//!
//! let (html, renderer) = shared(HtmlRenderer::new());
//! let rec = Recomposer::builder().renderer(renderer).build();
//! let name = rec.state(String::from("world"));
//!
//! rec.set_composition_root({
//!     let name = name.clone();
//!     move |cx| {
//!         Column(cx, |cx| {
//!             Text(cx, format!("Hello, {}!", name.get()));
//!         });
//!     }
//! });
//! assert!(html.borrow().html().contains("Hello, world!"));
//!
//! name.set("compose".into());
//! assert!(html.borrow().html().contains("Hello, compose!"));
//! ```

pub mod html;
pub mod recording;

pub use html::*;
pub use recording::*;

use std::hash::Hash;
use std::rc::Rc;

use recompose_core::{Callback, Composer, InputCallback};
use recompose_hydrate::{HydrationPriority, PRIORITY_ATTR};

pub fn Text(cx: &mut Composer, text: impl AsRef<str>) {
    let node = cx.start_node();
    cx.render(|r| r.text(node, text.as_ref()));
    cx.end_node();
}

pub fn Button(cx: &mut Composer, label: impl AsRef<str>, on_click: impl Fn() + 'static) {
    let node = cx.start_node();
    let on_click: Callback = Rc::new(on_click);
    cx.render(|r| r.button(node, label.as_ref(), on_click));
    cx.end_node();
}

pub fn Input(cx: &mut Composer, value: impl AsRef<str>, on_input: impl Fn(String) + 'static) {
    let node = cx.start_node();
    let on_input: InputCallback = Rc::new(on_input);
    cx.render(|r| r.input(node, value.as_ref(), on_input));
    cx.end_node();
}

/// Generic element. `attrs` are emitted in order after the hydration id.
pub fn Container(
    cx: &mut Composer,
    tag: &str,
    attrs: &[(&str, String)],
    content: impl FnOnce(&mut Composer),
) {
    let node = cx.start_node();
    cx.render(|r| r.open_container(node, tag, attrs));
    content(cx);
    cx.render(|r| r.close_container(node));
    cx.end_node();
}

pub fn Column(cx: &mut Composer, content: impl FnOnce(&mut Composer)) {
    Container(cx, "div", &[("class", "column".into())], content)
}

pub fn Row(cx: &mut Composer, content: impl FnOnce(&mut Composer)) {
    Container(cx, "div", &[("class", "row".into())], content)
}

/// A subtree the client hydrates on its own, at `priority`.
pub fn Island(
    cx: &mut Composer,
    priority: HydrationPriority,
    content: impl FnOnce(&mut Composer),
) {
    Container(
        cx,
        "section",
        &[(PRIORITY_ATTR, priority.as_str().to_string())],
        content,
    )
}

/// Renders `content` only while `visible`. Its remembered state goes away
/// with it.
pub fn Show(cx: &mut Composer, visible: bool, content: impl FnOnce(&mut Composer)) {
    if visible {
        cx.keyed("show", content);
    }
}

/// Keyed list. Items keep their remembered state when the list reorders.
pub fn ForEach<T, K: Hash>(
    cx: &mut Composer,
    items: &[T],
    key: impl Fn(&T) -> K,
    mut item: impl FnMut(&mut Composer, &T),
) {
    for it in items {
        cx.keyed(&key(it), |cx| item(cx, it));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recompose_core::{Recomposer, shared};

    fn recorder() -> (
        Rc<std::cell::RefCell<RecordingRenderer>>,
        Recomposer,
    ) {
        let (rec_r, renderer) = shared(RecordingRenderer::new());
        (rec_r, Recomposer::builder().renderer(renderer).build())
    }

    #[test]
    fn test_node_ids_follow_preorder() {
        let (out, rec) = recorder();
        rec.set_composition_root(|cx| {
            Row(cx, |cx| {
                Text(cx, "a");
                Text(cx, "b");
            });
            Text(cx, "c");
        });
        let nodes: Vec<_> = out
            .borrow()
            .ops
            .iter()
            .filter_map(|op| match op {
                RenderOp::Text { node, .. } => Some(node.0),
                _ => None,
            })
            .collect();
        assert_eq!(nodes, vec![1, 2, 3]);
    }

    #[test]
    fn test_show_drops_state_when_hidden() {
        let (out, rec) = recorder();
        let visible = rec.state(true);
        let inits = Rc::new(std::cell::Cell::new(0));
        rec.set_composition_root({
            let (visible, inits) = (visible.clone(), inits.clone());
            move |cx| {
                let inits = inits.clone();
                Show(cx, visible.get(), move |cx| {
                    cx.remember(|| inits.set(inits.get() + 1));
                    Text(cx, "shown");
                });
            }
        });
        visible.set(false);
        assert!(out.borrow().texts().is_empty());
        visible.set(true);
        assert_eq!(out.borrow().texts(), vec!["shown"]);
        assert_eq!(inits.get(), 2);
    }

    #[test]
    fn test_for_each_keeps_state_across_reorder() {
        let (out, rec) = recorder();
        let items = rec.state(vec!["x", "y"]);
        let born = Rc::new(std::cell::Cell::new(0));
        rec.set_composition_root({
            let (items, born) = (items.clone(), born.clone());
            move |cx| {
                let list = items.get();
                ForEach(cx, &list, |s| *s, |cx, s| {
                    let order = cx.remember(|| {
                        born.set(born.get() + 1);
                        born.get()
                    });
                    Text(cx, format!("{s}:{order}"));
                });
            }
        });
        assert_eq!(out.borrow().texts(), vec!["x:1", "y:2"]);
        items.set(vec!["y", "x"]);
        assert_eq!(out.borrow().texts(), vec!["y:2", "x:1"]);
    }
}
