//! Server-side HTML output.
//!
//! Every node carries a `data-hid` attribute, `c{composer}-n{node}`, which
//! is the target id the client buffers events against. Buttons and inputs
//! also get a `data-callback` id that is listed in the page's
//! `HydrationManifest`.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};

use recompose_core::{Callback, ComposerId, InputCallback, NodeId, Renderer};
use recompose_hydrate::{HYDRATION_ID_ATTR, HydrationManifest};

#[derive(Clone)]
enum Handler {
    Click(Callback),
    Input(InputCallback),
}

/// Renders composers to markup, one fragment per composer.
///
/// A pass writes into a draft that only replaces the composer's fragment on
/// commit; an aborted pass leaves the last committed markup and callbacks
/// in place.
pub struct HtmlRenderer {
    ordinals: HashMap<ComposerId, usize>,
    next_ordinal: usize,
    order: Vec<ComposerId>,
    committed: HashMap<ComposerId, String>,
    handlers: BTreeMap<String, (ComposerId, Handler)>,
    manifest: HydrationManifest,

    current: Option<ComposerId>,
    draft: String,
    draft_handlers: Vec<(String, Handler)>,
    open: Vec<String>,
}

impl Default for HtmlRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl HtmlRenderer {
    pub fn new() -> Self {
        Self {
            ordinals: HashMap::new(),
            next_ordinal: 0,
            order: Vec::new(),
            committed: HashMap::new(),
            handlers: BTreeMap::new(),
            manifest: HydrationManifest::new(),
            current: None,
            draft: String::new(),
            draft_handlers: Vec::new(),
            open: Vec::new(),
        }
    }

    /// Committed markup of every live composer, in the order they first
    /// rendered.
    pub fn html(&self) -> String {
        self.order
            .iter()
            .filter_map(|id| self.committed.get(id))
            .map(String::as_str)
            .collect()
    }

    pub fn html_of(&self, composer: ComposerId) -> Option<&str> {
        self.committed.get(&composer).map(String::as_str)
    }

    /// A complete page: markup followed by the manifest script.
    pub fn document(&self, title: &str) -> String {
        format!(
            "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>{}</title></head>\n<body>\n{}\n{}\n</body>\n</html>\n",
            escape_text(title),
            self.html(),
            self.manifest.to_script_tag()
        )
    }

    pub fn manifest(&self) -> &HydrationManifest {
        &self.manifest
    }

    pub fn callback_ids(&self) -> Vec<String> {
        self.handlers.keys().cloned().collect()
    }

    /// Runs the click handler registered as `id`. The renderer is only
    /// borrowed to look the handler up, so the handler is free to trigger a
    /// recomposition that renders into it again.
    pub fn click(this: &RefCell<Self>, id: &str) -> bool {
        let handler = this.borrow().handlers.get(id).map(|(_, h)| h.clone());
        match handler {
            Some(Handler::Click(f)) => {
                f();
                true
            }
            _ => false,
        }
    }

    pub fn input(this: &RefCell<Self>, id: &str, value: impl Into<String>) -> bool {
        let handler = this.borrow().handlers.get(id).map(|(_, h)| h.clone());
        match handler {
            Some(Handler::Input(f)) => {
                f(value.into());
                true
            }
            _ => false,
        }
    }

    fn hid(&self, node: NodeId) -> String {
        let ordinal = self
            .current
            .and_then(|id| self.ordinals.get(&id).copied())
            .unwrap_or(0);
        format!("c{ordinal}-{node}")
    }

    fn open_tag(&mut self, tag: &str, node: NodeId, attrs: &[(&str, String)]) {
        let hid = self.hid(node);
        self.draft
            .push_str(&format!("<{tag} {HYDRATION_ID_ATTR}=\"{hid}\""));
        for (name, value) in attrs {
            self.draft
                .push_str(&format!(" {name}=\"{}\"", escape_attr(value)));
        }
        self.draft.push('>');
    }
}

impl Renderer for HtmlRenderer {
    fn begin_pass(&mut self, composer: ComposerId) {
        if !self.ordinals.contains_key(&composer) {
            self.ordinals.insert(composer, self.next_ordinal);
            self.next_ordinal += 1;
            self.order.push(composer);
        }
        self.current = Some(composer);
        self.draft.clear();
        self.draft_handlers.clear();
        self.open.clear();
    }

    fn commit_pass(&mut self, composer: ComposerId) {
        if !self.open.is_empty() {
            log::warn!("{} element(s) left open; closing", self.open.len());
            while let Some(tag) = self.open.pop() {
                self.draft.push_str(&format!("</{tag}>"));
            }
        }
        self.committed
            .insert(composer, std::mem::take(&mut self.draft));
        self.handlers.retain(|_, (owner, _)| *owner != composer);
        for (id, handler) in self.draft_handlers.drain(..) {
            self.handlers.insert(id, (composer, handler));
        }
        self.manifest.callbacks = self.handlers.keys().cloned().collect();
        self.current = None;
    }

    fn abort_pass(&mut self, composer: ComposerId) {
        log::debug!("pass of {composer:?} aborted; keeping last committed markup");
        self.draft.clear();
        self.draft_handlers.clear();
        self.open.clear();
        self.current = None;
    }

    /// Ordinals are never reused, so ids in markup already sent to a client
    /// cannot be claimed by a later composer.
    fn dispose(&mut self, composer: ComposerId) {
        self.ordinals.remove(&composer);
        self.order.retain(|id| *id != composer);
        self.committed.remove(&composer);
        self.handlers.retain(|_, (owner, _)| *owner != composer);
        self.manifest.callbacks = self.handlers.keys().cloned().collect();
    }

    fn open_container(&mut self, node: NodeId, tag: &str, attrs: &[(&str, String)]) {
        self.open_tag(tag, node, attrs);
        self.open.push(tag.to_string());
    }

    fn close_container(&mut self, _node: NodeId) {
        match self.open.pop() {
            Some(tag) => self.draft.push_str(&format!("</{tag}>")),
            None => log::warn!("close_container without an open element"),
        }
    }

    fn text(&mut self, node: NodeId, text: &str) {
        self.open_tag("span", node, &[]);
        self.draft.push_str(&escape_text(text));
        self.draft.push_str("</span>");
    }

    fn button(&mut self, node: NodeId, label: &str, on_click: Callback) {
        let id = format!("{}:click", self.hid(node));
        self.open_tag("button", node, &[("data-callback", id.clone())]);
        self.draft.push_str(&escape_text(label));
        self.draft.push_str("</button>");
        self.draft_handlers.push((id, Handler::Click(on_click)));
    }

    fn input(&mut self, node: NodeId, value: &str, on_input: InputCallback) {
        let id = format!("{}:input", self.hid(node));
        self.open_tag(
            "input",
            node,
            &[("data-callback", id.clone()), ("value", value.to_string())],
        );
        self.draft_handlers.push((id, Handler::Input(on_input)));
    }
}

impl std::fmt::Debug for HtmlRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HtmlRenderer")
            .field("composers", &self.order.len())
            .field("callbacks", &self.handlers.len())
            .finish()
    }
}

pub fn escape_text(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

pub fn escape_attr(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Button, Column, Input, Island, Text};
    use insta::assert_snapshot;
    use recompose_core::{Recomposer, shared};
    use recompose_hydrate::HydrationPriority;
    use std::rc::Rc;

    fn setup() -> (Rc<RefCell<HtmlRenderer>>, Recomposer) {
        let (html, renderer) = shared(HtmlRenderer::new());
        (html, Recomposer::builder().renderer(renderer).build())
    }

    #[test]
    fn test_counter_markup_and_click() {
        let (html, rec) = setup();
        let count = rec.state(0);
        rec.set_composition_root({
            let count = count.clone();
            move |cx| {
                let count = count.clone();
                Column(cx, move |cx| {
                    Text(cx, format!("Count: {}", count.get()));
                    Button(cx, "+1", move || count.update(|v| *v += 1));
                });
            }
        });
        assert_snapshot!(
            html.borrow().html(),
            @r#"<div data-hid="c0-n0" class="column"><span data-hid="c0-n1">Count: 0</span><button data-hid="c0-n2" data-callback="c0-n2:click">+1</button></div>"#
        );
        assert!(html.borrow().manifest().knows_callback("c0-n2:click"));

        assert!(HtmlRenderer::click(&html, "c0-n2:click"));
        assert!(html.borrow().html().contains("Count: 1"));
        assert!(!HtmlRenderer::click(&html, "c0-n9:click"));
    }

    #[test]
    fn test_escaping() {
        let (html, rec) = setup();
        rec.set_composition_root(|cx| {
            Text(cx, "<b>\"fish\" & chips</b>");
            Input(cx, "say \"hi\"", |_| {});
        });
        assert_snapshot!(
            html.borrow().html(),
            @r#"<span data-hid="c0-n0">&lt;b&gt;"fish" &amp; chips&lt;/b&gt;</span><input data-hid="c0-n1" data-callback="c0-n1:input" value="say &quot;hi&quot;">"#
        );
    }

    #[test]
    fn test_island_carries_priority() {
        let (html, rec) = setup();
        rec.set_composition_root(|cx| {
            Island(cx, HydrationPriority::Critical, |cx| Button(cx, "Buy", || {}));
        });
        assert_snapshot!(
            html.borrow().html(),
            @r#"<section data-hid="c0-n0" data-hydrate-priority="critical"><button data-hid="c0-n1" data-callback="c0-n1:click">Buy</button></section>"#
        );
    }

    #[test]
    fn test_failed_pass_keeps_last_markup() {
        let (html, rec) = setup();
        let broken = rec.state(false);
        rec.set_composition_root({
            let broken = broken.clone();
            move |cx| {
                Text(cx, "ok");
                if broken.get() {
                    panic!("render failed");
                }
            }
        });
        broken.set(true);
        assert_eq!(rec.last_report().failed.len(), 1);
        assert_snapshot!(html.borrow().html(), @r#"<span data-hid="c0-n0">ok</span>"#);
    }

    #[test]
    fn test_input_handler_and_document() {
        let (html, rec) = setup();
        let name = rec.state(String::new());
        rec.set_composition_root({
            let name = name.clone();
            move |cx| {
                let current = name.get();
                let name = name.clone();
                Input(cx, &current, move |v| name.set(v));
            }
        });
        assert!(HtmlRenderer::input(&html, "c0-n0:input", "Ada"));
        assert_eq!(name.get_untracked(), "Ada");
        assert!(html.borrow().html().contains("value=\"Ada\""));

        let page = html.borrow().document("Form");
        assert!(page.starts_with("<!DOCTYPE html>"));
        let manifest = HydrationManifest::from_html(&page).unwrap();
        assert!(manifest.knows_callback("c0-n0:input"));
    }

    #[test]
    fn test_second_composer_gets_its_own_prefix() {
        let (html, rec) = setup();
        rec.create_composer(|cx| Text(cx, "a"));
        let b = rec.create_composer(|cx| Button(cx, "b", || {}));
        assert_eq!(
            html.borrow().html_of(b),
            Some(r#"<button data-hid="c1-n0" data-callback="c1-n0:click">b</button>"#)
        );
        assert_snapshot!(
            html.borrow().html(),
            @r#"<span data-hid="c0-n0">a</span><button data-hid="c1-n0" data-callback="c1-n0:click">b</button>"#
        );
    }

    #[test]
    fn test_replaced_root_leaves_no_markup_or_callbacks() {
        let (html, rec) = setup();
        let clicked = Rc::new(std::cell::Cell::new(false));
        rec.set_composition_root({
            let clicked = clicked.clone();
            move |cx| {
                let clicked = clicked.clone();
                Button(cx, "old", move || clicked.set(true));
            }
        });
        rec.set_composition_root(|cx| Text(cx, "new"));

        assert_snapshot!(html.borrow().html(), @r#"<span data-hid="c1-n0">new</span>"#);
        assert!(html.borrow().callback_ids().is_empty());
        assert!(!html.borrow().manifest().knows_callback("c0-n0:click"));
        assert!(!HtmlRenderer::click(&html, "c0-n0:click"));
        assert!(!clicked.get());
    }
}
