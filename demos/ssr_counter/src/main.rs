use std::cell::RefCell;
use std::rc::Rc;

use recompose_core::prelude::*;
use recompose_hydrate::*;
use recompose_ui::*;

const BUTTON_CALLBACK: &str = "c0-n2:click";

fn app(cx: &mut Composer) {
    let count = cx.remember_state(|| 0i32);

    Island(cx, HydrationPriority::Visible, |cx| {
        Text(cx, format!("Count: {}", count.get()));
        Button(cx, "Increment", {
            let count = count.clone();
            move || count.update(|c| *c += 1)
        });
    });
}

/// Renders `app` into a fresh `HtmlRenderer`. Used for both the server
/// page and the client's copy of it.
fn mount() -> (Recomposer, Rc<RefCell<HtmlRenderer>>) {
    let (html, renderer) = shared(HtmlRenderer::new());
    let rec = Recomposer::builder()
        .renderer(renderer)
        .on_error(|err| log::error!("{err}"))
        .build();
    rec.set_composition_root(app);
    (rec, html)
}

/// Every element of `html` that declares a hydration priority.
fn island_markers(html: &str) -> Vec<IslandMarker> {
    html.split('<')
        .filter_map(|chunk| chunk.split_once('>').map(|(tag, _)| tag))
        .filter(|tag| tag.contains(PRIORITY_ATTR))
        .filter_map(|tag| IslandMarker::from_attrs(attrs(tag)))
        .collect()
}

fn attrs(tag: &str) -> Vec<(&str, &str)> {
    tag.split('"')
        .collect::<Vec<_>>()
        .chunks(2)
        .filter_map(|pair| match *pair {
            [name, value] => Some((
                name.split_whitespace().last()?.trim_end_matches('='),
                value,
            )),
            _ => None,
        })
        .collect()
}

/// Stands in for the HTTP round trip: runs the server-side handler and
/// answers with a reload.
struct InProcess(Rc<RefCell<HtmlRenderer>>);

impl CallbackTransport for InProcess {
    fn post(&self, path: &str, _body: &serde_json::Value) -> anyhow::Result<String> {
        let id = path.strip_prefix(CALLBACK_PREFIX).unwrap_or(path);
        if !HtmlRenderer::click(&self.0, id) {
            anyhow::bail!("server has no handler for '{id}'");
        }
        Ok(serde_json::to_string(&CallbackResponse::reload())?)
    }
}

struct PrintNavigator(Rc<RefCell<HtmlRenderer>>);

impl Navigator for PrintNavigator {
    fn redirect(&self, url: &str) -> anyhow::Result<()> {
        println!("navigate to {url}");
        Ok(())
    }

    fn reload(&self) -> anyhow::Result<()> {
        println!("reloaded: {}", self.0.borrow().html());
        Ok(())
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    // Server
    let (_server, server_html) = mount();
    let page = server_html.borrow().document("Counter");
    println!("{page}");

    // Client: same tree, dormant until its island hydrates
    let (_client, client_html) = mount();
    let host = ManualHost::new();
    let hydrator = Hydrator::new(SystemClock, host.clone(), HydrationConfig::default());
    hydrator.load_manifest(&page)?;

    for marker in island_markers(&page) {
        let dom = client_html.clone();
        let target = marker.target_id.clone();
        hydrator.register_marker(&marker, move |h| {
            h.on(target, "click", move |event| {
                let Some(id) = event.data["callback"].as_str() else {
                    anyhow::bail!("click without a callback id");
                };
                if !HtmlRenderer::click(&dom, id) {
                    anyhow::bail!("no handler for '{id}'");
                }
                Ok(())
            });
            Ok(true)
        });
    }

    // Clicked before hydration ran: buffered, then replayed.
    let click = CapturedEvent::new("click", "c0-n0", SystemClock.now())
        .with_data(serde_json::json!({ "callback": BUTTON_CALLBACK }));
    if hydrator.dispatch(click).is_none() {
        println!("click buffered ({} pending)", hydrator.pending_events("c0-n0"));
    }
    host.run_all();
    for report in hydrator.take_reports() {
        println!(
            "replayed {} on {}: {:?}",
            report.event_type, report.target_id, report.result
        );
    }
    println!("client: {}", client_html.borrow().html());

    // Server-authoritative round trip
    let manifest = hydrator
        .manifest()
        .ok_or_else(|| anyhow::anyhow!("page carried no manifest"))?;
    let client = CallbackClient::new(
        InProcess(server_html.clone()),
        PrintNavigator(server_html.clone()),
        manifest,
    );
    client.invoke(BUTTON_CALLBACK, &serde_json::json!({}))?;
    if let Err(err) = client.invoke("c9-n9:click", &serde_json::Value::Null) {
        println!("rejected: {err}");
    }

    Ok(())
}
