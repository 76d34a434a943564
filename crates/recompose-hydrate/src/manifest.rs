//! The hydration manifest embedded in server-rendered pages.
//!
//! The server lists every callback id it registered while rendering; the
//! client refuses to send a callback the server never issued.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use web_time::{SystemTime, UNIX_EPOCH};

use crate::error::ManifestError;

pub const MANIFEST_VERSION: u32 = 1;

/// `id` of the `<script>` element carrying the manifest.
pub const MANIFEST_SCRIPT_ID: &str = "recompose-manifest";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HydrationManifest {
    pub version: u32,
    #[serde(default)]
    pub callbacks: BTreeSet<String>,
    /// Milliseconds since the Unix epoch at render time.
    #[serde(default)]
    pub timestamp: u64,
}

impl Default for HydrationManifest {
    fn default() -> Self {
        Self {
            version: MANIFEST_VERSION,
            callbacks: BTreeSet::new(),
            timestamp: 0,
        }
    }
}

impl HydrationManifest {
    /// An empty manifest stamped with the current time.
    pub fn new() -> Self {
        Self {
            timestamp: now_millis(),
            ..Self::default()
        }
    }

    /// Returns false if `id` was already registered.
    pub fn register_callback(&mut self, id: impl Into<String>) -> bool {
        self.callbacks.insert(id.into())
    }

    pub fn knows_callback(&self, id: &str) -> bool {
        self.callbacks.contains(id)
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    pub fn to_json(&self) -> Result<String, ManifestError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parses and checks the schema version.
    pub fn from_json(json: &str) -> Result<Self, ManifestError> {
        let manifest: Self = serde_json::from_str(json)?;
        if manifest.version != MANIFEST_VERSION {
            log::warn!(
                "hydration manifest version {} does not match {MANIFEST_VERSION}",
                manifest.version
            );
            return Err(ManifestError::Version {
                found: manifest.version,
                expected: MANIFEST_VERSION,
            });
        }
        Ok(manifest)
    }

    /// `<script type="application/json">` element for the page. `</` is
    /// escaped so no callback id can close the script early.
    pub fn to_script_tag(&self) -> String {
        let json = self
            .to_json()
            .unwrap_or_else(|_| "{}".to_string())
            .replace("</", "<\\/");
        format!(r#"<script id="{MANIFEST_SCRIPT_ID}" type="application/json">{json}</script>"#)
    }

    /// Finds the manifest script in a document and parses it.
    pub fn from_html(html: &str) -> Result<Self, ManifestError> {
        let marker = format!(r#"id="{MANIFEST_SCRIPT_ID}""#);
        let at = html.find(&marker).ok_or(ManifestError::Missing)?;
        let rest = &html[at..];
        let open = rest.find('>').ok_or(ManifestError::Missing)?;
        let body = &rest[open + 1..];
        let close = body.find("</script>").ok_or(ManifestError::Missing)?;
        Self::from_json(&body[..close])
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
