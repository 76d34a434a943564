//! Client for the server's callback endpoint.
//!
//! In server-authoritative mode a button's handler lives on the server. The
//! client POSTs to `/callback/{id}` and acts on the JSON answer:
//!
//! ```json
//! { "action": "redirect", "url": "/done" }
//! { "action": "reload" }
//! ```
//!
//! Any other action is reported back to the caller and otherwise ignored.

use serde::{Deserialize, Serialize};

use crate::error::CallbackError;
use crate::manifest::HydrationManifest;

pub const CALLBACK_PREFIX: &str = "/callback/";

pub fn callback_path(id: &str) -> String {
    format!("{CALLBACK_PREFIX}{id}")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackResponse {
    pub action: String,
    #[serde(default, alias = "location", skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl CallbackResponse {
    pub fn reload() -> Self {
        Self {
            action: "reload".into(),
            url: None,
        }
    }

    pub fn redirect(url: impl Into<String>) -> Self {
        Self {
            action: "redirect".into(),
            url: Some(url.into()),
        }
    }

    pub fn other(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            url: None,
        }
    }

    pub fn to_action(&self) -> Result<CallbackAction, CallbackError> {
        match self.action.as_str() {
            "redirect" => self
                .url
                .clone()
                .map(CallbackAction::Redirect)
                .ok_or(CallbackError::MissingUrl),
            "reload" => Ok(CallbackAction::Reload),
            other => Ok(CallbackAction::Other(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackAction {
    Redirect(String),
    Reload,
    Other(String),
}

/// Sends the POST. Returns the response body.
pub trait CallbackTransport {
    fn post(&self, path: &str, body: &serde_json::Value) -> anyhow::Result<String>;
}

/// Carries out the navigation a response asks for.
pub trait Navigator {
    fn redirect(&self, url: &str) -> anyhow::Result<()>;
    fn reload(&self) -> anyhow::Result<()>;
}

pub struct CallbackClient<T, N> {
    transport: T,
    navigator: N,
    manifest: HydrationManifest,
}

impl<T: CallbackTransport, N: Navigator> CallbackClient<T, N> {
    pub fn new(transport: T, navigator: N, manifest: HydrationManifest) -> Self {
        Self {
            transport,
            navigator,
            manifest,
        }
    }

    pub fn manifest(&self) -> &HydrationManifest {
        &self.manifest
    }

    /// Checks `id` against the manifest, posts `payload`, then follows the
    /// answer.
    pub fn invoke(
        &self,
        id: &str,
        payload: &serde_json::Value,
    ) -> Result<CallbackAction, CallbackError> {
        if !self.manifest.knows_callback(id) {
            log::warn!("refusing callback '{id}': not in the hydration manifest");
            return Err(CallbackError::Unknown(id.to_string()));
        }
        let path = callback_path(id);
        let body = self
            .transport
            .post(&path, payload)
            .map_err(|source| CallbackError::Transport {
                path: path.clone(),
                source,
            })?;
        let response: CallbackResponse = serde_json::from_str(&body)?;
        let action = response.to_action()?;
        match &action {
            CallbackAction::Redirect(url) => self
                .navigator
                .redirect(url)
                .map_err(CallbackError::Navigation)?,
            CallbackAction::Reload => self.navigator.reload().map_err(CallbackError::Navigation)?,
            CallbackAction::Other(name) => {
                log::debug!("callback '{id}' answered '{name}'; nothing to do")
            }
        }
        Ok(action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    struct Canned(&'static str, RefCell<Vec<String>>);

    impl CallbackTransport for &Canned {
        fn post(&self, path: &str, _body: &serde_json::Value) -> anyhow::Result<String> {
            self.1.borrow_mut().push(path.to_string());
            Ok(self.0.to_string())
        }
    }

    #[derive(Default)]
    struct Nav(RefCell<Vec<String>>);

    impl Navigator for &Nav {
        fn redirect(&self, url: &str) -> anyhow::Result<()> {
            self.0.borrow_mut().push(format!("redirect {url}"));
            Ok(())
        }

        fn reload(&self) -> anyhow::Result<()> {
            self.0.borrow_mut().push("reload".into());
            Ok(())
        }
    }

    fn manifest() -> HydrationManifest {
        let mut m = HydrationManifest::default();
        m.register_callback("save");
        m
    }

    #[test]
    fn test_redirect_is_followed() {
        let transport = Canned(r#"{"action":"redirect","location":"/done"}"#, RefCell::default());
        let nav = Nav::default();
        let client = CallbackClient::new(&transport, &nav, manifest());

        let action = client.invoke("save", &serde_json::Value::Null).unwrap();
        assert_eq!(action, CallbackAction::Redirect("/done".into()));
        assert_eq!(*transport.1.borrow(), vec!["/callback/save"]);
        assert_eq!(*nav.0.borrow(), vec!["redirect /done"]);
    }

    #[test]
    fn test_unknown_callback_never_reaches_transport() {
        let transport = Canned(r#"{"action":"reload"}"#, RefCell::default());
        let nav = Nav::default();
        let client = CallbackClient::new(&transport, &nav, manifest());

        let err = client.invoke("delete", &serde_json::Value::Null).unwrap_err();
        assert!(matches!(err, CallbackError::Unknown(id) if id == "delete"));
        assert!(transport.1.borrow().is_empty());
    }

    #[test]
    fn test_other_actions_do_not_navigate() {
        let transport = Canned(r#"{"action":"noop"}"#, RefCell::default());
        let nav = Nav::default();
        let client = CallbackClient::new(&transport, &nav, manifest());

        let action = client.invoke("save", &serde_json::Value::Null).unwrap();
        assert_eq!(action, CallbackAction::Other("noop".into()));
        assert!(nav.0.borrow().is_empty());
        assert!(matches!(
            CallbackResponse::other("redirect").to_action(),
            Err(CallbackError::MissingUrl)
        ));
    }
}
