//! Markup attributes that tie server output to client hydration.

use crate::priority::HydrationPriority;

/// Target id of a rendered node; events and islands are keyed by it.
pub const HYDRATION_ID_ATTR: &str = "data-hid";

/// Seeds an island's `HydrationPriority`.
pub const PRIORITY_ATTR: &str = "data-hydrate-priority";

/// A dormant subtree found in server markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IslandMarker {
    pub target_id: String,
    pub priority: HydrationPriority,
}

impl IslandMarker {
    /// Reads a marker from an element's attributes. `None` if the element has
    /// no hydration id.
    pub fn from_attrs<'a>(attrs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Option<Self> {
        let mut target_id = None;
        let mut priority = None;
        for (name, value) in attrs {
            match name {
                HYDRATION_ID_ATTR => target_id = Some(value),
                PRIORITY_ATTR => priority = Some(value),
                _ => {}
            }
        }
        Some(Self {
            target_id: target_id?.to_string(),
            priority: HydrationPriority::from_attr(priority),
        })
    }

    pub fn to_attrs(&self) -> [(&'static str, String); 2] {
        [
            (HYDRATION_ID_ATTR, self.target_id.clone()),
            (PRIORITY_ATTR, self.priority.as_str().to_string()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_from_attrs() {
        let m = IslandMarker::from_attrs([("class", "card"), ("data-hid", "n4")]).unwrap();
        assert_eq!(m.target_id, "n4");
        assert_eq!(m.priority, HydrationPriority::Deferred);

        let m = IslandMarker::from_attrs([("data-hydrate-priority", "visible"), ("data-hid", "n0")])
            .unwrap();
        assert_eq!(m.priority, HydrationPriority::Visible);

        assert!(IslandMarker::from_attrs([("data-hydrate-priority", "critical")]).is_none());
    }
}
