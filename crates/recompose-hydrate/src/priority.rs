use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ParsePriorityError;

/// How soon a dormant island should become interactive. Ordering is
/// scheduling only: `Critical < Visible < Near < Deferred`, lower runs first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum HydrationPriority {
    Critical,
    Visible,
    Near,
    #[default]
    Deferred,
}

impl HydrationPriority {
    pub const ALL: [HydrationPriority; 4] = [
        HydrationPriority::Critical,
        HydrationPriority::Visible,
        HydrationPriority::Near,
        HydrationPriority::Deferred,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            HydrationPriority::Critical => "critical",
            HydrationPriority::Visible => "visible",
            HydrationPriority::Near => "near",
            HydrationPriority::Deferred => "deferred",
        }
    }

    /// Queue index, 0 for `Critical`.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Reads the markup attribute. Missing or unrecognized values fall back
    /// to `Deferred`.
    pub fn from_attr(value: Option<&str>) -> Self {
        match value.map(str::parse) {
            Some(Ok(p)) => p,
            Some(Err(err)) => {
                log::debug!("{err}; using deferred");
                HydrationPriority::Deferred
            }
            None => HydrationPriority::Deferred,
        }
    }
}

impl fmt::Display for HydrationPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HydrationPriority {
    type Err = ParsePriorityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        HydrationPriority::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ParsePriorityError(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order() {
        use HydrationPriority::*;
        assert!(Critical < Visible && Visible < Near && Near < Deferred);
        assert_eq!(Critical.index(), 0);
        assert_eq!(Deferred.index(), 3);
    }

    #[test]
    fn test_attr_fallback() {
        assert_eq!(
            HydrationPriority::from_attr(Some("critical")),
            HydrationPriority::Critical
        );
        assert_eq!(
            HydrationPriority::from_attr(Some(" Near ")),
            HydrationPriority::Near
        );
        assert_eq!(
            HydrationPriority::from_attr(Some("asap")),
            HydrationPriority::Deferred
        );
        assert_eq!(HydrationPriority::from_attr(None), HydrationPriority::Deferred);
        assert!("asap".parse::<HydrationPriority>().is_err());
    }

    #[test]
    fn test_serde_uses_lowercase_names() {
        let json = serde_json::to_string(&HydrationPriority::Visible).unwrap();
        assert_eq!(json, r#""visible""#);
    }
}
