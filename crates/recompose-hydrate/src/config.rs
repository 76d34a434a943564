use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_TIME_BUDGET: Duration = Duration::from_millis(50);
pub const DEFAULT_MAX_EVENT_AGE: Duration = Duration::from_millis(5000);

/// Tunables for the client side. Serialized in milliseconds:
///
/// ```json
/// { "timeBudgetMs": 50, "maxEventAgeMs": 5000 }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HydrationConfig {
    /// Work per slice before yielding back to the host.
    #[serde(rename = "timeBudgetMs", with = "millis")]
    pub time_budget: Duration,
    /// Buffered events older than this at replay time are dropped.
    #[serde(rename = "maxEventAgeMs", with = "millis")]
    pub max_event_age: Duration,
}

impl Default for HydrationConfig {
    fn default() -> Self {
        Self {
            time_budget: DEFAULT_TIME_BUDGET,
            max_event_age: DEFAULT_MAX_EVENT_AGE,
        }
    }
}

impl HydrationConfig {
    pub fn with_time_budget(mut self, budget: Duration) -> Self {
        self.time_budget = budget;
        self
    }

    pub fn with_max_event_age(mut self, age: Duration) -> Self {
        self.max_event_age = age;
        self
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let c = HydrationConfig::default();
        assert_eq!(c.time_budget, Duration::from_millis(50));
        assert_eq!(c.max_event_age, Duration::from_millis(5000));
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let c: HydrationConfig = serde_json::from_str(r#"{"maxEventAgeMs": 250}"#).unwrap();
        assert_eq!(c.max_event_age, Duration::from_millis(250));
        assert_eq!(c.time_budget, DEFAULT_TIME_BUDGET);

        let json = serde_json::to_string(&c).unwrap();
        assert_eq!(json, r#"{"timeBudgetMs":50,"maxEventAgeMs":250}"#);
    }
}
