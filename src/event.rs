// SPDX-License-Identifier: Apache-2.0

//! The structured record shipped to Cube.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single event extracted from one matched log line.
///
/// Serializes to the Cube event shape: `{"type": .., "time": .., "data": {..}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    event_type: String,
    time: String,
    data: Map<String, Value>,
}

impl Event {
    /// Create an event stamped with the current time.
    pub fn new(event_type: impl Into<String>, data: Map<String, Value>) -> Self {
        Self::at(event_type, Utc::now(), data)
    }

    /// Create an event stamped with the given time.
    pub fn at(event_type: impl Into<String>, time: DateTime<Utc>, data: Map<String, Value>) -> Self {
        Self {
            event_type: event_type.into(),
            time: time.to_rfc3339_opts(SecondsFormat::Secs, true),
            data,
        }
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// RFC3339 timestamp of extraction.
    pub fn time(&self) -> &str {
        &self.time
    }

    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.data.get(field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn serializes_cube_shape() {
        let mut data = Map::new();
        data.insert("status".to_string(), json!(200));
        let time = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();

        let event = Event::at("request", time, data);
        let encoded = serde_json::to_value(&event).unwrap();

        assert_eq!(
            encoded,
            json!({
                "type": "request",
                "time": "2024-01-02T03:04:05Z",
                "data": {"status": 200}
            })
        );
    }

    #[test]
    fn new_uses_rfc3339_time() {
        let event = Event::new("app", Map::new());
        assert!(DateTime::parse_from_rfc3339(event.time()).is_ok());
        assert_eq!(event.event_type(), "app");
        assert!(event.data().is_empty());
    }
}
