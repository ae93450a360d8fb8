// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::event::Event;
use crate::receivers::file::config::Source;
use crate::topology::event_buffer::EventBuffer;

/// Turns matched lines of one source into events on the shared buffer.
#[derive(Clone)]
pub struct Extractor {
    source: Arc<Source>,
    buffer: EventBuffer,
}

impl Extractor {
    pub fn new(source: Arc<Source>, buffer: EventBuffer) -> Self {
        Self { source, buffer }
    }

    pub fn source(&self) -> &Source {
        &self.source
    }

    /// Build an event from a line, or `None` when the pattern does not match.
    pub fn extract(&self, line: &str) -> Option<Event> {
        let captures = self.source.regex().captures(line)?;

        let fields = self.source.fields();
        let mut data = Map::new();
        for field in fields {
            // Groups that did not participate read as empty text
            let text = captures.name(&field.name).map(|m| m.as_str()).unwrap_or("");
            let value = match field.cast {
                Some(cast) => cast.apply(text),
                None => Value::String(text.to_string()),
            };
            data.insert(field.name.clone(), value);
        }

        Some(Event::new(self.source.event_type(), data))
    }

    /// Extract an event and append it to the buffer. Returns whether the line
    /// matched.
    pub fn consume(&self, line: &str) -> bool {
        match self.extract(line) {
            Some(event) => {
                self.buffer.push(event);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::receivers::file::config::SourceConfig;
    use serde_json::json;
    use std::collections::HashMap;

    fn extractor(pattern: &str, casts: &[(&str, &str)]) -> (Extractor, EventBuffer) {
        let config = SourceConfig {
            path: Some("/tmp/test.log".to_string()),
            pattern: pattern.to_string(),
            event_type: "test".to_string(),
            cast: casts
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<HashMap<_, _>>(),
            ..Default::default()
        };
        let buffer = EventBuffer::new();
        let source = Arc::new(Source::compile(&config).unwrap());
        (Extractor::new(source, buffer.clone()), buffer)
    }

    #[test]
    fn test_pattern_consumption() {
        let cases: Vec<(&str, &str, Vec<(&str, Value)>, Vec<(&str, &str)>)> = vec![
            (
                "(?P<message>.*)",
                "Hello World",
                vec![("message", json!("Hello World"))],
                vec![],
            ),
            (
                "(?P<one>.*?),(?P<two>.*)",
                "Hello,2",
                vec![("one", json!("Hello")), ("two", json!(2))],
                vec![("one", "string"), ("two", "integer")],
            ),
        ];

        for (i, (pattern, line, expectations, casts)) in cases.into_iter().enumerate() {
            let (extractor, buffer) = extractor(pattern, &casts);

            assert!(extractor.consume(line), "{}: line should match", i);

            let events = buffer.drain();
            assert_eq!(events.len(), 1, "{}: expected one event", i);
            for (field, value) in expectations {
                assert_eq!(events[0].get(field), Some(&value), "{}: field {}", i, field);
            }
        }
    }

    #[test]
    fn test_unmatched_line_is_dropped() {
        let (extractor, buffer) = extractor(r"^(?P<status>\d{3}) ", &[("status", "integer")]);

        assert!(!extractor.consume("no status here"));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_event_carries_type() {
        let (extractor, _) = extractor("(?P<message>.*)", &[]);
        let event = extractor.extract("hi").unwrap();
        assert_eq!(event.event_type(), "test");
    }

    #[test]
    fn test_optional_group_casts_empty_text() {
        let (extractor, _) = extractor(
            r"^(?P<method>\w+)(?: (?P<bytes>\d+))?$",
            &[("bytes", "integer")],
        );

        let event = extractor.extract("GET").unwrap();
        assert_eq!(event.get("method"), Some(&json!("GET")));
        assert_eq!(event.get("bytes"), Some(&json!(0)));
    }

    #[test]
    fn test_host_and_url_casts() {
        let (extractor, _) = extractor(
            r"^(?P<host>\S+) (?P<url>\S+)$",
            &[("host", "host"), ("url", "url")],
        );

        let event = extractor
            .extract("api.example.com https://api.example.com/v1?x=1")
            .unwrap();
        assert_eq!(event.get("host").unwrap()["subdomain"], "api");
        assert_eq!(event.get("host").unwrap()["domain"], "example.com");
        assert_eq!(event.get("url").unwrap()["path"], "/v1");
    }
}
