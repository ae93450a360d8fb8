// SPDX-License-Identifier: Apache-2.0

use std::fmt;
use std::str::FromStr;

use serde_json::{Map, Number, Value, json};
use url::Url;

/// A conversion from captured text to a typed JSON value.
///
/// Cast names are resolved once when the source is loaded, so an unknown
/// name is a configuration error rather than a silent passthrough.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cast {
    String,
    Integer,
    Float,
    Host,
    Url,
}

impl Cast {
    pub fn name(&self) -> &'static str {
        match self {
            Cast::String => "string",
            Cast::Integer => "integer",
            Cast::Float => "float",
            Cast::Host => "host",
            Cast::Url => "url",
        }
    }

    /// Apply the cast. Never fails: unparsable input yields the zero value.
    pub fn apply(&self, value: &str) -> Value {
        match self {
            Cast::String => Value::String(value.to_string()),
            Cast::Integer => Value::from(value.parse::<i64>().unwrap_or(0)),
            Cast::Float => cast_float(value),
            Cast::Host => cast_host(value),
            Cast::Url => cast_url(value),
        }
    }
}

impl FromStr for Cast {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "string" => Ok(Cast::String),
            "integer" => Ok(Cast::Integer),
            "float" => Ok(Cast::Float),
            "host" => Ok(Cast::Host),
            "url" => Ok(Cast::Url),
            other => Err(format!("unknown cast: {}", other)),
        }
    }
}

impl fmt::Display for Cast {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn cast_float(value: &str) -> Value {
    let f = value.parse::<f64>().unwrap_or(0.0);
    // JSON has no NaN or infinity
    Number::from_f64(f)
        .map(Value::Number)
        .unwrap_or_else(|| json!(0.0))
}

/// Split a dotted hostname into its registrable domain (last two labels) and
/// everything in front of it.
fn cast_host(value: &str) -> Value {
    let labels: Vec<&str> = value.split('.').collect();
    let split = labels.len().saturating_sub(2);

    let mut host = Map::with_capacity(3);
    host.insert(
        "subdomain".to_string(),
        Value::String(labels[..split].join(".")),
    );
    host.insert("domain".to_string(), Value::String(labels[split..].join(".")));
    host.insert("full".to_string(), Value::String(value.to_string()));
    Value::Object(host)
}

// Base used to resolve relative references such as "/path?q=1". The host and
// scheme it contributes are blanked out in the result.
const RELATIVE_BASE: &str = "http://relative.invalid/";

fn cast_url(value: &str) -> Value {
    let (url, relative) = match Url::parse(value) {
        Ok(url) => (url, false),
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            match Url::parse(RELATIVE_BASE).and_then(|base| base.join(value)) {
                Ok(url) => (url, true),
                Err(_) => return Value::Null,
            }
        }
        Err(_) => return Value::Null,
    };

    let mut parsed = Map::with_capacity(8);
    let (scheme, host) = if relative {
        (String::new(), String::new())
    } else {
        (
            url.scheme().to_string(),
            url.host_str().unwrap_or_default().to_string(),
        )
    };
    parsed.insert("scheme".to_string(), Value::String(scheme));
    parsed.insert(
        "user".to_string(),
        Value::String(url.username().to_string()),
    );
    parsed.insert("host".to_string(), Value::String(host));
    parsed.insert(
        "port".to_string(),
        url.port().map(Value::from).unwrap_or(Value::Null),
    );
    parsed.insert("path".to_string(), Value::String(url.path().to_string()));
    parsed.insert(
        "query".to_string(),
        Value::String(url.query().unwrap_or_default().to_string()),
    );
    parsed.insert(
        "fragment".to_string(),
        Value::String(url.fragment().unwrap_or_default().to_string()),
    );
    parsed.insert("full".to_string(), Value::String(value.to_string()));
    Value::Object(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host(subdomain: &str, domain: &str, full: &str) -> Value {
        json!({"subdomain": subdomain, "domain": domain, "full": full})
    }

    #[test]
    fn test_cast_table() {
        let cases: Vec<(&str, &str, Value)> = vec![
            ("string", "Hello world", json!("Hello world")),
            ("integer", "A", json!(0)),
            ("integer", "1", json!(1)),
            ("integer", "-42", json!(-42)),
            ("float", "1.5", json!(1.5)),
            ("float", "nope", json!(0.0)),
            ("host", "google.com", host("", "google.com", "google.com")),
            (
                "host",
                "www.google.com",
                host("www", "google.com", "www.google.com"),
            ),
            (
                "host",
                "abc.def.google.com",
                host("abc.def", "google.com", "abc.def.google.com"),
            ),
        ];

        for (i, (name, input, expected)) in cases.into_iter().enumerate() {
            let cast: Cast = name.parse().unwrap();
            assert_eq!(cast.apply(input), expected, "{}: cast {}({})", i, name, input);
        }
    }

    #[test]
    fn test_unknown_cast_name() {
        assert!("boolean".parse::<Cast>().is_err());
        assert!("".parse::<Cast>().is_err());
    }

    #[test]
    fn test_cast_names_round_trip() {
        for cast in [Cast::String, Cast::Integer, Cast::Float, Cast::Host, Cast::Url] {
            assert_eq!(cast.name().parse::<Cast>().unwrap(), cast);
        }
    }

    #[test]
    fn test_float_non_finite_is_zero() {
        assert_eq!(Cast::Float.apply("NaN"), json!(0.0));
        assert_eq!(Cast::Float.apply("inf"), json!(0.0));
    }

    #[test]
    fn test_host_single_label() {
        assert_eq!(Cast::Host.apply("localhost"), host("", "localhost", "localhost"));
        assert_eq!(Cast::Host.apply(""), host("", "", ""));
    }

    #[test]
    fn test_url_absolute() {
        let parsed = Cast::Url.apply("https://bob@example.com:8443/a/b?x=1#top");
        assert_eq!(parsed["scheme"], "https");
        assert_eq!(parsed["user"], "bob");
        assert_eq!(parsed["host"], "example.com");
        assert_eq!(parsed["port"], 8443);
        assert_eq!(parsed["path"], "/a/b");
        assert_eq!(parsed["query"], "x=1");
        assert_eq!(parsed["fragment"], "top");
        assert_eq!(parsed["full"], "https://bob@example.com:8443/a/b?x=1#top");
    }

    #[test]
    fn test_url_relative() {
        let parsed = Cast::Url.apply("/search?q=rust");
        assert_eq!(parsed["scheme"], "");
        assert_eq!(parsed["host"], "");
        assert_eq!(parsed["path"], "/search");
        assert_eq!(parsed["query"], "q=rust");
        assert_eq!(parsed["port"], Value::Null);
    }

    #[test]
    fn test_url_malformed_is_null() {
        assert_eq!(Cast::Url.apply("http://[::1"), Value::Null);
    }
}
