use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// Identity of one logical request: the endpoint plus the canonical JSON
/// of its body. Equal bodies give equal keys whatever their key order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryKey(String);

impl QueryKey {
    pub fn new(endpoint: &str, body: &Value) -> Self {
        let mut key = String::with_capacity(endpoint.len() + 64);
        key.push_str(endpoint);
        key.push(' ');
        write_canonical(body, &mut key);
        QueryKey(key)
    }

    pub fn from_body<B: Serialize>(endpoint: &str, body: &B) -> Result<Self, serde_json::Error> {
        Ok(Self::new(endpoint, &serde_json::to_value(body)?))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for QueryKey {
    fn from(s: &str) -> Self {
        QueryKey(s.to_string())
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Bodies can be long; logs only need the start.
        match self.0.char_indices().nth(96) {
            Some((idx, _)) => write!(f, "{}...", &self.0[..idx]),
            None => f.write_str(&self.0),
        }
    }
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (k, v)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(k.clone()).to_string());
                out.push(':');
                write_canonical(v, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, v) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(v, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}
