use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::error::ValidationError;
use super::Schema;

/// Numeric constraint checked after the type check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Bound {
    Any,
    Positive,
    NonNegative,
    Range(f64, f64),
}

impl Bound {
    fn admits(self, n: f64) -> bool {
        match self {
            Bound::Any => true,
            Bound::Positive => n > 0.0,
            Bound::NonNegative => n >= 0.0,
            Bound::Range(min, max) => n >= min && n <= max,
        }
    }

    fn expected(self) -> String {
        match self {
            Bound::Any => "number".to_string(),
            Bound::Positive => "number > 0".to_string(),
            Bound::NonNegative => "number >= 0".to_string(),
            Bound::Range(min, max) => format!("number in [{}, {}]", min, max),
        }
    }
}

/// A field where an explicit JSON `null` means something different from
/// leaving the key out.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Nullable<T> {
    Absent,
    Null,
    Value(T),
}

impl<T> Nullable<T> {
    pub fn is_absent(&self) -> bool {
        matches!(self, Nullable::Absent)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Nullable::Null)
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Nullable::Value(v) => Some(v),
            _ => None,
        }
    }
}

impl<T> Default for Nullable<T> {
    fn default() -> Self {
        Nullable::Absent
    }
}

// `Absent` fields are expected to be skipped by the containing struct.
impl<T: Serialize> Serialize for Nullable<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Nullable::Value(v) => v.serialize(serializer),
            Nullable::Absent | Nullable::Null => serializer.serialize_none(),
        }
    }
}

/// Short human description of what was found where a rule failed.
pub(crate) fn describe(value: Option<&Value>) -> String {
    match value {
        None => "missing".to_string(),
        Some(Value::Null) => "null".to_string(),
        Some(Value::Bool(b)) => format!("boolean {}", b),
        Some(Value::Number(n)) => format!("number {}", n),
        Some(Value::String(s)) if s.chars().count() > 40 => {
            let head: String = s.chars().take(40).collect();
            format!("string \"{}...\"", head)
        }
        Some(Value::String(s)) => format!("string \"{}\"", s),
        Some(Value::Array(a)) => format!("array of {} item(s)", a.len()),
        Some(Value::Object(_)) => "object".to_string(),
    }
}

/// Reads typed fields out of one JSON object, recording every rule that
/// fails instead of stopping at the first one.
pub(crate) struct ObjectReader<'v, 'e> {
    path: String,
    map: &'v Map<String, Value>,
    errors: &'e mut Vec<ValidationError>,
}

impl<'v, 'e> ObjectReader<'v, 'e> {
    pub fn open(
        value: &'v Value,
        path: &str,
        errors: &'e mut Vec<ValidationError>,
    ) -> Option<Self> {
        match value.as_object() {
            Some(map) => Some(ObjectReader {
                path: path.to_string(),
                map,
                errors,
            }),
            None => {
                errors.push(ValidationError::new(path, "object", describe(Some(value))));
                None
            }
        }
    }

    pub fn field_path(&self, key: &str) -> String {
        format!("{}.{}", self.path, key)
    }

    pub fn push(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn reject(&mut self, key: &str, expected: impl Into<String>) {
        let received = describe(self.map.get(key));
        let path = self.field_path(key);
        self.errors
            .push(ValidationError::new(path, expected, received));
    }

    /// Raw value of a key, `None` when absent.
    pub fn raw(&self, key: &str) -> Option<&'v Value> {
        let map: &'v Map<String, Value> = self.map;
        map.get(key)
    }

    fn required<T>(
        &mut self,
        key: &str,
        expected: &str,
        convert: impl FnOnce(&'v Value) -> Option<T>,
    ) -> Option<T> {
        match self.raw(key).and_then(convert) {
            Some(v) => Some(v),
            None => {
                self.reject(key, expected);
                None
            }
        }
    }

    /// Absent and `null` both read as `None`; the outer `None` means the
    /// value was present but broke the rule.
    fn optional<T>(
        &mut self,
        key: &str,
        expected: &str,
        convert: impl FnOnce(&'v Value) -> Option<T>,
    ) -> Option<Option<T>> {
        match self.raw(key) {
            None | Some(Value::Null) => Some(None),
            Some(v) => match convert(v) {
                Some(t) => Some(Some(t)),
                None => {
                    self.reject(key, expected);
                    None
                }
            },
        }
    }

    fn nullable<T>(
        &mut self,
        key: &str,
        expected: &str,
        convert: impl FnOnce(&'v Value) -> Option<T>,
    ) -> Option<Nullable<T>> {
        match self.raw(key) {
            None => Some(Nullable::Absent),
            Some(Value::Null) => Some(Nullable::Null),
            Some(v) => match convert(v) {
                Some(t) => Some(Nullable::Value(t)),
                None => {
                    self.reject(key, expected);
                    None
                }
            },
        }
    }

    pub fn number(&mut self, key: &str, bound: Bound) -> Option<f64> {
        self.required(key, &bound.expected(), |v| {
            v.as_f64().filter(|n| bound.admits(*n))
        })
    }

    pub fn optional_number(&mut self, key: &str, bound: Bound) -> Option<Option<f64>> {
        self.optional(key, &bound.expected(), |v| {
            v.as_f64().filter(|n| bound.admits(*n))
        })
    }

    pub fn nullable_number(&mut self, key: &str, bound: Bound) -> Option<Nullable<f64>> {
        self.nullable(key, &format!("{} or null", bound.expected()), |v| {
            v.as_f64().filter(|n| bound.admits(*n))
        })
    }

    pub fn integer(&mut self, key: &str, min: u32, max: u32) -> Option<u32> {
        self.required(key, &format!("integer in [{}, {}]", min, max), |v| {
            v.as_u64()
                .and_then(|n| u32::try_from(n).ok())
                .filter(|n| (min..=max).contains(n))
        })
    }

    pub fn optional_integer(&mut self, key: &str, min: u32) -> Option<Option<u32>> {
        self.optional(key, &format!("integer >= {}", min), |v| {
            v.as_u64()
                .and_then(|n| u32::try_from(n).ok())
                .filter(|n| *n >= min)
        })
    }

    pub fn string(&mut self, key: &str) -> Option<String> {
        self.required(key, "string", |v| v.as_str().map(String::from))
    }

    pub fn non_empty_string(&mut self, key: &str) -> Option<String> {
        self.required(key, "non-empty string", |v| {
            v.as_str().filter(|s| !s.trim().is_empty()).map(String::from)
        })
    }

    pub fn optional_string(&mut self, key: &str) -> Option<Option<String>> {
        self.optional(key, "string", |v| v.as_str().map(String::from))
    }

    /// Boolean switch where an absent key means `false`.
    pub fn flag(&mut self, key: &str) -> Option<bool> {
        self.flag_or(key, false)
    }

    pub fn flag_or(&mut self, key: &str, default: bool) -> Option<bool> {
        self.optional(key, "boolean", Value::as_bool)
            .map(|b| b.unwrap_or(default))
    }

    pub fn optional_bool(&mut self, key: &str) -> Option<Option<bool>> {
        self.optional(key, "boolean", Value::as_bool)
    }

    pub fn uuid(&mut self, key: &str) -> Option<Uuid> {
        self.required(key, "UUID string", |v| {
            v.as_str().and_then(|s| Uuid::parse_str(s).ok())
        })
    }

    pub fn optional_uuid(&mut self, key: &str) -> Option<Option<Uuid>> {
        self.optional(key, "UUID string", |v| {
            v.as_str().and_then(|s| Uuid::parse_str(s).ok())
        })
    }

    pub fn optional_timestamp(&mut self, key: &str) -> Option<Option<DateTime<Utc>>> {
        self.optional(key, "RFC 3339 timestamp", |v| {
            v.as_str()
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.with_timezone(&Utc))
        })
    }

    pub fn optional_string_list(&mut self, key: &str) -> Option<Option<Vec<String>>> {
        self.optional(key, "array of strings", |v| {
            v.as_array()?
                .iter()
                .map(|item| item.as_str().map(String::from))
                .collect()
        })
    }

    /// Sub-object kept as raw JSON without looking inside.
    pub fn optional_object(&mut self, key: &str) -> Option<Option<Map<String, Value>>> {
        self.optional(key, "object", |v| v.as_object().cloned())
    }

    pub fn nested<T: Schema>(&mut self, key: &str) -> Option<T> {
        let path = self.field_path(key);
        match self.raw(key) {
            Some(v) => T::read(v, &path, self.errors),
            None => {
                self.reject(key, "object");
                None
            }
        }
    }

    /// Required array whose items are each read as `T`, at `key[i]`.
    pub fn nested_list<T: Schema>(&mut self, key: &str) -> Option<Vec<T>> {
        let Some(items) = self.raw(key).and_then(Value::as_array) else {
            self.reject(key, "array");
            return None;
        };
        let path = self.field_path(key);
        let mut out = Vec::with_capacity(items.len());
        let mut complete = true;
        for (i, item) in items.iter().enumerate() {
            match T::read(item, &format!("{}[{}]", path, i), self.errors) {
                Some(value) => out.push(value),
                None => complete = false,
            }
        }
        complete.then_some(out)
    }

    /// Reports every key not listed in `known`, for bodies the server
    /// refuses to accept extra fields on.
    pub fn deny_unknown(&mut self, known: &[&str]) {
        let map: &'v Map<String, Value> = self.map;
        for (key, value) in map {
            if !known.contains(&key.as_str()) {
                let path = self.field_path(key);
                self.errors
                    .push(ValidationError::new(path, "no such field", describe(Some(value))));
            }
        }
    }

    pub fn optional_nested<T: Schema>(&mut self, key: &str) -> Option<Option<T>> {
        let path = self.field_path(key);
        match self.raw(key) {
            None | Some(Value::Null) => Some(None),
            Some(v) => T::read(v, &path, self.errors).map(Some),
        }
    }
}
